//! Turns a [`RequestSpec`] body mode into wire bytes or a streamed body.

use reqwest::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use url::form_urlencoded;

use crate::config::header_value;
use crate::error::DocResult;
use crate::multipart::MultipartWriter;
use crate::request::{BodyMode, RequestSpec, FORM_URLENCODED};
use crate::transport::{OutgoingRequest, RequestBody};

/// Encode form pairs in insertion order.
pub fn encode_form(pairs: &[(String, String)]) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .finish()
}

/// Finalize `spec` into an outgoing request.
///
/// Multipart parts are moved out of `spec` (their sources are single-use)
/// and the writer task is started, so this must be called within a tokio
/// runtime; everything else is cloned.
pub fn finalize(spec: &mut RequestSpec) -> DocResult<OutgoingRequest> {
    let mut headers = spec.headers.clone();

    let body = match &mut spec.body {
        BodyMode::None => RequestBody::Empty,
        BodyMode::UrlEncodedForm if spec.form.is_empty() => RequestBody::Empty,
        BodyMode::UrlEncodedForm => {
            let data = encode_form(&spec.form).into_bytes();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_URLENCODED));
            headers.insert(CONTENT_LENGTH, HeaderValue::from(data.len()));
            RequestBody::Bytes(data)
        }
        BodyMode::Raw { data, content_type } => {
            headers.insert(CONTENT_TYPE, header_value(content_type)?);
            headers.insert(CONTENT_LENGTH, HeaderValue::from(data.len()));
            RequestBody::Bytes(data.clone())
        }
        BodyMode::Multipart { boundary, parts } => {
            let writer =
                MultipartWriter::new(boundary.clone(), spec.form.clone(), std::mem::take(parts));
            headers.insert(CONTENT_TYPE, header_value(&writer.content_type())?);
            // Streamed: length unknown up front.
            headers.remove(CONTENT_LENGTH);
            RequestBody::Stream(writer.spawn())
        }
    };

    Ok(OutgoingRequest {
        method: spec.method.clone(),
        url: spec.url.clone(),
        headers,
        body,
    })
}
