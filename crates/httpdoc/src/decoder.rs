//! Response normalization: decompression by `Content-Encoding`, then charset
//! transcoding to UTF-8 by the `Content-Type` charset parameter.

use std::borrow::Cow;
use std::io::Read;

use encoding_rs::{Encoding, UTF_8};
use reqwest::header::{HeaderMap, CONTENT_ENCODING, CONTENT_TYPE};
use tracing::{debug, warn};

use crate::error::{DocError, DocResult};

/// Supported `Content-Encoding` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Identity,
    Gzip,
    Deflate,
    Brotli,
}

impl ContentEncoding {
    /// Fixed-table dispatch; anything unrecognized is the identity.
    pub fn from_header(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("gzip") | Some("x-gzip") => ContentEncoding::Gzip,
            Some("deflate") => ContentEncoding::Deflate,
            Some("br") => ContentEncoding::Brotli,
            _ => ContentEncoding::Identity,
        }
    }

    /// Decode `data`; an empty body (HEAD, 204, 304) is passed through.
    pub fn decompress<'a>(&self, data: &'a [u8]) -> DocResult<Cow<'a, [u8]>> {
        if data.is_empty() {
            return Ok(Cow::Borrowed(data));
        }
        let mut out = Vec::new();
        match self {
            ContentEncoding::Identity => return Ok(Cow::Borrowed(data)),
            ContentEncoding::Gzip => {
                flate2::read::GzDecoder::new(data)
                    .read_to_end(&mut out)
                    .map_err(|e| DocError::Decode(format!("gzip: {e}")))?;
            }
            ContentEncoding::Deflate => {
                // RFC 9110 says zlib-wrapped; plenty of servers send raw deflate.
                if flate2::read::ZlibDecoder::new(data)
                    .read_to_end(&mut out)
                    .is_err()
                {
                    out.clear();
                    flate2::read::DeflateDecoder::new(data)
                        .read_to_end(&mut out)
                        .map_err(|e| DocError::Decode(format!("deflate: {e}")))?;
                }
            }
            ContentEncoding::Brotli => {
                brotli::BrotliDecompress(&mut std::io::Cursor::new(data), &mut out)
                    .map_err(|e| DocError::Decode(format!("br: {e}")))?;
            }
        }
        Ok(Cow::Owned(out))
    }
}

/// Media type of a `Content-Type` value, lowercased, without parameters.
pub fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// The `charset` parameter of a `Content-Type` value, if any.
pub fn charset_param(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        let value = value.trim().trim_matches('"').trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// Transcode `data` from `charset` to UTF-8.
///
/// Labels missing from the registry leave the bytes as they are.
pub fn transcode<'a>(data: &'a [u8], charset: &str) -> Cow<'a, [u8]> {
    let Some(encoding) = Encoding::for_label(charset.trim().as_bytes()) else {
        warn!(charset, "unknown charset, keeping body untranscoded");
        return Cow::Borrowed(data);
    };
    if encoding == UTF_8 {
        return Cow::Borrowed(data);
    }
    let (text, had_errors) = encoding.decode_without_bom_handling(data);
    if had_errors {
        debug!(charset, "malformed sequences replaced while transcoding");
    }
    match text {
        Cow::Borrowed(s) => Cow::Borrowed(s.as_bytes()),
        Cow::Owned(s) => Cow::Owned(s.into_bytes()),
    }
}

/// Produce the normalized body from raw response bytes and headers.
pub fn normalize(headers: &HeaderMap, raw: &[u8]) -> DocResult<Vec<u8>> {
    let encoding =
        ContentEncoding::from_header(headers.get(CONTENT_ENCODING).and_then(|v| v.to_str().ok()));
    let decompressed = encoding.decompress(raw)?;

    let charset = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(charset_param);

    match charset {
        Some(cs) if !cs.eq_ignore_ascii_case("utf-8") => {
            Ok(transcode(&decompressed, &cs).into_owned())
        }
        _ => Ok(decompressed.into_owned()),
    }
}
