//! httpdoc: lazily-fetched HTTP documents with body normalization,
//! regex and tag-level HTML queries, and link/form navigation.

pub mod config;
pub mod decoder;
pub mod document;
pub mod encoder;
pub mod error;
pub mod html;
pub mod multipart;
pub mod navigation;
pub mod pattern;
pub mod request;
pub mod session;
pub mod transport;

pub use config::{merge_headers, ClientConfig};
pub use document::Document;
pub use error::{DocError, DocResult, TransportError, TransportErrorKind};
pub use html::{html_to_text, HtmlElement, HtmlElements};
pub use multipart::Part;
pub use navigation::DocumentLink;
pub use pattern::Pattern;
pub use request::{BodyMode, Params, RequestSpec};
pub use session::{Hook, Session, SessionBuilder};
pub use transport::{OutgoingRequest, RequestBody, ReqwestTransport, Transport, TransportResponse};
