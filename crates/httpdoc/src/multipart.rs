//! Streaming `multipart/form-data` bodies.
//!
//! A [`MultipartWriter`] is spawned as a tokio task that pushes encoded chunks
//! into a bounded channel. The transport consumes the other end as a
//! [`MultipartBody`] stream while the request is in flight, so file parts are
//! never buffered whole.
//!
//! Wire order is fixed: plain fields in insertion order, then parts in
//! attachment order, then the closing boundary. A failure on the writer side
//! is delivered as the last stream item. Dropping the body cancels the
//! writer.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

/// Chunks buffered between writer and transport.
const CHANNEL_CAPACITY: usize = 8;

/// Read size used when copying a part's source.
const COPY_CHUNK: usize = 8 * 1024;

const BOUNDARY_LEN: usize = 32;

/// Byte source for a streamed part.
pub type PartSource = Box<dyn AsyncRead + Send + Unpin>;

/// A single attached part (file or raw byte stream).
pub struct Part {
    name: String,
    filename: Option<String>,
    content_type: Option<String>,
    source: PartSource,
}

impl Part {
    pub fn new(name: impl Into<String>, source: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            name: name.into(),
            filename: None,
            content_type: None,
            source: Box::new(source),
        }
    }

    /// In-memory part, mostly useful in tests.
    pub fn bytes(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self::new(name, io::Cursor::new(data.into()))
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        let ct = content_type.into();
        self.content_type = if ct.is_empty() { None } else { Some(ct) };
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    fn header(&self) -> String {
        let mut header = format!(
            "Content-Disposition: form-data; name=\"{}\"",
            escape_quotes(&self.name)
        );
        if let Some(filename) = &self.filename {
            header.push_str(&format!("; filename=\"{}\"", escape_quotes(filename)));
        }
        header.push_str("\r\n");
        if let Some(ct) = &self.content_type {
            header.push_str(&format!("Content-Type: {ct}\r\n"));
        }
        header.push_str("\r\n");
        header
    }
}

impl fmt::Debug for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Part")
            .field("name", &self.name)
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

fn escape_quotes(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Random boundary for a new multipart body.
pub fn random_boundary() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(BOUNDARY_LEN)
        .map(char::from)
        .collect()
}

/// Encoder for one multipart body. Consumed by [`MultipartWriter::spawn`].
#[derive(Debug)]
pub struct MultipartWriter {
    boundary: String,
    fields: Vec<(String, String)>,
    parts: Vec<Part>,
}

impl MultipartWriter {
    pub fn new(boundary: impl Into<String>, fields: Vec<(String, String)>, parts: Vec<Part>) -> Self {
        Self {
            boundary: boundary.into(),
            fields,
            parts,
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// `Content-Type` header value for this body.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Start the writer task and return the read side.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> MultipartBody {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let token = CancellationToken::new();
        let child = token.clone();

        tokio::spawn(async move {
            let outcome = tokio::select! {
                res = self.write_all(&tx) => res,
                _ = child.cancelled() => {
                    debug!("multipart writer cancelled");
                    return;
                }
            };
            if let Err(e) = outcome {
                debug!("multipart writer failed: {e}");
                // Receiver may already be gone; nothing left to notify then.
                let _ = tx.send(Err(e)).await;
            }
        });

        MultipartBody {
            rx,
            _cancel: token.drop_guard(),
        }
    }

    async fn write_all(self, tx: &mpsc::Sender<io::Result<Vec<u8>>>) -> io::Result<()> {
        let mut started = false;
        let boundary = self.boundary;

        for (name, value) in self.fields {
            let mut chunk = delimiter(&boundary, &mut started);
            chunk.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                    escape_quotes(&name)
                )
                .as_bytes(),
            );
            chunk.extend_from_slice(value.as_bytes());
            send(tx, chunk).await?;
        }

        for part in self.parts {
            let mut head = delimiter(&boundary, &mut started);
            head.extend_from_slice(part.header().as_bytes());
            send(tx, head).await?;

            // The source lives only for this iteration and is dropped on
            // every exit path, including `?`.
            let mut source = part.source;
            let mut buf = vec![0u8; COPY_CHUNK];
            loop {
                let n = source.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                send(tx, buf[..n].to_vec()).await?;
            }
        }

        let closing = if started {
            format!("\r\n--{boundary}--\r\n")
        } else {
            format!("--{boundary}--\r\n")
        };
        send(tx, closing.into_bytes()).await
    }
}

fn delimiter(boundary: &str, started: &mut bool) -> Vec<u8> {
    let s = if *started {
        format!("\r\n--{boundary}\r\n")
    } else {
        format!("--{boundary}\r\n")
    };
    *started = true;
    s.into_bytes()
}

async fn send(tx: &mpsc::Sender<io::Result<Vec<u8>>>, chunk: Vec<u8>) -> io::Result<()> {
    tx.send(Ok(chunk))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "multipart body dropped"))
}

/// Read side of a streaming multipart body.
///
/// Yields encoded chunks until the writer finishes; a writer error arrives as
/// the final `Err` item. Dropping the body cancels the writer task.
pub struct MultipartBody {
    rx: mpsc::Receiver<io::Result<Vec<u8>>>,
    _cancel: DropGuard,
}

impl fmt::Debug for MultipartBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultipartBody").finish_non_exhaustive()
    }
}

impl Stream for MultipartBody {
    type Item = io::Result<Vec<u8>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl MultipartBody {
    /// Drain the whole body into memory.
    pub async fn collect_bytes(mut self) -> io::Result<Vec<u8>> {
        use futures::StreamExt;

        let mut out = Vec::new();
        while let Some(chunk) = self.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// Reader that fails after yielding a prefix.
    struct FailingReader {
        sent: bool,
    }

    impl AsyncRead for FailingReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if !self.sent {
                self.sent = true;
                buf.put_slice(b"partial");
                Poll::Ready(Ok(()))
            } else {
                Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "disk gone")))
            }
        }
    }

    /// Reader that never completes and records when it is dropped.
    struct PendingReader {
        dropped: Arc<AtomicBool>,
    }

    impl AsyncRead for PendingReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut tokio::io::ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Pending
        }
    }

    impl Drop for PendingReader {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_fields_then_parts_in_order() {
        let writer = MultipartWriter::new(
            "XYZ",
            vec![("a".into(), "1".into()), ("b".into(), "2".into())],
            vec![
                Part::bytes("first", "one")
                    .with_filename("one.txt")
                    .with_content_type("text/plain"),
                Part::bytes("second", "two"),
            ],
        );
        let body = writer.spawn().collect_bytes().await.unwrap();
        let text = String::from_utf8(body).unwrap();

        let expected = "--XYZ\r\n\
            Content-Disposition: form-data; name=\"a\"\r\n\r\n1\
            \r\n--XYZ\r\n\
            Content-Disposition: form-data; name=\"b\"\r\n\r\n2\
            \r\n--XYZ\r\n\
            Content-Disposition: form-data; name=\"first\"; filename=\"one.txt\"\r\n\
            Content-Type: text/plain\r\n\r\none\
            \r\n--XYZ\r\n\
            Content-Disposition: form-data; name=\"second\"\r\n\r\ntwo\
            \r\n--XYZ--\r\n";
        assert_eq!(text, expected);
    }

    #[tokio::test]
    async fn test_part_count_matches_fields_plus_parts() {
        let parts = (0..5)
            .map(|i| Part::bytes(format!("p{i}"), vec![b'x'; 20_000]))
            .collect();
        let fields = vec![("f1".into(), "v".into()), ("f2".into(), "v".into())];
        let body = MultipartWriter::new("BND", fields, parts)
            .spawn()
            .collect_bytes()
            .await
            .unwrap();
        let text = String::from_utf8(body).unwrap();

        assert_eq!(text.matches("Content-Disposition").count(), 7);
        let positions: Vec<usize> = (0..5)
            .map(|i| text.find(&format!("name=\"p{i}\"")).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(text.ends_with("\r\n--BND--\r\n"));
    }

    #[tokio::test]
    async fn test_empty_body_is_just_closing_boundary() {
        let body = MultipartWriter::new("E", Vec::new(), Vec::new())
            .spawn()
            .collect_bytes()
            .await
            .unwrap();
        assert_eq!(body, b"--E--\r\n");
    }

    #[tokio::test]
    async fn test_source_error_terminates_stream() {
        let writer = MultipartWriter::new(
            "B",
            Vec::new(),
            vec![Part::new("file", FailingReader { sent: false })],
        );
        let err = writer.spawn().collect_bytes().await.unwrap_err();
        assert_eq!(err.to_string(), "disk gone");
    }

    #[tokio::test]
    async fn test_dropping_body_cancels_writer() {
        let dropped = Arc::new(AtomicBool::new(false));
        let writer = MultipartWriter::new(
            "B",
            Vec::new(),
            vec![Part::new(
                "file",
                PendingReader {
                    dropped: dropped.clone(),
                },
            )],
        );
        let mut body = writer.spawn();
        // Header chunk arrives, then the source blocks forever.
        let head = body.next().await.unwrap().unwrap();
        assert!(String::from_utf8(head).unwrap().contains("name=\"file\""));
        drop(body);

        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while !dropped.load(Ordering::SeqCst) {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("writer should release its source after cancellation");
    }

    #[test]
    fn test_quotes_are_escaped_in_names() {
        let part = Part::bytes("a\"b", "").with_filename("c\\d");
        let header = part.header();
        assert!(header.contains("name=\"a\\\"b\""));
        assert!(header.contains("filename=\"c\\\\d\""));
    }

    #[test]
    fn test_random_boundary_is_alphanumeric() {
        let b = random_boundary();
        assert_eq!(b.len(), BOUNDARY_LEN);
        assert!(b.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(b, random_boundary());
    }
}
