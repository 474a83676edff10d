//! End-to-end tests of documents over the reqwest transport against a local
//! wiremock server.

use std::io::Write;

use wiremock::matchers::{
    body_string, body_string_contains, header, header_exists, method, path, query_param,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

use httpdoc::{ClientConfig, DocError, Part, Session};

// ─────────────────────── helpers ───────────────────────

const PAGE: &str = "<html><head><title>Compressed page</title></head><body>ok</body></html>";

fn session() -> Session {
    Session::new(&ClientConfig::default()).unwrap()
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

fn zlib(data: &[u8]) -> Vec<u8> {
    let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

fn brotli(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut w = brotli::CompressorWriter::new(&mut out, 4096, 5, 22);
        w.write_all(data).unwrap();
    }
    out
}

async fn encoded_page(server: &MockServer, route: &str, encoding: &str, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-encoding", encoding)
                .set_body_raw(body, "text/html; charset=utf-8"),
        )
        .expect(1)
        .mount(server)
        .await;
}

// ─────────────────────── response decoding ───────────────────────

#[tokio::test]
async fn test_compressed_bodies_decode() {
    let server = MockServer::start().await;
    encoded_page(&server, "/gz", "gzip", gzip(PAGE.as_bytes())).await;
    encoded_page(&server, "/zlib", "deflate", zlib(PAGE.as_bytes())).await;
    encoded_page(&server, "/br", "br", brotli(PAGE.as_bytes())).await;

    let session = session();
    for route in ["/gz", "/zlib", "/br"] {
        let mut doc = session.document(&format!("{}{route}", server.uri())).unwrap();
        assert_eq!(doc.title().await.unwrap(), "Compressed page", "route {route}");
        assert_ne!(doc.raw_body().unwrap(), PAGE.as_bytes());
        assert_eq!(doc.body().unwrap(), PAGE.as_bytes());
    }
}

#[tokio::test]
async fn test_legacy_charset_is_transcoded() {
    let server = MockServer::start().await;
    Mock::given(path("/latin1"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            b"<title>Caf\xE9 cr\xE8me</title>".to_vec(),
            "text/html; charset=ISO-8859-1",
        ))
        .mount(&server)
        .await;

    let mut doc = session()
        .document(&format!("{}/latin1", server.uri()))
        .unwrap();
    assert_eq!(doc.title().await.unwrap(), "Café crème");
    assert_eq!(doc.charset().await.unwrap(), "ISO-8859-1");
}

#[tokio::test]
async fn test_default_headers_are_sent() {
    let server = MockServer::start().await;
    Mock::given(path("/"))
        .and(header_exists("accept-encoding"))
        .and(header_exists("user-agent"))
        .and(header("x-team", "crawler"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let session = Session::builder()
        .default_header("X-Team", "crawler")
        .unwrap()
        .build()
        .unwrap();
    let mut doc = session.document(&format!("{}/", server.uri())).unwrap();
    doc.load().await.unwrap();
}

#[tokio::test]
async fn test_empty_encoded_responses_load() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-encoding", "gzip"))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(204).insert_header("content-encoding", "br"))
        .mount(&server)
        .await;

    let session = session();
    for verb in ["HEAD", "DELETE"] {
        let mut doc = session.document(&format!("{}/page", server.uri())).unwrap();
        doc.set_method(verb).unwrap();
        doc.load().await.unwrap();
        assert_eq!(doc.body(), Some(&b""[..]), "method {verb}");
    }
}

// ─────────────────────── lifecycle over the wire ───────────────────────

#[tokio::test]
async fn test_redirect_sets_effective_url() {
    let server = MockServer::start().await;
    Mock::given(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
        .mount(&server)
        .await;
    Mock::given(path("/new"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<a href='next'>n</a>"))
        .mount(&server)
        .await;

    let mut doc = session()
        .document(&format!("{}/old", server.uri()))
        .unwrap();
    doc.load().await.unwrap();
    assert_eq!(doc.url().path(), "/new");

    let links = doc.links().await.unwrap();
    let next = links.first().unwrap().to_document().unwrap();
    assert_eq!(next.url().path(), "/next");
}

#[tokio::test]
async fn test_single_request_per_document() {
    let server = MockServer::start().await;
    Mock::given(path("/once"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<title>t</title>"))
        .expect(1)
        .mount(&server)
        .await;

    let mut doc = session()
        .document(&format!("{}/once", server.uri()))
        .unwrap();
    doc.load().await.unwrap();
    doc.title().await.unwrap();
    doc.content().await.unwrap();
}

#[tokio::test]
async fn test_server_error_status() {
    let server = MockServer::start().await;
    Mock::given(path("/boom"))
        .respond_with(ResponseTemplate::new(503).set_body_string("try later"))
        .mount(&server)
        .await;

    let mut doc = session()
        .document(&format!("{}/boom", server.uri()))
        .unwrap();
    assert!(matches!(
        doc.load().await,
        Err(DocError::Status { status: 503 })
    ));
    assert_eq!(doc.body(), Some("try later".as_bytes()));
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    // Bind and drop to get a port nothing listens on.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let mut doc = session()
        .document(&format!("http://127.0.0.1:{port}/"))
        .unwrap();
    assert!(matches!(doc.load().await, Err(DocError::Transport(_))));
    assert!(!doc.is_loaded());
}

// ─────────────────────── forms and bodies ───────────────────────

#[tokio::test]
async fn test_get_form_submission() {
    let server = MockServer::start().await;
    Mock::given(path("/about"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<form action="/search" method="get"><input name="m" value=""><input name="q" value="x"></form>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "sha256"))
        .and(query_param("m", ""))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<title>sha256 - Search Results</title>"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut about = session()
        .document(&format!("{}/about", server.uri()))
        .unwrap();
    let forms = about.forms().await.unwrap();
    let mut search = forms.first().unwrap().to_document().unwrap();
    search.set_param("q", "sha256");
    search.submit().await.unwrap();
    assert_eq!(search.title().await.unwrap(), "sha256 - Search Results");
}

#[tokio::test]
async fn test_urlencoded_post() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string("a=1&b=2+3"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut doc = session()
        .document(&format!("{}/login", server.uri()))
        .unwrap();
    doc.set_post_param("a", "1").set_post_param("b", "2 3");
    doc.load().await.unwrap();
}

#[tokio::test]
async fn test_streamed_multipart_upload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .and(header("content-type", "multipart/form-data; boundary=wire-test"))
        .and(body_string_contains("Content-Disposition: form-data; name=\"title\"\r\n\r\nreport"))
        .and(body_string_contains("filename=\"data.bin\""))
        .and(body_string_contains("\r\n--wire-test--\r\n"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let mut doc = session()
        .document(&format!("{}/upload", server.uri()))
        .unwrap();
    doc.set_post_param("title", "report")
        .add_multipart_part(
            Part::bytes("file", vec![b'x'; 64 * 1024])
                .with_filename("data.bin")
                .with_content_type("application/octet-stream"),
        )
        .set_multipart_boundary("wire-test");
    doc.load().await.unwrap();
    assert_eq!(doc.status(), Some(201));
}

#[tokio::test]
async fn test_cookie_jar_sends_added_cookies() {
    let server = MockServer::start().await;
    Mock::given(path("/me"))
        .and(header("cookie", "sid=abc"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let session = session();
    let mut doc = session.document(&format!("{}/me", server.uri())).unwrap();
    doc.add_cookie("sid", "abc").unwrap();
    doc.load().await.unwrap();
}

#[tokio::test]
async fn test_json_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api"))
        .and(header("content-type", "application/json"))
        .and(body_string(r#"{"query":"rust"}"#))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"hits": 3})))
        .mount(&server)
        .await;

    let mut doc = session()
        .document(&format!("{}/api", server.uri()))
        .unwrap();
    doc.set_json(&serde_json::json!({"query": "rust"})).unwrap();
    let reply: serde_json::Value = doc.json().await.unwrap();
    assert_eq!(reply["hits"], 3);
}
