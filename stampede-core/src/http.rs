//! Async HTTP client with wire-level byte accounting and phase timing.
//!
//! Byte counts are best-effort estimates of HTTP/1.1 framing (request line +
//! headers + CRLF + body). Implicit `Host` / `Content-Length` headers are
//! made explicit so the accounting stays deterministic.

use bytes::Bytes;
use http_body_util::{BodyExt as _, Full};
use hyper::Request;
use hyper::body::Incoming;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::time::{Duration, Instant};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("unsupported url scheme: {0}")]
    UnsupportedScheme(String),

    #[error("http request build failed: {0}")]
    RequestBuild(#[from] http::Error),

    #[error("invalid http header name: {0}")]
    HeaderName(#[from] http::header::InvalidHeaderName),

    #[error("invalid http header value: {0}")]
    HeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("http request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    #[error("http request timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to read response body: {0}")]
    BodyRead(#[from] hyper::Error),
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: http::Method,
    pub url: String,
    /// Headers in declared order.
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    /// Bounds the whole exchange: connect, request and body read.
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    /// Status line as scripts see it, e.g. `200 OK`.
    pub status_line: String,
    /// Response headers in wire order, names in canonical case
    /// (`Content-Type`).
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    /// Estimated bytes sent on the wire (request line + headers + body).
    pub bytes_sent: u64,
    /// Estimated bytes received on the wire (status line + headers + body).
    pub bytes_received: u64,
    /// Send until the response head arrived.
    pub duration_request: Duration,
    /// Response head until the body was fully read.
    pub duration_response: Duration,
}

impl HttpResponse {
    /// First value of the named header, looked up case-insensitively.
    #[must_use]
    pub fn first_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl Default for HttpClient {
    fn default() -> Self {
        // The OS-level TCP connect timeout can run to tens of seconds; a
        // short default makes unreachable targets surface promptly.
        Self::new(Some(Duration::from_secs(3)))
    }
}

impl HttpClient {
    #[must_use]
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false);
        http_connector.set_connect_timeout(connect_timeout);

        let https_connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let inner = Client::builder(TokioExecutor::new()).build(https_connector);

        Self { inner }
    }

    pub async fn request(&self, req: HttpRequest) -> Result<HttpResponse> {
        let timeout = req.timeout;
        let parsed = url::Url::parse(&req.url).map_err(|_| Error::InvalidUrl(req.url.clone()))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(Error::UnsupportedScheme(req.url));
        }

        let bytes_sent = request_wire_bytes(&req)?;

        let uri: hyper::Uri = req
            .url
            .parse()
            .map_err(|_| Error::InvalidUrl(req.url.clone()))?;

        let mut builder = Request::builder().method(req.method.clone()).uri(uri);

        if !has_header(&req.headers, "host") {
            if let Some(host) = host_header_value(&parsed) {
                builder = builder.header(http::header::HOST, host);
            }
        }
        if !req.body.is_empty() && !has_header(&req.headers, "content-length") {
            builder = builder.header(http::header::CONTENT_LENGTH, req.body.len());
        }

        for (name, value) in &req.headers {
            let name = http::header::HeaderName::from_bytes(name.as_bytes())?;
            let value = http::header::HeaderValue::from_str(value)?;
            builder = builder.header(name, value);
        }

        let request: Request<Full<Bytes>> = builder.body(Full::new(req.body))?;

        let sent = Instant::now();
        let res: hyper::Response<Incoming> = match timeout {
            Some(t) => tokio::time::timeout(t, self.inner.request(request))
                .await
                .map_err(|_| Error::Timeout(t))??,
            None => self.inner.request(request).await?,
        };
        let duration_request = sent.elapsed();

        let head_arrived = Instant::now();
        let (parts, body) = res.into_parts();
        let head_bytes = response_head_wire_bytes(parts.version, parts.status, &parts.headers);

        let body = match timeout {
            Some(t) => {
                let remaining = t.saturating_sub(sent.elapsed());
                tokio::time::timeout(remaining, body.collect())
                    .await
                    .map_err(|_| Error::Timeout(t))??
                    .to_bytes()
            }
            None => body.collect().await?.to_bytes(),
        };
        let duration_response = head_arrived.elapsed();

        let headers = parts
            .headers
            .iter()
            .map(|(name, value)| {
                (
                    canonical_header_name(name.as_str()),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        Ok(HttpResponse {
            status: parts.status.as_u16(),
            status_line: status_line(parts.status),
            headers,
            bytes_sent,
            bytes_received: head_bytes.saturating_add(body.len() as u64),
            body,
            duration_request,
            duration_response,
        })
    }
}

/// Estimate the HTTP/1.1 wire size of `req` as it will leave the client,
/// including the implicit `Host` / `Content-Length` headers.
pub fn request_wire_bytes(req: &HttpRequest) -> Result<u64> {
    let parsed = url::Url::parse(&req.url).map_err(|_| Error::InvalidUrl(req.url.clone()))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(Error::UnsupportedScheme(req.url.clone()));
    }

    let uri: hyper::Uri = req
        .url
        .parse()
        .map_err(|_| Error::InvalidUrl(req.url.clone()))?;
    let path = uri.path_and_query().map_or("/", |p| p.as_str());

    // "METHOD SP path SP HTTP/1.1 CRLF"
    let mut bytes = (req.method.as_str().len() + 1 + path.len() + 1 + "HTTP/1.1".len() + 2) as u64;

    for (name, value) in &req.headers {
        bytes = bytes.saturating_add(header_wire_bytes(name.len(), value.len()));
    }

    if !has_header(&req.headers, "host") {
        if let Some(host) = host_header_value(&parsed) {
            bytes = bytes.saturating_add(header_wire_bytes("host".len(), host.len()));
        }
    }

    let body_len = req.body.len() as u64;
    if body_len != 0 && !has_header(&req.headers, "content-length") {
        let value_len = body_len.to_string().len();
        bytes = bytes.saturating_add(header_wire_bytes("content-length".len(), value_len));
    }

    // End of headers, then the body.
    Ok(bytes.saturating_add(2).saturating_add(body_len))
}

fn response_head_wire_bytes(
    version: http::Version,
    status: http::StatusCode,
    headers: &http::HeaderMap,
) -> u64 {
    let version_len = match version {
        http::Version::HTTP_2 | http::Version::HTTP_3 => "HTTP/2".len(),
        _ => "HTTP/1.1".len(),
    } as u64;

    // "HTTP/1.1 SP 200 CRLF" (reason phrase intentionally ignored)
    let mut bytes = version_len
        .saturating_add(1)
        .saturating_add(status.as_str().len() as u64)
        .saturating_add(2);

    for (name, value) in headers {
        bytes = bytes.saturating_add(header_wire_bytes(
            name.as_str().len(),
            value.as_bytes().len(),
        ));
    }

    bytes.saturating_add(2)
}

// "name: value\r\n"
fn header_wire_bytes(name_len: usize, value_len: usize) -> u64 {
    (name_len + 2 + value_len + 2) as u64
}

fn status_line(status: http::StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {reason}", status.as_u16()),
        None => status.as_u16().to_string(),
    }
}

/// `content-type` -> `Content-Type`, the form scripts index headers by.
pub(crate) fn canonical_header_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = true;
    for ch in name.chars() {
        if upper_next {
            out.push(ch.to_ascii_uppercase());
        } else {
            out.push(ch.to_ascii_lowercase());
        }
        upper_next = ch == '-';
    }
    out
}

fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
}

fn host_header_value(parsed: &url::Url) -> Option<String> {
    let host = parsed.host_str()?;
    match parsed.port() {
        Some(port) => Some(format!("{host}:{port}")),
        None => Some(host.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(url: &str) -> HttpRequest {
        HttpRequest {
            method: http::Method::GET,
            url: url.to_string(),
            headers: Vec::new(),
            body: Bytes::new(),
            timeout: None,
        }
    }

    #[test]
    fn request_bytes_count_line_host_and_terminator() {
        // "GET /x HTTP/1.1\r\n" (17) + "host: example.com\r\n" (19) + "\r\n" (2)
        let bytes = request_wire_bytes(&get("http://example.com/x")).unwrap();
        assert_eq!(bytes, 17 + 19 + 2);
    }

    #[test]
    fn request_bytes_include_declared_headers_and_body() {
        let req = HttpRequest {
            method: http::Method::POST,
            url: "http://example.com/".to_string(),
            headers: vec![("X-Test".to_string(), "1".to_string())],
            body: Bytes::from_static(b"hello"),
            timeout: None,
        };

        // "POST / HTTP/1.1\r\n" (17) + "X-Test: 1\r\n" (11)
        //   + "host: example.com\r\n" (19) + "content-length: 5\r\n" (19)
        //   + "\r\n" (2) + body (5)
        let bytes = request_wire_bytes(&req).unwrap();
        assert_eq!(bytes, 17 + 11 + 19 + 19 + 2 + 5);
    }

    #[test]
    fn explicit_host_and_content_length_are_not_double_counted() {
        let req = HttpRequest {
            method: http::Method::POST,
            url: "http://example.com/".to_string(),
            headers: vec![
                ("Host".to_string(), "example.com".to_string()),
                ("Content-Length".to_string(), "5".to_string()),
            ],
            body: Bytes::from_static(b"hello"),
            timeout: None,
        };

        // "POST / HTTP/1.1\r\n" (17) + "Host: example.com\r\n" (19)
        //   + "Content-Length: 5\r\n" (19) + "\r\n" (2) + body (5)
        let bytes = request_wire_bytes(&req).unwrap();
        assert_eq!(bytes, 17 + 19 + 19 + 2 + 5);
    }

    #[test]
    fn non_default_ports_appear_in_the_host_header() {
        let a = request_wire_bytes(&get("http://example.com/x")).unwrap();
        let b = request_wire_bytes(&get("http://example.com:8080/x")).unwrap();
        assert_eq!(b, a + ":8080".len() as u64);
    }

    #[test]
    fn rejects_non_http_schemes() {
        assert!(matches!(
            request_wire_bytes(&get("ftp://example.com/")),
            Err(Error::UnsupportedScheme(_))
        ));
        assert!(matches!(
            request_wire_bytes(&get("not a url")),
            Err(Error::InvalidUrl(_))
        ));
    }

    #[test]
    fn header_names_canonicalize() {
        assert_eq!(canonical_header_name("content-type"), "Content-Type");
        assert_eq!(canonical_header_name("x-request-id"), "X-Request-Id");
        assert_eq!(canonical_header_name("ETAG"), "Etag");
    }

    #[test]
    fn status_lines_match_script_expectations() {
        assert_eq!(status_line(http::StatusCode::OK), "200 OK");
        assert_eq!(status_line(http::StatusCode::NOT_FOUND), "404 Not Found");
    }
}
