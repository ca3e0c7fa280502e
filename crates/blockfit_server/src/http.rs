//! Minimal HTTP/1.1 framing
//!
//! One request per connection. Bodies must carry `Content-Length`; chunked
//! transfer encoding is refused. Every response is closed after writing and
//! carries a permissive CORS header so browser front-ends can call the API.

use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Longest accepted request line or header line.
const MAX_LINE_BYTES: u64 = 8 * 1024;
const MAX_HEADERS: usize = 64;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed before a request was received")]
    ConnectionClosed,

    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("request body of {actual} bytes exceeds the {limit} byte limit")]
    BodyTooLarge { actual: usize, limit: usize },
}

/// Request line and headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Head {
    pub method: String,
    pub path: String,
    headers: Vec<(String, String)>,
}

impl Head {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn content_length(&self) -> Result<usize, HttpError> {
        match self.header("content-length") {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| HttpError::Malformed(format!("bad Content-Length '{value}'"))),
            None => Ok(0),
        }
    }

    pub fn expects_continue(&self) -> bool {
        self.header("expect")
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("100-continue"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub head: Head,
    pub body: Vec<u8>,
}

impl Request {
    pub fn method(&self) -> &str {
        &self.head.method
    }

    pub fn path(&self) -> &str {
        &self.head.path
    }
}

async fn read_line<R>(reader: &mut R) -> Result<Option<String>, HttpError>
where
    R: AsyncBufRead + Unpin,
{
    let mut bytes = Vec::new();
    let read = (&mut *reader).take(MAX_LINE_BYTES).read_until(b'\n', &mut bytes).await?;
    if read == 0 {
        return Ok(None);
    }
    if bytes.last() != Some(&b'\n') {
        return Err(HttpError::Malformed("line too long or truncated".into()));
    }
    let mut line = String::from_utf8(bytes)
        .map_err(|_| HttpError::Malformed("request line or header is not valid UTF-8".into()))?;
    let trimmed = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(trimmed);
    Ok(Some(line))
}

/// Read the request line and headers.
pub async fn read_head<R>(reader: &mut R) -> Result<Head, HttpError>
where
    R: AsyncBufRead + Unpin,
{
    let request_line = read_line(reader).await?.ok_or(HttpError::ConnectionClosed)?;
    let mut parts = request_line.split_whitespace();
    let (method, target, version) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(target), Some(version), None) => (method, target, version),
        _ => return Err(HttpError::Malformed(format!("bad request line '{request_line}'"))),
    };
    if !version.starts_with("HTTP/1.") {
        return Err(HttpError::Malformed(format!("unsupported version '{version}'")));
    }
    let path = target.split('?').next().unwrap_or_default().to_string();

    let mut headers = Vec::new();
    loop {
        let line = read_line(reader)
            .await?
            .ok_or_else(|| HttpError::Malformed("headers not terminated".into()))?;
        if line.is_empty() {
            break;
        }
        if headers.len() == MAX_HEADERS {
            return Err(HttpError::Malformed("too many headers".into()));
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| HttpError::Malformed(format!("bad header '{line}'")))?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    let head = Head {
        method: method.to_ascii_uppercase(),
        path,
        headers,
    };
    if head.header("transfer-encoding").is_some() {
        return Err(HttpError::Malformed("Transfer-Encoding is not supported".into()));
    }
    Ok(head)
}

/// Read exactly `Content-Length` bytes of body, refusing anything over `limit`.
pub async fn read_body<R>(reader: &mut R, head: &Head, limit: usize) -> Result<Vec<u8>, HttpError>
where
    R: AsyncBufRead + Unpin,
{
    let length = head.content_length()?;
    if length > limit {
        return Err(HttpError::BodyTooLarge {
            actual: length,
            limit,
        });
    }
    let mut body = vec![0; length];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self {
                status,
                headers: vec![("Content-Type", "application/json".to_string())],
                body,
            },
            Err(e) => {
                tracing::error!("failed to serialize response: {e}");
                Self::empty(500)
            }
        }
    }

    /// `{"error": message}` with the given status.
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        #[derive(Serialize)]
        struct ErrorBody {
            error: String,
        }
        Self::json(
            status,
            &ErrorBody {
                error: message.into(),
            },
        )
    }

    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }
}

pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

/// Interim response sent before reading a body announced with `Expect`.
pub async fn write_continue<W>(writer: &mut W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await?;
    writer.flush().await
}

pub fn encode_response(response: &Response) -> Vec<u8> {
    let mut head = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\nAccess-Control-Allow-Origin: *\r\n",
        response.status,
        reason_phrase(response.status),
        response.body.len()
    );
    for (name, value) in &response.headers {
        head.push_str(name);
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }
    head.push_str("\r\n");

    let mut bytes = head.into_bytes();
    bytes.extend_from_slice(&response.body);
    bytes
}

pub async fn write_response<W>(writer: &mut W, response: &Response) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode_response(response)).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn parse(raw: &str, limit: usize) -> Result<Request, HttpError> {
        let mut reader = raw.as_bytes();
        let head = read_head(&mut reader).await?;
        let body = read_body(&mut reader, &head, limit).await?;
        Ok(Request { head, body })
    }

    #[tokio::test]
    async fn parses_post_with_body() {
        let raw = "POST /api/allocate_memory?x=1 HTTP/1.1\r\nHost: localhost\r\ncontent-length: 4\r\n\r\n[1,2]";
        let request = parse(raw, 1024).await.unwrap();

        assert_eq!(request.method(), "POST");
        assert_eq!(request.path(), "/api/allocate_memory");
        assert_eq!(request.head.header("Content-Length"), Some("4"));
        // Only Content-Length bytes are consumed
        assert_eq!(request.body, b"[1,2");
    }

    #[tokio::test]
    async fn get_without_body() {
        let request = parse("GET /api/blocks HTTP/1.0\r\n\r\n", 16).await.unwrap();
        assert_eq!(request.path(), "/api/blocks");
        assert!(request.body.is_empty());
    }

    #[tokio::test]
    async fn empty_stream_is_closed_connection() {
        assert!(matches!(parse("", 16).await, Err(HttpError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn rejects_malformed_input() {
        for raw in [
            "GARBAGE\r\n\r\n",
            "GET / SPDY/3\r\n\r\n",
            "GET / HTTP/1.1\r\nno-colon-here\r\n\r\n",
            "GET / HTTP/1.1\r\nHost: x\r\n",
            "POST / HTTP/1.1\r\nContent-Length: lots\r\n\r\n",
            "POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n",
        ] {
            assert!(
                matches!(parse(raw, 16).await, Err(HttpError::Malformed(_))),
                "accepted {raw:?}"
            );
        }
    }

    #[tokio::test]
    async fn non_utf8_header_is_malformed() {
        let raw: &[u8] = b"POST /api/allocate_memory HTTP/1.1\r\nX-Name: \xff\xfe\r\nContent-Length: 2\r\n\r\n[]";
        let mut reader = raw;
        assert!(matches!(read_head(&mut reader).await, Err(HttpError::Malformed(_))));
    }

    #[tokio::test]
    async fn enforces_body_limit() {
        let raw = "POST / HTTP/1.1\r\nContent-Length: 32\r\n\r\n";
        assert!(matches!(
            parse(raw, 16).await,
            Err(HttpError::BodyTooLarge { actual: 32, limit: 16 })
        ));
    }

    #[tokio::test]
    async fn detects_expect_continue() {
        let mut reader = "POST / HTTP/1.1\r\nExpect: 100-continue\r\n\r\n".as_bytes();
        let head = read_head(&mut reader).await.unwrap();
        assert!(head.expects_continue());
    }

    #[test]
    fn encodes_cors_and_length() {
        let response = Response::error(400, "No allocation data provided");
        let text = String::from_utf8(encode_response(&response)).unwrap();

        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(text.contains("Access-Control-Allow-Origin: *\r\n"));
        assert!(text.contains("Content-Type: application/json\r\n"));
        assert!(text.ends_with("\r\n\r\n{\"error\":\"No allocation data provided\"}"));
        assert!(text.contains(&format!("Content-Length: {}\r\n", response.body.len())));
    }
}
