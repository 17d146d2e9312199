use crate::files::html_escape;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use std::fmt;
use std::fs::File;
use std::str;

const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";
const SERVER_NAME: &str = concat!("records-server/", env!("CARGO_PKG_VERSION"));

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Status(pub u16);

impl Status {
    pub const OK: Self = Self(200);
    pub const NO_CONTENT: Self = Self(204);
    pub const MOVED_PERMANENTLY: Self = Self(301);
    pub const NOT_MODIFIED: Self = Self(304);
    pub const BAD_REQUEST: Self = Self(400);
    pub const NOT_FOUND: Self = Self(404);
    pub const INTERNAL_SERVER_ERROR: Self = Self(500);
    pub const NOT_IMPLEMENTED: Self = Self(501);

    pub fn reason(&self) -> &'static str {
        match self.0 {
            200 => "OK",
            204 => "No Content",
            301 => "Moved Permanently",
            304 => "Not Modified",
            400 => "Bad Request",
            404 => "Not Found",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.0, self.reason())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Method {
    Get,
    Head,
    Options,
    Other(String),
}

impl From<&str> for Method {
    fn from(s: &str) -> Self {
        match s {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "OPTIONS" => Method::Options,
            other => Method::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Head => write!(f, "HEAD"),
            Method::Options => write!(f, "OPTIONS"),
            Method::Other(m) => write!(f, "{}", m),
        }
    }
}

#[derive(Debug)]
pub struct Request {
    pub method: Method,
    pub target: String,
    headers: Vec<(String, String)>,
}

impl Request {
    /// Looks up a header value, ignoring the case of the name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub struct RequestParser {
    request_line: Regex,
    header_line: Regex,
}

impl RequestParser {
    pub fn new() -> anyhow::Result<Self> {
        Ok(RequestParser {
            request_line: Regex::new(r"^([A-Za-z]+) (\S+) HTTP/1\.([0-1])$")?,
            header_line: Regex::new(r"^([^:\s]+):\s*(.*?)\s*$")?,
        })
    }

    /// Parses a request head. `None` means the head is malformed.
    pub fn parse(&self, head: &str) -> Option<Request> {
        let mut lines = head.lines().map(|line| line.trim_end_matches('\r'));
        let captures = self.request_line.captures(lines.next()?)?;
        let method = Method::from(&captures[1]);
        let target = captures[2].to_string();

        let mut headers = Vec::new();
        for line in lines.take_while(|line| !line.is_empty()) {
            let captures = self.header_line.captures(line)?;
            headers.push((captures[1].to_string(), captures[2].to_string()));
        }

        Some(Request {
            method,
            target,
            headers,
        })
    }
}

/// Returns the request head when `buf` holds a complete one.
pub fn request_head(buf: &[u8]) -> Option<&str> {
    let end = head_end(buf)?;
    str::from_utf8(&buf[..end]).ok()
}

pub fn head_end(buf: &[u8]) -> Option<usize> {
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n");
    let lf = buf.windows(2).position(|w| w == b"\n\n");
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

pub enum Body {
    Empty,
    Bytes(Vec<u8>),
    /// Streamed in chunks by the connection instead of loaded up front.
    File(File),
}

pub struct Response {
    pub status: Status,
    reason: Option<String>,
    headers: Vec<(&'static str, String)>,
    body: Body,
}

impl Response {
    pub fn new(status: Status) -> Self {
        Response {
            status,
            reason: None,
            headers: Vec::new(),
            body: Body::Empty,
        }
    }

    /// An HTML error page; `message` also replaces the reason phrase.
    pub fn error(status: Status, message: &str) -> Self {
        let body = format!(
            "<!DOCTYPE HTML>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
             <title>Error response</title>\n</head>\n<body>\n<h1>Error response</h1>\n\
             <p>Error code: {}</p>\n<p>Message: {}.</p>\n</body>\n</html>\n",
            status.0,
            html_escape(message)
        );
        let mut response =
            Response::new(status).with_body(body.into_bytes(), "text/html;charset=utf-8");
        response.reason = Some(message.replace(|c: char| c == '\r' || c == '\n', " "));
        response
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn with_body(self, body: Vec<u8>, content_type: &str) -> Self {
        let mut response = self
            .header("Content-Type", content_type)
            .header("Content-Length", body.len().to_string());
        response.body = Body::Bytes(body);
        response
    }

    pub fn with_file(self, file: File, len: u64, content_type: &str) -> Self {
        let mut response = self
            .header("Content-Type", content_type)
            .header("Content-Length", len.to_string());
        response.body = Body::File(file);
        response
    }

    /// Drops the body but keeps every header, as a HEAD response does.
    pub fn without_body(mut self) -> Self {
        self.body = Body::Empty;
        self
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn head_bytes(&self) -> Vec<u8> {
        let reason = self.reason.as_deref().unwrap_or_else(|| self.status.reason());
        let mut head = format!("HTTP/1.0 {} {}\r\n", self.status.0, reason);
        head.push_str(&format!("Server: {}\r\n", SERVER_NAME));
        head.push_str(&format!("Date: {}\r\n", format_http_date(Utc::now())));
        for (name, value) in &self.headers {
            head.push_str(&format!("{}: {}\r\n", name, value));
        }
        head.push_str("Connection: close\r\n\r\n");
        head.into_bytes()
    }

    /// Splits into the bytes to send first and an optional file still to stream.
    pub fn into_parts(self) -> (Vec<u8>, Option<File>) {
        let mut buf = self.head_bytes();
        match self.body {
            Body::Empty => (buf, None),
            Body::Bytes(bytes) => {
                buf.extend_from_slice(&bytes);
                (buf, None)
            }
            Body::File(file) => (buf, Some(file)),
        }
    }
}

pub struct CorsPolicy {
    allow_origin: String,
}

impl CorsPolicy {
    pub const DEFAULT_ORIGIN: &'static str = "https://reference.dashif.org";

    pub fn new(allow_origin: impl Into<String>) -> Self {
        CorsPolicy {
            allow_origin: allow_origin.into(),
        }
    }

    pub fn apply(&self, response: Response) -> Response {
        response
            .header("Access-Control-Allow-Origin", self.allow_origin.clone())
            .header("Access-Control-Allow-Methods", "GET, HEAD, OPTIONS")
            // Range matters for the DASH player's segment fetches.
            .header(
                "Access-Control-Allow-Headers",
                "Range, If-Modified-Since, Cache-Control",
            )
            .header(
                "Access-Control-Expose-Headers",
                "Content-Length, Content-Range",
            )
    }
}

impl Default for CorsPolicy {
    fn default() -> Self {
        CorsPolicy::new(Self::DEFAULT_ORIGIN)
    }
}

pub fn format_http_date(time: DateTime<Utc>) -> String {
    time.format(HTTP_DATE_FORMAT).to_string()
}

pub fn parse_http_date(s: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s.trim(), HTTP_DATE_FORMAT).ok()?;
    Some(Utc.from_utc_datetime(&naive))
}
