use crate::files::{self, DocumentRoot, Resolved};
use crate::http::{self, CorsPolicy, Method, Request, RequestParser, Response, Status};
use anyhow::Context;
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use std::fs::{self, File};
use std::path::Path;

pub struct RequestHandler {
    parser: RequestParser,
    root: DocumentRoot,
    cors: CorsPolicy,
}

impl RequestHandler {
    pub fn new(root: DocumentRoot, cors: CorsPolicy) -> anyhow::Result<Self> {
        Ok(RequestHandler {
            parser: RequestParser::new()?,
            root,
            cors,
        })
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Builds the full response for the raw bytes of one request.
    pub fn respond(&self, buf: &[u8]) -> Response {
        let response = self.route(buf).unwrap_or_else(|e| {
            error!("{:?}", e);
            Response::error(Status::INTERNAL_SERVER_ERROR, "Internal server error")
        });
        self.cors.apply(response)
    }

    /// An error response for a request that is refused before parsing.
    pub fn reject(&self, status: Status, message: &str) -> Response {
        self.cors.apply(Response::error(status, message))
    }

    fn route(&self, buf: &[u8]) -> anyhow::Result<Response> {
        let request = match http::request_head(buf).and_then(|head| self.parser.parse(head)) {
            Some(request) => request,
            None => return Ok(Response::error(Status::BAD_REQUEST, "Bad request syntax")),
        };

        let response = match request.method {
            Method::Options => Response::new(Status::NO_CONTENT),
            Method::Get => self.serve(&request, true)?,
            Method::Head => self.serve(&request, false)?,
            Method::Other(ref method) => Response::error(
                Status::NOT_IMPLEMENTED,
                &format!("Unsupported method ('{}')", method),
            ),
        };
        info!(
            "\"{} {}\" {}",
            request.method, request.target, response.status.0
        );
        Ok(response)
    }

    fn serve(&self, request: &Request, with_body: bool) -> anyhow::Result<Response> {
        let resolved = self
            .root
            .resolve(&request.target)
            .with_context(|| format!("Failed to resolve {}", request.target))?;

        let response = match resolved {
            Resolved::File(path) => return self.serve_file(&path, request, with_body),
            Resolved::Redirect(location) => Response::new(Status::MOVED_PERMANENTLY)
                .header("Location", location)
                .header("Content-Length", "0"),
            Resolved::Listing { dir, url_path } => match files::list_directory(&dir, &url_path) {
                Ok(html) => Response::new(Status::OK)
                    .with_body(html.into_bytes(), "text/html; charset=utf-8"),
                Err(e) => {
                    debug!("Failed to list {}: {}", dir.display(), e);
                    Response::error(Status::NOT_FOUND, "No permission to list directory")
                }
            },
            Resolved::NotFound => Response::error(Status::NOT_FOUND, "File not found"),
        };
        Ok(if with_body {
            response
        } else {
            response.without_body()
        })
    }

    /// HEAD answers from metadata alone; GET hands the open file to the connection.
    fn serve_file(&self, path: &Path, request: &Request, with_body: bool) -> anyhow::Result<Response> {
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(_) => return Ok(Response::error(Status::NOT_FOUND, "File not found")),
        };
        let modified: DateTime<Utc> = metadata.modified()?.into();
        let last_modified = http::format_http_date(modified);

        let not_modified = request
            .header("If-Modified-Since")
            .and_then(http::parse_http_date)
            .map_or(false, |since| modified.timestamp() <= since.timestamp());
        if not_modified {
            return Ok(Response::new(Status::NOT_MODIFIED).header("Last-Modified", last_modified));
        }

        let content_type = files::content_type(path);
        let response = Response::new(Status::OK).header("Last-Modified", last_modified);
        if !with_body {
            return Ok(response
                .header("Content-Type", content_type)
                .header("Content-Length", metadata.len().to_string()));
        }

        match File::open(path) {
            Ok(file) => Ok(response.with_file(file, metadata.len(), &content_type)),
            Err(e) => {
                debug!("Failed to open {}: {}", path.display(), e);
                Ok(Response::error(Status::NOT_FOUND, "File not found"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::tests::scratch_dir;
    use crate::http::Body;
    use chrono::Duration;
    use std::io::Read;
    use tempfile::TempDir;

    fn handler() -> (TempDir, RequestHandler) {
        let tmp = scratch_dir();
        let dir = tmp.path();
        fs::create_dir_all(dir.join("live")).unwrap();
        fs::create_dir_all(dir.join("player")).unwrap();
        fs::write(dir.join("live/manifest.mpd"), "<MPD/>").unwrap();
        fs::write(dir.join("live/init.mp4"), vec![0u8; 32]).unwrap();
        fs::write(dir.join("player/index.htm"), "<p>player</p>").unwrap();
        let handler =
            RequestHandler::new(DocumentRoot::new(dir).unwrap(), CorsPolicy::default()).unwrap();
        (tmp, handler)
    }

    fn body_bytes(response: Response) -> Vec<u8> {
        match response.into_parts() {
            (_, Some(mut file)) => {
                let mut body = Vec::new();
                file.read_to_end(&mut body).unwrap();
                body
            }
            (bytes, None) => {
                let end = http::head_end(&bytes).unwrap();
                bytes[end + 4..].to_vec()
            }
        }
    }

    fn status_line(response: &Response) -> String {
        let head = String::from_utf8(response.head_bytes()).unwrap();
        head.lines().next().unwrap().to_string()
    }

    #[test]
    fn preflight_gets_no_content_with_cors() {
        let (_dir, handler) = handler();
        let response = handler.respond(
            b"OPTIONS /live/manifest.mpd HTTP/1.1\r\nOrigin: https://reference.dashif.org\r\n\r\n",
        );
        assert_eq!(response.status, Status::NO_CONTENT);
        assert!(matches!(response.body(), Body::Empty));
        assert_eq!(
            response.get_header("Access-Control-Allow-Origin"),
            Some("https://reference.dashif.org")
        );
        assert_eq!(status_line(&response), "HTTP/1.0 204 No Content");
    }

    #[test]
    fn get_streams_file_with_type_and_cors() {
        let (_dir, handler) = handler();
        let response = handler.respond(b"GET /live/manifest.mpd HTTP/1.1\r\n\r\n");
        assert_eq!(response.status, Status::OK);
        assert!(matches!(response.body(), Body::File(_)));
        assert_eq!(response.get_header("Content-Type"), Some("application/dash+xml"));
        assert_eq!(response.get_header("Content-Length"), Some("6"));
        assert!(response.get_header("Last-Modified").is_some());
        assert_eq!(
            response.get_header("Access-Control-Expose-Headers"),
            Some("Content-Length, Content-Range")
        );
        assert_eq!(body_bytes(response), b"<MPD/>");
    }

    #[test]
    fn head_answers_from_metadata() {
        let (_dir, handler) = handler();
        let response = handler.respond(b"HEAD /live/init.mp4 HTTP/1.0\r\n\r\n");
        assert_eq!(response.status, Status::OK);
        assert!(matches!(response.body(), Body::Empty));
        assert_eq!(response.get_header("Content-Length"), Some("32"));
        assert_eq!(response.get_header("Content-Type"), Some("video/mp4"));
    }

    #[test]
    fn conditional_get_returns_not_modified() {
        let (_dir, handler) = handler();
        let later = http::format_http_date(Utc::now() + Duration::days(1));
        let request = format!("GET /live/init.mp4 HTTP/1.1\r\nIf-Modified-Since: {}\r\n\r\n", later);
        let response = handler.respond(request.as_bytes());
        assert_eq!(response.status, Status::NOT_MODIFIED);
        assert!(matches!(response.body(), Body::Empty));

        let request = "GET /live/init.mp4 HTTP/1.1\r\nIf-Modified-Since: Thu, 01 Jan 1970 00:00:00 GMT\r\n\r\n";
        assert_eq!(handler.respond(request.as_bytes()).status, Status::OK);
    }

    #[test]
    fn directory_redirects_and_lists() {
        let (_dir, handler) = handler();
        let response = handler.respond(b"GET /live HTTP/1.0\r\n\r\n");
        assert_eq!(response.status, Status::MOVED_PERMANENTLY);
        assert_eq!(response.get_header("Location"), Some("/live/"));

        let response = handler.respond(b"GET /live/ HTTP/1.0\r\n\r\n");
        assert_eq!(response.status, Status::OK);
        let body = String::from_utf8(body_bytes(response)).unwrap();
        assert!(body.contains("Directory listing for /live/"));
        assert!(body.contains("<a href=\"manifest.mpd\">manifest.mpd</a>"));
    }

    #[test]
    fn directory_falls_back_to_index_htm() {
        let (_dir, handler) = handler();
        let response = handler.respond(b"GET /player/ HTTP/1.0\r\n\r\n");
        assert_eq!(response.status, Status::OK);
        assert_eq!(response.get_header("Content-Type"), Some("text/html"));
        assert_eq!(body_bytes(response), b"<p>player</p>");
    }

    #[test]
    fn errors_still_carry_cors() {
        let (_dir, handler) = handler();
        let missing = handler.respond(b"GET /nope.m4s HTTP/1.0\r\n\r\n");
        assert_eq!(missing.status, Status::NOT_FOUND);
        assert_eq!(status_line(&missing), "HTTP/1.0 404 File not found");
        assert!(missing.get_header("Access-Control-Allow-Origin").is_some());

        let post = handler.respond(b"POST /live/ HTTP/1.0\r\n\r\n");
        assert_eq!(post.status, Status::NOT_IMPLEMENTED);
        assert_eq!(status_line(&post), "HTTP/1.0 501 Unsupported method ('POST')");

        let garbage = handler.respond(b"hello\r\n\r\n");
        assert_eq!(garbage.status, Status::BAD_REQUEST);
        assert!(garbage.get_header("Access-Control-Allow-Methods").is_some());

        let truncated = handler.respond(b"GET / HTTP/1.0\r\n");
        assert_eq!(truncated.status, Status::BAD_REQUEST);

        let rejected = handler.reject(Status::BAD_REQUEST, "Request header too large");
        assert_eq!(status_line(&rejected), "HTTP/1.0 400 Request header too large");
        assert!(rejected.get_header("Access-Control-Allow-Origin").is_some());
    }
}
