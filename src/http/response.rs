//! Response representation used during dispatch.
//!
//! # Responsibilities
//! - Hold status, headers and body while hooks and handlers mutate them
//! - Track the halted flag that before/after hooks consult
//! - Convert into an `http` response for the server adapter
//!
//! # Design Decisions
//! - Body is fully buffered; streaming is the server's concern
//! - Halting is sticky: once halted a response stays halted

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};

use crate::error::{Error, Result};
use crate::http::cookie::Cookie;

/// An in-progress response.
#[derive(Debug, Clone, Default)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    halted: bool,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(status: StatusCode) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// First value of a header, if it is valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Replace a header.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<()> {
        let (name, value) = header_pair(name, value)?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Append a header, keeping existing values.
    pub fn push_header(&mut self, name: &str, value: &str) -> Result<()> {
        let (name, value) = header_pair(name, value)?;
        self.headers.append(name, value);
        Ok(())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(header::CONTENT_TYPE.as_str())
    }

    pub fn set_content_type(&mut self, content_type: &str) -> Result<()> {
        self.set_header(header::CONTENT_TYPE.as_str(), content_type)
    }

    /// Append a `Set-Cookie` header.
    pub fn add_cookie(&mut self, cookie: &Cookie) -> Result<()> {
        self.push_header(header::SET_COOKIE.as_str(), &cookie.to_header_value())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body as text; invalid UTF-8 is replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn halt(&mut self) {
        self.halted = true;
    }

    pub fn location(&self) -> Option<&str> {
        self.header(header::LOCATION.as_str())
    }

    /// Point the client at `location` with a redirect status.
    pub fn redirect(&mut self, location: &str, status: StatusCode) -> Result<()> {
        self.status = status;
        self.set_header(header::LOCATION.as_str(), location)
    }

    pub fn is_redirect(&self) -> bool {
        self.status.is_redirection() && self.location().is_some()
    }

    /// Convert into an `http` response for the server adapter.
    pub fn into_http(self) -> axum::http::Response<Body> {
        let mut response = axum::http::Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

fn header_pair(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| Error::InvalidHeader(name.to_string()))?;
    let header_value =
        HeaderValue::from_str(value).map_err(|_| Error::InvalidHeader(name.to_string()))?;
    Ok((header_name, header_value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let res = Response::new();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(!res.is_halted());
        assert!(res.body().is_empty());
    }

    #[test]
    fn test_redirect() {
        let mut res = Response::new();
        res.redirect("http://h/x", StatusCode::FOUND).unwrap();
        assert!(res.is_redirect());
        assert_eq!(res.location(), Some("http://h/x"));
        assert!(!res.is_halted());
    }

    #[test]
    fn test_push_header_keeps_values() {
        let mut res = Response::new();
        res.add_cookie(&Cookie::new("a", "1")).unwrap();
        res.add_cookie(&Cookie::new("b", "2")).unwrap();
        assert_eq!(res.headers().get_all(header::SET_COOKIE).iter().count(), 2);
    }

    #[test]
    fn test_invalid_header_rejected() {
        let mut res = Response::new();
        let err = res.set_header("bad header", "x").unwrap_err();
        assert!(matches!(err, Error::InvalidHeader(_)));
    }

    #[test]
    fn test_into_http() {
        let mut res = Response::with_status(StatusCode::CREATED);
        res.set_content_type("text/plain").unwrap();
        res.set_body("done");
        let http = res.into_http();
        assert_eq!(http.status(), StatusCode::CREATED);
        assert_eq!(http.headers()[header::CONTENT_TYPE], "text/plain");
    }
}
