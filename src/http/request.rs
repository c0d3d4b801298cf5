//! Request representation used during dispatch.
//!
//! # Responsibilities
//! - Carry method, URI, headers and body of an inbound request
//! - Parse query and form parameters once, keep route parameters separate
//! - Build forwarded copies that share parameters with the original
//!
//! # Design Decisions
//! - Parameter precedence on lookup: route > body > query
//! - The path is mutable (forwarding and static file serving rewrite it)
//! - Request ID assigned on construction for log correlation

use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, Uri};
use std::collections::BTreeMap;
use url::Url;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::http::cookie::parse_cookie_header;

/// Header name for request correlation IDs.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Flat string parameters.
pub type Params = BTreeMap<String, String>;

/// An inbound request.
#[derive(Debug, Clone)]
pub struct Request {
    id: String,
    method: Method,
    uri: Uri,
    path: String,
    headers: HeaderMap,
    body: Bytes,
    query: Params,
    body_params: Params,
    route_params: Params,
    splat: Vec<String>,
}

impl Request {
    /// Create a request for the given method and URI.
    ///
    /// The URI may be absolute (`http://host/path?q=1`) or origin-form (`/path`).
    pub fn new(method: Method, uri: &str) -> Result<Self> {
        let uri: Uri = uri
            .parse()
            .map_err(|_| Error::msg(format!("invalid request uri `{uri}`")))?;
        Ok(Self::from_uri(method, uri))
    }

    /// Shorthand for a GET request; used heavily in tests.
    pub fn get(uri: &str) -> Result<Self> {
        Self::new(Method::GET, uri)
    }

    /// Shorthand for a POST request.
    pub fn post(uri: &str) -> Result<Self> {
        Self::new(Method::POST, uri)
    }

    fn from_uri(method: Method, uri: Uri) -> Self {
        let query = uri.query().map(parse_urlencoded).unwrap_or_default();
        let path = uri.path().to_string();
        Self {
            id: Uuid::new_v4().to_string(),
            method,
            uri,
            path,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            query,
            body_params: Params::new(),
            route_params: Params::new(),
            splat: Vec::new(),
        }
    }

    /// Build from the pieces of an `http` request with a fully buffered body.
    pub fn from_parts(parts: axum::http::request::Parts, body: Bytes) -> Self {
        let mut request = Self::from_uri(parts.method, parts.uri);
        if let Some(id) = parts
            .headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
        {
            request.id = id.to_string();
        }
        request.headers = parts.headers;
        request.set_body(body);
        request
    }

    /// Add a header (builder style).
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| Error::InvalidHeader(name.to_string()))?;
        let value =
            HeaderValue::from_str(value).map_err(|_| Error::InvalidHeader(name.to_string()))?;
        self.headers.append(name, value);
        Ok(self)
    }

    /// Attach a urlencoded form body (builder style).
    pub fn with_form(mut self, fields: &[(&str, &str)]) -> Self {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        self.set_body(Bytes::from(encoded));
        self
    }

    /// Attach a raw body (builder style).
    pub fn with_body(mut self, content_type: &'static str, body: impl Into<Bytes>) -> Self {
        self.headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        self.set_body(body.into());
        self
    }

    fn set_body(&mut self, body: Bytes) {
        self.body_params = if self.is_form() {
            parse_urlencoded(&String::from_utf8_lossy(&body))
        } else {
            Params::new()
        };
        self.body = body;
    }

    fn is_form(&self) -> bool {
        self.content_type()
            .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
            .unwrap_or(false)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Current path. May differ from `uri().path()` after a rewrite.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a header, if it is valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(header::CONTENT_TYPE.as_str())
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.header(header::USER_AGENT.as_str())
    }

    /// Host from the absolute URI, else from the Host header.
    pub fn host(&self) -> Option<&str> {
        self.uri
            .authority()
            .map(|a| a.as_str())
            .or_else(|| self.header(header::HOST.as_str()))
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn query_params(&self) -> &Params {
        &self.query
    }

    pub fn body_params(&self) -> &Params {
        &self.body_params
    }

    /// Replace body parameters (used when a serializer decodes the body).
    pub fn set_body_params(&mut self, params: Params) {
        self.body_params = params;
    }

    pub fn route_params(&self) -> &Params {
        &self.route_params
    }

    /// Values captured by `*` and `**` in the matched route.
    pub fn splat(&self) -> &[String] {
        &self.splat
    }

    pub(crate) fn set_route_match(&mut self, params: Params, splat: Vec<String>) {
        self.route_params = params;
        self.splat = splat;
    }

    /// All parameters merged; route beats body beats query.
    pub fn params(&self) -> Params {
        let mut merged = self.query.clone();
        merged.extend(self.body_params.clone());
        merged.extend(self.route_params.clone());
        merged
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.route_params
            .get(name)
            .or_else(|| self.body_params.get(name))
            .or_else(|| self.query.get(name))
            .map(String::as_str)
    }

    /// Request cookies as name/value pairs.
    pub fn cookies(&self) -> Params {
        self.headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(parse_cookie_header)
            .collect()
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        self.cookies().remove(name)
    }

    /// Absolute URL of this request, used as the base for redirects.
    pub fn base_url(&self) -> Result<Url> {
        let scheme = self.uri.scheme_str().unwrap_or("http");
        let host = self.host().unwrap_or("localhost");
        let mut url = Url::parse(&format!("{scheme}://{host}"))?;
        url.set_path(&self.path);
        url.set_query(self.uri.query());
        Ok(url)
    }

    /// Copy of this request aimed at `path`, sharing its parameters.
    ///
    /// The current route parameters and then `extra` are merged into the
    /// query parameters. Either one also replaces a body parameter of the
    /// same name, so `extra` wins over everything the original carried.
    pub fn forward_to(&self, path: &str, extra: Params, method: Option<Method>) -> Self {
        let mut forwarded = self.clone();
        forwarded.path = path.to_string();
        let mut carried = self.route_params.clone();
        carried.extend(extra);
        for (name, value) in &carried {
            if let Some(existing) = forwarded.body_params.get_mut(name) {
                existing.clone_from(value);
            }
        }
        forwarded.query.extend(carried);
        forwarded.route_params = Params::new();
        forwarded.splat = Vec::new();
        if let Some(method) = method {
            forwarded.method = method;
        }
        forwarded
    }
}

fn parse_urlencoded(input: &str) -> Params {
    url::form_urlencoded::parse(input.as_bytes())
        .into_owned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_and_form_params() {
        let req = Request::post("/items?page=2&sort=name")
            .unwrap()
            .with_form(&[("sort", "price"), ("name", "lamp")]);
        assert_eq!(req.query_params().get("page").map(String::as_str), Some("2"));
        assert_eq!(req.param("sort"), Some("price"));
        assert_eq!(req.params().len(), 3);
    }

    #[test]
    fn test_route_params_take_precedence() {
        let mut req = Request::get("/users/7?id=1").unwrap();
        req.set_route_match(Params::from([("id".into(), "7".into())]), vec![]);
        assert_eq!(req.param("id"), Some("7"));
        assert_eq!(req.params()["id"], "7");
    }

    #[test]
    fn test_base_url_from_host_header() {
        let req = Request::get("/a/b?x=1")
            .unwrap()
            .with_header("Host", "example.com:8080")
            .unwrap();
        assert_eq!(req.base_url().unwrap().as_str(), "http://example.com:8080/a/b?x=1");
    }

    #[test]
    fn test_base_url_from_absolute_uri() {
        let req = Request::get("https://h/a/b").unwrap();
        assert_eq!(req.base_url().unwrap().as_str(), "https://h/a/b");
    }

    #[test]
    fn test_forward_to_merges_params() {
        let req = Request::get("/from?q=2&p=0").unwrap();
        let fwd = req.forward_to(
            "/other",
            Params::from([("p".into(), "1".into())]),
            Some(Method::POST),
        );
        assert_eq!(fwd.path(), "/other");
        assert_eq!(fwd.method(), Method::POST);
        assert_eq!(fwd.param("p"), Some("1"));
        assert_eq!(fwd.param("q"), Some("2"));
        assert_eq!(req.path(), "/from");
    }

    #[test]
    fn test_forward_extra_params_beat_body_params() {
        let req = Request::post("/from")
            .unwrap()
            .with_form(&[("p", "0"), ("keep", "yes")]);
        let fwd = req.forward_to("/to", Params::from([("p".into(), "1".into())]), None);
        assert_eq!(fwd.param("p"), Some("1"));
        assert_eq!(fwd.params()["p"], "1");
        assert_eq!(fwd.param("keep"), Some("yes"));
        assert_eq!(req.param("p"), Some("0"));
    }

    #[test]
    fn test_cookies() {
        let req = Request::get("/")
            .unwrap()
            .with_header("Cookie", "a=1; b=two%20words")
            .unwrap();
        assert_eq!(req.cookie("a").as_deref(), Some("1"));
        assert_eq!(req.cookie("b").as_deref(), Some("two words"));
        assert!(req.cookie("c").is_none());
    }
}
