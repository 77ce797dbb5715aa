// HTTP request and response types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Attribute holding the name of the matched route
pub const ROUTE_ATTRIBUTE: &str = "_route";

/// Attribute holding the controller reference of the matched route
pub const CONTROLLER_ATTRIBUTE: &str = "_controller";

/// HTTP request wrapper
///
/// `attributes` carries routing output: the matched route name, its
/// controller and every placeholder/default value.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub query_params: HashMap<String, String>,
    pub attributes: HashMap<String, Value>,
}

impl HttpRequest {
    /// Create a request. A query string in `uri` is split off into `query_params`.
    pub fn new(method: impl Into<String>, uri: impl AsRef<str>) -> Self {
        let uri = uri.as_ref();
        let (path, query) = match uri.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (uri, None),
        };

        Self {
            method: method.into().to_uppercase(),
            path: if path.is_empty() { "/".to_string() } else { path.to_string() },
            headers: HashMap::new(),
            body: Vec::new(),
            query_params: query.map(parse_query_string).unwrap_or_default(),
            attributes: HashMap::new(),
        }
    }

    pub fn get(uri: impl AsRef<str>) -> Self {
        Self::new("GET", uri)
    }

    pub fn post(uri: impl AsRef<str>) -> Self {
        Self::new("POST", uri)
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Parse the request body as JSON
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, crate::Error> {
        serde_json::from_slice(&self.body).map_err(|e| crate::Error::Internal(e.to_string()))
    }

    /// Header lookup, case-insensitive on the name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Get a query parameter by name
    pub fn query(&self, name: &str) -> Option<&String> {
        self.query_params.get(name)
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Routing attribute rendered as a string (placeholders and scalar defaults)
    pub fn param(&self, name: &str) -> Option<String> {
        self.attributes.get(name).map(value_to_string)
    }

    /// Name of the matched route, once routing ran
    pub fn route(&self) -> Option<&str> {
        self.attributes.get(ROUTE_ATTRIBUTE).and_then(Value::as_str)
    }

    /// Controller reference of the matched route
    pub fn controller(&self) -> Option<&str> {
        self.attributes.get(CONTROLLER_ATTRIBUTE).and_then(Value::as_str)
    }
}

/// HTTP response wrapper
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn not_found() -> Self {
        Self::new(404)
    }

    pub fn text(body: impl Into<String>) -> Self {
        Self::ok()
            .with_header("Content-Type", "text/plain; charset=utf-8")
            .with_body(body.into().into_bytes())
    }

    pub fn html(body: impl Into<String>) -> Self {
        Self::ok()
            .with_header("Content-Type", "text/html; charset=utf-8")
            .with_body(body.into().into_bytes())
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn with_json<T: Serialize>(mut self, value: &T) -> Result<Self, crate::Error> {
        self.body = serde_json::to_vec(value).map_err(|e| crate::Error::Internal(e.to_string()))?;
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        Ok(self)
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Body as UTF-8, lossy
    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Render a scalar attribute the way it appears in a URL.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => "0".to_string(),
        other => other.to_string(),
    }
}

/// Parse a query string into a map of parameters
fn parse_query_string(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (key, value) = part.split_once('=').unwrap_or((part, ""));
            (decode(key), decode(value))
        })
        .collect()
}

fn decode(s: &str) -> String {
    let plus_decoded = s.replace('+', " ");
    urlencoding::decode(&plus_decoded)
        .map(|c| c.into_owned())
        .unwrap_or(plus_decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_splits_query() {
        let request = HttpRequest::get("/search?q=rust+lang&page=2&flag");
        assert_eq!(request.path, "/search");
        assert_eq!(request.query("q"), Some(&"rust lang".to_string()));
        assert_eq!(request.query("page"), Some(&"2".to_string()));
        assert_eq!(request.query("flag"), Some(&String::new()));
    }

    #[test]
    fn test_request_normalizes_method_and_empty_path() {
        let request = HttpRequest::new("post", "");
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/");
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let request = HttpRequest::get("/").with_header("Host", "example.com");
        assert_eq!(request.header("host"), Some("example.com"));
        assert_eq!(request.header("accept"), None);
    }

    #[test]
    fn test_route_attributes() {
        let mut request = HttpRequest::get("/blog/7");
        request.attributes.insert(ROUTE_ATTRIBUTE.into(), json!("blog_show"));
        request.attributes.insert("page".into(), json!(7));

        assert_eq!(request.route(), Some("blog_show"));
        assert_eq!(request.param("page"), Some("7".to_string()));
        assert_eq!(request.controller(), None);
    }

    #[test]
    fn test_value_to_string() {
        assert_eq!(value_to_string(&json!("a b")), "a b");
        assert_eq!(value_to_string(&json!(3)), "3");
        assert_eq!(value_to_string(&json!(true)), "1");
        assert_eq!(value_to_string(&json!(null)), "");
    }

    #[test]
    fn test_response_helpers() {
        let response = HttpResponse::text("hello");
        assert_eq!(response.status, 200);
        assert_eq!(response.body_string(), "hello");

        let response = HttpResponse::ok().with_json(&json!({"ok": true})).unwrap();
        assert_eq!(
            response.headers.get("Content-Type"),
            Some(&"application/json".to_string())
        );
        assert_eq!(HttpResponse::not_found().status, 404);
    }
}
