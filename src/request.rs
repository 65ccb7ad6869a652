//! # HTTP Request
//!
//! Request state consumed by the middleware pipeline and router: normalized
//! pathname, path segments, parsed query, and matched route parameters.
//!
//! Pathname normalization is strict: duplicate slashes collapse, a trailing
//! slash is stripped (and remembered), percent-encoded slashes are deleted
//! before decoding, and traversal segments (`/./`, `/../`), non-printable
//! runs, and backslashes are stripped. A pathname that loses its leading
//! slash in the process is rejected outright.

use crate::error::{Error, Result};
use crate::route::Params;
use crate::router::Method;
use http_body_util::BodyExt;
use hyper::body::Bytes;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

/// Hard limit on the raw URI length
pub const MAX_URI_LEN: usize = 4096;
/// Hard limit on the pathname length
pub const MAX_PATHNAME_LEN: usize = 1024;
/// Hard limit on the number of query-string keys
pub const MAX_QUERY_KEYS: usize = 100;

static TRAVERSAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/\.\.?/").expect("traversal regex is valid"));
static NON_PRINTABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^ -~]+").expect("non-printable regex is valid"));
static BACKSLASHES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\+").expect("backslash regex is valid"));

/// HTTP Request wrapper
///
/// Holds the normalized URL state plus the collected body. Headers are
/// stored but accessed on demand; a JSON body is parsed once at
/// construction when the content type says so.
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method
    pub method: Method,
    /// Normalized URL (pathname plus query string, if any)
    pub url: String,
    /// Normalized pathname: leading slash, no trailing slash except root
    pub pathname: String,
    /// Pathname split on `/` with the leading empty segment removed
    pub path: Vec<String>,
    /// Whether the original pathname carried a trailing slash
    pub trailing: bool,
    /// Parameters extracted by the matched route
    pub params: Params,
    /// Parsed query parameters
    query: HashMap<String, String>,
    /// Request headers
    headers: hyper::HeaderMap,
    /// Request body (collected)
    body: Option<Bytes>,
    /// Body parsed as JSON when the content type is JSON
    body_json: Option<Value>,
}

impl Request {
    /// Create a new Request manually (for testing/internal use)
    ///
    /// # Errors
    ///
    /// Returns an error if the URI fails normalization or a declared JSON
    /// body does not parse.
    pub fn new(
        method: Method,
        uri: &str,
        headers_map: HashMap<String, String>,
        body: Option<Bytes>,
    ) -> Result<Self> {
        let mut headers = hyper::HeaderMap::new();
        for (k, v) in headers_map {
            if let (Ok(n), Ok(v)) = (
                hyper::header::HeaderName::from_bytes(k.as_bytes()),
                hyper::header::HeaderValue::from_str(&v),
            ) {
                headers.insert(n, v);
            }
        }

        Self::build(method, uri, headers, body)
    }

    /// Create from a hyper request, collecting the body
    ///
    /// # Errors
    ///
    /// Returns an error on normalization failure, an unsupported method
    /// token, or a body over `max_body_size`.
    pub async fn from_hyper_with_limit(
        req: hyper::Request<hyper::body::Incoming>,
        max_body_size: usize,
    ) -> Result<Self> {
        let method = Method::from_token(req.method().as_str()).ok_or_else(|| {
            Error::UnsupportedMethod {
                method: req.method().to_string(),
            }
        })?;

        let uri = req.uri();
        let full = match uri.query() {
            Some(q) => format!("{}?{}", uri.path(), q),
            None => uri.path().to_string(),
        };

        let headers = req.headers().clone();
        if let Some(len) = headers.get(hyper::header::CONTENT_LENGTH) {
            if let Ok(len_str) = len.to_str() {
                if let Ok(content_len) = len_str.parse::<usize>() {
                    if content_len > max_body_size {
                        return Err(Error::PayloadTooLarge {
                            limit: max_body_size,
                            actual: content_len,
                        });
                    }
                }
            }
        }

        let body = match BodyExt::collect(req.into_body()).await {
            Ok(collected) => {
                let bytes = collected.to_bytes();
                if bytes.len() > max_body_size {
                    return Err(Error::PayloadTooLarge {
                        limit: max_body_size,
                        actual: bytes.len(),
                    });
                }
                if bytes.is_empty() {
                    None
                } else {
                    Some(bytes)
                }
            }
            Err(_) => None,
        };

        Self::build(method, &full, headers, body)
    }

    fn build(
        method: Method,
        uri: &str,
        headers: hyper::HeaderMap,
        body: Option<Bytes>,
    ) -> Result<Self> {
        let parsed = parse_url(uri)?;

        let is_json = headers
            .get(hyper::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("json"));

        let body_json = match (&body, is_json) {
            (Some(bytes), true) => {
                let mut buf = bytes.to_vec();
                Some(crate::json::parse_json_bytes::<Value>(&mut buf)?)
            }
            _ => None,
        };

        Ok(Self {
            method,
            url: parsed.url,
            pathname: parsed.pathname,
            path: parsed.path,
            trailing: parsed.trailing,
            params: Params::new(),
            query: parsed.query,
            headers,
            body,
            body_json,
        })
    }

    /// Get a header value by name (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Set or override a header
    pub fn set_header(&mut self, name: &str, value: &str) {
        if let (Ok(n), Ok(v)) = (
            hyper::header::HeaderName::from_bytes(name.as_bytes()),
            hyper::header::HeaderValue::from_str(value),
        ) {
            self.headers.insert(n, v);
        }
    }

    /// Get the parsed query parameters
    #[must_use]
    pub fn query(&self) -> &HashMap<String, String> {
        &self.query
    }

    /// Get the request body as bytes
    #[must_use]
    pub fn body_bytes(&self) -> Option<&[u8]> {
        self.body.as_ref().map(|b| b.as_ref())
    }

    /// Get the request body as a UTF-8 string
    #[must_use]
    pub fn body_str(&self) -> Option<&str> {
        self.body_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Get the body parsed as JSON, if the content type declared JSON
    #[must_use]
    pub fn body_json(&self) -> Option<&Value> {
        self.body_json.as_ref()
    }
}

struct ParsedUrl {
    url: String,
    pathname: String,
    path: Vec<String>,
    query: HashMap<String, String>,
    trailing: bool,
}

/// Normalize a URI into pathname, segments, and query
fn parse_url(uri: &str) -> Result<ParsedUrl> {
    if uri.len() > MAX_URI_LEN {
        return Err(Error::UriTooLong {
            actual: uri.len(),
            limit: MAX_URI_LEN,
        });
    }

    // Tolerate absolute-form URIs by dropping scheme and authority.
    let rest = match uri.find("://") {
        Some(i) => {
            let after = &uri[i + 3..];
            match after.find('/') {
                Some(j) => &after[j..],
                None => "/",
            }
        }
        None => uri,
    };

    let (raw_path, raw_query) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };

    if raw_path.len() > MAX_PATHNAME_LEN {
        return Err(Error::PathnameTooLong {
            actual: raw_path.len(),
            limit: MAX_PATHNAME_LEN,
        });
    }

    // Collapse duplicate slashes and ensure a leading slash.
    let mut pathname = String::with_capacity(raw_path.len() + 1);
    if !raw_path.starts_with('/') {
        pathname.push('/');
    }
    let mut prev_slash = false;
    for c in raw_path.chars() {
        if c == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        pathname.push(c);
    }

    let mut trailing = false;
    if pathname.len() > 1 && pathname.ends_with('/') {
        pathname.pop();
        trailing = true;
    }

    // Encoded slashes are deleted before decoding so they can never
    // reintroduce path separators.
    let pathname = pathname.replace("%2f", "").replace("%2F", "");
    let pathname = percent_decode(&pathname);

    let pathname = TRAVERSAL.replace_all(&pathname, "").into_owned();
    let pathname = NON_PRINTABLE.replace_all(&pathname, "").into_owned();
    let pathname = BACKSLASHES.replace(&pathname, "").into_owned();

    if pathname.is_empty()
        || !pathname.starts_with('/')
        || (pathname.len() > 1 && pathname.ends_with('/'))
    {
        return Err(Error::MalformedPath { path: pathname });
    }

    let path: Vec<String> = if pathname == "/" {
        Vec::new()
    } else {
        pathname[1..].split('/').map(str::to_string).collect()
    };

    let mut url = pathname.clone();
    if let Some(q) = raw_query {
        if !q.is_empty() {
            url.push('?');
            url.push_str(q);
        }
    }

    let query = parse_query_string(raw_query)?;

    Ok(ParsedUrl {
        url,
        pathname,
        path,
        query,
        trailing,
    })
}

/// Parse a query string into a map
///
/// Handles URL decoding and duplicate keys (last value wins). Empty keys
/// are dropped.
fn parse_query_string(query: Option<&str>) -> Result<HashMap<String, String>> {
    let Some(q) = query else {
        return Ok(HashMap::new());
    };

    let parts: Vec<&str> = q.split('&').collect();
    if parts.len() > MAX_QUERY_KEYS {
        return Err(Error::QueryTooLarge {
            actual: parts.len(),
            limit: MAX_QUERY_KEYS,
        });
    }

    let data = parts
        .into_iter()
        .filter_map(|pair| {
            let mut kv = pair.splitn(2, '=');
            let key = url_decode(kv.next()?);
            if key.is_empty() {
                return None;
            }
            let value = url_decode(kv.next().unwrap_or(""));
            Some((key, value))
        })
        .collect();

    Ok(data)
}

/// Basic URL decoding for query components (`+` becomes a space)
fn url_decode(s: &str) -> String {
    decode_impl(s, true)
}

/// Percent-decoding for pathnames (`+` is left alone)
fn percent_decode(s: &str) -> String {
    decode_impl(s, false)
}

fn decode_impl(s: &str, plus_as_space: bool) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '+' if plus_as_space => result.push(' '),
            '%' => {
                let hex: String = chars.by_ref().take(2).collect();
                if hex.len() == 2 {
                    if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                        result.push(byte as char);
                    } else {
                        result.push('%');
                        result.push_str(&hex);
                    }
                } else {
                    result.push('%');
                    result.push_str(&hex);
                }
            }
            _ => result.push(c),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(uri: &str) -> Request {
        Request::new(Method::Get, uri, HashMap::new(), None).unwrap()
    }

    #[test]
    fn test_root_pathname() {
        let r = req("/");
        assert_eq!(r.pathname, "/");
        assert!(r.path.is_empty());
        assert!(!r.trailing);
    }

    #[test]
    fn test_collapse_and_trailing() {
        let r = req("//a//b/");
        assert_eq!(r.pathname, "/a/b");
        assert_eq!(r.path, vec!["a", "b"]);
        assert!(r.trailing);
    }

    #[test]
    fn test_encoded_slash_removed() {
        let r = req("/a%2fb");
        assert_eq!(r.pathname, "/ab");
        let r = req("/a%2Fb");
        assert_eq!(r.pathname, "/ab");
    }

    #[test]
    fn test_percent_decode_pathname() {
        let r = req("/a%20b");
        assert_eq!(r.pathname, "/a b");
        // '+' is not a space in pathnames
        let r = req("/a+b");
        assert_eq!(r.pathname, "/a+b");
    }

    #[test]
    fn test_traversal_segments_stripped() {
        let r = req("/a/../b");
        assert_eq!(r.pathname, "/ab");
        let r = req("/a/./b");
        assert_eq!(r.pathname, "/ab");
    }

    #[test]
    fn test_leading_traversal_rejected() {
        let result = Request::new(Method::Get, "/../a", HashMap::new(), None);
        assert!(matches!(result, Err(Error::MalformedPath { .. })));
    }

    #[test]
    fn test_uri_too_long() {
        let uri = format!("/{}", "a".repeat(MAX_URI_LEN));
        let result = Request::new(Method::Get, &uri, HashMap::new(), None);
        assert!(matches!(result, Err(Error::UriTooLong { .. })));
    }

    #[test]
    fn test_query_parsing() {
        let r = req("/search?page=1&name=John+Doe&city=New%20York");
        assert_eq!(r.query().get("page"), Some(&"1".to_string()));
        assert_eq!(r.query().get("name"), Some(&"John Doe".to_string()));
        assert_eq!(r.query().get("city"), Some(&"New York".to_string()));
        assert_eq!(r.pathname, "/search");
        assert_eq!(r.url, "/search?page=1&name=John+Doe&city=New%20York");
    }

    #[test]
    fn test_query_too_many_keys() {
        let q: Vec<String> = (0..=MAX_QUERY_KEYS).map(|i| format!("k{i}=1")).collect();
        let uri = format!("/?{}", q.join("&"));
        let result = Request::new(Method::Get, &uri, HashMap::new(), None);
        assert!(matches!(result, Err(Error::QueryTooLarge { .. })));
    }

    #[test]
    fn test_absolute_uri() {
        let r = req("http://localhost/a/b?x=1");
        assert_eq!(r.pathname, "/a/b");
        assert_eq!(r.query().get("x"), Some(&"1".to_string()));
    }

    #[test]
    fn test_json_body_parsed() {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        let body = Bytes::from_static(br#"{"method": "foo"}"#);
        let r = Request::new(Method::Post, "/", headers, Some(body)).unwrap();
        assert_eq!(r.body_json().unwrap()["method"], "foo");
    }

    #[test]
    fn test_invalid_json_body_rejected() {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        let body = Bytes::from_static(b"{nope");
        let result = Request::new(Method::Post, "/", headers, Some(body));
        assert!(matches!(result, Err(Error::JsonParse { .. })));
    }

    #[test]
    fn test_url_decode() {
        assert_eq!(url_decode("hello+world"), "hello world");
        assert_eq!(url_decode("hello%20world"), "hello world");
        assert_eq!(url_decode("100%25"), "100%");
    }
}
