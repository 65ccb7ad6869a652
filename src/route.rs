//! # Path Matching and Routes
//!
//! Compiles a route pattern into an anchored regex plus an ordered list of
//! parameter names. The grammar is rewrite-based and order-sensitive:
//!
//! 1. a trailing `?` after a `/segment` group makes the segment optional,
//! 2. literal `.` is escaped (unless immediately followed by `+`),
//! 3. `*` becomes a non-greedy wildcard,
//! 4. `%` passes through as a regex escape introducer,
//! 5. `:name` becomes a capturing group matching one non-`/` run.
//!
//! The root pattern `/` matches exactly `/` and skips the grammar.

use crate::error::{Error, Result};
use crate::hook::Handler;
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

static OPTIONAL_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(/[^/]+)\?").expect("optional-segment regex is valid"));
static PARAM_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":(\w+)").expect("param-token regex is valid"));

/// Declared handler arity
///
/// Explicit configuration supplied at registration; the three-argument
/// form reserves a slot that this system never invokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandlerKind {
    /// `(request, response)` handler
    #[default]
    TwoArg,
    /// `(request, response, _)` handler; the third slot is reserved
    ThreeArg,
}

/// Parameters extracted by a successful match
///
/// Both addressing schemes coexist: every capture is reachable by its
/// 0-based position, and captures produced by a `:name` token are also
/// reachable by name. Unmatched optional groups yield no binding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    named: HashMap<String, String>,
    positional: Vec<Option<String>>,
}

impl Params {
    /// Create an empty parameter set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a named binding
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.named.get(name).map(String::as_str)
    }

    /// Look up a positional binding (0-based capture index)
    #[must_use]
    pub fn get_index(&self, index: usize) -> Option<&str> {
        self.positional.get(index)?.as_deref()
    }

    /// Merge another parameter set into this one
    ///
    /// Named bindings overwrite on collision; positional bindings are
    /// appended.
    pub fn merge(&mut self, other: Params) {
        self.named.extend(other.named);
        self.positional.extend(other.positional);
    }

    /// Whether no bindings exist under either scheme
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.named.is_empty() && self.positional.is_empty()
    }

    fn insert(&mut self, name: Option<&str>, value: Option<&str>) {
        if let (Some(name), Some(value)) = (name, value) {
            self.named.insert(name.to_string(), value.to_string());
        }
        self.positional.push(value.map(str::to_string));
    }
}

struct CompiledPattern {
    regex: Regex,
    names: Vec<String>,
}

/// Compiles a route pattern into a matchable predicate
///
/// Compilation is lazy and idempotent: the first match attempt (or an
/// explicit [`compile`](Self::compile)) populates the cell exactly once.
pub struct PathMatcher {
    pattern: String,
    compiled: OnceCell<CompiledPattern>,
}

impl Clone for PathMatcher {
    fn clone(&self) -> Self {
        // Clones recompile lazily on first use.
        Self {
            pattern: self.pattern.clone(),
            compiled: OnceCell::new(),
        }
    }
}

impl std::fmt::Debug for PathMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathMatcher")
            .field("pattern", &self.pattern)
            .field("compiled", &self.compiled.get().is_some())
            .finish()
    }
}

impl PathMatcher {
    /// Create a matcher for a pattern
    ///
    /// # Panics
    ///
    /// Panics if the pattern does not start with `/` (programming error).
    #[must_use]
    pub fn new(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        assert!(
            pattern.starts_with('/'),
            "route pattern must start with '/'"
        );
        Self {
            pattern,
            compiled: OnceCell::new(),
        }
    }

    /// The original pattern string
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Force compilation
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if the rewritten pattern is
    /// not a valid regex.
    pub fn compile(&self) -> Result<()> {
        self.compiled()?;
        Ok(())
    }

    fn compiled(&self) -> Result<&CompiledPattern> {
        self.compiled
            .get_or_try_init(|| compile_pattern(&self.pattern))
    }

    /// Match a pathname against the pattern
    ///
    /// Returns the extracted parameters on success, `None` when the route
    /// does not apply (the caller treats that as fall-through, not an
    /// error).
    ///
    /// # Errors
    ///
    /// Returns an error only if lazy compilation fails.
    pub fn matches(&self, pathname: &str) -> Result<Option<Params>> {
        let compiled = self.compiled()?;

        let Some(caps) = compiled.regex.captures(pathname) else {
            return Ok(None);
        };

        let mut params = Params::new();
        for i in 1..caps.len() {
            let value = caps.get(i).map(|m| m.as_str());
            let name = compiled.names.get(i - 1).map(String::as_str);
            params.insert(name, value);
        }

        Ok(Some(params))
    }
}

/// Apply the grammar rewrites and build the anchored regex
fn compile_pattern(pattern: &str) -> Result<CompiledPattern> {
    if pattern == "/" {
        return Ok(CompiledPattern {
            regex: Regex::new("^/$").expect("root regex is valid"),
            names: Vec::new(),
        });
    }

    // 1. Optional path segments.
    let rewritten = OPTIONAL_SEGMENT.replace_all(pattern, "(?:$1)?");

    // 2. Escape literal dots, except a dot introducing `.+`.
    let mut escaped = String::with_capacity(rewritten.len() + 8);
    let mut chars = rewritten.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '.' && chars.peek() != Some(&'+') {
            escaped.push('\\');
        }
        escaped.push(c);
    }

    // 3. Non-greedy wildcard. 4. Escape-introducer passthrough.
    let rewritten = escaped.replace('*', ".*?").replace('%', "\\");

    // 5. Named parameter tokens, recorded in declaration order.
    let mut names = Vec::new();
    let rewritten = PARAM_TOKEN.replace_all(&rewritten, |caps: &regex::Captures<'_>| {
        names.push(caps[1].to_string());
        "([^/]+)".to_string()
    });

    let anchored = format!("^{rewritten}$");
    let regex = Regex::new(&anchored).map_err(|e| Error::InvalidRoutePattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;

    Ok(CompiledPattern { regex, names })
}

/// A (pattern, handler) binding used for terminal request dispatch
#[derive(Clone)]
pub struct Route {
    matcher: PathMatcher,
    handler: Arc<dyn Handler>,
    kind: HandlerKind,
}

impl Route {
    /// Create a route
    #[must_use]
    pub fn new(pattern: impl Into<String>, kind: HandlerKind, handler: Arc<dyn Handler>) -> Self {
        Self {
            matcher: PathMatcher::new(pattern),
            handler,
            kind,
        }
    }

    /// The route's pattern string
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.matcher.pattern()
    }

    /// Declared handler arity
    #[must_use]
    pub fn kind(&self) -> HandlerKind {
        self.kind
    }

    /// Match a pathname against this route's pattern
    ///
    /// # Errors
    ///
    /// Returns an error only if lazy compilation fails.
    pub fn matches(&self, pathname: &str) -> Result<Option<Params>> {
        self.matcher.matches(pathname)
    }

    /// The route's terminal handler
    #[must_use]
    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(pattern: &str) -> PathMatcher {
        PathMatcher::new(pattern)
    }

    #[test]
    fn test_root_matches_only_root() {
        let m = matcher("/");
        assert!(m.matches("/").unwrap().is_some());
        assert!(m.matches("/a").unwrap().is_none());
        assert!(m.matches("").unwrap().is_none());
    }

    #[test]
    fn test_named_and_positional_params() {
        let m = matcher("/a/:id");
        let params = m.matches("/a/5").unwrap().unwrap();
        assert_eq!(params.get("id"), Some("5"));
        assert_eq!(params.get_index(0), Some("5"));
        assert!(m.matches("/a/5/b").unwrap().is_none());
        assert!(m.matches("/a").unwrap().is_none());
    }

    #[test]
    fn test_multiple_params_declaration_order() {
        let m = matcher("/users/:user/posts/:post");
        let params = m.matches("/users/7/posts/42").unwrap().unwrap();
        assert_eq!(params.get("user"), Some("7"));
        assert_eq!(params.get("post"), Some("42"));
        assert_eq!(params.get_index(0), Some("7"));
        assert_eq!(params.get_index(1), Some("42"));
    }

    #[test]
    fn test_optional_segment() {
        let m = matcher("/a/:id?");
        let params = m.matches("/a/5").unwrap().unwrap();
        assert_eq!(params.get("id"), Some("5"));

        let params = m.matches("/a").unwrap().unwrap();
        assert_eq!(params.get("id"), None);
        assert_eq!(params.get_index(0), None);

        assert!(m.matches("/b").unwrap().is_none());
    }

    #[test]
    fn test_wildcard_is_non_greedy_any() {
        let m = matcher("/files/*");
        assert!(m.matches("/files/a").unwrap().is_some());
        assert!(m.matches("/files/a/b/c.txt").unwrap().is_some());
        assert!(m.matches("/other/a").unwrap().is_none());
    }

    #[test]
    fn test_literal_dot_is_escaped() {
        let m = matcher("/file.txt");
        assert!(m.matches("/file.txt").unwrap().is_some());
        assert!(m.matches("/fileXtxt").unwrap().is_none());
    }

    #[test]
    fn test_percent_introduces_regex_escape() {
        // `%d` rewrites to `\d`
        let m = matcher("/n/%d");
        assert!(m.matches("/n/7").unwrap().is_some());
        assert!(m.matches("/n/x").unwrap().is_none());
    }

    #[test]
    fn test_invalid_pattern_surfaces_error() {
        // an unbalanced group survives every rewrite
        let m = matcher("/a(");
        assert!(matches!(
            m.matches("/a"),
            Err(Error::InvalidRoutePattern { .. })
        ));
    }

    #[test]
    fn test_compilation_is_idempotent() {
        let m = matcher("/a/:id");
        m.compile().unwrap();
        m.compile().unwrap();
        let first = m.matches("/a/1").unwrap();
        let second = m.matches("/a/1").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_full_pathname_must_be_consumed() {
        let m = matcher("/a/:id");
        assert!(m.matches("/a/5x").unwrap().is_some());
        assert!(m.matches("/x/a/5").unwrap().is_none());
    }

    #[test]
    #[should_panic(expected = "route pattern")]
    fn test_pattern_without_leading_slash_rejected() {
        let _ = PathMatcher::new("a/b");
    }
}
