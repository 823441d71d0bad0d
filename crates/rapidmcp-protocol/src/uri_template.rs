//! RFC 6570 URI template subset: `{var}`, `{var*}`, `{?a,b,c}`
//!
//! Templates compile to an anchored regex. `{var}` matches one path segment,
//! `{var*}` matches any non-empty run including slashes, `{?a,b,c}` binds an
//! optional query string whose parameters may appear in any order. Matched
//! values are URL-decoded; expansion percent-encodes everything outside the
//! RFC 3986 unreserved set.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use regex::Regex;
use std::collections::HashMap;

use crate::error::{Error, McpResult};

/// Everything except ALPHA / DIGIT / `-` / `_` / `.` / `~` is percent-encoded
const ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// URL-decode a template value (`+` is treated as a space)
pub fn url_decode(encoded: &str) -> String {
    let plus_decoded = encoded.replace('+', " ");
    percent_decode_str(&plus_decoded).decode_utf8_lossy().into_owned()
}

/// Percent-encode a value for URI expansion
pub fn url_encode(decoded: &str) -> String {
    utf8_percent_encode(decoded, ENCODE_SET).to_string()
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    /// `{name}` — one path segment
    Param(String),
    /// `{name*}` — greedy, may span slashes
    Wildcard(String),
    /// `{?a,b,c}` — optional query tail
    Query(Vec<String>),
}

/// A compiled URI template
#[derive(Debug, Clone)]
pub struct UriTemplate {
    template: String,
    segments: Vec<Segment>,
    regex: Regex,
}

impl UriTemplate {
    /// Parse and compile a template string
    pub fn parse(template: &str) -> McpResult<Self> {
        let segments = parse_segments(template)?;
        let mut pattern = String::from("^");
        for segment in &segments {
            match segment {
                Segment::Literal(text) => pattern.push_str(&regex::escape(text)),
                Segment::Param(_) => pattern.push_str("([^/?#]+)"),
                Segment::Wildcard(_) => pattern.push_str("(.+)"),
                Segment::Query(_) => pattern.push_str(r"(?:\?([^#]*))?"),
            }
        }
        pattern.push('$');

        let regex = Regex::new(&pattern)
            .map_err(|e| Error::validation(format!("invalid URI template '{template}': {e}")))?;

        Ok(Self {
            template: template.to_string(),
            segments,
            regex,
        })
    }

    /// The original template string
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Declared parameter names, path parameters first, in template order
    pub fn param_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        for segment in &self.segments {
            match segment {
                Segment::Param(name) | Segment::Wildcard(name) => names.push(name.as_str()),
                Segment::Query(query) => names.extend(query.iter().map(String::as_str)),
                Segment::Literal(_) => {}
            }
        }
        names
    }

    /// Match a URI against this template
    ///
    /// Returns `None` on non-match, otherwise the extracted `name -> value`
    /// pairs in declaration order, URL-decoded. Query parameters are included
    /// only when present in the URI.
    pub fn match_uri(&self, uri: &str) -> Option<Vec<(String, String)>> {
        let captures = self.regex.captures(uri)?;

        let mut params = Vec::new();
        let mut group = 1;
        let mut query_names: Option<&[String]> = None;
        for segment in &self.segments {
            match segment {
                Segment::Param(name) | Segment::Wildcard(name) => {
                    let raw = captures.get(group)?.as_str();
                    params.push((name.clone(), url_decode(raw)));
                    group += 1;
                }
                Segment::Query(names) => {
                    query_names = Some(names);
                    group += 1;
                }
                Segment::Literal(_) => {}
            }
        }

        if let Some(names) = query_names
            && let Some(query) = uri.split_once('?').map(|(_, q)| q)
        {
            for pair in query.split('&') {
                let Some((key, value)) = pair.split_once('=') else {
                    continue;
                };
                if names.iter().any(|n| n == key) {
                    params.push((key.to_string(), url_decode(value)));
                }
            }
        }

        Some(params)
    }

    /// Expand the template with a parameter map, percent-encoding values
    ///
    /// Query parameters absent from the map are omitted; an empty query set
    /// omits the `?` entirely.
    pub fn expand(&self, params: &HashMap<String, String>) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Param(name) | Segment::Wildcard(name) => {
                    if let Some(value) = params.get(name) {
                        out.push_str(&url_encode(value));
                    }
                }
                Segment::Query(names) => {
                    let mut first = true;
                    for name in names {
                        let Some(value) = params.get(name) else {
                            continue;
                        };
                        out.push(if first { '?' } else { '&' });
                        first = false;
                        out.push_str(name);
                        out.push('=');
                        out.push_str(&url_encode(value));
                    }
                }
            }
        }
        out
    }
}

fn parse_segments(template: &str) -> McpResult<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut rest = template;

    while !rest.is_empty() {
        let Some(open) = rest.find('{') else {
            segments.push(Segment::Literal(rest.to_string()));
            break;
        };
        if open > 0 {
            segments.push(Segment::Literal(rest[..open].to_string()));
        }
        let Some(close) = rest[open..].find('}') else {
            return Err(Error::validation(format!(
                "unterminated placeholder in URI template '{template}'"
            )));
        };
        let inner = &rest[open + 1..open + close];
        if let Some(query) = inner.strip_prefix('?') {
            let names: Vec<String> = query
                .split(',')
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .collect();
            if names.is_empty() {
                return Err(Error::validation(format!(
                    "empty query placeholder in URI template '{template}'"
                )));
            }
            segments.push(Segment::Query(names));
        } else if let Some(name) = inner.strip_suffix('*') {
            segments.push(Segment::Wildcard(name.to_string()));
        } else if inner.is_empty() {
            return Err(Error::validation(format!(
                "empty placeholder in URI template '{template}'"
            )));
        } else {
            segments.push(Segment::Param(inner.to_string()));
        }
        rest = &rest[open + close + 1..];
    }

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn matched(template: &str, uri: &str) -> Option<Vec<(String, String)>> {
        UriTemplate::parse(template).unwrap().match_uri(uri)
    }

    #[test]
    fn single_segment_param() {
        let params = matched("weather://{city}/current", "weather://new-york/current").unwrap();
        assert_eq!(params, vec![("city".to_string(), "new-york".to_string())]);

        assert!(matched("weather://{city}/current", "weather://london/forecast").is_none());
    }

    #[test]
    fn param_does_not_cross_segments() {
        assert!(matched("files://{name}", "files://a/b").is_none());
        let params = matched("files://{path*}", "files://a/b/c.txt").unwrap();
        assert_eq!(params, vec![("path".to_string(), "a/b/c.txt".to_string())]);
    }

    #[test]
    fn values_are_url_decoded() {
        let params = matched("city://{name}/info", "city://new%20york/info").unwrap();
        assert_eq!(params[0].1, "new york");
    }

    #[test]
    fn query_params_bind_in_any_order() {
        let template = UriTemplate::parse("search://items{?q,limit}").unwrap();

        let params = template.match_uri("search://items?limit=10&q=rust").unwrap();
        let map: HashMap<_, _> = params.into_iter().collect();
        assert_eq!(map["q"], "rust");
        assert_eq!(map["limit"], "10");

        // Query is optional.
        let params = template.match_uri("search://items").unwrap();
        assert!(params.is_empty());
    }

    #[test]
    fn query_values_decode_plus_and_percent() {
        let template = UriTemplate::parse("search://items{?q}").unwrap();
        let params = template.match_uri("search://items?q=hello+world%21").unwrap();
        assert_eq!(params[0].1, "hello world!");
    }

    #[test]
    fn expand_percent_encodes_reserved() {
        let template = UriTemplate::parse("city://{name}/info").unwrap();
        let mut params = HashMap::new();
        params.insert("name".to_string(), "new york/ny".to_string());
        assert_eq!(template.expand(&params), "city://new%20york%2Fny/info");
    }

    #[test]
    fn expand_keeps_unreserved() {
        let template = UriTemplate::parse("v://{x}").unwrap();
        let mut params = HashMap::new();
        params.insert("x".to_string(), "a-b_c.d~e".to_string());
        assert_eq!(template.expand(&params), "v://a-b_c.d~e");
    }

    #[test]
    fn malformed_templates_are_rejected() {
        assert!(UriTemplate::parse("weather://{city/current").is_err());
        assert!(UriTemplate::parse("weather://{}/current").is_err());
        assert!(UriTemplate::parse("items{?}").is_err());
    }

    #[test]
    fn param_names_in_declaration_order() {
        let template = UriTemplate::parse("a://{x}/{y*}{?q,r}").unwrap();
        assert_eq!(template.param_names(), vec!["x", "y", "q", "r"]);
    }

    proptest! {
        // Invariant: match(expand(M)) == M for parameter maps consistent with
        // the template.
        #[test]
        fn expand_match_round_trip(
            city in "[a-zA-Z0-9 /._-]{1,20}",
            q in "[a-zA-Z0-9 !&=._-]{1,20}",
        ) {
            prop_assume!(!city.trim().is_empty());
            let template = UriTemplate::parse("weather://{city}/current{?q}").unwrap();
            let mut params = HashMap::new();
            params.insert("city".to_string(), city.clone());
            params.insert("q".to_string(), q.clone());

            let uri = template.expand(&params);
            let matched: HashMap<_, _> =
                template.match_uri(&uri).unwrap().into_iter().collect();
            prop_assert_eq!(matched.get("city"), Some(&city));
            prop_assert_eq!(matched.get("q"), Some(&q));
        }
    }
}
