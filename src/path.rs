//! Path templates and URL encoding helpers.

use crate::matcher::{explain_at, Mismatch};
use crate::pattern::Pattern;
use serde_json::Value;
use std::collections::BTreeMap;

/// A request path split into literal and `{name}` placeholder segments.
#[derive(Debug, Clone, PartialEq)]
pub struct PathTemplate {
    segments: Vec<TemplateSegment>,
}

#[derive(Debug, Clone, PartialEq)]
enum TemplateSegment {
    Literal(String),
    Param(String),
}

impl PathTemplate {
    /// Parse a path such as `/butter/{substrate}`.
    ///
    /// Literal segments are percent-decoded; a placeholder must span a whole
    /// segment.
    pub fn parse(template: &str) -> Result<Self, String> {
        if !template.starts_with('/') {
            return Err(format!("path '{}' must start with '/'", template));
        }

        let mut segments = Vec::new();
        for raw in template.split('/').filter(|s| !s.is_empty()) {
            if let Some(name) = raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                if name.is_empty() || name.contains(['{', '}']) {
                    return Err(format!("invalid placeholder '{}' in '{}'", raw, template));
                }
                segments.push(TemplateSegment::Param(name.to_string()));
            } else if raw.contains(['{', '}']) {
                return Err(format!(
                    "placeholder '{}' must span a whole segment in '{}'",
                    raw, template
                ));
            } else {
                segments.push(TemplateSegment::Literal(percent_decode(raw, false)));
            }
        }

        Ok(Self { segments })
    }

    /// Placeholder names, in path order.
    pub fn params(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            TemplateSegment::Param(name) => Some(name.as_str()),
            TemplateSegment::Literal(_) => None,
        })
    }

    /// Normalized form for deduplication: placeholders keyed by position and
    /// pattern, so `/butter/{substrate}` and `/butter/{name}` coincide.
    pub(crate) fn key(&self, params: &BTreeMap<String, Pattern>) -> String {
        let mut key = String::new();
        for segment in &self.segments {
            key.push('/');
            match segment {
                TemplateSegment::Literal(lit) => key.push_str(lit),
                TemplateSegment::Param(name) => {
                    let pattern = params
                        .get(name)
                        .and_then(|p| serde_json::to_string(p).ok())
                        .unwrap_or_else(|| "*".to_string());
                    key.push('{');
                    key.push_str(&pattern);
                    key.push('}');
                }
            }
        }
        if key.is_empty() {
            key.push('/');
        }
        key
    }

    /// First mismatch between the template and decoded path segments.
    ///
    /// Placeholders match any string unless `params` supplies a pattern.
    pub fn explain(
        &self,
        segments: &[String],
        params: &BTreeMap<String, Pattern>,
    ) -> Option<Mismatch> {
        if segments.len() != self.segments.len() {
            return Some(Mismatch::new(
                "$.path",
                format!("path {}", self),
                Value::String(join_segments(segments)),
            ));
        }

        for (segment, actual) in self.segments.iter().zip(segments) {
            let actual = Value::String(actual.clone());
            let found = match segment {
                TemplateSegment::Literal(lit) => {
                    explain_at(&Pattern::literal(lit.as_str()), &actual, "$.path")
                }
                TemplateSegment::Param(name) => {
                    let root = format!("$.path.{}", name);
                    match params.get(name) {
                        Some(pattern) => explain_at(pattern, &actual, &root),
                        None => explain_at(&Pattern::like(name.as_str()), &actual, &root),
                    }
                }
            };
            if found.is_some() {
                return found;
            }
        }

        None
    }

    /// Concrete, percent-encoded path with example values for placeholders.
    pub fn render(&self, params: &BTreeMap<String, Pattern>) -> String {
        let rendered: Vec<String> = self
            .segments
            .iter()
            .map(|segment| match segment {
                TemplateSegment::Literal(lit) => percent_encode(lit),
                TemplateSegment::Param(name) => {
                    let value = params
                        .get(name)
                        .map(Pattern::example)
                        .unwrap_or_else(|| Value::String(name.clone()));
                    percent_encode(&value_to_text(&value))
                }
            })
            .collect();
        format!("/{}", rendered.join("/"))
    }
}

impl std::fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            match segment {
                TemplateSegment::Literal(lit) => write!(f, "/{}", lit)?,
                TemplateSegment::Param(name) => write!(f, "/{{{}}}", name)?,
            }
        }
        Ok(())
    }
}

/// Split a raw request path into percent-decoded segments.
///
/// Empty segments are dropped, so a trailing slash is ignored.
pub fn split_path(raw: &str) -> Vec<String> {
    raw.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| percent_decode(s, false))
        .collect()
}

/// Decoded path with the trailing slash stripped. The root stays `/`.
pub fn normalize_path(raw: &str) -> String {
    join_segments(&split_path(raw))
}

fn join_segments(segments: &[String]) -> String {
    format!("/{}", segments.join("/"))
}

/// Parse a query string into decoded key-value pairs.
pub fn parse_query_string(query: &str) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();

    for part in query.split('&') {
        if part.is_empty() {
            continue;
        }
        if let Some((key, value)) = part.split_once('=') {
            params.insert(percent_decode(key, true), percent_decode(value, true));
        } else {
            params.insert(percent_decode(part, true), String::new());
        }
    }

    params
}

/// Render query patterns' examples as an encoded query string.
pub fn render_query(query: &BTreeMap<String, Pattern>) -> String {
    query
        .iter()
        .map(|(key, pattern)| {
            format!(
                "{}={}",
                percent_encode(key),
                percent_encode(&value_to_text(&pattern.example()))
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Percent decoding. `+` becomes a space only in query strings.
///
/// Invalid escapes are kept verbatim; invalid UTF-8 is replaced.
pub fn percent_decode(s: &str, plus_as_space: bool) -> String {
    let decoded = if plus_as_space {
        urlencoding::decode_binary(s.replace('+', " ").as_bytes()).into_owned()
    } else {
        urlencoding::decode_binary(s.as_bytes()).into_owned()
    };
    String::from_utf8_lossy(&decoded).into_owned()
}

/// Percent-encode everything except RFC 3986 unreserved characters.
pub fn percent_encode(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_template() {
        let template = PathTemplate::parse("/butter/{substrate}/").unwrap();
        assert_eq!(template.to_string(), "/butter/{substrate}");
        assert_eq!(template.params().collect::<Vec<_>>(), vec!["substrate"]);

        assert!(PathTemplate::parse("butter").is_err());
        assert!(PathTemplate::parse("/butter/{}").is_err());
        assert!(PathTemplate::parse("/butter/x{id}").is_err());
        assert_eq!(PathTemplate::parse("/").unwrap().to_string(), "/");
    }

    #[test]
    fn test_literal_segments_are_decoded() {
        let template = PathTemplate::parse("/butter/bread%20and%20butter").unwrap();
        assert_eq!(template.to_string(), "/butter/bread and butter");
        let segments = split_path("/butter/bread%20and%20butter/");
        assert!(template.explain(&segments, &BTreeMap::new()).is_none());
    }

    #[test]
    fn test_placeholder_matches_any_string() {
        let template = PathTemplate::parse("/butter/{substrate}").unwrap();
        let params = BTreeMap::new();
        assert!(template.explain(&split_path("/butter/toast"), &params).is_none());
        assert!(template.explain(&split_path("/butter"), &params).is_some());
        assert!(template.explain(&split_path("/jam/toast"), &params).is_some());
    }

    #[test]
    fn test_placeholder_with_specific_pattern() {
        let template = PathTemplate::parse("/users/{id}").unwrap();
        let mut params = BTreeMap::new();
        params.insert("id".to_string(), Pattern::term(r"\d+", "42"));

        assert!(template.explain(&split_path("/users/7"), &params).is_none());
        let mismatch = template.explain(&split_path("/users/abc"), &params).unwrap();
        assert_eq!(mismatch.path, "$.path.id");
        assert_eq!(mismatch.actual, json!("abc"));
    }

    #[test]
    fn test_render_uses_examples() {
        let template = PathTemplate::parse("/butter/{substrate}/{n}").unwrap();
        let mut params = BTreeMap::new();
        params.insert("substrate".to_string(), Pattern::like("rye bread"));
        assert_eq!(template.render(&params), "/butter/rye%20bread/n");
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/butter/bread/"), "/butter/bread");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/a%2Fb"), "/a/b");
    }

    #[test]
    fn test_parse_query_string() {
        let params = parse_query_string("foo=bar&baz=qux&flag");
        assert_eq!(params.get("foo"), Some(&"bar".to_string()));
        assert_eq!(params.get("baz"), Some(&"qux".to_string()));
        assert_eq!(params.get("flag"), Some(&String::new()));

        let params = parse_query_string("name=John%20Doe&city=New+York");
        assert_eq!(params.get("name"), Some(&"John Doe".to_string()));
        assert_eq!(params.get("city"), Some(&"New York".to_string()));
    }

    #[test]
    fn test_percent_decode_edge_cases() {
        assert_eq!(percent_decode("100%", false), "100%");
        assert_eq!(percent_decode("%zz", false), "%zz");
        assert_eq!(percent_decode("%+1", false), "%+1");
        assert_eq!(percent_decode("a+b", false), "a+b");
        assert_eq!(percent_decode("caf%C3%A9", false), "café");
        assert_eq!(percent_decode("1%2B1+2", true), "1+1 2");
    }

    #[test]
    fn test_percent_encode() {
        assert_eq!(percent_encode("bread and butter"), "bread%20and%20butter");
        assert_eq!(percent_encode("a-b.c_d~e"), "a-b.c_d~e");
        assert_eq!(percent_encode("5%/é"), "5%25%2F%C3%A9");
    }

    #[test]
    fn test_render_query() {
        let mut query = BTreeMap::new();
        query.insert("salt".to_string(), Pattern::term(r"\d+%", "5%"));
        query.insert("q".to_string(), Pattern::literal("a b"));
        assert_eq!(render_query(&query), "q=a%20b&salt=5%25");
    }
}
