//! Expected-value patterns.
//!
//! A [`Pattern`] describes which values a request or response field may
//! take. Every pattern carries an example value, used when the mock answers
//! a request and when a request is rendered for a live provider.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// What a field is allowed to contain.
///
/// Serialized adjacently tagged, e.g. `{match: regex, value: {regex: '\d+%',
/// example: '0%'}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "match", content = "value", rename_all = "snake_case")]
pub enum Pattern {
    /// Deep equality with the given value
    Literal(Value),
    /// Any value of the same basic kind as the example
    #[serde(rename = "type")]
    TypeMatch(Value),
    /// Any string fully matching the regex
    #[serde(rename = "regex")]
    RegexMatch {
        /// Regular expression, anchored at both ends when matching
        regex: String,
        /// Example string, used for generated responses and requests
        example: String,
    },
    /// Nested mapping or sequence of patterns
    Composite(Composite),
}

/// Nested pattern structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Composite {
    /// Every key must be present and match; extra keys are ignored
    Map(BTreeMap<String, Pattern>),
    /// Same length, positional matching
    Seq(Vec<Pattern>),
}

/// Basic kind of a JSON-like value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Null,
    Boolean,
    Number,
    String,
    Mapping,
    Sequence,
}

impl ValueKind {
    /// Kind of the given value.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Boolean,
            Value::Number(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::Object(_) => ValueKind::Mapping,
            Value::Array(_) => ValueKind::Sequence,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Null => "null",
            ValueKind::Boolean => "boolean",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Mapping => "mapping",
            ValueKind::Sequence => "sequence",
        };
        f.write_str(name)
    }
}

impl Pattern {
    /// Match exactly this value.
    pub fn literal(value: impl Into<Value>) -> Self {
        Pattern::Literal(value.into())
    }

    /// Match any value of the same kind as `example`.
    pub fn like(example: impl Into<Value>) -> Self {
        Pattern::TypeMatch(example.into())
    }

    /// Match any string fully matching `regex`.
    pub fn term(regex: impl Into<String>, example: impl Into<String>) -> Self {
        Pattern::RegexMatch {
            regex: regex.into(),
            example: example.into(),
        }
    }

    /// Mapping of field patterns.
    pub fn object<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Pattern)>,
    {
        let fields = fields.into_iter().map(|(k, p)| (k.into(), p)).collect();
        Pattern::Composite(Composite::Map(fields))
    }

    /// Sequence of positional patterns.
    pub fn array(items: impl IntoIterator<Item = Pattern>) -> Self {
        Pattern::Composite(Composite::Seq(items.into_iter().collect()))
    }

    /// Mirror the structure of `value`, type-matching every leaf.
    ///
    /// `shape_of(json!({"lactose": false}))` accepts `{"lactose": true}` but
    /// not `{"lactose": "no"}`.
    pub fn shape_of(value: Value) -> Self {
        match value {
            Value::Object(map) => Pattern::Composite(Composite::Map(
                map.into_iter().map(|(k, v)| (k, Pattern::shape_of(v))).collect(),
            )),
            Value::Array(items) => Pattern::Composite(Composite::Seq(
                items.into_iter().map(Pattern::shape_of).collect(),
            )),
            leaf => Pattern::TypeMatch(leaf),
        }
    }

    /// Example value satisfying this pattern.
    pub fn example(&self) -> Value {
        match self {
            Pattern::Literal(value) | Pattern::TypeMatch(value) => value.clone(),
            Pattern::RegexMatch { example, .. } => Value::String(example.clone()),
            Pattern::Composite(Composite::Map(fields)) => Value::Object(
                fields
                    .iter()
                    .map(|(k, p)| (k.clone(), p.example()))
                    .collect(),
            ),
            Pattern::Composite(Composite::Seq(items)) => {
                Value::Array(items.iter().map(Pattern::example).collect())
            }
        }
    }

    /// Short human-readable description, used in mismatch reports.
    pub fn describe(&self) -> String {
        match self {
            Pattern::Literal(value) => format!("value {}", value),
            Pattern::TypeMatch(example) => format!("any {}", ValueKind::of(example)),
            Pattern::RegexMatch { regex, .. } => format!("string matching /{}/", regex),
            Pattern::Composite(Composite::Map(fields)) => {
                let keys: Vec<&str> = fields.keys().map(String::as_str).collect();
                format!("mapping with keys [{}]", keys.join(", "))
            }
            Pattern::Composite(Composite::Seq(items)) => {
                format!("sequence of {} items", items.len())
            }
        }
    }

    /// Whether every value this pattern accepts is a string.
    pub fn is_string_pattern(&self) -> bool {
        match self {
            Pattern::Literal(value) | Pattern::TypeMatch(value) => value.is_string(),
            Pattern::RegexMatch { .. } => true,
            Pattern::Composite(_) => false,
        }
    }

    /// Check that every regex compiles and the example satisfies the pattern.
    pub fn validate(&self) -> Result<(), String> {
        self.check_regexes()?;
        match crate::matcher::explain(self, &self.example()) {
            None => Ok(()),
            Some(mismatch) => Err(format!(
                "example does not satisfy its own pattern ({})",
                mismatch
            )),
        }
    }

    fn check_regexes(&self) -> Result<(), String> {
        match self {
            Pattern::RegexMatch { regex, .. } => anchored_regex(regex)
                .map(|_| ())
                .map_err(|e| format!("invalid regex /{}/: {}", regex, e)),
            Pattern::Composite(Composite::Map(fields)) => {
                fields.values().try_for_each(Pattern::check_regexes)
            }
            Pattern::Composite(Composite::Seq(items)) => {
                items.iter().try_for_each(Pattern::check_regexes)
            }
            Pattern::Literal(_) | Pattern::TypeMatch(_) => Ok(()),
        }
    }
}

impl From<&str> for Pattern {
    fn from(value: &str) -> Self {
        Pattern::literal(value)
    }
}

/// Compile `regex` so that it must match the whole input.
pub(crate) fn anchored_regex(regex: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{})$", regex))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn butter_info() -> Pattern {
        Pattern::object([
            ("salt", Pattern::term(r"\d+(\.\d+)?%", "0%")),
            ("lactose", Pattern::like(false)),
        ])
    }

    #[test]
    fn test_example_generation() {
        assert_eq!(butter_info().example(), json!({"salt": "0%", "lactose": false}));
        assert_eq!(
            Pattern::array([Pattern::literal(1), Pattern::like("x")]).example(),
            json!([1, "x"])
        );
    }

    #[test]
    fn test_validate_accepts_consistent_patterns() {
        assert!(butter_info().validate().is_ok());
        assert!(Pattern::literal("bread and butter").validate().is_ok());
        assert!(Pattern::shape_of(json!({"a": [1, {"b": null}]})).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_example_outside_regex() {
        let err = Pattern::term(r"\d+%", "salty").validate().unwrap_err();
        assert!(err.contains("example does not satisfy"), "{}", err);
    }

    #[test]
    fn test_validate_rejects_invalid_regex() {
        let nested = Pattern::object([("bad", Pattern::term("(unclosed", "x"))]);
        let err = nested.validate().unwrap_err();
        assert!(err.contains("invalid regex"), "{}", err);
    }

    #[test]
    fn test_shape_of_builds_type_leaves() {
        let pattern = Pattern::shape_of(json!({"lactose": false, "tags": ["a"]}));
        match pattern {
            Pattern::Composite(Composite::Map(fields)) => {
                assert_eq!(fields["lactose"], Pattern::TypeMatch(json!(false)));
                assert_eq!(
                    fields["tags"],
                    Pattern::Composite(Composite::Seq(vec![Pattern::TypeMatch(json!("a"))]))
                );
            }
            other => panic!("Expected mapping, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_tagged_yaml() {
        let yaml = r#"
match: composite
value:
  salt:
    match: regex
    value:
      regex: '\d+(\.\d+)?%'
      example: 0%
  lactose:
    match: type
    value: false
"#;
        let pattern: Pattern = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(pattern, butter_info());
    }

    #[test]
    fn test_is_string_pattern() {
        assert!(Pattern::literal("2").is_string_pattern());
        assert!(Pattern::like("toast").is_string_pattern());
        assert!(Pattern::term(r"\d+", "2").is_string_pattern());
        assert!(!Pattern::literal(2).is_string_pattern());
        assert!(!Pattern::like(false).is_string_pattern());
        assert!(!butter_info().is_string_pattern());
    }

    #[test]
    fn test_describe() {
        assert_eq!(Pattern::like(3).describe(), "any number");
        assert_eq!(Pattern::term("a+", "a").describe(), "string matching /a+/");
        assert_eq!(butter_info().describe(), "mapping with keys [lactose, salt]");
    }
}
