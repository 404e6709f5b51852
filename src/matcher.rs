//! Pattern matching.
//!
//! Decides whether an actual value satisfies a [`Pattern`]. Matching never
//! fails: problems are reported as [`Mismatch`] records.

use crate::pattern::{anchored_regex, Composite, Pattern, ValueKind};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::fmt;

/// A single discrepancy between a pattern and an actual value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mismatch {
    /// Field path, e.g. `$.body.salt` or `$.body.items[2]`
    pub path: String,
    /// What the pattern expected
    pub expected: String,
    /// What was actually found
    pub actual: Value,
}

impl Mismatch {
    pub fn new(path: impl Into<String>, expected: impl Into<String>, actual: Value) -> Self {
        Self {
            path: path.into(),
            expected: expected.into(),
            actual,
        }
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: expected {}, got {}", self.path, self.expected, self.actual)
    }
}

/// Whether `actual` satisfies `pattern`.
pub fn matches(pattern: &Pattern, actual: &Value) -> bool {
    explain(pattern, actual).is_none()
}

/// The first mismatch, if any.
pub fn explain(pattern: &Pattern, actual: &Value) -> Option<Mismatch> {
    explain_at(pattern, actual, "$")
}

/// The first mismatch, with field paths rooted at `root`.
pub fn explain_at(pattern: &Pattern, actual: &Value, root: &str) -> Option<Mismatch> {
    let mut walk = Walk::new(true);
    walk.check(pattern, actual, root);
    walk.mismatches.into_iter().next()
}

/// Every mismatch.
pub fn mismatches(pattern: &Pattern, actual: &Value) -> Vec<Mismatch> {
    mismatches_at(pattern, actual, "$")
}

/// Every mismatch, with field paths rooted at `root`.
pub fn mismatches_at(pattern: &Pattern, actual: &Value, root: &str) -> Vec<Mismatch> {
    let mut walk = Walk::new(false);
    walk.check(pattern, actual, root);
    walk.mismatches
}

struct Walk {
    first_only: bool,
    mismatches: Vec<Mismatch>,
}

impl Walk {
    fn new(first_only: bool) -> Self {
        Self {
            first_only,
            mismatches: Vec::new(),
        }
    }

    fn done(&self) -> bool {
        self.first_only && !self.mismatches.is_empty()
    }

    fn fail(&mut self, path: &str, expected: String, actual: &Value) {
        self.mismatches.push(Mismatch::new(path, expected, actual.clone()));
    }

    fn check(&mut self, pattern: &Pattern, actual: &Value, path: &str) {
        if self.done() {
            return;
        }

        match pattern {
            Pattern::Literal(expected) => {
                if !values_equal(expected, actual) {
                    self.fail(path, pattern.describe(), actual);
                }
            }
            Pattern::TypeMatch(example) => {
                if ValueKind::of(example) != ValueKind::of(actual) {
                    self.fail(path, pattern.describe(), actual);
                }
            }
            Pattern::RegexMatch { regex, .. } => {
                let Value::String(text) = actual else {
                    self.fail(path, pattern.describe(), actual);
                    return;
                };
                match anchored_regex(regex) {
                    Ok(re) if re.is_match(text) => {}
                    Ok(_) => self.fail(path, pattern.describe(), actual),
                    Err(e) => self.fail(path, format!("valid regex /{}/ ({})", regex, e), actual),
                }
            }
            Pattern::Composite(Composite::Map(fields)) => {
                let Value::Object(object) = actual else {
                    self.fail(path, pattern.describe(), actual);
                    return;
                };
                for (key, sub) in fields {
                    let child = format!("{}.{}", path, key);
                    match object.get(key) {
                        Some(value) => self.check(sub, value, &child),
                        None => self.fail(
                            &child,
                            format!("key present with {}", sub.describe()),
                            &Value::Null,
                        ),
                    }
                    if self.done() {
                        return;
                    }
                }
            }
            Pattern::Composite(Composite::Seq(items)) => {
                let Value::Array(values) = actual else {
                    self.fail(path, pattern.describe(), actual);
                    return;
                };
                if values.len() != items.len() {
                    self.fail(path, pattern.describe(), actual);
                }
                for (i, (sub, value)) in items.iter().zip(values).enumerate() {
                    self.check(sub, value, &format!("{}[{}]", path, i));
                    if self.done() {
                        return;
                    }
                }
            }
        }
    }
}

/// Structural equality; an integer equals a float only if the float is
/// exactly that integer, so `1` equals `1.0`.
fn values_equal(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Number(a), Value::Number(b)) => numbers_equal(a, b),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(k, v)| b.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => expected == actual,
    }
}

fn numbers_equal(a: &Number, b: &Number) -> bool {
    let float = |n: &Number| n.as_f64().filter(|_| n.is_f64());
    match (float(a), float(b)) {
        // Integers compare exactly, floats by IEEE equality.
        (Some(_), Some(_)) | (None, None) => a == b,
        (Some(x), None) => int_equals_float(b, x),
        (None, Some(y)) => int_equals_float(a, y),
    }
}

fn int_equals_float(int: &Number, float: f64) -> bool {
    if float.fract() != 0.0 {
        return false;
    }
    if let Some(u) = int.as_u64() {
        (0.0..18_446_744_073_709_551_616.0).contains(&float) && float as u64 == u
    } else if let Some(i) = int.as_i64() {
        (-9_223_372_036_854_775_808.0..9_223_372_036_854_775_808.0).contains(&float)
            && float as i64 == i
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn salt() -> Pattern {
        Pattern::term(r"\d+(\.\d+)?%", "0%")
    }

    #[test]
    fn test_literal_matching() {
        let pattern = Pattern::literal(json!({"a": [1, 2], "b": "x"}));
        assert!(matches(&pattern, &json!({"b": "x", "a": [1, 2]})));
        assert!(!matches(&pattern, &json!({"a": [1, 2], "b": "y"})));
        assert!(!matches(&pattern, &json!({"a": [1, 2], "b": "x", "c": 0})));
        assert!(!matches(&pattern, &json!({"a": [2, 1], "b": "x"})));

        assert!(matches(&Pattern::literal(1), &json!(1.0)));
        assert!(matches(&Pattern::literal(-3.0), &json!(-3)));
        assert!(!matches(&Pattern::literal(1), &json!(1.5)));
        assert!(!matches(&Pattern::literal("1"), &json!(1)));
    }

    #[test]
    fn test_literal_large_integers_compare_exactly() {
        let above_f64_precision = json!(9007199254740993u64);
        let neighbour = json!(9007199254740992u64);
        assert!(!matches(&Pattern::literal(above_f64_precision.clone()), &neighbour));
        assert!(!matches(&Pattern::literal(neighbour.clone()), &above_f64_precision));
        assert!(matches(&Pattern::literal(above_f64_precision.clone()), &above_f64_precision));

        // 2^53 as a float is exact, 2^53 + 1 is not representable.
        assert!(matches(&Pattern::literal(neighbour), &json!(9007199254740992.0)));
        assert!(!matches(&Pattern::literal(above_f64_precision), &json!(9007199254740992.0)));
        assert!(!matches(
            &Pattern::literal(json!(-9007199254740993i64)),
            &json!(-9007199254740992i64)
        ));
    }

    #[test]
    fn test_type_matching() {
        let pattern = Pattern::like(false);
        assert!(matches(&pattern, &json!(true)));
        assert!(!matches(&pattern, &json!("false")));
        assert!(!matches(&pattern, &Value::Null));

        assert!(matches(&Pattern::like(json!({"x": 1})), &json!({})));
        assert!(matches(&Pattern::like(json!([1])), &json!(["a", "b"])));
        assert!(matches(&Pattern::like(2.5), &json!(7)));
    }

    #[test]
    fn test_regex_matching_is_anchored() {
        assert!(matches(&salt(), &json!("12.5%")));
        assert!(matches(&salt(), &json!("0%")));
        assert!(!matches(&salt(), &json!("12.5")));
        assert!(!matches(&salt(), &json!("abc%")));
        assert!(!matches(&salt(), &json!("x12%")));
        assert!(!matches(&salt(), &json!(12)));
    }

    #[test]
    fn test_invalid_regex_is_a_mismatch() {
        let mismatch = explain(&Pattern::term("(", "x"), &json!("x")).unwrap();
        assert!(mismatch.expected.starts_with("valid regex"));
    }

    #[test]
    fn test_composite_map_ignores_extra_keys() {
        let pattern = Pattern::object([("salt", salt()), ("lactose", Pattern::like(false))]);
        assert!(matches(
            &pattern,
            &json!({"salt": "1.5%", "lactose": true, "brand": "Kerrygold"})
        ));
        assert!(!matches(&pattern, &json!({"salt": "1.5%"})));
        assert!(!matches(&pattern, &json!(["salt"])));
    }

    #[test]
    fn test_composite_seq_requires_same_length() {
        let pattern = Pattern::array([Pattern::like(1), Pattern::literal("b")]);
        assert!(matches(&pattern, &json!([9, "b"])));
        assert!(!matches(&pattern, &json!([9, "b", "c"])));
        assert!(!matches(&pattern, &json!(["9", "b"])));
    }

    #[test]
    fn test_explain_reports_first_mismatch_path() {
        let pattern = Pattern::object([("salt", salt()), ("lactose", Pattern::like(false))]);
        let mismatch = explain(&pattern, &json!({"salt": "lots", "lactose": "no"})).unwrap();
        assert_eq!(mismatch.path, "$.lactose");
        assert_eq!(mismatch.expected, "any boolean");
        assert_eq!(mismatch.actual, json!("no"));
    }

    #[test]
    fn test_mismatches_collects_everything() {
        let pattern = Pattern::object([
            ("salt", salt()),
            ("lactose", Pattern::like(false)),
            ("origin", Pattern::literal("IE")),
            ("tags", Pattern::array([Pattern::like("a")])),
        ]);
        let found = mismatches_at(
            &pattern,
            &json!({"salt": "lots", "lactose": "no", "tags": [1]}),
            "$.body",
        );
        let paths: Vec<&str> = found.iter().map(|m| m.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["$.body.lactose", "$.body.origin", "$.body.salt", "$.body.tags[0]"]
        );
        assert_eq!(found[1].expected, "key present with value \"IE\"");
    }

    #[test]
    fn test_mismatch_display() {
        let m = Mismatch::new("$.status", "status 200", json!(404));
        assert_eq!(m.to_string(), "$.status: expected status 200, got 404");
    }
}
