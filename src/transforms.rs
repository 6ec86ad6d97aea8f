//! Text transformation primitives applied in sequence to extracted values.
//!
//! Transforms are pure: regexes are compiled once when the transform is built
//! and nothing is retained between calls. A chain never fails because data is
//! missing; absent input simply produces an empty list.

use crate::document::FieldValue;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Error type for transform construction and application
#[derive(Debug, Clone, PartialEq)]
pub enum TransformError {
    /// The pattern does not compile, or lacks the requested capture group.
    InvalidPattern { pattern: String, reason: String },
    /// A text transform was handed a value it cannot read as text.
    UnsupportedInput { transform: &'static str, found: &'static str },
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformError::InvalidPattern { pattern, reason } => {
                write!(f, "Invalid pattern '{}': {}", pattern, reason)
            }
            TransformError::UnsupportedInput { transform, found } => {
                write!(f, "Transform '{}' cannot be applied to a {} value", transform, found)
            }
        }
    }
}

impl std::error::Error for TransformError {}

/// Regex matching options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegexFlags {
    #[serde(default)]
    pub ignore_case: bool,
    /// `^` and `$` match at line boundaries.
    #[serde(default)]
    pub multi_line: bool,
    #[serde(default)]
    pub dot_matches_new_line: bool,
}

impl RegexFlags {
    /// No flags set.
    pub fn none() -> Self {
        Self::default()
    }

    /// Match case-insensitively.
    pub fn ignore_case(mut self) -> Self {
        self.ignore_case = true;
        self
    }

    /// Let `^` and `$` match at every line.
    pub fn multi_line(mut self) -> Self {
        self.multi_line = true;
        self
    }

    /// Let `.` match `\n`.
    pub fn dot_matches_new_line(mut self) -> Self {
        self.dot_matches_new_line = true;
        self
    }
}

/// Compile `pattern` with `flags`.
pub fn compile(pattern: &str, flags: RegexFlags) -> Result<Regex, TransformError> {
    RegexBuilder::new(pattern)
        .case_insensitive(flags.ignore_case)
        .multi_line(flags.multi_line)
        .dot_matches_new_line(flags.dot_matches_new_line)
        .build()
        .map_err(|e| TransformError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}

/// A single step of a transform chain.
#[derive(Debug, Clone)]
pub enum Transform {
    /// Capture `group` of each non-overlapping match (0 is the whole match);
    /// `max_matches == 0` means unlimited.
    Find { regex: Regex, group: usize, max_matches: usize },
    /// Literal split with trimming; empty tokens are dropped.
    Split { separator: String },
    /// Regex substitution; `limit == 0` replaces every match.
    Replace { regex: Regex, replacement: String, limit: usize },
    Lowercase,
    /// Member of an object value.
    Pluck { key: String },
    /// Remove lines matching `pattern`, from a text value or from the `field` member of an object.
    StripLines { field: String, pattern: Regex },
}

impl Transform {
    /// Find the first capture group of up to `max_matches` matches.
    ///
    /// Each match contributes at most one value, so `max_matches == 1` never
    /// yields more than one value.
    ///
    /// # Example
    /// ```
    /// use bibfields::{FieldValue, RegexFlags, Transform};
    ///
    /// let find = Transform::find(r"(?m)^shortDOI:\s*(\S+)$", RegexFlags::none(), 0).unwrap();
    /// let found = find.apply("shortDOI: 10/a\nshortDOI: 10/b".into()).unwrap();
    /// assert_eq!(found, FieldValue::strings(["10/a", "10/b"]));
    /// ```
    pub fn find(pattern: &str, flags: RegexFlags, max_matches: usize) -> Result<Self, TransformError> {
        Self::find_group(pattern, flags, 1, max_matches)
    }

    /// Like [`Transform::find`], selecting capture `group` (0 for the whole match).
    ///
    /// Fails if the pattern has fewer than `group` groups.
    pub fn find_group(
        pattern: &str,
        flags: RegexFlags,
        group: usize,
        max_matches: usize,
    ) -> Result<Self, TransformError> {
        let regex = compile(pattern, flags)?;
        if group >= regex.captures_len() {
            return Err(TransformError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: format!("no capture group {}", group),
            });
        }
        Ok(Transform::Find {
            regex,
            group,
            max_matches,
        })
    }

    /// Split on a literal separator.
    pub fn split(separator: impl Into<String>) -> Self {
        Transform::Split {
            separator: separator.into(),
        }
    }

    /// Replace up to `limit` matches of `pattern` (all when `limit` is 0).
    pub fn replace(
        pattern: &str,
        flags: RegexFlags,
        replacement: impl Into<String>,
        limit: usize,
    ) -> Result<Self, TransformError> {
        Ok(Transform::Replace {
            regex: compile(pattern, flags)?,
            replacement: replacement.into(),
            limit,
        })
    }

    /// Read member `key` of an object value.
    pub fn pluck(key: impl Into<String>) -> Self {
        Transform::Pluck { key: key.into() }
    }

    /// Drop lines matching `pattern` from text, or from member `field` of an object.
    pub fn strip_lines(field: impl Into<String>, pattern: &str, flags: RegexFlags) -> Result<Self, TransformError> {
        Ok(Transform::StripLines {
            field: field.into(),
            pattern: compile(pattern, flags)?,
        })
    }

    /// Name used in configuration and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Transform::Find { .. } => "find",
            Transform::Split { .. } => "split",
            Transform::Replace { .. } => "replace",
            Transform::Lowercase => "lowercase",
            Transform::Pluck { .. } => "pluck",
            Transform::StripLines { .. } => "strip_lines",
        }
    }

    /// Apply this transform to a value.
    ///
    /// Lists are transformed element by element and the results flattened in order.
    pub fn apply(&self, value: FieldValue) -> Result<FieldValue, TransformError> {
        match value {
            value if value.is_absent() => Ok(FieldValue::List(Vec::new())),
            FieldValue::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    self.apply(item)?.flatten_into(&mut out);
                }
                Ok(FieldValue::List(out))
            }
            value => self.apply_one(value),
        }
    }

    fn apply_one(&self, value: FieldValue) -> Result<FieldValue, TransformError> {
        match self {
            Transform::Find {
                regex,
                group,
                max_matches,
            } => {
                let text = self.text_of(&value)?;
                Ok(FieldValue::strings(find_all(regex, *group, &text, *max_matches)))
            }
            Transform::Split { separator } => {
                let text = self.text_of(&value)?;
                Ok(FieldValue::strings(split_trimmed(&text, separator)))
            }
            Transform::Replace {
                regex,
                replacement,
                limit,
            } => {
                let text = self.text_of(&value)?;
                Ok(FieldValue::String(
                    regex.replacen(&text, *limit, replacement.as_str()).into_owned(),
                ))
            }
            Transform::Lowercase => Ok(FieldValue::String(self.text_of(&value)?.to_lowercase())),
            Transform::Pluck { key } => match value {
                FieldValue::Object(obj) => {
                    Ok(obj.get(key).map(FieldValue::from_json).unwrap_or(FieldValue::Null))
                }
                other => Err(self.unsupported(&other)),
            },
            Transform::StripLines { field, pattern } => match value {
                FieldValue::Object(mut obj) => {
                    if let Some(Value::String(text)) = obj.get(field) {
                        let cleaned = strip_matching_lines(pattern, text);
                        obj.insert(field.clone(), Value::String(cleaned));
                    }
                    Ok(FieldValue::Object(obj))
                }
                FieldValue::String(text) => Ok(FieldValue::String(strip_matching_lines(pattern, &text))),
                other => Err(self.unsupported(&other)),
            },
        }
    }

    fn text_of(&self, value: &FieldValue) -> Result<String, TransformError> {
        match value {
            FieldValue::String(s) => Ok(s.clone()),
            FieldValue::Int(i) => Ok(i.to_string()),
            FieldValue::Float(f) => Ok(f.to_string()),
            other => Err(self.unsupported(other)),
        }
    }

    fn unsupported(&self, value: &FieldValue) -> TransformError {
        TransformError::UnsupportedInput {
            transform: self.name(),
            found: value.kind(),
        }
    }
}

/// Apply a chain left to right.
pub fn apply_chain(transforms: &[Transform], value: FieldValue) -> Result<FieldValue, TransformError> {
    transforms.iter().try_fold(value, |value, transform| transform.apply(value))
}

fn find_all(regex: &Regex, group: usize, text: &str, max_matches: usize) -> Vec<String> {
    let limit = if max_matches == 0 { usize::MAX } else { max_matches };
    regex
        .captures_iter(text)
        .take(limit)
        .filter_map(|caps| caps.get(group).map(|m| m.as_str().to_string()))
        .collect()
}

fn split_trimmed(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        let token = text.trim();
        return if token.is_empty() { Vec::new() } else { vec![token.to_string()] };
    }
    text.split(separator)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

// Kept lines retain their own terminators ("\n" or "\r\n").
fn strip_matching_lines(pattern: &Regex, text: &str) -> String {
    text.split_inclusive('\n')
        .filter(|line| !pattern.is_match(line.trim_end_matches(['\r', '\n'])))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const EXTRA: &str = "KerkoCite.ItemAlsoKnownAs: 10.1/abc 10.2/def\nEdTechHub.ItemAlsoKnownAs: foo; bar";

    fn im() -> RegexFlags {
        RegexFlags::none().ignore_case().multi_line()
    }

    #[test]
    fn test_find_first_match_only() {
        let find = Transform::find(r"(\d+)", RegexFlags::none(), 1).unwrap();
        let result = find.apply("a1 b22 c333".into()).unwrap();
        assert_eq!(result, FieldValue::strings(["1"]));
    }

    #[test]
    fn test_find_unlimited_in_document_order() {
        let find = Transform::find(r"^\s*shortDOI\s*:\s*(\S+)\s*$", im(), 0).unwrap();
        let text = "shortDOI: 10/aaa\nother: x\nSHORTDOI:10/bbb";
        let result = find.apply(text.into()).unwrap();
        assert_eq!(result, FieldValue::strings(["10/aaa", "10/bbb"]));
    }

    #[test]
    fn test_find_without_groups_returns_whole_match() {
        let find = Transform::find_group(r"\d{4}", RegexFlags::none(), 0, 0).unwrap();
        let result = find.apply("1999 and 2004".into()).unwrap();
        assert_eq!(result, FieldValue::strings(["1999", "2004"]));
    }

    #[test]
    fn test_find_takes_one_group_per_match() {
        let first = Transform::find(r"(\w+)=(\w+)", RegexFlags::none(), 1).unwrap();
        assert_eq!(first.apply("a=b c=d".into()).unwrap(), FieldValue::strings(["a"]));

        let values = Transform::find_group(r"(\w+)=(\w+)", RegexFlags::none(), 2, 0).unwrap();
        assert_eq!(values.apply("a=b c=d".into()).unwrap(), FieldValue::strings(["b", "d"]));

        let whole = Transform::find_group(r"(\w+)=(\w+)", RegexFlags::none(), 0, 1).unwrap();
        assert_eq!(whole.apply("a=b c=d".into()).unwrap(), FieldValue::strings(["a=b"]));
    }

    #[test]
    fn test_find_group_must_exist() {
        let err = Transform::find(r"\d{4}", RegexFlags::none(), 1).unwrap_err();
        assert!(matches!(err, TransformError::InvalidPattern { ref reason, .. } if reason.contains("group 1")));
    }

    #[test]
    fn test_find_no_match_is_empty() {
        let find = Transform::find(r"^\s*KerkoCite.ItemAlsoKnownAs\s*:\s*(.*)$", im(), 1).unwrap();
        let result = find.apply("nothing here".into()).unwrap();
        assert_eq!(result, FieldValue::List(vec![]));
    }

    #[test]
    fn test_find_is_rerunnable() {
        let find = Transform::find(r"(\w+)", RegexFlags::none(), 0).unwrap();
        let first = find.apply("a b".into()).unwrap();
        let second = find.apply("a b".into()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_split_trims_and_drops_empty() {
        let result = Transform::split(";").apply(" foo; ;bar ;".into()).unwrap();
        assert_eq!(result, FieldValue::strings(["foo", "bar"]));
    }

    #[test]
    fn test_find_then_split_flattens_per_match() {
        let chain = vec![
            Transform::find(r"^ids:\s*(.*)$", im(), 0).unwrap(),
            Transform::split(","),
        ];
        let text = "ids: a, b\nids: c\nids: a";
        let result = apply_chain(&chain, text.into()).unwrap();

        // 2 + 1 + 1 tokens, duplicates kept.
        assert_eq!(result, FieldValue::strings(["a", "b", "c", "a"]));
    }

    #[test]
    fn test_chain_on_absent_input() {
        let chain = vec![
            Transform::find(r"(.*)", RegexFlags::none(), 1).unwrap(),
            Transform::split(" "),
        ];
        assert_eq!(apply_chain(&chain, FieldValue::Null).unwrap(), FieldValue::List(vec![]));
        assert_eq!(apply_chain(&chain, "".into()).unwrap(), FieldValue::List(vec![]));
    }

    #[test]
    fn test_extra_field_rules() {
        let kerko = vec![
            Transform::find(r"^\s*KerkoCite.ItemAlsoKnownAs\s*:\s*(.*)$", im(), 1).unwrap(),
            Transform::split(" "),
        ];
        let edtech = vec![
            Transform::find(r"^\s*EdTechHub.ItemAlsoKnownAs\s*:\s*(.*)$", im(), 1).unwrap(),
            Transform::split(";"),
        ];

        assert_eq!(
            apply_chain(&kerko, EXTRA.into()).unwrap(),
            FieldValue::strings(["10.1/abc", "10.2/def"])
        );
        assert_eq!(
            apply_chain(&edtech, EXTRA.into()).unwrap(),
            FieldValue::strings(["foo", "bar"])
        );
    }

    #[test]
    fn test_replace_first_occurrence() {
        let chain = vec![
            Transform::replace(r"^<span>", RegexFlags::none(), r#"<div class="csl-entry">"#, 1).unwrap(),
            Transform::replace(r"</span>$", RegexFlags::none(), "</div>", 1).unwrap(),
        ];
        let result = apply_chain(&chain, "<span>Smith (2020)</span>".into()).unwrap();
        assert_eq!(result, FieldValue::from(r#"<div class="csl-entry">Smith (2020)</div>"#));
    }

    #[test]
    fn test_pluck_over_list_of_objects() {
        let creators = FieldValue::from_json(&json!([
            {"lastName": "Smith"},
            {"name": "UNESCO"},
            {"lastName": "Jones"}
        ]));
        let result = Transform::pluck("lastName").apply(creators).unwrap();
        assert_eq!(result, FieldValue::strings(["Smith", "Jones"]));
    }

    #[test]
    fn test_strip_lines_in_object_member() {
        let strip = Transform::strip_lines("extra", r"^\s*KerkoCite\.", RegexFlags::none().ignore_case()).unwrap();
        let data = FieldValue::from_json(&json!({"title": "T", "extra": "KerkoCite.ItemAlsoKnownAs: x\nPMID: 1"}));

        let result = strip.apply(data).unwrap();
        assert_eq!(result.to_json(), json!({"title": "T", "extra": "PMID: 1"}));
    }

    #[test]
    fn test_strip_lines_keeps_line_endings() {
        let strip = Transform::strip_lines("extra", r"^KerkoCite\.", RegexFlags::none()).unwrap();

        let crlf = strip.apply("PMID: 1\r\nKerkoCite.X: y\r\nNote: x\r\n".into()).unwrap();
        assert_eq!(crlf, FieldValue::from("PMID: 1\r\nNote: x\r\n"));

        let untouched = strip.apply("PMID: 1\r\nNote: x\r\n".into()).unwrap();
        assert_eq!(untouched, FieldValue::from("PMID: 1\r\nNote: x\r\n"));
    }

    #[test]
    fn test_text_transform_rejects_bool() {
        let err = Transform::split(",").apply(FieldValue::Bool(true)).unwrap_err();
        assert_eq!(
            err,
            TransformError::UnsupportedInput {
                transform: "split",
                found: "bool"
            }
        );
    }

    #[test]
    fn test_invalid_pattern() {
        let err = Transform::find("(unclosed", RegexFlags::none(), 1).unwrap_err();
        assert!(matches!(err, TransformError::InvalidPattern { .. }));
    }
}
