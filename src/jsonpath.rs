//! The subset of kubectl's JSONPath used by `wait_for` conditions.
//!
//! Supported: an optional `{...}` template wrapper and `$` root, `.field`, `['field']`,
//! `[index]` and equality filters such as `[?(@.type=="Ready")]`, which select the first
//! matching element.

use std::str::FromStr;

use serde_json::Value;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
#[error("invalid jsonpath {expression:?}: {reason}")]
pub struct JsonPathError {
    pub expression: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Field(String),
    Index(usize),
    Filter { path: Vec<String>, literal: Value },
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsonPath {
    segments: Vec<Segment>,
}

impl JsonPath {
    pub fn parse(expression: &str) -> Result<Self, JsonPathError> {
        Parser::new(expression).parse()
    }

    /// Returns the selected value, or `None` when any step is missing.
    pub fn resolve<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        self.segments.iter().try_fold(root, |current, segment| match segment {
            Segment::Field(name) => current.get(name),
            Segment::Index(index) => current.get(*index),
            Segment::Filter { path, literal } => current.as_array()?.iter().find(|item| {
                path.iter()
                    .try_fold(*item, |value, name| value.get(name))
                    .is_some_and(|value| text(value) == text(literal))
            }),
        })
    }
}

impl FromStr for JsonPath {
    type Err = JsonPathError;

    fn from_str(expression: &str) -> Result<Self, Self::Err> {
        Self::parse(expression)
    }
}

/// The text form kubectl prints for a value: strings unquoted, everything else as JSON.
pub fn text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

struct Parser<'a> {
    expression: &'a str,
    chars: Vec<char>,
    position: usize,
}

impl<'a> Parser<'a> {
    fn new(expression: &'a str) -> Self {
        let trimmed = expression.trim();
        let body = trimmed
            .strip_prefix('{')
            .and_then(|inner| inner.strip_suffix('}'))
            .unwrap_or(trimmed);
        let body = body.strip_prefix('$').unwrap_or(body);
        Self {
            expression,
            chars: body.chars().collect(),
            position: 0,
        }
    }

    fn parse(mut self) -> Result<JsonPath, JsonPathError> {
        let mut segments = Vec::new();

        if self.peek().is_some_and(|c| c != '.' && c != '[') {
            segments.push(Segment::Field(self.identifier()?));
        }

        while let Some(current) = self.peek() {
            match current {
                '.' => {
                    self.position += 1;
                    segments.push(Segment::Field(self.identifier()?));
                }
                '[' => {
                    self.position += 1;
                    segments.push(self.bracket()?);
                }
                other => return Err(self.error(format!("unexpected character {other:?}"))),
            }
        }

        if segments.is_empty() {
            return Err(self.error("empty path".to_owned()));
        }
        Ok(JsonPath { segments })
    }

    fn bracket(&mut self) -> Result<Segment, JsonPathError> {
        let segment = match self.peek() {
            Some(quote @ ('\'' | '"')) => {
                self.position += 1;
                Segment::Field(self.quoted(quote)?)
            }
            Some('?') => self.filter()?,
            Some(c) if c.is_ascii_digit() => {
                let digits = self.take_while(|c| c.is_ascii_digit());
                let index = digits
                    .parse()
                    .map_err(|_| self.error(format!("invalid index {digits}")))?;
                Segment::Index(index)
            }
            _ => return Err(self.error("expected a quoted name, an index or a filter".to_owned())),
        };
        self.expect(']')?;
        Ok(segment)
    }

    fn filter(&mut self) -> Result<Segment, JsonPathError> {
        self.expect('?')?;
        self.expect('(')?;
        self.expect('@')?;

        let mut path = Vec::new();
        while self.peek() == Some('.') {
            self.position += 1;
            path.push(self.identifier()?);
        }
        if path.is_empty() {
            return Err(self.error("filter must compare a field of @".to_owned()));
        }

        self.expect('=')?;
        self.expect('=')?;

        let literal = match self.peek() {
            Some(quote @ ('\'' | '"')) => {
                self.position += 1;
                Value::String(self.quoted(quote)?)
            }
            _ => {
                let raw = self.take_while(|c| c != ')');
                let raw = raw.trim();
                serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()))
            }
        };
        self.expect(')')?;

        Ok(Segment::Filter { path, literal })
    }

    fn identifier(&mut self) -> Result<String, JsonPathError> {
        let name = self.take_while(|c| !matches!(c, '.' | '[' | ']' | '=' | ')'));
        if name.is_empty() {
            return Err(self.error("expected a field name".to_owned()));
        }
        Ok(name)
    }

    fn quoted(&mut self, quote: char) -> Result<String, JsonPathError> {
        let text = self.take_while(|c| c != quote);
        self.expect(quote)?;
        Ok(text)
    }

    fn take_while(&mut self, predicate: impl Fn(char) -> bool) -> String {
        let start = self.position;
        while self.peek().is_some_and(&predicate) {
            self.position += 1;
        }
        self.chars[start..self.position].iter().collect()
    }

    fn expect(&mut self, expected: char) -> Result<(), JsonPathError> {
        match self.peek() {
            Some(c) if c == expected => {
                self.position += 1;
                Ok(())
            }
            Some(c) => Err(self.error(format!("expected {expected:?}, found {c:?}"))),
            None => Err(self.error(format!("expected {expected:?}, found end of path"))),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn error(&self, reason: String) -> JsonPathError {
        JsonPathError {
            expression: self.expression.to_owned(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn object() -> Value {
        json!({
            "metadata": { "name": "east", "labels": { "app.kubernetes.io/name": "hive" } },
            "status": {
                "installed": true,
                "replicas": 3,
                "phase": "Running",
                "conditions": [
                    { "type": "Hibernating", "status": "False" },
                    { "type": "Ready", "status": "True" }
                ]
            }
        })
    }

    #[rstest]
    #[case("{.status.phase}", Some("Running"))]
    #[case(".status.phase", Some("Running"))]
    #[case("$.status.phase", Some("Running"))]
    #[case("status.phase", Some("Running"))]
    #[case("{.status.installed}", Some("true"))]
    #[case("{.status.replicas}", Some("3"))]
    #[case("{.status.conditions[1].type}", Some("Ready"))]
    #[case("{.status.conditions[?(@.type==\"Ready\")].status}", Some("True"))]
    #[case("{.status.conditions[?(@.type=='Hibernating')].status}", Some("False"))]
    #[case("{.metadata.labels['app.kubernetes.io/name']}", Some("hive"))]
    #[case("{.status.conditions[?(@.type==\"Missing\")].status}", None)]
    #[case("{.status.conditions[7]}", None)]
    #[case("{.status.unknown}", None)]
    fn test_resolve(#[case] expression: &str, #[case] expected: Option<&str>) {
        let path = JsonPath::parse(expression).unwrap();

        let resolved = path.resolve(&object()).map(text);

        assert_eq!(resolved.as_deref(), expected);
    }

    #[test]
    fn test_filter_with_unquoted_literal() {
        let path: JsonPath = "{.items[?(@.size==2)].name}".parse().unwrap();
        let value = json!({ "items": [{ "size": 1, "name": "a" }, { "size": 2, "name": "b" }] });

        assert_eq!(path.resolve(&value), Some(&json!("b")));
    }

    #[rstest]
    #[case("")]
    #[case("{}")]
    #[case(".status.")]
    #[case(".status[")]
    #[case(".status[abc]")]
    #[case(".status.conditions[?(@.type)]")]
    #[case(".status.conditions[?(@==\"x\")]")]
    fn test_parse_rejects_malformed(#[case] expression: &str) {
        let result = JsonPath::parse(expression);

        assert!(result.is_err(), "{expression} should not parse");
    }

    #[test]
    fn test_error_display() {
        let error = JsonPath::parse(".status[abc]").unwrap_err();

        assert_eq!(
            error.to_string(),
            "invalid jsonpath \".status[abc]\": expected a quoted name, an index or a filter"
        );
    }

    #[test]
    fn test_text_of_complex_values_is_compact_json() {
        assert_eq!(text(&json!({ "a": [1, 2] })), "{\"a\":[1,2]}");
        assert_eq!(text(&Value::Null), "");
    }
}
