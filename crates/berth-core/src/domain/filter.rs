use std::fmt;

use serde_json::Value;
use thiserror::Error;

use super::Properties;

/// LDAP 風のターゲットフィルタ。`(&(objectClass=x)(rank=5))` のような式。
///
/// Supported forms: presence `(attr=*)`, equality `(attr=value)`,
/// conjunction `(&...)`, disjunction `(|...)` and negation `(!...)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Present(String),
    Eq(String, String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("unexpected end of filter expression")]
    UnexpectedEnd,
    #[error("unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),
    #[error("empty attribute name at position {0}")]
    EmptyKey(usize),
    #[error("empty composite filter at position {0}")]
    EmptyComposite(usize),
    #[error("trailing input after filter at position {0}")]
    TrailingInput(usize),
}

impl Filter {
    pub fn parse(input: &str) -> Result<Self, FilterError> {
        let mut parser = Parser::new(input);
        let filter = parser.filter()?;
        parser.skip_whitespace();
        if let Some((pos, _)) = parser.peek() {
            return Err(FilterError::TrailingInput(pos));
        }
        Ok(filter)
    }

    /// Evaluates the filter against a property map. Array values match if
    /// any element matches; numbers and booleans compare by their canonical
    /// string form.
    pub fn matches(&self, properties: &Properties) -> bool {
        match self {
            Filter::Present(key) => properties.contains_key(key),
            Filter::Eq(key, expected) => properties
                .get(key)
                .map(|value| value_matches(value, expected))
                .unwrap_or(false),
            Filter::And(parts) => parts.iter().all(|part| part.matches(properties)),
            Filter::Or(parts) => parts.iter().any(|part| part.matches(properties)),
            Filter::Not(inner) => !inner.matches(properties),
        }
    }

    /// Collapses a set of alternatives into one filter.
    pub fn any_of(mut parts: Vec<Filter>) -> Filter {
        if parts.len() == 1 {
            parts.remove(0)
        } else {
            Filter::Or(parts)
        }
    }
}

fn value_matches(value: &Value, expected: &str) -> bool {
    match value {
        Value::String(s) => s == expected,
        Value::Array(items) => items.iter().any(|item| value_matches(item, expected)),
        Value::Number(n) => n.to_string() == expected,
        Value::Bool(b) => b.to_string() == expected,
        _ => false,
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Present(key) => write!(f, "({key}=*)"),
            Filter::Eq(key, value) => write!(f, "({key}={value})"),
            Filter::And(parts) => {
                write!(f, "(&")?;
                for part in parts {
                    write!(f, "{part}")?;
                }
                write!(f, ")")
            }
            Filter::Or(parts) => {
                write!(f, "(|")?;
                for part in parts {
                    write!(f, "{part}")?;
                }
                write!(f, ")")
            }
            Filter::Not(inner) => write!(f, "(!{inner})"),
        }
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<(usize, char)> {
        self.chars.get(self.pos).map(|ch| (self.pos, *ch))
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.chars.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some((_, ch)) if ch.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), FilterError> {
        match self.bump() {
            Some(ch) if ch == expected => Ok(()),
            Some(ch) => Err(FilterError::UnexpectedChar(ch, self.pos - 1)),
            None => Err(FilterError::UnexpectedEnd),
        }
    }

    fn filter(&mut self) -> Result<Filter, FilterError> {
        self.skip_whitespace();
        self.expect('(')?;
        let filter = match self.peek() {
            Some((_, '&')) => {
                self.pos += 1;
                Filter::And(self.operands()?)
            }
            Some((_, '|')) => {
                self.pos += 1;
                Filter::Or(self.operands()?)
            }
            Some((_, '!')) => {
                self.pos += 1;
                Filter::Not(Box::new(self.filter()?))
            }
            Some(_) => self.comparison()?,
            None => return Err(FilterError::UnexpectedEnd),
        };
        self.expect(')')?;
        Ok(filter)
    }

    fn operands(&mut self) -> Result<Vec<Filter>, FilterError> {
        let start = self.pos;
        let mut parts = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some((_, '(')) => parts.push(self.filter()?),
                Some((_, ')')) => break,
                Some((pos, ch)) => return Err(FilterError::UnexpectedChar(ch, pos)),
                None => return Err(FilterError::UnexpectedEnd),
            }
        }
        if parts.is_empty() {
            return Err(FilterError::EmptyComposite(start));
        }
        Ok(parts)
    }

    fn comparison(&mut self) -> Result<Filter, FilterError> {
        let key_start = self.pos;
        let mut key = String::new();
        loop {
            match self.peek() {
                Some((_, '=')) => {
                    self.pos += 1;
                    break;
                }
                Some((pos, ch)) if ch == '(' || ch == ')' => {
                    return Err(FilterError::UnexpectedChar(ch, pos));
                }
                Some((_, ch)) => {
                    key.push(ch);
                    self.pos += 1;
                }
                None => return Err(FilterError::UnexpectedEnd),
            }
        }
        let key = key.trim().to_string();
        if key.is_empty() {
            return Err(FilterError::EmptyKey(key_start));
        }
        let mut value = String::new();
        loop {
            match self.peek() {
                Some((_, ')')) => break,
                Some((pos, ch)) if ch == '(' => {
                    return Err(FilterError::UnexpectedChar(ch, pos));
                }
                Some((_, ch)) => {
                    value.push(ch);
                    self.pos += 1;
                }
                None => return Err(FilterError::UnexpectedEnd),
            }
        }
        if value == "*" {
            Ok(Filter::Present(key))
        } else {
            Ok(Filter::Eq(key, value))
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn props(pairs: &[(&str, Value)]) -> Properties {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn parses_equality() {
        let filter = Filter::parse("(objectClass=demo.Greeter)").unwrap();
        assert_eq!(
            filter,
            Filter::Eq("objectClass".into(), "demo.Greeter".into())
        );
    }

    #[test]
    fn parses_presence() {
        assert_eq!(Filter::parse("(rank=*)").unwrap(), Filter::Present("rank".into()));
    }

    #[test]
    fn parses_nested_composite() {
        let filter = Filter::parse("(&(objectClass=x)(|(a=1)(b=2))(!(c=3)))").unwrap();
        match filter {
            Filter::And(parts) => assert_eq!(parts.len(), 3),
            other => panic!("expected conjunction, got {other:?}"),
        }
    }

    #[rstest]
    #[case("")]
    #[case("(")]
    #[case("()")]
    #[case("(=v)")]
    #[case("(&)")]
    #[case("(a=b)(c=d)")]
    #[case("(a=b")]
    fn rejects_malformed(#[case] input: &str) {
        assert!(Filter::parse(input).is_err());
    }

    #[test]
    fn equality_matches_scalars_and_arrays() {
        let filter = Filter::parse("(objectClass=demo.Greeter)").unwrap();
        assert!(filter.matches(&props(&[("objectClass", json!(["demo.Greeter", "other"]))])));
        assert!(filter.matches(&props(&[("objectClass", json!("demo.Greeter"))])));
        assert!(!filter.matches(&props(&[("objectClass", json!("other"))])));
    }

    #[test]
    fn numbers_match_by_canonical_form() {
        let filter = Filter::parse("(service.ranking=5)").unwrap();
        assert!(filter.matches(&props(&[("service.ranking", json!(5))])));
        assert!(!filter.matches(&props(&[("service.ranking", json!(50))])));
    }

    #[test]
    fn composite_evaluation() {
        let filter = Filter::parse("(&(a=1)(!(b=2)))").unwrap();
        assert!(filter.matches(&props(&[("a", json!("1"))])));
        assert!(!filter.matches(&props(&[("a", json!("1")), ("b", json!("2"))])));
    }

    #[test]
    fn display_round_trips() {
        let source = "(&(objectClass=x)(|(a=1)(b=*)))";
        let filter = Filter::parse(source).unwrap();
        assert_eq!(filter.to_string(), source);
        assert_eq!(Filter::parse(&filter.to_string()).unwrap(), filter);
    }

    #[test]
    fn any_of_collapses_singleton() {
        let single = Filter::any_of(vec![Filter::Present("a".into())]);
        assert_eq!(single, Filter::Present("a".into()));
        let multi = Filter::any_of(vec![
            Filter::Present("a".into()),
            Filter::Present("b".into()),
        ]);
        assert!(matches!(multi, Filter::Or(_)));
    }
}
