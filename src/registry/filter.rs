//! # Property filters.
//!
//! A [`Filter`] is a conjunction of exact-match clauses written in the usual
//! parenthesized form:
//!
//! ```text
//! (type=artemis)
//! (&(objectClass=ConnectionFactory)(type=artemis))
//! ```
//!
//! Whitespace between clauses is ignored; keys and values are taken verbatim.
//! An empty conjunction `(&)` matches everything.

use std::fmt;
use std::str::FromStr;

use crate::error::LifecycleError;
use crate::properties::{Properties, TYPE_KEY};

/// Conjunction of `(key=value)` clauses.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Filter {
    clauses: Vec<(String, String)>,
}

impl Filter {
    /// A filter that matches every property map.
    pub fn any() -> Self {
        Self::default()
    }

    /// A single `(key=value)` clause.
    pub fn eq(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            clauses: vec![(key.into(), value.into())],
        }
    }

    /// Matches providers published under `type_tag`.
    pub fn type_tag(type_tag: &str) -> Self {
        Self::eq(TYPE_KEY, type_tag)
    }

    /// Adds a clause.
    pub fn and(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.clauses.push((key.into(), value.into()));
        self
    }

    /// Conjunction of two filters.
    pub fn and_filter(mut self, other: &Filter) -> Self {
        self.clauses.extend(other.clauses.iter().cloned());
        self
    }

    /// Parses the textual form.
    ///
    /// Returns [`LifecycleError::Configuration`] on malformed syntax.
    pub fn parse(input: &str) -> Result<Self, LifecycleError> {
        Parser::new(input).parse()
    }

    pub fn clauses(&self) -> impl Iterator<Item = (&str, &str)> {
        self.clauses.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// True if every clause holds in `props`.
    pub fn matches(&self, props: &Properties) -> bool {
        self.clauses
            .iter()
            .all(|(k, v)| props.get(k) == Some(v.as_str()))
    }
}

impl FromStr for Filter {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Filter::parse(s)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.clauses.as_slice() {
            [(k, v)] => write!(f, "({k}={v})"),
            clauses => {
                f.write_str("(&")?;
                for (k, v) in clauses {
                    write!(f, "({k}={v})")?;
                }
                f.write_str(")")
            }
        }
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse(mut self) -> Result<Filter, LifecycleError> {
        self.skip_ws();
        let filter = if self.rest().starts_with("(&") {
            self.pos += 2;
            let mut clauses = Vec::new();
            loop {
                self.skip_ws();
                match self.peek() {
                    Some(')') => {
                        self.pos += 1;
                        break;
                    }
                    Some('(') => clauses.push(self.clause()?),
                    _ => return Err(self.error("expected '(' or ')' in conjunction")),
                }
            }
            Filter { clauses }
        } else {
            Filter {
                clauses: vec![self.clause()?],
            }
        };
        self.skip_ws();
        if self.pos != self.input.len() {
            return Err(self.error("trailing characters"));
        }
        Ok(filter)
    }

    fn clause(&mut self) -> Result<(String, String), LifecycleError> {
        if self.peek() != Some('(') {
            return Err(self.error("expected '('"));
        }
        self.pos += 1;
        let body_end = self
            .rest()
            .find(')')
            .ok_or_else(|| self.error("unterminated clause"))?;
        let body = &self.rest()[..body_end];
        if body.contains('(') {
            return Err(self.error("nested clause"));
        }
        let (key, value) = body
            .split_once('=')
            .ok_or_else(|| self.error("clause without '='"))?;
        let key = key.trim();
        if key.is_empty() || key.starts_with(['&', '|', '!']) {
            return Err(self.error("invalid clause key"));
        }
        self.pos += body_end + 1;
        Ok((key.to_string(), value.to_string()))
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.input.len() - trimmed.len();
    }

    fn error(&self, what: &str) -> LifecycleError {
        LifecycleError::config(format!(
            "malformed filter {:?} at offset {}: {what}",
            self.input, self.pos
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_and_conjunction() {
        let single = Filter::parse("(type=artemis)").unwrap();
        assert_eq!(single, Filter::eq("type", "artemis"));

        let conj = Filter::parse(" (&(objectClass=ConnectionFactoryFactory) (type=artemis)) ").unwrap();
        assert_eq!(
            conj,
            Filter::eq("objectClass", "ConnectionFactoryFactory").and("type", "artemis")
        );
        assert_eq!(
            conj.to_string(),
            "(&(objectClass=ConnectionFactoryFactory)(type=artemis))"
        );
    }

    #[test]
    fn test_empty_conjunction_matches_all() {
        let f = Filter::parse("(&)").unwrap();
        assert!(f.matches(&Properties::new()));
    }

    #[test]
    fn test_malformed_filters_are_configuration_errors() {
        for bad in ["", "type=x", "(type=x", "(typex)", "(&(a=b)", "(a=b)c", "((a=b))", "(=b)"] {
            let err = Filter::parse(bad).unwrap_err();
            assert_eq!(err.as_label(), "lifecycle_configuration", "input {bad:?}");
        }
    }

    #[test]
    fn test_matches_requires_every_clause() {
        let f = Filter::eq("pool", "narayana").and("xa", "true");
        let props = Properties::new().with("pool", "narayana").with("xa", "true");
        assert!(f.matches(&props));
        assert!(!f.matches(&props.clone().with("xa", "false")));
    }
}
