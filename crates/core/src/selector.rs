//! Label-selector parsing and the annotation `Filter` derived from it.
//!
//! Grammar (comma separated requirements, whitespace around tokens ignored):
//! `key`, `!key`, `key=value`, `key==value`, `key!=value`,
//! `key in (v1,v2)`, `key notin (v1,v2)`.

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;

const MAX_NAME_LEN: usize = 63;
const MAX_PREFIX_LEN: usize = 253;

static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9]$").expect("valid name regex"));
static PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$").expect("valid prefix regex")
});
static SET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\S+)\s+(in|notin)\s*\((.*)\)$").expect("valid set-based regex"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("empty requirement in selector {0:?}")]
    EmptyRequirement(String),
    #[error("unbalanced parentheses in selector {0:?}")]
    Unbalanced(String),
    #[error("invalid key {key:?}: {reason}")]
    InvalidKey { key: String, reason: &'static str },
    #[error("invalid value {value:?} for key {key:?}")]
    InvalidValue { key: String, value: String },
    #[error("operator '{op}' requires a non-empty value list for key {key:?}")]
    EmptyValueList { key: String, op: Operator },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Exists,
    DoesNotExist,
    Equals,
    NotEquals,
    In,
    NotIn,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::Exists => "exists",
            Operator::DoesNotExist => "!",
            Operator::Equals => "=",
            Operator::NotEquals => "!=",
            Operator::In => "in",
            Operator::NotIn => "notin",
        };
        f.write_str(s)
    }
}

/// A single `(key, operator, values)` selector term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub key: String,
    pub operator: Operator,
    pub values: SmallVec<[String; 2]>,
}

impl Requirement {
    pub fn exists(key: impl Into<String>) -> Self {
        Self { key: key.into(), operator: Operator::Exists, values: SmallVec::new() }
    }

    pub fn matches(&self, set: &BTreeMap<String, String>) -> bool {
        let got = set.get(&self.key);
        match self.operator {
            Operator::Exists => got.is_some(),
            Operator::DoesNotExist => got.is_none(),
            Operator::Equals | Operator::In => got.map(|v| self.values.iter().any(|w| w == v)).unwrap_or(false),
            Operator::NotEquals | Operator::NotIn => got.map(|v| !self.values.iter().any(|w| w == v)).unwrap_or(true),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operator {
            Operator::Exists => f.write_str(&self.key),
            Operator::DoesNotExist => write!(f, "!{}", self.key),
            Operator::Equals | Operator::NotEquals => {
                write!(f, "{}{}{}", self.key, self.operator, self.values.first().map(String::as_str).unwrap_or(""))
            }
            Operator::In | Operator::NotIn => write!(f, "{} {} ({})", self.key, self.operator, self.values.join(",")),
        }
    }
}

/// Parse a selector expression into its requirements, in source order.
pub fn parse(expr: &str) -> Result<Vec<Requirement>, SelectorError> {
    if expr.trim().is_empty() {
        return Ok(Vec::new());
    }
    split_top_level(expr)?
        .into_iter()
        .map(|term| parse_requirement(expr, term.trim()))
        .collect()
}

fn split_top_level(expr: &str) -> Result<Vec<&str>, SelectorError> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    for (i, ch) in expr.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(SelectorError::Unbalanced(expr.to_string()));
                }
            }
            ',' if depth == 0 => {
                out.push(&expr[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(SelectorError::Unbalanced(expr.to_string()));
    }
    out.push(&expr[start..]);
    Ok(out)
}

fn parse_requirement(expr: &str, term: &str) -> Result<Requirement, SelectorError> {
    if term.is_empty() {
        return Err(SelectorError::EmptyRequirement(expr.to_string()));
    }
    if let Some(rest) = term.strip_prefix('!') {
        let key = validate_key(rest.trim())?;
        return Ok(Requirement { key, operator: Operator::DoesNotExist, values: SmallVec::new() });
    }
    if let Some(caps) = SET_RE.captures(term) {
        let key = validate_key(&caps[1])?;
        let operator = if &caps[2] == "in" { Operator::In } else { Operator::NotIn };
        let inner = caps[3].trim();
        if inner.is_empty() {
            return Err(SelectorError::EmptyValueList { key, op: operator });
        }
        let values = inner
            .split(',')
            .map(|v| validate_value(&key, v.trim()))
            .collect::<Result<SmallVec<_>, _>>()?;
        return Ok(Requirement { key, operator, values });
    }
    let (key, operator, value) = if let Some((k, v)) = term.split_once("!=") {
        (k, Operator::NotEquals, Some(v))
    } else if let Some((k, v)) = term.split_once("==") {
        (k, Operator::Equals, Some(v))
    } else if let Some((k, v)) = term.split_once('=') {
        (k, Operator::Equals, Some(v))
    } else {
        (term, Operator::Exists, None)
    };
    let key = validate_key(key.trim())?;
    let mut values = SmallVec::new();
    if let Some(v) = value {
        values.push(validate_value(&key, v.trim())?);
    }
    Ok(Requirement { key, operator, values })
}

fn validate_key(key: &str) -> Result<String, SelectorError> {
    let invalid = |reason| SelectorError::InvalidKey { key: key.to_string(), reason };
    let name = match key.split_once('/') {
        Some((prefix, name)) => {
            if prefix.is_empty() || prefix.len() > MAX_PREFIX_LEN || !PREFIX_RE.is_match(prefix) {
                return Err(invalid("prefix must be a DNS subdomain"));
            }
            name
        }
        None => key,
    };
    if name.is_empty() {
        return Err(invalid("name must not be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(invalid("name must be at most 63 characters"));
    }
    if !NAME_RE.is_match(name) {
        return Err(invalid("name must be alphanumeric, '-', '_' or '.', starting and ending alphanumeric"));
    }
    Ok(key.to_string())
}

fn validate_value(key: &str, value: &str) -> Result<String, SelectorError> {
    if value.is_empty() {
        return Ok(String::new());
    }
    if value.len() > MAX_NAME_LEN || !NAME_RE.is_match(value) {
        return Err(SelectorError::InvalidValue { key: key.to_string(), value: value.to_string() });
    }
    Ok(value.to_string())
}

/// Annotation filter: a conjunction of key-existence requirements.
///
/// Built from a user selector by rewriting every requirement to `key exists`,
/// so operators and values given by the user are not consulted when matching.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    requirements: Vec<Requirement>,
}

impl Filter {
    pub fn parse(expr: &str) -> Result<Self, SelectorError> {
        Ok(Self::from_requirements(parse(expr)?))
    }

    pub fn from_requirements(parsed: impl IntoIterator<Item = Requirement>) -> Self {
        let mut requirements: Vec<Requirement> = Vec::new();
        for req in parsed {
            if requirements.iter().any(|r| r.key == req.key) {
                continue;
            }
            requirements.push(Requirement::exists(req.key));
        }
        Self { requirements }
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    /// An empty filter matches every annotation set.
    pub fn matches(&self, annotations: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(annotations))
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.requirements.iter().map(ToString::to_string).collect();
        f.write_str(&parts.join(","))
    }
}
