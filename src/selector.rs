//! Label and field selectors
//!
//! Selector strings from the configuration are parsed once into
//! [`kube::core::Selector`], which renders the query string for
//! `ListParams::labels_from` and evaluates locally through
//! [`SelectorExt::matches`]. Parsing is strict: a string the API server
//! would read differently (`a>1`, `x in (a,)`) is rejected up front.
//!
//! Supported label-selector grammar, comma separated:
//!
//! - `key=value`, `key==value`, `key!=value`
//! - `key` (exists), `!key` (does not exist)
//! - `key in (a,b)`, `key notin (a,b)`
//!
//! Keys are qualified names (`[prefix/]name`), values are empty or valid
//! label values.

use std::collections::BTreeSet;
use std::fmt;

use k8s_openapi::api::core::v1::Pod;

pub use kube::core::{Expression, Selector, SelectorExt};

use crate::error::{Error, Result};

const MAX_NAME_LEN: usize = 63;
const MAX_PREFIX_LEN: usize = 253;

/// Parse a label selector string. An empty string selects everything.
pub fn parse_label_selector(selector: &str) -> Result<Selector> {
    if selector.trim().is_empty() {
        return Ok(Selector::default());
    }

    let mut expressions = Vec::new();
    for token in split_top_level(selector) {
        let token = token.trim();
        if token.is_empty() {
            return Err(invalid(selector, "empty requirement"));
        }
        expressions.push(parse_expression(selector, token)?);
    }
    Ok(expressions.into_iter().collect())
}

/// Field selector restricted to what the failover engine queries on
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldSelector {
    /// `spec.nodeName=<node>`
    NodeName(String),
}

impl FieldSelector {
    pub fn node_name(name: impl Into<String>) -> Self {
        FieldSelector::NodeName(name.into())
    }

    pub fn to_query(&self) -> String {
        match self {
            FieldSelector::NodeName(name) => format!("spec.nodeName={}", name),
        }
    }

    pub fn matches_pod(&self, pod: &Pod) -> bool {
        match self {
            FieldSelector::NodeName(name) => {
                pod.spec.as_ref().and_then(|s| s.node_name.as_deref()) == Some(name.as_str())
            }
        }
    }
}

impl fmt::Display for FieldSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query())
    }
}

fn invalid(selector: &str, reason: impl Into<String>) -> Error {
    Error::InvalidSelector {
        selector: selector.to_string(),
        reason: reason.into(),
    }
}

/// Split on commas that are not inside a `( ... )` value list
fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

/// `[A-Za-z0-9]` at both ends, `-_.` allowed inside, at most 63 characters
fn is_name_segment(s: &str) -> bool {
    s.len() <= MAX_NAME_LEN
        && s.starts_with(|c: char| c.is_ascii_alphanumeric())
        && s.ends_with(|c: char| c.is_ascii_alphanumeric())
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// RFC 1123 subdomain, used as the optional key prefix
fn is_dns_subdomain(s: &str) -> bool {
    let lower_alnum = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    !s.is_empty()
        && s.len() <= MAX_PREFIX_LEN
        && s.split('.').all(|label| {
            label.starts_with(lower_alnum)
                && label.ends_with(lower_alnum)
                && label.chars().all(|c| lower_alnum(c) || c == '-')
        })
}

fn is_qualified_name(key: &str) -> bool {
    match key.split_once('/') {
        Some((prefix, name)) => is_dns_subdomain(prefix) && is_name_segment(name),
        None => is_name_segment(key),
    }
}

fn validate_key(selector: &str, key: &str) -> Result<String> {
    let key = key.trim();
    if key.is_empty() {
        return Err(invalid(selector, "empty label key"));
    }
    if !is_qualified_name(key) {
        return Err(invalid(selector, format!("invalid label key {:?}", key)));
    }
    Ok(key.to_string())
}

fn validate_value(selector: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if !value.is_empty() && !is_name_segment(value) {
        return Err(invalid(selector, format!("invalid label value {:?}", value)));
    }
    Ok(value.to_string())
}

fn parse_expression(selector: &str, token: &str) -> Result<Expression> {
    if let Some(open) = token.find('(') {
        return parse_set_expression(selector, token, open);
    }

    if let Some(key) = token.strip_prefix('!') {
        return Ok(Expression::DoesNotExist(validate_key(selector, key)?));
    }

    if let Some((key, value)) = token.split_once("!=") {
        return Ok(Expression::NotEqual(
            validate_key(selector, key)?,
            validate_value(selector, value)?,
        ));
    }

    if let Some((key, value)) = token.split_once("==").or_else(|| token.split_once('=')) {
        return Ok(Expression::Equal(
            validate_key(selector, key)?,
            validate_value(selector, value)?,
        ));
    }

    Ok(Expression::Exists(validate_key(selector, token)?))
}

fn parse_set_expression(selector: &str, token: &str, open: usize) -> Result<Expression> {
    let head: Vec<&str> = token[..open].split_whitespace().collect();
    let (key, op) = match head.as_slice() {
        [key, op] => (validate_key(selector, key)?, *op),
        _ => {
            return Err(invalid(
                selector,
                format!("expected `<key> in|notin (...)`, got {:?}", token),
            ))
        }
    };

    let inner = token[open + 1..]
        .trim_end()
        .strip_suffix(')')
        .ok_or_else(|| invalid(selector, format!("unterminated value list in {:?}", token)))?;

    let mut values = BTreeSet::new();
    for raw in inner.split(',') {
        let value = validate_value(selector, raw)?;
        if value.is_empty() {
            return Err(invalid(
                selector,
                format!("empty entry in value list for key {:?}", key),
            ));
        }
        values.insert(value);
    }

    match op {
        "in" => Ok(Expression::In(key, values)),
        "notin" => Ok(Expression::NotIn(key, values)),
        other => Err(invalid(selector, format!("unknown set operator {:?}", other))),
    }
}
