//! Dotted path queries over untyped JSON documents.
//!
//! A path is a sequence of dot separated segments. Each segment names a map
//! key and may carry an array selector: `items[]` selects every element and
//! `items[2]` selects one. Selecting every element of an intermediate array
//! maps the rest of the path over the elements and collects the results.
//!
//! ```text
//! items[].metadata.name      -> ["a", "b"]
//! items[1].status.ready      -> false
//! ```

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::{AnalysisError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// `name`
    Key(String),
    /// `name[]`
    Wildcard(String),
    /// `name[N]`
    Index(String, usize),
}

impl Step {
    fn key(&self) -> &str {
        match self {
            Step::Key(k) | Step::Wildcard(k) | Step::Index(k, _) => k,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Key(k) => f.write_str(k),
            Step::Wildcard(k) => write!(f, "{k}[]"),
            Step::Index(k, i) => write!(f, "{k}[{i}]"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JsonPath {
    steps: Vec<Step>,
}

impl JsonPath {
    pub fn parse(path: &str) -> Result<Self> {
        let path = path.trim();
        if path.is_empty() {
            return Ok(Self::default());
        }
        let steps = path
            .split('.')
            .map(parse_step)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn evaluate(&self, value: &Value) -> Result<Value> {
        evaluate(value, &self.steps)
    }
}

impl FromStr for JsonPath {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn parse_step(segment: &str) -> Result<Step> {
    let Some(open) = segment.find('[') else {
        if segment.contains(']') {
            return Err(invalid_path(segment));
        }
        return Ok(Step::Key(segment.to_string()));
    };
    let Some(inner) = segment[open + 1..].strip_suffix(']') else {
        return Err(invalid_path(segment));
    };
    let key = segment[..open].to_string();
    let inner = inner.trim();
    if inner.is_empty() {
        return Ok(Step::Wildcard(key));
    }
    if inner.starts_with('-') {
        return Err(AnalysisError::JsonQuery(format!(
            "negative array index in path segment {segment}"
        )));
    }
    let index = inner
        .parse::<usize>()
        .map_err(|_| invalid_path(segment))?;
    Ok(Step::Index(key, index))
}

fn invalid_path(segment: &str) -> AnalysisError {
    AnalysisError::JsonQuery(format!("invalid path segment {segment}"))
}

/// Parses `path` and evaluates it against `value`. An empty path returns the
/// whole document.
pub fn query(value: &Value, path: &str) -> Result<Value> {
    JsonPath::parse(path)?.evaluate(value)
}

fn evaluate(value: &Value, steps: &[Step]) -> Result<Value> {
    let Some((step, rest)) = steps.split_first() else {
        return Ok(value.clone());
    };

    // Map nodes are indexed by the step's key; array and scalar nodes are
    // already the selected node (this is how a path starting with `[]`
    // addresses a top level array).
    let current = match value {
        Value::Object(map) => {
            let key = step.key();
            if key.is_empty() {
                return Err(AnalysisError::JsonQuery(format!(
                    "no key given to select from a map at {step}"
                )));
            }
            match map.get(key) {
                Some(Value::Null) | None => {
                    return Err(AnalysisError::JsonQuery(format!("node not found: {key}")));
                }
                Some(v) => v,
            }
        }
        other => other,
    };

    if rest.is_empty() {
        return match (current, step) {
            (Value::Array(items), Step::Index(_, index)) => match items.get(*index) {
                Some(item) => Ok(item.clone()),
                None if items.is_empty() => Ok(Value::Null),
                None => Err(out_of_range(step, items.len())),
            },
            (other, _) => Ok(other.clone()),
        };
    }

    match current {
        Value::Array(items) => match step {
            Step::Index(_, index) => match items.get(*index) {
                Some(item) => evaluate_element(item, rest, step),
                None if items.is_empty() => Ok(Value::Null),
                None => Err(out_of_range(step, items.len())),
            },
            Step::Key(_) | Step::Wildcard(_) => items
                .iter()
                .map(|item| evaluate_element(item, rest, step))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
        },
        Value::Object(_) => evaluate(current, rest),
        _ => Err(AnalysisError::JsonQuery(format!(
            "{step} is not an intermediate type, remaining path {}",
            rest.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(".")
        ))),
    }
}

fn evaluate_element(item: &Value, rest: &[Step], step: &Step) -> Result<Value> {
    if !item.is_object() {
        return Err(AnalysisError::JsonQuery(format!(
            "array element under {step} is not a map"
        )));
    }
    evaluate(item, rest)
}

fn out_of_range(step: &Step, len: usize) -> AnalysisError {
    AnalysisError::JsonQuery(format!("index out of range at {step}, array length {len}"))
}

/// String at `path`, or `None` when the path is absent or not a string.
pub fn query_str(value: &Value, path: &str) -> Option<String> {
    match query(value, path).ok()? {
        Value::String(s) => Some(s),
        _ => None,
    }
}

/// Array at `path`, or an empty list when the path is absent.
pub fn query_array(value: &Value, path: &str) -> Vec<Value> {
    match query(value, path) {
        Ok(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}
