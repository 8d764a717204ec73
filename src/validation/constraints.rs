//! The constraint library
//!
//! Every constraint is a pure predicate over the raw values collected for one
//! field. Parameters are checked when a rule set is built, so an unknown
//! constraint name never reaches evaluation.

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

use super::{FieldValue, FieldValues, ValidationError};

/// Names of the supported constraints
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    Optional,
    Min,
    Max,
    Equal,
}

impl ConstraintKind {
    pub const ALL: [ConstraintKind; 4] = [
        ConstraintKind::Optional,
        ConstraintKind::Min,
        ConstraintKind::Max,
        ConstraintKind::Equal,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ConstraintKind::Optional => "optional",
            ConstraintKind::Min => "min",
            ConstraintKind::Max => "max",
            ConstraintKind::Equal => "equal",
        }
    }
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ConstraintKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConstraintKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| ValidationError::UnknownConstraint(s.to_string()))
    }
}

/// A constraint together with its parameter
#[derive(Clone, Debug, PartialEq)]
pub enum Constraint {
    /// `true` lets the field be left empty
    Optional(bool),

    /// Lower bound; `None` when the declared bound was not a finite number
    Min(Option<f64>),

    /// Upper bound; `None` when the declared bound was not a finite number
    Max(Option<f64>),

    /// Id of the field whose values must match
    Equal(String),
}

impl Constraint {
    /// Build a constraint from its declared name and JSON parameter
    pub fn parse(name: &str, param: &Value) -> Result<Self, ValidationError> {
        let kind: ConstraintKind = name.parse()?;

        Ok(match kind {
            ConstraintKind::Optional => Constraint::Optional(is_truthy(param)),
            ConstraintKind::Min => Constraint::Min(parse_bound(kind, param)),
            ConstraintKind::Max => Constraint::Max(parse_bound(kind, param)),
            ConstraintKind::Equal => match param {
                Value::String(target) if !target.is_empty() => Constraint::Equal(target.clone()),
                other => {
                    return Err(ValidationError::InvalidParameter {
                        constraint: kind.name().to_string(),
                        reason: format!("expected a field id, got {}", other),
                    })
                }
            },
        })
    }

    pub fn kind(&self) -> ConstraintKind {
        match self {
            Constraint::Optional(_) => ConstraintKind::Optional,
            Constraint::Min(_) => ConstraintKind::Min,
            Constraint::Max(_) => ConstraintKind::Max,
            Constraint::Equal(_) => ConstraintKind::Equal,
        }
    }

    /// The parameter as it is shown to respondents and written back to JSON
    pub fn param(&self) -> Value {
        match self {
            Constraint::Optional(optional) => Value::Bool(*optional),
            Constraint::Min(bound) | Constraint::Max(bound) => bound
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Constraint::Equal(target) => Value::String(target.clone()),
        }
    }

    /// Evaluate this constraint against one field's values.
    ///
    /// `all` is only consulted by cross-field constraints.
    pub fn evaluate(&self, values: &[String], all: &FieldValues) -> bool {
        match self {
            Constraint::Optional(optional) => check_optional(values, *optional),
            Constraint::Min(bound) => check_bound(values, *bound, |v, min| v >= min),
            Constraint::Max(bound) => check_bound(values, *bound, |v, max| v <= max),
            Constraint::Equal(target) => check_equal(values, target, all),
        }
    }
}

/// A field's constraints in declaration order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RuleSet {
    constraints: Vec<Constraint>,
}

impl RuleSet {
    pub fn new(constraints: Vec<Constraint>) -> Self {
        Self { constraints }
    }

    /// Parse a declared `validation` object, keeping the author's order.
    ///
    /// Keys listed in `ignore` (such as the stamped `type`) are skipped.
    pub fn from_map(map: &Map<String, Value>, ignore: &[&str]) -> Result<Self, ValidationError> {
        let constraints = map
            .iter()
            .filter(|(name, _)| !ignore.contains(&name.as_str()))
            .map(|(name, param)| Constraint::parse(name, param))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { constraints })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// The first constraint the values fail, if any
    pub fn first_failure(&self, values: &[String], all: &FieldValues) -> Option<&Constraint> {
        self.constraints
            .iter()
            .find(|constraint| !constraint.evaluate(values, all))
    }

    /// Ids of fields referenced by cross-field constraints
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.constraints.iter().filter_map(|constraint| match constraint {
            Constraint::Equal(target) => Some(target.as_str()),
            _ => None,
        })
    }

    pub fn to_map(&self) -> Map<String, Value> {
        self.constraints
            .iter()
            .map(|constraint| (constraint.kind().name().to_string(), constraint.param()))
            .collect()
    }
}

/// JavaScript-style truthiness of a JSON parameter
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn parse_bound(kind: ConstraintKind, param: &Value) -> Option<f64> {
    let bound = match param {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => parse_number(s),
        _ => None,
    };

    if bound.is_none() {
        log::warn!("Constraint '{}' has a non-numeric bound {}; it will always fail", kind, param);
    }

    bound
}

/// Parse a raw control value as a finite number
pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|f| f.is_finite())
}

fn check_optional(values: &[String], optional: bool) -> bool {
    if optional {
        return true;
    }

    !values.is_empty() && values.iter().all(|v| !v.is_empty())
}

fn check_bound(values: &[String], bound: Option<f64>, within: impl Fn(f64, f64) -> bool) -> bool {
    let Some(bound) = bound else {
        return false;
    };

    if values.is_empty() {
        return false;
    }

    values
        .iter()
        .all(|raw| parse_number(raw).map_or(false, |v| within(v, bound)))
}

fn check_equal(values: &[String], target: &str, all: &FieldValues) -> bool {
    match all.get(target) {
        Some(FieldValue::Skipped) => true,
        Some(FieldValue::Values(expected)) => {
            values.len() == expected.len()
                && values.iter().all(|v| expected.contains(v))
                && expected.iter().all(|v| values.contains(v))
        }
        None => {
            log::error!("Constraint 'equal' refers to unknown field '{}'", target);
            false
        }
    }
}
