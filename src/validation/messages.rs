//! Messages shown next to invalid fields

use std::collections::HashMap;

use serde_json::Value;

use super::constraints::{Constraint, ConstraintKind};

/// Placeholder replaced by the constraint parameter
const PARAM: &str = "{param}";

const INVALID: &str = "Please enter a valid value for this field.";

/// Message templates keyed by constraint
#[derive(Clone, Debug, PartialEq)]
pub struct Messages {
    templates: HashMap<ConstraintKind, String>,
    fallback: String,
}

impl Default for Messages {
    fn default() -> Self {
        let templates = [
            (ConstraintKind::Equal, "This field must be equal to the previous field."),
            (ConstraintKind::Optional, "This field is required"),
            (ConstraintKind::Max, "Please enter a value that's less than {param}."),
            (ConstraintKind::Min, "Please enter a value greater than {param}."),
        ]
        .into_iter()
        .map(|(kind, template)| (kind, template.to_string()))
        .collect();

        Self {
            templates,
            fallback: INVALID.to_string(),
        }
    }
}

impl Messages {
    /// A table with no per-constraint templates, only the catch-all
    pub fn empty() -> Self {
        Self {
            templates: HashMap::new(),
            fallback: INVALID.to_string(),
        }
    }

    /// Override the template of one constraint. `{param}` is interpolated.
    pub fn with(mut self, kind: ConstraintKind, template: impl Into<String>) -> Self {
        self.templates.insert(kind, template.into());
        self
    }

    pub fn with_fallback(mut self, template: impl Into<String>) -> Self {
        self.fallback = template.into();
        self
    }

    /// The message for a failed constraint, falling back to the catch-all
    pub fn resolve(&self, constraint: &Constraint) -> String {
        let Some(template) = self.templates.get(&constraint.kind()) else {
            return self.fallback.clone();
        };

        if !template.contains(PARAM) {
            return template.clone();
        }

        // A bound that never parsed has nothing to show
        let param = match constraint.param() {
            Value::Null => return self.fallback.clone(),
            Value::String(s) => s,
            Value::Number(n) => format_number(n.as_f64()),
            other => other.to_string(),
        };

        template.replace(PARAM, &param)
    }
}

fn format_number(n: Option<f64>) -> String {
    match n {
        Some(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", n as i64),
        Some(n) => n.to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_messages() {
        let messages = Messages::default();
        assert_eq!(
            messages.resolve(&Constraint::Min(Some(18.0))),
            "Please enter a value greater than 18."
        );
        assert_eq!(
            messages.resolve(&Constraint::Max(Some(2.5))),
            "Please enter a value that's less than 2.5."
        );
        assert_eq!(messages.resolve(&Constraint::Optional(false)), "This field is required");
    }

    #[test]
    fn test_malformed_bound_uses_fallback() {
        let messages = Messages::default();
        assert_eq!(
            messages.resolve(&Constraint::Min(None)),
            "Please enter a valid value for this field."
        );
        assert_eq!(
            messages.resolve(&Constraint::Max(None)),
            "Please enter a valid value for this field."
        );
    }

    #[test]
    fn test_custom_messages_fall_back() {
        let messages = Messages::empty()
            .with(ConstraintKind::Equal, "Must match {param}")
            .with_fallback("Nope");
        assert_eq!(messages.resolve(&Constraint::Equal("email".into())), "Must match email");
        assert_eq!(messages.resolve(&Constraint::Optional(false)), "Nope");
    }
}
