//! Validation configuration extracted from a schema
//!
//! The configuration is the compact form validation actually runs on: one
//! entry per validated field, holding the field's kind and its parsed rule
//! set. It is derived once per form and may also be published ahead of time
//! and loaded back with [`ValidationConfig::from_json`].

use indexmap::IndexMap;
use serde_json::{Map, Value};

use super::constraints::RuleSet;
use super::ValidationError;
use crate::schema::{Field, FieldKind, Schema};

/// Key the field kind is stamped under in the published JSON shape
const TYPE_KEY: &str = "type";

/// Validation settings for a single field
#[derive(Clone, Debug, PartialEq)]
pub struct FieldConfig {
    pub kind: FieldKind,
    pub rules: RuleSet,
}

/// Field id -> settings, in schema order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidationConfig {
    fields: IndexMap<String, FieldConfig>,
}

impl ValidationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, config: FieldConfig) {
        self.fields.insert(id.into(), config);
    }

    pub fn get(&self, id: &str) -> Option<&FieldConfig> {
        self.fields.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldConfig)> {
        self.fields.iter().map(|(id, config)| (id.as_str(), config))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Load a published configuration: `{ id: { constraint: param, ..., "type": kind } }`
    pub fn from_json(value: &Value) -> Result<Self, ValidationError> {
        let object = value
            .as_object()
            .ok_or_else(|| ValidationError::Malformed("expected an object".into()))?;

        let mut config = Self::new();
        for (id, rules) in object {
            let rules = rules.as_object().ok_or_else(|| {
                ValidationError::Malformed(format!("rules for '{}' are not an object", id))
            })?;

            let kind = match rules.get(TYPE_KEY) {
                Some(kind) => serde_json::from_value(kind.clone())
                    .map_err(|e| ValidationError::Malformed(format!("{}: {}", id, e)))?,
                None => FieldKind::Custom,
            };

            config.insert(
                id.clone(),
                FieldConfig {
                    kind,
                    rules: RuleSet::from_map(rules, &[TYPE_KEY])?,
                },
            );
        }

        Ok(config)
    }

    /// The published JSON shape, with each field's kind stamped into its rules
    pub fn to_json(&self) -> Value {
        let fields: Map<String, Value> = self
            .fields
            .iter()
            .map(|(id, config)| {
                let mut rules = config.rules.to_map();
                rules.insert(TYPE_KEY.into(), Value::String(config.kind.as_str().into()));
                (id.clone(), Value::Object(rules))
            })
            .collect();

        Value::Object(fields)
    }
}

fn field_config(field: &Field) -> Result<Option<(String, FieldConfig)>, ValidationError> {
    let Some(validation) = &field.validation else {
        return Ok(None);
    };

    let id = field.id.clone().ok_or(ValidationError::MissingFieldId)?;
    let config = FieldConfig {
        kind: field.kind(),
        rules: RuleSet::from_map(validation, &[TYPE_KEY])?,
    };

    Ok(Some((id, config)))
}

/// Derive the validation configuration of a schema.
///
/// Returns `None` for a schema without fields. Every top-level field that
/// declares `validation` gets an entry; so does every row of a matrix, since
/// matrix rows are answered independently.
pub fn extract(schema: &Schema) -> Result<Option<ValidationConfig>, ValidationError> {
    if schema.is_empty() {
        return Ok(None);
    }

    let mut config = ValidationConfig::new();
    for field in schema.answerable() {
        if let Some((id, field_config)) = field_config(field)? {
            config.insert(id, field_config);
        }
    }

    Ok(Some(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::constraints::{Constraint, ConstraintKind};
    use serde_json::json;

    fn age_schema() -> Schema {
        Schema::new(vec![
            Field::new("name", FieldKind::Text),
            Field::new("age", FieldKind::Number)
                .with_validation(json!({"optional": false, "min": 18, "max": 65})),
        ])
        .unwrap()
    }

    #[test]
    fn test_extract_only_validated_fields() {
        let config = extract(&age_schema()).unwrap().unwrap();
        assert_eq!(config.len(), 1);

        let age = config.get("age").unwrap();
        assert_eq!(age.kind, FieldKind::Number);
        let kinds: Vec<_> = age.rules.iter().map(Constraint::kind).collect();
        assert_eq!(
            kinds,
            vec![ConstraintKind::Optional, ConstraintKind::Min, ConstraintKind::Max]
        );
    }

    #[test]
    fn test_extract_empty_schema() {
        assert_eq!(extract(&Schema::default()).unwrap(), None);
    }

    #[test]
    fn test_extract_matrix_rows() {
        let schema = Schema::new(vec![Field::new("m", FieldKind::Matrix)
            .with_validation(json!({"optional": false}))
            .with_row(Field::new("m-1", FieldKind::Radio))
            .with_row(Field::new("m-2", FieldKind::Radio))])
        .unwrap();

        let config = extract(&schema).unwrap().unwrap();
        let ids: Vec<_> = config.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["m-1", "m-2"]);
    }

    #[test]
    fn test_extract_matrix_rows_without_ids() {
        let schema = Schema::from_value(json!({
            "fields": [{
                "id": "likert",
                "type": "matrix",
                "validation": {"optional": false},
                "rows": [{"html": "Row A"}, {"html": "Row B"}]
            }]
        }))
        .unwrap();

        let config = extract(&schema).unwrap().unwrap();
        let ids: Vec<_> = config.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["likert:1", "likert:2"]);
    }

    #[test]
    fn test_extract_rejects_unknown_constraint() {
        let schema = Schema::new(vec![
            Field::new("q", FieldKind::Text).with_validation(json!({"pattern": "[a-z]+"}))
        ])
        .unwrap();
        assert_eq!(
            extract(&schema),
            Err(ValidationError::UnknownConstraint("pattern".into()))
        );
    }

    #[test]
    fn test_extract_requires_id() {
        let mut field = Field::default().with_validation(json!({"optional": false}));
        field.kind = Some(FieldKind::Text);
        let schema = Schema::new(vec![field]).unwrap();
        assert_eq!(extract(&schema), Err(ValidationError::MissingFieldId));
    }

    #[test]
    fn test_published_json_shape() {
        let config = extract(&age_schema()).unwrap().unwrap();
        let published = config.to_json();
        assert_eq!(
            published,
            json!({"age": {"optional": false, "min": 18.0, "max": 65.0, "type": "number"}})
        );
        assert_eq!(ValidationConfig::from_json(&published).unwrap(), config);
    }

    #[test]
    fn test_from_json_rejects_non_object_rules() {
        assert!(matches!(
            ValidationConfig::from_json(&json!({"age": 3})),
            Err(ValidationError::Malformed(_))
        ));
    }
}
