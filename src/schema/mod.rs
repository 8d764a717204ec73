//! Survey schema model for Survana
//!
//! A schema is the ordered list of field definitions a form is rendered from.
//! Composite fields (groups, matrices) carry nested definitions of the same
//! shape. Inherited properties are filled in once by [`Schema::normalize`];
//! validation never re-derives them.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Error types for schema loading
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Malformed schema: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Duplicate field id: {0}")]
    DuplicateId(String),
}

/// Control kinds a field can be rendered as
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Textarea,
    Number,
    Email,
    Radio,
    Checkbox,
    Select,
    Option,
    Button,
    Group,
    Matrix,
    Hidden,

    /// Any kind the rendering theme knows about but validation does not
    #[serde(other)]
    Custom,
}

impl FieldKind {
    /// Whether controls of this kind only contribute a value while checked
    pub fn is_checkable(self) -> bool {
        matches!(self, FieldKind::Radio | FieldKind::Checkbox)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Textarea => "textarea",
            FieldKind::Number => "number",
            FieldKind::Email => "email",
            FieldKind::Radio => "radio",
            FieldKind::Checkbox => "checkbox",
            FieldKind::Select => "select",
            FieldKind::Option => "option",
            FieldKind::Button => "button",
            FieldKind::Group => "group",
            FieldKind::Matrix => "matrix",
            FieldKind::Hidden => "hidden",
            FieldKind::Custom => "custom",
        }
    }
}

/// A single field definition
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Form-unique key; required for every field that is validated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FieldKind>,

    /// Logical control name; controls sharing a name form one value group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Kind given to the children of a group that don't declare their own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<FieldKind>,

    /// Constraint name -> parameter, in the order the author declared them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Field>,

    /// Matrix rows
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<Field>,

    /// Presentation properties (labels, html, sizes) that only the theme reads
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Field {
    pub fn new(id: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            id: Some(id.into()),
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// Attach a validation rule set, given as a JSON object
    pub fn with_validation(mut self, validation: Value) -> Self {
        if let Value::Object(map) = validation {
            self.validation = Some(map);
        }
        self
    }

    pub fn with_child(mut self, child: Field) -> Self {
        self.fields.push(child);
        self
    }

    pub fn with_row(mut self, row: Field) -> Self {
        self.rows.push(row);
        self
    }

    pub fn kind(&self) -> FieldKind {
        self.kind.unwrap_or(FieldKind::Custom)
    }

    fn inherit_into_children(&mut self) {
        let parent_validation = self.validation.clone();
        let parent_name = self.name.clone().or_else(|| self.id.clone());
        let parent_id = self.id.clone();
        let child_kind = self.group;

        let mut child_index = 0usize;
        for child in &mut self.fields {
            if child.validation.is_none() {
                child.validation = parent_validation.clone();
            }

            if child.kind.is_none() {
                child.kind = child_kind;
            }

            if child.id.is_none() {
                if let Some(parent_id) = &parent_id {
                    child.id = Some(format!("{}:{}", parent_id, child_index));
                    child_index += 1;
                }
            }

            if child.name.is_none() {
                child.name = parent_name.clone();
            }

            child.inherit_into_children();
        }

        for (i, row) in self.rows.iter_mut().enumerate() {
            if row.validation.is_none() {
                row.validation = parent_validation.clone();
            }

            // Rows are numbered from 1; their controls are named after the row id
            if row.id.is_none() {
                if let Some(parent_id) = &parent_id {
                    row.id = Some(format!("{}:{}", parent_id, i + 1));
                }
            }
            row.inherit_into_children();
        }
    }

    fn collect_ids<'a>(&'a self, seen: &mut HashSet<&'a str>) -> Result<(), SchemaError> {
        if let Some(id) = self.id.as_deref() {
            if !seen.insert(id) {
                return Err(SchemaError::DuplicateId(id.to_string()));
            }
        }

        for nested in self.fields.iter().chain(self.rows.iter()) {
            nested.collect_ids(seen)?;
        }

        Ok(())
    }
}

/// An ordered sequence of field definitions
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default)]
    pub fields: Vec<Field>,
}

impl Schema {
    /// Build a schema from field definitions and normalize it
    pub fn new(fields: Vec<Field>) -> Result<Self, SchemaError> {
        let mut schema = Self { id: None, fields };
        schema.normalize()?;
        Ok(schema)
    }

    /// Parse and normalize a schema from its JSON declaration
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, SchemaError> {
        let mut schema: Schema = serde_json::from_value(value)?;
        schema.normalize()?;
        Ok(schema)
    }

    /// Propagate inherited properties to nested fields and check id uniqueness.
    ///
    /// Only absent properties are filled in, so running this again is a no-op.
    pub fn normalize(&mut self) -> Result<(), SchemaError> {
        for field in &mut self.fields {
            field.inherit_into_children();
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            field.collect_ids(&mut seen)?;
        }

        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields that receive an answer of their own: top-level fields, with
    /// matrices replaced by their rows
    pub fn answerable(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().flat_map(|field| {
            if field.kind() == FieldKind::Matrix {
                field.rows.iter().collect::<Vec<_>>()
            } else {
                vec![field]
            }
        })
    }

    /// Find a field by id anywhere in the tree
    pub fn find(&self, id: &str) -> Option<&Field> {
        fn search<'a>(fields: &'a [Field], id: &str) -> Option<&'a Field> {
            for field in fields {
                if field.id.as_deref() == Some(id) {
                    return Some(field);
                }
                if let Some(found) = search(&field.fields, id).or_else(|| search(&field.rows, id)) {
                    return Some(found);
                }
            }
            None
        }

        search(&self.fields, id)
    }
}
