//! Rendered form model and field value collection
//!
//! The theme renders a [`Schema`] into interactive controls. This module
//! models what validation needs from that rendering: the controls with
//! their names, kinds and current values, and the question anchors that
//! carry the invalid marker.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::schema::{FieldKind, Schema};
use crate::validation::{FieldValue, FieldValues};

/// Kinds of interactive controls
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlKind {
    Text,
    Number,
    Textarea,
    Radio,
    Checkbox,
    Select,
    Button,
    Hidden,
    /// A custom component; its field kind decides how it is read
    Other,
}

/// One interactive control of a rendered form
#[derive(Clone, Debug, PartialEq)]
pub struct Control {
    pub name: Option<String>,
    pub kind: ControlKind,
    pub value: String,
    pub checked: bool,

    /// Set when the control's question was skipped
    pub no_validation: bool,

    /// Id of the owning form
    pub form_id: Option<String>,

    /// Id of the question anchor this control belongs to
    pub question_id: Option<String>,
}

impl Control {
    pub fn new(kind: ControlKind, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            kind,
            value: value.into(),
            checked: false,
            no_validation: false,
            form_id: None,
            question_id: None,
        }
    }

    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(ControlKind::Text, name, value)
    }

    pub fn number(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(ControlKind::Number, name, value)
    }

    pub fn radio(name: impl Into<String>, value: impl Into<String>, checked: bool) -> Self {
        Self {
            checked,
            ..Self::new(ControlKind::Radio, name, value)
        }
    }

    pub fn checkbox(name: impl Into<String>, value: impl Into<String>, checked: bool) -> Self {
        Self {
            checked,
            ..Self::new(ControlKind::Checkbox, name, value)
        }
    }

    pub fn select(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(ControlKind::Select, name, value)
    }

    pub fn hidden(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(ControlKind::Hidden, name, value)
    }

    pub fn in_question(mut self, question_id: impl Into<String>) -> Self {
        self.question_id = Some(question_id.into());
        self
    }

    /// The question anchor this control marks; defaults to its name
    pub fn anchor(&self) -> Option<&str> {
        self.question_id.as_deref().or(self.name.as_deref())
    }

    /// The identity validation needs when this control loses focus
    pub fn identity(&self) -> Option<FieldIdentity> {
        Some(FieldIdentity {
            form_id: self.form_id.clone()?,
            name: self.name.clone()?,
            question_id: self.question_id.clone(),
            skip: self.no_validation,
        })
    }
}

/// Identifies the field a control event refers to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldIdentity {
    pub form_id: String,
    pub name: String,
    pub question_id: Option<String>,

    /// The control is flagged do-not-validate
    pub skip: bool,
}

/// A form as rendered on the current page
#[derive(Clone, Debug, Default)]
pub struct RenderedForm {
    id: String,
    controls: Vec<Control>,
    questions: Vec<String>,
    invalid: HashSet<String>,
}

impl RenderedForm {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Append a control in document order, registering its question anchor
    pub fn push(&mut self, mut control: Control) {
        if control.form_id.is_none() {
            control.form_id = Some(self.id.clone());
        }

        if let Some(anchor) = control.anchor() {
            if !self.questions.iter().any(|q| q == anchor) {
                self.questions.push(anchor.to_string());
            }
        }

        self.controls.push(control);
    }

    pub fn with(mut self, control: Control) -> Self {
        self.push(control);
        self
    }

    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    /// Mutable access to every control with the given name
    pub fn controls_named_mut<'a>(&'a mut self, name: &'a str) -> impl Iterator<Item = &'a mut Control> {
        self.controls
            .iter_mut()
            .filter(move |c| c.name.as_deref() == Some(name))
    }

    /// Set the value of every text-like control with this name
    pub fn set_value(&mut self, name: &str, value: &str) {
        for control in self.controls_named_mut(name) {
            control.value = value.to_string();
        }
    }

    /// Check exactly the radio/checkbox controls with this name and value
    pub fn check(&mut self, name: &str, value: &str) {
        for control in self.controls_named_mut(name) {
            if control.value == value {
                control.checked = true;
            } else if control.kind == ControlKind::Radio {
                control.checked = false;
            }
        }
    }

    /// The question anchor of the first control with this name
    pub fn anchor_for(&self, name: &str) -> Option<&str> {
        self.controls
            .iter()
            .find(|c| c.name.as_deref() == Some(name))
            .and_then(Control::anchor)
    }

    pub fn has_question(&self, anchor: &str) -> bool {
        self.questions.iter().any(|q| q == anchor)
    }

    /// Attach the invalid marker; `false` if there is no such anchor
    pub fn mark_invalid(&mut self, anchor: &str) -> bool {
        if !self.has_question(anchor) {
            return false;
        }
        self.invalid.insert(anchor.to_string());
        true
    }

    /// Remove the invalid marker; `false` if there is no such anchor
    pub fn mark_valid(&mut self, anchor: &str) -> bool {
        if !self.has_question(anchor) {
            return false;
        }
        self.invalid.remove(anchor);
        true
    }

    pub fn is_invalid(&self, anchor: &str) -> bool {
        self.invalid.contains(anchor)
    }

    /// The first marked anchor in document order
    pub fn first_invalid(&self) -> Option<&str> {
        self.questions
            .iter()
            .find(|q| self.invalid.contains(q.as_str()))
            .map(String::as_str)
    }

    /// Exclude a question from validation: clear its marker and flag its controls
    pub fn skip(&mut self, question_id: &str) {
        if !self.has_question(question_id) {
            return;
        }

        self.invalid.remove(question_id);
        for control in &mut self.controls {
            if control.anchor() == Some(question_id) {
                control.no_validation = true;
            }
        }
    }
}

/// Group the form's controls by name, in document order.
///
/// Unnamed controls and hidden inputs are left out.
pub fn group_elements_by_name(form: &RenderedForm) -> IndexMap<&str, Vec<&Control>> {
    let mut groups: IndexMap<&str, Vec<&Control>> = IndexMap::new();

    for control in form.controls() {
        let Some(name) = control.name.as_deref() else {
            continue;
        };
        if name.is_empty() || control.kind == ControlKind::Hidden {
            continue;
        }

        groups.entry(name).or_default().push(control);
    }

    groups
}

/// The value a control contributes, if any
pub fn value_of(control: &Control, field_kind: FieldKind) -> Option<&str> {
    let checkable = match control.kind {
        ControlKind::Radio | ControlKind::Checkbox => true,
        ControlKind::Other => field_kind.is_checkable(),
        _ => false,
    };

    if checkable && !control.checked {
        return None;
    }

    Some(control.value.as_str())
}

/// Values of a control group, skipping unchecked and do-not-validate controls
pub fn values_from_group(group: &[&Control], field_kind: FieldKind) -> Vec<String> {
    group
        .iter()
        .filter(|control| !control.no_validation)
        .filter_map(|control| value_of(control, field_kind))
        .map(str::to_string)
        .collect()
}

/// Collect one field's state, or `None` if no control carries its name
pub fn collect_field(form: &RenderedForm, name: &str, field_kind: FieldKind) -> Option<FieldValue> {
    let groups = group_elements_by_name(form);
    let group = groups.get(name)?;
    Some(state_of(group, field_kind))
}

fn state_of(group: &[&Control], field_kind: FieldKind) -> FieldValue {
    if !group.is_empty() && group.iter().all(|control| control.no_validation) {
        return FieldValue::Skipped;
    }
    FieldValue::Values(values_from_group(group, field_kind))
}

/// Collect the state of every answerable field of a schema.
///
/// Fields whose controls are missing from the form are absent from the result.
pub fn collect(form: &RenderedForm, schema: &Schema) -> FieldValues {
    let groups = group_elements_by_name(form);
    let mut values = FieldValues::new();

    for field in schema.answerable() {
        let Some(id) = field.id.as_deref() else {
            continue;
        };
        if let Some(group) = groups.get(id) {
            values.insert(id.to_string(), state_of(group, field.kind()));
        }
    }

    values
}
