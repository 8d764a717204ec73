//! The validation engine
//!
//! Holds the per-form validation configuration and the schema registry, and
//! marks fields valid or invalid on the rendered form as they are checked.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;

use super::config::{extract, FieldConfig, ValidationConfig};
use super::constraints::RuleSet;
use super::messages::Messages;
use super::{FieldValue, FieldValues, Responses, ValidationResult};
use crate::form::{self, FieldIdentity, RenderedForm};
use crate::schema::{Schema, SchemaError};

/// Shows and hides messages next to question anchors
pub trait MessageDisplay: Send + Sync {
    fn show_message(&self, anchor: &str, message: &str, source: Option<&FieldIdentity>);

    fn hide_message(&self, anchor: &str);
}

/// Cached validation settings of one form
#[derive(Clone, Debug, PartialEq)]
pub struct FormValidation {
    pub config: ValidationConfig,
    pub messages: Messages,
}

/// Validates forms against their schemas
#[derive(Default)]
pub struct ValidationEngine {
    forms: HashMap<String, FormValidation>,

    /// Forms whose configuration was set explicitly rather than extracted
    pinned: HashSet<String>,

    schemas: HashMap<String, Arc<Schema>>,
    display: Option<Arc<dyn MessageDisplay>>,
}

impl ValidationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Show messages through `display` whenever a field changes state
    pub fn with_display(mut self, display: Arc<dyn MessageDisplay>) -> Self {
        self.display = Some(display);
        self
    }

    pub fn set_display(&mut self, display: Option<Arc<dyn MessageDisplay>>) {
        self.display = display;
    }

    /// Cache the configuration of a form, replacing any earlier one.
    ///
    /// An explicit configuration takes precedence over any schema the form
    /// is later validated against.
    pub fn set_configuration(
        &mut self,
        form_id: impl Into<String>,
        config: ValidationConfig,
        messages: Option<Messages>,
    ) {
        let form_id = form_id.into();
        self.pinned.insert(form_id.clone());
        self.forms.insert(
            form_id,
            FormValidation {
                config,
                messages: messages.unwrap_or_default(),
            },
        );
    }

    pub fn configuration(&self, form_id: &str) -> Option<&FormValidation> {
        self.forms.get(form_id)
    }

    pub fn register_schema(&mut self, form_id: impl Into<String>, schema: Schema) {
        self.schemas.insert(form_id.into(), Arc::new(schema));
    }

    /// Register every schema of an embedded `{ form-id: schema, ... }` declaration.
    ///
    /// Returns the number of schemas registered. Nothing is registered if
    /// any of them fails to load.
    pub fn register_schemas(&mut self, declarations: &Value) -> Result<usize, SchemaError> {
        let Some(declarations) = declarations.as_object() else {
            return Ok(0);
        };

        let schemas = declarations
            .iter()
            .map(|(form_id, schema)| Ok((form_id.clone(), Schema::from_value(schema.clone())?)))
            .collect::<Result<Vec<_>, SchemaError>>()?;

        let count = schemas.len();
        for (form_id, schema) in schemas {
            self.register_schema(form_id, schema);
        }

        Ok(count)
    }

    pub fn schema(&self, form_id: &str) -> Option<&Schema> {
        self.schemas.get(form_id).map(Arc::as_ref)
    }

    /// Make sure a configuration is cached for `form_id`, extracting it from
    /// `schema` or the registered schema if needed
    fn ensure_config(&mut self, form_id: &str, schema: Option<&Schema>) -> bool {
        if self.forms.contains_key(form_id) {
            return true;
        }

        let Some(schema) = schema.or_else(|| self.schemas.get(form_id).map(Arc::as_ref)) else {
            log::error!("No schema for form '{}'", form_id);
            return false;
        };

        match extract(schema) {
            Ok(config) => {
                self.forms.insert(
                    form_id.to_string(),
                    FormValidation {
                        config: config.unwrap_or_default(),
                        messages: Messages::default(),
                    },
                );
                true
            }
            Err(e) => {
                log::error!("Invalid validation configuration for form '{}': {}", form_id, e);
                false
            }
        }
    }

    /// Validate one field of `form` against the cached configuration
    pub fn validate_field(&self, form: &mut RenderedForm, field_id: &str, all: &FieldValues) -> bool {
        let Some(validation) = self.forms.get(form.id()) else {
            log::error!("No validation configuration for form '{}'", form.id());
            return false;
        };

        let Some(field) = validation.config.get(field_id) else {
            log::error!("No validation configuration for field '{}'", field_id);
            return false;
        };

        check_field(
            self.display.as_deref(),
            form,
            &validation.messages,
            field_id,
            &field.rules,
            all,
            None,
        )
    }

    /// Validate every configured field of a form.
    ///
    /// All fields are checked and marked even after one fails. `schema`
    /// defaults to the schema registered under the form's id. An explicit
    /// `schema` has its configuration extracted afresh, unless one was set
    /// with [`ValidationEngine::set_configuration`].
    pub fn validate(
        &mut self,
        form: &mut RenderedForm,
        all: &FieldValues,
        schema: Option<&Schema>,
    ) -> ValidationResult {
        let form_id = form.id().to_string();

        if schema.is_some() && !self.pinned.contains(&form_id) {
            self.forms.remove(&form_id);
        }

        let registered = self.schemas.get(&form_id).cloned();
        let Some(schema) = schema.or(registered.as_deref()) else {
            log::error!("No schema for form '{}'", form_id);
            return ValidationResult::Invalid;
        };

        if !self.ensure_config(&form_id, Some(schema)) {
            return ValidationResult::Invalid;
        }

        let Some(validation) = self.forms.get(&form_id) else {
            return ValidationResult::Invalid;
        };

        let mut form_valid = true;
        for (field_id, field) in validation.config.iter() {
            let field_valid = check_field(
                self.display.as_deref(),
                form,
                &validation.messages,
                field_id,
                &field.rules,
                all,
                None,
            );
            form_valid &= field_valid;
        }

        if !form_valid {
            return ValidationResult::Invalid;
        }

        let responses: Responses = schema
            .answerable()
            .filter_map(|field| {
                let id = field.id.as_deref()?;
                let values = all.get(id)?.as_values()?;
                Some((id.to_string(), values.to_vec()))
            })
            .collect();

        ValidationResult::Valid(responses)
    }

    /// Collect the current values of a form and validate them against its
    /// registered schema
    pub fn validate_form(&mut self, form: &mut RenderedForm) -> ValidationResult {
        let Some(schema) = self.schemas.get(form.id()).cloned() else {
            log::error!("No schema registered for form '{}'", form.id());
            return ValidationResult::Invalid;
        };

        let values = form::collect(form, &schema);
        self.validate(form, &values, None)
    }

    /// Validate a single field as the respondent leaves one of its controls.
    ///
    /// Returns `None` when the field is not validated at all: the control was
    /// skipped, or there is no configuration for it.
    pub fn on_field_blur(&mut self, form: &mut RenderedForm, identity: &FieldIdentity) -> Option<bool> {
        if identity.skip {
            return None;
        }

        if !self.ensure_config(&identity.form_id, None) {
            log::warn!("No validation configuration for form '{}'", identity.form_id);
            return None;
        }

        let validation = self.forms.get(&identity.form_id)?;
        let Some(field) = validation.config.get(&identity.name) else {
            log::warn!("No validation configuration for field '{}'", identity.name);
            return None;
        };

        let all = collect_for_field(form, &validation.config, &identity.name, field);

        Some(check_field(
            self.display.as_deref(),
            form,
            &validation.messages,
            &identity.name,
            &field.rules,
            &all,
            Some(identity),
        ))
    }
}

/// The values one field needs: its own, plus those of fields it is compared to
fn collect_for_field(
    form: &RenderedForm,
    config: &ValidationConfig,
    name: &str,
    field: &FieldConfig,
) -> FieldValues {
    let mut all = FieldValues::new();

    if let Some(state) = form::collect_field(form, name, field.kind) {
        all.insert(name.to_string(), state);
    }

    for target in field.rules.dependencies() {
        let kind = config.get(target).map(|c| c.kind).unwrap_or(field.kind);
        if let Some(state) = form::collect_field(form, target, kind) {
            all.insert(target.to_string(), state);
        }
    }

    all
}

fn check_field(
    display: Option<&dyn MessageDisplay>,
    form: &mut RenderedForm,
    messages: &Messages,
    field_id: &str,
    rules: &RuleSet,
    all: &FieldValues,
    source: Option<&FieldIdentity>,
) -> bool {
    let values = match all.get(field_id) {
        Some(FieldValue::Skipped) => {
            mark_valid(display, form, field_id, source);
            return true;
        }
        Some(FieldValue::Values(values)) => values,
        None => return false,
    };

    match rules.first_failure(values, all) {
        Some(constraint) => {
            log::debug!(
                "Constraint {} = {} failed validation; values={:?}",
                constraint.kind(),
                constraint.param(),
                values
            );
            let message = messages.resolve(constraint);
            mark_invalid(display, form, field_id, &message, source);
            false
        }
        None => {
            mark_valid(display, form, field_id, source);
            true
        }
    }
}

fn anchor_of(form: &RenderedForm, field_id: &str, source: Option<&FieldIdentity>) -> String {
    source
        .and_then(|s| s.question_id.as_deref())
        .or_else(|| form.anchor_for(field_id))
        .unwrap_or(field_id)
        .to_string()
}

fn mark_invalid(
    display: Option<&dyn MessageDisplay>,
    form: &mut RenderedForm,
    field_id: &str,
    message: &str,
    source: Option<&FieldIdentity>,
) {
    let anchor = anchor_of(form, field_id, source);

    if !form.mark_invalid(&anchor) {
        log::error!("No such question: {}", anchor);
        return;
    }

    if let Some(display) = display {
        display.show_message(&anchor, message, source);
    }
}

fn mark_valid(
    display: Option<&dyn MessageDisplay>,
    form: &mut RenderedForm,
    field_id: &str,
    source: Option<&FieldIdentity>,
) {
    let anchor = anchor_of(form, field_id, source);

    if !form.mark_valid(&anchor) {
        log::error!("No such question: {}", anchor);
        return;
    }

    if let Some(display) = display {
        display.hide_message(&anchor);
    }
}
