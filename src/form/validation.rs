use futures::future::Abortable;
use serde_json::Value;
use thiserror::Error;

use super::controller::FormInstance;
use super::registry::ValidationRun;
use super::store::{Action, MetaPatch, read_lock, write_lock};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldError {
    pub name: String,
    pub errors: Vec<String>,
}

/// Rejection of a validation pass: the values it ran against and every field that
/// produced at least one error, in target order.
#[derive(Clone, Debug, PartialEq, Error)]
#[error("{} field(s) failed validation", .error_fields.len())]
pub struct ValidateError {
    pub values: Value,
    pub error_fields: Vec<FieldError>,
}

impl ValidateError {
    pub fn names(&self) -> Vec<&str> {
        self.error_fields
            .iter()
            .map(|field| field.name.as_str())
            .collect()
    }

    pub fn errors_for(&self, name: &str) -> Option<&[String]> {
        self.error_fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| field.errors.as_slice())
    }
}

impl FormInstance {
    /// Evaluates the rules registered for `path` against `value`, in declared order, and
    /// returns every failure message.
    ///
    /// The field is marked `validating` while rules run. The result is written to the
    /// field's meta only if this is still the latest run for the field and the field is
    /// still registered. Unregistering or re-registering the field cancels the run, which
    /// then yields no errors and leaves the field idle unless a newer run is pending.
    pub async fn run_rules(&self, path: &str, value: Option<Value>) -> Vec<String> {
        let Some(ValidationRun {
            ticket,
            rules,
            abort,
        }) = write_lock(&self.inner.registry, "starting validation").begin(path)
        else {
            return Vec::new();
        };

        self.inner.store.dispatch(Action::SetMeta {
            path: path.to_owned(),
            patch: MetaPatch::default().validating(true),
        });

        let values = self.inner.store.values();
        let options = &self.inner.options;
        let evaluation = async {
            let mut errors = Vec::new();
            for rule in &rules {
                if let Some(error) = rule
                    .check(path, value.as_ref(), &values, &options.validate_messages)
                    .await
                {
                    errors.push(error);
                    if options.validate_first_error_only {
                        break;
                    }
                }
            }
            errors
        };
        let outcome = Abortable::new(evaluation, abort).await;
        let commit = write_lock(&self.inner.registry, "finishing validation")
            .finish(path, ticket);

        let Ok(errors) = outcome else {
            tracing::debug!(field = path, ticket = ticket.0, "validation cancelled");
            let superseded = read_lock(&self.inner.registry, "checking pending runs")
                .has_pending_run(path);
            if !superseded {
                self.inner.store.dispatch(Action::SetMeta {
                    path: path.to_owned(),
                    patch: MetaPatch::default().validating(false),
                });
            }
            return Vec::new();
        };
        if commit {
            self.inner.store.dispatch(Action::SetMeta {
                path: path.to_owned(),
                patch: MetaPatch::default()
                    .errors(errors.clone())
                    .validating(false)
                    .touched(true),
            });
        } else {
            tracing::trace!(field = path, ticket = ticket.0, "discarding stale validation");
        }
        errors
    }

    /// Validates `names` (or every registered field) one after another and resolves with
    /// the values snapshot, or rejects with the fields that failed.
    pub async fn validate_fields(&self, names: Option<&[&str]>) -> Result<Value, ValidateError> {
        let targets = match names {
            Some(names) => names.iter().map(|name| name.to_string()).collect(),
            None => self.registered_fields(),
        };
        tracing::debug!(fields = targets.len(), "validating fields");

        let mut error_fields = Vec::new();
        for name in targets {
            let value = self.get_field_value(&name);
            let errors = self.run_rules(&name, value).await;
            if !errors.is_empty() {
                error_fields.push(FieldError { name, errors });
            }
        }

        let values = self.get_fields_value();
        if error_fields.is_empty() {
            Ok(values)
        } else {
            tracing::debug!(failed = error_fields.len(), "validation failed");
            Err(ValidateError {
                values,
                error_fields,
            })
        }
    }

    /// Re-runs validation for touched fields that depend on `path`.
    pub(super) async fn revalidate_dependents(&self, path: &str) {
        let dependents = read_lock(&self.inner.registry, "reading dependents")
            .dependents_of(path);
        for dependent in dependents {
            if dependent.path == path || !self.is_field_touched(&dependent.path) {
                continue;
            }
            let _ = self.run_rules(&dependent.path, dependent.value()).await;
        }
    }
}
