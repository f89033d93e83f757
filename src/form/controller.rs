use std::sync::{Arc, RwLock};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use super::path;
use super::registry::{FieldRegistration, FieldRegistry, RegistrationId};
use super::rule::ValidateMessages;
use super::store::{Action, FieldMeta, FormStore, MetaPatch, Subscription, read_lock, write_lock};
use super::validation::{FieldError, ValidateError};

#[derive(Debug, Error)]
pub enum FormError {
    #[error("failed to convert form model: {0}")]
    Model(#[from] serde_json::Error),
}

pub type FormResult<T> = Result<T, FormError>;

pub type FinishHandler = Arc<dyn Fn(Value) + Send + Sync>;
pub type FinishFailedHandler = Arc<dyn Fn(ValidateError) + Send + Sync>;

#[derive(Clone, Default)]
pub struct FormOptions {
    /// Values the form starts from and `reset_fields(None)` returns to. `null` means `{}`.
    pub initial_values: Value,
    pub validate_messages: ValidateMessages,
    /// Stop evaluating a field's rules at the first failure.
    pub validate_first_error_only: bool,
    pub on_finish: Option<FinishHandler>,
    pub on_finish_failed: Option<FinishFailedHandler>,
}

impl FormOptions {
    pub fn new(initial_values: Value) -> Self {
        Self {
            initial_values,
            ..Self::default()
        }
    }

    pub fn validate_messages(mut self, messages: ValidateMessages) -> Self {
        self.validate_messages = messages;
        self
    }

    pub fn validate_first_error_only(mut self, enabled: bool) -> Self {
        self.validate_first_error_only = enabled;
        self
    }

    pub fn on_finish(mut self, handler: impl Fn(Value) + Send + Sync + 'static) -> Self {
        self.on_finish = Some(Arc::new(handler));
        self
    }

    pub fn on_finish_failed(
        mut self,
        handler: impl Fn(ValidateError) + Send + Sync + 'static,
    ) -> Self {
        self.on_finish_failed = Some(Arc::new(handler));
        self
    }
}

pub(super) struct FormInner {
    pub(super) options: FormOptions,
    pub(super) store: Arc<FormStore>,
    pub(super) registry: RwLock<FieldRegistry>,
}

/// Handle to one form's values, metas and field registrations. Clones share state.
#[derive(Clone)]
pub struct FormInstance {
    pub(super) inner: Arc<FormInner>,
}

impl FormInstance {
    pub fn new(mut options: FormOptions) -> Self {
        if options.initial_values.is_null() {
            options.initial_values = Value::Object(Map::new());
        }
        let store = Arc::new(FormStore::new(options.initial_values.clone()));
        Self {
            inner: Arc::new(FormInner {
                options,
                store,
                registry: RwLock::new(FieldRegistry::default()),
            }),
        }
    }

    /// Seeds the initial values from a serializable model.
    pub fn from_model<T: Serialize>(model: &T, mut options: FormOptions) -> FormResult<Self> {
        options.initial_values = serde_json::to_value(model)?;
        Ok(Self::new(options))
    }

    /// Reads the current values back as a typed model.
    pub fn get_model<T: DeserializeOwned>(&self) -> FormResult<T> {
        Ok(serde_json::from_value(self.get_fields_value())?)
    }

    pub fn initial_values(&self) -> &Value {
        &self.inner.options.initial_values
    }

    pub fn get_field_value(&self, path: impl AsRef<str>) -> Option<Value> {
        self.inner
            .store
            .read(|state| path::get(&state.values, path.as_ref()).cloned())
    }

    pub fn get_fields_value(&self) -> Value {
        self.inner.store.values()
    }

    pub fn set_field_value(&self, path: impl AsRef<str>, value: impl Into<Value>) {
        self.inner.store.dispatch(Action::SetValue {
            path: path.as_ref().to_owned(),
            value: value.into(),
        });
    }

    /// Merges the top-level keys of `patch` into the values. Nested objects are replaced,
    /// not merged: `{a: {x: 9}}` over `{a: {x: 1, y: 2}}` leaves `a == {x: 9}`.
    pub fn set_fields_value(&self, patch: Value) {
        match patch {
            Value::Object(patch) => self.inner.store.dispatch(Action::SetValues(patch)),
            other => tracing::warn!(patch = %other, "ignoring non-object fields patch"),
        }
    }

    /// Replaces the values with `next` (or the initial values) and clears every meta.
    /// Registrations are kept; pending validations are discarded.
    pub fn reset_fields(&self, next: Option<Value>) {
        write_lock(&self.inner.registry, "resetting fields")
            .invalidate_runs();
        let values = next.unwrap_or_else(|| self.inner.options.initial_values.clone());
        self.inner.store.dispatch(Action::Reset(values));
    }

    pub fn get_field_meta(&self, path: impl AsRef<str>) -> FieldMeta {
        self.inner.store.meta(path.as_ref())
    }

    pub fn set_field_meta(&self, path: impl AsRef<str>, patch: MetaPatch) {
        self.inner.store.dispatch(Action::SetMeta {
            path: path.as_ref().to_owned(),
            patch,
        });
    }

    pub fn get_field_error(&self, path: impl AsRef<str>) -> Vec<String> {
        self.get_field_meta(path).errors
    }

    /// First error of a field, which is what a binding shows by convention.
    pub fn get_field_first_error(&self, path: impl AsRef<str>) -> Option<String> {
        self.get_field_error(path).into_iter().next()
    }

    /// Errors of every registered field, in registration order, including empty lists.
    pub fn get_fields_error(&self) -> Vec<FieldError> {
        let paths = self.registered_fields();
        self.inner.store.read(|state| {
            paths
                .into_iter()
                .map(|name| FieldError {
                    errors: state.meta(&name).errors,
                    name,
                })
                .collect()
        })
    }

    pub fn is_field_touched(&self, path: impl AsRef<str>) -> bool {
        self.get_field_meta(path).touched
    }

    /// Whether any (or, with `all`, every) of `names` is touched. `None` checks the
    /// registered fields.
    pub fn is_fields_touched(&self, names: Option<&[&str]>, all: bool) -> bool {
        let names = match names {
            Some(names) => names.iter().map(|name| name.to_string()).collect(),
            None => self.registered_fields(),
        };
        self.inner.store.read(|state| {
            let mut touched = names.iter().map(|name| state.meta(name).touched);
            if all {
                touched.all(|flag| flag)
            } else {
                touched.any(|flag| flag)
            }
        })
    }

    pub fn is_field_validating(&self, path: impl AsRef<str>) -> bool {
        self.get_field_meta(path).validating
    }

    /// Registers `listener` to run after every store mutation.
    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.inner.store.subscribe(listener)
    }

    pub fn registered_fields(&self) -> Vec<String> {
        read_lock(&self.inner.registry, "listing fields").paths()
    }

    pub fn field_registration(&self, path: impl AsRef<str>) -> Option<FieldRegistration> {
        read_lock(&self.inner.registry, "reading registration")
            .get(path.as_ref())
    }

    #[doc(hidden)]
    pub fn register_item(&self, registration: FieldRegistration) -> RegistrationId {
        tracing::trace!(field = %registration.path, "field registered");
        write_lock(&self.inner.registry, "registering field")
            .register(registration)
    }

    #[doc(hidden)]
    pub fn unregister_item(&self, path: impl AsRef<str>) {
        self.unregister_registration(path.as_ref(), None);
    }

    pub(super) fn unregister_registration(&self, path: &str, only: Option<RegistrationId>) {
        let removed = write_lock(&self.inner.registry, "unregistering field")
            .unregister(path, only);
        if removed.is_some() {
            tracing::trace!(field = path, "field unregistered");
        }
    }

    /// Validates every registered field and routes the outcome to `on_finish` or
    /// `on_finish_failed`.
    pub async fn submit(&self) {
        match self.validate_fields(None).await {
            Ok(values) => {
                tracing::debug!("form submit succeeded");
                if let Some(handler) = &self.inner.options.on_finish {
                    handler(values);
                }
            }
            Err(error) => {
                tracing::debug!(failed = error.error_fields.len(), "form submit failed");
                if let Some(handler) = &self.inner.options.on_finish_failed {
                    handler(error);
                }
            }
        }
    }
}
