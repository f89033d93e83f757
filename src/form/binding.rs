use std::sync::Arc;

use serde_json::Value;

use super::controller::FormInstance;
use super::registry::{FieldRegistration, RegistrationId, ValidateTrigger};
use super::rule::Rule;
use super::store::{FieldMeta, MetaPatch};

/// What a field binding declares when it mounts.
#[derive(Clone, Debug, Default)]
pub struct FieldOptions {
    pub path: String,
    pub rules: Vec<Rule>,
    pub validate_trigger: ValidateTrigger,
    pub dependencies: Vec<String>,
}

impl FieldOptions {
    pub fn new(path: impl AsRef<str>) -> Self {
        Self {
            path: path.as_ref().to_owned(),
            ..Self::default()
        }
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(mut self, rules: impl IntoIterator<Item = Rule>) -> Self {
        self.rules.extend(rules);
        self
    }

    pub fn validate_trigger(mut self, trigger: ValidateTrigger) -> Self {
        self.validate_trigger = trigger;
        self
    }

    pub fn depends_on(mut self, path: impl AsRef<str>) -> Self {
        self.dependencies.push(path.as_ref().to_owned());
        self
    }
}

/// Controls handed to a mounted field binding. Dropping the handle unmounts the field:
/// its registration is removed and in-flight validation is cancelled. Values and meta
/// stay in the form.
pub struct FieldHandle {
    form: FormInstance,
    path: String,
    registration: RegistrationId,
}

impl FormInstance {
    pub fn register_field(&self, options: FieldOptions) -> FieldHandle {
        let weak = Arc::downgrade(&self.inner);
        let accessor_path = options.path.clone();
        let registration = self.register_item(FieldRegistration {
            path: options.path.clone(),
            rules: options.rules,
            validate_trigger: options.validate_trigger,
            dependencies: options.dependencies,
            value_accessor: Arc::new(move || {
                let inner = weak.upgrade()?;
                FormInstance { inner }.get_field_value(&accessor_path)
            }),
        });
        FieldHandle {
            form: self.clone(),
            path: options.path,
            registration,
        }
    }
}

impl FieldHandle {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn value(&self) -> Option<Value> {
        match self.form.field_registration(&self.path) {
            Some(registration) => registration.value(),
            None => self.form.get_field_value(&self.path),
        }
    }

    pub fn meta(&self) -> FieldMeta {
        self.form.get_field_meta(&self.path)
    }

    pub fn error(&self) -> Option<String> {
        self.form.get_field_first_error(&self.path)
    }

    /// Writes `value`, validates the field when its trigger is `Change`, then revalidates
    /// touched fields depending on it. Returns this field's errors from the run, if any.
    pub async fn on_change(&self, value: impl Into<Value>) -> Vec<String> {
        self.form.set_field_value(&self.path, value);
        let errors = if self.trigger() == ValidateTrigger::Change {
            self.form.run_rules(&self.path, self.value()).await
        } else {
            Vec::new()
        };
        self.form.revalidate_dependents(&self.path).await;
        errors
    }

    /// Marks the field touched and validates it when its trigger is `Blur`.
    pub async fn on_blur(&self) -> Vec<String> {
        self.form.set_field_meta(&self.path, MetaPatch::default().touched(true));
        if self.trigger() == ValidateTrigger::Blur {
            self.form.run_rules(&self.path, self.value()).await
        } else {
            Vec::new()
        }
    }

    fn trigger(&self) -> ValidateTrigger {
        self.form
            .field_registration(&self.path)
            .map(|registration| registration.validate_trigger)
            .unwrap_or(ValidateTrigger::Never)
    }
}

impl Drop for FieldHandle {
    fn drop(&mut self) {
        self.form.unregister_registration(&self.path, Some(self.registration));
    }
}
