use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

/// Failure reported by an async validator. The message is optional; a fault without
/// one falls back to the rule message or [`ValidateMessages::fallback`].
#[derive(Clone, Debug, Default, Eq, PartialEq, Error)]
#[error("{}", .message.as_deref().unwrap_or("validation rule failed"))]
pub struct RuleFault {
    message: Option<String>,
}

impl RuleFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }

    pub fn silent() -> Self {
        Self { message: None }
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl From<String> for RuleFault {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for RuleFault {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

#[derive(Debug, Error)]
#[error("invalid pattern rule: {0}")]
pub struct PatternError(#[from] regex::Error);

pub type AsyncValidatorFn =
    Arc<dyn Fn(Value, Value) -> BoxFuture<'static, Result<(), RuleFault>> + Send + Sync>;

#[derive(Clone)]
pub enum Rule {
    Required {
        message: Option<String>,
    },
    /// Checked against strings (including empty ones), numbers and booleans; missing
    /// and `null` values pass.
    Pattern {
        regex: Regex,
        message: Option<String>,
    },
    /// Character-count bounds; only string values are checked.
    Length {
        min: Option<usize>,
        max: Option<usize>,
        message: Option<String>,
    },
    /// Called with `(value, all_values)`; an undefined value is passed as `null`.
    AsyncValidator {
        validator: AsyncValidatorFn,
        message: Option<String>,
    },
}

impl Rule {
    pub fn required() -> Self {
        Rule::Required { message: None }
    }

    pub fn pattern(pattern: &str) -> Result<Self, PatternError> {
        Ok(Self::matches(Regex::new(pattern)?))
    }

    pub fn matches(regex: Regex) -> Self {
        Rule::Pattern {
            regex,
            message: None,
        }
    }

    pub fn length(min: Option<usize>, max: Option<usize>) -> Self {
        Rule::Length {
            min,
            max,
            message: None,
        }
    }

    pub fn min_len(min: usize) -> Self {
        Self::length(Some(min), None)
    }

    pub fn max_len(max: usize) -> Self {
        Self::length(None, Some(max))
    }

    pub fn validator<F, Fut>(validator: F) -> Self
    where
        F: Fn(Value, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), RuleFault>> + Send + 'static,
    {
        Rule::AsyncValidator {
            validator: Arc::new(move |value, values| validator(value, values).boxed()),
            message: None,
        }
    }

    pub fn with_message(mut self, text: impl Into<String>) -> Self {
        let text = Some(text.into());
        match &mut self {
            Rule::Required { message }
            | Rule::Pattern { message, .. }
            | Rule::Length { message, .. }
            | Rule::AsyncValidator { message, .. } => *message = text,
        }
        self
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Rule::Required { message }
            | Rule::Pattern { message, .. }
            | Rule::Length { message, .. }
            | Rule::AsyncValidator { message, .. } => message.as_deref(),
        }
    }

    /// Runs the rule against `value`, returning the failure message if it does not hold.
    /// Faults and panics raised by async validators become messages.
    pub(super) async fn check(
        &self,
        name: &str,
        value: Option<&Value>,
        values: &Value,
        messages: &ValidateMessages,
    ) -> Option<String> {
        match self {
            Rule::Required { message } => is_empty(value)
                .then(|| resolve(message, &messages.required, name, None, None)),
            Rule::Pattern { regex, message } => {
                let text = pattern_subject(value)?;
                (!regex.is_match(&text))
                    .then(|| resolve(message, &messages.pattern, name, None, None))
            }
            Rule::Length { min, max, message } => {
                let Some(Value::String(text)) = value else {
                    return None;
                };
                let count = text.chars().count();
                let too_short = min.is_some_and(|min| count < min);
                let too_long = max.is_some_and(|max| count > max);
                if !too_short && !too_long {
                    return None;
                }
                let template = match (min, max) {
                    (Some(_), Some(_)) => &messages.range,
                    (Some(_), None) => &messages.min,
                    _ => &messages.max,
                };
                Some(resolve(message, template, name, *min, *max))
            }
            Rule::AsyncValidator { validator, message } => {
                let value = value.cloned().unwrap_or(Value::Null);
                let outcome = match std::panic::catch_unwind(AssertUnwindSafe(|| {
                    validator(value, values.clone())
                })) {
                    Ok(future) => AssertUnwindSafe(future).catch_unwind().await,
                    Err(payload) => Err(payload),
                };
                match outcome {
                    Ok(Ok(())) => None,
                    Ok(Err(fault)) => Some(
                        fault
                            .message
                            .or_else(|| message.clone())
                            .unwrap_or_else(|| messages.fallback.clone()),
                    ),
                    Err(payload) => {
                        tracing::warn!(field = name, "async validator panicked");
                        Some(
                            panic_message(payload.as_ref())
                                .or_else(|| message.clone())
                                .unwrap_or_else(|| messages.fallback.clone()),
                        )
                    }
                }
            }
        }
    }
}

impl Debug for Rule {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Rule::Required { message } => f
                .debug_struct("Required")
                .field("message", message)
                .finish(),
            Rule::Pattern { regex, message } => f
                .debug_struct("Pattern")
                .field("regex", &regex.as_str())
                .field("message", message)
                .finish(),
            Rule::Length { min, max, message } => f
                .debug_struct("Length")
                .field("min", min)
                .field("max", max)
                .field("message", message)
                .finish(),
            Rule::AsyncValidator { message, .. } => f
                .debug_struct("AsyncValidator")
                .field("message", message)
                .finish_non_exhaustive(),
        }
    }
}

/// Default failure texts. `{name}`, `{min}` and `{max}` are substituted.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ValidateMessages {
    pub required: String,
    pub pattern: String,
    pub min: String,
    pub max: String,
    pub range: String,
    pub fallback: String,
}

impl Default for ValidateMessages {
    fn default() -> Self {
        Self {
            required: "This field is required".into(),
            pattern: "Invalid format".into(),
            min: "Must be at least {min} characters".into(),
            max: "Must be at most {max} characters".into(),
            range: "Must be between {min} and {max} characters".into(),
            fallback: "Validation failed".into(),
        }
    }
}

fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(text)) => text.is_empty(),
        Some(_) => false,
    }
}

fn pattern_subject(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn resolve(
    message: &Option<String>,
    template: &str,
    name: &str,
    min: Option<usize>,
    max: Option<usize>,
) -> String {
    let mut text = message.as_deref().unwrap_or(template).replace("{name}", name);
    if let Some(min) = min {
        text = text.replace("{min}", &min.to_string());
    }
    if let Some(max) = max {
        text = text.replace("{max}", &max.to_string());
    }
    text
}

fn panic_message(payload: &(dyn Any + Send)) -> Option<String> {
    payload
        .downcast_ref::<&str>()
        .map(|text| text.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use serde_json::json;

    fn check(rule: &Rule, value: Option<Value>) -> Option<String> {
        block_on(rule.check(
            "field",
            value.as_ref(),
            &json!({}),
            &ValidateMessages::default(),
        ))
    }

    #[test]
    fn required_rejects_missing_null_and_empty_string() {
        let rule = Rule::required();
        assert_eq!(check(&rule, None).as_deref(), Some("This field is required"));
        assert!(check(&rule, Some(Value::Null)).is_some());
        assert!(check(&rule, Some(json!(""))).is_some());
        assert!(check(&rule, Some(json!(0))).is_none());
        assert!(check(&rule, Some(json!(false))).is_none());
        assert!(check(&rule, Some(json!("x"))).is_none());
    }

    #[test]
    fn pattern_skips_missing_values_but_checks_empty_strings() {
        let rule = Rule::pattern(r"^\d+$").expect("valid regex");
        assert!(check(&rule, None).is_none());
        assert!(check(&rule, Some(Value::Null)).is_none());
        assert!(check(&rule, Some(json!(""))).is_some());
        assert!(check(&rule, Some(json!(["1"]))).is_none());
        assert!(check(&rule, Some(json!("123"))).is_none());
        assert!(check(&rule, Some(json!(42))).is_none());
        assert_eq!(check(&rule, Some(json!("12a"))).as_deref(), Some("Invalid format"));
    }

    #[test]
    fn invalid_pattern_is_reported_at_construction() {
        assert!(Rule::pattern("(unclosed").is_err());
    }

    #[test]
    fn length_only_applies_to_strings() {
        let rule = Rule::length(Some(2), Some(4));
        assert!(check(&rule, Some(json!(12345))).is_none());
        assert!(check(&rule, Some(json!("abc"))).is_none());
        assert_eq!(
            check(&rule, Some(json!("a"))).as_deref(),
            Some("Must be between 2 and 4 characters")
        );
        assert_eq!(
            check(&Rule::min_len(3), Some(json!("ab"))).as_deref(),
            Some("Must be at least 3 characters")
        );
        assert_eq!(
            check(&Rule::max_len(1), Some(json!("ab"))).as_deref(),
            Some("Must be at most 1 characters")
        );
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        assert!(check(&Rule::max_len(2), Some(json!("éé"))).is_none());
    }

    #[test]
    fn custom_message_overrides_template() {
        let rule = Rule::required().with_message("{name} is missing");
        assert_eq!(check(&rule, None).as_deref(), Some("field is missing"));
        assert_eq!(rule.message(), Some("{name} is missing"));
    }

    #[test]
    fn async_validator_fault_message_wins() {
        let rule = Rule::validator(|_, _| async { Err(RuleFault::new("taken")) })
            .with_message("rule text");
        assert_eq!(check(&rule, Some(json!("x"))).as_deref(), Some("taken"));
    }

    #[test]
    fn silent_fault_falls_back_to_rule_message_then_default() {
        let rule = Rule::validator(|_, _| async { Err(RuleFault::silent()) });
        assert_eq!(check(&rule, None).as_deref(), Some("Validation failed"));
        let rule = rule.with_message("rule text");
        assert_eq!(check(&rule, None).as_deref(), Some("rule text"));
    }

    #[test]
    fn async_validator_receives_value_and_snapshot() {
        let rule = Rule::validator(|value, values| async move {
            if value == values["password"] {
                Ok(())
            } else {
                Err(RuleFault::new("mismatch"))
            }
        });
        let values = json!({ "password": "secret" });
        let messages = ValidateMessages::default();
        let ok = block_on(rule.check("confirm", Some(&json!("secret")), &values, &messages));
        let bad = block_on(rule.check("confirm", Some(&json!("other")), &values, &messages));
        assert_eq!(ok, None);
        assert_eq!(bad.as_deref(), Some("mismatch"));
    }

    fn explode(value: &Value) -> Result<(), RuleFault> {
        panic!("lookup exploded for {value}")
    }

    #[test]
    fn panicking_validator_becomes_message() {
        let rule = Rule::validator(|value, _| async move { explode(&value) });
        assert_eq!(
            check(&rule, None).as_deref(),
            Some("lookup exploded for null")
        );

        let rule = Rule::validator(|_, _| -> futures::future::Ready<Result<(), RuleFault>> {
            std::panic::panic_any(7_u8)
        });
        assert_eq!(check(&rule, None).as_deref(), Some("Validation failed"));
    }
}
