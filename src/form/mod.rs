mod binding;
mod controller;
mod list;
mod model;
pub mod path;
mod registry;
mod rule;
mod store;
mod validation;
mod watch;


pub use binding::{FieldHandle, FieldOptions};
pub use controller::{
    FinishFailedHandler, FinishHandler, FormError, FormInstance, FormOptions, FormResult,
};
pub use formwright_derive::FormModel;
pub use list::FormList;
pub use model::FormModel;
pub use path::FieldPath;
pub use registry::{
    FieldRegistration, RegistrationId, ValidateTrigger, ValidationTicket, ValueAccessor,
};
pub use rule::{AsyncValidatorFn, PatternError, Rule, RuleFault, ValidateMessages};
pub use store::{Action, FieldMeta, FormState, FormStore, Listener, MetaPatch, Subscription};
pub use validation::{FieldError, ValidateError};
pub use watch::{Equality, FieldWatch, WatchOptions, WatchSource};
