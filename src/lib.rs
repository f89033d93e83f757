//! Form state, validation and watch runtime for data-entry screens.
//!
//! A [`FormInstance`](form::FormInstance) owns a nested JSON values tree and per-field
//! meta, routes every mutation through four store actions, validates registered fields
//! with sync and async rules, and feeds derived, optionally debounced watchers.

pub mod form;
pub mod prelude;
