use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use futures::future::{AbortHandle, AbortRegistration};
use serde_json::Value;

use super::rule::Rule;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ValidateTrigger {
    #[default]
    Change,
    Blur,
    Submit,
    Never,
}

pub type ValueAccessor = Arc<dyn Fn() -> Option<Value> + Send + Sync>;

#[derive(Clone)]
pub struct FieldRegistration {
    pub path: String,
    pub rules: Vec<Rule>,
    pub validate_trigger: ValidateTrigger,
    pub dependencies: Vec<String>,
    pub value_accessor: ValueAccessor,
}

impl FieldRegistration {
    pub fn value(&self) -> Option<Value> {
        (self.value_accessor)()
    }
}

impl Debug for FieldRegistration {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldRegistration")
            .field("path", &self.path)
            .field("rules", &self.rules)
            .field("validate_trigger", &self.validate_trigger)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

/// Identifies one validation run of one field. Issued from a per-form counter, so a
/// ticket is never reused within a form.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ValidationTicket(pub u64);

/// Identifies one registration of a path; a re-registration gets a new one.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RegistrationId(pub u64);

struct Entry {
    id: RegistrationId,
    registration: FieldRegistration,
    latest: Option<ValidationTicket>,
    in_flight: Vec<(ValidationTicket, AbortHandle)>,
}

impl Entry {
    fn abort_in_flight(&mut self) {
        for (_, handle) in self.in_flight.drain(..) {
            handle.abort();
        }
    }
}

pub(super) struct ValidationRun {
    pub(super) ticket: ValidationTicket,
    pub(super) rules: Vec<Rule>,
    pub(super) abort: AbortRegistration,
}

/// Registered fields in registration order.
#[derive(Default)]
pub(super) struct FieldRegistry {
    entries: Vec<Entry>,
    next_id: u64,
}

impl FieldRegistry {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn position(&self, path: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.registration.path == path)
    }

    /// Stores `registration`, replacing any registration at the same path in place. Runs
    /// started under a replaced registration are cancelled.
    pub(super) fn register(&mut self, registration: FieldRegistration) -> RegistrationId {
        let id = RegistrationId(self.next_id());
        match self.position(&registration.path) {
            Some(index) => {
                let entry = &mut self.entries[index];
                entry.abort_in_flight();
                entry.latest = None;
                entry.id = id;
                entry.registration = registration;
            }
            None => self.entries.push(Entry {
                id,
                registration,
                latest: None,
                in_flight: Vec::new(),
            }),
        }
        id
    }

    /// Removes the registration at `path` and cancels its in-flight validations.
    /// With `only`, the entry is removed only if it is still that registration.
    pub(super) fn unregister(
        &mut self,
        path: &str,
        only: Option<RegistrationId>,
    ) -> Option<FieldRegistration> {
        let index = self.position(path)?;
        if only.is_some_and(|id| self.entries[index].id != id) {
            return None;
        }
        let mut entry = self.entries.remove(index);
        entry.abort_in_flight();
        Some(entry.registration)
    }

    pub(super) fn get(&self, path: &str) -> Option<FieldRegistration> {
        self.position(path)
            .map(|index| self.entries[index].registration.clone())
    }

    pub(super) fn paths(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|entry| entry.registration.path.clone())
            .collect()
    }

    /// Registered fields that list `path` among their dependencies.
    pub(super) fn dependents_of(&self, path: &str) -> Vec<FieldRegistration> {
        self.entries
            .iter()
            .filter(|entry| entry.registration.dependencies.iter().any(|dep| dep == path))
            .map(|entry| entry.registration.clone())
            .collect()
    }

    /// Issues a ticket for a new run, or `None` when the field is unknown or has no rules.
    pub(super) fn begin(&mut self, path: &str) -> Option<ValidationRun> {
        let index = self.position(path)?;
        if self.entries[index].registration.rules.is_empty() {
            return None;
        }
        let ticket = ValidationTicket(self.next_id());
        let (handle, abort) = AbortHandle::new_pair();
        let entry = &mut self.entries[index];
        entry.latest = Some(ticket);
        entry.in_flight.push((ticket, handle));
        Some(ValidationRun {
            ticket,
            rules: entry.registration.rules.clone(),
            abort,
        })
    }

    /// Ends a run. Returns whether its result may be committed, i.e. the field is still
    /// registered and no newer run has started since.
    pub(super) fn finish(&mut self, path: &str, ticket: ValidationTicket) -> bool {
        let Some(index) = self.position(path) else {
            return false;
        };
        let entry = &mut self.entries[index];
        entry.in_flight.retain(|(candidate, _)| *candidate != ticket);
        entry.latest == Some(ticket)
    }

    /// Whether a run for `path` under its current registration is still pending.
    pub(super) fn has_pending_run(&self, path: &str) -> bool {
        self.position(path)
            .is_some_and(|index| !self.entries[index].in_flight.is_empty())
    }

    /// Makes every pending run stale without aborting it.
    pub(super) fn invalidate_runs(&mut self) {
        for entry in &mut self.entries {
            entry.latest = None;
        }
    }
}
