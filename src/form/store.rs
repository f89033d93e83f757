use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use serde_json::{Map, Value};

use super::path;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FieldMeta {
    pub errors: Vec<String>,
    pub touched: bool,
    pub validating: bool,
}

/// Partial update merged into a field's meta by [`Action::SetMeta`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MetaPatch {
    pub errors: Option<Vec<String>>,
    pub touched: Option<bool>,
    pub validating: Option<bool>,
}

impl MetaPatch {
    pub fn errors(mut self, errors: Vec<String>) -> Self {
        self.errors = Some(errors);
        self
    }

    pub fn touched(mut self, touched: bool) -> Self {
        self.touched = Some(touched);
        self
    }

    pub fn validating(mut self, validating: bool) -> Self {
        self.validating = Some(validating);
        self
    }

    fn apply(self, meta: &mut FieldMeta) {
        if let Some(errors) = self.errors {
            meta.errors = errors;
        }
        if let Some(touched) = self.touched {
            meta.touched = touched;
        }
        if let Some(validating) = self.validating {
            meta.validating = validating;
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    /// Path-aware write of a single value.
    SetValue { path: String, value: Value },
    /// Shallow top-level merge; nested objects in the patch replace existing ones.
    SetValues(Map<String, Value>),
    SetMeta { path: String, patch: MetaPatch },
    /// Replaces all values and drops every meta entry.
    Reset(Value),
}

impl Action {
    fn kind(&self) -> &'static str {
        match self {
            Action::SetValue { .. } => "set_value",
            Action::SetValues(_) => "set_values",
            Action::SetMeta { .. } => "set_meta",
            Action::Reset(_) => "reset",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FormState {
    pub values: Value,
    pub metas: BTreeMap<String, FieldMeta>,
}

impl FormState {
    pub fn new(values: Value) -> Self {
        Self {
            values,
            metas: BTreeMap::new(),
        }
    }

    /// Meta for `path`; absent entries read as the default meta.
    pub fn meta(&self, path: &str) -> FieldMeta {
        self.metas.get(path).cloned().unwrap_or_default()
    }

    pub fn reduce(mut self, action: Action) -> Self {
        match action {
            Action::SetValue { path, value } => {
                path::set(&mut self.values, &path, value);
            }
            Action::SetValues(patch) => match &mut self.values {
                Value::Object(values) => values.extend(patch),
                values => *values = Value::Object(patch),
            },
            Action::SetMeta { path, patch } => {
                patch.apply(self.metas.entry(path).or_default());
            }
            Action::Reset(values) => {
                self.values = values;
                self.metas.clear();
            }
        }
        self
    }
}

pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Holds the values/metas pair and fans mutations out to subscribed listeners.
pub struct FormStore {
    state: RwLock<FormState>,
    listeners: RwLock<BTreeMap<u64, Listener>>,
    next_listener: AtomicU64,
}

impl FormStore {
    pub fn new(values: Value) -> Self {
        Self {
            state: RwLock::new(FormState::new(values)),
            listeners: RwLock::new(BTreeMap::new()),
            next_listener: AtomicU64::new(1),
        }
    }

    pub fn dispatch(&self, action: Action) {
        let kind = action.kind();
        {
            let mut state = write_lock(&self.state, "dispatching action");
            let current = std::mem::take(&mut *state);
            *state = current.reduce(action);
        }
        tracing::trace!(action = kind, "form store dispatched");
        self.notify();
    }

    pub fn read<R>(&self, f: impl FnOnce(&FormState) -> R) -> R {
        f(&read_lock(&self.state, "reading state"))
    }

    pub fn values(&self) -> Value {
        self.read(|state| state.values.clone())
    }

    pub fn meta(&self, path: &str) -> FieldMeta {
        self.read(|state| state.meta(path))
    }

    pub fn subscribe(
        self: &Arc<Self>,
        listener: impl Fn() + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        write_lock(&self.listeners, "adding listener")
            .insert(id, Arc::new(listener));
        Subscription {
            store: Arc::downgrade(self),
            id,
            detached: false,
        }
    }

    pub fn listener_count(&self) -> usize {
        read_lock(&self.listeners, "counting listeners").len()
    }

    fn remove_listener(&self, id: u64) -> bool {
        write_lock(&self.listeners, "removing listener")
            .remove(&id)
            .is_some()
    }

    fn notify(&self) {
        let ids = read_lock(&self.listeners, "notifying listeners")
            .keys()
            .copied()
            .collect::<Vec<_>>();
        for id in ids {
            // Re-checked per call so a listener removed mid-notification never fires.
            let listener = read_lock(&self.listeners, "notifying listeners")
                .get(&id)
                .cloned();
            if let Some(listener) = listener {
                listener();
            }
        }
    }
}

/// Handle for a store listener. Dropping it removes the listener unless
/// [`Subscription::detach`] was called.
#[must_use = "dropping a Subscription removes its listener"]
pub struct Subscription {
    store: Weak<FormStore>,
    id: u64,
    detached: bool,
}

impl Subscription {
    /// Removes the listener. Repeat calls are no-ops.
    pub fn unsubscribe(&self) {
        if let Some(store) = self.store.upgrade() {
            if store.remove_listener(self.id) {
                tracing::trace!(listener = self.id, "form store listener removed");
            }
        }
    }

    /// Keeps the listener registered for the lifetime of the store.
    pub fn detach(mut self) {
        self.detached = true;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.detached {
            self.unsubscribe();
        }
    }
}

/// Read guard that survives a poisoned lock. `context` names the operation in the
/// recovery warning.
pub(super) fn read_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        tracing::warn!(context, "form lock poisoned; recovering");
        poisoned.into_inner()
    })
}

pub(super) fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        tracing::warn!(context, "form lock poisoned; recovering");
        poisoned.into_inner()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn set_values_is_a_shallow_merge() {
        let state = FormState::new(json!({ "a": { "x": 1, "y": 2 }, "b": 1 }));
        let next = state.reduce(Action::SetValues(object(json!({ "a": { "x": 9 } }))));
        assert_eq!(next.values, json!({ "a": { "x": 9 }, "b": 1 }));
    }

    #[test]
    fn set_value_is_path_aware() {
        let state = FormState::new(json!({ "a": { "x": 1, "y": 2 } }));
        let next = state.reduce(Action::SetValue {
            path: "a.x".into(),
            value: json!(9),
        });
        assert_eq!(next.values, json!({ "a": { "x": 9, "y": 2 } }));
    }

    #[test]
    fn set_meta_merges_into_default() {
        let state = FormState::default().reduce(Action::SetMeta {
            path: "email".into(),
            patch: MetaPatch::default().validating(true),
        });
        assert_eq!(
            state.meta("email"),
            FieldMeta {
                errors: Vec::new(),
                touched: false,
                validating: true,
            }
        );

        let state = state.reduce(Action::SetMeta {
            path: "email".into(),
            patch: MetaPatch::default().errors(vec!["required".into()]),
        });
        let meta = state.meta("email");
        assert!(meta.validating);
        assert_eq!(meta.errors, vec!["required".to_string()]);
        assert_eq!(state.meta("other"), FieldMeta::default());
    }

    #[test]
    fn reset_replaces_values_and_clears_metas() {
        let state = FormState::new(json!({ "a": 1 }))
            .reduce(Action::SetMeta {
                path: "a".into(),
                patch: MetaPatch::default().touched(true),
            })
            .reduce(Action::Reset(json!({ "b": 2 })));
        assert_eq!(state.values, json!({ "b": 2 }));
        assert!(state.metas.is_empty());
    }

    #[test]
    fn every_dispatch_notifies_listeners() {
        let store = Arc::new(FormStore::new(json!({})));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let subscription = store.subscribe(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.dispatch(Action::SetValue {
            path: "a".into(),
            value: json!(1),
        });
        store.dispatch(Action::SetMeta {
            path: "a".into(),
            patch: MetaPatch::default().touched(true),
        });
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        subscription.unsubscribe();
        subscription.unsubscribe();
        store.dispatch(Action::Reset(json!({})));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn dropping_subscription_removes_listener_unless_detached() {
        let store = Arc::new(FormStore::new(json!({})));
        drop(store.subscribe(|| {}));
        assert_eq!(store.listener_count(), 0);

        store.subscribe(|| {}).detach();
        assert_eq!(store.listener_count(), 1);
    }

    #[test]
    fn poisoned_lock_is_recovered() {
        let lock = Arc::new(RwLock::new(1));
        let poisoner = lock.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.write().expect("first writer");
            panic!("poison the lock");
        })
        .join();
        assert!(lock.is_poisoned());

        *write_lock(lock.as_ref(), "writing") += 1;
        assert_eq!(*read_lock(lock.as_ref(), "reading"), 2);
    }

    #[test]
    fn listener_may_read_store_during_notification() {
        let store = Arc::new(FormStore::new(json!({ "n": 0 })));
        let seen = Arc::new(RwLock::new(Vec::new()));
        let weak = Arc::downgrade(&store);
        let sink = seen.clone();
        let _subscription = store.subscribe(move || {
            if let Some(store) = weak.upgrade() {
                write_lock(sink.as_ref(), "recording").push(store.values()["n"].clone());
            }
        });

        store.dispatch(Action::SetValue {
            path: "n".into(),
            value: json!(1),
        });
        assert_eq!(*read_lock(seen.as_ref(), "reading"), vec![json!(1)]);
    }
}
