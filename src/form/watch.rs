use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::channel::mpsc::{UnboundedReceiver, unbounded};
use futures::{FutureExt, Stream, StreamExt};
use futures_timer::Delay;
use serde_json::{Map, Value};

use super::controller::{FormInner, FormInstance};
use super::path;
use super::store::Subscription;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum WatchSource {
    /// The whole values snapshot.
    #[default]
    All,
    Path(String),
    /// An object mapping each path to its value (`null` when missing).
    Paths(Vec<String>),
}

pub type Equality = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;

#[derive(Clone, Default)]
pub struct WatchOptions {
    pub source: WatchSource,
    /// Substituted when the selected path is undefined.
    pub default_value: Option<Value>,
    /// Trailing-edge delay; zero delivers each change as soon as it is observed.
    pub debounce: Duration,
    /// Overrides structural equality when deciding whether a value changed.
    pub equality: Option<Equality>,
}

impl WatchOptions {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn path(path: impl AsRef<str>) -> Self {
        Self {
            source: WatchSource::Path(path.as_ref().to_owned()),
            ..Self::default()
        }
    }

    pub fn paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        Self {
            source: WatchSource::Paths(
                paths
                    .into_iter()
                    .map(|path| path.as_ref().to_owned())
                    .collect(),
            ),
            ..Self::default()
        }
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn equality(
        mut self,
        equality: impl Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.equality = Some(Arc::new(equality));
        self
    }
}

/// Derived read of the form values, yielded as a stream of changes.
///
/// Every store mutation triggers a read of the selection, which is compared against
/// the last delivered value. With a debounce, a change (re)starts the timer and only
/// the selection at the time the timer fires is delivered. Dropping the watch removes
/// its listener and cancels a pending timer. The stream ends once the form is gone.
pub struct FieldWatch {
    form: Weak<FormInner>,
    options: WatchOptions,
    signals: UnboundedReceiver<()>,
    delivered: Option<Value>,
    timer: Option<Delay>,
    signals_closed: bool,
    _subscription: Subscription,
}

impl FormInstance {
    pub fn watch(&self, options: WatchOptions) -> FieldWatch {
        let (sender, signals) = unbounded();
        let subscription = self.subscribe(move || {
            let _ = sender.unbounded_send(());
        });
        let delivered = select(&self.get_fields_value(), &options);
        FieldWatch {
            form: Arc::downgrade(&self.inner),
            options,
            signals,
            delivered,
            timer: None,
            signals_closed: false,
            _subscription: subscription,
        }
    }
}

impl FieldWatch {
    /// The last delivered value, initially the selection at creation.
    pub fn current(&self) -> Option<&Value> {
        self.delivered.as_ref()
    }

    pub fn is_pending(&self) -> bool {
        self.timer.is_some()
    }

    fn read(&self) -> Option<Option<Value>> {
        let inner = self.form.upgrade()?;
        Some(select(&inner.store.values(), &self.options))
    }

    fn changed(&self, next: &Option<Value>) -> bool {
        match (&self.delivered, next) {
            (None, None) => false,
            (Some(previous), Some(next)) => match &self.options.equality {
                Some(equality) => !equality(previous, next),
                None => previous != next,
            },
            _ => true,
        }
    }

    fn deliver(&mut self, value: Option<Value>) -> Poll<Option<Option<Value>>> {
        tracing::trace!("watch delivered update");
        self.delivered = value.clone();
        Poll::Ready(Some(value))
    }
}

impl Stream for FieldWatch {
    type Item = Option<Value>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        while !self.signals_closed {
            match self.signals.poll_next_unpin(cx) {
                Poll::Ready(Some(())) => {
                    let Some(next) = self.read() else {
                        self.signals_closed = true;
                        break;
                    };
                    if !self.changed(&next) {
                        continue;
                    }
                    if self.options.debounce.is_zero() {
                        return self.deliver(next);
                    }
                    self.timer = Some(Delay::new(self.options.debounce));
                }
                Poll::Ready(None) => self.signals_closed = true,
                Poll::Pending => break,
            }
        }

        if let Some(timer) = self.timer.as_mut() {
            if timer.poll_unpin(cx).is_pending() {
                return Poll::Pending;
            }
            self.timer = None;
            if let Some(next) = self.read() {
                if self.changed(&next) {
                    return self.deliver(next);
                }
            }
        }

        if self.signals_closed || self.form.strong_count() == 0 {
            Poll::Ready(None)
        } else {
            Poll::Pending
        }
    }
}

fn select(values: &Value, options: &WatchOptions) -> Option<Value> {
    match &options.source {
        WatchSource::All => Some(values.clone()),
        WatchSource::Path(name) => path::get(values, name)
            .cloned()
            .or_else(|| options.default_value.clone()),
        WatchSource::Paths(names) => Some(Value::Object(
            names
                .iter()
                .map(|name| {
                    let value = path::get(values, name).cloned().unwrap_or(Value::Null);
                    (name.clone(), value)
                })
                .collect::<Map<String, Value>>(),
        )),
    }
}
