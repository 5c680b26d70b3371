//! Subscription and method call records, and the registry that owns them.
//!
//! Records are shared: the registry holds one reference, the caller holds
//! the handle returned by `subscribe`/`call`. Only the connection mutates
//! the registry; handles observe state through interior mutability.

use ddp_protocol::{ClientMessage, DdpError};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

type SubscriptionCallback = Box<dyn FnOnce(&Subscription) + Send>;
type CallCallback = Box<dyn FnOnce(&MethodCall) + Send>;

/// A subscription to a server publication.
pub struct Subscription {
    id: u64,
    name: String,
    params: Vec<Value>,
    ready: AtomicBool,
    active: AtomicBool,
    error: Mutex<Option<DdpError>>,
    on_ready: Mutex<Vec<SubscriptionCallback>>,
    ready_tx: watch::Sender<bool>,
}

impl Subscription {
    fn new(id: u64, name: String, params: Vec<Value>) -> Self {
        Self {
            id,
            name,
            params,
            ready: AtomicBool::new(false),
            active: AtomicBool::new(true),
            error: Mutex::new(None),
            on_ready: Mutex::new(Vec::new()),
            ready_tx: watch::Sender::new(false),
        }
    }

    /// The subscription id as sent on the wire.
    pub fn id(&self) -> String {
        self.id.to_string()
    }

    /// The publication name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The publication arguments.
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Whether the server sent the initial record set.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Whether the subscription is still registered.
    ///
    /// False once the server acknowledged the end of the subscription, or
    /// the connection closed cleanly.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// The error carried by the `nosub` that ended this subscription.
    pub fn error(&self) -> Option<DdpError> {
        self.error.lock().clone()
    }

    /// Registers a callback run once when the subscription becomes ready.
    ///
    /// Runs immediately if it already is.
    pub fn on_ready(&self, callback: impl FnOnce(&Subscription) + Send + 'static) {
        {
            let mut callbacks = self.on_ready.lock();
            if !self.is_ready() {
                callbacks.push(Box::new(callback));
                return;
            }
        }
        callback(self);
    }

    /// Waits until the subscription is ready.
    pub async fn wait_ready(&self) {
        let mut rx = self.ready_tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|ready| *ready).await;
    }

    /// Marks the subscription ready and runs its callbacks.
    ///
    /// Returns false if it was already ready.
    pub(crate) fn mark_ready(&self) -> bool {
        let callbacks = {
            let mut callbacks = self.on_ready.lock();
            if self.ready.swap(true, Ordering::SeqCst) {
                return false;
            }
            std::mem::take(&mut *callbacks)
        };
        self.ready_tx.send_replace(true);
        for callback in callbacks {
            callback(self);
        }
        true
    }

    pub(crate) fn stop(&self, error: Option<DdpError>) {
        self.active.store(false, Ordering::SeqCst);
        if error.is_some() {
            *self.error.lock() = error;
        }
    }

    pub(crate) fn sub_message(&self) -> ClientMessage {
        ClientMessage::Sub {
            id: self.id(),
            name: self.name.clone(),
            params: self.params.clone(),
        }
    }

    pub(crate) fn unsub_message(&self) -> ClientMessage {
        ClientMessage::Unsub { id: self.id() }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("params", &self.params)
            .field("ready", &self.is_ready())
            .field("active", &self.is_active())
            .finish()
    }
}

#[derive(Debug, Default)]
struct CallState {
    result: Value,
    error: Option<DdpError>,
    has_result: bool,
    has_updated: bool,
}

/// A remote method invocation.
///
/// Completes in two independent steps: `result` carries the return value,
/// `updated` says every write the method made has reached this client.
/// The two can arrive in either order.
pub struct MethodCall {
    id: u64,
    method: String,
    params: Vec<Value>,
    state: Mutex<CallState>,
    on_result: Mutex<Vec<CallCallback>>,
    on_updated: Mutex<Vec<CallCallback>>,
    result_tx: watch::Sender<bool>,
    updated_tx: watch::Sender<bool>,
}

impl MethodCall {
    fn new(id: u64, method: String, params: Vec<Value>) -> Self {
        Self {
            id,
            method,
            params,
            state: Mutex::new(CallState::default()),
            on_result: Mutex::new(Vec::new()),
            on_updated: Mutex::new(Vec::new()),
            result_tx: watch::Sender::new(false),
            updated_tx: watch::Sender::new(false),
        }
    }

    /// The call id as sent on the wire.
    pub fn id(&self) -> String {
        self.id.to_string()
    }

    /// The method name.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The method arguments.
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Whether the `result` message arrived.
    pub fn has_result(&self) -> bool {
        self.state.lock().has_result
    }

    /// Whether the `updated` message arrived.
    pub fn has_updated(&self) -> bool {
        self.state.lock().has_updated
    }

    /// Whether both `result` and `updated` arrived.
    pub fn is_complete(&self) -> bool {
        let state = self.state.lock();
        state.has_result && state.has_updated
    }

    /// The return value. `Value::Null` until the result arrives.
    pub fn result(&self) -> Value {
        self.state.lock().result.clone()
    }

    /// The error thrown by the method, if any.
    pub fn error(&self) -> Option<DdpError> {
        self.state.lock().error.clone()
    }

    /// The outcome, once the result arrived.
    pub fn outcome(&self) -> Option<Result<Value, DdpError>> {
        let state = self.state.lock();
        if !state.has_result {
            return None;
        }
        Some(match &state.error {
            Some(error) => Err(error.clone()),
            None => Ok(state.result.clone()),
        })
    }

    /// Registers a callback run once when the result arrives.
    ///
    /// Runs immediately if it already has.
    pub fn on_result(&self, callback: impl FnOnce(&MethodCall) + Send + 'static) {
        {
            let mut callbacks = self.on_result.lock();
            if !self.has_result() {
                callbacks.push(Box::new(callback));
                return;
            }
        }
        callback(self);
    }

    /// Registers a callback run once when the call's writes are settled.
    ///
    /// Runs immediately if they already are.
    pub fn on_updated(&self, callback: impl FnOnce(&MethodCall) + Send + 'static) {
        {
            let mut callbacks = self.on_updated.lock();
            if !self.has_updated() {
                callbacks.push(Box::new(callback));
                return;
            }
        }
        callback(self);
    }

    /// Waits for the result and returns the outcome.
    ///
    /// Does not wait for `updated`. Never resolves for a call abandoned by a
    /// clean connection close; wrap it in a timeout if that matters.
    pub async fn wait_result(&self) -> Result<Value, DdpError> {
        let mut rx = self.result_tx.subscribe();
        let _ = rx.wait_for(|done| *done).await;
        match self.outcome() {
            Some(outcome) => outcome,
            None => Ok(Value::Null),
        }
    }

    /// Waits until the call's writes are settled.
    pub async fn wait_updated(&self) {
        let mut rx = self.updated_tx.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }

    /// Records the result. Returns `None` for a duplicate, otherwise whether
    /// the call is now complete.
    pub(crate) fn record_result(&self, result: Value, error: Option<DdpError>) -> Option<bool> {
        let mut state = self.state.lock();
        if state.has_result {
            return None;
        }
        state.error = error;
        state.result = result;
        state.has_result = true;
        Some(state.has_updated)
    }

    /// Records `updated`. Returns `None` for a duplicate, otherwise whether
    /// the call is now complete.
    pub(crate) fn record_updated(&self) -> Option<bool> {
        let mut state = self.state.lock();
        if state.has_updated {
            return None;
        }
        state.has_updated = true;
        Some(state.has_result)
    }

    pub(crate) fn fire_result(&self) {
        let callbacks = std::mem::take(&mut *self.on_result.lock());
        for callback in callbacks {
            callback(self);
        }
        // Waiters wake after callbacks so they observe what callbacks did.
        self.result_tx.send_replace(true);
    }

    pub(crate) fn fire_updated(&self) {
        let callbacks = std::mem::take(&mut *self.on_updated.lock());
        for callback in callbacks {
            callback(self);
        }
        // Waiters wake after callbacks so they observe what callbacks did.
        self.updated_tx.send_replace(true);
    }

    pub(crate) fn method_message(&self) -> ClientMessage {
        ClientMessage::Method {
            method: self.method.clone(),
            params: self.params.clone(),
            id: self.id(),
        }
    }
}

impl std::fmt::Debug for MethodCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MethodCall")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("params", &self.params)
            .field("has_result", &state.has_result)
            .field("has_updated", &state.has_updated)
            .finish()
    }
}

/// Parses a wire id back into a registry key.
///
/// Only the exact decimal form we generated is accepted.
fn parse_id(id: &str) -> Option<u64> {
    let key: u64 = id.parse().ok()?;
    (key.to_string() == id).then_some(key)
}

/// Live subscriptions and pending calls, keyed by their numeric id.
///
/// Keys are handed out by monotonic counters that never reset, so ids are
/// unique for the connection's lifetime and iteration order is
/// registration order.
#[derive(Default)]
pub(crate) struct Registry {
    subscriptions: BTreeMap<u64, Arc<Subscription>>,
    calls: BTreeMap<u64, Arc<MethodCall>>,
    next_subscription_id: u64,
    next_call_id: u64,
}

impl Registry {
    pub(crate) fn add_subscription(&mut self, name: String, params: Vec<Value>) -> Arc<Subscription> {
        let id = self.next_subscription_id;
        self.next_subscription_id += 1;
        let subscription = Arc::new(Subscription::new(id, name, params));
        self.subscriptions.insert(id, Arc::clone(&subscription));
        subscription
    }

    pub(crate) fn add_call(&mut self, method: String, params: Vec<Value>) -> Arc<MethodCall> {
        let id = self.next_call_id;
        self.next_call_id += 1;
        let call = Arc::new(MethodCall::new(id, method, params));
        self.calls.insert(id, Arc::clone(&call));
        call
    }

    pub(crate) fn subscription(&self, id: &str) -> Option<Arc<Subscription>> {
        self.subscriptions.get(&parse_id(id)?).cloned()
    }

    pub(crate) fn remove_subscription(&mut self, id: &str) -> Option<Arc<Subscription>> {
        self.subscriptions.remove(&parse_id(id)?)
    }

    pub(crate) fn call(&self, id: &str) -> Option<Arc<MethodCall>> {
        self.calls.get(&parse_id(id)?).cloned()
    }

    pub(crate) fn remove_call(&mut self, id: &str) -> Option<Arc<MethodCall>> {
        self.calls.remove(&parse_id(id)?)
    }

    pub(crate) fn subscriptions(&self) -> Vec<Arc<Subscription>> {
        self.subscriptions.values().cloned().collect()
    }

    pub(crate) fn calls(&self) -> Vec<Arc<MethodCall>> {
        self.calls.values().cloned().collect()
    }

    /// Empties both maps. Counters keep running.
    pub(crate) fn clear(&mut self) -> (Vec<Arc<Subscription>>, Vec<Arc<MethodCall>>) {
        let subscriptions = std::mem::take(&mut self.subscriptions).into_values().collect();
        let calls = std::mem::take(&mut self.calls).into_values().collect();
        (subscriptions, calls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddp_protocol::ErrorKind;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn ids_are_monotonic_and_survive_clear() {
        let mut registry = Registry::default();
        let a = registry.add_subscription("items".into(), vec![]);
        let b = registry.add_subscription("items".into(), vec![]);
        let c = registry.add_call("m".into(), vec![]);
        assert_eq!(a.id(), "0");
        assert_eq!(b.id(), "1");
        assert_eq!(c.id(), "0");

        registry.clear();
        assert!(registry.subscriptions().is_empty());
        let d = registry.add_subscription("items".into(), vec![]);
        assert_eq!(d.id(), "2");
    }

    #[test]
    fn lookup_requires_exact_id() {
        let mut registry = Registry::default();
        for _ in 0..8 {
            registry.add_call("m".into(), vec![]);
        }
        assert!(registry.call("7").is_some());
        assert!(registry.call("07").is_none());
        assert!(registry.call("x").is_none());
        assert!(registry.call("99").is_none());
    }

    #[test]
    fn registry_order_is_registration_order() {
        let mut registry = Registry::default();
        for name in ["a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k"] {
            registry.add_subscription(name.into(), vec![]);
        }
        let names: Vec<String> = registry
            .subscriptions()
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names.join(""), "abcdefghijk");
    }

    #[test]
    fn ready_fires_callbacks_once() {
        let sub = Subscription::new(0, "items".into(), vec![]);
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fired);
        sub.on_ready(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(sub.mark_ready());
        assert!(!sub.mark_ready());
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // Late registration runs immediately.
        let counter = Arc::clone(&fired);
        sub.on_ready(move |s| {
            assert!(s.is_ready());
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn result_then_updated_completes_once() {
        let call = MethodCall::new(0, "math.add".into(), vec![json!(2), json!(3)]);
        assert_eq!(call.record_result(json!(5), None), Some(false));
        assert_eq!(call.record_result(json!(6), None), None);
        assert_eq!(call.record_updated(), Some(true));
        assert_eq!(call.record_updated(), None);
        assert!(call.is_complete());
        assert_eq!(call.result(), json!(5));
    }

    #[test]
    fn updated_then_result_completes_once() {
        let call = MethodCall::new(0, "m".into(), vec![]);
        assert_eq!(call.record_updated(), Some(false));
        let error = DdpError::new(ErrorKind::Application, "500", "boom");
        assert_eq!(call.record_result(Value::Null, Some(error.clone())), Some(true));
        assert_eq!(call.outcome(), Some(Err(error)));
    }

    #[test]
    fn result_callbacks_run_after_recording() {
        let call = Arc::new(MethodCall::new(0, "m".into(), vec![]));
        let seen = Arc::new(Mutex::new(None));

        let slot = Arc::clone(&seen);
        call.on_result(move |c| {
            *slot.lock() = Some(c.result());
        });
        assert!(seen.lock().is_none());

        call.record_result(json!("ok"), None);
        call.fire_result();
        assert_eq!(*seen.lock(), Some(json!("ok")));
    }

    #[tokio::test]
    async fn wait_result_resolves() {
        let call = Arc::new(MethodCall::new(0, "m".into(), vec![]));
        let waiter = {
            let call = Arc::clone(&call);
            tokio::spawn(async move { call.wait_result().await })
        };

        call.record_result(json!(42), None);
        call.fire_result();

        assert_eq!(waiter.await.unwrap(), Ok(json!(42)));
    }

    #[tokio::test]
    async fn wait_ready_after_ready_returns_immediately() {
        let sub = Subscription::new(3, "items".into(), vec![]);
        sub.mark_ready();
        sub.wait_ready().await;
        assert!(sub.is_ready());
    }

    #[test]
    fn wire_messages() {
        let sub = Subscription::new(4, "items".into(), vec![json!("a")]);
        assert_eq!(
            sub.sub_message(),
            ClientMessage::Sub {
                id: "4".into(),
                name: "items".into(),
                params: vec![json!("a")],
            }
        );
        assert_eq!(sub.unsub_message(), ClientMessage::Unsub { id: "4".into() });

        let call = MethodCall::new(9, "m".into(), vec![]);
        assert_eq!(
            call.method_message(),
            ClientMessage::Method {
                method: "m".into(),
                params: vec![],
                id: "9".into(),
            }
        );
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn canonical_ids_parse_back(key in any::<u64>()) {
                prop_assert_eq!(parse_id(&key.to_string()), Some(key));
            }

            #[test]
            fn non_canonical_ids_are_rejected(key in any::<u32>(), zeros in 1usize..3) {
                let padded = format!("{}{}", "0".repeat(zeros), key);
                prop_assert_eq!(parse_id(&padded), None);
            }

            #[test]
            fn lookups_only_find_issued_ids(count in 1usize..8, candidate in "[0-9a-z]{1,4}") {
                let mut registry = Registry::default();
                let issued: Vec<String> = (0..count)
                    .map(|_| registry.add_call("m".into(), vec![]).id())
                    .collect();
                prop_assert_eq!(registry.call(&candidate).is_some(), issued.contains(&candidate));
            }
        }
    }
}
