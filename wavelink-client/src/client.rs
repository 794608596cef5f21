//! Client orchestrator
//!
//! `Client` owns the transport and fans its events out: replies are offered
//! to the subscription that claims the id, publication pushes are routed by
//! channel, and the set of server-side subscriptions (channels the server
//! attaches at connect time) is tracked across reconnects by diffing each
//! connect result against the remembered set.
//!
//! A channel lives either in the client-side subscription registry or in the
//! server-side set, never both: `new_subscription` refuses channels the
//! server owns, and `publish` only targets server-side channels (client-side
//! channels publish through their [`Subscription`] handle).

use crate::config::ClientConfig;
use crate::subscription::Subscription;
use crate::transport::{ConnectionState, Transport, TransportHooks};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, Weak};
use wavelink_core::protocol::{
    Command, ConnectResult, Publication, PublishRequest, Push, PushKind, Reply, ReplyResult,
    Request, SendRequest,
};
use wavelink_core::{Error, Result};

type Slot<T> = Mutex<Option<Arc<T>>>;

#[derive(Default)]
struct ClientCallbacks {
    connecting: Slot<dyn Fn(&Error) + Send + Sync>,
    connected: Slot<dyn Fn() + Send + Sync>,
    disconnected: Slot<dyn Fn(&Error) + Send + Sync>,
    subscribing: Slot<dyn Fn(&str) + Send + Sync>,
    subscribed: Slot<dyn Fn(&str) + Send + Sync>,
    unsubscribed: Slot<dyn Fn(&str) + Send + Sync>,
    publication: Slot<dyn Fn(&str, &Publication) + Send + Sync>,
    error: Slot<dyn Fn(&Error) + Send + Sync>,
}

struct ClientInner {
    transport: Arc<Transport>,
    subscriptions: Mutex<HashMap<String, Subscription>>,
    server_subscriptions: Mutex<HashSet<String>>,
    callbacks: ClientCallbacks,
}

/// A realtime pub/sub client.
///
/// ```no_run
/// use wavelink_client::{Client, ClientConfig};
///
/// # async fn example() -> wavelink_core::Result<()> {
/// let client = Client::new(
///     "ws://localhost:8000/connection/websocket",
///     ClientConfig::default().with_token("jwt"),
/// );
/// client.on_connected(|| println!("connected"));
///
/// let sub = client.new_subscription("news")?;
/// sub.on_publication(|publication| println!("got: {}", publication.data));
/// sub.subscribe()?;
///
/// client.connect()?;
/// # Ok(())
/// # }
/// ```
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    pub fn new(url: impl Into<String>, config: ClientConfig) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<ClientInner>| {
            let hooks = TransportHooks {
                on_connecting: Some(Box::new(hook(weak, ClientInner::handle_connecting))),
                on_connected: Some(Box::new(hook(weak, ClientInner::handle_connected))),
                on_disconnected: Some(Box::new(hook(weak, ClientInner::handle_disconnected))),
                on_reply: Some(Box::new(hook(weak, ClientInner::handle_reply))),
                on_error: Some(Box::new(hook(weak, ClientInner::handle_error))),
            };
            ClientInner {
                transport: Transport::new(url.into(), config, hooks),
                subscriptions: Mutex::new(HashMap::new()),
                server_subscriptions: Mutex::new(HashSet::new()),
                callbacks: ClientCallbacks::default(),
            }
        });
        Self { inner }
    }

    /// Validate configuration and start connecting. Must be called from
    /// within a tokio runtime.
    pub fn connect(&self) -> Result<()> {
        self.inner.transport.initial_connect()
    }

    /// Force the client to Disconnected and stop reconnecting.
    pub fn disconnect(&self) {
        self.inner
            .transport
            .disconnect(Error::lifecycle("disconnect called"));
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.transport.state()
    }

    /// Create a subscription for a channel not yet known to this client,
    /// either as a client-side or a server-side subscription.
    pub fn new_subscription(&self, channel: impl Into<String>) -> Result<Subscription> {
        let channel = channel.into();
        let mut subscriptions = self.inner.subscriptions.lock().unwrap();
        if subscriptions.contains_key(&channel) {
            return Err(Error::Config(format!(
                "subscription already exists for channel {channel}"
            )));
        }
        if self
            .inner
            .server_subscriptions
            .lock()
            .unwrap()
            .contains(&channel)
        {
            return Err(Error::Config(format!(
                "channel {channel} already exists as a server-side subscription"
            )));
        }
        let subscription = Subscription::new(channel.as_str(), Arc::clone(&self.inner.transport));
        subscriptions.insert(channel, subscription.clone());
        Ok(subscription)
    }

    /// Drop a subscription from the registry. The caller is responsible for
    /// having unsubscribed first.
    pub fn remove_subscription(&self, subscription: &Subscription) {
        self.inner
            .subscriptions
            .lock()
            .unwrap()
            .remove(subscription.channel());
    }

    pub fn subscription(&self, channel: &str) -> Option<Subscription> {
        self.inner.subscriptions.lock().unwrap().get(channel).cloned()
    }

    pub fn subscriptions(&self) -> HashMap<String, Subscription> {
        self.inner.subscriptions.lock().unwrap().clone()
    }

    /// Publish to a server-side subscription channel. Fails with
    /// `NotSubscribed` unless connected and the channel is server-side.
    pub fn publish(&self, channel: &str, data: serde_json::Value) -> Result<()> {
        if self.state() != ConnectionState::Connected
            || !self
                .inner
                .server_subscriptions
                .lock()
                .unwrap()
                .contains(channel)
        {
            return Err(Error::NotSubscribed);
        }
        let command = Command {
            id: self.inner.transport.next_command_id(),
            request: Request::Publish(PublishRequest {
                channel: channel.to_string(),
                data,
            }),
        };
        self.inner.transport.send(command)
    }

    /// Send a fire-and-forget message to the server. No reply is expected.
    pub fn send(&self, data: serde_json::Value) -> Result<()> {
        if self.state() != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }
        let command = Command {
            id: 0,
            request: Request::Send(SendRequest { data }),
        };
        self.inner.transport.send(command)
    }

    pub fn on_connecting<F: Fn(&Error) + Send + Sync + 'static>(&self, callback: F) {
        *self.inner.callbacks.connecting.lock().unwrap() = Some(Arc::new(callback));
    }

    pub fn on_connected<F: Fn() + Send + Sync + 'static>(&self, callback: F) {
        *self.inner.callbacks.connected.lock().unwrap() = Some(Arc::new(callback));
    }

    pub fn on_disconnected<F: Fn(&Error) + Send + Sync + 'static>(&self, callback: F) {
        *self.inner.callbacks.disconnected.lock().unwrap() = Some(Arc::new(callback));
    }

    /// Fires per channel when a server-side subscription starts
    /// (re-)subscribing.
    pub fn on_subscribing<F: Fn(&str) + Send + Sync + 'static>(&self, callback: F) {
        *self.inner.callbacks.subscribing.lock().unwrap() = Some(Arc::new(callback));
    }

    pub fn on_subscribed<F: Fn(&str) + Send + Sync + 'static>(&self, callback: F) {
        *self.inner.callbacks.subscribed.lock().unwrap() = Some(Arc::new(callback));
    }

    pub fn on_unsubscribed<F: Fn(&str) + Send + Sync + 'static>(&self, callback: F) {
        *self.inner.callbacks.unsubscribed.lock().unwrap() = Some(Arc::new(callback));
    }

    /// Fires for publications on server-side subscription channels.
    /// Client-side channels deliver through their own subscription handle.
    pub fn on_publication<F: Fn(&str, &Publication) + Send + Sync + 'static>(&self, callback: F) {
        *self.inner.callbacks.publication.lock().unwrap() = Some(Arc::new(callback));
    }

    pub fn on_error<F: Fn(&Error) + Send + Sync + 'static>(&self, callback: F) {
        *self.inner.callbacks.error.lock().unwrap() = Some(Arc::new(callback));
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.transport
            .disconnect(Error::lifecycle("client dropped"));
    }
}

/// Adapt an inner method into a transport hook that goes quiet once the
/// client is gone.
fn hook<T>(
    weak: &Weak<ClientInner>,
    method: fn(&ClientInner, &T) -> (),
) -> impl Fn(&T) + Send + Sync
where
    T: ?Sized,
{
    let weak = weak.clone();
    move |value: &T| {
        if let Some(inner) = weak.upgrade() {
            method(&inner, value);
        }
    }
}

impl ClientInner {
    fn client_subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions.lock().unwrap().values().cloned().collect()
    }

    fn server_channels(&self) -> Vec<String> {
        self.server_subscriptions
            .lock()
            .unwrap()
            .iter()
            .cloned()
            .collect()
    }

    fn handle_connecting(&self, cause: &Error) {
        if let Some(callback) = self.callbacks.connecting.lock().unwrap().clone() {
            callback(cause);
        }
        // Server-side subscriptions are expected to come back with the
        // connection; announce the pending re-subscribe.
        if let Some(callback) = self.callbacks.subscribing.lock().unwrap().clone() {
            for channel in self.server_channels() {
                callback(&channel);
            }
        }
        for subscription in self.client_subscriptions() {
            subscription.transport_connecting();
        }
    }

    fn handle_connected(&self, result: &ConnectResult) {
        if let Some(callback) = self.callbacks.connected.lock().unwrap().clone() {
            callback();
        }

        let (removed, added): (Vec<String>, Vec<String>) = {
            let mut server = self.server_subscriptions.lock().unwrap();
            let removed: Vec<String> = server
                .iter()
                .filter(|channel| !result.subs.contains_key(*channel))
                .cloned()
                .collect();
            for channel in &removed {
                server.remove(channel);
            }
            let added: Vec<String> = result
                .subs
                .keys()
                .filter(|channel| !server.contains(*channel))
                .cloned()
                .collect();
            for channel in &added {
                server.insert(channel.clone());
            }
            (removed, added)
        };

        if let Some(callback) = self.callbacks.unsubscribed.lock().unwrap().clone() {
            for channel in &removed {
                callback(channel);
            }
        }
        if let Some(callback) = self.callbacks.subscribing.lock().unwrap().clone() {
            for channel in &added {
                callback(channel);
            }
        }
        if let Some(callback) = self.callbacks.subscribed.lock().unwrap().clone() {
            for channel in result.subs.keys() {
                callback(channel);
            }
        }

        for subscription in self.client_subscriptions() {
            subscription.transport_connected();
        }
    }

    fn handle_disconnected(&self, cause: &Error) {
        if let Some(callback) = self.callbacks.disconnected.lock().unwrap().clone() {
            callback(cause);
        }
        // The set itself is retained for the next connect.
        if let Some(callback) = self.callbacks.unsubscribed.lock().unwrap().clone() {
            for channel in self.server_channels() {
                callback(&channel);
            }
        }
    }

    fn handle_reply(&self, reply: &Reply) {
        for subscription in self.client_subscriptions() {
            if subscription.handle_reply(reply) {
                return;
            }
        }
        match &reply.result {
            ReplyResult::Error(error) => {
                self.handle_error(&Error::Server {
                    code: error.code,
                    message: error.message.clone(),
                    temporary: error.temporary,
                });
            }
            ReplyResult::Push(push) => self.handle_push(push),
            _ => {}
        }
    }

    fn handle_push(&self, push: &Push) {
        match &push.kind {
            PushKind::Publication(publication) => {
                if self
                    .server_subscriptions
                    .lock()
                    .unwrap()
                    .contains(&push.channel)
                {
                    if let Some(callback) = self.callbacks.publication.lock().unwrap().clone() {
                        callback(&push.channel, publication);
                    }
                    return;
                }
                let subscription = self.subscriptions.lock().unwrap().get(&push.channel).cloned();
                if let Some(subscription) = subscription {
                    subscription.handle_publication(publication);
                    return;
                }
                tracing::debug!(channel = %push.channel, "publication for unknown channel dropped");
            }
            _ => {
                tracing::debug!(channel = %push.channel, "unhandled push kind");
            }
        }
    }

    fn handle_error(&self, error: &Error) {
        if let Some(callback) = self.callbacks.error.lock().unwrap().clone() {
            callback(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wavelink_core::protocol::SubscribeResult;

    fn client() -> Client {
        Client::new("ws://localhost:9000", ClientConfig::default())
    }

    fn connect_result(channels: &[&str]) -> ConnectResult {
        let mut result = ConnectResult {
            client: "c1".into(),
            ..Default::default()
        };
        for channel in channels {
            result
                .subs
                .insert(channel.to_string(), SubscribeResult::default());
        }
        result
    }

    #[test]
    fn duplicate_channels_are_rejected() {
        let client = client();
        client.new_subscription("news").unwrap();
        assert!(client.new_subscription("news").is_err());

        client
            .inner
            .server_subscriptions
            .lock()
            .unwrap()
            .insert("updates".into());
        assert!(client.new_subscription("updates").is_err());
    }

    #[test]
    fn remove_subscription_frees_the_channel() {
        let client = client();
        let subscription = client.new_subscription("news").unwrap();
        client.remove_subscription(&subscription);
        assert!(client.subscription("news").is_none());
        assert!(client.new_subscription("news").is_ok());
    }

    #[test]
    fn publish_requires_connected_server_sub() {
        let client = client();
        assert!(matches!(
            client.publish("news", json!({"m": 1})),
            Err(Error::NotSubscribed)
        ));

        client
            .inner
            .server_subscriptions
            .lock()
            .unwrap()
            .insert("news".into());
        // Still disconnected.
        assert!(matches!(
            client.publish("news", json!({"m": 1})),
            Err(Error::NotSubscribed)
        ));
    }

    #[test]
    fn send_requires_connected() {
        let client = client();
        assert!(matches!(client.send(json!("x")), Err(Error::NotConnected)));
    }

    #[test]
    fn server_sub_diff_on_connect() {
        let client = client();
        let events = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&events);
        client.on_subscribing(move |channel| log.lock().unwrap().push(format!("subscribing:{channel}")));
        let log = Arc::clone(&events);
        client.on_subscribed(move |channel| log.lock().unwrap().push(format!("subscribed:{channel}")));
        let log = Arc::clone(&events);
        client.on_unsubscribed(move |channel| log.lock().unwrap().push(format!("unsubscribed:{channel}")));

        client.inner.handle_connected(&connect_result(&["a", "b"]));
        {
            let mut log = events.lock().unwrap();
            log.sort();
            assert_eq!(
                *log,
                vec![
                    "subscribed:a",
                    "subscribed:b",
                    "subscribing:a",
                    "subscribing:b"
                ]
            );
            log.clear();
        }

        // "b" disappears, "c" appears.
        client.inner.handle_connected(&connect_result(&["a", "c"]));
        {
            let mut log = events.lock().unwrap();
            log.sort();
            assert_eq!(
                *log,
                vec![
                    "subscribed:a",
                    "subscribed:c",
                    "subscribing:c",
                    "unsubscribed:b"
                ]
            );
        }
        let channels = client.inner.server_channels();
        assert!(channels.contains(&"a".to_string()));
        assert!(channels.contains(&"c".to_string()));
        assert!(!channels.contains(&"b".to_string()));
    }

    #[test]
    fn disconnect_announces_server_subs_but_retains_them() {
        let client = client();
        client.inner.handle_connected(&connect_result(&["a"]));

        let unsubscribed = Arc::new(AtomicUsize::new(0));
        let count = Arc::clone(&unsubscribed);
        client.on_unsubscribed(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        });
        client
            .inner
            .handle_disconnected(&Error::lifecycle("disconnect called"));
        assert_eq!(unsubscribed.load(Ordering::SeqCst), 1);
        assert_eq!(client.inner.server_channels(), vec!["a".to_string()]);
    }

    #[test]
    fn push_routing_by_channel() {
        let client = client();
        client.inner.handle_connected(&connect_result(&["b"]));
        let client_sub = client.new_subscription("a").unwrap();
        client_sub.subscribe().unwrap();

        let server_side = Arc::new(AtomicUsize::new(0));
        let count = Arc::clone(&server_side);
        client.on_publication(move |channel, _| {
            assert_eq!(channel, "b");
            count.fetch_add(1, Ordering::SeqCst);
        });
        let client_side = Arc::new(AtomicUsize::new(0));
        let count = Arc::clone(&client_side);
        client_sub.on_publication(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        });

        for channel in ["a", "b", "c"] {
            client.inner.handle_push(&Push {
                channel: channel.into(),
                kind: PushKind::Publication(Publication {
                    offset: 1,
                    data: json!({}),
                    ..Default::default()
                }),
            });
        }

        assert_eq!(server_side.load(Ordering::SeqCst), 1);
        assert_eq!(client_side.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unclaimed_error_reply_reaches_client_on_error() {
        let client = client();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&errors);
        client.on_error(move |error| log.lock().unwrap().push(error.to_string()));

        client.inner.handle_reply(&Reply {
            id: 0,
            result: ReplyResult::Error(wavelink_core::protocol::ErrorReply {
                code: 103,
                message: "permission denied".into(),
                temporary: false,
            }),
        });
        assert_eq!(errors.lock().unwrap().len(), 1);
    }
}
