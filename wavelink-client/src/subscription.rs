//! Per-channel subscription state machine
//!
//! A subscription moves between Unsubscribed, Subscribing and Subscribed,
//! driven from two sides: user intent (`subscribe`, `unsubscribe`) and
//! connection events relayed by the client (Connecting demotes an
//! established subscription back to Subscribing; Connected re-issues the
//! subscribe command).
//!
//! Each subscribe command carries the recovery cursor when one is known:
//! `recover`, `epoch` and `offset` let the server replay the publications
//! missed while disconnected. The cursor advances with every subscribe
//! result and every publication carrying a non-zero offset.
//!
//! Handles are cheap clones over shared state, so a subscription keeps a
//! stable identity for its whole lifetime no matter how it is passed around.

use crate::transport::{ConnectionState, Transport};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use wavelink_core::protocol::{
    Command, Publication, PublishRequest, Reply, ReplyResult, Request, SubscribeRequest,
    UnsubscribeRequest,
};
use wavelink_core::{Error, Result};

/// Subscription lifecycle state. Only the owning subscription mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Unsubscribed,
    Subscribing,
    Subscribed,
}

#[derive(Debug, Clone, Default)]
struct RecoveryCursor {
    epoch: String,
    offset: u64,
    recoverable: bool,
}

type Slot<T> = Mutex<Option<Arc<T>>>;

#[derive(Default)]
struct SubscriptionCallbacks {
    subscribing: Slot<dyn Fn() + Send + Sync>,
    subscribed: Slot<dyn Fn() + Send + Sync>,
    unsubscribed: Slot<dyn Fn() + Send + Sync>,
    publication: Slot<dyn Fn(&Publication) + Send + Sync>,
    error: Slot<dyn Fn(&Error) + Send + Sync>,
}

struct SubscriptionInner {
    channel: String,
    transport: Arc<Transport>,
    state: Mutex<SubscriptionState>,
    /// Ids of commands sent on behalf of this subscription, awaiting replies.
    waiting_replies: Mutex<HashSet<u32>>,
    recovery: Mutex<RecoveryCursor>,
    callbacks: SubscriptionCallbacks,
}

/// Handle to a channel subscription created by
/// [`Client::new_subscription`](crate::Client::new_subscription).
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<SubscriptionInner>,
}

impl Subscription {
    pub(crate) fn new(channel: impl Into<String>, transport: Arc<Transport>) -> Self {
        Self {
            inner: Arc::new(SubscriptionInner {
                channel: channel.into(),
                transport,
                state: Mutex::new(SubscriptionState::Unsubscribed),
                waiting_replies: Mutex::new(HashSet::new()),
                recovery: Mutex::new(RecoveryCursor::default()),
                callbacks: SubscriptionCallbacks::default(),
            }),
        }
    }

    pub fn channel(&self) -> &str {
        &self.inner.channel
    }

    pub fn state(&self) -> SubscriptionState {
        *self.inner.state.lock().unwrap()
    }

    /// Start subscribing. Emits `on_subscribing` immediately; the subscribe
    /// command goes out now when connected, or on the next connect.
    pub fn subscribe(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock().unwrap();
            match *state {
                SubscriptionState::Subscribing => {
                    return Err(Error::AlreadySubscribing(self.inner.channel.clone()))
                }
                SubscriptionState::Subscribed => {
                    return Err(Error::AlreadySubscribed(self.inner.channel.clone()))
                }
                SubscriptionState::Unsubscribed => *state = SubscriptionState::Subscribing,
            }
        }
        self.emit_state(SubscriptionState::Subscribing);

        if self.inner.transport.state() == ConnectionState::Connected {
            self.send_subscribe_command();
        }
        Ok(())
    }

    /// Stop the subscription. When connected this asks the server and the
    /// state flips on its reply; otherwise the subscription is local-only
    /// and flips immediately. A no-op when already unsubscribed.
    pub fn unsubscribe(&self) {
        if self.state() == SubscriptionState::Unsubscribed {
            return;
        }
        if self.inner.transport.state() == ConnectionState::Connected {
            self.send_command(Request::Unsubscribe(UnsubscribeRequest {
                channel: self.inner.channel.clone(),
            }));
        } else {
            self.set_state(SubscriptionState::Unsubscribed);
        }
    }

    /// Publish to this subscription's channel. Requires Subscribed.
    pub fn publish(&self, data: serde_json::Value) -> Result<()> {
        if self.state() != SubscriptionState::Subscribed {
            return Err(Error::NotSubscribed);
        }
        self.send_command(Request::Publish(PublishRequest {
            channel: self.inner.channel.clone(),
            data,
        }));
        Ok(())
    }

    pub fn on_subscribing<F: Fn() + Send + Sync + 'static>(&self, callback: F) {
        *self.inner.callbacks.subscribing.lock().unwrap() = Some(Arc::new(callback));
    }

    pub fn on_subscribed<F: Fn() + Send + Sync + 'static>(&self, callback: F) {
        *self.inner.callbacks.subscribed.lock().unwrap() = Some(Arc::new(callback));
    }

    pub fn on_unsubscribed<F: Fn() + Send + Sync + 'static>(&self, callback: F) {
        *self.inner.callbacks.unsubscribed.lock().unwrap() = Some(Arc::new(callback));
    }

    pub fn on_publication<F: Fn(&Publication) + Send + Sync + 'static>(&self, callback: F) {
        *self.inner.callbacks.publication.lock().unwrap() = Some(Arc::new(callback));
    }

    pub fn on_error<F: Fn(&Error) + Send + Sync + 'static>(&self, callback: F) {
        *self.inner.callbacks.error.lock().unwrap() = Some(Arc::new(callback));
    }

    /// The connection dropped and a new attempt started: an established
    /// subscription goes back to Subscribing, pending re-subscribe.
    pub(crate) fn transport_connecting(&self) {
        if self.state() == SubscriptionState::Subscribed {
            self.set_state(SubscriptionState::Subscribing);
        }
    }

    /// The connection is up: re-issue the subscribe command.
    pub(crate) fn transport_connected(&self) {
        if self.state() == SubscriptionState::Subscribing {
            self.send_subscribe_command();
        }
    }

    /// Offer a reply to this subscription. Claims it only when the id
    /// belongs to one of its in-flight commands.
    pub(crate) fn handle_reply(&self, reply: &Reply) -> bool {
        if !self.inner.waiting_replies.lock().unwrap().remove(&reply.id) {
            return false;
        }
        match &reply.result {
            ReplyResult::Error(error) => {
                let error = Error::Server {
                    code: error.code,
                    message: error.message.clone(),
                    temporary: error.temporary,
                };
                self.emit_error(&error);
            }
            ReplyResult::Subscribe(result) => {
                {
                    let mut recovery = self.inner.recovery.lock().unwrap();
                    recovery.recoverable = result.recoverable;
                    recovery.epoch = result.epoch.clone();
                    recovery.offset = result.offset;
                }
                self.set_state(SubscriptionState::Subscribed);
                for publication in &result.publications {
                    self.handle_publication(publication);
                }
            }
            ReplyResult::Unsubscribe(_) => self.set_state(SubscriptionState::Unsubscribed),
            _ => {}
        }
        true
    }

    /// A publication arrived on this channel (live push or replay).
    pub(crate) fn handle_publication(&self, publication: &Publication) {
        if self.state() == SubscriptionState::Unsubscribed {
            return;
        }
        if publication.offset > 0 {
            self.inner.recovery.lock().unwrap().offset = publication.offset;
        }
        let callback = self.inner.callbacks.publication.lock().unwrap().clone();
        if let Some(callback) = callback {
            callback(publication);
        }
    }

    fn send_subscribe_command(&self) {
        let mut request = SubscribeRequest {
            channel: self.inner.channel.clone(),
            ..Default::default()
        };
        {
            let recovery = self.inner.recovery.lock().unwrap();
            if recovery.recoverable && !recovery.epoch.is_empty() {
                request.recover = true;
                request.epoch = recovery.epoch.clone();
                request.offset = recovery.offset;
            }
        }
        self.send_command(Request::Subscribe(request));
    }

    fn send_command(&self, request: Request) {
        let command = Command {
            id: self.inner.transport.next_command_id(),
            request,
        };
        self.inner.waiting_replies.lock().unwrap().insert(command.id);
        if let Err(e) = self.inner.transport.send(command) {
            self.emit_error(&e);
        }
    }

    fn set_state(&self, new_state: SubscriptionState) {
        {
            let mut state = self.inner.state.lock().unwrap();
            if *state == new_state {
                return;
            }
            *state = new_state;
        }
        self.emit_state(new_state);
    }

    fn emit_state(&self, state: SubscriptionState) {
        let callback = match state {
            SubscriptionState::Subscribing => {
                self.inner.callbacks.subscribing.lock().unwrap().clone()
            }
            SubscriptionState::Subscribed => {
                self.inner.callbacks.subscribed.lock().unwrap().clone()
            }
            SubscriptionState::Unsubscribed => {
                self.inner.callbacks.unsubscribed.lock().unwrap().clone()
            }
        };
        if let Some(callback) = callback {
            callback();
        }
    }

    fn emit_error(&self, error: &Error) {
        tracing::debug!(channel = %self.inner.channel, error = %error, "subscription error");
        let callback = self.inner.callbacks.error.lock().unwrap().clone();
        if let Some(callback) = callback {
            callback(error);
        }
    }
}
