//! Event Dispatcher.
//!
//! One callback slot per event kind; setting a callback replaces the previous
//! one. Callbacks run on the receive task of the connection that raised the
//! event, so a slow callback delays further reads on that connection only.
//! A panicking callback is caught at this boundary and logged; the receive
//! loop carries on.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use tether_wire::Response;
use tracing::error;

use crate::peer::Peer;

/// Event kinds a callback can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// A peer connected (ON_CONNECT).
    Connect,
    /// A message arrived that no pending request claimed (ON_RECV).
    Recv,
    /// A peer disconnected (ON_DISCONNECT).
    Disconnect,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "on_connect"),
            Self::Recv => write!(f, "on_recv"),
            Self::Disconnect => write!(f, "on_disconnect"),
        }
    }
}

type PeerHandler = Arc<dyn Fn(Peer) -> BoxFuture<'static, ()> + Send + Sync>;
type MessageHandler = Arc<dyn Fn(Peer, Response) -> BoxFuture<'static, ()> + Send + Sync>;

/// A handler bound to its event kind.
///
/// ```rust,ignore
/// server.set_callback(Callback::on_recv(|peer, response| async move {
///     let _ = peer.send(&response.respond(response.content().to_vec())).await;
/// }));
/// ```
#[derive(Clone)]
pub enum Callback {
    Connect(PeerHandler),
    Recv(MessageHandler),
    Disconnect(PeerHandler),
}

impl Callback {
    pub fn on_connect<F, Fut>(handler: F) -> Self
    where
        F: Fn(Peer) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::Connect(Arc::new(move |peer| handler(peer).boxed()))
    }

    pub fn on_recv<F, Fut>(handler: F) -> Self
    where
        F: Fn(Peer, Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::Recv(Arc::new(move |peer, response| handler(peer, response).boxed()))
    }

    pub fn on_disconnect<F, Fut>(handler: F) -> Self
    where
        F: Fn(Peer) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::Disconnect(Arc::new(move |peer| handler(peer).boxed()))
    }

    pub fn event(&self) -> Event {
        match self {
            Self::Connect(_) => Event::Connect,
            Self::Recv(_) => Event::Recv,
            Self::Disconnect(_) => Event::Disconnect,
        }
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Callback").field(&self.event()).finish()
    }
}

/// Callback slots for one server or client.
#[derive(Default)]
pub struct EventDispatcher {
    on_connect: RwLock<Option<PeerHandler>>,
    on_recv: RwLock<Option<MessageHandler>>,
    on_disconnect: RwLock<Option<PeerHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a callback, replacing any callback for the same event.
    pub fn set_callback(&self, callback: Callback) {
        match callback {
            Callback::Connect(handler) => *self.on_connect.write() = Some(handler),
            Callback::Recv(handler) => *self.on_recv.write() = Some(handler),
            Callback::Disconnect(handler) => *self.on_disconnect.write() = Some(handler),
        }
    }

    /// Remove the callback for `event`, if any.
    pub fn clear(&self, event: Event) {
        match event {
            Event::Connect => *self.on_connect.write() = None,
            Event::Recv => *self.on_recv.write() = None,
            Event::Disconnect => *self.on_disconnect.write() = None,
        }
    }

    pub fn has_callback(&self, event: Event) -> bool {
        match event {
            Event::Connect => self.on_connect.read().is_some(),
            Event::Recv => self.on_recv.read().is_some(),
            Event::Disconnect => self.on_disconnect.read().is_some(),
        }
    }

    pub async fn dispatch_connect(&self, peer: &Peer) {
        // Clone the handler out so the slot lock is not held while it runs.
        let handler = self.on_connect.read().clone();
        if let Some(handler) = handler {
            contain(Event::Connect, peer, || handler(peer.clone())).await;
        }
    }

    pub async fn dispatch_recv(&self, peer: &Peer, response: Response) {
        let handler = self.on_recv.read().clone();
        if let Some(handler) = handler {
            contain(Event::Recv, peer, || handler(peer.clone(), response)).await;
        }
    }

    pub async fn dispatch_disconnect(&self, peer: &Peer) {
        let handler = self.on_disconnect.read().clone();
        if let Some(handler) = handler {
            contain(Event::Disconnect, peer, || handler(peer.clone())).await;
        }
    }
}

/// Run a callback, catching a panic both in the call and in its future.
async fn contain<F>(event: Event, peer: &Peer, call: F)
where
    F: FnOnce() -> BoxFuture<'static, ()>,
{
    let future = match std::panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(future) => future,
        Err(panic) => {
            report_panic(event, peer, panic.as_ref());
            return;
        }
    };

    if let Err(panic) = AssertUnwindSafe(future).catch_unwind().await {
        report_panic(event, peer, panic.as_ref());
    }
}

fn report_panic(event: Event, peer: &Peer, panic: &(dyn Any + Send)) {
    let message = if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    };
    error!(
        event = %event,
        peer = %peer.addr(),
        panic = %message,
        "Callback panicked"
    );
}
