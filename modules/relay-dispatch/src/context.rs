//! The message capability and the per-dispatch context handed to handlers.

use std::any::Any;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::trace;
use uuid::Uuid;

/// Upcast to `&dyn Any` so handlers can recover the concrete message type.
///
/// Blanket-implemented for every `'static` type; never implement it by hand.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Anything that can be dispatched as a command or published as an event.
///
/// Every method has a default, so `impl Message for MyCommand {}` is enough
/// when routing by type name. Override `type_key` to route by a declared key.
pub trait Message: AsAny + Send + Sync {
    /// Explicit routing key. `None` leaves the decision to the resolver.
    fn type_key(&self) -> Option<&str> {
        None
    }

    /// Declared type name, used by name-derived resolvers.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Serialized form for diagnostics. Not required for routing.
    fn data(&self) -> Option<Vec<u8>> {
        None
    }
}

/// Serialize a value to JSON bytes, for use in [`Message::data`].
///
/// Serialization failures yield `None`: the bytes are diagnostic only.
pub fn json_data<T: Serialize + ?Sized>(value: &T) -> Option<Vec<u8>> {
    serde_json::to_vec(value).ok()
}

/// Immutable record of one dispatch or publish call.
///
/// Built once per call and shared by reference with every interceptor and
/// handler that runs for it.
pub struct DispatchContext {
    dispatch_id: Uuid,
    type_key: String,
    dispatched_at: DateTime<Utc>,
    message: Box<dyn Message>,
}

impl DispatchContext {
    /// Build a context by hand, e.g. to unit-test a handler in isolation.
    pub fn new<M: Message>(type_key: impl Into<String>, message: M) -> Self {
        Self::from_boxed(type_key.into(), Box::new(message))
    }

    pub(crate) fn from_boxed(type_key: String, message: Box<dyn Message>) -> Self {
        Self {
            dispatch_id: Uuid::new_v4(),
            type_key,
            dispatched_at: Utc::now(),
            message,
        }
    }

    /// Correlation id, unique per call.
    pub fn dispatch_id(&self) -> Uuid {
        self.dispatch_id
    }

    pub fn type_key(&self) -> &str {
        &self.type_key
    }

    pub fn dispatched_at(&self) -> DateTime<Utc> {
        self.dispatched_at
    }

    /// The message as its concrete type, or `None` if it is some other type.
    pub fn message<T: Message>(&self) -> Option<&T> {
        (*self.message).as_any().downcast_ref::<T>()
    }

    pub fn raw_message(&self) -> &dyn Message {
        &*self.message
    }

    pub fn data(&self) -> Option<Vec<u8>> {
        self.message.data()
    }

    pub(crate) fn trace_data(&self) {
        match self.data() {
            Some(bytes) => trace!(
                type_key = %self.type_key,
                dispatch_id = %self.dispatch_id,
                data = %String::from_utf8_lossy(&bytes),
                "Message data"
            ),
            None => trace!(
                type_key = %self.type_key,
                dispatch_id = %self.dispatch_id,
                "Message carries no data"
            ),
        }
    }
}

impl fmt::Debug for DispatchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchContext")
            .field("dispatch_id", &self.dispatch_id)
            .field("type_key", &self.type_key)
            .field("dispatched_at", &self.dispatched_at)
            .field("message", &self.message.type_name())
            .finish()
    }
}
