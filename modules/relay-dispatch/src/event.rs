//! Event publishing: zero or more subscribers per type key, fire-and-forget.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::chain::{self, Interceptors};
use crate::config::DispatchConfig;
use crate::context::{DispatchContext, Message};
use crate::error::{DispatchError, Stage};
use crate::resolver::{DeclaredKey, TypeKeyResolver};

/// A subscribed event handler.
pub type EventHandler = Arc<dyn Fn(&DispatchContext) -> anyhow::Result<()> + Send + Sync>;

/// A handler that accepts every event and does nothing.
pub fn noop_handler() -> impl Fn(&DispatchContext) -> anyhow::Result<()> + Send + Sync + 'static {
    |_ctx: &DispatchContext| -> anyhow::Result<()> { Ok(()) }
}

struct Registry {
    subscribers: HashMap<String, Vec<EventHandler>>,
    chains: Interceptors,
}

/// Delivers each event to every subscriber of its type key, in the order
/// they subscribed.
///
/// Pipeline per call: pre interceptors → subscribers → post interceptors,
/// halting at the first error. Publishing to a key nobody subscribed to
/// succeeds.
pub struct EventDispatcher {
    registry: RwLock<Registry>,
    resolver: Box<dyn TypeKeyResolver>,
    log_payloads: bool,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher {
    /// Dispatcher routing by each event's declared [`Message::type_key`].
    pub fn new() -> Self {
        Self::with_resolver(DeclaredKey)
    }

    pub fn with_resolver(resolver: impl TypeKeyResolver + 'static) -> Self {
        Self {
            registry: RwLock::new(Registry {
                subscribers: HashMap::new(),
                chains: Interceptors::default(),
            }),
            resolver: Box::new(resolver),
            log_payloads: false,
        }
    }

    pub fn from_config(config: &DispatchConfig) -> Self {
        let mut dispatcher = Self::new();
        dispatcher.resolver = config.event_resolver();
        dispatcher.log_payloads = config.log_payloads;
        dispatcher
    }

    /// Run `interceptor` before every publish, after those already registered.
    pub fn register_pre<F>(&self, interceptor: F)
    where
        F: Fn(&DispatchContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        chain::write(&self.registry).chains.pre.push(Arc::new(interceptor));
    }

    /// Run `interceptor` after every subscriber of a publish has succeeded.
    pub fn register_post<F>(&self, interceptor: F)
    where
        F: Fn(&DispatchContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        chain::write(&self.registry).chains.post.push(Arc::new(interceptor));
    }

    /// Append `handler` to the subscribers of `type_key`. Never replaces.
    pub fn subscribe<F>(&self, type_key: impl Into<String>, handler: F)
    where
        F: Fn(&DispatchContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let type_key = type_key.into();
        let mut registry = chain::write(&self.registry);
        let handlers = registry.subscribers.entry(type_key.clone()).or_default();
        handlers.push(Arc::new(handler));
        debug!(type_key = %type_key, subscribers = handlers.len(), "Subscribed event handler");
    }

    /// Subscribe `handler` under whatever key the resolver gives `sample`.
    /// Returns that key.
    pub fn on<E, F>(&self, sample: &E, handler: F) -> Result<String, DispatchError>
    where
        E: Message,
        F: Fn(&DispatchContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let type_key = self.resolver.resolve(sample)?;
        self.subscribe(type_key.clone(), handler);
        Ok(type_key)
    }

    pub fn subscriber_count(&self, type_key: &str) -> usize {
        chain::read(&self.registry)
            .subscribers
            .get(type_key)
            .map_or(0, Vec::len)
    }

    pub fn pre_interceptor_count(&self) -> usize {
        chain::read(&self.registry).chains.pre.len()
    }

    pub fn post_interceptor_count(&self) -> usize {
        chain::read(&self.registry).chains.post.len()
    }

    /// Publish an event to every subscriber of its type key.
    pub fn publish<E: Message>(&self, event: E) -> Result<(), DispatchError> {
        self.publish_boxed(Box::new(event))
    }

    pub fn publish_boxed(&self, event: Box<dyn Message>) -> Result<(), DispatchError> {
        let type_key = self.resolver.resolve(&*event).map_err(|error| {
            debug!(error = %error, "Event type key unresolved");
            error
        })?;
        let ctx = DispatchContext::from_boxed(type_key, event);

        debug!(
            type_key = %ctx.type_key(),
            dispatch_id = %ctx.dispatch_id(),
            "Publishing event"
        );
        if self.log_payloads {
            ctx.trace_data();
        }

        self.run(&ctx).map_err(|error| {
            debug!(
                type_key = %ctx.type_key(),
                dispatch_id = %ctx.dispatch_id(),
                error = %error,
                "Event publish failed"
            );
            error
        })
    }

    fn run(&self, ctx: &DispatchContext) -> Result<(), DispatchError> {
        // One snapshot per call, taken before anything user-supplied runs.
        // Subscriptions made after this point apply to later publishes only.
        let (chains, subscribers) = {
            let registry = chain::read(&self.registry);
            (
                registry.chains.clone(),
                registry
                    .subscribers
                    .get(ctx.type_key())
                    .cloned()
                    .unwrap_or_default(),
            )
        };

        chains.pre.run(Stage::Pre, ctx)?;

        for handler in &subscribers {
            handler(ctx).map_err(|source| DispatchError::HandlerFailure {
                type_key: ctx.type_key().to_string(),
                source,
            })?;
        }

        chains.post.run(Stage::Post, ctx)?;

        debug!(
            type_key = %ctx.type_key(),
            dispatch_id = %ctx.dispatch_id(),
            delivered = subscribers.len(),
            "Event published"
        );
        Ok(())
    }
}
