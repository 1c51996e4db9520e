//! Command dispatch: exactly one handler per type key, request/response.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::chain::{self, Interceptors};
use crate::config::DispatchConfig;
use crate::context::{DispatchContext, Message};
use crate::error::{CommandFailure, DispatchError, Stage};
use crate::resolver::{DeclaredKey, TypeKeyResolver};

/// What a command handler returns.
pub type HandlerResult<R> = Result<R, Rejection<R>>;

/// A registered command handler.
pub type CommandHandler<R> = Arc<dyn Fn(&DispatchContext) -> HandlerResult<R> + Send + Sync>;

/// A command handler's failure, optionally carrying the output it managed to
/// produce (a generated id, say) so the caller does not lose it.
pub struct Rejection<R> {
    error: anyhow::Error,
    partial: Option<R>,
}

impl<R> Rejection<R> {
    pub fn new(error: impl Into<anyhow::Error>) -> Self {
        Self {
            error: error.into(),
            partial: None,
        }
    }

    pub fn with_partial(mut self, partial: R) -> Self {
        self.partial = Some(partial);
        self
    }

    pub fn error(&self) -> &anyhow::Error {
        &self.error
    }

    pub fn partial(&self) -> Option<&R> {
        self.partial.as_ref()
    }

    fn into_parts(self) -> (anyhow::Error, Option<R>) {
        (self.error, self.partial)
    }
}

impl<R> From<anyhow::Error> for Rejection<R> {
    fn from(error: anyhow::Error) -> Self {
        Self::new(error)
    }
}

// Lets a handler `?` a nested dispatch or publish.
impl<R> From<DispatchError> for Rejection<R> {
    fn from(error: DispatchError) -> Self {
        Self::new(error)
    }
}

impl<R> fmt::Debug for Rejection<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejection")
            .field("error", &self.error)
            .field("has_partial", &self.partial.is_some())
            .finish()
    }
}

struct Registry<R> {
    handlers: HashMap<String, CommandHandler<R>>,
    chains: Interceptors,
}

/// Routes each command to the single handler registered for its type key.
///
/// Pipeline per call: pre interceptors → handler → post interceptors, halting
/// at the first error. Registration and dispatch both take `&self`, so one
/// dispatcher can be shared behind an `Arc`.
pub struct CommandDispatcher<R = ()> {
    registry: RwLock<Registry<R>>,
    resolver: Box<dyn TypeKeyResolver>,
    log_payloads: bool,
}

impl<R> Default for CommandDispatcher<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> CommandDispatcher<R> {
    /// Dispatcher routing by each command's declared [`Message::type_key`].
    pub fn new() -> Self {
        Self::with_resolver(DeclaredKey)
    }

    pub fn with_resolver(resolver: impl TypeKeyResolver + 'static) -> Self {
        Self {
            registry: RwLock::new(Registry {
                handlers: HashMap::new(),
                chains: Interceptors::default(),
            }),
            resolver: Box::new(resolver),
            log_payloads: false,
        }
    }

    pub fn from_config(config: &DispatchConfig) -> Self {
        let mut dispatcher = Self::new();
        dispatcher.resolver = config.command_resolver();
        dispatcher.log_payloads = config.log_payloads;
        dispatcher
    }

    /// Run `interceptor` before every command, after those already registered.
    pub fn register_pre<F>(&self, interceptor: F)
    where
        F: Fn(&DispatchContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        chain::write(&self.registry).chains.pre.push(Arc::new(interceptor));
    }

    /// Run `interceptor` after every successfully handled command.
    pub fn register_post<F>(&self, interceptor: F)
    where
        F: Fn(&DispatchContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        chain::write(&self.registry).chains.post.push(Arc::new(interceptor));
    }

    /// Install the handler for `type_key`, replacing any previous one.
    pub fn register<F>(&self, type_key: impl Into<String>, handler: F)
    where
        F: Fn(&DispatchContext) -> HandlerResult<R> + Send + Sync + 'static,
    {
        let type_key = type_key.into();
        let replaced = chain::write(&self.registry)
            .handlers
            .insert(type_key.clone(), Arc::new(handler))
            .is_some();
        debug!(type_key = %type_key, replaced, "Registered command handler");
    }

    /// Register `handler` under whatever key the resolver gives `sample`.
    /// Returns that key.
    pub fn handle<C, F>(&self, sample: &C, handler: F) -> Result<String, DispatchError>
    where
        C: Message,
        F: Fn(&DispatchContext) -> HandlerResult<R> + Send + Sync + 'static,
    {
        let type_key = self.resolver.resolve(sample)?;
        self.register(type_key.clone(), handler);
        Ok(type_key)
    }

    pub fn has_handler(&self, type_key: &str) -> bool {
        chain::read(&self.registry).handlers.contains_key(type_key)
    }

    pub fn handler_count(&self) -> usize {
        chain::read(&self.registry).handlers.len()
    }

    pub fn pre_interceptor_count(&self) -> usize {
        chain::read(&self.registry).chains.pre.len()
    }

    pub fn post_interceptor_count(&self) -> usize {
        chain::read(&self.registry).chains.post.len()
    }

    /// Dispatch a command to its handler and return the handler's result.
    pub fn dispatch<C: Message>(&self, command: C) -> Result<R, CommandFailure<R>> {
        self.dispatch_boxed(Box::new(command))
    }

    pub fn dispatch_boxed(&self, command: Box<dyn Message>) -> Result<R, CommandFailure<R>> {
        let type_key = self.resolver.resolve(&*command).map_err(|error| {
            debug!(error = %error, "Command type key unresolved");
            CommandFailure::new(error)
        })?;
        let ctx = DispatchContext::from_boxed(type_key, command);

        debug!(
            type_key = %ctx.type_key(),
            dispatch_id = %ctx.dispatch_id(),
            "Dispatching command"
        );
        if self.log_payloads {
            ctx.trace_data();
        }

        // One snapshot per call, taken before anything user-supplied runs.
        // Registrations made after this point apply to later calls only.
        let (chains, handler) = {
            let registry = chain::read(&self.registry);
            (
                registry.chains.clone(),
                registry.handlers.get(ctx.type_key()).cloned(),
            )
        };

        if let Err(error) = chains.pre.run(Stage::Pre, &ctx) {
            return Err(failed(&ctx, error, None));
        }

        let Some(handler) = handler else {
            let error = DispatchError::NoHandlerRegistered {
                type_key: ctx.type_key().to_string(),
            };
            return Err(failed(&ctx, error, None));
        };

        let result = match handler(&ctx) {
            Ok(result) => result,
            Err(rejection) => {
                let (source, partial) = rejection.into_parts();
                let error = DispatchError::HandlerFailure {
                    type_key: ctx.type_key().to_string(),
                    source,
                };
                return Err(failed(&ctx, error, partial));
            }
        };

        if let Err(error) = chains.post.run(Stage::Post, &ctx) {
            return Err(failed(&ctx, error, Some(result)));
        }

        debug!(
            type_key = %ctx.type_key(),
            dispatch_id = %ctx.dispatch_id(),
            "Command handled"
        );
        Ok(result)
    }
}

fn failed<R>(ctx: &DispatchContext, error: DispatchError, result: Option<R>) -> CommandFailure<R> {
    debug!(
        type_key = %ctx.type_key(),
        dispatch_id = %ctx.dispatch_id(),
        error = %error,
        has_result = result.is_some(),
        "Command dispatch failed"
    );
    CommandFailure::with_result(error, result)
}
