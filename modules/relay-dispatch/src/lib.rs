//! In-process command and event dispatch.
//!
//! Two mediators share one pipeline: pre interceptors → route → handle → post
//! interceptors, stopping at the first error.
//!
//! - [`CommandDispatcher`] routes a command to exactly one handler and returns
//!   its result. An unhandled command is an error.
//! - [`EventDispatcher`] routes an event to every subscriber for its type, in
//!   subscription order. An event nobody listens to is fine.
//!
//! Routing is keyed by a string produced by a [`TypeKeyResolver`]. Messages
//! either declare their key or let [`TypeNameKey`] derive it from the type
//! name. No transport, no persistence: everything runs on the caller's stack.

pub mod chain;
pub mod command;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod resolver;

pub use chain::Interceptor;
pub use command::{CommandDispatcher, CommandHandler, HandlerResult, Rejection};
pub use config::{load_config, DispatchConfig, KeyStrategy};
pub use context::{json_data, DispatchContext, Message};
pub use error::{CommandFailure, DispatchError, Stage};
pub use event::{noop_handler, EventDispatcher, EventHandler};
pub use resolver::{AutoKey, DeclaredKey, TypeKeyResolver, TypeNameKey};
