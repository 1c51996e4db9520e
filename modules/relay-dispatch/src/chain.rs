//! Interceptor chains and the registry locking shared by both dispatchers.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::context::DispatchContext;
use crate::error::{DispatchError, Stage};

/// Runs for every dispatch or publish, whatever the type key.
pub type Interceptor = Arc<dyn Fn(&DispatchContext) -> anyhow::Result<()> + Send + Sync>;

/// Ordered interceptors. Registration order is run order.
#[derive(Clone, Default)]
pub(crate) struct Chain {
    interceptors: Vec<Interceptor>,
}

impl Chain {
    pub(crate) fn push(&mut self, interceptor: Interceptor) {
        self.interceptors.push(interceptor);
    }

    pub(crate) fn len(&self) -> usize {
        self.interceptors.len()
    }

    /// Run every interceptor in order, stopping at the first error.
    pub(crate) fn run(&self, stage: Stage, ctx: &DispatchContext) -> Result<(), DispatchError> {
        for interceptor in &self.interceptors {
            interceptor(ctx).map_err(|source| DispatchError::InterceptorFailure {
                type_key: ctx.type_key().to_string(),
                stage,
                source,
            })?;
        }
        Ok(())
    }
}

/// Pre and post chains of one dispatcher.
#[derive(Clone, Default)]
pub(crate) struct Interceptors {
    pub(crate) pre: Chain,
    pub(crate) post: Chain,
}

// Every registry mutation is a single push or insert, so a panic elsewhere
// cannot leave the data half-written. Poisoning is safe to ignore.
pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
