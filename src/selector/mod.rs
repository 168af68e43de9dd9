//! Connection selection.
//!
//! # Data Flow
//! ```text
//! Pool::select
//!     → alive snapshot
//!     → Selector (tagged at construction):
//!         - Sync: called immediately, result delivered later
//!         - Async: future awaited
//!     → Selection or SelectorError
//! ```
//!
//! # Design Decisions
//! - Sync vs async is decided once, by the variant, never by probing the callable
//! - A panicking selector becomes a `SelectorError`, never an unwinding caller
//! - Built-in strategies implement `Strategy` and are wrapped as sync selectors

pub mod random;
pub mod round_robin;

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use futures_util::future::{self, BoxFuture};
use futures_util::FutureExt;
use thiserror::Error;

use crate::net::connection::Connection;

pub use random::Random;
pub use round_robin::RoundRobin;

/// What a selector picked. `None` is a valid answer.
pub type Selection = Option<Arc<Connection>>;

pub type SyncSelectFn =
    Arc<dyn Fn(&[Arc<Connection>]) -> Result<Selection, SelectorError> + Send + Sync>;

pub type AsyncSelectFn = Arc<
    dyn Fn(Vec<Arc<Connection>>) -> BoxFuture<'static, Result<Selection, SelectorError>>
        + Send
        + Sync,
>;

/// A selector failed, by returning an error or by panicking.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("selector failed: {0}")]
pub struct SelectorError(pub String);

impl SelectorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "selector panicked".to_string()
        };
        Self(message)
    }
}

/// Unrecognized built-in selector name.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown selector '{0}' (expected round_robin or random)")]
pub struct UnknownSelector(pub String);

/// A plain picking strategy over the alive connections.
pub trait Strategy: Send + Sync {
    fn pick(&self, candidates: &[Arc<Connection>]) -> Selection;
}

/// The pool's pluggable selection function.
#[derive(Clone)]
pub enum Selector {
    Sync(SyncSelectFn),
    Async(AsyncSelectFn),
}

impl Selector {
    /// Wrap a synchronous selection function.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&[Arc<Connection>]) -> Result<Selection, SelectorError> + Send + Sync + 'static,
    {
        Selector::Sync(Arc::new(f))
    }

    /// Wrap an asynchronous selection function.
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Vec<Arc<Connection>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Selection, SelectorError>> + Send + 'static,
    {
        Selector::Async(Arc::new(move |candidates| f(candidates).boxed()))
    }

    pub fn from_strategy<S: Strategy + 'static>(strategy: S) -> Self {
        Selector::from_fn(move |candidates| Ok(strategy.pick(candidates)))
    }

    pub fn round_robin() -> Self {
        Selector::from_strategy(RoundRobin::new())
    }

    pub fn random() -> Self {
        Selector::from_strategy(Random)
    }

    /// Resolve a built-in selector by name.
    pub fn from_name(name: &str) -> Result<Self, UnknownSelector> {
        match name {
            "round_robin" | "roundRobin" => Ok(Selector::round_robin()),
            "random" => Ok(Selector::random()),
            other => Err(UnknownSelector(other.to_string())),
        }
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Selector::Async(_))
    }

    /// Start a selection.
    ///
    /// A sync selector runs before this returns; the returned future only hands
    /// over its result. An async selector runs when the future is polled.
    pub(crate) fn invoke(
        &self,
        candidates: Vec<Arc<Connection>>,
    ) -> BoxFuture<'static, Result<Selection, SelectorError>> {
        match self {
            Selector::Sync(f) => {
                let result = catch_unwind(AssertUnwindSafe(|| f(&candidates)))
                    .unwrap_or_else(|panic| Err(SelectorError::from_panic(panic)));
                future::ready(result).boxed()
            }
            Selector::Async(f) => {
                let f = f.clone();
                async move {
                    let started = match catch_unwind(AssertUnwindSafe(|| f(candidates))) {
                        Ok(fut) => fut,
                        Err(panic) => return Err(SelectorError::from_panic(panic)),
                    };
                    AssertUnwindSafe(started)
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|panic| Err(SelectorError::from_panic(panic)))
                }
                .boxed()
            }
        }
    }
}

impl Default for Selector {
    fn default() -> Self {
        Selector::round_robin()
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Sync(_) => f.write_str("Selector::Sync"),
            Selector::Async(_) => f.write_str("Selector::Async"),
        }
    }
}
