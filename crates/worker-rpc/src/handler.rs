//! Handlers and the values that flow through them.
//!
//! A [`Handler`] receives a [`Request`] and produces a [`Reply`], possibly
//! asynchronously. Handler faults are plain `anyhow` errors: the dispatcher
//! logs them and turns them into a bare failure signal for the caller.
//!
//! [`HandlerTarget`] is a bag of named, swappable handler slots. Registering
//! an endpoint against a slot (rather than a fixed closure) lets the
//! implementation be replaced, or installed later, without re-registering.

use crate::error::{Result, RpcError};
use crate::message::Transferable;
use futures::future::{self, LocalBoxFuture};
use futures::{FutureExt, TryFutureExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};

/// Arguments of one incoming call.
#[derive(Debug, Default)]
pub struct Request {
    pub args: Vec<Value>,
    pub transfer: Vec<Transferable>,
}

impl Request {
    pub fn new(args: Vec<Value>) -> Self {
        Self {
            args,
            transfer: Vec::new(),
        }
    }

    /// Deserialize positional argument `index`. A missing argument reads as `null`.
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> Result<T> {
        let value = self.args.get(index).cloned().unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|e| RpcError::UnexpectedArgument {
            index,
            message: e.to_string(),
        })
    }

    /// Remove the first transferred resource of type `T`.
    pub fn take_transfer<T: Any>(&mut self) -> Option<T> {
        take_transfer(&mut self.transfer)
    }
}

/// Value produced by a handler, with resources to move back to the caller.
///
/// The transfer list only travels for endpoints declared with
/// `has_return_transfer`.
#[derive(Debug, Default)]
pub struct Reply {
    pub data: Value,
    pub transfer: Vec<Transferable>,
}

impl Reply {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            transfer: Vec::new(),
        }
    }

    pub fn with_transfer(data: Value, transfer: Vec<Transferable>) -> Self {
        Self { data, transfer }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn into_value(self) -> Value {
        self.data
    }

    /// Remove the first transferred resource of type `T`.
    pub fn take_transfer<T: Any>(&mut self) -> Option<T> {
        take_transfer(&mut self.transfer)
    }
}

impl From<Value> for Reply {
    fn from(data: Value) -> Self {
        Reply::new(data)
    }
}

impl From<()> for Reply {
    fn from(_: ()) -> Self {
        Reply::empty()
    }
}

fn take_transfer<T: Any>(transfer: &mut Vec<Transferable>) -> Option<T> {
    let index = transfer.iter().position(|resource| resource.is::<T>())?;
    transfer.remove(index).downcast::<T>().ok()
}

/// Future returned by a handler invocation.
pub type HandlerFuture = LocalBoxFuture<'static, anyhow::Result<Reply>>;

/// A local implementation of an endpoint.
///
/// Cloning is cheap; clones share the same closure.
#[derive(Clone)]
pub struct Handler(Rc<dyn Fn(Request) -> HandlerFuture>);

impl Handler {
    /// Wrap an async handler.
    pub fn new<F, Fut, R>(f: F) -> Self
    where
        F: Fn(Request) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<R>> + 'static,
        R: Into<Reply> + 'static,
    {
        Self(Rc::new(move |request| {
            f(request).map_ok(Into::<Reply>::into).boxed_local()
        }))
    }

    /// Wrap a handler that completes synchronously.
    pub fn from_fn<F, R>(f: F) -> Self
    where
        F: Fn(Request) -> anyhow::Result<R> + 'static,
        R: Into<Reply>,
    {
        Self(Rc::new(move |request| {
            future::ready(f(request).map(Into::<Reply>::into)).boxed_local()
        }))
    }

    /// Invoke the closure. Its synchronous part runs before this returns.
    pub fn call(&self, request: Request) -> HandlerFuture {
        (self.0)(request)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler(..)")
    }
}

pub(crate) type Interceptor = Rc<dyn Fn()>;

#[derive(Default)]
struct TargetState {
    properties: HashMap<String, Handler>,
    interceptors: HashMap<String, Vec<Interceptor>>,
}

/// Named handler slots that endpoints can be bound to by property name.
#[derive(Clone, Default)]
pub struct HandlerTarget {
    state: Rc<RefCell<TargetState>>,
}

impl HandlerTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, property: &str) -> Option<Handler> {
        self.state.borrow().properties.get(property).cloned()
    }

    pub fn contains(&self, property: &str) -> bool {
        self.state.borrow().properties.contains_key(property)
    }

    /// Assign a handler to `property` and fire any interceptors watching it.
    pub fn set(&self, property: impl Into<String>, handler: Handler) {
        let property = property.into();
        let hooks = {
            let mut state = self.state.borrow_mut();
            state.properties.insert(property.clone(), handler);
            state.interceptors.get(&property).cloned().unwrap_or_default()
        };
        for hook in hooks {
            hook();
        }
    }

    /// Empty the slot. Endpoints bound to it answer `null` until it is set again.
    pub fn clear(&self, property: &str) -> Option<Handler> {
        self.state.borrow_mut().properties.remove(property)
    }

    pub(crate) fn intercept(&self, property: &str, hook: Interceptor) {
        self.state
            .borrow_mut()
            .interceptors
            .entry(property.to_string())
            .or_default()
            .push(hook);
    }

    pub(crate) fn downgrade(&self) -> WeakHandlerTarget {
        WeakHandlerTarget(Rc::downgrade(&self.state))
    }
}

impl fmt::Debug for HandlerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        let mut properties: Vec<_> = state.properties.keys().collect();
        properties.sort();
        f.debug_struct("HandlerTarget")
            .field("properties", &properties)
            .finish()
    }
}

pub(crate) struct WeakHandlerTarget(Weak<RefCell<TargetState>>);

impl WeakHandlerTarget {
    pub(crate) fn upgrade(&self) -> Option<HandlerTarget> {
        self.0.upgrade().map(|state| HandlerTarget { state })
    }
}
