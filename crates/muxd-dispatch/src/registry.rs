//! Handler registry.
//!
//! Maps request-type strings to handlers, plus one optional default handler.
//! Registration is monotonic: a type is bound at most once, the default is
//! set at most once, and nothing is ever removed. The registry is filled
//! during setup and then moved into a [`Dispatcher`](crate::Dispatcher),
//! after which it can only be read.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::{DispatchContext, DispatchError};

/// Future returned by a handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send>>;

/// Boxed handler function.
pub type HandlerFn<C> = Box<dyn Fn(DispatchContext<C>) -> HandlerFuture + Send + Sync>;

/// Outcome of looking up a request type.
pub enum Resolution<'a, C> {
    /// A handler registered for exactly this type.
    Found(&'a HandlerFn<C>),
    /// No specific handler; the default handler applies.
    UseDefault(&'a HandlerFn<C>),
    /// Neither a specific nor a default handler exists.
    Absent,
}

impl<'a, C> Resolution<'a, C> {
    /// The handler to invoke, if any.
    pub fn handler(&self) -> Option<&'a HandlerFn<C>> {
        match self {
            Self::Found(handler) | Self::UseDefault(handler) => Some(handler),
            Self::Absent => None,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, Self::UseDefault(_))
    }
}

/// Registry of request handlers.
pub struct HandlerRegistry<C> {
    by_type: HashMap<String, HandlerFn<C>>,
    default: Option<HandlerFn<C>>,
}

impl<C> HandlerRegistry<C> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            by_type: HashMap::new(),
            default: None,
        }
    }

    /// Bind `handler` to `request_type`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::AlreadyRegistered`] if the type is already
    /// bound. The existing handler is kept.
    pub fn register_handler<F, Fut>(
        &mut self,
        request_type: &str,
        handler: F,
    ) -> Result<(), DispatchError>
    where
        F: Fn(DispatchContext<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        if self.by_type.contains_key(request_type) {
            return Err(DispatchError::AlreadyRegistered(request_type.to_string()));
        }

        let boxed: HandlerFn<C> = Box::new(move |ctx| Box::pin(handler(ctx)));
        self.by_type.insert(request_type.to_string(), boxed);
        Ok(())
    }

    /// Set the fallback handler for types without a specific handler.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::AlreadyRegistered`] if a default is already
    /// set.
    pub fn register_default_handler<F, Fut>(&mut self, handler: F) -> Result<(), DispatchError>
    where
        F: Fn(DispatchContext<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        if self.default.is_some() {
            return Err(DispatchError::AlreadyRegistered(
                DispatchError::DEFAULT_HANDLER_NAME.to_string(),
            ));
        }

        self.default = Some(Box::new(move |ctx| Box::pin(handler(ctx))));
        Ok(())
    }

    /// Look up the handler for `request_type`.
    ///
    /// A type-specific handler always wins over the default.
    pub fn resolve(&self, request_type: &str) -> Resolution<'_, C> {
        if let Some(handler) = self.by_type.get(request_type) {
            Resolution::Found(handler)
        } else if let Some(handler) = self.default.as_ref() {
            Resolution::UseDefault(handler)
        } else {
            Resolution::Absent
        }
    }

    /// Whether a type-specific handler is bound.
    pub fn contains(&self, request_type: &str) -> bool {
        self.by_type.contains_key(request_type)
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// Registered request types, sorted.
    pub fn registered_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.by_type.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Number of type-specific handlers.
    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty() && self.default.is_none()
    }
}

impl<C> Default for HandlerRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for HandlerRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("types", &self.registered_types())
            .field("has_default", &self.has_default())
            .finish()
    }
}
