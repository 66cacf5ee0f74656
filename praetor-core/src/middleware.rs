//! Pre-invocation guards.
//!
//! A [`MiddlewareChain`] is an ordered list of [`MiddlewareDescriptor`]s.
//! Each run builds every middleware afresh through the injector, calls
//! [`Middleware::handle`] in order, forwards each payload to the next one,
//! and stops at the first rejection.

use crate::error::{Error, Result};
use crate::form::Parameters;
use crate::injector::{Arguments, Construct, Injector};
use crate::logging::{debug, trace, warn};
use crate::request::RequestContext;
use http::StatusCode;
use serde_json::Value;
use std::fmt;

/// Outcome of a single middleware
#[derive(Debug, Clone, PartialEq)]
pub struct MiddlewareResolution {
    pub rejected: bool,
    /// Forwarded to the next middleware of the same chain
    pub payload: Value,
    /// Response status when rejected
    pub status: StatusCode,
    pub message: String,
}

impl MiddlewareResolution {
    /// Approve, forwarding `payload`
    pub fn next(payload: impl Into<Value>) -> Self {
        Self {
            rejected: false,
            payload: payload.into(),
            status: StatusCode::BAD_REQUEST,
            message: String::new(),
        }
    }

    /// Approve without payload
    pub fn proceed() -> Self {
        Self::next(Value::Null)
    }

    /// Reject; nothing after this middleware runs
    pub fn reject(message: impl Into<String>, status: StatusCode) -> Self {
        Self {
            rejected: true,
            payload: Value::Null,
            status,
            message: message.into(),
        }
    }

    /// Reject with 400 Bad Request
    pub fn reject_bad_request(message: impl Into<String>) -> Self {
        Self::reject(message, StatusCode::BAD_REQUEST)
    }

    pub fn is_rejected(&self) -> bool {
        self.rejected
    }
}

/// A guard run before a handler.
///
/// `previous` is the payload of the middleware that ran just before this
/// one in the same chain, `None` for the first one or when it forwarded
/// nothing.
pub trait Middleware {
    fn handle(&self, ctx: &mut RequestContext, previous: Option<&Value>) -> MiddlewareResolution;
}

type MiddlewareBuilder = fn(&Injector, &mut RequestContext) -> Result<Box<dyn Middleware>>;

/// Declares a middleware and the arguments its constructor is resolved
/// against.
#[derive(Clone)]
pub struct MiddlewareDescriptor {
    middleware_type: &'static str,
    constructor_arguments: Parameters,
    build: MiddlewareBuilder,
}

impl MiddlewareDescriptor {
    pub fn new<M: Middleware + Construct>() -> Self {
        Self {
            middleware_type: std::any::type_name::<M>(),
            constructor_arguments: Parameters::new(),
            build: build_middleware::<M>,
        }
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.constructor_arguments.insert(name.into(), value.into());
        self
    }

    pub fn with_arguments(mut self, arguments: Parameters) -> Self {
        self.constructor_arguments.extend(arguments);
        self
    }

    pub fn middleware_type(&self) -> &'static str {
        self.middleware_type
    }

    pub fn constructor_arguments(&self) -> &Parameters {
        &self.constructor_arguments
    }

    /// Build the middleware against a scratch context seeded only with
    /// the constructor arguments. Failure is a 500 rejection.
    fn instantiate(&self, injector: &Injector) -> Result<Box<dyn Middleware>> {
        let mut scratch =
            RequestContext::new().with_parameters(self.constructor_arguments.clone());

        (self.build)(injector, &mut scratch).map_err(|e| {
            Error::RequestRejected(MiddlewareResolution::reject(
                format!(
                    "Failed to process [{}] middleware! Construction error: {}",
                    self.middleware_type, e
                ),
                StatusCode::INTERNAL_SERVER_ERROR,
            ))
        })
    }
}

impl fmt::Debug for MiddlewareDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareDescriptor")
            .field("middleware_type", &self.middleware_type)
            .field("constructor_arguments", &self.constructor_arguments)
            .finish()
    }
}

fn build_middleware<M: Middleware + Construct>(
    injector: &Injector,
    scratch: &mut RequestContext,
) -> Result<Box<dyn Middleware>> {
    let middleware: M = injector.construct(scratch)?;
    Ok(Box::new(middleware))
}

/// Ordered middleware declarations for one scope
#[derive(Debug, Clone, Default)]
pub struct MiddlewareChain {
    descriptors: Vec<MiddlewareDescriptor>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a middleware without constructor arguments
    pub fn with<M: Middleware + Construct>(self) -> Self {
        self.with_descriptor(MiddlewareDescriptor::new::<M>())
    }

    pub fn with_descriptor(mut self, descriptor: MiddlewareDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn push(&mut self, descriptor: MiddlewareDescriptor) {
        self.descriptors.push(descriptor);
    }

    pub fn descriptors(&self) -> &[MiddlewareDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Run every middleware in order.
    ///
    /// Returns the last payload; a rejection (or a middleware that cannot be
    /// built) ends the chain with [`Error::RequestRejected`].
    pub fn run(&self, injector: &Injector, ctx: &mut RequestContext) -> Result<Value> {
        let mut previous = Value::Null;

        for descriptor in &self.descriptors {
            trace!(middleware = descriptor.middleware_type, "Running middleware");

            let middleware = descriptor.instantiate(injector)?;
            let forwarded = (!previous.is_null()).then_some(&previous);
            let resolution = middleware.handle(ctx, forwarded);

            if resolution.rejected {
                warn!(
                    middleware = descriptor.middleware_type,
                    status = resolution.status.as_u16(),
                    message = %resolution.message,
                    "Request rejected by middleware"
                );
                return Err(Error::RequestRejected(resolution));
            }

            previous = resolution.payload;
        }

        if !self.descriptors.is_empty() {
            debug!(count = self.descriptors.len(), "Middleware chain approved");
        }
        Ok(previous)
    }
}

/// Trims every top-level string parameter
#[derive(Debug, Clone, Copy, Default)]
pub struct TrimStrings;

impl Construct for TrimStrings {
    fn construct(_: &mut Arguments<'_>) -> Result<Self> {
        Ok(TrimStrings)
    }
}

impl Middleware for TrimStrings {
    fn handle(&self, ctx: &mut RequestContext, _previous: Option<&Value>) -> MiddlewareResolution {
        for value in ctx.parameters_mut().values_mut() {
            if let Value::String(s) = value {
                let trimmed = s.trim();
                if trimmed.len() != s.len() {
                    *s = trimmed.to_string();
                }
            }
        }
        MiddlewareResolution::proceed()
    }
}
