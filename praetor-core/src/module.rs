//! Handler registration.
//!
//! Handler groups (controllers) and their methods are declared once at
//! startup in a [`HandlerRegistry`]: constructor signature, class-level
//! middleware, entrypoint, and per-method signature, verb constraint and
//! middleware. The dispatcher only ever looks things up here.
//!
//! ```
//! use praetor_core::*;
//!
//! struct UsersController;
//!
//! impl Construct for UsersController {
//!     fn construct(_: &mut Arguments<'_>) -> Result<Self> {
//!         Ok(UsersController)
//!     }
//! }
//!
//! impl UsersController {
//!     fn show(&mut self, args: &mut Arguments<'_>) -> Result<Reply> {
//!         let id: i64 = args.get("id")?;
//!         Ok(Reply::Data(serde_json::json!({ "id": id })))
//!     }
//! }
//!
//! let group = HandlerGroup::builder::<UsersController>("Users", "UsersController")
//!     .entrypoint("show")
//!     .add(
//!         HandlerMethod::new("show", Signature::new().scalar("id", ScalarKind::Int), UsersController::show)
//!             .only(HttpMethod::GET),
//!     )
//!     .build();
//!
//! let registry = HandlerRegistry::new().with(group);
//! assert!(registry.find(DEFAULT_NAMESPACE, "Users", "UsersController").is_some());
//! ```

use crate::error::{Error, Result};
use crate::http::{HttpMethod, Reply};
use crate::injector::{Arguments, Construct, Signature};
use crate::logging::{debug, warn};
use crate::middleware::{MiddlewareChain, MiddlewareDescriptor};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

/// Namespace groups are registered under unless told otherwise
pub const DEFAULT_NAMESPACE: &str = "App";

type Invoke = Box<dyn Fn(&mut dyn Any, &mut Arguments<'_>) -> Result<Reply> + Send + Sync>;
type ConstructGroup = fn(&mut Arguments<'_>) -> Result<Box<dyn Any>>;

/// One callable method of a handler group
pub struct HandlerMethod {
    name: String,
    signature: Signature,
    required_method: Option<HttpMethod>,
    middleware: MiddlewareChain,
    invoke: Invoke,
}

impl HandlerMethod {
    /// Declare a method of group `G`
    pub fn new<G, F>(name: impl Into<String>, signature: Signature, handler: F) -> Self
    where
        G: 'static,
        F: Fn(&mut G, &mut Arguments<'_>) -> Result<Reply> + Send + Sync + 'static,
    {
        let name = name.into();
        let method_name = name.clone();
        let invoke: Invoke = Box::new(move |instance, args| {
            let group = instance.downcast_mut::<G>().ok_or_else(|| {
                Error::Internal(format!(
                    "Handler method {} invoked on a foreign instance",
                    method_name
                ))
            })?;
            handler(group, args)
        });

        Self {
            name,
            signature,
            required_method: None,
            middleware: MiddlewareChain::new(),
            invoke,
        }
    }

    /// Only accept requests with this HTTP method
    pub fn only(mut self, method: HttpMethod) -> Self {
        self.required_method = Some(method);
        self
    }

    pub fn middleware(mut self, descriptor: MiddlewareDescriptor) -> Self {
        self.middleware.push(descriptor);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn required_method(&self) -> Option<HttpMethod> {
        self.required_method
    }

    pub fn middleware_chain(&self) -> &MiddlewareChain {
        &self.middleware
    }

    /// Fails with `MethodNotAllowed` when `actual` violates the constraint.
    /// CLI calls (`None`) are never constrained.
    pub fn check_method(&self, actual: Option<HttpMethod>) -> Result<()> {
        match (self.required_method, actual) {
            (Some(expected), Some(actual)) if expected != actual => Err(Error::MethodNotAllowed {
                expected: expected.to_string(),
                actual: actual.to_string(),
            }),
            _ => Ok(()),
        }
    }

    pub(crate) fn invoke(&self, instance: &mut dyn Any, args: &mut Arguments<'_>) -> Result<Reply> {
        (self.invoke)(instance, args)
    }
}

impl fmt::Debug for HandlerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerMethod")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("required_method", &self.required_method)
            .field("middleware", &self.middleware)
            .finish_non_exhaustive()
    }
}

/// A registered handler group
pub struct HandlerGroup {
    namespace: String,
    module: String,
    name: String,
    type_name: &'static str,
    constructor: Signature,
    construct: ConstructGroup,
    middleware: MiddlewareChain,
    entrypoint: Option<String>,
    cli_only: bool,
    methods: HashMap<String, HandlerMethod>,
}

impl HandlerGroup {
    /// Start declaring group `G`, reachable as `<module>/<name>`
    pub fn builder<G: Construct>(
        module: impl Into<String>,
        name: impl Into<String>,
    ) -> HandlerGroupBuilder<G> {
        HandlerGroupBuilder {
            group: HandlerGroup {
                namespace: DEFAULT_NAMESPACE.to_string(),
                module: module.into(),
                name: name.into(),
                type_name: std::any::type_name::<G>(),
                constructor: G::signature(),
                construct: construct_group::<G>,
                middleware: MiddlewareChain::new(),
                entrypoint: None,
                cli_only: false,
                methods: HashMap::new(),
            },
            _group: PhantomData,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `namespace::module::name`
    pub fn qualified_name(&self) -> String {
        format!("{}::{}::{}", self.namespace, self.module, self.name)
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn constructor(&self) -> &Signature {
        &self.constructor
    }

    pub fn middleware_chain(&self) -> &MiddlewareChain {
        &self.middleware
    }

    pub fn entrypoint(&self) -> Option<&str> {
        self.entrypoint.as_deref()
    }

    pub fn is_cli_only(&self) -> bool {
        self.cli_only
    }

    pub fn method(&self, name: &str) -> Option<&HandlerMethod> {
        self.methods.get(name)
    }

    pub fn methods(&self) -> impl Iterator<Item = &HandlerMethod> {
        self.methods.values()
    }

    pub(crate) fn construct(&self, args: &mut Arguments<'_>) -> Result<Box<dyn Any>> {
        (self.construct)(args)
    }
}

impl fmt::Debug for HandlerGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerGroup")
            .field("name", &self.qualified_name())
            .field("type_name", &self.type_name)
            .field("entrypoint", &self.entrypoint)
            .field("cli_only", &self.cli_only)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn construct_group<G: Construct>(args: &mut Arguments<'_>) -> Result<Box<dyn Any>> {
    Ok(Box::new(G::construct(args)?))
}

/// Builder returned by [`HandlerGroup::builder`]
pub struct HandlerGroupBuilder<G> {
    group: HandlerGroup,
    _group: PhantomData<fn() -> G>,
}

impl<G: Construct> HandlerGroupBuilder<G> {
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.group.namespace = namespace.into();
        self
    }

    /// Method used when the route names none
    pub fn entrypoint(mut self, method: impl Into<String>) -> Self {
        self.group.entrypoint = Some(method.into());
        self
    }

    /// Refuse dispatch from HTTP requests
    pub fn cli_only(mut self) -> Self {
        self.group.cli_only = true;
        self
    }

    /// Class-level middleware, run before the group is constructed
    pub fn middleware(mut self, descriptor: MiddlewareDescriptor) -> Self {
        self.group.middleware.push(descriptor);
        self
    }

    /// Shorthand for an unconstrained method without middleware
    pub fn method<F>(self, name: impl Into<String>, signature: Signature, handler: F) -> Self
    where
        F: Fn(&mut G, &mut Arguments<'_>) -> Result<Reply> + Send + Sync + 'static,
    {
        self.add(HandlerMethod::new(name, signature, handler))
    }

    pub fn add(mut self, method: HandlerMethod) -> Self {
        self.group.methods.insert(method.name.clone(), method);
        self
    }

    pub fn build(self) -> HandlerGroup {
        if let Some(entrypoint) = &self.group.entrypoint {
            if !self.group.methods.contains_key(entrypoint) {
                warn!(
                    group = %self.group.qualified_name(),
                    entrypoint = %entrypoint,
                    "Entrypoint names no registered method"
                );
            }
        }
        self.group
    }
}

/// A unit contributing handler groups, typically one per application module
pub trait Module {
    fn groups(&self) -> Vec<HandlerGroup>;
}

/// All handler groups known to the dispatcher
#[derive(Default)]
pub struct HandlerRegistry {
    groups: HashMap<(String, String, String), HandlerGroup>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a group, replacing any previous one with the same identity
    pub fn register(&mut self, group: HandlerGroup) {
        let key = (
            group.namespace.clone(),
            group.module.clone(),
            group.name.clone(),
        );

        debug!(group = %group.qualified_name(), methods = group.methods.len(), "Handler group registered");
        if let Some(previous) = self.groups.insert(key, group) {
            warn!(group = %previous.qualified_name(), "Replaced previously registered handler group");
        }
    }

    pub fn register_module(&mut self, module: &dyn Module) {
        for group in module.groups() {
            self.register(group);
        }
    }

    pub fn with(mut self, group: HandlerGroup) -> Self {
        self.register(group);
        self
    }

    pub fn with_module(mut self, module: &dyn Module) -> Self {
        self.register_module(module);
        self
    }

    pub fn find(&self, namespace: &str, module: &str, group: &str) -> Option<&HandlerGroup> {
        self.groups
            .get(&(namespace.to_string(), module.to_string(), group.to_string()))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.groups.values()).finish()
    }
}
