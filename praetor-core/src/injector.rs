//! Dependency resolution.
//!
//! Every constructible type publishes a [`Signature`]: an ordered list of
//! named parameters with a declared type. The [`Injector`] turns a signature
//! and a [`RequestContext`] into [`Arguments`]:
//!
//! | declared type | resolved from |
//! |---------------|---------------|
//! | untyped | `parameters[name]`, possibly null |
//! | scalar | `parameters[name]`, coerced; null fails unless nullable |
//! | context | the request context itself |
//! | injectable | shared cache, factory, or recursive construction |
//! | model | a default instance populated by the structural mapper |
//!
//! ```
//! use praetor_core::*;
//! use std::sync::Arc;
//!
//! struct Mailer;
//!
//! impl Construct for Mailer {
//!     fn construct(_: &mut Arguments<'_>) -> Result<Self> {
//!         Ok(Mailer)
//!     }
//! }
//!
//! impl Injectable for Mailer {
//!     fn singleton() -> bool {
//!         true
//!     }
//! }
//!
//! let injector = Injector::new(SharedInstanceCache::new());
//! let ctx = RequestContext::new();
//! let a: Arc<Mailer> = injector.instance(&ctx).unwrap();
//! let b: Arc<Mailer> = injector.instance(&ctx).unwrap();
//! assert!(Arc::ptr_eq(&a, &b));
//! ```

use crate::container::{Instance, SharedInstanceCache};
use crate::error::{Error, Result};
use crate::logging::{debug, trace};
use crate::mapper::{JsonMapper, Model, ScalarKind, StructuralMapper, coerce_scalar, map_model};
use crate::request::RequestContext;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// Types whose instances are built from resolved arguments
pub trait Construct: Sized + 'static {
    /// Constructor parameters, in declaration order
    fn signature() -> Signature {
        Signature::new()
    }

    fn construct(args: &mut Arguments<'_>) -> Result<Self>;
}

/// A type the injector builds (and optionally shares) on demand
pub trait Injectable: Construct + Send + Sync {
    /// Share one instance across all resolutions
    fn singleton() -> bool {
        false
    }

    /// Custom creation hook used instead of [`Construct::construct`]
    fn factory() -> Option<Factory<Self>> {
        None
    }
}

/// Alternative creation path for an injectable, itself DI-resolved
pub struct Factory<T> {
    pub signature: Signature,
    pub build: fn(&mut Arguments<'_>) -> Result<T>,
}

impl<T> Factory<T> {
    pub fn new(build: fn(&mut Arguments<'_>) -> Result<T>) -> Self {
        Self {
            signature: Signature::new(),
            build,
        }
    }

    pub fn with_signature(mut self, signature: Signature) -> Self {
        self.signature = signature;
        self
    }
}

type InstanceBuilder = fn(&Injector, &RequestContext, &mut ResolutionStack) -> Result<Instance>;
type ModelBuilder = fn(&Injector, &RequestContext, &str) -> Result<Box<dyn Any + Send>>;

/// Type-erased handle on an [`Injectable`]
#[derive(Clone, Copy)]
pub struct InjectableType {
    type_id: TypeId,
    type_name: &'static str,
    build: InstanceBuilder,
}

impl InjectableType {
    pub fn of<T: Injectable>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            build: Injector::instantiate::<T>,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

/// Type-erased handle on a [`Model`]
#[derive(Clone, Copy)]
pub struct ModelType {
    type_name: &'static str,
    build: ModelBuilder,
}

impl ModelType {
    pub fn of<T: Model>() -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            build: Injector::build_model::<T>,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

/// What a parameter declares itself to be
#[derive(Clone, Copy)]
pub enum DeclaredType {
    Untyped,
    Scalar(ScalarKind),
    Context,
    Injectable(InjectableType),
    Structured(ModelType),
}

impl fmt::Debug for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclaredType::Untyped => f.write_str("Untyped"),
            DeclaredType::Scalar(kind) => write!(f, "Scalar({})", kind),
            DeclaredType::Context => f.write_str("Context"),
            DeclaredType::Injectable(t) => write!(f, "Injectable({})", t.type_name),
            DeclaredType::Structured(t) => write!(f, "Structured({})", t.type_name),
        }
    }
}

/// One declared parameter
#[derive(Debug, Clone)]
pub struct InjectionTarget {
    pub name: String,
    pub declared_type: DeclaredType,
    pub nullable: bool,
}

/// Ordered parameter list of a constructor or handler method
#[derive(Debug, Clone, Default)]
pub struct Signature {
    targets: Vec<InjectionTarget>,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, name: &str, declared_type: DeclaredType, nullable: bool) -> Self {
        self.targets.push(InjectionTarget {
            name: name.to_string(),
            declared_type,
            nullable,
        });
        self
    }

    /// Raw request value, null when absent
    pub fn untyped(self, name: &str) -> Self {
        self.push(name, DeclaredType::Untyped, true)
    }

    /// Required request value of the given kind
    pub fn scalar(self, name: &str, kind: ScalarKind) -> Self {
        self.push(name, DeclaredType::Scalar(kind), false)
    }

    pub fn nullable_scalar(self, name: &str, kind: ScalarKind) -> Self {
        self.push(name, DeclaredType::Scalar(kind), true)
    }

    /// The request context
    pub fn context(self, name: &str) -> Self {
        self.push(name, DeclaredType::Context, false)
    }

    pub fn injectable<T: Injectable>(self, name: &str) -> Self {
        self.push(name, DeclaredType::Injectable(InjectableType::of::<T>()), false)
    }

    pub fn model<T: Model>(self, name: &str) -> Self {
        self.push(name, DeclaredType::Structured(ModelType::of::<T>()), false)
    }

    pub fn targets(&self) -> &[InjectionTarget] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// A resolved argument
pub enum Argument {
    Value(Value),
    Context,
    Instance(Arc<dyn Any + Send + Sync>),
    Model(Box<dyn Any + Send>),
}

impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Value(value) => write!(f, "Value({})", value),
            Argument::Context => f.write_str("Context"),
            Argument::Instance(_) => f.write_str("Instance"),
            Argument::Model(_) => f.write_str("Model"),
        }
    }
}

enum ContextRef<'a> {
    Shared(&'a RequestContext),
    Exclusive(&'a mut RequestContext),
}

/// Resolved arguments, in declaration order, addressable by name
pub struct Arguments<'a> {
    context: ContextRef<'a>,
    entries: Vec<(String, Argument)>,
}

impl<'a> Arguments<'a> {
    pub fn context(&self) -> &RequestContext {
        match &self.context {
            ContextRef::Shared(ctx) => *ctx,
            ContextRef::Exclusive(ctx) => &**ctx,
        }
    }

    /// Mutable access, available to top-level handler and group arguments
    pub fn context_mut(&mut self) -> Result<&mut RequestContext> {
        match &mut self.context {
            ContextRef::Exclusive(ctx) => Ok(&mut **ctx),
            ContextRef::Shared(_) => Err(Error::Internal(
                "Request context is shared while resolving nested dependencies".into(),
            )),
        }
    }

    /// Resolved context parameter by name
    pub fn context_param(&self, name: &str) -> Result<&RequestContext> {
        match self.entry(name)? {
            Argument::Context => Ok(self.context()),
            other => Err(self.wrong_kind(name, "context", other)),
        }
    }

    /// Raw value of a value parameter
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find_map(|(key, argument)| match argument {
            Argument::Value(value) if key == name => Some(value),
            _ => None,
        })
    }

    /// Deserialize a value parameter
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = match self.entry(name)? {
            Argument::Value(value) => value.clone(),
            other => return Err(self.wrong_kind(name, "value", other)),
        };
        serde_json::from_value(value)
            .map_err(|e| Error::InvalidValue(format!("Argument '{}': {}", name, e)))
    }

    /// An injected instance
    pub fn injected<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>> {
        match self.entry(name)? {
            Argument::Instance(instance) => instance.clone().downcast::<T>().map_err(|_| {
                Error::Internal(format!(
                    "Argument '{}' is not a {}",
                    name,
                    std::any::type_name::<T>()
                ))
            }),
            other => Err(self.wrong_kind(name, "instance", other)),
        }
    }

    /// Take ownership of a mapped model
    pub fn take_model<T: 'static>(&mut self, name: &str) -> Result<T> {
        let position = self
            .entries
            .iter()
            .position(|(key, argument)| key == name && matches!(argument, Argument::Model(_)))
            .ok_or_else(|| Error::Internal(format!("No model argument named '{}'", name)))?;

        let (_, argument) = self.entries.remove(position);
        match argument {
            Argument::Model(model) => model.downcast::<T>().map(|model| *model).map_err(|_| {
                Error::Internal(format!(
                    "Argument '{}' is not a {}",
                    name,
                    std::any::type_name::<T>()
                ))
            }),
            _ => Err(Error::Internal(format!("No model argument named '{}'", name))),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, name: &str) -> Result<&Argument> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, argument)| argument)
            .ok_or_else(|| Error::Internal(format!("No argument named '{}'", name)))
    }

    fn wrong_kind(&self, name: &str, expected: &str, got: &Argument) -> Error {
        Error::Internal(format!(
            "Argument '{}' is not a {} argument (got {:?})",
            name, expected, got
        ))
    }
}

impl fmt::Debug for Arguments<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(name, argument)| (name, argument)))
            .finish()
    }
}

/// Injectables currently under construction
#[derive(Default)]
pub(crate) struct ResolutionStack {
    frames: Vec<(TypeId, &'static str)>,
}

impl ResolutionStack {
    fn enter(&mut self, type_id: TypeId, type_name: &'static str) -> Result<()> {
        if self.frames.iter().any(|(id, _)| *id == type_id) {
            let chain: Vec<&str> = self
                .frames
                .iter()
                .map(|(_, name)| *name)
                .chain(std::iter::once(type_name))
                .collect();
            return Err(Error::CircularDependency(chain.join(" -> ")));
        }
        self.frames.push((type_id, type_name));
        Ok(())
    }

    fn leave(&mut self) {
        self.frames.pop();
    }
}

/// Resolves signatures against a request context
#[derive(Clone)]
pub struct Injector {
    cache: SharedInstanceCache,
    mapper: Arc<dyn StructuralMapper>,
}

impl Injector {
    pub fn new(cache: SharedInstanceCache) -> Self {
        Self {
            cache,
            mapper: Arc::new(JsonMapper),
        }
    }

    pub fn with_mapper(mut self, mapper: Arc<dyn StructuralMapper>) -> Self {
        self.mapper = mapper;
        self
    }

    pub fn cache(&self) -> &SharedInstanceCache {
        &self.cache
    }

    pub fn mapper(&self) -> &dyn StructuralMapper {
        self.mapper.as_ref()
    }

    pub fn shared_mapper(&self) -> Arc<dyn StructuralMapper> {
        self.mapper.clone()
    }

    /// Resolve a signature. The arguments keep mutable access to the context.
    pub fn resolve<'a>(
        &self,
        signature: &Signature,
        context: &'a mut RequestContext,
    ) -> Result<Arguments<'a>> {
        let entries = self.resolve_entries(signature, context, &mut ResolutionStack::default())?;
        Ok(Arguments {
            context: ContextRef::Exclusive(context),
            entries,
        })
    }

    /// Resolve a signature with read-only access to the context
    pub fn resolve_shared<'a>(
        &self,
        signature: &Signature,
        context: &'a RequestContext,
    ) -> Result<Arguments<'a>> {
        self.resolve_nested(signature, context, &mut ResolutionStack::default())
    }

    /// Resolve and construct `T` without sharing it
    pub fn construct<T: Construct>(&self, context: &mut RequestContext) -> Result<T> {
        let mut args = self.resolve(&T::signature(), context)?;
        T::construct(&mut args)
    }

    /// Resolve an injectable the way a parameter of type `T` would be
    pub fn instance<T: Injectable>(&self, context: &RequestContext) -> Result<Arc<T>> {
        let instance = Self::instantiate::<T>(self, context, &mut ResolutionStack::default())?;
        instance.downcast::<T>().map_err(|_| {
            Error::Internal(format!(
                "Shared instance is not a {}",
                std::any::type_name::<T>()
            ))
        })
    }

    fn resolve_nested<'a>(
        &self,
        signature: &Signature,
        context: &'a RequestContext,
        stack: &mut ResolutionStack,
    ) -> Result<Arguments<'a>> {
        let entries = self.resolve_entries(signature, context, stack)?;
        Ok(Arguments {
            context: ContextRef::Shared(context),
            entries,
        })
    }

    fn resolve_entries(
        &self,
        signature: &Signature,
        context: &RequestContext,
        stack: &mut ResolutionStack,
    ) -> Result<Vec<(String, Argument)>> {
        let mut entries = Vec::with_capacity(signature.len());

        for target in signature.targets() {
            trace!(parameter = %target.name, declared = ?target.declared_type, "Resolving parameter");

            let argument = match target.declared_type {
                DeclaredType::Untyped => {
                    Argument::Value(context.get(&target.name).cloned().unwrap_or(Value::Null))
                }
                DeclaredType::Scalar(kind) => {
                    Argument::Value(self.resolve_scalar(target, kind, context)?)
                }
                DeclaredType::Context => Argument::Context,
                DeclaredType::Injectable(injectable) => {
                    Argument::Instance((injectable.build)(self, context, stack)?)
                }
                DeclaredType::Structured(model) => {
                    Argument::Model((model.build)(self, context, &target.name)?)
                }
            };
            entries.push((target.name.clone(), argument));
        }

        Ok(entries)
    }

    fn resolve_scalar(
        &self,
        target: &InjectionTarget,
        kind: ScalarKind,
        context: &RequestContext,
    ) -> Result<Value> {
        let value = context.get(&target.name).cloned().unwrap_or(Value::Null);

        if value.is_null() {
            if target.nullable {
                return Ok(Value::Null);
            }
            return Err(Error::DependenciesNotMet(format!(
                "Attempted to pass null for required argument {}: {} (missing from request?)",
                target.name, kind
            )));
        }

        let shown = value.to_string();
        coerce_scalar(kind, value).ok_or_else(|| {
            Error::InvalidValue(format!(
                "Argument {} expects {}, got {}",
                target.name, kind, shown
            ))
        })
    }

    fn instantiate<T: Injectable>(
        &self,
        context: &RequestContext,
        stack: &mut ResolutionStack,
    ) -> Result<Instance> {
        let type_id = TypeId::of::<T>();
        let type_name = std::any::type_name::<T>();

        stack.enter(type_id, type_name)?;
        let result = self.cached_or_build::<T>(context, stack);
        stack.leave();
        result
    }

    fn cached_or_build<T: Injectable>(
        &self,
        context: &RequestContext,
        stack: &mut ResolutionStack,
    ) -> Result<Instance> {
        let type_id = TypeId::of::<T>();

        if let Some(shared) = self.cache.peek(type_id) {
            trace!(injectable = std::any::type_name::<T>(), "Using shared instance");
            return Ok(shared);
        }

        if T::singleton() {
            self.cache
                .get_or_try_init(type_id, || self.build_injectable::<T>(context, stack))
        } else {
            self.build_injectable::<T>(context, stack)
        }
    }

    fn build_injectable<T: Injectable>(
        &self,
        context: &RequestContext,
        stack: &mut ResolutionStack,
    ) -> Result<Instance> {
        let type_name = std::any::type_name::<T>();

        let instance = match T::factory() {
            Some(factory) => {
                debug!(injectable = type_name, "Building through factory");
                let mut args = self.resolve_nested(&factory.signature, context, stack)?;
                (factory.build)(&mut args)?
            }
            None => {
                debug!(injectable = type_name, "Constructing");
                let mut args = self.resolve_nested(&T::signature(), context, stack)?;
                T::construct(&mut args)?
            }
        };

        Ok(Arc::new(instance))
    }

    fn build_model<T: Model>(
        &self,
        context: &RequestContext,
        name: &str,
    ) -> Result<Box<dyn Any + Send>> {
        // A nested object under the parameter's own name wins over the bag
        let source = match context.get(name) {
            Some(named @ Value::Object(_)) => named.clone(),
            _ => Value::Object(context.all().clone()),
        };

        let model: T = map_model(self.mapper.as_ref(), &source)?;
        Ok(Box::new(model))
    }
}

impl fmt::Debug for Injector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injector")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
