// Request dispatch

use crate::container::SharedInstanceCache;
use crate::error::{Error, Result};
use crate::http::Reply;
use crate::injector::Injector;
use crate::logging::{debug, info, info_span};
use crate::mapper::StructuralMapper;
use crate::middleware::MiddlewareChain;
use crate::module::{DEFAULT_NAMESPACE, HandlerGroup, HandlerMethod, HandlerRegistry};
use crate::request::RequestContext;
use std::sync::Arc;

/// Dispatcher settings
#[derive(Debug, Clone)]
pub struct DispatcherOptions {
    /// Namespace handler groups are looked up in
    pub namespace: String,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

/// Runs a routed request context through middleware, injection and the
/// target handler.
///
/// Order of operations:
/// 1. global middleware;
/// 2. handler group lookup;
/// 3. target method selection and HTTP verb check;
/// 4. group middleware, then group construction;
/// 5. method middleware;
/// 6. argument resolution and invocation.
///
/// Steps 2 and 3 are registry lookups, so a wrong verb is reported before
/// any group or method middleware or argument resolution runs.
#[derive(Debug)]
pub struct Dispatcher {
    options: DispatcherOptions,
    registry: HandlerRegistry,
    global: MiddlewareChain,
    injector: Injector,
}

impl Dispatcher {
    pub fn new(registry: HandlerRegistry) -> Self {
        Self {
            options: DispatcherOptions::default(),
            registry,
            global: MiddlewareChain::new(),
            injector: Injector::new(SharedInstanceCache::new()),
        }
    }

    pub fn with_options(mut self, options: DispatcherOptions) -> Self {
        self.options = options;
        self
    }

    /// Middleware run for every request, before group lookup
    pub fn with_global_middleware(mut self, chain: MiddlewareChain) -> Self {
        self.global = chain;
        self
    }

    /// Use `cache` for singleton injectables (e.g. one seeded at startup)
    pub fn with_cache(mut self, cache: SharedInstanceCache) -> Self {
        self.injector = Injector::new(cache).with_mapper(self.mapper());
        self
    }

    pub fn with_mapper(mut self, mapper: Arc<dyn StructuralMapper>) -> Self {
        self.injector = self.injector.with_mapper(mapper);
        self
    }

    pub fn options(&self) -> &DispatcherOptions {
        &self.options
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn injector(&self) -> &Injector {
        &self.injector
    }

    pub fn cache(&self) -> &SharedInstanceCache {
        self.injector.cache()
    }

    fn mapper(&self) -> Arc<dyn StructuralMapper> {
        self.injector.shared_mapper()
    }

    /// Dispatch a context whose target identifiers are already set
    pub fn run(&self, ctx: &mut RequestContext) -> Result<Reply> {
        let span = info_span!(
            "dispatch",
            request_id = %ctx.request_id(),
            module = %ctx.target_module(),
            group = %ctx.target_group(),
        );
        let _guard = span.enter();

        self.global.run(&self.injector, ctx)?;

        let group = self.find_group(ctx)?;
        if group.is_cli_only() && !ctx.is_cli() {
            return Err(Error::CliOnly(group.qualified_name()));
        }

        let mut method = self.select_method(group, ctx)?;

        group.middleware_chain().run(&self.injector, ctx)?;
        if ctx.target_method() != method.name() {
            debug!(method = %ctx.target_method(), "Group middleware retargeted the request");
            method = self.select_method(group, ctx)?;
        }

        let mut instance = {
            let mut args = self.injector.resolve(group.constructor(), ctx)?;
            group.construct(&mut args)?
        };

        method.middleware_chain().run(&self.injector, ctx)?;

        let mut args = self.injector.resolve(method.signature(), ctx)?;
        let reply = method.invoke(&mut *instance, &mut args)?;

        info!(
            group = %group.qualified_name(),
            method = %method.name(),
            status = reply.status().as_u16(),
            "Request dispatched"
        );
        Ok(reply)
    }

    fn find_group(&self, ctx: &RequestContext) -> Result<&HandlerGroup> {
        if ctx.target_group().is_empty() {
            return Err(Error::HandlerGroupNotFound("No handler group requested".into()));
        }

        self.registry
            .find(&self.options.namespace, ctx.target_module(), ctx.target_group())
            .ok_or_else(|| {
                Error::HandlerGroupNotFound(format!(
                    "{}::{}::{}",
                    self.options.namespace,
                    ctx.target_module(),
                    ctx.target_group()
                ))
            })
    }

    /// Routed method, else the group's entrypoint. Records the choice on
    /// the context.
    fn select_method<'g>(
        &self,
        group: &'g HandlerGroup,
        ctx: &mut RequestContext,
    ) -> Result<&'g HandlerMethod> {
        let name = if ctx.target_method().is_empty() {
            group
                .entrypoint()
                .ok_or_else(|| {
                    Error::HandlerMethodNotFound(format!(
                        "No method requested and {} has no entrypoint",
                        group.qualified_name()
                    ))
                })?
                .to_string()
        } else {
            ctx.target_method().to_string()
        };

        let method = group.method(&name).ok_or_else(|| {
            Error::HandlerMethodNotFound(format!("{}::{}", group.qualified_name(), name))
        })?;
        method.check_method(ctx.method())?;

        ctx.set_target_method(name);
        Ok(method)
    }
}
