// Praetor - convention-routed request dispatch for Rust
//
// One registry of handler groups serves both HTTP requests and command-line
// invocations, with constructor injection and middleware chains in between.

// Re-export core functionality
pub use praetor_core::*;

// Re-export optional crates
#[cfg(feature = "config")]
pub use praetor_config;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        Application,
        Arguments,
        CliOutput,
        Construct,
        Dispatcher,
        DispatcherOptions,
        Error,
        Factory,
        HandlerGroup,
        HandlerMethod,
        HandlerRegistry,
        HttpMethod,
        HttpResponse,
        Injectable,
        Middleware,
        MiddlewareChain,
        MiddlewareDescriptor,
        MiddlewareResolution,
        Model,
        Module,
        Reply,
        RequestContext,
        Result,
        ScalarKind,
        SharedInstanceCache,
        Signature,
        StatusCode,
        UploadedFile,
    };

    #[cfg(feature = "config")]
    pub use praetor_config::{AppConfig, ConfigManager};
}
