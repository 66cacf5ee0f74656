//! Transport boundary.
//!
//! [`Application`] turns CLI argument vectors and HTTP parts into request
//! contexts, routes and dispatches them, and converts the outcome into a
//! [`CliOutput`] or an [`HttpResponse`]. Every dispatch error is caught and
//! logged here, once, and mapped to a status via [`Error::status_code`].

use crate::dispatcher::Dispatcher;
use crate::error::{Error, Result};
use crate::http::{HttpMethod, HttpResponse, Reply};
use crate::logging::{debug, error};
use crate::request::{BodyOptions, RequestContext};
use crate::routing::Router;
use http::{HeaderMap, StatusCode};
use serde_json::json;
use std::io::BufRead;

/// Result of a CLI dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliOutput {
    pub status: StatusCode,
    /// JSON rendering of the reply, empty on failure or for empty replies
    pub output: String,
}

impl CliOutput {
    /// Process exit code: 0 on success, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.status.is_success() { 0 } else { 1 }
    }

    fn failed(status: StatusCode) -> Self {
        Self {
            status,
            output: String::new(),
        }
    }
}

/// Owns the dispatcher and the transport settings
#[derive(Debug)]
pub struct Application {
    dispatcher: Dispatcher,
    router: Router,
    body: BodyOptions,
}

impl Application {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            router: Router::new(),
            body: BodyOptions::default(),
        }
    }

    pub fn with_body_options(mut self, body: BodyOptions) -> Self {
        self.body = body;
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Handle `<route>[?query] [args...]` (program name excluded)
    pub fn handle_cli(&self, args: &[String]) -> CliOutput {
        let token = args.first().map(String::as_str).unwrap_or_default();
        let Some(route) = self.router.route(token) else {
            debug!("Empty CLI route");
            return CliOutput::failed(StatusCode::NOT_FOUND);
        };

        let mut ctx = RequestContext::from_cli(args);
        ctx.apply_route(&route);

        match self.dispatcher.run(&mut ctx) {
            Ok(reply) => match render_cli(&reply) {
                Ok(output) => CliOutput {
                    status: reply.status(),
                    output,
                },
                Err(e) => CliOutput::failed(self.report(&ctx, &e)),
            },
            Err(e) => CliOutput::failed(self.report(&ctx, &e)),
        }
    }

    /// Handle an accepted HTTP request
    pub fn handle_http<R: BufRead>(
        &self,
        method: &str,
        uri: &str,
        headers: HeaderMap,
        body: R,
    ) -> HttpResponse {
        if method.eq_ignore_ascii_case("OPTIONS") {
            return HttpResponse::ok();
        }

        let Some(method) = HttpMethod::parse(method) else {
            debug!(method, "Unsupported HTTP method");
            return HttpResponse::new(StatusCode::METHOD_NOT_ALLOWED.as_u16());
        };

        let Some(route) = self.router.route(uri) else {
            return HttpResponse::not_found();
        };

        let mut ctx = match RequestContext::from_http(method, uri, headers, body, &self.body) {
            Ok(ctx) => ctx,
            Err(e) => {
                error!(error = %e, uri, "Failed to read request body");
                return HttpResponse::new(e.status_code().as_u16());
            }
        };
        ctx.apply_route(&route);

        match self.dispatcher.run(&mut ctx) {
            Ok(reply) => HttpResponse::from_reply(&reply),
            Err(e) => HttpResponse::new(self.report(&ctx, &e).as_u16()),
        }
    }

    fn report(&self, ctx: &RequestContext, err: &Error) -> StatusCode {
        let status = err.status_code();
        let message = match err {
            Error::RequestRejected(resolution) => resolution.message.clone(),
            other => other.to_string(),
        };

        error!(
            request_id = %ctx.request_id(),
            path = %ctx.path(),
            status = status.as_u16(),
            error = %message,
            "Request failed"
        );
        status
    }
}

fn render_cli(reply: &Reply) -> Result<String> {
    let value = match reply {
        Reply::Data(data) => data.clone(),
        Reply::Status(status) => json!(status.as_u16()),
        Reply::Response { status, data } => json!({
            "status": status.as_u16(),
            "data": data,
        }),
        Reply::Empty => return Ok(String::new()),
    };

    serde_json::to_string(&value)
        .map_err(|e| Error::Internal(format!("Failed to render reply: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HandlerRegistry;
    use std::io::Cursor;

    fn empty_app() -> Application {
        Application::new(Dispatcher::new(HandlerRegistry::new()))
    }

    #[test]
    fn test_render_cli() {
        assert_eq!(render_cli(&Reply::Data(json!({"a": 1}))).unwrap(), r#"{"a":1}"#);
        assert_eq!(render_cli(&Reply::Status(StatusCode::CREATED)).unwrap(), "201");
        assert_eq!(render_cli(&Reply::Empty).unwrap(), "");
        assert_eq!(
            render_cli(&Reply::respond(StatusCode::ACCEPTED, None)).unwrap(),
            r#"{"status":202,"data":null}"#
        );
    }

    #[test]
    fn test_empty_route_is_not_found() {
        let app = empty_app();

        assert_eq!(app.handle_cli(&[]).status, StatusCode::NOT_FOUND);
        let response = app.handle_http("GET", "/", HeaderMap::new(), Cursor::new(Vec::new()));
        assert_eq!(response.status, 404);
    }

    #[test]
    fn test_unknown_group_is_not_found() {
        let response = empty_app().handle_http(
            "GET",
            "/nowhere",
            HeaderMap::new(),
            Cursor::new(Vec::new()),
        );
        assert_eq!(response.status, 404);
        assert!(response.body.is_empty());
    }

    #[test]
    fn test_options_and_unsupported_verbs() {
        let app = empty_app();
        let body = || Cursor::new(Vec::new());

        assert_eq!(app.handle_http("OPTIONS", "/x", HeaderMap::new(), body()).status, 200);
        assert_eq!(app.handle_http("TRACE", "/x", HeaderMap::new(), body()).status, 405);
    }

    #[test]
    fn test_exit_code() {
        assert_eq!(CliOutput::failed(StatusCode::NOT_FOUND).exit_code(), 1);
        let ok = CliOutput {
            status: StatusCode::OK,
            output: String::new(),
        };
        assert_eq!(ok.exit_code(), 0);
    }
}
