//! Per-request context.
//!
//! A [`RequestContext`] is built once per inbound call, either from HTTP
//! parts or from a CLI argument vector, and travels through every stage of
//! dispatch. Middleware may rewrite its parameters and retarget it.

use crate::error::Result;
use crate::form::{Parameters, parse_form, parse_query};
use crate::http::HttpMethod;
use crate::logging::{debug, warn};
use crate::multipart::{MultipartLimits, MultipartParser};
use crate::routing::{Route, query_of, strip_query};
use crate::upload::UploadedFile;
use http::HeaderMap;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use serde_json::Value;
use std::collections::HashMap;
use std::io::{BufRead, Read};
use uuid::Uuid;

/// How request bodies are decoded
#[derive(Debug, Clone, Default)]
pub struct BodyOptions {
    pub multipart: MultipartLimits,
}

/// Everything known about the request being dispatched
#[derive(Debug)]
pub struct RequestContext {
    request_id: Uuid,
    method: Option<HttpMethod>,
    path: String,
    headers: HeaderMap,
    parameters: Parameters,
    files: HashMap<String, UploadedFile>,
    cli_arguments: Vec<String>,
    target_module: String,
    target_group: String,
    target_method: String,
}

impl RequestContext {
    /// Empty context with no method, as used for CLI calls and scratch
    /// resolution
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            method: None,
            path: String::new(),
            headers: HeaderMap::new(),
            parameters: Parameters::new(),
            files: HashMap::new(),
            cli_arguments: Vec::new(),
            target_module: String::new(),
            target_group: String::new(),
            target_method: String::new(),
        }
    }

    /// Build from a CLI argument vector (program name excluded).
    ///
    /// `args[0]` is the route token, optionally followed by `?query`; the
    /// remaining arguments are kept verbatim.
    pub fn from_cli(args: &[String]) -> Self {
        let mut context = Self::new();
        if let Some((token, rest)) = args.split_first() {
            context.path = strip_query(token).to_string();
            if let Some(query) = query_of(token) {
                context.parameters = parse_query(query);
            }
            context.cli_arguments = rest.to_vec();
        }
        context
    }

    /// Build from HTTP parts.
    ///
    /// GET requests take their parameters from the query string, every other
    /// method from the body, decoded according to its Content-Type.
    pub fn from_http<R: BufRead>(
        method: HttpMethod,
        uri: &str,
        headers: HeaderMap,
        mut body: R,
        options: &BodyOptions,
    ) -> Result<Self> {
        let mut context = Self::new();
        context.method = Some(method);
        context.path = strip_query(uri).to_string();
        context.headers = headers;

        if method == HttpMethod::GET {
            if let Some(query) = query_of(uri) {
                context.parameters = parse_query(query);
            }
            return Ok(context);
        }

        let declared = context
            .header(CONTENT_TYPE.as_str())
            .unwrap_or_default()
            .to_string();
        let content_type = declared.to_ascii_lowercase();

        if content_type.contains("multipart/form-data") {
            // The boundary is case-sensitive
            if let Some(parser) = MultipartParser::from_content_type(&declared) {
                let data = parser
                    .with_limits(options.multipart.clone())
                    .parse(&mut body)?;
                context.parameters = data.fields;
                context.files = data.files;
            } else {
                debug!("Multipart request without boundary, body ignored");
            }
            return Ok(context);
        }

        let mut raw = Vec::new();
        body.read_to_end(&mut raw)?;
        if raw.is_empty() {
            return Ok(context);
        }

        context.parameters = if content_type.contains("json") {
            decode_json(&raw)
        } else if content_type.contains("application/x-www-form-urlencoded") {
            parse_form(&raw)
        } else {
            let mut params = Parameters::new();
            params.insert(
                "0".to_string(),
                Value::String(String::from_utf8_lossy(&raw).into_owned()),
            );
            params
        };

        Ok(context)
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = Some(method);
        self
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Add a header; invalid names or values are dropped
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => warn!(header = name, "Ignoring invalid header"),
        }
        self
    }

    pub fn with_file(mut self, field: impl Into<String>, file: UploadedFile) -> Self {
        self.files.insert(field.into(), file);
        self
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// `None` for CLI calls
    pub fn method(&self) -> Option<HttpMethod> {
        self.method
    }

    pub fn is_cli(&self) -> bool {
        self.method.is_none()
    }

    /// Routed path, without query string
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn cli_arguments(&self) -> &[String] {
        &self.cli_arguments
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    pub fn get_or(&self, name: &str, default: Value) -> Value {
        self.parameters.get(name).cloned().unwrap_or(default)
    }

    /// The named subset of parameters; missing names map to `null`
    pub fn get_some(&self, names: &[&str]) -> Parameters {
        names
            .iter()
            .map(|name| (name.to_string(), self.get_or(name, Value::Null)))
            .collect()
    }

    pub fn all(&self) -> &Parameters {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.parameters.insert(name.into(), value.into());
    }

    pub fn set_parameters(&mut self, parameters: Parameters) {
        self.parameters = parameters;
    }

    pub fn files(&self) -> &HashMap<String, UploadedFile> {
        &self.files
    }

    pub fn file(&self, field: &str) -> Option<&UploadedFile> {
        self.files.get(field)
    }

    pub fn file_mut(&mut self, field: &str) -> Option<&mut UploadedFile> {
        self.files.get_mut(field)
    }

    /// Take ownership of an upload, e.g. to keep it past the request
    pub fn take_file(&mut self, field: &str) -> Option<UploadedFile> {
        self.files.remove(field)
    }

    pub fn target_module(&self) -> &str {
        &self.target_module
    }

    pub fn target_group(&self) -> &str {
        &self.target_group
    }

    /// Empty when no method was routed or set
    pub fn target_method(&self) -> &str {
        &self.target_method
    }

    pub fn set_target_module(&mut self, module: impl Into<String>) {
        self.target_module = module.into();
    }

    pub fn set_target_group(&mut self, group: impl Into<String>) {
        self.target_group = group.into();
    }

    pub fn set_target_method(&mut self, method: impl Into<String>) {
        self.target_method = method.into();
    }

    /// Copy routed identifiers onto the context
    pub fn apply_route(&mut self, route: &Route) {
        self.target_module = route.module.clone();
        self.target_group = route.group.clone();
        self.target_method = route.method.clone().unwrap_or_default();
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Objects become the bag; arrays and scalars are stored positionally
fn decode_json(raw: &[u8]) -> Parameters {
    match serde_json::from_slice::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(Value::Array(items)) => items
            .into_iter()
            .enumerate()
            .map(|(i, value)| (i.to_string(), value))
            .collect(),
        Ok(Value::Null) => Parameters::new(),
        Ok(scalar) => {
            let mut params = Parameters::new();
            params.insert("0".to_string(), scalar);
            params
        }
        Err(e) => {
            warn!(error = %e, "Malformed JSON body, continuing with no parameters");
            Parameters::new()
        }
    }
}
