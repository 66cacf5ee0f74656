// HTTP method, handler reply and response types

pub use http::{HeaderMap, HeaderValue, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Request methods a handler can be constrained to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
}

impl HttpMethod {
    /// Case-insensitive parse; unsupported verbs yield `None`
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "GET" => Some(HttpMethod::GET),
            "POST" => Some(HttpMethod::POST),
            "PUT" => Some(HttpMethod::PUT),
            "DELETE" => Some(HttpMethod::DELETE),
            "PATCH" => Some(HttpMethod::PATCH),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::DELETE => "DELETE",
            HttpMethod::PATCH => "PATCH",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a handler method hands back to the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Serialized as the body with status 200
    Data(Value),
    /// Status only, empty body
    Status(StatusCode),
    /// Explicit status with optional body
    Response {
        status: StatusCode,
        data: Option<Value>,
    },
    /// Status 200 with an empty body
    Empty,
}

impl Reply {
    /// Serialize any value into a data reply
    pub fn json<T: Serialize>(value: &T) -> Result<Self, crate::Error> {
        serde_json::to_value(value)
            .map(Reply::Data)
            .map_err(|e| crate::Error::Internal(format!("Failed to serialize reply: {}", e)))
    }

    pub fn respond(status: StatusCode, data: Option<Value>) -> Self {
        Reply::Response { status, data }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Reply::Data(_) => StatusCode::OK,
            Reply::Status(status) | Reply::Response { status, .. } => *status,
            Reply::Empty => StatusCode::OK,
        }
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            Reply::Data(value) => Some(value),
            Reply::Response { data, .. } => data.as_ref(),
            Reply::Status(_) | Reply::Empty => None,
        }
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Reply::Data(value)
    }
}

impl From<StatusCode> for Reply {
    fn from(status: StatusCode) -> Self {
        Reply::Status(status)
    }
}

/// Response produced at the HTTP boundary
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(StatusCode::OK.as_u16())
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND.as_u16())
    }

    pub fn internal_server_error() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR.as_u16())
    }

    pub fn with_json<T: Serialize>(mut self, value: &T) -> Result<Self, crate::Error> {
        self.body = serde_json::to_vec(value)
            .map_err(|e| crate::Error::Internal(format!("Failed to serialize body: {}", e)))?;
        self.headers.insert(
            "Content-Type".to_string(),
            "application/json; charset=utf-8".to_string(),
        );
        Ok(self)
    }

    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.headers.insert(key, value);
        self
    }

    /// Render a handler reply
    pub fn from_reply(reply: &Reply) -> Self {
        let response = Self::new(reply.status().as_u16());
        match reply.data() {
            Some(data) => response
                .with_json(data)
                .unwrap_or_else(|_| Self::internal_server_error()),
            None => response,
        }
    }

    pub fn body_json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }
}
