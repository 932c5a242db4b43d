use std::time::Duration;

use anyhow::Context;
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, Response, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_tracing::TracingMiddleware;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::api::FileUpload;
use crate::session::SessionStore;

#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    #[error("Network error: {0}")]
    Transport(#[from] reqwest_middleware::Error),

    #[error("Session rejected by server: {}", failure_text(.status, .message))]
    Unauthorized {
        status: StatusCode,
        message: Option<String>,
    },

    #[error("{}", failure_text(.status, .message))]
    Rejected {
        status: StatusCode,
        message: Option<String>,
    },

    #[error("{}", failure_text(.status, .message))]
    Server {
        status: StatusCode,
        message: Option<String>,
    },

    #[error("Failed to decode response: {0}")]
    Decode(#[source] reqwest::Error),

    #[error("Failed to build request: {0}")]
    InvalidRequest(String),
}

impl GatewayError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, GatewayError::Unauthorized { .. })
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            GatewayError::Unauthorized { status, .. }
            | GatewayError::Rejected { status, .. }
            | GatewayError::Server { status, .. } => Some(*status),
            GatewayError::Transport(_) | GatewayError::Decode(_) | GatewayError::InvalidRequest(_) => {
                None
            }
        }
    }

    /// Message the server put in the failure body, if any
    pub fn server_message(&self) -> Option<&str> {
        match self {
            GatewayError::Unauthorized { message, .. }
            | GatewayError::Rejected { message, .. }
            | GatewayError::Server { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    /// The server message when one was sent, else `fallback`
    pub fn user_message(&self, fallback: &str) -> String {
        self.server_message().unwrap_or(fallback).to_string()
    }
}

fn failure_text(status: &StatusCode, message: &Option<String>) -> String {
    match message {
        Some(message) => message.clone(),
        None => format!("Request failed with status {}", status.as_u16()),
    }
}

#[derive(Debug, Clone)]
pub enum MultipartField {
    Json { name: String, value: serde_json::Value },
    File { name: String, file: FileUpload },
}

impl MultipartField {
    /// JSON part, sent with an `application/json` content type
    pub fn json<T: Serialize>(name: &str, body: &T) -> Result<Self, GatewayError> {
        let value = serde_json::to_value(body)
            .map_err(|err| GatewayError::InvalidRequest(err.to_string()))?;
        Ok(MultipartField::Json {
            name: name.to_string(),
            value,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    Multipart(Vec<MultipartField>),
}

#[derive(Debug, Clone)]
/// Method, path relative to the api url and body of one outbound call
pub struct RequestDescriptor {
    pub method: Method,
    pub path: String,
    pub body: RequestBody,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, GatewayError> {
        let value = serde_json::to_value(body)
            .map_err(|err| GatewayError::InvalidRequest(err.to_string()))?;
        self.body = RequestBody::Json(value);
        Ok(self)
    }

    pub fn multipart(mut self, fields: Vec<MultipartField>) -> Self {
        self.body = RequestBody::Multipart(fields);
        self
    }
}

#[derive(Clone)]
/// Sends every request of the feature services, attaching the session bearer token.
/// A 401/403 answer invalidates the session, as long as it still holds the token
/// the request was sent with.
pub struct Gateway {
    url: String,
    client: ClientWithMiddleware,
    session: SessionStore,
}

impl Gateway {
    pub fn new(url: &str, timeout: Duration, session: SessionStore) -> anyhow::Result<Self> {
        let reqwest_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build reqwest client")?;
        let client = ClientBuilder::new(reqwest_client)
            // Insert the tracing middleware
            .with(TracingMiddleware::default())
            .build();

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            client,
            session,
        })
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    #[tracing::instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn send(&self, request: RequestDescriptor) -> Result<Response, GatewayError> {
        let token = self.session.token();
        let mut builder = self
            .client
            .request(request.method, format!("{}{}", self.url, request.path));
        if let Some(token) = token.as_ref() {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Multipart(fields) => builder.multipart(build_form(fields)?),
        };

        let response = builder.send().await.map_err(|err| {
            tracing::error!("Request failed without response: {}", err);
            GatewayError::from(err)
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.bytes().await.unwrap_or_default();
        let message = failure_message(&body);

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            tracing::warn!(status = status.as_u16(), "Request rejected as unauthenticated");
            if let Some(token) = token.as_deref() {
                self.session.invalidate_if_token(token);
            }
            Err(GatewayError::Unauthorized { status, message })
        } else if status.is_server_error() {
            tracing::error!(status = status.as_u16(), ?message, "Server failure");
            Err(GatewayError::Server { status, message })
        } else {
            tracing::warn!(status = status.as_u16(), ?message, "Request rejected");
            Err(GatewayError::Rejected { status, message })
        }
    }

    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestDescriptor,
    ) -> Result<T, GatewayError> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(GatewayError::Decode)
    }

    /// Sends the request and ignores the response body
    pub async fn send_empty(&self, request: RequestDescriptor) -> Result<(), GatewayError> {
        self.send(request).await.map(|_| ())
    }
}

fn build_form(fields: Vec<MultipartField>) -> Result<Form, GatewayError> {
    let mut form = Form::new();
    for field in fields {
        form = match field {
            MultipartField::Json { name, value } => {
                let part = Part::bytes(value.to_string().into_bytes())
                    .mime_str("application/json")
                    .map_err(|err| GatewayError::InvalidRequest(err.to_string()))?;
                form.part(name, part)
            }
            MultipartField::File { name, file } => {
                let part = Part::bytes(file.bytes)
                    .file_name(file.file_name)
                    .mime_str(&file.mime_type)
                    .map_err(|err| GatewayError::InvalidRequest(err.to_string()))?;
                form.part(name, part)
            }
        };
    }
    Ok(form)
}

/// Human readable failure text sent by the server:
/// `message` or `error` of a JSON body, or a plain text body
pub fn failure_message(body: &[u8]) -> Option<String> {
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(value) => ["message", "error"]
            .iter()
            .filter_map(|key| value.get(key).and_then(|v| v.as_str()))
            .chain(value.as_str())
            .map(str::trim)
            .find(|text| !text.is_empty())
            .map(str::to_string),
        Err(_) => std::str::from_utf8(body)
            .ok()
            .map(str::trim)
            .filter(|text| !text.is_empty() && !text.starts_with('<'))
            .map(str::to_string),
    }
}
