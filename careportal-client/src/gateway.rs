use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use shared::{
    config::client::Config,
    models::{
        CreateThreadRequest, ErrorResponse, LoginRequest, PageQuery, SendMessageRequest,
        ThreadQuery,
    },
};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::session::SessionIdentity;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
const USER_AGENT: &str = concat!("careportal-cli/", env!("CARGO_PKG_VERSION"));

/// Failures talking to the portal REST API.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("unauthorized: the session has expired or the token was rejected")]
    Unauthorized,
    #[error("request failed with {status}: {message}")]
    Status { status: StatusCode, message: String },
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("invalid response payload: {0}")]
    Decode(String),
    #[error("invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid thread id: {0:?}")]
    InvalidThreadId(String),
}

impl GatewayError {
    /// Timeouts, connection failures, throttling and 5xx responses.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Transport(_) => true,
            Self::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::Unauthorized | Self::Decode(_) | Self::Url(_) | Self::InvalidThreadId(_) => {
                false
            }
        }
    }

    #[must_use]
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err)
        }
    }
}

/// The messaging endpoints the conversation core depends on.
///
/// List and detail calls hand back raw JSON: envelope tolerance belongs to
/// [`crate::normalize`], not to the transport.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// `GET /messages/threads?cursor&limit&q`
    async fn list_threads(&self, query: &ThreadQuery) -> Result<Value, GatewayError>;

    /// `GET /messages/threads/:id?cursor&limit`
    async fn get_thread(&self, thread_id: &str, page: &PageQuery) -> Result<Value, GatewayError>;

    /// `GET /messages/threads/:id/messages?cursor&limit`
    async fn list_messages(
        &self,
        thread_id: &str,
        page: &PageQuery,
    ) -> Result<Value, GatewayError>;

    /// `POST /messages/threads/:id/messages`
    async fn post_message(
        &self,
        thread_id: &str,
        request: &SendMessageRequest,
    ) -> Result<Value, GatewayError>;

    /// `POST /messages/threads`
    async fn create_thread(&self, request: &CreateThreadRequest) -> Result<Value, GatewayError>;

    /// `POST /messages/threads/:id/read`
    async fn mark_read(&self, thread_id: &str) -> Result<(), GatewayError>;

    /// `GET /messages/unread-count`
    async fn unread_count(&self) -> Result<Value, GatewayError>;

    /// `GET /doctors?limit`
    async fn list_doctors(&self, limit: u32) -> Result<Value, GatewayError>;
}

/// HTTP client for the portal API; attaches the bearer token from the
/// injected session to every request.
#[derive(Clone)]
pub struct PortalClient {
    base_url: Url,
    client: Client,
    session: Arc<dyn SessionIdentity>,
}

impl std::fmt::Debug for PortalClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl PortalClient {
    /// Create a client with the default 15 s request timeout.
    ///
    /// # Errors
    /// Returns an error if `base_url` is not a valid URL or the HTTP client
    /// cannot be built.
    pub fn new(base_url: &str, session: Arc<dyn SessionIdentity>) -> Result<Self, GatewayError> {
        Self::with_timeout(base_url, session, DEFAULT_TIMEOUT)
    }

    /// # Errors
    /// Returns an error if `base_url` is not a valid URL or the HTTP client
    /// cannot be built.
    pub fn with_timeout(
        base_url: &str,
        session: Arc<dyn SessionIdentity>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        // A trailing slash keeps `Url::join` from replacing the last path segment.
        let base_url = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))?;
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(GatewayError::Transport)?;
        Ok(Self {
            base_url,
            client,
            session,
        })
    }

    /// # Errors
    /// See [`PortalClient::with_timeout`].
    pub fn from_config(
        config: &Config,
        session: Arc<dyn SessionIdentity>,
    ) -> Result<Self, GatewayError> {
        Self::with_timeout(&config.api_base_url, session, config.request_timeout())
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn api_url(&self, path: &str) -> Result<Url, GatewayError> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    /// `messages/threads/:id[/action]`, with the id encoded as one path
    /// segment.
    fn thread_url(&self, thread_id: &str, action: Option<&str>) -> Result<Url, GatewayError> {
        if matches!(thread_id.trim(), "" | "." | "..") {
            return Err(GatewayError::InvalidThreadId(thread_id.to_string()));
        }
        let mut url = self.api_url("messages/threads")?;
        url.path_segments_mut()
            .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .push(thread_id)
            .extend(action);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.session.bearer_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Value, GatewayError> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(GatewayError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map_or(body, |error| error.to_string());
            debug!(%status, %message, "portal request rejected");
            return Err(GatewayError::Status { status, message });
        }

        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|err| GatewayError::Decode(err.to_string()))
    }

    /// Exchange credentials for a session token. Sent without an
    /// `Authorization` header.
    ///
    /// # Errors
    /// Returns [`GatewayError::Unauthorized`] for rejected credentials or a
    /// transport/status error.
    pub async fn login(&self, request: &LoginRequest) -> Result<Value, GatewayError> {
        let url = self.api_url("auth/login")?;
        let response = self.client.post(url).json(request).send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(GatewayError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map_or(body, |error| error.to_string());
            return Err(GatewayError::Status { status, message });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl MessagingGateway for PortalClient {
    async fn list_threads(&self, query: &ThreadQuery) -> Result<Value, GatewayError> {
        let url = self.api_url("messages/threads")?;
        self.execute(self.client.get(url).query(query)).await
    }

    async fn get_thread(&self, thread_id: &str, page: &PageQuery) -> Result<Value, GatewayError> {
        let url = self.thread_url(thread_id, None)?;
        self.execute(self.client.get(url).query(page)).await
    }

    async fn list_messages(
        &self,
        thread_id: &str,
        page: &PageQuery,
    ) -> Result<Value, GatewayError> {
        let url = self.thread_url(thread_id, Some("messages"))?;
        self.execute(self.client.get(url).query(page)).await
    }

    async fn post_message(
        &self,
        thread_id: &str,
        request: &SendMessageRequest,
    ) -> Result<Value, GatewayError> {
        let url = self.thread_url(thread_id, Some("messages"))?;
        self.execute(self.client.post(url).json(request)).await
    }

    async fn create_thread(&self, request: &CreateThreadRequest) -> Result<Value, GatewayError> {
        let url = self.api_url("messages/threads")?;
        self.execute(self.client.post(url).json(request)).await
    }

    async fn mark_read(&self, thread_id: &str) -> Result<(), GatewayError> {
        let url = self.thread_url(thread_id, Some("read"))?;
        self.execute(self.client.post(url).json(&serde_json::json!({})))
            .await
            .map(|_| ())
    }

    async fn unread_count(&self) -> Result<Value, GatewayError> {
        let url = self.api_url("messages/unread-count")?;
        self.execute(self.client.get(url)).await
    }

    async fn list_doctors(&self, limit: u32) -> Result<Value, GatewayError> {
        let url = self.api_url("doctors")?;
        self.execute(self.client.get(url).query(&[("limit", limit)]))
            .await
    }
}
