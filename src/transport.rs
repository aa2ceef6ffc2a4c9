//! HTTP transport seam
//!
//! Every network request of the acquisition pipeline goes through the
//! [`Transport`] trait. The production implementation wraps a blocking
//! `reqwest` client; tests script responses in memory.

use std::fmt;
use std::io::{self, Cursor, Read};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while talking to the remote server
#[derive(Debug, Error)]
pub enum TransportError {
    /// Failed to construct the HTTP client
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    /// The request could not be sent or no response was received
    #[error("Request to {url} failed: {reason}")]
    RequestFailed { url: String, reason: String },

    /// The response body could not be read
    #[error("Failed to read response body from {url}: {source}")]
    BodyUnreadable { url: String, source: io::Error },
}

/// A response whose body has not been consumed yet
///
/// The body is a plain reader so large payloads can be streamed to storage
/// without buffering them in memory.
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Value of the `Content-Length` header, if the server declared one
    pub content_length: Option<u64>,
    /// The unread response body
    pub body: Box<dyn Read + Send>,
}

impl HttpResponse {
    /// Builds a response around an in-memory body with a matching content length
    pub fn from_bytes(status: u16, body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        Self {
            status,
            content_length: Some(body.len() as u64),
            body: Box::new(Cursor::new(body)),
        }
    }

    /// Returns true for a `200 OK` response
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    /// Reads the whole body into a string
    pub fn into_text(mut self, url: &str) -> Result<String, TransportError> {
        let mut text = String::new();
        self.body
            .read_to_string(&mut text)
            .map_err(|source| TransportError::BodyUnreadable {
                url: url.to_string(),
                source,
            })?;
        Ok(text)
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Trait for issuing GET requests against the catalog and its CDN.
///
/// `identity` is the caller identity token a request must present. The CDN
/// only serves a video link to a request carrying the identity the link was
/// published for; `None` means the transport's default identity.
pub trait Transport: Send + 'static {
    /// Issues a GET request and returns the response with an unread body
    fn get(&self, url: &str, identity: Option<&str>) -> Result<HttpResponse, TransportError>;

    /// Creates an independent transport context for a single task
    ///
    /// Concurrent tasks never share a client, so per-request identity state
    /// of one task can not leak into another.
    fn isolated(&self) -> Result<Self, TransportError>
    where
        Self: Sized;
}

/// Transport backed by a blocking `reqwest` client.
///
/// The identity token travels as the `User-Agent` header, which is what the
/// CDN matches video links against.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    user_agent: String,
}

impl HttpTransport {
    /// Connect timeout; there is no overall timeout since videos stream for minutes
    const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Creates a new transport presenting `user_agent` unless a request overrides it.
    pub fn new(user_agent: impl Into<String>) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Self::CONNECT_TIMEOUT)
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| TransportError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            user_agent: user_agent.into(),
        })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str, identity: Option<&str>) -> Result<HttpResponse, TransportError> {
        let agent = identity.unwrap_or(&self.user_agent);

        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, agent)
            .send()
            .map_err(|e| TransportError::RequestFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        Ok(HttpResponse {
            status: response.status().as_u16(),
            content_length: response.content_length(),
            body: Box::new(response),
        })
    }

    fn isolated(&self) -> Result<Self, TransportError> {
        Self::new(self.user_agent.clone())
    }
}
