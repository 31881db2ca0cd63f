//! Transport layer: one request/response exchange per call.
//!
//! The [`Transport`] trait is the seam between the client's retry policy and
//! the network. [`HttpTransport`] is the production implementation; tests
//! substitute scripted transports.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tracing::trace;
use url::Url;

use crate::rpc::envelope::Envelope;

/// Path the simulation serves JSON-RPC on.
pub const RPC_PATH: &str = "/jsonrpc";

/// Failure of a single exchange.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    /// The endpoint could not be reached (refused, reset, DNS).
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The endpoint was reached but the exchange did not complete.
    #[error("Exchange failed: {0}")]
    Exchange(String),

    /// The transport could not be constructed.
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Host and port of the simulation. Fixed for the life of a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether the host names the local machine.
    pub fn is_loopback(&self) -> bool {
        if self.host.eq_ignore_ascii_case("localhost") {
            return true;
        }
        let bare = self.host.trim_start_matches('[').trim_end_matches(']');
        bare.parse::<std::net::IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false)
    }

    /// `http://{host}:{port}/jsonrpc`
    ///
    /// # Errors
    ///
    /// Returns `TransportError::InvalidEndpoint` if the host does not form a valid URL.
    pub fn url(&self) -> Result<Url, TransportError> {
        let host = if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        Url::parse(&format!("http://{}:{}{}", host, self.port, RPC_PATH))
            .map_err(|e| TransportError::InvalidEndpoint(format!("{}: {}", self.host, e)))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A single blocking request/response exchange.
///
/// Implementations do not retry; the client owns all retry policy.
pub trait Transport {
    /// Endpoint this transport talks to.
    fn endpoint(&self) -> &Endpoint;

    /// Send one envelope and return the raw response body.
    fn send(&mut self, envelope: &Envelope) -> Result<String, TransportError>;
}

/// JSON-RPC over HTTP POST, using a persistent pooled session.
pub struct HttpTransport {
    endpoint: Endpoint,
    url: Url,
    session: reqwest::blocking::Client,
}

impl HttpTransport {
    /// Build a transport for `endpoint`.
    ///
    /// `timeout` bounds each exchange; `None` waits indefinitely.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::InvalidEndpoint` if the URL cannot be formed
    /// or the HTTP session cannot be created.
    pub fn new(endpoint: Endpoint, timeout: Option<Duration>) -> Result<Self, TransportError> {
        let url = endpoint.url()?;
        let session = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;

        Ok(Self {
            endpoint,
            url,
            session,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport").field("url", &self.url.as_str()).finish()
    }
}

impl Transport for HttpTransport {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn send(&mut self, envelope: &Envelope) -> Result<String, TransportError> {
        trace!("POST {} id={} method={}", self.url, envelope.id, envelope.method);

        // Error statuses still carry a JSON-RPC body, so the status is not checked.
        let response = self
            .session
            .post(self.url.clone())
            .json(envelope)
            .send()
            .map_err(classify)?;

        response.text().map_err(classify)
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_connect() {
        TransportError::Connection(err.to_string())
    } else {
        TransportError::Exchange(err.to_string())
    }
}
