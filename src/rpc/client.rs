//! RPC client: encode, send, retry, decode.
//!
//! This module provides `RpcClient`, a blocking JSON-RPC client for a
//! cooperative, long-lived simulation process. The retry policy assumes the
//! simulation may not be listening yet (still starting, paused in the
//! editor), so transient failures are retried until they clear:
//!
//! | Condition                          | Policy                                          |
//! |------------------------------------|-------------------------------------------------|
//! | Connection refused / network error | sleep `retry_interval`, retry (or return `None` if retry is disabled) |
//! | Empty response body                | retry immediately                               |
//! | Unparsable response body           | retry immediately, not logged to the file       |
//! | `error` in response (any shape)    | fail the call, never retried                    |
//! | Anything else (decode mismatch...) | write diagnostic log, sleep, retry              |
//!
//! Only the paced branches write the diagnostic log, so one bad endpoint
//! adds at most one entry per `retry_interval`.
//!
//! With the default unbounded retry budget a permanently dead endpoint blocks
//! the caller forever; use `no_retry()` or `ClientConfig::max_retries` when
//! that is not acceptable.

use std::path::PathBuf;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::codec::{self, EncodeError, Record};
use crate::config::{ClientConfig, DEFAULT_RETRY_INTERVAL_MS};
use crate::diagnostics::{DiagnosticEntry, DiagnosticLog};
use crate::rpc::envelope::{Envelope, RemoteException, RpcErrorBody, RpcResponse};
use crate::rpc::listen::{BlockingListenGuard, SET_BLOCKING_LISTEN};
use crate::rpc::supervisor::ServerProcess;
use crate::rpc::transport::{Endpoint, HttpTransport, Transport, TransportError};
use crate::schema::Schema;

/// Call-level errors.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The simulation raised an exception while handling the call.
    #[error("{message}")]
    Remote {
        message: String,
        class_name: Option<String>,
        stack_trace: Option<String>,
    },

    /// The simulation returned error data that is not an exception record.
    #[error("{}", remote_data_text(.0))]
    RemoteData(Value),

    /// Call arguments could not be encoded.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// A bounded retry budget ran out.
    #[error("Gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// A local server was requested for a non-loopback host.
    #[error("Launching a local server requires a loopback host, got '{0}'")]
    NonLoopbackHost(String),

    /// The local server executable could not be started.
    #[error("Failed to launch {}: {source}", .path.display())]
    Launch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The transport could not be set up.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl RpcError {
    /// Whether the error came from the simulation rather than this side.
    pub fn is_remote(&self) -> bool {
        matches!(self, RpcError::Remote { .. } | RpcError::RemoteData(_))
    }
}

fn remote_data_text(data: &Value) -> String {
    match data {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Result of a call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// No schema was given; the raw `result` value.
    Raw(Value),
    /// A schema was given; the decoded record.
    Record(Record),
    /// No value: `result` was null or absent, or the endpoint was unreachable
    /// with retry disabled.
    None,
}

impl CallOutcome {
    pub fn is_none(&self) -> bool {
        matches!(self, CallOutcome::None)
    }

    pub fn into_record(self) -> Option<Record> {
        match self {
            CallOutcome::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn into_raw(self) -> Option<Value> {
        match self {
            CallOutcome::Raw(value) => Some(value),
            _ => None,
        }
    }

    /// Plain JSON view of the outcome; `None` becomes `null`.
    pub fn to_value(&self) -> Value {
        match self {
            CallOutcome::Raw(value) => value.clone(),
            CallOutcome::Record(record) => record.to_value(),
            CallOutcome::None => Value::Null,
        }
    }
}

/// Retry and diagnostics settings for a client.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    pub retry_interval: Duration,
    /// `None` retries forever.
    pub max_retries: Option<u32>,
    pub log_file: Option<PathBuf>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_millis(DEFAULT_RETRY_INTERVAL_MS),
            max_retries: None,
            log_file: None,
        }
    }
}

impl From<&ClientConfig> for ClientOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            retry_interval: config.retry_interval(),
            max_retries: config.max_retries,
            log_file: config.log_file.clone(),
        }
    }
}

/// Why an attempt failed transiently.
enum Failure {
    Connection(String),
    Empty,
    Unparsable { body: String, error: String },
    Unexpected { body: Option<String>, error: String },
}

impl Failure {
    fn describe(&self) -> String {
        match self {
            Failure::Connection(msg) => format!("connection failed: {}", msg),
            Failure::Empty => "empty response body".to_string(),
            Failure::Unparsable { error, .. } => format!("unparsable response: {}", error),
            Failure::Unexpected { error, .. } => error.clone(),
        }
    }
}

/// Blocking JSON-RPC client for one simulation endpoint.
///
/// Calls take `&mut self`, so a client has at most one call in flight. Each
/// logical call gets the next id (starting at 0); retries of that call reuse
/// it.
///
/// # Example
///
/// ```ignore
/// use peaceful_pie::{ClientConfig, RpcClient};
/// use peaceful_pie::models::Vector3;
///
/// let mut client = RpcClient::new(ClientConfig::local(9000))?;
/// client.method("say").arg("message", "hello").invoke()?;
/// let pos = client.method("getPosition").expect(Vector3::schema()).invoke()?;
/// ```
pub struct RpcClient<T: Transport = HttpTransport> {
    transport: T,
    next_id: u64,
    options: ClientOptions,
    diagnostics: Option<DiagnosticLog>,
    last_retries: u32,
    server: Option<ServerProcess>,
}

impl RpcClient<HttpTransport> {
    /// Create an HTTP client for the configured endpoint, launching the
    /// configured server executable if there is one.
    ///
    /// # Errors
    ///
    /// - `RpcError::NonLoopbackHost` if a server executable is set and the host is not loopback
    /// - `RpcError::Transport` if the endpoint URL or HTTP session is invalid
    /// - `RpcError::Launch` if the server executable cannot be started
    pub fn new(config: ClientConfig) -> Result<Self, RpcError> {
        let endpoint = Endpoint::new(config.host.clone(), config.port);
        if config.server_executable.is_some() && !endpoint.is_loopback() {
            return Err(RpcError::NonLoopbackHost(config.host.clone()));
        }

        let transport = HttpTransport::new(endpoint, config.request_timeout())?;
        let mut client = Self::with_transport(transport, ClientOptions::from(&config));

        if let Some(path) = &config.server_executable {
            let server = ServerProcess::launch(path, config.port).map_err(|source| RpcError::Launch {
                path: path.clone(),
                source,
            })?;
            client.server = Some(server);
        }

        Ok(client)
    }
}

impl<T: Transport> RpcClient<T> {
    /// Create a client over an existing transport. No server is launched.
    pub fn with_transport(transport: T, options: ClientOptions) -> Self {
        let diagnostics = options.log_file.clone().map(DiagnosticLog::new);
        Self {
            transport,
            next_id: 0,
            options,
            diagnostics,
            last_retries: 0,
            server: None,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.transport.endpoint()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Id the next call will use.
    pub fn next_call_id(&self) -> u64 {
        self.next_id
    }

    /// Retries performed by the most recent call.
    pub fn last_retry_count(&self) -> u32 {
        self.last_retries
    }

    /// The launched server, if this client owns one.
    pub fn server_mut(&mut self) -> Option<&mut ServerProcess> {
        self.server.as_mut()
    }

    /// Kill the owned server now instead of at drop.
    pub fn shutdown(&mut self) {
        if let Some(mut server) = self.server.take() {
            server.kill();
        }
    }

    /// Start building a call to `name`. Any method name works; nothing is
    /// declared upfront.
    pub fn method(&mut self, name: impl Into<String>) -> Caller<'_, T> {
        Caller {
            client: self,
            method: name.into(),
            params: Map::new(),
            schema: None,
            retry_on_connection_failure: true,
            encode_error: None,
        }
    }

    /// Call `method` with `params` encoded as the keyword mapping.
    ///
    /// With a schema the result is decoded into a [`Record`]; without one the
    /// raw value is returned. Null or absent results give `CallOutcome::None`
    /// when no schema is given.
    ///
    /// # Errors
    ///
    /// - `RpcError::Remote` / `RpcError::RemoteData` if the simulation returned an error
    /// - `RpcError::Encode` if `params` does not encode to a mapping
    /// - `RpcError::RetriesExhausted` if a bounded retry budget ran out
    pub fn call<P: Serialize + ?Sized>(
        &mut self,
        method: &str,
        params: &P,
        schema: Option<&Schema>,
        retry_on_connection_failure: bool,
    ) -> Result<CallOutcome, RpcError> {
        let params = codec::encode_params(params)?;
        self.call_encoded(method, params, schema, retry_on_connection_failure)
    }

    /// Call `method` and deserialize the result with serde.
    ///
    /// Returns `Ok(None)` for a null result, or when the endpoint was
    /// unreachable with retry disabled. A result that does not deserialize
    /// is retried like any other unexpected failure.
    pub fn call_as<R, P>(
        &mut self,
        method: &str,
        params: &P,
        retry_on_connection_failure: bool,
    ) -> Result<Option<R>, RpcError>
    where
        R: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        let params = codec::encode_params(params)?;
        self.call_encoded_as(method, params, retry_on_connection_failure)
    }

    /// Switch the simulation's blocking listen mode.
    pub fn set_blocking_listen(&mut self, blocking: bool) -> Result<(), RpcError> {
        self.method(SET_BLOCKING_LISTEN)
            .arg("blocking", blocking)
            .invoke()
            .map(|_| ())
    }

    /// Turn blocking listen on until the returned guard is dropped.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let mut session = client.blocking_listen()?;
    /// for _ in 0..1000 {
    ///     session.method("rlStep").arg("actions", &actions).invoke()?;
    /// }
    /// // blocking listen is switched off here, even on early return
    /// ```
    pub fn blocking_listen(&mut self) -> Result<BlockingListenGuard<'_, T>, RpcError> {
        self.set_blocking_listen(true)?;
        Ok(BlockingListenGuard::new(self))
    }

    fn next_envelope(&mut self, method: &str, params: Map<String, Value>) -> Envelope {
        let id = self.next_id;
        self.next_id += 1;
        Envelope::new(method, params, id)
    }

    fn call_encoded(
        &mut self,
        method: &str,
        params: Map<String, Value>,
        schema: Option<&Schema>,
        retry_on_connection_failure: bool,
    ) -> Result<CallOutcome, RpcError> {
        let envelope = self.next_envelope(method, params);
        let outcome = self.execute(&envelope, retry_on_connection_failure, |result| {
            match (schema, result) {
                (Some(schema), result) => codec::decode(&result.unwrap_or(Value::Null), schema)
                    .map(CallOutcome::Record)
                    .map_err(|e| e.to_string()),
                (None, Some(value)) => Ok(CallOutcome::Raw(value)),
                (None, None) => Ok(CallOutcome::None),
            }
        })?;
        Ok(outcome.unwrap_or(CallOutcome::None))
    }

    fn call_encoded_as<R: DeserializeOwned>(
        &mut self,
        method: &str,
        params: Map<String, Value>,
        retry_on_connection_failure: bool,
    ) -> Result<Option<R>, RpcError> {
        let envelope = self.next_envelope(method, params);
        let outcome = self.execute(&envelope, retry_on_connection_failure, |result| match result {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| format!("Failed to decode result: {}", e)),
            None => Ok(None),
        })?;
        Ok(outcome.flatten())
    }

    /// Run the retry loop for one envelope.
    ///
    /// Returns `Ok(None)` only when the endpoint is unreachable and
    /// connection retry is disabled.
    fn execute<R>(
        &mut self,
        envelope: &Envelope,
        retry_on_connection_failure: bool,
        decode: impl Fn(Option<Value>) -> Result<R, String>,
    ) -> Result<Option<R>, RpcError> {
        let mut retries: u32 = 0;
        self.last_retries = 0;

        debug!(
            "Calling {} (id={}) on {}",
            envelope.method,
            envelope.id,
            self.transport.endpoint()
        );

        loop {
            let failure = match self.transport.send(envelope) {
                Err(TransportError::Connection(msg)) => {
                    if !retry_on_connection_failure {
                        debug!("{} unreachable, retry disabled: {}", self.transport.endpoint(), msg);
                        return Ok(None);
                    }
                    Failure::Connection(msg)
                }
                Err(e) => Failure::Unexpected {
                    body: None,
                    error: e.to_string(),
                },
                Ok(body) if body.trim().is_empty() => Failure::Empty,
                Ok(body) => match parse_response(&body) {
                    Err(error) => Failure::Unparsable { body, error },
                    Ok(response) => {
                        if let Some(err) = response.error {
                            return Err(remote_error(&envelope.method, err));
                        }
                        match decode(response.result) {
                            Ok(value) => return Ok(Some(value)),
                            Err(error) => Failure::Unexpected {
                                body: Some(body),
                                error,
                            },
                        }
                    }
                },
            };

            if let Some(max) = self.options.max_retries {
                if retries >= max {
                    return Err(RpcError::RetriesExhausted {
                        attempts: retries + 1,
                        last_error: failure.describe(),
                    });
                }
            }
            retries += 1;
            self.last_retries = retries;

            match failure {
                Failure::Connection(msg) => {
                    warn!("{} unreachable ({}), retrying", self.transport.endpoint(), msg);
                    std::thread::sleep(self.options.retry_interval);
                }
                Failure::Empty => {
                    debug!("Empty response to {} (id={}), retrying", envelope.method, envelope.id);
                }
                Failure::Unparsable { body, error } => {
                    debug!(
                        "Unparsable response to {} (id={}): {}: {:.200}",
                        envelope.method, envelope.id, error, body
                    );
                }
                Failure::Unexpected { body, error } => {
                    warn!("Call {} failed unexpectedly: {}, retrying", envelope.method, error);
                    self.record_diagnostic(envelope, body.as_deref(), &error);
                    std::thread::sleep(self.options.retry_interval);
                }
            }
        }
    }

    fn record_diagnostic(&self, envelope: &Envelope, body: Option<&str>, error: &str) {
        let Some(log) = &self.diagnostics else {
            return;
        };
        let payload = serde_json::to_string(envelope).unwrap_or_else(|e| format!("<unserializable: {}>", e));
        log.record(&DiagnosticEntry {
            payload: &payload,
            response: body,
            error,
        });
    }
}

/// Parse a body as a JSON-RPC response object.
fn parse_response(body: &str) -> Result<RpcResponse, String> {
    match serde_json::from_str::<Value>(body).map_err(|e| e.to_string())? {
        value @ Value::Object(_) => serde_json::from_value(value).map_err(|e| e.to_string()),
        other => Err(format!("expected a JSON object, got {}", codec::json_kind(&other))),
    }
}

/// Turn an `error` member into the call's error, logging exception details.
///
/// Any `error` member fails the call. One that does not have the usual
/// `{code, message, data}` shape is carried raw as `RpcError::RemoteData`.
fn remote_error(method: &str, error: Value) -> RpcError {
    let parsed = match &error {
        Value::Object(_) => serde_json::from_value::<RpcErrorBody>(error.clone()).ok(),
        _ => None,
    };
    let Some(body) = parsed else {
        tracing::error!("{} failed: {}", method, remote_data_text(&error));
        return RpcError::RemoteData(error);
    };
    match body.data {
        Some(Value::Object(map)) => {
            let exception: RemoteException = serde_json::from_value(Value::Object(map)).unwrap_or_default();
            let message = exception
                .message
                .clone()
                .or(body.message)
                .unwrap_or_else(|| "Remote error".to_string());
            let class_name = exception.class_name.clone();
            let stack_trace = exception.stack_trace_text();

            tracing::error!(
                "{} raised {}: {}",
                method,
                class_name.as_deref().unwrap_or("<unknown>"),
                message
            );
            if let Some(trace) = &stack_trace {
                tracing::error!("{}", trace);
            }

            RpcError::Remote {
                message,
                class_name,
                stack_trace,
            }
        }
        Some(data) => {
            tracing::error!("{} failed: {}", method, remote_data_text(&data));
            RpcError::RemoteData(data)
        }
        None => {
            let message = body.message.unwrap_or_else(|| "Remote error".to_string());
            tracing::error!("{} failed: {}", method, message);
            RpcError::Remote {
                message,
                class_name: None,
                stack_trace: None,
            }
        }
    }
}

/// A pending call to one remote method, built with [`RpcClient::method`].
#[must_use = "a Caller does nothing until invoked"]
pub struct Caller<'a, T: Transport> {
    client: &'a mut RpcClient<T>,
    method: String,
    params: Map<String, Value>,
    schema: Option<Schema>,
    retry_on_connection_failure: bool,
    encode_error: Option<EncodeError>,
}

impl<T: Transport> Caller<'_, T> {
    /// Add one keyword argument. Structured values are flattened to mappings.
    pub fn arg<V: Serialize>(mut self, name: impl Into<String>, value: V) -> Self {
        match codec::encode_value(&value) {
            Ok(value) => {
                self.params.insert(name.into(), value);
            }
            Err(e) => {
                self.encode_error.get_or_insert(e);
            }
        }
        self
    }

    /// Merge the fields of a serializable record into the arguments.
    pub fn params<P: Serialize + ?Sized>(mut self, params: &P) -> Self {
        match codec::encode_params(params) {
            Ok(map) => self.params.extend(map),
            Err(e) => {
                self.encode_error.get_or_insert(e);
            }
        }
        self
    }

    /// Decode the result with `schema`.
    pub fn expect(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Set whether connection failures are retried (default `true`).
    pub fn retry(mut self, retry_on_connection_failure: bool) -> Self {
        self.retry_on_connection_failure = retry_on_connection_failure;
        self
    }

    /// Return `CallOutcome::None` instead of retrying when unreachable.
    pub fn no_retry(self) -> Self {
        self.retry(false)
    }

    /// Perform the call.
    pub fn invoke(self) -> Result<CallOutcome, RpcError> {
        if let Some(e) = self.encode_error {
            return Err(e.into());
        }
        self.client.call_encoded(
            &self.method,
            self.params,
            self.schema.as_ref(),
            self.retry_on_connection_failure,
        )
    }

    /// Perform the call and deserialize the result with serde.
    pub fn invoke_as<R: DeserializeOwned>(self) -> Result<Option<R>, RpcError> {
        if let Some(e) = self.encode_error {
            return Err(e.into());
        }
        self.client
            .call_encoded_as(&self.method, self.params, self.retry_on_connection_failure)
    }
}
