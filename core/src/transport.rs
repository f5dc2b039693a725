//! Transport capability and its `ureq` implementation.
//!
//! # Design
//! A transport performs one physical round trip. NTLM binds the challenge to
//! the TCP connection, so the handshake runs over a connection the driver
//! opens with `open_persistent` and hands back to `release` on every exit
//! path. Requests without a connection may use any socket.

use std::fmt;
use std::io::{self, Read};
use std::time::Duration;

use log::{debug, trace, warn};
use ureq::tls::TlsConfig;
use ureq::Agent;

use crate::config::ClientConfig;
use crate::error::NtlmError;
use crate::http::{Headers, HttpRequest};

const USER_AGENT: &str = "user-agent";

/// Status, headers and an unread body of one physical response.
pub struct TransportResponse {
    pub status: u16,
    pub headers: Headers,
    body: Box<dyn Read>,
}

impl TransportResponse {
    pub fn new(status: u16, headers: Headers, body: impl Read + 'static) -> Self {
        Self {
            status,
            headers,
            body: Box::new(body),
        }
    }

    /// Read the body to the end and discard it so the connection can be reused.
    pub fn drain(&mut self) -> Result<u64, NtlmError> {
        io::copy(&mut self.body, &mut io::sink()).map_err(body_error)
    }

    pub fn read_body(&mut self) -> Result<Vec<u8>, NtlmError> {
        let mut body = Vec::new();
        self.body.read_to_end(&mut body).map_err(body_error)?;
        Ok(body)
    }
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

fn body_error(err: io::Error) -> NtlmError {
    if err.kind() == io::ErrorKind::TimedOut {
        NtlmError::Timeout
    } else {
        NtlmError::transport(err)
    }
}

/// Issues HTTP requests for the driver.
pub trait Transport {
    /// Handle pinning requests to one physical connection.
    type Connection;

    fn open_persistent(&self) -> Result<Self::Connection, NtlmError>;

    /// Perform one round trip, over `connection` when given.
    fn send(
        &self,
        request: &HttpRequest,
        connection: Option<&Self::Connection>,
    ) -> Result<TransportResponse, NtlmError>;

    /// Close a connection opened by `open_persistent`.
    fn release(&self, connection: Self::Connection);
}

/// `ureq`-backed transport. Redirects are left to the negotiator and error
/// statuses come back as ordinary responses.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: Agent,
    timeout: Option<Duration>,
    user_agent: Option<String>,
    tls: TlsConfig,
}

/// A dedicated agent whose pool holds a single idle socket, so every request
/// sent through it reuses the same connection once the previous body is
/// drained.
#[derive(Debug)]
pub struct PinnedConnection {
    agent: Agent,
}

impl UreqTransport {
    pub fn new(config: &ClientConfig) -> Self {
        let timeout = config.timeout_duration();
        let tls = TlsConfig::builder()
            .disable_verification(config.disable_tls_verification)
            .build();
        if config.disable_tls_verification {
            warn!("TLS certificate verification is disabled");
        }
        Self {
            agent: build_agent(timeout, &tls, false),
            timeout,
            user_agent: config.user_agent.clone(),
            tls,
        }
    }

    /// Replace the TLS settings, e.g. to trust a private root or present a
    /// client certificate. Applies to pinned connections opened afterwards.
    pub fn with_tls_config(mut self, tls: TlsConfig) -> Self {
        self.agent = build_agent(self.timeout, &tls, false);
        self.tls = tls;
        self
    }

    pub fn tls_config(&self) -> &TlsConfig {
        &self.tls
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(&ClientConfig::default())
    }
}

fn build_agent(timeout: Option<Duration>, tls: &TlsConfig, pinned: bool) -> Agent {
    let builder = Agent::config_builder()
        .tls_config(tls.clone())
        .http_status_as_error(false)
        .max_redirects(0)
        .max_redirects_will_error(false)
        .timeout_global(timeout);
    let builder = if pinned {
        builder.max_idle_connections(1).max_idle_connections_per_host(1)
    } else {
        builder
    };
    builder.build().new_agent()
}

fn map_error(err: ureq::Error) -> NtlmError {
    match err {
        ureq::Error::Timeout(timeout) => {
            debug!("request timed out: {timeout}");
            NtlmError::Timeout
        }
        other => NtlmError::transport(other),
    }
}

impl Transport for UreqTransport {
    type Connection = PinnedConnection;

    fn open_persistent(&self) -> Result<PinnedConnection, NtlmError> {
        debug!("opening pinned connection for NTLM handshake");
        Ok(PinnedConnection {
            agent: build_agent(self.timeout, &self.tls, true),
        })
    }

    fn send(
        &self,
        request: &HttpRequest,
        connection: Option<&PinnedConnection>,
    ) -> Result<TransportResponse, NtlmError> {
        let agent = connection.map_or(&self.agent, |conn| &conn.agent);

        let mut builder = ureq::http::Request::builder()
            .method(request.method.as_str())
            .uri(request.url.as_str());
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        if let Some(user_agent) = &self.user_agent {
            if !request.headers.contains(USER_AGENT) {
                builder = builder.header(USER_AGENT, user_agent.as_str());
            }
        }

        // `run` sends any non-empty body, whatever the method.
        let result = match &request.body {
            Some(body) => {
                let req = builder.body(body.clone()).map_err(NtlmError::transport)?;
                agent.run(req)
            }
            None => {
                let req = builder.body(()).map_err(NtlmError::transport)?;
                agent.run(req)
            }
        };
        let response = result.map_err(map_error)?;

        let status = response.status().as_u16();
        let mut headers = Headers::new();
        for (name, value) in response.headers() {
            headers.append(name.as_str(), String::from_utf8_lossy(value.as_bytes()));
        }
        trace!("{status} with {} headers", headers.len());

        let body = response.into_body().into_reader();
        Ok(TransportResponse::new(status, headers, body))
    }

    fn release(&self, connection: PinnedConnection) {
        debug!("releasing pinned connection");
        drop(connection);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tls_settings_follow_config_and_overrides() {
        let transport = UreqTransport::default();
        assert!(!transport.tls_config().disable_verification());

        let config = ClientConfig {
            disable_tls_verification: true,
            ..ClientConfig::default()
        };
        let transport = UreqTransport::new(&config);
        assert!(transport.tls_config().disable_verification());

        let transport = transport.with_tls_config(TlsConfig::builder().use_sni(false).build());
        assert!(!transport.tls_config().disable_verification());
        assert!(!transport.tls_config().use_sni());
        let pinned = transport.open_persistent().unwrap();
        assert!(!pinned.agent.config().tls_config().use_sni());
    }

    #[test]
    fn drain_consumes_the_whole_body() {
        let mut response = TransportResponse::new(200, Headers::new(), io::Cursor::new(vec![1u8; 4096]));
        assert_eq!(response.drain().unwrap(), 4096);
    }

    #[test]
    fn read_body_returns_bytes() {
        let mut response = TransportResponse::new(200, Headers::new(), &b"hello"[..]);
        assert_eq!(response.read_body().unwrap(), b"hello");
    }

    #[test]
    fn timed_out_body_maps_to_timeout() {
        struct Stalled;
        impl Read for Stalled {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::TimedOut, "stalled"))
            }
        }
        let mut response = TransportResponse::new(200, Headers::new(), Stalled);
        assert!(matches!(response.read_body(), Err(NtlmError::Timeout)));
    }
}
