//! Driver that runs request chains over a `Transport`.
//!
//! # Design
//! `NtlmClient` owns no per-request state. Each call builds a `Negotiator`,
//! loops request/response until it resolves, and releases the pinned NTLM
//! connection on every exit path. The core stays synchronous; the async entry
//! point runs the same loop on tokio's blocking pool.

use std::sync::Arc;

use log::{debug, warn};

use crate::config::ClientConfig;
use crate::cookie::CookieStore;
use crate::error::NtlmError;
use crate::http::SET_COOKIE;
use crate::negotiator::{Decision, Negotiator};
use crate::transport::{Transport, UreqTransport};
use crate::types::{NtlmResponse, RequestOptions};

/// HTTP client that answers NTLM and Basic challenges and follows redirects.
pub struct NtlmClient<T = UreqTransport> {
    transport: Arc<T>,
    config: ClientConfig,
    cookies: Option<Arc<dyn CookieStore>>,
}

impl<T> Clone for NtlmClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            config: self.config.clone(),
            cookies: self.cookies.clone(),
        }
    }
}

impl NtlmClient<UreqTransport> {
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Self {
        let transport = UreqTransport::new(&config);
        Self::with_transport(transport, config)
    }
}

impl Default for NtlmClient<UreqTransport> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> NtlmClient<T> {
    pub fn with_transport(transport: T, config: ClientConfig) -> Self {
        Self {
            transport: Arc::new(transport),
            config,
            cookies: None,
        }
    }

    /// Send stored cookies with every request and keep the ones servers set.
    pub fn with_cookie_store(mut self, store: Arc<dyn CookieStore>) -> Self {
        self.cookies = Some(store);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Run one logical request to completion.
    ///
    /// Non-2xx statuses are returned as responses, not errors.
    pub fn request(&self, options: impl Into<RequestOptions>) -> Result<NtlmResponse, NtlmError> {
        let mut options = options.into();
        options.disable_redirect |= self.config.disable_redirect;
        debug!("starting {} {}", options.method, options.url);

        let mut negotiator = Negotiator::new(options, self.config.max_requests);
        let mut connection = None;
        let result = self.run_chain(&mut negotiator, &mut connection);

        if let Some(conn) = connection.take() {
            self.transport.release(conn);
        }
        if let Err(err) = &result {
            warn!("request to {} failed: {err}", negotiator.state().url);
        }
        result
    }

    fn run_chain(
        &self,
        negotiator: &mut Negotiator,
        connection: &mut Option<T::Connection>,
    ) -> Result<NtlmResponse, NtlmError> {
        loop {
            let cookie = self
                .cookies
                .as_ref()
                .and_then(|store| store.cookie_header(&negotiator.state().url));
            let request = negotiator.next_request(cookie.as_deref())?;

            let mut response = match self.transport.send(&request, connection.as_ref()) {
                Ok(response) => response,
                Err(err) => {
                    negotiator.abort();
                    return Err(err);
                }
            };

            if let Some(store) = &self.cookies {
                for raw in response.headers.get_all(SET_COOKIE) {
                    store.store_set_cookie(raw, &request.url);
                }
            }

            match negotiator.on_response(response.status, &response.headers)? {
                Decision::Resolve => {
                    if let Some(conn) = connection.take() {
                        self.transport.release(conn);
                    }
                    let body = response.read_body()?;
                    let state = negotiator.state();
                    return Ok(NtlmResponse {
                        status: response.status,
                        headers: response.headers,
                        body,
                        url: state.url.clone(),
                        method: state.method,
                        request_count: state.request_count,
                        auth_methods: state.auth_methods.clone(),
                        request_headers: request.headers,
                    });
                }
                Decision::NtlmStep1 => {
                    response.drain()?;
                    if connection.is_none() {
                        *connection = Some(self.transport.open_persistent()?);
                    }
                }
                Decision::NtlmStep2 | Decision::Basic | Decision::Redirect { .. } => {
                    response.drain()?;
                }
            }
        }
    }
}

impl<T> NtlmClient<T>
where
    T: Transport + Send + Sync + 'static,
{
    /// Run `request` on tokio's blocking pool.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn request_async(
        &self,
        options: impl Into<RequestOptions>,
    ) -> Result<NtlmResponse, NtlmError> {
        let client = self.clone();
        let options = options.into();
        tokio::task::spawn_blocking(move || client.request(options))
            .await
            .map_err(NtlmError::transport)?
    }
}
