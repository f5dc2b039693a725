//! Sans-IO state machine for one logical request.
//!
//! # Overview
//! A chain starts with the caller's request and may take several physical
//! round trips: an NTLM handshake (Type1, then Type3 on the same socket), a
//! single Basic retry, and any number of redirects up to the request limit.
//!
//! The negotiator never touches the network. A driver loops:
//!
//! 1. `next_request` produces the `HttpRequest` to send.
//! 2. The driver performs the round trip.
//! 3. `on_response` inspects status and headers and returns a `Decision`.
//!
//! The driver stops after `Decision::Resolve` and returns that response's body.
//! Every other decision means the body must be drained and discarded.
//!
//! # Design
//! Exactly one transition fires per response, chosen in fixed precedence
//! order. Each scheme is attempted at most once per chain; credentials are
//! dropped from the state as soon as they reach a final `Authorization`
//! header, so they can never be sent twice.

use std::fmt;

use log::{debug, trace, warn};
use serde::Serialize;

use crate::error::NtlmError;
use crate::http::{Headers, HttpMethod, HttpRequest, AUTHORIZATION, COOKIE, LOCATION, WWW_AUTHENTICATE};
use crate::message::{self, Type2Challenge};
use crate::redirect;
use crate::types::{Credentials, RequestOptions};

/// Physical requests allowed per chain unless configured otherwise.
pub const MAX_REQUESTS: u32 = 20;

/// Authentication schemes the negotiator knows how to answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    Ntlm,
    Basic,
}

impl AuthScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthScheme::Ntlm => "ntlm",
            AuthScheme::Basic => "basic",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        if token.eq_ignore_ascii_case("ntlm") {
            Some(AuthScheme::Ntlm)
        } else if token.eq_ignore_ascii_case("basic") {
            Some(AuthScheme::Basic)
        } else {
            None
        }
    }
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the chain currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initial,
    /// Type1 sent, waiting for the challenge.
    NtlmStep1,
    /// Type3 sent.
    NtlmStep2,
    Basic,
    Redirecting,
    Resolved,
    Failed,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Resolved | Phase::Failed)
    }
}

/// What the driver should do with the response it just reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Pin the connection for the handshake, drain the body, send again.
    NtlmStep1,
    /// Drain the body and send the Type3 on the pinned connection.
    NtlmStep2,
    /// Drain the body and retry with Basic credentials.
    Basic,
    /// Drain the body and follow to `url`.
    Redirect { url: String },
    /// This response is final; read its body.
    Resolve,
}

/// Mutable state threaded through every round trip of a chain.
#[derive(Debug)]
pub struct RequestState {
    pub url: String,
    pub method: HttpMethod,
    pub headers: Headers,
    pub body: Option<Vec<u8>>,
    pub auth_methods: Vec<AuthScheme>,
    pub request_count: u32,
    pub disable_redirect: bool,
    credentials: Option<Credentials>,
}

impl RequestState {
    fn has_credentials(&self) -> bool {
        self.credentials.as_ref().is_some_and(Credentials::is_usable)
    }

    fn attempted(&self, scheme: AuthScheme) -> bool {
        self.auth_methods.contains(&scheme)
    }
}

/// Drives one logical request through its round trips.
#[derive(Debug)]
pub struct Negotiator {
    state: RequestState,
    phase: Phase,
    max_requests: u32,
}

impl Negotiator {
    /// Start a chain. Any caller-supplied `Authorization` header is dropped.
    pub fn new(options: RequestOptions, max_requests: u32) -> Self {
        let mut headers = options.headers;
        headers.remove(AUTHORIZATION);
        Self {
            state: RequestState {
                url: options.url,
                method: options.method,
                headers,
                body: options.body,
                auth_methods: Vec::new(),
                request_count: 0,
                disable_redirect: options.disable_redirect,
                credentials: options.credentials,
            },
            phase: Phase::Initial,
            max_requests,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> &RequestState {
        &self.state
    }

    pub fn into_state(self) -> RequestState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Mark the chain failed after an error outside the negotiator.
    pub fn abort(&mut self) {
        self.phase = Phase::Failed;
    }

    /// Build the next physical request, counting it against the limit.
    ///
    /// `cookie_header` is attached to this request only.
    pub fn next_request(&mut self, cookie_header: Option<&str>) -> Result<HttpRequest, NtlmError> {
        if self.is_finished() {
            return Err(NtlmError::ChainFinished);
        }
        if self.phase == Phase::Redirecting {
            self.phase = Phase::Initial;
        }

        self.state.request_count += 1;
        if self.state.request_count > self.max_requests {
            warn!(
                "giving up on {} after {} requests",
                self.state.url, self.max_requests
            );
            self.phase = Phase::Failed;
            return Err(NtlmError::LoopLimitExceeded {
                limit: self.max_requests,
            });
        }

        let mut headers = self.state.headers.clone();
        if let Some(cookie) = cookie_header.filter(|c| !c.is_empty()) {
            headers.set(COOKIE, cookie);
        }

        debug!(
            "request #{}: {} {}",
            self.state.request_count, self.state.method, self.state.url
        );
        Ok(HttpRequest {
            method: self.state.method,
            url: self.state.url.clone(),
            headers,
            body: self.state.body.clone(),
        })
    }

    /// Feed back the status and headers of the response to the last request.
    pub fn on_response(&mut self, status: u16, headers: &Headers) -> Result<Decision, NtlmError> {
        if self.is_finished() {
            return Err(NtlmError::ChainFinished);
        }
        debug!("response {status} from {}", self.state.url);

        let advertised = advertised_schemes(headers);
        trace!("advertised schemes: {advertised:?}");
        let has_credentials = self.state.has_credentials();
        let location = headers
            .get(LOCATION)
            .filter(|_| redirect::is_redirect(status) && !self.state.disable_redirect);

        let decision = if status == 401
            && has_credentials
            && advertised.contains(&AuthScheme::Ntlm)
            && !self.state.attempted(AuthScheme::Ntlm)
        {
            self.start_ntlm()?
        } else if status == 401
            && has_credentials
            && advertised.contains(&AuthScheme::Basic)
            && !self.state.attempted(AuthScheme::Basic)
        {
            self.start_basic()
        } else if (400..500).contains(&status)
            && has_credentials
            && self.state.headers.contains(AUTHORIZATION)
            && self.state.attempted(AuthScheme::Ntlm)
        {
            self.answer_challenge(headers)?
        } else if let Some(location) = location {
            self.follow(status, location)?
        } else {
            debug!("resolving with {status}");
            self.phase = Phase::Resolved;
            Decision::Resolve
        };

        Ok(decision)
    }

    fn start_ntlm(&mut self) -> Result<Decision, NtlmError> {
        debug!("NTLM step 1: sending negotiate message");
        self.state.auth_methods.push(AuthScheme::Ntlm);
        let (workstation, domain) = match &self.state.credentials {
            Some(creds) => (creds.workstation.as_deref(), creds.domain.as_deref()),
            None => (None, None),
        };
        let token = match message::build_type1(workstation, domain) {
            Ok(token) => token,
            Err(err) => {
                self.phase = Phase::Failed;
                return Err(err.into());
            }
        };
        self.state.headers.set(AUTHORIZATION, token);
        self.phase = Phase::NtlmStep1;
        Ok(Decision::NtlmStep1)
    }

    fn start_basic(&mut self) -> Decision {
        debug!("retrying with Basic credentials");
        self.state.auth_methods.push(AuthScheme::Basic);
        if let Some(creds) = self.state.credentials.take() {
            let token = message::build_basic_token(&creds.user, &creds.password);
            self.state.headers.set(AUTHORIZATION, token);
        }
        self.phase = Phase::Basic;
        Decision::Basic
    }

    fn answer_challenge(&mut self, headers: &Headers) -> Result<Decision, NtlmError> {
        let challenge = match Type2Challenge::from_headers(headers) {
            Ok(challenge) => challenge,
            Err(err) => {
                warn!("cannot decode NTLM challenge from {}: {err}", self.state.url);
                self.phase = Phase::Failed;
                return Err(err.into());
            }
        };
        debug!(
            "NTLM step 2: answering v{} challenge for target {:?}",
            challenge.version as u8, challenge.target_name
        );

        if let Some(creds) = self.state.credentials.take() {
            let token = message::build_type3(
                &challenge,
                &creds.user,
                &creds.password,
                creds.workstation.as_deref(),
                creds.domain.as_deref(),
            );
            let token = match token {
                Ok(token) => token,
                Err(err) => {
                    self.phase = Phase::Failed;
                    return Err(err.into());
                }
            };
            self.state.headers.set(AUTHORIZATION, token);
        }
        self.phase = Phase::NtlmStep2;
        Ok(Decision::NtlmStep2)
    }

    fn follow(&mut self, status: u16, location: &str) -> Result<Decision, NtlmError> {
        let url = match redirect::resolve_location(&self.state.url, location) {
            Ok(url) => url,
            Err(err) => {
                self.phase = Phase::Failed;
                return Err(err);
            }
        };
        let method = redirect::redirect_method(status, self.state.method);
        debug!("{status} redirect to {method} {url}");

        if method != self.state.method {
            self.state.body = None;
        }
        if !redirect::same_origin(&self.state.url, &url) && self.state.headers.contains(AUTHORIZATION) {
            debug!("dropping Authorization on cross-origin redirect");
            self.state.headers.remove(AUTHORIZATION);
        }
        self.state.url = url.clone();
        self.state.method = method;
        self.phase = Phase::Redirecting;
        Ok(Decision::Redirect { url })
    }
}

/// Schemes named by the first word of each comma-separated token of every
/// `WWW-Authenticate` value.
pub fn advertised_schemes(headers: &Headers) -> Vec<AuthScheme> {
    let mut schemes = Vec::new();
    for value in headers.get_all(WWW_AUTHENTICATE) {
        for token in value.split(',') {
            let scheme = token.split_whitespace().next().and_then(AuthScheme::from_token);
            if let Some(scheme) = scheme {
                if !schemes.contains(&scheme) {
                    schemes.push(scheme);
                }
            }
        }
    }
    schemes
}
