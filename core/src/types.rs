//! Request descriptors and the final response of a chain.
//!
//! These types are independent of any transport: `RequestOptions` is what the
//! caller hands in, `NtlmResponse` is what comes back once the negotiator
//! resolves.

use std::fmt;

use serde::Deserialize;

use crate::http::{Headers, HttpMethod};
use crate::negotiator::AuthScheme;

/// Account used for Basic and NTLM authentication.
///
/// Consumed by the negotiator the moment it is folded into an
/// `Authorization` header. `Debug` never prints the password.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub user: String,
    pub password: String,
    /// Sent in NTLM messages; defaults to the local host name.
    #[serde(default)]
    pub workstation: Option<String>,
    /// Type1 domain and Type3 target; defaults to empty in Type1 and to the
    /// server's target name in Type3.
    #[serde(default)]
    pub domain: Option<String>,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
            workstation: None,
            domain: None,
        }
    }

    pub fn with_workstation(mut self, workstation: impl Into<String>) -> Self {
        self.workstation = Some(workstation.into());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Empty user names or passwords never authenticate.
    pub fn is_usable(&self) -> bool {
        !self.user.is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("workstation", &self.workstation)
            .field("domain", &self.domain)
            .finish()
    }
}

/// One logical request. Build with the chained setters or convert a URL.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub url: String,
    pub method: HttpMethod,
    pub headers: Headers,
    pub body: Option<Vec<u8>>,
    pub disable_redirect: bool,
    pub credentials: Option<Credentials>,
}

impl RequestOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Get,
            headers: Headers::new(),
            body: None,
            disable_redirect: false,
            credentials: None,
        }
    }

    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn disable_redirect(mut self, disable: bool) -> Self {
        self.disable_redirect = disable;
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }
}

impl From<&str> for RequestOptions {
    fn from(url: &str) -> Self {
        RequestOptions::new(url)
    }
}

impl From<String> for RequestOptions {
    fn from(url: String) -> Self {
        RequestOptions::new(url)
    }
}

/// Final response of a chain plus a summary of how it got there.
#[derive(Debug, Clone)]
pub struct NtlmResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
    /// URL of the last request, after redirects.
    pub url: String,
    pub method: HttpMethod,
    /// Physical requests issued for this chain.
    pub request_count: u32,
    /// Schemes attempted, in order.
    pub auth_methods: Vec<AuthScheme>,
    /// Headers of the last outgoing request.
    pub request_headers: Headers,
}

impl NtlmResponse {
    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
