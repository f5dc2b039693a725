//! Redirect detection and `Location` resolution.

use url::Url;

use crate::error::NtlmError;
use crate::http::HttpMethod;

/// Statuses 301 through 309 are followed; 300 (multiple choices) is not.
pub fn is_redirect(status: u16) -> bool {
    status > 300 && status < 310
}

/// Resolve `location` against the URL that produced it.
///
/// An absolute location is returned verbatim. A root-relative one keeps the
/// current origin; anything else is resolved against the current directory.
pub fn resolve_location(current: &str, location: &str) -> Result<String, NtlmError> {
    if Url::parse(location).is_ok() {
        return Ok(location.to_string());
    }
    let invalid = |source| NtlmError::InvalidLocation {
        location: location.to_string(),
        source,
    };
    let base = Url::parse(current).map_err(invalid)?;
    let joined = base.join(location).map_err(invalid)?;
    Ok(joined.into())
}

/// Whether both URLs share scheme, host and port. Unparseable URLs never match.
pub fn same_origin(a: &str, b: &str) -> bool {
    match (Url::parse(a), Url::parse(b)) {
        (Ok(a), Ok(b)) => a.origin() == b.origin(),
        _ => false,
    }
}

/// Method for the follow-up request: 301 downgrades to GET, everything else
/// keeps the original verb.
pub fn redirect_method(status: u16, method: HttpMethod) -> HttpMethod {
    if status == 301 {
        HttpMethod::Get
    } else {
        method
    }
}
