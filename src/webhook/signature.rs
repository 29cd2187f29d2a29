//! Twilio request signature verification
//!
//! Twilio signs every webhook call with
//! `base64(HMAC-SHA1(auth_token, url ++ key1 ++ value1 ++ key2 ++ value2 ...))`
//! where the form parameters are sorted by key and `url` is the exact public
//! URL configured in the Twilio console, query string included. Verification
//! is only as good as the URL reconstruction: behind a proxy, either set
//! `BASE_URL` or make sure `X-Forwarded-Proto` and `Host` reach the server
//! unchanged.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ring::hmac;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

/// Header carrying Twilio's signature
pub const SIGNATURE_HEADER: &str = "x-twilio-signature";

/// Scheme used when no forwarded protocol is present; the server itself
/// only speaks plain HTTP.
const FALLBACK_SCHEME: &str = "http";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// The request could not be turned into a verifiable URL
    #[error("Malformed request: {0}")]
    Malformed(String),

    /// A secret is configured but the request carries no signature
    #[error("Missing X-Twilio-Signature header")]
    Missing,

    /// The signature does not match the request
    #[error("Invalid signature")]
    Mismatch,
}

impl SignatureError {
    /// True for failures that mean "not from Twilio", as opposed to a
    /// request that could not be evaluated at all
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, SignatureError::Missing | SignatureError::Mismatch)
    }
}

/// Outcome of a successful gate check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// The signature matched
    Verified,
    /// No secret is configured; the request was let through unchecked
    Skipped,
}

/// Computes the signature Twilio would send for `url` and `params`.
pub fn compute_signature(auth_token: &str, url: &str, params: &BTreeMap<String, String>) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, auth_token.as_bytes());
    let tag = hmac::sign(&key, signing_payload(url, params).as_bytes());
    STANDARD.encode(tag.as_ref())
}

/// Checks `signature` against `url` and `params`.
///
/// Besides the URL as given, the URL with the scheme's default port made
/// explicit and the URL with its port removed are also accepted, since
/// proxies commonly add or strip them. Returns `Err` only when the URL
/// cannot be parsed.
pub fn validate_request(
    auth_token: &str,
    signature: &str,
    url: &str,
    params: &BTreeMap<String, String>,
) -> Result<bool, SignatureError> {
    let parts = UrlParts::parse(url)?;

    let Ok(presented) = STANDARD.decode(signature.trim()) else {
        debug!("Signature is not valid base64");
        return Ok(false);
    };

    let key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, auth_token.as_bytes());
    let mut candidates = vec![url.to_string()];
    candidates.extend(parts.with_default_port());
    candidates.extend(parts.without_port());

    let valid = candidates.iter().any(|candidate| {
        hmac::verify(&key, signing_payload(candidate, params).as_bytes(), &presented).is_ok()
    });

    Ok(valid)
}

/// Rebuilds the public URL Twilio signed.
///
/// An explicit `base_url` wins; otherwise the scheme comes from the first
/// value of `X-Forwarded-Proto` (falling back to `http`) and the authority
/// from `Host`.
pub fn request_url(
    base_url: Option<&str>,
    forwarded_proto: Option<&str>,
    host: Option<&str>,
    path_and_query: &str,
) -> Result<String, SignatureError> {
    if let Some(base) = base_url.filter(|b| !b.is_empty()) {
        return Ok(format!("{}{}", base.trim_end_matches('/'), path_and_query));
    }

    let host = host
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| SignatureError::Malformed("missing Host header".to_string()))?;

    let scheme = forwarded_proto
        .and_then(|proto| proto.split(',').next())
        .map(str::trim)
        .filter(|proto| !proto.is_empty())
        .unwrap_or(FALLBACK_SCHEME);

    Ok(format!("{}://{}{}", scheme, host, path_and_query))
}

/// Gate in front of the webhook: decides whether a request may proceed.
#[derive(Debug, Clone, Default)]
pub struct SignatureVerifier {
    auth_token: Option<String>,
}

impl SignatureVerifier {
    pub fn new(auth_token: Option<String>) -> Self {
        Self {
            auth_token: auth_token.filter(|t| !t.is_empty()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.auth_token.is_some()
    }

    /// Applies the verification policy.
    ///
    /// Without a configured secret every request passes (fail open) and a
    /// warning is logged. With a secret, a missing or wrong signature is
    /// rejected (fail closed). `url` is only evaluated when a check actually
    /// runs.
    pub fn check<F>(
        &self,
        signature: Option<&str>,
        url: F,
        params: &BTreeMap<String, String>,
    ) -> Result<Verification, SignatureError>
    where
        F: FnOnce() -> Result<String, SignatureError>,
    {
        let Some(auth_token) = &self.auth_token else {
            warn!("TWILIO_AUTH_TOKEN not set, webhook validation disabled");
            return Ok(Verification::Skipped);
        };

        let signature = signature.ok_or(SignatureError::Missing)?;
        let url = url()?;

        if validate_request(auth_token, signature, &url, params)? {
            Ok(Verification::Verified)
        } else {
            debug!(url = %url, "Signature mismatch");
            Err(SignatureError::Mismatch)
        }
    }
}

fn signing_payload(url: &str, params: &BTreeMap<String, String>) -> String {
    params.iter().fold(url.to_string(), |mut acc, (key, value)| {
        acc.push_str(key);
        acc.push_str(value);
        acc
    })
}

/// Just enough URL structure to add or remove a port without touching
/// anything else in the string.
struct UrlParts<'a> {
    scheme: &'a str,
    /// `user:pass@` prefix, if any
    userinfo: &'a str,
    host: &'a str,
    port: Option<&'a str>,
    /// Path, query and fragment, untouched
    rest: &'a str,
}

impl<'a> UrlParts<'a> {
    fn parse(url: &'a str) -> Result<Self, SignatureError> {
        let (scheme, after_scheme) = url
            .split_once("://")
            .filter(|(scheme, _)| !scheme.is_empty())
            .ok_or_else(|| SignatureError::Malformed(format!("not an absolute URL: {}", url)))?;

        let authority_end = after_scheme
            .find(['/', '?', '#'])
            .unwrap_or(after_scheme.len());
        let (authority, rest) = after_scheme.split_at(authority_end);

        let (userinfo, host_port) = match authority.rfind('@') {
            Some(at) => authority.split_at(at + 1),
            None => ("", authority),
        };

        // Bracketed IPv6 literals contain colons of their own.
        let port_sep = match host_port.rfind(']') {
            Some(close) => host_port[close..].find(':').map(|i| close + i),
            None => host_port.rfind(':'),
        };
        let (host, port) = match port_sep {
            Some(i) => (&host_port[..i], Some(&host_port[i + 1..])),
            None => (host_port, None),
        };

        if host.is_empty() {
            return Err(SignatureError::Malformed(format!("URL has no host: {}", url)));
        }

        Ok(Self {
            scheme,
            userinfo,
            host,
            port,
            rest,
        })
    }

    fn default_port(&self) -> Option<&'static str> {
        if self.scheme.eq_ignore_ascii_case("https") {
            Some("443")
        } else if self.scheme.eq_ignore_ascii_case("http") {
            Some("80")
        } else {
            None
        }
    }

    fn with_default_port(&self) -> Option<String> {
        if self.port.is_some() {
            return None;
        }
        let port = self.default_port()?;
        Some(self.assemble(Some(port)))
    }

    fn without_port(&self) -> Option<String> {
        self.port?;
        Some(self.assemble(None))
    }

    fn assemble(&self, port: Option<&str>) -> String {
        match port {
            Some(port) => format!(
                "{}://{}{}:{}{}",
                self.scheme, self.userinfo, self.host, port, self.rest
            ),
            None => format!("{}://{}{}{}", self.scheme, self.userinfo, self.host, self.rest),
        }
    }
}
