//! Request metadata → tenant slug.
//!
//! Precedence, first match wins: explicit `X-Tenant` header, `tenantSlug`
//! claim of the bearer token, first label of the `Host` header, then the
//! default slug. Resolution performs no I/O and never fails.

use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

pub const TENANT_HEADER: &str = "x-tenant";
pub const DEFAULT_SLUG: &str = "default";

/// Host labels that never name a tenant
const RESERVED_SUBDOMAINS: [&str; 2] = ["www", "api"];

/// Which signal produced the slug
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    Header,
    Token,
    Subdomain,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub slug: String,
    pub source: ResolutionSource,
}

#[derive(Debug, Clone)]
pub struct TenantResolver {
    default_slug: String,
}

impl Default for TenantResolver {
    fn default() -> Self {
        Self::new(DEFAULT_SLUG)
    }
}

impl TenantResolver {
    pub fn new(default_slug: impl Into<String>) -> Self {
        Self {
            default_slug: default_slug.into(),
        }
    }

    pub fn resolve(
        &self,
        explicit_header: Option<&str>,
        bearer_token: Option<&str>,
        host: Option<&str>,
    ) -> Resolution {
        if let Some(slug) = explicit_header.and_then(normalize) {
            return Resolution { slug, source: ResolutionSource::Header };
        }
        if let Some(slug) = bearer_token.and_then(slug_from_token) {
            return Resolution { slug, source: ResolutionSource::Token };
        }
        if let Some(slug) = host.and_then(slug_from_host) {
            return Resolution { slug, source: ResolutionSource::Subdomain };
        }
        Resolution {
            slug: self.default_slug.clone(),
            source: ResolutionSource::Default,
        }
    }

    /// Pull the three signals out of request headers and resolve.
    ///
    /// A tenant header that is not visible ASCII still counts as explicit: it
    /// is decoded lossily so the lookup rejects it instead of falling back.
    pub fn resolve_from_headers(&self, headers: &HeaderMap) -> Resolution {
        let explicit = headers
            .get(TENANT_HEADER)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(strip_bearer);
        let host = headers.get(header::HOST).and_then(|v| v.to_str().ok());
        self.resolve(explicit.as_deref(), token, host)
    }
}

#[derive(Debug, Deserialize)]
struct RoutingClaims {
    #[serde(rename = "tenantSlug")]
    tenant_slug: Option<String>,
}

fn normalize(raw: &str) -> Option<String> {
    let slug = raw.trim().to_lowercase();
    (!slug.is_empty()).then_some(slug)
}

fn strip_bearer(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Read the `tenantSlug` claim without verifying the signature. Identity is
/// verified elsewhere; this only routes.
fn slug_from_token(token: &str) -> Option<String> {
    let claims = match decode_header(token) {
        Ok(header) => {
            let mut validation = Validation::new(header.alg);
            validation.insecure_disable_signature_validation();
            validation.validate_exp = false;
            validation.validate_aud = false;
            validation.required_spec_claims.clear();
            decode::<RoutingClaims>(token, &DecodingKey::from_secret(&[]), &validation)
                .ok()?
                .claims
        }
        // jsonwebtoken has no `none` algorithm
        Err(_) => unsecured_claims(token)?,
    };
    claims.tenant_slug.as_deref().and_then(normalize)
}

/// Claims of an unsecured (`alg: none`) token, RFC 7519 section 6
fn unsecured_claims(token: &str) -> Option<RoutingClaims> {
    let mut segments = token.split('.');
    let (header, payload) = (segments.next()?, segments.next()?);

    #[derive(Deserialize)]
    struct UnsecuredHeader {
        alg: String,
    }
    let header: UnsecuredHeader = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(header).ok()?).ok()?;
    if !header.alg.eq_ignore_ascii_case("none") {
        return None;
    }
    serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).ok()?).ok()
}

fn slug_from_host(host: &str) -> Option<String> {
    let host = host.trim().to_lowercase();
    let hostname = strip_port(&host);
    if hostname.parse::<IpAddr>().is_ok() {
        return None;
    }

    let labels: Vec<&str> = hostname.trim_end_matches('.').split('.').collect();
    if labels.len() < 2 {
        return None;
    }
    let first = labels[0];
    if first.is_empty() || RESERVED_SUBDOMAINS.contains(&first) {
        return None;
    }
    Some(first.to_string())
}

fn strip_port(host: &str) -> &str {
    // Bracketed IPv6 literal, with or without port
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}
