//! Signed-assertion admission control.
//!
//! Every request carries an RS256 JWT issued by the access proxy in front of
//! the service. Signing keys come from a JWKS endpoint and are cached for
//! `key_ttl_secs`; an unseen `kid` forces one refetch before the token is
//! rejected.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use reqwest::header::{HeaderMap, COOKIE};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::config::AccessConfig;
use crate::error::{GateError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing access token")]
    MissingToken,
    #[error("malformed access token")]
    InvalidFormat,
    #[error("token signed by unknown key")]
    UnknownKey,
    #[error("bad token signature")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("token audience mismatch")]
    AudienceMismatch,
    #[error("token issuer mismatch")]
    IssuerMismatch,
    #[error("identity not authorized")]
    NotAuthorized,
    #[error("signing keys unavailable: {0}")]
    KeySetUnavailable(String),
}

impl AuthError {
    /// Stable reason code returned to clients.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "missing_token",
            AuthError::InvalidFormat => "invalid_format",
            AuthError::UnknownKey => "unknown_key",
            AuthError::BadSignature => "bad_signature",
            AuthError::Expired => "expired",
            AuthError::AudienceMismatch => "audience_mismatch",
            AuthError::IssuerMismatch => "issuer_mismatch",
            AuthError::NotAuthorized => "not_authorized",
            AuthError::KeySetUnavailable(_) => "key_set_unavailable",
        }
    }
}

// ---------------------------------------------------------------------------
// Claims
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    fn into_vec(self) -> Vec<String> {
        match self {
            Audience::One(a) => vec![a],
            Audience::Many(v) => v,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawClaims {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    exp: Option<i64>,
    #[serde(default)]
    aud: Option<Audience>,
    #[serde(default)]
    iss: Option<String>,
}

/// Identity established for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessClaims {
    pub identity: String,
    pub expires_at: DateTime<Utc>,
    pub audience: Vec<String>,
    pub issuer: Option<String>,
}

// ---------------------------------------------------------------------------
// KeySetCache
// ---------------------------------------------------------------------------

struct CachedKeys {
    keys: JwkSet,
    fetched_at: Instant,
}

/// Process-wide JWKS cache. Read-mostly; concurrent refreshes at worst fetch twice.
pub struct KeySetCache {
    http: reqwest::Client,
    url: String,
    ttl: Duration,
    cached: RwLock<Option<CachedKeys>>,
}

impl KeySetCache {
    pub fn new(http: reqwest::Client, url: impl Into<String>, ttl: Duration) -> Self {
        Self {
            http,
            url: url.into(),
            ttl,
            cached: RwLock::new(None),
        }
    }

    async fn lookup(&self, kid: &str, require_fresh: bool) -> Option<Jwk> {
        let guard = self.cached.read().await;
        let cached = guard.as_ref()?;
        if require_fresh && cached.fetched_at.elapsed() >= self.ttl {
            return None;
        }
        cached.keys.find(kid).cloned()
    }

    async fn refresh(&self) -> std::result::Result<(), AuthError> {
        let res = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| AuthError::KeySetUnavailable(e.to_string()))?;
        if !res.status().is_success() {
            return Err(AuthError::KeySetUnavailable(format!(
                "HTTP {}",
                res.status().as_u16()
            )));
        }
        let keys: JwkSet = res
            .json()
            .await
            .map_err(|e| AuthError::KeySetUnavailable(e.to_string()))?;
        tracing::info!("fetched {} signing keys from {}", keys.keys.len(), self.url);
        *self.cached.write().await = Some(CachedKeys {
            keys,
            fetched_at: Instant::now(),
        });
        Ok(())
    }

    /// Decoding key for `kid`, refetching when the cache is stale or lacks it.
    pub async fn key(&self, kid: &str) -> std::result::Result<DecodingKey, AuthError> {
        let jwk = match self.lookup(kid, true).await {
            Some(jwk) => jwk,
            None => {
                self.refresh().await?;
                self.lookup(kid, false).await.ok_or(AuthError::UnknownKey)?
            }
        };
        DecodingKey::from_jwk(&jwk).map_err(|_| AuthError::UnknownKey)
    }
}

// ---------------------------------------------------------------------------
// AdmissionControl
// ---------------------------------------------------------------------------

/// Pull the raw assertion from the dedicated header, else from the cookie.
pub fn extract_assertion(headers: &HeaderMap, header: &str, cookie: &str) -> Option<String> {
    if let Some(v) = headers
        .get(header)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return Some(v.to_string());
    }
    let prefix = format!("{cookie}=");
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|part| part.trim().strip_prefix(prefix.as_str()))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub struct AdmissionControl {
    keys: KeySetCache,
    audience: String,
    issuer: Option<String>,
    allowed_identities: Vec<String>,
    header: String,
    cookie: String,
}

impl AdmissionControl {
    pub fn new(keys: KeySetCache, config: &AccessConfig) -> Result<Self> {
        let audience = config
            .audience
            .clone()
            .filter(|a| !a.is_empty())
            .ok_or_else(|| GateError::Config("access.audience is required".into()))?;
        Ok(Self {
            keys,
            audience,
            issuer: config.issuer.clone().filter(|i| !i.is_empty()),
            allowed_identities: config
                .allowed_identities
                .iter()
                .map(|i| i.trim().to_lowercase())
                .filter(|i| !i.is_empty())
                .collect(),
            header: config.header.clone(),
            cookie: config.cookie.clone(),
        })
    }

    pub fn from_config(http: reqwest::Client, config: &AccessConfig) -> Result<Self> {
        let url = config
            .certs_url
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| GateError::Config("access.certs_url is required".into()))?;
        let keys = KeySetCache::new(http, url, Duration::from_secs(config.key_ttl_secs));
        Self::new(keys, config)
    }

    pub async fn verify(&self, headers: &HeaderMap) -> std::result::Result<AccessClaims, AuthError> {
        let token =
            extract_assertion(headers, &self.header, &self.cookie).ok_or(AuthError::MissingToken)?;
        self.verify_token(&token).await
    }

    pub async fn verify_token(&self, token: &str) -> std::result::Result<AccessClaims, AuthError> {
        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
            return Err(AuthError::InvalidFormat);
        }
        let header = jsonwebtoken::decode_header(token).map_err(|_| AuthError::InvalidFormat)?;
        if header.alg != Algorithm::RS256 {
            return Err(AuthError::InvalidFormat);
        }
        let kid = header
            .kid
            .filter(|k| !k.is_empty())
            .ok_or(AuthError::InvalidFormat)?;

        let key = self.keys.key(&kid).await?;

        // Signature only; claim checks below report precise reasons.
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        let data = jsonwebtoken::decode::<RawClaims>(token, &key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature => AuthError::BadSignature,
                _ => AuthError::InvalidFormat,
            }
        })?;

        self.check_claims(data.claims, Utc::now().timestamp())
    }

    fn check_claims(
        &self,
        claims: RawClaims,
        now: i64,
    ) -> std::result::Result<AccessClaims, AuthError> {
        let exp = claims.exp.ok_or(AuthError::Expired)?;
        if exp <= now {
            return Err(AuthError::Expired);
        }
        let expires_at = DateTime::from_timestamp(exp, 0).ok_or(AuthError::InvalidFormat)?;

        let audience = claims.aud.map(Audience::into_vec).unwrap_or_default();
        if !audience.iter().any(|a| a == &self.audience) {
            return Err(AuthError::AudienceMismatch);
        }

        if let Some(expected) = &self.issuer {
            if claims.iss.as_deref() != Some(expected.as_str()) {
                return Err(AuthError::IssuerMismatch);
            }
        }

        let identity = claims
            .email
            .filter(|e| !e.trim().is_empty())
            .or(claims.sub)
            .map(|i| i.trim().to_string())
            .unwrap_or_default();
        if identity.is_empty() {
            return Err(AuthError::NotAuthorized);
        }
        if !self.allowed_identities.is_empty()
            && !self.allowed_identities.contains(&identity.to_lowercase())
        {
            return Err(AuthError::NotAuthorized);
        }

        Ok(AccessClaims {
            identity,
            expires_at,
            audience,
            issuer: claims.iss,
        })
    }
}
