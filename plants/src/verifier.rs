//! Verification of the bearer tokens presented by dashboard users.
//!
//! Tokens are Cognito ID tokens signed with RS256. The signing keys are
//! published by the user pool as a JWKS document; they are downloaded on
//! startup and again whenever a token references a key id that is not cached
//! yet. Key ids that are still unknown after a download are remembered for a
//! few seconds. After a download that did not turn up the requested key id, no
//! other unknown key id can trigger a download until a cooldown has passed, so
//! tokens with made-up key ids cannot trigger a download per request.
//!
//! The verifier is built once per process and shared by every request.

use crate::metrics_defs::JWKS_REFRESH;
use crate::negative_cache::NegativeCache;
use crate::types::Subject;
use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use moka::sync::Cache;
use serde::Deserialize;
use shared::counter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use url::Url;

const MAX_CACHED_KEYS: u64 = 64;
const EXPECTED_TOKEN_USE: &str = "id";
const UNKNOWN_KEY_COOLDOWN: Duration = Duration::from_secs(10);

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("token has no key id")]
    MissingKeyId,

    #[error("token was signed with an unknown key: {0}")]
    UnknownKey(String),

    #[error("token has expired")]
    Expired,

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("expected token_use {expected:?}, got {actual:?}")]
    WrongTokenUse { expected: String, actual: String },

    #[error("token has no subject")]
    MissingSubject,

    #[error("signing keys unavailable: {0}")]
    KeySetUnavailable(String),
}

impl AuthError {
    /// Whether the failure is caused by the presented credential rather than
    /// by the service itself.
    pub fn is_credential_error(&self) -> bool {
        !matches!(self, AuthError::KeySetUnavailable(_))
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(error: jsonwebtoken::errors::Error) -> Self {
        match error.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => AuthError::Malformed(error.to_string()),
            _ => AuthError::Invalid(error.to_string()),
        }
    }
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Verifies `token` and returns the identity it was issued to.
    async fn verify(&self, token: &str) -> Result<Subject, AuthError>;

    /// Whether the verifier can currently verify tokens.
    fn is_ready(&self) -> bool {
        true
    }
}

#[derive(Deserialize)]
struct Claims {
    #[serde(default)]
    sub: String,
    #[serde(default)]
    token_use: String,
}

fn subject_from_claims(claims: Claims) -> Result<Subject, AuthError> {
    if claims.token_use != EXPECTED_TOKEN_USE {
        return Err(AuthError::WrongTokenUse {
            expected: EXPECTED_TOKEN_USE.into(),
            actual: claims.token_use,
        });
    }

    if claims.sub.is_empty() {
        return Err(AuthError::MissingSubject);
    }

    Ok(Subject::new(claims.sub))
}

pub struct CognitoVerifier {
    client: reqwest::Client,
    jwks_url: Url,
    validation: Validation,
    keys: Cache<String, DecodingKey>,
    unknown_keys: NegativeCache,
    unknown_key_cooldown: Duration,
    // Serializes key set downloads. Holds the time of the last download that
    // did not contain the key id it was made for.
    refresh_lock: Mutex<Option<Instant>>,
    // Set once the key set has been downloaded successfully.
    ready: AtomicBool,
}

impl CognitoVerifier {
    pub fn new(
        issuer: &str,
        client_id: &str,
        jwks_url: Url,
        timeout: Duration,
    ) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::KeySetUnavailable(e.to_string()))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[client_id]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        Ok(CognitoVerifier {
            client,
            jwks_url,
            validation,
            keys: Cache::builder().max_capacity(MAX_CACHED_KEYS).build(),
            unknown_keys: NegativeCache::new(),
            unknown_key_cooldown: UNKNOWN_KEY_COOLDOWN,
            refresh_lock: Mutex::new(None),
            ready: AtomicBool::new(false),
        })
    }

    pub fn with_unknown_key_cooldown(mut self, cooldown: Duration) -> Self {
        self.unknown_key_cooldown = cooldown;
        self
    }

    /// Downloads the key set and caches every usable key. Returns the number of
    /// keys cached.
    pub async fn refresh_keys(&self) -> Result<usize, AuthError> {
        let _guard = self.refresh_lock.lock().await;
        self.download_and_cache().await
    }

    /// Downloads the key set unless an earlier download already succeeded.
    pub async fn load_keys(&self) -> Result<(), AuthError> {
        let _guard = self.refresh_lock.lock().await;
        if self.ready.load(Ordering::Relaxed) {
            return Ok(());
        }
        self.download_and_cache().await.map(|_| ())
    }

    // Callers hold `refresh_lock`.
    async fn download_and_cache(&self) -> Result<usize, AuthError> {
        let result = self.download_keys().await;
        let outcome = if result.is_ok() { "ok" } else { "error" };
        counter!(JWKS_REFRESH, "outcome" => outcome).increment(1);

        let jwks = result?;
        let mut cached = 0;
        for jwk in &jwks.keys {
            let Some(kid) = jwk.common.key_id.clone() else {
                continue;
            };
            match DecodingKey::from_jwk(jwk) {
                Ok(key) => {
                    self.unknown_keys.remove(&kid);
                    self.keys.insert(kid, key);
                    cached += 1;
                }
                Err(e) => tracing::warn!(kid = %kid, error = %e, "Skipping unusable signing key"),
            }
        }

        self.ready.store(true, Ordering::Relaxed);
        tracing::info!(keys = cached, url = %self.jwks_url, "Loaded signing keys");
        Ok(cached)
    }

    async fn download_keys(&self) -> Result<JwkSet, AuthError> {
        let response = self
            .client
            .get(self.jwks_url.clone())
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| AuthError::KeySetUnavailable(e.to_string()))?;

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| AuthError::KeySetUnavailable(e.to_string()))
    }

    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        if let Some(key) = self.keys.get(kid) {
            return Ok(key);
        }
        if self.unknown_keys.contains(kid) {
            return Err(AuthError::UnknownKey(kid.into()));
        }

        let mut last_miss = self.refresh_lock.lock().await;

        // Another request may have refreshed the key set while this one waited.
        if let Some(key) = self.keys.get(kid) {
            return Ok(key);
        }
        if self.unknown_keys.contains(kid) {
            return Err(AuthError::UnknownKey(kid.into()));
        }

        if last_miss.is_some_and(|at| at.elapsed() < self.unknown_key_cooldown) {
            tracing::debug!(kid = %kid, "Not downloading signing keys during cooldown");
            self.unknown_keys.insert(kid);
            return Err(AuthError::UnknownKey(kid.into()));
        }

        self.download_and_cache().await?;

        match self.keys.get(kid) {
            Some(key) => Ok(key),
            None => {
                *last_miss = Some(Instant::now());
                self.unknown_keys.insert(kid);
                Err(AuthError::UnknownKey(kid.into()))
            }
        }
    }
}

#[async_trait]
impl IdentityVerifier for CognitoVerifier {
    async fn verify(&self, token: &str) -> Result<Subject, AuthError> {
        let header = jsonwebtoken::decode_header(token)?;
        if header.alg != Algorithm::RS256 {
            return Err(AuthError::UnsupportedAlgorithm(format!("{:?}", header.alg)));
        }
        let kid = header.kid.ok_or(AuthError::MissingKeyId)?;

        let key = self.decoding_key(&kid).await?;
        let data = jsonwebtoken::decode::<Claims>(token, &key, &self.validation)?;

        subject_from_claims(data.claims)
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }
}
