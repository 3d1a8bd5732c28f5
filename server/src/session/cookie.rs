use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::MIN_SESSION_SECRET_LEN;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CookieError {
    #[error("session secret is too short (min {MIN_SESSION_SECRET_LEN} bytes)")]
    SecretTooShort,

    #[error("invalid session cookie format")]
    InvalidFormat,

    #[error("session cookie signature is invalid")]
    InvalidSignature,
}

/// Signs session ids so the cookie value cannot be forged or swapped.
///
/// Cookie values have the form `<session id>.<base64url(hmac)>`.
#[derive(Clone)]
pub struct CookieSigner {
    secret: Arc<[u8]>,
}

impl CookieSigner {
    pub fn new(secret: Vec<u8>) -> Result<Self, CookieError> {
        if secret.len() < MIN_SESSION_SECRET_LEN {
            return Err(CookieError::SecretTooShort);
        }

        Ok(Self {
            secret: Arc::<[u8]>::from(secret),
        })
    }

    pub fn sign(&self, session_id: &str) -> Result<String, CookieError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| CookieError::InvalidSignature)?;
        mac.update(session_id.as_bytes());
        let signature_b64 = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{session_id}.{signature_b64}"))
    }

    /// Returns the session id carried by a signed cookie value.
    pub fn verify(&self, value: &str) -> Result<String, CookieError> {
        let (session_id, signature_b64) = value
            .rsplit_once('.')
            .ok_or(CookieError::InvalidFormat)?;

        if session_id.is_empty() {
            return Err(CookieError::InvalidFormat);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| CookieError::InvalidFormat)?;

        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| CookieError::InvalidSignature)?;
        mac.update(session_id.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| CookieError::InvalidSignature)?;

        Ok(session_id.to_string())
    }
}
