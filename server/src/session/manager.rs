use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::HttpRequest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::cookie::{CookieError, CookieSigner};
use super::store::{SessionStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session not found")]
    NotFound,

    #[error("Session store error: {0}")]
    Store(#[from] StoreError),

    #[error("Session encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Session cookie error: {0}")]
    Cookie(#[from] CookieError),
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub upstream_credential: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            upstream_credential: None,
            created_at: now,
            last_access: now,
        }
    }

    pub fn is_idle_expired(&self, idle_timeout: Duration, now: DateTime<Utc>) -> bool {
        match now.signed_duration_since(self.last_access).to_std() {
            Ok(elapsed) => elapsed >= idle_timeout,
            // last_access in the future (clock skew between replicas)
            Err(_) => false,
        }
    }
}

impl Default for SessionRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRecord")
            .field(
                "upstream_credential",
                &self.upstream_credential.as_ref().map(|_| "<redacted>"),
            )
            .field("created_at", &self.created_at)
            .field("last_access", &self.last_access)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub record: SessionRecord,
}

impl Session {
    pub fn credential(&self) -> Option<&str> {
        self.record
            .upstream_credential
            .as_deref()
            .filter(|credential| !credential.is_empty())
    }

    pub fn is_authenticated(&self) -> bool {
        self.credential().is_some()
    }
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub cookie_name: String,
    pub cookie_secure: bool,
    pub idle_timeout: Duration,
}

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    signer: CookieSigner,
    settings: SessionSettings,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, signer: CookieSigner, settings: SessionSettings) -> Self {
        Self {
            store,
            signer,
            settings,
        }
    }

    pub fn store_backend(&self) -> &'static str {
        self.store.backend()
    }

    pub fn purge_expired(&self) -> usize {
        self.store.purge_expired()
    }

    /// Returns the caller's session, creating an empty one when it has none.
    pub async fn establish(&self, req: &HttpRequest) -> Result<Session, SessionError> {
        if let Some(session) = self.get(req).await? {
            return Ok(session);
        }

        self.create().await
    }

    /// Drops whatever session the caller presented and issues a new id.
    /// Used at login so a credential never lands on a pre-existing id.
    pub async fn regenerate(&self, req: &HttpRequest) -> Result<Session, SessionError> {
        if let Some(session_id) = self.session_id_from(req) {
            self.destroy_session(&session_id).await?;
        }

        self.create().await
    }

    async fn create(&self) -> Result<Session, SessionError> {
        let session = Session {
            session_id: Uuid::new_v4().to_string(),
            record: SessionRecord::new(),
        };
        self.save(&session).await?;

        log::info!("Created session {}", session.session_id);

        Ok(session)
    }

    /// Resolves the caller's session from its cookie and renews its idle window.
    pub async fn get(&self, req: &HttpRequest) -> Result<Option<Session>, SessionError> {
        let session_id = match self.session_id_from(req) {
            Some(session_id) => session_id,
            None => return Ok(None),
        };

        let raw = match self.store.load(&session_id).await? {
            Some(raw) => raw,
            None => return Ok(None),
        };

        let mut record: SessionRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(err) => {
                log::warn!("Discarding undecodable session {}: {}", session_id, err);
                self.store.remove(&session_id).await?;
                return Ok(None);
            }
        };

        let now = Utc::now();
        if record.is_idle_expired(self.settings.idle_timeout, now) {
            self.store.remove(&session_id).await?;
            log::info!("Session {} expired", session_id);
            return Ok(None);
        }

        record.last_access = now;
        let session = Session { session_id, record };
        self.save(&session).await?;

        Ok(Some(session))
    }

    pub async fn set_credential(&self, session_id: &str, token: &str) -> Result<(), SessionError> {
        let raw = self
            .store
            .load(session_id)
            .await?
            .ok_or(SessionError::NotFound)?;

        let mut record: SessionRecord =
            serde_json::from_str(&raw).map_err(|_| SessionError::NotFound)?;
        record.upstream_credential = Some(token.to_string());
        record.last_access = Utc::now();

        self.save(&Session {
            session_id: session_id.to_string(),
            record,
        })
        .await?;

        log::info!("Stored upstream credential for session {}", session_id);
        Ok(())
    }

    /// Removes the caller's session, if any, and returns the cookie that clears
    /// it on the client.
    pub async fn destroy(&self, req: &HttpRequest) -> Result<Cookie<'static>, SessionError> {
        if let Some(session_id) = self.session_id_from(req) {
            self.destroy_session(&session_id).await?;
        }
        Ok(self.removal_cookie())
    }

    pub async fn destroy_session(&self, session_id: &str) -> Result<(), SessionError> {
        self.store.remove(session_id).await?;
        log::info!("Destroyed session: {}", session_id);
        Ok(())
    }

    /// Cookie carrying the signed session id, with a fresh idle max-age.
    pub fn session_cookie(&self, session: &Session) -> Result<Cookie<'static>, SessionError> {
        let value = self.signer.sign(&session.session_id)?;
        let max_age = CookieDuration::seconds(
            i64::try_from(self.settings.idle_timeout.as_secs()).unwrap_or(i64::MAX),
        );

        Ok(Cookie::build(self.settings.cookie_name.clone(), value)
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.settings.cookie_secure)
            .max_age(max_age)
            .finish())
    }

    pub fn removal_cookie(&self) -> Cookie<'static> {
        Cookie::build(self.settings.cookie_name.clone(), "")
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.settings.cookie_secure)
            .max_age(CookieDuration::seconds(0))
            .finish()
    }

    fn session_id_from(&self, req: &HttpRequest) -> Option<String> {
        let cookie = req.cookie(&self.settings.cookie_name)?;
        match self.signer.verify(cookie.value()) {
            Ok(session_id) => Some(session_id),
            Err(err) => {
                log::debug!("Ignoring session cookie: {}", err);
                None
            }
        }
    }

    async fn save(&self, session: &Session) -> Result<(), SessionError> {
        let raw = serde_json::to_string(&session.record)?;
        self.store
            .save(&session.session_id, raw, self.settings.idle_timeout)
            .await?;
        Ok(())
    }
}
