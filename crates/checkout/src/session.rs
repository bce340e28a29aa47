//! Session guard.
//!
//! Holds the authenticated customer's token and identity, persists them
//! across restarts, and enforces the rule the checkout depends on: a session
//! is only usable when *both* the token and the customer identity are
//! present. A persisted record missing either half is discarded on restore
//! rather than propagated as a half-authenticated state.
//!
//! Token validation is best-effort: a definitive rejection from the auth
//! authority invalidates the session, but an unreachable authority leaves it
//! untouched (the backend will reject the token at submit time if it is
//! actually dead).

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use marigold_core::{CustomerId, Email, EmailError};

use crate::api::{ApiError, AuthBackend};
use crate::storage::{self, StateStore, keys};

/// Persisted session schema version.
const SESSION_SCHEMA_VERSION: u32 = 1;

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The login email failed local validation; nothing was sent.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// The auth authority rejected the credentials.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// The auth authority could not be reached.
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// The authenticated identity, complete or absent - never partial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Identity {
    token: String,
    customer_id: CustomerId,
    email: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedSession {
    version: u32,
    identity: Identity,
}

// =============================================================================
// SessionGuard
// =============================================================================

/// Owns the session state and the persisted session record.
#[derive(Debug)]
pub struct SessionGuard<S: StateStore> {
    identity: Option<Identity>,
    store: S,
}

impl<S: StateStore> SessionGuard<S> {
    /// Restore the session from the store.
    ///
    /// A persisted record with an unknown schema version, or one that parsed
    /// but is otherwise unusable, resets to signed-out.
    pub fn restore(store: S) -> Self {
        let identity = match storage::load_json::<PersistedSession>(&store, keys::SESSION) {
            Some(persisted) if persisted.version == SESSION_SCHEMA_VERSION => {
                if persisted.identity.token.is_empty() {
                    warn!("persisted session has empty token, discarding");
                    None
                } else {
                    debug!(customer_id = %persisted.identity.customer_id, "session restored");
                    Some(persisted.identity)
                }
            }
            Some(persisted) => {
                warn!(
                    version = persisted.version,
                    "unknown session schema version, discarding"
                );
                None
            }
            None => None,
        };

        Self { identity, store }
    }

    /// Log in with email and password.
    ///
    /// The email is validated locally before any request is made. On success
    /// the session becomes authenticated and is persisted.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidEmail`] for a malformed email,
    /// [`SessionError::InvalidCredentials`] when the authority rejects the
    /// pair, [`SessionError::Api`] when it cannot be reached.
    #[instrument(skip(self, backend, password))]
    pub async fn login(
        &mut self,
        backend: &impl AuthBackend,
        email: &str,
        password: &str,
    ) -> Result<(), SessionError> {
        let email = Email::parse(email)?;

        let auth = match backend.authenticate(email.as_ref(), password).await {
            Ok(auth) => auth,
            Err(ApiError::Unauthorized(_)) => return Err(SessionError::InvalidCredentials),
            Err(e) => return Err(e.into()),
        };

        // Prefer the authority's email claim (hint field, then token
        // payload); fall back to what the shopper typed.
        let claimed = auth
            .email
            .clone()
            .or_else(|| decode_email_claim(&auth.token))
            .unwrap_or_else(|| email.as_ref().to_owned());

        info!(customer_id = %auth.customer_id, "logged in");
        self.identity = Some(Identity {
            token: auth.token,
            customer_id: auth.customer_id,
            email: claimed,
        });
        self.persist();
        Ok(())
    }

    /// Re-check the session token against the authority.
    ///
    /// Returns whether the session is still authenticated. A definitive
    /// rejection invalidates the session; an unreachable authority is an
    /// error and changes nothing.
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] when the authority could not be reached.
    pub async fn validate(&mut self, backend: &impl AuthBackend) -> Result<bool, ApiError> {
        let Some(identity) = self.identity.as_ref() else {
            return Ok(false);
        };

        if backend.validate_token(&identity.token).await? {
            Ok(true)
        } else {
            info!("token rejected by auth authority, signing out");
            self.invalidate();
            Ok(false)
        }
    }

    /// Sign out: clear the in-memory identity and the persisted record.
    pub fn invalidate(&mut self) {
        self.identity = None;
        if let Err(e) = self.store.remove(keys::SESSION) {
            // Already signed out in memory; the stale record will be
            // discarded on the next restore if it outlives us
            warn!(error = %e, "failed to remove persisted session");
        }
    }

    /// Whether a complete identity is present.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    /// The session token, when authenticated.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.identity.as_ref().map(|id| id.token.as_str())
    }

    /// The authenticated customer id.
    #[must_use]
    pub fn customer_id(&self) -> Option<CustomerId> {
        self.identity.as_ref().map(|id| id.customer_id)
    }

    /// The authenticated email.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.identity.as_ref().map(|id| id.email.as_str())
    }

    fn persist(&self) {
        let Some(identity) = self.identity.as_ref() else {
            return;
        };
        let record = PersistedSession {
            version: SESSION_SCHEMA_VERSION,
            identity: identity.clone(),
        };
        if let Err(e) = storage::save_json(&self.store, keys::SESSION, &record) {
            warn!(error = %e, "failed to persist session");
        }
    }
}

/// Pull the `email` claim out of a JWT-shaped token, if there is one.
///
/// Best-effort only: any token that is not three dot-separated base64url
/// segments with a JSON payload simply yields `None`.
fn decode_email_claim(token: &str) -> Option<String> {
    let mut segments = token.split('.');
    let _header = segments.next()?;
    let payload = segments.next()?;
    let _signature = segments.next()?;

    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    claims
        .get("email")
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned)
}
