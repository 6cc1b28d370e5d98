//! Session management
//!
//! Sessions are HMAC-signed tokens stored in the `session` cookie.
//! Each token names a server-side session row so sign-out can revoke it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::data::{EntityId, SessionRecord, User};
use crate::error::AppError;

/// Name of the cookie carrying the signed session token
pub const SESSION_COOKIE: &str = "session";

/// User fields exposed through the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    /// Persisted user ID, usable as a foreign key
    pub id: String,
    pub name: Option<String>,
    pub email: String,
    pub image: Option<String>,
}

/// User session data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// ID of the backing session row
    pub session_id: String,
    pub user: SessionUser,
    /// When session was created
    pub created_at: DateTime<Utc>,
    /// When session expires
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Build a fresh session for a persisted user.
    ///
    /// The user's database ID is copied onto `session.user.id`.
    pub fn for_user(user: &User, max_age_seconds: i64) -> Self {
        let now = Utc::now();
        Self {
            session_id: EntityId::new().0,
            user: SessionUser {
                id: user.id.clone(),
                name: user.name.clone(),
                email: user.email.clone(),
                image: user.image.clone(),
            },
            created_at: now,
            expires_at: now + Duration::seconds(max_age_seconds),
        }
    }

    /// Check if session is expired
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }

    /// Server-side record to persist alongside the token
    pub fn record(&self) -> SessionRecord {
        SessionRecord {
            id: self.session_id.clone(),
            user_id: self.user.id.clone(),
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }
}

/// Create a signed session token
///
/// Token format: base64(payload).base64(hmac_sha256(payload))
///
/// # Arguments
/// * `session` - Session data to encode
/// * `secret` - HMAC secret key
///
/// # Returns
/// Signed token string
pub fn create_session_token(session: &Session, secret: &str) -> Result<String, AppError> {
    use base64::{Engine as _, engine::general_purpose};
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    // 1. Serialize session to JSON
    let payload = serde_json::to_string(session).map_err(|e| AppError::Internal(e.into()))?;

    // 2. Base64 encode the payload
    let payload_b64 = general_purpose::URL_SAFE_NO_PAD.encode(payload.as_bytes());

    // 3. Create HMAC-SHA256 signature
    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Encryption(e.to_string()))?;
    mac.update(payload_b64.as_bytes());
    let signature = mac.finalize().into_bytes();
    let signature_b64 = general_purpose::URL_SAFE_NO_PAD.encode(signature);

    // 4. Return "{payload}.{signature}"
    Ok(format!("{}.{}", payload_b64, signature_b64))
}

/// Verify and decode a session token
///
/// Returns `None` for any malformed, badly signed or expired token.
/// Revocation is checked separately against the session table.
pub fn verify_session_token(token: &str, secret: &str) -> Option<Session> {
    use base64::{Engine as _, engine::general_purpose};
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    // 1. Split token into payload and signature
    let (payload_b64, signature_b64) = token.split_once('.')?;
    if signature_b64.contains('.') {
        return None;
    }

    // 2. Verify HMAC signature
    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload_b64.as_bytes());

    let signature = general_purpose::URL_SAFE_NO_PAD.decode(signature_b64).ok()?;
    mac.verify_slice(&signature).ok()?;

    // 3. Decode and deserialize payload
    let payload_bytes = general_purpose::URL_SAFE_NO_PAD.decode(payload_b64).ok()?;
    let session: Session = serde_json::from_slice(&payload_bytes).ok()?;

    // 4. Check if session is expired
    if session.is_expired() {
        return None;
    }

    Some(session)
}
