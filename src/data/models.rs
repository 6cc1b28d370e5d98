//! Data models
//!
//! Rust structs representing database entities and the inputs used to
//! create them. All models use ULID for IDs and chrono for timestamps.
//! JSON field names follow the public API (camelCase).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Users
// =============================================================================

/// A person who signed in through one of the OAuth providers
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    /// Avatar URL reported by the provider
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Provider identity returned after a successful OAuth exchange.
///
/// Used to find or create the matching [`User`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthIdentity {
    /// Provider name ("github", "google")
    pub provider: String,
    /// Stable account ID at the provider
    pub provider_account_id: String,
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
}

/// Link between a provider account and a local user
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OAuthAccount {
    pub id: String,
    pub user_id: String,
    pub provider: String,
    pub provider_account_id: String,
    pub created_at: DateTime<Utc>,
}

/// Server-side record backing a signed session cookie.
///
/// Deleting the row revokes the session even if the cookie is still
/// cryptographically valid.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRecord {
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

// =============================================================================
// Taquerias
// =============================================================================

/// A listed taqueria
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Taqueria {
    pub id: String,
    pub name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A taqueria together with its reviews
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaqueriaWithReviews {
    #[serde(flatten)]
    pub taqueria: Taqueria,
    pub reviews: Vec<ReviewWithAuthor>,
}

/// Fields required to create a taqueria
#[derive(Debug, Clone)]
pub struct NewTaqueria {
    pub name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

/// Optional equality filters for listing taquerias.
///
/// Filters combine with AND; an empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaqueriaFilter {
    pub city: Option<String>,
    pub state: Option<String>,
}

impl TaqueriaFilter {
    /// Build a filter from trimmed values, treating blank ones as absent
    ///
    /// Stored city and state are trimmed on insert, so the filter trims too.
    pub fn new(city: Option<String>, state: Option<String>) -> Self {
        fn trimmed(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        Self {
            city: trimmed(city),
            state: trimmed(state),
        }
    }
}

// =============================================================================
// Reviews
// =============================================================================

/// A review of a taqueria
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: String,
    pub rating: i64,
    pub comment: Option<String>,
    pub user_id: String,
    pub taqueria_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public author fields attached to a review.
///
/// Only the display name and avatar are exposed, never the full user.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReviewAuthor {
    #[sqlx(rename = "author_name")]
    pub name: Option<String>,
    #[sqlx(rename = "author_image")]
    pub image: Option<String>,
}

/// A review with its author's display fields
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReviewWithAuthor {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub review: Review,
    #[sqlx(flatten)]
    pub user: ReviewAuthor,
}

/// Fields required to create a review
#[derive(Debug, Clone)]
pub struct NewReview {
    pub rating: i64,
    pub comment: Option<String>,
    /// Author; always taken from the caller's session
    pub user_id: String,
    pub taqueria_id: String,
}
