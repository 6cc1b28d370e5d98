//! Taqueria listing and submission

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use serde::Deserialize;

use super::JsonBody;
use crate::AppState;
use crate::auth::AuthState;
use crate::data::{NewTaqueria, TaqueriaFilter, TaqueriaWithReviews};
use crate::error::AppError;
use crate::metrics::TAQUERIAS_CREATED_TOTAL;

/// Create taqueria router
///
/// Routes:
/// - GET /api/taquerias - List taquerias with their reviews
/// - POST /api/taquerias - Submit a taqueria
pub fn taquerias_router() -> Router<AppState> {
    Router::new().route("/taquerias", get(list_taquerias).post(create_taqueria))
}

/// Listing query parameters
#[derive(Debug, Default, Deserialize)]
pub struct ListTaqueriasQuery {
    pub city: Option<String>,
    pub state: Option<String>,
}

/// GET /api/taquerias
///
/// Optional `city` and `state` filters combine with AND.
async fn list_taquerias(
    State(state): State<AppState>,
    Query(query): Query<ListTaqueriasQuery>,
) -> Result<Json<Vec<TaqueriaWithReviews>>, AppError> {
    let filter = TaqueriaFilter::new(query.city, query.state);
    let taquerias = state.db.list_taquerias(&filter).await?;

    tracing::debug!(count = taquerias.len(), ?filter, "Listed taquerias");
    Ok(Json(taquerias))
}

/// Create taqueria request
#[derive(Debug, Deserialize)]
pub struct CreateTaqueriaRequest {
    pub name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
}

impl CreateTaqueriaRequest {
    /// Trim the required fields and reject blank ones
    fn validate(self) -> Result<NewTaqueria, AppError> {
        fn required(field: &str, value: String) -> Result<String, AppError> {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Err(AppError::Validation(format!("{field} is required")));
            }
            Ok(trimmed.to_string())
        }

        Ok(NewTaqueria {
            name: required("name", self.name)?,
            address: required("address", self.address)?,
            city: required("city", self.city)?,
            state: required("state", self.state)?,
            lat: self.lat,
            lng: self.lng,
        })
    }
}

/// POST /api/taquerias
///
/// # Steps
/// 1. Enforce the submission policy
/// 2. Validate required fields
/// 3. Insert and return the taqueria with no reviews
async fn create_taqueria(
    State(state): State<AppState>,
    auth: AuthState,
    JsonBody(req): JsonBody<CreateTaqueriaRequest>,
) -> Result<Json<TaqueriaWithReviews>, AppError> {
    if state.config.listings.require_auth_for_submissions && auth.session().is_none() {
        return Err(AppError::Unauthorized);
    }

    let new_taqueria = req.validate()?;
    let taqueria = state.db.create_taqueria(&new_taqueria).await?;
    TAQUERIAS_CREATED_TOTAL.inc();

    tracing::info!(
        taqueria_id = %taqueria.id,
        city = %taqueria.city,
        submitted_by = auth.session().map(|session| session.user.id.as_str()),
        "Taqueria created"
    );

    Ok(Json(TaqueriaWithReviews {
        taqueria,
        reviews: Vec::new(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str) -> CreateTaqueriaRequest {
        CreateTaqueriaRequest {
            name: name.to_string(),
            address: "1 Main".to_string(),
            city: " Austin ".to_string(),
            state: "TX".to_string(),
            lat: Some(30.27),
            lng: None,
        }
    }

    #[test]
    fn validate_trims_required_fields() {
        let new_taqueria = request("Taco X").validate().unwrap();
        assert_eq!(new_taqueria.city, "Austin");
        assert_eq!(new_taqueria.lat, Some(30.27));
    }

    #[test]
    fn validate_rejects_blank_name() {
        assert!(matches!(
            request("   ").validate(),
            Err(AppError::Validation(message)) if message == "name is required"
        ));
    }
}
