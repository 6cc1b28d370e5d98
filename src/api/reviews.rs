//! Review submission

use axum::{Json, Router, extract::State, routing::post};
use serde::Deserialize;

use super::JsonBody;
use crate::AppState;
use crate::auth::CurrentUser;
use crate::data::{NewReview, ReviewWithAuthor};
use crate::error::AppError;
use crate::metrics::REVIEWS_CREATED_TOTAL;

/// Create review router
///
/// Routes:
/// - POST /api/reviews - Review a taqueria as the signed-in user
pub fn reviews_router() -> Router<AppState> {
    Router::new().route("/reviews", post(create_review))
}

/// Create review request
///
/// Unknown fields such as `userId` are ignored; the author always comes
/// from the session.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReviewRequest {
    pub rating: i64,
    #[serde(default)]
    pub comment: Option<String>,
    pub taqueria_id: String,
}

/// POST /api/reviews
///
/// The session is resolved before the body is read, so anonymous callers
/// get 401 whatever they send.
async fn create_review(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    JsonBody(req): JsonBody<CreateReviewRequest>,
) -> Result<Json<ReviewWithAuthor>, AppError> {
    let review = state
        .db
        .create_review(&NewReview {
            rating: req.rating,
            comment: req.comment,
            user_id: session.user.id.clone(),
            taqueria_id: req.taqueria_id,
        })
        .await?;
    REVIEWS_CREATED_TOTAL.inc();

    tracing::info!(
        review_id = %review.review.id,
        taqueria_id = %review.review.taqueria_id,
        user_id = %session.user.id,
        rating = review.review.rating,
        "Review created"
    );

    Ok(Json(review))
}
