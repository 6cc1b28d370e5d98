//! Request body extractors that reject with [`AppError`]
//!
//! Plain `Json`/`Form` rejections answer with text bodies; these wrappers
//! route them through `AppError` so clients always get `{"error": ...}`.

use axum::extract::FromRequest;

use crate::error::AppError;

/// JSON request body
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct JsonBody<T>(pub T);

/// URL-encoded form body
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Form), rejection(AppError))]
pub struct FormBody<T>(pub T);
