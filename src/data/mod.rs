//! Data layer module
//!
//! Handles all data persistence:
//! - Users and their linked OAuth accounts
//! - Server-side session records
//! - Taquerias and reviews

mod database;
mod email;
mod models;

pub use database::Database;
pub use email::{Email, EmailError};
pub use models::*;
