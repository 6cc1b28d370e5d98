//! SQLite database operations
//!
//! All database access goes through this module.
//! Uses SQLx with runtime-checked queries.

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, QueryBuilder, Sqlite};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::{Duration, Instant};

use super::models::*;
use crate::error::AppError;
use crate::metrics::observe_db_query;

/// SQLite caps bound parameters per statement; stay well below the limit.
const MAX_BIND_PARAMETERS: usize = 500;

/// How long a writer waits for SQLite's write lock before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const REVIEW_WITH_AUTHOR_COLUMNS: &str = r#"
    r.id, r.rating, r.comment, r.user_id, r.taqueria_id, r.created_at, r.updated_at,
    u.name AS author_name, u.image AS author_image
"#;

/// Map write failures, surfacing foreign key violations separately.
fn map_write_error(error: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_error) = &error {
        if db_error.is_foreign_key_violation() {
            return AppError::ForeignKeyViolation(db_error.message().to_string());
        }
    }
    AppError::Database(error)
}

/// Database connection pool wrapper.
///
/// Constructed once at startup and shared through `AppState`.
/// Call [`Database::close`] during shutdown to drain the pool.
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Connect to the SQLite database
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Arguments
    /// * `url` - SQLx connection string (e.g. `sqlite:data/tacos.db`)
    /// * `max_connections` - Pool size
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!("Database connected and migrated successfully");

        Ok(Self { pool })
    }

    /// Close every pooled connection.
    ///
    /// Later queries fail with `PoolClosed`.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Database pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    // =========================================================================
    // Users
    // =========================================================================

    pub async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let started = Instant::now();
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        observe_db_query("select", "users", started);

        Ok(user)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let started = Instant::now();
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ? COLLATE NOCASE")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        observe_db_query("select", "users", started);

        Ok(user)
    }

    /// Find or create the user behind a provider identity
    ///
    /// # Steps
    /// 1. Sync `name`/`image` onto the user already linked to
    ///    `(provider, provider_account_id)`, if any
    /// 2. Otherwise match an existing user by email
    /// 3. Otherwise create a new user
    /// 4. Link the provider account and sync `name`/`image`
    ///
    /// Runs in a single transaction whose first statement is a write, so
    /// SQLite takes the write lock (waiting out the busy timeout) before
    /// anything is read. A read-first transaction would have to upgrade
    /// its lock later, which fails at once with SQLITE_BUSY when another
    /// sign-in holds a read lock.
    pub async fn link_oauth_account(&self, identity: &OAuthIdentity) -> Result<User, AppError> {
        let started = Instant::now();
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let refreshed = sqlx::query(
            r#"
            UPDATE users
            SET name = COALESCE(?, name), image = COALESCE(?, image), updated_at = ?
            WHERE id = (
                SELECT user_id FROM oauth_accounts
                WHERE provider = ? AND provider_account_id = ?
            )
            "#,
        )
        .bind(&identity.name)
        .bind(&identity.image)
        .bind(now)
        .bind(&identity.provider)
        .bind(&identity.provider_account_id)
        .execute(&mut *tx)
        .await?;

        let user_id: String = if refreshed.rows_affected() > 0 {
            sqlx::query_scalar(
                "SELECT user_id FROM oauth_accounts WHERE provider = ? AND provider_account_id = ?",
            )
            .bind(&identity.provider)
            .bind(&identity.provider_account_id)
            .fetch_one(&mut *tx)
            .await?
        } else {
            let existing_id: Option<String> =
                sqlx::query_scalar("SELECT id FROM users WHERE email = ? COLLATE NOCASE")
                    .bind(&identity.email)
                    .fetch_optional(&mut *tx)
                    .await?;

            let user_id = match existing_id {
                Some(id) => {
                    sqlx::query(
                        r#"
                        UPDATE users
                        SET name = COALESCE(?, name), image = COALESCE(?, image), updated_at = ?
                        WHERE id = ?
                        "#,
                    )
                    .bind(&identity.name)
                    .bind(&identity.image)
                    .bind(now)
                    .bind(&id)
                    .execute(&mut *tx)
                    .await?;
                    id
                }
                None => {
                    let id = EntityId::new().0;
                    sqlx::query(
                        r#"
                        INSERT INTO users (id, email, name, image, created_at, updated_at)
                        VALUES (?, ?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(&id)
                    .bind(&identity.email)
                    .bind(&identity.name)
                    .bind(&identity.image)
                    .bind(now)
                    .bind(now)
                    .execute(&mut *tx)
                    .await
                    .map_err(map_write_error)?;
                    tracing::info!(user_id = %id, provider = %identity.provider, "User created");
                    id
                }
            };

            sqlx::query(
                r#"
                INSERT INTO oauth_accounts (id, user_id, provider, provider_account_id, created_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(EntityId::new().0)
            .bind(&user_id)
            .bind(&identity.provider)
            .bind(&identity.provider_account_id)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(map_write_error)?;

            user_id
        };

        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(&user_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        observe_db_query("upsert", "users", started);

        Ok(user)
    }

    pub async fn get_oauth_accounts(&self, user_id: &str) -> Result<Vec<OAuthAccount>, AppError> {
        let accounts = sqlx::query_as::<_, OAuthAccount>(
            "SELECT * FROM oauth_accounts WHERE user_id = ? ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(accounts)
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    pub async fn insert_session(&self, record: &SessionRecord) -> Result<(), AppError> {
        let started = Instant::now();
        sqlx::query(
            "INSERT INTO sessions (id, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.user_id)
        .bind(record.created_at)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;
        observe_db_query("insert", "sessions", started);

        Ok(())
    }

    pub async fn get_session_record(&self, id: &str) -> Result<Option<SessionRecord>, AppError> {
        let started = Instant::now();
        let record = sqlx::query_as::<_, SessionRecord>("SELECT * FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        observe_db_query("select", "sessions", started);

        Ok(record)
    }

    /// Delete a session
    ///
    /// # Returns
    /// `true` if a row was removed
    pub async fn delete_session(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove sessions whose expiry has passed
    ///
    /// # Returns
    /// Number of removed rows
    pub async fn delete_expired_sessions(&self) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    // =========================================================================
    // Taquerias
    // =========================================================================

    pub async fn create_taqueria(&self, new: &NewTaqueria) -> Result<Taqueria, AppError> {
        let started = Instant::now();
        let now = Utc::now();
        let taqueria = Taqueria {
            id: EntityId::new().0,
            name: new.name.clone(),
            address: new.address.clone(),
            city: new.city.clone(),
            state: new.state.clone(),
            lat: new.lat,
            lng: new.lng,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO taquerias (id, name, address, city, state, lat, lng, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&taqueria.id)
        .bind(&taqueria.name)
        .bind(&taqueria.address)
        .bind(&taqueria.city)
        .bind(&taqueria.state)
        .bind(taqueria.lat)
        .bind(taqueria.lng)
        .bind(taqueria.created_at)
        .bind(taqueria.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;
        observe_db_query("insert", "taquerias", started);

        Ok(taqueria)
    }

    pub async fn get_taqueria(&self, id: &str) -> Result<Option<Taqueria>, AppError> {
        let taqueria = sqlx::query_as::<_, Taqueria>("SELECT * FROM taquerias WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(taqueria)
    }

    /// List taquerias matching `filter`, each with its reviews
    ///
    /// Reviews are loaded in a second query and grouped in memory, so the
    /// whole result is materialized before returning.
    pub async fn list_taquerias(
        &self,
        filter: &TaqueriaFilter,
    ) -> Result<Vec<TaqueriaWithReviews>, AppError> {
        let started = Instant::now();

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM taquerias");
        let mut has_condition = false;
        for (column, value) in [
            ("city", filter.city.as_deref()),
            ("state", filter.state.as_deref()),
        ] {
            let Some(value) = value else {
                continue;
            };
            builder.push(if has_condition { " AND " } else { " WHERE " });
            builder.push(column);
            builder.push(" = ");
            builder.push_bind(value);
            has_condition = true;
        }
        builder.push(" ORDER BY created_at ASC, id ASC");

        let taquerias = builder
            .build_query_as::<Taqueria>()
            .fetch_all(&self.pool)
            .await?;
        observe_db_query("select", "taquerias", started);

        let ids: Vec<&str> = taquerias.iter().map(|t| t.id.as_str()).collect();
        let mut reviews_by_taqueria = self.get_reviews_for_taquerias(&ids).await?;

        Ok(taquerias
            .into_iter()
            .map(|taqueria| {
                let reviews = reviews_by_taqueria.remove(&taqueria.id).unwrap_or_default();
                TaqueriaWithReviews { taqueria, reviews }
            })
            .collect())
    }

    // =========================================================================
    // Reviews
    // =========================================================================

    /// Create a review and return it with its author's display fields
    ///
    /// # Errors
    /// `ForeignKeyViolation` if the user or taqueria does not exist
    pub async fn create_review(&self, new: &NewReview) -> Result<ReviewWithAuthor, AppError> {
        let started = Instant::now();
        let now = Utc::now();
        let id = EntityId::new().0;

        sqlx::query(
            r#"
            INSERT INTO reviews (id, rating, comment, user_id, taqueria_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(new.rating)
        .bind(&new.comment)
        .bind(&new.user_id)
        .bind(&new.taqueria_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;
        observe_db_query("insert", "reviews", started);

        let review = sqlx::query_as::<_, ReviewWithAuthor>(&format!(
            "SELECT {REVIEW_WITH_AUTHOR_COLUMNS} FROM reviews r JOIN users u ON u.id = r.user_id WHERE r.id = ?"
        ))
        .bind(&id)
        .fetch_one(&self.pool)
        .await?;

        Ok(review)
    }

    /// Load reviews for a set of taquerias, grouped by taqueria ID
    async fn get_reviews_for_taquerias(
        &self,
        taqueria_ids: &[&str],
    ) -> Result<HashMap<String, Vec<ReviewWithAuthor>>, AppError> {
        let mut grouped: HashMap<String, Vec<ReviewWithAuthor>> = HashMap::new();

        for chunk in taqueria_ids.chunks(MAX_BIND_PARAMETERS) {
            let started = Instant::now();
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
                "SELECT {REVIEW_WITH_AUTHOR_COLUMNS} FROM reviews r JOIN users u ON u.id = r.user_id WHERE r.taqueria_id IN ("
            ));
            let mut separated = builder.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(") ORDER BY r.created_at ASC, r.id ASC");

            let reviews = builder
                .build_query_as::<ReviewWithAuthor>()
                .fetch_all(&self.pool)
                .await?;
            observe_db_query("select", "reviews", started);

            for review in reviews {
                grouped
                    .entry(review.review.taqueria_id.clone())
                    .or_default()
                    .push(review);
            }
        }

        Ok(grouped)
    }
}
