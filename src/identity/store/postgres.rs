//! PostgreSQL user store.

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::Instrument;
use uuid::Uuid;

use super::{FederatedSignIn, ProfileRecord, StoreError, UniqueField, UserStore};
use crate::identity::user::User;

const SCHEMA: &str = include_str!("../../../sql/schema.sql");

const USER_COLUMNS: &str = "id, email, username, first_name, last_name, full_name, \
     phone_number, password_hash, disabled, roles, created_at, last_login, \
     email_verified, verification_token, google_id";

#[derive(Clone, Debug)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the `users` table and its unique indexes if missing.
    ///
    /// # Errors
    /// Returns an error if the schema statements fail.
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DDL",
            db.statement = "sql/schema.sql"
        );
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to apply users schema")?;
        Ok(())
    }

    async fn find_one(
        &self,
        column: &str,
        value: &str,
    ) -> Result<Option<User>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .with_context(|| format!("failed to lookup user by {column}"))?;

        row.as_ref().map(user_from_row).transpose()
    }
}

/// Run an `UPDATE ... WHERE id = $1` binding `id` first; no row means no user.
async fn update_by_id<'q>(
    pool: &PgPool,
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    statement: &'q str,
    action: &'static str,
) -> Result<(), StoreError> {
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = statement
    );
    let result = query
        .execute(pool)
        .instrument(span)
        .await
        .map_err(|err| map_write_error(err, action))?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

fn user_from_row(row: &PgRow) -> Result<User, StoreError> {
    let user = User {
        id: row.try_get("id").context("id")?,
        email: row.try_get("email").context("email")?,
        username: row.try_get("username").context("username")?,
        first_name: row.try_get("first_name").context("first_name")?,
        last_name: row.try_get("last_name").context("last_name")?,
        full_name: row.try_get("full_name").context("full_name")?,
        phone_number: row.try_get("phone_number").context("phone_number")?,
        password_hash: row.try_get("password_hash").context("password_hash")?,
        disabled: row.try_get("disabled").context("disabled")?,
        roles: row.try_get("roles").context("roles")?,
        created_at: row.try_get("created_at").context("created_at")?,
        last_login: row.try_get("last_login").context("last_login")?,
        email_verified: row.try_get("email_verified").context("email_verified")?,
        verification_token: row
            .try_get("verification_token")
            .context("verification_token")?,
        federated_id: row.try_get("google_id").context("google_id")?,
    };
    Ok(user)
}

/// Map the unique index named by the database to the field it guards.
fn unique_field_for(constraint: Option<&str>) -> Option<UniqueField> {
    match constraint? {
        "users_email_key" => Some(UniqueField::Email),
        "users_username_key" => Some(UniqueField::Username),
        "users_google_id_key" => Some(UniqueField::FederatedId),
        "users_verification_token_key" => Some(UniqueField::VerificationToken),
        _ => None,
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn map_write_error(err: sqlx::Error, action: &'static str) -> StoreError {
    if is_unique_violation(&err) {
        let constraint = match &err {
            sqlx::Error::Database(db_err) => db_err.constraint(),
            _ => None,
        };
        if let Some(field) = unique_field_for(constraint) {
            return StoreError::Conflict(field);
        }
    }
    StoreError::Backend(anyhow!(err).context(action))
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user by id")?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.find_one("username", username).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.find_one("email", email).await
    }

    async fn find_by_federated_id(&self, federated_id: &str) -> Result<Option<User>, StoreError> {
        self.find_one("google_id", federated_id).await
    }

    async fn insert(&self, user: &User) -> Result<(), StoreError> {
        let query = r"
            INSERT INTO users
                (id, email, username, first_name, last_name, full_name, phone_number,
                 password_hash, disabled, roles, created_at, last_login, email_verified,
                 verification_token, google_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user.id)
            .bind(&user.email)
            .bind(&user.username)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.full_name)
            .bind(&user.phone_number)
            .bind(&user.password_hash)
            .bind(user.disabled)
            .bind(&user.roles)
            .bind(user.created_at)
            .bind(user.last_login)
            .bind(user.email_verified)
            .bind(&user.verification_token)
            .bind(&user.federated_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| map_write_error(err, "failed to insert user"))?;
        Ok(())
    }

    async fn update_profile(&self, id: Uuid, profile: &ProfileRecord) -> Result<User, StoreError> {
        let query = format!(
            "UPDATE users SET email = $2, username = $3, first_name = $4, last_name = $5, \
             full_name = $6, phone_number = $7 WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(&profile.email)
            .bind(&profile.username)
            .bind(&profile.first_name)
            .bind(&profile.last_name)
            .bind(&profile.full_name)
            .bind(&profile.phone_number)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| map_write_error(err, "failed to update profile"))?;

        match row {
            Some(row) => user_from_row(&row),
            None => Err(StoreError::NotFound),
        }
    }

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let statement = "UPDATE users SET last_login = $2 WHERE id = $1";
        let query = sqlx::query(statement).bind(id).bind(at);
        update_by_id(&self.pool, query, statement, "failed to record login").await
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> Result<(), StoreError> {
        let statement = "UPDATE users SET password_hash = $2 WHERE id = $1";
        let query = sqlx::query(statement).bind(id).bind(password_hash);
        update_by_id(&self.pool, query, statement, "failed to set password").await
    }

    async fn consume_verification_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        let query = format!(
            "UPDATE users SET email_verified = TRUE, verification_token = NULL \
             WHERE verification_token = $1 RETURNING {USER_COLUMNS}"
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(token)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| map_write_error(err, "failed to verify email"))?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn record_federated_login(
        &self,
        id: Uuid,
        sign_in: &FederatedSignIn,
    ) -> Result<Option<User>, StoreError> {
        // SET expressions read the pre-update row.
        let query = format!(
            "UPDATE users SET \
                 google_id = COALESCE(google_id, $2), \
                 first_name = COALESCE($3, first_name), \
                 last_name = COALESCE($4, last_name), \
                 full_name = CASE WHEN $3::TEXT IS NULL AND $4::TEXT IS NULL THEN full_name \
                     ELSE btrim(COALESCE($3, first_name) || ' ' || COALESCE($4, last_name)) END, \
                 last_login = $5 \
             WHERE id = $1 AND (google_id IS NULL OR google_id = $2) \
             RETURNING {USER_COLUMNS}"
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(&sign_in.federated_id)
            .bind(&sign_in.first_name)
            .bind(&sign_in.last_name)
            .bind(sign_in.at)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| map_write_error(err, "failed to record federated login"))?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let query = "SELECT 1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        sqlx::query(query)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("database ping failed")?;
        Ok(())
    }
}
