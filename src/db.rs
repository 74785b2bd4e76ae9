use rand::RngCore;
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::credentials::HashedCredential;

/// A validated, sanitized registration ready to be stored.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub credential: HashedCredential,
}

pub async fn init_db(pool: &SqlitePool) -> anyhow::Result<()> {
    if let Err(e) = sqlx::query("PRAGMA journal_mode=WAL;").execute(pool).await {
        tracing::warn!("Failed to set WAL journal mode: {}", e);
    }
    // Foreign keys are critical - fail if this doesn't work
    sqlx::query("PRAGMA foreign_keys=ON;").execute(pool).await?;
    if let Err(e) = sqlx::query("PRAGMA busy_timeout=10000;").execute(pool).await {
        tracing::warn!("Failed to set busy_timeout: {}", e);
    }

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            password TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            is_staff INTEGER NOT NULL DEFAULT 0,
            is_superuser INTEGER NOT NULL DEFAULT 0,
            date_joined TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
            last_login TEXT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS user_profiles (
            id TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
            email_verified INTEGER NOT NULL DEFAULT 0,
            verification_token TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
        )"#,
    )
    .execute(pool)
    .await?;

    if let Err(e) = sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_user_profiles_user ON user_profiles(user_id)",
    )
    .execute(pool)
    .await
    {
        tracing::warn!("Failed to create index idx_user_profiles_user: {}", e);
    }

    Ok(())
}

pub async fn user_exists(pool: &SqlitePool, email: &str) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?1")
        .bind(email)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

/// Inserts the user and its profile in one transaction, returning the user id.
pub async fn create_user(pool: &SqlitePool, user: &NewUser) -> Result<i64, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let username = unique_username(&mut tx, &user.email).await?;
    let user_id: i64 = sqlx::query_scalar(
        r#"INSERT INTO users (username, email, first_name, last_name, password)
           VALUES (?1, ?2, ?3, ?4, ?5)
           RETURNING id"#,
    )
    .bind(&username)
    .bind(&user.email)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(user.credential.encode())
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO user_profiles (id, user_id, email_verified, verification_token) VALUES (?1, ?2, 0, ?3)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(verification_token())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    tracing::info!(user_id, %username, "Created user");
    Ok(user_id)
}

/// Email local part, suffixed with 1, 2, ... until no user holds it.
async fn unique_username(tx: &mut Transaction<'_, Sqlite>, email: &str) -> Result<String, sqlx::Error> {
    let base = email.split('@').next().unwrap_or(email);
    let mut username = base.to_string();
    let mut counter = 1u32;

    loop {
        let taken: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE username = ?1")
            .bind(&username)
            .fetch_one(&mut **tx)
            .await?;
        if taken == 0 {
            return Ok(username);
        }
        username = format!("{}{}", base, counter);
        counter += 1;
    }
}

fn verification_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
