//!
//! confide storage module
//! ----------------------
//! This module implements the on-disk user store. All user records live in a
//! single Parquet file `users.parquet` under the configured data root, read
//! and rewritten whole on each mutation; at this collection size that is
//! simpler and no slower than an embedded database.
//!
//! Key responsibilities:
//! - User record schema (id, username, password_hash, google_id, secret).
//! - Uniqueness of username and of provider id across the collection.
//! - Idempotent find-or-create keyed on the external provider id.
//! - Secret overwrite for a single user.
//!
//! The public API centers around the `Store` type, which is wrapped in a
//! thread-safe `SharedStore` (`Arc<Mutex<Store>>`) and injected into request
//! handlers. Mutations run while the caller holds that single lock, so
//! check-then-insert sequences are atomic with respect to each other.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AppError;

/// One user record. Local accounts carry `username` + `password_hash`;
/// federated accounts carry `google_id`. Exactly one of the two identities is
/// meaningfully populated per record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: Option<String>,
    pub password_hash: Option<String>,
    pub google_id: Option<String>,
    pub secret: Option<String>,
    /// Creation time in epoch milliseconds.
    pub created_at: i64,
}

/// On-disk user store rooted at a data folder.
pub struct Store {
    root: PathBuf,
}

impl Store {
    /// Create a new Store rooted at the given filesystem path.
    /// The directory is created if it does not already exist.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create or access data root: {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root_path(&self) -> &PathBuf {
        &self.root
    }

    fn users_path(&self) -> PathBuf {
        self.root.join("users.parquet")
    }

    fn mk_schema_df() -> DataFrame {
        let ids: Series = Series::new("id".into(), Vec::<String>::new());
        let usernames: Series = Series::new("username".into(), Vec::<Option<String>>::new());
        let hashes: Series = Series::new("password_hash".into(), Vec::<Option<String>>::new());
        let google_ids: Series = Series::new("google_id".into(), Vec::<Option<String>>::new());
        let secrets: Series = Series::new("secret".into(), Vec::<Option<String>>::new());
        let created: Series = Series::new("created_at".into(), Vec::<i64>::new());
        DataFrame::new(vec![
            ids.into(),
            usernames.into(),
            hashes.into(),
            google_ids.into(),
            secrets.into(),
            created.into(),
        ])
        .unwrap()
    }

    fn row_df(user: &User) -> Result<DataFrame> {
        let df = DataFrame::new(vec![
            Series::new("id".into(), vec![user.id.clone()]).into(),
            Series::new("username".into(), vec![user.username.clone()]).into(),
            Series::new("password_hash".into(), vec![user.password_hash.clone()]).into(),
            Series::new("google_id".into(), vec![user.google_id.clone()]).into(),
            Series::new("secret".into(), vec![user.secret.clone()]).into(),
            Series::new("created_at".into(), vec![user.created_at]).into(),
        ])?;
        Ok(df)
    }

    fn read_users(&self) -> Result<DataFrame> {
        let path = self.users_path();
        if !path.exists() {
            return Ok(Self::mk_schema_df());
        }
        let file = std::fs::File::open(&path)
            .map_err(|e| AppError::store("users_open_failed", e.to_string()))?;
        let df = ParquetReader::new(file)
            .finish()
            .map_err(|e| AppError::store("users_read_failed", e.to_string()))?;
        Ok(df)
    }

    fn write_users(&self, mut df: DataFrame) -> Result<()> {
        let path = self.users_path();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).ok();
        }
        let mut f = std::fs::File::create(&path)
            .map_err(|e| AppError::store("users_create_failed", e.to_string()))?;
        ParquetWriter::new(&mut f)
            .finish(&mut df)
            .map_err(|e| AppError::store("users_write_failed", e.to_string()))?;
        Ok(())
    }

    fn opt_str(av: AnyValue) -> Option<String> {
        match av {
            AnyValue::String(s) => Some(s.to_string()),
            AnyValue::StringOwned(s) => Some(s.to_string()),
            _ => None,
        }
    }

    fn user_from_row(df: &DataFrame, i: usize) -> Result<User> {
        let id = Self::opt_str(df.column("id")?.get(i)?).context("user row missing id")?;
        let username = Self::opt_str(df.column("username")?.get(i)?);
        let password_hash = Self::opt_str(df.column("password_hash")?.get(i)?);
        let google_id = Self::opt_str(df.column("google_id")?.get(i)?);
        let secret = Self::opt_str(df.column("secret")?.get(i)?);
        let created_at = df.column("created_at")?.i64()?.get(i).unwrap_or(0);
        Ok(User { id, username, password_hash, google_id, secret, created_at })
    }

    fn find_row(df: &DataFrame, column: &str, needle: &str) -> Result<Option<usize>> {
        for i in 0..df.height() {
            let av = df.column(column)?.get(i)?;
            let matches = match av {
                AnyValue::String(s) => s == needle,
                AnyValue::StringOwned(ref s) => s.as_str() == needle,
                _ => false,
            };
            if matches {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    fn new_user_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    /// Persist a new local-account user. The username must not already be
    /// taken; the caller holds the store lock, so at most one record per
    /// username can ever be written.
    pub fn insert_local_user(&self, username: &str, password_hash: &str) -> Result<User> {
        let df = self.read_users()?;
        if Self::find_row(&df, "username", username)?.is_some() {
            return Err(AppError::duplicate_user(format!("username '{}' is already registered", username)).into());
        }
        let user = User {
            id: Self::new_user_id(),
            username: Some(username.to_string()),
            password_hash: Some(password_hash.to_string()),
            google_id: None,
            secret: None,
            created_at: Self::now_ms(),
        };
        let new = Self::row_df(&user)?;
        if df.height() == 0 {
            self.write_users(new)?;
        } else {
            let stacked = df.vstack(&new)?;
            self.write_users(stacked)?;
        }
        debug!(target: "confide::storage", "insert_local_user: username='{}' id={}", username, user.id);
        Ok(user)
    }

    pub fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        let df = self.read_users()?;
        match Self::find_row(&df, "id", id)? {
            Some(i) => Ok(Some(Self::user_from_row(&df, i)?)),
            None => Ok(None),
        }
    }

    pub fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let df = self.read_users()?;
        match Self::find_row(&df, "username", username)? {
            Some(i) => Ok(Some(Self::user_from_row(&df, i)?)),
            None => Ok(None),
        }
    }

    pub fn find_by_google_id(&self, google_id: &str) -> Result<Option<User>> {
        let df = self.read_users()?;
        match Self::find_row(&df, "google_id", google_id)? {
            Some(i) => Ok(Some(Self::user_from_row(&df, i)?)),
            None => Ok(None),
        }
    }

    /// Look up a federated account by its provider id, creating it on first
    /// sight. Idempotent: repeated calls with the same id return the same
    /// record without duplication.
    pub fn find_or_create_by_google_id(&self, google_id: &str) -> Result<User> {
        let df = self.read_users()?;
        if let Some(i) = Self::find_row(&df, "google_id", google_id)? {
            return Self::user_from_row(&df, i);
        }
        let user = User {
            id: Self::new_user_id(),
            username: None,
            password_hash: None,
            google_id: Some(google_id.to_string()),
            secret: None,
            created_at: Self::now_ms(),
        };
        let new = Self::row_df(&user)?;
        if df.height() == 0 {
            self.write_users(new)?;
        } else {
            let stacked = df.vstack(&new)?;
            self.write_users(stacked)?;
        }
        debug!(target: "confide::storage", "find_or_create: created user id={} for provider id", user.id);
        Ok(user)
    }

    /// Overwrite the secret of a single user. Previous secret is replaced, no
    /// history is kept.
    pub fn set_secret(&self, user_id: &str, secret: &str) -> Result<User> {
        let df = self.read_users()?;
        let Some(i) = Self::find_row(&df, "id", user_id)? else {
            return Err(AppError::not_found("user_not_found", "no such user").into());
        };
        let mut user = Self::user_from_row(&df, i)?;
        user.secret = Some(secret.to_string());

        // Drop the old row and append the updated one
        let id_col = df.column("id")?.clone();
        let mut out = df;
        if let Some(series) = id_col.as_series() {
            let mask: ChunkedArray<BooleanType> = series
                .iter()
                .map(|av| match av {
                    AnyValue::String(s) => s != user_id,
                    AnyValue::StringOwned(ref s) => s.as_str() != user_id,
                    _ => true,
                })
                .collect();
            out = out.filter(&mask)?;
        }
        let updated = Self::row_df(&user)?;
        if out.height() == 0 {
            self.write_users(updated)?;
        } else {
            let stacked = out.vstack(&updated)?;
            self.write_users(stacked)?;
        }
        Ok(user)
    }

    /// All users whose secret is non-null, in store order.
    pub fn users_with_secrets(&self) -> Result<Vec<User>> {
        let df = self.read_users()?;
        let mut out = Vec::new();
        for i in 0..df.height() {
            let user = Self::user_from_row(&df, i)?;
            if user.secret.is_some() {
                out.push(user);
            }
        }
        Ok(out)
    }

    /// Total number of stored user records.
    pub fn user_count(&self) -> Result<usize> {
        Ok(self.read_users()?.height())
    }
}

#[derive(Clone)]
pub struct SharedStore(pub Arc<Mutex<Store>>);

impl SharedStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        Ok(Self(Arc::new(Mutex::new(Store::new(root)?))))
    }

    pub fn root_path(&self) -> PathBuf {
        self.0.lock().root.clone()
    }
}
