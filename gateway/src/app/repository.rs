//! Principal and workspace persistence.
//!
//! Every query that touches workspaces is scoped by owner; there is no way through this type to
//! read or mutate another principal's records.

use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error as ThisError;

use crate::app::db::DbPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct PrincipalId(pub i64);

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct WorkspaceId(pub i64);

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Durable identity record created on first successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Principal {
    pub id: PrincipalId,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub name: String,
    pub owner: PrincipalId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, ThisError)]
pub enum RepositoryError {
    #[error("{0} already exists")]
    AlreadyExists(&'static str),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("database operation failed")]
    Database(#[from] sqlx::Error),
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

#[derive(Debug, Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// # Errors
    ///
    /// Returns [`RepositoryError::Database`] if the query fails.
    pub async fn find_principal_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Principal>, RepositoryError> {
        Ok(sqlx::query_as::<_, Principal>(
            "SELECT id, email, created_at FROM principals WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// # Errors
    ///
    /// Returns [`RepositoryError::Database`] if the query fails.
    pub async fn find_principal_by_id(
        &self,
        id: PrincipalId,
    ) -> Result<Option<Principal>, RepositoryError> {
        Ok(
            sqlx::query_as::<_, Principal>("SELECT id, email, created_at FROM principals WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    /// Create the principal for `email`, or return the existing one.
    ///
    /// Two concurrent first logins for the same email both end up with the single row that won the
    /// insert.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Database`] if either statement fails.
    #[tracing::instrument(skip(self))]
    pub async fn create_principal(&self, email: &str) -> Result<Principal, RepositoryError> {
        let inserted = sqlx::query(
            "INSERT INTO principals (email, created_at) VALUES (?, ?) ON CONFLICT(email) DO NOTHING",
        )
        .bind(email)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 0 {
            tracing::debug!("principal already present, reusing it");
        }

        self.find_principal_by_email(email)
            .await?
            .ok_or(RepositoryError::NotFound("principal"))
    }

    /// # Errors
    ///
    /// Returns [`RepositoryError::AlreadyExists`] if `owner` already has a workspace with this name.
    #[tracing::instrument(skip(self))]
    pub async fn create_workspace(
        &self,
        name: &str,
        owner: PrincipalId,
    ) -> Result<Workspace, RepositoryError> {
        sqlx::query_as::<_, Workspace>(
            "INSERT INTO workspaces (name, owner, created_at) VALUES (?, ?, ?) \
             RETURNING id, name, owner, created_at",
        )
        .bind(name)
        .bind(owner)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RepositoryError::AlreadyExists("workspace")
            } else {
                RepositoryError::Database(e)
            }
        })
    }

    /// Workspaces of `owner` in creation order.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Database`] if the query fails.
    pub async fn list_workspaces(
        &self,
        owner: PrincipalId,
    ) -> Result<Vec<Workspace>, RepositoryError> {
        Ok(sqlx::query_as::<_, Workspace>(
            "SELECT id, name, owner, created_at FROM workspaces WHERE owner = ? ORDER BY id",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?)
    }

    /// # Errors
    ///
    /// Returns [`RepositoryError::Database`] if the query fails.
    pub async fn find_workspace(
        &self,
        id: WorkspaceId,
        owner: PrincipalId,
    ) -> Result<Option<Workspace>, RepositoryError> {
        Ok(sqlx::query_as::<_, Workspace>(
            "SELECT id, name, owner, created_at FROM workspaces WHERE id = ? AND owner = ?",
        )
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// # Errors
    ///
    /// Returns [`RepositoryError::NotFound`] when no workspace `id` is owned by `owner`, including
    /// when it exists but belongs to someone else.
    #[tracing::instrument(skip(self))]
    pub async fn delete_workspace(
        &self,
        id: WorkspaceId,
        owner: PrincipalId,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM workspaces WHERE id = ? AND owner = ?")
            .bind(id)
            .bind(owner)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound("workspace"));
        }
        Ok(())
    }
}
