use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{info, warn};
use uuid::Uuid;

use crate::catalog::default_departments;
use crate::config::AppConfig;
use crate::models::{Department, NewSubmission, NewUser, SubmissionRecord, User};
use crate::permissions::PermissionMatrix;
use crate::store::{
    DepartmentCatalog, PermissionStore, StoreError, SubmissionCsvRow, SubmissionStore,
    UserDirectory,
};

const SUBMISSION_COLUMNS: &str = "id, user_id, from_department_id, to_department_id, \
     q1, q2, q3, q4, q5, remark, submitted_at";

pub async fn connect(config: &AppConfig) -> anyhow::Result<PgStore> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(config.database_url()?)
        .await
        .context("failed to connect to Postgres")?;
    Ok(PgStore::new(pool))
}

/// Postgres-backed implementation of every storage port.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn init_db(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Loads the department catalog, the demo users and, when the matrix is
    /// still empty, the configured default permissions. Safe to re-run.
    pub async fn seed(&self, config: &AppConfig) -> anyhow::Result<()> {
        let departments = default_departments();
        for department in departments.iter() {
            sqlx::query(
                r#"
                INSERT INTO cross_survey.departments (id, name)
                VALUES ($1, $2)
                ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
                "#,
            )
            .bind(department.id)
            .bind(&department.name)
            .execute(&self.pool)
            .await?;
        }

        let users = [("admin", 1, true), ("hr_user", 2, false), ("it_user", 3, false)];
        for (username, department_id, is_admin) in users {
            sqlx::query(
                r#"
                INSERT INTO cross_survey.users (username, department_id, is_admin)
                VALUES ($1, $2, $3)
                ON CONFLICT (username) DO UPDATE
                SET department_id = EXCLUDED.department_id, is_admin = EXCLUDED.is_admin
                "#,
            )
            .bind(username)
            .bind(department_id)
            .bind(is_admin)
            .execute(&self.pool)
            .await?;
        }

        if self.permission_matrix().await?.is_empty() {
            let matrix = PermissionMatrix::with_policy(&departments, config.default_permission);
            self.save_permission_matrix(&matrix).await?;
            info!(
                policy = %config.default_permission,
                pairs = matrix.len(),
                "seeded permission matrix"
            );
        }

        Ok(())
    }

    /// Imports a submissions CSV. Rows are keyed by `source_key` so the same
    /// export can be imported twice without duplicates.
    pub async fn import_csv(&self, csv_path: &Path) -> anyhow::Result<usize> {
        let mut reader = csv::Reader::from_path(csv_path)?;
        let mut inserted = 0usize;

        for result in reader.deserialize::<SubmissionCsvRow>() {
            let row = result?;
            let Some(timestamp) = row.parse_timestamp() else {
                continue;
            };

            let source_key = row
                .source_key
                .clone()
                .filter(|key| !key.trim().is_empty())
                .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));
            let submission = row.into_new_submission(timestamp);

            if let Some(question) = submission
                .answers
                .iter()
                .position(|value| !(1..=5).contains(value))
            {
                warn!(
                    source_key = %source_key,
                    question = question + 1,
                    "importing submission with out-of-range answer; it will be ignored by analytics"
                );
            }

            if self.insert_submission(&submission, &source_key).await?.is_some() {
                inserted += 1;
            }
        }

        Ok(inserted)
    }

    async fn insert_submission(
        &self,
        submission: &NewSubmission,
        source_key: &str,
    ) -> Result<Option<SubmissionRecord>, StoreError> {
        let [q1, q2, q3, q4, q5] = submission.answers;
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO cross_survey.submissions
            (user_id, from_department_id, to_department_id, q1, q2, q3, q4, q5,
             remark, submitted_at, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (source_key) DO NOTHING
            RETURNING {SUBMISSION_COLUMNS}
            "#
        ))
        .bind(submission.user_id)
        .bind(submission.from_department_id)
        .bind(submission.to_department_id)
        .bind(q1)
        .bind(q2)
        .bind(q3)
        .bind(q4)
        .bind(q5)
        .bind(&submission.remark)
        .bind(submission.timestamp)
        .bind(source_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(submission_from_row))
    }
}

fn submission_from_row(row: &PgRow) -> SubmissionRecord {
    SubmissionRecord {
        id: row.get("id"),
        user_id: row.get("user_id"),
        from_department_id: row.get("from_department_id"),
        to_department_id: row.get("to_department_id"),
        q1: row.get("q1"),
        q2: row.get("q2"),
        q3: row.get("q3"),
        q4: row.get("q4"),
        q5: row.get("q5"),
        remark: row.get("remark"),
        timestamp: row.get("submitted_at"),
    }
}

fn user_from_row(row: &PgRow) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        department_id: row.get("department_id"),
        is_admin: row.get("is_admin"),
    }
}

#[async_trait]
impl SubmissionStore for PgStore {
    async fn list_submissions(&self) -> Result<Vec<SubmissionRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {SUBMISSION_COLUMNS} FROM cross_survey.submissions ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(submission_from_row).collect())
    }

    async fn append(&self, submission: NewSubmission) -> Result<SubmissionRecord, StoreError> {
        let source_key = format!("survey-{}", Uuid::new_v4());
        self.insert_submission(&submission, &source_key)
            .await?
            .ok_or(StoreError::Conflict(source_key))
    }
}

#[async_trait]
impl DepartmentCatalog for PgStore {
    async fn list_departments(&self) -> Result<Vec<Department>, StoreError> {
        let rows = sqlx::query("SELECT id, name FROM cross_survey.departments ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| Department {
                id: row.get("id"),
                name: row.get("name"),
            })
            .collect())
    }
}

#[async_trait]
impl PermissionStore for PgStore {
    async fn permission_matrix(&self) -> Result<PermissionMatrix, StoreError> {
        let rows = sqlx::query(
            "SELECT from_department_id, to_department_id FROM cross_survey.permissions",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(PermissionMatrix::from_pairs(rows.iter().map(|row| {
            (
                row.get::<i32, _>("from_department_id"),
                row.get::<i32, _>("to_department_id"),
            )
        })))
    }

    async fn save_permission_matrix(&self, matrix: &PermissionMatrix) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM cross_survey.permissions")
            .execute(&mut *tx)
            .await?;

        for (from, to) in matrix.pairs() {
            sqlx::query(
                r#"
                INSERT INTO cross_survey.permissions (from_department_id, to_department_id)
                VALUES ($1, $2)
                "#,
            )
            .bind(from)
            .bind(to)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(
            "SELECT id, username, department_id, is_admin FROM cross_survey.users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, username, department_id, is_admin FROM cross_survey.users ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(user_from_row).collect())
    }

    async fn add_user(&self, user: NewUser) -> Result<User, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO cross_survey.users (username, department_id, is_admin)
            VALUES ($1, $2, $3)
            ON CONFLICT (username) DO NOTHING
            RETURNING id, username, department_id, is_admin
            "#,
        )
        .bind(&user.username)
        .bind(user.department_id)
        .bind(user.is_admin)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref()
            .map(user_from_row)
            .ok_or(StoreError::Conflict(user.username))
    }

    async fn remove_user(&self, username: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM cross_survey.users WHERE username = $1")
            .bind(username)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(username.to_string()));
        }
        Ok(())
    }
}
