use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::models::{Department, NewSubmission, NewUser, SubmissionRecord, User};
use crate::permissions::{PermissionMatrix, PermissionPolicy};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("record already exists: {0}")]
    Conflict(String),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Append-only log of survey submissions.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn list_submissions(&self) -> Result<Vec<SubmissionRecord>, StoreError>;
    async fn append(&self, submission: NewSubmission) -> Result<SubmissionRecord, StoreError>;
}

#[async_trait]
pub trait DepartmentCatalog: Send + Sync {
    async fn list_departments(&self) -> Result<Vec<Department>, StoreError>;
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn permission_matrix(&self) -> Result<PermissionMatrix, StoreError>;
    async fn save_permission_matrix(&self, matrix: &PermissionMatrix) -> Result<(), StoreError>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError>;
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;
    async fn add_user(&self, user: NewUser) -> Result<User, StoreError>;
    async fn remove_user(&self, username: &str) -> Result<(), StoreError>;
}

/// Everything a read command needs, captured once so every aggregate in a
/// run sees the same data.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub submissions: Vec<SubmissionRecord>,
    pub departments: Vec<Department>,
}

pub async fn load_snapshot<S>(store: &S) -> Result<Snapshot, StoreError>
where
    S: SubmissionStore + DepartmentCatalog + ?Sized,
{
    Ok(Snapshot {
        submissions: store.list_submissions().await?,
        departments: store.list_departments().await?,
    })
}

/// In-process store used by tests and for analysing CSV exports offline.
#[derive(Debug)]
pub struct MemoryStore {
    departments: Vec<Department>,
    submissions: Mutex<Vec<SubmissionRecord>>,
    permissions: Mutex<PermissionMatrix>,
    users: Mutex<Vec<User>>,
    next_submission_id: AtomicI64,
    next_user_id: AtomicI64,
}

impl MemoryStore {
    pub fn new(departments: Vec<Department>, policy: PermissionPolicy) -> Self {
        let permissions = PermissionMatrix::with_policy(&departments, policy);
        Self {
            departments,
            submissions: Mutex::new(Vec::new()),
            permissions: Mutex::new(permissions),
            users: Mutex::new(Vec::new()),
            next_submission_id: AtomicI64::new(1),
            next_user_id: AtomicI64::new(1),
        }
    }

    pub fn with_submissions(mut self, submissions: Vec<SubmissionRecord>) -> Self {
        *self.next_submission_id.get_mut() =
            submissions.iter().map(|record| record.id).max().unwrap_or(0) + 1;
        *self
            .submissions
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner) = submissions;
        self
    }

    /// Loads a submissions CSV export. Rows whose timestamp does not parse as
    /// RFC 3339 are skipped.
    pub fn from_csv(
        path: &Path,
        departments: Vec<Department>,
        policy: PermissionPolicy,
    ) -> anyhow::Result<Self> {
        let submissions = read_submissions_csv(path)?;
        Ok(Self::new(departments, policy).with_submissions(submissions))
    }

    fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
        mutex
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

#[derive(Debug, serde::Deserialize)]
pub(crate) struct SubmissionCsvRow {
    pub(crate) id: Option<i64>,
    pub(crate) user_id: i64,
    pub(crate) from_department_id: i32,
    pub(crate) to_department_id: i32,
    pub(crate) q1: i16,
    pub(crate) q2: i16,
    pub(crate) q3: i16,
    pub(crate) q4: i16,
    pub(crate) q5: i16,
    pub(crate) remark: Option<String>,
    pub(crate) timestamp: String,
    pub(crate) source_key: Option<String>,
}

impl SubmissionCsvRow {
    pub(crate) fn parse_timestamp(&self) -> Option<DateTime<Utc>> {
        match DateTime::parse_from_rfc3339(self.timestamp.trim()) {
            Ok(parsed) => Some(parsed.with_timezone(&Utc)),
            Err(err) => {
                warn!(
                    timestamp = %self.timestamp,
                    error = %err,
                    "skipping submission row with unparseable timestamp"
                );
                None
            }
        }
    }

    pub(crate) fn into_new_submission(self, timestamp: DateTime<Utc>) -> NewSubmission {
        NewSubmission {
            user_id: self.user_id,
            from_department_id: self.from_department_id,
            to_department_id: self.to_department_id,
            answers: [self.q1, self.q2, self.q3, self.q4, self.q5],
            remark: self.remark.filter(|remark| !remark.trim().is_empty()),
            timestamp,
        }
    }
}

/// Rows without an `id` are numbered after the largest explicit id in the
/// file, so ids stay unique. A repeated explicit id is an error.
fn read_submissions_csv(path: &Path) -> anyhow::Result<Vec<SubmissionRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    let mut seen = HashSet::new();

    for result in reader.deserialize::<SubmissionCsvRow>() {
        let row = result?;
        let Some(timestamp) = row.parse_timestamp() else {
            continue;
        };
        if let Some(id) = row.id {
            if !seen.insert(id) {
                anyhow::bail!("submission id {id} appears more than once in {}", path.display());
            }
        }
        rows.push((row, timestamp));
    }

    let mut next_id = seen.iter().copied().max().unwrap_or(0);
    Ok(rows
        .into_iter()
        .map(|(row, timestamp)| {
            let id = row.id.unwrap_or_else(|| {
                next_id += 1;
                next_id
            });
            row.into_new_submission(timestamp).into_record(id)
        })
        .collect())
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn list_submissions(&self) -> Result<Vec<SubmissionRecord>, StoreError> {
        Ok(Self::lock(&self.submissions)?.clone())
    }

    async fn append(&self, submission: NewSubmission) -> Result<SubmissionRecord, StoreError> {
        let id = self.next_submission_id.fetch_add(1, Ordering::SeqCst);
        let record = submission.into_record(id);
        Self::lock(&self.submissions)?.push(record.clone());
        Ok(record)
    }
}

#[async_trait]
impl DepartmentCatalog for MemoryStore {
    async fn list_departments(&self) -> Result<Vec<Department>, StoreError> {
        Ok(self.departments.clone())
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn permission_matrix(&self) -> Result<PermissionMatrix, StoreError> {
        Ok(Self::lock(&self.permissions)?.clone())
    }

    async fn save_permission_matrix(&self, matrix: &PermissionMatrix) -> Result<(), StoreError> {
        *Self::lock(&self.permissions)? = matrix.clone();
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(Self::lock(&self.users)?
            .iter()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        Ok(Self::lock(&self.users)?.clone())
    }

    async fn add_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut users = Self::lock(&self.users)?;
        if users.iter().any(|existing| existing.username == user.username) {
            return Err(StoreError::Conflict(user.username));
        }

        let created = User {
            id: self.next_user_id.fetch_add(1, Ordering::SeqCst),
            username: user.username,
            department_id: user.department_id,
            is_admin: user.is_admin,
        };
        users.push(created.clone());
        Ok(created)
    }

    async fn remove_user(&self, username: &str) -> Result<(), StoreError> {
        let mut users = Self::lock(&self.users)?;
        let before = users.len();
        users.retain(|user| user.username != username);
        if users.len() == before {
            return Err(StoreError::NotFound(username.to_string()));
        }
        Ok(())
    }
}
