use crate::models::User;
use crate::store::{StoreError, UserDirectory};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("unknown user '{0}'")]
    UnknownUser(String),
    #[error("user '{0}' is not an administrator")]
    NotAdmin(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The acting user for one command. Passed explicitly to every operation
/// that needs to know who is asking.
#[derive(Debug, Clone)]
pub struct Session {
    user: User,
}

impl Session {
    pub fn new(user: User) -> Self {
        Self { user }
    }

    /// Resolves a session by username. There is no credential check.
    pub async fn login<D>(directory: &D, username: &str) -> Result<Self, SessionError>
    where
        D: UserDirectory + ?Sized,
    {
        let user = directory
            .find_user(username.trim())
            .await?
            .ok_or_else(|| SessionError::UnknownUser(username.to_string()))?;
        tracing::debug!(username = %user.username, "session opened");
        Ok(Self::new(user))
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn department_id(&self) -> i32 {
        self.user.department_id
    }

    pub fn require_admin(&self) -> Result<&User, SessionError> {
        if self.user.is_admin {
            Ok(&self.user)
        } else {
            Err(SessionError::NotAdmin(self.user.username.clone()))
        }
    }
}
