use crate::{CoreError, ProjectId, UserId};
use async_trait::async_trait;

/// Project membership, resolved outside the scheduler.
#[async_trait]
pub trait AccessControl: Send + Sync {
    async fn has_access(&self, user_id: UserId, project_id: ProjectId) -> Result<bool, CoreError>;
    async fn grant(&self, user_id: UserId, project_id: ProjectId) -> Result<(), CoreError>;
}
