//! Repository interfaces for deployment, endpoint and user rows
//!
//! Row persistence lives outside the messaging core; these traits are the seam.
//! `save` implementations must reject a record whose `revision` no longer
//! matches the stored one with [`ApiError::TransientStorage`], so concurrent
//! read-merge-save writers never lose updates silently.

pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::ApiError;
use crate::models::deployment::Deployment;
use crate::models::endpoint::Endpoint;
use crate::models::user::User;

#[async_trait]
pub trait DeploymentRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Deployment>, ApiError>;

    async fn find_by_branch_and_repository(
        &self,
        branch: &str,
        repository: &str,
    ) -> Result<Option<Deployment>, ApiError>;

    /// Deployment together with its owner (and the owner's credential)
    async fn find_with_owner_by_id(&self, id: Uuid) -> Result<Option<(Deployment, User)>, ApiError>;

    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Deployment>, ApiError>;

    /// Insert or update; returns the stored record with its new revision
    async fn save(&self, deployment: Deployment) -> Result<Deployment, ApiError>;

    /// Delete the deployment and its endpoints; `false` when nothing was deleted
    async fn delete(&self, id: Uuid) -> Result<bool, ApiError>;
}

#[async_trait]
pub trait EndpointRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Endpoint>, ApiError>;

    /// Endpoint with its parent deployment and that deployment's owner
    async fn find_by_id_with_deployment_and_owner(
        &self,
        id: Uuid,
    ) -> Result<Option<(Endpoint, Deployment, User)>, ApiError>;

    async fn list_by_deployment(&self, deployment_id: Uuid) -> Result<Vec<Endpoint>, ApiError>;

    async fn save(&self, endpoint: Endpoint) -> Result<Endpoint, ApiError>;

    async fn delete(&self, id: Uuid) -> Result<bool, ApiError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, ApiError>;

    async fn save(&self, user: User) -> Result<User, ApiError>;
}
