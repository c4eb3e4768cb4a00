//! Deployment operations for the HTTP layer

use std::sync::Arc;

use blacktree_wire::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::authz::guard::{OwnershipGuard, Principal, ResourceRef};
use crate::deploy::fsm::DeploymentStatus;
use crate::errors::ApiError;
use crate::messaging::publisher::{build_command, CommandPublisher, PublishReceipt};
use crate::models::deployment::{Deployment, DeploymentPatch, NewDeployment};
use crate::store::DeploymentRepository;

/// Options for issuing worker commands
#[derive(Debug, Clone)]
pub struct CommandOptions {
    /// Mark the deployment BUILDING as soon as a build or trigger is accepted
    /// by the broker, ahead of the worker's own report
    pub optimistic_building: bool,
}

impl Default for CommandOptions {
    fn default() -> Self {
        Self {
            optimistic_building: true,
        }
    }
}

pub struct DeploymentService {
    deployments: Arc<dyn DeploymentRepository>,
    guard: Arc<OwnershipGuard>,
    publisher: Arc<CommandPublisher>,
    options: CommandOptions,
}

impl DeploymentService {
    pub fn new(
        deployments: Arc<dyn DeploymentRepository>,
        guard: Arc<OwnershipGuard>,
        publisher: Arc<CommandPublisher>,
        options: CommandOptions,
    ) -> Self {
        Self {
            deployments,
            guard,
            publisher,
            options,
        }
    }

    /// Register a deployment owned by `principal`, starting in PENDING
    pub async fn create_deployment(
        &self,
        principal: &Principal,
        new: NewDeployment,
    ) -> Result<Deployment, ApiError> {
        new.validate()?;
        self.ensure_unique(new.branch(), &new.repository, None).await?;

        let deployment = self
            .deployments
            .save(Deployment::new(principal.user_id, new))
            .await?;
        info!(
            "Created deployment {} ({} on {}) for user {}",
            deployment.id, deployment.repository, deployment.branch, principal.user_id
        );
        Ok(deployment)
    }

    pub async fn list_deployments(&self, principal: &Principal) -> Result<Vec<Deployment>, ApiError> {
        self.deployments.list_by_owner(principal.user_id).await
    }

    pub async fn deployment_info(
        &self,
        principal: &Principal,
        deployment_id: Uuid,
    ) -> Result<Deployment, ApiError> {
        let grant = self
            .guard
            .authorize_deployment_access(principal, ResourceRef::Deployment(deployment_id))
            .await?;
        Ok(grant.deployment)
    }

    /// Merge `patch` into the stored deployment and save it. The status is
    /// never touched here.
    pub async fn update_deployment(
        &self,
        principal: &Principal,
        deployment_id: Uuid,
        patch: DeploymentPatch,
    ) -> Result<Deployment, ApiError> {
        let mut deployment = self
            .guard
            .authorize_deployment_access(principal, ResourceRef::Deployment(deployment_id))
            .await?
            .deployment;

        let source_changed = patch.branch.as_ref().is_some_and(|b| *b != deployment.branch)
            || patch
                .repository
                .as_ref()
                .is_some_and(|r| *r != deployment.repository);

        deployment.apply_patch(patch)?;
        if source_changed {
            self.ensure_unique(&deployment.branch, &deployment.repository, Some(deployment.id))
                .await?;
        }

        let deployment = self.deployments.save(deployment).await?;
        debug!("Updated deployment {} (revision {})", deployment.id, deployment.revision);
        Ok(deployment)
    }

    /// Delete the deployment record and its endpoints
    pub async fn delete_deployment(
        &self,
        principal: &Principal,
        deployment_id: Uuid,
    ) -> Result<(), ApiError> {
        self.guard
            .authorize_deployment_access(principal, ResourceRef::Deployment(deployment_id))
            .await?;

        if !self.deployments.delete(deployment_id).await? {
            return Err(ApiError::NotFound(format!("deployment {deployment_id} not found")));
        }
        info!("Deleted deployment {}", deployment_id);
        Ok(())
    }

    /// Ask a worker to clone and build the deployment
    pub async fn build(
        &self,
        principal: &Principal,
        deployment_id: Uuid,
    ) -> Result<PublishReceipt, ApiError> {
        self.guard
            .authorize_deployment_access(principal, ResourceRef::Deployment(deployment_id))
            .await?;

        let found = self.deployments.find_with_owner_by_id(deployment_id).await?;
        let Some((deployment, owner)) = found else {
            return Err(self.missing_owner(deployment_id).await);
        };

        let command = build_command(&deployment, &owner)?;
        let receipt = self.publisher.publish(&command).await?;
        self.mark_building(deployment).await;
        Ok(receipt)
    }

    /// Ask a worker to redeploy from the latest source
    pub async fn trigger(
        &self,
        principal: &Principal,
        deployment_id: Uuid,
    ) -> Result<PublishReceipt, ApiError> {
        let deployment = self
            .guard
            .authorize_deployment_access(principal, ResourceRef::Deployment(deployment_id))
            .await?
            .deployment;

        let receipt = self
            .publisher
            .publish(&Command::trigger(deployment_id))
            .await?;
        self.mark_building(deployment).await;
        Ok(receipt)
    }

    pub async fn stop(
        &self,
        principal: &Principal,
        deployment_id: Uuid,
    ) -> Result<PublishReceipt, ApiError> {
        self.issue(principal, deployment_id, Command::stop(deployment_id))
            .await
    }

    /// Ask a worker to tear the deployment down; the record stays until the
    /// worker reports `deleted`
    pub async fn remove_from_worker(
        &self,
        principal: &Principal,
        deployment_id: Uuid,
    ) -> Result<PublishReceipt, ApiError> {
        self.issue(principal, deployment_id, Command::delete(deployment_id))
            .await
    }

    async fn issue(
        &self,
        principal: &Principal,
        deployment_id: Uuid,
        command: Command,
    ) -> Result<PublishReceipt, ApiError> {
        self.guard
            .authorize_deployment_access(principal, ResourceRef::Deployment(deployment_id))
            .await?;
        self.publisher.publish(&command).await
    }

    async fn ensure_unique(
        &self,
        branch: &str,
        repository: &str,
        own_id: Option<Uuid>,
    ) -> Result<(), ApiError> {
        match self
            .deployments
            .find_by_branch_and_repository(branch, repository)
            .await?
        {
            Some(existing) if Some(existing.id) != own_id => Err(ApiError::Conflict(format!(
                "a deployment of {repository} on branch {branch} already exists"
            ))),
            _ => Ok(()),
        }
    }

    /// Error for a deployment whose owner row could not be joined
    async fn missing_owner(&self, deployment_id: Uuid) -> ApiError {
        match self.deployments.find_by_id(deployment_id).await {
            Ok(Some(deployment)) => ApiError::Internal(format!(
                "owner {} of deployment {} not found",
                deployment.owner_id, deployment_id
            )),
            Ok(None) => ApiError::NotFound(format!("deployment {deployment_id} not found")),
            Err(e) => e,
        }
    }

    /// Best-effort BUILDING pre-set after a build or trigger was accepted.
    ///
    /// `snapshot` is the copy read before publishing; a result saved while the
    /// publish was in flight fails its revision check and wins.
    async fn mark_building(&self, mut snapshot: Deployment) {
        if !self.options.optimistic_building || !snapshot.status.accepts_optimistic_building() {
            return;
        }

        let deployment_id = snapshot.id;
        snapshot.status = DeploymentStatus::Building;
        match self.deployments.save(snapshot).await {
            Ok(_) => debug!("Marked deployment {} BUILDING", deployment_id),
            Err(ApiError::TransientStorage(_) | ApiError::NotFound(_)) => {
                debug!(
                    "Deployment {} changed while the command was in flight; keeping its status",
                    deployment_id
                );
            }
            Err(e) => warn!("Failed to mark deployment {} BUILDING: {}", deployment_id, e),
        }
    }
}
