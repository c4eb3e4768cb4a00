//! Ownership checks run before any mutating operation

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::ApiError;
use crate::models::deployment::Deployment;
use crate::models::endpoint::Endpoint;
use crate::store::{DeploymentRepository, EndpointRepository};

/// Authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
}

impl Principal {
    pub fn new(user_id: Uuid) -> Self {
        Self { user_id }
    }
}

/// Resource the caller wants to act on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceRef {
    Deployment(Uuid),

    /// Resolved to its parent deployment before the owner check
    Endpoint(Uuid),
}

/// Successful authorization with the resolved records
#[derive(Debug, Clone)]
pub struct AccessGrant {
    pub deployment: Deployment,
    pub endpoint: Option<Endpoint>,
}

pub struct OwnershipGuard {
    deployments: Arc<dyn DeploymentRepository>,
    endpoints: Arc<dyn EndpointRepository>,
}

impl OwnershipGuard {
    pub fn new(
        deployments: Arc<dyn DeploymentRepository>,
        endpoints: Arc<dyn EndpointRepository>,
    ) -> Self {
        Self {
            deployments,
            endpoints,
        }
    }

    /// Allow `principal` to act on `resource` only if it owns the deployment
    /// behind it. A missing resource is `NotFound`, a foreign one `Forbidden`.
    pub async fn authorize_deployment_access(
        &self,
        principal: &Principal,
        resource: ResourceRef,
    ) -> Result<AccessGrant, ApiError> {
        let grant = match resource {
            ResourceRef::Deployment(id) => {
                let deployment = self
                    .deployments
                    .find_by_id(id)
                    .await?
                    .ok_or_else(|| ApiError::NotFound(format!("deployment {id} not found")))?;
                AccessGrant {
                    deployment,
                    endpoint: None,
                }
            }
            ResourceRef::Endpoint(id) => {
                let (endpoint, deployment, _owner) = self
                    .endpoints
                    .find_by_id_with_deployment_and_owner(id)
                    .await?
                    .ok_or_else(|| ApiError::NotFound(format!("endpoint {id} not found")))?;
                AccessGrant {
                    deployment,
                    endpoint: Some(endpoint),
                }
            }
        };

        if !grant.deployment.is_owned_by(principal.user_id) {
            warn!(
                "User {} denied access to deployment {}",
                principal.user_id, grant.deployment.id
            );
            return Err(ApiError::Forbidden(format!(
                "deployment {} belongs to another user",
                grant.deployment.id
            )));
        }

        debug!(
            "User {} authorized for deployment {}",
            principal.user_id, grant.deployment.id
        );
        Ok(grant)
    }
}
