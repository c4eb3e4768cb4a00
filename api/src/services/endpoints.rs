//! Endpoint operations, all guarded through the owning deployment

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::authz::guard::{OwnershipGuard, Principal, ResourceRef};
use crate::errors::ApiError;
use crate::models::endpoint::{Endpoint, EndpointPatch, NewEndpoint};
use crate::store::EndpointRepository;

pub struct EndpointService {
    endpoints: Arc<dyn EndpointRepository>,
    guard: Arc<OwnershipGuard>,
}

impl EndpointService {
    pub fn new(endpoints: Arc<dyn EndpointRepository>, guard: Arc<OwnershipGuard>) -> Self {
        Self { endpoints, guard }
    }

    pub async fn create_endpoint(
        &self,
        principal: &Principal,
        deployment_id: Uuid,
        new: NewEndpoint,
    ) -> Result<Endpoint, ApiError> {
        self.guard
            .authorize_deployment_access(principal, ResourceRef::Deployment(deployment_id))
            .await?;

        let endpoint = self.endpoints.save(Endpoint::new(deployment_id, new)?).await?;
        info!(
            "Created endpoint {} {:?} {} on deployment {}",
            endpoint.id, endpoint.method, endpoint.route, deployment_id
        );
        Ok(endpoint)
    }

    pub async fn update_endpoint(
        &self,
        principal: &Principal,
        endpoint_id: Uuid,
        patch: EndpointPatch,
    ) -> Result<Endpoint, ApiError> {
        let grant = self
            .guard
            .authorize_deployment_access(principal, ResourceRef::Endpoint(endpoint_id))
            .await?;
        let mut endpoint = grant
            .endpoint
            .ok_or_else(|| ApiError::NotFound(format!("endpoint {endpoint_id} not found")))?;

        endpoint.apply_patch(patch)?;
        self.endpoints.save(endpoint).await
    }

    pub async fn delete_endpoint(
        &self,
        principal: &Principal,
        endpoint_id: Uuid,
    ) -> Result<(), ApiError> {
        self.guard
            .authorize_deployment_access(principal, ResourceRef::Endpoint(endpoint_id))
            .await?;

        if !self.endpoints.delete(endpoint_id).await? {
            return Err(ApiError::NotFound(format!("endpoint {endpoint_id} not found")));
        }
        info!("Deleted endpoint {}", endpoint_id);
        Ok(())
    }

    pub async fn list_endpoints(
        &self,
        principal: &Principal,
        deployment_id: Uuid,
    ) -> Result<Vec<Endpoint>, ApiError> {
        self.guard
            .authorize_deployment_access(principal, ResourceRef::Deployment(deployment_id))
            .await?;
        self.endpoints.list_by_deployment(deployment_id).await
    }
}
