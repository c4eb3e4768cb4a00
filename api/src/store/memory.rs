//! In-memory repositories

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::deploy::fsm::DeploymentStatus;
use crate::errors::ApiError;
use crate::models::deployment::Deployment;
use crate::models::endpoint::Endpoint;
use crate::models::user::User;
use crate::store::{DeploymentRepository, EndpointRepository, UserRepository};

#[derive(Default)]
struct Tables {
    deployments: HashMap<Uuid, Deployment>,
    endpoints: HashMap<Uuid, Endpoint>,
    users: HashMap<Uuid, User>,
}

/// In-memory store implementing every repository trait
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored deployments
    pub fn deployment_count(&self) -> usize {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        tables.deployments.len()
    }

    /// Number of stored endpoints
    pub fn endpoint_count(&self) -> usize {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        tables.endpoints.len()
    }
}

fn is_live(deployment: &Deployment) -> bool {
    deployment.status != DeploymentStatus::Deleted
}

#[async_trait]
impl DeploymentRepository for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Deployment>, ApiError> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        Ok(tables.deployments.get(&id).cloned())
    }

    async fn find_by_branch_and_repository(
        &self,
        branch: &str,
        repository: &str,
    ) -> Result<Option<Deployment>, ApiError> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        Ok(tables
            .deployments
            .values()
            .find(|d| is_live(d) && d.branch == branch && d.repository == repository)
            .cloned())
    }

    async fn find_with_owner_by_id(&self, id: Uuid) -> Result<Option<(Deployment, User)>, ApiError> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        let Some(deployment) = tables.deployments.get(&id) else {
            return Ok(None);
        };
        Ok(tables
            .users
            .get(&deployment.owner_id)
            .map(|owner| (deployment.clone(), owner.clone())))
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Deployment>, ApiError> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        let mut deployments: Vec<Deployment> = tables
            .deployments
            .values()
            .filter(|d| d.owner_id == owner_id)
            .cloned()
            .collect();
        deployments.sort_by_key(|d| d.created_at);
        Ok(deployments)
    }

    async fn save(&self, mut deployment: Deployment) -> Result<Deployment, ApiError> {
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());

        match tables.deployments.get(&deployment.id) {
            Some(stored) if stored.revision != deployment.revision => {
                return Err(ApiError::TransientStorage(format!(
                    "deployment {} was modified concurrently (revision {} != {})",
                    deployment.id, deployment.revision, stored.revision
                )));
            }
            // a copy read before the row was deleted must not resurrect it
            None if deployment.revision != 0 => {
                return Err(ApiError::NotFound(format!(
                    "deployment {} not found",
                    deployment.id
                )));
            }
            _ => {}
        }

        if is_live(&deployment) {
            let duplicate = tables.deployments.values().any(|other| {
                other.id != deployment.id
                    && is_live(other)
                    && other.branch == deployment.branch
                    && other.repository == deployment.repository
            });
            if duplicate {
                return Err(ApiError::Conflict(format!(
                    "a deployment of {} on branch {} already exists",
                    deployment.repository, deployment.branch
                )));
            }
        }

        deployment.revision += 1;
        deployment.updated_at = Utc::now();
        tables.deployments.insert(deployment.id, deployment.clone());
        Ok(deployment)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, ApiError> {
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        if tables.deployments.remove(&id).is_none() {
            return Ok(false);
        }
        tables.endpoints.retain(|_, endpoint| endpoint.deployment_id != id);
        Ok(true)
    }
}

#[async_trait]
impl EndpointRepository for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Endpoint>, ApiError> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        Ok(tables.endpoints.get(&id).cloned())
    }

    async fn find_by_id_with_deployment_and_owner(
        &self,
        id: Uuid,
    ) -> Result<Option<(Endpoint, Deployment, User)>, ApiError> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        let Some(endpoint) = tables.endpoints.get(&id) else {
            return Ok(None);
        };
        let Some(deployment) = tables.deployments.get(&endpoint.deployment_id) else {
            return Ok(None);
        };
        Ok(tables
            .users
            .get(&deployment.owner_id)
            .map(|owner| (endpoint.clone(), deployment.clone(), owner.clone())))
    }

    async fn list_by_deployment(&self, deployment_id: Uuid) -> Result<Vec<Endpoint>, ApiError> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        let mut endpoints: Vec<Endpoint> = tables
            .endpoints
            .values()
            .filter(|e| e.deployment_id == deployment_id)
            .cloned()
            .collect();
        endpoints.sort_by(|a, b| a.route.cmp(&b.route));
        Ok(endpoints)
    }

    async fn save(&self, endpoint: Endpoint) -> Result<Endpoint, ApiError> {
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        if !tables.deployments.contains_key(&endpoint.deployment_id) {
            return Err(ApiError::NotFound(format!(
                "deployment {} not found",
                endpoint.deployment_id
            )));
        }
        tables.endpoints.insert(endpoint.id, endpoint.clone());
        Ok(endpoint)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, ApiError> {
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        Ok(tables.endpoints.remove(&id).is_some())
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, ApiError> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        Ok(tables.users.get(&id).cloned())
    }

    async fn save(&self, user: User) -> Result<User, ApiError> {
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }
}
