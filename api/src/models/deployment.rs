//! Deployment models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::deploy::fsm::DeploymentStatus;
use crate::errors::ApiError;

/// A registered container deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub id: Uuid,

    pub name: String,

    /// Git repository URL
    pub repository: String,

    pub branch: String,

    /// Path to the Dockerfile, relative to the repository root
    pub dockerfile_path: String,

    /// Path to docker-compose.yml (optional)
    pub compose_file_path: Option<String>,

    /// Docker build context directory
    pub context_dir: String,

    /// Port the container listens on
    pub port_number: Option<u16>,

    pub auto_redeploy: bool,

    /// Owning user
    pub owner_id: Uuid,

    /// Current lifecycle status
    pub status: DeploymentStatus,

    /// Incremented on every save, checked to reject lost updates
    pub revision: u64,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when registering a deployment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDeployment {
    pub name: String,
    pub repository: String,
    #[serde(default)]
    pub branch: Option<String>,
    pub dockerfile_path: String,
    #[serde(default)]
    pub compose_file_path: Option<String>,
    #[serde(default)]
    pub context_dir: Option<String>,
    #[serde(default)]
    pub port_number: Option<u16>,
    #[serde(default)]
    pub auto_redeploy: Option<bool>,
}

/// Partial update of a deployment; the status is not editable
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentPatch {
    pub name: Option<String>,
    pub repository: Option<String>,
    pub branch: Option<String>,
    pub dockerfile_path: Option<String>,
    pub compose_file_path: Option<String>,
    pub context_dir: Option<String>,
    pub port_number: Option<u16>,
    pub auto_redeploy: Option<bool>,
}

const DEFAULT_BRANCH: &str = "main";
const DEFAULT_CONTEXT_DIR: &str = ".";

impl NewDeployment {
    /// Check required fields are present
    pub fn validate(&self) -> Result<(), ApiError> {
        require("name", &self.name)?;
        require("repository", &self.repository)?;
        require("dockerFilePath", &self.dockerfile_path)?;
        if let Some(branch) = &self.branch {
            require("branch", branch)?;
        }
        Ok(())
    }

    pub fn branch(&self) -> &str {
        self.branch.as_deref().unwrap_or(DEFAULT_BRANCH)
    }
}

impl Deployment {
    /// Build a pending deployment owned by `owner_id`
    pub fn new(owner_id: Uuid, new: NewDeployment) -> Self {
        let now = Utc::now();
        let branch = new.branch().to_string();
        Self {
            id: Uuid::new_v4(),
            name: new.name,
            repository: new.repository,
            branch,
            dockerfile_path: new.dockerfile_path,
            compose_file_path: new.compose_file_path.filter(|p| !p.trim().is_empty()),
            context_dir: new
                .context_dir
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CONTEXT_DIR.to_string()),
            port_number: new.port_number,
            auto_redeploy: new.auto_redeploy.unwrap_or(true),
            owner_id,
            status: DeploymentStatus::Pending,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge a patch into this deployment
    pub fn apply_patch(&mut self, patch: DeploymentPatch) -> Result<(), ApiError> {
        if let Some(name) = patch.name {
            require("name", &name)?;
            self.name = name;
        }
        if let Some(repository) = patch.repository {
            require("repository", &repository)?;
            self.repository = repository;
        }
        if let Some(branch) = patch.branch {
            require("branch", &branch)?;
            self.branch = branch;
        }
        if let Some(path) = patch.dockerfile_path {
            require("dockerFilePath", &path)?;
            self.dockerfile_path = path;
        }
        if let Some(path) = patch.compose_file_path {
            self.compose_file_path = Some(path).filter(|p| !p.trim().is_empty());
        }
        if let Some(dir) = patch.context_dir {
            require("contextDir", &dir)?;
            self.context_dir = dir;
        }
        if let Some(port) = patch.port_number {
            self.port_number = Some(port);
        }
        if let Some(auto_redeploy) = patch.auto_redeploy {
            self.auto_redeploy = auto_redeploy;
        }
        Ok(())
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.owner_id == user_id
    }
}

fn require(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::ValidationError(format!("{field} must not be empty")));
    }
    Ok(())
}
