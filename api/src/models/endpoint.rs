//! Endpoint models

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ApiError;

/// HTTP method exposed by an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EndpointMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

/// A documented route of a deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub id: Uuid,
    pub route: String,
    pub method: EndpointMethod,
    pub description: Option<String>,
    pub deployment_id: Uuid,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEndpoint {
    pub route: String,
    #[serde(default)]
    pub method: EndpointMethod,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointPatch {
    pub route: Option<String>,
    pub method: Option<EndpointMethod>,
    pub description: Option<String>,
}

impl Endpoint {
    pub fn new(deployment_id: Uuid, new: NewEndpoint) -> Result<Self, ApiError> {
        validate_route(&new.route)?;
        Ok(Self {
            id: Uuid::new_v4(),
            route: new.route,
            method: new.method,
            description: new.description,
            deployment_id,
        })
    }

    pub fn apply_patch(&mut self, patch: EndpointPatch) -> Result<(), ApiError> {
        if let Some(route) = patch.route {
            validate_route(&route)?;
            self.route = route;
        }
        if let Some(method) = patch.method {
            self.method = method;
        }
        if let Some(description) = patch.description {
            self.description = Some(description);
        }
        Ok(())
    }
}

fn validate_route(route: &str) -> Result<(), ApiError> {
    if route.trim().is_empty() {
        return Err(ApiError::ValidationError("route must not be empty".to_string()));
    }
    Ok(())
}
