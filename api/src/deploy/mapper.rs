//! Worker status token mapping
//!
//! Unknown tokens are an error rather than a silent downgrade to `Pending`.

use blacktree_wire::results::status;

use crate::deploy::fsm::DeploymentStatus;
use crate::errors::ApiError;

/// Map a raw worker status token onto a deployment status.
///
/// Matching is case-insensitive and ignores surrounding whitespace. Besides the
/// worker tokens, canonical status names are accepted, except `pending`, which a
/// worker never reports.
pub fn map_status(raw: &str) -> Result<DeploymentStatus, ApiError> {
    let token = raw.trim().to_ascii_lowercase();
    match token.as_str() {
        status::CLONED => Ok(DeploymentStatus::Cloned),
        status::BUILDING => Ok(DeploymentStatus::Building),
        status::BUILT => Ok(DeploymentStatus::Built),
        status::RUNNING | "ready" => Ok(DeploymentStatus::Ready),
        status::STOPPED => Ok(DeploymentStatus::Stopped),
        status::DELETED => Ok(DeploymentStatus::Deleted),
        _ => Err(ApiError::UnknownStatus(raw.to_string())),
    }
}
