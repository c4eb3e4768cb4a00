pub mod deployments;
pub mod endpoints;
