//! Domain models

pub mod deployment;
pub mod endpoint;
pub mod user;
