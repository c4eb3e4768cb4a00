//! Blacktree API Library
//!
//! Messaging core of the Blacktree API: worker commands, worker results,
//! the deployment status machine and ownership checks.

pub mod app;
pub mod authz;
pub mod config;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod messaging;
pub mod models;
pub mod server;
pub mod services;
pub mod store;
pub mod utils;
pub mod workers;
