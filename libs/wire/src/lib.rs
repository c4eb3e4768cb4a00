//! Blacktree wire definitions
//!
//! Broker topology names and the JSON messages exchanged between the API and
//! the deployment workers.

pub mod commands;
pub mod results;
pub mod topology;

pub use commands::{BuildCommand, Command, CommandKind, TargetCommand};
pub use results::ResultMessage;
