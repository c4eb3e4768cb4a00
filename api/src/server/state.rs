//! Server state

use std::sync::Arc;

use crate::messaging::consumer::ResultConsumer;

/// Server state shared across handlers
pub struct ServerState {
    pub version: String,
    pub consumer: Arc<ResultConsumer>,
}

impl ServerState {
    pub fn new(version: String, consumer: Arc<ResultConsumer>) -> Self {
        Self { version, consumer }
    }
}
