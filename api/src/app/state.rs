//! Application state

use std::sync::Arc;

use tracing::info;

use crate::app::options::AppOptions;
use crate::authz::guard::OwnershipGuard;
use crate::messaging::broker::BrokerChannel;
use crate::messaging::consumer::ResultConsumer;
use crate::messaging::publisher::CommandPublisher;
use crate::services::deployments::DeploymentService;
use crate::services::endpoints::EndpointService;
use crate::store::memory::MemoryStore;
use crate::store::{DeploymentRepository, EndpointRepository, UserRepository};

/// Main application state
pub struct AppState {
    pub version: String,

    pub deployments: Arc<dyn DeploymentRepository>,

    pub endpoints: Arc<dyn EndpointRepository>,

    pub users: Arc<dyn UserRepository>,

    /// Publishes worker commands on the shared channel
    pub publisher: Arc<CommandPublisher>,

    /// Applies worker results
    pub consumer: Arc<ResultConsumer>,

    pub deployment_service: Arc<DeploymentService>,

    pub endpoint_service: Arc<EndpointService>,
}

impl AppState {
    /// Wire repositories, publisher, consumer and services around one channel
    pub fn new(
        version: String,
        channel: Arc<dyn BrokerChannel>,
        store: Arc<MemoryStore>,
        options: &AppOptions,
    ) -> Self {
        info!("Initializing application state...");

        let deployments: Arc<dyn DeploymentRepository> = store.clone();
        let endpoints: Arc<dyn EndpointRepository> = store.clone();
        let users: Arc<dyn UserRepository> = store;

        let guard = Arc::new(OwnershipGuard::new(deployments.clone(), endpoints.clone()));
        let publisher = Arc::new(CommandPublisher::new(channel));
        let consumer = Arc::new(ResultConsumer::new(
            deployments.clone(),
            options.consumer.clone(),
        ));

        let deployment_service = Arc::new(DeploymentService::new(
            deployments.clone(),
            guard.clone(),
            publisher.clone(),
            options.commands.clone(),
        ));
        let endpoint_service = Arc::new(EndpointService::new(endpoints.clone(), guard));

        Self {
            version,
            deployments,
            endpoints,
            users,
            publisher,
            consumer,
            deployment_service,
            endpoint_service,
        }
    }
}
