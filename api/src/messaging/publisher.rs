//! Command publisher

use std::sync::Arc;

use blacktree_wire::topology::{COMMAND_ROUTING_KEY, EXCHANGE};
use blacktree_wire::{BuildCommand, Command, CommandKind};
use chrono::Utc;
use secrecy::ExposeSecret;
use tracing::{error, info};
use uuid::Uuid;

use crate::errors::ApiError;
use crate::messaging::broker::BrokerChannel;
use crate::models::deployment::Deployment;
use crate::models::user::User;

/// Broker acceptance of a published command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub exchange: String,
    pub routing_key: String,
    pub kind: CommandKind,
    pub deployment_id: Uuid,
}

/// Publishes worker commands on the shared broker channel
pub struct CommandPublisher {
    channel: Arc<dyn BrokerChannel>,
}

impl CommandPublisher {
    pub fn new(channel: Arc<dyn BrokerChannel>) -> Self {
        Self { channel }
    }

    /// Publish a command on the worker routing key
    pub async fn publish(&self, command: &Command) -> Result<PublishReceipt, ApiError> {
        self.publish_command(COMMAND_ROUTING_KEY, command).await
    }

    /// Publish a command with an explicit routing key.
    ///
    /// Succeeds once the broker confirmed the message, not when a worker handled it.
    pub async fn publish_command(
        &self,
        routing_key: &str,
        command: &Command,
    ) -> Result<PublishReceipt, ApiError> {
        let payload = command.to_payload()?;
        let kind = command.kind();
        let deployment_id = command.deployment_id();

        if let Err(e) = self.channel.publish(EXCHANGE, routing_key, &payload).await {
            error!("Failed to publish {} command for {}: {}", kind, deployment_id, e);
            return Err(e);
        }

        info!(
            "Published {} command for {} to {} with routing key {}",
            kind, deployment_id, EXCHANGE, routing_key
        );
        Ok(PublishReceipt {
            exchange: EXCHANGE.to_string(),
            routing_key: routing_key.to_string(),
            kind,
            deployment_id,
        })
    }
}

/// Assemble a `build` command for a deployment and its owner.
///
/// Fails with a configuration error when the owner has no stored credential.
pub fn build_command(deployment: &Deployment, owner: &User) -> Result<Command, ApiError> {
    let token = owner.token.as_ref().ok_or_else(|| {
        ApiError::ConfigError(format!(
            "user {} has no stored source-control token; cannot build {}",
            owner.id, deployment.id
        ))
    })?;

    Ok(Command::Build(BuildCommand {
        deployment_id: deployment.id,
        token: token.expose_secret().to_string(),
        repository: deployment.repository.clone(),
        branch: deployment.branch.clone(),
        dockerfile_path: deployment.dockerfile_path.clone(),
        compose_file_path: deployment.compose_file_path.clone(),
        context_dir: deployment.context_dir.clone(),
        port_number: deployment.port_number,
        created_at: Utc::now(),
    }))
}
