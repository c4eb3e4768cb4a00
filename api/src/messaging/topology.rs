//! Exchange, queue and binding declarations

use blacktree_wire::topology::{BINDINGS, EXCHANGE};
use tracing::{debug, error, info};

use crate::errors::ApiError;
use crate::messaging::broker::BrokerChannel;

/// Declare the exchange, both queues and their bindings.
///
/// Declarations are idempotent, so this is safe to run against a broker that
/// the workers (or an earlier run) already configured.
pub async fn declare_topology(channel: &dyn BrokerChannel) -> Result<(), ApiError> {
    channel.declare_exchange(EXCHANGE).await.inspect_err(|e| {
        error!("Topology setup failed: {}", e);
    })?;
    debug!("Declared exchange: {}", EXCHANGE);

    for binding in BINDINGS {
        channel.declare_queue(binding.queue).await.inspect_err(|e| {
            error!("Topology setup failed: {}", e);
        })?;
        channel
            .bind_queue(binding.queue, EXCHANGE, binding.routing_key)
            .await
            .inspect_err(|e| {
                error!("Topology setup failed: {}", e);
            })?;
        debug!(
            "Bound queue {} to {} with routing key {}",
            binding.queue, EXCHANGE, binding.routing_key
        );
    }

    info!("Broker topology ready on exchange {}", EXCHANGE);
    Ok(())
}
