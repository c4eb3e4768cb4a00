//! Result worker: drains the result queue in delivery order

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures::{FutureExt, StreamExt};
use tracing::{debug, error, info, warn};

use crate::messaging::broker::{DeliveryStream, Disposition};
use crate::messaging::consumer::ResultConsumer;

/// Result worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Consumer tag registered with the broker
    pub consumer_tag: String,

    /// Unacknowledged deliveries the broker may push at once
    pub prefetch: u16,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            consumer_tag: "blacktree-api-results".to_string(),
            prefetch: 1,
        }
    }
}

/// Why the worker stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// Shutdown was requested
    Shutdown,

    /// The broker closed the consumer or the delivery stream failed
    StreamClosed(String),
}

/// Run the result worker until shutdown or until the stream ends.
///
/// Deliveries are handled one at a time so status changes for a deployment
/// apply in the order the worker reported them.
pub async fn run(
    options: &Options,
    mut deliveries: DeliveryStream,
    consumer: Arc<ResultConsumer>,
    shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) -> WorkerExit {
    info!("Result worker started as {}", options.consumer_tag);
    let mut shutdown_signal = shutdown_signal;

    loop {
        let next = tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Result worker received shutdown signal");
                return WorkerExit::Shutdown;
            }
            next = deliveries.next() => next,
        };

        let delivery = match next {
            Some(Ok(delivery)) => delivery,
            Some(Err(e)) => {
                error!("Result stream failed: {}", e);
                return WorkerExit::StreamClosed(e.to_string());
            }
            None => {
                warn!("Result stream ended");
                return WorkerExit::StreamClosed("consumer cancelled by broker".to_string());
            }
        };

        let disposition = match AssertUnwindSafe(
            consumer.handle_payload(delivery.payload(), delivery.previous_deliveries()),
        )
        .catch_unwind()
        .await
        {
            Ok(disposition) => disposition,
            Err(_) => {
                error!("Result handler panicked; rejecting delivery");
                Disposition::Reject
            }
        };

        debug!(
            "Settling result delivery ({:?}, redelivered: {})",
            disposition,
            delivery.redelivered()
        );
        if let Err(e) = delivery.settle(disposition).await {
            error!("Failed to settle result delivery: {}", e);
        }
    }
}
