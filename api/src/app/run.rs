//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use blacktree_wire::topology::RESULT_QUEUE;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::errors::ApiError;
use crate::messaging::broker::{BrokerChannel, BrokerConnection};
use crate::messaging::topology::declare_topology;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::store::memory::MemoryStore;
use crate::workers::results::{self, WorkerExit};

/// Run the API: connect to the broker, then serve until shutdown.
///
/// The broker connection is closed on every path out of this function.
pub async fn run(
    version: String,
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ApiError> {
    info!("Initializing Blacktree API...");

    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    let connection = BrokerConnection::connect(&options.broker)
        .await
        .inspect_err(|e| error!("Failed to connect to broker: {}", e))?;
    let channel = connection.channel();
    shutdown_manager.with_broker(connection)?;

    let store = Arc::new(MemoryStore::new());
    run_until_shutdown(
        version,
        &options,
        channel,
        store,
        shutdown_tx,
        shutdown_manager,
        shutdown_signal,
    )
    .await
}

/// Run the API on an already opened channel. The caller owns the channel's
/// connection and closes it.
pub async fn run_on_channel(
    version: String,
    options: AppOptions,
    channel: Arc<dyn BrokerChannel>,
    store: Arc<MemoryStore>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ApiError> {
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());
    run_until_shutdown(
        version,
        &options,
        channel,
        store,
        shutdown_tx,
        shutdown_manager,
        shutdown_signal,
    )
    .await
}

async fn run_until_shutdown(
    version: String,
    options: &AppOptions,
    channel: Arc<dyn BrokerChannel>,
    store: Arc<MemoryStore>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_manager: ShutdownManager,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ApiError> {
    let mut worker_exit = match init(
        version,
        options,
        channel,
        store,
        &shutdown_tx,
        &mut shutdown_manager,
    )
    .await
    {
        Ok(worker_exit) => worker_exit,
        Err(e) => {
            error!("Failed to start the API: {}", e);
            drop(shutdown_tx);
            if let Err(shutdown_err) = shutdown_manager.shutdown().await {
                error!("Shutdown after failed start also failed: {}", shutdown_err);
            }
            return Err(e);
        }
    };

    let result = tokio::select! {
        _ = shutdown_signal => {
            info!("Shutdown signal received, shutting down...");
            Ok(())
        }
        exit = &mut worker_exit => {
            match exit {
                Ok(WorkerExit::StreamClosed(reason)) => {
                    error!("Result consumer stopped: {}; restart required", reason);
                    Err(ApiError::BrokerError(format!("result consumer stopped: {reason}")))
                }
                Ok(WorkerExit::Shutdown) => Ok(()),
                Err(_) => Err(ApiError::Internal("result worker exited without a status".to_string())),
            }
        }
    };

    drop(shutdown_tx);
    let shutdown_result = shutdown_manager.shutdown().await;
    result.and(shutdown_result)
}

// =============================== INITIALIZATION ================================== //

async fn init(
    version: String,
    options: &AppOptions,
    channel: Arc<dyn BrokerChannel>,
    store: Arc<MemoryStore>,
    shutdown_tx: &broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<oneshot::Receiver<WorkerExit>, ApiError> {
    declare_topology(channel.as_ref()).await?;

    let app_state = Arc::new(AppState::new(version, channel.clone(), store, options));

    let worker_exit = init_result_worker(
        options.result_worker.clone(),
        channel,
        app_state.clone(),
        shutdown_manager,
        shutdown_tx.subscribe(),
    )
    .await?;

    if options.enable_admin_server {
        init_admin_server(options, app_state, shutdown_manager, shutdown_tx.subscribe()).await?;
    }

    Ok(worker_exit)
}

async fn init_result_worker(
    options: results::Options,
    channel: Arc<dyn BrokerChannel>,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<oneshot::Receiver<WorkerExit>, ApiError> {
    info!("Initializing result worker...");

    let deliveries = channel
        .consume(RESULT_QUEUE, &options.consumer_tag, options.prefetch)
        .await?;
    let consumer = app_state.consumer.clone();
    let (exit_tx, exit_rx) = oneshot::channel();

    let handle = tokio::spawn(async move {
        let exit = results::run(
            &options,
            deliveries,
            consumer,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
        let _ = exit_tx.send(exit);
    });

    shutdown_manager.with_result_worker_handle(handle)?;
    Ok(exit_rx)
}

async fn init_admin_server(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), ApiError> {
    info!("Initializing admin HTTP server...");

    let server_state = ServerState::new(app_state.version.clone(), app_state.consumer.clone());

    let server_handle = serve(&options.server, Arc::new(server_state), async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_admin_server_handle(server_handle)?;
    Ok(())
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    result_worker_handle: Option<JoinHandle<()>>,
    admin_server_handle: Option<JoinHandle<Result<(), ApiError>>>,
    broker: Option<BrokerConnection>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            result_worker_handle: None,
            admin_server_handle: None,
            broker: None,
        }
    }

    pub fn with_broker(&mut self, broker: BrokerConnection) -> Result<(), ApiError> {
        if self.broker.is_some() {
            return Err(ApiError::ShutdownError("broker already set".to_string()));
        }
        self.broker = Some(broker);
        Ok(())
    }

    pub fn with_result_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), ApiError> {
        if self.result_worker_handle.is_some() {
            return Err(ApiError::ShutdownError("result_worker_handle already set".to_string()));
        }
        self.result_worker_handle = Some(handle);
        Ok(())
    }

    pub fn with_admin_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), ApiError>>,
    ) -> Result<(), ApiError> {
        if self.admin_server_handle.is_some() {
            return Err(ApiError::ShutdownError("admin_server_handle already set".to_string()));
        }
        self.admin_server_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), ApiError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, closing the broker anyway...",
                    self.lifecycle_options.max_shutdown_delay
                );
                if let Some(handle) = self.result_worker_handle.take() {
                    handle.abort();
                }
                if let Some(handle) = self.admin_server_handle.take() {
                    handle.abort();
                }
                self.close_broker().await?;
                Err(ApiError::ShutdownError(format!(
                    "timed out after {:?}",
                    self.lifecycle_options.max_shutdown_delay
                )))
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), ApiError> {
        info!("Shutting down Blacktree API...");
        let mut first_error = None;

        // 1. Result worker
        if let Some(handle) = self.result_worker_handle.take() {
            if let Err(e) = handle.await {
                error!("Result worker failed to join: {}", e);
                first_error.get_or_insert(ApiError::ShutdownError(e.to_string()));
            }
        }

        // 2. Admin server
        if let Some(handle) = self.admin_server_handle.take() {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("Admin server failed: {}", e);
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    error!("Admin server failed to join: {}", e);
                    first_error.get_or_insert(ApiError::ShutdownError(e.to_string()));
                }
            }
        }

        // 3. Broker channel and connection, last so in-flight settles complete
        if let Err(e) = self.close_broker().await {
            first_error.get_or_insert(e);
        }

        info!("Shutdown complete");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn close_broker(&mut self) -> Result<(), ApiError> {
        let Some(broker) = self.broker.take() else {
            return Ok(());
        };
        broker.close().await.inspect_err(|e| {
            warn!("Failed to close broker connection cleanly: {}", e);
        })
    }
}
