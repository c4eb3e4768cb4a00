//! End-to-end flows: service -> broker -> worker double -> result worker

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use uuid::Uuid;

use blacktree::app::options::AppOptions;
use blacktree::app::run::run_on_channel;
use blacktree::authz::guard::{OwnershipGuard, Principal};
use blacktree::deploy::fsm::DeploymentStatus;
use blacktree::errors::ApiError;
use blacktree::messaging::broker::{BrokerChannel, Disposition};
use blacktree::messaging::consumer::{ConsumerOptions, ResultConsumer};
use blacktree::messaging::publisher::CommandPublisher;
use blacktree::messaging::topology::declare_topology;
use blacktree::models::deployment::NewDeployment;
use blacktree::services::deployments::{CommandOptions, DeploymentService};
use blacktree::store::memory::MemoryStore;
use blacktree::store::DeploymentRepository;
use blacktree::workers::results::{self, WorkerExit};
use blacktree_wire::topology::{COMMAND_QUEUE, EXCHANGE, RESULT_QUEUE, RESULT_ROUTING_KEY};
use blacktree_wire::{Command, ResultMessage};

use crate::support::{init_tracing, seed_user, InMemoryBroker};

/// Publish a result the way a worker would
async fn report(channel: &Arc<dyn BrokerChannel>, deployment_id: Uuid, status: &str) {
    let payload = ResultMessage::new(deployment_id, status).to_payload().unwrap();
    channel
        .publish(EXCHANGE, RESULT_ROUTING_KEY, &payload)
        .await
        .unwrap();
}

async fn status_of(store: &MemoryStore, id: Uuid) -> DeploymentStatus {
    DeploymentRepository::find_by_id(store, id)
        .await
        .unwrap()
        .unwrap()
        .status
}

#[tokio::test]
async fn test_deployment_lifecycle_through_the_broker() {
    init_tracing();
    let broker = InMemoryBroker::new();
    let channel = broker.channel();
    declare_topology(channel.as_ref()).await.unwrap();

    let store = Arc::new(MemoryStore::new());
    let owner = seed_user(&store, Some("ghp_owner")).await;
    let principal = Principal::new(owner.id);

    let guard = Arc::new(OwnershipGuard::new(store.clone(), store.clone()));
    let publisher = Arc::new(CommandPublisher::new(channel.clone()));
    let service = DeploymentService::new(store.clone(), guard, publisher, CommandOptions::default());
    let consumer = Arc::new(ResultConsumer::new(store.clone(), ConsumerOptions::default()));

    let options = results::Options::default();
    let deliveries = channel
        .consume(RESULT_QUEUE, &options.consumer_tag, options.prefetch)
        .await
        .unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let worker = tokio::spawn(async move {
        results::run(
            &options,
            deliveries,
            consumer,
            Box::pin(async move {
                let _ = stop_rx.await;
            }),
        )
        .await
    });

    // create D1 and build it
    let d1 = service
        .create_deployment(
            &principal,
            NewDeployment {
                name: "d1".to_string(),
                repository: "r".to_string(),
                branch: Some("main".to_string()),
                dockerfile_path: "Dockerfile".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    service.build(&principal, d1.id).await.unwrap();

    let commands = broker.queued(COMMAND_QUEUE);
    assert_eq!(commands.len(), 1);
    assert!(matches!(
        Command::from_payload(&commands[0]).unwrap(),
        Command::Build(ref build) if build.deployment_id == d1.id
    ));

    report(&channel, d1.id, "building").await;
    broker.wait_for_settlements(1).await;
    assert_eq!(status_of(&store, d1.id).await, DeploymentStatus::Building);

    report(&channel, d1.id, "running").await;
    broker.wait_for_settlements(2).await;
    assert_eq!(status_of(&store, d1.id).await, DeploymentStatus::Ready);

    report(&channel, d1.id, "deleted").await;
    broker.wait_for_settlements(3).await;
    assert_eq!(status_of(&store, d1.id).await, DeploymentStatus::Deleted);

    // a late, out-of-order report
    report(&channel, d1.id, "building").await;
    let settlements = broker.wait_for_settlements(4).await;
    assert_eq!(status_of(&store, d1.id).await, DeploymentStatus::Deleted);

    assert!(settlements
        .iter()
        .all(|s| s.queue == RESULT_QUEUE && s.disposition == Disposition::Ack));

    stop_tx.send(()).unwrap();
    assert_eq!(worker.await.unwrap(), WorkerExit::Shutdown);
}

#[tokio::test]
async fn test_bad_messages_do_not_stop_the_worker() {
    init_tracing();
    let broker = InMemoryBroker::new();
    let channel = broker.channel();
    declare_topology(channel.as_ref()).await.unwrap();

    let store = Arc::new(MemoryStore::new());
    let owner = seed_user(&store, None).await;
    let deployment = crate::support::seed_deployment(&store, &owner, "r").await;
    let consumer = Arc::new(ResultConsumer::new(store.clone(), ConsumerOptions::default()));

    let options = results::Options::default();
    let deliveries = channel
        .consume(RESULT_QUEUE, &options.consumer_tag, options.prefetch)
        .await
        .unwrap();
    let worker = tokio::spawn(async move {
        results::run(&options, deliveries, consumer, Box::pin(std::future::pending::<()>())).await
    });

    channel
        .publish(EXCHANGE, RESULT_ROUTING_KEY, b"{ definitely not json")
        .await
        .unwrap();
    report(&channel, deployment.id, "on-fire").await;
    report(&channel, Uuid::new_v4(), "running").await;
    report(&channel, deployment.id, "cloned").await;

    let settlements = broker.wait_for_settlements(4).await;
    let dispositions: Vec<Disposition> = settlements.iter().map(|s| s.disposition).collect();
    assert_eq!(
        dispositions,
        vec![
            Disposition::Reject,
            Disposition::Reject,
            Disposition::Reject,
            Disposition::Ack,
        ]
    );
    assert_eq!(broker.dead_letters().len(), 3);
    assert_eq!(status_of(&store, deployment.id).await, DeploymentStatus::Cloned);

    // losing the connection ends the worker with an error
    broker.disconnect();
    let exit = tokio::time::timeout(Duration::from_secs(2), worker)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(exit, WorkerExit::StreamClosed(_)));
}

#[tokio::test]
async fn test_requeued_results_are_redelivered_until_dropped() {
    init_tracing();
    let broker = InMemoryBroker::without_delivery_count();
    let channel = broker.channel();
    declare_topology(channel.as_ref()).await.unwrap();

    let store = Arc::new(MemoryStore::new());
    let owner = seed_user(&store, None).await;
    let deployment = crate::support::seed_deployment(&store, &owner, "r").await;
    let flaky = Arc::new(crate::support::FlakyStore::new(store.clone(), u32::MAX));
    let consumer = Arc::new(ResultConsumer::new(
        flaky,
        ConsumerOptions {
            max_deliveries: 3,
            ..Default::default()
        },
    ));

    let options = results::Options::default();
    let deliveries = channel
        .consume(RESULT_QUEUE, &options.consumer_tag, options.prefetch)
        .await
        .unwrap();
    tokio::spawn(async move {
        results::run(&options, deliveries, consumer, Box::pin(std::future::pending::<()>())).await
    });

    report(&channel, deployment.id, "cloned").await;

    let settlements = broker.wait_for_settlements(3).await;
    let dispositions: Vec<Disposition> = settlements.iter().map(|s| s.disposition).collect();
    assert_eq!(
        dispositions,
        vec![Disposition::Requeue, Disposition::Requeue, Disposition::Reject]
    );
    assert_eq!(broker.dead_letters().len(), 1);
    assert_eq!(status_of(&store, deployment.id).await, DeploymentStatus::Pending);
}

#[tokio::test]
async fn test_run_on_channel_until_shutdown() {
    init_tracing();
    let broker = InMemoryBroker::new();
    let store = Arc::new(MemoryStore::new());
    let owner = seed_user(&store, None).await;
    let deployment = crate::support::seed_deployment(&store, &owner, "r").await;

    let options = AppOptions {
        enable_admin_server: false,
        ..Default::default()
    };
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let app = tokio::spawn(run_on_channel(
        "test".to_string(),
        options,
        broker.channel(),
        store.clone(),
        async move {
            let _ = stop_rx.await;
        },
    ));

    // topology is declared by startup; wait for the consumer to attach
    broker.wait_for_consumer(RESULT_QUEUE).await;
    report(&broker.channel(), deployment.id, "built").await;
    broker.wait_for_settlements(1).await;
    assert_eq!(status_of(&store, deployment.id).await, DeploymentStatus::Built);

    stop_tx.send(()).unwrap();
    tokio_test::assert_ok!(app.await.unwrap());
}

#[tokio::test]
async fn test_run_on_channel_fails_when_consumer_is_lost() {
    init_tracing();
    let broker = InMemoryBroker::new();
    let store = Arc::new(MemoryStore::new());

    let options = AppOptions {
        enable_admin_server: false,
        ..Default::default()
    };
    let app = tokio::spawn(run_on_channel(
        "test".to_string(),
        options,
        broker.channel(),
        store,
        std::future::pending::<()>(),
    ));

    broker.wait_for_consumer(RESULT_QUEUE).await;
    broker.disconnect();

    let result = tokio::time::timeout(Duration::from_secs(2), app)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(ApiError::BrokerError(_))));
}

#[tokio::test]
async fn test_run_on_channel_fails_fast_without_broker() {
    init_tracing();
    let broker = InMemoryBroker::new();
    broker.disconnect();

    let options = AppOptions {
        enable_admin_server: false,
        ..Default::default()
    };
    let result = run_on_channel(
        "test".to_string(),
        options,
        broker.channel(),
        Arc::new(MemoryStore::new()),
        std::future::pending::<()>(),
    )
    .await;
    assert!(matches!(result, Err(ApiError::NotConnected(_))));
}
