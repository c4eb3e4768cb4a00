//! Ownership guard tests

use std::sync::Arc;

use uuid::Uuid;

use blacktree::authz::guard::{OwnershipGuard, Principal, ResourceRef};
use blacktree::errors::ApiError;
use blacktree::models::endpoint::{Endpoint, NewEndpoint};
use blacktree::store::memory::MemoryStore;
use blacktree::store::EndpointRepository;

use crate::support::{init_tracing, seed_deployment, seed_user};

struct Fixture {
    guard: OwnershipGuard,
    owner: Principal,
    stranger: Principal,
    deployment_id: Uuid,
    endpoint_id: Uuid,
}

async fn fixture() -> Fixture {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let owner = seed_user(&store, None).await;
    let stranger = seed_user(&store, None).await;
    let deployment = seed_deployment(&store, &owner, "https://github.com/acme/shop").await;
    let endpoint = EndpointRepository::save(
        store.as_ref(),
        Endpoint::new(
            deployment.id,
            NewEndpoint {
                route: "/orders".to_string(),
                ..Default::default()
            },
        )
        .unwrap(),
    )
    .await
    .unwrap();

    Fixture {
        guard: OwnershipGuard::new(store.clone(), store),
        owner: Principal::new(owner.id),
        stranger: Principal::new(stranger.id),
        deployment_id: deployment.id,
        endpoint_id: endpoint.id,
    }
}

#[tokio::test]
async fn test_owner_may_access_deployment() {
    let f = fixture().await;

    let grant = f
        .guard
        .authorize_deployment_access(&f.owner, ResourceRef::Deployment(f.deployment_id))
        .await
        .unwrap();
    assert_eq!(grant.deployment.id, f.deployment_id);
    assert!(grant.endpoint.is_none());
}

#[tokio::test]
async fn test_endpoint_resolves_to_parent_deployment() {
    let f = fixture().await;

    let grant = f
        .guard
        .authorize_deployment_access(&f.owner, ResourceRef::Endpoint(f.endpoint_id))
        .await
        .unwrap();
    assert_eq!(grant.deployment.id, f.deployment_id);
    assert_eq!(grant.endpoint.map(|e| e.id), Some(f.endpoint_id));
}

#[tokio::test]
async fn test_stranger_is_forbidden() {
    let f = fixture().await;

    for resource in [
        ResourceRef::Deployment(f.deployment_id),
        ResourceRef::Endpoint(f.endpoint_id),
    ] {
        let result = f.guard.authorize_deployment_access(&f.stranger, resource).await;
        assert!(matches!(result, Err(ApiError::Forbidden(_))), "{resource:?}");
    }
}

#[tokio::test]
async fn test_missing_resources_are_not_found() {
    let f = fixture().await;

    // never Forbidden, even for a caller who owns nothing
    for principal in [f.owner, f.stranger] {
        for resource in [
            ResourceRef::Deployment(Uuid::new_v4()),
            ResourceRef::Endpoint(Uuid::new_v4()),
        ] {
            let result = f.guard.authorize_deployment_access(&principal, resource).await;
            assert!(matches!(result, Err(ApiError::NotFound(_))), "{resource:?}");
        }
    }
}
