//! Spawn-pass integration tests against an unreachable target.
//!
//! These exercise the orchestrator end to end without requiring a live
//! PostgreSQL server: connecting to a closed loopback port fails every slot
//! immediately.

use pgidle::config::{DatabaseParams, DatabaseTarget};
use pgidle::error::AppError;
use pgidle::orchestrator::{Orchestrator, SpawnOptions};

fn unreachable_target() -> DatabaseTarget {
    // Nothing listens on loopback port 1; connects are refused outright
    DatabaseTarget::Params(DatabaseParams {
        host: "127.0.0.1".into(),
        port: 1,
        name: "unused".into(),
        user: "nobody".into(),
        password: "irrelevant".into(),
    })
}

#[tokio::test]
async fn all_attempts_failing_is_fatal_and_registry_stays_empty() {
    let orchestrator = Orchestrator::new(unreachable_target());

    let result = orchestrator
        .spawn_connections(&SpawnOptions {
            count: 2,
            init_query: None,
            query_percent: None,
        })
        .await;

    assert!(matches!(result, Err(AppError::NoConnections)));
    assert_eq!(orchestrator.registry_len().await, 0);
}

#[tokio::test]
async fn failed_spawn_with_init_query_keeps_registry_empty() {
    let orchestrator = Orchestrator::new(unreachable_target());

    let result = orchestrator
        .spawn_connections(&SpawnOptions {
            count: 3,
            init_query: Some("SET application_name = 'pgidle'".into()),
            query_percent: Some(50.0),
        })
        .await;

    assert!(result.is_err());
    assert_eq!(orchestrator.registry_len().await, 0);

    // Sweeping after a failed spawn is a no-op
    orchestrator.shutdown().await;
    assert_eq!(orchestrator.registry_len().await, 0);
}
