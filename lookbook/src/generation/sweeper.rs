//! Background task that fails stale generations for all users.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::lifecycle;
use crate::store::Store;

/// Expire stale generations every `interval` until `shutdown` is cancelled
pub async fn run_stale_sweeper(
    store: Arc<dyn Store>,
    generation_cost: i64,
    stale_after: Duration,
    interval: Duration,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    info!(?interval, ?stale_after, "Starting stale generation sweeper");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Stale generation sweeper shutting down");
                break;
            }
            _ = ticker.tick() => {
                match lifecycle::expire_stale(store.as_ref(), generation_cost, None, stale_after).await {
                    Ok(expired) => debug!(count = expired.len(), "Swept stale generations"),
                    Err(e) => error!(error = %e, "Stale generation sweep failed"),
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::generations::GenerationCreateDBRequest;
    use crate::db::models::users::UserCreateDBRequest;
    use crate::generation::status::{FailureReason, GenerationStatus};
    use crate::store::{GenerationStore, InMemoryStore, UserStore};
    use chrono::Utc;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_sweeper_expires_all_users_and_stops() {
        let store = InMemoryStore::new();
        let mut generations = Vec::new();
        for _ in 0..2 {
            let user = store
                .create_user(&UserCreateDBRequest {
                    device_id: Uuid::new_v4().to_string(),
                    initial_credits: 1,
                })
                .await
                .unwrap();
            let row = store
                .create_generation(&GenerationCreateDBRequest {
                    generation_id: Uuid::new_v4(),
                    user_id: user.id,
                    original_prompt: "silver ring".to_string(),
                    reference_images: vec![],
                    settings: serde_json::json!({}),
                    aspect_ratio: "1:1".to_string(),
                })
                .await
                .unwrap();
            store.backdate_generation(row.generation_id, Utc::now() - chrono::Duration::hours(1));
            generations.push(row.generation_id);
        }

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run_stale_sweeper(
            Arc::new(store.clone()),
            1,
            Duration::from_secs(15 * 60),
            Duration::from_millis(10),
            shutdown.clone(),
        ));

        // The first tick fires immediately
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.cancel();
        task.await.unwrap().unwrap();

        for id in generations {
            let row = store.get_generation(id).await.unwrap().unwrap();
            assert_eq!(row.status, GenerationStatus::Failed);
            assert_eq!(row.failure_reason, Some(FailureReason::Timeout));
        }
    }
}
