//! Periodic checkpoint task

use std::time::Duration;

use errors::SlaveResult;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use voltage_mbserver::Engine;

/// Save the engine's register memory every `period` until cancelled
///
/// A failed save ends the task with the error; the caller treats it as fatal.
pub fn spawn_autosave(
    engine: Engine,
    period: Duration,
) -> (JoinHandle<SlaveResult<()>>, CancellationToken) {
    let token = CancellationToken::new();
    let task_token = token.clone();

    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = engine.save().await {
                        error!("Autosave failed: {}", e);
                        return Err(e);
                    }
                    debug!("Autosave written to {}", engine.checkpoint_path().display());
                }
                () = task_token.cancelled() => {
                    break;
                }
            }
        }

        info!("Autosave task stopped");
        Ok(())
    });

    (handle, token)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use voltage_mbserver::{CheckpointManager, EngineConfig};

    #[tokio::test]
    async fn test_autosave_writes_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auto.state");
        let engine = Engine::start(EngineConfig::default(), CheckpointManager::new(&path))
            .await
            .unwrap();
        engine
            .with_store(|store| store.holding_registers_mut()[7] = 77)
            .await
            .unwrap();

        let (handle, token) = spawn_autosave(engine.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(120)).await;
        token.cancel();
        handle.await.unwrap().unwrap();

        let state = CheckpointManager::new(&path).load().unwrap().unwrap();
        assert_eq!(state.holding_registers[7], 77);
    }

    #[tokio::test]
    async fn test_autosave_failure_ends_task() {
        let dir = tempfile::tempdir().unwrap();
        // Parent directory does not exist, so every save fails
        let path = dir.path().join("missing").join("auto.state");
        let engine = Engine::start(EngineConfig::default(), CheckpointManager::new(&path))
            .await
            .unwrap();

        let (handle, _token) = spawn_autosave(engine, Duration::from_millis(10));
        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.unwrap_err().is_fatal());
    }
}
