//! Transport registry
//!
//! Every listener or port the engine opens is recorded with the token that
//! stops it and the task that runs it. Closing cancels them all and waits for
//! each one independently; one transport failing to stop never prevents the
//! others from being closed. The serializer is not involved: requests already
//! submitted are still answered.

use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Tcp,
    Serial,
    Stream,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Tcp => "tcp",
            Self::Serial => "serial",
            Self::Stream => "stream",
        };
        f.write_str(name)
    }
}

struct Transport {
    label: String,
    kind: TransportKind,
    token: CancellationToken,
    task: JoinHandle<()>,
}

#[derive(Default)]
pub struct TransportRegistry {
    transports: Mutex<Vec<Transport>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a running transport; `token` must stop `task` when cancelled
    pub fn register(
        &self,
        label: impl Into<String>,
        kind: TransportKind,
        token: CancellationToken,
        task: JoinHandle<()>,
    ) {
        let label = label.into();
        info!("Transport registered: {} {}", kind, label);
        self.transports.lock().push(Transport {
            label,
            kind,
            token,
            task,
        });
    }

    pub fn len(&self) -> usize {
        self.transports.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.transports.lock().is_empty()
    }

    pub fn labels(&self) -> Vec<String> {
        self.transports
            .lock()
            .iter()
            .map(|t| t.label.clone())
            .collect()
    }

    /// Stop every registered transport
    ///
    /// Returns the labels of transports that did not stop cleanly within
    /// `grace` (those are aborted). The registry is empty afterwards.
    pub async fn close(&self, grace: Duration) -> Vec<String> {
        let transports = std::mem::take(&mut *self.transports.lock());
        if transports.is_empty() {
            return Vec::new();
        }

        // Signal all first so they wind down in parallel
        for transport in &transports {
            transport.token.cancel();
        }

        let mut failed = Vec::new();
        for Transport {
            label,
            kind,
            task,
            ..
        } in transports
        {
            let abort = task.abort_handle();
            match tokio::time::timeout(grace, task).await {
                Ok(Ok(())) => info!("Transport closed: {} {}", kind, label),
                Ok(Err(e)) => {
                    warn!("Transport {} {} ended abnormally: {}", kind, label, e);
                    failed.push(label);
                },
                Err(_) => {
                    warn!(
                        "Transport {} {} did not stop within {:?}, aborting",
                        kind, label, grace
                    );
                    abort.abort();
                    failed.push(label);
                },
            }
        }
        failed
    }
}

impl fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportRegistry")
            .field("transports", &self.labels())
            .finish()
    }
}
