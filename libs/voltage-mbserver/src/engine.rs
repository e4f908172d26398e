//! Engine facade
//!
//! Wires the store, dispatch table, serializer, transport registry and
//! checkpoint manager together. `Engine` is a cheap handle: clones share the
//! same serializer, and the serializer keeps running for as long as any
//! handle (including those held by transport tasks) is alive.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use errors::SlaveError;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::checkpoint::{CheckpointManager, StateObject};
use crate::config::EngineConfig;
#[cfg(feature = "serial")]
use crate::config::SerialConfig;
use crate::connection::{Connection, Request, StreamConnection};
use crate::dispatch::FunctionTable;
use crate::exception::Exception;
use crate::frame::{Frame, FrameKind};
use crate::functions::Handler;
use crate::registry::{TransportKind, TransportRegistry};
use crate::serializer::{Command, RequestSerializer};
use crate::store::RegisterStore;
use crate::transport;
use crate::Result;

struct EngineInner {
    intake: mpsc::Sender<Command>,
    functions: Arc<FunctionTable>,
    transports: TransportRegistry,
    checkpoint: CheckpointManager,
    config: EngineConfig,
}

#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Build the engine, restore the checkpoint if one exists, then start the
    /// serializer
    ///
    /// A corrupt or unreadable checkpoint is returned as a fatal error; the
    /// serializer is never started on top of it.
    pub async fn start(config: EngineConfig, checkpoint: CheckpointManager) -> Result<Self> {
        config.validate()?;

        let mut store = RegisterStore::new();
        if let Some(state) = load_blocking(checkpoint.clone()).await? {
            state.apply(&mut store)?;
            info!("Register memory restored from {}", checkpoint.path().display());
        }

        let functions = Arc::new(FunctionTable::with_defaults());
        let (intake, rx) = mpsc::channel(config.intake_capacity);
        let serializer = RequestSerializer::new(
            store,
            functions.clone(),
            rx,
            config.write_timeout(),
            config.verbose,
        );
        tokio::spawn(serializer.run());

        info!(
            "Modbus engine started: functions={:?} intake={} write_timeout={:?}",
            functions.registered_codes(),
            config.intake_capacity,
            config.write_timeout()
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                intake,
                functions,
                transports: TransportRegistry::new(),
                checkpoint,
                config,
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn checkpoint_path(&self) -> &Path {
        self.inner.checkpoint.path()
    }

    pub fn functions(&self) -> &FunctionTable {
        &self.inner.functions
    }

    pub fn transports(&self) -> &TransportRegistry {
        &self.inner.transports
    }

    // ========================================================================
    // Requests and handlers
    // ========================================================================

    /// Queue a request; waits while the intake is full
    pub async fn submit(&self, request: Request) -> Result<()> {
        self.inner
            .intake
            .send(Command::Request(request))
            .await
            .map_err(|_| SlaveError::SerializerStopped)
    }

    /// Install or replace the handler for `code`
    ///
    /// Requests dispatched after this returns use the new handler.
    pub fn register<F>(&self, code: u8, handler: F)
    where
        F: Fn(&mut RegisterStore, &dyn Frame) -> (Vec<u8>, Exception) + Send + Sync + 'static,
    {
        self.inner.functions.register(code, Arc::new(handler));
    }

    pub fn register_handler(&self, code: u8, handler: Handler) {
        self.inner.functions.register(code, handler);
    }

    /// Remove the handler for `code`; later requests get IllegalFunction
    pub fn unregister(&self, code: u8) -> Option<Handler> {
        self.inner.functions.unregister(code)
    }

    /// Run `f` against the store at its position in the request queue
    ///
    /// A panic in `f` is contained in the serializer and reported as
    /// `SlaveError::Internal`.
    pub async fn with_store<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut RegisterStore) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let access = Box::new(move |store: &mut RegisterStore| {
            // Receiver gone means the caller stopped waiting
            let _ = tx.send(f(store));
        });
        self.inner
            .intake
            .send(Command::Access(access))
            .await
            .map_err(|_| SlaveError::SerializerStopped)?;
        rx.await.map_err(|_| {
            if self.inner.intake.is_closed() {
                SlaveError::SerializerStopped
            } else {
                SlaveError::Internal("store access panicked".to_string())
            }
        })
    }

    // ========================================================================
    // Checkpoints
    // ========================================================================

    /// Snapshot the store through the serializer and write the checkpoint
    pub async fn save(&self) -> Result<()> {
        let state = self.with_store(|store| StateObject::capture(store)).await?;
        let checkpoint = self.inner.checkpoint.clone();
        tokio::task::spawn_blocking(move || checkpoint.store(&state))
            .await
            .map_err(|e| SlaveError::Internal(format!("checkpoint save task: {}", e)))?
    }

    /// Reload the checkpoint into the running engine
    ///
    /// Returns `false` when no checkpoint exists. The new state is installed
    /// in one serialized step, so no request observes a half-restored store.
    pub async fn restore(&self) -> Result<bool> {
        let Some(state) = load_blocking(self.inner.checkpoint.clone()).await? else {
            return Ok(false);
        };
        state.validate()?;
        self.with_store(move |store| state.apply(store)).await??;
        info!(
            "Register memory restored from {}",
            self.inner.checkpoint.path().display()
        );
        Ok(true)
    }

    // ========================================================================
    // Transports
    // ========================================================================

    /// Serve Modbus TCP on `addr`; returns the bound address
    pub async fn listen_tcp(&self, addr: &str) -> Result<SocketAddr> {
        transport::tcp::listen(self, addr).await
    }

    /// Serve a serial port in RTU or ASCII framing
    #[cfg(feature = "serial")]
    pub fn listen_serial(&self, config: &SerialConfig) -> Result<()> {
        transport::serial::open(self, config)
    }

    /// Serve requests arriving on an arbitrary byte stream
    ///
    /// The stream is registered as a transport until the next [`close`](Self::close).
    pub fn serve_stream<S>(&self, stream: S, peer: impl Into<String>, kind: FrameKind)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let peer = peer.into();
        let (reader, writer) = tokio::io::split(stream);
        let conn: Arc<dyn Connection> = Arc::new(StreamConnection::new(peer.clone(), writer));
        let token = CancellationToken::new();
        let task = tokio::spawn(transport::serve_connection(
            self.clone(),
            reader,
            conn,
            kind,
            token.clone(),
        ));
        self.inner
            .transports
            .register(peer, TransportKind::Stream, token, task);
    }

    /// Close every listener and port
    ///
    /// Requests already submitted are still executed and answered. Returns
    /// the labels of transports that did not shut down cleanly.
    pub async fn close(&self) -> Vec<String> {
        let count = self.inner.transports.len();
        let failed = self
            .inner
            .transports
            .close(self.inner.config.write_timeout())
            .await;
        if failed.is_empty() {
            info!("Closed {} transport(s)", count);
        } else {
            warn!(
                "Closed {} transport(s), {} did not stop cleanly: {:?}",
                count,
                failed.len(),
                failed
            );
        }
        failed
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.inner.config)
            .field("checkpoint", &self.inner.checkpoint.path())
            .field("functions", &self.inner.functions)
            .field("transports", &self.inner.transports)
            .finish()
    }
}

async fn load_blocking(checkpoint: CheckpointManager) -> Result<Option<StateObject>> {
    tokio::task::spawn_blocking(move || checkpoint.load())
        .await
        .map_err(|e| SlaveError::Internal(format!("checkpoint load task: {}", e)))?
}
