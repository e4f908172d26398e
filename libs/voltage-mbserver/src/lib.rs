//! Modbus slave engine
//!
//! One engine owns one register address space (discrete inputs, coils,
//! holding registers, input registers). Transport adapters decode incoming
//! bytes into [`Frame`]s and submit them; a single serializer task executes
//! every request against the store in arrival order and writes the response
//! back on the originating connection.
//!
//! ```ignore
//! let engine = Engine::start(EngineConfig::default(), CheckpointManager::default()).await?;
//! engine.register(65, |_store, _frame| (vec![0xAA, 0xBB], Exception::Success));
//! engine.listen_tcp("0.0.0.0:502").await?;
//! common::shutdown::wait_for_shutdown().await;
//! engine.close().await;
//! engine.save().await?;
//! ```

pub mod checkpoint;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod engine;
pub mod exception;
pub mod frame;
pub mod functions;
pub mod registry;
mod serializer;
pub mod store;
pub mod transport;

pub use checkpoint::{CheckpointManager, StateObject, DEFAULT_CHECKPOINT_PATH};
pub use config::{EngineConfig, Parity, SerialConfig};
pub use connection::{ChannelConnection, Connection, Request, StreamConnection};
pub use dispatch::{dispatch, FunctionTable};
pub use engine::Engine;
pub use exception::Exception;
pub use frame::{AsciiFrame, Frame, FrameKind, RtuFrame, TcpFrame};
pub use functions::Handler;
pub use registry::{TransportKind, TransportRegistry};
pub use store::{RegisterStore, ADDRESS_SPACE};

/// Result alias over the workspace error type
pub type Result<T> = errors::SlaveResult<T>;
