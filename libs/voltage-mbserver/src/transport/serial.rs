//! Serial port transport (RTU or ASCII framing)

use std::sync::Arc;

use errors::SlaveError;
use tokio_serial::SerialPortBuilderExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::serve_connection;
use crate::config::{Parity, SerialConfig};
use crate::connection::{Connection, StreamConnection};
use crate::engine::Engine;
use crate::registry::TransportKind;
use crate::Result;

/// Open the port described by `config`, register it and start reading
pub(crate) fn open(engine: &Engine, config: &SerialConfig) -> Result<()> {
    config.validate()?;

    let parity = match config.parity {
        Parity::Even => tokio_serial::Parity::Even,
        Parity::Odd => tokio_serial::Parity::Odd,
        Parity::None => tokio_serial::Parity::None,
    };

    let data_bits = match config.data_bits {
        5 => tokio_serial::DataBits::Five,
        6 => tokio_serial::DataBits::Six,
        7 => tokio_serial::DataBits::Seven,
        _ => tokio_serial::DataBits::Eight,
    };

    let stop_bits = match config.stop_bits {
        2 => tokio_serial::StopBits::Two,
        _ => tokio_serial::StopBits::One,
    };

    let port = tokio_serial::new(&config.path, config.baud_rate)
        .data_bits(data_bits)
        .parity(parity)
        .stop_bits(stop_bits)
        .open_native_async()
        .map_err(|e| {
            error!("Serial open failed: {} - {}", config.path, e);
            SlaveError::SerialPort {
                port: config.path.clone(),
                reason: e.to_string(),
            }
        })?;
    info!(
        "Serial port opened: {} @{}baud {}",
        config.path, config.baud_rate, config.mode
    );

    let (reader, writer) = tokio::io::split(port);
    let conn: Arc<dyn Connection> = Arc::new(StreamConnection::new(config.path.clone(), writer));
    let token = CancellationToken::new();
    let task = tokio::spawn(serve_connection(
        engine.clone(),
        reader,
        conn,
        config.mode,
        token.clone(),
    ));
    engine
        .transports()
        .register(config.path.clone(), TransportKind::Serial, token, task);
    Ok(())
}
