//! Modbus slave service
//!
//! One register memory shared by every configured TCP listener and serial
//! port, checkpointed to disk.

use clap::Parser;
use tracing::{error, info};

use common::shutdown::wait_for_shutdown;
use common::ServiceArgs;
use errors::{SlaveError, SlaveResult};
use mbsrv::{spawn_autosave, ServiceConfig, SERVICE_NAME, SERVICE_VERSION};
use voltage_mbserver::Engine;

#[tokio::main]
async fn main() -> SlaveResult<()> {
    let args = ServiceArgs::parse();
    let config = ServiceConfig::load(&args)?;

    // Validation mode: print the effective configuration and exit
    if args.validate {
        let yaml = serde_yaml::to_string(&config)
            .map_err(|e| SlaveError::Configuration(format!("serialize config: {}", e)))?;
        println!("{}", yaml);
        return Ok(());
    }

    common::logging::init_logging(SERVICE_NAME, &config.logging)?;
    info!("Starting {} v{}", SERVICE_NAME, SERVICE_VERSION);

    // ============ Phase 1: Engine and checkpoint restore ============
    let engine = match Engine::start(config.engine.clone(), config.checkpoint.manager()).await {
        Ok(engine) => engine,
        Err(e) => {
            error!("Engine startup failed [{}]: {}", e.error_code(), e);
            return Err(e);
        },
    };

    // ============ Phase 2: Transports ============
    if let Err(e) = open_transports(&engine, &config).await {
        error!("Transport startup failed [{}]: {}", e.error_code(), e);
        engine.close().await;
        return Err(e);
    }

    // ============ Phase 3: Autosave ============
    let autosave = config
        .checkpoint
        .autosave_interval()
        .map(|period| {
            info!("Autosave every {:?}", period);
            spawn_autosave(engine.clone(), period)
        });

    // ============ Phase 4: Run until signalled or a save fails ============
    let mut fatal = None;
    match autosave {
        Some((mut handle, token)) => {
            tokio::select! {
                _ = wait_for_shutdown() => {
                    token.cancel();
                    if let Ok(Err(e)) = handle.await {
                        fatal = Some(e);
                    }
                }
                result = &mut handle => {
                    fatal = Some(match result {
                        Ok(Err(e)) => e,
                        Ok(Ok(())) => SlaveError::Internal("autosave task stopped".to_string()),
                        Err(e) => SlaveError::Internal(format!("autosave task: {}", e)),
                    });
                }
            }
        },
        None => {
            wait_for_shutdown().await;
        },
    }

    // ============ Phase 5: Shutdown ============
    engine.close().await;

    if let Some(e) = fatal {
        error!("Checkpoint failure [{}]: {}", e.error_code(), e);
        return Err(e);
    }

    if config.checkpoint.save_on_shutdown {
        if let Err(e) = engine.save().await {
            error!("Final checkpoint failed [{}]: {}", e.error_code(), e);
            return Err(e);
        }
    }

    info!("{} stopped", SERVICE_NAME);
    Ok(())
}

async fn open_transports(engine: &Engine, config: &ServiceConfig) -> SlaveResult<()> {
    for addr in &config.tcp {
        engine.listen_tcp(addr).await?;
    }

    #[cfg(feature = "serial")]
    for port in &config.serial {
        engine.listen_serial(port)?;
    }

    #[cfg(not(feature = "serial"))]
    if let Some(port) = config.serial.first() {
        return Err(SlaveError::SerialPort {
            port: port.path.clone(),
            reason: "built without the `serial` feature".to_string(),
        });
    }

    Ok(())
}
