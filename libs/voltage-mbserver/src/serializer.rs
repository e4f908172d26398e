//! Request serializer
//!
//! The only task that ever touches the register store. Requests and store
//! access closures arrive on one bounded intake and run to completion one at
//! a time, in arrival order. The response write happens before the next
//! command is taken, bounded by `write_timeout`.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use errors::SlaveError;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn, Level};

use crate::connection::{Connection, Request};
use crate::dispatch::{dispatch, panic_message, FunctionTable};
use crate::store::RegisterStore;

/// Closure run with exclusive access to the store
pub(crate) type StoreAccess = Box<dyn FnOnce(&mut RegisterStore) + Send>;

pub(crate) enum Command {
    Request(Request),
    Access(StoreAccess),
}

pub(crate) struct RequestSerializer {
    store: RegisterStore,
    functions: Arc<FunctionTable>,
    intake: mpsc::Receiver<Command>,
    write_timeout: Duration,
    verbose: bool,
}

impl RequestSerializer {
    pub(crate) fn new(
        store: RegisterStore,
        functions: Arc<FunctionTable>,
        intake: mpsc::Receiver<Command>,
        write_timeout: Duration,
        verbose: bool,
    ) -> Self {
        Self {
            store,
            functions,
            intake,
            write_timeout,
            verbose,
        }
    }

    /// Run until every intake sender has been dropped
    pub(crate) async fn run(mut self) {
        debug!("Request serializer started");
        while let Some(command) = self.intake.recv().await {
            match command {
                Command::Request(request) => self.serve(request).await,
                Command::Access(access) => {
                    let store = &mut self.store;
                    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| access(store))) {
                        error!("Store access panicked: {}", panic_message(payload.as_ref()));
                    }
                },
            }
        }
        info!("Request serializer stopped: intake closed");
    }

    async fn serve(&mut self, request: Request) {
        let Request { conn, frame } = request;
        let (response, exception) = dispatch(&self.functions, &mut self.store, frame.as_ref());

        if self.verbose {
            info!(
                "{} fc={} len={} -> {}",
                conn.peer(),
                frame.function(),
                frame.data().len(),
                exception
            );
        } else {
            debug!(
                "{} fc={} len={} -> {}",
                conn.peer(),
                frame.function(),
                frame.data().len(),
                exception
            );
        }

        let bytes = response.to_bytes();
        let err = match tokio::time::timeout(self.write_timeout, conn.write(&bytes)).await {
            Ok(Ok(())) => return,
            Ok(Err(e)) => SlaveError::WriteFailed(e.to_string()),
            Err(_) => SlaveError::Timeout(format!("no progress within {:?}", self.write_timeout)),
        };
        if err.log_level() == Level::ERROR {
            error!(
                "Response write to {} failed [{}]: {}",
                conn.peer(),
                err.error_code(),
                err
            );
        } else {
            warn!(
                "Response write to {} failed [{}]: {}",
                conn.peer(),
                err.error_code(),
                err
            );
        }
        self.hang_up(conn.as_ref()).await;
    }

    /// Close a connection whose response did not go out whole
    ///
    /// Part of the frame may already be on the wire; anything written after it
    /// would be misread by the client.
    async fn hang_up(&self, conn: &dyn Connection) {
        match tokio::time::timeout(self.write_timeout, conn.close()).await {
            Ok(Ok(())) => debug!("Closed {} after failed response", conn.peer()),
            Ok(Err(e)) => debug!("Close of {} failed: {}", conn.peer(), e),
            Err(_) => warn!("Close of {} timed out", conn.peer()),
        }
    }
}
