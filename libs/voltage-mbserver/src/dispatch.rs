//! Function-code dispatch
//!
//! A flat table of 256 slots indexed by function code. Overrides may race
//! with in-flight dispatch; each lookup clones the handler out of the lock,
//! so a request already being executed keeps the handler it started with.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use parking_lot::RwLock;
use tracing::{debug, error};

use crate::exception::Exception;
use crate::frame::Frame;
use crate::functions::{self, Handler};
use crate::store::RegisterStore;

const SLOTS: usize = 256;

pub struct FunctionTable {
    slots: RwLock<[Option<Handler>; SLOTS]>,
}

impl FunctionTable {
    /// Empty table: every code yields IllegalFunction
    pub fn empty() -> Self {
        Self {
            slots: RwLock::new(std::array::from_fn(|_| None)),
        }
    }

    /// Table with the standard data-access handlers installed
    pub fn with_defaults() -> Self {
        let table = Self::empty();
        for (code, handler) in functions::default_handlers() {
            table.register(code, handler);
        }
        table
    }

    /// Install `handler` for `code`, replacing any previous one
    pub fn register(&self, code: u8, handler: Handler) {
        let replaced = self.slots.write()[usize::from(code)]
            .replace(handler)
            .is_some();
        debug!("Function {} registered (replaced: {})", code, replaced);
    }

    pub fn unregister(&self, code: u8) -> Option<Handler> {
        self.slots.write()[usize::from(code)].take()
    }

    pub fn lookup(&self, code: u8) -> Option<Handler> {
        self.slots.read()[usize::from(code)].clone()
    }

    pub fn registered_codes(&self) -> Vec<u8> {
        self.slots
            .read()
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(code, _)| code as u8)
            .collect()
    }
}

impl Default for FunctionTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTable")
            .field("registered", &self.registered_codes())
            .finish()
    }
}

/// Execute one request against the store and build its response frame
///
/// Unregistered codes yield IllegalFunction without touching the store. A
/// handler's exception, when not Success, takes precedence over its payload.
/// A panicking handler yields SlaveDeviceFailure; whatever it wrote to the
/// store before panicking stays written.
pub fn dispatch(
    functions: &FunctionTable,
    store: &mut RegisterStore,
    request: &dyn Frame,
) -> (Box<dyn Frame>, Exception) {
    let mut response = request.copy_frame();

    let code = request.function();
    let (payload, exception) = match functions.lookup(code) {
        Some(handler) => match panic::catch_unwind(AssertUnwindSafe(|| handler(store, request))) {
            Ok(result) => result,
            Err(payload) => {
                error!(
                    "Handler for function {} panicked: {}",
                    code,
                    panic_message(payload.as_ref())
                );
                (Vec::new(), Exception::SlaveDeviceFailure)
            },
        },
        None => (Vec::new(), Exception::IllegalFunction),
    };

    response.set_data(payload);
    if !exception.is_success() {
        response.set_exception(exception);
    }
    (response, exception)
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    match payload.downcast_ref::<&str>() {
        Some(message) => message,
        None => payload
            .downcast_ref::<String>()
            .map_or("non-string panic payload", String::as_str),
    }
}
