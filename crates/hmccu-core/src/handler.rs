// ── Event handlers ──
//
// What the channel fans decoded hub events out to. Devices register
// themselves here; host code can register plain closures.

use std::sync::Arc;

use crate::error::CoreError;

/// A single datapoint change pushed by the hub.
///
/// The value is carried as its literal text (`"0.5"`, `"true"`); each
/// consumer parses it for the datapoint it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEvent {
    pub address: String,
    pub attribute: String,
    pub raw_value: String,
}

/// Receiver of device events.
///
/// Invoked synchronously on the callback listener's task. Implementations
/// should return quickly; a returned error is logged and does not affect
/// other handlers.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &DeviceEvent) -> Result<(), CoreError>;
}

impl<F> EventHandler for F
where
    F: Fn(&DeviceEvent) -> Result<(), CoreError> + Send + Sync,
{
    fn on_event(&self, event: &DeviceEvent) -> Result<(), CoreError> {
        self(event)
    }
}

/// Identity of a registered handler: the address of its allocation.
pub(crate) fn handler_key(handler: &Arc<dyn EventHandler>) -> usize {
    Arc::as_ptr(handler).cast::<()>().addr()
}
