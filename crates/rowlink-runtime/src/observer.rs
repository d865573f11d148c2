//! The application-facing callback interface.

use rowlink_types::{DeviceId, ErgUpdate, RowError};
use tracing::warn;

use crate::handle::ErgHandle;

/// Receives manager events on the dispatch task.
///
/// Callbacks run synchronously, one at a time, in event order.  They must
/// not block: a slow observer delays every later event.  Hand long work off
/// to another task (see the TCP relay in `rowlink-cli`).
pub trait ErgObserver: Send + Sync {
    /// A device was discovered.  Return an alias to name it; the alias is
    /// ignored (and [`on_alias_rejected`][Self::on_alias_rejected] called)
    /// when another device already uses it.
    fn on_new_device(&self, device: &DeviceId, handle: &ErgHandle) -> Option<String>;

    /// One polling cycle's telemetry and workout summary.
    fn on_update(&self, device: &DeviceId, update: &ErgUpdate);

    /// The device disconnected; no more updates will follow for it.
    fn on_device_removed(&self, _device: &DeviceId) {}

    fn on_alias_rejected(&self, device: &DeviceId, error: &RowError) {
        warn!(device = %device, error = %error, "alias rejected");
    }
}
