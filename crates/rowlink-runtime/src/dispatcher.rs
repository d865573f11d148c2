//! Drains the event sink in order and invokes the observer.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::event::{EventKind, EventStream};
use crate::observer::ErgObserver;
use crate::registry::ErgRegistry;

#[instrument(skip_all)]
pub(crate) async fn dispatch(
    mut stream: EventStream,
    registry: Arc<ErgRegistry>,
    observer: Arc<dyn ErgObserver>,
) {
    while let Some(event) = stream.next().await {
        match (event.kind, event.device) {
            (EventKind::Stop, _) => break,
            (EventKind::NewDevice(handle), Some(device)) => {
                let alias = observer
                    .on_new_device(&device, &handle)
                    .filter(|alias| !alias.is_empty());
                if let Some(alias) = alias {
                    match registry.set_alias(&device, &alias) {
                        Ok(()) => debug!(device = %device, alias = %alias, "alias set"),
                        // Gone before its announcement was delivered; the
                        // Removed event follows.
                        Err(e) if e.is_disconnect() => {
                            debug!(device = %device, alias = %alias, "alias dropped for departed erg")
                        }
                        Err(e) => observer.on_alias_rejected(&device, &e),
                    }
                }
            }
            (EventKind::Update(update), Some(device)) => observer.on_update(&device, &update),
            (EventKind::Removed, Some(device)) => observer.on_device_removed(&device),
            (kind, None) => warn!(?kind, "event without device dropped"),
        }
    }
    debug!("dispatcher exited");
}
