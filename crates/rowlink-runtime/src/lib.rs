//! `rowlink-runtime` – device manager for Concept2 rowing ergometers.
//!
//! [`ErgManager`] scans a bus for ergs, gives each one a polling worker, and
//! reports everything to an [`ErgObserver`] from a single dispatch task, in
//! the order it happened.
//!
//! # Modules
//!
//! - [`manager`] – [`ErgManager`][manager::ErgManager]: discovery loop,
//!   broadcast workouts, and ordered shutdown.
//! - [`handle`] – [`ErgHandle`][handle::ErgHandle]: a cloneable handle that
//!   queues commands for one device's worker.
//! - [`registry`] – [`ErgRegistry`][registry::ErgRegistry]: tracked devices
//!   and their aliases.
//! - [`event`] – [`EventSink`][event::EventSink] and
//!   [`EventStream`][event::EventStream]: the FIFO between workers and the
//!   dispatcher.
//! - [`observer`] – [`ErgObserver`][observer::ErgObserver]: application
//!   callbacks.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: console logs
//!   plus optional OTLP span export.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use rowlink_hal::{LoopbackCodec, SimBus};
//! use rowlink_runtime::{ErgHandle, ErgManager, ErgObserver, ManagerConfig};
//! use rowlink_types::{DeviceId, ErgUpdate};
//!
//! struct Print;
//!
//! impl ErgObserver for Print {
//!     fn on_new_device(&self, device: &DeviceId, _handle: &ErgHandle) -> Option<String> {
//!         println!("found {device}");
//!         None
//!     }
//!
//!     fn on_update(&self, device: &DeviceId, update: &ErgUpdate) {
//!         println!("{device}: {:?}", update.monitor.float("distance"));
//!     }
//! }
//!
//! # async fn demo() -> Result<(), rowlink_types::RowError> {
//! let manager = ErgManager::start(
//!     Arc::new(SimBus::with_ergs(2)),
//!     Arc::new(LoopbackCodec),
//!     ManagerConfig::default(),
//!     Arc::new(Print),
//! )?;
//! manager.set_distance(2000).await?;
//! manager.stop().await;
//! # Ok(())
//! # }
//! ```

mod dispatcher;
pub mod event;
pub mod handle;
pub mod manager;
pub mod observer;
pub mod registry;
pub mod telemetry;
mod worker;

pub use event::{EventKind, EventSink, EventStream, ManagerEvent};
pub use handle::ErgHandle;
pub use manager::{BroadcastOutcome, ErgManager, ManagerConfig, ManagerState};
pub use observer::ErgObserver;
pub use registry::ErgRegistry;
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
