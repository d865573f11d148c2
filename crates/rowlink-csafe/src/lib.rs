//! `rowlink-csafe` – The Protocol Client
//!
//! Speaks CSAFE to one performance monitor over an
//! [`ErgTransport`][rowlink_hal::ErgTransport].
//!
//! # Modules
//!
//! - [`session`] – [`ErgSession`], the per-device client: typed telemetry,
//!   workout and identity queries, frame pacing, and fault classification.
//! - [`workout`] – validation of [`WorkoutRequest`][rowlink_types::WorkoutRequest]s
//!   into command lists, plus the power/pace unit conversions.
//! - [`pretty`] – integer status and enum codes to human-readable labels.

pub mod pretty;
pub mod session;
pub mod workout;

pub use pretty::{label_for, prettify};
pub use session::{ErgSession, SessionConfig};
pub use workout::build_workout;
