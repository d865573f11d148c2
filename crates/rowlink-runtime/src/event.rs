//! Manager events and the ordered sink they travel through.
//!
//! Every producer (discovery, workers, `stop`) holds a cloned [`EventSink`];
//! the dispatcher owns the single [`EventStream`].  Events are delivered in
//! the order they were pushed.

use chrono::{DateTime, Utc};
use rowlink_types::{DeviceId, ErgUpdate, RowError};
use tokio::sync::mpsc;
use tracing::trace;
use uuid::Uuid;

use crate::handle::ErgHandle;

#[derive(Debug, Clone)]
pub enum EventKind {
    /// A device was discovered and its worker is about to start.
    NewDevice(ErgHandle),
    /// One polling cycle finished.
    Update(ErgUpdate),
    /// The device disconnected and its worker exited.
    Removed,
    /// Terminates the dispatcher.
    Stop,
}

impl EventKind {
    fn label(&self) -> &'static str {
        match self {
            EventKind::NewDevice(_) => "new_device",
            EventKind::Update(_) => "update",
            EventKind::Removed => "removed",
            EventKind::Stop => "stop",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ManagerEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// `None` only for [`EventKind::Stop`].
    pub device: Option<DeviceId>,
    pub kind: EventKind,
}

impl ManagerEvent {
    pub fn new(device: Option<DeviceId>, kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            device,
            kind,
        }
    }
}

/// Producer side of the event queue.  Clone it cheaply.
#[derive(Clone, Debug)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<ManagerEvent>,
}

/// Consumer side of the event queue.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<ManagerEvent>,
}

/// Create a connected sink/stream pair.
pub fn channel() -> (EventSink, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink { tx }, EventStream { rx })
}

impl EventSink {
    /// Enqueue an event about `device`.
    ///
    /// # Errors
    ///
    /// [`RowError::Channel`] when the dispatcher has already exited.
    pub fn push(&self, device: &DeviceId, kind: EventKind) -> Result<(), RowError> {
        self.send(ManagerEvent::new(Some(device.clone()), kind))
    }

    /// Enqueue the terminal [`EventKind::Stop`] marker.
    pub fn push_stop(&self) -> Result<(), RowError> {
        self.send(ManagerEvent::new(None, EventKind::Stop))
    }

    fn send(&self, event: ManagerEvent) -> Result<(), RowError> {
        trace!(kind = event.kind.label(), device = ?event.device, "event queued");
        self.tx
            .send(event)
            .map_err(|e| RowError::Channel(format!("event sink closed: {}", e.0.kind.label())))
    }
}

impl EventStream {
    /// Next event in push order; `None` once every sink is dropped and the
    /// queue is drained.
    pub async fn next(&mut self) -> Option<ManagerEvent> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowlink_types::Reading;

    fn update() -> EventKind {
        EventKind::Update(ErgUpdate {
            monitor: Reading::new(),
            workout: Reading::new(),
        })
    }

    #[tokio::test]
    async fn events_arrive_in_push_order() {
        let (sink, mut stream) = channel();
        let a = DeviceId::new("a");
        let b = DeviceId::new("b");
        sink.push(&a, update()).unwrap();
        sink.push(&b, EventKind::Removed).unwrap();
        sink.clone().push(&a, update()).unwrap();
        sink.push_stop().unwrap();

        let mut seen = Vec::new();
        while let Some(event) = stream.next().await {
            let done = matches!(event.kind, EventKind::Stop);
            seen.push((event.device, event.kind.label()));
            if done {
                break;
            }
        }
        assert_eq!(
            seen,
            vec![
                (Some(a.clone()), "update"),
                (Some(b), "removed"),
                (Some(a), "update"),
                (None, "stop"),
            ]
        );
    }

    #[tokio::test]
    async fn push_after_consumer_dropped_is_a_channel_error() {
        let (sink, stream) = channel();
        drop(stream);
        assert!(matches!(
            sink.push_stop(),
            Err(RowError::Channel(_))
        ));
    }

    #[test]
    fn events_get_unique_ids() {
        let a = ManagerEvent::new(None, EventKind::Stop);
        let b = ManagerEvent::new(None, EventKind::Stop);
        assert_ne!(a.id, b.id);
    }
}
