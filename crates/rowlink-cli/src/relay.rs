//! Observers that forward manager events as newline-delimited JSON.
//!
//! ```text
//! {"event":"new_device","device":"serial:430000001","name":"bow"}
//! {"event":"update","device":"serial:430000001","data":{...}}
//! {"event":"removed","device":"serial:430000001"}
//! ```

use std::collections::BTreeMap;
use std::io::Write;

use rowlink_runtime::{ErgHandle, ErgObserver};
use rowlink_types::{DeviceId, ErgUpdate, RowError};
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Destination for finished lines.  Must not block.
pub trait LineSink: Send + Sync {
    fn send_line(&self, line: String);
}

/// Observer that renders events to JSON and hands them to a [`LineSink`].
pub struct Relay<S> {
    sink: S,
    aliases: BTreeMap<String, String>,
}

pub type StdoutRelay = Relay<StdoutSink>;
pub type TcpRelay = Relay<TcpSink>;

impl<S: LineSink> Relay<S> {
    pub fn new(sink: S, aliases: BTreeMap<String, String>) -> Self {
        Self { sink, aliases }
    }

    /// Emit the `new_device` line and return the configured alias, if any.
    fn announce(&self, device: &DeviceId) -> Option<String> {
        let alias = self.aliases.get(device.as_str()).cloned();
        let name = alias.clone().unwrap_or_else(|| device.to_string());
        self.sink.send_line(
            json!({ "event": "new_device", "device": device, "name": name }).to_string(),
        );
        alias
    }
}

impl<S: LineSink> ErgObserver for Relay<S> {
    fn on_new_device(&self, device: &DeviceId, _handle: &ErgHandle) -> Option<String> {
        self.announce(device)
    }

    fn on_update(&self, device: &DeviceId, update: &ErgUpdate) {
        self.sink.send_line(
            json!({ "event": "update", "device": device, "data": update.merged() }).to_string(),
        );
    }

    fn on_device_removed(&self, device: &DeviceId) {
        self.sink
            .send_line(json!({ "event": "removed", "device": device }).to_string());
    }

    fn on_alias_rejected(&self, device: &DeviceId, error: &RowError) {
        warn!(device = %device, error = %error, "configured alias rejected");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stdout
// ─────────────────────────────────────────────────────────────────────────────

pub struct StdoutSink;

impl LineSink for StdoutSink {
    fn send_line(&self, line: String) {
        let mut out = std::io::stdout().lock();
        if let Err(e) = writeln!(out, "{line}") {
            debug!(error = %e, "stdout closed");
        }
    }
}

impl StdoutRelay {
    pub fn stdout(aliases: BTreeMap<String, String>) -> Self {
        Relay::new(StdoutSink, aliases)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TCP
// ─────────────────────────────────────────────────────────────────────────────

/// Queues lines for a background writer task that owns the socket.
pub struct TcpSink {
    lines: mpsc::UnboundedSender<String>,
}

impl LineSink for TcpSink {
    fn send_line(&self, line: String) {
        if self.lines.send(line).is_err() {
            debug!("tcp relay writer has exited; line dropped");
        }
    }
}

impl TcpRelay {
    /// Connect to `addr` and spawn the writer task.  The task exits when the
    /// peer goes away, or once the relay is dropped and every queued line
    /// has been written; await the returned handle to flush on shutdown.
    pub async fn connect(
        addr: &str,
        aliases: BTreeMap<String, String>,
    ) -> std::io::Result<(Self, JoinHandle<()>)> {
        let stream = TcpStream::connect(addr).await?;
        info!(addr, "relaying events over tcp");
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_lines(stream, rx));
        Ok((Relay::new(TcpSink { lines: tx }, aliases), writer))
    }
}

async fn write_lines(mut stream: TcpStream, mut lines: mpsc::UnboundedReceiver<String>) {
    while let Some(mut line) = lines.recv().await {
        line.push('\n');
        if let Err(e) = stream.write_all(line.as_bytes()).await {
            warn!(error = %e, "tcp relay peer went away");
            return;
        }
    }
    if let Err(e) = stream.shutdown().await {
        debug!(error = %e, "tcp relay shutdown failed");
    }
}
