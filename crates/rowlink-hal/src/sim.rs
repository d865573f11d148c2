//! In-process simulated bus for CI/CD testing without physical hardware.
//!
//! [`SimBus`] enumerates [`SimErg`] devices that answer CSAFE requests with
//! plausible, deterministic telemetry.  Frames are JSON produced by
//! [`LoopbackCodec`], so the whole stack (session, workers, manager) runs in
//! headless tests and in the CLI.
//!
//! Each [`SimErg`] is a cheap cloneable handle; tests keep a clone to inject
//! faults (unplug, busy endpoint, failing writes) and to inspect what the
//! device received.
//!
//! # Example
//!
//! ```rust
//! use rowlink_hal::sim::{LoopbackCodec, SimBus};
//! use rowlink_hal::{ErgBus, FrameCodec};
//! use rowlink_types::{CsafeCommand, CsafeToken};
//!
//! # async fn demo() {
//! let bus = SimBus::with_ergs(2);
//! let devices = bus.find().await.unwrap();
//! assert_eq!(devices.len(), 2);
//!
//! let mut transport = bus.open(&devices[0]).await.unwrap();
//! let codec = LoopbackCodec;
//! let frame = codec.encode(&[CsafeCommand::new(CsafeToken::GetPower)]).unwrap();
//! transport.write(&frame).await.unwrap();
//! let reply = codec.decode(&transport.read(4096).await.unwrap()).unwrap();
//! assert_eq!(reply[&CsafeToken::GetPower], vec![150]);
//! # }
//! ```

use std::f64::consts::PI;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use rowlink_types::{CsafeCommand, CsafeToken, DeviceId, ResponseMap};
use tokio::time::Instant;
use tracing::debug;

use crate::bus::{BusError, C2_VENDOR_ID, DeviceDescriptor, ErgBus};
use crate::codec::{CodecError, FrameCodec};
use crate::transport::{ErgTransport, TransportError};

const PM_PRODUCT_ID: u16 = 0x0003;

const STATUS_READY: u32 = 1;
const STATUS_IN_USE: u32 = 5;
/// Frame-toggle bit the monitor flips in the status word on every response.
const FRAME_TOGGLE: u32 = 0x80;

const SIM_SPM: u32 = 30;
const SIM_POWER: u32 = 150;
const SIM_HEARTRATE: u32 = 100;
const SIM_STROKE_STATE: u32 = 4;
const SIM_FORCEPLOT_SAMPLES: usize = 32;
/// mfgid, cid, model, hwversion, swversion
const SIM_VERSION: [u32; 5] = [22, 0, 5, 0, 0];
/// maxrx, maxtx, mininterframe
const SIM_CAPS: [u32; 3] = [120, 120, 50];

// ────────────────────────────────────────────────────────────────────────────
// Loopback codec
// ────────────────────────────────────────────────────────────────────────────

/// JSON frame codec understood by [`SimErg`].
///
/// Requests are the serialised command list, responses the serialised
/// [`ResponseMap`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopbackCodec;

impl FrameCodec for LoopbackCodec {
    fn encode(&self, commands: &[CsafeCommand]) -> Result<Vec<u8>, CodecError> {
        if let Some(bad) = commands.iter().find(|c| !c.is_well_formed()) {
            return Err(CodecError::Encode(format!(
                "{} expects {} argument(s), got {}",
                bad.token,
                bad.token.arg_count(),
                bad.args.len()
            )));
        }
        serde_json::to_vec(commands).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, frame: &[u8]) -> Result<ResponseMap, CodecError> {
        if frame.is_empty() {
            return Err(CodecError::ShortFrame);
        }
        serde_json::from_slice(frame).map_err(|e| CodecError::Corrupt(e.to_string()))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated erg
// ────────────────────────────────────────────────────────────────────────────

struct SimErgState {
    status: u32,
    power: u32,
    attached: bool,
    busy: bool,
    fail_writes: bool,
    toggle: bool,
    started: Instant,
    pending: Option<Vec<u8>>,
    writes: Vec<Instant>,
    frames: Vec<Vec<CsafeCommand>>,
}

/// A simulated performance monitor.
#[derive(Clone)]
pub struct SimErg {
    descriptor: DeviceDescriptor,
    state: Arc<Mutex<SimErgState>>,
}

impl SimErg {
    /// A monitor at the given bus location, without a serial number.
    pub fn new(bus: u8, address: u8) -> Self {
        Self {
            descriptor: DeviceDescriptor {
                bus,
                address,
                vendor_id: C2_VENDOR_ID,
                product_id: PM_PRODUCT_ID,
                serial: None,
            },
            state: Arc::new(Mutex::new(SimErgState {
                status: STATUS_READY,
                power: SIM_POWER,
                attached: true,
                busy: false,
                fail_writes: false,
                toggle: false,
                started: Instant::now(),
                pending: None,
                writes: Vec::new(),
                frames: Vec::new(),
            })),
        }
    }

    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.descriptor.serial = Some(serial.into());
        self
    }

    /// Override the constant power output (watts).
    pub fn with_power(self, watts: u32) -> Self {
        self.lock().power = watts;
        self
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub fn identity(&self) -> DeviceId {
        self.descriptor.identity()
    }

    /// Pull the cable: discovery stops listing the device and every transport
    /// call reports [`TransportError::Disconnected`].
    pub fn unplug(&self) {
        self.lock().attached = false;
    }

    pub fn is_attached(&self) -> bool {
        self.lock().attached
    }

    /// Make every transport call report [`TransportError::Busy`].
    pub fn set_busy(&self, busy: bool) {
        self.lock().busy = busy;
    }

    /// Make writes fail with [`TransportError::Io`].
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Current status code (low nibble of the status word).
    pub fn status(&self) -> u32 {
        self.lock().status
    }

    /// Instants at which frames were accepted, oldest first.
    pub fn write_times(&self) -> Vec<Instant> {
        self.lock().writes.clone()
    }

    /// Every request frame received, oldest first.
    pub fn frames(&self) -> Vec<Vec<CsafeCommand>> {
        self.lock().frames.clone()
    }

    fn lock(&self) -> MutexGuard<'_, SimErgState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Smooth distance curve (meters) for a steady piece, zero at `t = 0`.
fn sim_distance(t: f64) -> f64 {
    40.3 + 4.0 * t - 60.0 * (-t / 120.0).exp() + 20.0 * (-t / 4.0).exp()
        + 80.0 * (PI * t / 480.0).sin()
        - 0.3 * (PI * t).cos()
}

fn respond(state: &mut SimErgState, serial: u32, commands: &[CsafeCommand]) -> ResponseMap {
    let elapsed = state.started.elapsed().as_secs_f64();
    let mut map = ResponseMap::new();
    for cmd in commands {
        let fields = match cmd.token {
            CsafeToken::GetWorkTime => vec![(elapsed * 100.0).round() as u32, 0],
            CsafeToken::GetWorkDistance => {
                vec![(sim_distance(elapsed) * 10.0).round().max(0.0) as u32, 0]
            }
            CsafeToken::GetCadence => vec![SIM_SPM],
            CsafeToken::GetPower => vec![state.power],
            CsafeToken::GetCalories => vec![elapsed.round() as u32],
            CsafeToken::GetHrCur => vec![SIM_HEARTRATE],
            CsafeToken::GetForcePlotData => {
                let mut data = vec![(SIM_FORCEPLOT_SAMPLES * 2) as u32];
                data.extend(std::iter::repeat_n(1, SIM_FORCEPLOT_SAMPLES));
                data
            }
            CsafeToken::GetStrokeState => vec![SIM_STROKE_STATE],
            CsafeToken::GetId => vec![0],
            CsafeToken::GetWorkoutType => vec![0],
            CsafeToken::GetWorkoutState => vec![1],
            CsafeToken::GetIntervalType => vec![1],
            CsafeToken::GetWorkoutIntervalCount => vec![0],
            CsafeToken::GetVersion => SIM_VERSION.to_vec(),
            CsafeToken::GetSerial => vec![serial],
            CsafeToken::GetCaps => SIM_CAPS.to_vec(),
            CsafeToken::Reset => {
                state.status = STATUS_READY;
                state.started = Instant::now();
                Vec::new()
            }
            CsafeToken::GoInUse => {
                state.status = STATUS_IN_USE;
                Vec::new()
            }
            CsafeToken::GetStatus
            | CsafeToken::SetTime
            | CsafeToken::SetDate
            | CsafeToken::SetTWork
            | CsafeToken::SetHorizontal
            | CsafeToken::SetPower
            | CsafeToken::SetProgram
            | CsafeToken::SetSplitDuration => Vec::new(),
        };
        map.insert(cmd.token, fields);
    }
    state.toggle = !state.toggle;
    let toggle = if state.toggle { FRAME_TOGGLE } else { 0 };
    map.insert(CsafeToken::GetStatus, vec![state.status | toggle]);
    map
}

/// Transport bound to one [`SimErg`].
struct SimTransport {
    erg: SimErg,
}

#[async_trait]
impl ErgTransport for SimTransport {
    async fn write(&mut self, frame: &[u8]) -> Result<usize, TransportError> {
        let serial = self
            .erg
            .descriptor
            .serial
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let mut state = self.erg.lock();
        if !state.attached {
            return Err(TransportError::Disconnected);
        }
        if state.busy {
            return Err(TransportError::Busy);
        }
        if state.fail_writes {
            return Err(TransportError::Io("injected write failure".to_string()));
        }
        state.writes.push(Instant::now());

        let commands: Vec<CsafeCommand> =
            serde_json::from_slice(frame).map_err(|e| TransportError::Io(e.to_string()))?;
        let response = respond(&mut state, serial, &commands);
        state.frames.push(commands);
        state.pending =
            Some(serde_json::to_vec(&response).map_err(|e| TransportError::Io(e.to_string()))?);
        Ok(frame.len())
    }

    async fn read(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        let mut state = self.erg.lock();
        if !state.attached {
            return Err(TransportError::Disconnected);
        }
        if state.busy {
            return Err(TransportError::Busy);
        }
        let mut frame = state.pending.take().unwrap_or_default();
        frame.truncate(max_len);
        Ok(frame)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated bus
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct SimBusState {
    ergs: Vec<SimErg>,
    busy: bool,
}

/// A bus populated with simulated ergs.  Clones share the same devices.
#[derive(Clone, Default)]
pub struct SimBus {
    state: Arc<Mutex<SimBusState>>,
}

impl SimBus {
    /// An empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// A bus with `count` ergs at addresses `1..=count`, each with a distinct
    /// serial number.
    pub fn with_ergs(count: u8) -> Self {
        (1..=count).fold(Self::new(), |bus, n| {
            bus.with_erg(SimErg::new(1, n).with_serial(format!("43{:07}", n)))
        })
    }

    pub fn with_erg(self, erg: SimErg) -> Self {
        self.attach(erg);
        self
    }

    /// Plug in another erg; it shows up on the next `find`.
    pub fn attach(&self, erg: SimErg) {
        debug!(device = %erg.identity(), "sim erg attached");
        self.lock().ergs.push(erg);
    }

    /// Unplug and forget the erg with the given identity.
    pub fn detach(&self, identity: &DeviceId) -> Option<SimErg> {
        let mut state = self.lock();
        let pos = state.ergs.iter().position(|e| &e.identity() == identity)?;
        let erg = state.ergs.remove(pos);
        erg.unplug();
        debug!(device = %identity, "sim erg detached");
        Some(erg)
    }

    pub fn erg(&self, identity: &DeviceId) -> Option<SimErg> {
        self.lock()
            .ergs
            .iter()
            .find(|e| &e.identity() == identity)
            .cloned()
    }

    pub fn ergs(&self) -> Vec<SimErg> {
        self.lock().ergs.clone()
    }

    /// Make `find` report [`BusError::Busy`].
    pub fn set_busy(&self, busy: bool) {
        self.lock().busy = busy;
    }

    fn lock(&self) -> MutexGuard<'_, SimBusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ErgBus for SimBus {
    async fn find(&self) -> Result<Vec<DeviceDescriptor>, BusError> {
        let state = self.lock();
        if state.busy {
            return Err(BusError::Busy);
        }
        Ok(state
            .ergs
            .iter()
            .filter(|e| e.is_attached())
            .map(|e| e.descriptor.clone())
            .collect())
    }

    async fn open(&self, device: &DeviceDescriptor) -> Result<Box<dyn ErgTransport>, BusError> {
        let state = self.lock();
        state
            .ergs
            .iter()
            .find(|e| &e.descriptor == device && e.is_attached())
            .map(|e| Box::new(SimTransport { erg: e.clone() }) as Box<dyn ErgTransport>)
            .ok_or_else(|| {
                BusError::Unavailable(format!(
                    "no simulated erg at bus{}-addr{}",
                    device.bus, device.address
                ))
            })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
