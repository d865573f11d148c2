//! [`ErgSession`] – the per-device CSAFE client.
//!
//! A session owns the device transport and shares the stateless frame codec.
//! Every public operation is one or more request/response round-trips:
//!
//! 1. encode the command list,
//! 2. wait until the configured frame gap has passed since this session's
//!    previous send,
//! 3. write the frame and read the response, the pair bounded by one
//!    `io_timeout`,
//! 4. decode the response and pick out the typed fields.
//!
//! Transport and codec faults are classified into [`RowError`] variants so
//! the polling worker can tell transient trouble from a vanished device.
//! There is no internal retry.  A session given a cancellation token refuses
//! to start new round-trips once it fires, so a multi-frame operation stops
//! after the frame in flight.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Local, NaiveDateTime, Timelike};
use rowlink_hal::{ErgTransport, FrameCodec, TransportError};
use rowlink_types::{
    CsafeCommand, CsafeToken, DeviceId, Reading, ResponseMap, RowError, WorkoutRequest,
};
use tokio::time::{Instant, sleep, sleep_until, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

use crate::pretty::prettify;
use crate::workout::{build_workout, calhr_for_power, pace_for_power};

/// Largest response frame the session will accept.
pub const MAX_FRAME_LEN: usize = 4096;
/// Bytes of force-plot data requested per query.
const FORCEPLOT_BYTES: u32 = 32;
/// Pause between reads while waiting for a non-empty response.
const READ_RETRY: Duration = Duration::from_millis(5);
const STATUS_MASK: u32 = 0xF;

/// Timing limits for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Minimum time between the end of one send and the start of the next.
    pub min_frame_gap: Duration,
    /// Upper bound for one write plus the read of its response.
    pub io_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_frame_gap: Duration::from_millis(50),
            io_timeout: Duration::from_secs(2),
        }
    }
}

/// Protocol client bound to one physical erg.
pub struct ErgSession {
    id: DeviceId,
    transport: Box<dyn ErgTransport>,
    codec: Arc<dyn FrameCodec>,
    config: SessionConfig,
    last_send: Option<Instant>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ErgSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErgSession")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("last_send", &self.last_send)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

fn field(
    device: &DeviceId,
    response: &ResponseMap,
    token: CsafeToken,
    index: usize,
) -> Result<u32, RowError> {
    response
        .get(&token)
        .and_then(|fields| fields.get(index))
        .copied()
        .ok_or_else(|| RowError::Decode {
            device: device.clone(),
            details: format!("response lacks field {index} of {token}"),
        })
}

fn status_code(device: &DeviceId, response: &ResponseMap) -> Result<u32, RowError> {
    Ok(field(device, response, CsafeToken::GetStatus, 0)? & STATUS_MASK)
}

/// Force-plot samples following the leading byte count.  A count larger
/// than the data present yields what is present.
fn forceplot_samples(device: &DeviceId, response: &ResponseMap) -> Result<Vec<u32>, RowError> {
    let byte_count = field(device, response, CsafeToken::GetForcePlotData, 0)?;
    let data = &response[&CsafeToken::GetForcePlotData];
    Ok(data
        .iter()
        .skip(1)
        .take((byte_count / 2) as usize)
        .copied()
        .collect())
}

impl ErgSession {
    pub fn new(
        id: DeviceId,
        transport: Box<dyn ErgTransport>,
        codec: Arc<dyn FrameCodec>,
        config: SessionConfig,
    ) -> Self {
        Self {
            id,
            transport,
            codec,
            config,
            last_send: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop issuing frames once `cancel` fires.  Requests made afterwards
    /// fail with [`RowError::Cancelled`].
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // ── Queries ─────────────────────────────────────────────────────────────

    /// Live telemetry for the current piece.
    ///
    /// Fields: `time` (s), `distance` (m), `spm`, `power` (W), `pace`
    /// (s/500 m), `calhr`, `calories`, `heartrate`, `status`, and with
    /// `forceplot` also `forceplot` and `strokestate`.
    #[instrument(skip(self), fields(device = %self.id))]
    pub async fn monitor(&mut self, forceplot: bool, pretty: bool) -> Result<Reading, RowError> {
        let mut commands: Vec<CsafeCommand> = [
            CsafeToken::GetWorkTime,
            CsafeToken::GetWorkDistance,
            CsafeToken::GetCadence,
            CsafeToken::GetPower,
            CsafeToken::GetCalories,
            CsafeToken::GetHrCur,
        ]
        .into_iter()
        .map(CsafeCommand::new)
        .collect();
        if forceplot {
            commands.push(CsafeCommand::with_args(
                CsafeToken::GetForcePlotData,
                [FORCEPLOT_BYTES],
            ));
            commands.push(CsafeCommand::new(CsafeToken::GetStrokeState));
        }

        let r = self.send(&commands).await?;
        let id = &self.id;
        let sum = |token| -> Result<f64, RowError> {
            Ok(f64::from(field(id, &r, token, 0)?) + f64::from(field(id, &r, token, 1)?))
        };

        let mut monitor = Reading::new();
        monitor.insert("time", sum(CsafeToken::GetWorkTime)? / 100.0);
        monitor.insert("distance", sum(CsafeToken::GetWorkDistance)? / 10.0);
        monitor.insert("spm", field(id, &r, CsafeToken::GetCadence, 0)?);
        let power = field(id, &r, CsafeToken::GetPower, 0)?;
        monitor.insert("power", power);
        monitor.insert("pace", pace_for_power(power));
        monitor.insert("calhr", calhr_for_power(power));
        monitor.insert("calories", field(id, &r, CsafeToken::GetCalories, 0)?);
        monitor.insert("heartrate", field(id, &r, CsafeToken::GetHrCur, 0)?);
        if forceplot {
            monitor.insert("forceplot", forceplot_samples(id, &r)?);
            monitor.insert("strokestate", field(id, &r, CsafeToken::GetStrokeState, 0)?);
        }
        monitor.insert("status", status_code(id, &r)?);

        prettify(&mut monitor, pretty);
        Ok(monitor)
    }

    /// Force curve of the last stroke: `forceplot`, `strokestate`, `status`.
    #[instrument(skip(self), fields(device = %self.id))]
    pub async fn force_plot(&mut self, pretty: bool) -> Result<Reading, RowError> {
        let r = self
            .send(&[
                CsafeCommand::with_args(CsafeToken::GetForcePlotData, [FORCEPLOT_BYTES]),
                CsafeCommand::new(CsafeToken::GetStrokeState),
            ])
            .await?;
        let id = &self.id;

        let mut plot = Reading::new();
        plot.insert("forceplot", forceplot_samples(id, &r)?);
        plot.insert("strokestate", field(id, &r, CsafeToken::GetStrokeState, 0)?);
        plot.insert("status", status_code(id, &r)?);
        prettify(&mut plot, pretty);
        Ok(plot)
    }

    /// Workout summary: `userid`, `workouttype`, `workoutstate`, `inttype`,
    /// `intcount`, `status`.
    #[instrument(skip(self), fields(device = %self.id))]
    pub async fn workout(&mut self, pretty: bool) -> Result<Reading, RowError> {
        let r = self
            .send(&[
                CsafeCommand::new(CsafeToken::GetId),
                CsafeCommand::new(CsafeToken::GetWorkoutType),
                CsafeCommand::new(CsafeToken::GetWorkoutState),
                CsafeCommand::new(CsafeToken::GetIntervalType),
                CsafeCommand::new(CsafeToken::GetWorkoutIntervalCount),
            ])
            .await?;
        let id = &self.id;

        let mut workout = Reading::new();
        workout.insert("userid", field(id, &r, CsafeToken::GetId, 0)?);
        workout.insert("workouttype", field(id, &r, CsafeToken::GetWorkoutType, 0)?);
        workout.insert("workoutstate", field(id, &r, CsafeToken::GetWorkoutState, 0)?);
        workout.insert("inttype", field(id, &r, CsafeToken::GetIntervalType, 0)?);
        workout.insert(
            "intcount",
            field(id, &r, CsafeToken::GetWorkoutIntervalCount, 0)?,
        );
        workout.insert("status", status_code(id, &r)?);
        prettify(&mut workout, pretty);
        Ok(workout)
    }

    /// Monitor identity and capabilities.
    #[instrument(skip(self), fields(device = %self.id))]
    pub async fn erg_info(&mut self, pretty: bool) -> Result<Reading, RowError> {
        let r = self
            .send(&[
                CsafeCommand::new(CsafeToken::GetVersion),
                CsafeCommand::new(CsafeToken::GetSerial),
                CsafeCommand::with_args(CsafeToken::GetCaps, [0]),
            ])
            .await?;
        let id = &self.id;

        let mut info = Reading::new();
        for (i, key) in ["mfgid", "cid", "model", "hwversion", "swversion"]
            .into_iter()
            .enumerate()
        {
            info.insert(key, field(id, &r, CsafeToken::GetVersion, i)?);
        }
        info.insert("serial", field(id, &r, CsafeToken::GetSerial, 0)?);
        for (i, key) in ["maxrx", "maxtx", "mininterframe"].into_iter().enumerate() {
            info.insert(key, field(id, &r, CsafeToken::GetCaps, i)?);
        }
        info.insert("status", status_code(id, &r)?);
        prettify(&mut info, pretty);
        Ok(info)
    }

    #[instrument(skip(self), fields(device = %self.id))]
    pub async fn status(&mut self, pretty: bool) -> Result<Reading, RowError> {
        let r = self
            .send(&[CsafeCommand::new(CsafeToken::GetStatus)])
            .await?;
        let mut status = Reading::new();
        status.insert("status", status_code(&self.id, &r)?);
        prettify(&mut status, pretty);
        Ok(status)
    }

    // ── Commands ────────────────────────────────────────────────────────────

    /// Set the monitor clock to the host's local time.
    pub async fn set_clock(&mut self) -> Result<(), RowError> {
        self.set_clock_to(Local::now().naive_local()).await
    }

    #[instrument(skip(self), fields(device = %self.id))]
    pub async fn set_clock_to(&mut self, now: NaiveDateTime) -> Result<(), RowError> {
        let year = u32::try_from(now.year() - 1900).map_err(|_| RowError::Encode {
            device: self.id.clone(),
            details: format!("year {} predates 1900", now.year()),
        })?;
        self.send(&[
            CsafeCommand::with_args(
                CsafeToken::SetTime,
                [now.hour(), now.minute(), now.second()],
            ),
            CsafeCommand::with_args(CsafeToken::SetDate, [year, now.month(), now.day()]),
        ])
        .await?;
        Ok(())
    }

    /// Program a workout and put the monitor in use.
    ///
    /// # Errors
    ///
    /// [`RowError::Validation`] when the request is invalid; the device is
    /// not contacted in that case.
    #[instrument(skip(self), fields(device = %self.id))]
    pub async fn set_workout(&mut self, request: &WorkoutRequest) -> Result<(), RowError> {
        let commands = build_workout(request)?;
        self.send(&[CsafeCommand::new(CsafeToken::Reset)]).await?;
        self.send(&commands).await?;
        debug!(commands = commands.len(), "workout programmed");
        Ok(())
    }

    // ── Framing ─────────────────────────────────────────────────────────────

    /// One request/response round-trip.
    ///
    /// # Errors
    ///
    /// [`RowError::Cancelled`] or [`RowError::Encode`] before anything is
    /// sent; afterwards [`RowError::Busy`], [`RowError::Disconnected`] or
    /// [`RowError::Decode`].
    pub async fn send(&mut self, commands: &[CsafeCommand]) -> Result<ResponseMap, RowError> {
        let frame = self.codec.encode(commands).map_err(|e| RowError::Encode {
            device: self.id.clone(),
            details: e.to_string(),
        })?;

        if let Some(last) = self.last_send {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {}
                () = sleep_until(last + self.config.min_frame_gap) => {}
            }
        }
        if self.cancel.is_cancelled() {
            return Err(RowError::Cancelled {
                device: self.id.clone(),
            });
        }

        let exchanged = timeout(self.config.io_timeout, self.exchange(&frame)).await;
        let response = match exchanged {
            Ok(result) => result?,
            Err(_) => return Err(self.busy("no response before timeout")),
        };
        trace!(commands = commands.len(), bytes = response.len(), "frame answered");

        self.codec.decode(&response).map_err(|e| RowError::Decode {
            device: self.id.clone(),
            details: e.to_string(),
        })
    }

    /// Write `frame` and wait for the non-empty response.
    async fn exchange(&mut self, frame: &[u8]) -> Result<Vec<u8>, RowError> {
        let write = self.transport.write(frame).await;
        self.last_send = Some(Instant::now());
        write.map_err(|e| self.transport_fault(e))?;
        self.read_frame().await
    }

    async fn read_frame(&mut self) -> Result<Vec<u8>, RowError> {
        loop {
            let read = self.transport.read(MAX_FRAME_LEN).await;
            let frame = read.map_err(|e| self.transport_fault(e))?;
            if !frame.is_empty() {
                return Ok(frame);
            }
            sleep(READ_RETRY).await;
        }
    }

    fn transport_fault(&self, error: TransportError) -> RowError {
        match error {
            TransportError::Disconnected => RowError::Disconnected {
                device: self.id.clone(),
                details: error.to_string(),
            },
            TransportError::Busy | TransportError::Io(_) => self.busy(&error.to_string()),
        }
    }

    fn busy(&self, details: &str) -> RowError {
        RowError::Busy {
            device: self.id.clone(),
            details: details.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rowlink_hal::{ErgBus, LoopbackCodec, SimBus, SimErg};
    use rowlink_types::{FieldValue, ValidationError};

    async fn open(erg: &SimErg) -> ErgSession {
        let bus = SimBus::new().with_erg(erg.clone());
        let transport = bus.open(erg.descriptor()).await.unwrap();
        ErgSession::new(
            erg.identity(),
            transport,
            Arc::new(LoopbackCodec),
            SessionConfig::default(),
        )
    }

    /// Transport that accepts every write and answers with a fixed frame.
    struct CannedTransport {
        reply: Vec<u8>,
    }

    #[async_trait]
    impl ErgTransport for CannedTransport {
        async fn write(&mut self, frame: &[u8]) -> Result<usize, TransportError> {
            Ok(frame.len())
        }

        async fn read(&mut self, _max_len: usize) -> Result<Vec<u8>, TransportError> {
            Ok(self.reply.clone())
        }
    }

    fn canned(reply: &[u8]) -> ErgSession {
        ErgSession::new(
            DeviceId::new("canned"),
            Box::new(CannedTransport {
                reply: reply.to_vec(),
            }),
            Arc::new(LoopbackCodec),
            SessionConfig::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn monitor_decodes_telemetry() {
        let erg = SimErg::new(1, 1);
        let mut session = open(&erg).await;

        let monitor = session.monitor(true, false).await.unwrap();
        assert_eq!(monitor.int("power"), Some(150));
        assert_eq!(monitor.int("spm"), Some(30));
        assert_eq!(monitor.int("heartrate"), Some(100));
        assert_eq!(monitor.float("pace"), Some(pace_for_power(150)));
        assert!((monitor.float("calhr").unwrap() - 816.24).abs() < 1e-9);
        assert_eq!(monitor.int("status"), Some(1));
        assert_eq!(monitor.int("strokestate"), Some(4));
        match monitor.get("forceplot") {
            Some(FieldValue::Samples(samples)) => assert_eq!(samples.len(), 32),
            other => panic!("unexpected forceplot {other:?}"),
        }
        assert!(monitor.float("time").is_some());
        assert!(monitor.float("distance").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn monitor_without_forceplot_and_pretty() {
        let erg = SimErg::new(1, 1);
        let mut session = open(&erg).await;

        let monitor = session.monitor(false, true).await.unwrap();
        assert!(!monitor.contains_key("forceplot"));
        assert!(!monitor.contains_key("strokestate"));
        assert_eq!(monitor.label("status"), Some("Ready"));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_erg_reports_zero_pace() {
        let erg = SimErg::new(1, 1).with_power(0);
        let mut session = open(&erg).await;

        let monitor = session.monitor(false, false).await.unwrap();
        assert_eq!(monitor.float("pace"), Some(0.0));
        assert_eq!(monitor.float("calhr"), Some(0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn sends_respect_frame_gap() {
        let erg = SimErg::new(1, 1);
        let mut session = open(&erg).await;

        for _ in 0..4 {
            session.status(false).await.unwrap();
        }
        let times = erg.write_times();
        assert_eq!(times.len(), 4);
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= session.config().min_frame_gap);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn workout_and_info_queries() {
        let erg = SimErg::new(1, 1).with_serial("430000042");
        let mut session = open(&erg).await;

        let workout = session.workout(true).await.unwrap();
        assert_eq!(workout.label("workouttype"), Some("Just Row / no splits"));
        assert_eq!(workout.label("workoutstate"), Some("Workout row"));
        assert_eq!(workout.label("inttype"), Some("Distance"));
        assert_eq!(workout.int("intcount"), Some(0));

        let info = session.erg_info(false).await.unwrap();
        assert_eq!(info.int("serial"), Some(430_000_042));
        assert_eq!(info.int("mfgid"), Some(22));
        assert_eq!(info.int("mininterframe"), Some(50));

        let plot = session.force_plot(true).await.unwrap();
        assert_eq!(plot.label("strokestate"), Some("Recovery"));
    }

    #[tokio::test(start_paused = true)]
    async fn set_workout_resets_then_programs() {
        let erg = SimErg::new(1, 1);
        let mut session = open(&erg).await;

        session
            .set_workout(&WorkoutRequest::distance(2000).with_split(500.0))
            .await
            .unwrap();

        let frames = erg.frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], vec![CsafeCommand::new(CsafeToken::Reset)]);
        assert_eq!(
            frames[1][0],
            CsafeCommand::with_args(CsafeToken::SetHorizontal, [2000, 36])
        );
        assert_eq!(
            frames[1].last(),
            Some(&CsafeCommand::new(CsafeToken::GoInUse))
        );
        assert_eq!(erg.status(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_workout_never_reaches_device() {
        let erg = SimErg::new(1, 1);
        let mut session = open(&erg).await;

        let err = session
            .set_workout(&WorkoutRequest::distance(99))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RowError::Validation(ValidationError::OutOfRange { .. })
        ));
        assert!(erg.frames().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn set_clock_sends_years_since_1900() {
        let erg = SimErg::new(1, 1);
        let mut session = open(&erg).await;
        let now = chrono::NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(7, 5, 30)
            .unwrap();

        session.set_clock_to(now).await.unwrap();
        assert_eq!(
            erg.frames()[0],
            vec![
                CsafeCommand::with_args(CsafeToken::SetTime, [7, 5, 30]),
                CsafeCommand::with_args(CsafeToken::SetDate, [124, 3, 9]),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn transport_faults_are_classified() {
        let erg = SimErg::new(1, 1);
        let mut session = open(&erg).await;

        erg.set_busy(true);
        assert!(matches!(
            session.status(false).await,
            Err(RowError::Busy { .. })
        ));
        erg.set_busy(false);

        erg.fail_writes(true);
        let err = session.status(false).await.unwrap_err();
        assert!(err.is_transient());
        erg.fail_writes(false);

        erg.unplug();
        assert!(session.monitor(false, false).await.unwrap_err().is_disconnect());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_fields_are_decode_errors() {
        let mut session = canned(b"{}");
        assert!(matches!(
            session.status(false).await,
            Err(RowError::Decode { .. })
        ));

        let mut session = canned(b"garbage");
        assert!(matches!(
            session.monitor(false, false).await,
            Err(RowError::Decode { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn short_force_plot_is_truncated_safely() {
        let mut session = canned(
            br#"{"CSAFE_PM_GET_FORCEPLOTDATA":[64,7,8],"CSAFE_PM_GET_STROKESTATE":[2],"CSAFE_GETSTATUS_CMD":[5]}"#,
        );
        let plot = session.force_plot(false).await.unwrap();
        assert_eq!(plot.get("forceplot"), Some(&FieldValue::Samples(vec![7, 8])));
        assert_eq!(plot.int("status"), Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_device_times_out_as_busy() {
        let mut session = canned(b"");
        let started = Instant::now();
        let err = session.status(false).await.unwrap_err();
        assert!(matches!(err, RowError::Busy { .. }));
        assert!(started.elapsed() >= session.config().io_timeout);
    }

    /// Transport that takes `delay` for every write and every read.
    struct SlowTransport {
        delay: Duration,
    }

    #[async_trait]
    impl ErgTransport for SlowTransport {
        async fn write(&mut self, frame: &[u8]) -> Result<usize, TransportError> {
            sleep(self.delay).await;
            Ok(frame.len())
        }

        async fn read(&mut self, _max_len: usize) -> Result<Vec<u8>, TransportError> {
            sleep(self.delay).await;
            Ok(b"{}".to_vec())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn one_timeout_bounds_write_and_read_together() {
        let mut session = ErgSession::new(
            DeviceId::new("slow"),
            Box::new(SlowTransport {
                delay: Duration::from_millis(1900),
            }),
            Arc::new(LoopbackCodec),
            SessionConfig::default(),
        );
        let started = Instant::now();
        let err = session.status(false).await.unwrap_err();
        assert!(matches!(err, RowError::Busy { .. }));
        assert_eq!(started.elapsed(), session.config().io_timeout);
    }

    /// Transport that fires a cancellation token on its first write.
    struct CancelOnWrite {
        cancel: CancellationToken,
        writes: Arc<std::sync::atomic::AtomicUsize>,
    }

    #[async_trait]
    impl ErgTransport for CancelOnWrite {
        async fn write(&mut self, frame: &[u8]) -> Result<usize, TransportError> {
            self.writes
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.cancel.cancel();
            Ok(frame.len())
        }

        async fn read(&mut self, _max_len: usize) -> Result<Vec<u8>, TransportError> {
            Ok(b"{}".to_vec())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_a_workout_between_frames() {
        let cancel = CancellationToken::new();
        let writes = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut session = ErgSession::new(
            DeviceId::new("cancelled"),
            Box::new(CancelOnWrite {
                cancel: cancel.clone(),
                writes: writes.clone(),
            }),
            Arc::new(LoopbackCodec),
            SessionConfig::default(),
        )
        .with_cancel(cancel);

        let err = session
            .set_workout(&WorkoutRequest::distance(2000))
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        // Reset went out; the program frame did not.
        assert_eq!(writes.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_session_sends_nothing() {
        let erg = SimErg::new(1, 1);
        let cancel = CancellationToken::new();
        let mut session = open(&erg).await.with_cancel(cancel.clone());
        cancel.cancel();
        assert!(session.status(false).await.unwrap_err().is_cancelled());
        assert!(erg.frames().is_empty());
    }

    #[tokio::test]
    async fn malformed_command_is_an_encode_error() {
        let mut session = canned(b"{}");
        let err = session
            .send(&[CsafeCommand::new(CsafeToken::SetPower)])
            .await
            .unwrap_err();
        assert!(matches!(err, RowError::Encode { .. }));
    }
}
