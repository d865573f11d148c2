//! Per-device polling worker.
//!
//! The worker owns the device's [`ErgSession`].  Each cycle it reads the
//! telemetry snapshot and the workout summary and pushes them as one
//! [`EventKind::Update`].  Between cycles it serves commands queued by
//! [`ErgHandle`][crate::handle::ErgHandle]s.  A disconnect from either path
//! emits [`EventKind::Removed`], untracks the device and ends the worker.
//!
//! The session shares the manager's cancellation token, so once `stop` is
//! requested the worker finishes at most the round-trip in flight.

use std::sync::Arc;
use std::time::Duration;

use rowlink_csafe::ErgSession;
use rowlink_types::{ErgUpdate, Reading, RowError};
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::event::{EventKind, EventSink};
use crate::handle::SessionCommand;
use crate::registry::ErgRegistry;

/// `workoutstate` code the monitor reports once a piece is complete.
const WORKOUT_END: i64 = 10;

pub(crate) struct Worker {
    pub session: ErgSession,
    pub commands: mpsc::Receiver<SessionCommand>,
    pub sink: EventSink,
    pub registry: Arc<ErgRegistry>,
    pub cancel: CancellationToken,
    pub poll_interval: Duration,
    pub forceplot: bool,
    pub pretty: bool,
}

fn workout_finished(workout: &Reading) -> bool {
    workout.label("workoutstate") == Some("Workout end")
        || workout.int("workoutstate") == Some(WORKOUT_END)
}

impl Worker {
    async fn poll_once(&mut self) -> Result<ErgUpdate, RowError> {
        let monitor = self.session.monitor(self.forceplot, self.pretty).await?;
        let workout = self.session.workout(self.pretty).await?;
        Ok(ErgUpdate { monitor, workout })
    }

    #[instrument(skip_all, fields(device = %self.session.id()))]
    pub(crate) async fn run(mut self) {
        let mut interval = time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut finished = false;

        let disconnected = loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => break false,

                Some(command) = self.commands.recv() => {
                    if command.execute(&mut self.session).await {
                        break true;
                    }
                }

                _ = interval.tick() => {
                    match self.poll_once().await {
                        Ok(update) => {
                            let done = workout_finished(&update.workout);
                            if done && !finished {
                                info!("workout finished");
                            }
                            finished = done;
                            if let Err(e) = self.sink.push(self.session.id(), EventKind::Update(update)) {
                                warn!(error = %e, "event sink closed");
                                break false;
                            }
                        }
                        Err(e) if e.is_disconnect() => break true,
                        Err(e) if e.is_cancelled() => break false,
                        Err(e) => debug!(error = %e, "poll failed; retrying next cycle"),
                    }
                }
            }
        };

        if disconnected {
            // Removed must be queued while the id is still tracked, so a
            // rediscovery cannot slip its NewDevice in ahead of it.
            let id = self.session.id().clone();
            info!("erg disconnected");
            if let Err(e) = self.sink.push(&id, EventKind::Removed) {
                warn!(error = %e, "could not report removal");
            }
            self.registry.unregister(&id);
        }
        debug!("worker exited");
    }
}
