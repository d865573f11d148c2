//! [`ErgHandle`] – on-demand access to a device whose session is owned by its
//! polling worker.
//!
//! Each call is wrapped in a [`SessionCommand`] carrying a oneshot reply
//! channel and queued to the worker, which runs it between polling cycles.
//! Once the worker has exited every call fails with
//! [`RowError::Disconnected`].

use std::fmt;

use rowlink_csafe::ErgSession;
use rowlink_types::{DeviceId, Reading, RowError, WorkoutRequest};
use tokio::sync::{mpsc, oneshot};

/// Commands a handle may queue to its worker.
pub(crate) const COMMAND_QUEUE: usize = 16;

type Reply<T> = oneshot::Sender<Result<T, RowError>>;

/// A request for the worker, with the channel its result goes back on.
pub(crate) enum SessionCommand {
    Monitor {
        forceplot: bool,
        pretty: bool,
        reply: Reply<Reading>,
    },
    ForcePlot {
        pretty: bool,
        reply: Reply<Reading>,
    },
    Workout {
        pretty: bool,
        reply: Reply<Reading>,
    },
    ErgInfo {
        pretty: bool,
        reply: Reply<Reading>,
    },
    Status {
        pretty: bool,
        reply: Reply<Reading>,
    },
    SetClock {
        reply: Reply<()>,
    },
    SetWorkout {
        request: WorkoutRequest,
        reply: Reply<()>,
    },
}

/// Send `result` back and report whether it means the device is gone.
fn answer<T>(reply: Reply<T>, result: Result<T, RowError>) -> bool {
    let gone = matches!(&result, Err(e) if e.is_disconnect());
    // The caller may have given up waiting; that is fine.
    let _ = reply.send(result);
    gone
}

impl SessionCommand {
    /// Run the command on `session`.  Returns `true` when the device
    /// disconnected while serving it.
    pub(crate) async fn execute(self, session: &mut ErgSession) -> bool {
        match self {
            SessionCommand::Monitor {
                forceplot,
                pretty,
                reply,
            } => answer(reply, session.monitor(forceplot, pretty).await),
            SessionCommand::ForcePlot { pretty, reply } => {
                answer(reply, session.force_plot(pretty).await)
            }
            SessionCommand::Workout { pretty, reply } => {
                answer(reply, session.workout(pretty).await)
            }
            SessionCommand::ErgInfo { pretty, reply } => {
                answer(reply, session.erg_info(pretty).await)
            }
            SessionCommand::Status { pretty, reply } => {
                answer(reply, session.status(pretty).await)
            }
            SessionCommand::SetClock { reply } => answer(reply, session.set_clock().await),
            SessionCommand::SetWorkout { request, reply } => {
                answer(reply, session.set_workout(&request).await)
            }
        }
    }
}

/// Cloneable handle to one tracked erg.
#[derive(Clone)]
pub struct ErgHandle {
    id: DeviceId,
    commands: mpsc::Sender<SessionCommand>,
}

impl fmt::Debug for ErgHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErgHandle")
            .field("id", &self.id)
            .field("connected", &!self.commands.is_closed())
            .finish()
    }
}

impl ErgHandle {
    pub(crate) fn new(id: DeviceId) -> (Self, mpsc::Receiver<SessionCommand>) {
        let (commands, rx) = mpsc::channel(COMMAND_QUEUE);
        (Self { id, commands }, rx)
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    /// `false` once the device's worker has exited.
    pub fn is_connected(&self) -> bool {
        !self.commands.is_closed()
    }

    pub async fn monitor(&self, forceplot: bool, pretty: bool) -> Result<Reading, RowError> {
        self.request(|reply| SessionCommand::Monitor {
            forceplot,
            pretty,
            reply,
        })
        .await
    }

    pub async fn force_plot(&self, pretty: bool) -> Result<Reading, RowError> {
        self.request(|reply| SessionCommand::ForcePlot { pretty, reply })
            .await
    }

    pub async fn workout(&self, pretty: bool) -> Result<Reading, RowError> {
        self.request(|reply| SessionCommand::Workout { pretty, reply })
            .await
    }

    pub async fn erg_info(&self, pretty: bool) -> Result<Reading, RowError> {
        self.request(|reply| SessionCommand::ErgInfo { pretty, reply })
            .await
    }

    pub async fn status(&self, pretty: bool) -> Result<Reading, RowError> {
        self.request(|reply| SessionCommand::Status { pretty, reply })
            .await
    }

    pub async fn set_clock(&self) -> Result<(), RowError> {
        self.request(|reply| SessionCommand::SetClock { reply }).await
    }

    /// Program a workout on this erg.
    ///
    /// # Errors
    ///
    /// [`RowError::Validation`] for a bad request, otherwise the session's
    /// transport classification.
    pub async fn set_workout(&self, request: WorkoutRequest) -> Result<(), RowError> {
        self.request(|reply| SessionCommand::SetWorkout { request, reply })
            .await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> SessionCommand,
    ) -> Result<T, RowError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| self.gone())?;
        rx.await.map_err(|_| self.gone())?
    }

    fn gone(&self) -> RowError {
        RowError::Disconnected {
            device: self.id.clone(),
            details: "device worker has exited".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closed_worker_reports_disconnected() {
        let (handle, rx) = ErgHandle::new(DeviceId::new("bus1-addr1"));
        assert!(handle.is_connected());
        drop(rx);
        assert!(!handle.is_connected());
        let err = handle.status(false).await.unwrap_err();
        assert!(err.is_disconnect());
    }

    #[tokio::test]
    async fn dropped_reply_reports_disconnected() {
        let (handle, mut rx) = ErgHandle::new(DeviceId::new("bus1-addr1"));
        let worker = tokio::spawn(async move {
            // Receive one command and drop it without answering.
            let _ = rx.recv().await;
        });
        let err = handle.set_clock().await.unwrap_err();
        assert!(err.is_disconnect());
        worker.await.unwrap();
    }
}
