use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

use super::result::{Indicator, Outcome, RecordingStarted, SessionStatus};
use super::session::RecordingSession;
use super::state::SessionPhase;
use crate::error::{RecorderResult, RecordingError};
use crate::surface::{PreviewLayout, SurfaceHandle};

const COMMAND_BUFFER: usize = 32;

type Reply<T> = oneshot::Sender<T>;

enum Command {
    OpenPreview {
        surface: Option<SurfaceHandle>,
        reply: Reply<RecorderResult<()>>,
    },
    SwitchCamera(Reply<RecorderResult<()>>),
    Start(Reply<RecorderResult<RecordingStarted>>),
    Stop(Reply<RecorderResult<Outcome>>),
    Cancel(Reply<RecorderResult<()>>),
    Teardown(Reply<()>),
    SurfaceReady {
        surface: SurfaceHandle,
        reply: Reply<RecorderResult<()>>,
    },
    SurfaceResized {
        width: u32,
        height: u32,
        reply: Reply<Option<PreviewLayout>>,
    },
    SurfaceDestroyed(Reply<()>),
    Status(Reply<SessionStatus>),
}

/// Cloneable front for a [`RecordingSession`] running on its own task.
///
/// Caller commands and timer/encoder events are processed one at a time on
/// that task, so no two transitions ever interleave. The task tears the
/// session down and exits once every handle is dropped.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    indicator: watch::Receiver<Indicator>,
}

impl SessionHandle {
    /// Move `session` onto a worker task
    pub fn spawn(session: RecordingSession) -> Self {
        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
        let indicator = session.indicator();

        tokio::spawn(run(session, rx));

        Self {
            commands,
            indicator,
        }
    }

    pub async fn open_preview(&self, surface: Option<SurfaceHandle>) -> RecorderResult<()> {
        self.request(|reply| Command::OpenPreview { surface, reply })
            .await?
    }

    pub async fn switch_camera(&self) -> RecorderResult<()> {
        self.request(Command::SwitchCamera).await?
    }

    pub async fn start(&self) -> RecorderResult<RecordingStarted> {
        self.request(Command::Start).await?
    }

    pub async fn stop(&self) -> RecorderResult<Outcome> {
        self.request(Command::Stop).await?
    }

    pub async fn cancel(&self) -> RecorderResult<()> {
        self.request(Command::Cancel).await?
    }

    /// Release everything; later calls see a finished session
    pub async fn teardown(&self) -> RecorderResult<()> {
        self.request(Command::Teardown).await
    }

    pub async fn surface_ready(&self, surface: SurfaceHandle) -> RecorderResult<()> {
        self.request(|reply| Command::SurfaceReady { surface, reply })
            .await?
    }

    pub async fn surface_resized(
        &self,
        width: u32,
        height: u32,
    ) -> RecorderResult<Option<PreviewLayout>> {
        self.request(|reply| Command::SurfaceResized {
            width,
            height,
            reply,
        })
        .await
    }

    pub async fn surface_destroyed(&self) -> RecorderResult<()> {
        self.request(Command::SurfaceDestroyed).await
    }

    pub async fn status(&self) -> RecorderResult<SessionStatus> {
        self.request(Command::Status).await
    }

    /// Last published phase
    pub fn phase(&self) -> SessionPhase {
        self.indicator.borrow().phase
    }

    /// Subscribe to the recording indicator
    pub fn indicator(&self) -> watch::Receiver<Indicator> {
        self.indicator.clone()
    }

    /// Reference that does not keep the worker alive
    pub fn downgrade(&self) -> WeakSessionHandle {
        WeakSessionHandle {
            commands: self.commands.downgrade(),
            indicator: self.indicator.clone(),
        }
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> RecorderResult<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| RecordingError::session_gone())?;
        rx.await.map_err(|_| RecordingError::session_gone())
    }
}

/// Non-owning view of a session. Once every [`SessionHandle`] is gone the
/// worker tears the session down regardless of weak references.
#[derive(Debug, Clone)]
pub struct WeakSessionHandle {
    commands: mpsc::WeakSender<Command>,
    indicator: watch::Receiver<Indicator>,
}

impl WeakSessionHandle {
    /// A usable handle, if some caller still holds one
    pub fn upgrade(&self) -> Option<SessionHandle> {
        self.commands.upgrade().map(|commands| SessionHandle {
            commands,
            indicator: self.indicator.clone(),
        })
    }

    /// Last published phase
    pub fn phase(&self) -> SessionPhase {
        self.indicator.borrow().phase
    }

    /// Whether the session may still hold a camera or encoder
    pub fn is_live(&self) -> bool {
        // A closed indicator means the session itself has been dropped
        !self.phase().is_terminal() && self.indicator.has_changed().is_ok()
    }
}

async fn run(mut session: RecordingSession, mut commands: mpsc::Receiver<Command>) {
    debug!("Session worker started");

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => dispatch(&mut session, command).await,
                None => {
                    info!("All session handles dropped");
                    session.teardown().await;
                    break;
                }
            },
            Some(event) = session.next_event() => session.handle_event(event).await,
        }
    }

    debug!("Session worker finished");
}

async fn dispatch(session: &mut RecordingSession, command: Command) {
    // A caller that stopped waiting is not an error for the session
    match command {
        Command::OpenPreview { surface, reply } => {
            let _ = reply.send(session.open_preview(surface).await);
        }
        Command::SwitchCamera(reply) => {
            let _ = reply.send(session.switch_camera().await);
        }
        Command::Start(reply) => {
            let _ = reply.send(session.start().await);
        }
        Command::Stop(reply) => {
            let _ = reply.send(session.stop().await);
        }
        Command::Cancel(reply) => {
            let _ = reply.send(session.cancel().await);
        }
        Command::Teardown(reply) => {
            session.teardown().await;
            let _ = reply.send(());
        }
        Command::SurfaceReady { surface, reply } => {
            let _ = reply.send(session.surface_ready(surface));
        }
        Command::SurfaceResized {
            width,
            height,
            reply,
        } => {
            let _ = reply.send(session.surface_resized(width, height));
        }
        Command::SurfaceDestroyed(reply) => {
            session.surface_destroyed();
            let _ = reply.send(());
        }
        Command::Status(reply) => {
            let _ = reply.send(session.status());
        }
    }
}
