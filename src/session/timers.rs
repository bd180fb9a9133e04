use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::IndicatorConfig;
use crate::device::EncoderEvent;

/// Which periodic UI update fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickKind {
    /// Elapsed-duration readout (~1 Hz)
    Elapsed,
    /// Recording indicator blink (~2 Hz)
    Blink,
}

/// Internal events delivered to the session's queue.
///
/// Each carries the generation it was armed under; the session drops events
/// whose generation no longer matches, so a callback fired after the
/// recording ended is a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Tick { generation: u64, kind: TickKind },
    Encoder { generation: u64, event: EncoderEvent },
}

/// The two periodic tasks that run while recording
pub(crate) struct IndicatorTimers {
    elapsed: JoinHandle<()>,
    blink: JoinHandle<()>,
}

impl IndicatorTimers {
    pub(crate) fn arm(
        generation: u64,
        config: &IndicatorConfig,
        events: &mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            elapsed: spawn_ticker(
                generation,
                TickKind::Elapsed,
                config.elapsed_interval(),
                events.clone(),
            ),
            blink: spawn_ticker(
                generation,
                TickKind::Blink,
                config.blink_interval(),
                events.clone(),
            ),
        }
    }

    pub(crate) fn cancel(&self) {
        self.elapsed.abort();
        self.blink.abort();
    }
}

impl Drop for IndicatorTimers {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn spawn_ticker(
    generation: u64,
    kind: TickKind,
    period: Duration,
    events: mpsc::UnboundedSender<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            if events.send(SessionEvent::Tick { generation, kind }).is_err() {
                break;
            }
        }
    })
}

/// Forward encoder events into the session queue, tagged with `generation`
pub(crate) fn forward_encoder_events(
    generation: u64,
    mut encoder_rx: mpsc::Receiver<EncoderEvent>,
    events: mpsc::UnboundedSender<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = encoder_rx.recv().await {
            if events
                .send(SessionEvent::Encoder { generation, event })
                .is_err()
            {
                break;
            }
        }
    })
}
