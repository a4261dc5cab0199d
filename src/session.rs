use std::future::Future;
use std::time::Duration;

use log::{debug, info, trace, warn};
use tokio::sync::mpsc;
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::message::{self, Message};
use crate::reconciler::Reconciler;
use crate::renderer::Renderer;
use crate::types::Timestamp;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionStats {
    pub messages: u64,
    pub malformed: u64,
    pub rejected_entries: u64,
    pub ticks: u64,
}

/// One visualization: a reconciler, the renderer it drives, and the clock
/// both are measured against.
pub struct Session<R: Renderer> {
    reconciler: Reconciler,
    renderer: R,
    started: Instant,
    last_tick: Instant,
    stats: SessionStats,
}

impl<R: Renderer> Session<R> {
    pub fn new(reconciler: Reconciler, renderer: R) -> Self {
        let now = Instant::now();
        Self {
            reconciler,
            renderer,
            started: now,
            last_tick: now,
            stats: SessionStats::default(),
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    fn timestamp(&self, at: Instant) -> Timestamp {
        let millis = at.duration_since(self.started).as_millis();
        Timestamp::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Decodes one message and applies it. Bad input is logged and dropped.
    pub fn handle_text(&mut self, text: &str) {
        self.stats.messages += 1;
        let message = match message::decode(text) {
            Ok(message) => message,
            Err(err) => {
                self.stats.malformed += 1;
                warn!("dropping message: {err}");
                return;
            }
        };

        match message {
            Message::Tracking(frame) => {
                for err in &frame.rejected {
                    warn!("{err}");
                }
                if let Some(tick_time) = frame.tick_time {
                    trace!("tracker tick {tick_time:.3}s");
                }
                let now = self.timestamp(Instant::now());
                let outcome = self
                    .reconciler
                    .apply_batch(&frame.batch, now, &mut self.renderer);
                self.stats.rejected_entries += (frame.rejected.len() + outcome.rejected.len()) as u64;
                debug!(
                    "batch of {}: {} new, {} updated, {} stale",
                    frame.batch.len(),
                    outcome.created,
                    outcome.updated,
                    outcome.stale
                );
            }
            Message::RoomJoin { user_id } => info!("joined the room as {user_id}"),
            Message::UserJoin { user_id } => info!("{user_id} joined"),
            Message::UserLeave { user_id } => info!("{user_id} left"),
            Message::RoomKick { msg } => warn!("kicked from the room: {msg}"),
            Message::Chat { user_id, msg } => info!("<{user_id}> {msg}"),
            Message::Other { kind } => debug!("ignoring {kind} message"),
        }
    }

    /// One render frame at the current time.
    pub fn tick(&mut self) {
        let at = Instant::now();
        let delta_ms = at.duration_since(self.last_tick).as_secs_f64() * 1000.0;
        self.last_tick = at;
        let now = self.timestamp(at);

        let outcome = self.reconciler.advance(delta_ms, now, &mut self.renderer);
        self.stats.ticks += 1;
        if outcome.expired > 0 {
            debug!("{} expired, {} on screen", outcome.expired, self.reconciler.len());
        }
    }

    /// Runs until the channel closes or `shutdown` resolves, then clears the
    /// screen and hands back the renderer.
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<String>,
        frame_interval: Duration,
        shutdown: impl Future<Output = ()>,
    ) -> (R, SessionStats) {
        let mut frames = interval(frame_interval);
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                text = rx.recv() => match text {
                    Some(text) => self.handle_text(&text),
                    None => {
                        info!("transport closed");
                        break;
                    }
                },
                _ = frames.tick() => self.tick(),
                _ = &mut shutdown => {
                    info!("shutting down");
                    break;
                }
            }
        }

        rx.close();
        let removed = self.reconciler.shutdown(&mut self.renderer);
        debug!("removed {removed} entities on teardown");
        (self.renderer, self.stats)
    }
}
