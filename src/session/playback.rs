use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::foundation::core::MediaTime;
use crate::trim::TrimRange;

/// How often the loop checks whether playback ran past the trim end.
pub const LOOP_CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// Player driving the live preview.
pub trait PreviewPlayer: Send + Sync {
    fn current_time(&self) -> MediaTime;
    fn duration(&self) -> MediaTime;
    fn seek(&self, to: MediaTime);
    fn play(&self);
    fn pause(&self);
}

/// Loops preview playback over a trim range until stopped.
///
/// The periodic check runs on a tokio task owned by the loop; dropping the loop aborts the
/// task and pauses the player.
pub struct PlaybackLoop {
    player: Arc<dyn PreviewPlayer>,
    range: watch::Sender<TrimRange>,
    task: JoinHandle<()>,
}

impl PlaybackLoop {
    /// Seek to `range.start()`, start playing and begin watching for the range end.
    pub fn start(player: Arc<dyn PreviewPlayer>, range: TrimRange) -> Self {
        player.seek(range.start());
        player.play();

        let (tx, rx) = watch::channel(range);
        let task = tokio::spawn(run_loop(Arc::clone(&player), rx));
        tracing::debug!(start = %range.start(), end = %range.end(), "preview loop started");
        Self {
            player,
            range: tx,
            task,
        }
    }

    pub fn range(&self) -> TrimRange {
        *self.range.borrow()
    }

    /// Switch to a new range and restart from its beginning.
    pub fn set_range(&self, range: TrimRange) {
        self.range.send_replace(range);
        self.player.seek(range.start());
    }

    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for PlaybackLoop {
    fn drop(&mut self) {
        self.task.abort();
        self.player.pause();
        tracing::debug!("preview loop stopped");
    }
}

async fn run_loop(player: Arc<dyn PreviewPlayer>, range: watch::Receiver<TrimRange>) {
    let mut ticker = tokio::time::interval(LOOP_CHECK_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let r = *range.borrow();
        if player.current_time() >= r.end() {
            player.seek(r.start());
            player.play();
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/playback.rs"]
mod tests;
