//! Tile load tasks and the reporting handle given to image sources
//!
//! A [`LoadTileTask`] lives on the view's thread and only changes state when the manager
//! applies a [`TileEvent`]. Sources report through a [`LoadTileRequest`], which may be
//! moved to any thread or async task: it sends events over a channel instead of touching
//! the task directly. Each event carries the task id and generation it was issued for, so
//! events from a cancelled or restarted load are recognized and dropped.

use crate::FullTileIndex;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// State of a load task. `Loading` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LoadTileStatus {
    Loading,
    Succeed,
    Failed,
    Canceled,
}

impl LoadTileStatus {
    /// Loading or loaded tasks are kept across view updates
    pub fn is_alive(self) -> bool {
        matches!(self, Self::Loading | Self::Succeed)
    }

    pub fn is_terminal(self) -> bool {
        self != Self::Loading
    }
}

/// Identity of a load task inside one manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

/// Cooperative cancellation flag shared between a task and its in-flight load
#[derive(Debug, Clone)]
pub struct CancellationToken {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Idempotent
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once the token is cancelled
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives as long as `self`, so this only returns once cancelled
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

/// What happened to a load
#[derive(Debug, Clone, PartialEq)]
pub enum TileEventKind<B> {
    /// Fraction in `[0, 1]`
    Progress(f64),
    Completed(B),
    Failed(String),
    Canceled,
}

/// Load outcome or progress, addressed to one generation of one task
#[derive(Debug, Clone)]
pub struct TileEvent<B> {
    pub index: FullTileIndex,
    pub task: TaskId,
    pub generation: u64,
    pub kind: TileEventKind<B>,
}

/// Handle given to an image source to report the outcome of one tile load.
///
/// Dropping a request without calling one of the terminal methods reports the load as
/// canceled if cancellation was requested and as failed otherwise.
#[derive(Debug)]
pub struct LoadTileRequest<B> {
    index: FullTileIndex,
    task: TaskId,
    generation: u64,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<TileEvent<B>>,
    finished: bool,
}

impl<B> LoadTileRequest<B> {
    pub fn index(&self) -> FullTileIndex {
        self.index
    }

    pub fn task_id(&self) -> TaskId {
        self.task
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the owning task is cancelled
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Report progress, clamped into `[0, 1]`
    pub fn report_progress(&self, progress: f64) {
        let progress = if progress.is_nan() {
            0.0
        } else {
            progress.clamp(0.0, 1.0)
        };
        self.send(TileEventKind::Progress(progress));
    }

    pub fn complete(self, bitmap: B) {
        self.finish(TileEventKind::Completed(bitmap));
    }

    pub fn fail(self, message: impl Into<String>) {
        self.finish(TileEventKind::Failed(message.into()));
    }

    pub fn canceled(self) {
        self.finish(TileEventKind::Canceled);
    }

    fn finish(mut self, kind: TileEventKind<B>) {
        self.send(kind);
        self.finished = true;
    }

    fn send(&self, kind: TileEventKind<B>) {
        // A closed channel means the manager is gone and nobody waits for the result
        let _ = self.events.send(TileEvent {
            index: self.index,
            task: self.task,
            generation: self.generation,
            kind,
        });
    }
}

impl<B> Drop for LoadTileRequest<B> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if self.is_cancelled() {
            self.send(TileEventKind::Canceled);
        } else {
            self.send(TileEventKind::Failed(
                "tile load request dropped without a result".to_string(),
            ));
        }
    }
}

/// One request to materialize the pixels of a tile
#[derive(Debug)]
pub struct LoadTileTask<B> {
    id: TaskId,
    index: FullTileIndex,
    generation: u64,
    status: LoadTileStatus,
    progress: f64,
    bitmap: Option<B>,
    error: Option<String>,
    cancel: CancellationToken,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<B> LoadTileTask<B> {
    pub fn new(id: TaskId, index: FullTileIndex) -> Self {
        Self {
            id,
            index,
            generation: 0,
            status: LoadTileStatus::Loading,
            progress: 0.0,
            bitmap: None,
            error: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn index(&self) -> FullTileIndex {
        self.index
    }

    /// Incremented on every restart
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn status(&self) -> LoadTileStatus {
        self.status
    }

    pub fn is_alive(&self) -> bool {
        self.status.is_alive()
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn bitmap(&self) -> Option<&B> {
        self.bitmap.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Reporting handle for the current generation
    pub fn request(&self, events: mpsc::UnboundedSender<TileEvent<B>>) -> LoadTileRequest<B> {
        LoadTileRequest {
            index: self.index,
            task: self.id,
            generation: self.generation,
            cancel: self.cancel.clone(),
            events,
            finished: false,
        }
    }

    /// Cancel the in-flight load. Safe to call repeatedly and after completion.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        if self.status == LoadTileStatus::Loading {
            self.status = LoadTileStatus::Canceled;
        }
    }

    /// Prepare a failed or canceled task for another load under a new generation
    pub fn reset(&mut self) {
        self.cancel.cancel();
        self.generation += 1;
        self.status = LoadTileStatus::Loading;
        self.progress = 0.0;
        self.bitmap = None;
        self.error = None;
        self.cancel = CancellationToken::new();
    }

    /// Whether `event` targets the current generation of this task while it is loading
    pub fn accepts(&self, event: &TileEvent<B>) -> bool {
        event.task == self.id
            && event.generation == self.generation
            && event.index == self.index
            && self.status == LoadTileStatus::Loading
    }

    /// Apply an event, returning whether it was accepted
    pub fn apply(&mut self, event: TileEvent<B>) -> bool {
        if !self.accepts(&event) {
            return false;
        }
        match event.kind {
            TileEventKind::Progress(progress) => self.progress = progress,
            TileEventKind::Completed(bitmap) => {
                self.progress = 1.0;
                self.bitmap = Some(bitmap);
                self.status = LoadTileStatus::Succeed;
            }
            TileEventKind::Failed(message) => {
                self.error = Some(message);
                self.status = LoadTileStatus::Failed;
            }
            TileEventKind::Canceled => self.status = LoadTileStatus::Canceled,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> LoadTileTask<&'static str> {
        LoadTileTask::new(TaskId(1), FullTileIndex::new(1, 2, 0, 0))
    }

    #[test]
    fn test_status_liveness() {
        assert!(LoadTileStatus::Loading.is_alive());
        assert!(LoadTileStatus::Succeed.is_alive());
        assert!(!LoadTileStatus::Failed.is_alive());
        assert!(!LoadTileStatus::Canceled.is_alive());
        assert!(!LoadTileStatus::Loading.is_terminal());
    }

    #[test]
    fn test_request_reports_to_task() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut task = task();
        let request = task.request(tx);
        request.report_progress(1.5);
        request.complete("pixels");

        let progress = rx.try_recv().unwrap();
        assert_eq!(progress.kind, TileEventKind::Progress(1.0));
        assert!(task.apply(progress));
        assert_eq!(task.status(), LoadTileStatus::Loading);

        assert!(task.apply(rx.try_recv().unwrap()));
        assert_eq!(task.status(), LoadTileStatus::Succeed);
        assert_eq!(task.bitmap(), Some(&"pixels"));
        // nothing else was sent by the completed request
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_cancel_is_idempotent_and_blocks_late_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut task = task();
        let request = task.request(tx);
        task.cancel();
        task.cancel();
        assert_eq!(task.status(), LoadTileStatus::Canceled);
        assert!(request.is_cancelled());

        request.complete("late");
        assert!(!task.apply(rx.try_recv().unwrap()));
        assert!(task.bitmap().is_none());
    }

    #[test]
    fn test_cancel_after_completion_keeps_bitmap() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut task = task();
        task.request(tx).complete("done");
        assert!(task.apply(rx.try_recv().unwrap()));
        task.cancel();
        assert_eq!(task.status(), LoadTileStatus::Succeed);
        assert_eq!(task.bitmap(), Some(&"done"));
    }

    #[test]
    fn test_reset_ignores_previous_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut task = task();
        let old_request = task.request(tx.clone());
        old_request.fail("boom");
        assert!(task.apply(rx.try_recv().unwrap()));
        assert_eq!(task.status(), LoadTileStatus::Failed);
        assert_eq!(task.error(), Some("boom"));

        let stale = task.request(tx.clone());
        task.reset();
        assert_eq!(task.generation(), 1);
        assert_eq!(task.status(), LoadTileStatus::Loading);
        assert!(task.error().is_none());
        assert!(stale.is_cancelled());

        stale.complete("stale");
        assert!(!task.apply(rx.try_recv().unwrap()));

        task.request(tx).complete("fresh");
        assert!(task.apply(rx.try_recv().unwrap()));
        assert_eq!(task.bitmap(), Some(&"fresh"));
    }

    #[test]
    fn test_dropped_request_reports_outcome() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut task = task();
        drop(task.request(tx.clone()));
        let event = rx.try_recv().unwrap();
        assert!(matches!(event.kind, TileEventKind::Failed(_)));

        task.cancel();
        drop(task.request(tx));
        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, TileEventKind::Canceled);
    }

    #[tokio::test]
    async fn test_cancellation_token_wakes_waiters() {
        let token = CancellationToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });
        tokio::task::yield_now().await;
        token.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        // already cancelled tokens resolve immediately
        token.cancelled().await;
    }
}
