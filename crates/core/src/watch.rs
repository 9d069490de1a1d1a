//! Filesystem subscription that marks a [`ScriptSource`](crate::ScriptSource) stale.
//!
//! Notifications are forwarded into a channel drained by a dedicated
//! supervisor thread. The supervisor only has two effects: it invalidates the
//! shared flag, and it re-establishes the subscription when the watcher
//! reports an error. Changes made while the subscription is being rebuilt
//! can be missed.

use crate::error::Result;
use crate::scanner::FilePattern;
use notify::{
    Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, trace, warn};

/// Validity flag shared between a cache and its watcher.
///
/// Setting it is lock-free and idempotent; a fresh flag starts invalid.
#[derive(Debug, Clone, Default)]
pub struct Invalidation {
    valid: Arc<AtomicBool>,
}

impl Invalidation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Mark valid, returning whether a rebuild is owed.
    ///
    /// Clearing before the rebuild starts means an event that lands while
    /// the rebuild is running leaves the flag invalid for the next read.
    pub(crate) fn claim_rebuild(&self) -> bool {
        !self.valid.swap(true, Ordering::AcqRel)
    }
}

enum WatchSignal {
    Fs(notify::Result<Event>),
    Shutdown,
}

/// A live recursive subscription on a script root.
///
/// Dropping it stops the supervisor thread and releases the OS watch.
pub struct WatchSubscription {
    root: PathBuf,
    tx: mpsc::UnboundedSender<WatchSignal>,
    active: Arc<AtomicBool>,
    resubscriptions: Arc<AtomicU64>,
}

impl WatchSubscription {
    pub fn start(
        root: &Path,
        pattern: FilePattern,
        invalidation: Invalidation,
        retry_delay: Duration,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = subscribe(root, tx.clone())?;

        let active = Arc::new(AtomicBool::new(true));
        let resubscriptions = Arc::new(AtomicU64::new(0));

        let supervisor = Supervisor {
            root: root.to_path_buf(),
            pattern,
            invalidation,
            tx: tx.clone(),
            rx,
            active: active.clone(),
            resubscriptions: resubscriptions.clone(),
            retry_delay,
        };
        std::thread::Builder::new()
            .name("script-watch".to_string())
            .spawn(move || supervisor.run(watcher))?;

        info!("Started watching {}", root.display());

        Ok(Self {
            root: root.to_path_buf(),
            tx,
            active,
            resubscriptions,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// False only while a broken subscription is being re-established.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Number of times the subscription was rebuilt after a watcher error.
    pub fn resubscriptions(&self) -> u64 {
        self.resubscriptions.load(Ordering::Acquire)
    }

    #[cfg(test)]
    fn inject(&self, res: notify::Result<Event>) {
        let _ = self.tx.send(WatchSignal::Fs(res));
    }
}

impl Drop for WatchSubscription {
    fn drop(&mut self) {
        let _ = self.tx.send(WatchSignal::Shutdown);
    }
}

fn subscribe(
    root: &Path,
    tx: mpsc::UnboundedSender<WatchSignal>,
) -> notify::Result<RecommendedWatcher> {
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = tx.send(WatchSignal::Fs(res));
        },
        Config::default(),
    )?;
    watcher.watch(root, RecursiveMode::Recursive)?;
    Ok(watcher)
}

struct Supervisor {
    root: PathBuf,
    pattern: FilePattern,
    invalidation: Invalidation,
    tx: mpsc::UnboundedSender<WatchSignal>,
    rx: mpsc::UnboundedReceiver<WatchSignal>,
    active: Arc<AtomicBool>,
    resubscriptions: Arc<AtomicU64>,
    retry_delay: Duration,
}

impl Supervisor {
    fn run(mut self, watcher: RecommendedWatcher) {
        // Keep watcher alive
        let mut watcher = Some(watcher);

        while let Some(signal) = self.rx.blocking_recv() {
            match signal {
                WatchSignal::Shutdown => break,
                WatchSignal::Fs(Ok(event)) => {
                    if self.is_relevant(&event) {
                        trace!(kind = ?event.kind, paths = ?event.paths, "script tree changed");
                        self.invalidation.invalidate();
                    }
                }
                WatchSignal::Fs(Err(err)) => {
                    warn!("Watcher for {} failed: {}; resubscribing", self.root.display(), err);
                    self.active.store(false, Ordering::Release);
                    drop(watcher.take());
                    self.invalidation.invalidate();

                    watcher = self.resubscribe();
                    if watcher.is_none() {
                        break;
                    }
                }
            }
        }

        self.active.store(false, Ordering::Release);
        info!("File watcher ended for {}", self.root.display());
    }

    /// Retry until a new watcher is attached; `None` if shut down meanwhile.
    fn resubscribe(&mut self) -> Option<RecommendedWatcher> {
        loop {
            match subscribe(&self.root, self.tx.clone()) {
                Ok(watcher) => {
                    self.active.store(true, Ordering::Release);
                    self.resubscriptions.fetch_add(1, Ordering::AcqRel);
                    info!("Resubscribed to {}", self.root.display());
                    return Some(watcher);
                }
                Err(err) => {
                    error!(
                        "Failed to resubscribe to {}: {}; retrying in {:?}",
                        self.root.display(),
                        err,
                        self.retry_delay
                    );
                    std::thread::sleep(self.retry_delay);
                    if self.shutdown_requested() {
                        return None;
                    }
                }
            }
        }
    }

    /// Drain queued signals. Events from the dropped watcher are moot since
    /// the flag is already invalid.
    fn shutdown_requested(&mut self) -> bool {
        loop {
            match self.rx.try_recv() {
                Ok(WatchSignal::Shutdown) => return true,
                Ok(WatchSignal::Fs(_)) => continue,
                Err(mpsc::error::TryRecvError::Empty) => return false,
                Err(mpsc::error::TryRecvError::Disconnected) => return true,
            }
        }
    }

    fn is_relevant(&self, event: &Event) -> bool {
        if matches!(event.kind, EventKind::Access(_)) {
            return false;
        }
        // Rescan notices and similar carry no paths.
        if event.paths.is_empty() {
            return true;
        }
        event.paths.iter().any(|path| self.is_relevant_path(path))
    }

    /// Directories and vanished entries count, since their contents may
    /// have been listed.
    fn is_relevant_path(&self, path: &Path) -> bool {
        self.pattern.is_candidate(path) || !path.is_file()
    }
}
