//! Lazily rebuilt, watcher-invalidated listing of fingerprinted scripts.

use crate::config::ScriptSourceConfig;
use crate::error::{Result, ScriptSourceError};
use crate::fingerprint::fingerprint_file;
use crate::resolver::{AppRootResolver, PathResolver};
use crate::scanner::{FilePattern, Scanner};
use crate::watch::{Invalidation, WatchSubscription};
use rayon::prelude::*;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, warn};
use url::Url;

/// One listed script: its root-relative URL path and content fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScriptEntry {
    relative_path: String,
    fingerprint: String,
}

impl ScriptEntry {
    pub fn new(relative_path: impl Into<String>, fingerprint: impl Into<String>) -> Self {
        Self {
            relative_path: relative_path.into(),
            fingerprint: fingerprint.into(),
        }
    }

    /// Forward-slash path relative to the root, percent-encoded like a URL path.
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// The emitted asset reference, `/<relative_path>?<fingerprint>`.
    pub fn reference(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ScriptEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}?{}", self.relative_path, self.fingerprint)
    }
}

/// Anything that can hand out the current script listing.
pub trait ScriptProvider: Send + Sync {
    fn scripts(&self) -> Result<Arc<[ScriptEntry]>>;

    /// Rendered references, in listing order.
    fn references(&self) -> Result<Vec<String>> {
        Ok(self.scripts()?.iter().map(ScriptEntry::reference).collect())
    }
}

struct CacheState {
    entries: Arc<[ScriptEntry]>,
    generation: u64,
}

/// Script listing for one root directory.
///
/// The listing is rebuilt in full on the first read after the tree changes.
/// Reads serialize on a single lock while a rebuild runs, so no caller ever
/// observes a partial list. A failed rebuild is returned to the caller; the
/// last good listing stays available through [`ScriptSource::snapshot`] and
/// the next read tries again.
pub struct ScriptSource {
    search_path: PathBuf,
    root: PathBuf,
    root_url: Url,
    pattern: FilePattern,
    invalidation: Invalidation,
    state: Mutex<CacheState>,
    watch: Option<WatchSubscription>,
}

impl ScriptSource {
    /// Watch `root` (relative to the working directory) for `*.js` files.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        Self::with_config(root, ScriptSourceConfig::default())
    }

    pub fn with_config(root: impl AsRef<Path>, config: ScriptSourceConfig) -> Result<Self> {
        Self::with_resolver(root, &AppRootResolver::current_dir()?, config)
    }

    /// Resolve `search_path`, subscribe to it and perform the initial scan.
    ///
    /// Fails if the path does not resolve, the pattern is invalid, the
    /// subscription cannot be established or the initial scan fails.
    pub fn with_resolver(
        search_path: impl AsRef<Path>,
        resolver: &dyn PathResolver,
        config: ScriptSourceConfig,
    ) -> Result<Self> {
        let search_path = search_path.as_ref().to_path_buf();
        let root = resolver.resolve(&search_path)?;
        let pattern = FilePattern::new(&config.pattern)?;
        let root_url = Url::from_directory_path(&root).map_err(|()| {
            ScriptSourceError::Internal(format!("{} is not a valid URL base", root.display()))
        })?;

        let invalidation = Invalidation::new();
        let watch = if config.watch {
            Some(WatchSubscription::start(
                &root,
                pattern.clone(),
                invalidation.clone(),
                config.resubscribe_delay(),
            )?)
        } else {
            None
        };

        let source = Self {
            search_path,
            root,
            root_url,
            pattern,
            invalidation,
            state: Mutex::new(CacheState {
                entries: Arc::from(Vec::<ScriptEntry>::new()),
                generation: 0,
            }),
            watch,
        };
        source.scripts()?;
        Ok(source)
    }

    /// The current listing, rebuilt first if the tree changed since the last read.
    pub fn scripts(&self) -> Result<Arc<[ScriptEntry]>> {
        let mut state = self.lock_state();
        if self.invalidation.claim_rebuild() {
            let start = Instant::now();
            match self.rebuild() {
                Ok(entries) => {
                    state.entries = entries.into();
                    state.generation += 1;
                    debug!(
                        "Rebuilt {} scripts under {} in {:?} (generation {})",
                        state.entries.len(),
                        self.root.display(),
                        start.elapsed(),
                        state.generation
                    );
                }
                Err(err) => {
                    self.invalidation.invalidate();
                    warn!("Failed to rebuild scripts under {}: {}", self.root.display(), err);
                    return Err(err);
                }
            }
        }
        Ok(Arc::clone(&state.entries))
    }

    /// The last successfully built listing, without rebuilding.
    pub fn snapshot(&self) -> Arc<[ScriptEntry]> {
        Arc::clone(&self.lock_state().entries)
    }

    /// Force the next read to rebuild.
    pub fn invalidate(&self) {
        self.invalidation.invalidate();
    }

    pub fn is_valid(&self) -> bool {
        self.invalidation.is_valid()
    }

    /// Number of completed rebuilds, starting at 1 after construction.
    pub fn generation(&self) -> u64 {
        self.lock_state().generation
    }

    pub fn search_path(&self) -> &Path {
        &self.search_path
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn is_watching(&self) -> bool {
        self.watch.as_ref().is_some_and(WatchSubscription::is_active)
    }

    fn lock_state(&self) -> MutexGuard<'_, CacheState> {
        // Entries are only ever swapped whole, so a poisoned lock still
        // guards a consistent listing.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn rebuild(&self) -> Result<Vec<ScriptEntry>> {
        Scanner::scan(&self.root, &self.pattern)?
            .par_iter()
            .map(|path| self.entry_for(path))
            .collect()
    }

    fn entry_for(&self, path: &Path) -> Result<ScriptEntry> {
        let fingerprint = fingerprint_file(path)?;
        let relative_path = self.relative_path(path)?;
        Ok(ScriptEntry {
            relative_path,
            fingerprint,
        })
    }

    fn relative_path(&self, path: &Path) -> Result<String> {
        Url::from_file_path(path)
            .ok()
            .and_then(|url| self.root_url.make_relative(&url))
            .ok_or_else(|| {
                ScriptSourceError::Internal(format!(
                    "{} is not beneath {}",
                    path.display(),
                    self.root.display()
                ))
            })
    }
}

impl ScriptProvider for ScriptSource {
    fn scripts(&self) -> Result<Arc<[ScriptEntry]>> {
        ScriptSource::scripts(self)
    }
}

impl fmt::Debug for ScriptSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptSource")
            .field("root", &self.root)
            .field("pattern", &self.pattern.as_str())
            .field("valid", &self.is_valid())
            .field("watching", &self.is_watching())
            .finish()
    }
}
