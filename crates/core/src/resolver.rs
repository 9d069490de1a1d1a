use crate::error::{Result, ScriptSourceError};
use std::io;
use std::path::{Path, PathBuf};

/// Maps an application-relative search path to an absolute directory.
pub trait PathResolver: Send + Sync {
    fn resolve(&self, search_path: &Path) -> Result<PathBuf>;
}

/// Resolves search paths against a fixed application root.
///
/// `~/scripts`, `scripts` and `./scripts` all resolve beneath the root;
/// absolute paths are taken as they are. The result is canonicalized and
/// must be an existing directory.
#[derive(Debug, Clone)]
pub struct AppRootResolver {
    app_root: PathBuf,
}

impl AppRootResolver {
    pub fn new(app_root: impl Into<PathBuf>) -> Self {
        Self {
            app_root: app_root.into(),
        }
    }

    pub fn current_dir() -> Result<Self> {
        Ok(Self::new(std::env::current_dir()?))
    }

    pub fn app_root(&self) -> &Path {
        &self.app_root
    }
}

impl PathResolver for AppRootResolver {
    fn resolve(&self, search_path: &Path) -> Result<PathBuf> {
        let relative = search_path.strip_prefix("~").unwrap_or(search_path);
        let joined = self.app_root.join(relative);

        let fail = |source| ScriptSourceError::Resolution {
            path: search_path.to_path_buf(),
            source,
        };
        let resolved = joined.canonicalize().map_err(fail)?;
        if !resolved.is_dir() {
            return Err(fail(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("{} is not a directory", resolved.display()),
            )));
        }
        Ok(resolved)
    }
}
