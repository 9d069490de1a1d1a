//! Discovers script files under a directory tree and hands out stable,
//! cache-busting references to them (`/lib/app.js?<fingerprint>`), rebuilding
//! the list only after the filesystem reports a change.

pub mod cache;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod logging;
pub mod resolver;
pub mod scanner;
pub mod watch;

pub use cache::{ScriptEntry, ScriptProvider, ScriptSource};
pub use config::ScriptSourceConfig;
pub use error::{Result, ScriptSourceError};
pub use resolver::{AppRootResolver, PathResolver};
pub use scanner::{FilePattern, Scanner};
