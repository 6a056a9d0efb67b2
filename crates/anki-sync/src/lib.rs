//! anki-sync library: the daemon components, exposed for integration tests.

pub mod config;
pub mod daemon;
pub mod http;
pub mod native_fs;
pub mod notifier;
pub mod watcher;

pub use config::{Cli, Command, Config, ConfigError, SettingsArgs};
pub use daemon::Scheduler;
pub use http::HttpTransport;
pub use native_fs::NativeFs;
pub use notifier::LogNotifier;
pub use watcher::{FileEvent, FileWatcher};
