//! powercycled — the cycling daemon, as a library so the assembly can be
//! driven from integration tests.

pub mod app;
pub mod cli;
pub mod logging;

pub use app::Daemon;
pub use cli::{Cli, Command, ConfigOverrides};
