pub mod config;
pub mod fs;
pub mod shell;

pub use config::Config;
pub use fs::{FileSystem, FsError};
pub use shell::{execute, Outcome, Session};
