//! # phpmon-env - Environment Abstraction Layer
//!
//! Every interaction PHP Monitor has with the machine goes through one of
//! three seams, each with a real and a testable implementation.
//!
//! Depends on [`phpmon_core`] for error handling.
//!
//! ## Public API
//!
//! ### Seams
//! - [`FileSystem`] - File and directory operations ([`RealFileSystem`], [`TestableFileSystem`])
//! - [`Shell`] - `/bin/sh -c` commands ([`RealShell`], [`TestableShell`])
//! - [`CommandRunner`] - Direct binary invocation ([`RealCommand`], [`TestableCommand`])
//!
//! ### Wiring
//! - [`Environment`] - The three seams plus [`Paths`], chosen once
//! - [`TestableConfiguration`] - `working()` / `broken()` fake machines

pub mod command;
pub mod environment;
pub mod filesystem;
pub mod paths;
pub mod presets;
pub mod shell;

pub use command::{command_key, CommandRunner, RealCommand, TestableCommand};
pub use environment::Environment;
pub use filesystem::{
    expand_tilde, FakeFile, FakeFileType, FileSystem, RealFileSystem, TestableFileSystem,
};
pub use paths::Paths;
pub use presets::{TestableConfiguration, TestableEnvironment};
pub use shell::{
    FakeEffect, FakeShellOutput, RealShell, Shell, ShellOutput, ShellStream, TestableShell,
};
