//! The injected bundle of environment seams

use std::sync::Arc;

use crate::command::{CommandRunner, RealCommand};
use crate::filesystem::{FileSystem, RealFileSystem};
use crate::paths::Paths;
use crate::shell::{RealShell, Shell};

/// Filesystem, shell and command runner chosen together, plus the paths they
/// operate on
///
/// Built once at startup and shared by every component.
#[derive(Clone)]
pub struct Environment {
    pub fs: Arc<dyn FileSystem>,
    pub shell: Arc<dyn Shell>,
    pub command: Arc<dyn CommandRunner>,
    pub paths: Paths,
}

impl Environment {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        shell: Arc<dyn Shell>,
        command: Arc<dyn CommandRunner>,
        paths: Paths,
    ) -> Self {
        Self {
            fs,
            shell,
            command,
            paths,
        }
    }

    /// Environment that talks to the operating system
    pub fn real() -> Self {
        let paths = Paths::detect();
        Self::new(
            Arc::new(RealFileSystem::new()),
            Arc::new(RealShell::new(paths.bin())),
            Arc::new(RealCommand::new()),
            paths,
        )
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("paths", &self.paths)
            .finish_non_exhaustive()
    }
}
