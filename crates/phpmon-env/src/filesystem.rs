//! Filesystem seam
//!
//! [`RealFileSystem`] talks to the OS; [`TestableFileSystem`] is an in-memory
//! map from exact path strings to [`FakeFile`] records. Paths are plain
//! strings on purpose: fixtures key on the literal text the engine produces
//! (including a leading `~`).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use phpmon_core::prelude::*;
use serde::Serialize;

/// Filesystem operations used by the engine
///
/// Existence predicates never fail: a path that cannot be inspected is
/// reported as absent.
pub trait FileSystem: Send + Sync {
    fn create_directory(&self, path: &str, with_intermediate_directories: bool) -> Result<()>;

    fn write_atomically(&self, path: &str, content: &str) -> Result<()>;

    fn read_to_string(&self, path: &str) -> Result<String>;

    fn move_item(&self, from: &str, to: &str) -> Result<()>;

    fn remove(&self, path: &str) -> Result<()>;

    fn make_executable(&self, path: &str) -> Result<()>;

    /// Target of the symlink at `path`
    fn symlink_target(&self, path: &str) -> Result<String>;

    /// Names of the direct children of `path`, sorted
    fn list_directory(&self, path: &str) -> Result<Vec<String>>;

    fn is_executable_file(&self, path: &str) -> bool;

    fn is_writable_file(&self, path: &str) -> bool;

    fn any_exists(&self, path: &str) -> bool;

    /// A binary, text file or symlink (symlinks are not followed)
    fn file_exists(&self, path: &str) -> bool;

    /// A directory (symlinks are not followed)
    fn directory_exists(&self, path: &str) -> bool;

    fn is_symlink(&self, path: &str) -> bool;
}

// ─────────────────────────────────────────────────────────────────────────────
// Real filesystem
// ─────────────────────────────────────────────────────────────────────────────

/// Filesystem backed by `std::fs`
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl RealFileSystem {
    pub fn new() -> Self {
        Self
    }
}

/// Expand a leading `~` to the user's home directory
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

impl FileSystem for RealFileSystem {
    fn create_directory(&self, path: &str, with_intermediate_directories: bool) -> Result<()> {
        let target = expand_tilde(path);
        if target.symlink_metadata().is_ok() {
            return Err(Error::already_exists(path));
        }
        if with_intermediate_directories {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::create_dir(&target)?;
        }
        Ok(())
    }

    fn write_atomically(&self, path: &str, content: &str) -> Result<()> {
        let target = expand_tilde(path);
        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| Error::config(format!("Not a file path: {}", path)))?;
        let temp = target.with_file_name(format!(".{}.tmp", file_name));

        // Atomic write: write to temp, then rename
        std::fs::write(&temp, content)?;
        std::fs::rename(&temp, &target)?;
        Ok(())
    }

    fn read_to_string(&self, path: &str) -> Result<String> {
        std::fs::read_to_string(expand_tilde(path)).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::file_missing(path),
            _ => Error::Io(e),
        })
    }

    fn move_item(&self, from: &str, to: &str) -> Result<()> {
        let source = expand_tilde(from);
        let destination = expand_tilde(to);
        if source.symlink_metadata().is_err() {
            return Err(Error::file_missing(from));
        }
        if destination.symlink_metadata().is_ok() {
            return Err(Error::already_exists(to));
        }
        std::fs::rename(source, destination)?;
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<()> {
        let target = expand_tilde(path);
        let metadata = target
            .symlink_metadata()
            .map_err(|_| Error::file_missing(path))?;
        if metadata.is_dir() {
            std::fs::remove_dir_all(target)?;
        } else {
            std::fs::remove_file(target)?;
        }
        Ok(())
    }

    #[cfg(unix)]
    fn make_executable(&self, path: &str) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let target = expand_tilde(path);
        let metadata = std::fs::metadata(&target).map_err(|_| Error::file_missing(path))?;
        let mut permissions = metadata.permissions();
        permissions.set_mode(permissions.mode() | 0o111);
        std::fs::set_permissions(target, permissions)?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn make_executable(&self, path: &str) -> Result<()> {
        if expand_tilde(path).exists() {
            Ok(())
        } else {
            Err(Error::file_missing(path))
        }
    }

    fn symlink_target(&self, path: &str) -> Result<String> {
        std::fs::read_link(expand_tilde(path))
            .map(|target| target.to_string_lossy().to_string())
            .map_err(|_| Error::file_missing(path))
    }

    fn list_directory(&self, path: &str) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(expand_tilde(path)).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::file_missing(path),
            _ => Error::Io(e),
        })?;

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        Ok(names)
    }

    #[cfg(unix)]
    fn is_executable_file(&self, path: &str) -> bool {
        use std::os::unix::fs::PermissionsExt;

        std::fs::metadata(expand_tilde(path))
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    fn is_executable_file(&self, path: &str) -> bool {
        expand_tilde(path).is_file()
    }

    fn is_writable_file(&self, path: &str) -> bool {
        std::fs::metadata(expand_tilde(path))
            .map(|m| !m.permissions().readonly())
            .unwrap_or(false)
    }

    fn any_exists(&self, path: &str) -> bool {
        expand_tilde(path).symlink_metadata().is_ok()
    }

    fn file_exists(&self, path: &str) -> bool {
        expand_tilde(path)
            .symlink_metadata()
            .map(|m| m.is_file() || m.file_type().is_symlink())
            .unwrap_or(false)
    }

    fn directory_exists(&self, path: &str) -> bool {
        expand_tilde(path)
            .symlink_metadata()
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    fn is_symlink(&self, path: &str) -> bool {
        expand_tilde(path)
            .symlink_metadata()
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Testable filesystem
// ─────────────────────────────────────────────────────────────────────────────

/// Kind of a fake filesystem entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FakeFileType {
    Binary,
    Text,
    Directory,
    Symlink,
}

/// A fake filesystem entry
///
/// For symlinks, `content` holds the link target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FakeFile {
    pub file_type: FakeFileType,
    pub content: Option<String>,
    pub read_only: bool,
}

impl FakeFile {
    pub fn fake(file_type: FakeFileType) -> Self {
        Self {
            file_type,
            content: None,
            read_only: false,
        }
    }

    pub fn binary() -> Self {
        Self::fake(FakeFileType::Binary)
    }

    pub fn directory() -> Self {
        Self::fake(FakeFileType::Directory)
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::fake(FakeFileType::Text).with_content(content)
    }

    pub fn symlink(target: impl Into<String>) -> Self {
        Self::fake(FakeFileType::Symlink).with_content(target)
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

/// In-memory filesystem keyed by exact path strings
#[derive(Debug, Default)]
pub struct TestableFileSystem {
    files: Mutex<HashMap<String, FakeFile>>,
}

impl TestableFileSystem {
    pub fn new(files: HashMap<String, FakeFile>) -> Self {
        Self {
            files: Mutex::new(files),
        }
    }

    fn files(&self) -> MutexGuard<'_, HashMap<String, FakeFile>> {
        // A panic while holding the lock cannot leave the map half-updated
        self.files
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register (or replace) an entry
    pub fn insert(&self, path: impl Into<String>, file: FakeFile) {
        self.files().insert(path.into(), file);
    }

    /// Drop an entry if present
    pub fn forget(&self, path: &str) -> Option<FakeFile> {
        self.files().remove(path)
    }

    pub fn get(&self, path: &str) -> Option<FakeFile> {
        self.files().get(path).cloned()
    }

    /// All registered paths, sorted
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.files().keys().cloned().collect();
        paths.sort();
        paths
    }

    fn child_prefix(path: &str) -> String {
        format!("{}/", path.trim_end_matches('/'))
    }

    fn type_of(&self, path: &str) -> Option<FakeFileType> {
        self.files().get(path).map(|f| f.file_type)
    }
}

impl FileSystem for TestableFileSystem {
    fn create_directory(&self, path: &str, _with_intermediate_directories: bool) -> Result<()> {
        let mut files = self.files();
        if files.contains_key(path) {
            return Err(Error::already_exists(path));
        }
        files.insert(path.to_string(), FakeFile::directory());
        Ok(())
    }

    fn write_atomically(&self, path: &str, content: &str) -> Result<()> {
        let mut files = self.files();
        if files.contains_key(path) {
            return Err(Error::already_exists(path));
        }
        files.insert(path.to_string(), FakeFile::text(content));
        Ok(())
    }

    fn read_to_string(&self, path: &str) -> Result<String> {
        self.files()
            .get(path)
            .map(|file| file.content.clone().unwrap_or_default())
            .ok_or_else(|| Error::file_missing(path))
    }

    fn move_item(&self, from: &str, to: &str) -> Result<()> {
        let mut files = self.files();
        if !files.contains_key(from) {
            return Err(Error::file_missing(from));
        }
        if files.contains_key(to) {
            return Err(Error::already_exists(to));
        }

        let prefix = Self::child_prefix(from);
        let moved: Vec<String> = files
            .keys()
            .filter(|key| key.as_str() == from || key.starts_with(&prefix))
            .cloned()
            .collect();

        for key in moved {
            if let Some(file) = files.remove(&key) {
                let new_key = format!("{}{}", to, &key[from.len()..]);
                files.insert(new_key, file);
            }
        }
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<()> {
        let mut files = self.files();
        if files.remove(path).is_none() {
            return Err(Error::file_missing(path));
        }
        let prefix = Self::child_prefix(path);
        files.retain(|key, _| !key.starts_with(&prefix));
        Ok(())
    }

    fn make_executable(&self, path: &str) -> Result<()> {
        let mut files = self.files();
        let file = files
            .get_mut(path)
            .ok_or_else(|| Error::file_missing(path))?;
        // Directories only gain permission bits
        if file.file_type != FakeFileType::Directory {
            file.file_type = FakeFileType::Binary;
        }
        Ok(())
    }

    fn symlink_target(&self, path: &str) -> Result<String> {
        match self.files().get(path) {
            Some(file) if file.file_type == FakeFileType::Symlink => {
                Ok(file.content.clone().unwrap_or_default())
            }
            _ => Err(Error::file_missing(path)),
        }
    }

    fn list_directory(&self, path: &str) -> Result<Vec<String>> {
        let files = self.files();
        match files.get(path) {
            Some(file) if file.file_type == FakeFileType::Directory => {}
            _ => return Err(Error::file_missing(path)),
        }

        let prefix = Self::child_prefix(path);
        let mut names: Vec<String> = files
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
            .map(str::to_string)
            .collect();
        names.sort();
        Ok(names)
    }

    fn is_executable_file(&self, path: &str) -> bool {
        self.type_of(path) == Some(FakeFileType::Binary)
    }

    fn is_writable_file(&self, path: &str) -> bool {
        self.files()
            .get(path)
            .map(|file| !file.read_only)
            .unwrap_or(false)
    }

    fn any_exists(&self, path: &str) -> bool {
        self.files().contains_key(path)
    }

    fn file_exists(&self, path: &str) -> bool {
        matches!(
            self.type_of(path),
            Some(FakeFileType::Binary | FakeFileType::Symlink | FakeFileType::Text)
        )
    }

    fn directory_exists(&self, path: &str) -> bool {
        self.type_of(path) == Some(FakeFileType::Directory)
    }

    fn is_symlink(&self, path: &str) -> bool {
        self.type_of(path) == Some(FakeFileType::Symlink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn fake(entries: &[(&str, FakeFile)]) -> TestableFileSystem {
        TestableFileSystem::new(
            entries
                .iter()
                .map(|(path, file)| (path.to_string(), file.clone()))
                .collect(),
        )
    }

    #[test]
    #[serial]
    fn test_expand_tilde_uses_home() {
        let previous = std::env::var_os("HOME");
        std::env::set_var("HOME", "/Users/phpmon");

        assert_eq!(
            expand_tilde("~/.config/valet"),
            PathBuf::from("/Users/phpmon/.config/valet")
        );
        assert_eq!(expand_tilde("~"), PathBuf::from("/Users/phpmon"));
        assert_eq!(expand_tilde("/opt/~/bin"), PathBuf::from("/opt/~/bin"));

        match previous {
            Some(home) => std::env::set_var("HOME", home),
            None => std::env::remove_var("HOME"),
        }
    }

    #[test]
    fn test_file_and_directory_predicates_are_exclusive() {
        let fs = fake(&[
            ("/bin/php", FakeFile::binary()),
            ("/etc/php.ini", FakeFile::text("memory_limit=128M")),
            ("/opt/php", FakeFile::symlink("/Cellar/php/8.2.3")),
            ("/Cellar", FakeFile::directory()),
        ]);

        for path in fs.paths() {
            assert_ne!(
                fs.file_exists(&path),
                fs.directory_exists(&path),
                "predicates overlap for {}",
                path
            );
        }
    }

    #[test]
    fn test_unregistered_paths_are_absent() {
        let fs = TestableFileSystem::default();
        assert!(!fs.any_exists("/nope"));
        assert!(!fs.file_exists("/nope"));
        assert!(!fs.directory_exists("/nope"));
        assert!(!fs.is_symlink("/nope"));
        assert!(!fs.is_executable_file("/nope"));
        assert!(!fs.is_writable_file("/nope"));
    }

    #[test]
    fn test_create_directory_twice_fails() {
        let fs = TestableFileSystem::default();
        fs.create_directory("~/.config/phpmon", true).unwrap();
        let err = fs.create_directory("~/.config/phpmon", true).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
        assert!(fs.directory_exists("~/.config/phpmon"));
    }

    #[test]
    fn test_write_atomically_refuses_existing_path() {
        let fs = fake(&[("/etc/php.ini", FakeFile::text("a"))]);
        let err = fs.write_atomically("/etc/php.ini", "b").unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
        assert_eq!(fs.read_to_string("/etc/php.ini").unwrap(), "a");
    }

    #[test]
    fn test_read_to_string() {
        let fs = fake(&[
            ("/with", FakeFile::text("content")),
            ("/without", FakeFile::binary()),
        ]);
        assert_eq!(fs.read_to_string("/with").unwrap(), "content");
        assert_eq!(fs.read_to_string("/without").unwrap(), "");
        assert!(matches!(
            fs.read_to_string("/missing"),
            Err(Error::FileMissing { .. })
        ));
    }

    #[test]
    fn test_make_executable() {
        let fs = fake(&[("/usr/local/bin/pm81", FakeFile::text("#!/bin/sh"))]);
        assert!(!fs.is_executable_file("/usr/local/bin/pm81"));
        fs.make_executable("/usr/local/bin/pm81").unwrap();
        assert!(fs.is_executable_file("/usr/local/bin/pm81"));

        assert!(matches!(
            fs.make_executable("/missing"),
            Err(Error::FileMissing { .. })
        ));
    }

    #[test]
    fn test_make_executable_keeps_directories() {
        let fs = fake(&[("/usr/local/bin", FakeFile::directory())]);
        fs.make_executable("/usr/local/bin").unwrap();
        assert!(fs.directory_exists("/usr/local/bin"));
        assert!(!fs.file_exists("/usr/local/bin"));
        assert!(!fs.is_executable_file("/usr/local/bin"));
    }

    #[test]
    fn test_read_only_file_is_not_writable() {
        let fs = fake(&[
            ("/ro", FakeFile::text("x").read_only()),
            ("/rw", FakeFile::text("x")),
        ]);
        assert!(!fs.is_writable_file("/ro"));
        assert!(fs.is_writable_file("/rw"));
    }

    #[test]
    fn test_move_item_moves_children() {
        let fs = fake(&[
            ("/a", FakeFile::directory()),
            ("/a/b.txt", FakeFile::text("b")),
            ("/ab", FakeFile::text("not a child")),
        ]);
        fs.move_item("/a", "/c").unwrap();

        assert!(fs.directory_exists("/c"));
        assert_eq!(fs.read_to_string("/c/b.txt").unwrap(), "b");
        assert!(!fs.any_exists("/a/b.txt"));
        assert!(fs.any_exists("/ab"));
    }

    #[test]
    fn test_move_item_errors() {
        let fs = fake(&[("/a", FakeFile::text("a")), ("/b", FakeFile::text("b"))]);
        assert!(matches!(
            fs.move_item("/missing", "/x"),
            Err(Error::FileMissing { .. })
        ));
        assert!(matches!(
            fs.move_item("/a", "/b"),
            Err(Error::AlreadyExists { .. })
        ));
    }

    #[test]
    fn test_remove_directory_removes_children() {
        let fs = fake(&[
            ("/dir", FakeFile::directory()),
            ("/dir/file", FakeFile::text("x")),
        ]);
        fs.remove("/dir").unwrap();
        assert!(fs.paths().is_empty());
        assert!(matches!(fs.remove("/dir"), Err(Error::FileMissing { .. })));
    }

    #[test]
    fn test_symlink_target_and_listing() {
        let fs = fake(&[
            ("/opt", FakeFile::directory()),
            ("/opt/php@8.1", FakeFile::symlink("/Cellar/php@8.1/8.1.10")),
            ("/opt/php", FakeFile::symlink("/Cellar/php/8.2.3")),
            ("/opt/php/bin/php", FakeFile::binary()),
        ]);
        assert_eq!(fs.symlink_target("/opt/php").unwrap(), "/Cellar/php/8.2.3");
        assert!(fs.symlink_target("/opt").is_err());
        assert_eq!(fs.list_directory("/opt").unwrap(), vec!["php", "php@8.1"]);
        assert!(fs.list_directory("/opt/php").is_err());
    }

    #[test]
    fn test_real_filesystem_round_trip() {
        let temp = TempDir::new().unwrap();
        let fs = RealFileSystem::new();
        let dir = temp.path().join("config");
        let dir = dir.to_string_lossy().to_string();

        fs.create_directory(&dir, true).unwrap();
        assert!(fs.directory_exists(&dir));
        assert!(!fs.file_exists(&dir));
        assert!(matches!(
            fs.create_directory(&dir, true),
            Err(Error::AlreadyExists { .. })
        ));

        let file = format!("{}/settings.toml", dir);
        fs.write_atomically(&file, "custom_services = []").unwrap();
        assert!(fs.file_exists(&file));
        assert_eq!(fs.read_to_string(&file).unwrap(), "custom_services = []");
        assert_eq!(fs.list_directory(&dir).unwrap(), vec!["settings.toml"]);

        fs.remove(&file).unwrap();
        assert!(!fs.any_exists(&file));
        assert!(matches!(
            fs.read_to_string(&file),
            Err(Error::FileMissing { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_real_filesystem_executable_and_symlink() {
        let temp = TempDir::new().unwrap();
        let fs = RealFileSystem::new();
        let script = temp.path().join("pm81").to_string_lossy().to_string();
        std::fs::write(&script, "#!/bin/sh\n").unwrap();

        assert!(!fs.is_executable_file(&script));
        fs.make_executable(&script).unwrap();
        assert!(fs.is_executable_file(&script));

        let link = temp.path().join("link").to_string_lossy().to_string();
        std::os::unix::fs::symlink(&script, &link).unwrap();
        assert!(fs.is_symlink(&link));
        assert!(fs.file_exists(&link));
        assert_eq!(fs.symlink_target(&link).unwrap(), script);
    }
}
