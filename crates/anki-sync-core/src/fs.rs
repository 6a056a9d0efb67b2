//! FileSystem trait abstraction over the vault.
//!
//! Implementations:
//! - `InMemoryFs` - For testing
//! - `NativeFs` (in anki-sync) - Uses tokio::fs
//!
//! Paths are vault-relative and always use `/` as separator.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Is a directory: {0}")]
    IsDirectory(String),

    #[error("Not a directory: {0}")]
    NotDirectory(String),

    #[error("Invalid UTF-8 in {0}")]
    InvalidUtf8(String),

    #[error("IO error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, FsError>;

/// Directory entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// File or directory name (not full path)
    pub name: String,
    /// Whether this is a directory
    pub is_dir: bool,
}

/// Platform-independent filesystem abstraction.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Read file contents
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Write file contents (creates parent directories if needed)
    async fn write(&self, path: &str, content: &[u8]) -> Result<()>;

    /// Rename a file, replacing the destination if it exists
    async fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// List directory contents
    async fn list(&self, path: &str) -> Result<Vec<FileEntry>>;

    /// Delete file or empty directory
    async fn delete(&self, path: &str) -> Result<()>;

    /// Check if path exists
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Check if path is an existing directory
    async fn is_dir(&self, path: &str) -> Result<bool>;

    /// Create directory (and parents if needed)
    async fn mkdir(&self, path: &str) -> Result<()>;

    /// Read a file as UTF-8 text
    async fn read_to_string(&self, path: &str) -> Result<String> {
        let bytes = self.read(path).await?;
        String::from_utf8(bytes).map_err(|_| FsError::InvalidUtf8(path.to_string()))
    }
}

#[async_trait]
impl<T: FileSystem + ?Sized> FileSystem for std::sync::Arc<T> {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        (**self).read(path).await
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        (**self).write(path, content).await
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        (**self).rename(from, to).await
    }

    async fn list(&self, path: &str) -> Result<Vec<FileEntry>> {
        (**self).list(path).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        (**self).delete(path).await
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        (**self).exists(path).await
    }

    async fn is_dir(&self, path: &str) -> Result<bool> {
        (**self).is_dir(path).await
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        (**self).mkdir(path).await
    }
}

/// Join a vault-relative directory and a name.
pub fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Recursively list every file below `root`, depth first, sorted by path.
///
/// Directories whose name starts with `.` (`.obsidian`, `.trash`, our own
/// state directory) and any path in `excluded` are not descended into.
pub async fn walk_files<F: FileSystem + ?Sized>(
    fs: &F,
    root: &str,
    excluded: &[&str],
) -> Result<Vec<String>> {
    let mut files = Vec::new();
    let mut pending = vec![root.trim_matches('/').to_string()];

    while let Some(dir) = pending.pop() {
        let mut entries = fs.list(&dir).await?;
        entries.sort_by(|a, b| b.name.cmp(&a.name));
        for entry in entries {
            if entry.name.starts_with('.') {
                continue;
            }
            let path = join(&dir, &entry.name);
            if entry.is_dir {
                if !excluded.contains(&path.as_str()) {
                    pending.push(path);
                }
            } else {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Vault-relative form of `path`.
fn normalize(path: &str) -> String {
    path.trim_matches('/').to_string()
}

/// Directory containing `path`; the vault root is `""`.
fn parent(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

#[derive(Debug, Default)]
struct Tree {
    files: BTreeMap<String, Vec<u8>>,
    /// Every directory except the root
    dirs: BTreeSet<String>,
}

impl Tree {
    fn add_dir(&mut self, path: &str) {
        let mut dir = path;
        while !dir.is_empty() && self.dirs.insert(dir.to_string()) {
            dir = parent(dir);
        }
    }

    fn put(&mut self, path: String, content: Vec<u8>) {
        self.add_dir(parent(&path));
        self.files.insert(path, content);
    }

    fn is_dir(&self, path: &str) -> bool {
        path.is_empty() || self.dirs.contains(path)
    }
}

/// In-memory filesystem for testing
#[derive(Debug, Default)]
pub struct InMemoryFs {
    tree: RwLock<Tree>,
}

impl InMemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a filesystem pre-populated with text files.
    pub fn with_files<'a>(files: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let fs = Self::new();
        for (path, content) in files {
            fs.insert(path, content.as_bytes());
        }
        fs
    }

    /// Synchronous write used to seed test fixtures.
    pub fn insert(&self, path: &str, content: &[u8]) {
        self.tree
            .write()
            .unwrap()
            .put(normalize(path), content.to_vec());
    }

    /// Synchronous read used by test assertions.
    pub fn contents(&self, path: &str) -> Option<String> {
        let tree = self.tree.read().unwrap();
        tree.files
            .get(&normalize(path))
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

#[async_trait]
impl FileSystem for InMemoryFs {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let path = normalize(path);
        let tree = self.tree.read().unwrap();
        tree.files
            .get(&path)
            .cloned()
            .ok_or(FsError::NotFound(path))
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        let path = normalize(path);
        let mut tree = self.tree.write().unwrap();
        if tree.is_dir(&path) {
            return Err(FsError::IsDirectory(path));
        }
        tree.put(path, content.to_vec());
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let from = normalize(from);
        let mut tree = self.tree.write().unwrap();
        match tree.files.remove(&from) {
            Some(content) => {
                tree.put(normalize(to), content);
                Ok(())
            }
            None => Err(FsError::NotFound(from)),
        }
    }

    async fn list(&self, path: &str) -> Result<Vec<FileEntry>> {
        let path = normalize(path);
        let tree = self.tree.read().unwrap();
        if !tree.is_dir(&path) {
            return Err(FsError::NotFound(path));
        }

        let entry = |child: &String, is_dir: bool| FileEntry {
            name: child.rsplit('/').next().unwrap_or(child).to_string(),
            is_dir,
        };
        let files = tree
            .files
            .keys()
            .filter(|file| parent(file) == path)
            .map(|file| entry(file, false));
        let dirs = tree
            .dirs
            .iter()
            .filter(|dir| parent(dir) == path)
            .map(|dir| entry(dir, true));
        Ok(files.chain(dirs).collect())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let path = normalize(path);
        let mut tree = self.tree.write().unwrap();
        if tree.files.remove(&path).is_some() {
            return Ok(());
        }
        let has_children = tree.files.keys().any(|f| parent(f) == path)
            || tree.dirs.iter().any(|d| parent(d) == path);
        if has_children {
            return Err(FsError::Io(format!("Directory not empty: {}", path)));
        }
        if tree.dirs.remove(&path) {
            return Ok(());
        }
        Err(FsError::NotFound(path))
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let path = normalize(path);
        let tree = self.tree.read().unwrap();
        Ok(tree.files.contains_key(&path) || tree.is_dir(&path))
    }

    async fn is_dir(&self, path: &str) -> Result<bool> {
        Ok(self.tree.read().unwrap().is_dir(&normalize(path)))
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        let path = normalize(path);
        let mut tree = self.tree.write().unwrap();
        if tree.files.contains_key(&path) {
            return Err(FsError::NotDirectory(path));
        }
        tree.add_dir(&path);
        Ok(())
    }
}
