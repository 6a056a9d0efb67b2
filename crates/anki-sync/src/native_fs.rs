//! Native filesystem implementation using tokio::fs.

use anki_sync_core::fs::{FileEntry, FileSystem, FsError, Result};
use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use tokio::fs;

/// Vault rooted at a directory on disk.
pub struct NativeFs {
    base_path: PathBuf,
}

impl NativeFs {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        let path = path.trim_matches('/');
        if path.is_empty() {
            self.base_path.clone()
        } else {
            self.base_path.join(path)
        }
    }
}

fn io_error(path: &str, err: io::Error) -> FsError {
    match err.kind() {
        io::ErrorKind::NotFound => FsError::NotFound(path.to_string()),
        io::ErrorKind::IsADirectory => FsError::IsDirectory(path.to_string()),
        io::ErrorKind::NotADirectory => FsError::NotDirectory(path.to_string()),
        _ => FsError::Io(format!("{}: {}", path, err)),
    }
}

#[async_trait]
impl FileSystem for NativeFs {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        fs::read(self.full_path(path))
            .await
            .map_err(|e| io_error(path, e))
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        let full_path = self.full_path(path);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(path, e))?;
        }

        fs::write(&full_path, content)
            .await
            .map_err(|e| io_error(path, e))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        fs::rename(self.full_path(from), self.full_path(to))
            .await
            .map_err(|e| io_error(from, e))
    }

    async fn list(&self, path: &str) -> Result<Vec<FileEntry>> {
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(self.full_path(path))
            .await
            .map_err(|e| io_error(path, e))?;

        while let Some(entry) = dir.next_entry().await.map_err(|e| io_error(path, e))? {
            let name = entry.file_name().to_string_lossy().to_string();
            // Follows symlinks, unlike DirEntry::file_type
            let is_dir = fs::metadata(entry.path())
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false);
            entries.push(FileEntry { name, is_dir });
        }

        Ok(entries)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path);
        let metadata = fs::metadata(&full_path)
            .await
            .map_err(|e| io_error(path, e))?;

        let removed = if metadata.is_dir() {
            fs::remove_dir(&full_path).await
        } else {
            fs::remove_file(&full_path).await
        };
        removed.map_err(|e| io_error(path, e))
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        fs::try_exists(self.full_path(path))
            .await
            .map_err(|e| io_error(path, e))
    }

    async fn is_dir(&self, path: &str) -> Result<bool> {
        match fs::metadata(self.full_path(path)).await {
            Ok(metadata) => Ok(metadata.is_dir()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(path, e)),
        }
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        fs::create_dir_all(self.full_path(path))
            .await
            .map_err(|e| io_error(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anki_sync_core::fs::walk_files;
    use tempfile::TempDir;

    #[tokio::test]
    async fn write_creates_parents_and_rename_replaces() {
        let dir = TempDir::new().unwrap();
        let fs = NativeFs::new(dir.path().to_path_buf());

        fs.write("a/b/note.md", b"one").await.unwrap();
        fs.write("a/b/note.tmp", b"two").await.unwrap();
        fs.rename("a/b/note.tmp", "a/b/note.md").await.unwrap();

        assert_eq!(fs.read_to_string("a/b/note.md").await.unwrap(), "two");
        assert!(!fs.exists("a/b/note.tmp").await.unwrap());
        assert!(fs.is_dir("a/b").await.unwrap());
        assert!(!fs.is_dir("a/b/note.md").await.unwrap());
        assert!(!fs.is_dir("missing").await.unwrap());
    }

    #[tokio::test]
    async fn missing_files_map_to_not_found() {
        let dir = TempDir::new().unwrap();
        let fs = NativeFs::new(dir.path().to_path_buf());

        assert!(matches!(
            fs.read("nope.md").await.unwrap_err(),
            FsError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn walk_skips_hidden_directories() {
        let dir = TempDir::new().unwrap();
        let fs = NativeFs::new(dir.path().to_path_buf());
        fs.write("deck/one.md", b"").await.unwrap();
        fs.write(".obsidian/app.json", b"{}").await.unwrap();
        fs.write("Templates/Basic.md", b"").await.unwrap();
        fs.write("two.md", b"").await.unwrap();

        let files = walk_files(&fs, "", &["Templates"]).await.unwrap();
        assert_eq!(files, vec!["deck/one.md", "two.md"]);
    }
}
