use crate::core::model::{unix_secs, EntryKind, FileEntry, RelPath, SkippedEntry, TreeInventory};
use crate::error::{ScanError, SyncError};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// 每处理多少个条目检查一次取消
const CANCEL_CHECK_INTERVAL: usize = 256;

/// 校验并规范化本地根目录
pub fn resolve_local_root(local_path: &str) -> Result<PathBuf, ScanError> {
    let trimmed = local_path.trim();
    let path = PathBuf::from(trimmed);
    if trimmed.is_empty() || !path.is_dir() {
        return Err(ScanError::RootNotFound { path });
    }
    fs::canonicalize(&path).map_err(|source| ScanError::Io { path, source })
}

/// 本地目录扫描器
pub struct LocalScanner {
    root: PathBuf,
    cancel_flag: Arc<AtomicBool>,
}

impl LocalScanner {
    pub fn new(root: PathBuf, cancel_flag: Arc<AtomicBool>) -> Self {
        Self { root, cancel_flag }
    }

    /// 在阻塞线程上完成整棵树的遍历
    pub async fn scan(self) -> Result<TreeInventory, SyncError> {
        tokio::task::spawn_blocking(move || self.scan_blocking()).await?
    }

    fn scan_blocking(&self) -> Result<TreeInventory, SyncError> {
        info!("开始扫描本地目录: {}", self.root.display());

        let mut inventory = TreeInventory::new(true);
        let mut walker = WalkDir::new(&self.root)
            .min_depth(1)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter();
        let mut seen = 0usize;

        while let Some(item) = walker.next() {
            seen += 1;
            if seen % CANCEL_CHECK_INTERVAL == 0 && self.cancel_flag.load(Ordering::Relaxed) {
                return Err(SyncError::Cancelled);
            }

            let entry = match item {
                Ok(entry) => entry,
                Err(err) => {
                    self.record_walk_error(&mut inventory, err)?;
                    continue;
                }
            };

            let Some(relative_path) = self.relative(entry.path()) else {
                continue;
            };

            if relative_path.is_hidden() {
                debug!("忽略隐藏条目: {}", relative_path);
                if entry.file_type().is_dir() {
                    walker.skip_current_dir();
                }
                inventory.hidden.push(relative_path);
                continue;
            }

            // follow_links 下 metadata 取的是链接目标
            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(err) => {
                    warn!("无法读取 {}: {}", relative_path, err);
                    inventory.unreadable.push(SkippedEntry {
                        relative_path,
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            let kind = if metadata.is_dir() {
                EntryKind::Directory
            } else if metadata.is_file() {
                EntryKind::File
            } else {
                warn!("跳过不支持的文件类型: {}", relative_path);
                inventory.unreadable.push(SkippedEntry {
                    relative_path,
                    reason: "不支持的文件类型".to_string(),
                });
                continue;
            };

            // metadata 不检查读权限，上传前才打不开的文件要在这里就记为跳过
            if kind == EntryKind::File {
                if let Err(err) = fs::File::open(entry.path()) {
                    warn!("无法读取 {}: {}", relative_path, err);
                    inventory.unreadable.push(SkippedEntry {
                        relative_path,
                        reason: err.to_string(),
                    });
                    continue;
                }
            }

            let modified_time = metadata.modified().map(unix_secs).unwrap_or(0);
            inventory.insert(FileEntry {
                relative_path,
                kind,
                size: if kind == EntryKind::File { metadata.len() } else { 0 },
                modified_time,
                is_hidden: false,
            });
        }

        info!(
            "本地扫描完成: {} 个条目 ({} 个文件, {} 字节), {} 个隐藏, {} 个无法读取",
            inventory.len(),
            inventory.file_count(),
            inventory.total_bytes(),
            inventory.hidden.len(),
            inventory.unreadable.len()
        );
        Ok(inventory)
    }

    /// 单个条目的错误记为跳过；根目录本身读不了才是扫描失败
    fn record_walk_error(
        &self,
        inventory: &mut TreeInventory,
        err: walkdir::Error,
    ) -> Result<(), SyncError> {
        let path = err.path().map(Path::to_path_buf);
        let relative_path = path.as_deref().and_then(|p| self.relative(p));

        match relative_path {
            Some(relative_path) if !relative_path.is_root() => {
                let reason = match err.loop_ancestor() {
                    Some(ancestor) => format!("符号链接循环，指向 {}", ancestor.display()),
                    None => err.to_string(),
                };
                warn!("跳过 {}: {}", relative_path, reason);
                if !relative_path.is_hidden() {
                    inventory.unreadable.push(SkippedEntry {
                        relative_path,
                        reason,
                    });
                }
                Ok(())
            }
            _ => {
                let source = err
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "目录遍历失败"));
                Err(ScanError::Io {
                    path: self.root.clone(),
                    source,
                }
                .into())
            }
        }
    }

    fn relative(&self, path: &Path) -> Option<RelPath> {
        path.strip_prefix(&self.root)
            .ok()
            .and_then(RelPath::from_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn scan(root: &Path) -> TreeInventory {
        LocalScanner::new(root.to_path_buf(), Arc::new(AtomicBool::new(false)))
            .scan_blocking()
            .unwrap()
    }

    #[test]
    fn test_resolve_local_root() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("f.txt");
        fs::write(&file, "x").unwrap();

        assert!(matches!(
            resolve_local_root("   "),
            Err(ScanError::RootNotFound { .. })
        ));
        assert!(matches!(
            resolve_local_root(file.to_str().unwrap()),
            Err(ScanError::RootNotFound { .. })
        ));
        assert!(matches!(
            resolve_local_root(dir.path().join("missing").to_str().unwrap()),
            Err(ScanError::RootNotFound { .. })
        ));

        let padded = format!("  {}  ", dir.path().display());
        let resolved = resolve_local_root(&padded).unwrap();
        assert_eq!(resolved, fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn test_scan_records_files_dirs_and_hidden() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), vec![0u8; 10]).unwrap();
        fs::write(dir.path().join(".hidden"), vec![0u8; 5]).unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/b.txt"), vec![0u8; 20]).unwrap();
        fs::create_dir_all(dir.path().join(".git/objects")).unwrap();
        fs::write(dir.path().join(".git/objects/x"), "x").unwrap();
        fs::create_dir_all(dir.path().join("empty")).unwrap();

        let inventory = scan(dir.path());
        let paths: Vec<_> = inventory.entries.keys().map(|p| p.to_string()).collect();
        assert_eq!(paths, vec!["a.txt", "empty", "sub", "sub/b.txt"]);

        let a = inventory.get(&RelPath::parse("a.txt")).unwrap();
        assert_eq!(a.kind, EntryKind::File);
        assert_eq!(a.size, 10);
        assert!(a.modified_time > 0);
        assert!(inventory.get(&RelPath::parse("sub")).unwrap().is_dir());

        let hidden: Vec<_> = inventory.hidden.iter().map(|p| p.to_string()).collect();
        assert_eq!(hidden, vec![".git", ".hidden"]);
        assert!(inventory.unreadable.is_empty());
        assert_eq!(inventory.total_bytes(), 30);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_loop_is_skipped() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("music/album")).unwrap();
        fs::write(dir.path().join("music/album/song.mp3"), "abc").unwrap();
        std::os::unix::fs::symlink(dir.path().join("music"), dir.path().join("music/album/loop"))
            .unwrap();

        let root = fs::canonicalize(dir.path()).unwrap();
        let inventory = scan(&root);
        assert!(inventory.contains(&RelPath::parse("music/album/song.mp3")));
        assert_eq!(inventory.unreadable.len(), 1);
        assert_eq!(
            inventory.unreadable[0].relative_path,
            RelPath::parse("music/album/loop")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_broken_symlink_is_skipped() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("ok.txt"), "ok").unwrap();
        std::os::unix::fs::symlink(dir.path().join("nowhere"), dir.path().join("dangling"))
            .unwrap();

        let inventory = scan(dir.path());
        assert_eq!(inventory.len(), 1);
        assert_eq!(inventory.unreadable.len(), 1);
        assert_eq!(inventory.unreadable[0].relative_path, RelPath::parse("dangling"));
    }

    #[cfg(unix)]
    #[test]
    fn test_permission_denied_file_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("ok.txt"), "ok").unwrap();
        let locked = dir.path().join("locked.txt");
        fs::write(&locked, "secret").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::File::open(&locked).is_ok() {
            // root 不受权限位限制
            return;
        }

        let inventory = scan(dir.path());
        assert!(inventory.contains(&RelPath::parse("ok.txt")));
        assert!(!inventory.contains(&RelPath::parse("locked.txt")));
        assert_eq!(inventory.unreadable.len(), 1);
        assert_eq!(inventory.unreadable[0].relative_path, RelPath::parse("locked.txt"));
    }

    #[tokio::test]
    async fn test_scan_runs_off_thread() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("x.bin"), "1234").unwrap();
        let inventory = LocalScanner::new(dir.path().to_path_buf(), Arc::new(AtomicBool::new(false)))
            .scan()
            .await
            .unwrap();
        assert!(inventory.root_exists);
        assert_eq!(inventory.file_count(), 1);
    }
}
