use crate::core::model::{EntryKind, FileEntry, RelPath, TreeInventory};
use crate::device::{DeviceSession, RemoteEntry, RemoteKind};
use crate::error::SyncError;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// 通过设备会话构建远端目录清单
pub struct RemoteInspector<'a> {
    session: &'a dyn DeviceSession,
    root: &'a str,
    cancel_flag: Arc<AtomicBool>,
}

impl<'a> RemoteInspector<'a> {
    pub fn new(session: &'a dyn DeviceSession, root: &'a str, cancel_flag: Arc<AtomicBool>) -> Self {
        Self {
            session,
            root,
            cancel_flag,
        }
    }

    /// 广度优先遍历；根目录不存在时返回空清单，其他列举失败直接上抛
    pub async fn inspect(&self) -> Result<TreeInventory, SyncError> {
        info!("开始扫描设备目录: {}", self.root);

        let Some(top) = self.session.list(self.root).await? else {
            info!("设备目录不存在，将在同步时创建: {}", self.root);
            return Ok(TreeInventory::new(false));
        };

        let mut inventory = TreeInventory::new(true);
        let mut queue = VecDeque::new();
        self.absorb(&mut inventory, &mut queue, &RelPath::root(), top);

        while let Some(dir) = queue.pop_front() {
            if self.cancel_flag.load(Ordering::Relaxed) {
                return Err(SyncError::Cancelled);
            }

            let remote_path = dir.to_remote(self.root);
            match self.session.list(&remote_path).await? {
                Some(entries) => self.absorb(&mut inventory, &mut queue, &dir, entries),
                // 列举期间被删掉，按空目录处理
                None => debug!("目录在扫描中消失: {}", remote_path),
            }
        }

        info!(
            "设备扫描完成: {} 个条目 ({} 个文件, {} 字节), {} 个隐藏",
            inventory.len(),
            inventory.file_count(),
            inventory.total_bytes(),
            inventory.hidden.len()
        );
        Ok(inventory)
    }

    fn absorb(
        &self,
        inventory: &mut TreeInventory,
        queue: &mut VecDeque<RelPath>,
        parent: &RelPath,
        entries: Vec<RemoteEntry>,
    ) {
        for entry in entries {
            let relative_path = parent.join(&entry.name);
            if relative_path.is_hidden() {
                inventory.hidden.push(relative_path);
                continue;
            }

            let kind = match entry.kind {
                RemoteKind::File => EntryKind::File,
                RemoteKind::Directory => {
                    queue.push_back(relative_path.clone());
                    EntryKind::Directory
                }
                RemoteKind::Other => {
                    debug!("设备上的特殊文件: {}", relative_path);
                    inventory.special.insert(relative_path);
                    continue;
                }
            };

            inventory.insert(FileEntry {
                relative_path,
                kind,
                size: if kind == EntryKind::File { entry.size } else { 0 },
                modified_time: entry.modified_time,
                is_hidden: false,
            });
        }
    }
}
