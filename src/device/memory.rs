//! 进程内设备实现
//!
//! 用一棵内存目录树模拟设备文件系统，支持故障注入和操作记录。
//! 句柄可 clone，多个 clone 共享同一棵树，便于在同步结束后检查设备状态。

use super::{select_device, DeviceConnector, DeviceIdentity, DeviceSession, RemoteEntry, RemoteKind};
use crate::config::SyncSettings;
use crate::error::DeviceError;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

/// 内存树中的节点
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryNode {
    Dir { modified_time: i64 },
    File { data: Vec<u8>, modified_time: i64 },
}

impl MemoryNode {
    fn is_dir(&self) -> bool {
        matches!(self, MemoryNode::Dir { .. })
    }
}

/// 已执行的设备调用
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceOp {
    List(String),
    Mkdir(String),
    Push(String),
    Delete(String),
}

impl DeviceOp {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, DeviceOp::List(_))
    }
}

#[derive(Debug, Default)]
struct State {
    nodes: BTreeMap<String, MemoryNode>,
    ops: Vec<DeviceOp>,
    failing: HashMap<String, String>,
    /// 剩余可成功的修改类调用次数，用完后连接断开
    mutations_left: Option<usize>,
    lost: bool,
}

#[derive(Debug, Clone)]
pub struct MemoryDevice {
    identity: DeviceIdentity,
    state: Arc<Mutex<State>>,
}

impl MemoryDevice {
    pub fn new(identity: DeviceIdentity) -> Self {
        Self {
            identity,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 创建目录（含父目录）
    pub fn add_dir(&self, path: &str, modified_time: i64) {
        let mut state = self.state();
        let path = normalize(path);
        ensure_parents(&mut state.nodes, &path, modified_time);
        state
            .nodes
            .insert(path, MemoryNode::Dir { modified_time });
    }

    /// 写入文件（自动创建父目录）
    pub fn add_file(&self, path: &str, data: &[u8], modified_time: i64) {
        let mut state = self.state();
        let path = normalize(path);
        ensure_parents(&mut state.nodes, &path, modified_time);
        state.nodes.insert(
            path,
            MemoryNode::File {
                data: data.to_vec(),
                modified_time,
            },
        );
    }

    /// 对某个路径的任何调用都返回 RemoteIo
    pub fn fail_path(&self, path: &str, message: &str) {
        self.state()
            .failing
            .insert(normalize(path), message.to_string());
    }

    /// 再成功 `count` 次修改类调用后断开连接
    pub fn lose_transport_after(&self, count: usize) {
        self.state().mutations_left = Some(count);
    }

    pub fn node(&self, path: &str) -> Option<MemoryNode> {
        self.state().nodes.get(&normalize(path)).cloned()
    }

    pub fn exists(&self, path: &str) -> bool {
        self.node(path).is_some()
    }

    /// 整棵树的快照
    pub fn snapshot(&self) -> BTreeMap<String, MemoryNode> {
        self.state().nodes.clone()
    }

    pub fn ops(&self) -> Vec<DeviceOp> {
        self.state().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.state().ops.clear();
    }

    fn begin(&self, op: DeviceOp) -> Result<MutexGuard<'_, State>, DeviceError> {
        let mut state = self.state();
        if state.lost {
            return Err(DeviceError::transport("模拟设备已断开"));
        }
        if op.is_mutation() {
            match state.mutations_left {
                Some(0) => {
                    state.lost = true;
                    return Err(DeviceError::transport("模拟设备已断开"));
                }
                Some(n) => state.mutations_left = Some(n - 1),
                None => {}
            }
        }

        let path = match &op {
            DeviceOp::List(p) | DeviceOp::Mkdir(p) | DeviceOp::Push(p) | DeviceOp::Delete(p) => {
                p.clone()
            }
        };
        if let Some(message) = state.failing.get(&path) {
            return Err(DeviceError::remote_io(path, message.clone()));
        }

        state.ops.push(op);
        Ok(state)
    }
}

#[async_trait]
impl DeviceSession for MemoryDevice {
    fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    async fn list(&self, path: &str) -> Result<Option<Vec<RemoteEntry>>, DeviceError> {
        let path = normalize(path);
        let state = self.begin(DeviceOp::List(path.clone()))?;

        match state.nodes.get(&path) {
            None if path != "/" => return Ok(None),
            Some(MemoryNode::File { .. }) => {
                return Err(DeviceError::remote_io(path, "Not a directory"));
            }
            _ => {}
        }

        let mut entries: Vec<_> = state
            .nodes
            .iter()
            .filter(|(p, _)| parent_of(p) == path)
            .map(|(p, node)| {
                let name = p.rsplit('/').next().unwrap_or_default().to_string();
                match node {
                    MemoryNode::Dir { modified_time } => RemoteEntry {
                        name,
                        kind: RemoteKind::Directory,
                        size: 0,
                        modified_time: *modified_time,
                    },
                    MemoryNode::File {
                        data,
                        modified_time,
                    } => RemoteEntry {
                        name,
                        kind: RemoteKind::File,
                        size: data.len() as u64,
                        modified_time: *modified_time,
                    },
                }
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Some(entries))
    }

    async fn mkdir(&self, path: &str) -> Result<(), DeviceError> {
        let path = normalize(path);
        let mut state = self.begin(DeviceOp::Mkdir(path.clone()))?;

        if let Some(MemoryNode::File { .. }) = state.nodes.get(&path) {
            return Err(DeviceError::remote_io(path, "File exists"));
        }
        let now = now_secs();
        ensure_parents(&mut state.nodes, &path, now);
        state
            .nodes
            .entry(path)
            .or_insert(MemoryNode::Dir { modified_time: now });
        Ok(())
    }

    async fn push(
        &self,
        mut local: File,
        remote_path: &str,
        modified_time: i64,
    ) -> Result<u64, DeviceError> {
        let path = normalize(remote_path);
        let mut data = Vec::new();
        local
            .read_to_end(&mut data)
            .map_err(|e| DeviceError::transport(format!("读取本地文件失败: {}", e)))?;

        let mut state = self.begin(DeviceOp::Push(path.clone()))?;

        let parent = parent_of(&path);
        let parent_is_dir = parent == "/" || state.nodes.get(&parent).is_some_and(|n| n.is_dir());
        if !parent_is_dir {
            return Err(DeviceError::remote_io(path, "No such file or directory"));
        }
        if let Some(MemoryNode::Dir { .. }) = state.nodes.get(&path) {
            return Err(DeviceError::remote_io(path, "Is a directory"));
        }

        let written = data.len() as u64;
        state.nodes.insert(
            path,
            MemoryNode::File {
                data,
                modified_time,
            },
        );
        Ok(written)
    }

    async fn delete(&self, path: &str) -> Result<(), DeviceError> {
        let path = normalize(path);
        let mut state = self.begin(DeviceOp::Delete(path.clone()))?;

        let prefix = format!("{}/", path);
        state
            .nodes
            .retain(|p, _| p != &path && !p.starts_with(&prefix));
        Ok(())
    }
}

/// 从一组内存设备中按配置选择，行为与 USB 枚举一致
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    devices: Vec<MemoryDevice>,
}

impl MemoryConnector {
    pub fn new(device: MemoryDevice) -> Self {
        Self {
            devices: vec![device],
        }
    }

    pub fn with_devices(devices: Vec<MemoryDevice>) -> Self {
        Self { devices }
    }
}

#[async_trait]
impl DeviceConnector for MemoryConnector {
    async fn connect(&self, settings: &SyncSettings) -> Result<Box<dyn DeviceSession>, DeviceError> {
        let identities = self.devices.iter().map(|d| d.identity.clone()).collect();
        let selected = select_device(identities, settings.vendor_id, settings.product_id)?;
        let device = self
            .devices
            .iter()
            .find(|d| d.identity == selected)
            .cloned()
            .ok_or(DeviceError::NotFound)?;
        Ok(Box::new(device))
    }
}

fn normalize(path: &str) -> String {
    let parts: Vec<_> = path.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", parts.join("/"))
}

fn parent_of(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

fn ensure_parents(nodes: &mut BTreeMap<String, MemoryNode>, path: &str, modified_time: i64) {
    let mut current = parent_of(path);
    while current != "/" {
        nodes
            .entry(current.clone())
            .or_insert(MemoryNode::Dir { modified_time });
        current = parent_of(&current);
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn device() -> MemoryDevice {
        MemoryDevice::new(DeviceIdentity::new(0x18d1, 0x4ee7))
    }

    #[tokio::test]
    async fn test_list_missing_and_nested() {
        let dev = device();
        dev.add_file("/sdcard/Music/a.mp3", b"abc", 100);
        dev.add_file("/sdcard/Music/.nomedia", b"", 100);

        assert_eq!(dev.list("/sdcard/Nope").await.unwrap(), None);

        let entries = dev.list("/sdcard/Music").await.unwrap().unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec![".nomedia", "a.mp3"]);
        assert_eq!(entries[1].size, 3);

        let top = dev.list("/sdcard").await.unwrap().unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].kind, RemoteKind::Directory);
    }

    #[tokio::test]
    async fn test_push_requires_parent_directory() {
        let dev = device();
        let mut tmp = tempfile::tempfile().unwrap();
        tmp.write_all(b"data").unwrap();
        use std::io::Seek;
        tmp.rewind().unwrap();

        let err = dev.push(tmp, "/sdcard/x/y.txt", 5).await.unwrap_err();
        assert!(matches!(err, DeviceError::RemoteIo { .. }));

        dev.mkdir("/sdcard/x").await.unwrap();
        let mut tmp = tempfile::tempfile().unwrap();
        tmp.write_all(b"data").unwrap();
        tmp.rewind().unwrap();
        assert_eq!(dev.push(tmp, "/sdcard/x/y.txt", 5).await.unwrap(), 4);
        assert_eq!(
            dev.node("/sdcard/x/y.txt"),
            Some(MemoryNode::File {
                data: b"data".to_vec(),
                modified_time: 5
            })
        );
    }

    #[tokio::test]
    async fn test_delete_is_recursive_and_tolerates_missing() {
        let dev = device();
        dev.add_file("/sdcard/old/a/b.txt", b"x", 1);
        dev.delete("/sdcard/old").await.unwrap();
        assert!(!dev.exists("/sdcard/old/a/b.txt"));
        assert!(!dev.exists("/sdcard/old"));
        assert!(dev.exists("/sdcard"));
        dev.delete("/sdcard/old").await.unwrap();
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let dev = device();
        dev.fail_path("/sdcard/locked", "Permission denied");
        assert!(matches!(
            dev.mkdir("/sdcard/locked").await,
            Err(DeviceError::RemoteIo { .. })
        ));

        dev.lose_transport_after(1);
        dev.mkdir("/sdcard/a").await.unwrap();
        assert!(matches!(
            dev.mkdir("/sdcard/b").await,
            Err(DeviceError::TransportLost { .. })
        ));
        assert!(matches!(
            dev.list("/sdcard").await,
            Err(DeviceError::TransportLost { .. })
        ));
    }

    #[tokio::test]
    async fn test_connector_rejects_two_devices() {
        let a = device();
        let b = MemoryDevice::new(DeviceIdentity::new(0x04e8, 0x6860));
        let connector = MemoryConnector::with_devices(vec![a, b]);

        let settings = SyncSettings::default();
        assert!(matches!(
            connector.connect(&settings).await,
            Err(DeviceError::Ambiguous { .. })
        ));

        let settings = SyncSettings {
            vendor_id: Some(0x04e8),
            ..SyncSettings::default()
        };
        let session = connector.connect(&settings).await.unwrap();
        assert_eq!(session.identity().vendor_id, 0x04e8);
    }
}
