//! 两侧目录树的共同数据模型

use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// 相对于同步根目录的路径，按段存储
///
/// 排序按段逐个比较，因此父目录总排在它的子项之前。
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelPath(Vec<String>);

impl RelPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// 解析 `/` 分隔的路径，忽略空段和 `.`
    pub fn parse(path: &str) -> Self {
        Self(
            path.split('/')
                .filter(|s| !s.is_empty() && *s != ".")
                .map(str::to_string)
                .collect(),
        )
    }

    /// 从本地相对路径转换；包含 `..` 或绝对前缀时返回 None
    pub fn from_path(path: &Path) -> Option<Self> {
        let mut segments = Vec::new();
        for component in path.components() {
            match component {
                Component::Normal(s) => segments.push(s.to_string_lossy().into_owned()),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(Self(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn join(&self, name: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.to_string());
        Self(segments)
    }

    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// 所有非根祖先，由浅到深
    pub fn ancestors(&self) -> Vec<RelPath> {
        (1..self.0.len())
            .map(|n| Self(self.0[..n].to_vec()))
            .collect()
    }

    pub fn name(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// 最后一段以 `.` 开头
    pub fn is_hidden(&self) -> bool {
        self.name().is_some_and(|n| n.starts_with('.'))
    }

    /// 自身或位于 `other` 之下
    pub fn starts_with(&self, other: &RelPath) -> bool {
        self.0.starts_with(&other.0)
    }

    /// 设备上的绝对路径
    pub fn to_remote(&self, remote_root: &str) -> String {
        if self.is_root() {
            return remote_root.to_string();
        }
        let root = remote_root.trim_end_matches('/');
        format!("{}/{}", root, self.0.join("/"))
    }

    pub fn to_local(&self, local_root: &Path) -> PathBuf {
        let mut path = local_root.to_path_buf();
        path.extend(&self.0);
        path
    }
}

impl fmt::Display for RelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str(".")
        } else {
            f.write_str(&self.0.join("/"))
        }
    }
}

impl Serialize for RelPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// 目录树中的一个条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub relative_path: RelPath,
    pub kind: EntryKind,
    /// 目录为 0
    pub size: u64,
    /// Unix 秒
    pub modified_time: i64,
    pub is_hidden: bool,
}

impl FileEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// 扫描时无法读取的本地条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntry {
    pub relative_path: RelPath,
    pub reason: String,
}

/// 一侧目录树在某一时刻的完整清单
///
/// 隐藏条目不进入 `entries`，只记录在 `hidden` 中。
#[derive(Debug, Clone, Default)]
pub struct TreeInventory {
    /// 根目录是否存在（远端根目录可以不存在）
    pub root_exists: bool,
    pub entries: BTreeMap<RelPath, FileEntry>,
    pub hidden: Vec<RelPath>,
    pub unreadable: Vec<SkippedEntry>,
    /// 远端的符号链接、设备文件等，不参与比较，但本地同名时需要先删除
    pub special: BTreeSet<RelPath>,
}

impl TreeInventory {
    pub fn new(root_exists: bool) -> Self {
        Self {
            root_exists,
            ..Default::default()
        }
    }

    pub fn insert(&mut self, entry: FileEntry) {
        self.entries.insert(entry.relative_path.clone(), entry);
    }

    pub fn get(&self, path: &RelPath) -> Option<&FileEntry> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &RelPath) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn file_count(&self) -> usize {
        self.entries.values().filter(|e| !e.is_dir()).count()
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries.values().map(|e| e.size).sum()
    }
}

/// SystemTime 转为 Unix 秒，早于 1970 的时间为负数
pub fn unix_secs(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}
