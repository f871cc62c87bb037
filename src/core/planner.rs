//! 差异计划
//!
//! 比较本地和远端清单，得到让远端与本地一致的有序动作序列。纯函数，不做任何 IO。
//!
//! 阶段顺序：
//! 1. 类型冲突（同一路径一侧是文件、一侧是目录，或远端是符号链接等特殊文件）的远端条目先删除
//! 2. 创建远端缺少的目录，父目录在前
//! 3. 上传 / 跳过，按路径排序
//! 4. 删除远端多余条目，按路径排序

use crate::core::model::{FileEntry, RelPath, TreeInventory};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SkipReason {
    Unchanged,
    Hidden,
    Unreadable,
}

/// 同步动作
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncAction {
    MakeDirectory {
        path: RelPath,
    },
    Upload {
        path: RelPath,
        local_size: u64,
        /// 本地修改时间，上传后写到设备上
        modified_time: i64,
    },
    /// 删除远端多余条目（递归）
    Delete {
        path: RelPath,
    },
    Skip {
        path: RelPath,
        reason: SkipReason,
    },
}

impl SyncAction {
    pub fn path(&self) -> &RelPath {
        match self {
            SyncAction::MakeDirectory { path }
            | SyncAction::Upload { path, .. }
            | SyncAction::Delete { path }
            | SyncAction::Skip { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// 隐藏的本地条目是否生成 Skip(hidden)
    pub count_hidden_as_skipped: bool,
}

/// 有序且不可变的动作序列
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncPlan {
    actions: Vec<SyncAction>,
}

impl SyncPlan {
    pub fn actions(&self) -> &[SyncAction] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SyncAction> {
        self.actions.iter()
    }

    pub fn summary(&self) -> ActionSummary {
        ActionSummary::of(&self.actions)
    }
}

impl<'a> IntoIterator for &'a SyncPlan {
    type Item = &'a SyncAction;
    type IntoIter = std::slice::Iter<'a, SyncAction>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.iter()
    }
}

pub fn plan(local: &TreeInventory, remote: &TreeInventory) -> SyncPlan {
    plan_with(local, remote, &PlanOptions::default())
}

pub fn plan_with(local: &TreeInventory, remote: &TreeInventory, options: &PlanOptions) -> SyncPlan {
    // 1. 类型冲突
    let conflicts: Vec<RelPath> = local
        .entries
        .values()
        .filter(|l| {
            remote.special.contains(&l.relative_path)
                || remote
                    .get(&l.relative_path)
                    .is_some_and(|r| r.kind != l.kind)
        })
        .map(|l| l.relative_path.clone())
        .collect();

    // 冲突路径删除后，其下的远端条目也一并消失
    let effective: BTreeMap<&RelPath, &FileEntry> = remote
        .entries
        .iter()
        .filter(|(path, _)| !conflicts.iter().any(|c| path.starts_with(c)))
        .collect();

    let mut actions: Vec<SyncAction> = conflicts
        .iter()
        .map(|path| {
            debug!("类型冲突，先删除远端: {}", path);
            SyncAction::Delete { path: path.clone() }
        })
        .collect();

    // 2. 目录
    let mut dirs = BTreeSet::new();
    if !remote.root_exists {
        dirs.insert(RelPath::root());
    }
    for entry in local.entries.values() {
        for ancestor in entry.relative_path.ancestors() {
            if !effective.contains_key(&ancestor) {
                dirs.insert(ancestor);
            }
        }
        if entry.is_dir() && !effective.contains_key(&entry.relative_path) {
            dirs.insert(entry.relative_path.clone());
        }
    }
    actions.extend(dirs.into_iter().map(|path| SyncAction::MakeDirectory { path }));

    // 3. 文件
    let mut transfers: Vec<SyncAction> = local
        .entries
        .values()
        .filter(|e| !e.is_dir())
        .map(|l| {
            let changed = match effective.get(&l.relative_path) {
                None => true,
                Some(r) => r.size != l.size || r.modified_time < l.modified_time,
            };
            if changed {
                SyncAction::Upload {
                    path: l.relative_path.clone(),
                    local_size: l.size,
                    modified_time: l.modified_time,
                }
            } else {
                SyncAction::Skip {
                    path: l.relative_path.clone(),
                    reason: SkipReason::Unchanged,
                }
            }
        })
        .collect();

    transfers.extend(local.unreadable.iter().map(|s| SyncAction::Skip {
        path: s.relative_path.clone(),
        reason: SkipReason::Unreadable,
    }));
    if options.count_hidden_as_skipped {
        transfers.extend(local.hidden.iter().map(|path| SyncAction::Skip {
            path: path.clone(),
            reason: SkipReason::Hidden,
        }));
    }
    transfers.sort_by(|a, b| a.path().cmp(b.path()));
    actions.extend(transfers);

    // 4. 删除；读不到的本地条目下面的内容不能判定为多余
    let deletes = effective
        .keys()
        .filter(|path| !local.contains(path))
        .filter(|path| {
            let guarded = local
                .unreadable
                .iter()
                .any(|s| path.starts_with(&s.relative_path));
            if guarded {
                debug!("本地条目无法读取，保留远端: {}", path);
            }
            !guarded
        })
        .map(|path| SyncAction::Delete {
            path: (*path).clone(),
        });
    actions.extend(deletes);

    SyncPlan { actions }
}

/// 动作统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActionSummary {
    pub mkdir_count: usize,
    pub upload_count: usize,
    pub upload_bytes: u64,
    pub delete_count: usize,
    pub skip_count: usize,
}

impl ActionSummary {
    pub fn of(actions: &[SyncAction]) -> Self {
        let mut summary = Self::default();
        for action in actions {
            match action {
                SyncAction::MakeDirectory { .. } => summary.mkdir_count += 1,
                SyncAction::Upload { local_size, .. } => {
                    summary.upload_count += 1;
                    summary.upload_bytes += local_size;
                }
                SyncAction::Delete { .. } => summary.delete_count += 1,
                SyncAction::Skip { .. } => summary.skip_count += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.mkdir_count + self.upload_count + self.delete_count + self.skip_count
    }
}
