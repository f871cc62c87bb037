use crate::core::executor::{ActionRecord, Outcome};
use crate::core::planner::SyncAction;
use crate::device::DeviceIdentity;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// 一次同步的最终报告
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub device: DeviceIdentity,
    pub files_synced: u64,
    pub files_deleted: u64,
    pub directories_created: u64,
    pub skipped_entries: u64,
    pub bytes_uploaded: u64,
    pub remote_path: String,
    pub local_root: PathBuf,
    pub dry_run: bool,
}

impl SyncSummary {
    /// 汇总执行记录，dry-run 与真实执行按同样规则计数
    pub fn aggregate(
        device: DeviceIdentity,
        local_root: &Path,
        remote_path: &str,
        dry_run: bool,
        records: &[ActionRecord],
    ) -> Self {
        let mut summary = Self {
            device,
            files_synced: 0,
            files_deleted: 0,
            directories_created: 0,
            skipped_entries: 0,
            bytes_uploaded: 0,
            remote_path: remote_path.to_string(),
            local_root: local_root.to_path_buf(),
            dry_run,
        };

        for record in records {
            match (&record.action, &record.outcome) {
                (SyncAction::Upload { .. }, Outcome::LocalUnreadable(_)) => {
                    summary.skipped_entries += 1;
                }
                (SyncAction::Upload { .. }, _) => {
                    summary.files_synced += 1;
                    summary.bytes_uploaded += record.bytes;
                }
                (SyncAction::MakeDirectory { .. }, _) => summary.directories_created += 1,
                (SyncAction::Delete { .. }, _) => summary.files_deleted += 1,
                (SyncAction::Skip { .. }, _) => summary.skipped_entries += 1,
            }
        }

        summary
    }

    /// 是否有任何改动（或 dry-run 下将要发生的改动）
    pub fn has_changes(&self) -> bool {
        self.files_synced + self.files_deleted + self.directories_created > 0
    }
}
