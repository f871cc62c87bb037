use crate::core::planner::{SyncAction, SyncPlan};
use crate::core::progress::ProgressReporter;
use crate::device::DeviceSession;
use crate::error::SyncError;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// 单个动作的执行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// 已在设备上执行（Skip 也算）
    Applied,
    /// dry-run，仅统计
    Simulated,
    /// 上传时本地文件已无法打开，计为跳过
    LocalUnreadable(String),
}

#[derive(Debug, Clone)]
pub struct ActionRecord {
    pub action: SyncAction,
    pub outcome: Outcome,
    /// 计划中的本地大小；实际写入量不同只记警告
    pub bytes: u64,
}

/// 按顺序执行计划
///
/// 任何设备错误立即终止整次运行，不重试。取消只在动作之间检查。
pub struct TransferExecutor<'a> {
    session: &'a dyn DeviceSession,
    local_root: &'a Path,
    remote_root: &'a str,
    dry_run: bool,
    cancel_flag: Arc<AtomicBool>,
}

impl<'a> TransferExecutor<'a> {
    pub fn new(
        session: &'a dyn DeviceSession,
        local_root: &'a Path,
        remote_root: &'a str,
        dry_run: bool,
        cancel_flag: Arc<AtomicBool>,
    ) -> Self {
        Self {
            session,
            local_root,
            remote_root,
            dry_run,
            cancel_flag,
        }
    }

    pub async fn execute(
        &self,
        plan: &SyncPlan,
        progress: &mut ProgressReporter,
    ) -> Result<Vec<ActionRecord>, SyncError> {
        let mut records = Vec::with_capacity(plan.len());

        for action in plan {
            if self.cancel_flag.load(Ordering::SeqCst) {
                debug!("在第 {} 个动作前取消", records.len());
                return Err(SyncError::Cancelled);
            }

            let record = self.apply(action).await?;
            records.push(record);
            progress.advance(action.path());
        }

        Ok(records)
    }

    async fn apply(&self, action: &SyncAction) -> Result<ActionRecord, SyncError> {
        let simulated = if self.dry_run {
            Outcome::Simulated
        } else {
            Outcome::Applied
        };
        let record = |outcome, bytes| ActionRecord {
            action: action.clone(),
            outcome,
            bytes,
        };

        match action {
            SyncAction::MakeDirectory { path } => {
                let remote = path.to_remote(self.remote_root);
                debug!("创建目录: {}", remote);
                if !self.dry_run {
                    self.session.mkdir(&remote).await?;
                }
                Ok(record(simulated, 0))
            }
            SyncAction::Upload {
                path,
                local_size,
                modified_time,
            } => {
                let remote = path.to_remote(self.remote_root);
                if self.dry_run {
                    debug!("[dry-run] 上传: {} ({} 字节)", path, local_size);
                    return Ok(record(simulated, *local_size));
                }

                let local = path.to_local(self.local_root);
                let file = match std::fs::File::open(&local) {
                    Ok(f) => f,
                    Err(e) => {
                        warn!("无法打开本地文件，跳过 {}: {}", local.display(), e);
                        return Ok(record(Outcome::LocalUnreadable(e.to_string()), 0));
                    }
                };

                debug!("上传: {} -> {} ({} 字节)", path, remote, local_size);
                let written = self.session.push(file, &remote, *modified_time).await?;
                if written != *local_size {
                    warn!(
                        "{} 在扫描后发生变化: 计划 {} 字节, 实际 {} 字节",
                        path, local_size, written
                    );
                }
                Ok(record(simulated, *local_size))
            }
            SyncAction::Delete { path } => {
                let remote = path.to_remote(self.remote_root);
                debug!("删除: {}", remote);
                if !self.dry_run {
                    self.session.delete(&remote).await?;
                }
                Ok(record(simulated, 0))
            }
            SyncAction::Skip { path, reason } => {
                debug!("跳过 {}: {:?}", path, reason);
                Ok(record(simulated, 0))
            }
        }
    }
}
