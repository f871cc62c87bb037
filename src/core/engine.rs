use crate::config::SyncSettings;
use crate::core::executor::TransferExecutor;
use crate::core::inspector::RemoteInspector;
use crate::core::planner::{plan_with, PlanOptions};
use crate::core::progress::{ProgressReporter, ProgressSender};
use crate::core::scanner::{resolve_local_root, LocalScanner};
use crate::core::summary::SyncSummary;
use crate::device::{AdbConnector, DeviceConnector};
use crate::error::{Result, SyncError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

/// 同步引擎
///
/// 每次 `run` 独占一个设备会话；取消标志在引擎内共享，设置后对之后的运行也生效。
pub struct SyncEngine {
    settings: SyncSettings,
    connector: Box<dyn DeviceConnector>,
    cancelled: Arc<AtomicBool>,
}

impl SyncEngine {
    pub fn new(settings: SyncSettings) -> Self {
        Self {
            settings,
            connector: Box::new(AdbConnector),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_connector(mut self, connector: Box<dyn DeviceConnector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// 供其他任务（例如 Ctrl-C 处理）设置取消
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    /// 取消同步
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(SyncError::Cancelled);
        }
        Ok(())
    }

    /// 把本地目录镜像到设备目录
    pub async fn run(
        &self,
        local_path: &str,
        device_path: &str,
        dry_run: bool,
        progress: Option<ProgressSender>,
    ) -> Result<SyncSummary> {
        let run_id = Uuid::new_v4();
        let span = info_span!("sync_run", %run_id, dry_run);

        async {
            let start = Instant::now();
            let result = self.run_inner(local_path, device_path, dry_run, progress).await;
            match &result {
                Ok(summary) => info!(
                    "同步完成: 上传 {} 个文件 ({} 字节), 删除 {}, 新建目录 {}, 跳过 {}, 耗时 {:.1}s",
                    summary.files_synced,
                    summary.bytes_uploaded,
                    summary.files_deleted,
                    summary.directories_created,
                    summary.skipped_entries,
                    start.elapsed().as_secs_f64()
                ),
                Err(SyncError::Cancelled) => info!("同步已取消"),
                Err(e) => error!("同步失败: {}", e),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_inner(
        &self,
        local_path: &str,
        device_path: &str,
        dry_run: bool,
        progress: Option<ProgressSender>,
    ) -> Result<SyncSummary> {
        let local_root = resolve_local_root(local_path)?;
        let remote_root = normalize_remote_root(device_path)?;
        info!(
            "开始同步: {} -> {}{}",
            local_root.display(),
            remote_root,
            if dry_run { " (dry-run)" } else { "" }
        );

        self.check_cancelled()?;

        // 会话在本函数返回时释放，无论成功、失败还是取消
        let session = self.connector.connect(&self.settings).await?;
        let device = session.identity().clone();
        info!("设备: {}", device.label());

        self.check_cancelled()?;

        let scanner = LocalScanner::new(local_root.clone(), self.cancelled.clone());
        let inspector = RemoteInspector::new(session.as_ref(), &remote_root, self.cancelled.clone());
        let (local, remote) = tokio::join!(scanner.scan(), inspector.inspect());
        let local = local?;
        let remote = remote?;

        self.check_cancelled()?;

        let options = PlanOptions {
            count_hidden_as_skipped: self.settings.count_hidden_as_skipped,
        };
        let plan = plan_with(&local, &remote, &options);
        let counts = plan.summary();
        info!(
            "同步计划: 新建目录 {}, 上传 {} ({} 字节), 删除 {}, 跳过 {}",
            counts.mkdir_count,
            counts.upload_count,
            counts.upload_bytes,
            counts.delete_count,
            counts.skip_count
        );

        let mut reporter = ProgressReporter::new(progress, plan.len() as u64, dry_run);
        reporter.start();

        let executor = TransferExecutor::new(
            session.as_ref(),
            &local_root,
            &remote_root,
            dry_run,
            self.cancelled.clone(),
        );
        let records = executor.execute(&plan, &mut reporter).await?;

        Ok(SyncSummary::aggregate(
            device,
            &local_root,
            &remote_root,
            dry_run,
            &records,
        ))
    }
}

/// 规范化设备路径：统一分隔符，去掉 `.` 和空段，处理 `..`，结果为绝对路径
pub fn normalize_remote_root(device_path: &str) -> Result<String> {
    let trimmed = device_path.trim();
    if trimmed.is_empty() {
        return Err(SyncError::InvalidRemotePath("路径为空".to_string()));
    }

    let unified = trimmed.replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        return Err(SyncError::InvalidRemotePath(format!(
            "不能同步到设备根目录: {}",
            device_path
        )));
    }
    Ok(format!("/{}", segments.join("/")))
}
