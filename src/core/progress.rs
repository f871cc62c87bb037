use crate::core::model::RelPath;
use serde::Serialize;
use tokio::sync::mpsc;

/// 同步进度
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub processed_files: u64,
    /// 计划中的动作总数，同一次运行内不变
    pub total_files: u64,
    pub current_file: Option<String>,
    pub dry_run: bool,
}

pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressEvent>;

pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// 按动作推进的进度发送器，接收端关闭后静默丢弃
pub struct ProgressReporter {
    sender: Option<ProgressSender>,
    processed: u64,
    total: u64,
    dry_run: bool,
}

impl ProgressReporter {
    pub fn new(sender: Option<ProgressSender>, total: u64, dry_run: bool) -> Self {
        Self {
            sender,
            processed: 0,
            total,
            dry_run,
        }
    }

    /// 计划确定后的第一条事件
    pub fn start(&self) {
        self.emit(None);
    }

    pub fn advance(&mut self, path: &RelPath) {
        self.processed = (self.processed + 1).min(self.total);
        self.emit(Some(path.to_string()));
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    fn emit(&self, current_file: Option<String>) {
        if let Some(tx) = &self.sender {
            let _ = tx.send(ProgressEvent {
                processed_files: self.processed,
                total_files: self.total,
                current_file,
                dry_run: self.dry_run,
            });
        }
    }
}
