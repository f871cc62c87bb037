//! 错误类型
//!
//! 本地扫描、设备会话、整次同步三层错误。单个本地条目的问题（不可读、符号链接环）
//! 不在这里，它们会变成计划里的 `Skip`。

use crate::device::DeviceIdentity;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// 本地目录扫描错误
#[derive(Debug, Error)]
pub enum ScanError {
    /// 本地根目录不存在、为空或不是目录
    #[error("本地目录不存在或不是文件夹: {}", .path.display())]
    RootNotFound { path: PathBuf },

    /// 根目录存在，但无法打开或规范化
    #[error("无法访问本地目录 {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// 设备会话错误
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("未检测到 Android 设备，请确认已开启 USB 调试")]
    NotFound,

    #[error("检测到多台 Android 设备 ({}), 请在配置中指定 vendor_id/product_id", format_candidates(.candidates))]
    Ambiguous { candidates: Vec<DeviceIdentity> },

    #[error("设备未授权 USB 调试: {message}")]
    Unauthorized { message: String },

    #[error("设备连接中断: {message}")]
    TransportLost { message: String },

    #[error("设备文件操作失败 {path}: {message}")]
    RemoteIo { path: String, message: String },
}

fn format_candidates(candidates: &[DeviceIdentity]) -> String {
    candidates
        .iter()
        .map(|c| format!("{:04x}:{:04x}", c.vendor_id, c.product_id))
        .collect::<Vec<_>>()
        .join(", ")
}

impl DeviceError {
    pub fn transport(message: impl Into<String>) -> Self {
        DeviceError::TransportLost {
            message: message.into(),
        }
    }

    pub fn remote_io(path: impl Into<String>, message: impl Into<String>) -> Self {
        DeviceError::RemoteIo {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// `sync_folders` 返回的错误
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("无效的设备路径: {0}")]
    InvalidRemotePath(String),

    #[error("同步已取消")]
    Cancelled,

    /// 后台任务 panic 或被中止
    #[error("内部错误: {0}")]
    Internal(String),
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(err: tokio::task::JoinError) -> Self {
        SyncError::Internal(format!("后台任务失败: {}", err))
    }
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
