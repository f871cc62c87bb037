pub mod adb;
pub mod memory;
pub mod shell;

use crate::config::SyncSettings;
use crate::error::DeviceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs::File;

pub use adb::{AdbConnector, AdbSession};
pub use memory::{DeviceOp, MemoryConnector, MemoryDevice, MemoryNode};

// ============ 公共常量 ============

/// 非 IO 操作超时（秒）- list, mkdir, delete, 连接
pub const OP_TIMEOUT_SECS: u64 = 60;
/// IO 操作超时（秒）- push
pub const IO_TIMEOUT_SECS: u64 = 300;

/// 设备身份，会话建立时读取一次
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

impl DeviceIdentity {
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
            manufacturer: None,
            product: None,
        }
    }

    /// 用于日志的简短描述
    pub fn label(&self) -> String {
        let name = match (&self.manufacturer, &self.product) {
            (Some(m), Some(p)) => format!("{} {}", m, p),
            (Some(m), None) => m.clone(),
            (None, Some(p)) => p.clone(),
            (None, None) => "Android".to_string(),
        };
        format!("{} [{:04x}:{:04x}]", name, self.vendor_id, self.product_id)
    }

    fn matches(&self, vendor_id: Option<u16>, product_id: Option<u16>) -> bool {
        vendor_id.map_or(true, |v| v == self.vendor_id)
            && product_id.map_or(true, |p| p == self.product_id)
    }
}

/// 设备上条目的类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteKind {
    File,
    Directory,
    /// 符号链接、设备节点等，不参与同步
    Other,
}

/// `list` 返回的单个条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub kind: RemoteKind,
    pub size: u64,
    /// Unix 秒
    pub modified_time: i64,
}

/// 与单台设备的已授权会话
///
/// 会话只属于一次同步调用，Drop 时关闭底层连接。所有路径都是设备上的绝对路径。
#[async_trait]
pub trait DeviceSession: Send + Sync {
    fn identity(&self) -> &DeviceIdentity;

    /// 列出目录的直接子项（按名称排序）；目录不存在时返回 `None`
    async fn list(&self, path: &str) -> Result<Option<Vec<RemoteEntry>>, DeviceError>;

    /// 创建目录（含父目录），已存在时视为成功
    async fn mkdir(&self, path: &str) -> Result<(), DeviceError>;

    /// 上传本地文件，返回写入的字节数
    async fn push(
        &self,
        local: File,
        remote_path: &str,
        modified_time: i64,
    ) -> Result<u64, DeviceError>;

    /// 递归删除文件或目录，路径不存在时视为成功
    async fn delete(&self, path: &str) -> Result<(), DeviceError>;
}

/// 建立设备会话
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    async fn connect(&self, settings: &SyncSettings) -> Result<Box<dyn DeviceSession>, DeviceError>;
}

/// 从检测到的设备中选出唯一一台
pub fn select_device(
    candidates: Vec<DeviceIdentity>,
    vendor_id: Option<u16>,
    product_id: Option<u16>,
) -> Result<DeviceIdentity, DeviceError> {
    let mut matches: Vec<_> = candidates
        .into_iter()
        .filter(|c| c.matches(vendor_id, product_id))
        .collect();

    match matches.len() {
        0 => Err(DeviceError::NotFound),
        1 => Ok(matches.remove(0)),
        _ => Err(DeviceError::Ambiguous {
            candidates: matches,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel() -> DeviceIdentity {
        DeviceIdentity::new(0x18d1, 0x4ee7)
    }

    fn galaxy() -> DeviceIdentity {
        DeviceIdentity::new(0x04e8, 0x6860)
    }

    #[test]
    fn test_select_single_device() {
        let selected = select_device(vec![pixel()], None, None).unwrap();
        assert_eq!(selected, pixel());
    }

    #[test]
    fn test_select_no_device() {
        assert!(matches!(
            select_device(vec![], None, None),
            Err(DeviceError::NotFound)
        ));
    }

    #[test]
    fn test_select_two_devices_without_filter_is_ambiguous() {
        match select_device(vec![pixel(), galaxy()], None, None) {
            Err(DeviceError::Ambiguous { candidates }) => assert_eq!(candidates.len(), 2),
            other => panic!("expected Ambiguous, got {:?}", other),
        }
    }

    #[test]
    fn test_select_with_vendor_filter() {
        let selected = select_device(vec![pixel(), galaxy()], Some(0x04e8), None).unwrap();
        assert_eq!(selected, galaxy());
    }

    #[test]
    fn test_filter_matching_nothing() {
        assert!(matches!(
            select_device(vec![pixel()], Some(0x1234), Some(0x0001)),
            Err(DeviceError::NotFound)
        ));
    }

    #[test]
    fn test_label() {
        let mut id = pixel();
        assert_eq!(id.label(), "Android [18d1:4ee7]");
        id.manufacturer = Some("Google".into());
        id.product = Some("Pixel 7".into());
        assert_eq!(id.label(), "Google Pixel 7 [18d1:4ee7]");
    }
}
