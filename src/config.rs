//! 应用配置模块

use crate::device::{IO_TIMEOUT_SECS, OP_TIMEOUT_SECS};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 同步配置，对应 config.json 中的 "sync" 段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    /// 指定设备的 USB vendor id，多台设备时用于消除歧义
    #[serde(default)]
    pub vendor_id: Option<u16>,
    #[serde(default)]
    pub product_id: Option<u16>,
    /// list / mkdir / delete / 连接的超时（秒）
    #[serde(default = "default_op_timeout")]
    pub op_timeout_secs: u64,
    /// push 的超时下限（秒）；大文件按 1 MiB/s 估算的时间更长时以估算为准
    #[serde(default = "default_io_timeout")]
    pub io_timeout_secs: u64,
    /// 隐藏文件是否计入 skipped_entries
    #[serde(default)]
    pub count_hidden_as_skipped: bool,
}

fn default_op_timeout() -> u64 {
    OP_TIMEOUT_SECS
}

fn default_io_timeout() -> u64 {
    IO_TIMEOUT_SECS
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            vendor_id: None,
            product_id: None,
            op_timeout_secs: default_op_timeout(),
            io_timeout_secs: default_io_timeout(),
            count_hidden_as_skipped: false,
        }
    }
}

impl SyncSettings {
    /// 从配置文件加载，文件缺失或格式错误时使用默认值
    pub fn load(config_dir: &Path) -> Self {
        read_config(config_dir)
            .and_then(|config| config.get("sync").cloned())
            .and_then(|sync| serde_json::from_value::<SyncSettings>(sync).ok())
            .unwrap_or_default()
    }

    /// 保存到 "sync" 段，保留文件中的其他段
    pub fn save(&self, config_dir: &Path) -> anyhow::Result<()> {
        write_section(config_dir, "sync", serde_json::to_value(self)?)
    }
}

/// 默认配置目录：`<用户配置目录>/droidmirror`
pub fn app_config_dir() -> PathBuf {
    crate::dirs::config_dir()
        .map(|p| p.join("droidmirror"))
        .unwrap_or_else(|| PathBuf::from(".droidmirror"))
}

pub(crate) fn read_config(config_dir: &Path) -> Option<serde_json::Value> {
    let content = fs::read_to_string(config_dir.join("config.json")).ok()?;
    serde_json::from_str(&content).ok()
}

/// 更新 config.json 中的一个段
pub(crate) fn write_section(
    config_dir: &Path,
    section: &str,
    value: serde_json::Value,
) -> anyhow::Result<()> {
    fs::create_dir_all(config_dir)?;
    let config_file = config_dir.join("config.json");

    // 读取现有配置
    let mut config = read_config(config_dir)
        .filter(|c| c.is_object())
        .unwrap_or_else(|| serde_json::json!({}));

    config[section] = value;

    fs::write(&config_file, serde_json::to_string_pretty(&config)?)?;
    Ok(())
}
