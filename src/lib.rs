pub mod config;
pub mod core;
pub mod device;
pub mod error;
pub mod logging;

pub use config::SyncSettings;
pub use self::core::{ProgressEvent, ProgressSender, SyncEngine, SyncSummary};
pub use device::{DeviceIdentity, DeviceSession};
pub use error::{DeviceError, ScanError, SyncError};

/// 用默认配置和 USB 设备执行一次同步
pub async fn sync_folders(
    local_path: &str,
    device_path: &str,
    dry_run: bool,
) -> error::Result<SyncSummary> {
    sync_folders_with_progress(local_path, device_path, dry_run, None).await
}

/// 同 `sync_folders`，额外把进度发送到 `progress`
pub async fn sync_folders_with_progress(
    local_path: &str,
    device_path: &str,
    dry_run: bool,
    progress: Option<ProgressSender>,
) -> error::Result<SyncSummary> {
    let settings = SyncSettings::load(&config::app_config_dir());
    SyncEngine::new(settings)
        .run(local_path, device_path, dry_run, progress)
        .await
}

pub mod dirs {
    use std::path::PathBuf;

    pub fn config_dir() -> Option<PathBuf> {
        if cfg!(target_os = "windows") {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        } else if cfg!(target_os = "macos") {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library").join("Application Support"))
        } else {
            std::env::var_os("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .filter(|p| p.is_absolute())
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".config"))
                })
        }
    }
}
