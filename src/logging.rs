//! 日志模块 - 提供文件日志和大小管理功能

use crate::config::{read_config, write_section};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing_subscriber::fmt::MakeWriter;

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    /// 是否启用日志记录
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 最大日志文件大小（MB）
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u32,
    /// 日志级别: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_enabled() -> bool {
    true
}

fn default_max_size_mb() -> u32 {
    5 // 默认 5MB
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_size_mb: default_max_size_mb(),
            level: default_level(),
        }
    }
}

impl LogConfig {
    /// 从配置文件加载日志配置
    pub fn load(config_dir: &Path) -> Self {
        read_config(config_dir)
            .and_then(|config| config.get("log").cloned())
            .and_then(|log| serde_json::from_value::<LogConfig>(log).ok())
            .unwrap_or_default()
    }

    /// 保存日志配置
    pub fn save(&self, config_dir: &Path) -> anyhow::Result<()> {
        write_section(config_dir, "log", serde_json::to_value(self)?)
    }

    /// 将配置的日志级别转换为 tracing Level
    pub fn tracing_level(&self) -> tracing::Level {
        match self.level.to_lowercase().as_str() {
            "error" => tracing::Level::ERROR,
            "warn" => tracing::Level::WARN,
            "debug" => tracing::Level::DEBUG,
            "trace" => tracing::Level::TRACE,
            _ => tracing::Level::INFO,
        }
    }
}

type WriterSlot = Arc<Mutex<Option<BufWriter<File>>>>;

fn lock_slot(slot: &WriterSlot) -> MutexGuard<'_, Option<BufWriter<File>>> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

/// 超过上限时把 app.log 改名为 app.log.old（只保留一份备份）
fn rotate_if_oversized(file_path: &Path, max_size: u64) -> io::Result<bool> {
    let oversized = fs::metadata(file_path)
        .map(|m| m.len() > max_size)
        .unwrap_or(false);
    if !oversized {
        return Ok(false);
    }

    let backup_path = file_path.with_extension("log.old");
    if backup_path.exists() {
        fs::remove_file(&backup_path)?;
    }
    fs::rename(file_path, &backup_path)?;
    Ok(true)
}

fn open_append(file_path: &Path) -> io::Result<BufWriter<File>> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(file_path)?;
    Ok(BufWriter::new(file))
}

/// 带大小限制的日志写入器，clone 后共享同一个文件句柄
#[derive(Clone)]
pub struct SizeRotatingWriter {
    file_path: PathBuf,
    max_size: u64,
    writer: WriterSlot,
}

impl SizeRotatingWriter {
    pub fn new(log_dir: &Path, max_size_mb: u32) -> io::Result<Self> {
        fs::create_dir_all(log_dir)?;

        let file_path = log_dir.join("app.log");
        let max_size = u64::from(max_size_mb) * 1024 * 1024;
        rotate_if_oversized(&file_path, max_size)?;
        let writer = open_append(&file_path)?;

        Ok(Self {
            file_path,
            max_size,
            writer: Arc::new(Mutex::new(Some(writer))),
        })
    }

    /// 持锁完成轮转，避免其他线程写进已改名的文件
    fn rotate(slot: &WriterSlot, file_path: &Path, max_size: u64) -> io::Result<()> {
        let mut guard = lock_slot(slot);
        if let Some(mut w) = guard.take() {
            let _ = w.flush();
        }
        let rotated = rotate_if_oversized(file_path, max_size);
        *guard = Some(open_append(file_path)?);
        rotated.map(|_| ())
    }
}

/// 单次写入使用的句柄
pub struct LogWriter {
    inner: WriterSlot,
    file_path: PathBuf,
    max_size: u64,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = {
            let mut guard = lock_slot(&self.inner);
            let writer = guard
                .as_mut()
                .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "日志文件不可用"))?;
            let n = writer.write(buf)?;
            writer.flush()?;
            n
        };

        let oversized = fs::metadata(&self.file_path)
            .map(|m| m.len() > self.max_size)
            .unwrap_or(false);
        if oversized {
            let _ = SizeRotatingWriter::rotate(&self.inner, &self.file_path, self.max_size);
        }

        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        match lock_slot(&self.inner).as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for SizeRotatingWriter {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter {
            inner: self.writer.clone(),
            file_path: self.file_path.clone(),
            max_size: self.max_size,
        }
    }
}

/// 日志目录，与 config.json 同目录
pub fn get_log_dir() -> PathBuf {
    crate::config::app_config_dir()
}
