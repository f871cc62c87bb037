use super::shell::{self, ShellFailure};
use super::{select_device, DeviceConnector, DeviceIdentity, DeviceSession, RemoteEntry};
use crate::config::SyncSettings;
use crate::error::DeviceError;
use adb_client::{is_adb_device, ADBDeviceExt, ADBUSBDevice, RustADBError};
use async_trait::async_trait;
use rusb::{Device, DeviceDescriptor, UsbContext};
use std::fs::File;
use std::io::{self, Read};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// 推送超时按文件大小放宽时假定的最低吞吐（USB 2.0 慢速线缆）
const MIN_PUSH_BYTES_PER_SEC: u64 = 1024 * 1024;

/// 通过 USB 连接的 ADB 会话
pub struct AdbSession {
    identity: DeviceIdentity,
    device: Arc<Mutex<ADBUSBDevice>>,
    op_timeout: Duration,
    io_timeout: Duration,
}

impl AdbSession {
    /// 在阻塞线程上执行一次设备调用，超时视为连接中断
    async fn blocking<T, F>(&self, timeout: Duration, what: &str, f: F) -> Result<T, DeviceError>
    where
        T: Send + 'static,
        F: FnOnce(&mut ADBUSBDevice) -> Result<T, DeviceError> + Send + 'static,
    {
        let device = self.device.clone();
        let task = tokio::task::spawn_blocking(move || {
            let mut guard = device
                .lock()
                .map_err(|_| DeviceError::transport("设备句柄在上一次调用中损坏"))?;
            f(&mut guard)
        });

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(DeviceError::transport(format!("{} 任务失败: {}", what, e))),
            Err(_) => Err(DeviceError::transport(format!(
                "{} 超时 ({}s)",
                what,
                timeout.as_secs()
            ))),
        }
    }

    async fn run_shell(&self, path: &str, command: String) -> Result<String, DeviceError> {
        debug!("adb shell: {}", command);
        let path = path.to_string();
        self.blocking(self.op_timeout, "shell", move |device| {
            let mut output = Vec::new();
            device
                .shell_command(&[command.as_str()], &mut output)
                .map_err(|e| classify(e, &path))?;
            Ok(String::from_utf8_lossy(&output).into_owned())
        })
        .await
    }

    /// 执行带状态标记的命令，非零状态转为 RemoteIo
    async fn run_checked(&self, path: &str, command: String) -> Result<(), DeviceError> {
        let output = self.run_shell(path, command).await?;
        shell::parse_status(&output).map_err(|e| shell_error(path, e))
    }
}

#[async_trait]
impl DeviceSession for AdbSession {
    fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    async fn list(&self, path: &str) -> Result<Option<Vec<RemoteEntry>>, DeviceError> {
        let output = self.run_shell(path, shell::list_command(path)).await?;
        shell::parse_listing(&output).map_err(|e| shell_error(path, e))
    }

    async fn mkdir(&self, path: &str) -> Result<(), DeviceError> {
        self.run_checked(path, shell::mkdir_command(path)).await
    }

    async fn push(
        &self,
        local: File,
        remote_path: &str,
        modified_time: i64,
    ) -> Result<u64, DeviceError> {
        let size = local.metadata().map(|m| m.len()).unwrap_or(0);
        let timeout = push_timeout(self.io_timeout, size);
        let remote = remote_path.to_string();
        let written = self
            .blocking(timeout, "push", move |device| {
                let mut reader = CountingReader::new(local);
                device
                    .push(&mut reader, &remote)
                    .map_err(|e| classify(e, &remote))?;
                Ok(reader.count())
            })
            .await?;

        // adb push 不携带 mtime，补一次 touch；失败只影响下次比较
        match self
            .run_checked(remote_path, shell::touch_command(remote_path, modified_time))
            .await
        {
            Ok(()) => {}
            Err(e @ DeviceError::TransportLost { .. }) => return Err(e),
            Err(e) => warn!("无法保留修改时间 {}: {}", remote_path, e),
        }

        Ok(written)
    }

    async fn delete(&self, path: &str) -> Result<(), DeviceError> {
        self.run_checked(path, shell::delete_command(path)).await
    }
}

impl Drop for AdbSession {
    fn drop(&mut self) {
        debug!("关闭设备会话: {}", self.identity.label());
    }
}

/// 通过 rusb 枚举 USB 设备并建立 ADB 会话
#[derive(Debug, Default, Clone, Copy)]
pub struct AdbConnector;

#[async_trait]
impl DeviceConnector for AdbConnector {
    async fn connect(&self, settings: &SyncSettings) -> Result<Box<dyn DeviceSession>, DeviceError> {
        let vendor_id = settings.vendor_id;
        let product_id = settings.product_id;
        let op_timeout = Duration::from_secs(settings.op_timeout_secs.max(1));
        let io_timeout = Duration::from_secs(settings.io_timeout_secs.max(1));

        let task = tokio::task::spawn_blocking(move || {
            let candidates = enumerate_adb_devices()?;
            debug!("检测到 {} 台 ADB 设备", candidates.len());
            let identity = select_device(candidates, vendor_id, product_id)?;
            let device = ADBUSBDevice::new(identity.vendor_id, identity.product_id)
                .map_err(classify_connect)?;
            Ok::<_, DeviceError>((identity, device))
        });

        let (identity, device) = match tokio::time::timeout(op_timeout, task).await {
            Ok(Ok(result)) => result?,
            Ok(Err(e)) => return Err(DeviceError::transport(format!("连接任务失败: {}", e))),
            Err(_) => {
                // 握手卡住通常是手机上的授权弹窗还没确认
                return Err(DeviceError::Unauthorized {
                    message: format!("{}s 内未完成握手，请在手机上允许 USB 调试", op_timeout.as_secs()),
                });
            }
        };

        info!("已连接设备: {}", identity.label());

        Ok(Box::new(AdbSession {
            identity,
            device: Arc::new(Mutex::new(device)),
            op_timeout,
            io_timeout,
        }))
    }
}

fn enumerate_adb_devices() -> Result<Vec<DeviceIdentity>, DeviceError> {
    let devices = rusb::devices()
        .map_err(|e| DeviceError::transport(format!("无法枚举 USB 设备: {}", e)))?;

    let mut found = Vec::new();
    for device in devices.iter() {
        let Ok(descriptor) = device.device_descriptor() else {
            continue;
        };
        if !is_adb_device(&device, &descriptor) {
            continue;
        }
        found.push(read_identity(&device, &descriptor));
    }
    Ok(found)
}

fn read_identity<T: UsbContext>(device: &Device<T>, descriptor: &DeviceDescriptor) -> DeviceIdentity {
    let (manufacturer, product) = device
        .open()
        .ok()
        .map(|handle| {
            let manufacturer = handle.read_manufacturer_string_ascii(descriptor).ok();
            let product = handle.read_product_string_ascii(descriptor).ok();
            (manufacturer, product)
        })
        .unwrap_or((None, None));

    DeviceIdentity {
        vendor_id: descriptor.vendor_id(),
        product_id: descriptor.product_id(),
        manufacturer,
        product,
    }
}

/// 推送超时：至少 `base`，大文件按最低吞吐估算的时间再放宽
fn push_timeout(base: Duration, size: u64) -> Duration {
    base.max(Duration::from_secs(size / MIN_PUSH_BYTES_PER_SEC))
}

/// 会话调用中的 ADB 错误：请求被设备拒绝是文件系统错误，其余都当作连接问题
fn classify(err: RustADBError, path: &str) -> DeviceError {
    match err {
        RustADBError::ADBRequestFailed(message) => DeviceError::remote_io(path, message),
        RustADBError::IOError(e) => DeviceError::transport(e.to_string()),
        other => DeviceError::transport(other.to_string()),
    }
}

fn classify_connect(err: RustADBError) -> DeviceError {
    let message = err.to_string();
    let lower = message.to_ascii_lowercase();
    if lower.contains("auth") || lower.contains("unauthorized") {
        DeviceError::Unauthorized { message }
    } else {
        DeviceError::TransportLost { message }
    }
}

fn shell_error(path: &str, failure: ShellFailure) -> DeviceError {
    match failure {
        ShellFailure::Failed(message) => DeviceError::remote_io(path, message),
        ShellFailure::Truncated => DeviceError::transport(format!("{} 的命令输出不完整", path)),
    }
}

/// 统计读出字节数的 Reader
struct CountingReader<R> {
    inner: R,
    count: u64,
}

impl<R: Read> CountingReader<R> {
    fn new(inner: R) -> Self {
        Self { inner, count: 0 }
    }

    fn count(&self) -> u64 {
        self.count
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}
