use clap::Parser;
use droidmirror_lib::config::{app_config_dir, SyncSettings};
use droidmirror_lib::core::{progress_channel, ProgressReceiver};
use droidmirror_lib::logging::{get_log_dir, LogConfig, SizeRotatingWriter};
use droidmirror_lib::{SyncEngine, SyncError, SyncSummary};
use std::process::ExitCode;
use tracing_subscriber::prelude::*;

/// 把本地目录镜像到 USB 连接的 Android 设备
#[derive(Parser, Debug)]
#[command(name = "droidmirror")]
#[command(version)]
#[command(about = "Mirror a local folder onto an Android device over ADB")]
struct Args {
    /// 本地目录
    #[arg(value_name = "LOCAL")]
    local: String,

    /// 设备上的目标目录，例如 /sdcard/Music
    #[arg(value_name = "DEVICE_PATH")]
    device_path: String,

    /// 只计算计划，不修改设备
    #[arg(long)]
    dry_run: bool,

    /// 指定设备的 USB vendor id（十六进制，如 18d1）
    #[arg(long, value_name = "HEX", value_parser = parse_hex_u16)]
    vendor_id: Option<u16>,

    /// 指定设备的 USB product id（十六进制）
    #[arg(long, value_name = "HEX", value_parser = parse_hex_u16)]
    product_id: Option<u16>,

    /// 把 --vendor-id/--product-id 写入配置文件
    #[arg(long)]
    remember: bool,

    /// 以 JSON 输出结果
    #[arg(long)]
    json: bool,
}

fn parse_hex_u16(value: &str) -> Result<u16, String> {
    let digits = value.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16).map_err(|e| format!("无效的十六进制 id '{}': {}", value, e))
}

/// 初始化日志系统
fn init_logging() {
    let log_dir = get_log_dir();
    let config = LogConfig::load(&log_dir);

    if !config.enabled {
        let _ = tracing::subscriber::set_global_default(tracing_subscriber::registry());
        return;
    }

    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(config.tracing_level().into())
        .from_env_lossy();

    // 控制台输出到 stderr，stdout 留给进度和结果
    let console_layer = cfg!(debug_assertions).then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
    });

    let file_layer = match SizeRotatingWriter::new(&log_dir, config.max_size_mb) {
        Ok(writer) => Some(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        ),
        Err(e) => {
            eprintln!("无法创建日志文件 {}: {}", log_dir.display(), e);
            None
        }
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer);
    let _ = tracing::subscriber::set_global_default(subscriber);
}

async fn print_progress(mut rx: ProgressReceiver, quiet: bool) {
    while let Some(event) = rx.recv().await {
        if quiet {
            continue;
        }
        let prefix = if event.dry_run { "[dry-run] " } else { "" };
        match event.current_file {
            Some(file) => println!(
                "{}[{}/{}] {}",
                prefix, event.processed_files, event.total_files, file
            ),
            None => println!("{}共 {} 个动作", prefix, event.total_files),
        }
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", size, UNITS[unit])
}

fn print_summary(summary: &SyncSummary) {
    let title = if summary.dry_run {
        "预览完成（未修改设备）"
    } else {
        "同步完成"
    };
    println!();
    println!("{}", title);
    println!("  设备:     {}", summary.device.label());
    println!("  本地目录: {}", summary.local_root.display());
    println!("  设备目录: {}", summary.remote_path);
    println!(
        "  上传文件: {} ({})",
        summary.files_synced,
        format_bytes(summary.bytes_uploaded)
    );
    println!("  新建目录: {}", summary.directories_created);
    println!("  删除条目: {}", summary.files_deleted);
    println!("  跳过条目: {}", summary.skipped_entries);
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging();

    let config_dir = app_config_dir();
    let mut settings = SyncSettings::load(&config_dir);
    if args.vendor_id.is_some() {
        settings.vendor_id = args.vendor_id;
    }
    if args.product_id.is_some() {
        settings.product_id = args.product_id;
    }
    if args.remember {
        if let Err(e) = settings.save(&config_dir) {
            eprintln!("无法保存配置: {:#}", e);
        }
    }

    let engine = SyncEngine::new(settings);

    let cancel = engine.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("正在取消，当前动作完成后停止...");
            cancel.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    });

    let (tx, rx) = progress_channel();
    let printer = tokio::spawn(print_progress(rx, args.json));

    let result = engine
        .run(&args.local, &args.device_path, args.dry_run, Some(tx))
        .await;
    // 发送端已随 run 结束释放，等打印任务收尾
    let _ = printer.await;

    match result {
        Ok(summary) => {
            if args.json {
                match serde_json::to_string_pretty(&summary) {
                    Ok(text) => println!("{}", text),
                    Err(e) => {
                        eprintln!("无法序列化结果: {}", e);
                        return ExitCode::from(2);
                    }
                }
            } else {
                print_summary(&summary);
            }
            ExitCode::SUCCESS
        }
        Err(SyncError::Cancelled) => {
            eprintln!("同步已取消");
            ExitCode::from(1)
        }
        Err(e) => {
            eprintln!("错误: {}", e);
            ExitCode::from(2)
        }
    }
}
