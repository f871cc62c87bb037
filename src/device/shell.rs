//! 设备 shell 命令的构造与输出解析
//!
//! ADB 的 shell 通道不返回退出码，所以每条命令末尾追加一个状态标记，
//! 解析时据此区分成功、失败和输出被截断（连接中断）。

use super::{RemoteEntry, RemoteKind};

const STATUS_MARKER: &str = "__DROIDMIRROR_RC=";
const MISSING_MARKER: &str = "__DROIDMIRROR_MISSING__";

/// 单引号转义，供 `sh` 使用
pub fn quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}

/// 追加退出码标记
pub fn with_status(command: &str) -> String {
    format!("{} 2>&1; echo {}$?", command, STATUS_MARKER)
}

pub fn mkdir_command(path: &str) -> String {
    with_status(&format!("mkdir -p {}", quote(path)))
}

pub fn delete_command(path: &str) -> String {
    with_status(&format!("rm -rf {}", quote(path)))
}

pub fn touch_command(path: &str, modified_time: i64) -> String {
    with_status(&format!("touch -m -d @{} {}", modified_time, quote(path)))
}

/// 列出目录的非隐藏子项，每行 `类型|大小|mtime|名称`
pub fn list_command(path: &str) -> String {
    let p = quote(path);
    format!(
        "if [ ! -e {p} ]; then echo {missing}; \
         elif [ ! -d {p} ]; then echo 'Not a directory'; echo {rc}20; \
         else cd {p} 2>&1 || {{ echo {rc}1; exit 0; }}; rc=0; \
         for f in *; do \
         if [ -e \"$f\" ] || [ -L \"$f\" ]; then stat -c '%F|%s|%Y|%n' -- \"$f\" 2>&1 || rc=1; fi; \
         done; echo {rc}$rc; fi",
        p = p,
        missing = MISSING_MARKER,
        rc = STATUS_MARKER,
    )
}

/// 命令输出解析失败
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellFailure {
    /// 命令以非零状态结束，附带输出
    Failed(String),
    /// 没有看到状态标记，输出不完整
    Truncated,
}

/// 拆出退出码和其余输出
fn split_status(output: &str) -> (Option<i32>, Vec<&str>) {
    let mut status = None;
    let mut lines = Vec::new();
    for line in output.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(code) = line.strip_prefix(STATUS_MARKER) {
            status = code.trim().parse().ok();
        } else if !line.is_empty() {
            lines.push(line);
        }
    }
    (status, lines)
}

/// 解析 `with_status` 包装过的命令输出
pub fn parse_status(output: &str) -> Result<(), ShellFailure> {
    match split_status(output) {
        (Some(0), _) => Ok(()),
        (Some(code), lines) => Err(ShellFailure::Failed(failure_message(code, &lines))),
        (None, _) => Err(ShellFailure::Truncated),
    }
}

fn failure_message(code: i32, lines: &[&str]) -> String {
    if lines.is_empty() {
        format!("exit status {}", code)
    } else {
        lines.join("; ")
    }
}

/// 解析 `list_command` 的输出；目录不存在时返回 `Ok(None)`
pub fn parse_listing(output: &str) -> Result<Option<Vec<RemoteEntry>>, ShellFailure> {
    if output.lines().any(|l| l.trim_end_matches('\r') == MISSING_MARKER) {
        return Ok(None);
    }

    let (status, lines) = split_status(output);
    let mut entries = Vec::new();
    let mut diagnostics = Vec::new();

    for line in lines {
        match parse_stat_line(line) {
            Some(entry) => entries.push(entry),
            None => diagnostics.push(line),
        }
    }

    match status {
        Some(0) => {
            entries.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(Some(entries))
        }
        Some(code) => Err(ShellFailure::Failed(failure_message(code, &diagnostics))),
        None => Err(ShellFailure::Truncated),
    }
}

fn parse_stat_line(line: &str) -> Option<RemoteEntry> {
    let mut parts = line.splitn(4, '|');
    let kind = parts.next()?;
    let size = parts.next()?.trim().parse().ok()?;
    let modified_time = parts.next()?.trim().parse().ok()?;
    let name = parts.next()?;
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }

    let kind = if kind == "directory" {
        RemoteKind::Directory
    } else if kind.starts_with("regular") {
        RemoteKind::File
    } else {
        RemoteKind::Other
    };

    Some(RemoteEntry {
        name: name.to_string(),
        kind,
        size,
        modified_time,
    })
}
