//! 数据日志输出
//!
//! 每个运行单元持有自己的 sink，按行写入 JSON：
//! `{"timestamp": ..., "level": "INFO", "message": ..., "data": ...}`
//!
//! 文件达到大小上限后轮转为 `file.1`, `file.2` ...，最多保留 `backup_count` 个。

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

/// 默认单文件大小上限：1 MiB
pub const DEFAULT_MAX_BYTES: u64 = 1024 * 1024;
/// 默认保留的历史文件数量
pub const DEFAULT_BACKUP_COUNT: u32 = 100;

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Info,
    Error,
}

/// 结构化记录的写入端
pub trait RecordSink: Send + Sync {
    fn write(&self, level: Level, message: &str, data: Option<&Value>) -> io::Result<()>;

    fn info(&self, message: &str, data: Option<&Value>) -> io::Result<()> {
        self.write(Level::Info, message, data)
    }

    fn error(&self, message: &str) -> io::Result<()> {
        self.write(Level::Error, message, None)
    }
}

#[derive(Serialize)]
struct LogLine<'a> {
    timestamp: String,
    level: Level,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a Value>,
}

/// 序列化为一行（含换行符）
fn render_line(level: Level, message: &str, data: Option<&Value>) -> io::Result<Vec<u8>> {
    let line = LogLine {
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        level,
        message,
        data,
    };
    let mut bytes = serde_json::to_vec(&line).map_err(io::Error::other)?;
    bytes.push(b'\n');
    Ok(bytes)
}

struct FileState {
    file: File,
    size: u64,
}

/// 按大小轮转的文件 sink
pub struct RotatingFileSink {
    path: PathBuf,
    max_bytes: u64,
    backup_count: u32,
    state: Mutex<FileState>,
}

impl RotatingFileSink {
    /// 以追加模式打开日志文件，必要时创建父目录
    pub fn open<P: AsRef<Path>>(path: P, max_bytes: u64, backup_count: u32) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let size = file.metadata()?.len();

        tracing::debug!(path = %path.display(), size, "日志文件已打开");

        Ok(Self {
            path,
            max_bytes,
            backup_count,
            state: Mutex::new(FileState { file, size }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn backup_path(&self, index: u32) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{}", index));
        PathBuf::from(name)
    }

    fn should_rollover(&self, state: &FileState, incoming: u64) -> bool {
        self.max_bytes > 0 && state.size > 0 && state.size + incoming > self.max_bytes
    }

    /// file.{n-1} -> file.{n} ... file -> file.1，超出 backup_count 的直接丢弃
    fn rollover(&self, state: &mut FileState) -> io::Result<()> {
        state.file.flush()?;

        if self.backup_count == 0 {
            state.file.set_len(0)?;
            state.size = 0;
            return Ok(());
        }

        for index in (1..self.backup_count).rev() {
            let src = self.backup_path(index);
            if src.exists() {
                let dst = self.backup_path(index + 1);
                if dst.exists() {
                    fs::remove_file(&dst)?;
                }
                fs::rename(&src, &dst)?;
            }
        }

        let first = self.backup_path(1);
        if first.exists() {
            fs::remove_file(&first)?;
        }
        fs::rename(&self.path, &first)?;

        state.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        state.size = 0;

        tracing::debug!(path = %self.path.display(), "日志文件已轮转");
        Ok(())
    }
}

impl RecordSink for RotatingFileSink {
    fn write(&self, level: Level, message: &str, data: Option<&Value>) -> io::Result<()> {
        let line = render_line(level, message, data)?;
        let mut state = self.state.lock();

        if self.should_rollover(&state, line.len() as u64) {
            self.rollover(&mut state)?;
        }

        state.file.write_all(&line)?;
        state.file.flush()?;
        state.size += line.len() as u64;
        Ok(())
    }
}

/// 内存 sink，测试中用于断言写入内容
#[cfg(test)]
#[derive(Default)]
pub struct MemorySink {
    entries: Mutex<Vec<(Level, String, Option<Value>)>>,
}

#[cfg(test)]
impl MemorySink {
    pub fn entries(&self) -> Vec<(Level, String, Option<Value>)> {
        self.entries.lock().clone()
    }

    pub fn data_of(&self, prefix: &str) -> Vec<Value> {
        self.entries
            .lock()
            .iter()
            .filter(|(_, msg, _)| msg.starts_with(prefix))
            .filter_map(|(_, _, data)| data.clone())
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|(level, _, _)| *level == Level::Error)
            .map(|(_, msg, _)| msg.clone())
            .collect()
    }
}

#[cfg(test)]
impl RecordSink for MemorySink {
    fn write(&self, level: Level, message: &str, data: Option<&Value>) -> io::Result<()> {
        self.entries
            .lock()
            .push((level, message.to_string(), data.cloned()));
        Ok(())
    }
}
