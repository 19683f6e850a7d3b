//! 状态类型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::script::ScriptError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Success,
    Error,
    Info,
}

/// 最近一次可读的状态摘要
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    #[serde(rename = "type")]
    pub kind: StatusKind,
    pub message: String,
}

impl StatusMessage {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Error,
            message: message.into(),
        }
    }
}

/// 输出片段来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputSource {
    Stdout,
    Stderr,
    /// 由面板自身生成的行（开始提示、错误块）
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputChunk {
    pub source: OutputSource,
    pub text: String,
}

/// 单个会话的运行状态
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunState {
    /// 从运行开始到记录终态前为 true
    pub is_running: bool,
    /// 仅追加；新运行开始或显式清空时重置
    pub output: Vec<OutputChunk>,
    /// 每次运行最多设置一次（终态事件可覆盖中途的 error 事件）
    pub error: Option<ScriptError>,
    pub status: Option<StatusMessage>,
    pub run_id: Option<String>,
    pub script_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunState {
    /// 可见输出：所有片段按顺序拼接
    pub fn output_text(&self) -> String {
        self.output.iter().map(|c| c.text.as_str()).collect()
    }

    pub fn duration_ms(&self) -> Option<u64> {
        let (start, end) = (self.started_at?, self.finished_at?);
        u64::try_from((end - start).num_milliseconds()).ok()
    }

    pub(crate) fn push(&mut self, source: OutputSource, text: impl Into<String>) -> OutputChunk {
        let chunk = OutputChunk {
            source,
            text: text.into(),
        };
        self.output.push(chunk.clone());
        chunk
    }

    pub(crate) fn clear(&mut self) {
        self.output.clear();
        self.error = None;
    }
}

/// 推送给显示层的状态变更
#[derive(Debug, Clone)]
pub enum RunUpdate {
    Started { run_id: String, script_id: String },
    Output(OutputChunk),
    Status(StatusMessage),
    Finished { run_id: String, success: bool },
    Cleared,
}
