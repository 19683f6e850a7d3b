//! # 运行状态模块
//!
//! 负责单个面板会话内脚本运行的状态：输出累积、错误归类、状态消息。
//!
//! ## 设计原则
//!
//! 1. **单一所有者**：`RunState` 只由 `ScriptRunCoordinator` 修改，显示层只读
//! 2. **事件驱动**：状态变更通过 broadcast 通道推送 `RunUpdate`
//! 3. **始终可重入**：任何退出路径都会复位 `is_running`

pub mod coordinator;
pub mod format;
pub mod types;

pub use coordinator::ScriptRunCoordinator;
pub use format::format_error_block;
pub use types::{OutputChunk, OutputSource, RunState, RunUpdate, StatusKind, StatusMessage};
