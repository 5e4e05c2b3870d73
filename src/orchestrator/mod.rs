//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责任务调度与会话生命周期，是整个系统的"指挥中心"。
//!
//! ### `task_orchestrator` - 任务编排器
//! - 启动、停止、查询任务（同一任务最多一个会话）
//! - 解析代理与结账身份
//! - 事件泵：会话状态 → 存储 + 界面事件
//!
//! ### `runner` - 命令行运行器
//! - 管理应用生命周期（初始化、运行、清理）
//! - 并发上限与任务排队
//! - 输出全局统计信息
//!
//! ## 层次关系
//!
//! ```text
//! runner (处理 Vec<Task>)
//!     ↓
//! task_orchestrator (注册表 task_id → 会话)
//!     ↓
//! session::AutomationSession (单个任务的状态机)
//!     ↓
//! strategy / proxy (能力层：站点策略、代理池)
//!     ↓
//! infrastructure / browser (基础设施：PageDriver、浏览器资源、存储)
//! ```

pub mod runner;
pub mod task_orchestrator;

pub use runner::App;
pub use task_orchestrator::{OrchestratorDeps, TaskOrchestrator};
