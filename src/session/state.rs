use std::fmt;

use serde::Serialize;

use crate::models::TaskStatus;

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SessionState {
    Initializing,
    Monitoring,
    Carting,
    CheckingOut,
    Succeeded,
    Failed,
    Stopped,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Succeeded | SessionState::Failed | SessionState::Stopped
        )
    }

    /// 状态迁移规则
    ///
    /// 进入 Carting 之后不能再回到 Monitoring；任何非终止状态都可以停止
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (from, Stopped) => !from.is_terminal(),
            (Initializing, Monitoring) | (Initializing, Failed) => true,
            (Monitoring, Monitoring) | (Monitoring, Carting) => true,
            (Carting, CheckingOut) | (Carting, Failed) => true,
            (CheckingOut, Succeeded) | (CheckingOut, Failed) => true,
            _ => false,
        }
    }

    /// 对外展示的任务状态
    pub fn task_status(self) -> TaskStatus {
        match self {
            SessionState::Initializing | SessionState::Stopped => TaskStatus::Idle,
            SessionState::Monitoring => TaskStatus::Monitoring,
            SessionState::Carting => TaskStatus::Carting,
            SessionState::CheckingOut => TaskStatus::Checkout,
            SessionState::Succeeded => TaskStatus::Success,
            SessionState::Failed => TaskStatus::Failed,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Initializing => "initializing",
            SessionState::Monitoring => "monitoring",
            SessionState::Carting => "carting",
            SessionState::CheckingOut => "checking_out",
            SessionState::Succeeded => "succeeded",
            SessionState::Failed => "failed",
            SessionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// 一次状态迁移
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub from: SessionState,
    pub to: SessionState,
}

impl Transition {
    pub fn new(from: SessionState, to: SessionState) -> Self {
        Self { from, to }
    }
}
