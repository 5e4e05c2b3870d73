//! 自动化会话：每个运行中的任务一个

pub mod automation;
pub mod state;

pub use automation::{AutomationSession, SessionEvent, SessionHandle, SessionParams, SessionReport};
pub use state::{SessionState, Transition};
