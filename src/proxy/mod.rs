//! 代理池：记录管理、健康检查、选择策略、列表导入导出

pub mod health;
pub mod interchange;
pub mod pool;

pub use health::{ProbeResult, ProbeSettings};
pub use interchange::{format_proxy_list, parse_proxy_line, parse_proxy_list};
pub use pool::{ImportReport, ProxyPool};
