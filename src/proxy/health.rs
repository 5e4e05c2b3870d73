//! 代理健康检查
//!
//! 通过候选代理发出一次真实请求，测量往返延迟

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::Proxy;

/// 健康检查参数
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub probe_url: String,
    pub timeout: Duration,
}

impl ProbeSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            probe_url: config.probe_url.clone(),
            timeout: config.probe_timeout(),
        }
    }
}

/// 单次检查结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    pub success: bool,
    pub response_time_ms: u64,
}

impl ProbeResult {
    pub fn failed() -> Self {
        Self {
            success: false,
            response_time_ms: 0,
        }
    }
}

fn build_client(proxy: &Proxy, timeout: Duration) -> AppResult<reqwest::Client> {
    let mut transport = reqwest::Proxy::all(proxy.url())
        .map_err(|e| AppError::Proxy(format!("代理地址无效 {}: {}", proxy.server_arg(), e)))?;
    if proxy.has_credentials() {
        transport = transport.basic_auth(
            proxy.username.as_deref().unwrap_or_default(),
            proxy.password.as_deref().unwrap_or_default(),
        );
    }

    reqwest::Client::builder()
        .proxy(transport)
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()
        .map_err(AppError::from)
}

/// 通过代理请求 `probe_url`
///
/// 2xx 视为成功；非 2xx 返回失败但保留测得的延迟；
/// 连接失败、超时、配置错误一律返回 `{false, 0}`，不向调用方抛错
pub async fn probe(proxy: &Proxy, probe_url: &str, timeout: Duration) -> ProbeResult {
    let client = match build_client(proxy, timeout) {
        Ok(client) => client,
        Err(e) => {
            debug!("代理 {} 无法构建请求客户端: {}", proxy.id, e);
            return ProbeResult::failed();
        }
    };

    let started = Instant::now();
    let request = client.get(probe_url).send();
    match tokio::time::timeout(timeout, request).await {
        Ok(Ok(response)) => {
            let elapsed = started.elapsed().as_millis() as u64;
            if response.status().is_success() {
                ProbeResult {
                    success: true,
                    response_time_ms: elapsed,
                }
            } else {
                debug!("代理 {} 探测返回状态码 {}", proxy.id, response.status());
                ProbeResult {
                    success: false,
                    response_time_ms: elapsed,
                }
            }
        }
        Ok(Err(e)) => {
            debug!("代理 {} 探测失败: {}", proxy.id, e);
            ProbeResult::failed()
        }
        Err(_) => {
            debug!("代理 {} 探测超时 ({:?})", proxy.id, timeout);
            ProbeResult::failed()
        }
    }
}
