use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ProxyId = String;

/// 代理协议
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProtocol {
    #[default]
    Http,
    Https,
    Socks4,
    Socks5,
}

impl ProxyProtocol {
    pub fn scheme(self) -> &'static str {
        match self {
            ProxyProtocol::Http => "http",
            ProxyProtocol::Https => "https",
            ProxyProtocol::Socks4 => "socks4",
            ProxyProtocol::Socks5 => "socks5",
        }
    }

    pub fn is_socks(self) -> bool {
        matches!(self, ProxyProtocol::Socks4 | ProxyProtocol::Socks5)
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Some(ProxyProtocol::Http),
            "https" => Some(ProxyProtocol::Https),
            "socks4" => Some(ProxyProtocol::Socks4),
            "socks5" => Some(ProxyProtocol::Socks5),
            _ => None,
        }
    }
}

/// 代理健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxyStatus {
    #[default]
    Active,
    Inactive,
    Banned,
}

/// 代理记录
///
/// 存储中的 `password` 为加密后的密文，经代理池读取后才是明文
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proxy {
    pub id: ProxyId,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub protocol: ProxyProtocol,
    pub location: Option<String>,
    pub last_checked_at: Option<DateTime<Utc>>,
    /// 最近一次健康检查的往返耗时
    pub latency_ms: Option<u64>,
    pub status: ProxyStatus,
    pub created_at: DateTime<Utc>,
}

impl Proxy {
    /// 用户名和密码是否都已配置
    pub fn has_credentials(&self) -> bool {
        matches!(
            (self.username.as_deref(), self.password.as_deref()),
            (Some(u), Some(p)) if !u.is_empty() && !p.is_empty()
        )
    }

    /// 浏览器 `--proxy-server` 参数值
    ///
    /// HTTP 代理使用 `host:port`，其余协议带上 scheme
    pub fn server_arg(&self) -> String {
        match self.protocol {
            ProxyProtocol::Http => format!("{}:{}", self.host, self.port),
            other => format!("{}://{}:{}", other.scheme(), self.host, self.port),
        }
    }

    /// 带认证信息的代理 URL（用于 HTTP 客户端）
    pub fn url_with_auth(&self) -> String {
        if self.has_credentials() {
            format!(
                "{}://{}:{}@{}:{}",
                self.protocol.scheme(),
                self.username.as_deref().unwrap_or_default(),
                self.password.as_deref().unwrap_or_default(),
                self.host,
                self.port
            )
        } else {
            self.url()
        }
    }

    /// 不含认证信息的代理 URL
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.protocol.scheme(), self.host, self.port)
    }
}

/// 新建代理所需的数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProxyDraft {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub protocol: ProxyProtocol,
    pub location: Option<String>,
}

impl ProxyDraft {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }
}

/// 代理的部分更新，`None` 表示不修改
#[derive(Debug, Clone, Default)]
pub struct ProxyPatch {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<Option<String>>,
    pub password: Option<Option<String>>,
    pub protocol: Option<ProxyProtocol>,
    pub location: Option<Option<String>>,
    pub status: Option<ProxyStatus>,
    pub latency_ms: Option<Option<u64>>,
    pub last_checked_at: Option<DateTime<Utc>>,
}
