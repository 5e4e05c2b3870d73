//! 代理列表文本格式
//!
//! 每行一个代理：`host:port` 或 `host:port:username:password`，空行忽略，协议默认 http

use crate::error::{AppError, AppResult};
use crate::models::{Proxy, ProxyDraft};

/// 解析一行代理
pub fn parse_proxy_line(line: &str) -> AppResult<ProxyDraft> {
    let parts: Vec<&str> = line.trim().split(':').collect();
    // 只接受 host:port 或 host:port:user:pass，缺少密码的三段式视为格式错误
    if parts.len() < 2 || parts.len() == 3 || parts[0].is_empty() {
        return Err(AppError::Proxy(format!("格式无效: {}", line.trim())));
    }

    let port: u16 = parts[1]
        .trim()
        .parse()
        .map_err(|_| AppError::Proxy(format!("端口无效: {}", parts[1])))?;

    let mut draft = ProxyDraft::new(parts[0].trim(), port);
    if parts.len() >= 4 {
        draft.username = Some(parts[2].to_string());
        // 密码中允许出现冒号
        draft.password = Some(parts[3..].join(":"));
    }
    Ok(draft)
}

/// 解析整份列表，返回每个非空行的原文和解析结果
pub fn parse_proxy_list(content: &str) -> Vec<(String, AppResult<ProxyDraft>)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| (line.to_string(), parse_proxy_line(line)))
        .collect()
}

/// 导出为列表文本，只有用户名和密码都存在时才带上认证信息
pub fn format_proxy_list(proxies: &[Proxy]) -> String {
    proxies
        .iter()
        .map(|proxy| {
            let mut line = format!("{}:{}", proxy.host, proxy.port);
            if let (Some(user), Some(pass)) = (&proxy.username, &proxy.password) {
                if !user.is_empty() && !pass.is_empty() {
                    line.push_str(&format!(":{}:{}", user, pass));
                }
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProxyProtocol, ProxyStatus};
    use chrono::Utc;

    #[test]
    fn test_parse_with_and_without_auth() {
        let plain = parse_proxy_line("10.0.0.1:8080").unwrap();
        assert_eq!(plain.host, "10.0.0.1");
        assert_eq!(plain.port, 8080);
        assert_eq!(plain.protocol, ProxyProtocol::Http);
        assert!(plain.username.is_none());

        let auth = parse_proxy_line(" proxy.example.com:3128:alice:s3cr:et ").unwrap();
        assert_eq!(auth.username.as_deref(), Some("alice"));
        assert_eq!(auth.password.as_deref(), Some("s3cr:et"));
    }

    #[test]
    fn test_parse_rejects_bad_lines() {
        assert!(parse_proxy_line("no-port").is_err());
        assert!(parse_proxy_line("host:notaport").is_err());
        assert!(parse_proxy_line(":8080").is_err());
    }

    #[test]
    fn test_parse_rejects_username_without_password() {
        let result = parse_proxy_line("10.0.0.1:8080:alice");
        assert!(matches!(result, Err(AppError::Proxy(_))));
    }

    #[test]
    fn test_parse_list_skips_blank_lines() {
        let parsed = parse_proxy_list("1.1.1.1:80\n\n   \nbroken\n2.2.2.2:81:u:p\n");
        assert_eq!(parsed.len(), 3);
        assert!(parsed[0].1.is_ok());
        assert!(parsed[1].1.is_err());
        assert_eq!(parsed[1].0, "broken");
    }

    #[test]
    fn test_format_omits_partial_credentials() {
        let make = |username: Option<&str>, password: Option<&str>| Proxy {
            id: "p".to_string(),
            host: "1.2.3.4".to_string(),
            port: 9000,
            username: username.map(str::to_string),
            password: password.map(str::to_string),
            protocol: ProxyProtocol::Http,
            location: None,
            last_checked_at: None,
            latency_ms: None,
            status: ProxyStatus::Active,
            created_at: Utc::now(),
        };
        let text = format_proxy_list(&[make(Some("u"), Some("p")), make(Some("u"), None)]);
        assert_eq!(text, "1.2.3.4:9000:u:p\n1.2.3.4:9000");
    }
}
