use thiserror::Error;

/// 应用程序错误类型
///
/// 前五类对应自动化流程中的错误分类：
/// 配置缺失、页面加载失败、被拦截（验证码/封禁）、页面结构不匹配、下单失败。
/// 其余变体用于包装基础设施层的错误。
#[derive(Debug, Error)]
pub enum AppError {
    /// 配置错误（例如缺少商品链接）
    #[error("配置错误: {0}")]
    Configuration(String),

    /// 页面加载失败
    #[error("导航到 {url} 失败: {message}")]
    Navigation { url: String, message: String },

    /// 验证码或封禁未能解除
    #[error("访问被拦截: {0}")]
    Blocked(String),

    /// 站点页面结构与选择器不匹配
    #[error("未找到页面元素: {selector}")]
    SelectorNotFound { selector: String },

    /// 支付或下单失败
    #[error("结账失败: {0}")]
    Checkout(String),

    /// 浏览器资源错误（启动、连接、关闭）
    #[error("浏览器错误: {0}")]
    Browser(String),

    /// 会话生命周期错误（停止超时、任务崩溃）
    #[error("会话错误: {0}")]
    Session(String),

    /// 外部存储读写失败
    #[error("存储错误: {0}")]
    Store(String),

    /// 代理配置或代理池错误
    #[error("代理错误: {0}")]
    Proxy(String),

    /// 文件读写失败
    #[error("文件错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 解析失败
    #[error("JSON解析失败: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML 解析失败
    #[error("TOML解析失败: {0}")]
    Toml(#[from] toml::de::Error),

    /// 其他错误
    #[error("错误: {0}")]
    Other(String),
}

// ========== 从常见错误类型转换 ==========

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Browser(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Proxy(err.to_string())
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建配置错误
    pub fn configuration(message: impl Into<String>) -> Self {
        AppError::Configuration(message.into())
    }

    /// 创建导航失败错误
    pub fn navigation(url: impl Into<String>, message: impl std::fmt::Display) -> Self {
        AppError::Navigation {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// 创建拦截错误
    pub fn blocked(message: impl Into<String>) -> Self {
        AppError::Blocked(message.into())
    }

    /// 创建选择器缺失错误
    pub fn selector_not_found(selector: impl Into<String>) -> Self {
        AppError::SelectorNotFound {
            selector: selector.into(),
        }
    }

    /// 创建结账失败错误
    pub fn checkout(message: impl Into<String>) -> Self {
        AppError::Checkout(message.into())
    }

    /// 创建存储错误
    pub fn store(message: impl Into<String>) -> Self {
        AppError::Store(message.into())
    }

    /// 是否属于拦截类错误
    pub fn is_blocked(&self) -> bool {
        matches!(self, AppError::Blocked(_))
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
