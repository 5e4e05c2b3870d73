//! 页面能力接口 - 基础设施层
//!
//! 站点策略只通过这里暴露的能力操作页面，不直接接触浏览器对象

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::time::{sleep, Instant};

use crate::error::{AppError, AppResult};

/// 等待元素时的轮询间隔
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// 页面驱动
///
/// 职责：
/// - 导航、刷新、执行 JS
/// - 元素查询、点击、输入
/// - 不认识 Task / 零售商
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// 导航到指定地址
    async fn goto(&self, url: &str) -> AppResult<()>;

    /// 刷新当前页面
    async fn reload(&self) -> AppResult<()>;

    /// 执行 JS 代码并返回 JSON 结果
    async fn eval(&self, js_code: &str) -> AppResult<JsonValue>;

    /// 当前页面地址
    async fn current_url(&self) -> AppResult<Option<String>>;

    /// 点击第一个匹配的元素
    async fn click(&self, selector: &str) -> AppResult<()>;

    /// 向第一个匹配的输入框输入文本
    async fn type_into(&self, selector: &str, text: &str) -> AppResult<()>;

    /// 页面上是否存在匹配的元素
    async fn exists(&self, selector: &str) -> AppResult<bool> {
        let js = format!(
            "!!document.querySelector({})",
            serde_json::to_string(selector)?
        );
        Ok(self.eval(&js).await?.as_bool().unwrap_or(false))
    }

    /// 第一个匹配元素的文本内容
    async fn text_of(&self, selector: &str) -> AppResult<Option<String>> {
        let js = format!(
            "(() => {{ const el = document.querySelector({}); return el ? el.textContent.trim() : null; }})()",
            serde_json::to_string(selector)?
        );
        Ok(self.eval(&js).await?.as_str().map(str::to_string))
    }

    /// 在下拉框或选项按钮中选中文本/值匹配的项
    ///
    /// 返回是否找到匹配项
    async fn select_value(&self, selector: &str, value: &str) -> AppResult<bool> {
        let js = format!(
            r#"
            (() => {{
                const wanted = {value}.toLowerCase();
                const nodes = Array.from(document.querySelectorAll({selector}));
                for (const node of nodes) {{
                    if (node.tagName === 'SELECT') {{
                        const option = Array.from(node.options).find(o =>
                            o.value.toLowerCase() === wanted || o.textContent.trim().toLowerCase() === wanted);
                        if (option) {{
                            node.value = option.value;
                            node.dispatchEvent(new Event('change', {{ bubbles: true }}));
                            return true;
                        }}
                    }} else if (node.textContent.trim().toLowerCase() === wanted
                        || (node.getAttribute('data-value') || '').toLowerCase() === wanted) {{
                        node.click();
                        return true;
                    }}
                }}
                return false;
            }})()
            "#,
            value = serde_json::to_string(value)?,
            selector = serde_json::to_string(selector)?,
        );
        Ok(self.eval(&js).await?.as_bool().unwrap_or(false))
    }
}

/// 等待元素出现，超时返回 `SelectorNotFound`
pub async fn wait_for(page: &dyn PageDriver, selector: &str, timeout: Duration) -> AppResult<()> {
    let deadline = Instant::now() + timeout;
    loop {
        if page.exists(selector).await? {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(AppError::selector_not_found(selector));
        }
        sleep(WAIT_POLL_INTERVAL).await;
    }
}
