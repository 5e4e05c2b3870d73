//! CDP 页面 - 基础设施层
//!
//! 持有 chromiumoxide 的 Page，实现 [`PageDriver`]

use async_trait::async_trait;
use chromiumoxide::Page;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::infrastructure::page_driver::PageDriver;

/// 基于 chromiumoxide 的页面驱动
///
/// 职责：
/// - 持有会话唯一的 Page 资源
/// - 把 CDP 错误转换为导航/选择器错误
pub struct CdpPage {
    page: Page,
}

impl CdpPage {
    /// 创建新的页面驱动
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 获取 page 的引用（用于关闭等底层操作）
    pub fn page(&self) -> &Page {
        &self.page
    }
}

#[async_trait]
impl PageDriver for CdpPage {
    async fn goto(&self, url: &str) -> AppResult<()> {
        debug!("导航到: {}", url);
        self.page
            .goto(url)
            .await
            .map_err(|e| AppError::navigation(url, e))?;
        Ok(())
    }

    async fn reload(&self) -> AppResult<()> {
        let url = self.current_url().await?.unwrap_or_default();
        self.page
            .reload()
            .await
            .map_err(|e| AppError::navigation(url, e))?;
        Ok(())
    }

    async fn eval(&self, js_code: &str) -> AppResult<JsonValue> {
        let result = self.page.evaluate(js_code.to_string()).await?;
        let json_value = result.into_value()?;
        Ok(json_value)
    }

    async fn current_url(&self) -> AppResult<Option<String>> {
        Ok(self.page.url().await?)
    }

    async fn click(&self, selector: &str) -> AppResult<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| AppError::selector_not_found(selector))?;
        element.click().await?;
        Ok(())
    }

    async fn type_into(&self, selector: &str, text: &str) -> AppResult<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| AppError::selector_not_found(selector))?;
        element.click().await?;
        element.type_str(text).await?;
        Ok(())
    }
}
