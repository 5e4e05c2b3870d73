use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::profiles::SelectorProfile;
use super::registry::RetailerKind;
use super::traits::{Capabilities, CheckoutOutcome, SiteStrategy, StrategyContext};
use crate::error::{AppError, AppResult};
use crate::infrastructure::page_driver::wait_for;
use crate::models::CheckoutIdentity;

/// 登录表单提交后等待页面跳转的时间
const LOGIN_SETTLE: Duration = Duration::from_secs(2);

/// 由选择器表驱动的通用站点策略
pub struct SelectorStrategy {
    profile: &'static SelectorProfile,
    ctx: StrategyContext,
}

impl SelectorStrategy {
    pub fn new(profile: &'static SelectorProfile, ctx: StrategyContext) -> Self {
        Self { profile, ctx }
    }

    pub fn for_kind(kind: RetailerKind, ctx: StrategyContext) -> Self {
        Self::new(SelectorProfile::for_kind(kind), ctx)
    }

    fn task_id(&self) -> &str {
        &self.ctx.task.id
    }

    async fn has(&self, selector: Option<&str>) -> AppResult<bool> {
        match selector {
            Some(selector) => self.ctx.page.exists(selector).await,
            None => Ok(false),
        }
    }

    fn cart_url(&self) -> AppResult<String> {
        if let Some(url) = self.profile.cart_url {
            return Ok(url.to_string());
        }
        let target = self
            .ctx
            .task
            .product_target(self.profile.product_url_template)?;
        site_origin(&target)
            .map(|origin| format!("{}/cart", origin))
            .ok_or_else(|| AppError::configuration(format!("无法从商品链接推断购物车地址: {}", target)))
    }

    async fn choose(&self, selector: Option<&str>, value: Option<&str>, label: &str) -> AppResult<()> {
        let (Some(selector), Some(value)) = (selector, value) else {
            return Ok(());
        };
        if self.ctx.page.select_value(selector, value).await? {
            debug!("[任务 {}] 已选择{}: {}", self.task_id(), label, value);
        } else {
            warn!("[任务 {}] ⚠️ 未找到{}选项 '{}'，保持默认", self.task_id(), label, value);
        }
        Ok(())
    }

    async fn fill(&self, selector: Option<&str>, value: &str) -> AppResult<()> {
        let Some(selector) = selector else {
            return Ok(());
        };
        if value.is_empty() || !self.ctx.page.exists(selector).await? {
            return Ok(());
        }
        self.ctx.page.type_into(selector, value).await
    }

    async fn fill_identity(&self, identity: &CheckoutIdentity) -> AppResult<()> {
        let form = &self.profile.form;
        self.fill(form.email, &identity.email).await?;
        self.fill(form.name, &identity.name).await?;
        self.fill(form.address, &identity.address).await?;
        self.fill(form.city, &identity.city).await?;
        if let Some(state) = form.state {
            if !identity.state.is_empty() && !self.ctx.page.select_value(state, &identity.state).await? {
                self.fill(Some(state), &identity.state).await?;
            }
        }
        self.fill(form.zip, &identity.zip).await?;
        self.fill(form.phone, &identity.phone).await?;
        self.fill(form.card_number, &identity.card_number).await?;
        self.fill(form.card_expiry, &identity.card_expiry).await?;
        self.fill(form.card_cvv, &identity.card_cvv).await?;
        Ok(())
    }

    fn needs_identity(&self) -> bool {
        self.profile.form.card_number.is_some()
    }
}

#[async_trait]
impl SiteStrategy for SelectorStrategy {
    fn name(&self) -> &str {
        self.profile.name
    }

    fn capabilities(&self) -> Capabilities {
        let has_account = self
            .ctx
            .identity
            .as_ref()
            .map(|identity| identity.has_account())
            .unwrap_or(false);
        Capabilities {
            select_options: self.profile.size_options.is_some() || self.profile.color_options.is_some(),
            login: has_account && self.profile.supports_login(),
            captcha: self.profile.captcha.is_some(),
        }
    }

    async fn check_availability(&self) -> AppResult<bool> {
        let target = self
            .ctx
            .task
            .product_target(self.profile.product_url_template)?;
        self.ctx.page.goto(&target).await?;

        if self.has(self.profile.captcha).await? {
            return Err(AppError::blocked(format!("{} 商品页出现验证码", self.profile.name)));
        }
        if self.has(self.profile.sold_out).await? {
            debug!("[任务 {}] 商品缺货", self.task_id());
            return Ok(false);
        }

        let available = self.ctx.page.exists(self.profile.add_to_cart).await?;
        if available {
            if let Some(price_selector) = self.profile.price {
                let price = self
                    .ctx
                    .page
                    .text_of(price_selector)
                    .await?
                    .and_then(|text| parse_price(&text));
                info!("[任务 {}] 🟢 商品有货 (价格: {:?})", self.task_id(), price);
            }
        }
        Ok(available)
    }

    async fn select_options(&self) -> AppResult<()> {
        let task = &self.ctx.task;
        self.choose(self.profile.size_options, task.size.as_deref(), "尺码")
            .await?;
        self.choose(self.profile.color_options, task.color.as_deref(), "颜色")
            .await
    }

    async fn add_to_cart(&self) -> AppResult<()> {
        wait_for(self.ctx.page.as_ref(), self.profile.add_to_cart, self.ctx.navigation_timeout).await?;
        self.ctx.page.click(self.profile.add_to_cart).await?;
        info!("[任务 {}] 🛒 已加入购物车", self.task_id());
        Ok(())
    }

    async fn login(&self) -> AppResult<bool> {
        let (Some(email), Some(password), Some(submit)) = (
            self.profile.login_email,
            self.profile.login_password,
            self.profile.login_submit,
        ) else {
            return Ok(true);
        };
        let Some(identity) = self.ctx.identity.as_ref().filter(|i| i.has_account()) else {
            return Ok(true);
        };

        if !self.ctx.page.exists(email).await? {
            debug!("[任务 {}] 未出现登录表单，视为已登录", self.task_id());
            return Ok(true);
        }

        let account_email = identity.account_email.as_deref().unwrap_or_default();
        let account_password = identity.account_password.as_deref().unwrap_or_default();
        self.ctx.page.type_into(email, account_email).await?;
        // 两步登录：先提交邮箱再出现密码框
        if !self.ctx.page.exists(password).await? {
            self.ctx.page.click(submit).await?;
            wait_for(self.ctx.page.as_ref(), password, self.ctx.navigation_timeout).await?;
        }
        self.ctx.page.type_into(password, account_password).await?;
        self.ctx.page.click(submit).await?;
        sleep(LOGIN_SETTLE).await;

        let still_on_form = self.ctx.page.exists(password).await?;
        if still_on_form {
            warn!("[任务 {}] ❌ 登录后仍停留在登录页", self.task_id());
        }
        Ok(!still_on_form)
    }

    async fn submit_captcha(&self) -> AppResult<bool> {
        // 不做验证码识别，只判断拦截是否仍然存在
        Ok(!self.has(self.profile.captcha).await?)
    }

    async fn checkout(&self) -> AppResult<CheckoutOutcome> {
        if self.needs_identity() && self.ctx.identity.is_none() {
            return Err(AppError::checkout("任务未配置结账身份"));
        }

        let cart_url = self.cart_url()?;
        self.ctx.page.goto(&cart_url).await?;
        wait_for(self.ctx.page.as_ref(), self.profile.proceed_to_checkout, self.ctx.navigation_timeout).await?;
        self.ctx.page.click(self.profile.proceed_to_checkout).await?;

        let has_account = self.capabilities().login;
        if !has_account && self.has(self.profile.guest_checkout).await? {
            if let Some(guest) = self.profile.guest_checkout {
                self.ctx.page.click(guest).await?;
            }
        }

        if let Some(identity) = &self.ctx.identity {
            self.fill_identity(identity).await?;
        }

        wait_for(self.ctx.page.as_ref(), self.profile.place_order, self.ctx.navigation_timeout).await?;
        self.ctx.page.click(self.profile.place_order).await?;
        info!("[任务 {}] 📨 订单已提交，等待确认", self.task_id());

        if let Err(e) = wait_for(
            self.ctx.page.as_ref(),
            self.profile.order_confirmation,
            self.ctx.navigation_timeout,
        )
        .await
        {
            warn!("[任务 {}] ❌ 未看到订单确认: {}", self.task_id(), e);
            return Ok(CheckoutOutcome::rejected());
        }

        let order_reference = self.ctx.page.text_of(self.profile.order_confirmation).await?;
        let price = match self.profile.order_total {
            Some(selector) => self
                .ctx
                .page
                .text_of(selector)
                .await?
                .and_then(|text| parse_price(&text)),
            None => None,
        };
        Ok(CheckoutOutcome::succeeded(order_reference, price))
    }
}

/// 从 "$1,299.99" 之类的文本中提取价格
pub fn parse_price(text: &str) -> Option<f64> {
    let re = Regex::new(r"(\d[\d,]*(?:\.\d+)?)").ok()?;
    let raw = re.captures(text)?.get(1)?.as_str().replace(',', "");
    raw.parse().ok()
}

/// 取链接的 `scheme://host` 部分
fn site_origin(url: &str) -> Option<String> {
    let re = Regex::new(r"^(https?://[^/?#]+)").ok()?;
    Some(re.captures(url)?.get(1)?.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price("$1,299.99"), Some(1299.99));
        assert_eq!(parse_price("Now 49 USD"), Some(49.0));
        assert_eq!(parse_price("Sold out"), None);
    }

    #[test]
    fn test_site_origin() {
        assert_eq!(
            site_origin("https://shop.example.com/products/tee?variant=1"),
            Some("https://shop.example.com".to_string())
        );
        assert_eq!(site_origin("not a url"), None);
    }
}
