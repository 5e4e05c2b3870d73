use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use phf::phf_map;
use tracing::{debug, warn};

use super::selector::SelectorStrategy;
use super::traits::{SiteStrategy, StrategyContext};

/// 内置零售商
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetailerKind {
    Amazon,
    Walmart,
    Target,
    BestBuy,
    Shopify,
    Nike,
    /// 未识别零售商使用的通用策略
    Generic,
}

/// 零售商别名表（键已规范化为小写）
static RETAILER_ALIASES: phf::Map<&'static str, RetailerKind> = phf_map! {
    "amazon" => RetailerKind::Amazon,
    "amazon.com" => RetailerKind::Amazon,
    "walmart" => RetailerKind::Walmart,
    "walmart.com" => RetailerKind::Walmart,
    "target" => RetailerKind::Target,
    "target.com" => RetailerKind::Target,
    "bestbuy" => RetailerKind::BestBuy,
    "best buy" => RetailerKind::BestBuy,
    "best-buy" => RetailerKind::BestBuy,
    "bestbuy.com" => RetailerKind::BestBuy,
    "shopify" => RetailerKind::Shopify,
    "nike" => RetailerKind::Nike,
    "nike.com" => RetailerKind::Nike,
    "snkrs" => RetailerKind::Nike,
    "generic" => RetailerKind::Generic,
};

impl RetailerKind {
    pub const BUILTIN: [RetailerKind; 7] = [
        RetailerKind::Amazon,
        RetailerKind::Walmart,
        RetailerKind::Target,
        RetailerKind::BestBuy,
        RetailerKind::Shopify,
        RetailerKind::Nike,
        RetailerKind::Generic,
    ];

    /// 按别名解析，大小写与首尾空白不敏感
    pub fn parse(key: &str) -> Option<Self> {
        RETAILER_ALIASES.get(normalize_key(key).as_str()).copied()
    }

    /// 注册表中使用的规范键
    pub fn key(self) -> &'static str {
        match self {
            RetailerKind::Amazon => "amazon",
            RetailerKind::Walmart => "walmart",
            RetailerKind::Target => "target",
            RetailerKind::BestBuy => "bestbuy",
            RetailerKind::Shopify => "shopify",
            RetailerKind::Nike => "nike",
            RetailerKind::Generic => "generic",
        }
    }
}

impl fmt::Display for RetailerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

/// 根据上下文构造策略实例
pub type StrategyFactory = Arc<dyn Fn(StrategyContext) -> Box<dyn SiteStrategy> + Send + Sync>;

/// 解析结果
pub struct ResolvedStrategy {
    /// 实际使用的注册键
    pub key: String,
    pub strategy: Box<dyn SiteStrategy>,
    /// 是否因零售商未识别而使用了默认策略
    pub fallback: bool,
}

/// 零售商策略注册表
///
/// 由编排器显式构造并持有，不是全局状态
#[derive(Clone)]
pub struct StrategyRegistry {
    factories: HashMap<String, StrategyFactory>,
    default_key: String,
}

impl StrategyRegistry {
    /// 空注册表，未识别的零售商回退到 `default_key`
    pub fn new(default_key: &str) -> Self {
        Self {
            factories: HashMap::new(),
            default_key: normalize_key(default_key),
        }
    }

    /// 注册全部内置零售商的选择器策略
    pub fn with_builtin() -> Self {
        let mut registry = Self::new(RetailerKind::Generic.key());
        for kind in RetailerKind::BUILTIN {
            registry.register(
                kind.key(),
                Arc::new(move |ctx: StrategyContext| {
                    Box::new(SelectorStrategy::for_kind(kind, ctx)) as Box<dyn SiteStrategy>
                }),
            );
        }
        registry
    }

    /// 注册或覆盖一个零售商键
    pub fn register(&mut self, key: &str, factory: StrategyFactory) {
        let key = normalize_key(key);
        debug!("注册零售商策略: {}", key);
        self.factories.insert(key, factory);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lookup_key(key).is_some()
    }

    fn lookup_key(&self, key: &str) -> Option<String> {
        let normalized = normalize_key(key);
        if self.factories.contains_key(&normalized) {
            return Some(normalized);
        }
        RetailerKind::parse(&normalized)
            .map(|kind| kind.key().to_string())
            .filter(|canonical| self.factories.contains_key(canonical))
    }

    /// 解析零售商键对应的策略
    ///
    /// 未识别的键不会报错，而是使用默认策略尽力执行
    pub fn resolve(&self, key: &str, ctx: StrategyContext) -> Option<ResolvedStrategy> {
        if let Some(found) = self.lookup_key(key) {
            let factory = self.factories.get(&found)?;
            return Some(ResolvedStrategy {
                key: found,
                strategy: factory(ctx),
                fallback: false,
            });
        }

        warn!(
            "[任务 {}] ⚠️ 未识别的零售商 '{}'，使用默认策略 '{}'",
            ctx.task.id, key, self.default_key
        );
        let factory = self.factories.get(&self.default_key)?;
        Some(ResolvedStrategy {
            key: self.default_key.clone(),
            strategy: factory(ctx),
            fallback: true,
        })
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}
