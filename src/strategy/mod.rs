//! 站点策略层
//!
//! 每个零售商一个 [`SiteStrategy`] 实现，由 [`StrategyRegistry`] 按零售商键解析

pub mod profiles;
pub mod registry;
pub mod selector;
pub mod traits;

pub use profiles::SelectorProfile;
pub use registry::{ResolvedStrategy, RetailerKind, StrategyFactory, StrategyRegistry};
pub use selector::SelectorStrategy;
pub use traits::{Capabilities, CheckoutOutcome, SiteStrategy, StrategyContext};
