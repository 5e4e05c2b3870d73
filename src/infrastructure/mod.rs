pub mod cdp_page;
pub mod event_sink;
pub mod page_driver;
pub mod store;
pub mod vault;

pub use cdp_page::CdpPage;
pub use event_sink::{EventSink, FanoutSink, JsonLinesSink, LogSink};
pub use page_driver::PageDriver;
pub use store::{MemoryStore, ProxyStore, TaskStore};
pub use vault::{CredentialVault, PassthroughVault};
