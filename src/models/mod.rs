pub mod checkout;
pub mod loaders;
pub mod proxy;
pub mod task;

pub use checkout::{CheckoutIdentity, CheckoutOutcomeKind, CheckoutResult, TaskEvent};
pub use loaders::{load_task_file, LoadedTasks};
pub use proxy::{Proxy, ProxyDraft, ProxyId, ProxyPatch, ProxyProtocol, ProxyStatus};
pub use task::{Task, TaskId, TaskStatus};
