pub mod toml_loader;

pub use toml_loader::{load_task_file, parse_task_file, LoadedTasks, TaskSpec};
