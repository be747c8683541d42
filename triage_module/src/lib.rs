pub mod account_store;
pub mod classifier;
pub mod draft_store;
pub mod email_log_store;
pub mod export;
pub mod pipeline;
pub mod rule_store;
pub mod run_store;
pub mod service;
pub mod summary_store;
pub mod suppression;
pub mod task_store;
pub mod template_store;

pub use service::{run_server, ServiceConfig};
