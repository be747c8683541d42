pub mod admin;
pub mod auth;
pub mod config;
pub mod drafts;
pub mod runs;
pub mod server;
pub mod state;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub use config::ServiceConfig;
pub use server::run_server;
