pub mod config;
pub mod gateway;
pub mod store;

pub use config::{ConfigError, GatewayConfig};
pub use gateway::ConnectionManager;
pub use store::{SessionStore, SharedStore, StoreChange};
