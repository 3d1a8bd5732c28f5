pub mod auth;
pub mod health;
pub mod proxy;

pub use auth::{login, logout};
pub use health::health_check;
pub use proxy::{forward, ProxySettings};
