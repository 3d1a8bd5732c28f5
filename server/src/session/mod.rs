pub mod cookie;
pub mod manager;
pub mod store;

pub use cookie::{CookieError, CookieSigner};
pub use manager::{Session, SessionError, SessionManager, SessionRecord, SessionSettings};
pub use store::{MemorySessionStore, RedisSessionStore, SessionStore, StoreError};
