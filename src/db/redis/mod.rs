pub mod session_store;

pub use session_store::create_redis_client;
pub use session_store::RedisSessionStore;
pub use session_store::SessionWriterHandle;
pub use session_store::StoreKey;
