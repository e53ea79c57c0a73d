pub(crate) mod redis;

pub use redis::RedisStore;
