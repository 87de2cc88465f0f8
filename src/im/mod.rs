pub mod callback;
pub mod client;
pub mod clock;
pub mod context;
pub mod conversation;
pub mod db;
pub mod error;
pub mod friend;
pub mod group;
pub mod listener_set;
pub mod message;
pub mod rate_limit;
pub mod remote;
pub mod serialization;
pub mod session;
pub mod signaling;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// 重新导出客户端入口与错误类型
pub use callback::ImCallback;
pub use client::ImClient;
pub use context::ClientConfig;
pub use error::{ErrorKind, ImError, ImResult};
