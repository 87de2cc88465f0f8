//! 登录态管理

pub mod listener;
pub mod models;
pub mod service;

pub use listener::SdkListener;
pub use models::{LoginStatus, SessionState};
pub use service::SessionManager;
