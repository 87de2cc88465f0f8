//! 会话模块
//!
//! 会话列表、未读统计与会话分组

pub mod dao;
pub mod listener;
pub mod models;
pub mod service;

pub use dao::ConversationDao;
pub use listener::ConversationListener;
pub use models::{
    mark_type, Conversation, ConversationListFilter, ConversationListResult,
    ConversationOperationResult,
};
pub use service::ConversationManager;
