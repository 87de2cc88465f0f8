//! 消息模块
//!
//! 消息的创建、收发、漫游与本地存储

pub mod dao;
pub mod listener;
pub mod models;
pub mod service;
pub mod types;

// 重新导出主要类型
pub use listener::AdvancedMsgListener;
pub use models::{
    C2CReadReceipt, CompleteResult, HistoryMessageOption, Message, MessageExtension,
    MessageExtensionResult, MessagePriority, MessageReceipt, MessageRevoked, MessageStatus,
    OfflinePushInfo, SendOptions,
};
pub use service::MessageManager;
pub use types::{
    CustomElem, FaceElem, FileElem, ImageElem, LocationElem, MergerElem, MessageContent,
    SoundElem, TextElem, VideoElem,
};
