//! 关系链模块：好友、好友申请、黑名单、好友分组

pub mod listener;
pub mod models;
pub mod service;

pub use listener::FriendshipListener;
pub use models::{
    AllowType, FriendAddApplication, FriendApplication, FriendApplicationType, FriendCheckResult,
    FriendGroup, FriendInfo, FriendInfoResult, FriendOperationResult, FriendRelation,
    FriendResponseType, FriendType,
};
pub use service::FriendshipManager;
