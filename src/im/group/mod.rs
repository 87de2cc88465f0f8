//! 群组模块

pub mod listener;
pub mod models;
pub mod permission;
pub mod service;

pub use listener::GroupListener;
pub use models::{
    CreateGroupMember, CreateGroupParam, GroupAddOpt, GroupApplication, GroupApplicationStatus,
    GroupInfo, GroupInfoPatch, GroupInfoResult, GroupMemberFilter, GroupMemberInfo,
    GroupMemberOperationResult, GroupMemberPage, GroupMemberRole, GroupType, JoinGroupResult,
};
pub use permission::JoinPolicy;
pub use service::GroupManager;
