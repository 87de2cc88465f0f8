//! 信令模块：基于自定义消息的邀请 / 接受 / 拒绝 / 取消 / 超时

pub mod listener;
pub mod models;
pub mod service;

pub use listener::SignalingListener;
pub use models::{
    Invitation, InvitationState, InviteeState, SignalingActionType, SignalingInfo,
    SIGNALING_BUSINESS_ID,
};
pub use service::SignalingManager;
