//! 信令模型定义
//!
//! 信令以自定义消息承载，消息体为 JSON，`businessID` 固定为 1。

use crate::im::message::models::Message;
use crate::im::message::types::MessageContent;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 信令消息的业务标识
pub const SIGNALING_BUSINESS_ID: i32 = 1;

/// 信令动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum SignalingActionType {
    Invite = 1,
    Cancel = 2,
    Accept = 3,
    Reject = 4,
    Timeout = 5,
    Modify = 6,
}

impl From<SignalingActionType> for i32 {
    fn from(v: SignalingActionType) -> Self {
        v as i32
    }
}

impl TryFrom<i32> for SignalingActionType {
    type Error = String;

    fn try_from(v: i32) -> Result<Self, Self::Error> {
        Ok(match v {
            1 => SignalingActionType::Invite,
            2 => SignalingActionType::Cancel,
            3 => SignalingActionType::Accept,
            4 => SignalingActionType::Reject,
            5 => SignalingActionType::Timeout,
            6 => SignalingActionType::Modify,
            other => return Err(format!("未知信令动作: {other}")),
        })
    }
}

/// 信令消息体（承载在自定义消息的 data 中）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalingInfo {
    #[serde(rename = "businessID")]
    pub business_id: i32,
    #[serde(rename = "inviteID")]
    pub invite_id: String,
    pub inviter: String,
    #[serde(rename = "inviteeList", default)]
    pub invitee_list: Vec<String>,
    #[serde(rename = "groupID", default)]
    pub group_id: String,
    #[serde(default)]
    pub data: String,
    /// 超时时间（秒），0 表示不超时
    #[serde(default)]
    pub timeout: u32,
    #[serde(rename = "actionType")]
    pub action_type: SignalingActionType,
    /// 本条信令的操作者
    #[serde(rename = "opUser", default)]
    pub op_user: String,
    #[serde(rename = "onlineUserOnly", default)]
    pub online_user_only: bool,
}

impl SignalingInfo {
    /// 从消息中解析信令，非信令消息返回 None
    pub fn from_message(message: &Message) -> Option<Self> {
        let MessageContent::Custom(custom) = &message.content else {
            return None;
        };
        let info: SignalingInfo = serde_json::from_slice(&custom.data).ok()?;
        (info.business_id == SIGNALING_BUSINESS_ID && !info.invite_id.is_empty()).then_some(info)
    }

    pub fn is_group(&self) -> bool {
        !self.group_id.is_empty()
    }
}

/// 单个被邀请人的状态；Pending 以外均为终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InviteeState {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
    TimedOut,
}

/// 邀请整体状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvitationState {
    Pending,
    /// 仍有待处理的被邀请人，且邀请内容被修改过
    Modified,
    Accepted,
    Rejected,
    Cancelled,
    TimedOut,
}

impl InvitationState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, InvitationState::Pending | InvitationState::Modified)
    }
}

/// 本地邀请表中的一条记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invitation {
    pub info: SignalingInfo,
    pub invitees: BTreeMap<String, InviteeState>,
    pub modified: bool,
    pub created_at: i64,
}

impl Invitation {
    pub fn new(info: SignalingInfo, created_at: i64) -> Self {
        let invitees = info
            .invitee_list
            .iter()
            .map(|u| (u.clone(), InviteeState::Pending))
            .collect();
        Self {
            info,
            invitees,
            modified: false,
            created_at,
        }
    }

    pub fn pending_invitees(&self) -> Vec<String> {
        self.invitees
            .iter()
            .filter(|(_, s)| **s == InviteeState::Pending)
            .map(|(u, _)| u.clone())
            .collect()
    }

    pub fn has_pending(&self) -> bool {
        self.invitees.values().any(|s| *s == InviteeState::Pending)
    }

    pub fn invitee_state(&self, user_id: &str) -> Option<InviteeState> {
        self.invitees.get(user_id).copied()
    }

    /// 将仍在 Pending 的被邀请人迁移到 `next`，已结束的保持不变；返回实际迁移的用户
    pub fn resolve_pending(&mut self, users: &[String], next: InviteeState) -> Vec<String> {
        let mut changed = Vec::new();
        for u in users {
            if let Some(state) = self.invitees.get_mut(u) {
                if *state == InviteeState::Pending {
                    *state = next;
                    changed.push(u.clone());
                }
            }
        }
        changed
    }

    pub fn state(&self) -> InvitationState {
        if self.has_pending() {
            return if self.modified {
                InvitationState::Modified
            } else {
                InvitationState::Pending
            };
        }
        let any = |s: InviteeState| self.invitees.values().any(|v| *v == s);
        if any(InviteeState::Accepted) {
            InvitationState::Accepted
        } else if any(InviteeState::Cancelled) {
            InvitationState::Cancelled
        } else if any(InviteeState::TimedOut) {
            InvitationState::TimedOut
        } else {
            InvitationState::Rejected
        }
    }
}
