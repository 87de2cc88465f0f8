//! 服务端主动推送的事件
//!
//! 推送通过登录时建立的通道按顺序送达，客户端的推送循环把它们路由到对应的管理器。

use crate::im::friend::models::{FriendApplication, FriendInfo};
use crate::im::group::models::{
    GroupApplication, GroupInfo, GroupMemberInfo, GroupMemberRole,
};
use crate::im::message::models::{
    C2CReadReceipt, Message, MessageExtension, MessageReceipt, MessageRevoked,
};
use crate::im::types::ReceiveMessageOpt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::mpsc;

pub type PushSender = mpsc::UnboundedSender<ServerPush>;
pub type PushReceiver = mpsc::UnboundedReceiver<ServerPush>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerPush {
    /// 新消息（包括自己其他终端发出的消息）
    NewMessage {
        message: Message,
        /// 接收者对该会话的接收选项
        recv_opt: ReceiveMessageOpt,
    },
    MessageRevoked(MessageRevoked),
    MessageModified(Message),
    MessageExtensionsChanged {
        #[serde(rename = "msgID")]
        msg_id: String,
        extensions: Vec<MessageExtension>,
    },
    MessageExtensionsDeleted {
        #[serde(rename = "msgID")]
        msg_id: String,
        /// 被删除的 key 及其新版本号
        extensions: Vec<MessageExtension>,
    },
    C2CReadReceipt(C2CReadReceipt),
    MessageReadReceipts(Vec<MessageReceipt>),
    Group(GroupEvent),
    Friend(FriendEvent),
    /// 被踢下线
    KickedOffline,
    /// 票据过期
    UserSigExpired,
}

/// 群组事件（推送给所有相关成员，包括操作者本人）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum GroupEvent {
    Created {
        group: GroupInfo,
    },
    Dismissed {
        group_id: String,
        op_user: String,
    },
    InfoChanged {
        group: GroupInfo,
        op_user: String,
    },
    MemberEntered {
        group_id: String,
        members: Vec<GroupMemberInfo>,
    },
    MemberLeft {
        group_id: String,
        user_id: String,
    },
    MemberInvited {
        group_id: String,
        op_user: String,
        members: Vec<GroupMemberInfo>,
    },
    MemberKicked {
        group_id: String,
        op_user: String,
        user_ids: Vec<String>,
    },
    MemberInfoChanged {
        group_id: String,
        members: Vec<GroupMemberInfo>,
    },
    RoleChanged {
        group_id: String,
        op_user: String,
        user_id: String,
        role: GroupMemberRole,
    },
    OwnerChanged {
        group_id: String,
        new_owner: String,
    },
    /// 推送给群主和管理员
    ApplicationReceived {
        application: GroupApplication,
    },
    /// 推送给申请者
    ApplicationProcessed {
        group_id: String,
        op_user: String,
        accepted: bool,
        reason: String,
    },
    AttributesChanged {
        group_id: String,
        attributes: BTreeMap<String, String>,
        version: u64,
    },
    CounterChanged {
        group_id: String,
        key: String,
        value: i64,
        version: u64,
    },
}

/// 关系链事件（只推送给关系链所属用户）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum FriendEvent {
    ApplicationAdded(Vec<FriendApplication>),
    ApplicationDeleted(Vec<String>),
    FriendAdded(Vec<FriendInfo>),
    FriendDeleted(Vec<String>),
    FriendInfoChanged(Vec<FriendInfo>),
    BlacklistAdded(Vec<String>),
    BlacklistDeleted(Vec<String>),
    FriendGroupCreated { name: String, user_ids: Vec<String> },
    FriendGroupDeleted(Vec<String>),
    FriendGroupRenamed { old_name: String, new_name: String },
    FriendsAddedToGroup { name: String, user_ids: Vec<String> },
    FriendsDeletedFromGroup { name: String, user_ids: Vec<String> },
}

impl ServerPush {
    /// 日志用的简短名称
    pub fn kind(&self) -> &'static str {
        match self {
            ServerPush::NewMessage { .. } => "NewMessage",
            ServerPush::MessageRevoked(_) => "MessageRevoked",
            ServerPush::MessageModified(_) => "MessageModified",
            ServerPush::MessageExtensionsChanged { .. } => "MessageExtensionsChanged",
            ServerPush::MessageExtensionsDeleted { .. } => "MessageExtensionsDeleted",
            ServerPush::C2CReadReceipt(_) => "C2CReadReceipt",
            ServerPush::MessageReadReceipts(_) => "MessageReadReceipts",
            ServerPush::Group(_) => "Group",
            ServerPush::Friend(_) => "Friend",
            ServerPush::KickedOffline => "KickedOffline",
            ServerPush::UserSigExpired => "UserSigExpired",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_frames_are_tagged_json() {
        let push = ServerPush::Group(GroupEvent::MemberLeft {
            group_id: "g1".into(),
            user_id: "bob".into(),
        });
        let json = serde_json::to_string(&push).unwrap();
        assert!(json.contains(r#""type":"Group""#));
        assert!(json.contains(r#""event":"MemberLeft""#));
        let back: ServerPush = serde_json::from_str(&json).unwrap();
        assert_eq!(back, push);

        let kicked: ServerPush = serde_json::from_str(r#"{"type":"KickedOffline"}"#).unwrap();
        assert_eq!(kicked, ServerPush::KickedOffline);
    }
}
