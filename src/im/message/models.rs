//! 消息模型定义

use crate::im::error::ImError;
use crate::im::message::types::MessageContent;
use crate::im::types::{c2c_conversation_id, group_conversation_id};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 消息状态
///
/// 只允许向前迁移：Created → Sending → {SendSucc, SendFail} → {Revoked, HasDeleted}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MessageStatus {
    /// 已创建未发送
    #[default]
    Created,
    Sending,
    SendSucc,
    SendFail,
    HasDeleted,
    Revoked,
}

impl MessageStatus {
    fn rank(self) -> u8 {
        match self {
            MessageStatus::Created => 0,
            MessageStatus::Sending => 1,
            MessageStatus::SendSucc | MessageStatus::SendFail => 2,
            MessageStatus::HasDeleted | MessageStatus::Revoked => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 3
    }

    /// 判断状态迁移是否合法
    pub fn can_transition_to(self, next: MessageStatus) -> bool {
        use MessageStatus::*;
        match (self, next) {
            (Created, Sending) => true,
            (Sending, SendSucc) | (Sending, SendFail) => true,
            // 撤回只针对发送成功的消息，删除对失败消息也有效
            (SendSucc, Revoked) => true,
            (SendSucc, HasDeleted) | (SendFail, HasDeleted) => true,
            _ => false,
        }
    }

    /// 按规则迁移状态，非法迁移返回状态错误
    pub fn transition(&mut self, next: MessageStatus) -> Result<(), ImError> {
        if !self.can_transition_to(next) {
            return Err(ImError::new(
                crate::im::error::err_code::ERR_MSG_STATUS_INVALID,
                format!("消息状态不允许从 {:?} 变为 {:?}", self, next),
            ));
        }
        *self = next;
        Ok(())
    }
}

/// 消息优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MessagePriority {
    #[default]
    Default,
    High,
    Normal,
    Low,
}

/// 消息扩展项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageExtension {
    pub key: String,
    pub value: String,
    /// 服务端版本号，客户端写入时携带已知版本（0 表示该 key 尚不存在）
    #[serde(default)]
    pub version: u64,
}

/// 设置 / 删除扩展的单个 key 结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageExtensionResult {
    /// 0 表示成功，23001 表示冲突（`extension` 为当前最新值）
    pub result_code: i32,
    pub result_info: String,
    pub extension: MessageExtension,
}

/// 离线推送信息（只透传给服务端）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflinePushInfo {
    pub title: String,
    pub desc: String,
    pub ext: String,
    pub disable_push: bool,
}

/// 发送选项
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub priority: MessagePriority,
    /// 仅在线用户接收，不存储不计未读
    pub online_user_only: bool,
    pub need_read_receipt: bool,
    pub support_extension: bool,
    pub offline_push_info: Option<OfflinePushInfo>,
}

/// 消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// 客户端消息 ID（创建时生成，本地主键）
    #[serde(rename = "clientMsgID")]
    pub client_msg_id: String,
    /// 服务端消息 ID（发送成功后由服务端分配）
    #[serde(rename = "msgID", default)]
    pub msg_id: String,
    pub sender: String,
    /// 单聊接收者
    #[serde(default)]
    pub receiver: String,
    #[serde(rename = "groupID", default)]
    pub group_id: String,
    #[serde(rename = "conversationID", default)]
    pub conversation_id: String,
    #[serde(default)]
    pub seq: i64,
    /// 毫秒时间戳（发送成功后为服务端时间）
    #[serde(default)]
    pub timestamp: i64,
    /// 服务端分配的全局顺序号，用于会话排序
    #[serde(default)]
    pub order_key: u64,
    #[serde(default)]
    pub priority: MessagePriority,
    pub content: MessageContent,
    #[serde(default)]
    pub status: MessageStatus,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub need_read_receipt: bool,
    #[serde(default)]
    pub support_extension: bool,
    #[serde(default)]
    pub is_online_only: bool,
    /// 修改版本号，每次修改成功后加一
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub cloud_custom_data: String,
    #[serde(default)]
    pub local_custom_data: String,
    /// 消息扩展（key → 扩展项）
    #[serde(default)]
    pub extensions: BTreeMap<String, MessageExtension>,
    /// 转发来源（服务端消息 ID）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forwarded_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offline_push_info: Option<OfflinePushInfo>,
}

impl Message {
    /// 创建一条未发送的消息
    pub fn new(client_msg_id: String, sender: &str, content: MessageContent, now_ms: i64) -> Self {
        Self {
            client_msg_id,
            msg_id: String::new(),
            sender: sender.to_string(),
            receiver: String::new(),
            group_id: String::new(),
            conversation_id: String::new(),
            seq: 0,
            timestamp: now_ms,
            order_key: 0,
            priority: MessagePriority::Default,
            content,
            status: MessageStatus::Created,
            is_read: false,
            need_read_receipt: false,
            support_extension: false,
            is_online_only: false,
            version: 0,
            cloud_custom_data: String::new(),
            local_custom_data: String::new(),
            extensions: BTreeMap::new(),
            forwarded_from: None,
            offline_push_info: None,
        }
    }

    pub fn is_group(&self) -> bool {
        !self.group_id.is_empty()
    }

    /// 以 `viewer` 的视角计算会话 ID
    pub fn conversation_id_for(&self, viewer: &str) -> String {
        if self.is_group() {
            group_conversation_id(&self.group_id)
        } else if self.sender == viewer {
            c2c_conversation_id(&self.receiver)
        } else {
            c2c_conversation_id(&self.sender)
        }
    }

    /// 单聊对端 ID
    pub fn peer_for(&self, viewer: &str) -> &str {
        if self.sender == viewer {
            &self.receiver
        } else {
            &self.sender
        }
    }

    /// 历史分页游标：(时间戳, seq)
    pub fn cursor(&self) -> (i64, i64) {
        (self.timestamp, self.seq)
    }
}

/// 修改消息的完整结果：无论成功与否都带回服务端当前版本的消息
#[derive(Debug, Clone)]
pub struct CompleteResult {
    pub error: Option<ImError>,
    pub value: Message,
}

/// 消息已读回执
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageReceipt {
    #[serde(rename = "msgID")]
    pub msg_id: String,
    #[serde(rename = "conversationID", default)]
    pub conversation_id: String,
    /// 群消息已读人数
    #[serde(default)]
    pub read_count: u64,
    /// 群消息未读人数
    #[serde(default)]
    pub unread_count: u64,
    /// 单聊对端是否已读
    #[serde(default)]
    pub is_peer_read: bool,
    #[serde(default)]
    pub timestamp: i64,
}

/// 单聊会话已读通知（对端把整个会话标记为已读）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct C2CReadReceipt {
    #[serde(rename = "userID")]
    pub user_id: String,
    /// 该时间之前的消息均已读
    pub timestamp: i64,
}

/// 消息撤回通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRevoked {
    #[serde(rename = "msgID")]
    pub msg_id: String,
    #[serde(rename = "conversationID", default)]
    pub conversation_id: String,
    pub revoker: String,
    pub revoke_time: i64,
}

/// 单聊接收选项查询结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct C2CReceiveMessageOptInfo {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub opt: crate::im::types::ReceiveMessageOpt,
}

/// 历史消息拉取参数
#[derive(Debug, Clone, Default)]
pub struct HistoryMessageOption {
    pub conversation_id: String,
    pub count: usize,
    /// 从该消息之前开始拉取（不含），为空从最新开始
    pub last_message: Option<Message>,
    /// true 从服务端拉取，false 只查本地
    pub from_cloud: bool,
}
