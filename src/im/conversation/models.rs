//! 会话模型定义

use crate::im::types::{ConversationType, ReceiveMessageOpt};
use serde::{Deserialize, Serialize};

/// 会话自定义数据上限（字节）
pub const MAX_CONVERSATION_CUSTOM_DATA: usize = 256;
/// 批量删除会话的上限
pub const MAX_DELETE_CONVERSATION_LIST: usize = 100;

/// 会话标记位
pub mod mark_type {
    pub const STAR: u64 = 0x1;
    pub const UNREAD: u64 = 0x2;
    pub const FOLD: u64 = 0x4;
    pub const HIDE: u64 = 0x8;
}

/// 会话
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    #[serde(rename = "conversationID")]
    pub conversation_id: String,
    pub conversation_type: ConversationType,
    /// 单聊对端（群聊为空）
    #[serde(rename = "userID", default)]
    pub user_id: String,
    #[serde(rename = "groupID", default)]
    pub group_id: String,
    #[serde(default)]
    pub unread_count: u64,
    #[serde(default)]
    pub draft_text: Option<String>,
    #[serde(default)]
    pub draft_time: i64,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub recv_opt: ReceiveMessageOpt,
    #[serde(
        serialize_with = "crate::im::serialization::serialize_base64",
        deserialize_with = "crate::im::serialization::deserialize_base64",
        default
    )]
    pub custom_data: Vec<u8>,
    /// 排序键（取最后一条消息的服务端顺序号）
    #[serde(default)]
    pub order_key: u64,
    /// 最后一条消息的客户端 ID（只做查找引用）
    #[serde(default)]
    pub last_message_id: Option<String>,
    #[serde(default)]
    pub last_message_time: i64,
    #[serde(default)]
    pub mark_list: u64,
    /// 所属的会话分组
    #[serde(
        default,
        deserialize_with = "crate::im::serialization::deserialize_vec_or_null"
    )]
    pub conversation_groups: Vec<String>,
}

impl Conversation {
    pub fn new(conversation_id: String, conversation_type: ConversationType, peer: &str) -> Self {
        let (user_id, group_id) = match conversation_type {
            ConversationType::C2C => (peer.to_string(), String::new()),
            ConversationType::Group => (String::new(), peer.to_string()),
        };
        Self {
            conversation_id,
            conversation_type,
            user_id,
            group_id,
            unread_count: 0,
            draft_text: None,
            draft_time: 0,
            is_pinned: false,
            recv_opt: ReceiveMessageOpt::Receive,
            custom_data: Vec::new(),
            order_key: 0,
            last_message_id: None,
            last_message_time: 0,
            mark_list: 0,
            conversation_groups: Vec::new(),
        }
    }

    /// 计入总未读数的部分（免打扰会话不计入）
    pub fn unread_contribution(&self) -> u64 {
        if self.recv_opt.is_muted() {
            0
        } else {
            self.unread_count
        }
    }

    pub fn has_mark(&self, mark: u64) -> bool {
        mark != 0 && self.mark_list & mark == mark
    }
}

/// 会话过滤条件
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationListFilter {
    pub conversation_type: Option<ConversationType>,
    pub conversation_group: Option<String>,
    /// 需要同时具备的标记位，0 表示不过滤
    #[serde(default)]
    pub mark_type: u64,
    /// 只返回有未读的会话
    #[serde(default)]
    pub has_unread_count: bool,
}

impl ConversationListFilter {
    pub fn matches(&self, conv: &Conversation) -> bool {
        if let Some(t) = self.conversation_type {
            if conv.conversation_type != t {
                return false;
            }
        }
        if let Some(group) = &self.conversation_group {
            if !conv.conversation_groups.iter().any(|g| g == group) {
                return false;
            }
        }
        if self.mark_type != 0 && !conv.has_mark(self.mark_type) {
            return false;
        }
        if self.has_unread_count && conv.unread_count == 0 {
            return false;
        }
        true
    }
}

/// 分页结果；`next_seq` 为 0 表示已到末尾
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationListResult {
    pub conversation_list: Vec<Conversation>,
    pub next_seq: u64,
    pub is_finished: bool,
}

/// 会话批量操作的单条结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationOperationResult {
    #[serde(rename = "conversationID")]
    pub conversation_id: String,
    pub result_code: i32,
    #[serde(default)]
    pub result_info: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn muted_conversations_do_not_contribute() {
        let mut conv = Conversation::new("c2c_bob".into(), ConversationType::C2C, "bob");
        conv.unread_count = 5;
        assert_eq!(conv.unread_contribution(), 5);
        conv.recv_opt = ReceiveMessageOpt::NotNotify;
        assert_eq!(conv.unread_contribution(), 0);
    }

    #[test]
    fn filter_combines_conditions() {
        let mut conv = Conversation::new("group_g1".into(), ConversationType::Group, "g1");
        conv.conversation_groups = vec!["work".into()];
        conv.mark_list = mark_type::STAR | mark_type::FOLD;

        let mut filter = ConversationListFilter {
            conversation_type: Some(ConversationType::Group),
            conversation_group: Some("work".into()),
            mark_type: mark_type::STAR,
            has_unread_count: false,
        };
        assert!(filter.matches(&conv));

        filter.has_unread_count = true;
        assert!(!filter.matches(&conv));
        conv.unread_count = 1;
        assert!(filter.matches(&conv));

        filter.mark_type = mark_type::HIDE;
        assert!(!filter.matches(&conv));
    }
}
