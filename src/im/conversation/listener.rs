//! 会话监听器回调接口

use crate::im::conversation::models::{Conversation, ConversationListFilter};
use async_trait::async_trait;

/// 会话监听器
#[async_trait]
pub trait ConversationListener: Send + Sync {
    /// 新会话
    async fn on_new_conversation(&self, _conversations: Vec<Conversation>) {}

    /// 会话变更
    async fn on_conversation_changed(&self, _conversations: Vec<Conversation>) {}

    async fn on_conversation_deleted(&self, _conversation_ids: Vec<String>) {}

    /// 总未读消息数变更（免打扰会话不计入）
    async fn on_total_unread_message_count_changed(&self, _total_unread_count: u64) {}

    /// 已订阅过滤条件下的未读数变更
    async fn on_unread_message_count_changed_by_filter(
        &self,
        _filter: ConversationListFilter,
        _total_unread_count: u64,
    ) {
    }

    async fn on_conversation_group_created(&self, _name: String, _conversations: Vec<Conversation>) {}

    async fn on_conversation_group_deleted(&self, _name: String) {}

    async fn on_conversation_group_name_changed(&self, _old_name: String, _new_name: String) {}

    async fn on_conversations_added_to_group(&self, _name: String, _conversations: Vec<Conversation>) {}

    async fn on_conversations_deleted_from_group(
        &self,
        _name: String,
        _conversations: Vec<Conversation>,
    ) {
    }
}
