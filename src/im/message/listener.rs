//! 高级消息监听器

use crate::im::message::models::{C2CReadReceipt, Message, MessageExtension, MessageReceipt, MessageRevoked};
use async_trait::async_trait;

/// 消息事件回调
#[async_trait]
pub trait AdvancedMsgListener: Send + Sync {
    /// 收到新消息（包括自己在其他终端发出的消息）
    async fn on_recv_new_message(&self, _message: Message) {}

    /// 单聊对端把会话标记为已读
    async fn on_recv_c2c_read_receipt(&self, _receipt: C2CReadReceipt) {}

    /// 群消息已读回执更新
    async fn on_recv_message_read_receipts(&self, _receipts: Vec<MessageReceipt>) {}

    async fn on_recv_message_revoked(&self, _revoked: MessageRevoked) {}

    /// 消息被修改，参数为服务端最新版本
    async fn on_recv_message_modified(&self, _message: Message) {}

    async fn on_recv_message_extensions_changed(
        &self,
        _msg_id: String,
        _extensions: Vec<MessageExtension>,
    ) {
    }

    async fn on_recv_message_extensions_deleted(&self, _msg_id: String, _keys: Vec<String>) {}
}
