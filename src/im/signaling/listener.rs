//! 信令监听器

use async_trait::async_trait;

/// 信令事件回调（默认空实现）
#[async_trait]
pub trait SignalingListener: Send + Sync {
    /// 收到新邀请，`group_id` 为空表示单聊邀请
    async fn on_received_new_invitation(
        &self,
        _invite_id: String,
        _inviter: String,
        _group_id: String,
        _invitee_list: Vec<String>,
        _data: String,
    ) {
    }

    async fn on_invitee_accepted(&self, _invite_id: String, _invitee: String, _data: String) {}

    async fn on_invitee_rejected(&self, _invite_id: String, _invitee: String, _data: String) {}

    /// 邀请者取消了邀请
    async fn on_invitation_cancelled(&self, _invite_id: String, _inviter: String, _data: String) {}

    /// 本地计时器到期，参数为超时的被邀请人
    async fn on_invitation_timeout(&self, _invite_id: String, _invitee_list: Vec<String>) {}

    async fn on_invitation_modified(&self, _invite_id: String, _data: String) {}
}
