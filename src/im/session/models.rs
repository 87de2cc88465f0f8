//! 会话（登录态）模型定义

use crate::im::remote::Caller;
use serde::{Deserialize, Serialize};

/// 登录状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LoginStatus {
    #[default]
    Unlogin,
    Logging,
    Logged,
}

/// 当前登录态
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub status: LoginStatus,
    /// 本次登录所属的应用 ID，未登录时为 0
    pub sdk_app_id: u64,
    pub user_id: String,
    pub ticket: String,
    /// 服务端下发的连接凭证
    pub token: String,
    pub connection_id: u64,
    /// 登出进行中（在第一次 await 之前同步置位）
    pub logging_out: bool,
    /// 每次成功登录递增，用于丢弃旧连接迟到的推送
    pub epoch: u64,
}

impl SessionState {
    pub fn caller(&self) -> Option<Caller> {
        (self.status == LoginStatus::Logged && !self.logging_out).then(|| Caller {
            user_id: self.user_id.clone(),
            token: self.token.clone(),
            connection_id: self.connection_id,
        })
    }

    pub fn reset(&mut self) {
        let epoch = self.epoch;
        *self = SessionState::default();
        self.epoch = epoch;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_clears_identity_but_keeps_epoch() {
        let mut state = SessionState {
            status: LoginStatus::Logged,
            sdk_app_id: 42,
            user_id: "alice".into(),
            epoch: 3,
            ..Default::default()
        };
        assert_eq!(state.caller().map(|c| c.user_id).as_deref(), Some("alice"));

        state.reset();
        assert_eq!(state.sdk_app_id, 0);
        assert!(state.user_id.is_empty());
        assert_eq!(state.epoch, 3);
        assert!(state.caller().is_none());
    }
}
