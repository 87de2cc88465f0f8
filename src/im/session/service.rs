//! 登录 / 登出与连接生命周期
//!
//! 状态迁移：Unlogin → Logging → Logged → Unlogin。登出在第一次 await 之前同步置位
//! `logging_out`，登出完成前的任何登录请求都会确定性地失败。

use crate::im::context::ImContext;
use crate::im::error::{err_code, ImError, ImResult};
use crate::im::remote::PushReceiver;
use crate::im::session::models::LoginStatus;
use std::sync::Arc;
use tracing::{info, warn};

/// 登录结果：新建连接时带回推送通道
pub struct LoginOutcome {
    pub epoch: u64,
    /// 已经以同一用户登录时为空
    pub push_rx: Option<PushReceiver>,
}

/// 服务端强制下线的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForcedOffline {
    Kicked,
    UserSigExpired,
}

pub struct SessionManager {
    ctx: Arc<ImContext>,
}

impl SessionManager {
    pub fn new(ctx: Arc<ImContext>) -> Self {
        Self { ctx }
    }

    pub async fn login(&self, user_id: &str, ticket: &str) -> ImResult<LoginOutcome> {
        if user_id.is_empty() || ticket.is_empty() {
            return Err(ImError::invalid_param("userID 和票据不能为空"));
        }
        {
            let mut session = self.ctx.session.write();
            if session.logging_out {
                return Err(ImError::new(
                    err_code::ERR_LOGOUT_IN_PROGRESS,
                    "登出尚未完成，不能登录",
                ));
            }
            match session.status {
                LoginStatus::Logging => {
                    return Err(ImError::new(
                        err_code::ERR_LOGIN_IN_PROGRESS,
                        "正在登录中",
                    ))
                }
                LoginStatus::Logged if session.user_id == user_id => {
                    info!("[Session] 用户 {} 已登录，忽略重复登录", user_id);
                    return Ok(LoginOutcome {
                        epoch: session.epoch,
                        push_rx: None,
                    });
                }
                LoginStatus::Logged => {
                    return Err(ImError::new(
                        err_code::ERR_ALREADY_LOGGED_IN_OTHER_USER,
                        format!("已登录用户 {}，请先登出", session.user_id),
                    ))
                }
                LoginStatus::Unlogin => {
                    session.status = LoginStatus::Logging;
                    session.sdk_app_id = self.ctx.config.sdk_app_id;
                    session.user_id = user_id.to_string();
                    session.ticket = ticket.to_string();
                }
            }
        }

        info!("[Session] 🔐 开始登录: {}", user_id);
        for l in self.ctx.bus.sdk.snapshot() {
            l.on_connecting().await;
        }

        match self.ctx.remote.login(user_id, ticket).await {
            Ok(ack) => {
                let epoch = {
                    let mut session = self.ctx.session.write();
                    session.status = LoginStatus::Logged;
                    session.token = ack.token;
                    session.connection_id = ack.connection_id;
                    session.epoch += 1;
                    session.epoch
                };
                info!(
                    "[Session] ✅ 登录成功: {} (appID={}, connection={}, serverTime={})",
                    user_id, self.ctx.config.sdk_app_id, ack.connection_id, ack.server_time
                );
                Ok(LoginOutcome {
                    epoch,
                    push_rx: Some(ack.push_rx),
                })
            }
            Err(e) => {
                warn!("[Session] ❌ 登录失败: {} {}", user_id, e);
                self.ctx.session.write().reset();
                for l in self.ctx.bus.sdk.snapshot() {
                    l.on_connect_failed(e.code, e.msg.clone()).await;
                }
                Err(e)
            }
        }
    }

    /// 登录成功且本地数据加载完成后通知监听器
    pub async fn notify_connected(&self) {
        for l in self.ctx.bus.sdk.snapshot() {
            l.on_connect_success().await;
        }
    }

    /// 登出；无论服务端是否成功，本地登录态都会被清除
    pub async fn logout(&self) -> ImResult<()> {
        let caller = {
            let mut session = self.ctx.session.write();
            if session.logging_out {
                return Err(ImError::new(
                    err_code::ERR_LOGOUT_IN_PROGRESS,
                    "登出进行中",
                ));
            }
            if session.status == LoginStatus::Logging {
                return Err(ImError::new(
                    err_code::ERR_LOGIN_IN_PROGRESS,
                    "正在登录中，不能登出",
                ));
            }
            let caller = session.caller().ok_or_else(ImError::not_logged_in)?;
            session.logging_out = true;
            caller
        };

        info!("[Session] 👋 开始登出: {}", caller.user_id);
        let result = self.ctx.remote.logout(&caller).await;
        self.ctx.session.write().reset();
        match &result {
            Ok(()) => info!("[Session] ✅ 登出完成: {}", caller.user_id),
            Err(e) => warn!("[Session] 服务端登出失败，本地已清除登录态: {}", e),
        }
        result
    }

    /// 处理服务端的强制下线；`epoch` 不是当前登录时忽略（旧连接的迟到推送）
    pub async fn handle_forced_offline(&self, epoch: u64, reason: ForcedOffline) -> bool {
        {
            let mut session = self.ctx.session.write();
            if session.epoch != epoch || session.status != LoginStatus::Logged {
                return false;
            }
            warn!("[Session] ⚠️ {} 被强制下线: {:?}", session.user_id, reason);
            session.reset();
        }
        for l in self.ctx.bus.sdk.snapshot() {
            match reason {
                ForcedOffline::Kicked => l.on_kicked_offline().await,
                ForcedOffline::UserSigExpired => l.on_user_sig_expired().await,
            }
        }
        true
    }

    pub fn get_login_user(&self) -> Option<String> {
        self.ctx.login_user().ok()
    }

    pub fn get_login_status(&self) -> LoginStatus {
        self.ctx.login_status()
    }

    /// 当前登录所属的应用 ID，未登录时为空
    pub fn get_sdk_app_id(&self) -> Option<u64> {
        let session = self.ctx.session.read();
        (session.status == LoginStatus::Logged).then_some(session.sdk_app_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::im::error::ErrorKind;
    use crate::im::session::listener::SdkListener;
    use crate::im::testing::{recv_event, TestEnv};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct SdkRecorder {
        tx: mpsc::UnboundedSender<&'static str>,
    }

    #[async_trait]
    impl SdkListener for SdkRecorder {
        async fn on_connecting(&self) {
            let _ = self.tx.send("connecting");
        }
        async fn on_connect_failed(&self, _code: i32, _msg: String) {
            let _ = self.tx.send("failed");
        }
        async fn on_kicked_offline(&self) {
            let _ = self.tx.send("kicked");
        }
        async fn on_user_sig_expired(&self) {
            let _ = self.tx.send("expired");
        }
    }

    #[tokio::test]
    async fn invalid_ticket_fails_with_auth_error() {
        let env = TestEnv::new();
        let client = env.client().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        client.add_sdk_listener(Arc::new(SdkRecorder { tx }));

        let err = client.login("alice", "forged").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Auth);
        assert_eq!(recv_event(&mut rx).await, "connecting");
        assert_eq!(recv_event(&mut rx).await, "failed");
        assert_eq!(client.session().get_login_status(), LoginStatus::Unlogin);
    }

    #[tokio::test]
    async fn session_carries_app_id_while_logged_in() {
        let env = TestEnv::new();
        let client = env.client().await;
        assert_eq!(client.session().get_sdk_app_id(), None);

        let ticket = env.server.issue_ticket("alice", Duration::from_secs(60));
        client.login("alice", &ticket).await.unwrap();
        assert_eq!(client.session().get_sdk_app_id(), Some(1_400_000_000));

        client.logout().await.unwrap();
        assert_eq!(client.session().get_sdk_app_id(), None);
        assert_eq!(client.session().ctx.session.read().sdk_app_id, 0);
    }

    #[tokio::test]
    async fn relogin_rules() {
        let env = TestEnv::new();
        let client = env.login("alice").await;
        assert_eq!(client.session().get_login_user().as_deref(), Some("alice"));

        // 同一用户重复登录直接成功
        let ticket = env.server.issue_ticket("alice", Duration::from_secs(60));
        client.login("alice", &ticket).await.unwrap();

        let ticket = env.server.issue_ticket("bob", Duration::from_secs(60));
        let err = client.login("bob", &ticket).await.unwrap_err();
        assert_eq!(err.code, err_code::ERR_ALREADY_LOGGED_IN_OTHER_USER);
        assert_eq!(err.kind, ErrorKind::State);
    }

    #[tokio::test]
    async fn login_during_logout_fails_deterministically() {
        let env = TestEnv::new();
        let client = env.login("alice").await;
        env.server.set_latency(Duration::from_millis(50));

        let ticket = env.server.issue_ticket("alice", Duration::from_secs(60));
        let (logout, login) = tokio::join!(client.logout(), async {
            tokio::task::yield_now().await;
            client.login("alice", &ticket).await
        });
        logout.unwrap();
        assert_eq!(login.unwrap_err().code, err_code::ERR_LOGOUT_IN_PROGRESS);
        assert_eq!(client.session().get_login_status(), LoginStatus::Unlogin);

        // 登出完成后可以重新登录
        client.login("alice", &ticket).await.unwrap();
        assert_eq!(client.session().get_login_status(), LoginStatus::Logged);
    }

    #[tokio::test]
    async fn kick_and_expiry_arrive_through_listener() {
        let env = TestEnv::new();
        let client = env.login("alice").await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        client.add_sdk_listener(Arc::new(SdkRecorder { tx }));

        assert_eq!(env.server.kick_user("alice"), 1);
        assert_eq!(recv_event(&mut rx).await, "kicked");
        assert_eq!(client.session().get_login_status(), LoginStatus::Unlogin);

        let ticket = env.server.issue_ticket("alice", Duration::from_secs(60));
        client.login("alice", &ticket).await.unwrap();
        assert_eq!(recv_event(&mut rx).await, "connecting");
        env.server.expire_user_sig("alice");
        assert_eq!(recv_event(&mut rx).await, "expired");
        assert!(client.session().get_login_user().is_none());
    }
}
