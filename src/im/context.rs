//! 进程级上下文
//!
//! 所有管理器共享同一个 `ImContext`：配置、远端服务、时钟、登录态以及事件总线（各类监听器集合）。
//! 不使用全局单例，生命周期由 [`ImClient`](crate::im::client::ImClient) 的 init / uninit 管理。

use crate::im::clock::Clock;
use crate::im::conversation::listener::ConversationListener;
use crate::im::error::{ImError, ImResult};
use crate::im::friend::listener::FriendshipListener;
use crate::im::group::listener::GroupListener;
use crate::im::listener_set::ListenerSet;
use crate::im::message::listener::AdvancedMsgListener;
use crate::im::remote::{Caller, RemoteService};
use crate::im::session::listener::SdkListener;
use crate::im::session::models::{LoginStatus, SessionState};
use crate::im::signaling::listener::SignalingListener;
use parking_lot::RwLock;
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use std::time::Duration;

/// 客户端配置
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub sdk_app_id: u64,
    /// 本地数据库地址，例如 `sqlite://./im.db` 或 `sqlite::memory:`
    pub db_url: String,
    pub db_max_connections: u32,
    /// 消息撤回时间窗口
    pub revoke_window: Duration,
}

impl ClientConfig {
    pub fn new(sdk_app_id: u64, db_url: &str) -> Self {
        let max_connections = if db_url.contains(":memory:") { 1 } else { 5 };
        Self {
            sdk_app_id,
            db_url: db_url.to_string(),
            db_max_connections: max_connections,
            revoke_window: Duration::from_secs(120),
        }
    }
}

/// 事件总线：每类事件一个监听器集合
#[derive(Default)]
pub struct EventBus {
    pub sdk: ListenerSet<dyn SdkListener>,
    pub advanced_msg: ListenerSet<dyn AdvancedMsgListener>,
    pub conversation: ListenerSet<dyn ConversationListener>,
    pub group: ListenerSet<dyn GroupListener>,
    pub friendship: ListenerSet<dyn FriendshipListener>,
    pub signaling: ListenerSet<dyn SignalingListener>,
}

pub struct ImContext {
    pub config: ClientConfig,
    pub remote: Arc<dyn RemoteService>,
    pub clock: Arc<dyn Clock>,
    pub pool: Pool<Sqlite>,
    pub session: RwLock<SessionState>,
    pub bus: EventBus,
}

impl ImContext {
    pub fn new(
        config: ClientConfig,
        remote: Arc<dyn RemoteService>,
        clock: Arc<dyn Clock>,
        pool: Pool<Sqlite>,
    ) -> Self {
        Self {
            config,
            remote,
            clock,
            pool,
            session: RwLock::new(SessionState::default()),
            bus: EventBus::default(),
        }
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// 当前调用凭证；未登录或正在登出时返回未登录错误
    pub fn caller(&self) -> ImResult<Caller> {
        self.session.read().caller().ok_or_else(ImError::not_logged_in)
    }

    /// 当前登录用户
    pub fn login_user(&self) -> ImResult<String> {
        let session = self.session.read();
        if session.status == LoginStatus::Logged {
            Ok(session.user_id.clone())
        } else {
            Err(ImError::not_logged_in())
        }
    }

    pub fn login_status(&self) -> LoginStatus {
        self.session.read().status
    }

    /// `epoch` 对应的登录是否仍然有效
    pub fn is_current(&self, epoch: u64) -> bool {
        let session = self.session.read();
        session.status == LoginStatus::Logged && session.epoch == epoch
    }
}
