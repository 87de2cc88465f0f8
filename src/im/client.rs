//! IM 客户端入口
//!
//! `ImClient` 持有进程上下文和各个管理器：
//! - init / uninit 管理本地数据库与上下文生命周期
//! - 登录成功后启动推送循环，把服务端推送路由到对应的管理器
//! - 登出、被踢或票据过期时停止推送循环并清空各管理器的内存状态

use crate::im::callback::{ImCallback, OpQueue};
use crate::im::clock::{Clock, SystemClock};
use crate::im::context::{ClientConfig, ImContext};
use crate::im::conversation::listener::ConversationListener;
use crate::im::conversation::ConversationManager;
use crate::im::db::create_sqlite_pool_with_migration;
use crate::im::error::{ImError, ImResult};
use crate::im::friend::listener::FriendshipListener;
use crate::im::friend::FriendshipManager;
use crate::im::group::listener::GroupListener;
use crate::im::group::GroupManager;
use crate::im::message::listener::AdvancedMsgListener;
use crate::im::message::MessageManager;
use crate::im::remote::{PushReceiver, RemoteService, ServerPush};
use crate::im::session::listener::SdkListener;
use crate::im::session::models::LoginStatus;
use crate::im::session::service::ForcedOffline;
use crate::im::session::SessionManager;
use crate::im::signaling::listener::SignalingListener;
use crate::im::signaling::SignalingManager;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// 各管理器的共享句柄，推送循环持有一份副本
#[derive(Clone)]
struct Managers {
    session: Arc<SessionManager>,
    conversation: Arc<ConversationManager>,
    message: Arc<MessageManager>,
    group: Arc<GroupManager>,
    friendship: Arc<FriendshipManager>,
    signaling: Arc<SignalingManager>,
}

impl Managers {
    fn new(ctx: &Arc<ImContext>) -> Self {
        let conversation = Arc::new(ConversationManager::new(ctx.clone()));
        let message = Arc::new(MessageManager::new(ctx.clone(), conversation.clone()));
        Self {
            session: Arc::new(SessionManager::new(ctx.clone())),
            signaling: SignalingManager::new(ctx.clone(), message.clone()),
            group: Arc::new(GroupManager::new(ctx.clone())),
            friendship: Arc::new(FriendshipManager::new(ctx.clone())),
            conversation,
            message,
        }
    }

    /// 清空登录期间的内存状态（本地库不动）
    fn reset(&self) {
        self.signaling.reset();
        self.message.reset();
        self.conversation.reset();
        self.group.reset();
    }

    /// 路由一条推送；返回 false 表示当前登录已失效，推送循环应退出
    async fn route(&self, epoch: u64, push: ServerPush) -> bool {
        let kind = push.kind();
        let result = match push {
            ServerPush::NewMessage { message, recv_opt } => {
                // 信令先驱动状态机；仅在线的信令不入库也不通知消息监听器
                let is_signal = self.signaling.handle_message(&message).await;
                if is_signal && message.is_online_only {
                    Ok(())
                } else {
                    self.message.on_new_message(message, recv_opt).await
                }
            }
            ServerPush::MessageRevoked(revoked) => self.message.on_revoked(revoked).await,
            ServerPush::MessageModified(message) => self.message.on_modified(message).await,
            ServerPush::MessageExtensionsChanged { msg_id, extensions } => {
                self.message.on_extensions_changed(msg_id, extensions).await
            }
            ServerPush::MessageExtensionsDeleted { msg_id, extensions } => {
                self.message.on_extensions_deleted(msg_id, extensions).await
            }
            ServerPush::C2CReadReceipt(receipt) => self.message.on_c2c_read_receipt(receipt).await,
            ServerPush::MessageReadReceipts(receipts) => {
                self.message.on_read_receipts(receipts).await
            }
            ServerPush::Group(event) => {
                self.group.handle_event(event).await;
                Ok(())
            }
            ServerPush::Friend(event) => {
                self.friendship.handle_event(event).await;
                Ok(())
            }
            ServerPush::KickedOffline => {
                return self.forced_offline(epoch, ForcedOffline::Kicked).await;
            }
            ServerPush::UserSigExpired => {
                return self.forced_offline(epoch, ForcedOffline::UserSigExpired).await;
            }
        };
        if let Err(e) = result {
            error!("[Client] 处理推送 {} 失败: {}", kind, e);
        }
        true
    }

    async fn forced_offline(&self, epoch: u64, reason: ForcedOffline) -> bool {
        if self.session.handle_forced_offline(epoch, reason).await {
            self.reset();
        }
        false
    }
}

pub struct ImClient {
    ctx: Arc<ImContext>,
    managers: Managers,
    queue: OpQueue,
    push_task: Mutex<Option<JoinHandle<()>>>,
}

impl ImClient {
    /// 初始化客户端：打开本地数据库并执行迁移（需在 tokio 运行时内调用）
    pub async fn init(config: ClientConfig, remote: Arc<dyn RemoteService>) -> ImResult<Self> {
        Self::init_with_clock(config, remote, Arc::new(SystemClock)).await
    }

    pub async fn init_with_clock(
        config: ClientConfig,
        remote: Arc<dyn RemoteService>,
        clock: Arc<dyn Clock>,
    ) -> ImResult<Self> {
        let pool = create_sqlite_pool_with_migration(&config.db_url, config.db_max_connections)
            .await
            .map_err(|e| ImError::internal(format!("初始化本地数据库失败: {}", e)))?;
        info!(
            "[Client] 🚀 初始化完成 (sdkAppID={}, db={})",
            config.sdk_app_id, config.db_url
        );
        let ctx = Arc::new(ImContext::new(config, remote, clock, pool));
        Ok(Self {
            managers: Managers::new(&ctx),
            ctx,
            queue: OpQueue::new(),
            push_task: Mutex::new(None),
        })
    }

    /// 反初始化：仍在登录时先登出，然后关闭本地数据库
    pub async fn uninit(self) {
        if self.ctx.login_status() == LoginStatus::Logged {
            if let Err(e) = self.logout().await {
                warn!("[Client] 反初始化时登出失败: {}", e);
            }
        }
        self.stop_push_loop();
        self.ctx.pool.close().await;
        info!("[Client] 已反初始化");
    }

    pub fn context(&self) -> &Arc<ImContext> {
        &self.ctx
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.managers.session
    }

    pub fn conversation(&self) -> &Arc<ConversationManager> {
        &self.managers.conversation
    }

    pub fn message(&self) -> &Arc<MessageManager> {
        &self.managers.message
    }

    pub fn group(&self) -> &Arc<GroupManager> {
        &self.managers.group
    }

    pub fn friendship(&self) -> &Arc<FriendshipManager> {
        &self.managers.friendship
    }

    pub fn signaling(&self) -> &Arc<SignalingManager> {
        &self.managers.signaling
    }

    // ---------- 监听器 ----------

    pub fn add_sdk_listener(&self, listener: Arc<dyn SdkListener>) {
        self.ctx.bus.sdk.add(listener);
    }

    pub fn remove_sdk_listener(&self, listener: &Arc<dyn SdkListener>) {
        self.ctx.bus.sdk.remove(listener);
    }

    pub fn add_advanced_msg_listener(&self, listener: Arc<dyn AdvancedMsgListener>) {
        self.ctx.bus.advanced_msg.add(listener);
    }

    pub fn remove_advanced_msg_listener(&self, listener: &Arc<dyn AdvancedMsgListener>) {
        self.ctx.bus.advanced_msg.remove(listener);
    }

    pub fn add_conversation_listener(&self, listener: Arc<dyn ConversationListener>) {
        self.ctx.bus.conversation.add(listener);
    }

    pub fn remove_conversation_listener(&self, listener: &Arc<dyn ConversationListener>) {
        self.ctx.bus.conversation.remove(listener);
    }

    pub fn add_group_listener(&self, listener: Arc<dyn GroupListener>) {
        self.ctx.bus.group.add(listener);
    }

    pub fn remove_group_listener(&self, listener: &Arc<dyn GroupListener>) {
        self.ctx.bus.group.remove(listener);
    }

    pub fn add_friendship_listener(&self, listener: Arc<dyn FriendshipListener>) {
        self.ctx.bus.friendship.add(listener);
    }

    pub fn remove_friendship_listener(&self, listener: &Arc<dyn FriendshipListener>) {
        self.ctx.bus.friendship.remove(listener);
    }

    pub fn add_signaling_listener(&self, listener: Arc<dyn SignalingListener>) {
        self.ctx.bus.signaling.add(listener);
    }

    pub fn remove_signaling_listener(&self, listener: &Arc<dyn SignalingListener>) {
        self.ctx.bus.signaling.remove(listener);
    }

    /// 回调风格的异步调用：立即返回，结果通过 `callback` 送达
    ///
    /// ```ignore
    /// let msg = client.message().clone();
    /// client.submit(async move { msg.mark_all_message_as_read().await }, callback);
    /// ```
    pub fn submit<T, F>(&self, op: F, callback: Arc<dyn ImCallback<T>>)
    where
        T: Send + 'static,
        F: Future<Output = ImResult<T>> + Send + 'static,
    {
        self.queue.submit(op, callback);
    }

    // ---------- 登录 ----------

    /// 登录并加载本地会话；同一用户重复登录直接成功
    pub async fn login(&self, user_id: &str, ticket: &str) -> ImResult<()> {
        let outcome = self.managers.session.login(user_id, ticket).await?;
        let Some(push_rx) = outcome.push_rx else {
            return Ok(());
        };

        if let Err(e) = self.managers.conversation.load(user_id).await {
            error!("[Client] 加载本地会话失败: {}", e);
            if let Err(e) = self.managers.session.logout().await {
                warn!("[Client] 回滚登录失败: {}", e);
            }
            self.managers.reset();
            return Err(e);
        }

        self.start_push_loop(outcome.epoch, push_rx);
        self.managers.session.notify_connected().await;
        Ok(())
    }

    /// 登出；登出进行中或未登录时返回错误且不影响当前状态
    pub async fn logout(&self) -> ImResult<()> {
        let result = self.managers.session.logout().await;
        if self.ctx.login_status() == LoginStatus::Unlogin {
            self.stop_push_loop();
            self.managers.reset();
        }
        result
    }

    fn start_push_loop(&self, epoch: u64, mut push_rx: PushReceiver) {
        let ctx = self.ctx.clone();
        let managers = self.managers.clone();
        let handle = tokio::spawn(async move {
            while let Some(push) = push_rx.recv().await {
                if !ctx.is_current(epoch) {
                    break;
                }
                debug!("[Client] 📥 推送: {}", push.kind());
                if !managers.route(epoch, push).await {
                    break;
                }
            }
            debug!("[Client] 推送循环退出 (epoch={})", epoch);
        });
        if let Some(old) = self.push_task.lock().replace(handle) {
            old.abort();
        }
    }

    fn stop_push_loop(&self) {
        if let Some(handle) = self.push_task.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for ImClient {
    fn drop(&mut self) {
        self.stop_push_loop();
    }
}
