//! 进程内服务端
//!
//! 完整实现服务端的权威逻辑（票据校验、消息中继、群组权限矩阵、关系链等），
//! 供测试与命令行示例使用。多个客户端共享同一个 `MemoryServer` 即可互相通信。

mod friend;
mod group;
mod message;

use crate::im::clock::Clock;
use crate::im::error::{err_code, ImError, ImResult};
use crate::im::friend::models::{
    AllowType, FriendAddApplication, FriendApplication, FriendApplicationType, FriendCheckResult,
    FriendGroup, FriendInfo, FriendInfoResult, FriendOperationResult, FriendResponseType,
    FriendType,
};
use crate::im::group::models::{
    CreateGroupParam, GroupApplication, GroupAttributeWrite, GroupAttributes, GroupCounters,
    GroupInfo, GroupInfoPatch, GroupInfoResult, GroupMemberFilter, GroupMemberInfo,
    GroupMemberOperationResult, GroupMemberPage, GroupMemberRole, JoinGroupResult,
};
use crate::im::message::models::{
    Message, MessageExtension, MessageExtensionResult, MessageReceipt, MessageRevoked,
};
use crate::im::remote::push::{PushSender, ServerPush};
use crate::im::remote::{
    Caller, LoginAck, ModifyMessageAck, ReceiveOptEntry, RemoteService, SendMessageAck,
};
use crate::im::types::ReceiveMessageOpt;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// 默认撤回时间窗口（2 分钟）
pub const DEFAULT_REVOKE_WINDOW_MS: i64 = 2 * 60 * 1000;

struct TicketInfo {
    user_id: String,
    expire_at: i64,
}

struct Connection {
    user_id: String,
    token: String,
    ticket_expire_at: i64,
    tx: PushSender,
}

/// 在线连接与推送分发
#[derive(Default)]
pub(super) struct Hub {
    connections: HashMap<u64, Connection>,
    next_connection_id: u64,
}

impl Hub {
    /// 推送给用户的所有在线终端
    pub(super) fn push(&self, user_id: &str, push: ServerPush) {
        self.push_except(user_id, 0, push);
    }

    /// 推送给用户除 `except_connection` 以外的终端
    pub(super) fn push_except(&self, user_id: &str, except_connection: u64, push: ServerPush) {
        for (id, conn) in &self.connections {
            if conn.user_id == user_id && *id != except_connection {
                if conn.tx.send(push.clone()).is_err() {
                    debug!("[MemoryServer] 连接 {} 推送通道已关闭", id);
                }
            }
        }
    }

    pub(super) fn is_online(&self, user_id: &str) -> bool {
        self.connections.values().any(|c| c.user_id == user_id)
    }

    fn drop_user(&mut self, user_id: &str, push: Option<ServerPush>) -> usize {
        let ids: Vec<u64> = self
            .connections
            .iter()
            .filter(|(_, c)| c.user_id == user_id)
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            if let Some(conn) = self.connections.remove(id) {
                if let Some(push) = &push {
                    let _ = conn.tx.send(push.clone());
                }
            }
        }
        ids.len()
    }
}

/// ID 与顺序号生成
#[derive(Default)]
pub(super) struct IdGen {
    next_id: u64,
    next_order_key: u64,
}

impl IdGen {
    pub(super) fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub(super) fn next_order_key(&mut self) -> u64 {
        self.next_order_key += 1;
        self.next_order_key
    }
}

pub(super) struct ServerState {
    tickets: HashMap<String, TicketInfo>,
    pub(super) hub: Hub,
    pub(super) ids: IdGen,
    pub(super) revoke_window_ms: i64,
    pub(super) messages: message::MessageStore,
    pub(super) groups: group::GroupStore,
    pub(super) friends: friend::FriendStore,
    /// (用户, 会话 ID) → 接收选项
    pub(super) recv_opts: HashMap<(String, String), ReceiveMessageOpt>,
}

impl ServerState {
    fn new() -> Self {
        Self {
            tickets: HashMap::new(),
            hub: Hub::default(),
            ids: IdGen::default(),
            revoke_window_ms: DEFAULT_REVOKE_WINDOW_MS,
            messages: message::MessageStore::default(),
            groups: group::GroupStore::default(),
            friends: friend::FriendStore::default(),
            recv_opts: HashMap::new(),
        }
    }

    pub(super) fn recv_opt(&self, user_id: &str, conversation_id: &str) -> ReceiveMessageOpt {
        self.recv_opts
            .get(&(user_id.to_string(), conversation_id.to_string()))
            .copied()
            .unwrap_or_default()
    }

    /// 校验调用者凭证；票据过期时断开连接并推送过期通知
    fn authorize(&mut self, caller: &Caller, now: i64) -> ImResult<()> {
        let Some(conn) = self.hub.connections.get(&caller.connection_id) else {
            return Err(ImError::new(err_code::ERR_USER_SIG_INVALID, "连接不存在或已下线"));
        };
        if conn.token != caller.token || conn.user_id != caller.user_id {
            return Err(ImError::new(err_code::ERR_USER_SIG_INVALID, "连接凭证无效"));
        }
        if conn.ticket_expire_at <= now {
            if let Some(conn) = self.hub.connections.remove(&caller.connection_id) {
                warn!("[MemoryServer] ⏰ 用户 {} 票据已过期，断开连接", conn.user_id);
                let _ = conn.tx.send(ServerPush::UserSigExpired);
            }
            return Err(ImError::new(err_code::ERR_USER_SIG_EXPIRED, "票据已过期"));
        }
        Ok(())
    }

    fn login(&mut self, user_id: &str, ticket: &str, now: i64) -> ImResult<LoginAck> {
        let Some(info) = self.tickets.get(ticket) else {
            return Err(ImError::new(err_code::ERR_USER_SIG_INVALID, "票据无效"));
        };
        if info.user_id != user_id {
            return Err(ImError::new(err_code::ERR_USER_SIG_INVALID, "票据与用户不匹配"));
        }
        if info.expire_at <= now {
            return Err(ImError::new(err_code::ERR_USER_SIG_EXPIRED, "票据已过期"));
        }
        let expire_at = info.expire_at;
        self.hub.next_connection_id += 1;
        let connection_id = self.hub.next_connection_id;
        let token = uuid::Uuid::new_v4().to_string();
        let (tx, push_rx) = mpsc::unbounded_channel();
        self.hub.connections.insert(
            connection_id,
            Connection {
                user_id: user_id.to_string(),
                token: token.clone(),
                ticket_expire_at: expire_at,
                tx,
            },
        );
        info!(
            "[MemoryServer] ✅ 用户 {} 登录成功, connection={}",
            user_id, connection_id
        );
        Ok(LoginAck {
            token,
            connection_id,
            server_time: now,
            push_rx,
        })
    }
}

/// 进程内服务端
pub struct MemoryServer {
    clock: Arc<dyn Clock>,
    latency: Mutex<Duration>,
    state: Mutex<ServerState>,
}

impl MemoryServer {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            latency: Mutex::new(Duration::ZERO),
            state: Mutex::new(ServerState::new()),
        }
    }

    /// 模拟网络往返耗时
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub fn set_revoke_window(&self, window: Duration) {
        self.state.lock().revoke_window_ms = window.as_millis() as i64;
    }

    /// 签发登录票据
    pub fn issue_ticket(&self, user_id: &str, ttl: Duration) -> String {
        let ticket = format!("ticket-{}-{}", user_id, uuid::Uuid::new_v4().simple());
        let expire_at = self.clock.now_ms() + ttl.as_millis() as i64;
        self.state.lock().tickets.insert(
            ticket.clone(),
            TicketInfo {
                user_id: user_id.to_string(),
                expire_at,
            },
        );
        ticket
    }

    /// 踢掉用户的所有在线终端
    pub fn kick_user(&self, user_id: &str) -> usize {
        let n = self
            .state
            .lock()
            .hub
            .drop_user(user_id, Some(ServerPush::KickedOffline));
        info!("[MemoryServer] 👢 踢下线 {}，断开 {} 个连接", user_id, n);
        n
    }

    /// 让用户的票据立即失效并通知其所有在线终端
    pub fn expire_user_sig(&self, user_id: &str) -> usize {
        let mut st = self.state.lock();
        st.tickets.retain(|_, t| t.user_id != user_id);
        let n = st.hub.drop_user(user_id, Some(ServerPush::UserSigExpired));
        info!("[MemoryServer] ⏰ 用户 {} 票据失效，断开 {} 个连接", user_id, n);
        n
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.state.lock().hub.is_online(user_id)
    }

    async fn delay(&self) {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    /// 鉴权后在服务端状态上执行一次调用
    async fn with_state<T, F>(&self, caller: &Caller, f: F) -> ImResult<T>
    where
        F: FnOnce(&mut ServerState, &Caller, i64) -> ImResult<T> + Send,
    {
        self.delay().await;
        let now = self.clock.now_ms();
        let mut st = self.state.lock();
        st.authorize(caller, now)?;
        f(&mut st, caller, now)
    }
}

#[async_trait]
impl RemoteService for MemoryServer {
    async fn login(&self, user_id: &str, ticket: &str) -> ImResult<LoginAck> {
        self.delay().await;
        let now = self.clock.now_ms();
        self.state.lock().login(user_id, ticket, now)
    }

    async fn logout(&self, caller: &Caller) -> ImResult<()> {
        self.delay().await;
        let mut st = self.state.lock();
        match st.hub.connections.get(&caller.connection_id) {
            Some(conn) if conn.token == caller.token => {
                st.hub.connections.remove(&caller.connection_id);
                info!(
                    "[MemoryServer] 👋 用户 {} 登出, connection={}",
                    caller.user_id, caller.connection_id
                );
            }
            _ => debug!("[MemoryServer] 登出时连接已不存在: {}", caller.connection_id),
        }
        Ok(())
    }

    // ---------- 消息 ----------

    async fn send_message(&self, caller: &Caller, message: &Message) -> ImResult<SendMessageAck> {
        self.with_state(caller, |st, c, now| st.send_message(c, message, now))
            .await
    }

    async fn get_history_messages(
        &self,
        caller: &Caller,
        conversation_id: &str,
        before: Option<(i64, i64)>,
        count: usize,
    ) -> ImResult<Vec<Message>> {
        self.with_state(caller, |st, c, _| {
            st.get_history_messages(c, conversation_id, before, count)
        })
        .await
    }

    async fn find_messages(&self, caller: &Caller, msg_ids: &[String]) -> ImResult<Vec<Message>> {
        self.with_state(caller, |st, c, _| Ok(st.find_messages(c, msg_ids)))
            .await
    }

    async fn revoke_message(&self, caller: &Caller, msg_id: &str) -> ImResult<MessageRevoked> {
        self.with_state(caller, |st, c, now| st.revoke_message(c, msg_id, now))
            .await
    }

    async fn modify_message(
        &self,
        caller: &Caller,
        message: &Message,
    ) -> ImResult<ModifyMessageAck> {
        self.with_state(caller, |st, c, _| st.modify_message(c, message))
            .await
    }

    async fn delete_messages(
        &self,
        caller: &Caller,
        conversation_id: &str,
        msg_ids: &[String],
    ) -> ImResult<()> {
        self.with_state(caller, |st, c, _| {
            st.delete_messages(c, conversation_id, msg_ids)
        })
        .await
    }

    async fn clear_history(&self, caller: &Caller, conversation_id: &str) -> ImResult<()> {
        self.with_state(caller, |st, c, _| st.clear_history(c, conversation_id))
            .await
    }

    async fn mark_conversation_read(
        &self,
        caller: &Caller,
        conversation_id: &str,
    ) -> ImResult<()> {
        self.with_state(caller, |st, c, now| {
            st.mark_conversation_read(c, conversation_id, now)
        })
        .await
    }

    async fn send_read_receipts(&self, caller: &Caller, msg_ids: &[String]) -> ImResult<()> {
        self.with_state(caller, |st, c, now| st.send_read_receipts(c, msg_ids, now))
            .await
    }

    async fn get_read_receipts(
        &self,
        caller: &Caller,
        msg_ids: &[String],
    ) -> ImResult<Vec<MessageReceipt>> {
        self.with_state(caller, |st, c, _| st.get_read_receipts(c, msg_ids))
            .await
    }

    async fn set_message_extensions(
        &self,
        caller: &Caller,
        msg_id: &str,
        extensions: &[MessageExtension],
    ) -> ImResult<Vec<MessageExtensionResult>> {
        self.with_state(caller, |st, c, _| {
            st.set_message_extensions(c, msg_id, extensions)
        })
        .await
    }

    async fn get_message_extensions(
        &self,
        caller: &Caller,
        msg_id: &str,
    ) -> ImResult<Vec<MessageExtension>> {
        self.with_state(caller, |st, c, _| st.get_message_extensions(c, msg_id))
            .await
    }

    async fn delete_message_extensions(
        &self,
        caller: &Caller,
        msg_id: &str,
        keys: &[String],
    ) -> ImResult<Vec<MessageExtensionResult>> {
        self.with_state(caller, |st, c, _| {
            st.delete_message_extensions(c, msg_id, keys)
        })
        .await
    }

    async fn set_receive_message_opt(
        &self,
        caller: &Caller,
        conversation_ids: &[String],
        opt: ReceiveMessageOpt,
    ) -> ImResult<()> {
        self.with_state(caller, |st, c, _| {
            for id in conversation_ids {
                if crate::im::types::parse_conversation_id(id).is_none() {
                    return Err(ImError::invalid_param(format!("非法会话 ID: {id}")));
                }
            }
            for id in conversation_ids {
                st.recv_opts.insert((c.user_id.clone(), id.clone()), opt);
            }
            Ok(())
        })
        .await
    }

    async fn get_receive_message_opt(
        &self,
        caller: &Caller,
        conversation_ids: &[String],
    ) -> ImResult<Vec<ReceiveOptEntry>> {
        self.with_state(caller, |st, c, _| {
            Ok(conversation_ids
                .iter()
                .map(|id| ReceiveOptEntry {
                    conversation_id: id.clone(),
                    opt: st.recv_opt(&c.user_id, id),
                })
                .collect())
        })
        .await
    }

    // ---------- 群组 ----------

    async fn create_group(&self, caller: &Caller, param: &CreateGroupParam) -> ImResult<String> {
        self.with_state(caller, |st, c, now| st.create_group(c, param, now))
            .await
    }

    async fn dismiss_group(&self, caller: &Caller, group_id: &str) -> ImResult<()> {
        self.with_state(caller, |st, c, _| st.dismiss_group(c, group_id))
            .await
    }

    async fn join_group(
        &self,
        caller: &Caller,
        group_id: &str,
        request_msg: &str,
    ) -> ImResult<JoinGroupResult> {
        self.with_state(caller, |st, c, now| {
            st.join_group(c, group_id, request_msg, now)
        })
        .await
    }

    async fn quit_group(&self, caller: &Caller, group_id: &str) -> ImResult<()> {
        self.with_state(caller, |st, c, _| st.quit_group(c, group_id))
            .await
    }

    async fn get_joined_group_list(&self, caller: &Caller) -> ImResult<Vec<GroupInfo>> {
        self.with_state(caller, |st, c, _| Ok(st.get_joined_group_list(c)))
            .await
    }

    async fn get_groups_info(
        &self,
        caller: &Caller,
        group_ids: &[String],
    ) -> ImResult<Vec<GroupInfoResult>> {
        self.with_state(caller, |st, c, _| Ok(st.get_groups_info(c, group_ids)))
            .await
    }

    async fn set_group_info(&self, caller: &Caller, patch: &GroupInfoPatch) -> ImResult<()> {
        self.with_state(caller, |st, c, _| st.set_group_info(c, patch))
            .await
    }

    async fn get_group_member_list(
        &self,
        caller: &Caller,
        group_id: &str,
        filter: GroupMemberFilter,
        next_seq: u64,
        count: usize,
    ) -> ImResult<GroupMemberPage> {
        self.with_state(caller, |st, c, _| {
            st.get_group_member_list(c, group_id, filter, next_seq, count)
        })
        .await
    }

    async fn get_group_members_info(
        &self,
        caller: &Caller,
        group_id: &str,
        user_ids: &[String],
    ) -> ImResult<Vec<GroupMemberInfo>> {
        self.with_state(caller, |st, c, _| {
            st.get_group_members_info(c, group_id, user_ids)
        })
        .await
    }

    async fn set_group_member_info(
        &self,
        caller: &Caller,
        group_id: &str,
        user_id: &str,
        name_card: &str,
    ) -> ImResult<()> {
        self.with_state(caller, |st, c, _| {
            st.set_group_member_info(c, group_id, user_id, name_card)
        })
        .await
    }

    async fn mute_group_member(
        &self,
        caller: &Caller,
        group_id: &str,
        user_id: &str,
        seconds: u32,
    ) -> ImResult<()> {
        self.with_state(caller, |st, c, now| {
            st.mute_group_member(c, group_id, user_id, seconds, now)
        })
        .await
    }

    async fn invite_user_to_group(
        &self,
        caller: &Caller,
        group_id: &str,
        user_ids: &[String],
    ) -> ImResult<Vec<GroupMemberOperationResult>> {
        self.with_state(caller, |st, c, now| {
            st.invite_user_to_group(c, group_id, user_ids, now)
        })
        .await
    }

    async fn kick_group_member(
        &self,
        caller: &Caller,
        group_id: &str,
        user_ids: &[String],
        reason: &str,
    ) -> ImResult<Vec<GroupMemberOperationResult>> {
        self.with_state(caller, |st, c, _| {
            st.kick_group_member(c, group_id, user_ids, reason)
        })
        .await
    }

    async fn set_group_member_role(
        &self,
        caller: &Caller,
        group_id: &str,
        user_id: &str,
        role: GroupMemberRole,
    ) -> ImResult<()> {
        self.with_state(caller, |st, c, _| {
            st.set_group_member_role(c, group_id, user_id, role)
        })
        .await
    }

    async fn transfer_group_owner(
        &self,
        caller: &Caller,
        group_id: &str,
        user_id: &str,
    ) -> ImResult<()> {
        self.with_state(caller, |st, c, _| {
            st.transfer_group_owner(c, group_id, user_id)
        })
        .await
    }

    async fn get_group_application_list(
        &self,
        caller: &Caller,
    ) -> ImResult<Vec<GroupApplication>> {
        self.with_state(caller, |st, c, _| Ok(st.get_group_application_list(c)))
            .await
    }

    async fn handle_group_application(
        &self,
        caller: &Caller,
        group_id: &str,
        from_user: &str,
        accept: bool,
        reason: &str,
    ) -> ImResult<()> {
        self.with_state(caller, |st, c, now| {
            st.handle_group_application(c, group_id, from_user, accept, reason, now)
        })
        .await
    }

    async fn write_group_attributes(
        &self,
        caller: &Caller,
        group_id: &str,
        known_version: u64,
        op: &GroupAttributeWrite,
    ) -> ImResult<GroupAttributes> {
        self.with_state(caller, |st, c, _| {
            st.write_group_attributes(c, group_id, known_version, op)
        })
        .await
    }

    async fn get_group_attributes(
        &self,
        caller: &Caller,
        group_id: &str,
    ) -> ImResult<GroupAttributes> {
        self.with_state(caller, |st, c, _| st.get_group_attributes(c, group_id))
            .await
    }

    async fn get_group_online_member_count(
        &self,
        caller: &Caller,
        group_id: &str,
    ) -> ImResult<u32> {
        self.with_state(caller, |st, c, _| {
            st.get_group_online_member_count(c, group_id)
        })
        .await
    }

    async fn set_group_counters(
        &self,
        caller: &Caller,
        group_id: &str,
        known_version: u64,
        counters: &BTreeMap<String, i64>,
    ) -> ImResult<GroupCounters> {
        self.with_state(caller, |st, c, _| {
            st.set_group_counters(c, group_id, known_version, counters)
        })
        .await
    }

    async fn increase_group_counter(
        &self,
        caller: &Caller,
        group_id: &str,
        key: &str,
        delta: i64,
    ) -> ImResult<GroupCounters> {
        self.with_state(caller, |st, c, _| {
            st.increase_group_counter(c, group_id, key, delta)
        })
        .await
    }

    async fn get_group_counters(
        &self,
        caller: &Caller,
        group_id: &str,
        keys: &[String],
    ) -> ImResult<GroupCounters> {
        self.with_state(caller, |st, c, _| st.get_group_counters(c, group_id, keys))
            .await
    }

    // ---------- 关系链 ----------

    async fn add_friend(
        &self,
        caller: &Caller,
        application: &FriendAddApplication,
    ) -> ImResult<FriendOperationResult> {
        self.with_state(caller, |st, c, now| st.add_friend(c, application, now))
            .await
    }

    async fn delete_friends(
        &self,
        caller: &Caller,
        user_ids: &[String],
        delete_type: FriendType,
    ) -> ImResult<Vec<FriendOperationResult>> {
        self.with_state(caller, |st, c, _| {
            Ok(st.delete_friends(c, user_ids, delete_type))
        })
        .await
    }

    async fn get_friend_list(&self, caller: &Caller) -> ImResult<Vec<FriendInfo>> {
        self.with_state(caller, |st, c, _| Ok(st.friends.friend_list(&c.user_id)))
            .await
    }

    async fn get_friends_info(
        &self,
        caller: &Caller,
        user_ids: &[String],
    ) -> ImResult<Vec<FriendInfoResult>> {
        self.with_state(caller, |st, c, _| {
            Ok(st.friends.friends_info(&c.user_id, user_ids))
        })
        .await
    }

    async fn set_friend_remark(
        &self,
        caller: &Caller,
        user_id: &str,
        remark: &str,
    ) -> ImResult<()> {
        self.with_state(caller, |st, c, _| st.set_friend_remark(c, user_id, remark))
            .await
    }

    async fn check_friend(
        &self,
        caller: &Caller,
        user_ids: &[String],
        check_type: FriendType,
    ) -> ImResult<Vec<FriendCheckResult>> {
        self.with_state(caller, |st, c, _| {
            Ok(st.friends.check_friend(&c.user_id, user_ids, check_type))
        })
        .await
    }

    async fn get_friend_applications(&self, caller: &Caller) -> ImResult<Vec<FriendApplication>> {
        self.with_state(caller, |st, c, _| Ok(st.friends.applications_of(&c.user_id)))
            .await
    }

    async fn accept_friend_application(
        &self,
        caller: &Caller,
        user_id: &str,
        response: FriendResponseType,
    ) -> ImResult<FriendOperationResult> {
        self.with_state(caller, |st, c, now| {
            st.accept_friend_application(c, user_id, response, now)
        })
        .await
    }

    async fn refuse_friend_application(
        &self,
        caller: &Caller,
        user_id: &str,
    ) -> ImResult<FriendOperationResult> {
        self.with_state(caller, |st, c, _| st.refuse_friend_application(c, user_id))
            .await
    }

    async fn delete_friend_application(
        &self,
        caller: &Caller,
        user_id: &str,
        application_type: FriendApplicationType,
    ) -> ImResult<()> {
        self.with_state(caller, |st, c, _| {
            st.delete_friend_application(c, user_id, application_type)
        })
        .await
    }

    async fn add_to_blacklist(
        &self,
        caller: &Caller,
        user_ids: &[String],
    ) -> ImResult<Vec<FriendOperationResult>> {
        self.with_state(caller, |st, c, _| Ok(st.add_to_blacklist(c, user_ids)))
            .await
    }

    async fn delete_from_blacklist(
        &self,
        caller: &Caller,
        user_ids: &[String],
    ) -> ImResult<Vec<FriendOperationResult>> {
        self.with_state(caller, |st, c, _| Ok(st.delete_from_blacklist(c, user_ids)))
            .await
    }

    async fn get_blacklist(&self, caller: &Caller) -> ImResult<Vec<String>> {
        self.with_state(caller, |st, c, _| Ok(st.friends.blacklist_of(&c.user_id)))
            .await
    }

    async fn set_allow_type(&self, caller: &Caller, allow_type: AllowType) -> ImResult<()> {
        self.with_state(caller, |st, c, _| {
            st.friends.allow.insert(c.user_id.clone(), allow_type);
            Ok(())
        })
        .await
    }

    async fn get_allow_type(&self, caller: &Caller) -> ImResult<AllowType> {
        self.with_state(caller, |st, c, _| Ok(st.friends.allow_type_of(&c.user_id)))
            .await
    }

    async fn create_friend_group(
        &self,
        caller: &Caller,
        name: &str,
        user_ids: &[String],
    ) -> ImResult<Vec<FriendOperationResult>> {
        self.with_state(caller, |st, c, _| st.create_friend_group(c, name, user_ids))
            .await
    }

    async fn get_friend_groups(
        &self,
        caller: &Caller,
        names: &[String],
    ) -> ImResult<Vec<FriendGroup>> {
        self.with_state(caller, |st, c, _| {
            Ok(st.friends.friend_groups_of(&c.user_id, names))
        })
        .await
    }

    async fn delete_friend_groups(&self, caller: &Caller, names: &[String]) -> ImResult<()> {
        self.with_state(caller, |st, c, _| st.delete_friend_groups(c, names))
            .await
    }

    async fn rename_friend_group(
        &self,
        caller: &Caller,
        old_name: &str,
        new_name: &str,
    ) -> ImResult<()> {
        self.with_state(caller, |st, c, _| {
            st.rename_friend_group(c, old_name, new_name)
        })
        .await
    }

    async fn add_friends_to_friend_group(
        &self,
        caller: &Caller,
        name: &str,
        user_ids: &[String],
    ) -> ImResult<Vec<FriendOperationResult>> {
        self.with_state(caller, |st, c, _| {
            st.add_friends_to_friend_group(c, name, user_ids)
        })
        .await
    }

    async fn delete_friends_from_friend_group(
        &self,
        caller: &Caller,
        name: &str,
        user_ids: &[String],
    ) -> ImResult<Vec<FriendOperationResult>> {
        self.with_state(caller, |st, c, _| {
            st.delete_friends_from_friend_group(c, name, user_ids)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::im::clock::ManualClock;
    use crate::im::error::ErrorKind;

    #[tokio::test]
    async fn tickets_are_checked_on_login() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let server = MemoryServer::new(clock.clone());
        let ticket = server.issue_ticket("alice", Duration::from_secs(60));

        let err = server.login("bob", &ticket).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Auth);
        let err = server.login("alice", "forged").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Auth);

        let ack = server.login("alice", &ticket).await.unwrap();
        assert!(server.is_online("alice"));

        clock.advance_ms(61_000);
        let err = server.login("alice", &ticket).await.unwrap_err();
        assert_eq!(err.code, err_code::ERR_USER_SIG_EXPIRED);

        // 已建立的连接在下一次调用时发现票据过期，并收到推送
        let caller = Caller {
            user_id: "alice".into(),
            token: ack.token.clone(),
            connection_id: ack.connection_id,
        };
        let err = server.get_friend_list(&caller).await.unwrap_err();
        assert_eq!(err.code, err_code::ERR_USER_SIG_EXPIRED);
        let mut rx = ack.push_rx;
        assert_eq!(rx.recv().await, Some(ServerPush::UserSigExpired));
        assert!(!server.is_online("alice"));
    }

    #[tokio::test]
    async fn kick_notifies_every_device() {
        let server = MemoryServer::new(Arc::new(ManualClock::new(0)));
        let ticket = server.issue_ticket("alice", Duration::from_secs(60));
        let mut a = server.login("alice", &ticket).await.unwrap();
        let mut b = server.login("alice", &ticket).await.unwrap();
        assert_ne!(a.connection_id, b.connection_id);

        assert_eq!(server.kick_user("alice"), 2);
        assert_eq!(a.push_rx.recv().await, Some(ServerPush::KickedOffline));
        assert_eq!(b.push_rx.recv().await, Some(ServerPush::KickedOffline));
    }
}
