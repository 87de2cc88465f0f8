//! 信令管理
//!
//! 邀请、接受、拒绝、取消、修改都以自定义消息承载（消息体见 [`SignalingInfo`]）。
//! 非仅在线的信令消息和普通消息一样入库并通知消息监听器，仅在线的信令只驱动状态机。
//! 每个邀请在本地维护一份状态机：
//!
//! - 被邀请人的状态只会从 Pending 迁移到某个终态，终态不再改变；
//! - 取消只能由邀请者发起，且至少还有一个被邀请人处于 Pending；
//! - 超时由本地计时器触发，`timeout` 为 0 时不启动计时器。

use crate::im::context::ImContext;
use crate::im::error::{err_code, ImError, ImResult};
use crate::im::message::models::{Message, SendOptions};
use crate::im::message::service::MessageManager;
use crate::im::signaling::models::{
    Invitation, InviteeState, SignalingActionType, SignalingInfo, SIGNALING_BUSINESS_ID,
};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct SignalingManager {
    ctx: Arc<ImContext>,
    message: Arc<MessageManager>,
    invitations: Mutex<HashMap<String, Invitation>>,
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
    weak: Weak<SignalingManager>,
}

fn unknown_invitation(invite_id: &str) -> ImError {
    ImError::new(
        err_code::ERR_SIGNALING_INVALID_INVITE_ID,
        format!("邀请不存在: {invite_id}"),
    )
}

fn already_resolved(invite_id: &str) -> ImError {
    ImError::new(
        err_code::ERR_SIGNALING_INVITATION_RESOLVED,
        format!("邀请 {invite_id} 已经结束"),
    )
}

fn no_permission(msg: &str) -> ImError {
    ImError::new(err_code::ERR_SIGNALING_NO_PERMISSION, msg)
}

/// 信令发往哪里：群邀请发到群里，单聊邀请发给对方
fn target_of(info: &SignalingInfo, me: &str) -> (String, String) {
    if info.is_group() {
        (String::new(), info.group_id.clone())
    } else if info.inviter == me {
        (
            info.invitee_list.first().cloned().unwrap_or_default(),
            String::new(),
        )
    } else {
        (info.inviter.clone(), String::new())
    }
}

impl SignalingManager {
    pub fn new(ctx: Arc<ImContext>, message: Arc<MessageManager>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            ctx,
            message,
            invitations: Mutex::new(HashMap::new()),
            timers: Mutex::new(HashMap::new()),
            weak: weak.clone(),
        })
    }

    pub(crate) fn reset(&self) {
        for (_, timer) in self.timers.lock().drain() {
            timer.abort();
        }
        self.invitations.lock().clear();
    }

    // ---------- 邀请者 ----------

    /// 单聊邀请，返回邀请 ID
    pub async fn invite(
        &self,
        invitee: &str,
        data: &str,
        online_user_only: bool,
        timeout: u32,
    ) -> ImResult<String> {
        self.start_invitation(&[invitee.to_string()], "", data, online_user_only, timeout)
            .await
    }

    /// 群内邀请，被邀请人必须是群成员
    pub async fn invite_in_group(
        &self,
        group_id: &str,
        invitee_list: &[String],
        data: &str,
        online_user_only: bool,
        timeout: u32,
    ) -> ImResult<String> {
        if group_id.is_empty() {
            return Err(ImError::invalid_param("groupID 不能为空"));
        }
        let caller = self.ctx.caller()?;
        let members = self
            .ctx
            .remote
            .get_group_members_info(&caller, group_id, invitee_list)
            .await?;
        let outsiders: Vec<&String> = invitee_list
            .iter()
            .filter(|u| !members.iter().any(|m| &m.user_id == *u))
            .collect();
        if !outsiders.is_empty() {
            return Err(ImError::invalid_param(format!(
                "被邀请人不在群 {group_id} 中: {outsiders:?}"
            )));
        }
        self.start_invitation(invitee_list, group_id, data, online_user_only, timeout)
            .await
    }

    async fn start_invitation(
        &self,
        invitee_list: &[String],
        group_id: &str,
        data: &str,
        online_user_only: bool,
        timeout: u32,
    ) -> ImResult<String> {
        let me = self.ctx.login_user()?;
        if invitee_list.is_empty() {
            return Err(ImError::invalid_param("被邀请人列表不能为空"));
        }
        let unique: BTreeSet<&String> = invitee_list.iter().collect();
        if unique.len() != invitee_list.len()
            || invitee_list.iter().any(|u| u.is_empty() || *u == me)
        {
            return Err(ImError::invalid_param("被邀请人列表不合法"));
        }

        let info = SignalingInfo {
            business_id: SIGNALING_BUSINESS_ID,
            invite_id: uuid::Uuid::new_v4().simple().to_string(),
            inviter: me.clone(),
            invitee_list: invitee_list.to_vec(),
            group_id: group_id.to_string(),
            data: data.to_string(),
            timeout,
            action_type: SignalingActionType::Invite,
            op_user: me.clone(),
            online_user_only,
        };
        self.send_signal(&info, &me).await?;

        let invite_id = info.invite_id.clone();
        self.invitations
            .lock()
            .insert(invite_id.clone(), Invitation::new(info, self.ctx.now_ms()));
        self.start_timer(&invite_id, timeout);
        info!(
            "[Signaling] 📞 发出邀请 {} -> {:?} (超时 {}s)",
            invite_id, invitee_list, timeout
        );
        Ok(invite_id)
    }

    /// 取消邀请：只有邀请者可以取消，且仍有被邀请人未处理
    pub async fn cancel(&self, invite_id: &str, data: &str) -> ImResult<()> {
        let me = self.ctx.login_user()?;
        let mut info = {
            let invitations = self.invitations.lock();
            let inv = invitations
                .get(invite_id)
                .ok_or_else(|| unknown_invitation(invite_id))?;
            if inv.info.inviter != me {
                return Err(no_permission("只有邀请者可以取消邀请"));
            }
            if !inv.has_pending() {
                return Err(already_resolved(invite_id));
            }
            inv.info.clone()
        };
        info.action_type = SignalingActionType::Cancel;
        info.op_user = me.clone();
        info.data = data.to_string();
        self.send_signal(&info, &me).await?;

        if let Some(inv) = self.invitations.lock().get_mut(invite_id) {
            let pending = inv.pending_invitees();
            inv.resolve_pending(&pending, InviteeState::Cancelled);
        }
        self.stop_timer(invite_id);
        info!("[Signaling] 🚫 取消邀请 {}", invite_id);
        Ok(())
    }

    /// 修改邀请内容（仅邀请者，在线信令不支持）
    pub async fn modify_invitation(&self, invite_id: &str, data: &str) -> ImResult<()> {
        let me = self.ctx.login_user()?;
        let mut info = {
            let invitations = self.invitations.lock();
            let inv = invitations
                .get(invite_id)
                .ok_or_else(|| unknown_invitation(invite_id))?;
            if inv.info.inviter != me {
                return Err(no_permission("只有邀请者可以修改邀请"));
            }
            if inv.info.online_user_only {
                return Err(ImError::invalid_param("在线信令不支持修改"));
            }
            if !inv.has_pending() {
                return Err(already_resolved(invite_id));
            }
            inv.info.clone()
        };
        info.action_type = SignalingActionType::Modify;
        info.op_user = me.clone();
        info.data = data.to_string();
        self.send_signal(&info, &me).await?;

        if let Some(inv) = self.invitations.lock().get_mut(invite_id) {
            inv.info.data = data.to_string();
            inv.modified = true;
        }
        Ok(())
    }

    // ---------- 被邀请人 ----------

    pub async fn accept(&self, invite_id: &str, data: &str) -> ImResult<()> {
        self.respond(invite_id, data, true).await
    }

    pub async fn reject(&self, invite_id: &str, data: &str) -> ImResult<()> {
        self.respond(invite_id, data, false).await
    }

    async fn respond(&self, invite_id: &str, data: &str, accept: bool) -> ImResult<()> {
        let me = self.ctx.login_user()?;
        let mut info = {
            let invitations = self.invitations.lock();
            let inv = invitations
                .get(invite_id)
                .ok_or_else(|| unknown_invitation(invite_id))?;
            match inv.invitee_state(&me) {
                None => return Err(no_permission("不在被邀请人列表中")),
                Some(InviteeState::Pending) => {}
                Some(_) => return Err(already_resolved(invite_id)),
            }
            inv.info.clone()
        };
        info.action_type = if accept {
            SignalingActionType::Accept
        } else {
            SignalingActionType::Reject
        };
        info.op_user = me.clone();
        info.data = data.to_string();
        self.send_signal(&info, &me).await?;

        let next = if accept {
            InviteeState::Accepted
        } else {
            InviteeState::Rejected
        };
        if let Some(inv) = self.invitations.lock().get_mut(invite_id) {
            inv.resolve_pending(std::slice::from_ref(&me), next);
        }
        self.stop_timer(invite_id);
        debug!("[Signaling] 邀请 {} 已{}", invite_id, if accept { "接受" } else { "拒绝" });
        Ok(())
    }

    // ---------- 查询 ----------

    /// 解析消息中的信令，非信令消息返回 None
    pub fn get_signaling_info(&self, message: &Message) -> Option<SignalingInfo> {
        SignalingInfo::from_message(message)
    }

    /// 把通过其他渠道（如离线推送）得到的邀请加入本地，已存在时返回错误
    pub fn add_invited_signaling(&self, info: SignalingInfo) -> ImResult<()> {
        let me = self.ctx.login_user()?;
        if info.action_type != SignalingActionType::Invite {
            return Err(ImError::invalid_param("只能添加邀请类信令"));
        }
        if !info.invitee_list.contains(&me) {
            return Err(ImError::invalid_param("当前用户不在被邀请人列表中"));
        }
        let invite_id = info.invite_id.clone();
        let timeout = info.timeout;
        {
            let mut invitations = self.invitations.lock();
            if invitations.contains_key(&invite_id) {
                return Err(ImError::new(
                    err_code::ERR_SIGNALING_ALREADY_EXISTS,
                    format!("邀请已存在: {invite_id}"),
                ));
            }
            invitations.insert(invite_id.clone(), Invitation::new(info, self.ctx.now_ms()));
        }
        self.start_timer(&invite_id, timeout);
        Ok(())
    }

    pub fn get_invitation(&self, invite_id: &str) -> Option<Invitation> {
        self.invitations.lock().get(invite_id).cloned()
    }

    // ---------- 收到信令 ----------

    /// 用收到的消息驱动邀请状态机，是信令消息时返回 true
    pub(crate) async fn handle_message(&self, message: &Message) -> bool {
        let Some(info) = SignalingInfo::from_message(message) else {
            return false;
        };
        let Ok(me) = self.ctx.login_user() else {
            return true;
        };
        if message.sender == me {
            debug!("[Signaling] 忽略自己其他终端发出的信令 {}", info.invite_id);
            return true;
        }
        let sender = message.sender.as_str();
        match info.action_type {
            SignalingActionType::Invite => self.on_invite(info, &me).await,
            SignalingActionType::Cancel => self.on_cancel(info, sender).await,
            SignalingActionType::Accept => {
                self.on_response(info, sender, InviteeState::Accepted).await
            }
            SignalingActionType::Reject => {
                self.on_response(info, sender, InviteeState::Rejected).await
            }
            SignalingActionType::Timeout => {
                self.on_response(info, sender, InviteeState::TimedOut).await
            }
            SignalingActionType::Modify => self.on_modify(info, sender).await,
        }
        true
    }

    async fn on_invite(&self, info: SignalingInfo, me: &str) {
        if !info.invitee_list.iter().any(|u| u == me) {
            return;
        }
        {
            let mut invitations = self.invitations.lock();
            if invitations.contains_key(&info.invite_id) {
                return;
            }
            invitations.insert(
                info.invite_id.clone(),
                Invitation::new(info.clone(), self.ctx.now_ms()),
            );
        }
        self.start_timer(&info.invite_id, info.timeout);
        info!(
            "[Signaling] 📨 收到 {} 的邀请 {}",
            info.inviter, info.invite_id
        );
        for l in self.ctx.bus.signaling.snapshot() {
            l.on_received_new_invitation(
                info.invite_id.clone(),
                info.inviter.clone(),
                info.group_id.clone(),
                info.invitee_list.clone(),
                info.data.clone(),
            )
            .await;
        }
    }

    async fn on_cancel(&self, info: SignalingInfo, sender: &str) {
        let changed = {
            let mut invitations = self.invitations.lock();
            match invitations.get_mut(&info.invite_id) {
                Some(inv) if inv.info.inviter == sender => {
                    let pending = inv.pending_invitees();
                    inv.resolve_pending(&pending, InviteeState::Cancelled)
                }
                _ => Vec::new(),
            }
        };
        if changed.is_empty() {
            return;
        }
        self.stop_timer(&info.invite_id);
        for l in self.ctx.bus.signaling.snapshot() {
            l.on_invitation_cancelled(info.invite_id.clone(), sender.to_string(), info.data.clone())
                .await;
        }
    }

    /// 被邀请人的应答（接受、拒绝、对端超时），邀请者和同群的其他被邀请人都会收到
    async fn on_response(&self, info: SignalingInfo, sender: &str, next: InviteeState) {
        let (changed, finished, i_am_inviter) = {
            let me = self.ctx.login_user().unwrap_or_default();
            let mut invitations = self.invitations.lock();
            let Some(inv) = invitations.get_mut(&info.invite_id) else {
                return;
            };
            let changed = inv.resolve_pending(&[sender.to_string()], next);
            (changed, !inv.has_pending(), inv.info.inviter == me)
        };
        if changed.is_empty() {
            return;
        }
        if finished && i_am_inviter {
            self.stop_timer(&info.invite_id);
        }
        for l in self.ctx.bus.signaling.snapshot() {
            match next {
                InviteeState::Accepted => {
                    l.on_invitee_accepted(info.invite_id.clone(), sender.to_string(), info.data.clone())
                        .await
                }
                InviteeState::Rejected => {
                    l.on_invitee_rejected(info.invite_id.clone(), sender.to_string(), info.data.clone())
                        .await
                }
                _ => {
                    l.on_invitation_timeout(info.invite_id.clone(), changed.clone())
                        .await
                }
            }
        }
    }

    async fn on_modify(&self, info: SignalingInfo, sender: &str) {
        let updated = {
            let mut invitations = self.invitations.lock();
            match invitations.get_mut(&info.invite_id) {
                Some(inv) if inv.info.inviter == sender && inv.has_pending() => {
                    inv.info.data = info.data.clone();
                    inv.modified = true;
                    true
                }
                _ => false,
            }
        };
        if updated {
            for l in self.ctx.bus.signaling.snapshot() {
                l.on_invitation_modified(info.invite_id.clone(), info.data.clone())
                    .await;
            }
        }
    }

    // ---------- 发送与计时 ----------

    async fn send_signal(&self, info: &SignalingInfo, me: &str) -> ImResult<()> {
        let payload = serde_json::to_vec(info)?;
        let message = self.message.create_custom_message(payload, "signaling", "")?;
        let options = SendOptions {
            online_user_only: info.online_user_only,
            ..Default::default()
        };
        let (receiver, group_id) = target_of(info, me);
        self.message
            .send_inner(message, &receiver, &group_id, options, true)
            .await?;
        Ok(())
    }

    fn start_timer(&self, invite_id: &str, timeout: u32) {
        if timeout == 0 {
            return;
        }
        let weak = self.weak.clone();
        let id = invite_id.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(u64::from(timeout))).await;
            if let Some(manager) = weak.upgrade() {
                manager.on_local_timeout(&id).await;
            }
        });
        if let Some(old) = self.timers.lock().insert(invite_id.to_string(), handle) {
            old.abort();
        }
    }

    fn stop_timer(&self, invite_id: &str) {
        if let Some(timer) = self.timers.lock().remove(invite_id) {
            timer.abort();
        }
    }

    /// 计时器到期：邀请者把所有未处理的被邀请人标记为超时，被邀请人只标记自己
    async fn on_local_timeout(&self, invite_id: &str) {
        self.timers.lock().remove(invite_id);
        let Ok(me) = self.ctx.login_user() else {
            return;
        };
        let timed_out = {
            let mut invitations = self.invitations.lock();
            let Some(inv) = invitations.get_mut(invite_id) else {
                return;
            };
            let scope = if inv.info.inviter == me {
                inv.pending_invitees()
            } else {
                vec![me.clone()]
            };
            inv.resolve_pending(&scope, InviteeState::TimedOut)
        };
        if timed_out.is_empty() {
            return;
        }
        warn!("[Signaling] ⏰ 邀请 {} 超时: {:?}", invite_id, timed_out);
        for l in self.ctx.bus.signaling.snapshot() {
            l.on_invitation_timeout(invite_id.to_string(), timed_out.clone())
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::im::error::ErrorKind;
    use crate::im::group::models::{CreateGroupMember, CreateGroupParam, GroupMemberRole, GroupType};
    use crate::im::signaling::listener::SignalingListener;
    use crate::im::signaling::models::InvitationState;
    use crate::im::testing::{recv_event, TestEnv};
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    #[derive(Debug, PartialEq)]
    enum Seen {
        Invited(String, String),
        Accepted(String),
        Rejected(String),
        Cancelled(String),
        Timeout(Vec<String>),
        Modified(String),
    }

    struct Recorder {
        tx: mpsc::UnboundedSender<Seen>,
    }

    #[async_trait]
    impl SignalingListener for Recorder {
        async fn on_received_new_invitation(
            &self,
            invite_id: String,
            inviter: String,
            _group_id: String,
            _invitee_list: Vec<String>,
            _data: String,
        ) {
            let _ = self.tx.send(Seen::Invited(invite_id, inviter));
        }
        async fn on_invitee_accepted(&self, _invite_id: String, invitee: String, _data: String) {
            let _ = self.tx.send(Seen::Accepted(invitee));
        }
        async fn on_invitee_rejected(&self, _invite_id: String, invitee: String, _data: String) {
            let _ = self.tx.send(Seen::Rejected(invitee));
        }
        async fn on_invitation_cancelled(&self, _invite_id: String, inviter: String, _data: String) {
            let _ = self.tx.send(Seen::Cancelled(inviter));
        }
        async fn on_invitation_timeout(&self, _invite_id: String, invitee_list: Vec<String>) {
            let _ = self.tx.send(Seen::Timeout(invitee_list));
        }
        async fn on_invitation_modified(&self, _invite_id: String, data: String) {
            let _ = self.tx.send(Seen::Modified(data));
        }
    }

    fn recorder(client: &crate::im::client::ImClient) -> mpsc::UnboundedReceiver<Seen> {
        let (tx, rx) = mpsc::unbounded_channel();
        client.add_signaling_listener(Arc::new(Recorder { tx }));
        rx
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn cancel_fails_once_every_invitee_rejected() {
        let env = TestEnv::new();
        let alice = env.login("alice").await;
        let invitees = ids(&["bob", "carol", "dave"]);
        let mut clients = Vec::new();
        for user in &invitees {
            let client = env.login(user).await;
            let rx = recorder(&client);
            clients.push((client, rx));
        }
        let mut alice_rx = recorder(&alice);

        let mut param = CreateGroupParam::new(GroupType::Work, "call");
        param.member_list = invitees
            .iter()
            .map(|u| CreateGroupMember {
                user_id: u.clone(),
                role: GroupMemberRole::Member,
            })
            .collect();
        let group_id = alice.group().create_group(param).await.unwrap();

        let invite_id = alice
            .signaling()
            .invite_in_group(&group_id, &invitees, "video", false, 10)
            .await
            .unwrap();
        for (client, rx) in clients.iter_mut() {
            assert_eq!(
                recv_event(rx).await,
                Seen::Invited(invite_id.clone(), "alice".into())
            );
            client.signaling().reject(&invite_id, "busy").await.unwrap();
        }
        for user in &invitees {
            assert_eq!(recv_event(&mut alice_rx).await, Seen::Rejected(user.clone()));
        }

        let err = alice.signaling().cancel(&invite_id, "").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::State);
        assert_eq!(err.code, err_code::ERR_SIGNALING_INVITATION_RESOLVED);
        let inv = alice.signaling().get_invitation(&invite_id).unwrap();
        assert_eq!(inv.state(), InvitationState::Rejected);

        let (bob, _) = &clients[0];
        let err = bob.signaling().reject(&invite_id, "").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::State);
    }

    #[tokio::test]
    async fn timeout_is_a_local_timer() {
        let env = TestEnv::new();
        let alice = env.login("alice").await;
        let bob = env.login("bob").await;
        let carol = env.login("carol").await;
        let mut alice_rx = recorder(&alice);
        let mut bob_rx = recorder(&bob);
        let mut carol_rx = recorder(&carol);

        let id = alice.signaling().invite("bob", "call", false, 1).await.unwrap();
        assert_eq!(recv_event(&mut bob_rx).await, Seen::Invited(id.clone(), "alice".into()));
        assert_eq!(recv_event(&mut alice_rx).await, Seen::Timeout(ids(&["bob"])));
        assert_eq!(recv_event(&mut bob_rx).await, Seen::Timeout(ids(&["bob"])));

        let err = bob.signaling().accept(&id, "").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::State);
        let err = alice.signaling().cancel(&id, "").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::State);

        // timeout 为 0 时永不超时
        let id = alice.signaling().invite("carol", "call", false, 0).await.unwrap();
        assert_eq!(
            recv_event(&mut carol_rx).await,
            Seen::Invited(id.clone(), "alice".into())
        );
        let quiet = tokio::time::timeout(Duration::from_millis(1500), carol_rx.recv()).await;
        assert!(quiet.is_err());
        alice.signaling().cancel(&id, "").await.unwrap();
        assert_eq!(recv_event(&mut carol_rx).await, Seen::Cancelled("alice".into()));
    }

    #[tokio::test]
    async fn accept_modify_and_permissions() {
        let env = TestEnv::new();
        let alice = env.login("alice").await;
        let bob = env.login("bob").await;
        let carol = env.login("carol").await;
        let mut alice_rx = recorder(&alice);
        let mut bob_rx = recorder(&bob);

        let id = alice.signaling().invite("bob", "video", false, 0).await.unwrap();
        assert_eq!(recv_event(&mut bob_rx).await, Seen::Invited(id.clone(), "alice".into()));

        let err = carol.signaling().accept(&id, "").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        let err = bob.signaling().cancel(&id, "").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Permission);

        alice.signaling().modify_invitation(&id, "audio").await.unwrap();
        assert_eq!(recv_event(&mut bob_rx).await, Seen::Modified("audio".into()));
        assert_eq!(
            bob.signaling().get_invitation(&id).unwrap().state(),
            InvitationState::Modified
        );

        bob.signaling().accept(&id, "ok").await.unwrap();
        assert_eq!(recv_event(&mut alice_rx).await, Seen::Accepted("bob".into()));
        let err = alice.signaling().cancel(&id, "").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::State);

        let online = alice.signaling().invite("bob", "ping", true, 0).await.unwrap();
        assert_eq!(
            recv_event(&mut bob_rx).await,
            Seen::Invited(online.clone(), "alice".into())
        );
        let err = alice
            .signaling()
            .modify_invitation(&online, "pong")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParam);

        let err = bob
            .signaling()
            .add_invited_signaling(bob.signaling().get_invitation(&id).unwrap().info)
            .unwrap_err();
        assert_eq!(err.code, err_code::ERR_SIGNALING_ALREADY_EXISTS);

        let offline = SignalingInfo {
            business_id: SIGNALING_BUSINESS_ID,
            invite_id: "offline-1".into(),
            inviter: "alice".into(),
            invitee_list: ids(&["carol"]),
            group_id: String::new(),
            data: String::new(),
            timeout: 0,
            action_type: SignalingActionType::Invite,
            op_user: "alice".into(),
            online_user_only: false,
        };
        carol.signaling().add_invited_signaling(offline.clone()).unwrap();
        assert_eq!(
            carol.signaling().get_invitation("offline-1").unwrap().state(),
            InvitationState::Pending
        );
        let err = carol.signaling().add_invited_signaling(offline).unwrap_err();
        assert_eq!(err.kind, ErrorKind::State);
    }

    struct MessageRecorder {
        tx: mpsc::UnboundedSender<Message>,
    }

    #[async_trait]
    impl crate::im::message::listener::AdvancedMsgListener for MessageRecorder {
        async fn on_recv_new_message(&self, message: Message) {
            let _ = self.tx.send(message);
        }
    }

    async fn local_history(client: &crate::im::client::ImClient, conv: &str) -> Vec<Message> {
        client
            .message()
            .get_history_message_list(crate::im::message::models::HistoryMessageOption {
                conversation_id: conv.to_string(),
                count: 10,
                last_message: None,
                from_cloud: false,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn stored_signals_reach_history_and_message_listener() {
        let env = TestEnv::new();
        let alice = env.login("alice").await;
        let bob = env.login("bob").await;
        let mut bob_rx = recorder(&bob);
        let (tx, mut bob_msgs) = mpsc::unbounded_channel();
        bob.add_advanced_msg_listener(Arc::new(MessageRecorder { tx }));

        // 仅在线的信令只驱动状态机
        let online = alice.signaling().invite("bob", "ping", true, 0).await.unwrap();
        assert_eq!(recv_event(&mut bob_rx).await, Seen::Invited(online.clone(), "alice".into()));

        let stored = alice.signaling().invite("bob", "call", false, 0).await.unwrap();
        assert_eq!(recv_event(&mut bob_rx).await, Seen::Invited(stored.clone(), "alice".into()));
        let received = recv_event(&mut bob_msgs).await;
        let info = bob.signaling().get_signaling_info(&received).unwrap();
        assert_eq!(info.invite_id, stored);

        let bob_side = local_history(&bob, "c2c_alice").await;
        assert_eq!(bob_side.len(), 1);
        assert_eq!(bob_side[0].msg_id, received.msg_id);
        let alice_side = local_history(&alice, "c2c_bob").await;
        assert_eq!(alice_side.len(), 1);
        assert_eq!(
            alice.signaling().get_signaling_info(&alice_side[0]).unwrap().invite_id,
            stored
        );
        assert!(bob.conversation().get_conversation("c2c_alice").is_ok());
    }

    #[tokio::test]
    async fn group_invitees_must_be_members() {
        let env = TestEnv::new();
        let alice = env.login("alice").await;
        let _bob = env.login("bob").await;
        let _zed = env.login("zed").await;
        let mut param = CreateGroupParam::new(GroupType::Work, "call");
        param.member_list = vec![CreateGroupMember {
            user_id: "bob".into(),
            role: GroupMemberRole::Member,
        }];
        let group_id = alice.group().create_group(param).await.unwrap();

        let err = alice
            .signaling()
            .invite_in_group(&group_id, &ids(&["bob", "zed"]), "video", false, 0)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParam);
        assert!(local_history(&alice, &crate::im::types::group_conversation_id(&group_id))
            .await
            .is_empty());

        alice
            .signaling()
            .invite_in_group(&group_id, &ids(&["bob"]), "video", false, 0)
            .await
            .unwrap();
    }
}
