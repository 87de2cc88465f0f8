//! 群组管理
//!
//! 大部分操作是对远端接口的薄封装，加上本地可判断的前置校验（群 ID 规则、初始成员、属性大小）。
//! 群属性与计数器缓存已知版本号：写入前先取版本，服务端发现版本过期时返回冲突，
//! 客户端丢弃缓存，由调用方决定是否重试。

use crate::im::context::ImContext;
use crate::im::error::{err_code, ImError, ImResult};
use crate::im::group::models::{
    check_group_attributes, CreateGroupParam, GroupApplication, GroupAttributeWrite,
    GroupCounters, GroupInfo, GroupInfoPatch, GroupInfoResult, GroupMemberFilter,
    GroupMemberInfo, GroupMemberOperationResult, GroupMemberPage, GroupMemberRole,
    JoinGroupResult,
};
use crate::im::rate_limit::RateLimiter;
use crate::im::remote::{Caller, GroupEvent};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct GroupManager {
    ctx: Arc<ImContext>,
    joined_list_limiter: RateLimiter,
    attribute_write_limiter: RateLimiter,
    attribute_read_limiter: RateLimiter,
    /// 群 ID → 已知群属性版本
    attribute_versions: Mutex<HashMap<String, u64>>,
    /// 群 ID → 已知计数器版本
    counter_versions: Mutex<HashMap<String, u64>>,
}

fn require_group_id(group_id: &str) -> ImResult<()> {
    if group_id.is_empty() {
        return Err(ImError::invalid_param("groupID 不能为空"));
    }
    Ok(())
}

fn require_users(user_ids: &[String]) -> ImResult<()> {
    if user_ids.is_empty() || user_ids.iter().any(|u| u.is_empty()) {
        return Err(ImError::invalid_param("用户列表不能为空"));
    }
    Ok(())
}

impl GroupManager {
    pub fn new(ctx: Arc<ImContext>) -> Self {
        let clock = ctx.clock.clone();
        Self {
            joined_list_limiter: RateLimiter::new(
                "getJoinedGroupList",
                10,
                1000,
                err_code::ERR_SDK_COMM_API_CALL_FREQUENCY_LIMIT,
                clock.clone(),
            ),
            attribute_write_limiter: RateLimiter::new(
                "writeGroupAttributes",
                10,
                5000,
                err_code::ERR_GROUP_ATTRIBUTE_FREQUENCY_LIMIT,
                clock.clone(),
            ),
            attribute_read_limiter: RateLimiter::new(
                "getGroupAttributes",
                20,
                5000,
                err_code::ERR_GROUP_ATTRIBUTE_FREQUENCY_LIMIT,
                clock,
            ),
            ctx,
            attribute_versions: Mutex::new(HashMap::new()),
            counter_versions: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn reset(&self) {
        self.attribute_versions.lock().clear();
        self.counter_versions.lock().clear();
        self.joined_list_limiter.reset();
        self.attribute_write_limiter.reset();
        self.attribute_read_limiter.reset();
    }

    fn forget_group(&self, group_id: &str) {
        self.attribute_versions.lock().remove(group_id);
        self.counter_versions.lock().remove(group_id);
    }

    // ---------- 群生命周期 ----------

    /// 创建群组，返回群 ID（未指定时由服务端生成）
    pub async fn create_group(&self, param: CreateGroupParam) -> ImResult<String> {
        if param.group_name.trim().is_empty() {
            return Err(ImError::invalid_param("群名称不能为空"));
        }
        if let Some(id) = &param.group_id {
            param
                .group_type
                .validate_group_id(id)
                .map_err(|e| ImError::new(err_code::ERR_GROUP_ID_INVALID, e))?;
        }
        if !param.member_list.is_empty() && !param.group_type.allows_initial_members() {
            return Err(ImError::new(
                err_code::ERR_GROUP_TYPE_NOT_SUPPORTED,
                format!("{:?} 群不支持建群时添加成员", param.group_type),
            ));
        }
        if let Some(cap) = param.group_type.capacity() {
            if param.member_list.len() + 1 > cap as usize {
                return Err(ImError::new(err_code::ERR_GROUP_FULL, "初始成员超过群容量"));
            }
        }
        let caller = self.ctx.caller()?;
        let group_id = self.ctx.remote.create_group(&caller, &param).await?;
        info!(
            "[GroupMgr] 👥 创建 {:?} 群成功: {}",
            param.group_type, group_id
        );
        Ok(group_id)
    }

    pub async fn dismiss_group(&self, group_id: &str) -> ImResult<()> {
        require_group_id(group_id)?;
        let caller = self.ctx.caller()?;
        self.ctx.remote.dismiss_group(&caller, group_id).await?;
        self.forget_group(group_id);
        info!("[GroupMgr] 解散群 {}", group_id);
        Ok(())
    }

    /// 申请加群；需要审批的群返回 `PendingApproval`
    pub async fn join_group(&self, group_id: &str, request_msg: &str) -> ImResult<JoinGroupResult> {
        require_group_id(group_id)?;
        let caller = self.ctx.caller()?;
        let result = self
            .ctx
            .remote
            .join_group(&caller, group_id, request_msg)
            .await?;
        debug!("[GroupMgr] 加群 {} 结果: {:?}", group_id, result);
        Ok(result)
    }

    pub async fn quit_group(&self, group_id: &str) -> ImResult<()> {
        require_group_id(group_id)?;
        let caller = self.ctx.caller()?;
        self.ctx.remote.quit_group(&caller, group_id).await?;
        self.forget_group(group_id);
        Ok(())
    }

    /// 已加入的群（频率限制：每秒 10 次）
    pub async fn get_joined_group_list(&self) -> ImResult<Vec<GroupInfo>> {
        let caller = self.ctx.caller()?;
        self.joined_list_limiter.acquire()?;
        self.ctx.remote.get_joined_group_list(&caller).await
    }

    pub async fn get_groups_info(&self, group_ids: &[String]) -> ImResult<Vec<GroupInfoResult>> {
        if group_ids.is_empty() {
            return Err(ImError::invalid_param("群列表不能为空"));
        }
        let caller = self.ctx.caller()?;
        self.ctx.remote.get_groups_info(&caller, group_ids).await
    }

    pub async fn set_group_info(&self, patch: GroupInfoPatch) -> ImResult<()> {
        require_group_id(&patch.group_id)?;
        let caller = self.ctx.caller()?;
        self.ctx.remote.set_group_info(&caller, &patch).await
    }

    // ---------- 成员 ----------

    /// 分页获取成员，`next_seq` 为 0 表示从头开始；返回的 `next_seq` 为 0 表示已到末尾
    pub async fn get_group_member_list(
        &self,
        group_id: &str,
        filter: GroupMemberFilter,
        next_seq: u64,
        count: usize,
    ) -> ImResult<GroupMemberPage> {
        require_group_id(group_id)?;
        if count == 0 {
            return Err(ImError::invalid_param("count 必须大于 0"));
        }
        let caller = self.ctx.caller()?;
        self.ctx
            .remote
            .get_group_member_list(&caller, group_id, filter, next_seq, count)
            .await
    }

    pub async fn get_group_members_info(
        &self,
        group_id: &str,
        user_ids: &[String],
    ) -> ImResult<Vec<GroupMemberInfo>> {
        require_group_id(group_id)?;
        require_users(user_ids)?;
        let caller = self.ctx.caller()?;
        self.ctx
            .remote
            .get_group_members_info(&caller, group_id, user_ids)
            .await
    }

    /// 设置群名片
    pub async fn set_group_member_info(
        &self,
        group_id: &str,
        user_id: &str,
        name_card: &str,
    ) -> ImResult<()> {
        require_group_id(group_id)?;
        let caller = self.ctx.caller()?;
        self.ctx
            .remote
            .set_group_member_info(&caller, group_id, user_id, name_card)
            .await
    }

    /// 禁言成员，`seconds` 为 0 表示解除禁言
    pub async fn mute_group_member(&self, group_id: &str, user_id: &str, seconds: u32) -> ImResult<()> {
        require_group_id(group_id)?;
        let caller = self.ctx.caller()?;
        self.ctx
            .remote
            .mute_group_member(&caller, group_id, user_id, seconds)
            .await
    }

    pub async fn invite_user_to_group(
        &self,
        group_id: &str,
        user_ids: &[String],
    ) -> ImResult<Vec<GroupMemberOperationResult>> {
        require_group_id(group_id)?;
        require_users(user_ids)?;
        let caller = self.ctx.caller()?;
        self.ctx
            .remote
            .invite_user_to_group(&caller, group_id, user_ids)
            .await
    }

    pub async fn kick_group_member(
        &self,
        group_id: &str,
        user_ids: &[String],
        reason: &str,
    ) -> ImResult<Vec<GroupMemberOperationResult>> {
        require_group_id(group_id)?;
        require_users(user_ids)?;
        let caller = self.ctx.caller()?;
        self.ctx
            .remote
            .kick_group_member(&caller, group_id, user_ids, reason)
            .await
    }

    pub async fn set_group_member_role(
        &self,
        group_id: &str,
        user_id: &str,
        role: GroupMemberRole,
    ) -> ImResult<()> {
        require_group_id(group_id)?;
        if role == GroupMemberRole::Owner {
            return Err(ImError::invalid_param("请使用转让群主接口"));
        }
        let caller = self.ctx.caller()?;
        self.ctx
            .remote
            .set_group_member_role(&caller, group_id, user_id, role)
            .await
    }

    pub async fn transfer_group_owner(&self, group_id: &str, user_id: &str) -> ImResult<()> {
        require_group_id(group_id)?;
        let caller = self.ctx.caller()?;
        if user_id == caller.user_id {
            return Err(ImError::invalid_param("不能转让给自己"));
        }
        self.ctx
            .remote
            .transfer_group_owner(&caller, group_id, user_id)
            .await
    }

    // ---------- 加群申请 ----------

    pub async fn get_group_application_list(&self) -> ImResult<Vec<GroupApplication>> {
        let caller = self.ctx.caller()?;
        self.ctx.remote.get_group_application_list(&caller).await
    }

    pub async fn accept_group_application(
        &self,
        group_id: &str,
        from_user: &str,
        reason: &str,
    ) -> ImResult<()> {
        self.handle_application(group_id, from_user, true, reason)
            .await
    }

    pub async fn refuse_group_application(
        &self,
        group_id: &str,
        from_user: &str,
        reason: &str,
    ) -> ImResult<()> {
        self.handle_application(group_id, from_user, false, reason)
            .await
    }

    async fn handle_application(
        &self,
        group_id: &str,
        from_user: &str,
        accept: bool,
        reason: &str,
    ) -> ImResult<()> {
        require_group_id(group_id)?;
        let caller = self.ctx.caller()?;
        self.ctx
            .remote
            .handle_group_application(&caller, group_id, from_user, accept, reason)
            .await
    }

    // ---------- 群属性 ----------

    pub async fn init_group_attributes(
        &self,
        group_id: &str,
        attributes: BTreeMap<String, String>,
    ) -> ImResult<()> {
        check_group_attributes(&attributes)
            .map_err(|e| ImError::new(err_code::ERR_GROUP_ATTRIBUTE_SIZE_LIMIT, e))?;
        self.write_attributes(group_id, GroupAttributeWrite::Init(attributes))
            .await
    }

    pub async fn set_group_attributes(
        &self,
        group_id: &str,
        attributes: BTreeMap<String, String>,
    ) -> ImResult<()> {
        if attributes.is_empty() {
            return Err(ImError::invalid_param("群属性不能为空"));
        }
        check_group_attributes(&attributes)
            .map_err(|e| ImError::new(err_code::ERR_GROUP_ATTRIBUTE_SIZE_LIMIT, e))?;
        self.write_attributes(group_id, GroupAttributeWrite::Set(attributes))
            .await
    }

    /// 删除群属性，`keys` 为空删除全部
    pub async fn delete_group_attributes(&self, group_id: &str, keys: Vec<String>) -> ImResult<()> {
        self.write_attributes(group_id, GroupAttributeWrite::Delete(keys))
            .await
    }

    async fn write_attributes(&self, group_id: &str, op: GroupAttributeWrite) -> ImResult<()> {
        require_group_id(group_id)?;
        let caller = self.ctx.caller()?;
        self.attribute_write_limiter.acquire()?;

        let cached = self.attribute_versions.lock().get(group_id).copied();
        let known = match cached {
            Some(v) => v,
            None => self.fetch_attribute_version(&caller, group_id).await?,
        };
        match self
            .ctx
            .remote
            .write_group_attributes(&caller, group_id, known, &op)
            .await
        {
            Ok(snapshot) => {
                self.remember_attribute_version(group_id, snapshot.version);
                Ok(())
            }
            Err(e) => {
                if e.code == err_code::ERR_GROUP_ATTRIBUTE_CONFLICT {
                    warn!("[GroupMgr] 群 {} 属性版本过期: {}", group_id, e);
                    self.attribute_versions.lock().remove(group_id);
                }
                Err(e)
            }
        }
    }

    async fn fetch_attribute_version(&self, caller: &Caller, group_id: &str) -> ImResult<u64> {
        let snapshot = self
            .ctx
            .remote
            .get_group_attributes(caller, group_id)
            .await?;
        self.remember_attribute_version(group_id, snapshot.version);
        Ok(snapshot.version)
    }

    fn remember_attribute_version(&self, group_id: &str, version: u64) {
        let mut versions = self.attribute_versions.lock();
        let slot = versions.entry(group_id.to_string()).or_insert(version);
        *slot = (*slot).max(version);
    }

    /// 获取全部群属性（频率限制：每 5 秒 20 次）
    pub async fn get_group_attributes(&self, group_id: &str) -> ImResult<BTreeMap<String, String>> {
        require_group_id(group_id)?;
        let caller = self.ctx.caller()?;
        self.attribute_read_limiter.acquire()?;
        let snapshot = self
            .ctx
            .remote
            .get_group_attributes(&caller, group_id)
            .await?;
        self.remember_attribute_version(group_id, snapshot.version);
        Ok(snapshot.attributes)
    }

    /// 直播群在线人数
    pub async fn get_group_online_member_count(&self, group_id: &str) -> ImResult<u32> {
        require_group_id(group_id)?;
        let caller = self.ctx.caller()?;
        self.ctx
            .remote
            .get_group_online_member_count(&caller, group_id)
            .await
    }

    // ---------- 群计数器 ----------

    pub async fn set_group_counters(
        &self,
        group_id: &str,
        counters: BTreeMap<String, i64>,
    ) -> ImResult<BTreeMap<String, i64>> {
        require_group_id(group_id)?;
        if counters.is_empty() || counters.keys().any(|k| k.is_empty()) {
            return Err(ImError::invalid_param("计数器不能为空"));
        }
        let caller = self.ctx.caller()?;
        let cached = self.counter_versions.lock().get(group_id).copied();
        let known = match cached {
            Some(v) => v,
            None => {
                let current = self
                    .ctx
                    .remote
                    .get_group_counters(&caller, group_id, &[])
                    .await?;
                current.version
            }
        };
        match self
            .ctx
            .remote
            .set_group_counters(&caller, group_id, known, &counters)
            .await
        {
            Ok(snapshot) => Ok(self.pick_counters(group_id, snapshot, counters.keys())),
            Err(e) => {
                if e.code == err_code::ERR_GROUP_COUNTER_CONFLICT {
                    warn!("[GroupMgr] 群 {} 计数器版本过期: {}", group_id, e);
                    self.counter_versions.lock().remove(group_id);
                }
                Err(e)
            }
        }
    }

    /// 原子递增计数器，返回最新值
    pub async fn increase_group_counter(&self, group_id: &str, key: &str, value: i64) -> ImResult<i64> {
        require_group_id(group_id)?;
        if key.is_empty() {
            return Err(ImError::invalid_param("计数器 key 不能为空"));
        }
        let caller = self.ctx.caller()?;
        let snapshot = self
            .ctx
            .remote
            .increase_group_counter(&caller, group_id, key, value)
            .await?;
        let current = snapshot.counters.get(key).copied().unwrap_or(0);
        self.counter_versions
            .lock()
            .insert(group_id.to_string(), snapshot.version);
        Ok(current)
    }

    pub async fn decrease_group_counter(&self, group_id: &str, key: &str, value: i64) -> ImResult<i64> {
        self.increase_group_counter(group_id, key, value.saturating_neg())
            .await
    }

    /// 获取计数器，`keys` 为空返回全部
    pub async fn get_group_counters(
        &self,
        group_id: &str,
        keys: &[String],
    ) -> ImResult<BTreeMap<String, i64>> {
        require_group_id(group_id)?;
        let caller = self.ctx.caller()?;
        let snapshot = self
            .ctx
            .remote
            .get_group_counters(&caller, group_id, keys)
            .await?;
        self.counter_versions
            .lock()
            .insert(group_id.to_string(), snapshot.version);
        Ok(snapshot.counters)
    }

    fn pick_counters<'a>(
        &self,
        group_id: &str,
        snapshot: GroupCounters,
        keys: impl Iterator<Item = &'a String>,
    ) -> BTreeMap<String, i64> {
        self.counter_versions
            .lock()
            .insert(group_id.to_string(), snapshot.version);
        keys.filter_map(|k| snapshot.counters.get(k).map(|v| (k.clone(), *v)))
            .collect()
    }

    // ---------- 推送处理 ----------

    pub(crate) async fn handle_event(&self, event: GroupEvent) {
        let me = self.ctx.login_user().unwrap_or_default();
        let listeners = self.ctx.bus.group.snapshot();
        debug!("[GroupMgr] 📨 群事件: {:?}", event);
        match event {
            GroupEvent::Created { group } => {
                for l in &listeners {
                    l.on_group_created(group.clone()).await;
                }
            }
            GroupEvent::Dismissed { group_id, op_user } => {
                self.forget_group(&group_id);
                for l in &listeners {
                    l.on_group_dismissed(group_id.clone(), op_user.clone()).await;
                }
            }
            GroupEvent::InfoChanged { group, op_user } => {
                for l in &listeners {
                    l.on_group_info_changed(group.clone(), op_user.clone()).await;
                }
            }
            GroupEvent::MemberEntered { group_id, members } => {
                for l in &listeners {
                    l.on_member_enter(group_id.clone(), members.clone()).await;
                }
            }
            GroupEvent::MemberLeft { group_id, user_id } => {
                let is_me = user_id == me;
                if is_me {
                    self.forget_group(&group_id);
                }
                for l in &listeners {
                    l.on_member_leave(group_id.clone(), user_id.clone()).await;
                    if is_me {
                        l.on_quit_from_group(group_id.clone()).await;
                    }
                }
            }
            GroupEvent::MemberInvited {
                group_id,
                op_user,
                members,
            } => {
                for l in &listeners {
                    l.on_member_invited(group_id.clone(), op_user.clone(), members.clone())
                        .await;
                }
            }
            GroupEvent::MemberKicked {
                group_id,
                op_user,
                user_ids,
            } => {
                let is_me = user_ids.iter().any(|u| *u == me);
                if is_me {
                    self.forget_group(&group_id);
                }
                for l in &listeners {
                    l.on_member_kicked(group_id.clone(), op_user.clone(), user_ids.clone())
                        .await;
                    if is_me {
                        l.on_quit_from_group(group_id.clone()).await;
                    }
                }
            }
            GroupEvent::MemberInfoChanged { group_id, members } => {
                for l in &listeners {
                    l.on_member_info_changed(group_id.clone(), members.clone())
                        .await;
                }
            }
            GroupEvent::RoleChanged {
                group_id,
                op_user,
                user_id,
                role,
            } => {
                for l in &listeners {
                    if role == GroupMemberRole::Admin {
                        l.on_grant_administrator(group_id.clone(), op_user.clone(), user_id.clone())
                            .await;
                    } else {
                        l.on_revoke_administrator(group_id.clone(), op_user.clone(), user_id.clone())
                            .await;
                    }
                }
            }
            GroupEvent::OwnerChanged {
                group_id,
                new_owner,
            } => {
                for l in &listeners {
                    l.on_group_owner_changed(group_id.clone(), new_owner.clone())
                        .await;
                }
            }
            GroupEvent::ApplicationReceived { application } => {
                for l in &listeners {
                    l.on_receive_join_application(application.clone()).await;
                }
            }
            GroupEvent::ApplicationProcessed {
                group_id,
                op_user,
                accepted,
                reason,
            } => {
                for l in &listeners {
                    l.on_application_processed(
                        group_id.clone(),
                        op_user.clone(),
                        accepted,
                        reason.clone(),
                    )
                    .await;
                }
            }
            GroupEvent::AttributesChanged {
                group_id,
                attributes,
                version,
            } => {
                self.remember_attribute_version(&group_id, version);
                for l in &listeners {
                    l.on_group_attribute_changed(group_id.clone(), attributes.clone())
                        .await;
                }
            }
            GroupEvent::CounterChanged {
                group_id,
                key,
                value,
                version,
            } => {
                {
                    let mut versions = self.counter_versions.lock();
                    let slot = versions.entry(group_id.clone()).or_insert(version);
                    *slot = (*slot).max(version);
                }
                for l in &listeners {
                    l.on_group_counter_changed(group_id.clone(), key.clone(), value)
                        .await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::im::error::ErrorKind;
    use crate::im::group::listener::GroupListener;
    use crate::im::group::models::{CreateGroupMember, GroupType, COMMUNITY_GROUP_ID_PREFIX};
    use crate::im::testing::{recv_event, TestEnv};
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    #[derive(Debug, PartialEq)]
    enum Seen {
        Application(String),
        Processed(bool),
        Enter(String),
        Attr(usize),
        Counter(String, i64),
        Quit(String),
    }

    struct Recorder {
        tx: mpsc::UnboundedSender<Seen>,
    }

    #[async_trait]
    impl GroupListener for Recorder {
        async fn on_receive_join_application(&self, application: GroupApplication) {
            let _ = self.tx.send(Seen::Application(application.from_user));
        }
        async fn on_application_processed(
            &self,
            _group_id: String,
            _op_user: String,
            accepted: bool,
            _reason: String,
        ) {
            let _ = self.tx.send(Seen::Processed(accepted));
        }
        async fn on_member_enter(&self, _group_id: String, members: Vec<GroupMemberInfo>) {
            for m in members {
                let _ = self.tx.send(Seen::Enter(m.user_id));
            }
        }
        async fn on_group_attribute_changed(
            &self,
            _group_id: String,
            attributes: BTreeMap<String, String>,
        ) {
            let _ = self.tx.send(Seen::Attr(attributes.len()));
        }
        async fn on_group_counter_changed(&self, _group_id: String, key: String, value: i64) {
            let _ = self.tx.send(Seen::Counter(key, value));
        }
        async fn on_quit_from_group(&self, group_id: String) {
            let _ = self.tx.send(Seen::Quit(group_id));
        }
    }

    fn recorder(client: &crate::im::client::ImClient) -> mpsc::UnboundedReceiver<Seen> {
        let (tx, rx) = mpsc::unbounded_channel();
        client.add_group_listener(Arc::new(Recorder { tx }));
        rx
    }

    fn param(group_type: GroupType, id: &str) -> CreateGroupParam {
        let mut p = CreateGroupParam::new(group_type, "group");
        p.group_id = Some(id.to_string());
        p
    }

    #[tokio::test]
    async fn join_rules_follow_group_type() {
        let env = TestEnv::new();
        let alice = env.login("alice").await;
        let bob = env.login("bob").await;
        let mut alice_rx = recorder(&alice);
        let mut bob_rx = recorder(&bob);

        alice.group().create_group(param(GroupType::Work, "work1")).await.unwrap();
        let err = bob.group().join_group("work1", "").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Permission);

        alice
            .group()
            .create_group(param(GroupType::Meeting, "meet1"))
            .await
            .unwrap();
        assert_eq!(
            bob.group().join_group("meet1", "").await.unwrap(),
            JoinGroupResult::Joined
        );
        assert_eq!(recv_event(&mut alice_rx).await, Seen::Enter("bob".into()));
        assert_eq!(recv_event(&mut bob_rx).await, Seen::Enter("bob".into()));

        alice
            .group()
            .create_group(param(GroupType::Public, "pub1"))
            .await
            .unwrap();
        assert_eq!(
            bob.group().join_group("pub1", "let me in").await.unwrap(),
            JoinGroupResult::PendingApproval
        );
        assert_eq!(
            recv_event(&mut alice_rx).await,
            Seen::Application("bob".into())
        );
        let pending = alice.group().get_group_application_list().await.unwrap();
        assert_eq!(pending.len(), 1);
        alice
            .group()
            .accept_group_application("pub1", "bob", "welcome")
            .await
            .unwrap();
        // 先收到审批结果，再收到入群通知
        assert_eq!(recv_event(&mut bob_rx).await, Seen::Processed(true));
        assert_eq!(recv_event(&mut bob_rx).await, Seen::Enter("bob".into()));

        let joined = bob.group().get_joined_group_list().await.unwrap();
        assert_eq!(joined.len(), 2);

        bob.group().quit_group("meet1").await.unwrap();
        assert_eq!(recv_event(&mut bob_rx).await, Seen::Quit("meet1".into()));
    }

    #[tokio::test]
    async fn group_id_and_initial_member_rules() {
        let env = TestEnv::new();
        let alice = env.login("alice").await;

        let err = alice
            .group()
            .create_group(param(GroupType::Community, "plain"))
            .await
            .unwrap_err();
        assert_eq!(err.code, err_code::ERR_GROUP_ID_INVALID);
        let err = alice
            .group()
            .create_group(param(GroupType::Work, &format!("{COMMUNITY_GROUP_ID_PREFIX}x")))
            .await
            .unwrap_err();
        assert_eq!(err.code, err_code::ERR_GROUP_ID_INVALID);
        let err = alice
            .group()
            .create_group(param(GroupType::Work, &"x".repeat(49)))
            .await
            .unwrap_err();
        assert_eq!(err.code, err_code::ERR_GROUP_ID_INVALID);

        let mut live = CreateGroupParam::new(GroupType::AVChatRoom, "live");
        live.member_list.push(CreateGroupMember {
            user_id: "bob".into(),
            role: GroupMemberRole::Member,
        });
        let err = alice.group().create_group(live).await.unwrap_err();
        assert_eq!(err.code, err_code::ERR_GROUP_TYPE_NOT_SUPPORTED);

        let id = alice
            .group()
            .create_group(CreateGroupParam::new(GroupType::Community, "c"))
            .await
            .unwrap();
        assert!(id.starts_with(COMMUNITY_GROUP_ID_PREFIX));

        let live = alice
            .group()
            .create_group(CreateGroupParam::new(GroupType::AVChatRoom, "live"))
            .await
            .unwrap();
        assert_eq!(
            alice.group().get_group_online_member_count(&live).await.unwrap(),
            1
        );
        let err = alice
            .group()
            .transfer_group_owner(&live, "alice")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParam);
    }

    #[tokio::test]
    async fn stale_attribute_write_is_rejected() {
        let env = TestEnv::new();
        let alice = env.login("alice").await;
        let bob = env.login("bob").await;
        let mut bob_rx = recorder(&bob);
        alice
            .group()
            .create_group(param(GroupType::Meeting, "room"))
            .await
            .unwrap();
        bob.group().join_group("room", "").await.unwrap();
        assert_eq!(recv_event(&mut bob_rx).await, Seen::Enter("bob".into()));

        assert!(alice.group().get_group_attributes("room").await.unwrap().is_empty());
        assert!(bob.group().get_group_attributes("room").await.unwrap().is_empty());

        let one = |k: &str, v: &str| BTreeMap::from([(k.to_string(), v.to_string())]);
        // 两端都基于版本 0 写入，后到的一方版本过期
        let (a, b) = tokio::join!(
            alice.group().set_group_attributes("room", one("seat", "alice")),
            bob.group().set_group_attributes("room", one("seat", "bob")),
        );
        assert!(a.is_ok());
        assert_eq!(b.unwrap_err().kind, ErrorKind::Conflict);
        assert_eq!(recv_event(&mut bob_rx).await, Seen::Attr(1));

        // 丢弃缓存后重新获取版本再写即可成功
        bob.group()
            .set_group_attributes("room", one("mic", "bob"))
            .await
            .unwrap();
        let attrs = alice.group().get_group_attributes("room").await.unwrap();
        assert_eq!(attrs.get("seat").map(String::as_str), Some("alice"));
        assert_eq!(attrs.get("mic").map(String::as_str), Some("bob"));

        let err = alice
            .group()
            .set_group_attributes("room", one("big", &"v".repeat(4097)))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Oversize);
    }

    #[tokio::test]
    async fn attribute_writes_are_rate_limited() {
        let env = TestEnv::new();
        let alice = env.login("alice").await;
        alice
            .group()
            .create_group(param(GroupType::Work, "g"))
            .await
            .unwrap();
        for i in 0..10 {
            alice
                .group()
                .set_group_attributes("g", BTreeMap::from([(format!("k{i}"), "v".into())]))
                .await
                .unwrap();
        }
        let err = alice
            .group()
            .delete_group_attributes("g", vec![])
            .await
            .unwrap_err();
        assert_eq!(err.code, err_code::ERR_GROUP_ATTRIBUTE_FREQUENCY_LIMIT);
        assert_eq!(err.kind, ErrorKind::RateLimit);

        env.clock.advance_ms(5000);
        alice.group().delete_group_attributes("g", vec![]).await.unwrap();
        assert!(alice.group().get_group_attributes("g").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn joined_list_is_rate_limited() {
        let env = TestEnv::new();
        let alice = env.login("alice").await;
        for _ in 0..10 {
            alice.group().get_joined_group_list().await.unwrap();
        }
        let err = alice.group().get_joined_group_list().await.unwrap_err();
        assert_eq!(err.code, err_code::ERR_SDK_COMM_API_CALL_FREQUENCY_LIMIT);
        env.clock.advance_ms(1000);
        alice.group().get_joined_group_list().await.unwrap();
    }

    #[tokio::test]
    async fn counters_increase_and_decrease() {
        let env = TestEnv::new();
        let alice = env.login("alice").await;
        let mut rx = recorder(&alice);
        alice
            .group()
            .create_group(param(GroupType::Work, "cnt"))
            .await
            .unwrap();

        let set = alice
            .group()
            .set_group_counters("cnt", BTreeMap::from([("likes".to_string(), 10)]))
            .await
            .unwrap();
        assert_eq!(set.get("likes"), Some(&10));
        assert_eq!(recv_event(&mut rx).await, Seen::Counter("likes".into(), 10));

        assert_eq!(
            alice.group().increase_group_counter("cnt", "likes", 5).await.unwrap(),
            15
        );
        assert_eq!(
            alice.group().decrease_group_counter("cnt", "likes", 20).await.unwrap(),
            -5
        );
        let all = alice.group().get_group_counters("cnt", &[]).await.unwrap();
        assert_eq!(all.get("likes"), Some(&-5));
    }

    #[tokio::test]
    async fn stale_counter_write_is_rejected() {
        let env = TestEnv::new();
        let alice = env.login("alice").await;
        let bob = env.login("bob").await;
        let mut bob_rx = recorder(&bob);
        alice
            .group()
            .create_group(param(GroupType::Meeting, "votes"))
            .await
            .unwrap();
        bob.group().join_group("votes", "").await.unwrap();
        assert_eq!(recv_event(&mut bob_rx).await, Seen::Enter("bob".into()));

        let one = |k: &str, v: i64| BTreeMap::from([(k.to_string(), v)]);
        // alice 缓存了版本 1，bob 随后递增使服务端版本前进
        alice
            .group()
            .set_group_counters("votes", one("yes", 1))
            .await
            .unwrap();
        assert_eq!(recv_event(&mut bob_rx).await, Seen::Counter("yes".into(), 1));
        assert_eq!(
            bob.group().increase_group_counter("votes", "yes", 2).await.unwrap(),
            3
        );

        let err = alice
            .group()
            .set_group_counters("votes", one("yes", 10))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
        assert_eq!(err.code, err_code::ERR_GROUP_COUNTER_CONFLICT);
        assert!(alice.group().counter_versions.lock().get("votes").is_none());
        let current = bob.group().get_group_counters("votes", &[]).await.unwrap();
        assert_eq!(current.get("yes"), Some(&3));

        // 缓存已丢弃，重试时先取最新版本
        let retried = alice
            .group()
            .set_group_counters("votes", one("yes", 10))
            .await
            .unwrap();
        assert_eq!(retried.get("yes"), Some(&10));
        let all = bob.group().get_group_counters("votes", &[]).await.unwrap();
        assert_eq!(all.get("yes"), Some(&10));
    }
}
