//! 关系链管理
//!
//! 好友关系是有方向的边：A 的好友列表里有 B 不代表 B 的列表里有 A。
//! 关系链以服务端为准，本地只做参数校验，变更通过推送回调给监听器。

use crate::im::context::ImContext;
use crate::im::error::{ImError, ImResult};
use crate::im::friend::models::{
    AllowType, FriendAddApplication, FriendApplication, FriendApplicationType, FriendCheckResult,
    FriendGroup, FriendInfo, FriendInfoResult, FriendOperationResult, FriendResponseType,
    FriendType,
};
use crate::im::remote::FriendEvent;
use std::sync::Arc;
use tracing::{debug, info};

pub struct FriendshipManager {
    ctx: Arc<ImContext>,
}

/// 校验用户列表：非空、不含空 ID、不含自己
fn check_peers(user_ids: &[String], me: &str) -> ImResult<()> {
    if user_ids.is_empty() {
        return Err(ImError::invalid_param("用户列表不能为空"));
    }
    if let Some(bad) = user_ids.iter().find(|u| u.is_empty() || *u == me) {
        return Err(ImError::invalid_param(format!("非法的用户 ID: `{bad}`")));
    }
    Ok(())
}

fn check_group_name(name: &str) -> ImResult<()> {
    if name.trim().is_empty() {
        return Err(ImError::invalid_param("分组名不能为空"));
    }
    Ok(())
}

impl FriendshipManager {
    pub fn new(ctx: Arc<ImContext>) -> Self {
        Self { ctx }
    }

    /// 添加好友
    ///
    /// 对方需要验证时返回的 `result_code` 为
    /// [`FRIEND_APPLICATION_PENDING`](crate::im::error::err_code::FRIEND_APPLICATION_PENDING)，不是错误。
    pub async fn add_friend(&self, application: FriendAddApplication) -> ImResult<FriendOperationResult> {
        let caller = self.ctx.caller()?;
        check_peers(std::slice::from_ref(&application.user_id), &caller.user_id)?;
        let result = self.ctx.remote.add_friend(&caller, &application).await?;
        info!(
            "[FriendMgr] ➕ 添加好友 {} ({:?}) 结果码: {}",
            application.user_id, application.add_type, result.result_code
        );
        Ok(result)
    }

    /// 删除好友，`Single` 只删除自己这一侧
    pub async fn delete_from_friend_list(
        &self,
        user_ids: &[String],
        delete_type: FriendType,
    ) -> ImResult<Vec<FriendOperationResult>> {
        let caller = self.ctx.caller()?;
        check_peers(user_ids, &caller.user_id)?;
        self.ctx
            .remote
            .delete_friends(&caller, user_ids, delete_type)
            .await
    }

    pub async fn get_friend_list(&self) -> ImResult<Vec<FriendInfo>> {
        let caller = self.ctx.caller()?;
        self.ctx.remote.get_friend_list(&caller).await
    }

    pub async fn get_friends_info(&self, user_ids: &[String]) -> ImResult<Vec<FriendInfoResult>> {
        let caller = self.ctx.caller()?;
        check_peers(user_ids, &caller.user_id)?;
        self.ctx.remote.get_friends_info(&caller, user_ids).await
    }

    pub async fn set_friend_remark(&self, user_id: &str, remark: &str) -> ImResult<()> {
        let caller = self.ctx.caller()?;
        check_peers(&[user_id.to_string()], &caller.user_id)?;
        self.ctx
            .remote
            .set_friend_remark(&caller, user_id, remark)
            .await
    }

    /// 检查好友关系（四值）
    pub async fn check_friend(
        &self,
        user_ids: &[String],
        check_type: FriendType,
    ) -> ImResult<Vec<FriendCheckResult>> {
        let caller = self.ctx.caller()?;
        check_peers(user_ids, &caller.user_id)?;
        self.ctx
            .remote
            .check_friend(&caller, user_ids, check_type)
            .await
    }

    // ---------- 好友申请 ----------

    pub async fn get_friend_application_list(&self) -> ImResult<Vec<FriendApplication>> {
        let caller = self.ctx.caller()?;
        self.ctx.remote.get_friend_applications(&caller).await
    }

    pub async fn accept_friend_application(
        &self,
        user_id: &str,
        response: FriendResponseType,
    ) -> ImResult<FriendOperationResult> {
        let caller = self.ctx.caller()?;
        self.ctx
            .remote
            .accept_friend_application(&caller, user_id, response)
            .await
    }

    pub async fn refuse_friend_application(&self, user_id: &str) -> ImResult<FriendOperationResult> {
        let caller = self.ctx.caller()?;
        self.ctx
            .remote
            .refuse_friend_application(&caller, user_id)
            .await
    }

    pub async fn delete_friend_application(
        &self,
        user_id: &str,
        application_type: FriendApplicationType,
    ) -> ImResult<()> {
        let caller = self.ctx.caller()?;
        self.ctx
            .remote
            .delete_friend_application(&caller, user_id, application_type)
            .await
    }

    // ---------- 黑名单 ----------

    /// 拉黑会同时解除双向好友关系
    pub async fn add_to_black_list(&self, user_ids: &[String]) -> ImResult<Vec<FriendOperationResult>> {
        let caller = self.ctx.caller()?;
        check_peers(user_ids, &caller.user_id)?;
        self.ctx.remote.add_to_blacklist(&caller, user_ids).await
    }

    pub async fn delete_from_black_list(
        &self,
        user_ids: &[String],
    ) -> ImResult<Vec<FriendOperationResult>> {
        let caller = self.ctx.caller()?;
        check_peers(user_ids, &caller.user_id)?;
        self.ctx.remote.delete_from_blacklist(&caller, user_ids).await
    }

    pub async fn get_black_list(&self) -> ImResult<Vec<String>> {
        let caller = self.ctx.caller()?;
        self.ctx.remote.get_blacklist(&caller).await
    }

    pub async fn set_self_allow_type(&self, allow_type: AllowType) -> ImResult<()> {
        let caller = self.ctx.caller()?;
        self.ctx.remote.set_allow_type(&caller, allow_type).await
    }

    pub async fn get_self_allow_type(&self) -> ImResult<AllowType> {
        let caller = self.ctx.caller()?;
        self.ctx.remote.get_allow_type(&caller).await
    }

    // ---------- 好友分组 ----------

    pub async fn create_friend_group(
        &self,
        name: &str,
        user_ids: &[String],
    ) -> ImResult<Vec<FriendOperationResult>> {
        check_group_name(name)?;
        let caller = self.ctx.caller()?;
        self.ctx
            .remote
            .create_friend_group(&caller, name, user_ids)
            .await
    }

    /// `names` 为空返回全部分组
    pub async fn get_friend_groups(&self, names: &[String]) -> ImResult<Vec<FriendGroup>> {
        let caller = self.ctx.caller()?;
        self.ctx.remote.get_friend_groups(&caller, names).await
    }

    pub async fn delete_friend_groups(&self, names: &[String]) -> ImResult<()> {
        if names.is_empty() {
            return Err(ImError::invalid_param("分组列表不能为空"));
        }
        let caller = self.ctx.caller()?;
        self.ctx.remote.delete_friend_groups(&caller, names).await
    }

    pub async fn rename_friend_group(&self, old_name: &str, new_name: &str) -> ImResult<()> {
        check_group_name(old_name)?;
        check_group_name(new_name)?;
        let caller = self.ctx.caller()?;
        self.ctx
            .remote
            .rename_friend_group(&caller, old_name, new_name)
            .await
    }

    pub async fn add_friends_to_friend_group(
        &self,
        name: &str,
        user_ids: &[String],
    ) -> ImResult<Vec<FriendOperationResult>> {
        check_group_name(name)?;
        let caller = self.ctx.caller()?;
        check_peers(user_ids, &caller.user_id)?;
        self.ctx
            .remote
            .add_friends_to_friend_group(&caller, name, user_ids)
            .await
    }

    pub async fn delete_friends_from_friend_group(
        &self,
        name: &str,
        user_ids: &[String],
    ) -> ImResult<Vec<FriendOperationResult>> {
        check_group_name(name)?;
        let caller = self.ctx.caller()?;
        check_peers(user_ids, &caller.user_id)?;
        self.ctx
            .remote
            .delete_friends_from_friend_group(&caller, name, user_ids)
            .await
    }

    // ---------- 推送处理 ----------

    pub(crate) async fn handle_event(&self, event: FriendEvent) {
        debug!("[FriendMgr] 📨 关系链事件: {:?}", event);
        let listeners = self.ctx.bus.friendship.snapshot();
        for l in &listeners {
            match &event {
                FriendEvent::ApplicationAdded(apps) => {
                    l.on_friend_application_list_added(apps.clone()).await
                }
                FriendEvent::ApplicationDeleted(ids) => {
                    l.on_friend_application_list_deleted(ids.clone()).await
                }
                FriendEvent::FriendAdded(friends) => l.on_friend_list_added(friends.clone()).await,
                FriendEvent::FriendDeleted(ids) => l.on_friend_list_deleted(ids.clone()).await,
                FriendEvent::FriendInfoChanged(friends) => {
                    l.on_friend_info_changed(friends.clone()).await
                }
                FriendEvent::BlacklistAdded(ids) => l.on_blacklist_added(ids.clone()).await,
                FriendEvent::BlacklistDeleted(ids) => l.on_blacklist_deleted(ids.clone()).await,
                FriendEvent::FriendGroupCreated { name, user_ids } => {
                    l.on_friend_group_created(name.clone(), user_ids.clone())
                        .await
                }
                FriendEvent::FriendGroupDeleted(names) => {
                    l.on_friend_group_deleted(names.clone()).await
                }
                FriendEvent::FriendGroupRenamed { old_name, new_name } => {
                    l.on_friend_group_name_changed(old_name.clone(), new_name.clone())
                        .await
                }
                FriendEvent::FriendsAddedToGroup { name, user_ids } => {
                    l.on_friends_added_to_group(name.clone(), user_ids.clone())
                        .await
                }
                FriendEvent::FriendsDeletedFromGroup { name, user_ids } => {
                    l.on_friends_deleted_from_group(name.clone(), user_ids.clone())
                        .await
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::im::error::{err_code, ErrorKind};
    use crate::im::friend::listener::FriendshipListener;
    use crate::im::friend::models::FriendRelation;
    use crate::im::testing::{recv_event, TestEnv};
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    #[derive(Debug, PartialEq)]
    enum Seen {
        ApplicationAdded(String),
        ApplicationDeleted(String),
        FriendAdded(String),
        FriendDeleted(String),
        Blacklisted(Vec<String>),
        GroupRenamed(String),
    }

    struct Recorder {
        tx: mpsc::UnboundedSender<Seen>,
    }

    #[async_trait]
    impl FriendshipListener for Recorder {
        async fn on_friend_application_list_added(&self, applications: Vec<FriendApplication>) {
            for a in applications {
                let _ = self.tx.send(Seen::ApplicationAdded(a.user_id));
            }
        }
        async fn on_friend_application_list_deleted(&self, user_ids: Vec<String>) {
            for u in user_ids {
                let _ = self.tx.send(Seen::ApplicationDeleted(u));
            }
        }
        async fn on_friend_list_added(&self, friends: Vec<FriendInfo>) {
            for f in friends {
                let _ = self.tx.send(Seen::FriendAdded(f.user_id));
            }
        }
        async fn on_friend_list_deleted(&self, user_ids: Vec<String>) {
            for u in user_ids {
                let _ = self.tx.send(Seen::FriendDeleted(u));
            }
        }
        async fn on_blacklist_added(&self, user_ids: Vec<String>) {
            let _ = self.tx.send(Seen::Blacklisted(user_ids));
        }
        async fn on_friend_group_name_changed(&self, _old_name: String, new_name: String) {
            let _ = self.tx.send(Seen::GroupRenamed(new_name));
        }
    }

    fn recorder(client: &crate::im::client::ImClient) -> mpsc::UnboundedReceiver<Seen> {
        let (tx, rx) = mpsc::unbounded_channel();
        client.add_friendship_listener(Arc::new(Recorder { tx }));
        rx
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn application_flow_and_four_valued_check() {
        let env = TestEnv::new();
        let alice = env.login("alice").await;
        let bob = env.login("bob").await;
        let mut alice_rx = recorder(&alice);
        let mut bob_rx = recorder(&bob);

        let res = alice
            .friendship()
            .add_friend(FriendAddApplication::new("bob", FriendType::Both))
            .await
            .unwrap();
        assert_eq!(res.result_code, err_code::FRIEND_APPLICATION_PENDING);
        assert_eq!(
            recv_event(&mut alice_rx).await,
            Seen::ApplicationAdded("bob".into())
        );
        assert_eq!(
            recv_event(&mut bob_rx).await,
            Seen::ApplicationAdded("alice".into())
        );

        let apps = bob.friendship().get_friend_application_list().await.unwrap();
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].application_type, FriendApplicationType::ComeIn);

        bob.friendship()
            .accept_friend_application("alice", FriendResponseType::AgreeAndAdd)
            .await
            .unwrap();
        assert_eq!(
            recv_event(&mut bob_rx).await,
            Seen::ApplicationDeleted("alice".into())
        );
        assert_eq!(recv_event(&mut bob_rx).await, Seen::FriendAdded("alice".into()));
        assert_eq!(
            recv_event(&mut alice_rx).await,
            Seen::ApplicationDeleted("bob".into())
        );
        assert_eq!(recv_event(&mut alice_rx).await, Seen::FriendAdded("bob".into()));

        let check = alice
            .friendship()
            .check_friend(&ids(&["bob"]), FriendType::Both)
            .await
            .unwrap();
        assert_eq!(check[0].relation, FriendRelation::BothWay);

        // 单向删除后对方仍保留我
        alice
            .friendship()
            .delete_from_friend_list(&ids(&["bob"]), FriendType::Single)
            .await
            .unwrap();
        assert_eq!(recv_event(&mut alice_rx).await, Seen::FriendDeleted("bob".into()));
        let check = alice
            .friendship()
            .check_friend(&ids(&["bob"]), FriendType::Both)
            .await
            .unwrap();
        assert_eq!(check[0].relation, FriendRelation::InPeerList);
        let check = bob
            .friendship()
            .check_friend(&ids(&["alice"]), FriendType::Both)
            .await
            .unwrap();
        assert_eq!(check[0].relation, FriendRelation::InMyList);
    }

    #[tokio::test]
    async fn blacklist_and_allow_type() {
        let env = TestEnv::new();
        let alice = env.login("alice").await;
        let bob = env.login("bob").await;
        let mut bob_rx = recorder(&bob);

        bob.friendship()
            .add_to_black_list(&ids(&["alice"]))
            .await
            .unwrap();
        assert_eq!(
            recv_event(&mut bob_rx).await,
            Seen::Blacklisted(ids(&["alice"]))
        );
        assert_eq!(bob.friendship().get_black_list().await.unwrap(), ids(&["alice"]));

        let res = alice
            .friendship()
            .add_friend(FriendAddApplication::new("bob", FriendType::Both))
            .await
            .unwrap();
        assert_eq!(res.result_code, err_code::ERR_IN_PEER_BLACKLIST);

        bob.friendship()
            .delete_from_black_list(&ids(&["alice"]))
            .await
            .unwrap();
        bob.friendship()
            .set_self_allow_type(AllowType::AllowAny)
            .await
            .unwrap();
        assert_eq!(
            bob.friendship().get_self_allow_type().await.unwrap(),
            AllowType::AllowAny
        );
        let res = alice
            .friendship()
            .add_friend(FriendAddApplication::new("bob", FriendType::Single))
            .await
            .unwrap();
        assert_eq!(res.result_code, err_code::SUCC);
        let list = alice.friendship().get_friend_list().await.unwrap();
        assert_eq!(list.len(), 1);

        bob.friendship()
            .set_self_allow_type(AllowType::DenyAny)
            .await
            .unwrap();
        let carol = env.login("carol").await;
        let res = carol
            .friendship()
            .add_friend(FriendAddApplication::new("bob", FriendType::Both))
            .await
            .unwrap();
        assert_eq!(res.result_code, err_code::ERR_PEER_DENY_ANY);

        let err = alice
            .friendship()
            .add_friend(FriendAddApplication::new("alice", FriendType::Both))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParam);
    }

    #[tokio::test]
    async fn friend_groups() {
        let env = TestEnv::new();
        let alice = env.login("alice").await;
        let bob = env.login("bob").await;
        let mut alice_rx = recorder(&alice);
        alice
            .friendship()
            .set_self_allow_type(AllowType::AllowAny)
            .await
            .unwrap();
        bob.friendship()
            .set_self_allow_type(AllowType::AllowAny)
            .await
            .unwrap();
        alice
            .friendship()
            .add_friend(FriendAddApplication::new("bob", FriendType::Both))
            .await
            .unwrap();
        assert_eq!(recv_event(&mut alice_rx).await, Seen::FriendAdded("bob".into()));

        let res = alice
            .friendship()
            .create_friend_group("work", &ids(&["bob", "nobody"]))
            .await
            .unwrap();
        assert_eq!(res[0].result_code, err_code::SUCC);
        assert_eq!(res[1].result_code, err_code::ERR_FRIEND_NOT_FOUND);

        let err = alice
            .friendship()
            .create_friend_group("work", &[])
            .await
            .unwrap_err();
        assert_eq!(err.code, err_code::ERR_FRIEND_GROUP_EXISTS);

        alice
            .friendship()
            .rename_friend_group("work", "colleagues")
            .await
            .unwrap();
        assert_eq!(
            recv_event(&mut alice_rx).await,
            Seen::GroupRenamed("colleagues".into())
        );
        let groups = alice.friendship().get_friend_groups(&[]).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].friend_list, ids(&["bob"]));

        alice
            .friendship()
            .delete_friends_from_friend_group("colleagues", &ids(&["bob"]))
            .await
            .unwrap();
        alice
            .friendship()
            .delete_friend_groups(&ids(&["colleagues"]))
            .await
            .unwrap();
        let err = alice
            .friendship()
            .delete_friend_groups(&ids(&["colleagues"]))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
}
