//! 内存服务端：关系链

use super::ServerState;
use crate::im::error::{err_code, ImError, ImResult};
use crate::im::friend::models::{
    AllowType, FriendAddApplication, FriendApplication, FriendApplicationType, FriendCheckResult,
    FriendGroup, FriendInfo, FriendInfoResult, FriendOperationResult, FriendRelation,
    FriendResponseType, FriendType,
};
use crate::im::remote::push::{FriendEvent, ServerPush};
use crate::im::remote::Caller;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// 待处理的好友申请（from → to）
#[derive(Clone)]
struct PendingApplication {
    add_type: FriendType,
    remark: String,
    add_wording: String,
    add_source: String,
    friend_group: String,
    add_time: i64,
}

#[derive(Default)]
pub(super) struct FriendStore {
    /// owner → (peer → 资料)，表示 peer 在 owner 的好友列表里
    lists: HashMap<String, BTreeMap<String, FriendInfo>>,
    /// (from, to) → 申请
    applications: BTreeMap<(String, String), PendingApplication>,
    blacklists: HashMap<String, BTreeSet<String>>,
    pub(super) allow: HashMap<String, AllowType>,
    /// owner → (分组名 → 成员)
    groups: HashMap<String, BTreeMap<String, BTreeSet<String>>>,
}

impl FriendStore {
    pub(super) fn is_blacklisted(&self, owner: &str, target: &str) -> bool {
        self.blacklists
            .get(owner)
            .is_some_and(|set| set.contains(target))
    }

    fn has_edge(&self, owner: &str, peer: &str) -> bool {
        self.lists
            .get(owner)
            .is_some_and(|list| list.contains_key(peer))
    }

    /// 好友资料，分组信息实时从分组表计算
    fn info_of(&self, owner: &str, peer: &str) -> Option<FriendInfo> {
        let mut info = self.lists.get(owner)?.get(peer)?.clone();
        info.friend_groups = self
            .groups
            .get(owner)
            .map(|groups| {
                groups
                    .iter()
                    .filter(|(_, members)| members.contains(peer))
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default();
        Some(info)
    }

    pub(super) fn friend_list(&self, owner: &str) -> Vec<FriendInfo> {
        self.lists
            .get(owner)
            .map(|list| {
                list.keys()
                    .filter_map(|peer| self.info_of(owner, peer))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(super) fn friends_info(&self, owner: &str, user_ids: &[String]) -> Vec<FriendInfoResult> {
        user_ids
            .iter()
            .map(|peer| FriendInfoResult {
                user_id: peer.clone(),
                relation: self.relation(owner, peer),
                friend_info: self.info_of(owner, peer),
            })
            .collect()
    }

    fn relation(&self, owner: &str, peer: &str) -> FriendRelation {
        FriendRelation::from_edges(self.has_edge(owner, peer), self.has_edge(peer, owner))
    }

    /// 单向检查只看对方是否在我的列表中
    pub(super) fn check_friend(
        &self,
        owner: &str,
        user_ids: &[String],
        check_type: FriendType,
    ) -> Vec<FriendCheckResult> {
        user_ids
            .iter()
            .map(|peer| FriendCheckResult {
                user_id: peer.clone(),
                relation: match check_type {
                    FriendType::Both => self.relation(owner, peer),
                    FriendType::Single => {
                        FriendRelation::from_edges(self.has_edge(owner, peer), false)
                    }
                },
            })
            .collect()
    }

    fn application_view(
        key: &(String, String),
        app: &PendingApplication,
        viewer: &str,
    ) -> FriendApplication {
        let (from, to) = key;
        let (user_id, application_type) = if from == viewer {
            (to.clone(), FriendApplicationType::SendOut)
        } else {
            (from.clone(), FriendApplicationType::ComeIn)
        };
        FriendApplication {
            user_id,
            application_type,
            add_type: app.add_type,
            add_wording: app.add_wording.clone(),
            add_source: app.add_source.clone(),
            add_time: app.add_time,
        }
    }

    pub(super) fn applications_of(&self, owner: &str) -> Vec<FriendApplication> {
        self.applications
            .iter()
            .filter(|((from, to), _)| from == owner || to == owner)
            .map(|(key, app)| Self::application_view(key, app, owner))
            .collect()
    }

    pub(super) fn blacklist_of(&self, owner: &str) -> Vec<String> {
        self.blacklists
            .get(owner)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub(super) fn allow_type_of(&self, owner: &str) -> AllowType {
        self.allow.get(owner).copied().unwrap_or_default()
    }

    pub(super) fn friend_groups_of(&self, owner: &str, names: &[String]) -> Vec<FriendGroup> {
        let Some(groups) = self.groups.get(owner) else {
            return Vec::new();
        };
        groups
            .iter()
            .filter(|(name, _)| names.is_empty() || names.contains(name))
            .map(|(name, members)| FriendGroup {
                name: name.clone(),
                friend_count: members.len(),
                friend_list: members.iter().cloned().collect(),
            })
            .collect()
    }

    fn insert_edge(
        &mut self,
        owner: &str,
        peer: &str,
        app: &PendingApplication,
        remark: &str,
        friend_group: &str,
    ) {
        self.lists.entry(owner.to_string()).or_default().insert(
            peer.to_string(),
            FriendInfo {
                user_id: peer.to_string(),
                remark: remark.to_string(),
                friend_groups: Vec::new(),
                add_source: app.add_source.clone(),
                add_wording: app.add_wording.clone(),
                add_time: app.add_time,
            },
        );
        if !friend_group.is_empty() {
            self.groups
                .entry(owner.to_string())
                .or_default()
                .entry(friend_group.to_string())
                .or_default()
                .insert(peer.to_string());
        }
    }

    fn remove_edge(&mut self, owner: &str, peer: &str) -> bool {
        let removed = self
            .lists
            .get_mut(owner)
            .is_some_and(|list| list.remove(peer).is_some());
        if let Some(groups) = self.groups.get_mut(owner) {
            for members in groups.values_mut() {
                members.remove(peer);
            }
        }
        removed
    }

    fn group_exists(&self, owner: &str, name: &str) -> bool {
        self.groups
            .get(owner)
            .is_some_and(|groups| groups.contains_key(name))
    }
}

fn friend_group_not_found(name: &str) -> ImError {
    ImError::new(
        err_code::ERR_FRIEND_GROUP_NOT_FOUND,
        format!("好友分组不存在: {name}"),
    )
}

impl ServerState {
    fn push_friend(&self, user_id: &str, event: FriendEvent) {
        self.hub.push(user_id, ServerPush::Friend(event));
    }

    /// 建立好友关系并通知相关用户
    fn make_friends(
        &mut self,
        owner: &str,
        peer: &str,
        app: &PendingApplication,
        both_way: bool,
    ) {
        self.friends
            .insert_edge(owner, peer, app, &app.remark, &app.friend_group);
        if let Some(info) = self.friends.info_of(owner, peer) {
            self.push_friend(owner, FriendEvent::FriendAdded(vec![info]));
        }
        if both_way && !self.friends.has_edge(peer, owner) {
            self.friends.insert_edge(peer, owner, app, "", "");
            if let Some(info) = self.friends.info_of(peer, owner) {
                self.push_friend(peer, FriendEvent::FriendAdded(vec![info]));
            }
        }
    }

    pub(super) fn add_friend(
        &mut self,
        caller: &Caller,
        application: &FriendAddApplication,
        now: i64,
    ) -> ImResult<FriendOperationResult> {
        let me = caller.user_id.as_str();
        let peer = application.user_id.as_str();
        if peer.is_empty() || peer == me {
            return Err(ImError::invalid_param("不能添加自己为好友"));
        }
        let already = match application.add_type {
            FriendType::Single => self.friends.has_edge(me, peer),
            FriendType::Both => self.friends.has_edge(me, peer) && self.friends.has_edge(peer, me),
        };
        if already {
            return Ok(FriendOperationResult::fail(
                peer,
                err_code::ERR_FRIEND_ALREADY_EXISTS,
                "已经是好友",
            ));
        }
        if self.friends.is_blacklisted(me, peer) {
            return Ok(FriendOperationResult::fail(
                peer,
                err_code::ERR_IN_SELF_BLACKLIST,
                "对方在你的黑名单中",
            ));
        }
        if self.friends.is_blacklisted(peer, me) {
            return Ok(FriendOperationResult::fail(
                peer,
                err_code::ERR_IN_PEER_BLACKLIST,
                "你已被对方拉黑",
            ));
        }
        let pending = PendingApplication {
            add_type: application.add_type,
            remark: application.remark.clone(),
            add_wording: application.add_wording.clone(),
            add_source: application.add_source.clone(),
            friend_group: application.friend_group.clone(),
            add_time: now,
        };
        match self.friends.allow_type_of(peer) {
            AllowType::DenyAny => Ok(FriendOperationResult::fail(
                peer,
                err_code::ERR_PEER_DENY_ANY,
                "对方拒绝任何人加好友",
            )),
            AllowType::AllowAny => {
                self.make_friends(me, peer, &pending, application.add_type == FriendType::Both);
                Ok(FriendOperationResult::ok(peer))
            }
            AllowType::NeedConfirm => {
                let key = (me.to_string(), peer.to_string());
                for viewer in [me, peer] {
                    let view = FriendStore::application_view(&key, &pending, viewer);
                    self.push_friend(viewer, FriendEvent::ApplicationAdded(vec![view]));
                }
                self.friends.applications.insert(key, pending);
                debug!("[MemoryServer] 📮 {} 向 {} 发出好友申请", me, peer);
                Ok(FriendOperationResult::fail(
                    peer,
                    err_code::FRIEND_APPLICATION_PENDING,
                    "已发出申请，等待对方确认",
                ))
            }
        }
    }

    pub(super) fn delete_friends(
        &mut self,
        caller: &Caller,
        user_ids: &[String],
        delete_type: FriendType,
    ) -> Vec<FriendOperationResult> {
        let me = caller.user_id.as_str();
        let mut results = Vec::with_capacity(user_ids.len());
        for peer in user_ids {
            let mine = self.friends.remove_edge(me, peer);
            let theirs = delete_type == FriendType::Both && self.friends.remove_edge(peer, me);
            if mine {
                self.push_friend(me, FriendEvent::FriendDeleted(vec![peer.clone()]));
            }
            if theirs {
                self.push_friend(peer, FriendEvent::FriendDeleted(vec![me.to_string()]));
            }
            results.push(if mine || theirs {
                FriendOperationResult::ok(peer)
            } else {
                FriendOperationResult::fail(peer, err_code::ERR_FRIEND_NOT_FOUND, "不是好友")
            });
        }
        results
    }

    pub(super) fn set_friend_remark(
        &mut self,
        caller: &Caller,
        user_id: &str,
        remark: &str,
    ) -> ImResult<()> {
        let Some(info) = self
            .friends
            .lists
            .get_mut(&caller.user_id)
            .and_then(|list| list.get_mut(user_id))
        else {
            return Err(ImError::new(err_code::ERR_FRIEND_NOT_FOUND, "不是好友"));
        };
        info.remark = remark.to_string();
        if let Some(info) = self.friends.info_of(&caller.user_id, user_id) {
            self.push_friend(&caller.user_id, FriendEvent::FriendInfoChanged(vec![info]));
        }
        Ok(())
    }

    pub(super) fn accept_friend_application(
        &mut self,
        caller: &Caller,
        user_id: &str,
        response: FriendResponseType,
        _now: i64,
    ) -> ImResult<FriendOperationResult> {
        let key = (user_id.to_string(), caller.user_id.clone());
        let Some(app) = self.friends.applications.remove(&key) else {
            return Err(ImError::new(
                err_code::ERR_FRIEND_APPLICATION_NOT_FOUND,
                format!("没有来自 {user_id} 的好友申请"),
            ));
        };
        self.push_friend(
            &caller.user_id,
            FriendEvent::ApplicationDeleted(vec![user_id.to_string()]),
        );
        self.push_friend(
            user_id,
            FriendEvent::ApplicationDeleted(vec![caller.user_id.clone()]),
        );
        // 申请者一侧总是加上；AgreeAndAdd 同时把申请者加入自己的列表
        self.make_friends(
            user_id,
            &caller.user_id,
            &app,
            response == FriendResponseType::AgreeAndAdd,
        );
        Ok(FriendOperationResult::ok(user_id))
    }

    pub(super) fn refuse_friend_application(
        &mut self,
        caller: &Caller,
        user_id: &str,
    ) -> ImResult<FriendOperationResult> {
        let key = (user_id.to_string(), caller.user_id.clone());
        if self.friends.applications.remove(&key).is_none() {
            return Err(ImError::new(
                err_code::ERR_FRIEND_APPLICATION_NOT_FOUND,
                format!("没有来自 {user_id} 的好友申请"),
            ));
        }
        self.push_friend(
            &caller.user_id,
            FriendEvent::ApplicationDeleted(vec![user_id.to_string()]),
        );
        self.push_friend(
            user_id,
            FriendEvent::ApplicationDeleted(vec![caller.user_id.clone()]),
        );
        Ok(FriendOperationResult::ok(user_id))
    }

    pub(super) fn delete_friend_application(
        &mut self,
        caller: &Caller,
        user_id: &str,
        application_type: FriendApplicationType,
    ) -> ImResult<()> {
        let key = match application_type {
            FriendApplicationType::ComeIn => (user_id.to_string(), caller.user_id.clone()),
            FriendApplicationType::SendOut => (caller.user_id.clone(), user_id.to_string()),
        };
        if self.friends.applications.remove(&key).is_none() {
            return Err(ImError::new(
                err_code::ERR_FRIEND_APPLICATION_NOT_FOUND,
                "好友申请不存在",
            ));
        }
        self.push_friend(
            &caller.user_id,
            FriendEvent::ApplicationDeleted(vec![user_id.to_string()]),
        );
        Ok(())
    }

    pub(super) fn add_to_blacklist(
        &mut self,
        caller: &Caller,
        user_ids: &[String],
    ) -> Vec<FriendOperationResult> {
        let me = caller.user_id.clone();
        let mut results = Vec::with_capacity(user_ids.len());
        let mut added = Vec::new();
        for peer in user_ids {
            if *peer == me {
                results.push(FriendOperationResult::fail(
                    peer,
                    err_code::ERR_INVALID_PARAMETERS,
                    "不能拉黑自己",
                ));
                continue;
            }
            self.friends
                .blacklists
                .entry(me.clone())
                .or_default()
                .insert(peer.clone());
            // 拉黑同时解除双向好友关系和未处理的申请
            self.delete_friends(caller, std::slice::from_ref(peer), FriendType::Both);
            for key in [(me.clone(), peer.clone()), (peer.clone(), me.clone())] {
                if self.friends.applications.remove(&key).is_some() {
                    self.push_friend(&me, FriendEvent::ApplicationDeleted(vec![peer.clone()]));
                    self.push_friend(peer, FriendEvent::ApplicationDeleted(vec![me.clone()]));
                }
            }
            added.push(peer.clone());
            results.push(FriendOperationResult::ok(peer));
        }
        if !added.is_empty() {
            self.push_friend(&me, FriendEvent::BlacklistAdded(added));
        }
        results
    }

    pub(super) fn delete_from_blacklist(
        &mut self,
        caller: &Caller,
        user_ids: &[String],
    ) -> Vec<FriendOperationResult> {
        let mut results = Vec::with_capacity(user_ids.len());
        let mut removed = Vec::new();
        for peer in user_ids {
            let existed = self
                .friends
                .blacklists
                .get_mut(&caller.user_id)
                .is_some_and(|set| set.remove(peer));
            if existed {
                removed.push(peer.clone());
                results.push(FriendOperationResult::ok(peer));
            } else {
                results.push(FriendOperationResult::fail(
                    peer,
                    err_code::ERR_FRIEND_NOT_FOUND,
                    "不在黑名单中",
                ));
            }
        }
        if !removed.is_empty() {
            self.push_friend(&caller.user_id, FriendEvent::BlacklistDeleted(removed));
        }
        results
    }

    /// 把 `user_ids` 中的好友加入分组，非好友返回失败
    fn fill_friend_group(
        &mut self,
        owner: &str,
        name: &str,
        user_ids: &[String],
    ) -> (Vec<FriendOperationResult>, Vec<String>) {
        let mut results = Vec::with_capacity(user_ids.len());
        let mut added = Vec::new();
        for peer in user_ids {
            if !self.friends.has_edge(owner, peer) {
                results.push(FriendOperationResult::fail(
                    peer,
                    err_code::ERR_FRIEND_NOT_FOUND,
                    "不是好友",
                ));
                continue;
            }
            self.friends
                .groups
                .entry(owner.to_string())
                .or_default()
                .entry(name.to_string())
                .or_default()
                .insert(peer.clone());
            added.push(peer.clone());
            results.push(FriendOperationResult::ok(peer));
        }
        (results, added)
    }

    pub(super) fn create_friend_group(
        &mut self,
        caller: &Caller,
        name: &str,
        user_ids: &[String],
    ) -> ImResult<Vec<FriendOperationResult>> {
        if name.trim().is_empty() {
            return Err(ImError::invalid_param("分组名不能为空"));
        }
        if self.friends.group_exists(&caller.user_id, name) {
            return Err(ImError::new(
                err_code::ERR_FRIEND_GROUP_EXISTS,
                format!("好友分组已存在: {name}"),
            ));
        }
        self.friends
            .groups
            .entry(caller.user_id.clone())
            .or_default()
            .insert(name.to_string(), BTreeSet::new());
        let (results, added) = self.fill_friend_group(&caller.user_id, name, user_ids);
        self.push_friend(
            &caller.user_id,
            FriendEvent::FriendGroupCreated {
                name: name.to_string(),
                user_ids: added,
            },
        );
        Ok(results)
    }

    pub(super) fn delete_friend_groups(&mut self, caller: &Caller, names: &[String]) -> ImResult<()> {
        if let Some(missing) = names
            .iter()
            .find(|n| !self.friends.group_exists(&caller.user_id, n))
        {
            return Err(friend_group_not_found(missing));
        }
        if let Some(groups) = self.friends.groups.get_mut(&caller.user_id) {
            for name in names {
                groups.remove(name);
            }
        }
        self.push_friend(&caller.user_id, FriendEvent::FriendGroupDeleted(names.to_vec()));
        Ok(())
    }

    pub(super) fn rename_friend_group(
        &mut self,
        caller: &Caller,
        old_name: &str,
        new_name: &str,
    ) -> ImResult<()> {
        if new_name.trim().is_empty() {
            return Err(ImError::invalid_param("分组名不能为空"));
        }
        if self.friends.group_exists(&caller.user_id, new_name) {
            return Err(ImError::new(
                err_code::ERR_FRIEND_GROUP_EXISTS,
                format!("好友分组已存在: {new_name}"),
            ));
        }
        let members = self
            .friends
            .groups
            .get_mut(&caller.user_id)
            .and_then(|groups| groups.remove(old_name))
            .ok_or_else(|| friend_group_not_found(old_name))?;
        self.friends
            .groups
            .entry(caller.user_id.clone())
            .or_default()
            .insert(new_name.to_string(), members);
        self.push_friend(
            &caller.user_id,
            FriendEvent::FriendGroupRenamed {
                old_name: old_name.to_string(),
                new_name: new_name.to_string(),
            },
        );
        Ok(())
    }

    pub(super) fn add_friends_to_friend_group(
        &mut self,
        caller: &Caller,
        name: &str,
        user_ids: &[String],
    ) -> ImResult<Vec<FriendOperationResult>> {
        if !self.friends.group_exists(&caller.user_id, name) {
            return Err(friend_group_not_found(name));
        }
        let (results, added) = self.fill_friend_group(&caller.user_id, name, user_ids);
        if !added.is_empty() {
            self.push_friend(
                &caller.user_id,
                FriendEvent::FriendsAddedToGroup {
                    name: name.to_string(),
                    user_ids: added,
                },
            );
        }
        Ok(results)
    }

    pub(super) fn delete_friends_from_friend_group(
        &mut self,
        caller: &Caller,
        name: &str,
        user_ids: &[String],
    ) -> ImResult<Vec<FriendOperationResult>> {
        let Some(members) = self
            .friends
            .groups
            .get_mut(&caller.user_id)
            .and_then(|groups| groups.get_mut(name))
        else {
            return Err(friend_group_not_found(name));
        };
        let mut results = Vec::with_capacity(user_ids.len());
        let mut removed = Vec::new();
        for peer in user_ids {
            if members.remove(peer) {
                removed.push(peer.clone());
                results.push(FriendOperationResult::ok(peer));
            } else {
                results.push(FriendOperationResult::fail(
                    peer,
                    err_code::ERR_FRIEND_NOT_FOUND,
                    "不在该分组中",
                ));
            }
        }
        if !removed.is_empty() {
            self.push_friend(
                &caller.user_id,
                FriendEvent::FriendsDeletedFromGroup {
                    name: name.to_string(),
                    user_ids: removed,
                },
            );
        }
        Ok(results)
    }
}
