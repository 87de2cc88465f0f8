//! 内存服务端：群组

use super::{Hub, ServerState};
use crate::im::error::{err_code, ImError, ImResult};
use crate::im::group::models::{
    check_group_attributes, CreateGroupParam, GroupApplication, GroupApplicationStatus,
    GroupAttributeWrite, GroupAttributes, GroupCounters, GroupInfo, GroupInfoPatch,
    GroupInfoResult, GroupMemberFilter, GroupMemberInfo, GroupMemberOperationResult,
    GroupMemberPage, GroupMemberRole, GroupType, JoinGroupResult, COMMUNITY_GROUP_ID_PREFIX,
};
use crate::im::group::permission::JoinPolicy;
use crate::im::remote::push::{GroupEvent, ServerPush};
use crate::im::remote::Caller;
use crate::im::types::{group_conversation_id, ReceiveMessageOpt};
use std::collections::{BTreeMap, HashMap};
use tracing::info;

pub(super) struct ServerGroup {
    pub(super) info: GroupInfo,
    pub(super) members: BTreeMap<String, GroupMemberInfo>,
    applications: Vec<GroupApplication>,
    attributes: GroupAttributes,
    counters: GroupCounters,
}

impl ServerGroup {
    pub(super) fn member(&self, user_id: &str) -> ImResult<&GroupMemberInfo> {
        self.members.get(user_id).ok_or_else(|| {
            ImError::new(
                err_code::ERR_GROUP_NOT_MEMBER,
                format!("{} 不是群 {} 的成员", user_id, self.info.group_id),
            )
        })
    }

    fn role(&self, user_id: &str) -> ImResult<GroupMemberRole> {
        self.member(user_id).map(|m| m.role)
    }

    fn is_full(&self, extra: usize) -> bool {
        self.info
            .group_type
            .capacity()
            .is_some_and(|cap| self.members.len() + extra > cap as usize)
    }

    /// 以 `viewer` 视角生成群资料
    fn info_for(&self, viewer: &str, recv_opt: ReceiveMessageOpt) -> GroupInfo {
        let mut info = self.info.clone();
        info.member_count = self.members.len() as u32;
        info.self_role = self.members.get(viewer).map(|m| m.role);
        info.recv_opt = recv_opt;
        info
    }

    fn notify<F>(&self, hub: &Hub, make: F)
    where
        F: Fn(&str) -> GroupEvent,
    {
        for user in self.members.keys() {
            hub.push(user, ServerPush::Group(make(user.as_str())));
        }
    }

    fn admins(&self) -> impl Iterator<Item = &String> + '_ {
        self.members
            .values()
            .filter(|m| m.role.is_admin_or_owner())
            .map(|m| &m.user_id)
    }
}

#[derive(Default)]
pub(super) struct GroupStore {
    groups: HashMap<String, ServerGroup>,
}

fn group_not_found(group_id: &str) -> ImError {
    ImError::new(err_code::ERR_GROUP_NOT_FOUND, format!("群不存在: {group_id}"))
}

impl GroupStore {
    fn get(&self, group_id: &str) -> ImResult<&ServerGroup> {
        self.groups
            .get(group_id)
            .ok_or_else(|| group_not_found(group_id))
    }

    fn get_mut(&mut self, group_id: &str) -> ImResult<&mut ServerGroup> {
        self.groups
            .get_mut(group_id)
            .ok_or_else(|| group_not_found(group_id))
    }

    /// 群存在且 `user_id` 是成员
    pub(super) fn member_group(&self, group_id: &str, user_id: &str) -> ImResult<&ServerGroup> {
        let group = self.get(group_id)?;
        group.member(user_id)?;
        Ok(group)
    }

    pub(super) fn role_of(&self, group_id: &str, user_id: &str) -> Option<GroupMemberRole> {
        self.groups
            .get(group_id)
            .and_then(|g| g.members.get(user_id))
            .map(|m| m.role)
    }

    pub(super) fn group_type_of(&self, group_id: &str) -> Option<GroupType> {
        self.groups.get(group_id).map(|g| g.info.group_type)
    }
}

fn new_member(user_id: &str, role: GroupMemberRole, now: i64) -> GroupMemberInfo {
    GroupMemberInfo {
        user_id: user_id.to_string(),
        role,
        name_card: String::new(),
        join_time: now,
        mute_until: 0,
    }
}

fn permission_denied(action: &str) -> ImError {
    ImError::permission(format!("没有权限执行: {action}"))
}

impl ServerState {
    fn group_recv_opt(&self, user_id: &str, group_id: &str) -> ReceiveMessageOpt {
        self.recv_opt(user_id, &group_conversation_id(group_id))
    }

    pub(super) fn create_group(
        &mut self,
        caller: &Caller,
        param: &CreateGroupParam,
        now: i64,
    ) -> ImResult<String> {
        let group_type = param.group_type;
        if param.group_name.trim().is_empty() {
            return Err(ImError::invalid_param("群名称不能为空"));
        }
        let group_id = match &param.group_id {
            Some(id) => {
                group_type
                    .validate_group_id(id)
                    .map_err(|e| ImError::new(err_code::ERR_GROUP_ID_INVALID, e))?;
                if self.groups.groups.contains_key(id) {
                    return Err(ImError::new(
                        err_code::ERR_GROUP_ID_IN_USE,
                        format!("群 ID 已被使用: {id}"),
                    ));
                }
                id.clone()
            }
            None => loop {
                let n = self.ids.next_id();
                let id = if group_type == GroupType::Community {
                    format!("{COMMUNITY_GROUP_ID_PREFIX}{n}")
                } else {
                    format!("@TGS#{n}")
                };
                if !self.groups.groups.contains_key(&id) {
                    break id;
                }
            },
        };

        if !param.member_list.is_empty() && !group_type.allows_initial_members() {
            return Err(ImError::new(
                err_code::ERR_GROUP_TYPE_NOT_SUPPORTED,
                format!("{:?} 群不支持建群时添加成员", group_type),
            ));
        }
        let mut members = BTreeMap::new();
        members.insert(
            caller.user_id.clone(),
            new_member(&caller.user_id, GroupMemberRole::Owner, now),
        );
        for m in &param.member_list {
            match m.role {
                GroupMemberRole::Owner => {
                    return Err(ImError::invalid_param("初始成员不能是群主"));
                }
                GroupMemberRole::Admin if !group_type.supports_admin() => {
                    return Err(ImError::new(
                        err_code::ERR_GROUP_TYPE_NOT_SUPPORTED,
                        format!("{:?} 群不支持管理员", group_type),
                    ));
                }
                _ => {}
            }
            members
                .entry(m.user_id.clone())
                .or_insert_with(|| new_member(&m.user_id, m.role, now));
        }
        if group_type
            .capacity()
            .is_some_and(|cap| members.len() > cap as usize)
        {
            return Err(ImError::new(err_code::ERR_GROUP_FULL, "初始成员超过群容量"));
        }

        let group = ServerGroup {
            info: GroupInfo {
                group_id: group_id.clone(),
                group_type,
                group_name: param.group_name.clone(),
                notification: param.notification.clone(),
                introduction: param.introduction.clone(),
                face_url: param.face_url.clone(),
                owner: caller.user_id.clone(),
                add_opt: param.add_opt.unwrap_or(group_type.default_add_opt()),
                is_all_muted: false,
                custom_info: BTreeMap::new(),
                member_count: 0,
                create_time: now,
                self_role: None,
                recv_opt: ReceiveMessageOpt::Receive,
            },
            members,
            applications: Vec::new(),
            attributes: GroupAttributes::default(),
            counters: GroupCounters::default(),
        };
        group.notify(&self.hub, |viewer| GroupEvent::Created {
            group: group.info_for(viewer, ReceiveMessageOpt::Receive),
        });
        info!(
            "[MemoryServer] 👥 {} 创建 {:?} 群 {}，成员 {} 人",
            caller.user_id,
            group_type,
            group_id,
            group.members.len()
        );
        self.groups.groups.insert(group_id.clone(), group);
        Ok(group_id)
    }

    pub(super) fn dismiss_group(&mut self, caller: &Caller, group_id: &str) -> ImResult<()> {
        let group = self.groups.get(group_id)?;
        let role = group.role(&caller.user_id)?;
        if !group.info.group_type.can_dismiss(role) {
            return Err(permission_denied("解散群"));
        }
        group.notify(&self.hub, |_| GroupEvent::Dismissed {
            group_id: group_id.to_string(),
            op_user: caller.user_id.clone(),
        });
        self.groups.groups.remove(group_id);
        info!("[MemoryServer] 💥 群 {} 已被 {} 解散", group_id, caller.user_id);
        Ok(())
    }

    pub(super) fn join_group(
        &mut self,
        caller: &Caller,
        group_id: &str,
        request_msg: &str,
        now: i64,
    ) -> ImResult<JoinGroupResult> {
        let group = self.groups.get_mut(group_id)?;
        if group.members.contains_key(&caller.user_id) {
            return Err(ImError::new(
                err_code::ERR_GROUP_ALREADY_MEMBER,
                "已经是群成员",
            ));
        }
        match group.info.group_type.join_policy(group.info.add_opt) {
            JoinPolicy::Forbidden => Err(permission_denied("申请加入该群")),
            JoinPolicy::NeedApproval => {
                group.applications.retain(|a| {
                    !(a.from_user == caller.user_id
                        && a.status == GroupApplicationStatus::Unhandled)
                });
                let application = GroupApplication {
                    group_id: group_id.to_string(),
                    from_user: caller.user_id.clone(),
                    request_msg: request_msg.to_string(),
                    add_time: now,
                    status: GroupApplicationStatus::Unhandled,
                    handled_by: String::new(),
                    handled_msg: String::new(),
                };
                group.applications.push(application.clone());
                for admin in group.admins() {
                    self.hub.push(
                        admin,
                        ServerPush::Group(GroupEvent::ApplicationReceived {
                            application: application.clone(),
                        }),
                    );
                }
                Ok(JoinGroupResult::PendingApproval)
            }
            JoinPolicy::Free => {
                if group.is_full(1) {
                    return Err(ImError::new(err_code::ERR_GROUP_FULL, "群成员已满"));
                }
                let member = new_member(&caller.user_id, GroupMemberRole::Member, now);
                group.members.insert(caller.user_id.clone(), member.clone());
                group.notify(&self.hub, |_| GroupEvent::MemberEntered {
                    group_id: group_id.to_string(),
                    members: vec![member.clone()],
                });
                Ok(JoinGroupResult::Joined)
            }
        }
    }

    pub(super) fn quit_group(&mut self, caller: &Caller, group_id: &str) -> ImResult<()> {
        let group = self.groups.get_mut(group_id)?;
        let role = group.role(&caller.user_id)?;
        let group_type = group.info.group_type;
        if role == GroupMemberRole::Owner && group_type != GroupType::Work {
            return Err(ImError::permission("群主不能退群，请先转让群主或解散群"));
        }
        group.notify(&self.hub, |_| GroupEvent::MemberLeft {
            group_id: group_id.to_string(),
            user_id: caller.user_id.clone(),
        });
        group.members.remove(&caller.user_id);

        // 工作群群主退群后由最早入群的成员接任
        if role == GroupMemberRole::Owner {
            let heir = group
                .members
                .values()
                .min_by_key(|m| (m.join_time, m.user_id.clone()))
                .map(|m| m.user_id.clone());
            match heir {
                Some(heir) => {
                    if let Some(m) = group.members.get_mut(&heir) {
                        m.role = GroupMemberRole::Owner;
                    }
                    group.info.owner = heir.clone();
                    group.notify(&self.hub, |_| GroupEvent::OwnerChanged {
                        group_id: group_id.to_string(),
                        new_owner: heir.clone(),
                    });
                }
                None => {
                    self.groups.groups.remove(group_id);
                }
            }
        }
        Ok(())
    }

    pub(super) fn get_joined_group_list(&self, caller: &Caller) -> Vec<GroupInfo> {
        let mut list: Vec<GroupInfo> = self
            .groups
            .groups
            .values()
            .filter(|g| g.members.contains_key(&caller.user_id))
            .map(|g| {
                let opt = self.group_recv_opt(&caller.user_id, &g.info.group_id);
                g.info_for(&caller.user_id, opt)
            })
            .collect();
        list.sort_by(|a, b| a.group_id.cmp(&b.group_id));
        list
    }

    pub(super) fn get_groups_info(
        &self,
        caller: &Caller,
        group_ids: &[String],
    ) -> Vec<GroupInfoResult> {
        group_ids
            .iter()
            .map(|id| match self.groups.groups.get(id) {
                Some(g) => GroupInfoResult {
                    group_id: id.clone(),
                    result_code: err_code::SUCC,
                    result_msg: String::new(),
                    info: Some(g.info_for(
                        &caller.user_id,
                        self.group_recv_opt(&caller.user_id, id),
                    )),
                },
                None => GroupInfoResult {
                    group_id: id.clone(),
                    result_code: err_code::ERR_GROUP_NOT_FOUND,
                    result_msg: "群不存在".to_string(),
                    info: None,
                },
            })
            .collect()
    }

    pub(super) fn set_group_info(&mut self, caller: &Caller, patch: &GroupInfoPatch) -> ImResult<()> {
        let group = self.groups.get_mut(&patch.group_id)?;
        let role = group.role(&caller.user_id)?;
        if !group.info.group_type.can_modify_info(role, patch) {
            return Err(permission_denied("修改群资料"));
        }
        if let Some(name) = &patch.group_name {
            if name.trim().is_empty() {
                return Err(ImError::invalid_param("群名称不能为空"));
            }
        }
        if let Some(custom) = &patch.custom_info {
            check_group_attributes(custom)
                .map_err(|e| ImError::new(err_code::ERR_GROUP_ATTRIBUTE_SIZE_LIMIT, e))?;
        }
        let info = &mut group.info;
        if let Some(v) = &patch.group_name {
            info.group_name = v.clone();
        }
        if let Some(v) = &patch.notification {
            info.notification = v.clone();
        }
        if let Some(v) = &patch.introduction {
            info.introduction = v.clone();
        }
        if let Some(v) = &patch.face_url {
            info.face_url = v.clone();
        }
        if let Some(v) = patch.add_opt {
            info.add_opt = v;
        }
        if let Some(v) = patch.is_all_muted {
            info.is_all_muted = v;
        }
        if let Some(v) = &patch.custom_info {
            info.custom_info = v.clone();
        }
        let group = &*group;
        group.notify(&self.hub, |viewer| GroupEvent::InfoChanged {
            group: group.info_for(viewer, ReceiveMessageOpt::Receive),
            op_user: caller.user_id.clone(),
        });
        Ok(())
    }

    pub(super) fn get_group_member_list(
        &self,
        caller: &Caller,
        group_id: &str,
        filter: GroupMemberFilter,
        next_seq: u64,
        count: usize,
    ) -> ImResult<GroupMemberPage> {
        let group = self.groups.member_group(group_id, &caller.user_id)?;
        let mut matched: Vec<&GroupMemberInfo> = group
            .members
            .values()
            .filter(|m| filter.matches(m.role))
            .collect();
        matched.sort_by(|a, b| (a.join_time, &a.user_id).cmp(&(b.join_time, &b.user_id)));
        let start = next_seq as usize;
        let count = count.max(1);
        let member_list: Vec<GroupMemberInfo> =
            matched.iter().skip(start).take(count).map(|m| (*m).clone()).collect();
        let end = start + member_list.len();
        Ok(GroupMemberPage {
            next_seq: if end < matched.len() { end as u64 } else { 0 },
            member_list,
        })
    }

    pub(super) fn get_group_members_info(
        &self,
        caller: &Caller,
        group_id: &str,
        user_ids: &[String],
    ) -> ImResult<Vec<GroupMemberInfo>> {
        let group = self.groups.member_group(group_id, &caller.user_id)?;
        Ok(user_ids
            .iter()
            .filter_map(|id| group.members.get(id).cloned())
            .collect())
    }

    pub(super) fn set_group_member_info(
        &mut self,
        caller: &Caller,
        group_id: &str,
        user_id: &str,
        name_card: &str,
    ) -> ImResult<()> {
        let group = self.groups.get_mut(group_id)?;
        let op_role = group.role(&caller.user_id)?;
        let target_role = group.role(user_id)?;
        let allowed = user_id == caller.user_id
            || (group.info.group_type.supports_admin()
                && op_role.is_admin_or_owner()
                && op_role > target_role);
        if !allowed {
            return Err(permission_denied("修改他人群名片"));
        }
        let member = match group.members.get_mut(user_id) {
            Some(m) => {
                m.name_card = name_card.to_string();
                m.clone()
            }
            None => return Err(ImError::new(err_code::ERR_GROUP_NOT_MEMBER, "成员不存在")),
        };
        group.notify(&self.hub, |_| GroupEvent::MemberInfoChanged {
            group_id: group_id.to_string(),
            members: vec![member.clone()],
        });
        Ok(())
    }

    pub(super) fn mute_group_member(
        &mut self,
        caller: &Caller,
        group_id: &str,
        user_id: &str,
        seconds: u32,
        now: i64,
    ) -> ImResult<()> {
        let group = self.groups.get_mut(group_id)?;
        let op_role = group.role(&caller.user_id)?;
        let target_role = group.role(user_id)?;
        if !group.info.group_type.can_mute(op_role, target_role) {
            return Err(permission_denied("禁言成员"));
        }
        let member = match group.members.get_mut(user_id) {
            Some(m) => {
                m.mute_until = if seconds == 0 {
                    0
                } else {
                    now + i64::from(seconds) * 1000
                };
                m.clone()
            }
            None => return Err(ImError::new(err_code::ERR_GROUP_NOT_MEMBER, "成员不存在")),
        };
        group.notify(&self.hub, |_| GroupEvent::MemberInfoChanged {
            group_id: group_id.to_string(),
            members: vec![member.clone()],
        });
        Ok(())
    }

    pub(super) fn invite_user_to_group(
        &mut self,
        caller: &Caller,
        group_id: &str,
        user_ids: &[String],
        now: i64,
    ) -> ImResult<Vec<GroupMemberOperationResult>> {
        if user_ids.is_empty() {
            return Err(ImError::invalid_param("邀请列表不能为空"));
        }
        let group = self.groups.get_mut(group_id)?;
        let role = group.role(&caller.user_id)?;
        if !group.info.group_type.can_invite(role) {
            return Err(permission_denied("邀请成员"));
        }
        let mut results = Vec::with_capacity(user_ids.len());
        let mut added = Vec::new();
        for id in user_ids {
            let (code, msg) = if group.members.contains_key(id) {
                (err_code::ERR_GROUP_ALREADY_MEMBER, "已经是群成员")
            } else if group.is_full(1) {
                (err_code::ERR_GROUP_FULL, "群成员已满")
            } else {
                let member = new_member(id, GroupMemberRole::Member, now);
                group.members.insert(id.clone(), member.clone());
                added.push(member);
                (err_code::SUCC, "")
            };
            results.push(GroupMemberOperationResult {
                user_id: id.clone(),
                result_code: code,
                result_info: msg.to_string(),
            });
        }
        if !added.is_empty() {
            group.notify(&self.hub, |_| GroupEvent::MemberInvited {
                group_id: group_id.to_string(),
                op_user: caller.user_id.clone(),
                members: added.clone(),
            });
        }
        Ok(results)
    }

    pub(super) fn kick_group_member(
        &mut self,
        caller: &Caller,
        group_id: &str,
        user_ids: &[String],
        reason: &str,
    ) -> ImResult<Vec<GroupMemberOperationResult>> {
        if user_ids.is_empty() {
            return Err(ImError::invalid_param("踢出列表不能为空"));
        }
        let group = self.groups.get_mut(group_id)?;
        let op_role = group.role(&caller.user_id)?;
        let group_type = group.info.group_type;
        let mut results = Vec::with_capacity(user_ids.len());
        let mut kicked = Vec::new();
        for id in user_ids {
            let (code, msg) = match group.members.get(id) {
                None => (err_code::ERR_GROUP_NOT_MEMBER, "不是群成员"),
                Some(_) if *id == caller.user_id => {
                    (err_code::ERR_GROUP_PERMISSION_DENY, "不能踢出自己")
                }
                Some(m) if !group_type.can_kick(op_role, m.role) => {
                    (err_code::ERR_GROUP_PERMISSION_DENY, "没有权限踢出该成员")
                }
                Some(_) => {
                    kicked.push(id.clone());
                    (err_code::SUCC, "")
                }
            };
            results.push(GroupMemberOperationResult {
                user_id: id.clone(),
                result_code: code,
                result_info: msg.to_string(),
            });
        }
        if !kicked.is_empty() {
            // 被踢者也要收到通知
            group.notify(&self.hub, |_| GroupEvent::MemberKicked {
                group_id: group_id.to_string(),
                op_user: caller.user_id.clone(),
                user_ids: kicked.clone(),
            });
            for id in &kicked {
                group.members.remove(id);
            }
            info!(
                "[MemoryServer] 👢 {} 从群 {} 踢出 {:?}，原因: {}",
                caller.user_id, group_id, kicked, reason
            );
        }
        Ok(results)
    }

    pub(super) fn set_group_member_role(
        &mut self,
        caller: &Caller,
        group_id: &str,
        user_id: &str,
        role: GroupMemberRole,
    ) -> ImResult<()> {
        if role == GroupMemberRole::Owner {
            return Err(ImError::invalid_param("请使用转让群主接口"));
        }
        let group = self.groups.get_mut(group_id)?;
        let op_role = group.role(&caller.user_id)?;
        if !group.info.group_type.can_set_role(op_role) {
            return Err(permission_denied("设置成员角色"));
        }
        let Some(member) = group.members.get_mut(user_id) else {
            return Err(ImError::new(err_code::ERR_GROUP_NOT_MEMBER, "成员不存在"));
        };
        if member.role == GroupMemberRole::Owner {
            return Err(permission_denied("修改群主角色"));
        }
        member.role = role;
        group.notify(&self.hub, |_| GroupEvent::RoleChanged {
            group_id: group_id.to_string(),
            op_user: caller.user_id.clone(),
            user_id: user_id.to_string(),
            role,
        });
        Ok(())
    }

    pub(super) fn transfer_group_owner(
        &mut self,
        caller: &Caller,
        group_id: &str,
        user_id: &str,
    ) -> ImResult<()> {
        let group = self.groups.get_mut(group_id)?;
        if !group.info.group_type.can_transfer_owner() {
            return Err(ImError::new(
                err_code::ERR_GROUP_TYPE_NOT_SUPPORTED,
                "直播群不支持转让群主",
            ));
        }
        if group.role(&caller.user_id)? != GroupMemberRole::Owner {
            return Err(permission_denied("转让群主"));
        }
        if user_id == caller.user_id {
            return Err(ImError::invalid_param("不能转让给自己"));
        }
        group.member(user_id)?;
        if let Some(old) = group.members.get_mut(&caller.user_id) {
            old.role = GroupMemberRole::Member;
        }
        if let Some(new) = group.members.get_mut(user_id) {
            new.role = GroupMemberRole::Owner;
        }
        group.info.owner = user_id.to_string();
        group.notify(&self.hub, |_| GroupEvent::OwnerChanged {
            group_id: group_id.to_string(),
            new_owner: user_id.to_string(),
        });
        Ok(())
    }

    pub(super) fn get_group_application_list(&self, caller: &Caller) -> Vec<GroupApplication> {
        let mut list: Vec<GroupApplication> = self
            .groups
            .groups
            .values()
            .filter(|g| {
                g.members
                    .get(&caller.user_id)
                    .is_some_and(|m| g.info.group_type.can_handle_application(m.role))
            })
            .flat_map(|g| g.applications.iter().cloned())
            .collect();
        list.sort_by_key(|a| a.add_time);
        list
    }

    pub(super) fn handle_group_application(
        &mut self,
        caller: &Caller,
        group_id: &str,
        from_user: &str,
        accept: bool,
        reason: &str,
        now: i64,
    ) -> ImResult<()> {
        let group = self.groups.get_mut(group_id)?;
        let role = group.role(&caller.user_id)?;
        if !group.info.group_type.can_handle_application(role) {
            return Err(permission_denied("处理加群申请"));
        }
        let Some(idx) = group.applications.iter().position(|a| {
            a.from_user == from_user && a.status == GroupApplicationStatus::Unhandled
        }) else {
            return Err(ImError::new(
                err_code::ERR_GROUP_APPLICATION_NOT_FOUND,
                format!("{from_user} 没有待处理的加群申请"),
            ));
        };
        let already_member = group.members.contains_key(from_user);
        if accept && !already_member && group.is_full(1) {
            return Err(ImError::new(err_code::ERR_GROUP_FULL, "群成员已满"));
        }
        let application = &mut group.applications[idx];
        application.status = if accept {
            GroupApplicationStatus::Accepted
        } else {
            GroupApplicationStatus::Refused
        };
        application.handled_by = caller.user_id.clone();
        application.handled_msg = reason.to_string();

        self.hub.push(
            from_user,
            ServerPush::Group(GroupEvent::ApplicationProcessed {
                group_id: group_id.to_string(),
                op_user: caller.user_id.clone(),
                accepted: accept,
                reason: reason.to_string(),
            }),
        );
        if accept && !already_member {
            let member = new_member(from_user, GroupMemberRole::Member, now);
            group.members.insert(from_user.to_string(), member.clone());
            group.notify(&self.hub, |_| GroupEvent::MemberEntered {
                group_id: group_id.to_string(),
                members: vec![member.clone()],
            });
        }
        Ok(())
    }

    pub(super) fn write_group_attributes(
        &mut self,
        caller: &Caller,
        group_id: &str,
        known_version: u64,
        op: &GroupAttributeWrite,
    ) -> ImResult<GroupAttributes> {
        let group = self.groups.get_mut(group_id)?;
        group.member(&caller.user_id)?;
        if known_version != group.attributes.version {
            return Err(ImError::new(
                err_code::ERR_GROUP_ATTRIBUTE_CONFLICT,
                format!(
                    "群属性已被修改，当前版本 {}，提交版本 {}",
                    group.attributes.version, known_version
                ),
            ));
        }
        let mut next = group.attributes.attributes.clone();
        match op {
            GroupAttributeWrite::Init(attrs) => next = attrs.clone(),
            GroupAttributeWrite::Set(attrs) => {
                next.extend(attrs.iter().map(|(k, v)| (k.clone(), v.clone())))
            }
            GroupAttributeWrite::Delete(keys) if keys.is_empty() => next.clear(),
            GroupAttributeWrite::Delete(keys) => {
                for k in keys {
                    next.remove(k);
                }
            }
        }
        check_group_attributes(&next)
            .map_err(|e| ImError::new(err_code::ERR_GROUP_ATTRIBUTE_SIZE_LIMIT, e))?;
        group.attributes.attributes = next;
        group.attributes.version += 1;
        let snapshot = group.attributes.clone();
        group.notify(&self.hub, |_| GroupEvent::AttributesChanged {
            group_id: group_id.to_string(),
            attributes: snapshot.attributes.clone(),
            version: snapshot.version,
        });
        Ok(snapshot)
    }

    pub(super) fn get_group_attributes(
        &self,
        caller: &Caller,
        group_id: &str,
    ) -> ImResult<GroupAttributes> {
        let group = self.groups.member_group(group_id, &caller.user_id)?;
        Ok(group.attributes.clone())
    }

    pub(super) fn get_group_online_member_count(
        &self,
        caller: &Caller,
        group_id: &str,
    ) -> ImResult<u32> {
        let group = self.groups.member_group(group_id, &caller.user_id)?;
        if group.info.group_type != GroupType::AVChatRoom {
            return Err(ImError::new(
                err_code::ERR_GROUP_TYPE_NOT_SUPPORTED,
                "只有直播群支持查询在线人数",
            ));
        }
        Ok(group
            .members
            .keys()
            .filter(|u| self.hub.is_online(u))
            .count() as u32)
    }

    pub(super) fn set_group_counters(
        &mut self,
        caller: &Caller,
        group_id: &str,
        known_version: u64,
        counters: &BTreeMap<String, i64>,
    ) -> ImResult<GroupCounters> {
        if counters.is_empty() {
            return Err(ImError::invalid_param("计数器不能为空"));
        }
        let group = self.groups.get_mut(group_id)?;
        group.member(&caller.user_id)?;
        if known_version != group.counters.version {
            return Err(ImError::new(
                err_code::ERR_GROUP_COUNTER_CONFLICT,
                format!(
                    "群计数器已被修改，当前版本 {}，提交版本 {}",
                    group.counters.version, known_version
                ),
            ));
        }
        for (k, v) in counters {
            group.counters.counters.insert(k.clone(), *v);
        }
        group.counters.version += 1;
        let version = group.counters.version;
        for (k, v) in counters {
            group.notify(&self.hub, |_| GroupEvent::CounterChanged {
                group_id: group_id.to_string(),
                key: k.clone(),
                value: *v,
                version,
            });
        }
        Ok(group.counters.clone())
    }

    pub(super) fn increase_group_counter(
        &mut self,
        caller: &Caller,
        group_id: &str,
        key: &str,
        delta: i64,
    ) -> ImResult<GroupCounters> {
        if key.is_empty() {
            return Err(ImError::invalid_param("计数器 key 不能为空"));
        }
        let group = self.groups.get_mut(group_id)?;
        group.member(&caller.user_id)?;
        let value = {
            let slot = group.counters.counters.entry(key.to_string()).or_insert(0);
            *slot = slot.saturating_add(delta);
            *slot
        };
        group.counters.version += 1;
        let version = group.counters.version;
        group.notify(&self.hub, |_| GroupEvent::CounterChanged {
            group_id: group_id.to_string(),
            key: key.to_string(),
            value,
            version,
        });
        Ok(group.counters.clone())
    }

    pub(super) fn get_group_counters(
        &self,
        caller: &Caller,
        group_id: &str,
        keys: &[String],
    ) -> ImResult<GroupCounters> {
        let group = self.groups.member_group(group_id, &caller.user_id)?;
        if keys.is_empty() {
            return Ok(group.counters.clone());
        }
        Ok(GroupCounters {
            counters: keys
                .iter()
                .filter_map(|k| group.counters.counters.get(k).map(|v| (k.clone(), *v)))
                .collect(),
            version: group.counters.version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::MemoryServer;
    use super::*;
    use crate::im::clock::ManualClock;
    use crate::im::group::models::CreateGroupMember;
    use crate::im::remote::RemoteService;
    use std::sync::Arc;
    use std::time::Duration;

    async fn caller(server: &MemoryServer, user: &str) -> Caller {
        let ticket = server.issue_ticket(user, Duration::from_secs(3600));
        let ack = server.login(user, &ticket).await.unwrap();
        Caller {
            user_id: user.to_string(),
            token: ack.token,
            connection_id: ack.connection_id,
        }
    }

    #[tokio::test]
    async fn work_group_requires_invitation() {
        let server = MemoryServer::new(Arc::new(ManualClock::new(0)));
        let owner = caller(&server, "owner").await;
        let bob = caller(&server, "bob").await;
        let group_id = server
            .create_group(&owner, &CreateGroupParam::new(GroupType::Work, "work"))
            .await
            .unwrap();
        assert!(!group_id.starts_with(COMMUNITY_GROUP_ID_PREFIX));

        let err = server.join_group(&bob, &group_id, "").await.unwrap_err();
        assert_eq!(err.code, err_code::ERR_GROUP_PERMISSION_DENY);

        let res = server
            .invite_user_to_group(&owner, &group_id, &["bob".to_string()])
            .await
            .unwrap();
        assert_eq!(res[0].result_code, 0);
        // 工作群普通成员也可以邀请
        let res = server
            .invite_user_to_group(&bob, &group_id, &["carol".to_string()])
            .await
            .unwrap();
        assert_eq!(res[0].result_code, 0);
    }

    #[tokio::test]
    async fn public_group_join_needs_approval() {
        let server = MemoryServer::new(Arc::new(ManualClock::new(0)));
        let owner = caller(&server, "owner").await;
        let bob = caller(&server, "bob").await;
        let group_id = server
            .create_group(&owner, &CreateGroupParam::new(GroupType::Public, "pub"))
            .await
            .unwrap();

        let res = server.join_group(&bob, &group_id, "let me in").await.unwrap();
        assert_eq!(res, JoinGroupResult::PendingApproval);
        let apps = server.get_group_application_list(&owner).await.unwrap();
        assert_eq!(apps.len(), 1);

        // 非管理员不能审批
        let err = server
            .handle_group_application(&bob, &group_id, "bob", true, "")
            .await
            .unwrap_err();
        assert_eq!(err.code, err_code::ERR_GROUP_NOT_MEMBER);

        server
            .handle_group_application(&owner, &group_id, "bob", true, "welcome")
            .await
            .unwrap();
        let members = server
            .get_group_member_list(&bob, &group_id, GroupMemberFilter::All, 0, 10)
            .await
            .unwrap();
        assert_eq!(members.member_list.len(), 2);
        assert_eq!(members.next_seq, 0);
    }

    #[tokio::test]
    async fn avchatroom_is_open_and_has_no_initial_members() {
        let server = MemoryServer::new(Arc::new(ManualClock::new(0)));
        let owner = caller(&server, "owner").await;
        let bob = caller(&server, "bob").await;

        let mut param = CreateGroupParam::new(GroupType::AVChatRoom, "live");
        param.member_list.push(CreateGroupMember {
            user_id: "bob".into(),
            role: GroupMemberRole::Member,
        });
        let err = server.create_group(&owner, &param).await.unwrap_err();
        assert_eq!(err.code, err_code::ERR_GROUP_TYPE_NOT_SUPPORTED);

        param.member_list.clear();
        let group_id = server.create_group(&owner, &param).await.unwrap();
        assert_eq!(
            server.join_group(&bob, &group_id, "").await.unwrap(),
            JoinGroupResult::Joined
        );
        assert_eq!(
            server
                .get_group_online_member_count(&owner, &group_id)
                .await
                .unwrap(),
            2
        );
        let err = server
            .transfer_group_owner(&owner, &group_id, "bob")
            .await
            .unwrap_err();
        assert_eq!(err.code, err_code::ERR_GROUP_TYPE_NOT_SUPPORTED);
    }

    #[tokio::test]
    async fn stale_attribute_write_conflicts() {
        let server = MemoryServer::new(Arc::new(ManualClock::new(0)));
        let owner = caller(&server, "owner").await;
        let group_id = server
            .create_group(&owner, &CreateGroupParam::new(GroupType::Meeting, "m"))
            .await
            .unwrap();
        let mut attrs = BTreeMap::new();
        attrs.insert("topic".to_string(), "a".to_string());
        let v1 = server
            .write_group_attributes(&owner, &group_id, 0, &GroupAttributeWrite::Set(attrs.clone()))
            .await
            .unwrap();
        assert_eq!(v1.version, 1);

        let err = server
            .write_group_attributes(&owner, &group_id, 0, &GroupAttributeWrite::Set(attrs))
            .await
            .unwrap_err();
        assert_eq!(err.code, err_code::ERR_GROUP_ATTRIBUTE_CONFLICT);

        let counters = server
            .increase_group_counter(&owner, &group_id, "likes", 5)
            .await
            .unwrap();
        let counters2 = server
            .increase_group_counter(&owner, &group_id, "likes", -2)
            .await
            .unwrap();
        assert_eq!(counters.counters["likes"], 5);
        assert_eq!(counters2.counters["likes"], 3);
    }
}
