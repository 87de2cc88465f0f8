//! 群类型权限矩阵
//!
//! 客户端预检与内存服务端共用同一份规则，保证两侧判断一致。

use crate::im::group::models::{
    GroupAddOpt, GroupInfoPatch, GroupMemberRole, GroupType, COMMUNITY_GROUP_ID_PREFIX,
    MAX_GROUP_ID_LEN,
};

/// 主动加群策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinPolicy {
    Forbidden,
    NeedApproval,
    Free,
}

impl GroupType {
    /// 成员数上限，None 表示不限
    pub fn capacity(self) -> Option<u32> {
        match self {
            GroupType::Work => Some(200),
            GroupType::Public => Some(2_000),
            GroupType::Meeting => Some(10_000),
            GroupType::Community => Some(100_000),
            GroupType::AVChatRoom => None,
        }
    }

    pub fn default_add_opt(self) -> GroupAddOpt {
        match self {
            GroupType::Work => GroupAddOpt::Forbid,
            GroupType::Public => GroupAddOpt::Auth,
            GroupType::Meeting | GroupType::Community | GroupType::AVChatRoom => GroupAddOpt::Any,
        }
    }

    /// 主动申请加群的策略
    pub fn join_policy(self, add_opt: GroupAddOpt) -> JoinPolicy {
        match self {
            GroupType::Work => JoinPolicy::Forbidden,
            GroupType::Meeting | GroupType::AVChatRoom => JoinPolicy::Free,
            GroupType::Public | GroupType::Community => match add_opt {
                GroupAddOpt::Forbid => JoinPolicy::Forbidden,
                GroupAddOpt::Auth => JoinPolicy::NeedApproval,
                GroupAddOpt::Any => JoinPolicy::Free,
            },
        }
    }

    /// 指定角色是否可以直接邀请他人入群
    pub fn can_invite(self, role: GroupMemberRole) -> bool {
        match self {
            GroupType::Work | GroupType::Community => true,
            GroupType::Public => role.is_admin_or_owner(),
            GroupType::Meeting | GroupType::AVChatRoom => false,
        }
    }

    /// 是否支持设置管理员
    pub fn supports_admin(self) -> bool {
        !matches!(self, GroupType::Work)
    }

    pub fn can_dismiss(self, role: GroupMemberRole) -> bool {
        role == GroupMemberRole::Owner && !matches!(self, GroupType::Work)
    }

    pub fn can_transfer_owner(self) -> bool {
        !matches!(self, GroupType::AVChatRoom)
    }

    /// 建群时能否携带初始成员
    pub fn allows_initial_members(self) -> bool {
        !matches!(self, GroupType::AVChatRoom)
    }

    /// 是否保存漫游消息
    pub fn keeps_history(self) -> bool {
        !matches!(self, GroupType::AVChatRoom)
    }

    pub fn supports_message_extension(self) -> bool {
        !matches!(self, GroupType::Community | GroupType::AVChatRoom)
    }

    /// 修改群资料权限
    pub fn can_modify_info(self, role: GroupMemberRole, patch: &GroupInfoPatch) -> bool {
        match self {
            // 工作群任何成员都能修改基础资料，管理类字段只有群主可改
            GroupType::Work => !patch.touches_admin_fields() || role == GroupMemberRole::Owner,
            _ => role.is_admin_or_owner(),
        }
    }

    /// 踢人权限：只能踢角色低于自己的成员
    pub fn can_kick(self, operator: GroupMemberRole, target: GroupMemberRole) -> bool {
        match self {
            GroupType::Work => operator == GroupMemberRole::Owner && target != GroupMemberRole::Owner,
            _ => operator.is_admin_or_owner() && operator > target,
        }
    }

    /// 禁言权限
    pub fn can_mute(self, operator: GroupMemberRole, target: GroupMemberRole) -> bool {
        !matches!(self, GroupType::Work) && operator.is_admin_or_owner() && operator > target
    }

    /// 设置管理员权限
    pub fn can_set_role(self, operator: GroupMemberRole) -> bool {
        self.supports_admin() && operator == GroupMemberRole::Owner
    }

    /// 审批加群申请权限
    pub fn can_handle_application(self, role: GroupMemberRole) -> bool {
        role.is_admin_or_owner()
    }

    /// 校验群 ID：ASCII、不超过 48 字节、社群必须带固定前缀、其他类型不能带
    pub fn validate_group_id(self, group_id: &str) -> Result<(), String> {
        if group_id.is_empty() || group_id.len() > MAX_GROUP_ID_LEN {
            return Err(format!("群 ID 长度必须在 1..={} 字节之间", MAX_GROUP_ID_LEN));
        }
        if !group_id.is_ascii() {
            return Err("群 ID 只能包含 ASCII 字符".to_string());
        }
        let has_prefix = group_id.starts_with(COMMUNITY_GROUP_ID_PREFIX);
        match (self, has_prefix) {
            (GroupType::Community, false) => Err(format!(
                "社群 ID 必须以 {} 开头",
                COMMUNITY_GROUP_ID_PREFIX
            )),
            (GroupType::Community, true) if group_id.len() == COMMUNITY_GROUP_ID_PREFIX.len() => {
                Err("社群 ID 前缀后不能为空".to_string())
            }
            (t, true) if t != GroupType::Community => Err(format!(
                "只有社群 ID 可以使用 {} 前缀",
                COMMUNITY_GROUP_ID_PREFIX
            )),
            _ => Ok(()),
        }
    }
}

/// 群主 / 管理员可以撤回他人的群消息
pub fn can_revoke_others_message(role: GroupMemberRole) -> bool {
    role.is_admin_or_owner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use GroupMemberRole::*;
    use GroupType::*;

    #[test]
    fn join_matrix() {
        assert_eq!(Work.join_policy(Work.default_add_opt()), JoinPolicy::Forbidden);
        assert_eq!(Work.join_policy(GroupAddOpt::Any), JoinPolicy::Forbidden);
        assert_eq!(
            Public.join_policy(Public.default_add_opt()),
            JoinPolicy::NeedApproval
        );
        assert_eq!(Public.join_policy(GroupAddOpt::Forbid), JoinPolicy::Forbidden);
        assert_eq!(Meeting.join_policy(GroupAddOpt::Forbid), JoinPolicy::Free);
        assert_eq!(
            Community.join_policy(Community.default_add_opt()),
            JoinPolicy::Free
        );
        assert_eq!(AVChatRoom.join_policy(GroupAddOpt::Auth), JoinPolicy::Free);
    }

    #[test]
    fn invite_matrix() {
        assert!(Work.can_invite(Member));
        assert!(!Public.can_invite(Member));
        assert!(Public.can_invite(Admin));
        assert!(!Meeting.can_invite(Owner));
        assert!(Community.can_invite(Member));
        assert!(!AVChatRoom.can_invite(Owner));
    }

    #[test]
    fn capacity_and_ownership() {
        assert_eq!(Work.capacity(), Some(200));
        assert_eq!(Community.capacity(), Some(100_000));
        assert_eq!(AVChatRoom.capacity(), None);
        assert!(!AVChatRoom.can_transfer_owner());
        assert!(!AVChatRoom.allows_initial_members());
        assert!(!Work.can_dismiss(Owner));
        assert!(Public.can_dismiss(Owner));
        assert!(!Public.can_dismiss(Admin));
        assert!(!Work.can_set_role(Owner));
    }

    #[test]
    fn role_checks() {
        assert!(Public.can_kick(Owner, Admin));
        assert!(Public.can_kick(Admin, Member));
        assert!(!Public.can_kick(Admin, Admin));
        assert!(!Public.can_kick(Member, Member));
        assert!(Work.can_kick(Owner, Member));
        assert!(!Work.can_mute(Owner, Member));

        let mut patch = GroupInfoPatch::new("g");
        patch.group_name = Some("n".into());
        assert!(Work.can_modify_info(Member, &patch));
        assert!(!Public.can_modify_info(Member, &patch));
        patch.is_all_muted = Some(true);
        assert!(!Work.can_modify_info(Member, &patch));
    }

    #[test]
    fn group_id_rules() {
        assert!(Community.validate_group_id("@TGS#_room1").is_ok());
        assert!(Community.validate_group_id("room1").is_err());
        assert!(Community.validate_group_id("@TGS#_").is_err());
        assert!(Public.validate_group_id("@TGS#_room1").is_err());
        assert!(Public.validate_group_id("群").is_err());
        assert!(Public.validate_group_id(&"g".repeat(49)).is_err());
        assert!(Public.validate_group_id(&"g".repeat(48)).is_ok());
    }
}
