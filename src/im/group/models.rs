//! 群组模型定义

use crate::im::types::ReceiveMessageOpt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 社群（Community）群 ID 的固定前缀
pub const COMMUNITY_GROUP_ID_PREFIX: &str = "@TGS#_";
/// 群 ID 最大长度（字节）
pub const MAX_GROUP_ID_LEN: usize = 48;

/// 群属性限制
pub const MAX_GROUP_ATTRIBUTE_KEYS: usize = 16;
pub const MAX_GROUP_ATTRIBUTE_KEY_LEN: usize = 32;
pub const MAX_GROUP_ATTRIBUTE_VALUE_LEN: usize = 4 * 1024;
pub const MAX_GROUP_ATTRIBUTES_TOTAL: usize = 16 * 1024;

/// 群类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupType {
    /// 好友工作群：只能邀请加入
    Work,
    /// 陌生人社交群：申请需审批
    Public,
    /// 临时会议群：自由加入
    Meeting,
    /// 社群：自由加入，超大成员数
    Community,
    /// 直播群：自由加入，人数无上限，无漫游
    AVChatRoom,
}

/// 群成员角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GroupMemberRole {
    Member = 200,
    Admin = 300,
    Owner = 400,
}

impl GroupMemberRole {
    pub fn is_admin_or_owner(self) -> bool {
        self >= GroupMemberRole::Admin
    }
}

/// 加群方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupAddOpt {
    /// 禁止申请加群
    Forbid = 0,
    /// 需要群主或管理员审批
    Auth = 1,
    /// 任何人可直接加入
    Any = 2,
}

/// 群资料
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    #[serde(rename = "groupID")]
    pub group_id: String,
    pub group_type: GroupType,
    pub group_name: String,
    #[serde(default)]
    pub notification: String,
    #[serde(default)]
    pub introduction: String,
    #[serde(default)]
    pub face_url: String,
    pub owner: String,
    pub add_opt: GroupAddOpt,
    #[serde(default)]
    pub is_all_muted: bool,
    #[serde(default)]
    pub custom_info: BTreeMap<String, String>,
    #[serde(default)]
    pub member_count: u32,
    #[serde(default)]
    pub create_time: i64,
    /// 当前用户在群内的角色（查询者视角）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_role: Option<GroupMemberRole>,
    /// 当前用户对该群的消息接收选项
    #[serde(default)]
    pub recv_opt: ReceiveMessageOpt,
}

/// 修改群资料参数（None 表示不修改）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfoPatch {
    #[serde(rename = "groupID")]
    pub group_id: String,
    pub group_name: Option<String>,
    pub notification: Option<String>,
    pub introduction: Option<String>,
    pub face_url: Option<String>,
    pub add_opt: Option<GroupAddOpt>,
    pub is_all_muted: Option<bool>,
    pub custom_info: Option<BTreeMap<String, String>>,
}

impl GroupInfoPatch {
    pub fn new(group_id: &str) -> Self {
        Self {
            group_id: group_id.to_string(),
            ..Default::default()
        }
    }

    /// 是否修改了全员禁言或加群方式（只有群主 / 管理员可改）
    pub fn touches_admin_fields(&self) -> bool {
        self.is_all_muted.is_some() || self.add_opt.is_some()
    }
}

/// 建群参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupParam {
    /// 自定义群 ID，为空由服务端生成
    #[serde(rename = "groupID", default)]
    pub group_id: Option<String>,
    pub group_type: GroupType,
    pub group_name: String,
    #[serde(default)]
    pub notification: String,
    #[serde(default)]
    pub introduction: String,
    #[serde(default)]
    pub face_url: String,
    /// 加群方式，为空使用群类型默认值
    #[serde(default)]
    pub add_opt: Option<GroupAddOpt>,
    /// 初始成员（直播群不支持）
    #[serde(default)]
    pub member_list: Vec<CreateGroupMember>,
}

impl CreateGroupParam {
    pub fn new(group_type: GroupType, group_name: &str) -> Self {
        Self {
            group_id: None,
            group_type,
            group_name: group_name.to_string(),
            notification: String::new(),
            introduction: String::new(),
            face_url: String::new(),
            add_opt: None,
            member_list: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupMember {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub role: GroupMemberRole,
}

/// 主动加群结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinGroupResult {
    Joined,
    /// 已提交申请，等待群主或管理员审批
    PendingApproval,
}

/// 群成员资料
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMemberInfo {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub role: GroupMemberRole,
    #[serde(default)]
    pub name_card: String,
    #[serde(default)]
    pub join_time: i64,
    /// 禁言截止时间（毫秒），0 表示未禁言
    #[serde(default)]
    pub mute_until: i64,
}

/// 群成员列表过滤
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GroupMemberFilter {
    #[default]
    All,
    Owner,
    Admin,
    Common,
}

impl GroupMemberFilter {
    pub fn matches(self, role: GroupMemberRole) -> bool {
        match self {
            GroupMemberFilter::All => true,
            GroupMemberFilter::Owner => role == GroupMemberRole::Owner,
            GroupMemberFilter::Admin => role == GroupMemberRole::Admin,
            GroupMemberFilter::Common => role == GroupMemberRole::Member,
        }
    }
}

/// 群成员分页结果；`next_seq` 为 0 表示已到末尾
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMemberPage {
    pub next_seq: u64,
    pub member_list: Vec<GroupMemberInfo>,
}

/// 批量操作中单个成员的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMemberOperationResult {
    #[serde(rename = "userID")]
    pub user_id: String,
    /// 0 表示成功
    pub result_code: i32,
    #[serde(default)]
    pub result_info: String,
}

/// 批量获取群资料的单条结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfoResult {
    #[serde(rename = "groupID")]
    pub group_id: String,
    pub result_code: i32,
    #[serde(default)]
    pub result_msg: String,
    pub info: Option<GroupInfo>,
}

/// 加群申请处理状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupApplicationStatus {
    Unhandled,
    Accepted,
    Refused,
}

/// 加群申请
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupApplication {
    #[serde(rename = "groupID")]
    pub group_id: String,
    pub from_user: String,
    #[serde(default)]
    pub request_msg: String,
    pub add_time: i64,
    pub status: GroupApplicationStatus,
    #[serde(default)]
    pub handled_by: String,
    #[serde(default)]
    pub handled_msg: String,
}

/// 群属性快照（带版本号，用于写入前的过期检测）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupAttributes {
    pub attributes: BTreeMap<String, String>,
    pub version: u64,
}

/// 群属性写操作
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "args")]
pub enum GroupAttributeWrite {
    /// 全量覆盖
    Init(BTreeMap<String, String>),
    /// 新增或更新
    Set(BTreeMap<String, String>),
    /// 删除指定 key，为空删除全部
    Delete(Vec<String>),
}

/// 群计数器快照
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupCounters {
    pub counters: BTreeMap<String, i64>,
    pub version: u64,
}

/// 校验群属性大小限制
pub fn check_group_attributes(attrs: &BTreeMap<String, String>) -> Result<(), String> {
    if attrs.len() > MAX_GROUP_ATTRIBUTE_KEYS {
        return Err(format!(
            "群属性 key 数量 {} 超过上限 {}",
            attrs.len(),
            MAX_GROUP_ATTRIBUTE_KEYS
        ));
    }
    let mut total = 0usize;
    for (k, v) in attrs {
        if k.is_empty() || k.len() > MAX_GROUP_ATTRIBUTE_KEY_LEN {
            return Err(format!("群属性 key `{k}` 长度不合法"));
        }
        if v.len() > MAX_GROUP_ATTRIBUTE_VALUE_LEN {
            return Err(format!("群属性 `{k}` 的 value 超过 4KB"));
        }
        total += k.len() + v.len();
    }
    if total > MAX_GROUP_ATTRIBUTES_TOTAL {
        return Err(format!("群属性总大小 {} 超过 16KB", total));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_limits() {
        let mut attrs = BTreeMap::new();
        for i in 0..16 {
            attrs.insert(format!("k{i}"), "v".repeat(900));
        }
        assert!(check_group_attributes(&attrs).is_ok());

        attrs.insert("k16".into(), "v".into());
        assert!(check_group_attributes(&attrs).is_err());

        let mut big = BTreeMap::new();
        big.insert("k".into(), "v".repeat(MAX_GROUP_ATTRIBUTE_VALUE_LEN + 1));
        assert!(check_group_attributes(&big).is_err());

        let mut long_key = BTreeMap::new();
        long_key.insert("k".repeat(33), "v".into());
        assert!(check_group_attributes(&long_key).is_err());

        // 16 * (2 + 1100) > 16KB
        let mut total = BTreeMap::new();
        for i in 0..16 {
            total.insert(format!("{i:02}"), "v".repeat(1100));
        }
        assert!(check_group_attributes(&total).is_err());
    }

    #[test]
    fn roles_are_ordered() {
        assert!(GroupMemberRole::Owner > GroupMemberRole::Admin);
        assert!(GroupMemberRole::Admin.is_admin_or_owner());
        assert!(!GroupMemberRole::Member.is_admin_or_owner());
        assert_eq!(GroupMemberRole::Owner as i32, 400);
    }
}
