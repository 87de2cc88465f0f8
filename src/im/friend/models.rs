//! 关系链模型定义

use serde::{Deserialize, Serialize};

/// 好友关系（以查询者视角）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FriendRelation {
    /// 互不在对方好友列表
    None,
    /// 对方在我的好友列表，我不在对方列表
    InMyList,
    /// 我在对方好友列表，对方不在我的列表
    InPeerList,
    /// 互为好友
    BothWay,
}

impl FriendRelation {
    pub fn from_edges(in_my_list: bool, in_peer_list: bool) -> Self {
        match (in_my_list, in_peer_list) {
            (true, true) => FriendRelation::BothWay,
            (true, false) => FriendRelation::InMyList,
            (false, true) => FriendRelation::InPeerList,
            (false, false) => FriendRelation::None,
        }
    }
}

/// 加好友 / 删好友 / 检查关系的方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FriendType {
    /// 单向
    Single,
    /// 双向
    #[default]
    Both,
}

/// 加好友验证方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AllowType {
    AllowAny,
    #[default]
    NeedConfirm,
    DenyAny,
}

/// 处理好友申请的方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FriendResponseType {
    /// 同意（只把自己加入申请者的好友列表）
    Agree,
    /// 同意并加对方为好友（双向）
    AgreeAndAdd,
}

/// 好友申请方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FriendApplicationType {
    /// 别人发给我的
    ComeIn,
    /// 我发出的
    SendOut,
}

/// 好友资料
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendInfo {
    #[serde(rename = "userID")]
    pub user_id: String,
    #[serde(default)]
    pub remark: String,
    #[serde(default)]
    pub friend_groups: Vec<String>,
    #[serde(default)]
    pub add_source: String,
    #[serde(default)]
    pub add_wording: String,
    pub add_time: i64,
}

/// 批量获取好友资料的单条结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendInfoResult {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub relation: FriendRelation,
    pub friend_info: Option<FriendInfo>,
}

/// 加好友参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendAddApplication {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub add_type: FriendType,
    #[serde(default)]
    pub remark: String,
    #[serde(default)]
    pub add_wording: String,
    #[serde(default)]
    pub add_source: String,
    /// 加入后放入的好友分组
    #[serde(default)]
    pub friend_group: String,
}

impl FriendAddApplication {
    pub fn new(user_id: &str, add_type: FriendType) -> Self {
        Self {
            user_id: user_id.to_string(),
            add_type,
            remark: String::new(),
            add_wording: String::new(),
            add_source: String::new(),
            friend_group: String::new(),
        }
    }
}

/// 好友申请
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendApplication {
    /// 对方用户 ID
    #[serde(rename = "userID")]
    pub user_id: String,
    pub application_type: FriendApplicationType,
    pub add_type: FriendType,
    #[serde(default)]
    pub add_wording: String,
    #[serde(default)]
    pub add_source: String,
    pub add_time: i64,
}

/// 关系链批量操作的单条结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendOperationResult {
    #[serde(rename = "userID")]
    pub user_id: String,
    /// 0 成功；30539 表示已发出申请等待对方处理
    pub result_code: i32,
    #[serde(default)]
    pub result_info: String,
}

impl FriendOperationResult {
    pub fn ok(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            result_code: 0,
            result_info: String::new(),
        }
    }

    pub fn fail(user_id: &str, code: i32, info: impl Into<String>) -> Self {
        Self {
            user_id: user_id.to_string(),
            result_code: code,
            result_info: info.into(),
        }
    }
}

/// 好友关系检查结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendCheckResult {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub relation: FriendRelation,
}

/// 好友分组
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendGroup {
    pub name: String,
    pub friend_count: usize,
    pub friend_list: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relation_is_four_valued() {
        assert_eq!(FriendRelation::from_edges(false, false), FriendRelation::None);
        assert_eq!(FriendRelation::from_edges(true, false), FriendRelation::InMyList);
        assert_eq!(FriendRelation::from_edges(false, true), FriendRelation::InPeerList);
        assert_eq!(FriendRelation::from_edges(true, true), FriendRelation::BothWay);
    }
}
