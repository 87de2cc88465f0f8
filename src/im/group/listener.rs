//! 群组监听器

use crate::im::group::models::{GroupApplication, GroupInfo, GroupMemberInfo};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// 群组事件回调（所有方法都有默认空实现，按需覆盖）
#[async_trait]
pub trait GroupListener: Send + Sync {
    /// 有新成员加入（主动加群或申请被同意）
    async fn on_member_enter(&self, _group_id: String, _members: Vec<GroupMemberInfo>) {}

    async fn on_member_leave(&self, _group_id: String, _user_id: String) {}

    async fn on_member_invited(
        &self,
        _group_id: String,
        _op_user: String,
        _members: Vec<GroupMemberInfo>,
    ) {
    }

    async fn on_member_kicked(&self, _group_id: String, _op_user: String, _user_ids: Vec<String>) {}

    /// 成员资料变更（群名片、禁言）
    async fn on_member_info_changed(&self, _group_id: String, _members: Vec<GroupMemberInfo>) {}

    async fn on_group_created(&self, _group: GroupInfo) {}

    async fn on_group_dismissed(&self, _group_id: String, _op_user: String) {}

    async fn on_group_info_changed(&self, _group: GroupInfo, _op_user: String) {}

    async fn on_group_owner_changed(&self, _group_id: String, _new_owner: String) {}

    /// 群属性变更，参数为变更后的全量属性
    async fn on_group_attribute_changed(
        &self,
        _group_id: String,
        _attributes: BTreeMap<String, String>,
    ) {
    }

    async fn on_group_counter_changed(&self, _group_id: String, _key: String, _value: i64) {}

    /// 收到加群申请（仅群主和管理员）
    async fn on_receive_join_application(&self, _application: GroupApplication) {}

    /// 自己的加群申请已被处理
    async fn on_application_processed(
        &self,
        _group_id: String,
        _op_user: String,
        _accepted: bool,
        _reason: String,
    ) {
    }

    async fn on_grant_administrator(&self, _group_id: String, _op_user: String, _user_id: String) {}

    async fn on_revoke_administrator(&self, _group_id: String, _op_user: String, _user_id: String) {}

    /// 自己退出了群（主动退群或被踢）
    async fn on_quit_from_group(&self, _group_id: String) {}
}
