//! 关系链监听器回调接口

use crate::im::friend::models::{FriendApplication, FriendInfo};
use async_trait::async_trait;

/// 关系链监听器（默认空实现）
#[async_trait]
pub trait FriendshipListener: Send + Sync {
    /// 新的好友申请（收到的和自己发出的都会通知）
    async fn on_friend_application_list_added(&self, _applications: Vec<FriendApplication>) {}

    /// 好友申请被同意、拒绝或删除，参数为对方用户 ID
    async fn on_friend_application_list_deleted(&self, _user_ids: Vec<String>) {}

    async fn on_friend_list_added(&self, _friends: Vec<FriendInfo>) {}

    async fn on_friend_list_deleted(&self, _user_ids: Vec<String>) {}

    /// 好友资料变更（备注、分组）
    async fn on_friend_info_changed(&self, _friends: Vec<FriendInfo>) {}

    async fn on_blacklist_added(&self, _user_ids: Vec<String>) {}

    async fn on_blacklist_deleted(&self, _user_ids: Vec<String>) {}

    async fn on_friend_group_created(&self, _name: String, _user_ids: Vec<String>) {}

    async fn on_friend_group_deleted(&self, _names: Vec<String>) {}

    async fn on_friend_group_name_changed(&self, _old_name: String, _new_name: String) {}

    async fn on_friends_added_to_group(&self, _name: String, _user_ids: Vec<String>) {}

    async fn on_friends_deleted_from_group(&self, _name: String, _user_ids: Vec<String>) {}
}
