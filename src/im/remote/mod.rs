//! 远端服务抽象
//!
//! 所有管理器只通过 [`RemoteService`] 与服务端交互。`MemoryServer` 是进程内的完整服务端实现，
//! `HttpRemote` 通过 HTTP + WebSocket 访问远端部署。

pub mod http;
pub mod memory;
pub mod push;

pub use http::{HttpRemote, HttpRemoteConfig};
pub use memory::MemoryServer;
pub use push::{FriendEvent, GroupEvent, PushReceiver, PushSender, ServerPush};

use crate::im::error::ImResult;
use crate::im::friend::models::{
    AllowType, FriendAddApplication, FriendApplication, FriendApplicationType, FriendCheckResult,
    FriendGroup, FriendInfo, FriendInfoResult, FriendOperationResult, FriendResponseType,
    FriendType,
};
use crate::im::group::models::{
    CreateGroupParam, GroupApplication, GroupAttributeWrite, GroupAttributes, GroupCounters,
    GroupInfo, GroupInfoPatch, GroupInfoResult, GroupMemberFilter, GroupMemberInfo,
    GroupMemberOperationResult, GroupMemberPage, GroupMemberRole, JoinGroupResult,
};
use crate::im::message::models::{
    Message, MessageExtension, MessageExtensionResult, MessageReceipt, MessageRevoked,
};
use crate::im::types::ReceiveMessageOpt;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 调用者身份（登录成功后由服务端下发的凭证）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Caller {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub token: String,
    #[serde(rename = "connectionID")]
    pub connection_id: u64,
}

/// 登录结果
#[derive(Debug)]
pub struct LoginAck {
    pub token: String,
    pub connection_id: u64,
    pub server_time: i64,
    /// 本次连接的推送通道
    pub push_rx: PushReceiver,
}

/// 发送消息的服务端确认
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageAck {
    #[serde(rename = "msgID")]
    pub msg_id: String,
    pub seq: i64,
    pub timestamp: i64,
    pub order_key: u64,
    /// 发送者对该会话的接收选项
    #[serde(default)]
    pub recv_opt: ReceiveMessageOpt,
}

/// 修改消息的服务端结果：冲突时 `err_code` 非 0，`message` 总是服务端当前版本
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyMessageAck {
    pub err_code: i32,
    #[serde(default)]
    pub err_msg: String,
    pub message: Message,
}

/// 单聊 / 群聊接收选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveOptEntry {
    #[serde(rename = "conversationID")]
    pub conversation_id: String,
    pub opt: ReceiveMessageOpt,
}

#[async_trait]
pub trait RemoteService: Send + Sync {
    // ---------- 登录 ----------
    async fn login(&self, user_id: &str, ticket: &str) -> ImResult<LoginAck>;
    async fn logout(&self, caller: &Caller) -> ImResult<()>;

    // ---------- 消息 ----------
    async fn send_message(&self, caller: &Caller, message: &Message) -> ImResult<SendMessageAck>;
    /// 拉取漫游消息，按 (时间戳, seq) 倒序，`before` 为空从最新开始
    async fn get_history_messages(
        &self,
        caller: &Caller,
        conversation_id: &str,
        before: Option<(i64, i64)>,
        count: usize,
    ) -> ImResult<Vec<Message>>;
    async fn find_messages(&self, caller: &Caller, msg_ids: &[String]) -> ImResult<Vec<Message>>;
    async fn revoke_message(&self, caller: &Caller, msg_id: &str) -> ImResult<MessageRevoked>;
    async fn modify_message(&self, caller: &Caller, message: &Message)
        -> ImResult<ModifyMessageAck>;
    /// 删除消息（只对调用者不可见，不同步到其他终端）
    async fn delete_messages(
        &self,
        caller: &Caller,
        conversation_id: &str,
        msg_ids: &[String],
    ) -> ImResult<()>;
    async fn clear_history(&self, caller: &Caller, conversation_id: &str) -> ImResult<()>;
    async fn mark_conversation_read(&self, caller: &Caller, conversation_id: &str)
        -> ImResult<()>;
    async fn send_read_receipts(&self, caller: &Caller, msg_ids: &[String]) -> ImResult<()>;
    async fn get_read_receipts(
        &self,
        caller: &Caller,
        msg_ids: &[String],
    ) -> ImResult<Vec<MessageReceipt>>;
    async fn set_message_extensions(
        &self,
        caller: &Caller,
        msg_id: &str,
        extensions: &[MessageExtension],
    ) -> ImResult<Vec<MessageExtensionResult>>;
    async fn get_message_extensions(
        &self,
        caller: &Caller,
        msg_id: &str,
    ) -> ImResult<Vec<MessageExtension>>;
    /// 删除扩展，`keys` 为空删除全部
    async fn delete_message_extensions(
        &self,
        caller: &Caller,
        msg_id: &str,
        keys: &[String],
    ) -> ImResult<Vec<MessageExtensionResult>>;
    async fn set_receive_message_opt(
        &self,
        caller: &Caller,
        conversation_ids: &[String],
        opt: ReceiveMessageOpt,
    ) -> ImResult<()>;
    async fn get_receive_message_opt(
        &self,
        caller: &Caller,
        conversation_ids: &[String],
    ) -> ImResult<Vec<ReceiveOptEntry>>;

    // ---------- 群组 ----------
    async fn create_group(&self, caller: &Caller, param: &CreateGroupParam) -> ImResult<String>;
    async fn dismiss_group(&self, caller: &Caller, group_id: &str) -> ImResult<()>;
    async fn join_group(
        &self,
        caller: &Caller,
        group_id: &str,
        request_msg: &str,
    ) -> ImResult<JoinGroupResult>;
    async fn quit_group(&self, caller: &Caller, group_id: &str) -> ImResult<()>;
    async fn get_joined_group_list(&self, caller: &Caller) -> ImResult<Vec<GroupInfo>>;
    async fn get_groups_info(
        &self,
        caller: &Caller,
        group_ids: &[String],
    ) -> ImResult<Vec<GroupInfoResult>>;
    async fn set_group_info(&self, caller: &Caller, patch: &GroupInfoPatch) -> ImResult<()>;
    async fn get_group_member_list(
        &self,
        caller: &Caller,
        group_id: &str,
        filter: GroupMemberFilter,
        next_seq: u64,
        count: usize,
    ) -> ImResult<GroupMemberPage>;
    async fn get_group_members_info(
        &self,
        caller: &Caller,
        group_id: &str,
        user_ids: &[String],
    ) -> ImResult<Vec<GroupMemberInfo>>;
    async fn set_group_member_info(
        &self,
        caller: &Caller,
        group_id: &str,
        user_id: &str,
        name_card: &str,
    ) -> ImResult<()>;
    async fn mute_group_member(
        &self,
        caller: &Caller,
        group_id: &str,
        user_id: &str,
        seconds: u32,
    ) -> ImResult<()>;
    async fn invite_user_to_group(
        &self,
        caller: &Caller,
        group_id: &str,
        user_ids: &[String],
    ) -> ImResult<Vec<GroupMemberOperationResult>>;
    async fn kick_group_member(
        &self,
        caller: &Caller,
        group_id: &str,
        user_ids: &[String],
        reason: &str,
    ) -> ImResult<Vec<GroupMemberOperationResult>>;
    async fn set_group_member_role(
        &self,
        caller: &Caller,
        group_id: &str,
        user_id: &str,
        role: GroupMemberRole,
    ) -> ImResult<()>;
    async fn transfer_group_owner(
        &self,
        caller: &Caller,
        group_id: &str,
        user_id: &str,
    ) -> ImResult<()>;
    async fn get_group_application_list(&self, caller: &Caller)
        -> ImResult<Vec<GroupApplication>>;
    async fn handle_group_application(
        &self,
        caller: &Caller,
        group_id: &str,
        from_user: &str,
        accept: bool,
        reason: &str,
    ) -> ImResult<()>;
    /// 写群属性，`known_version` 与服务端不一致时返回冲突
    async fn write_group_attributes(
        &self,
        caller: &Caller,
        group_id: &str,
        known_version: u64,
        op: &GroupAttributeWrite,
    ) -> ImResult<GroupAttributes>;
    async fn get_group_attributes(&self, caller: &Caller, group_id: &str)
        -> ImResult<GroupAttributes>;
    async fn get_group_online_member_count(&self, caller: &Caller, group_id: &str)
        -> ImResult<u32>;
    async fn set_group_counters(
        &self,
        caller: &Caller,
        group_id: &str,
        known_version: u64,
        counters: &BTreeMap<String, i64>,
    ) -> ImResult<GroupCounters>;
    /// 原子增减计数器（`delta` 可为负）
    async fn increase_group_counter(
        &self,
        caller: &Caller,
        group_id: &str,
        key: &str,
        delta: i64,
    ) -> ImResult<GroupCounters>;
    async fn get_group_counters(
        &self,
        caller: &Caller,
        group_id: &str,
        keys: &[String],
    ) -> ImResult<GroupCounters>;

    // ---------- 关系链 ----------
    async fn add_friend(
        &self,
        caller: &Caller,
        application: &FriendAddApplication,
    ) -> ImResult<FriendOperationResult>;
    async fn delete_friends(
        &self,
        caller: &Caller,
        user_ids: &[String],
        delete_type: FriendType,
    ) -> ImResult<Vec<FriendOperationResult>>;
    async fn get_friend_list(&self, caller: &Caller) -> ImResult<Vec<FriendInfo>>;
    async fn get_friends_info(
        &self,
        caller: &Caller,
        user_ids: &[String],
    ) -> ImResult<Vec<FriendInfoResult>>;
    async fn set_friend_remark(&self, caller: &Caller, user_id: &str, remark: &str)
        -> ImResult<()>;
    async fn check_friend(
        &self,
        caller: &Caller,
        user_ids: &[String],
        check_type: FriendType,
    ) -> ImResult<Vec<FriendCheckResult>>;
    async fn get_friend_applications(&self, caller: &Caller) -> ImResult<Vec<FriendApplication>>;
    async fn accept_friend_application(
        &self,
        caller: &Caller,
        user_id: &str,
        response: FriendResponseType,
    ) -> ImResult<FriendOperationResult>;
    async fn refuse_friend_application(
        &self,
        caller: &Caller,
        user_id: &str,
    ) -> ImResult<FriendOperationResult>;
    async fn delete_friend_application(
        &self,
        caller: &Caller,
        user_id: &str,
        application_type: FriendApplicationType,
    ) -> ImResult<()>;
    async fn add_to_blacklist(
        &self,
        caller: &Caller,
        user_ids: &[String],
    ) -> ImResult<Vec<FriendOperationResult>>;
    async fn delete_from_blacklist(
        &self,
        caller: &Caller,
        user_ids: &[String],
    ) -> ImResult<Vec<FriendOperationResult>>;
    async fn get_blacklist(&self, caller: &Caller) -> ImResult<Vec<String>>;
    async fn set_allow_type(&self, caller: &Caller, allow_type: AllowType) -> ImResult<()>;
    async fn get_allow_type(&self, caller: &Caller) -> ImResult<AllowType>;
    async fn create_friend_group(
        &self,
        caller: &Caller,
        name: &str,
        user_ids: &[String],
    ) -> ImResult<Vec<FriendOperationResult>>;
    /// `names` 为空返回全部分组
    async fn get_friend_groups(&self, caller: &Caller, names: &[String])
        -> ImResult<Vec<FriendGroup>>;
    async fn delete_friend_groups(&self, caller: &Caller, names: &[String]) -> ImResult<()>;
    async fn rename_friend_group(
        &self,
        caller: &Caller,
        old_name: &str,
        new_name: &str,
    ) -> ImResult<()>;
    async fn add_friends_to_friend_group(
        &self,
        caller: &Caller,
        name: &str,
        user_ids: &[String],
    ) -> ImResult<Vec<FriendOperationResult>>;
    async fn delete_friends_from_friend_group(
        &self,
        caller: &Caller,
        name: &str,
        user_ids: &[String],
    ) -> ImResult<Vec<FriendOperationResult>>;
}
