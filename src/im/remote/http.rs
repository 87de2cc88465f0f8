//! 基于 HTTP + WebSocket 的远端实现
//!
//! 所有业务调用都是 `POST {api_base_url}/{path}`，请求体为 JSON，响应为统一的
//! `{errCode, errMsg, data}` 包装。服务端推送通过 WebSocket 下发，文本帧是 JSON，
//! 二进制帧是 gzip 压缩后的 JSON。

use crate::im::error::{ImError, ImResult};
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
use crate::im::remote::push::{PushReceiver, PushSender, ServerPush};
use crate::im::remote::{
    Caller, LoginAck, ModifyMessageAck, ReceiveOptEntry, RemoteService, SendMessageAck,
};
use crate::im::serialization::{decompress_gzip, deserialize_vec_or_null, is_gzip};
use crate::im::types::{handle_http_response, ReceiveMessageOpt};
use anyhow::Context;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, error, info, warn};

/// 远端部署配置
#[derive(Debug, Clone)]
pub struct HttpRemoteConfig {
    /// HTTP API 地址，例如 `http://127.0.0.1:10002`
    pub api_base_url: String,
    /// WebSocket 推送地址，例如 `ws://127.0.0.1:10001`
    pub ws_url: String,
    /// 推送压缩方式：`gzip` 或空
    pub compression: String,
    pub platform_id: i32,
}

impl HttpRemoteConfig {
    pub fn new(api_base_url: &str, ws_url: &str) -> Self {
        Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            ws_url: ws_url.trim_end_matches('/').to_string(),
            compression: "gzip".to_string(),
            platform_id: 1,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginData {
    token: String,
    #[serde(rename = "connectionID")]
    connection_id: u64,
    #[serde(default)]
    server_time: i64,
}

#[derive(Deserialize)]
struct HistoryData {
    #[serde(default, deserialize_with = "deserialize_vec_or_null")]
    messages: Vec<Message>,
}

/// WebSocket 建连后的第一帧
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WsConnectResp {
    err_code: i32,
    #[serde(default)]
    err_msg: String,
}

/// 解码一帧推送：gzip 二进制帧先解压
pub(crate) fn decode_push_frame(data: &[u8]) -> anyhow::Result<ServerPush> {
    let raw = if is_gzip(data) {
        decompress_gzip(data).context("解压推送帧失败")?
    } else {
        data.to_vec()
    };
    serde_json::from_slice(&raw).with_context(|| {
        format!(
            "解析推送帧失败, 原始数据: {}",
            String::from_utf8_lossy(&raw)
        )
    })
}

pub struct HttpRemote {
    config: HttpRemoteConfig,
    http: reqwest::Client,
}

impl HttpRemote {
    pub fn new(config: HttpRemoteConfig) -> anyhow::Result<Self> {
        let http = reqwest::ClientBuilder::new()
            .timeout(Duration::from_secs(30))
            .build()
            .context("创建 HTTP 客户端失败")?;
        Ok(Self { config, http })
    }

    fn build_ws_url(&self, user_id: &str, token: &str, operation_id: &str) -> String {
        let compression_param = if self.config.compression.is_empty() {
            String::new()
        } else {
            format!("&compression={}", self.config.compression)
        };
        format!(
            "{}/?token={}&sendID={}&platformID={}&operationID={}{}",
            self.config.ws_url,
            token,
            user_id,
            self.config.platform_id,
            operation_id,
            compression_param
        )
    }

    /// 发起一次调用，`data` 允许为空
    async fn post_opt<T: DeserializeOwned>(
        &self,
        caller: Option<&Caller>,
        path: &str,
        body: Value,
    ) -> ImResult<Option<T>> {
        let url = format!("{}/{}", self.config.api_base_url, path);
        let operation_id = format!("{}", chrono::Utc::now().timestamp_millis());
        debug!("[HttpRemote] 📡 POST {} operationID={}", url, operation_id);

        let mut req = self
            .http
            .post(&url)
            .header("Content-Type", "application/json")
            .header("operationID", &operation_id);
        if let Some(caller) = caller {
            req = req
                .header("token", &caller.token)
                .header("connectionID", caller.connection_id.to_string());
        }
        let resp = req
            .json(&body)
            .send()
            .await
            .map_err(|e| ImError::network(format!("请求 {path} 失败: {e}")))?;
        let api_resp = handle_http_response::<T>(resp, path)
            .await
            .map_err(|e| ImError::network(format!("{e:#}")))?;
        if api_resp.err_code != 0 {
            return Err(ImError::new(api_resp.err_code, api_resp.err_msg));
        }
        Ok(api_resp.data)
    }

    async fn post<T: DeserializeOwned>(&self, caller: &Caller, path: &str, body: Value) -> ImResult<T> {
        self.post_opt(Some(caller), path, body)
            .await?
            .ok_or_else(|| ImError::internal(format!("{path} 响应缺少 data")))
    }

    async fn post_unit(&self, caller: &Caller, path: &str, body: Value) -> ImResult<()> {
        self.post_opt::<IgnoredAny>(Some(caller), path, body).await?;
        Ok(())
    }

    async fn post_list<T: DeserializeOwned>(
        &self,
        caller: &Caller,
        path: &str,
        body: Value,
    ) -> ImResult<Vec<T>> {
        Ok(self
            .post_opt::<Vec<T>>(Some(caller), path, body)
            .await?
            .unwrap_or_default())
    }

    /// 建立推送连接并启动读取任务
    async fn connect_push(&self, user_id: &str, token: &str) -> anyhow::Result<PushReceiver> {
        let operation_id = format!("{}", chrono::Utc::now().timestamp_millis());
        let url = self.build_ws_url(user_id, token, &operation_id);
        info!("[HttpRemote] 🔗 连接推送通道 (user={})", user_id);

        let (ws_stream, response) = connect_async(&url)
            .await
            .context("WebSocket 连接失败")?;
        info!("[HttpRemote] ✅ WebSocket 连接成功, 状态: {}", response.status());

        let (mut write, mut read) = ws_stream.split();
        match read.next().await {
            Some(Ok(WsMessage::Text(text))) => {
                let resp: WsConnectResp = serde_json::from_str(&text)
                    .with_context(|| format!("WebSocket 响应解析失败, 原始响应: {text}"))?;
                if resp.err_code != 0 {
                    error!(
                        "[HttpRemote] ❌ WebSocket 鉴权失败，错误码: {}, 错误信息: {}",
                        resp.err_code, resp.err_msg
                    );
                    return Err(ImError::new(resp.err_code, resp.err_msg).into());
                }
            }
            other => {
                return Err(anyhow::anyhow!("未收到 WebSocket 连接响应: {:?}", other));
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let heartbeat = tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(25));
            loop {
                ticker.tick().await;
                if write.send(WsMessage::Ping(vec![])).await.is_err() {
                    break;
                }
            }
        });

        tokio::spawn(async move {
            read_push_frames(read, tx).await;
            heartbeat.abort();
            debug!("[HttpRemote] 推送读取任务结束");
        });
        Ok(rx)
    }
}

async fn read_push_frames<S>(mut read: S, tx: PushSender)
where
    S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + Unpin,
{
    while let Some(frame) = read.next().await {
        let data = match frame {
            Ok(WsMessage::Text(text)) => text.into_bytes(),
            Ok(WsMessage::Binary(data)) => data,
            Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => continue,
            Ok(WsMessage::Close(frame)) => {
                warn!("[HttpRemote] 👋 连接关闭: {:?}", frame);
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                error!("[HttpRemote] WebSocket 错误: {}", e);
                break;
            }
        };
        match decode_push_frame(&data) {
            Ok(push) => {
                debug!("[HttpRemote] 📥 收到推送: {}", push.kind());
                if tx.send(push).is_err() {
                    break;
                }
            }
            Err(e) => error!("[HttpRemote] {:#}", e),
        }
    }
}

#[async_trait]
impl RemoteService for HttpRemote {
    async fn login(&self, user_id: &str, ticket: &str) -> ImResult<LoginAck> {
        let data: LoginData = self
            .post_opt(
                None,
                "auth/login",
                json!({ "userID": user_id, "ticket": ticket, "platformID": self.config.platform_id }),
            )
            .await?
            .ok_or_else(|| ImError::internal("登录响应缺少 data"))?;
        let push_rx = self
            .connect_push(user_id, &data.token)
            .await
            .map_err(|e| match e.downcast::<ImError>() {
                Ok(err) => err,
                Err(e) => ImError::network(format!("{e:#}")),
            })?;
        Ok(LoginAck {
            token: data.token,
            connection_id: data.connection_id,
            server_time: data.server_time,
            push_rx,
        })
    }

    async fn logout(&self, caller: &Caller) -> ImResult<()> {
        self.post_unit(caller, "auth/logout", json!({})).await
    }

    // ---------- 消息 ----------

    async fn send_message(&self, caller: &Caller, message: &Message) -> ImResult<SendMessageAck> {
        self.post(caller, "msg/send_msg", json!({ "message": message })).await
    }

    async fn get_history_messages(
        &self,
        caller: &Caller,
        conversation_id: &str,
        before: Option<(i64, i64)>,
        count: usize,
    ) -> ImResult<Vec<Message>> {
        let data: Option<HistoryData> = self
            .post_opt(
                Some(caller),
                "msg/pull_history",
                json!({ "conversationID": conversation_id, "before": before, "count": count }),
            )
            .await?;
        Ok(data.map(|d| d.messages).unwrap_or_default())
    }

    async fn find_messages(&self, caller: &Caller, msg_ids: &[String]) -> ImResult<Vec<Message>> {
        self.post_list(caller, "msg/find_msgs", json!({ "msgIDs": msg_ids }))
            .await
    }

    async fn revoke_message(&self, caller: &Caller, msg_id: &str) -> ImResult<MessageRevoked> {
        self.post(caller, "msg/revoke_msg", json!({ "msgID": msg_id }))
            .await
    }

    async fn modify_message(
        &self,
        caller: &Caller,
        message: &Message,
    ) -> ImResult<ModifyMessageAck> {
        self.post(caller, "msg/modify_msg", json!({ "message": message }))
            .await
    }

    async fn delete_messages(
        &self,
        caller: &Caller,
        conversation_id: &str,
        msg_ids: &[String],
    ) -> ImResult<()> {
        self.post_unit(
            caller,
            "msg/delete_msgs",
            json!({ "conversationID": conversation_id, "msgIDs": msg_ids }),
        )
        .await
    }

    async fn clear_history(&self, caller: &Caller, conversation_id: &str) -> ImResult<()> {
        self.post_unit(
            caller,
            "msg/clear_conversation_msg",
            json!({ "conversationID": conversation_id }),
        )
        .await
    }

    async fn mark_conversation_read(
        &self,
        caller: &Caller,
        conversation_id: &str,
    ) -> ImResult<()> {
        self.post_unit(
            caller,
            "msg/mark_conversation_as_read",
            json!({ "conversationID": conversation_id }),
        )
        .await
    }

    async fn send_read_receipts(&self, caller: &Caller, msg_ids: &[String]) -> ImResult<()> {
        self.post_unit(caller, "msg/send_read_receipts", json!({ "msgIDs": msg_ids }))
            .await
    }

    async fn get_read_receipts(
        &self,
        caller: &Caller,
        msg_ids: &[String],
    ) -> ImResult<Vec<MessageReceipt>> {
        self.post_list(caller, "msg/get_read_receipts", json!({ "msgIDs": msg_ids }))
            .await
    }

    async fn set_message_extensions(
        &self,
        caller: &Caller,
        msg_id: &str,
        extensions: &[MessageExtension],
    ) -> ImResult<Vec<MessageExtensionResult>> {
        self.post_list(
            caller,
            "msg/set_extensions",
            json!({ "msgID": msg_id, "extensions": extensions }),
        )
        .await
    }

    async fn get_message_extensions(
        &self,
        caller: &Caller,
        msg_id: &str,
    ) -> ImResult<Vec<MessageExtension>> {
        self.post_list(caller, "msg/get_extensions", json!({ "msgID": msg_id }))
            .await
    }

    async fn delete_message_extensions(
        &self,
        caller: &Caller,
        msg_id: &str,
        keys: &[String],
    ) -> ImResult<Vec<MessageExtensionResult>> {
        self.post_list(
            caller,
            "msg/delete_extensions",
            json!({ "msgID": msg_id, "keys": keys }),
        )
        .await
    }

    async fn set_receive_message_opt(
        &self,
        caller: &Caller,
        conversation_ids: &[String],
        opt: ReceiveMessageOpt,
    ) -> ImResult<()> {
        self.post_unit(
            caller,
            "conversation/set_recv_msg_opt",
            json!({ "conversationIDs": conversation_ids, "opt": opt }),
        )
        .await
    }

    async fn get_receive_message_opt(
        &self,
        caller: &Caller,
        conversation_ids: &[String],
    ) -> ImResult<Vec<ReceiveOptEntry>> {
        self.post_list(
            caller,
            "conversation/get_recv_msg_opt",
            json!({ "conversationIDs": conversation_ids }),
        )
        .await
    }

    // ---------- 群组 ----------

    async fn create_group(&self, caller: &Caller, param: &CreateGroupParam) -> ImResult<String> {
        #[derive(Deserialize)]
        struct Created {
            #[serde(rename = "groupID")]
            group_id: String,
        }
        let created: Created = self.post(caller, "group/create_group", json!(param)).await?;
        Ok(created.group_id)
    }

    async fn dismiss_group(&self, caller: &Caller, group_id: &str) -> ImResult<()> {
        self.post_unit(caller, "group/dismiss_group", json!({ "groupID": group_id }))
            .await
    }

    async fn join_group(
        &self,
        caller: &Caller,
        group_id: &str,
        request_msg: &str,
    ) -> ImResult<JoinGroupResult> {
        self.post(
            caller,
            "group/join_group",
            json!({ "groupID": group_id, "reqMessage": request_msg }),
        )
        .await
    }

    async fn quit_group(&self, caller: &Caller, group_id: &str) -> ImResult<()> {
        self.post_unit(caller, "group/quit_group", json!({ "groupID": group_id }))
            .await
    }

    async fn get_joined_group_list(&self, caller: &Caller) -> ImResult<Vec<GroupInfo>> {
        self.post_list(caller, "group/get_joined_group_list", json!({}))
            .await
    }

    async fn get_groups_info(
        &self,
        caller: &Caller,
        group_ids: &[String],
    ) -> ImResult<Vec<GroupInfoResult>> {
        self.post_list(caller, "group/get_groups_info", json!({ "groupIDs": group_ids }))
            .await
    }

    async fn set_group_info(&self, caller: &Caller, patch: &GroupInfoPatch) -> ImResult<()> {
        self.post_unit(caller, "group/set_group_info", json!(patch))
            .await
    }

    async fn get_group_member_list(
        &self,
        caller: &Caller,
        group_id: &str,
        filter: GroupMemberFilter,
        next_seq: u64,
        count: usize,
    ) -> ImResult<GroupMemberPage> {
        self.post(
            caller,
            "group/get_group_member_list",
            json!({ "groupID": group_id, "filter": filter, "nextSeq": next_seq, "count": count }),
        )
        .await
    }

    async fn get_group_members_info(
        &self,
        caller: &Caller,
        group_id: &str,
        user_ids: &[String],
    ) -> ImResult<Vec<GroupMemberInfo>> {
        self.post_list(
            caller,
            "group/get_group_members_info",
            json!({ "groupID": group_id, "userIDs": user_ids }),
        )
        .await
    }

    async fn set_group_member_info(
        &self,
        caller: &Caller,
        group_id: &str,
        user_id: &str,
        name_card: &str,
    ) -> ImResult<()> {
        self.post_unit(
            caller,
            "group/set_group_member_info",
            json!({ "groupID": group_id, "userID": user_id, "nameCard": name_card }),
        )
        .await
    }

    async fn mute_group_member(
        &self,
        caller: &Caller,
        group_id: &str,
        user_id: &str,
        seconds: u32,
    ) -> ImResult<()> {
        self.post_unit(
            caller,
            "group/mute_group_member",
            json!({ "groupID": group_id, "userID": user_id, "mutedSeconds": seconds }),
        )
        .await
    }

    async fn invite_user_to_group(
        &self,
        caller: &Caller,
        group_id: &str,
        user_ids: &[String],
    ) -> ImResult<Vec<GroupMemberOperationResult>> {
        self.post_list(
            caller,
            "group/invite_user_to_group",
            json!({ "groupID": group_id, "invitedUserIDs": user_ids }),
        )
        .await
    }

    async fn kick_group_member(
        &self,
        caller: &Caller,
        group_id: &str,
        user_ids: &[String],
        reason: &str,
    ) -> ImResult<Vec<GroupMemberOperationResult>> {
        self.post_list(
            caller,
            "group/kick_group",
            json!({ "groupID": group_id, "kickedUserIDs": user_ids, "reason": reason }),
        )
        .await
    }

    async fn set_group_member_role(
        &self,
        caller: &Caller,
        group_id: &str,
        user_id: &str,
        role: GroupMemberRole,
    ) -> ImResult<()> {
        self.post_unit(
            caller,
            "group/set_group_member_role",
            json!({ "groupID": group_id, "userID": user_id, "role": role }),
        )
        .await
    }

    async fn transfer_group_owner(
        &self,
        caller: &Caller,
        group_id: &str,
        user_id: &str,
    ) -> ImResult<()> {
        self.post_unit(
            caller,
            "group/transfer_group",
            json!({ "groupID": group_id, "newOwnerUserID": user_id }),
        )
        .await
    }

    async fn get_group_application_list(
        &self,
        caller: &Caller,
    ) -> ImResult<Vec<GroupApplication>> {
        self.post_list(caller, "group/get_recv_group_applicationList", json!({}))
            .await
    }

    async fn handle_group_application(
        &self,
        caller: &Caller,
        group_id: &str,
        from_user: &str,
        accept: bool,
        reason: &str,
    ) -> ImResult<()> {
        self.post_unit(
            caller,
            "group/group_application_response",
            json!({
                "groupID": group_id,
                "fromUserID": from_user,
                "accept": accept,
                "handledMsg": reason,
            }),
        )
        .await
    }

    async fn write_group_attributes(
        &self,
        caller: &Caller,
        group_id: &str,
        known_version: u64,
        op: &GroupAttributeWrite,
    ) -> ImResult<GroupAttributes> {
        self.post(
            caller,
            "group/write_group_attributes",
            json!({ "groupID": group_id, "version": known_version, "write": op }),
        )
        .await
    }

    async fn get_group_attributes(
        &self,
        caller: &Caller,
        group_id: &str,
    ) -> ImResult<GroupAttributes> {
        self.post(caller, "group/get_group_attributes", json!({ "groupID": group_id }))
            .await
    }

    async fn get_group_online_member_count(
        &self,
        caller: &Caller,
        group_id: &str,
    ) -> ImResult<u32> {
        self.post(
            caller,
            "group/get_online_member_count",
            json!({ "groupID": group_id }),
        )
        .await
    }

    async fn set_group_counters(
        &self,
        caller: &Caller,
        group_id: &str,
        known_version: u64,
        counters: &BTreeMap<String, i64>,
    ) -> ImResult<GroupCounters> {
        self.post(
            caller,
            "group/set_group_counters",
            json!({ "groupID": group_id, "version": known_version, "counters": counters }),
        )
        .await
    }

    async fn increase_group_counter(
        &self,
        caller: &Caller,
        group_id: &str,
        key: &str,
        delta: i64,
    ) -> ImResult<GroupCounters> {
        self.post(
            caller,
            "group/increase_group_counter",
            json!({ "groupID": group_id, "key": key, "delta": delta }),
        )
        .await
    }

    async fn get_group_counters(
        &self,
        caller: &Caller,
        group_id: &str,
        keys: &[String],
    ) -> ImResult<GroupCounters> {
        self.post(
            caller,
            "group/get_group_counters",
            json!({ "groupID": group_id, "keys": keys }),
        )
        .await
    }

    // ---------- 关系链 ----------

    async fn add_friend(
        &self,
        caller: &Caller,
        application: &FriendAddApplication,
    ) -> ImResult<FriendOperationResult> {
        self.post(caller, "friend/add_friend", json!(application))
            .await
    }

    async fn delete_friends(
        &self,
        caller: &Caller,
        user_ids: &[String],
        delete_type: FriendType,
    ) -> ImResult<Vec<FriendOperationResult>> {
        self.post_list(
            caller,
            "friend/delete_friend",
            json!({ "friendUserIDs": user_ids, "deleteType": delete_type }),
        )
        .await
    }

    async fn get_friend_list(&self, caller: &Caller) -> ImResult<Vec<FriendInfo>> {
        self.post_list(caller, "friend/get_friend_list", json!({}))
            .await
    }

    async fn get_friends_info(
        &self,
        caller: &Caller,
        user_ids: &[String],
    ) -> ImResult<Vec<FriendInfoResult>> {
        self.post_list(
            caller,
            "friend/get_designated_friends",
            json!({ "friendUserIDs": user_ids }),
        )
        .await
    }

    async fn set_friend_remark(
        &self,
        caller: &Caller,
        user_id: &str,
        remark: &str,
    ) -> ImResult<()> {
        self.post_unit(
            caller,
            "friend/set_friend_remark",
            json!({ "toUserID": user_id, "remark": remark }),
        )
        .await
    }

    async fn check_friend(
        &self,
        caller: &Caller,
        user_ids: &[String],
        check_type: FriendType,
    ) -> ImResult<Vec<FriendCheckResult>> {
        self.post_list(
            caller,
            "friend/is_friend",
            json!({ "userIDs": user_ids, "checkType": check_type }),
        )
        .await
    }

    async fn get_friend_applications(&self, caller: &Caller) -> ImResult<Vec<FriendApplication>> {
        self.post_list(caller, "friend/get_friend_apply_list", json!({}))
            .await
    }

    async fn accept_friend_application(
        &self,
        caller: &Caller,
        user_id: &str,
        response: FriendResponseType,
    ) -> ImResult<FriendOperationResult> {
        self.post(
            caller,
            "friend/add_friend_response",
            json!({ "toUserID": user_id, "responseType": response }),
        )
        .await
    }

    async fn refuse_friend_application(
        &self,
        caller: &Caller,
        user_id: &str,
    ) -> ImResult<FriendOperationResult> {
        self.post(
            caller,
            "friend/refuse_friend_apply",
            json!({ "toUserID": user_id }),
        )
        .await
    }

    async fn delete_friend_application(
        &self,
        caller: &Caller,
        user_id: &str,
        application_type: FriendApplicationType,
    ) -> ImResult<()> {
        self.post_unit(
            caller,
            "friend/delete_friend_apply",
            json!({ "userID": user_id, "applicationType": application_type }),
        )
        .await
    }

    async fn add_to_blacklist(
        &self,
        caller: &Caller,
        user_ids: &[String],
    ) -> ImResult<Vec<FriendOperationResult>> {
        self.post_list(caller, "friend/add_black", json!({ "userIDs": user_ids }))
            .await
    }

    async fn delete_from_blacklist(
        &self,
        caller: &Caller,
        user_ids: &[String],
    ) -> ImResult<Vec<FriendOperationResult>> {
        self.post_list(caller, "friend/remove_black", json!({ "userIDs": user_ids }))
            .await
    }

    async fn get_blacklist(&self, caller: &Caller) -> ImResult<Vec<String>> {
        self.post_list(caller, "friend/get_black_list", json!({}))
            .await
    }

    async fn set_allow_type(&self, caller: &Caller, allow_type: AllowType) -> ImResult<()> {
        self.post_unit(
            caller,
            "friend/set_allow_type",
            json!({ "allowType": allow_type }),
        )
        .await
    }

    async fn get_allow_type(&self, caller: &Caller) -> ImResult<AllowType> {
        self.post(caller, "friend/get_allow_type", json!({})).await
    }

    async fn create_friend_group(
        &self,
        caller: &Caller,
        name: &str,
        user_ids: &[String],
    ) -> ImResult<Vec<FriendOperationResult>> {
        self.post_list(
            caller,
            "friend/create_friend_group",
            json!({ "name": name, "userIDs": user_ids }),
        )
        .await
    }

    async fn get_friend_groups(
        &self,
        caller: &Caller,
        names: &[String],
    ) -> ImResult<Vec<FriendGroup>> {
        self.post_list(caller, "friend/get_friend_groups", json!({ "names": names }))
            .await
    }

    async fn delete_friend_groups(&self, caller: &Caller, names: &[String]) -> ImResult<()> {
        self.post_unit(
            caller,
            "friend/delete_friend_groups",
            json!({ "names": names }),
        )
        .await
    }

    async fn rename_friend_group(
        &self,
        caller: &Caller,
        old_name: &str,
        new_name: &str,
    ) -> ImResult<()> {
        self.post_unit(
            caller,
            "friend/rename_friend_group",
            json!({ "oldName": old_name, "newName": new_name }),
        )
        .await
    }

    async fn add_friends_to_friend_group(
        &self,
        caller: &Caller,
        name: &str,
        user_ids: &[String],
    ) -> ImResult<Vec<FriendOperationResult>> {
        self.post_list(
            caller,
            "friend/add_friends_to_group",
            json!({ "name": name, "userIDs": user_ids }),
        )
        .await
    }

    async fn delete_friends_from_friend_group(
        &self,
        caller: &Caller,
        name: &str,
        user_ids: &[String],
    ) -> ImResult<Vec<FriendOperationResult>> {
        self.post_list(
            caller,
            "friend/delete_friends_from_group",
            json!({ "name": name, "userIDs": user_ids }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::im::remote::push::GroupEvent;
    use crate::im::serialization::compress_gzip;

    #[test]
    fn ws_url_carries_identity_and_compression() {
        let remote = HttpRemote::new(HttpRemoteConfig::new(
            "http://127.0.0.1:10002/",
            "ws://127.0.0.1:10001",
        ))
        .unwrap();
        let url = remote.build_ws_url("alice", "tk", "op1");
        assert!(url.starts_with("ws://127.0.0.1:10001/?token=tk&sendID=alice"));
        assert!(url.ends_with("&compression=gzip"));
        assert_eq!(remote.config.api_base_url, "http://127.0.0.1:10002");
    }

    #[test]
    fn push_frames_decode_plain_and_gzip() {
        let push = ServerPush::Group(GroupEvent::OwnerChanged {
            group_id: "g1".into(),
            new_owner: "bob".into(),
        });
        let json = serde_json::to_vec(&push).unwrap();
        assert_eq!(decode_push_frame(&json).unwrap(), push);

        let gz = compress_gzip(&json).unwrap();
        assert!(is_gzip(&gz));
        assert_eq!(decode_push_frame(&gz).unwrap(), push);

        assert!(decode_push_frame(b"not json").is_err());
    }

    #[test]
    fn history_tolerates_null_list() {
        let data: HistoryData = serde_json::from_str(r#"{"messages":null}"#).unwrap();
        assert!(data.messages.is_empty());
    }
}
