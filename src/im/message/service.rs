//! 消息管理
//!
//! 负责消息的创建、发送、漫游、撤回、修改、删除、已读回执与扩展。
//! 本地存储只记录当前登录用户可见的消息副本；会话的最后一条消息与未读数交给 `ConversationManager` 维护。

use crate::im::context::ImContext;
use crate::im::conversation::service::ConversationManager;
use crate::im::error::{err_code, ImError, ImResult};
use crate::im::message::dao::MessageDao;
use crate::im::message::models::{
    C2CReadReceipt, C2CReceiveMessageOptInfo, CompleteResult, HistoryMessageOption, Message,
    MessageExtension, MessageExtensionResult, MessageReceipt, MessageRevoked, MessageStatus,
    SendOptions,
};
use crate::im::message::types::{
    CustomElem, FaceElem, FileElem, ImageElem, LocationElem, MergerElem, MessageContent,
    SoundElem, TextElem, VideoElem,
};
use crate::im::rate_limit::RateLimiter;
use crate::im::serialization::generate_msg_id;
use crate::im::types::{c2c_conversation_id, group_conversation_id, parse_conversation_id, ReceiveMessageOpt};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 单次删除消息的上限
pub const MAX_DELETE_MESSAGES: usize = 30;
/// 单次设置扩展的上限
pub const MAX_EXTENSIONS_PER_CALL: usize = 20;
pub const MAX_EXTENSION_KEY_LEN: usize = 100;
pub const MAX_EXTENSION_VALUE_LEN: usize = 1024;

pub struct MessageManager {
    ctx: Arc<ImContext>,
    dao: MessageDao,
    conversations: Arc<ConversationManager>,
    /// 删除消息限频：每秒 1 次
    delete_limiter: RateLimiter,
}

impl MessageManager {
    pub fn new(ctx: Arc<ImContext>, conversations: Arc<ConversationManager>) -> Self {
        let dao = MessageDao::new(ctx.pool.clone());
        let delete_limiter = RateLimiter::new(
            "deleteMessages",
            1,
            1000,
            err_code::ERR_SDK_COMM_API_CALL_FREQUENCY_LIMIT,
            ctx.clock.clone(),
        );
        Self {
            ctx,
            dao,
            conversations,
            delete_limiter,
        }
    }

    pub(crate) fn reset(&self) {
        self.delete_limiter.reset();
    }

    // ---------- 创建消息 ----------

    fn create(&self, content: MessageContent) -> ImResult<Message> {
        let user = self.ctx.login_user()?;
        let now = self.ctx.now_ms();
        Ok(Message::new(generate_msg_id(&user, now), &user, content, now))
    }

    pub fn create_text_message(&self, text: &str) -> ImResult<Message> {
        self.create(MessageContent::Text(TextElem {
            text: text.to_string(),
            at_user_list: vec![],
        }))
    }

    /// 带 @ 的文本消息（仅群聊有效）
    pub fn create_text_at_message(&self, text: &str, at_user_list: Vec<String>) -> ImResult<Message> {
        self.create(MessageContent::Text(TextElem {
            text: text.to_string(),
            at_user_list,
        }))
    }

    pub fn create_custom_message(
        &self,
        data: Vec<u8>,
        description: &str,
        extension: &str,
    ) -> ImResult<Message> {
        self.create(MessageContent::Custom(CustomElem {
            data,
            description: description.to_string(),
            extension: extension.to_string(),
        }))
    }

    pub fn create_image_message(&self, image_path: &str, size: u64) -> ImResult<Message> {
        self.create(MessageContent::Image(ImageElem {
            source_path: image_path.to_string(),
            url: String::new(),
            size,
            width: 0,
            height: 0,
        }))
    }

    pub fn create_sound_message(
        &self,
        sound_path: &str,
        data_size: u64,
        duration: u32,
    ) -> ImResult<Message> {
        self.create(MessageContent::Sound(SoundElem {
            sound_path: sound_path.to_string(),
            url: String::new(),
            data_size,
            duration,
        }))
    }

    pub fn create_video_message(
        &self,
        video_path: &str,
        video_size: u64,
        duration: u32,
        snapshot_path: &str,
    ) -> ImResult<Message> {
        self.create(MessageContent::Video(VideoElem {
            video_path: video_path.to_string(),
            url: String::new(),
            video_size,
            duration,
            snapshot_path: snapshot_path.to_string(),
        }))
    }

    pub fn create_file_message(
        &self,
        file_path: &str,
        file_name: &str,
        file_size: u64,
    ) -> ImResult<Message> {
        self.create(MessageContent::File(FileElem {
            file_path: file_path.to_string(),
            file_name: file_name.to_string(),
            url: String::new(),
            file_size,
        }))
    }

    pub fn create_location_message(
        &self,
        description: &str,
        longitude: f64,
        latitude: f64,
    ) -> ImResult<Message> {
        self.create(MessageContent::Location(LocationElem {
            description: description.to_string(),
            longitude,
            latitude,
        }))
    }

    pub fn create_face_message(&self, index: i32, data: Vec<u8>) -> ImResult<Message> {
        self.create(MessageContent::Face(FaceElem { index, data }))
    }

    /// 合并转发：被合并的消息必须都已发送成功
    pub fn create_merger_message(
        &self,
        message_list: Vec<Message>,
        title: &str,
        abstract_list: Vec<String>,
        compatible_text: &str,
    ) -> ImResult<Message> {
        if message_list.is_empty() {
            return Err(ImError::invalid_param("合并消息列表不能为空"));
        }
        if let Some(m) = message_list
            .iter()
            .find(|m| m.status != MessageStatus::SendSucc)
        {
            return Err(ImError::new(
                err_code::ERR_MSG_STATUS_INVALID,
                format!("消息 {} 未发送成功，不能合并", m.client_msg_id),
            ));
        }
        self.create(MessageContent::Merger(MergerElem {
            title: title.to_string(),
            abstract_list,
            compatible_text: compatible_text.to_string(),
            message_list,
        }))
    }

    /// 转发：复制内容生成一条新消息
    pub fn create_forward_message(&self, message: &Message) -> ImResult<Message> {
        if message.status != MessageStatus::SendSucc {
            return Err(ImError::new(
                err_code::ERR_MSG_STATUS_INVALID,
                "只能转发发送成功的消息",
            ));
        }
        let mut forward = self.create(message.content.clone())?;
        forward.cloud_custom_data = message.cloud_custom_data.clone();
        forward.forwarded_from = Some(message.msg_id.clone());
        Ok(forward)
    }

    // ---------- 发送 ----------

    /// 发送消息，`receiver` 与 `group_id` 必须且只能指定一个
    ///
    /// 成功返回带服务端消息 ID 的消息；失败时本地记录为 SendFail。
    pub async fn send_message(
        &self,
        message: Message,
        receiver: &str,
        group_id: &str,
        options: SendOptions,
    ) -> ImResult<Message> {
        self.send_inner(message, receiver, group_id, options, true)
            .await
    }

    pub(crate) async fn send_inner(
        &self,
        mut message: Message,
        receiver: &str,
        group_id: &str,
        options: SendOptions,
        persist: bool,
    ) -> ImResult<Message> {
        let caller = self.ctx.caller()?;
        if receiver.is_empty() == group_id.is_empty() {
            return Err(ImError::invalid_param("接收者与群组必须且只能指定一个"));
        }
        if message.status != MessageStatus::Created {
            return Err(ImError::new(
                err_code::ERR_MSG_STATUS_INVALID,
                format!("消息状态为 {:?}，不能重复发送", message.status),
            ));
        }
        if message.sender != caller.user_id {
            return Err(ImError::invalid_param("消息不是当前登录用户创建的"));
        }
        message.content.validate_size()?;

        let persist = persist && !options.online_user_only;
        if persist
            && self
                .dao
                .get_by_client_msg_id(&caller.user_id, &message.client_msg_id)
                .await?
                .is_some()
        {
            // 同一条消息的副本再次发送，视为新消息
            message.client_msg_id = generate_msg_id(&caller.user_id, self.ctx.now_ms());
        }

        message.receiver = receiver.to_string();
        message.group_id = group_id.to_string();
        message.priority = options.priority;
        message.is_online_only = options.online_user_only;
        message.need_read_receipt = options.need_read_receipt;
        message.support_extension = options.support_extension;
        message.offline_push_info = options.offline_push_info;
        message.conversation_id = message.conversation_id_for(&caller.user_id);
        message.is_read = true;
        message.status.transition(MessageStatus::Sending)?;
        if persist {
            self.dao.upsert(&caller.user_id, &message).await?;
        }

        debug!(
            "[MsgMgr] 📤 发送消息 {} -> {}",
            message.client_msg_id, message.conversation_id
        );
        match self.ctx.remote.send_message(&caller, &message).await {
            Ok(ack) => {
                message.msg_id = ack.msg_id;
                message.seq = ack.seq;
                message.timestamp = ack.timestamp;
                message.order_key = ack.order_key;
                message.status.transition(MessageStatus::SendSucc)?;
                if persist {
                    self.dao.upsert(&caller.user_id, &message).await?;
                    self.conversations
                        .on_message(&message, false, Some(ack.recv_opt))
                        .await?;
                }
                info!(
                    "[MsgMgr] ✅ 消息发送成功: {} (seq={})",
                    message.msg_id, message.seq
                );
                Ok(message)
            }
            Err(e) => {
                message.status.transition(MessageStatus::SendFail)?;
                if persist {
                    self.dao.upsert(&caller.user_id, &message).await?;
                    self.conversations.on_message(&message, false, None).await?;
                }
                warn!("[MsgMgr] ❌ 消息发送失败 {}: {}", message.client_msg_id, e);
                Err(e)
            }
        }
    }

    // ---------- 查询 ----------

    /// 拉取历史消息，按时间倒序
    pub async fn get_history_message_list(
        &self,
        option: HistoryMessageOption,
    ) -> ImResult<Vec<Message>> {
        if option.count == 0 {
            return Err(ImError::invalid_param("count 必须大于 0"));
        }
        if parse_conversation_id(&option.conversation_id).is_none() {
            return Err(ImError::invalid_param(format!(
                "非法会话 ID: {}",
                option.conversation_id
            )));
        }
        let caller = self.ctx.caller()?;
        let before = option.last_message.as_ref().map(|m| m.cursor());
        if !option.from_cloud {
            return Ok(self
                .dao
                .history(&caller.user_id, &option.conversation_id, before, option.count)
                .await?);
        }

        let mut list = self
            .ctx
            .remote
            .get_history_messages(&caller, &option.conversation_id, before, option.count)
            .await?;
        for msg in list.iter_mut() {
            self.merge_local(&caller.user_id, msg).await?;
        }
        list.retain(|m| m.status != MessageStatus::HasDeleted);
        debug!(
            "[MsgMgr] 漫游消息 {} 条 ({})",
            list.len(),
            option.conversation_id
        );
        Ok(list)
    }

    /// 服务端副本写入本地，保留本地字段
    async fn merge_local(&self, owner: &str, msg: &mut Message) -> ImResult<()> {
        if let Some(local) = self.dao.get_by_client_msg_id(owner, &msg.client_msg_id).await? {
            msg.local_custom_data = local.local_custom_data;
            if local.is_read {
                msg.is_read = true;
            }
            // 本地已删除的不被服务端副本复活
            if local.status == MessageStatus::HasDeleted {
                msg.status = MessageStatus::HasDeleted;
            }
        }
        self.dao.upsert(owner, msg).await?;
        Ok(())
    }

    /// 按消息 ID 查找，本地没有的再到服务端查
    pub async fn find_messages(&self, msg_ids: &[String]) -> ImResult<Vec<Message>> {
        if msg_ids.is_empty() {
            return Ok(vec![]);
        }
        let caller = self.ctx.caller()?;
        let mut found = self.dao.find_by_ids(&caller.user_id, msg_ids).await?;
        let missing: Vec<String> = msg_ids
            .iter()
            .filter(|id| {
                !found
                    .iter()
                    .any(|m| &m.msg_id == *id || &m.client_msg_id == *id)
            })
            .cloned()
            .collect();
        if !missing.is_empty() {
            let mut remote = self.ctx.remote.find_messages(&caller, &missing).await?;
            for msg in remote.iter_mut() {
                self.merge_local(&caller.user_id, msg).await?;
            }
            remote.retain(|m| m.status != MessageStatus::HasDeleted);
            found.extend(remote);
        }
        Ok(found)
    }

    /// 本地关键字搜索，`conversation_id` 为空搜索全部会话
    pub async fn search_local_messages(
        &self,
        conversation_id: Option<&str>,
        keyword: &str,
        count: usize,
    ) -> ImResult<Vec<Message>> {
        if keyword.trim().is_empty() {
            return Err(ImError::invalid_param("搜索关键字不能为空"));
        }
        let owner = self.ctx.login_user()?;
        Ok(self
            .dao
            .search(&owner, conversation_id, keyword, count.max(1))
            .await?)
    }

    // ---------- 本地插入 ----------

    /// 向本地单聊会话插入一条消息（不发送）
    pub async fn insert_c2c_message_to_local_storage(
        &self,
        message: Message,
        user_id: &str,
        sender: &str,
    ) -> ImResult<Message> {
        if user_id.is_empty() || sender.is_empty() {
            return Err(ImError::invalid_param("userID 与 sender 不能为空"));
        }
        let owner = self.ctx.login_user()?;
        let mut message = message;
        message.sender = sender.to_string();
        message.receiver = if sender == owner {
            user_id.to_string()
        } else {
            owner.clone()
        };
        message.group_id.clear();
        self.insert_local(&owner, message).await
    }

    pub async fn insert_group_message_to_local_storage(
        &self,
        message: Message,
        group_id: &str,
        sender: &str,
    ) -> ImResult<Message> {
        if group_id.is_empty() || sender.is_empty() {
            return Err(ImError::invalid_param("groupID 与 sender 不能为空"));
        }
        let owner = self.ctx.login_user()?;
        let mut message = message;
        message.sender = sender.to_string();
        message.receiver.clear();
        message.group_id = group_id.to_string();
        self.insert_local(&owner, message).await
    }

    async fn insert_local(&self, owner: &str, mut message: Message) -> ImResult<Message> {
        if message.status != MessageStatus::Created {
            return Err(ImError::new(
                err_code::ERR_MSG_STATUS_INVALID,
                "只能插入未发送的消息",
            ));
        }
        message.content.validate_size()?;
        message.conversation_id = message.conversation_id_for(owner);
        message.timestamp = self.ctx.now_ms();
        message.is_read = true;
        message.status.transition(MessageStatus::Sending)?;
        message.status.transition(MessageStatus::SendSucc)?;
        self.dao.upsert(owner, &message).await?;
        self.conversations.on_message(&message, false, None).await?;
        debug!("[MsgMgr] 本地插入消息 {}", message.client_msg_id);
        Ok(message)
    }

    // ---------- 撤回 / 修改 / 删除 ----------

    pub async fn revoke_message(&self, message: &Message) -> ImResult<()> {
        let caller = self.ctx.caller()?;
        if message.status != MessageStatus::SendSucc || message.msg_id.is_empty() {
            return Err(ImError::new(
                err_code::ERR_MSG_STATUS_INVALID,
                format!("消息状态 {:?} 不能撤回", message.status),
            ));
        }
        let window_ms = self.ctx.config.revoke_window.as_millis() as i64;
        if message.sender == caller.user_id && self.ctx.now_ms() - message.timestamp > window_ms {
            return Err(ImError::new(
                err_code::ERR_MSG_REVOKE_TIME_LIMIT,
                format!("消息发送已超过 {} 秒，无法撤回", window_ms / 1000),
            ));
        }
        let revoked = self
            .ctx
            .remote
            .revoke_message(&caller, &message.msg_id)
            .await?;
        self.apply_revoked(&caller.user_id, &revoked).await?;
        info!("[MsgMgr] ↩️ 撤回消息 {}", message.msg_id);
        Ok(())
    }

    async fn apply_revoked(&self, owner: &str, revoked: &MessageRevoked) -> ImResult<()> {
        if let Some(mut local) = self.dao.get_by_msg_id(owner, &revoked.msg_id).await? {
            if local.status.can_transition_to(MessageStatus::Revoked) {
                local.status = MessageStatus::Revoked;
                self.dao.upsert(owner, &local).await?;
            }
        }
        Ok(())
    }

    /// 修改消息内容或云端自定义数据
    ///
    /// 无论成功还是版本冲突，返回值都带回服务端当前版本的消息。
    pub async fn modify_message(&self, message: &Message) -> ImResult<CompleteResult> {
        let caller = self.ctx.caller()?;
        if message.status != MessageStatus::SendSucc {
            return Err(ImError::new(
                err_code::ERR_MSG_STATUS_INVALID,
                format!("消息状态 {:?} 不能修改", message.status),
            ));
        }
        message.content.validate_size()?;
        let ack = self.ctx.remote.modify_message(&caller, message).await?;
        let mut current = ack.message;
        self.merge_local(&caller.user_id, &mut current).await?;
        let error = if ack.err_code == err_code::SUCC {
            None
        } else {
            warn!("[MsgMgr] 修改消息冲突 {}: {}", message.msg_id, ack.err_msg);
            Some(ImError::new(ack.err_code, ack.err_msg))
        };
        Ok(CompleteResult {
            error,
            value: current,
        })
    }

    /// 删除消息：云端删除，本地标记为 `HasDeleted` 后不再出现在查询结果中；
    /// 不同步到同账号的其他终端
    pub async fn delete_messages(&self, messages: &[Message]) -> ImResult<()> {
        if messages.is_empty() || messages.len() > MAX_DELETE_MESSAGES {
            return Err(ImError::invalid_param(format!(
                "单次删除消息数必须在 1..={MAX_DELETE_MESSAGES} 之间"
            )));
        }
        let conversation_id = messages[0].conversation_id.clone();
        if messages.iter().any(|m| m.conversation_id != conversation_id) {
            return Err(ImError::invalid_param("只能删除同一会话的消息"));
        }
        let caller = self.ctx.caller()?;
        self.delete_limiter.acquire()?;

        let remote_ids: Vec<String> = messages
            .iter()
            .filter(|m| {
                !m.msg_id.is_empty()
                    && matches!(m.status, MessageStatus::SendSucc | MessageStatus::Revoked)
            })
            .map(|m| m.msg_id.clone())
            .collect();
        if !remote_ids.is_empty() {
            self.ctx
                .remote
                .delete_messages(&caller, &conversation_id, &remote_ids)
                .await?;
        }
        let client_ids: Vec<String> = messages.iter().map(|m| m.client_msg_id.clone()).collect();
        let removed = self.dao.mark_deleted(&caller.user_id, &client_ids).await?;

        let latest = self
            .dao
            .history(&caller.user_id, &conversation_id, None, 1)
            .await?;
        self.conversations
            .refresh_last_message(&conversation_id, latest.first(), false)
            .await?;
        info!("[MsgMgr] 🗑️ 删除消息 {} 条 ({})", removed, conversation_id);
        Ok(())
    }

    pub async fn clear_c2c_history_message(&self, user_id: &str) -> ImResult<()> {
        self.clear_history(&c2c_conversation_id(user_id)).await
    }

    pub async fn clear_group_history_message(&self, group_id: &str) -> ImResult<()> {
        self.clear_history(&group_conversation_id(group_id)).await
    }

    async fn clear_history(&self, conversation_id: &str) -> ImResult<()> {
        let caller = self.ctx.caller()?;
        self.ctx
            .remote
            .clear_history(&caller, conversation_id)
            .await?;
        let removed = self
            .dao
            .delete_conversation(&caller.user_id, conversation_id)
            .await?;
        self.conversations
            .refresh_last_message(conversation_id, None, true)
            .await?;
        info!("[MsgMgr] 🧹 清空会话 {} 的 {} 条消息", conversation_id, removed);
        Ok(())
    }

    // ---------- 已读 ----------

    /// 对需要回执的消息发送已读回执
    pub async fn send_message_read_receipts(&self, messages: &[Message]) -> ImResult<()> {
        if messages.is_empty() {
            return Err(ImError::invalid_param("消息列表不能为空"));
        }
        if let Some(m) = messages.iter().find(|m| !m.need_read_receipt) {
            return Err(ImError::invalid_param(format!(
                "消息 {} 发送时未要求已读回执",
                m.msg_id
            )));
        }
        let caller = self.ctx.caller()?;
        let ids: Vec<String> = messages.iter().map(|m| m.msg_id.clone()).collect();
        self.ctx.remote.send_read_receipts(&caller, &ids).await?;
        for msg in messages {
            if let Some(mut local) = self.dao.get_by_msg_id(&caller.user_id, &msg.msg_id).await? {
                if !local.is_read {
                    local.is_read = true;
                    self.dao.upsert(&caller.user_id, &local).await?;
                }
            }
        }
        Ok(())
    }

    /// 查询自己发出的消息的已读回执
    pub async fn get_message_read_receipts(
        &self,
        messages: &[Message],
    ) -> ImResult<Vec<MessageReceipt>> {
        if messages.is_empty() {
            return Ok(vec![]);
        }
        let caller = self.ctx.caller()?;
        let ids: Vec<String> = messages.iter().map(|m| m.msg_id.clone()).collect();
        self.ctx.remote.get_read_receipts(&caller, &ids).await
    }

    pub async fn mark_c2c_message_as_read(&self, user_id: &str) -> ImResult<()> {
        self.conversations
            .clean_conversation_unread_message_count(&c2c_conversation_id(user_id))
            .await
    }

    pub async fn mark_group_message_as_read(&self, group_id: &str) -> ImResult<()> {
        self.conversations
            .clean_conversation_unread_message_count(&group_conversation_id(group_id))
            .await
    }

    /// 所有有未读的会话标记为已读
    pub async fn mark_all_message_as_read(&self) -> ImResult<()> {
        let ids = self.conversations.conversations_with_unread()?;
        for id in &ids {
            self.conversations
                .clean_conversation_unread_message_count(id)
                .await?;
        }
        debug!("[MsgMgr] 全部已读，共 {} 个会话", ids.len());
        Ok(())
    }

    // ---------- 扩展 ----------

    fn check_extension_target(message: &Message) -> ImResult<()> {
        if !message.support_extension {
            return Err(ImError::new(
                err_code::ERR_MSG_EXTENSION_NOT_SUPPORTED,
                "消息发送时未开启扩展",
            ));
        }
        if message.status != MessageStatus::SendSucc || message.msg_id.is_empty() {
            return Err(ImError::new(
                err_code::ERR_MSG_STATUS_INVALID,
                format!("消息状态 {:?} 不支持扩展", message.status),
            ));
        }
        Ok(())
    }

    /// 设置消息扩展，`version` 为调用方已知的版本
    ///
    /// 冲突的 key 在结果中返回 23001 与当前值，调用方可据此决定是否重试。
    pub async fn set_message_extensions(
        &self,
        message: &Message,
        extensions: &[MessageExtension],
    ) -> ImResult<Vec<MessageExtensionResult>> {
        if extensions.is_empty() || extensions.len() > MAX_EXTENSIONS_PER_CALL {
            return Err(ImError::invalid_param(format!(
                "单次设置扩展数必须在 1..={MAX_EXTENSIONS_PER_CALL} 之间"
            )));
        }
        for ext in extensions {
            if ext.key.is_empty()
                || ext.key.len() > MAX_EXTENSION_KEY_LEN
                || ext.value.len() > MAX_EXTENSION_VALUE_LEN
            {
                return Err(ImError::new(
                    err_code::ERR_MSG_EXTENSION_SIZE_LIMIT,
                    format!("扩展 `{}` 的 key 或 value 长度超限", ext.key),
                ));
            }
        }
        Self::check_extension_target(message)?;
        let caller = self.ctx.caller()?;
        let results = self
            .ctx
            .remote
            .set_message_extensions(&caller, &message.msg_id, extensions)
            .await?;
        let current: Vec<MessageExtension> = results.iter().map(|r| r.extension.clone()).collect();
        self.update_local_extensions(&caller.user_id, &message.msg_id, &current, &[])
            .await?;
        Ok(results)
    }

    pub async fn get_message_extensions(&self, message: &Message) -> ImResult<Vec<MessageExtension>> {
        Self::check_extension_target(message)?;
        let caller = self.ctx.caller()?;
        let extensions = self
            .ctx
            .remote
            .get_message_extensions(&caller, &message.msg_id)
            .await?;
        if let Some(mut local) = self.dao.get_by_msg_id(&caller.user_id, &message.msg_id).await? {
            local.extensions = extensions
                .iter()
                .map(|e| (e.key.clone(), e.clone()))
                .collect();
            self.dao.upsert(&caller.user_id, &local).await?;
        }
        Ok(extensions)
    }

    /// 删除扩展，`keys` 为空删除全部
    pub async fn delete_message_extensions(
        &self,
        message: &Message,
        keys: &[String],
    ) -> ImResult<Vec<MessageExtensionResult>> {
        if keys.len() > MAX_EXTENSIONS_PER_CALL {
            return Err(ImError::invalid_param(format!(
                "单次删除扩展数不能超过 {MAX_EXTENSIONS_PER_CALL}"
            )));
        }
        Self::check_extension_target(message)?;
        let caller = self.ctx.caller()?;
        let results = self
            .ctx
            .remote
            .delete_message_extensions(&caller, &message.msg_id, keys)
            .await?;
        let deleted: Vec<String> = results
            .iter()
            .filter(|r| r.result_code == err_code::SUCC)
            .map(|r| r.extension.key.clone())
            .collect();
        self.update_local_extensions(&caller.user_id, &message.msg_id, &[], &deleted)
            .await?;
        Ok(results)
    }

    async fn update_local_extensions(
        &self,
        owner: &str,
        msg_id: &str,
        upserts: &[MessageExtension],
        deletes: &[String],
    ) -> ImResult<()> {
        let Some(mut local) = self.dao.get_by_msg_id(owner, msg_id).await? else {
            return Ok(());
        };
        for ext in upserts {
            let stale = local
                .extensions
                .get(&ext.key)
                .is_some_and(|known| known.version > ext.version);
            if !stale {
                local.extensions.insert(ext.key.clone(), ext.clone());
            }
        }
        for key in deletes {
            local.extensions.remove(key);
        }
        self.dao.upsert(owner, &local).await?;
        Ok(())
    }

    // ---------- 接收选项 ----------

    pub async fn set_c2c_receive_message_opt(
        &self,
        user_ids: &[String],
        opt: ReceiveMessageOpt,
    ) -> ImResult<()> {
        if user_ids.is_empty() {
            return Err(ImError::invalid_param("用户列表不能为空"));
        }
        let ids: Vec<String> = user_ids.iter().map(|u| c2c_conversation_id(u)).collect();
        self.set_receive_opt(&ids, opt).await
    }

    pub async fn get_c2c_receive_message_opt(
        &self,
        user_ids: &[String],
    ) -> ImResult<Vec<C2CReceiveMessageOptInfo>> {
        let caller = self.ctx.caller()?;
        let ids: Vec<String> = user_ids.iter().map(|u| c2c_conversation_id(u)).collect();
        let entries = self
            .ctx
            .remote
            .get_receive_message_opt(&caller, &ids)
            .await?;
        Ok(entries
            .into_iter()
            .filter_map(|e| {
                parse_conversation_id(&e.conversation_id).map(|(_, user_id)| {
                    C2CReceiveMessageOptInfo {
                        user_id: user_id.to_string(),
                        opt: e.opt,
                    }
                })
            })
            .collect())
    }

    pub async fn set_group_receive_message_opt(
        &self,
        group_id: &str,
        opt: ReceiveMessageOpt,
    ) -> ImResult<()> {
        if group_id.is_empty() {
            return Err(ImError::invalid_param("groupID 不能为空"));
        }
        self.set_receive_opt(&[group_conversation_id(group_id)], opt)
            .await
    }

    async fn set_receive_opt(&self, conversation_ids: &[String], opt: ReceiveMessageOpt) -> ImResult<()> {
        let caller = self.ctx.caller()?;
        self.ctx
            .remote
            .set_receive_message_opt(&caller, conversation_ids, opt)
            .await?;
        for id in conversation_ids {
            self.conversations.set_recv_opt(id, opt).await?;
        }
        Ok(())
    }

    // ---------- 推送处理 ----------

    pub(crate) async fn on_new_message(
        &self,
        message: Message,
        recv_opt: ReceiveMessageOpt,
    ) -> ImResult<()> {
        let owner = self.ctx.login_user()?;
        if !message.is_online_only {
            let known = self
                .dao
                .get_by_client_msg_id(&owner, &message.client_msg_id)
                .await?
                .is_some_and(|m| m.msg_id == message.msg_id);
            if known {
                debug!("[MsgMgr] 重复推送，忽略 {}", message.msg_id);
                return Ok(());
            }
            let count_unread = message.sender != owner && !message.is_read;
            self.dao.upsert(&owner, &message).await?;
            self.conversations
                .on_message(&message, count_unread, Some(recv_opt))
                .await?;
        }
        for l in self.ctx.bus.advanced_msg.snapshot() {
            l.on_recv_new_message(message.clone()).await;
        }
        Ok(())
    }

    pub(crate) async fn on_revoked(&self, revoked: MessageRevoked) -> ImResult<()> {
        let owner = self.ctx.login_user()?;
        self.apply_revoked(&owner, &revoked).await?;
        for l in self.ctx.bus.advanced_msg.snapshot() {
            l.on_recv_message_revoked(revoked.clone()).await;
        }
        Ok(())
    }

    pub(crate) async fn on_modified(&self, mut message: Message) -> ImResult<()> {
        let owner = self.ctx.login_user()?;
        self.merge_local(&owner, &mut message).await?;
        for l in self.ctx.bus.advanced_msg.snapshot() {
            l.on_recv_message_modified(message.clone()).await;
        }
        Ok(())
    }

    pub(crate) async fn on_extensions_changed(
        &self,
        msg_id: String,
        extensions: Vec<MessageExtension>,
    ) -> ImResult<()> {
        let owner = self.ctx.login_user()?;
        self.update_local_extensions(&owner, &msg_id, &extensions, &[])
            .await?;
        for l in self.ctx.bus.advanced_msg.snapshot() {
            l.on_recv_message_extensions_changed(msg_id.clone(), extensions.clone())
                .await;
        }
        Ok(())
    }

    pub(crate) async fn on_extensions_deleted(
        &self,
        msg_id: String,
        extensions: Vec<MessageExtension>,
    ) -> ImResult<()> {
        let owner = self.ctx.login_user()?;
        let keys: Vec<String> = extensions.into_iter().map(|e| e.key).collect();
        self.update_local_extensions(&owner, &msg_id, &[], &keys)
            .await?;
        for l in self.ctx.bus.advanced_msg.snapshot() {
            l.on_recv_message_extensions_deleted(msg_id.clone(), keys.clone())
                .await;
        }
        Ok(())
    }

    pub(crate) async fn on_c2c_read_receipt(&self, receipt: C2CReadReceipt) -> ImResult<()> {
        for l in self.ctx.bus.advanced_msg.snapshot() {
            l.on_recv_c2c_read_receipt(receipt.clone()).await;
        }
        Ok(())
    }

    pub(crate) async fn on_read_receipts(&self, receipts: Vec<MessageReceipt>) -> ImResult<()> {
        for l in self.ctx.bus.advanced_msg.snapshot() {
            l.on_recv_message_read_receipts(receipts.clone()).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::im::error::ErrorKind;
    use crate::im::group::models::{CreateGroupMember, CreateGroupParam, GroupMemberRole, GroupType};
    use crate::im::message::listener::AdvancedMsgListener;
    use crate::im::testing::{eventually, recv_event, ClientExt, TestEnv};
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    #[derive(Debug, PartialEq)]
    enum Seen {
        New(String),
        Revoked(String),
        Modified(u64),
        ExtChanged(String),
        C2CRead(String),
    }

    struct Recorder {
        tx: mpsc::UnboundedSender<Seen>,
    }

    #[async_trait]
    impl AdvancedMsgListener for Recorder {
        async fn on_recv_new_message(&self, message: Message) {
            let _ = self.tx.send(Seen::New(message.msg_id));
        }
        async fn on_recv_message_revoked(&self, revoked: MessageRevoked) {
            let _ = self.tx.send(Seen::Revoked(revoked.msg_id));
        }
        async fn on_recv_message_modified(&self, message: Message) {
            let _ = self.tx.send(Seen::Modified(message.version));
        }
        async fn on_recv_message_extensions_changed(
            &self,
            _msg_id: String,
            extensions: Vec<MessageExtension>,
        ) {
            for e in extensions {
                let _ = self.tx.send(Seen::ExtChanged(e.value));
            }
        }
        async fn on_recv_c2c_read_receipt(&self, receipt: C2CReadReceipt) {
            let _ = self.tx.send(Seen::C2CRead(receipt.user_id));
        }
    }

    fn recorder(client: &crate::im::client::ImClient) -> mpsc::UnboundedReceiver<Seen> {
        let (tx, rx) = mpsc::unbounded_channel();
        client.add_advanced_msg_listener(Arc::new(Recorder { tx }));
        rx
    }

    #[tokio::test]
    async fn group_send_assigns_fresh_ids_without_dedup() {
        let env = TestEnv::new();
        let alice = env.login("alice").await;
        let bob = env.login("bob").await;
        let mut bob_rx = recorder(&bob);

        let mut param = CreateGroupParam::new(GroupType::Work, "team");
        param.group_id = Some("g1".into());
        param.member_list.push(CreateGroupMember {
            user_id: "bob".into(),
            role: GroupMemberRole::Member,
        });
        alice.group().create_group(param).await.unwrap();

        let msg = alice.message().create_text_message("hi").unwrap();
        assert_eq!(msg.status, MessageStatus::Created);
        let first = alice
            .message()
            .send_message(msg.clone(), "", "g1", SendOptions::default())
            .await
            .unwrap();
        assert_eq!(first.status, MessageStatus::SendSucc);
        assert!(!first.msg_id.is_empty());
        assert_eq!(first.conversation_id, "group_g1");

        let second = alice
            .message()
            .send_message(msg, "", "g1", SendOptions::default())
            .await
            .unwrap();
        assert_ne!(first.msg_id, second.msg_id);
        assert_ne!(first.client_msg_id, second.client_msg_id);

        assert_eq!(recv_event(&mut bob_rx).await, Seen::New(first.msg_id.clone()));
        assert_eq!(recv_event(&mut bob_rx).await, Seen::New(second.msg_id.clone()));

        // 已发送的消息不能再次发送
        let err = alice
            .message()
            .send_message(first, "", "g1", SendOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, err_code::ERR_MSG_STATUS_INVALID);
    }

    #[tokio::test]
    async fn oversize_and_bad_targets_fail_before_sending() {
        let env = TestEnv::new();
        let alice = env.login("alice").await;
        let big = alice
            .message()
            .create_text_message(&"x".repeat(12 * 1024 + 1))
            .unwrap();
        let err = alice
            .message()
            .send_message(big.clone(), "bob", "", SendOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Oversize);
        assert!(alice
            .message()
            .find_messages(&[big.client_msg_id.clone()])
            .await
            .unwrap()
            .is_empty());

        let video = alice
            .message()
            .create_video_message("/tmp/v.mp4", 100 * 1024 * 1024 + 1, 10, "")
            .unwrap();
        let err = alice
            .message()
            .send_message(video, "bob", "", SendOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Oversize);

        let ok = alice.message().create_text_message("hi").unwrap();
        let err = alice
            .message()
            .send_message(ok, "bob", "g1", SendOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParam);
    }

    #[tokio::test]
    async fn revoke_only_inside_window() {
        let env = TestEnv::new();
        let alice = env.login("alice").await;
        let bob = env.login("bob").await;
        let mut bob_rx = recorder(&bob);

        let old = alice.send_text("bob", "old").await;
        assert_eq!(recv_event(&mut bob_rx).await, Seen::New(old.msg_id.clone()));
        env.clock.advance_ms(120_001);
        let err = alice.message().revoke_message(&old).await.unwrap_err();
        assert_eq!(err.code, err_code::ERR_MSG_REVOKE_TIME_LIMIT);

        let fresh = alice.send_text("bob", "fresh").await;
        assert_eq!(recv_event(&mut bob_rx).await, Seen::New(fresh.msg_id.clone()));
        env.clock.advance_ms(120_000);
        alice.message().revoke_message(&fresh).await.unwrap();
        assert_eq!(
            recv_event(&mut bob_rx).await,
            Seen::Revoked(fresh.msg_id.clone())
        );

        let local = alice
            .message()
            .find_messages(&[fresh.msg_id.clone()])
            .await
            .unwrap();
        assert_eq!(local[0].status, MessageStatus::Revoked);
        let hits = alice
            .message()
            .search_local_messages(None, "fresh", 10)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn modify_returns_current_version_on_conflict() {
        let env = TestEnv::new();
        let alice = env.login("alice").await;
        let bob = env.login("bob").await;
        let mut bob_rx = recorder(&bob);
        let sent = alice.send_text("bob", "draft").await;
        assert_eq!(recv_event(&mut bob_rx).await, Seen::New(sent.msg_id.clone()));

        let mut edit = sent.clone();
        edit.content = MessageContent::Text(TextElem {
            text: "final".into(),
            at_user_list: vec![],
        });
        let ok = alice.message().modify_message(&edit).await.unwrap();
        assert!(ok.error.is_none());
        assert_eq!(ok.value.version, 1);
        assert_eq!(recv_event(&mut bob_rx).await, Seen::Modified(1));

        // 基于旧版本再次修改
        let stale = alice.message().modify_message(&edit).await.unwrap();
        let err = stale.error.unwrap();
        assert_eq!(err.kind, ErrorKind::Conflict);
        assert_eq!(stale.value.version, 1);
        assert_eq!(stale.value.content.searchable_text(), "final");
    }

    #[tokio::test]
    async fn extensions_first_writer_wins() {
        let env = TestEnv::new();
        let alice = env.login("alice").await;
        let bob = env.login("bob").await;
        let mut bob_rx = recorder(&bob);

        let plain = alice.send_text("bob", "no ext").await;
        let err = alice
            .message()
            .set_message_extensions(
                &plain,
                &[MessageExtension {
                    key: "k".into(),
                    value: "v".into(),
                    version: 0,
                }],
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, err_code::ERR_MSG_EXTENSION_NOT_SUPPORTED);

        let msg = alice.message().create_text_message("vote").unwrap();
        let sent = alice
            .message()
            .send_message(
                msg,
                "bob",
                "",
                SendOptions {
                    support_extension: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(recv_event(&mut bob_rx).await, Seen::New(plain.msg_id.clone()));
        assert_eq!(recv_event(&mut bob_rx).await, Seen::New(sent.msg_id.clone()));

        let too_big = alice
            .message()
            .set_message_extensions(
                &sent,
                &[MessageExtension {
                    key: "seat".into(),
                    value: "v".repeat(1025),
                    version: 0,
                }],
            )
            .await
            .unwrap_err();
        assert_eq!(too_big.code, err_code::ERR_MSG_EXTENSION_SIZE_LIMIT);

        let claim = |who: &str| {
            vec![MessageExtension {
                key: "seat".into(),
                value: who.into(),
                version: 0,
            }]
        };
        let (claim_alice, claim_bob) = (claim("alice"), claim("bob"));
        let (a, b) = tokio::join!(
            alice.message().set_message_extensions(&sent, &claim_alice),
            bob.message().set_message_extensions(&sent, &claim_bob),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        let codes = [a[0].result_code, b[0].result_code];
        assert_eq!(codes.iter().filter(|c| **c == 0).count(), 1);
        let (winner, loser) = if a[0].result_code == 0 { (&a, &b) } else { (&b, &a) };
        assert_eq!(loser[0].result_code, err_code::ERR_MSG_EXTENSION_CONFLICT);
        assert_eq!(loser[0].extension.value, winner[0].extension.value);

        let current = alice.message().get_message_extensions(&sent).await.unwrap();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].version, 1);
    }

    #[tokio::test]
    async fn delete_is_rate_limited_and_not_synced() {
        let env = TestEnv::new();
        let alice = env.login("alice").await;
        let alice_pad = env.login("alice").await;
        let _bob = env.login("bob").await;

        let one = alice.send_text("bob", "one").await;
        let two = alice.send_text("bob", "two").await;
        eventually_local(&alice_pad, &one.msg_id).await;

        let err = alice.message().delete_messages(&[]).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParam);
        let mut other = two.clone();
        other.conversation_id = "c2c_carol".into();
        let err = alice
            .message()
            .delete_messages(&[one.clone(), other])
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParam);

        alice.message().delete_messages(&[one.clone()]).await.unwrap();
        let err = alice
            .message()
            .delete_messages(&[two.clone()])
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::RateLimit);
        env.clock.advance_ms(1000);
        alice.message().delete_messages(&[two.clone()]).await.unwrap();

        let local = alice
            .message()
            .get_history_message_list(HistoryMessageOption {
                conversation_id: "c2c_bob".into(),
                count: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(local.is_empty());
        assert!(alice
            .message()
            .search_local_messages(None, "one", 10)
            .await
            .unwrap()
            .is_empty());
        // 本地行保留，只是标记为已删除
        let row = alice
            .message()
            .dao
            .get_by_client_msg_id("alice", &one.client_msg_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.status, MessageStatus::HasDeleted);

        // 另一终端的本地副本不受影响
        let pad = alice_pad
            .message()
            .find_messages(&[one.msg_id.clone()])
            .await
            .unwrap();
        assert_eq!(pad.len(), 1);
    }

    async fn eventually_local(client: &crate::im::client::ImClient, msg_id: &str) {
        for _ in 0..200 {
            let found = client
                .message()
                .get_history_message_list(HistoryMessageOption {
                    conversation_id: "c2c_bob".into(),
                    count: 50,
                    ..Default::default()
                })
                .await
                .unwrap();
            if found.iter().any(|m| m.msg_id == msg_id) {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("消息 {msg_id} 未同步到本地");
    }

    #[tokio::test]
    async fn history_local_cloud_and_local_inserts() {
        let env = TestEnv::new();
        let alice = env.login("alice").await;
        let bob = env.login("bob").await;
        for text in ["a", "b", "c"] {
            alice.send_text("bob", text).await;
        }
        eventually(|| {
            bob.conversation()
                .get_conversation("c2c_alice")
                .map(|c| c.unread_count == 3)
                .unwrap_or(false)
        })
        .await;

        let page = bob
            .message()
            .get_history_message_list(HistoryMessageOption {
                conversation_id: "c2c_alice".into(),
                count: 2,
                last_message: None,
                from_cloud: true,
            })
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].content.searchable_text(), "c");
        let rest = bob
            .message()
            .get_history_message_list(HistoryMessageOption {
                conversation_id: "c2c_alice".into(),
                count: 2,
                last_message: page.last().cloned(),
                from_cloud: true,
            })
            .await
            .unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].content.searchable_text(), "a");

        let tip = bob.message().create_text_message("local tip").unwrap();
        let inserted = bob
            .message()
            .insert_c2c_message_to_local_storage(tip, "alice", "bob")
            .await
            .unwrap();
        assert_eq!(inserted.conversation_id, "c2c_alice");
        assert!(inserted.msg_id.is_empty());
        let conv = bob.conversation().get_conversation("c2c_alice").unwrap();
        assert_eq!(conv.last_message_id, Some(inserted.client_msg_id.clone()));
        let hits = bob
            .message()
            .search_local_messages(Some("c2c_alice"), "tip", 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        bob.message().clear_c2c_history_message("alice").await.unwrap();
        let conv = bob.conversation().get_conversation("c2c_alice").unwrap();
        assert_eq!(conv.last_message_id, None);
        assert_eq!(conv.unread_count, 0);
    }

    #[tokio::test]
    async fn read_receipts_reach_the_sender() {
        let env = TestEnv::new();
        let alice = env.login("alice").await;
        let bob = env.login("bob").await;
        let mut alice_rx = recorder(&alice);
        let mut bob_rx = recorder(&bob);

        let sent = alice.send_text("bob", "read me").await;
        assert_eq!(recv_event(&mut bob_rx).await, Seen::New(sent.msg_id.clone()));
        bob.message().mark_c2c_message_as_read("alice").await.unwrap();
        assert_eq!(
            recv_event(&mut alice_rx).await,
            Seen::C2CRead("bob".to_string())
        );
        assert_eq!(bob.conversation().get_total_unread_message_count().unwrap(), 0);

        let receipts = alice
            .message()
            .get_message_read_receipts(&[sent])
            .await
            .unwrap();
        assert!(receipts[0].is_peer_read);
    }

    #[tokio::test]
    async fn online_only_messages_are_not_stored() {
        let env = TestEnv::new();
        let alice = env.login("alice").await;
        let bob = env.login("bob").await;
        let mut bob_rx = recorder(&bob);
        let msg = alice.message().create_custom_message(b"typing".to_vec(), "", "").unwrap();
        let sent = alice
            .message()
            .send_message(
                msg,
                "bob",
                "",
                SendOptions {
                    online_user_only: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(recv_event(&mut bob_rx).await, Seen::New(sent.msg_id.clone()));
        eventually(|| bob.conversation().get_conversation("c2c_alice").is_err()).await;
        assert_eq!(bob.conversation().get_total_unread_message_count().unwrap(), 0);
    }
}
