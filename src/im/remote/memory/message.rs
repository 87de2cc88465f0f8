//! 内存服务端：消息中继与漫游存储

use super::ServerState;
use crate::im::error::{err_code, ImError, ImResult};
use crate::im::group::permission::can_revoke_others_message;
use crate::im::message::models::{
    C2CReadReceipt, Message, MessageExtension, MessageExtensionResult, MessageReceipt,
    MessageRevoked, MessageStatus,
};
use crate::im::remote::push::ServerPush;
use crate::im::remote::{Caller, ModifyMessageAck, SendMessageAck};
use crate::im::types::{parse_conversation_id, ConversationType, ReceiveMessageOpt};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

/// 单次设置扩展的 key 数上限
const MAX_EXTENSIONS_PER_CALL: usize = 20;
/// 单条消息扩展 key 总数上限
const MAX_EXTENSIONS_PER_MESSAGE: usize = 300;
const MAX_EXTENSION_KEY_LEN: usize = 100;
const MAX_EXTENSION_VALUE_LEN: usize = 1024;
/// 单次删除消息的上限
const MAX_DELETE_PER_CALL: usize = 30;

/// 扩展项；`value` 为空表示已删除（保留版本号用于冲突检测）
struct ExtensionEntry {
    value: Option<String>,
    version: u64,
}

pub(super) struct StoredMessage {
    message: Message,
    /// 所属会话线程
    thread: String,
    /// 发送时可见的用户（单聊双方或当时的群成员）
    recipients: BTreeSet<String>,
    readers: BTreeSet<String>,
    /// 对这些用户隐藏（删除 / 清空历史）
    hidden_for: HashSet<String>,
    extensions: BTreeMap<String, ExtensionEntry>,
}

impl StoredMessage {
    fn visible_to(&self, user_id: &str) -> bool {
        self.recipients.contains(user_id) && !self.hidden_for.contains(user_id)
    }

    /// 以 `viewer` 的视角生成消息副本
    fn view_for(&self, viewer: &str) -> Message {
        let mut msg = self.message.clone();
        msg.conversation_id = msg.conversation_id_for(viewer);
        msg.is_read = msg.sender == viewer || self.readers.contains(viewer);
        msg.extensions = self.live_extensions().map(|e| (e.key.clone(), e)).collect();
        msg
    }

    fn live_extensions(&self) -> impl Iterator<Item = MessageExtension> + '_ {
        self.extensions.iter().filter_map(|(key, entry)| {
            entry.value.as_ref().map(|value| MessageExtension {
                key: key.clone(),
                value: value.clone(),
                version: entry.version,
            })
        })
    }

    fn current_extension(&self, key: &str) -> MessageExtension {
        let (value, version) = match self.extensions.get(key) {
            Some(entry) => (entry.value.clone().unwrap_or_default(), entry.version),
            None => (String::new(), 0),
        };
        MessageExtension {
            key: key.to_string(),
            value,
            version,
        }
    }

    fn receipt_for(&self, viewer: &str, now: i64) -> MessageReceipt {
        let sender = &self.message.sender;
        let read_count = self.readers.iter().filter(|u| *u != sender).count() as u64;
        let audience = self.recipients.iter().filter(|u| *u != sender).count() as u64;
        MessageReceipt {
            msg_id: self.message.msg_id.clone(),
            conversation_id: self.message.conversation_id_for(viewer),
            read_count,
            unread_count: audience.saturating_sub(read_count),
            is_peer_read: !self.message.is_group()
                && self.readers.contains(&self.message.receiver),
            timestamp: now,
        }
    }
}

#[derive(Default)]
pub(super) struct MessageStore {
    by_id: HashMap<String, StoredMessage>,
    thread_seq: HashMap<String, i64>,
}

fn c2c_thread(a: &str, b: &str) -> String {
    if a <= b {
        format!("c:{a}|{b}")
    } else {
        format!("c:{b}|{a}")
    }
}

fn group_thread(group_id: &str) -> String {
    format!("g:{group_id}")
}

/// 调用者视角下会话 ID 对应的线程
fn thread_of(caller: &str, conversation_id: &str) -> ImResult<(ConversationType, String)> {
    match parse_conversation_id(conversation_id) {
        Some((ConversationType::C2C, peer)) => Ok((ConversationType::C2C, c2c_thread(caller, peer))),
        Some((ConversationType::Group, group_id)) => {
            Ok((ConversationType::Group, group_thread(group_id)))
        }
        None => Err(ImError::invalid_param(format!(
            "非法会话 ID: {conversation_id}"
        ))),
    }
}

fn msg_not_found(msg_id: &str) -> ImError {
    ImError::new(err_code::ERR_MSG_NOT_FOUND, format!("消息不存在: {msg_id}"))
}

impl ServerState {
    fn visible_message(&self, caller: &Caller, msg_id: &str) -> ImResult<&StoredMessage> {
        self.messages
            .by_id
            .get(msg_id)
            .filter(|m| m.visible_to(&caller.user_id))
            .ok_or_else(|| msg_not_found(msg_id))
    }

    /// 推送给消息的所有可见用户，调用者本连接除外
    fn fan_out<F>(&self, stored: &StoredMessage, caller: &Caller, make: F)
    where
        F: Fn(&str) -> ServerPush,
    {
        for user in &stored.recipients {
            if *user == caller.user_id {
                self.hub
                    .push_except(user, caller.connection_id, make(user.as_str()));
            } else {
                self.hub.push(user, make(user.as_str()));
            }
        }
    }

    pub(super) fn send_message(
        &mut self,
        caller: &Caller,
        message: &Message,
        now: i64,
    ) -> ImResult<SendMessageAck> {
        message.content.validate_size()?;
        if message.sender != caller.user_id {
            return Err(ImError::invalid_param("消息发送者与登录用户不一致"));
        }
        let (thread, recipients, keep) = match (message.is_group(), message.receiver.is_empty()) {
            (true, true) => {
                let group = self.groups.member_group(&message.group_id, &caller.user_id)?;
                let member = group.member(&caller.user_id)?;
                if member.mute_until > now {
                    return Err(ImError::new(
                        err_code::ERR_GROUP_MEMBER_MUTED,
                        "你已被禁言",
                    ));
                }
                if group.info.is_all_muted && !member.role.is_admin_or_owner() {
                    return Err(ImError::new(
                        err_code::ERR_GROUP_MEMBER_MUTED,
                        "群已开启全员禁言",
                    ));
                }
                let recipients: BTreeSet<String> = group.members.keys().cloned().collect();
                (
                    group_thread(&message.group_id),
                    recipients,
                    group.info.group_type.keeps_history(),
                )
            }
            (false, false) => {
                let receiver = &message.receiver;
                if self.friends.is_blacklisted(receiver, &caller.user_id) {
                    return Err(ImError::new(
                        err_code::ERR_IN_PEER_BLACKLIST,
                        "你已被对方拉黑",
                    ));
                }
                if self.friends.is_blacklisted(&caller.user_id, receiver) {
                    return Err(ImError::new(
                        err_code::ERR_IN_SELF_BLACKLIST,
                        "对方在你的黑名单中",
                    ));
                }
                let recipients: BTreeSet<String> =
                    [caller.user_id.clone(), receiver.clone()].into_iter().collect();
                (c2c_thread(&caller.user_id, receiver), recipients, true)
            }
            _ => {
                return Err(ImError::invalid_param(
                    "消息必须且只能指定接收者或群组之一",
                ))
            }
        };

        let seq = {
            let seq = self.messages.thread_seq.entry(thread.clone()).or_insert(0);
            *seq += 1;
            *seq
        };
        let mut msg = message.clone();
        msg.msg_id = format!("srv-{}", self.ids.next_id());
        msg.seq = seq;
        msg.timestamp = now;
        msg.order_key = self.ids.next_order_key();
        msg.status = MessageStatus::SendSucc;
        msg.version = 0;
        msg.is_read = false;
        msg.local_custom_data.clear();
        msg.extensions.clear();
        msg.conversation_id = msg.conversation_id_for(&caller.user_id);

        let stored = StoredMessage {
            message: msg.clone(),
            thread,
            recipients,
            readers: BTreeSet::new(),
            hidden_for: HashSet::new(),
            extensions: BTreeMap::new(),
        };

        for user in &stored.recipients {
            let view = stored.view_for(user);
            let recv_opt = self.recv_opt(user, &view.conversation_id);
            if recv_opt == ReceiveMessageOpt::NotReceive && *user != caller.user_id {
                debug!("[MemoryServer] {} 设置了不接收，跳过推送 {}", user, msg.msg_id);
                continue;
            }
            let push = ServerPush::NewMessage {
                message: view,
                recv_opt,
            };
            if *user == caller.user_id {
                self.hub.push_except(user, caller.connection_id, push);
            } else {
                self.hub.push(user, push);
            }
        }

        let ack = SendMessageAck {
            msg_id: msg.msg_id.clone(),
            seq: msg.seq,
            timestamp: msg.timestamp,
            order_key: msg.order_key,
            recv_opt: self.recv_opt(&caller.user_id, &msg.conversation_id),
        };
        if keep && !msg.is_online_only {
            self.messages.by_id.insert(msg.msg_id.clone(), stored);
        }
        debug!(
            "[MemoryServer] 📨 {} 发送消息 {} seq={} conv={}",
            caller.user_id, ack.msg_id, ack.seq, msg.conversation_id
        );
        Ok(ack)
    }

    pub(super) fn get_history_messages(
        &self,
        caller: &Caller,
        conversation_id: &str,
        before: Option<(i64, i64)>,
        count: usize,
    ) -> ImResult<Vec<Message>> {
        let (conv_type, thread) = thread_of(&caller.user_id, conversation_id)?;
        if conv_type == ConversationType::Group {
            if let Some((_, group_id)) = parse_conversation_id(conversation_id) {
                self.groups.member_group(group_id, &caller.user_id)?;
            }
        }
        let mut list: Vec<&StoredMessage> = self
            .messages
            .by_id
            .values()
            .filter(|m| m.thread == thread && m.visible_to(&caller.user_id))
            .filter(|m| before.map_or(true, |b| m.message.cursor() < b))
            .collect();
        list.sort_by(|a, b| b.message.cursor().cmp(&a.message.cursor()));
        Ok(list
            .into_iter()
            .take(count)
            .map(|m| m.view_for(&caller.user_id))
            .collect())
    }

    pub(super) fn find_messages(&self, caller: &Caller, msg_ids: &[String]) -> Vec<Message> {
        msg_ids
            .iter()
            .filter_map(|id| self.messages.by_id.get(id))
            .filter(|m| m.visible_to(&caller.user_id))
            .map(|m| m.view_for(&caller.user_id))
            .collect()
    }

    pub(super) fn revoke_message(
        &mut self,
        caller: &Caller,
        msg_id: &str,
        now: i64,
    ) -> ImResult<MessageRevoked> {
        let stored = self.visible_message(caller, msg_id)?;
        let msg = &stored.message;
        if msg.sender != caller.user_id {
            let allowed = msg.is_group()
                && self
                    .groups
                    .role_of(&msg.group_id, &caller.user_id)
                    .is_some_and(can_revoke_others_message);
            if !allowed {
                return Err(ImError::new(
                    err_code::ERR_MSG_PERMISSION_DENY,
                    "只能撤回自己发送的消息",
                ));
            }
        }
        if msg.status == MessageStatus::Revoked {
            return Err(ImError::new(err_code::ERR_MSG_STATUS_INVALID, "消息已被撤回"));
        }
        if now - msg.timestamp > self.revoke_window_ms {
            return Err(ImError::new(
                err_code::ERR_MSG_REVOKE_TIME_LIMIT,
                format!("消息发送已超过 {} 秒，无法撤回", self.revoke_window_ms / 1000),
            ));
        }

        let Some(stored) = self.messages.by_id.get_mut(msg_id) else {
            return Err(msg_not_found(msg_id));
        };
        stored.message.status.transition(MessageStatus::Revoked)?;
        let stored = &self.messages.by_id[msg_id];
        let revoked_for = |viewer: &str| MessageRevoked {
            msg_id: msg_id.to_string(),
            conversation_id: stored.message.conversation_id_for(viewer),
            revoker: caller.user_id.clone(),
            revoke_time: now,
        };
        self.fan_out(stored, caller, |viewer| {
            ServerPush::MessageRevoked(revoked_for(viewer))
        });
        info!("[MemoryServer] ↩️ {} 撤回消息 {}", caller.user_id, msg_id);
        Ok(revoked_for(&caller.user_id))
    }

    pub(super) fn modify_message(
        &mut self,
        caller: &Caller,
        message: &Message,
    ) -> ImResult<ModifyMessageAck> {
        let stored = self.visible_message(caller, &message.msg_id)?;
        if stored.message.sender != caller.user_id {
            return Err(ImError::new(
                err_code::ERR_MSG_PERMISSION_DENY,
                "只能修改自己发送的消息",
            ));
        }
        if stored.message.status != MessageStatus::SendSucc {
            return Err(ImError::new(
                err_code::ERR_MSG_STATUS_INVALID,
                format!("消息状态 {:?} 不允许修改", stored.message.status),
            ));
        }
        if stored.message.version != message.version {
            return Ok(ModifyMessageAck {
                err_code: err_code::ERR_MSG_MODIFY_CONFLICT,
                err_msg: format!(
                    "消息已被修改，当前版本 {}，提交版本 {}",
                    stored.message.version, message.version
                ),
                message: stored.view_for(&caller.user_id),
            });
        }
        if stored.message.content.type_name() != message.content.type_name() {
            return Err(ImError::invalid_param("不能修改消息类型"));
        }
        message.content.validate_size()?;

        let Some(stored) = self.messages.by_id.get_mut(&message.msg_id) else {
            return Err(msg_not_found(&message.msg_id));
        };
        stored.message.content = message.content.clone();
        stored.message.cloud_custom_data = message.cloud_custom_data.clone();
        stored.message.version += 1;

        let stored = &self.messages.by_id[&message.msg_id];
        self.fan_out(stored, caller, |viewer| {
            ServerPush::MessageModified(stored.view_for(viewer))
        });
        debug!(
            "[MemoryServer] ✏️ 消息 {} 修改成功, version={}",
            message.msg_id, stored.message.version
        );
        Ok(ModifyMessageAck {
            err_code: err_code::SUCC,
            err_msg: String::new(),
            message: stored.view_for(&caller.user_id),
        })
    }

    pub(super) fn delete_messages(
        &mut self,
        caller: &Caller,
        conversation_id: &str,
        msg_ids: &[String],
    ) -> ImResult<()> {
        if msg_ids.is_empty() || msg_ids.len() > MAX_DELETE_PER_CALL {
            return Err(ImError::invalid_param(format!(
                "单次删除消息数必须在 1..={MAX_DELETE_PER_CALL} 之间"
            )));
        }
        let (_, thread) = thread_of(&caller.user_id, conversation_id)?;
        for id in msg_ids {
            let stored = self.visible_message(caller, id)?;
            if stored.thread != thread {
                return Err(ImError::invalid_param(format!(
                    "消息 {id} 不属于会话 {conversation_id}"
                )));
            }
        }
        for id in msg_ids {
            if let Some(stored) = self.messages.by_id.get_mut(id) {
                stored.hidden_for.insert(caller.user_id.clone());
            }
        }
        Ok(())
    }

    pub(super) fn clear_history(&mut self, caller: &Caller, conversation_id: &str) -> ImResult<()> {
        let (_, thread) = thread_of(&caller.user_id, conversation_id)?;
        let mut n = 0;
        for stored in self.messages.by_id.values_mut() {
            if stored.thread == thread && stored.visible_to(&caller.user_id) {
                stored.hidden_for.insert(caller.user_id.clone());
                n += 1;
            }
        }
        debug!("[MemoryServer] 🧹 {} 清空 {} 条消息 ({})", caller.user_id, n, conversation_id);
        Ok(())
    }

    pub(super) fn mark_conversation_read(
        &mut self,
        caller: &Caller,
        conversation_id: &str,
        now: i64,
    ) -> ImResult<()> {
        let (conv_type, thread) = thread_of(&caller.user_id, conversation_id)?;
        for stored in self.messages.by_id.values_mut() {
            if stored.thread == thread && stored.visible_to(&caller.user_id) {
                stored.readers.insert(caller.user_id.clone());
            }
        }
        if conv_type == ConversationType::C2C {
            if let Some((_, peer)) = parse_conversation_id(conversation_id) {
                self.hub.push(
                    peer,
                    ServerPush::C2CReadReceipt(C2CReadReceipt {
                        user_id: caller.user_id.clone(),
                        timestamp: now,
                    }),
                );
            }
        }
        Ok(())
    }

    pub(super) fn send_read_receipts(
        &mut self,
        caller: &Caller,
        msg_ids: &[String],
        now: i64,
    ) -> ImResult<()> {
        for id in msg_ids {
            let stored = self.visible_message(caller, id)?;
            if !stored.message.need_read_receipt {
                return Err(ImError::invalid_param(format!("消息 {id} 不需要已读回执")));
            }
        }
        let mut by_sender: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for id in msg_ids {
            if let Some(stored) = self.messages.by_id.get_mut(id) {
                if stored.message.sender != caller.user_id
                    && stored.readers.insert(caller.user_id.clone())
                {
                    by_sender
                        .entry(stored.message.sender.clone())
                        .or_default()
                        .push(id.clone());
                }
            }
        }
        for (sender, ids) in by_sender {
            let receipts = ids
                .iter()
                .filter_map(|id| self.messages.by_id.get(id))
                .map(|m| m.receipt_for(&sender, now))
                .collect();
            self.hub.push(&sender, ServerPush::MessageReadReceipts(receipts));
        }
        Ok(())
    }

    pub(super) fn get_read_receipts(
        &self,
        caller: &Caller,
        msg_ids: &[String],
    ) -> ImResult<Vec<MessageReceipt>> {
        msg_ids
            .iter()
            .map(|id| {
                let stored = self.visible_message(caller, id)?;
                if stored.message.sender != caller.user_id {
                    return Err(ImError::new(
                        err_code::ERR_MSG_PERMISSION_DENY,
                        "只能查询自己发送的消息的已读回执",
                    ));
                }
                Ok(stored.receipt_for(&caller.user_id, stored.message.timestamp))
            })
            .collect()
    }

    /// 扩展操作的公共前置检查
    fn extension_target(&self, caller: &Caller, msg_id: &str) -> ImResult<&StoredMessage> {
        let stored = self.visible_message(caller, msg_id)?;
        let msg = &stored.message;
        if !msg.support_extension {
            return Err(ImError::new(
                err_code::ERR_MSG_EXTENSION_NOT_SUPPORTED,
                "消息发送时未开启扩展",
            ));
        }
        if msg.status != MessageStatus::SendSucc {
            return Err(ImError::new(
                err_code::ERR_MSG_STATUS_INVALID,
                format!("消息状态 {:?} 不支持扩展", msg.status),
            ));
        }
        if msg.is_group() {
            if let Some(group_type) = self.groups.group_type_of(&msg.group_id) {
                if !group_type.supports_message_extension() {
                    return Err(ImError::new(
                        err_code::ERR_MSG_EXTENSION_NOT_SUPPORTED,
                        format!("{:?} 群不支持消息扩展", group_type),
                    ));
                }
            }
        }
        Ok(stored)
    }

    pub(super) fn set_message_extensions(
        &mut self,
        caller: &Caller,
        msg_id: &str,
        extensions: &[MessageExtension],
    ) -> ImResult<Vec<MessageExtensionResult>> {
        if extensions.is_empty() || extensions.len() > MAX_EXTENSIONS_PER_CALL {
            return Err(ImError::invalid_param(format!(
                "单次设置扩展数必须在 1..={MAX_EXTENSIONS_PER_CALL} 之间"
            )));
        }
        for ext in extensions {
            if ext.key.is_empty() || ext.key.len() > MAX_EXTENSION_KEY_LEN {
                return Err(ImError::new(
                    err_code::ERR_MSG_EXTENSION_SIZE_LIMIT,
                    format!("扩展 key `{}` 长度不合法", ext.key),
                ));
            }
            if ext.value.len() > MAX_EXTENSION_VALUE_LEN {
                return Err(ImError::new(
                    err_code::ERR_MSG_EXTENSION_SIZE_LIMIT,
                    format!("扩展 `{}` 的 value 超过 1KB", ext.key),
                ));
            }
        }
        let stored = self.extension_target(caller, msg_id)?;
        let live: BTreeSet<&str> = stored.live_extensions_keys().collect();
        let new_keys: BTreeSet<&str> = extensions
            .iter()
            .map(|e| e.key.as_str())
            .filter(|k| !live.contains(k))
            .collect();
        if live.len() + new_keys.len() > MAX_EXTENSIONS_PER_MESSAGE {
            return Err(ImError::new(
                err_code::ERR_MSG_EXTENSION_SIZE_LIMIT,
                format!("单条消息扩展 key 总数不能超过 {MAX_EXTENSIONS_PER_MESSAGE}"),
            ));
        }

        let Some(stored) = self.messages.by_id.get_mut(msg_id) else {
            return Err(msg_not_found(msg_id));
        };
        let mut results = Vec::with_capacity(extensions.len());
        let mut changed = Vec::new();
        for ext in extensions {
            let current = stored.current_extension(&ext.key);
            if current.version != ext.version {
                results.push(MessageExtensionResult {
                    result_code: err_code::ERR_MSG_EXTENSION_CONFLICT,
                    result_info: format!(
                        "扩展 `{}` 已被修改，当前版本 {}",
                        ext.key, current.version
                    ),
                    extension: current,
                });
                continue;
            }
            let version = current.version + 1;
            stored.extensions.insert(
                ext.key.clone(),
                ExtensionEntry {
                    value: Some(ext.value.clone()),
                    version,
                },
            );
            let written = MessageExtension {
                key: ext.key.clone(),
                value: ext.value.clone(),
                version,
            };
            changed.push(written.clone());
            results.push(MessageExtensionResult {
                result_code: err_code::SUCC,
                result_info: String::new(),
                extension: written,
            });
        }

        if !changed.is_empty() {
            let stored = &self.messages.by_id[msg_id];
            self.fan_out(stored, caller, |_| ServerPush::MessageExtensionsChanged {
                msg_id: msg_id.to_string(),
                extensions: changed.clone(),
            });
        }
        Ok(results)
    }

    pub(super) fn get_message_extensions(
        &self,
        caller: &Caller,
        msg_id: &str,
    ) -> ImResult<Vec<MessageExtension>> {
        let stored = self.extension_target(caller, msg_id)?;
        Ok(stored.live_extensions().collect())
    }

    pub(super) fn delete_message_extensions(
        &mut self,
        caller: &Caller,
        msg_id: &str,
        keys: &[String],
    ) -> ImResult<Vec<MessageExtensionResult>> {
        if keys.len() > MAX_EXTENSIONS_PER_CALL {
            return Err(ImError::invalid_param(format!(
                "单次删除扩展数不能超过 {MAX_EXTENSIONS_PER_CALL}"
            )));
        }
        self.extension_target(caller, msg_id)?;
        let Some(stored) = self.messages.by_id.get_mut(msg_id) else {
            return Err(msg_not_found(msg_id));
        };
        let targets: Vec<String> = if keys.is_empty() {
            stored.live_extensions_keys().map(str::to_string).collect()
        } else {
            keys.to_vec()
        };
        let mut results = Vec::with_capacity(targets.len());
        let mut deleted = Vec::new();
        for key in targets {
            let entry = stored.extensions.get_mut(&key).filter(|e| e.value.is_some());
            let Some(entry) = entry else {
                // 不存在的 key 视为已删除
                results.push(MessageExtensionResult {
                    result_code: err_code::SUCC,
                    result_info: String::new(),
                    extension: stored.current_extension(&key),
                });
                continue;
            };
            entry.value = None;
            entry.version += 1;
            let ext = MessageExtension {
                key: key.clone(),
                value: String::new(),
                version: entry.version,
            };
            deleted.push(ext.clone());
            results.push(MessageExtensionResult {
                result_code: err_code::SUCC,
                result_info: String::new(),
                extension: ext,
            });
        }
        if !deleted.is_empty() {
            let stored = &self.messages.by_id[msg_id];
            self.fan_out(stored, caller, |_| ServerPush::MessageExtensionsDeleted {
                msg_id: msg_id.to_string(),
                extensions: deleted.clone(),
            });
        }
        Ok(results)
    }
}

impl StoredMessage {
    fn live_extensions_keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.extensions
            .iter()
            .filter(|(_, e)| e.value.is_some())
            .map(|(k, _)| k.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::super::MemoryServer;
    use super::*;
    use crate::im::clock::ManualClock;
    use crate::im::message::types::{MessageContent, TextElem};
    use crate::im::remote::{LoginAck, RemoteService};
    use std::sync::Arc;
    use std::time::Duration;

    async fn login(server: &MemoryServer, user: &str) -> (Caller, LoginAck) {
        let ticket = server.issue_ticket(user, Duration::from_secs(3600));
        let ack = server.login(user, &ticket).await.unwrap();
        let caller = Caller {
            user_id: user.to_string(),
            token: ack.token.clone(),
            connection_id: ack.connection_id,
        };
        (caller, ack)
    }

    fn text_to(sender: &str, receiver: &str, text: &str) -> Message {
        let mut msg = Message::new(
            format!("c-{text}"),
            sender,
            MessageContent::Text(TextElem {
                text: text.into(),
                at_user_list: vec![],
            }),
            0,
        );
        msg.receiver = receiver.into();
        msg
    }

    #[tokio::test]
    async fn send_relays_and_assigns_ids() {
        let clock = Arc::new(ManualClock::new(10_000));
        let server = MemoryServer::new(clock.clone());
        let (alice, _a) = login(&server, "alice").await;
        let (_bob, mut b) = login(&server, "bob").await;

        let msg = text_to("alice", "bob", "hi");
        let first = server.send_message(&alice, &msg).await.unwrap();
        let second = server.send_message(&alice, &msg).await.unwrap();
        assert_ne!(first.msg_id, second.msg_id);
        assert_eq!(second.seq, first.seq + 1);
        assert!(second.order_key > first.order_key);

        match b.push_rx.recv().await {
            Some(ServerPush::NewMessage { message, .. }) => {
                assert_eq!(message.msg_id, first.msg_id);
                assert_eq!(message.conversation_id, "c2c_alice");
                assert_eq!(message.status, MessageStatus::SendSucc);
            }
            other => panic!("unexpected push {other:?}"),
        }
    }

    #[tokio::test]
    async fn extensions_first_writer_wins() {
        let server = MemoryServer::new(Arc::new(ManualClock::new(0)));
        let (alice, _a) = login(&server, "alice").await;
        let (bob, _b) = login(&server, "bob").await;
        let mut msg = text_to("alice", "bob", "vote");
        msg.support_extension = true;
        let ack = server.send_message(&alice, &msg).await.unwrap();

        let write = |value: &str| {
            vec![MessageExtension {
                key: "seat".into(),
                value: value.into(),
                version: 0,
            }]
        };
        let won = server
            .set_message_extensions(&alice, &ack.msg_id, &write("alice"))
            .await
            .unwrap();
        let lost = server
            .set_message_extensions(&bob, &ack.msg_id, &write("bob"))
            .await
            .unwrap();
        assert_eq!(won[0].result_code, 0);
        assert_eq!(lost[0].result_code, err_code::ERR_MSG_EXTENSION_CONFLICT);
        assert_eq!(lost[0].extension.value, "alice");
        assert_eq!(lost[0].extension.version, 1);
    }

    #[tokio::test]
    async fn revoke_respects_window() {
        let clock = Arc::new(ManualClock::new(0));
        let server = MemoryServer::new(clock.clone());
        let (alice, _a) = login(&server, "alice").await;
        let old = server
            .send_message(&alice, &text_to("alice", "bob", "old"))
            .await
            .unwrap();
        clock.advance_ms(120_001);
        let err = server.revoke_message(&alice, &old.msg_id).await.unwrap_err();
        assert_eq!(err.code, err_code::ERR_MSG_REVOKE_TIME_LIMIT);

        let fresh = server
            .send_message(&alice, &text_to("alice", "bob", "fresh"))
            .await
            .unwrap();
        clock.advance_ms(120_000);
        server.revoke_message(&alice, &fresh.msg_id).await.unwrap();
        let again = server.revoke_message(&alice, &fresh.msg_id).await.unwrap_err();
        assert_eq!(again.code, err_code::ERR_MSG_STATUS_INVALID);
    }
}
