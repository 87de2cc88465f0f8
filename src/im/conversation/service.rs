//! 会话管理
//!
//! 会话列表常驻内存并写穿到 SQLite。每次变更只按差值增量维护总未读数与已订阅过滤条件的未读数，
//! 不做全量重算。同一时刻只有一个变更在写库：内存修改与对应的 upsert 在 `write_lock` 内
//! 完成，保证库里的顺序与内存一致；监听器通知在释放锁之后执行。

use crate::im::context::ImContext;
use crate::im::conversation::dao::ConversationDao;
use crate::im::conversation::models::{
    Conversation, ConversationListFilter, ConversationListResult, ConversationOperationResult,
    MAX_CONVERSATION_CUSTOM_DATA, MAX_DELETE_CONVERSATION_LIST,
};
use crate::im::error::{err_code, ImError, ImResult};
use crate::im::message::dao::MessageDao;
use crate::im::message::models::Message;
use crate::im::types::{parse_conversation_id, ReceiveMessageOpt};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Default)]
struct ConvState {
    owner: String,
    conversations: HashMap<String, Conversation>,
    groups: BTreeSet<String>,
    total_unread: u64,
    /// 已订阅的过滤条件 → 当前未读数
    filter_unread: HashMap<ConversationListFilter, u64>,
}

enum GroupEvent {
    Created(String, Vec<Conversation>),
    Deleted(String),
    Renamed(String, String),
    Added(String, Vec<Conversation>),
    Removed(String, Vec<Conversation>),
}

/// 一次变更的结果，锁外持久化并通知
#[derive(Default)]
struct Batch {
    owner: String,
    new: Vec<Conversation>,
    changed: Vec<Conversation>,
    deleted: Vec<String>,
    total_unread: Option<u64>,
    filter_unread: HashMap<ConversationListFilter, u64>,
    groups_added: Vec<String>,
    groups_removed: Vec<String>,
    group_events: Vec<GroupEvent>,
}

fn not_found(conversation_id: &str) -> ImError {
    ImError::new(
        err_code::ERR_CONVERSATION_NOT_FOUND,
        format!("会话不存在: {conversation_id}"),
    )
}

fn op_result(conversation_id: &str, result: ImResult<()>) -> ConversationOperationResult {
    match result {
        Ok(()) => ConversationOperationResult {
            conversation_id: conversation_id.to_string(),
            result_code: 0,
            result_info: String::new(),
        },
        Err(e) => ConversationOperationResult {
            conversation_id: conversation_id.to_string(),
            result_code: e.code,
            result_info: e.msg,
        },
    }
}

impl ConvState {
    fn get(&self, conversation_id: &str) -> ImResult<Conversation> {
        self.conversations
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| not_found(conversation_id))
    }

    /// 取出已有会话，不存在时按会话 ID 新建
    fn ensure(&self, conversation_id: &str) -> ImResult<Conversation> {
        if let Some(conv) = self.conversations.get(conversation_id) {
            return Ok(conv.clone());
        }
        let (conv_type, peer) = parse_conversation_id(conversation_id)
            .ok_or_else(|| ImError::invalid_param(format!("非法会话 ID: {conversation_id}")))?;
        Ok(Conversation::new(conversation_id.to_string(), conv_type, peer))
    }

    /// 替换（或删除）一个会话，并增量更新未读统计
    fn replace(&mut self, batch: &mut Batch, conversation_id: &str, new: Option<Conversation>) {
        let old = match &new {
            Some(conv) => self
                .conversations
                .insert(conversation_id.to_string(), conv.clone()),
            None => self.conversations.remove(conversation_id),
        };

        let contribution = |c: Option<&Conversation>| c.map(|c| c.unread_contribution()).unwrap_or(0);
        let before = contribution(old.as_ref());
        let after = contribution(new.as_ref());
        if before != after {
            self.total_unread = self.total_unread + after - before;
            batch.total_unread = Some(self.total_unread);
        }
        for (filter, value) in self.filter_unread.iter_mut() {
            let before = contribution(old.as_ref().filter(|c| filter.matches(c)));
            let after = contribution(new.as_ref().filter(|c| filter.matches(c)));
            if before != after {
                *value = *value + after - before;
                batch.filter_unread.insert(filter.clone(), *value);
            }
        }

        match (old.is_some(), new) {
            (false, Some(conv)) => batch.new.push(conv),
            (true, Some(conv)) => batch.changed.push(conv),
            (true, None) => batch.deleted.push(conversation_id.to_string()),
            (false, None) => {}
        }
    }

    fn unread_for(&self, filter: &ConversationListFilter) -> u64 {
        self.conversations
            .values()
            .filter(|c| filter.matches(c))
            .map(|c| c.unread_contribution())
            .sum()
    }

    /// 排序：置顶优先，其次服务端顺序号，最后按最后消息时间
    fn sorted<'a>(&self, iter: impl Iterator<Item = &'a Conversation>) -> Vec<Conversation> {
        let mut list: Vec<Conversation> = iter.cloned().collect();
        list.sort_by(|a, b| {
            (b.is_pinned, b.order_key, b.last_message_time, &b.conversation_id).cmp(&(
                a.is_pinned,
                a.order_key,
                a.last_message_time,
                &a.conversation_id,
            ))
        });
        list
    }
}

fn paginate(list: Vec<Conversation>, next_seq: u64, count: usize) -> ImResult<ConversationListResult> {
    if count == 0 {
        return Err(ImError::invalid_param("count 必须大于 0"));
    }
    let start = (next_seq as usize).min(list.len());
    let end = (start + count).min(list.len());
    let is_finished = end >= list.len();
    Ok(ConversationListResult {
        conversation_list: list[start..end].to_vec(),
        next_seq: if is_finished { 0 } else { end as u64 },
        is_finished,
    })
}

pub struct ConversationManager {
    ctx: Arc<ImContext>,
    dao: ConversationDao,
    msg_dao: MessageDao,
    state: Mutex<ConvState>,
    /// 串行化「内存修改 + 写库」
    write_lock: tokio::sync::Mutex<()>,
}

impl ConversationManager {
    pub fn new(ctx: Arc<ImContext>) -> Self {
        let dao = ConversationDao::new(ctx.pool.clone());
        let msg_dao = MessageDao::new(ctx.pool.clone());
        Self {
            ctx,
            dao,
            msg_dao,
            state: Mutex::new(ConvState::default()),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// 登录后加载本地会话
    pub async fn load(&self, owner: &str) -> ImResult<()> {
        let conversations = self.dao.get_all_conversations(owner).await?;
        let groups = self.dao.get_conversation_groups(owner).await?;
        let mut st = self.state.lock();
        *st = ConvState {
            owner: owner.to_string(),
            total_unread: conversations.iter().map(|c| c.unread_contribution()).sum(),
            conversations: conversations
                .into_iter()
                .map(|c| (c.conversation_id.clone(), c))
                .collect(),
            groups: groups.into_iter().collect(),
            filter_unread: HashMap::new(),
        };
        info!(
            "[ConvMgr] 📂 加载本地会话 {} 个，总未读 {}",
            st.conversations.len(),
            st.total_unread
        );
        Ok(())
    }

    /// 登出或被踢后清空内存状态
    pub fn reset(&self) {
        *self.state.lock() = ConvState::default();
    }

    fn mutate<R>(
        &self,
        f: impl FnOnce(&mut ConvState, &mut Batch) -> ImResult<R>,
    ) -> ImResult<(R, Batch)> {
        let mut st = self.state.lock();
        if st.owner.is_empty() {
            return Err(ImError::not_logged_in());
        }
        let mut batch = Batch {
            owner: st.owner.clone(),
            ..Default::default()
        };
        let r = f(&mut *st, &mut batch)?;
        Ok((r, batch))
    }

    async fn apply<R>(
        &self,
        f: impl FnOnce(&mut ConvState, &mut Batch) -> ImResult<R>,
    ) -> ImResult<R> {
        let (r, batch) = {
            let _write = self.write_lock.lock().await;
            let (r, batch) = self.mutate(f)?;
            self.persist(&batch).await?;
            (r, batch)
        };
        self.notify(batch).await;
        Ok(r)
    }

    fn read<R>(&self, f: impl FnOnce(&ConvState) -> ImResult<R>) -> ImResult<R> {
        let st = self.state.lock();
        if st.owner.is_empty() {
            return Err(ImError::not_logged_in());
        }
        f(&*st)
    }

    async fn persist(&self, batch: &Batch) -> ImResult<()> {
        let owner = &batch.owner;
        for conv in batch.new.iter().chain(batch.changed.iter()) {
            self.dao.upsert_conversation(owner, conv).await?;
        }
        for id in &batch.deleted {
            self.dao.delete_conversation(owner, id).await?;
        }
        for name in &batch.groups_added {
            self.dao.insert_conversation_group(owner, name).await?;
        }
        for name in &batch.groups_removed {
            self.dao.delete_conversation_group(owner, name).await?;
        }
        Ok(())
    }

    async fn notify(&self, batch: Batch) {
        let listeners = self.ctx.bus.conversation.snapshot();
        for l in &listeners {
            if !batch.new.is_empty() {
                l.on_new_conversation(batch.new.clone()).await;
            }
            if !batch.changed.is_empty() {
                l.on_conversation_changed(batch.changed.clone()).await;
            }
            if !batch.deleted.is_empty() {
                l.on_conversation_deleted(batch.deleted.clone()).await;
            }
            for event in &batch.group_events {
                match event {
                    GroupEvent::Created(name, convs) => {
                        l.on_conversation_group_created(name.clone(), convs.clone())
                            .await
                    }
                    GroupEvent::Deleted(name) => l.on_conversation_group_deleted(name.clone()).await,
                    GroupEvent::Renamed(old, new) => {
                        l.on_conversation_group_name_changed(old.clone(), new.clone())
                            .await
                    }
                    GroupEvent::Added(name, convs) => {
                        l.on_conversations_added_to_group(name.clone(), convs.clone())
                            .await
                    }
                    GroupEvent::Removed(name, convs) => {
                        l.on_conversations_deleted_from_group(name.clone(), convs.clone())
                            .await
                    }
                }
            }
            if let Some(total) = batch.total_unread {
                l.on_total_unread_message_count_changed(total).await;
            }
            for (filter, count) in &batch.filter_unread {
                l.on_unread_message_count_changed_by_filter(filter.clone(), *count)
                    .await;
            }
        }
    }

    // ---------- 查询 ----------

    /// 分页获取会话列表，`next_seq` 从 0 开始，返回 0 表示已到末尾
    pub fn get_conversation_list(
        &self,
        next_seq: u64,
        count: usize,
    ) -> ImResult<ConversationListResult> {
        let list = self.read(|st| Ok(st.sorted(st.conversations.values())))?;
        paginate(list, next_seq, count)
    }

    pub fn get_conversation(&self, conversation_id: &str) -> ImResult<Conversation> {
        self.read(|st| st.get(conversation_id))
    }

    /// 批量获取，不存在的会话被跳过
    pub fn get_conversation_list_by_ids(
        &self,
        conversation_ids: &[String],
    ) -> ImResult<Vec<Conversation>> {
        self.read(|st| {
            Ok(conversation_ids
                .iter()
                .filter_map(|id| st.conversations.get(id).cloned())
                .collect())
        })
    }

    pub fn get_conversation_list_by_filter(
        &self,
        filter: &ConversationListFilter,
        next_seq: u64,
        count: usize,
    ) -> ImResult<ConversationListResult> {
        let list = self.read(|st| {
            Ok(st.sorted(st.conversations.values().filter(|c| filter.matches(c))))
        })?;
        paginate(list, next_seq, count)
    }

    pub fn get_total_unread_message_count(&self) -> ImResult<u64> {
        self.read(|st| Ok(st.total_unread))
    }

    pub fn get_unread_message_count_by_filter(
        &self,
        filter: &ConversationListFilter,
    ) -> ImResult<u64> {
        self.read(|st| Ok(st.unread_for(filter)))
    }

    /// 订阅后，该过滤条件下的未读数变化会通过监听器通知
    pub fn subscribe_unread_message_count_by_filter(
        &self,
        filter: ConversationListFilter,
    ) -> ImResult<()> {
        let mut st = self.state.lock();
        if st.owner.is_empty() {
            return Err(ImError::not_logged_in());
        }
        let value = st.unread_for(&filter);
        st.filter_unread.insert(filter, value);
        Ok(())
    }

    pub fn unsubscribe_unread_message_count_by_filter(&self, filter: &ConversationListFilter) {
        self.state.lock().filter_unread.remove(filter);
    }

    pub fn get_conversation_group_list(&self) -> ImResult<Vec<String>> {
        self.read(|st| Ok(st.groups.iter().cloned().collect()))
    }

    // ---------- 修改 ----------

    /// 删除会话，同时删除本地与云端消息（不可恢复）
    pub async fn delete_conversation(&self, conversation_id: &str) -> ImResult<()> {
        self.remove_conversation(conversation_id, true).await
    }

    async fn remove_conversation(&self, conversation_id: &str, clear_messages: bool) -> ImResult<()> {
        self.read(|st| st.get(conversation_id).map(|_| ()))?;
        if clear_messages {
            let caller = self.ctx.caller()?;
            self.ctx
                .remote
                .clear_history(&caller, conversation_id)
                .await?;
            let removed = self
                .msg_dao
                .delete_conversation(&caller.user_id, conversation_id)
                .await?;
            debug!("[ConvMgr] 删除会话 {} 的本地消息 {} 条", conversation_id, removed);
        }
        self.apply(|st, b| {
            st.get(conversation_id)?;
            st.replace(b, conversation_id, None);
            Ok(())
        })
        .await?;
        info!("[ConvMgr] 🗑️ 删除会话: {}", conversation_id);
        Ok(())
    }

    /// 批量删除会话；`clear_messages` 为 false 时只删除会话，保留本地与云端消息
    pub async fn delete_conversation_list(
        &self,
        conversation_ids: &[String],
        clear_messages: bool,
    ) -> ImResult<Vec<ConversationOperationResult>> {
        if conversation_ids.is_empty() || conversation_ids.len() > MAX_DELETE_CONVERSATION_LIST {
            return Err(ImError::invalid_param(format!(
                "单次删除会话数必须在 1..={MAX_DELETE_CONVERSATION_LIST} 之间"
            )));
        }
        let mut results = Vec::with_capacity(conversation_ids.len());
        for id in conversation_ids {
            let r = self.remove_conversation(id, clear_messages).await;
            results.push(op_result(id, r));
        }
        Ok(results)
    }

    /// 设置草稿，`None` 或空串清除草稿
    pub async fn set_conversation_draft(
        &self,
        conversation_id: &str,
        draft: Option<String>,
    ) -> ImResult<()> {
        let now = self.ctx.now_ms();
        self.apply(|st, b| {
            let mut conv = st.ensure(conversation_id)?;
            conv.draft_text = draft.filter(|d| !d.is_empty());
            conv.draft_time = if conv.draft_text.is_some() { now } else { 0 };
            st.replace(b, conversation_id, Some(conv));
            Ok(())
        })
        .await
    }

    pub async fn set_conversation_custom_data(
        &self,
        conversation_ids: &[String],
        custom_data: &[u8],
    ) -> ImResult<Vec<ConversationOperationResult>> {
        if custom_data.len() > MAX_CONVERSATION_CUSTOM_DATA {
            return Err(ImError::new(
                err_code::ERR_CONVERSATION_CUSTOM_DATA_SIZE_LIMIT,
                format!(
                    "会话自定义数据 {} 字节超过上限 {}",
                    custom_data.len(),
                    MAX_CONVERSATION_CUSTOM_DATA
                ),
            ));
        }
        self.apply(|st, b| {
            Ok(conversation_ids
                .iter()
                .map(|id| {
                    let r = st.ensure(id).map(|mut conv| {
                        conv.custom_data = custom_data.to_vec();
                        st.replace(b, id, Some(conv));
                    });
                    op_result(id, r)
                })
                .collect())
        })
        .await
    }

    pub async fn pin_conversation(&self, conversation_id: &str, is_pinned: bool) -> ImResult<()> {
        self.apply(|st, b| {
            let mut conv = st.ensure(conversation_id)?;
            conv.is_pinned = is_pinned;
            st.replace(b, conversation_id, Some(conv));
            Ok(())
        })
        .await
    }

    /// 设置或取消会话标记位
    pub async fn mark_conversation(
        &self,
        conversation_ids: &[String],
        mark_type: u64,
        enable: bool,
    ) -> ImResult<Vec<ConversationOperationResult>> {
        if mark_type == 0 {
            return Err(ImError::invalid_param("标记位不能为 0"));
        }
        self.apply(|st, b| {
            Ok(conversation_ids
                .iter()
                .map(|id| {
                    let r = st.get(id).map(|mut conv| {
                        if enable {
                            conv.mark_list |= mark_type;
                        } else {
                            conv.mark_list &= !mark_type;
                        }
                        st.replace(b, id, Some(conv));
                    });
                    op_result(id, r)
                })
                .collect())
        })
        .await
    }

    /// 清空会话未读数，并向服务端上报已读
    pub async fn clean_conversation_unread_message_count(
        &self,
        conversation_id: &str,
    ) -> ImResult<()> {
        let conv = self.read(|st| st.get(conversation_id))?;
        let caller = self.ctx.caller()?;
        self.ctx
            .remote
            .mark_conversation_read(&caller, conversation_id)
            .await?;
        let unread = self
            .msg_dao
            .unread_from_others(&caller.user_id, conversation_id)
            .await?;
        for mut msg in unread {
            msg.is_read = true;
            self.msg_dao.upsert(&caller.user_id, &msg).await?;
        }
        if conv.unread_count > 0 {
            self.clear_unread_local(conversation_id).await?;
        }
        Ok(())
    }

    // ---------- 会话分组 ----------

    pub async fn create_conversation_group(
        &self,
        name: &str,
        conversation_ids: &[String],
    ) -> ImResult<Vec<ConversationOperationResult>> {
        if name.is_empty() {
            return Err(ImError::invalid_param("分组名不能为空"));
        }
        self.apply(|st, b| {
            if st.groups.contains(name) {
                return Err(ImError::new(
                    err_code::ERR_CONVERSATION_GROUP_EXISTS,
                    format!("会话分组已存在: {name}"),
                ));
            }
            st.groups.insert(name.to_string());
            b.groups_added.push(name.to_string());
            let (results, added) = Self::add_to_group(st, b, name, conversation_ids);
            b.group_events.push(GroupEvent::Created(name.to_string(), added));
            Ok(results)
        })
        .await
    }

    pub async fn delete_conversation_group(&self, name: &str) -> ImResult<()> {
        self.apply(|st, b| {
            if !st.groups.remove(name) {
                return Err(Self::group_not_found(name));
            }
            b.groups_removed.push(name.to_string());
            let members: Vec<Conversation> = st
                .conversations
                .values()
                .filter(|c| c.conversation_groups.iter().any(|g| g == name))
                .cloned()
                .collect();
            for mut conv in members {
                conv.conversation_groups.retain(|g| g != name);
                let id = conv.conversation_id.clone();
                st.replace(b, &id, Some(conv));
            }
            b.group_events.push(GroupEvent::Deleted(name.to_string()));
            Ok(())
        })
        .await
    }

    pub async fn rename_conversation_group(&self, old_name: &str, new_name: &str) -> ImResult<()> {
        if new_name.is_empty() {
            return Err(ImError::invalid_param("分组名不能为空"));
        }
        self.apply(|st, b| {
            if !st.groups.contains(old_name) {
                return Err(Self::group_not_found(old_name));
            }
            if st.groups.contains(new_name) {
                return Err(ImError::new(
                    err_code::ERR_CONVERSATION_GROUP_EXISTS,
                    format!("会话分组已存在: {new_name}"),
                ));
            }
            st.groups.remove(old_name);
            st.groups.insert(new_name.to_string());
            b.groups_removed.push(old_name.to_string());
            b.groups_added.push(new_name.to_string());
            let members: Vec<Conversation> = st
                .conversations
                .values()
                .filter(|c| c.conversation_groups.iter().any(|g| g == old_name))
                .cloned()
                .collect();
            for mut conv in members {
                for g in conv.conversation_groups.iter_mut() {
                    if g == old_name {
                        *g = new_name.to_string();
                    }
                }
                let id = conv.conversation_id.clone();
                st.replace(b, &id, Some(conv));
            }
            b.group_events
                .push(GroupEvent::Renamed(old_name.to_string(), new_name.to_string()));
            Ok(())
        })
        .await
    }

    pub async fn add_conversations_to_group(
        &self,
        name: &str,
        conversation_ids: &[String],
    ) -> ImResult<Vec<ConversationOperationResult>> {
        self.apply(|st, b| {
            if !st.groups.contains(name) {
                return Err(Self::group_not_found(name));
            }
            let (results, added) = Self::add_to_group(st, b, name, conversation_ids);
            if !added.is_empty() {
                b.group_events.push(GroupEvent::Added(name.to_string(), added));
            }
            Ok(results)
        })
        .await
    }

    pub async fn delete_conversations_from_group(
        &self,
        name: &str,
        conversation_ids: &[String],
    ) -> ImResult<Vec<ConversationOperationResult>> {
        self.apply(|st, b| {
            if !st.groups.contains(name) {
                return Err(Self::group_not_found(name));
            }
            let mut removed = Vec::new();
            let results: Vec<ConversationOperationResult> = conversation_ids
                .iter()
                .map(|id| {
                    let r = st.get(id).and_then(|mut conv| {
                        if !conv.conversation_groups.iter().any(|g| g == name) {
                            return Err(ImError::invalid_param(format!("{id} 不在分组 {name} 中")));
                        }
                        conv.conversation_groups.retain(|g| g != name);
                        removed.push(conv.clone());
                        st.replace(b, id, Some(conv));
                        Ok(())
                    });
                    op_result(id, r)
                })
                .collect();
            if !removed.is_empty() {
                b.group_events.push(GroupEvent::Removed(name.to_string(), removed));
            }
            Ok(results)
        })
        .await
    }

    fn group_not_found(name: &str) -> ImError {
        ImError::new(
            err_code::ERR_CONVERSATION_GROUP_NOT_FOUND,
            format!("会话分组不存在: {name}"),
        )
    }

    fn add_to_group(
        st: &mut ConvState,
        b: &mut Batch,
        name: &str,
        conversation_ids: &[String],
    ) -> (Vec<ConversationOperationResult>, Vec<Conversation>) {
        let mut added = Vec::new();
        let results: Vec<ConversationOperationResult> = conversation_ids
            .iter()
            .map(|id| {
                let r = st.get(id).map(|mut conv| {
                    if !conv.conversation_groups.iter().any(|g| g == name) {
                        conv.conversation_groups.push(name.to_string());
                        added.push(conv.clone());
                        st.replace(b, id, Some(conv));
                    }
                });
                op_result(id, r)
            })
            .collect();
        (results, added)
    }

    // ---------- 供消息模块调用 ----------

    /// 收发消息后更新会话的最后一条消息与未读数
    pub(crate) async fn on_message(
        &self,
        message: &Message,
        count_unread: bool,
        recv_opt: Option<ReceiveMessageOpt>,
    ) -> ImResult<()> {
        let conversation_id = message.conversation_id.clone();
        self.apply(|st, b| {
            let mut conv = st.ensure(&conversation_id)?;
            if let Some(opt) = recv_opt {
                conv.recv_opt = opt;
            }
            // 本地插入的消息没有顺序号，按时间比较
            let newer = if message.order_key == 0 {
                message.timestamp >= conv.last_message_time
            } else {
                message.order_key >= conv.order_key
            };
            if conv.last_message_id.is_none() || newer {
                conv.order_key = conv.order_key.max(message.order_key);
                conv.last_message_id = Some(message.client_msg_id.clone());
                conv.last_message_time = message.timestamp;
            }
            if count_unread {
                conv.unread_count += 1;
            }
            st.replace(b, &conversation_id, Some(conv));
            Ok(())
        })
        .await
    }

    pub(crate) async fn set_recv_opt(
        &self,
        conversation_id: &str,
        opt: ReceiveMessageOpt,
    ) -> ImResult<()> {
        self.apply(|st, b| {
            let mut conv = st.ensure(conversation_id)?;
            if conv.recv_opt != opt {
                conv.recv_opt = opt;
                st.replace(b, conversation_id, Some(conv));
            }
            Ok(())
        })
        .await
    }

    pub(crate) async fn clear_unread_local(&self, conversation_id: &str) -> ImResult<()> {
        self.apply(|st, b| {
            if let Some(conv) = st.conversations.get(conversation_id) {
                if conv.unread_count > 0 {
                    let mut conv = conv.clone();
                    conv.unread_count = 0;
                    st.replace(b, conversation_id, Some(conv));
                }
            }
            Ok(())
        })
        .await
    }

    /// 会话中有消息被删除 / 清空后，重新指向最新的一条
    pub(crate) async fn refresh_last_message(
        &self,
        conversation_id: &str,
        latest: Option<&Message>,
        reset_unread: bool,
    ) -> ImResult<()> {
        self.apply(|st, b| {
            if let Some(conv) = st.conversations.get(conversation_id) {
                let mut conv = conv.clone();
                conv.last_message_id = latest.map(|m| m.client_msg_id.clone());
                conv.last_message_time = latest.map(|m| m.timestamp).unwrap_or(0);
                if reset_unread {
                    conv.unread_count = 0;
                }
                st.replace(b, conversation_id, Some(conv));
            }
            Ok(())
        })
        .await
    }

    /// 所有有未读的会话 ID
    pub(crate) fn conversations_with_unread(&self) -> ImResult<Vec<String>> {
        self.read(|st| {
            Ok(st
                .conversations
                .values()
                .filter(|c| c.unread_count > 0)
                .map(|c| c.conversation_id.clone())
                .collect())
        })
    }
}
