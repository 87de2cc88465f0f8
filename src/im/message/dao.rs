//! 消息数据访问层（DAO）
//!
//! 所有会话共用 `local_chat_logs` 一张表，按 `owner_user_id` 隔离不同登录用户。
//! 消息整体以 JSON 保存在 `data` 列，检索用到的字段单独建列。
//! 删除单条消息只把状态标记为 `HasDeleted`，查询时过滤；清空会话才物理删除。

use crate::im::message::models::{Message, MessageStatus};
use anyhow::{Context, Result};
use sqlx::{sqlite::SqliteRow, Pool, Row, Sqlite};

/// 本地消息存储
#[derive(Clone)]
pub struct MessageDao {
    pool: Pool<Sqlite>,
}

impl MessageDao {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    fn placeholders(n: usize) -> String {
        vec!["?"; n].join(",")
    }

    fn row_to_message(row: SqliteRow) -> Result<Message> {
        let data: String = row.try_get("data").context("读取消息 data 列失败")?;
        serde_json::from_str(&data).context("解析本地消息 JSON 失败")
    }

    fn rows_to_messages(rows: Vec<SqliteRow>) -> Result<Vec<Message>> {
        rows.into_iter().map(Self::row_to_message).collect()
    }

    /// 插入或覆盖一条消息（以客户端消息 ID 为主键）
    pub async fn upsert(&self, owner: &str, msg: &Message) -> Result<()> {
        let data = serde_json::to_string(msg).context("序列化消息失败")?;
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO local_chat_logs (
                owner_user_id, client_msg_id, msg_id, conversation_id,
                seq, timestamp, status, text_content, data
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(owner)
        .bind(&msg.client_msg_id)
        .bind(&msg.msg_id)
        .bind(&msg.conversation_id)
        .bind(msg.seq)
        .bind(msg.timestamp)
        .bind(status_code(msg.status))
        .bind(msg.content.searchable_text())
        .bind(data)
        .execute(&self.pool)
        .await
        .with_context(|| format!("保存消息失败: {}", msg.client_msg_id))?;
        Ok(())
    }

    pub async fn get_by_client_msg_id(
        &self,
        owner: &str,
        client_msg_id: &str,
    ) -> Result<Option<Message>> {
        let row = sqlx::query(
            "SELECT data FROM local_chat_logs WHERE owner_user_id = ? AND client_msg_id = ? LIMIT 1",
        )
        .bind(owner)
        .bind(client_msg_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_message).transpose()
    }

    pub async fn get_by_msg_id(&self, owner: &str, msg_id: &str) -> Result<Option<Message>> {
        if msg_id.is_empty() {
            return Ok(None);
        }
        let row = sqlx::query(
            "SELECT data FROM local_chat_logs WHERE owner_user_id = ? AND msg_id = ? LIMIT 1",
        )
        .bind(owner)
        .bind(msg_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_message).transpose()
    }

    /// 按服务端消息 ID 或客户端消息 ID 批量查找
    pub async fn find_by_ids(&self, owner: &str, ids: &[String]) -> Result<Vec<Message>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let placeholders = Self::placeholders(ids.len());
        let sql = format!(
            "SELECT data FROM local_chat_logs WHERE owner_user_id = ? AND status != ? \
             AND (msg_id IN ({placeholders}) OR client_msg_id IN ({placeholders})) \
             ORDER BY timestamp DESC, seq DESC"
        );
        let mut query = sqlx::query(&sql)
            .bind(owner)
            .bind(status_code(MessageStatus::HasDeleted));
        for id in ids {
            query = query.bind(id);
        }
        for id in ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;
        Self::rows_to_messages(rows)
    }

    /// 会话历史，按 (时间戳, seq) 倒序；`before` 为空从最新开始
    pub async fn history(
        &self,
        owner: &str,
        conversation_id: &str,
        before: Option<(i64, i64)>,
        count: usize,
    ) -> Result<Vec<Message>> {
        let rows = match before {
            Some((ts, seq)) => {
                sqlx::query(
                    r#"
                    SELECT data FROM local_chat_logs
                    WHERE owner_user_id = ? AND conversation_id = ? AND status != ?
                      AND (timestamp < ? OR (timestamp = ? AND seq < ?))
                    ORDER BY timestamp DESC, seq DESC
                    LIMIT ?
                    "#,
                )
                .bind(owner)
                .bind(conversation_id)
                .bind(status_code(MessageStatus::HasDeleted))
                .bind(ts)
                .bind(ts)
                .bind(seq)
                .bind(count as i64)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT data FROM local_chat_logs
                    WHERE owner_user_id = ? AND conversation_id = ? AND status != ?
                    ORDER BY timestamp DESC, seq DESC
                    LIMIT ?
                    "#,
                )
                .bind(owner)
                .bind(conversation_id)
                .bind(status_code(MessageStatus::HasDeleted))
                .bind(count as i64)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Self::rows_to_messages(rows)
    }

    /// 关键字检索（只匹配可检索文本），`conversation_id` 为空检索全部会话
    pub async fn search(
        &self,
        owner: &str,
        conversation_id: Option<&str>,
        keyword: &str,
        count: usize,
    ) -> Result<Vec<Message>> {
        let pattern = format!("%{}%", keyword);
        let rows = match conversation_id {
            Some(conv) => {
                sqlx::query(
                    r#"
                    SELECT data FROM local_chat_logs
                    WHERE owner_user_id = ? AND conversation_id = ? AND text_content LIKE ?
                      AND status NOT IN (?, ?)
                    ORDER BY timestamp DESC, seq DESC
                    LIMIT ?
                    "#,
                )
                .bind(owner)
                .bind(conv)
                .bind(pattern)
                .bind(status_code(MessageStatus::Revoked))
                .bind(status_code(MessageStatus::HasDeleted))
                .bind(count as i64)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT data FROM local_chat_logs
                    WHERE owner_user_id = ? AND text_content LIKE ? AND status NOT IN (?, ?)
                    ORDER BY timestamp DESC, seq DESC
                    LIMIT ?
                    "#,
                )
                .bind(owner)
                .bind(pattern)
                .bind(status_code(MessageStatus::Revoked))
                .bind(status_code(MessageStatus::HasDeleted))
                .bind(count as i64)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Self::rows_to_messages(rows)
    }

    /// 会话内未读的他人消息
    pub async fn unread_from_others(
        &self,
        owner: &str,
        conversation_id: &str,
    ) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            r#"
            SELECT data FROM local_chat_logs
            WHERE owner_user_id = ? AND conversation_id = ? AND status != ?
            ORDER BY timestamp DESC, seq DESC
            "#,
        )
        .bind(owner)
        .bind(conversation_id)
        .bind(status_code(MessageStatus::HasDeleted))
        .fetch_all(&self.pool)
        .await?;
        Ok(Self::rows_to_messages(rows)?
            .into_iter()
            .filter(|m| !m.is_read && m.sender != owner)
            .collect())
    }

    /// 标记为已删除，行保留在表中；返回本次新标记的条数
    pub async fn mark_deleted(&self, owner: &str, ids: &[String]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = Self::placeholders(ids.len());
        let sql = format!(
            "UPDATE local_chat_logs SET status = ?, data = json_set(data, '$.status', ?) \
             WHERE owner_user_id = ? AND status != ? AND client_msg_id IN ({placeholders})"
        );
        let deleted = status_code(MessageStatus::HasDeleted);
        let mut query = sqlx::query(&sql)
            .bind(deleted)
            .bind(status_name(MessageStatus::HasDeleted)?)
            .bind(owner)
            .bind(deleted);
        for id in ids {
            query = query.bind(id);
        }
        let res = query.execute(&self.pool).await?;
        Ok(res.rows_affected())
    }

    pub async fn delete_conversation(&self, owner: &str, conversation_id: &str) -> Result<u64> {
        let res = sqlx::query(
            "DELETE FROM local_chat_logs WHERE owner_user_id = ? AND conversation_id = ?",
        )
        .bind(owner)
        .bind(conversation_id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("清空会话消息失败: {conversation_id}"))?;
        Ok(res.rows_affected())
    }
}

/// 状态在 JSON 中的序列化形式
fn status_name(status: MessageStatus) -> Result<String> {
    match serde_json::to_value(status).context("序列化消息状态失败")? {
        serde_json::Value::String(name) => Ok(name),
        other => anyhow::bail!("消息状态序列化结果异常: {other}"),
    }
}

fn status_code(status: MessageStatus) -> i32 {
    match status {
        MessageStatus::Created => 0,
        MessageStatus::Sending => 1,
        MessageStatus::SendSucc => 2,
        MessageStatus::SendFail => 3,
        MessageStatus::HasDeleted => 4,
        MessageStatus::Revoked => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::im::db::create_sqlite_pool_with_migration;
    use crate::im::message::types::{MessageContent, TextElem};

    fn text(id: &str, conv: &str, ts: i64, seq: i64, body: &str) -> Message {
        let mut m = Message::new(
            id.into(),
            "bob",
            MessageContent::Text(TextElem {
                text: body.into(),
                at_user_list: vec![],
            }),
            ts,
        );
        m.conversation_id = conv.into();
        m.seq = seq;
        m.msg_id = format!("srv-{id}");
        m
    }

    #[tokio::test]
    async fn history_pages_backwards_and_isolates_owners() {
        let pool = create_sqlite_pool_with_migration("sqlite::memory:", 1)
            .await
            .unwrap();
        let dao = MessageDao::new(pool);
        for i in 1..=5 {
            dao.upsert("alice", &text(&format!("m{i}"), "c2c_bob", 100, i, "hello"))
                .await
                .unwrap();
        }
        dao.upsert("carol", &text("x", "c2c_bob", 100, 9, "hello"))
            .await
            .unwrap();

        let page = dao.history("alice", "c2c_bob", None, 2).await.unwrap();
        let ids: Vec<_> = page.iter().map(|m| m.client_msg_id.as_str()).collect();
        assert_eq!(ids, vec!["m5", "m4"]);

        let next = dao
            .history("alice", "c2c_bob", Some(page[1].cursor()), 10)
            .await
            .unwrap();
        assert_eq!(next.len(), 3);
        assert_eq!(next[0].client_msg_id, "m3");

        let found = dao
            .find_by_ids("alice", &["srv-m2".into(), "m1".into()])
            .await
            .unwrap();
        assert_eq!(found.len(), 2);

        assert_eq!(
            dao.delete_conversation("alice", "c2c_bob").await.unwrap(),
            5
        );
        assert!(dao.get_by_client_msg_id("carol", "x").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn search_matches_text_content() {
        let pool = create_sqlite_pool_with_migration("sqlite::memory:", 1)
            .await
            .unwrap();
        let dao = MessageDao::new(pool);
        dao.upsert("alice", &text("a", "c2c_bob", 1, 1, "lunch at noon?"))
            .await
            .unwrap();
        dao.upsert("alice", &text("b", "group_g1", 2, 1, "no lunch today"))
            .await
            .unwrap();
        dao.upsert("alice", &text("c", "group_g1", 3, 2, "meeting"))
            .await
            .unwrap();

        assert_eq!(dao.search("alice", None, "lunch", 10).await.unwrap().len(), 2);
        let in_group = dao
            .search("alice", Some("group_g1"), "lunch", 10)
            .await
            .unwrap();
        assert_eq!(in_group.len(), 1);
        assert_eq!(in_group[0].client_msg_id, "b");
    }

    #[tokio::test]
    async fn marked_rows_are_hidden_but_kept() {
        let pool = create_sqlite_pool_with_migration("sqlite::memory:", 1)
            .await
            .unwrap();
        let dao = MessageDao::new(pool);
        for (i, body) in ["keep lunch", "drop lunch"].iter().enumerate() {
            let mut m = text(&format!("m{i}"), "c2c_bob", 100 + i as i64, 1, body);
            m.status = MessageStatus::SendSucc;
            dao.upsert("alice", &m).await.unwrap();
        }

        assert_eq!(dao.mark_deleted("alice", &["m1".into()]).await.unwrap(), 1);
        // 重复标记不计数
        assert_eq!(dao.mark_deleted("alice", &["m1".into()]).await.unwrap(), 0);

        let history = dao.history("alice", "c2c_bob", None, 10).await.unwrap();
        let ids: Vec<_> = history.iter().map(|m| m.client_msg_id.as_str()).collect();
        assert_eq!(ids, vec!["m0"]);
        assert_eq!(dao.search("alice", None, "lunch", 10).await.unwrap().len(), 1);
        assert!(dao
            .find_by_ids("alice", &["srv-m1".into()])
            .await
            .unwrap()
            .is_empty());
        assert_eq!(dao.unread_from_others("alice", "c2c_bob").await.unwrap().len(), 1);

        let row = dao.get_by_client_msg_id("alice", "m1").await.unwrap().unwrap();
        assert_eq!(row.status, MessageStatus::HasDeleted);
        assert_eq!(dao.delete_conversation("alice", "c2c_bob").await.unwrap(), 2);
    }
}
