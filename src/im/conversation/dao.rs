//! 会话数据访问层（DAO）
//!
//! 会话以 JSON 保存在 `local_conversations.data`，会话分组单独一张表。

use crate::im::conversation::models::Conversation;
use anyhow::{Context, Result};
use sqlx::{Pool, Row, Sqlite};
use tracing::debug;

/// 会话 DAO（基于 sqlx）
#[derive(Clone)]
pub struct ConversationDao {
    db: Pool<Sqlite>,
}

impl ConversationDao {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    /// 读取某个用户的全部本地会话
    pub async fn get_all_conversations(&self, owner: &str) -> Result<Vec<Conversation>> {
        let rows = sqlx::query("SELECT data FROM local_conversations WHERE owner_user_id = ?")
            .bind(owner)
            .fetch_all(&self.db)
            .await
            .context("查询会话列表失败")?;

        let mut conversations = Vec::with_capacity(rows.len());
        for row in rows {
            let data: String = row.try_get("data")?;
            conversations.push(serde_json::from_str(&data).context("解析本地会话 JSON 失败")?);
        }
        debug!("[ConvDAO] 读取到 {} 个本地会话 (owner={})", conversations.len(), owner);
        Ok(conversations)
    }

    pub async fn upsert_conversation(&self, owner: &str, conv: &Conversation) -> Result<()> {
        let data = serde_json::to_string(conv).context("序列化会话失败")?;
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO local_conversations (owner_user_id, conversation_id, order_key, data)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(owner)
        .bind(&conv.conversation_id)
        .bind(conv.order_key as i64)
        .bind(data)
        .execute(&self.db)
        .await
        .with_context(|| format!("保存会话失败: {}", conv.conversation_id))?;
        Ok(())
    }

    pub async fn delete_conversation(&self, owner: &str, conversation_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM local_conversations WHERE owner_user_id = ? AND conversation_id = ?")
            .bind(owner)
            .bind(conversation_id)
            .execute(&self.db)
            .await
            .with_context(|| format!("删除会话失败: {conversation_id}"))?;
        Ok(())
    }

    pub async fn get_conversation_groups(&self, owner: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT group_name FROM local_conversation_groups WHERE owner_user_id = ? ORDER BY group_name",
        )
        .bind(owner)
        .fetch_all(&self.db)
        .await
        .context("查询会话分组失败")?;
        rows.into_iter()
            .map(|row| row.try_get::<String, _>("group_name").map_err(Into::into))
            .collect()
    }

    pub async fn insert_conversation_group(&self, owner: &str, name: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO local_conversation_groups (owner_user_id, group_name) VALUES (?, ?)",
        )
        .bind(owner)
        .bind(name)
        .execute(&self.db)
        .await
        .with_context(|| format!("保存会话分组失败: {name}"))?;
        Ok(())
    }

    pub async fn delete_conversation_group(&self, owner: &str, name: &str) -> Result<()> {
        sqlx::query(
            "DELETE FROM local_conversation_groups WHERE owner_user_id = ? AND group_name = ?",
        )
        .bind(owner)
        .bind(name)
        .execute(&self.db)
        .await
        .with_context(|| format!("删除会话分组失败: {name}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::im::db::create_sqlite_pool_with_migration;
    use crate::im::types::ConversationType;

    #[tokio::test]
    async fn conversations_and_groups_persist_per_owner() {
        let pool = create_sqlite_pool_with_migration("sqlite::memory:", 1)
            .await
            .unwrap();
        let dao = ConversationDao::new(pool);

        let mut conv = Conversation::new("c2c_bob".into(), ConversationType::C2C, "bob");
        conv.draft_text = Some("草稿".into());
        conv.custom_data = vec![1, 2, 3];
        dao.upsert_conversation("alice", &conv).await.unwrap();
        dao.insert_conversation_group("alice", "work").await.unwrap();
        dao.insert_conversation_group("alice", "work").await.unwrap();

        assert_eq!(dao.get_all_conversations("alice").await.unwrap(), vec![conv]);
        assert!(dao.get_all_conversations("carol").await.unwrap().is_empty());
        assert_eq!(dao.get_conversation_groups("alice").await.unwrap(), vec!["work"]);

        dao.delete_conversation("alice", "c2c_bob").await.unwrap();
        dao.delete_conversation_group("alice", "work").await.unwrap();
        assert!(dao.get_all_conversations("alice").await.unwrap().is_empty());
        assert!(dao.get_conversation_groups("alice").await.unwrap().is_empty());
    }
}
