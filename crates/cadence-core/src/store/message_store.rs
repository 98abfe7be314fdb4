use chrono::Utc;
use serde_json::Value;

use crate::db::Database;
use crate::error::EngineError;
use crate::models::chat::{ChatMessage, Role};

#[derive(Clone)]
pub struct MessageStore {
    db: Database,
}

impl MessageStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn save(
        &self,
        conversation_id: &str,
        message: &ChatMessage,
    ) -> Result<(), EngineError> {
        let conv = conversation_id.to_string();
        let m = message.clone();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO chat_messages
                       (id, conversation_id, role, content, tool_calls, structured_response, timestamp)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(id) DO UPDATE SET
                       content = excluded.content,
                       tool_calls = excluded.tool_calls,
                       structured_response = excluded.structured_response",
                    rusqlite::params![
                        m.id,
                        conv,
                        m.role.as_str(),
                        m.content,
                        serde_json::to_string(&m.tool_calls).unwrap_or_else(|_| "[]".to_string()),
                        m.structured_response.as_ref().map(|v| v.to_string()),
                        m.timestamp.timestamp_millis(),
                    ],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn list_by_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<ChatMessage>, EngineError> {
        let conv = conversation_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, role, content, tool_calls, structured_response, timestamp
                     FROM chat_messages WHERE conversation_id = ?1 ORDER BY timestamp ASC, rowid ASC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![conv], |row| {
                        let tool_calls: String = row.get(3).unwrap_or_default();
                        let structured: Option<String> = row.get(4).unwrap_or(None);
                        let ts_ms: i64 = row.get(5).unwrap_or(0);
                        Ok(ChatMessage {
                            id: row.get(0).unwrap_or_default(),
                            role: Role::from_str(&row.get::<_, String>(1).unwrap_or_default()),
                            content: row.get(2).unwrap_or_default(),
                            timestamp: chrono::DateTime::from_timestamp_millis(ts_ms)
                                .unwrap_or_else(Utc::now),
                            tool_calls: serde_json::from_str(&tool_calls).unwrap_or_default(),
                            is_streaming: false,
                            structured_response: structured
                                .and_then(|s| serde_json::from_str::<Value>(&s).ok()),
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<(), EngineError> {
        let conv = conversation_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "DELETE FROM chat_messages WHERE conversation_id = ?1",
                    rusqlite::params![conv],
                )?;
                Ok(())
            })
            .await
    }
}
