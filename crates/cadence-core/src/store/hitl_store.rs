use chrono::Utc;
use rusqlite::OptionalExtension;
use serde_json::Value;

use crate::db::Database;
use crate::error::EngineError;
use crate::models::hitl::{HitlPosition, HitlRequest, HitlRequestStatus};

#[derive(Clone)]
pub struct HitlRequestStore {
    db: Database,
}

impl HitlRequestStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn save(&self, request: &HitlRequest) -> Result<(), EngineError> {
        let r = request.clone();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO hitl_requests
                       (id, execution_id, sequence_key, step_index, position, prompt,
                        request_type, options, default_value, status, response,
                        execution_context, expires_at, created_at, resolved_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                     ON CONFLICT(id) DO UPDATE SET
                       status = excluded.status,
                       response = excluded.response,
                       resolved_at = excluded.resolved_at",
                    rusqlite::params![
                        r.id,
                        r.execution_id,
                        r.sequence_key,
                        r.step_index as i64,
                        r.position.as_str(),
                        r.prompt,
                        r.request_type,
                        serde_json::to_string(&r.options).unwrap_or_else(|_| "[]".to_string()),
                        r.default_value.as_ref().map(|v| v.to_string()),
                        r.status.as_str(),
                        r.response.as_ref().map(|v| v.to_string()),
                        r.execution_context.to_string(),
                        r.expires_at.timestamp_millis(),
                        r.created_at.timestamp_millis(),
                        r.resolved_at.map(|t| t.timestamp_millis()),
                    ],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn get(&self, request_id: &str) -> Result<Option<HitlRequest>, EngineError> {
        let id = request_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, execution_id, sequence_key, step_index, position, prompt,
                            request_type, options, default_value, status, response,
                            execution_context, expires_at, created_at, resolved_at
                     FROM hitl_requests WHERE id = ?1",
                )?;
                stmt.query_row(rusqlite::params![id], |row| Ok(row_to_request(row)))
                    .optional()
            })
            .await
    }

    pub async fn pending_for_execution(
        &self,
        execution_id: &str,
    ) -> Result<Vec<HitlRequest>, EngineError> {
        let exec_id = execution_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, execution_id, sequence_key, step_index, position, prompt,
                            request_type, options, default_value, status, response,
                            execution_context, expires_at, created_at, resolved_at
                     FROM hitl_requests
                     WHERE execution_id = ?1 AND status = 'pending'
                     ORDER BY created_at ASC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![exec_id], |row| Ok(row_to_request(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// One-shot resolution: flips `pending → resolved` and records the
    /// response. Guarded on the current status so a request can only be
    /// resolved once; a second attempt is a `Conflict`.
    pub async fn resolve(
        &self,
        request_id: &str,
        response: &Value,
    ) -> Result<(), EngineError> {
        let id = request_id.to_string();
        let response_str = response.to_string();
        let now = Utc::now().timestamp_millis();
        let affected = self
            .db
            .with_conn_async(move |conn| {
                conn.execute(
                    "UPDATE hitl_requests
                     SET status = 'resolved', response = ?1, resolved_at = ?2
                     WHERE id = ?3 AND status = 'pending'",
                    rusqlite::params![response_str, now, id],
                )
            })
            .await?;

        if affected == 0 {
            return Err(EngineError::Conflict(format!(
                "HITL request {} is not pending (already resolved or unknown)",
                request_id
            )));
        }
        Ok(())
    }
}

use rusqlite::Row;

fn row_to_request(row: &Row<'_>) -> HitlRequest {
    let options: String = row.get(7).unwrap_or_default();
    let default_value: Option<String> = row.get(8).unwrap_or(None);
    let response: Option<String> = row.get(10).unwrap_or(None);
    let context: String = row.get(11).unwrap_or_default();
    let expires_ms: i64 = row.get(12).unwrap_or(0);
    let created_ms: i64 = row.get(13).unwrap_or(0);
    let resolved_ms: Option<i64> = row.get(14).unwrap_or(None);

    HitlRequest {
        id: row.get(0).unwrap_or_default(),
        execution_id: row.get(1).unwrap_or_default(),
        sequence_key: row.get(2).unwrap_or_default(),
        step_index: row.get::<_, i64>(3).unwrap_or(0) as usize,
        position: HitlPosition::from_str(&row.get::<_, String>(4).unwrap_or_default()),
        prompt: row.get(5).unwrap_or_default(),
        request_type: row.get(6).unwrap_or_default(),
        options: serde_json::from_str(&options).unwrap_or_default(),
        default_value: default_value.and_then(|s| serde_json::from_str(&s).ok()),
        status: HitlRequestStatus::from_str(&row.get::<_, String>(9).unwrap_or_default()),
        response: response.and_then(|s| serde_json::from_str(&s).ok()),
        execution_context: serde_json::from_str(&context)
            .unwrap_or(Value::Object(Default::default())),
        expires_at: chrono::DateTime::from_timestamp_millis(expires_ms).unwrap_or_else(Utc::now),
        created_at: chrono::DateTime::from_timestamp_millis(created_ms).unwrap_or_else(Utc::now),
        resolved_at: resolved_ms.and_then(chrono::DateTime::from_timestamp_millis),
    }
}
