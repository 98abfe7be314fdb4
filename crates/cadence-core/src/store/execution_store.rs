use chrono::Utc;
use rusqlite::OptionalExtension;
use serde_json::Value;

use crate::db::Database;
use crate::error::EngineError;
use crate::models::execution::{ExecutionStatus, SequenceExecution, StepResult};

#[derive(Clone)]
pub struct ExecutionStore {
    db: Database,
}

impl ExecutionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn save(&self, execution: &SequenceExecution) -> Result<(), EngineError> {
        let e = execution.clone();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO sequence_executions
                       (id, sequence_key, organization_id, user_id, status, input_context,
                        is_simulation, mock_data_used, step_results, final_output,
                        error_message, failed_step_index, hitl_request_id, created_at, completed_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                     ON CONFLICT(id) DO UPDATE SET
                       status = excluded.status,
                       step_results = excluded.step_results,
                       final_output = excluded.final_output,
                       error_message = excluded.error_message,
                       failed_step_index = excluded.failed_step_index,
                       hitl_request_id = excluded.hitl_request_id,
                       completed_at = excluded.completed_at",
                    rusqlite::params![
                        e.id,
                        e.sequence_key,
                        e.organization_id,
                        e.user_id,
                        e.status.as_str(),
                        e.input_context.to_string(),
                        e.is_simulation as i64,
                        e.mock_data_used.as_ref().map(|v| v.to_string()),
                        serde_json::to_string(&e.step_results).unwrap_or_else(|_| "[]".to_string()),
                        e.final_output.as_ref().map(|v| v.to_string()),
                        e.error_message,
                        e.failed_step_index.map(|i| i as i64),
                        e.hitl_request_id,
                        e.created_at.timestamp_millis(),
                        e.completed_at.map(|t| t.timestamp_millis()),
                    ],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn get(&self, execution_id: &str) -> Result<Option<SequenceExecution>, EngineError> {
        let id = execution_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, sequence_key, organization_id, user_id, status, input_context,
                            is_simulation, mock_data_used, step_results, final_output,
                            error_message, failed_step_index, hitl_request_id, created_at, completed_at
                     FROM sequence_executions WHERE id = ?1",
                )?;
                stmt.query_row(rusqlite::params![id], |row| Ok(row_to_execution(row)))
                    .optional()
            })
            .await
    }

    pub async fn update_status(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
    ) -> Result<(), EngineError> {
        let id = execution_id.to_string();
        let status_str = status.as_str().to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "UPDATE sequence_executions SET status = ?1 WHERE id = ?2",
                    rusqlite::params![status_str, id],
                )?;
                Ok(())
            })
            .await
    }

    /// Suspend an execution on a fired gate, keeping the request back-reference
    /// and the step results produced so far.
    pub async fn mark_waiting_hitl(
        &self,
        execution_id: &str,
        hitl_request_id: &str,
        step_results: &[StepResult],
    ) -> Result<(), EngineError> {
        let id = execution_id.to_string();
        let request_id = hitl_request_id.to_string();
        let results =
            serde_json::to_string(step_results).unwrap_or_else(|_| "[]".to_string());
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "UPDATE sequence_executions
                     SET status = 'waiting_hitl', hitl_request_id = ?1, step_results = ?2
                     WHERE id = ?3",
                    rusqlite::params![request_id, results, id],
                )?;
                Ok(())
            })
            .await
    }

    /// Persist a terminal (or resumed-terminal) state in one write.
    pub async fn finalize(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        step_results: &[StepResult],
        final_output: Option<&Value>,
        error_message: Option<&str>,
        failed_step_index: Option<usize>,
    ) -> Result<(), EngineError> {
        let id = execution_id.to_string();
        let status_str = status.as_str().to_string();
        let results =
            serde_json::to_string(step_results).unwrap_or_else(|_| "[]".to_string());
        let output = final_output.map(|v| v.to_string());
        let error = error_message.map(|s| s.to_string());
        let failed_index = failed_step_index.map(|i| i as i64);
        let now = Utc::now().timestamp_millis();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "UPDATE sequence_executions
                     SET status = ?1, step_results = ?2, final_output = ?3,
                         error_message = ?4, failed_step_index = ?5,
                         hitl_request_id = NULL, completed_at = ?6
                     WHERE id = ?7",
                    rusqlite::params![status_str, results, output, error, failed_index, now, id],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn list_recent(
        &self,
        organization_id: &str,
        limit: u32,
    ) -> Result<Vec<SequenceExecution>, EngineError> {
        let org = organization_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, sequence_key, organization_id, user_id, status, input_context,
                            is_simulation, mock_data_used, step_results, final_output,
                            error_message, failed_step_index, hitl_request_id, created_at, completed_at
                     FROM sequence_executions
                     WHERE organization_id = ?1
                     ORDER BY created_at DESC LIMIT ?2",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![org, limit], |row| {
                        Ok(row_to_execution(row))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }
}

use rusqlite::Row;

fn row_to_execution(row: &Row<'_>) -> SequenceExecution {
    let input_context: String = row.get(5).unwrap_or_default();
    let mock_data: Option<String> = row.get(7).unwrap_or(None);
    let step_results: String = row.get(8).unwrap_or_default();
    let final_output: Option<String> = row.get(9).unwrap_or(None);
    let created_ms: i64 = row.get(13).unwrap_or(0);
    let completed_ms: Option<i64> = row.get(14).unwrap_or(None);

    SequenceExecution {
        id: row.get(0).unwrap_or_default(),
        sequence_key: row.get(1).unwrap_or_default(),
        organization_id: row.get(2).unwrap_or_default(),
        user_id: row.get(3).unwrap_or_default(),
        status: ExecutionStatus::from_str(&row.get::<_, String>(4).unwrap_or_default()),
        input_context: serde_json::from_str(&input_context)
            .unwrap_or(Value::Object(Default::default())),
        is_simulation: row.get::<_, i64>(6).unwrap_or(0) != 0,
        mock_data_used: mock_data.and_then(|s| serde_json::from_str(&s).ok()),
        step_results: serde_json::from_str(&step_results).unwrap_or_default(),
        final_output: final_output.and_then(|s| serde_json::from_str(&s).ok()),
        error_message: row.get(10).unwrap_or(None),
        failed_step_index: row
            .get::<_, Option<i64>>(11)
            .unwrap_or(None)
            .map(|i| i as usize),
        hitl_request_id: row.get(12).unwrap_or(None),
        created_at: chrono::DateTime::from_timestamp_millis(created_ms).unwrap_or_else(Utc::now),
        completed_at: completed_ms.and_then(chrono::DateTime::from_timestamp_millis),
    }
}
