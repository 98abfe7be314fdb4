//! Shared engine state wiring stores and clients together.

use std::sync::Arc;

use crate::config::RemoteConfig;
use crate::db::Database;
use crate::engine::{HitlGate, SequenceEngine, StepExecutor};
use crate::notify::Notifier;
use crate::remote::SkillClient;
use crate::store::{ExecutionStore, HitlRequestStore, MessageStore};

/// Shared state for CLI commands and embedders.
pub struct EngineStateInner {
    pub db: Database,
    pub config: RemoteConfig,
    pub execution_store: ExecutionStore,
    pub hitl_store: HitlRequestStore,
    pub message_store: MessageStore,
    pub skill_client: SkillClient,
    pub notifier: Notifier,
}

pub type EngineState = Arc<EngineStateInner>;

impl EngineStateInner {
    pub fn new(db: Database, config: RemoteConfig) -> Self {
        Self {
            execution_store: ExecutionStore::new(db.clone()),
            hitl_store: HitlRequestStore::new(db.clone()),
            message_store: MessageStore::new(db.clone()),
            skill_client: SkillClient::new(config.clone()),
            notifier: Notifier::new(&config),
            db,
            config,
        }
    }

    /// Assemble a ready-to-run sequence engine over this state.
    pub fn sequence_engine(&self) -> SequenceEngine {
        let gate = HitlGate::new(
            self.hitl_store.clone(),
            self.execution_store.clone(),
            self.notifier.clone(),
        );
        SequenceEngine::new(
            self.execution_store.clone(),
            gate,
            StepExecutor::new(self.skill_client.clone()),
            self.skill_client.clone(),
        )
    }
}
