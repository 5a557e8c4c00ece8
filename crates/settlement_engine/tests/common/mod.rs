//! Shared harness: an engine over the in-memory store with a recording
//! audit sink and the standard partner directory.

#![allow(dead_code)]

use std::sync::Arc;

use core_kernel::MemoryAuditSink;
use domain_ledger::GlAccount;
use domain_settlement::StaticDirectory;
use settlement_engine::{Engine, EngineConfig, InMemoryStore};

pub struct Harness {
    pub engine: Engine,
    pub audit: Arc<MemoryAuditSink>,
}

impl Harness {
    /// Engine with default configuration and the standard chart seeded
    pub async fn seeded() -> Self {
        Self::with_config(EngineConfig::default()).await
    }

    pub async fn with_config(config: EngineConfig) -> Self {
        let audit = Arc::new(MemoryAuditSink::new());
        let engine = Engine::new(
            &config,
            Arc::new(InMemoryStore::new()),
            audit.clone(),
            Arc::new(StaticDirectory::standard()),
        )
        .expect("default configuration is valid");
        engine
            .accounts
            .seed_standard_chart("bootstrap")
            .await
            .expect("seeding an empty store succeeds");
        Self { engine, audit }
    }

    pub async fn accounts(&self) -> Vec<GlAccount> {
        self.engine.accounts.list().await.expect("listing accounts succeeds")
    }

    pub async fn balance(&self, code: &str) -> i64 {
        self.engine
            .accounts
            .lookup(code)
            .await
            .expect("account exists")
            .balance()
            .cents()
    }
}
