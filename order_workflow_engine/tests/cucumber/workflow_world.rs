use chrono::Duration;
use cucumber::World;
use log::*;
use order_workflow_engine::{
    db_types::OrderId,
    events::EventProducers,
    test_utils::prepare_env::{create_database, random_db_path, run_migrations},
    SqliteDatabase,
    WorkflowConfig,
    WorkflowEngine,
};

#[derive(Default, Debug, World)]
pub struct WorkflowWorld {
    pub system: Option<WorkflowSystem>,
    /// The order most recently submitted in the scenario
    pub order_id: Option<OrderId>,
    pub last_error: Option<String>,
}

#[derive(Debug)]
pub struct WorkflowSystem {
    pub db_path: String,
    pub engine: WorkflowEngine<SqliteDatabase>,
}

impl WorkflowWorld {
    pub fn engine(&self) -> &WorkflowEngine<SqliteDatabase> {
        &self.system.as_ref().expect("Workflow engine not initialised").engine
    }

    pub fn order_id(&self) -> &OrderId {
        self.order_id.as_ref().expect("No order has been submitted")
    }
}

impl WorkflowSystem {
    pub async fn new(max_retries: u32) -> Self {
        let url = prepare_test_env().await;
        let db = SqliteDatabase::new_with_url(&url, 1).await.expect("Error creating connection to database");
        debug!("🚀️ Created database: {url}");
        let config = WorkflowConfig::default()
            .with_max_retries(max_retries)
            .with_retry_delay(Duration::zero())
            .with_auto_transition_delay(Duration::zero());
        let engine = WorkflowEngine::new(db, config, EventProducers::default());
        Self { db_path: url, engine }
    }
}

pub async fn prepare_test_env() -> String {
    let path = random_db_path();
    create_database(&path).await;
    run_migrations(&path).await;
    path
}
