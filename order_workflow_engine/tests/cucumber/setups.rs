use cucumber::given;

use crate::cucumber::{workflow_world::WorkflowSystem, WorkflowWorld};

#[given("a fresh install")]
async fn fresh_database(world: &mut WorkflowWorld) {
    let system = WorkflowSystem::new(3).await;
    world.system = Some(system);
}

#[given(expr = "a fresh install that retries tasks {int} time(s)")]
async fn fresh_database_with_retries(world: &mut WorkflowWorld, retries: u32) {
    let system = WorkflowSystem::new(retries).await;
    world.system = Some(system);
}
