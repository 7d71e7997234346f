mod setups;
mod steps;
mod workflow_world;

pub use workflow_world::WorkflowWorld;
