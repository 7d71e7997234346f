//! # Order workflow worker
//!
//! The worker is the long-running process that drives the order workflow. It
//! * reads its configuration from the environment (see [config](config/index.html)),
//! * prepares the database and recovers tasks that a previous run left half-done,
//! * runs the dispatcher, which executes due workflow tasks on a fixed poll interval,
//! * logs every committed order change and permanent task failure through the engine's event hooks.
pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod hooks;
pub mod worker;
