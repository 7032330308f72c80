/*!
Orchestration of the manager's actions and their collaborators
*/

pub mod config;
pub mod notifier;
pub mod orchestrator;
pub mod system;
