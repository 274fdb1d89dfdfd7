pub mod agent_api;
pub mod simple;
