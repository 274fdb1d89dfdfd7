// Local host for the agent: lifecycle registration and the HTTP front.

pub mod handler;
pub mod registration;
