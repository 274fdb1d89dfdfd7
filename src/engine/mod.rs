// Cache lifecycle: signals, cache helpers, eager population and the controller.

pub mod cache;
pub mod controller;
pub mod events;
pub mod precache;
pub mod stats;
