// Network capability: the trait the controller fetches through, plus the HTTP backend.

pub mod http_source;
pub mod traits;
