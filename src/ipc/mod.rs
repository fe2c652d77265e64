mod error;
mod handlers;
mod helpers;
mod router;
mod types;

pub use helpers::flush_autosave;
pub use router::handle_request;
pub use types::{AppState, Request};
