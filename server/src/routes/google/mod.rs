//! Browser-facing Google authorization routes and the per-client status API.

mod auth;
mod callback;
mod tokens;
mod utils;

pub use auth::*;
pub use callback::*;
pub use tokens::*;
pub use utils::*;
