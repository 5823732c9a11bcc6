pub mod auth;
pub mod cors;
pub mod validation;

pub use auth::{require_admin, Actor};
pub use cors::create_cors_layer;
pub use validation::ValidatedJson;
