mod auth;

pub use auth::{api_key_middleware, check_api_key};
