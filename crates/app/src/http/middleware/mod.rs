pub mod admin_auth;
pub mod query_limit;
