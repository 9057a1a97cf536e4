/// Middleware for the API server
///
/// - `security`: response security headers
/// - `rate_limit`: per-user token bucket on authenticated routes

pub mod rate_limit;
pub mod security;
