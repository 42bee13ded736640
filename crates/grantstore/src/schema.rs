//! Bucket names.
//!
//! Keys are the UTF-8 bytes of the identifying string: client id,
//! authorization code, access token, refresh token.

/// Client records keyed by client id.
pub const CLIENT: &str = "client";

/// Authorization code records keyed by code.
pub const AUTHORIZE: &str = "authorize";

/// Access token records keyed by access token.
pub const ACCESS: &str = "access";

/// Refresh token index: refresh token to access token.
pub const REFRESH: &str = "refresh";

/// Every bucket the store needs, in creation order.
pub const ALL_BUCKETS: [&str; 4] = [CLIENT, AUTHORIZE, ACCESS, REFRESH];
