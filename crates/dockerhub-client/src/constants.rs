//! Docker Hub endpoints and header names
//!
//! The probe targets Docker's public `ratelimitpreview/test` repository, which
//! exists solely so clients can read their quota headers.

/// Token endpoint issuing pull-scoped bearer tokens for the preview repository
pub const TOKEN_ENDPOINT: &str = "https://auth.docker.io/token?service=registry.docker.io&scope=repository:ratelimitpreview/test:pull";

/// Manifest URL probed with HEAD. A HEAD request returns the quota headers
/// without counting as a pull; GET would consume one unit of the quota.
pub const LIMITS_ENDPOINT: &str =
    "https://registry-1.docker.io/v2/ratelimitpreview/test/manifests/latest";

/// Total pulls allowed in the window, formatted `<int>;w=<window-seconds>`
pub const RATELIMIT_LIMIT_HEADER: &str = "ratelimit-limit";

/// Pulls left in the window, formatted `<int>;w=<window-seconds>`
pub const RATELIMIT_REMAINING_HEADER: &str = "ratelimit-remaining";

/// Address the registry attributes the quota to
pub const RATELIMIT_SOURCE_HEADER: &str = "docker-ratelimit-source";

/// Display name used for the unauthenticated account
pub const ANONYMOUS_DISPLAY_NAME: &str = "Anonymous";
