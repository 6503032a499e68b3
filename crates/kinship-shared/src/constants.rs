/// Durable key holding the active identity index (decimal string)
pub const KEY_SELECTED_PROFILE: &str = "selectedProfile";

/// Durable key holding the cached identity list (JSON array)
pub const KEY_PROFILES: &str = "profiles";

/// Durable keys holding authentication tokens
pub const KEY_ACCESS_TOKEN: &str = "accessToken";
pub const KEY_REFRESH_TOKEN: &str = "refreshToken";

/// Relationship cache time-to-live in seconds
pub const DEFAULT_RELATIONSHIP_TTL_SECS: u64 = 45;

/// Extra attempts for a failed follow/unfollow before rolling back
pub const DEFAULT_MUTATION_RETRIES: u32 = 1;

/// Capacity of the session event broadcast channel
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Default graph API endpoint
pub const DEFAULT_API_URL: &str = "http://localhost:8080";
