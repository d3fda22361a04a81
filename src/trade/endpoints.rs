//! Trade API endpoint definitions.

/// Base URL of the official website.
pub const POE_BASE_URL: &str = "https://www.pathofexile.com";

/// League used when none is configured.
pub const DEFAULT_LEAGUE: &str = "Standard";

/// Path segments of the search endpoint, followed by the league.
pub const SEARCH_PATH: [&str; 3] = ["api", "trade", "search"];

/// Path segments of the fetch endpoint, followed by the comma-joined ids.
pub const FETCH_PATH: [&str; 3] = ["api", "trade", "fetch"];

/// Maximum number of item ids the fetch endpoint accepts per call.
pub const FETCH_BATCH_SIZE: usize = 10;
