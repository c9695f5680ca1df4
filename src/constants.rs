// Engine tuning constants - defaults for `EngineSettings` and the config file

use std::time::Duration;

// === Event Poller ===
// Upper bound of one blocking wait; disposal waits at most twice this
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(1000);
pub const POLLER_THREAD_NAME: &str = "mpv-events";

// === Event Delivery ===
pub const DEFAULT_LOG_LEVEL: &str = "debug";
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

// === Property Observation ===
// Tokens at and above this value belong to the status tracker ("REEL" in the high bytes).
// `observe_property` rejects them.
pub const STATUS_TOKEN_BASE: u64 = 0x5245_454c_0000_0000;
