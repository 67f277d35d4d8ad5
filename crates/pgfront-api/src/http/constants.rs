//! Shared HTTP constants (headers, problem URIs, pagination defaults).

pub(crate) const HEADER_SETUP_TOKEN: &str = "x-pgfront-setup-token";
pub(crate) const HEADER_API_KEY: &str = "x-pgfront-api-key";
pub(crate) const HEADER_API_KEY_LEGACY: &str = "x-api-key";
pub(crate) const HEADER_REQUEST_ID: &str = "x-request-id";
pub(crate) const HEADER_LAST_EVENT_ID: &str = "last-event-id";
pub(crate) const HEADER_PREFER: &str = "prefer";
pub(crate) const HEADER_CONTENT_RANGE: &str = "content-range";
pub(crate) const HEADER_AFFECTED_COUNT: &str = "x-affected-count";
pub(crate) const HEADER_RATE_LIMIT_LIMIT: &str = "x-ratelimit-limit";
pub(crate) const HEADER_RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub(crate) const HEADER_RATE_LIMIT_RESET: &str = "x-ratelimit-reset";
pub(crate) const SSE_KEEP_ALIVE_SECS: u64 = 20;
pub(crate) const API_KEY_TTL_DAYS: i64 = 14;

pub(crate) const PROBLEM_INTERNAL: &str = "https://pgfront.dev/problems/internal";
pub(crate) const PROBLEM_UNAUTHORIZED: &str = "https://pgfront.dev/problems/unauthorized";
pub(crate) const PROBLEM_BAD_REQUEST: &str = "https://pgfront.dev/problems/bad-request";
pub(crate) const PROBLEM_CONFLICT: &str = "https://pgfront.dev/problems/conflict";
pub(crate) const PROBLEM_CONFIG_INVALID: &str = "https://pgfront.dev/problems/config-invalid";
pub(crate) const PROBLEM_ENV_OVERRIDE: &str = "https://pgfront.dev/problems/env-override";
pub(crate) const PROBLEM_SETUP_REQUIRED: &str = "https://pgfront.dev/problems/setup-required";
pub(crate) const PROBLEM_SERVICE_UNAVAILABLE: &str =
    "https://pgfront.dev/problems/service-unavailable";
pub(crate) const PROBLEM_NOT_FOUND: &str = "https://pgfront.dev/problems/not-found";
pub(crate) const PROBLEM_RATE_LIMITED: &str = "https://pgfront.dev/problems/rate-limited";
pub(crate) const PROBLEM_PAYLOAD_TOO_LARGE: &str =
    "https://pgfront.dev/problems/payload-too-large";
pub(crate) const PROBLEM_PRECONDITION_FAILED: &str =
    "https://pgfront.dev/problems/precondition-failed";
pub(crate) const PROBLEM_GONE: &str = "https://pgfront.dev/problems/gone";
pub(crate) const PROBLEM_UNPROCESSABLE: &str = "https://pgfront.dev/problems/unprocessable";

pub(crate) const MAX_BATCH_RECORD_BYTES: usize = 5 * 1024 * 1024;
pub(crate) const DEFAULT_PAGE_SIZE: usize = 50;
pub(crate) const MAX_PAGE_SIZE: usize = 200;
pub(crate) const EVENT_KIND_WHITELIST: &[&str] = &[
    "schema_reloaded",
    "settings_changed",
    "upload_session_changed",
    "health_changed",
    "signed_url_rejected",
];
