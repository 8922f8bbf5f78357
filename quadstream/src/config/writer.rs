//! INI serialization: `ConfigFile` → commented INI string.

use std::path::Path;

use super::file::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let p = &config.pipeline;
    format!(
        r#"[cache]
; Directory holding persisted quads as <directory>/<z>/<x>/<y>.quad
directory = {}
; Quads kept in memory. Quads the camera wants are never evicted.
ram_quads = {}
; Quads kept on the GPU, four texture slots each (at most 16383)
gpu_quads = {}
; Seconds between writes of newly loaded quads to disk
persist_interval = {}

[network]
; Quads admitted per rate interval
rate_limit = {}
rate_interval_ms = {}
; Quads fetched at the same time
max_in_flight = {}
; Seconds a quad waits for its four tiles before missing ones time out
assembly_timeout = {}
; Seconds without network before in-flight fetches are cancelled
reachability_grace = {}
; Seconds before a single HTTP request times out
http_timeout = {}
; Total attempts per failed quad when a retry is triggered (1 = never retry)
retry_attempts = {}
; Daemon tick in milliseconds
update_interval_ms = {}

[source]
; Tile URL with {{z}}, {{x}} and {{y}} placeholders
url = {}
; Row numbering of the server:
;   xyz - row 0 at the north edge (slippy map)
;   tms - row 0 at the south edge
scheme = {}
"#,
        path_to_string(&p.cache_directory),
        p.ram_quad_limit,
        p.gpu_quad_limit,
        p.persist_interval.as_secs(),
        p.rate_limit,
        p.rate_interval.as_millis(),
        p.max_in_flight,
        p.assembly_timeout.as_secs(),
        p.reachability_grace.as_secs(),
        p.http_timeout.as_secs(),
        p.retry_policy.max_attempts(),
        p.update_interval.as_millis(),
        p.url_template,
        p.scheme.as_str(),
    )
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
