//! SQL DDL for the client state table.

/// One row per namespace:
/// - `namespace` TEXT PRIMARY KEY, e.g. `ocr-platform.tokens`
/// - `payload` JSON document serialized as text
/// - `updated_at` RFC3339 timestamp of the last write
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS client_state (
    namespace TEXT PRIMARY KEY NOT NULL,
    payload TEXT NOT NULL,
    updated_at TEXT NOT NULL -- RFC3339
);
"#;
