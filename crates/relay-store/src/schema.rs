/// SQL DDL for the relay-store database.
/// WAL mode + foreign keys enabled at connection time.
pub const SCHEMA_VERSION: u32 = 1;

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS vendors (
    id TEXT PRIMARY KEY,
    postal_code TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    status TEXT NOT NULL DEFAULT 'waiting',
    assigned_vendor_id TEXT,
    destination_postal_code TEXT NOT NULL,
    created_at TEXT NOT NULL,
    accepted_at TEXT,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS vendor_current_location (
    vendor_id TEXT PRIMARY KEY,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    accuracy REAL,
    speed REAL,
    heading REAL,
    recorded_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS vendor_location_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    vendor_id TEXT NOT NULL,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    accuracy REAL,
    speed REAL,
    heading REAL,
    recorded_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS vendor_job_rejections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    vendor_id TEXT NOT NULL,
    job_id TEXT NOT NULL,
    reason TEXT NOT NULL,
    rejected_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jobs_status_zone ON jobs(status, destination_postal_code);
CREATE INDEX IF NOT EXISTS idx_jobs_assigned_vendor ON jobs(assigned_vendor_id);
CREATE INDEX IF NOT EXISTS idx_history_vendor_time ON vendor_location_history(vendor_id, recorded_at);
CREATE INDEX IF NOT EXISTS idx_rejections_job ON vendor_job_rejections(job_id);
CREATE INDEX IF NOT EXISTS idx_rejections_vendor ON vendor_job_rejections(vendor_id);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
"#;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;
