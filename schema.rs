/// MIGRATION 0001: Initial catalog schema.
pub const MIGRATION_0001: &str = r#"
-- Photos Table: One row per absolute image path.
CREATE TABLE IF NOT EXISTS photos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE,
    file_name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    location TEXT NOT NULL,
    rotation INTEGER NOT NULL DEFAULT 0
);

-- Tags Table: Normalized tag names (years and locations).
CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

-- Photo/Tag join table.
CREATE TABLE IF NOT EXISTS photo_tags (
    photo_id INTEGER NOT NULL,
    tag_id INTEGER NOT NULL,
    FOREIGN KEY (photo_id) REFERENCES photos (id),
    FOREIGN KEY (tag_id) REFERENCES tags (id),
    UNIQUE (photo_id, tag_id)
);

-- Indexes for join lookups
CREATE INDEX IF NOT EXISTS idx_photo_tags_photo_id ON photo_tags (photo_id);
CREATE INDEX IF NOT EXISTS idx_photo_tags_tag_id ON photo_tags (tag_id);
"#;
