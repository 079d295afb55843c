//! SQL migration definitions for the newsdesk database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: articles keyed by link",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per article; link is the identity key
CREATE TABLE IF NOT EXISTS articles (
    id                   TEXT PRIMARY KEY,
    link                 TEXT NOT NULL UNIQUE,
    title                TEXT NOT NULL,
    source               TEXT NOT NULL,
    domain               TEXT NOT NULL,
    published_at         TEXT NOT NULL,
    description          TEXT NOT NULL,
    image_url            TEXT NOT NULL,
    image_width          INTEGER,
    image_height         INTEGER,
    category             TEXT,
    geotag               TEXT,
    tags_json            TEXT NOT NULL DEFAULT '[]',
    description_improved TEXT,
    seo_description      TEXT,
    enrichment_status    TEXT NOT NULL DEFAULT 'pending'
        CHECK (enrichment_status IN ('pending', 'success', 'failed')),
    published            INTEGER NOT NULL DEFAULT 0,
    remote_object_id     TEXT,
    needs_sync           INTEGER NOT NULL DEFAULT 0,
    revision             INTEGER NOT NULL DEFAULT 0,
    created_at           TEXT NOT NULL,
    updated_at           TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_articles_status ON articles(enrichment_status);
CREATE INDEX IF NOT EXISTS idx_articles_publish ON articles(published, needs_sync);
CREATE INDEX IF NOT EXISTS idx_articles_source ON articles(source);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
