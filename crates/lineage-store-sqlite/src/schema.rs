//! SQL schema for the Lineage SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`. The read-model tables must stay in step with the
//! column lists in [`crate::tables`]; a test checks that they do.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- ── Event log ───────────────────────────────────────────────────────────────

CREATE TABLE IF NOT EXISTS streams (
    stream_id   TEXT PRIMARY KEY,
    stream_type TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

-- Strictly append-only. No UPDATE or DELETE is ever issued against this
-- table. AUTOINCREMENT keeps positions from being reused.
CREATE TABLE IF NOT EXISTS events (
    position    INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id    TEXT    NOT NULL UNIQUE,
    stream_id   TEXT    NOT NULL REFERENCES streams(stream_id),
    stream_type TEXT    NOT NULL,
    version     INTEGER NOT NULL CHECK (version >= 1),
    event_type  TEXT    NOT NULL,
    payload     BLOB    NOT NULL,
    metadata    TEXT,              -- JSON or NULL
    recorded_at TEXT    NOT NULL,  -- RFC 3339 UTC, fixed-width microseconds
    UNIQUE (stream_id, version)
);

CREATE INDEX IF NOT EXISTS events_recorded_idx ON events(recorded_at);
CREATE INDEX IF NOT EXISTS events_type_idx     ON events(event_type);

CREATE TABLE IF NOT EXISTS snapshots (
    snapshot_id TEXT PRIMARY KEY,
    name        TEXT    NOT NULL,
    description TEXT,
    position    INTEGER NOT NULL,
    created_at  TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS projection_checkpoints (
    name       TEXT PRIMARY KEY,
    position   INTEGER NOT NULL,
    updated_at TEXT    NOT NULL
);

-- ── Read model ──────────────────────────────────────────────────────────────
-- Every table below is derived from the log and may be dropped and rebuilt.
-- No foreign keys: rows for different aggregates are projected independently.

CREATE TABLE IF NOT EXISTS persons (
    id              TEXT PRIMARY KEY,
    given_name      TEXT,
    surname         TEXT,
    name_prefix     TEXT,
    name_suffix     TEXT,
    nickname        TEXT,
    gender          TEXT NOT NULL DEFAULT 'unknown',
    birth_date      TEXT,
    birth_place     TEXT,
    death_date      TEXT,
    death_place     TEXT,
    notes           TEXT,
    research_status TEXT,
    full_name       TEXT NOT NULL DEFAULT '',
    birth_sort      INTEGER,
    death_sort      INTEGER,
    version         INTEGER NOT NULL,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS persons_surname_idx ON persons(surname COLLATE NOCASE);
CREATE INDEX IF NOT EXISTS persons_birth_idx   ON persons(birth_sort);

CREATE TABLE IF NOT EXISTS person_names (
    id              TEXT PRIMARY KEY,
    person_id       TEXT NOT NULL,
    given_name      TEXT,
    surname         TEXT,
    prefix          TEXT,
    suffix          TEXT,
    nickname        TEXT,
    name_type       TEXT,
    is_primary      INTEGER NOT NULL DEFAULT 0,
    full_name       TEXT NOT NULL DEFAULT '',
    soundex_given   TEXT,
    soundex_surname TEXT,
    version         INTEGER NOT NULL,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS person_names_person_idx  ON person_names(person_id);
CREATE INDEX IF NOT EXISTS person_names_sx_given    ON person_names(soundex_given);
CREATE INDEX IF NOT EXISTS person_names_sx_surname  ON person_names(soundex_surname);

CREATE TABLE IF NOT EXISTS families (
    id                TEXT PRIMARY KEY,
    partner1_id       TEXT,
    partner2_id       TEXT,
    relationship_type TEXT,
    marriage_date     TEXT,
    marriage_place    TEXT,
    divorce_date      TEXT,
    notes             TEXT,
    partner1_name     TEXT,
    partner2_name     TEXT,
    child_count       INTEGER NOT NULL DEFAULT 0,
    marriage_sort     INTEGER,
    version           INTEGER NOT NULL,
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS families_partner1_idx ON families(partner1_id);
CREATE INDEX IF NOT EXISTS families_partner2_idx ON families(partner2_id);

CREATE TABLE IF NOT EXISTS family_children (
    family_id              TEXT NOT NULL,
    person_id              TEXT NOT NULL,
    relationship_to_father TEXT,
    relationship_to_mother TEXT,
    sequence               INTEGER,
    created_at             TEXT NOT NULL,
    PRIMARY KEY (family_id, person_id)
);

CREATE INDEX IF NOT EXISTS family_children_person_idx ON family_children(person_id);

-- One row per person with known parents.
CREATE TABLE IF NOT EXISTS pedigree_edges (
    person_id   TEXT PRIMARY KEY,
    family_id   TEXT,
    father_id   TEXT,
    father_name TEXT,
    mother_id   TEXT,
    mother_name TEXT,
    updated_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS pedigree_family_idx ON pedigree_edges(family_id);
CREATE INDEX IF NOT EXISTS pedigree_father_idx ON pedigree_edges(father_id);
CREATE INDEX IF NOT EXISTS pedigree_mother_idx ON pedigree_edges(mother_id);

CREATE TABLE IF NOT EXISTS sources (
    id               TEXT PRIMARY KEY,
    title            TEXT NOT NULL DEFAULT '',
    author           TEXT,
    publisher        TEXT,
    publication_date TEXT,
    repository       TEXT,
    call_number      TEXT,
    notes            TEXT,
    version          INTEGER NOT NULL,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS citations (
    id            TEXT PRIMARY KEY,
    source_id     TEXT NOT NULL,
    person_id     TEXT,
    family_id     TEXT,
    life_event_id TEXT,
    page          TEXT,
    quality       INTEGER,
    text          TEXT,
    version       INTEGER NOT NULL,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS citations_source_idx ON citations(source_id);
CREATE INDEX IF NOT EXISTS citations_person_idx ON citations(person_id);

CREATE TABLE IF NOT EXISTS media (
    id          TEXT PRIMARY KEY,
    person_id   TEXT,
    family_id   TEXT,
    source_id   TEXT,
    file_path   TEXT NOT NULL DEFAULT '',
    mime_type   TEXT,
    title       TEXT,
    description TEXT,
    file_size   INTEGER,
    version     INTEGER NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS media_person_idx ON media(person_id);

CREATE TABLE IF NOT EXISTS life_events (
    id          TEXT PRIMARY KEY,
    person_id   TEXT,
    family_id   TEXT,
    event_type  TEXT NOT NULL DEFAULT '',
    date        TEXT,
    place       TEXT,
    description TEXT,
    date_sort   INTEGER,
    version     INTEGER NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS life_events_person_idx ON life_events(person_id);
CREATE INDEX IF NOT EXISTS life_events_family_idx ON life_events(family_id);

CREATE TABLE IF NOT EXISTS attributes (
    id             TEXT PRIMARY KEY,
    person_id      TEXT NOT NULL,
    attribute_type TEXT NOT NULL DEFAULT '',
    value          TEXT NOT NULL DEFAULT '',
    date           TEXT,
    place          TEXT,
    version        INTEGER NOT NULL,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS attributes_person_idx ON attributes(person_id);

CREATE TABLE IF NOT EXISTS notes (
    id         TEXT PRIMARY KEY,
    person_id  TEXT,
    family_id  TEXT,
    source_id  TEXT,
    text       TEXT NOT NULL DEFAULT '',
    version    INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS submitters (
    id         TEXT PRIMARY KEY,
    name       TEXT NOT NULL DEFAULT '',
    address    TEXT,
    email      TEXT,
    phone      TEXT,
    notes      TEXT,
    version    INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS associations (
    id           TEXT PRIMARY KEY,
    person_id    TEXT NOT NULL,
    associate_id TEXT NOT NULL,
    role         TEXT NOT NULL DEFAULT '',
    notes        TEXT,
    version      INTEGER NOT NULL,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS ordinances (
    id             TEXT PRIMARY KEY,
    person_id      TEXT,
    family_id      TEXT,
    ordinance_type TEXT NOT NULL DEFAULT '',
    date           TEXT,
    temple         TEXT,
    place          TEXT,
    status         TEXT,
    version        INTEGER NOT NULL,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);

PRAGMA user_version = 1;
";

/// Tables cleared before a full projection rebuild.
pub const READ_MODEL_TABLES: &[&str] = &[
  "persons",
  "person_names",
  "families",
  "family_children",
  "pedigree_edges",
  "sources",
  "citations",
  "media",
  "life_events",
  "attributes",
  "notes",
  "submitters",
  "associations",
  "ordinances",
];
