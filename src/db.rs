use anyhow::Context;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::plan::LessonPlan;

pub const DB_FILE: &str = "lessons.sqlite3";

/// Logical per-class datasets held in both storage tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    Lessons,
    CurriculumTags,
    CurriculumTagsStructured,
}

impl Dataset {
    pub const ALL: [Dataset; 3] = [
        Dataset::Lessons,
        Dataset::CurriculumTags,
        Dataset::CurriculumTagsStructured,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Dataset::Lessons => "lessons",
            Dataset::CurriculumTags => "curriculum_tags",
            Dataset::CurriculumTagsStructured => "curriculum_tags_structured",
        }
    }

    pub fn from_key(key: &str) -> Option<Dataset> {
        Dataset::ALL.into_iter().find(|d| d.key() == key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDataset {
    pub payload: String,
    pub digest: String,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSync {
    pub dataset: Dataset,
    pub local_digest: String,
    pub pushed_digest: Option<String>,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<String>,
}

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS datasets(
            class_id TEXT NOT NULL,
            dataset TEXT NOT NULL,
            payload TEXT NOT NULL,
            digest TEXT NOT NULL,
            updated_at TEXT,
            PRIMARY KEY(class_id, dataset)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS lesson_plans(
            id TEXT PRIMARY KEY,
            class_name TEXT NOT NULL,
            plan_date TEXT NOT NULL,
            payload TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_lesson_plans_class ON lesson_plans(class_name)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sync_state(
            class_id TEXT NOT NULL,
            dataset TEXT NOT NULL,
            local_digest TEXT NOT NULL,
            pushed_digest TEXT,
            last_error TEXT,
            last_attempt_at TEXT,
            PRIMARY KEY(class_id, dataset)
        )",
        [],
    )?;
    Ok(())
}

pub fn digest_of(payload: &str) -> String {
    format!("{:x}", Sha256::digest(payload.as_bytes()))
}

pub fn dataset_get(
    conn: &Connection,
    class_id: &str,
    dataset: Dataset,
) -> anyhow::Result<Option<StoredDataset>> {
    conn.query_row(
        "SELECT payload, digest, updated_at FROM datasets WHERE class_id = ? AND dataset = ?",
        params![class_id, dataset.key()],
        |row| {
            Ok(StoredDataset {
                payload: row.get(0)?,
                digest: row.get(1)?,
                updated_at: row.get(2)?,
            })
        },
    )
    .optional()
    .with_context(|| format!("failed to read {} for class {class_id}", dataset.key()))
}

/// Stores the payload and records its digest as the latest local version.
pub fn dataset_put(
    conn: &Connection,
    class_id: &str,
    dataset: Dataset,
    payload: &str,
) -> anyhow::Result<String> {
    let digest = digest_of(payload);
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO datasets(class_id, dataset, payload, digest, updated_at)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(class_id, dataset) DO UPDATE SET
            payload = excluded.payload,
            digest = excluded.digest,
            updated_at = excluded.updated_at",
        params![class_id, dataset.key(), payload, digest, now],
    )
    .with_context(|| format!("failed to write {} for class {class_id}", dataset.key()))?;
    conn.execute(
        "INSERT INTO sync_state(class_id, dataset, local_digest)
         VALUES(?, ?, ?)
         ON CONFLICT(class_id, dataset) DO UPDATE SET local_digest = excluded.local_digest",
        params![class_id, dataset.key(), digest],
    )?;
    Ok(digest)
}

pub fn sync_mark_pushed(
    conn: &Connection,
    class_id: &str,
    dataset: Dataset,
    digest: &str,
) -> anyhow::Result<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE sync_state SET pushed_digest = ?, last_error = NULL, last_attempt_at = ?
         WHERE class_id = ? AND dataset = ?",
        params![digest, now, class_id, dataset.key()],
    )?;
    Ok(())
}

pub fn sync_mark_failed(
    conn: &Connection,
    class_id: &str,
    dataset: Dataset,
    error: &str,
) -> anyhow::Result<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE sync_state SET last_error = ?, last_attempt_at = ?
         WHERE class_id = ? AND dataset = ?",
        params![error, now, class_id, dataset.key()],
    )?;
    Ok(())
}

/// Datasets whose latest local version has not reached the remote tier.
pub fn sync_pending(conn: &Connection, class_id: &str) -> anyhow::Result<Vec<PendingSync>> {
    let mut stmt = conn.prepare(
        "SELECT dataset, local_digest, pushed_digest, last_error, last_attempt_at
         FROM sync_state
         WHERE class_id = ? AND (pushed_digest IS NULL OR pushed_digest <> local_digest)
         ORDER BY dataset",
    )?;
    let rows = stmt
        .query_map([class_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows
        .into_iter()
        .filter_map(|(key, local_digest, pushed_digest, last_error, last_attempt_at)| {
            Dataset::from_key(&key).map(|dataset| PendingSync {
                dataset,
                local_digest,
                pushed_digest,
                last_error,
                last_attempt_at,
            })
        })
        .collect())
}

pub fn sync_is_pending(conn: &Connection, class_id: &str, dataset: Dataset) -> anyhow::Result<bool> {
    let pending: Option<bool> = conn
        .query_row(
            "SELECT pushed_digest IS NULL OR pushed_digest <> local_digest
             FROM sync_state WHERE class_id = ? AND dataset = ?",
            params![class_id, dataset.key()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(pending.unwrap_or(false))
}

fn plan_from_payload(payload: &str) -> anyhow::Result<LessonPlan> {
    serde_json::from_str(payload).context("stored lesson plan is not valid JSON")
}

pub fn plans_for_class(conn: &Connection, class_name: &str) -> anyhow::Result<Vec<LessonPlan>> {
    let mut stmt = conn.prepare(
        "SELECT payload FROM lesson_plans WHERE class_name = ? ORDER BY plan_date, created_at, id",
    )?;
    let payloads = stmt
        .query_map([class_name], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    payloads.iter().map(|p| plan_from_payload(p)).collect()
}

pub fn plans_all(conn: &Connection) -> anyhow::Result<Vec<LessonPlan>> {
    let mut stmt =
        conn.prepare("SELECT payload FROM lesson_plans ORDER BY class_name, plan_date, created_at, id")?;
    let payloads = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    payloads.iter().map(|p| plan_from_payload(p)).collect()
}

pub fn plan_get(conn: &Connection, plan_id: &str) -> anyhow::Result<Option<LessonPlan>> {
    let payload: Option<String> = conn
        .query_row(
            "SELECT payload FROM lesson_plans WHERE id = ?",
            [plan_id],
            |row| row.get(0),
        )
        .optional()?;
    payload.as_deref().map(plan_from_payload).transpose()
}

/// Update-if-exists, else insert. Returns true when the plan was new.
pub fn plan_upsert(conn: &Connection, plan: &LessonPlan) -> anyhow::Result<bool> {
    let payload = serde_json::to_string(plan)?;
    let updated = conn.execute(
        "UPDATE lesson_plans SET class_name = ?, plan_date = ?, payload = ?, updated_at = ?
         WHERE id = ?",
        params![
            plan.class_name,
            plan.date.to_string(),
            payload,
            plan.updated_at.to_rfc3339(),
            plan.id
        ],
    )?;
    if updated > 0 {
        return Ok(false);
    }
    conn.execute(
        "INSERT INTO lesson_plans(id, class_name, plan_date, payload, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        params![
            plan.id,
            plan.class_name,
            plan.date.to_string(),
            payload,
            plan.created_at.to_rfc3339(),
            plan.updated_at.to_rfc3339()
        ],
    )?;
    Ok(true)
}

pub fn plan_delete(conn: &Connection, plan_id: &str) -> anyhow::Result<bool> {
    let n = conn.execute("DELETE FROM lesson_plans WHERE id = ?", [plan_id])?;
    Ok(n > 0)
}
