use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE: &str = "attendance.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    ensure_schema(&conn)?;
    Ok(conn)
}

pub fn ensure_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS collections(
            name TEXT PRIMARY KEY,
            payload TEXT NOT NULL
        )",
        [],
    )?;
    // Workspaces created before write stamps were tracked lack this column.
    ensure_collections_updated_at(conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

fn ensure_collections_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "collections", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE collections ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value_json FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_collections_table_gains_updated_at() {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute(
            "CREATE TABLE collections(name TEXT PRIMARY KEY, payload TEXT NOT NULL)",
            [],
        )
        .expect("legacy table");
        ensure_schema(&conn).expect("schema");
        assert!(table_has_column(&conn, "collections", "updated_at").expect("pragma"));
    }

    #[test]
    fn settings_round_trip() {
        let conn = Connection::open_in_memory().expect("open");
        ensure_schema(&conn).expect("schema");
        assert!(settings_get_json(&conn, "setup.telegram").expect("get").is_none());
        settings_set_json(&conn, "setup.telegram", &serde_json::json!({ "enabled": true }))
            .expect("set");
        let v = settings_get_json(&conn, "setup.telegram").expect("get").expect("some");
        assert_eq!(v["enabled"], true);
    }
}
