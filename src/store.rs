use std::fs;

use camino::Utf8PathBuf;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::ProjectKey;
use crate::error::DlsError;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS project_info (
    project_name TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT
);";

/// Append-only `(project_name, key, value)` table in a local SQLite file.
///
/// Every call opens its own connection and drops it before returning.
#[derive(Debug, Clone)]
pub struct Store {
    path: Utf8PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRow {
    pub project_name: String,
    pub key: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub columns: Vec<String>,
    pub rows: Vec<ProjectRow>,
}

impl Store {
    pub fn open(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn connect(&self) -> Result<Connection, DlsError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_str().is_empty() {
                fs::create_dir_all(parent.as_std_path())
                    .map_err(|err| DlsError::Filesystem(err.to_string()))?;
            }
        }
        debug!(path = %self.path, "opening metadata store");
        let conn = Connection::open(self.path.as_std_path())?;
        conn.execute_batch(SCHEMA)?;
        Ok(conn)
    }

    /// Appends a row; earlier values for the same key are kept.
    pub fn put(&self, project: &str, key: ProjectKey, value: &str) -> Result<(), DlsError> {
        self.put_all(project, &[(key, value)])
    }

    /// Appends several rows in one transaction: either all are written or none.
    pub fn put_all(&self, project: &str, entries: &[(ProjectKey, &str)]) -> Result<(), DlsError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        for (key, value) in entries {
            tx.execute(
                "INSERT INTO project_info (project_name, key, value) VALUES (?1, ?2, ?3)",
                params![project, key.as_str(), value],
            )?;
        }
        tx.commit()?;
        for (key, value) in entries {
            info!(project, %key, bytes = value.len(), "project updated");
        }
        Ok(())
    }

    /// Most recently inserted value for `key`, or `None` if it was never written.
    pub fn get_latest(&self, project: &str, key: ProjectKey) -> Result<Option<String>, DlsError> {
        let conn = self.connect()?;
        let value = conn
            .query_row(
                "SELECT value FROM project_info
                 WHERE project_name = ?1 AND key = ?2
                 ORDER BY rowid DESC
                 LIMIT 1",
                params![project, key.as_str()],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(value.flatten())
    }

    pub fn list_all(&self, project: &str) -> Result<ProjectInfo, DlsError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT project_name, key, value FROM project_info
             WHERE project_name = ?1
             ORDER BY rowid ASC",
        )?;
        let columns = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        let rows = stmt
            .query_map(params![project], |row| {
                Ok(ProjectRow {
                    project_name: row.get(0)?,
                    key: row.get(1)?,
                    value: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        debug!(project, rows = rows.len(), "listed project rows");
        Ok(ProjectInfo { columns, rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_none() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("db.sqlite")).unwrap();
        let store = Store::open(path);

        assert_eq!(
            store.get_latest("proj", ProjectKey::DataLocation).unwrap(),
            None
        );
    }

    #[test]
    fn creates_parent_directories() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("nested/dir/db.sqlite")).unwrap();
        let store = Store::open(path.clone());

        store.put("proj", ProjectKey::AcquisitionId, "x").unwrap();
        assert!(path.as_std_path().exists());
    }
}
