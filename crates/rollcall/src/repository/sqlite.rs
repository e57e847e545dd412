//! SQLite reference store (sync rusqlite behind `spawn_blocking`).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use super::{ReferenceData, ReferenceLookupError, ReferenceStore, FEDERAL_SCOPE};
use crate::models::{CaseContext, CaseId, CredentialAlias, CredentialEntry, OrganizationId};

type Result<T> = std::result::Result<T, ReferenceLookupError>;

fn query_err(e: rusqlite::Error) -> ReferenceLookupError {
    ReferenceLookupError::Query(e.to_string())
}

/// SQLite-backed reference store.
#[derive(Debug, Clone)]
pub struct SqliteReferenceStore {
    db_path: PathBuf,
}

impl SqliteReferenceStore {
    /// Open the database, creating the schema if missing.
    pub fn new(db_path: &Path) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_path_buf(),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> Result<Connection> {
        connect(&self.db_path)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS credentials (
                id INTEGER PRIMARY KEY,
                company_id INTEGER NOT NULL,
                credential TEXT NOT NULL,
                category TEXT NOT NULL,
                state TEXT NOT NULL DEFAULT 'federal'
            );
            CREATE INDEX IF NOT EXISTS idx_credentials_company ON credentials(company_id);

            CREATE TABLE IF NOT EXISTS credential_aliases (
                company_id INTEGER NOT NULL,
                alias TEXT NOT NULL,
                credential TEXT NOT NULL,
                category TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS cases (
                case_id TEXT PRIMARY KEY,
                jurisdiction TEXT
            );

            CREATE TABLE IF NOT EXISTS case_attendees (
                case_id TEXT NOT NULL,
                name TEXT NOT NULL,
                credential_hint TEXT
            );
        "#,
        )
        .map_err(query_err)?;
        Ok(())
    }

    /// Replace all reference rows with the given data.
    pub fn import(&self, data: &ReferenceData) -> Result<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction().map_err(query_err)?;
        tx.execute_batch(
            "DELETE FROM credentials; DELETE FROM credential_aliases; \
             DELETE FROM cases; DELETE FROM case_attendees;",
        )
        .map_err(query_err)?;

        for c in &data.credentials {
            tx.execute(
                "INSERT INTO credentials (id, company_id, credential, category, state) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    c.entry.id,
                    c.organization.0,
                    c.entry.credential,
                    c.entry.category,
                    c.scope
                ],
            )
            .map_err(query_err)?;
        }
        for a in &data.aliases {
            tx.execute(
                "INSERT INTO credential_aliases (company_id, alias, credential, category) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    a.organization.0,
                    a.alias.alias,
                    a.alias.credential,
                    a.alias.category
                ],
            )
            .map_err(query_err)?;
        }
        for (case_id, ctx) in &data.cases {
            tx.execute(
                "INSERT INTO cases (case_id, jurisdiction) VALUES (?1, ?2)",
                params![case_id, ctx.jurisdiction],
            )
            .map_err(query_err)?;
            for name in &ctx.expected_names {
                tx.execute(
                    "INSERT INTO case_attendees (case_id, name, credential_hint) VALUES (?1, ?2, ?3)",
                    params![case_id, name, ctx.credential_hints.get(name)],
                )
                .map_err(query_err)?;
            }
        }
        tx.commit().map_err(query_err)?;
        Ok(())
    }

    fn valid_credentials_sync(
        &self,
        organization: OrganizationId,
        jurisdiction: Option<&str>,
    ) -> Result<Vec<CredentialEntry>> {
        let conn = self.connect()?;
        let rows = match jurisdiction {
            Some(j) => {
                let mut stmt = conn
                    .prepare(
                        "SELECT id, credential, category FROM credentials \
                         WHERE company_id = ?1 AND LOWER(state) IN (?2, LOWER(?3)) ORDER BY id",
                    )
                    .map_err(query_err)?;
                let rows = stmt
                    .query_map(params![organization.0, FEDERAL_SCOPE, j], map_entry)
                    .map_err(query_err)?
                    .collect::<std::result::Result<Vec<_>, _>>();
                rows
            }
            None => {
                let mut stmt = conn
                    .prepare(
                        "SELECT id, credential, category FROM credentials \
                         WHERE company_id = ?1 ORDER BY id",
                    )
                    .map_err(query_err)?;
                let rows = stmt
                    .query_map(params![organization.0], map_entry)
                    .map_err(query_err)?
                    .collect::<std::result::Result<Vec<_>, _>>();
                rows
            }
        };
        rows.map_err(query_err)
    }

    fn possible_names_sync(&self, organization: OrganizationId) -> Result<Vec<CredentialAlias>> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(
                "SELECT alias, credential, category FROM credential_aliases \
                 WHERE company_id = ?1 ORDER BY rowid",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![organization.0], |row| {
                Ok(CredentialAlias {
                    alias: row.get("alias")?,
                    credential: row.get("credential")?,
                    category: row.get("category")?,
                })
            })
            .map_err(query_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(query_err)?;
        Ok(rows)
    }

    fn case_context_sync(&self, case_id: &str) -> Result<Option<CaseContext>> {
        let conn = self.connect()?;
        let jurisdiction: Option<Option<String>> = conn
            .query_row(
                "SELECT jurisdiction FROM cases WHERE case_id = ?1",
                params![case_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(query_err)?;

        let Some(jurisdiction) = jurisdiction else {
            return Ok(None);
        };

        let mut ctx = CaseContext {
            jurisdiction: jurisdiction.filter(|j| !j.trim().is_empty()),
            ..CaseContext::default()
        };

        let mut stmt = conn
            .prepare(
                "SELECT name, credential_hint FROM case_attendees \
                 WHERE case_id = ?1 ORDER BY rowid",
            )
            .map_err(query_err)?;
        let attendees = stmt
            .query_map(params![case_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
            })
            .map_err(query_err)?;

        for attendee in attendees {
            let (name, hint) = attendee.map_err(query_err)?;
            if let Some(hint) = hint.filter(|h| !h.trim().is_empty()) {
                ctx.credential_hints.insert(name.clone(), hint.trim().to_string());
            }
            ctx.expected_names.push(name);
        }
        Ok(Some(ctx))
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Self) -> Result<T> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(store))
            .await
            .map_err(|e| ReferenceLookupError::Unavailable(format!("lookup task failed: {}", e)))?
    }
}

fn map_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<CredentialEntry> {
    Ok(CredentialEntry {
        id: row.get("id")?,
        credential: row.get("credential")?,
        category: row.get("category")?,
    })
}

fn connect(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path).map_err(|e| {
        ReferenceLookupError::Unavailable(format!("{}: {}", path.display(), e))
    })?;
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .map_err(query_err)?;
    Ok(conn)
}

#[async_trait]
impl ReferenceStore for SqliteReferenceStore {
    async fn valid_credentials(
        &self,
        organization: OrganizationId,
        jurisdiction: Option<&str>,
    ) -> Result<Vec<CredentialEntry>> {
        let jurisdiction = jurisdiction.map(str::to_string);
        self.blocking(move |store| {
            store.valid_credentials_sync(organization, jurisdiction.as_deref())
        })
        .await
    }

    async fn possible_names(&self, organization: OrganizationId) -> Result<Vec<CredentialAlias>> {
        self.blocking(move |store| store.possible_names_sync(organization))
            .await
    }

    async fn case_context(&self, case_id: &CaseId) -> Result<Option<CaseContext>> {
        let case_id = case_id.as_str().to_string();
        self.blocking(move |store| store.case_context_sync(&case_id))
            .await
    }
}
