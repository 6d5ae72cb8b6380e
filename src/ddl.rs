//! Schema bootstrap: creates the final and staging tables, and resets
//! staging between runs. Staging tables carry no PK/FK/index so `COPY`
//! never pays constraint-checking overhead; [`crate::finalize`] is
//! where integrity gets enforced.

use tokio_postgres::Client;

use crate::error::LoaderError;

fn to_loader_error(table: &str, source: tokio_postgres::Error) -> LoaderError {
    LoaderError::Transient {
        table: table.to_string(),
        source: Box::new(source),
    }
}

/// Creates the final and staging tables if they do not already exist,
/// and marks both staging tables `UNLOGGED` (no WAL overhead for data
/// that only ever lives there transiently).
pub async fn init_db(
    client: &Client,
    groups_table: &str,
    events_table: &str,
) -> Result<(), LoaderError> {
    let ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {groups} (
            id BIGINT PRIMARY KEY,
            name TEXT
        );
        CREATE TABLE IF NOT EXISTS {events} (
            id BIGINT PRIMARY KEY,
            group_event_id BIGINT NOT NULL REFERENCES {groups}(id),
            name TEXT
        );
        CREATE INDEX IF NOT EXISTS ix_{events}_group_event_id ON {events} (group_event_id);
        CREATE TABLE IF NOT EXISTS stg_{groups} (
            id BIGINT NOT NULL,
            name TEXT
        );
        CREATE TABLE IF NOT EXISTS stg_{events} (
            id BIGINT NOT NULL,
            group_event_id BIGINT NOT NULL,
            name TEXT
        );
        ALTER TABLE stg_{groups} SET UNLOGGED;
        ALTER TABLE stg_{events} SET UNLOGGED;
        "#,
        groups = groups_table,
        events = events_table,
    );
    client
        .batch_execute(&ddl)
        .await
        .map_err(|e| to_loader_error(groups_table, e))
}

/// Empties both staging tables. Safe to call before every run: staging
/// is never a source of truth between runs.
pub async fn truncate_staging(
    client: &Client,
    groups_table: &str,
    events_table: &str,
) -> Result<(), LoaderError> {
    let sql = format!(
        "TRUNCATE TABLE stg_{events}; TRUNCATE TABLE stg_{groups};",
        events = events_table,
        groups = groups_table,
    );
    client
        .batch_execute(&sql)
        .await
        .map_err(|e| to_loader_error(events_table, e))
}
