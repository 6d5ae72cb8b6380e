//! Promotes staged rows into the final tables.
//!
//! Runs as one transaction: drop FK/PK/index, truncate the final
//! tables, dedup-insert from staging (`DISTINCT ON (id) ... ORDER BY
//! id`, keeping the first row PostgreSQL happens to order to the
//! front), recreate the constraints, then `ANALYZE`. Events are joined
//! against the freshly-inserted groups so an event whose group never
//! made it into staging is dropped rather than violating the FK it is
//! about to get back.

use tokio_postgres::Client;

use crate::error::LoaderError;

fn to_loader_error(table: &str, source: tokio_postgres::Error) -> LoaderError {
    LoaderError::Transient {
        table: table.to_string(),
        source: Box::new(source),
    }
}

/// Runs the full finalize sequence against `groups_table`/`events_table`
/// inside one transaction.
pub async fn finalize(
    client: &mut Client,
    groups_table: &str,
    events_table: &str,
) -> Result<(), LoaderError> {
    let pk_group = format!("pk_{groups_table}");
    let pk_event = format!("pk_{events_table}");
    let fk_event_group = "fk_event_group_event_id_group_event".to_string();
    let ix_event_group = format!("ix_{events_table}_group_event_id");

    let tx = client
        .transaction()
        .await
        .map_err(|e| to_loader_error(events_table, e))?;

    let sql = format!(
        r#"
        ALTER TABLE IF EXISTS {events} DROP CONSTRAINT IF EXISTS {fk};
        ALTER TABLE IF EXISTS {events} DROP CONSTRAINT IF EXISTS {pk_event};
        ALTER TABLE IF EXISTS {groups} DROP CONSTRAINT IF EXISTS {pk_group};
        DROP INDEX IF EXISTS {ix};

        TRUNCATE TABLE {events};
        TRUNCATE TABLE {groups};

        INSERT INTO {groups} (id, name)
        SELECT DISTINCT ON (id) id, name
        FROM stg_{groups}
        ORDER BY id;

        INSERT INTO {events} (id, group_event_id, name)
        SELECT DISTINCT ON (se.id) se.id, se.group_event_id, se.name
        FROM stg_{events} se
        JOIN {groups} ge ON ge.id = se.group_event_id
        ORDER BY se.id;

        ALTER TABLE {groups} ADD CONSTRAINT {pk_group} PRIMARY KEY (id);
        ALTER TABLE {events} ADD CONSTRAINT {pk_event} PRIMARY KEY (id);
        CREATE INDEX {ix} ON {events} (group_event_id);
        ALTER TABLE {events}
            ADD CONSTRAINT {fk}
            FOREIGN KEY (group_event_id)
            REFERENCES {groups}(id);

        ANALYZE {groups};
        ANALYZE {events};
        "#,
        groups = groups_table,
        events = events_table,
        pk_group = pk_group,
        pk_event = pk_event,
        fk = fk_event_group,
        ix = ix_event_group,
    );

    tx.batch_execute(&sql)
        .await
        .map_err(|e| to_loader_error(events_table, e))?;

    tx.commit().await.map_err(|e| to_loader_error(events_table, e))
}
