//! PostgreSQL connection helpers, TLS included, for both driver
//! shapes. TLS is opportunistic: if no native root certificates load,
//! connections fall back to `NoTls` rather than failing outright,
//! since `docker-compose`-style local PostgreSQL rarely serves TLS.

use std::sync::Arc;

use async_trait::async_trait;
use rustls::ClientConfig;
use tokio_postgres_rustls::MakeRustlsConnect;

use crate::config::DbSettings;
use crate::loader::{ConnectAsync, ConnectSync};

fn build_rustls_config() -> Option<ClientConfig> {
    let mut root_store = rustls::RootCertStore::empty();
    let certs = rustls_native_certs::load_native_certs().ok()?;
    for cert in certs {
        root_store.add(cert).ok();
    }
    Some(
        ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    )
}

fn make_tls_connector() -> Option<MakeRustlsConnect> {
    build_rustls_config().map(MakeRustlsConnect::new)
}

/// Opens one async connection, spawning its driving future onto the
/// runtime, and returns the usable `Client`.
pub async fn connect_async(
    conninfo: &str,
) -> Result<tokio_postgres::Client, tokio_postgres::Error> {
    if let Some(tls) = make_tls_connector() {
        let (client, connection) = tokio_postgres::connect(conninfo, tls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "postgres connection closed with error");
            }
        });
        return Ok(client);
    }

    let (client, connection) = tokio_postgres::connect(conninfo, tokio_postgres::NoTls).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(error = %e, "postgres connection closed with error");
        }
    });
    Ok(client)
}

/// [`ConnectAsync`] implementation used by [`crate::loader::ChunkedDriver`].
pub struct AsyncConnector {
    conninfo: String,
}

impl AsyncConnector {
    pub fn new(db: &DbSettings) -> Self {
        Self {
            conninfo: db.connection_string(),
        }
    }
}

#[async_trait]
impl ConnectAsync for AsyncConnector {
    async fn connect(&self) -> Result<tokio_postgres::Client, tokio_postgres::Error> {
        connect_async(&self.conninfo).await
    }
}

/// [`ConnectSync`] implementation used by [`crate::loader::ReaderDriver`].
pub struct SyncConnector {
    config: postgres::Config,
}

impl SyncConnector {
    pub fn new(db: &DbSettings) -> Self {
        let mut config = postgres::Config::new();
        config
            .host(&db.host)
            .port(db.port)
            .dbname(&db.dbname)
            .user(&db.user)
            .password(&db.password);
        Self { config }
    }
}

impl ConnectSync for SyncConnector {
    fn connect(&self) -> Result<postgres::Client, postgres::Error> {
        self.config.connect(postgres::NoTls)
    }
}

/// Opens a single ad hoc async connection for schema/finalize work
/// outside the copy hot path.
pub async fn connect_for_admin(db: &DbSettings) -> Result<tokio_postgres::Client, tokio_postgres::Error> {
    connect_async(&db.connection_string()).await
}

pub fn async_connector(db: &DbSettings) -> Arc<dyn ConnectAsync> {
    Arc::new(AsyncConnector::new(db))
}

pub fn sync_connector(db: &DbSettings) -> Arc<dyn ConnectSync> {
    Arc::new(SyncConnector::new(db))
}
