use crate::config::DatabaseConfig;
use crate::state::MetricsSnapshot;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use thiserror::Error;
use tracing::{debug, info, warn};

const INSERT_SQL: &str = r#"
INSERT INTO server.metrics (
  "timestamp",
  cpu_usage,
  ram_total, ram_used, ram_free, ram_available, ram_cache, ram_usage_percent,
  swap_total, swap_used, swap_free, swap_usage_percent,
  disk_total_gb, disk_used_gb, disk_usage_percent,
  net_rx_mb, net_tx_mb
) VALUES (
  NOW(),
  $1,
  $2, $3, $4, $5, $6, $7,
  $8, $9, $10, $11,
  $12, $13, $14,
  $15, $16
)
"#;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("не удалось подключиться к базе данных: {0}")]
    Connect(#[source] sqlx::Error),
    #[error("не удалось записать замер: {0}")]
    Insert(#[source] sqlx::Error),
    #[error("ошибка при закрытии соединения: {0}")]
    Close(#[source] sqlx::Error),
}

pub trait Connector {
    type Connection: SinkConnection;

    async fn connect(&self) -> Result<Self::Connection, PublishError>;
}

pub trait SinkConnection: Sized {
    async fn insert(&mut self, snapshot: &MetricsSnapshot) -> Result<(), PublishError>;

    async fn close(self) -> Result<(), PublishError>;
}

/// Writes snapshots through a lazily opened connection. Any failure drops the
/// connection so the next `publish` starts from a fresh one; the failed
/// snapshot is not retried.
pub struct Publisher<C: Connector> {
    connector: C,
    connection: Option<C::Connection>,
}

impl<C: Connector> Publisher<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            connection: None,
        }
    }

    pub async fn publish(&mut self, snapshot: &MetricsSnapshot) -> Result<(), PublishError> {
        let result = self.try_publish(snapshot).await;
        if result.is_err() {
            self.teardown().await;
        }
        result
    }

    pub async fn close(&mut self) {
        self.teardown().await;
    }

    async fn try_publish(&mut self, snapshot: &MetricsSnapshot) -> Result<(), PublishError> {
        let connection = match self.connection.take() {
            Some(connection) => connection,
            None => {
                let connection = self.connector.connect().await?;
                info!("соединение с базой данных установлено");
                connection
            }
        };
        let connection = self.connection.insert(connection);
        connection.insert(snapshot).await
    }

    async fn teardown(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };
        warn!("соединение с базой данных сброшено");
        if let Err(err) = connection.close().await {
            debug!(error = %err, "ошибка закрытия соединения проигнорирована");
        }
    }

    #[cfg(test)]
    fn is_connected(&self) -> bool {
        self.connection.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct PostgresConnector {
    options: PgConnectOptions,
}

impl PostgresConnector {
    pub fn new(cfg: &DatabaseConfig) -> Self {
        let options = PgConnectOptions::new()
            .host(&cfg.host)
            .port(cfg.port)
            .database(&cfg.name)
            .username(&cfg.user)
            .password(&cfg.password);
        Self { options }
    }
}

impl Connector for PostgresConnector {
    type Connection = PostgresConnection;

    async fn connect(&self) -> Result<PostgresConnection, PublishError> {
        let conn = PgConnection::connect_with(&self.options)
            .await
            .map_err(PublishError::Connect)?;
        Ok(PostgresConnection { conn })
    }
}

/// One exclusively owned connection; every statement runs in autocommit.
pub struct PostgresConnection {
    conn: PgConnection,
}

impl SinkConnection for PostgresConnection {
    async fn insert(&mut self, snapshot: &MetricsSnapshot) -> Result<(), PublishError> {
        let mem = &snapshot.memory;
        sqlx::query(INSERT_SQL)
            .bind(snapshot.cpu_usage_percent)
            .bind(to_db(mem.ram_total_mb))
            .bind(to_db(mem.ram_used_mb))
            .bind(to_db(mem.ram_free_mb))
            .bind(to_db(mem.ram_available_mb))
            .bind(to_db(mem.ram_cache_mb))
            .bind(mem.ram_usage_percent)
            .bind(to_db(mem.swap_total_mb))
            .bind(to_db(mem.swap_used_mb))
            .bind(to_db(mem.swap_free_mb))
            .bind(mem.swap_usage_percent)
            .bind(snapshot.disk.total_gb)
            .bind(snapshot.disk.used_gb)
            .bind(snapshot.disk.usage_percent)
            .bind(saturating_i64(snapshot.net.rx_mb))
            .bind(saturating_i64(snapshot.net.tx_mb))
            .execute(&mut self.conn)
            .await
            .map_err(PublishError::Insert)?;
        Ok(())
    }

    async fn close(self) -> Result<(), PublishError> {
        self.conn.close().await.map_err(PublishError::Close)
    }
}

fn to_db(value: Option<u64>) -> Option<i64> {
    value.map(saturating_i64)
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
