//! SQLite-backed IP store
//!
//! One table, `ip_addresses`, keyed by (address, network_name). Addresses are
//! stored in canonical text form; ordering is never done on that column.

use crate::error::StoreError;
use crate::models::{IpAddressRecord, IpAddressUpdate, NewIpAddress};
use crate::store_trait::IpStoreTrait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

const CREATE_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS ip_addresses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    address TEXT NOT NULL,
    network_name TEXT NOT NULL,
    static_ip INTEGER NOT NULL DEFAULT 0,
    instance_id TEXT,
    task_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (address, network_name)
)";

const SELECT_COLUMNS: &str =
    "SELECT id, address, network_name, static_ip, instance_id, task_id, created_at FROM ip_addresses";

/// IP store persisted in SQLite
#[derive(Debug, Clone)]
pub struct SqliteIpStore {
    pool: SqlitePool,
}

impl SqliteIpStore {
    /// Open (creating if missing) the database at `url` and run migrations
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        info!("Connected to IP store at {}", url);
        Self::from_pool(pool).await
    }

    /// Private in-memory database, kept alive by a single pinned connection
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool and run migrations
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Create the schema if it does not exist
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        debug!("IP store schema is up to date");
        Ok(())
    }

    async fn fetch_one(&self, address: IpAddr, network_name: &str) -> Result<IpAddressRecord, StoreError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE address = ? AND network_name = ?"))
            .bind(address.to_string())
            .bind(network_name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                address,
                network_name: network_name.to_string(),
            })?;
        record_from_row(&row)
    }
}

fn map_write_error(error: sqlx::Error, address: IpAddr, network_name: &str) -> StoreError {
    match error {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => StoreError::UniqueViolation {
            address,
            network_name: network_name.to_string(),
        },
        other => StoreError::Database(other),
    }
}

fn record_from_row(row: &SqliteRow) -> Result<IpAddressRecord, StoreError> {
    let address: String = row.try_get("address")?;
    let address = IpAddr::from_str(&address)
        .map_err(|e| StoreError::InvalidRecord(format!("address '{address}': {e}")))?;

    let instance_id = row
        .try_get::<Option<String>, _>("instance_id")?
        .map(|id| Uuid::parse_str(&id).map_err(|e| StoreError::InvalidRecord(format!("instance_id '{id}': {e}"))))
        .transpose()?;

    let created_at: String = row.try_get("created_at")?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| StoreError::InvalidRecord(format!("created_at '{created_at}': {e}")))?
        .with_timezone(&Utc);

    Ok(IpAddressRecord {
        id: row.try_get("id")?,
        address,
        network_name: row.try_get("network_name")?,
        static_ip: row.try_get("static_ip")?,
        instance_id,
        task_id: row.try_get("task_id")?,
        created_at,
    })
}

#[async_trait::async_trait]
impl IpStoreTrait for SqliteIpStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn find_by_address(&self, address: IpAddr) -> Result<Vec<IpAddressRecord>, StoreError> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} WHERE address = ? ORDER BY id"))
            .bind(address.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn list_ip_addresses(&self, network_name: Option<&str>) -> Result<Vec<IpAddressRecord>, StoreError> {
        let rows = match network_name {
            Some(network_name) => {
                sqlx::query(&format!("{SELECT_COLUMNS} WHERE network_name = ? ORDER BY id"))
                    .bind(network_name)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query(&format!("{SELECT_COLUMNS} ORDER BY id"))
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(record_from_row).collect()
    }

    async fn create_ip_address(&self, new: NewIpAddress) -> Result<IpAddressRecord, StoreError> {
        let created_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO ip_addresses (address, network_name, static_ip, instance_id, task_id, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(new.address.to_string())
        .bind(&new.network_name)
        .bind(new.static_ip)
        .bind(new.instance_id.to_string())
        .bind(&new.task_id)
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, new.address, &new.network_name))?;

        Ok(IpAddressRecord {
            id: result.last_insert_rowid(),
            address: new.address,
            network_name: new.network_name,
            static_ip: new.static_ip,
            instance_id: Some(new.instance_id),
            task_id: new.task_id,
            created_at,
        })
    }

    async fn update_ip_address(
        &self,
        address: IpAddr,
        network_name: &str,
        update: IpAddressUpdate,
    ) -> Result<IpAddressRecord, StoreError> {
        let result = sqlx::query(
            "UPDATE ip_addresses SET network_name = ?, static_ip = ? WHERE address = ? AND network_name = ?",
        )
        .bind(&update.network_name)
        .bind(update.static_ip)
        .bind(address.to_string())
        .bind(network_name)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, address, &update.network_name))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                address,
                network_name: network_name.to_string(),
            });
        }
        self.fetch_one(address, &update.network_name).await
    }

    async fn delete_ip_address(&self, address: IpAddr) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM ip_addresses WHERE address = ?")
            .bind(address.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
