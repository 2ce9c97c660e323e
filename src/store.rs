//! Durable observation store
use std::sync::Arc;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::NoTls;
use tracing::{debug, info};

use crate::{error::Error, observation::VehicleObservation, settings};

/// Idempotent sink for observations. A call either persists every
/// observation it was given or none of them.
#[async_trait]
pub trait Store: Send + Sync {
    async fn upsert(&self, observations: &[VehicleObservation]) -> Result<(), Error>;
}

#[async_trait]
impl<T: Store + ?Sized> Store for Arc<T> {
    async fn upsert(&self, observations: &[VehicleObservation]) -> Result<(), Error> {
        (**self).upsert(observations).await
    }
}

/// Insert, or overwrite every non-key column of the row keyed by
/// (`vehicle_id`, `timestamp`).
pub fn upsert_statement(table: &str) -> String {
    format!(
        "INSERT INTO {table} (
    trip_id, route_id, latitude, longitude, bearing, speed,
    current_stop_sequence, current_status, timestamp, stop_id,
    vehicle_id, vehicle_label, license_plate, wheelchair_accessible
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
ON CONFLICT (vehicle_id, timestamp) DO UPDATE
SET trip_id = EXCLUDED.trip_id,
    route_id = EXCLUDED.route_id,
    latitude = EXCLUDED.latitude,
    longitude = EXCLUDED.longitude,
    bearing = EXCLUDED.bearing,
    speed = EXCLUDED.speed,
    current_stop_sequence = EXCLUDED.current_stop_sequence,
    current_status = EXCLUDED.current_status,
    stop_id = EXCLUDED.stop_id,
    vehicle_label = EXCLUDED.vehicle_label,
    license_plate = EXCLUDED.license_plate,
    wheelchair_accessible = EXCLUDED.wheelchair_accessible"
    )
}

pub fn create_table_statement(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
    trip_id VARCHAR(255),
    route_id VARCHAR(255),
    latitude FLOAT,
    longitude FLOAT,
    bearing FLOAT,
    speed FLOAT,
    current_stop_sequence INT,
    current_status VARCHAR(255),
    timestamp TIMESTAMP WITH TIME ZONE,
    stop_id VARCHAR(255),
    vehicle_id VARCHAR(255),
    vehicle_label VARCHAR(255),
    license_plate VARCHAR(255),
    wheelchair_accessible BOOLEAN,
    PRIMARY KEY (vehicle_id, timestamp)
)"
    )
}

/// PostgreSQL store. Every `upsert` checks one connection out of the pool and
/// returns it on all exit paths.
pub struct PgStore {
    pool: Pool,
    table: String,
    upsert_sql: String,
}

impl PgStore {
    pub fn new(cfg: &settings::Postgres) -> Result<PgStore, anyhow::Error> {
        let mut pg = tokio_postgres::Config::new();
        pg.host(&cfg.host)
            .port(cfg.port)
            .dbname(&cfg.dbname)
            .user(&cfg.user)
            .password(&cfg.password);
        let mgr = Manager::from_config(
            pg,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(mgr).max_size(cfg.pool_size).build()?;
        Ok(PgStore {
            pool,
            table: cfg.table.clone(),
            upsert_sql: upsert_statement(&cfg.table),
        })
    }

    /// Creates the observation table if it does not exist yet
    pub async fn bootstrap(&self) -> Result<(), Error> {
        let client = self.pool.get().await?;
        client
            .batch_execute(&create_table_statement(&self.table))
            .await?;
        info!(table = %self.table, "observation table ready");
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn upsert(&self, observations: &[VehicleObservation]) -> Result<(), Error> {
        if observations.is_empty() {
            return Ok(());
        }
        let mut client = self.pool.get().await?;
        // dropping an uncommitted transaction rolls it back
        let tx = client.transaction().await?;
        let stmt = tx.prepare_cached(&self.upsert_sql).await?;
        for o in observations {
            let stop_sequence = i32::try_from(o.current_stop_sequence).map_err(|_| {
                Error::Persist(format!(
                    "vehicle {}: stop sequence {} out of range",
                    o.vehicle_id, o.current_stop_sequence
                ))
            })?;
            let status = o.current_status.to_string();
            tx.execute(
                &stmt,
                &[
                    &o.trip_id,
                    &o.route_id,
                    &o.latitude,
                    &o.longitude,
                    &o.bearing,
                    &o.speed,
                    &stop_sequence,
                    &status,
                    &o.timestamp,
                    &o.stop_id,
                    &o.vehicle_id,
                    &o.vehicle_label,
                    &o.license_plate,
                    &o.wheelchair_accessible,
                ],
            )
            .await
            .map_err(|e| {
                Error::Persist(format!(
                    "vehicle {} at {}: {e}",
                    o.vehicle_id,
                    o.timestamp.format(crate::observation::wire_timestamp::FORMAT)
                ))
            })?;
        }
        tx.commit().await?;
        debug!(rows = observations.len(), table = %self.table, "upserted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_targets_primary_key() {
        let sql = upsert_statement("vehicle_data");
        assert!(sql.starts_with("INSERT INTO vehicle_data ("));
        assert!(sql.contains("ON CONFLICT (vehicle_id, timestamp) DO UPDATE"));
        for col in [
            "trip_id",
            "route_id",
            "latitude",
            "longitude",
            "bearing",
            "speed",
            "current_stop_sequence",
            "current_status",
            "stop_id",
            "vehicle_label",
            "license_plate",
            "wheelchair_accessible",
        ] {
            assert!(
                sql.contains(&format!("{col} = EXCLUDED.{col}")),
                "{col} not overwritten"
            );
        }
        assert!(!sql.contains("vehicle_id = EXCLUDED"));
        assert!(!sql.contains("timestamp = EXCLUDED"));
        assert!(sql.contains("$14"));
    }

    #[test]
    fn table_schema() {
        let sql = create_table_statement("positions");
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS positions"));
        assert!(sql.contains("timestamp TIMESTAMP WITH TIME ZONE"));
        assert!(sql.contains("PRIMARY KEY (vehicle_id, timestamp)"));
    }

    #[test]
    fn pool_built_lazily() {
        let store = PgStore::new(&settings::Postgres {
            host: String::from("localhost"),
            port: 5432,
            dbname: String::from("bkk_traffic_tracker"),
            user: String::from("postgres"),
            password: String::from("postgres"),
            table: String::from("vehicle_data"),
            pool_size: 2,
            bootstrap_schema: false,
        })
        .unwrap();
        assert_eq!(store.upsert_sql, upsert_statement("vehicle_data"));
    }
}
