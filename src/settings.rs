//! Application config
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// environment overrides look like `VEHICLE_FEED__FEED__API_KEY`
const ENV_PREFIX: &str = "VEHICLE_FEED";

/// feed polling configuration
#[derive(Deserialize, Debug, Clone)]
pub struct Feed {
    /// name of decoder to use (default: "gtfs-rt")
    pub decoder: String,
    /// vehicle positions endpoint, API key is appended as `key` query parameter
    pub url: String,
    pub api_key: String,
    /// fetch cadence (default: 10s)
    pub poll_interval_seconds: u64,
    /// HTTP request timeout (default: 10s)
    pub request_timeout_seconds: u64,
    /// route id marking observations to drop (default: "9999")
    pub discard_route_id: String,
}

/// log configuration, shared by producer and consumer
#[derive(Deserialize, Debug, Clone)]
pub struct Kafka {
    /// address of bootstrap kafka broker
    pub broker: String,
    /// topic carrying observations (default: "vehicle-data")
    pub topic: String,
    /// consumer group (default: "vehicle-data-group")
    pub consumer_group: String,
    /// producer-side send retries (default: 5)
    pub producer_retries: u32,
    /// local delivery timeout (default: 5000ms)
    pub message_timeout_ms: u64,
}

/// subscriber batching
#[derive(Deserialize, Debug, Clone)]
pub struct Ingester {
    /// max observations messages per store call (default: 100)
    pub batch_size: usize,
    /// how long to keep filling a batch once the first message arrived (default: 1000ms)
    pub batch_timeout_ms: u64,
    /// pause before re-reading a batch whose persistence failed (default: 1000ms)
    pub retry_delay_ms: u64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Postgres {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    /// table to upsert into (default: "vehicle_data")
    pub table: String,
    /// max pooled connections (default: 4)
    pub pool_size: usize,
    /// create the table on startup if missing (default: true)
    pub bootstrap_schema: bool,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    pub feed: Feed,
    pub kafka: Kafka,
    pub ingester: Ingester,
    pub postgres: Postgres,
}

impl Settings {
    pub fn new(cfgfile: &str) -> Result<Self, ConfigError> {
        Self::builder()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(cfgfile).required(true))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("feed.decoder", "gtfs-rt")?
            .set_default(
                "feed.url",
                "https://go.bkk.hu/api/query/v1/ws/gtfs-rt/full/VehiclePositions.pb",
            )?
            .set_default("feed.poll_interval_seconds", 10)?
            .set_default("feed.request_timeout_seconds", 10)?
            .set_default("feed.discard_route_id", "9999")?
            .set_default("kafka.topic", "vehicle-data")?
            .set_default("kafka.consumer_group", "vehicle-data-group")?
            .set_default("kafka.producer_retries", 5)?
            .set_default("kafka.message_timeout_ms", 5000)?
            .set_default("ingester.batch_size", 100)?
            .set_default("ingester.batch_timeout_ms", 1000)?
            .set_default("ingester.retry_delay_ms", 1000)?
            .set_default("postgres.port", 5432)?
            .set_default("postgres.dbname", "bkk_traffic_tracker")?
            .set_default("postgres.table", "vehicle_data")?
            .set_default("postgres.pool_size", 4)?
            .set_default("postgres.bootstrap_schema", true)
    }
}
