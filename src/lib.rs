//! ## vehicle-feed
//! Real-time vehicle position ingestion: GTFS-Realtime feed → Kafka → PostgreSQL.
//!
//! ## Installation
//! Just use cargo.
//!
//! ## Configuration
//! Example config:
//! ```toml
//! [feed]
//! api_key = "..."                         # or VEHICLE_FEED__FEED__API_KEY
//! poll_interval_seconds = 10
//!
//! [kafka]
//! broker = "localhost:9092"
//! topic = "vehicle-data"
//!
//! [ingester]
//! batch_size = 100
//! batch_timeout_ms = 1000
//!
//! [postgres]
//! host = "localhost"
//! user = "postgres"
//! password = "postgres"
//! ```
//!
//! ## Running
//! `vehicle-feed -c config.toml collect` polls the feed and publishes every
//! vehicle observation as its own message. `vehicle-feed -c config.toml persist`
//! consumes the topic and upserts into the `vehicle_data` table. `run` does both
//! in one process.
//!
//! ## Kafka and PostgreSQL
//! Offsets are committed only after the batch they cover has been upserted.
//! If the store rejects a batch, the consumer is rewound and the batch is read
//! again, so observations may reach the store more than once but are never
//! lost. Rows are keyed by (`vehicle_id`, `timestamp`) and a repeated write
//! overwrites the previous one, which makes redelivery harmless.
//!
//! ## Extending
//! Feed formats are pluggable through the [Decoder] trait; register new ones
//! in [get_decoder].
//!
//! [Decoder]: decoder::Decoder
//! [get_decoder]: decoder::get_decoder

pub mod decoder;
pub mod error;
pub mod ingester;
pub mod observation;
pub mod poller;
pub mod publisher;
pub mod settings;
pub mod store;

pub use error::Error;
pub use observation::VehicleObservation;
