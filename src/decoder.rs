//! Manages feed decoders
pub mod gtfs_rt;
pub mod vehicle_positions;

use std::sync::Arc;

use anyhow::anyhow;

use crate::{error::Error, observation::VehicleObservation, settings};

/// Decoder converts a raw feed payload into vehicle observations.
/// Each call handles one fresh payload.
pub trait Decoder {
    fn get_name(&self) -> String;
    fn decode(&self, payload: &[u8]) -> Result<Vec<VehicleObservation>, Error>;
}

/// Creates decoder of specified name.
/// If you add your own feed formats, register them here
pub fn get_decoder(
    name: &str,
    feed: &settings::Feed,
) -> Result<Arc<dyn Decoder + Send + Sync>, anyhow::Error> {
    match name {
        "gtfs-rt" => Ok(Arc::new(vehicle_positions::Decoder::new(
            feed.discard_route_id.clone(),
        ))),
        _ => Err(anyhow!("unknown decoder {}", name)),
    }
}
