//! GTFS-Realtime `VehiclePositions` decoder
use chrono::{DateTime, Utc};
use prost::Message;
use tracing::{debug, warn};

use super::gtfs_rt::{vehicle_position::VehicleStopStatus, FeedMessage, VehiclePosition};
use crate::{
    error::Error,
    observation::{wheelchair_from_code, VehicleObservation, MPS_TO_KMH},
};

pub struct Decoder {
    /// observations on this route are dropped
    discard_route_id: String,
}

impl Decoder {
    pub fn new(discard_route_id: String) -> Decoder {
        Decoder { discard_route_id }
    }

    fn observation(&self, entity_id: &str, vp: &VehiclePosition) -> Option<VehicleObservation> {
        let trip = vp.trip.clone().unwrap_or_default();
        let route_id = trip.route_id.unwrap_or_default();
        if route_id == self.discard_route_id {
            return None;
        }
        let position = vp.position.clone().unwrap_or_default();
        let vehicle = vp.vehicle.clone().unwrap_or_default();
        let epoch = vp.timestamp.unwrap_or_default();
        let timestamp = match i64::try_from(epoch)
            .ok()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        {
            Some(ts) => ts,
            None => {
                warn!(entity = entity_id, epoch, "timestamp out of range, skipping entity");
                return None;
            }
        };

        Some(VehicleObservation {
            trip_id: trip.trip_id.unwrap_or_default(),
            route_id,
            latitude: f64::from(position.latitude),
            longitude: f64::from(position.longitude),
            bearing: f64::from(position.bearing.unwrap_or_default()),
            speed: f64::from(position.speed.unwrap_or_default()) * MPS_TO_KMH,
            current_stop_sequence: vp.current_stop_sequence.unwrap_or_default(),
            current_status: vp
                .current_status
                .unwrap_or(VehicleStopStatus::InTransitTo as i32),
            timestamp,
            stop_id: vp.stop_id.clone().unwrap_or_default(),
            vehicle_id: vehicle.id.unwrap_or_default(),
            vehicle_label: vehicle.label.unwrap_or_default(),
            license_plate: vehicle.license_plate.unwrap_or_default(),
            wheelchair_accessible: wheelchair_from_code(i64::from(
                vehicle.wheelchair_accessible.unwrap_or_default(),
            )),
        })
    }
}

impl super::Decoder for Decoder {
    fn get_name(&self) -> String {
        String::from("gtfs-rt")
    }

    fn decode(&self, payload: &[u8]) -> Result<Vec<VehicleObservation>, Error> {
        let feed = FeedMessage::decode(payload).map_err(|e| Error::Decode(e.to_string()))?;
        if !feed.is_initialized() {
            warn!("vehicle position feed is not fully initialized");
            return Ok(Vec::new());
        }

        let mut observations = Vec::with_capacity(feed.entity.len());
        for entity in &feed.entity {
            let Some(vp) = &entity.vehicle else {
                continue;
            };
            match self.observation(&entity.id, vp) {
                Some(o) => observations.push(o),
                None => debug!(entity = %entity.id, "entity discarded"),
            }
        }
        Ok(observations)
    }
}
