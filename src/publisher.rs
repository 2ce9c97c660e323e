//! Publishes observations onto the log topic
use std::{sync::Arc, time::Duration};

use futures::{future::BoxFuture, FutureExt};
use rdkafka::{
    producer::{FutureProducer, FutureRecord},
    ClientConfig,
};
use tracing::{debug, warn};

use crate::{error::Error, observation::VehicleObservation, settings};

/// Resolves once the log acknowledged, or gave up on, one message
pub type DeliveryAck = BoxFuture<'static, Result<(), Error>>;

/// Append-only destination for keyed messages. `enqueue` must not wait for
/// the broker; waiting happens on the returned acknowledgment.
pub trait Topic: Send + Sync {
    fn enqueue(&self, key: &str, payload: &[u8]) -> Result<DeliveryAck, Error>;
}

impl<T: Topic + ?Sized> Topic for Arc<T> {
    fn enqueue(&self, key: &str, payload: &[u8]) -> Result<DeliveryAck, Error> {
        (**self).enqueue(key, payload)
    }
}

pub struct KafkaTopic {
    producer: FutureProducer,
    topic: String,
}

impl KafkaTopic {
    pub fn new(cfg: &settings::Kafka) -> Result<KafkaTopic, anyhow::Error> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &cfg.broker)
            .set("retries", cfg.producer_retries.to_string())
            .set("message.timeout.ms", cfg.message_timeout_ms.to_string())
            .create()?;
        Ok(KafkaTopic {
            producer,
            topic: cfg.topic.clone(),
        })
    }

    /// Waits for librdkafka's outgoing queue to drain, used at shutdown
    pub fn flush(&self, timeout: Duration) {
        use rdkafka::producer::Producer;
        if let Err(e) = self.producer.flush(timeout) {
            warn!(error = %e, "producer flush on shutdown");
        }
    }
}

impl Topic for KafkaTopic {
    fn enqueue(&self, key: &str, payload: &[u8]) -> Result<DeliveryAck, Error> {
        let record = FutureRecord::to(&self.topic).key(key).payload(payload);
        match self.producer.send_result(record) {
            Ok(delivery) => {
                let key = key.to_string();
                Ok(async move {
                    match delivery.await {
                        Ok(Ok(_)) => Ok(()),
                        Ok(Err((e, _))) => Err(Error::Delivery {
                            key,
                            reason: e.to_string(),
                        }),
                        Err(_) => Err(Error::Delivery {
                            key,
                            reason: String::from("delivery report dropped"),
                        }),
                    }
                }
                .boxed())
            }
            Err((e, _)) => Err(Error::Delivery {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

/// Outcome of publishing one feed snapshot
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub failed: usize,
}

pub struct Publisher<T: Topic> {
    topic: T,
}

impl<T: Topic> Publisher<T> {
    pub fn new(topic: T) -> Publisher<T> {
        Publisher { topic }
    }

    pub fn topic(&self) -> &T {
        &self.topic
    }

    /// Enqueues every observation as its own message keyed by vehicle id, then
    /// waits until each one is acknowledged or failed. A failed message never
    /// stops the rest of the batch.
    pub async fn publish(&self, observations: &[VehicleObservation]) -> PublishReport {
        let mut report = PublishReport::default();
        let mut pending = Vec::with_capacity(observations.len());
        for o in observations {
            let enqueued = o
                .to_message()
                .and_then(|payload| self.topic.enqueue(&o.vehicle_id, &payload));
            match enqueued {
                Ok(ack) => pending.push(ack),
                Err(e) => {
                    warn!(vehicle_id = %o.vehicle_id, error = %e, "enqueueing observation");
                    report.failed += 1;
                }
            }
        }

        // flush barrier: nothing from this snapshot is left in flight
        for result in futures::future::join_all(pending).await {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(error = %e, "observation not delivered");
                    report.failed += 1;
                }
            }
        }
        debug!(
            delivered = report.delivered,
            failed = report.failed,
            "snapshot published"
        );
        report
    }
}
