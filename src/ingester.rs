//! Pulls observations from the log into the store, committing offsets only
//! after the store accepted them.
use std::{
    collections::{hash_map::Entry, HashMap},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use rdkafka::{
    consumer::{CommitMode, Consumer, StreamConsumer},
    ClientConfig, Message, Offset, TopicPartitionList,
};
use tokio::time::{sleep, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::Error,
    observation::{self, VehicleObservation},
    settings,
    store::Store,
};

const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

/// One message pulled from the log
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Option<Vec<u8>>,
}

/// First and last offset of a batch, per topic partition
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Positions(HashMap<(String, i32), (i64, i64)>);

impl Positions {
    pub fn track(&mut self, d: &Delivery) {
        match self.0.entry((d.topic.clone(), d.partition)) {
            Entry::Vacant(v) => {
                v.insert((d.offset, d.offset));
            }
            Entry::Occupied(mut o) => {
                let (first, last) = o.get_mut();
                *first = (*first).min(d.offset);
                *last = (*last).max(d.offset);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `(topic, partition, first offset, last offset)`
    pub fn iter(&self) -> impl Iterator<Item = (&str, i32, i64, i64)> + '_ {
        self.0
            .iter()
            .map(|((topic, partition), (first, last))| (topic.as_str(), *partition, *first, *last))
    }
}

/// Consumer side of the log. Implementations never commit on their own.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Waits for the next message
    async fn recv(&self) -> Result<Delivery, Error>;
    /// Commits the offset following each partition's last offset and returns
    /// once the broker confirmed it
    async fn commit(&self, positions: &Positions) -> Result<(), Error>;
    /// Moves each partition back to its first offset so the batch is read again
    async fn rewind(&self, positions: &Positions) -> Result<(), Error>;
}

#[async_trait]
impl<T: LogSource + ?Sized> LogSource for Arc<T> {
    async fn recv(&self) -> Result<Delivery, Error> {
        (**self).recv().await
    }
    async fn commit(&self, positions: &Positions) -> Result<(), Error> {
        (**self).commit(positions).await
    }
    async fn rewind(&self, positions: &Positions) -> Result<(), Error> {
        (**self).rewind(positions).await
    }
}

pub struct KafkaSource {
    consumer: Arc<StreamConsumer>,
}

impl KafkaSource {
    pub fn new(cfg: &settings::Kafka) -> Result<KafkaSource, anyhow::Error> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &cfg.broker)
            .set("group.id", &cfg.consumer_group)
            .set("auto.offset.reset", "earliest")
            .set("enable.auto.commit", "false")
            .create()?;
        consumer.subscribe(&[cfg.topic.as_str()])?;
        Ok(KafkaSource {
            consumer: Arc::new(consumer),
        })
    }
}

#[async_trait]
impl LogSource for KafkaSource {
    async fn recv(&self) -> Result<Delivery, Error> {
        let msg = self
            .consumer
            .recv()
            .await
            .map_err(|e| Error::Consume(e.to_string()))?;
        Ok(Delivery {
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            payload: msg.payload().map(<[u8]>::to_vec),
        })
    }

    async fn commit(&self, positions: &Positions) -> Result<(), Error> {
        let topic_map: HashMap<(String, i32), Offset> = positions
            .iter()
            // commiting _next_ message offset as per https://docs.rs/rdkafka/latest/rdkafka/consumer/trait.Consumer.html#tymethod.commit
            .map(|(topic, partition, _, last)| ((topic.to_string(), partition), Offset::Offset(last + 1)))
            .collect();
        let tpl = TopicPartitionList::from_topic_map(&topic_map)
            .map_err(|e| Error::Commit(e.to_string()))?;
        // sync commit and seek block in librdkafka until the broker answers
        let consumer = Arc::clone(&self.consumer);
        tokio::task::spawn_blocking(move || consumer.commit(&tpl, CommitMode::Sync))
            .await
            .map_err(|e| Error::Commit(e.to_string()))?
            .map_err(|e| Error::Commit(e.to_string()))
    }

    async fn rewind(&self, positions: &Positions) -> Result<(), Error> {
        let starts: Vec<(String, i32, i64)> = positions
            .iter()
            .map(|(topic, partition, first, _)| (topic.to_string(), partition, first))
            .collect();
        let consumer = Arc::clone(&self.consumer);
        tokio::task::spawn_blocking(move || -> Result<(), Error> {
            for (topic, partition, first) in starts {
                consumer
                    .seek(&topic, partition, Offset::Offset(first), SEEK_TIMEOUT)
                    .map_err(|e| {
                        Error::Commit(format!("seeking {topic}/{partition} to {first}: {e}"))
                    })?;
            }
            Ok(())
        })
        .await
        .map_err(|e| Error::Commit(e.to_string()))?
    }
}

/// Messages pulled in one round, decoded
#[derive(Debug, Default)]
pub struct Batch {
    pub observations: Vec<VehicleObservation>,
    pub positions: Positions,
    pub messages: usize,
}

/// Result of one poll → persist → commit round
#[derive(Debug, PartialEq, Eq)]
pub enum Step {
    /// nothing decodable arrived
    Idle,
    Committed { messages: usize, observations: usize },
    /// store rejected the batch; it is read again or retried from memory
    PersistFailed,
    /// stored, but the offsets did not move
    CommitFailed,
    Shutdown,
}

pub struct Ingester<L: LogSource, S: Store> {
    source: L,
    store: S,
    batch_size: usize,
    batch_timeout: Duration,
    retry_delay: Duration,
    /// failed batch the log could not be rewound for
    held: Mutex<Option<Batch>>,
}

impl<L: LogSource, S: Store> Ingester<L, S> {
    pub fn new(source: L, store: S, cfg: &settings::Ingester) -> Ingester<L, S> {
        Ingester {
            source,
            store,
            batch_size: cfg.batch_size.max(1),
            batch_timeout: Duration::from_millis(cfg.batch_timeout_ms),
            retry_delay: Duration::from_millis(cfg.retry_delay_ms),
            held: Mutex::new(None),
        }
    }

    pub fn source(&self) -> &L {
        &self.source
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn start(&self, shutdown: CancellationToken) {
        info!(batch_size = self.batch_size, "consuming messages");
        loop {
            match self.step(&shutdown).await {
                Step::Shutdown => break,
                Step::PersistFailed => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = sleep(self.retry_delay) => {}
                    }
                }
                _ => {}
            }
        }
        info!("ingester stopped");
    }

    /// Pulls one batch, persists it and commits its offsets. A held batch is
    /// retried before anything new is pulled. Cancellation is only observed
    /// while waiting for the first message of the batch.
    pub async fn step(&self, shutdown: &CancellationToken) -> Step {
        let held = self
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(batch) = held {
            return self.try_insert(batch).await;
        }
        let Some(batch) = self.get_batch(shutdown).await else {
            return Step::Shutdown;
        };
        if batch.positions.is_empty() {
            return Step::Idle;
        }
        self.try_insert(batch).await
    }

    async fn try_insert(&self, batch: Batch) -> Step {
        if let Err(e) = self.store.upsert(&batch.observations).await {
            warn!(
                error = %e,
                messages = batch.messages,
                observations = batch.observations.len(),
                "persisting batch, offsets withheld"
            );
            if let Err(e) = self.source.rewind(&batch.positions).await {
                // the log moved past the batch, so it is kept for the next step
                warn!(error = %e, messages = batch.messages, "rewinding consumer, holding batch");
                *self.held.lock().unwrap_or_else(PoisonError::into_inner) = Some(batch);
            }
            return Step::PersistFailed;
        }
        if let Err(e) = self.source.commit(&batch.positions).await {
            warn!(error = %e, messages = batch.messages, "failed to commit offsets");
            return Step::CommitFailed;
        }
        debug!(
            messages = batch.messages,
            observations = batch.observations.len(),
            "batch committed"
        );
        Step::Committed {
            messages: batch.messages,
            observations: batch.observations.len(),
        }
    }

    /// Waits for a first message, then keeps pulling until the batch is full
    /// or the batch timeout passes. `None` means shutdown was requested.
    async fn get_batch(&self, shutdown: &CancellationToken) -> Option<Batch> {
        let mut batch = Batch::default();
        let first = tokio::select! {
            _ = shutdown.cancelled() => return None,
            r = self.source.recv() => r,
        };
        match first {
            Ok(d) => self.accept(&mut batch, d),
            Err(e) => {
                warn!(error = %e, "error receiving message");
                return Some(batch);
            }
        }

        let deadline = Instant::now() + self.batch_timeout;
        while batch.messages < self.batch_size {
            match timeout_at(deadline, self.source.recv()).await {
                Err(_) => break,
                Ok(Err(e)) => {
                    warn!(error = %e, "error receiving message");
                    break;
                }
                Ok(Ok(d)) => self.accept(&mut batch, d),
            }
        }
        Some(batch)
    }

    fn accept(&self, batch: &mut Batch, d: Delivery) {
        let decoded = match &d.payload {
            Some(payload) => observation::from_message(payload),
            None => Err(Error::Deserialize(String::from("empty payload"))),
        };
        match decoded {
            Ok(mut observations) => {
                batch.positions.track(&d);
                batch.messages += 1;
                batch.observations.append(&mut observations);
            }
            // left uncommitted; see DESIGN.md on undecodable messages
            Err(e) => warn!(
                topic = %d.topic,
                partition = d.partition,
                offset = d.offset,
                error = %e,
                "failed to decode message"
            ),
        }
    }
}
