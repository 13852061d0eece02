//! Roll service
//!
//! Wraps a [`RandomnessOracle`] and turns its raw 256-bit words into die
//! triples. Requests are recorded as pending, fulfilled at most once, and
//! the requester is notified exactly once through its observer channel.
//! Nothing here ever blocks waiting on the oracle.

use crate::auth::{Authority, Capability};
use crate::errors::RollError;
use crate::games::oracle::{OracleRequest, RandomnessOracle};
use crate::games::pending_pool::PendingRollsPool;
use crate::games::types::{ConsumerId, DieTriple, RandomWord, RequestId, DICE_PER_TRIPLE};
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, oneshot};

/// Oracle parameters forwarded with every request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollServiceConfig {
    pub key_hash: String,
    pub subscription_id: u64,
    pub confirmations: u16,
    /// Callback budget for unbatched requests
    pub callback_gas_limit: u32,
    /// Callback budget for batched requests
    pub batched_callback_gas_limit: u32,
}

impl Default for RollServiceConfig {
    fn default() -> Self {
        Self {
            key_hash: "0x0000000000000000000000000000000000000000000000000000000000000000"
                .to_string(),
            subscription_id: 1,
            confirmations: 3,
            callback_gas_limit: 20_000,
            batched_callback_gas_limit: 20_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Fulfilled,
}

/// One randomness request and, once fulfilled, its result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomnessRequest {
    pub id: RequestId,
    pub requester: ConsumerId,
    pub triple_count: u32,
    pub batched: bool,
    pub num_words: u32,
    pub status: RequestStatus,
    pub words: Vec<RandomWord>,
    pub triples: Vec<DieTriple>,
    pub requested_at: DateTime<Utc>,
    pub fulfilled_at: Option<DateTime<Utc>>,
}

/// Notification delivered to the requester's observer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollFulfilled {
    pub request_id: RequestId,
    pub requester: ConsumerId,
    pub triples: Vec<DieTriple>,
}

/// Derives per-die words from the single seed word of a batched request
pub trait WordExpander: Send + Sync {
    fn expand(&self, seed: &RandomWord, count: usize) -> Vec<RandomWord>;
}

/// `word_i = SHA-256(seed || i)` with `i` as a big-endian u64
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Expander;

impl WordExpander for Sha256Expander {
    fn expand(&self, seed: &RandomWord, count: usize) -> Vec<RandomWord> {
        (0..count as u64)
            .map(|i| {
                let mut hasher = Sha256::new();
                hasher.update(seed.as_bytes());
                hasher.update(i.to_be_bytes());
                RandomWord::from_bytes(hasher.finalize().into())
            })
            .collect()
    }
}

pub struct RollService {
    oracle: Arc<dyn RandomnessOracle>,
    expander: Box<dyn WordExpander>,
    authority: Authority,
    config: RwLock<RollServiceConfig>,
    consumers: DashSet<ConsumerId>,
    requests: DashMap<RequestId, RandomnessRequest>,
    observers: DashMap<ConsumerId, mpsc::UnboundedSender<RollFulfilled>>,
    waiters: PendingRollsPool,
}

impl RollService {
    /// Create a new roll service; the returned capability administers it
    pub fn new(oracle: Arc<dyn RandomnessOracle>, config: RollServiceConfig) -> (Self, Capability) {
        let (authority, capability) = Authority::new();
        let service = Self {
            oracle,
            expander: Box::new(Sha256Expander),
            authority,
            config: RwLock::new(config),
            consumers: DashSet::new(),
            requests: DashMap::new(),
            observers: DashMap::new(),
            waiters: PendingRollsPool::new(),
        };
        (service, capability)
    }

    /// Replace the batched-roll word expander
    pub fn with_expander(mut self, expander: Box<dyn WordExpander>) -> Self {
        self.expander = expander;
        self
    }

    // ---- admin ----

    fn authorize(&self, capability: &Capability) -> Result<(), RollError> {
        if self.authority.permits(capability) {
            Ok(())
        } else {
            Err(RollError::AdminRequired)
        }
    }

    pub fn add_consumer(&self, capability: &Capability, consumer: ConsumerId) -> Result<(), RollError> {
        self.authorize(capability)?;
        tracing::info!(%consumer, "consumer registered");
        self.consumers.insert(consumer);
        Ok(())
    }

    pub fn remove_consumer(&self, capability: &Capability, consumer: &ConsumerId) -> Result<(), RollError> {
        self.authorize(capability)?;
        if self.consumers.remove(consumer).is_some() {
            tracing::info!(%consumer, "consumer removed");
        }
        Ok(())
    }

    pub fn set_confirmations(&self, capability: &Capability, confirmations: u16) -> Result<(), RollError> {
        self.authorize(capability)?;
        self.write_config().confirmations = confirmations;
        Ok(())
    }

    pub fn set_callback_gas_limit(
        &self,
        capability: &Capability,
        single: u32,
        batched: u32,
    ) -> Result<(), RollError> {
        self.authorize(capability)?;
        let mut config = self.write_config();
        config.callback_gas_limit = single;
        config.batched_callback_gas_limit = batched;
        Ok(())
    }

    pub fn config(&self) -> RollServiceConfig {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn write_config(&self) -> std::sync::RwLockWriteGuard<'_, RollServiceConfig> {
        self.config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_consumer(&self, consumer: &ConsumerId) -> bool {
        self.consumers.contains(consumer)
    }

    // ---- requests ----

    /// Ask the oracle for enough randomness to derive `triple_count` triples
    pub fn request_roll(
        &self,
        caller: &ConsumerId,
        triple_count: u32,
        batched: bool,
    ) -> Result<RequestId, RollError> {
        if !self.consumers.contains(caller) {
            return Err(RollError::Unauthorized(caller.clone()));
        }
        if triple_count == 0 {
            return Err(RollError::InvalidTripleCount);
        }

        let config = self.config();
        let num_words = if batched {
            1
        } else {
            triple_count.saturating_mul(DICE_PER_TRIPLE as u32)
        };
        let oracle_request = OracleRequest {
            key_hash: config.key_hash,
            subscription_id: config.subscription_id,
            confirmations: config.confirmations,
            callback_gas_limit: if batched {
                config.batched_callback_gas_limit
            } else {
                config.callback_gas_limit
            },
            num_words,
        };

        let request_id = self.oracle.request_random_words(oracle_request)?;
        self.requests.insert(
            request_id,
            RandomnessRequest {
                id: request_id,
                requester: caller.clone(),
                triple_count,
                batched,
                num_words,
                status: RequestStatus::Pending,
                words: Vec::new(),
                triples: Vec::new(),
                requested_at: Utc::now(),
                fulfilled_at: None,
            },
        );

        tracing::debug!(%request_id, requester = %caller, triple_count, batched, "roll requested");
        Ok(request_id)
    }

    /// Oracle callback: derive triples, store them and notify the requester
    pub fn on_fulfilled(
        &self,
        request_id: RequestId,
        words: Vec<RandomWord>,
    ) -> Result<Vec<DieTriple>, RollError> {
        let (requester, triples) = {
            let mut entry = self
                .requests
                .get_mut(&request_id)
                .ok_or(RollError::UnknownRequest(request_id))?;
            let request = entry.value_mut();

            if request.status == RequestStatus::Fulfilled {
                return Err(RollError::AlreadyFulfilled(request_id));
            }
            if words.is_empty() {
                return Err(RollError::EmptyFulfillment(request_id));
            }

            let dice = request.triple_count as usize * DICE_PER_TRIPLE;
            let die_words = if request.batched {
                self.expander.expand(&words[0], dice)
            } else {
                if words.len() < dice {
                    return Err(RollError::WordCountMismatch {
                        request_id,
                        expected: dice,
                        actual: words.len(),
                    });
                }
                words[..dice].to_vec()
            };

            let triples = triples_from_words(&die_words);
            request.words = words;
            request.triples = triples.clone();
            request.status = RequestStatus::Fulfilled;
            request.fulfilled_at = Some(Utc::now());
            (request.requester.clone(), triples)
        };

        tracing::debug!(%request_id, %requester, triples = triples.len(), "roll fulfilled");

        if let Some(observer) = self.observers.get(&requester) {
            let event = RollFulfilled {
                request_id,
                requester: requester.clone(),
                triples: triples.clone(),
            };
            if observer.send(event).is_err() {
                tracing::warn!(%request_id, %requester, "observer channel closed, notification dropped");
            }
        }
        self.waiters.complete(request_id, &triples);

        Ok(triples)
    }

    /// Triples of a fulfilled request
    pub fn get_rolls(&self, request_id: RequestId) -> Result<Vec<DieTriple>, RollError> {
        let request = self
            .requests
            .get(&request_id)
            .ok_or(RollError::UnknownRequest(request_id))?;
        match request.status {
            RequestStatus::Fulfilled => Ok(request.triples.clone()),
            RequestStatus::Pending => Err(RollError::NotFulfilled(request_id)),
        }
    }

    pub fn request(&self, request_id: RequestId) -> Option<RandomnessRequest> {
        self.requests.get(&request_id).map(|r| r.value().clone())
    }

    pub fn pending_count(&self) -> usize {
        self.requests
            .iter()
            .filter(|r| r.status == RequestStatus::Pending)
            .count()
    }

    // ---- notification ----

    /// Register the channel that receives this consumer's fulfillments.
    ///
    /// A second registration replaces the first.
    pub fn register_observer(&self, consumer: ConsumerId) -> mpsc::UnboundedReceiver<RollFulfilled> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.insert(consumer, tx);
        rx
    }

    /// One-shot wait for a request's triples
    pub fn wait_for_rolls(
        &self,
        request_id: RequestId,
    ) -> Result<oneshot::Receiver<Vec<DieTriple>>, RollError> {
        let (tx, rx) = oneshot::channel();

        // Hold the entry while registering so fulfillment cannot slip in between
        let request = self
            .requests
            .get(&request_id)
            .ok_or(RollError::UnknownRequest(request_id))?;
        match request.status {
            RequestStatus::Fulfilled => {
                let _ = tx.send(request.triples.clone());
            }
            RequestStatus::Pending => self.waiters.add_waiter(request_id, tx),
        }
        Ok(rx)
    }
}

/// Map each word to a face and group consecutive faces into triples
fn triples_from_words(words: &[RandomWord]) -> Vec<DieTriple> {
    words
        .chunks_exact(DICE_PER_TRIPLE)
        .filter_map(|chunk| {
            DieTriple::new(
                chunk[0].die_face(),
                chunk[1].die_face(),
                chunk[2].die_face(),
            )
            .ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::OracleError;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    /// Oracle that records requests and hands out sequential ids
    #[derive(Default)]
    struct RecordingOracle {
        next: AtomicU64,
        requests: Mutex<Vec<OracleRequest>>,
        reject: bool,
    }

    impl RandomnessOracle for RecordingOracle {
        fn request_random_words(&self, request: OracleRequest) -> Result<RequestId, OracleError> {
            if self.reject {
                return Err(OracleError::RequestRejected("subscription unfunded".into()));
            }
            self.requests.lock().unwrap().push(request);
            Ok(RequestId(self.next.fetch_add(1, Ordering::SeqCst) + 1))
        }
    }

    fn setup() -> (RollService, Capability, Arc<RecordingOracle>, ConsumerId) {
        let oracle = Arc::new(RecordingOracle::default());
        let (service, cap) = RollService::new(oracle.clone(), RollServiceConfig::default());
        let consumer = ConsumerId::new("engine");
        service.add_consumer(&cap, consumer.clone()).unwrap();
        (service, cap, oracle, consumer)
    }

    fn words(values: &[u64]) -> Vec<RandomWord> {
        values.iter().map(|&v| RandomWord::from(v)).collect()
    }

    #[test]
    fn test_unbatched_request_asks_one_word_per_die() {
        let (service, _cap, oracle, consumer) = setup();
        let id = service.request_roll(&consumer, 2, false).unwrap();

        let sent = oracle.requests.lock().unwrap()[0].clone();
        assert_eq!(sent.num_words, 6);
        assert_eq!(sent.confirmations, 3);
        assert_eq!(sent.callback_gas_limit, 20_000);

        let triples = service.on_fulfilled(id, words(&[0, 1, 2, 3, 4, 5, 99])).unwrap();
        assert_eq!(
            triples,
            vec![DieTriple::new(1, 2, 3).unwrap(), DieTriple::new(4, 5, 6).unwrap()]
        );
        assert_eq!(service.get_rolls(id).unwrap(), triples);
        assert_eq!(service.get_rolls(id).unwrap(), triples);
        assert_eq!(service.request(id).unwrap().words.len(), 7);
    }

    #[test]
    fn test_request_validation() {
        let (service, _cap, _oracle, consumer) = setup();
        assert!(matches!(
            service.request_roll(&ConsumerId::new("stranger"), 1, false),
            Err(RollError::Unauthorized(_))
        ));
        assert!(matches!(
            service.request_roll(&consumer, 0, false),
            Err(RollError::InvalidTripleCount)
        ));
    }

    #[test]
    fn test_oracle_rejection_records_nothing() {
        let oracle = Arc::new(RecordingOracle {
            reject: true,
            ..Default::default()
        });
        let (service, cap) = RollService::new(oracle, RollServiceConfig::default());
        let consumer = ConsumerId::new("engine");
        service.add_consumer(&cap, consumer.clone()).unwrap();

        assert!(matches!(
            service.request_roll(&consumer, 1, false),
            Err(RollError::Oracle(_))
        ));
        assert_eq!(service.pending_count(), 0);
    }

    #[test]
    fn test_fulfillment_errors() {
        let (service, _cap, _oracle, consumer) = setup();
        let id = service.request_roll(&consumer, 1, false).unwrap();

        assert!(matches!(service.get_rolls(id), Err(RollError::NotFulfilled(_))));
        assert!(matches!(
            service.on_fulfilled(RequestId(99), words(&[1, 2, 3])),
            Err(RollError::UnknownRequest(_))
        ));
        assert!(matches!(
            service.on_fulfilled(id, Vec::new()),
            Err(RollError::EmptyFulfillment(_))
        ));
        assert!(matches!(
            service.on_fulfilled(id, words(&[1, 2])),
            Err(RollError::WordCountMismatch { expected: 3, actual: 2, .. })
        ));
        // failed deliveries leave the request pending
        assert_eq!(service.pending_count(), 1);

        service.on_fulfilled(id, words(&[1, 2, 3])).unwrap();
        assert!(matches!(
            service.on_fulfilled(id, words(&[4, 4, 4])),
            Err(RollError::AlreadyFulfilled(_))
        ));
        assert_eq!(service.get_rolls(id).unwrap(), vec![DieTriple::new(2, 3, 4).unwrap()]);
    }

    #[test]
    fn test_batched_rolls_expand_a_single_word() {
        let (service, _cap, oracle, consumer) = setup();
        let a = service.request_roll(&consumer, 4, true).unwrap();
        let b = service.request_roll(&consumer, 4, true).unwrap();
        assert_eq!(oracle.requests.lock().unwrap()[0].num_words, 1);

        let seed = words(&[424242]);
        let first = service.on_fulfilled(a, seed.clone()).unwrap();
        let second = service.on_fulfilled(b, seed).unwrap();
        assert_eq!(first.len(), 4);
        assert_eq!(first, second);
    }

    #[test]
    fn test_admin_operations_require_capability() {
        let (service, cap, oracle, consumer) = setup();
        let (_other, forged) = Authority::new();

        assert!(matches!(
            service.set_confirmations(&forged, 10),
            Err(RollError::AdminRequired)
        ));
        assert!(service.add_consumer(&forged, ConsumerId::new("x")).is_err());

        service.set_confirmations(&cap, 10).unwrap();
        service.set_callback_gas_limit(&cap, 30_000, 50_000).unwrap();
        service.request_roll(&consumer, 1, true).unwrap();
        let sent = oracle.requests.lock().unwrap()[0].clone();
        assert_eq!(sent.confirmations, 10);
        assert_eq!(sent.callback_gas_limit, 50_000);

        service.remove_consumer(&cap, &consumer).unwrap();
        assert!(!service.is_consumer(&consumer));
        assert!(service.request_roll(&consumer, 1, false).is_err());
    }

    #[tokio::test]
    async fn test_observer_notified_exactly_once() {
        let (service, _cap, _oracle, consumer) = setup();
        let mut rx = service.register_observer(consumer.clone());
        let id = service.request_roll(&consumer, 1, false).unwrap();

        service.on_fulfilled(id, words(&[5, 5, 5])).unwrap();
        let _ = service.on_fulfilled(id, words(&[0, 0, 0]));

        let event = rx.recv().await.expect("notification");
        assert_eq!(event.request_id, id);
        assert_eq!(event.requester, consumer);
        assert_eq!(event.triples, vec![DieTriple::new(6, 6, 6).unwrap()]);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_wait_for_rolls_before_and_after_fulfillment() {
        let (service, _cap, _oracle, consumer) = setup();
        let id = service.request_roll(&consumer, 1, false).unwrap();

        let early = service.wait_for_rolls(id).unwrap();
        service.on_fulfilled(id, words(&[3, 4, 5])).unwrap();
        let late = service.wait_for_rolls(id).unwrap();

        let expected = vec![DieTriple::new(4, 5, 6).unwrap()];
        assert_eq!(early.await.unwrap(), expected);
        assert_eq!(late.await.unwrap(), expected);
        assert!(service.wait_for_rolls(RequestId(404)).is_err());
    }
}
