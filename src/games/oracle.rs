//! Randomness oracle boundary
//!
//! The roll service only depends on [`RandomnessOracle`]. [`VrfCoordinator`]
//! is the bundled implementation: it queues requests and later answers them
//! with VRF-generated words, either on demand or with caller-chosen words.

use crate::errors::{OracleError, RollError};
use crate::games::roll_service::RollService;
use crate::games::types::{RandomWord, RequestId};
use crate::games::vrf_engine::{RandomnessProof, VRFRollEngine};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Most words a single request may ask for
pub const MAX_NUM_WORDS: u32 = 500;

/// Highest confirmation depth the coordinator accepts
pub const MAX_REQUEST_CONFIRMATIONS: u16 = 200;

/// Parameters forwarded untouched from the roll service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleRequest {
    pub key_hash: String,
    pub subscription_id: u64,
    pub confirmations: u16,
    pub callback_gas_limit: u32,
    pub num_words: u32,
}

/// Accepts randomness requests and assigns their ids.
///
/// Delivery is asynchronous and happens through
/// [`RollService::on_fulfilled`].
pub trait RandomnessOracle: Send + Sync {
    fn request_random_words(&self, request: OracleRequest) -> Result<RequestId, OracleError>;
}

/// Local VRF-backed coordinator
pub struct VrfCoordinator {
    engine: VRFRollEngine,
    next_id: AtomicU64,
    pending: DashMap<RequestId, OracleRequest>,
    proofs: DashMap<RequestId, Vec<RandomnessProof>>,
}

impl VrfCoordinator {
    pub fn new(engine: VRFRollEngine) -> Self {
        Self {
            engine,
            next_id: AtomicU64::new(1),
            pending: DashMap::new(),
            proofs: DashMap::new(),
        }
    }

    fn queued(&self, request_id: RequestId) -> Result<OracleRequest, OracleError> {
        self.pending
            .get(&request_id)
            .map(|e| e.value().clone())
            .ok_or(OracleError::UnknownRequest(request_id))
    }

    /// Fulfil a queued request with freshly generated VRF words.
    ///
    /// The request stays queued if the roll service rejects the delivery.
    pub fn fulfill_random_words(
        &self,
        request_id: RequestId,
        service: &RollService,
    ) -> Result<(), RollError> {
        let request = self.queued(request_id)?;
        let proofs: Vec<RandomnessProof> = (0..request.num_words)
            .map(|index| self.engine.generate_word(request_id, index))
            .collect();
        let words = proofs.iter().map(|p| p.word).collect();

        tracing::debug!(%request_id, num_words = request.num_words, "fulfilling with VRF words");
        service.on_fulfilled(request_id, words)?;
        self.pending.remove(&request_id);
        self.proofs.insert(request_id, proofs);
        Ok(())
    }

    /// Fulfil a queued request with the given words.
    ///
    /// The request stays queued if the roll service rejects the delivery.
    pub fn fulfill_random_words_with_override(
        &self,
        request_id: RequestId,
        service: &RollService,
        words: Vec<RandomWord>,
    ) -> Result<(), RollError> {
        self.queued(request_id)?;

        tracing::debug!(%request_id, num_words = words.len(), "fulfilling with override words");
        service.on_fulfilled(request_id, words)?;
        self.pending.remove(&request_id);
        Ok(())
    }

    /// Queued request ids, oldest first
    pub fn pending_requests(&self) -> Vec<RequestId> {
        let mut ids: Vec<RequestId> = self.pending.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    pub fn pending_request(&self, request_id: RequestId) -> Option<OracleRequest> {
        self.pending.get(&request_id).map(|e| e.value().clone())
    }

    pub fn proofs(&self, request_id: RequestId) -> Option<Vec<RandomnessProof>> {
        self.proofs.get(&request_id).map(|e| e.value().clone())
    }

    pub fn public_key_hex(&self) -> String {
        self.engine.public_key_hex()
    }
}

impl RandomnessOracle for VrfCoordinator {
    fn request_random_words(&self, request: OracleRequest) -> Result<RequestId, OracleError> {
        if request.num_words == 0 || request.num_words > MAX_NUM_WORDS {
            return Err(OracleError::RequestRejected(format!(
                "num_words {} outside 1..={}",
                request.num_words, MAX_NUM_WORDS
            )));
        }
        if request.confirmations > MAX_REQUEST_CONFIRMATIONS {
            return Err(OracleError::RequestRejected(format!(
                "confirmations {} above {}",
                request.confirmations, MAX_REQUEST_CONFIRMATIONS
            )));
        }

        let request_id = RequestId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.pending.insert(request_id, request);
        Ok(request_id)
    }
}
