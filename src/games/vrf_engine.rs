use crate::errors::OracleError;
use crate::games::types::{RandomWord, RequestId};
use schnorrkel::{ExpansionMode, Keypair, MiniSecretKey, PublicKey, Signature};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

const VRF_SIGNING_CONTEXT: &[u8] = b"chinchiro";

/// Publicly verifiable evidence for one generated random word
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomnessProof {
    pub request_id: RequestId,
    pub index: u32,
    pub word: RandomWord,
    pub proof: String,
    pub public_key: String,
    pub input_message: String,
}

/// VRF-based random word generator
pub struct VRFRollEngine {
    keypair: Arc<Keypair>,
}

impl VRFRollEngine {
    /// Create a new VRF engine with a keypair
    pub fn new(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
        }
    }

    /// Create a new VRF engine with a random keypair (for testing)
    pub fn new_random() -> Self {
        use rand_core::OsRng;
        let keypair = Keypair::generate_with(OsRng);
        Self::new(keypair)
    }

    /// Create a deterministic engine from a 32-byte seed (for reproducible simulations)
    pub fn from_seed(seed: [u8; 32]) -> Result<Self, OracleError> {
        let mini = MiniSecretKey::from_bytes(&seed)
            .map_err(|e| OracleError::Vrf(format!("Invalid seed: {:?}", e)))?;
        Ok(Self::new(mini.expand_to_keypair(ExpansionMode::Ed25519)))
    }

    pub fn input_message(request_id: RequestId, index: u32) -> String {
        format!("chinchiro:{}:{}", request_id, index)
    }

    /// Generate the `index`-th word of a request together with its proof
    pub fn generate_word(
        &self,
        request_id: RequestId,
        index: u32,
    ) -> RandomnessProof {
        let input_message = Self::input_message(request_id, index);
        let (output, proof) = self.vrf_sign(input_message.as_bytes());

        RandomnessProof {
            request_id,
            index,
            word: RandomWord::from_bytes(output),
            proof: hex::encode(proof),
            public_key: self.public_key_hex(),
            input_message,
        }
    }

    /// Internal VRF signing (generates output + proof)
    fn vrf_sign(&self, message: &[u8]) -> ([u8; 32], [u8; 64]) {
        let ctx = schnorrkel::signing_context(VRF_SIGNING_CONTEXT);
        let signature = self.keypair.sign(ctx.bytes(message));
        let proof = signature.to_bytes();

        // Output is the hash of the signature
        let output: [u8; 32] = Sha256::digest(proof).into();
        (output, proof)
    }

    /// Verify a proof against the request it claims to answer
    pub fn verify_proof(proof: &RandomnessProof) -> Result<bool, OracleError> {
        if proof.input_message != Self::input_message(proof.request_id, proof.index) {
            return Ok(false);
        }

        let signature_bytes = hex::decode(&proof.proof)
            .map_err(|e| OracleError::Vrf(format!("Invalid proof hex: {}", e)))?;
        let public_key_bytes = hex::decode(&proof.public_key)
            .map_err(|e| OracleError::Vrf(format!("Invalid public key hex: {}", e)))?;

        let public_key = PublicKey::from_bytes(&public_key_bytes)
            .map_err(|e| OracleError::Vrf(format!("Invalid public key: {:?}", e)))?;
        let signature = Signature::from_bytes(&signature_bytes)
            .map_err(|e| OracleError::Vrf(format!("Invalid signature: {:?}", e)))?;

        let ctx = schnorrkel::signing_context(VRF_SIGNING_CONTEXT);
        if public_key
            .verify(ctx.bytes(proof.input_message.as_bytes()), &signature)
            .is_err()
        {
            return Ok(false);
        }

        let computed: [u8; 32] = Sha256::digest(&signature_bytes).into();
        Ok(&computed == proof.word.as_bytes())
    }

    /// Get the public key for this VRF engine
    pub fn public_key(&self) -> [u8; 32] {
        self.keypair.public.to_bytes()
    }

    /// Get the public key as hex string
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key())
    }
}
