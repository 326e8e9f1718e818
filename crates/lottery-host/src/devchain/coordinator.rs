//! VRF coordinator mock

use std::collections::BTreeMap;

use alloy_primitives::{Address, U256};
use lottery_bindings::codec::{self, AbiValue};
use lottery_bindings::keccak256;
use lottery_bindings::revert::NONEXISTENT_REQUEST;
use lottery_bindings::RevertReason;

/// Words requested per draw
pub const NUM_WORDS: u32 = 1;

/// Pending randomness request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RandomnessRequest {
    /// Contract that will receive the words
    pub consumer: Address,
    /// Number of words to deliver
    pub num_words: u32,
}

/// Coordinator mock: hands out request ids and lets the test deliver words
#[derive(Clone, Debug)]
pub struct VrfCoordinatorMock {
    next_request_id: U256,
    requests: BTreeMap<U256, RandomnessRequest>,
}

impl Default for VrfCoordinatorMock {
    fn default() -> Self {
        Self::new()
    }
}

impl VrfCoordinatorMock {
    /// Fresh coordinator; the first request id is 1
    pub const fn new() -> Self {
        Self {
            next_request_id: U256::from_limbs([1, 0, 0, 0]),
            requests: BTreeMap::new(),
        }
    }

    /// Register a request and return its id
    pub fn request_random_words(&mut self, consumer: Address, num_words: u32) -> U256 {
        let request_id = self.next_request_id;
        self.next_request_id += U256::from(1);
        self.requests.insert(request_id, RandomnessRequest { consumer, num_words });
        request_id
    }

    /// Whether `request_id` is still pending
    pub fn is_pending(&self, request_id: &U256) -> bool {
        self.requests.contains_key(request_id)
    }

    /// Consume a pending request and produce the words to deliver.
    ///
    /// Empty `words` means "derive them"; otherwise their count must match the request.
    pub fn fulfill(
        &mut self,
        request_id: U256,
        words: &[U256],
    ) -> Result<(RandomnessRequest, Vec<U256>), RevertReason> {
        let request = self
            .requests
            .get(&request_id)
            .cloned()
            .ok_or_else(|| RevertReason::Message(NONEXISTENT_REQUEST.to_string()))?;

        let words = if words.is_empty() {
            derived_words(request_id, request.num_words)
        } else if words.len() == request.num_words as usize {
            words.to_vec()
        } else {
            return Err(RevertReason::Message("InvalidRandomWords".to_string()));
        };

        self.requests.remove(&request_id);
        Ok((request, words))
    }
}

/// `keccak256(abi.encode(requestId, i))` for each word index
pub fn derived_words(request_id: U256, num_words: u32) -> Vec<U256> {
    (0..num_words)
        .map(|i| {
            let encoded = codec::encode(&[AbiValue::Uint(request_id), AbiValue::Uint(U256::from(i))]);
            U256::from_be_bytes(keccak256(&encoded))
        })
        .collect()
}
