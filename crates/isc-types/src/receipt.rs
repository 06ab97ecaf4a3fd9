//! Per-request execution receipts

use crate::codec::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use crate::{Hname, RequestId, VmError};
use bytes::Bytes;
use isc_primitives::{BlockIndex, Gas};

/// Event emitted by a contract during a request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    /// Emitting contract
    pub contract: Hname,
    /// Event topic
    pub topic: String,
    /// Encoded payload
    pub payload: Bytes,
}

impl Event {
    /// New event
    pub fn new(contract: Hname, topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            contract,
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

impl Encodable for Event {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(3);
        s.append(&self.contract);
        s.append(&self.topic);
        s.append(&self.payload.to_vec());
    }
}

impl Decodable for Event {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        let payload: Vec<u8> = rlp.val_at(2)?;
        Ok(Event {
            contract: rlp.val_at(0)?,
            topic: rlp.val_at(1)?,
            payload: Bytes::from(payload),
        })
    }
}

/// Outcome of one processed request.
///
/// Every processed request gets a receipt, failed or not; the gas fee is
/// charged in both cases.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestReceipt {
    /// Request
    pub request_id: RequestId,
    /// Block the request was processed in
    pub block_index: BlockIndex,
    /// Position within the block
    pub request_index: u16,
    /// Effective gas budget
    pub gas_budget: Gas,
    /// Gas burned
    pub gas_burned: Gas,
    /// Fee charged, in base tokens
    pub gas_fee_charged: u64,
    /// Failure, if the request failed
    pub error: Option<VmError>,
    /// Events emitted; empty when the request failed
    pub events: Vec<Event>,
}

impl RequestReceipt {
    /// Whether the request succeeded
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

impl Encodable for RequestReceipt {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(8);
        s.append(&self.request_id);
        s.append(&self.block_index);
        s.append(&self.request_index);
        s.append(&self.gas_budget);
        s.append(&self.gas_burned);
        s.append(&self.gas_fee_charged);
        match &self.error {
            Some(e) => s.append(e),
            None => s.begin_list(0),
        };
        s.append_list::<Event, Event>(&self.events);
    }
}

impl Decodable for RequestReceipt {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        let err = rlp.at(6)?;
        let error = if err.item_count()? == 0 {
            None
        } else {
            Some(err.as_val()?)
        };
        Ok(RequestReceipt {
            request_id: rlp.val_at(0)?,
            block_index: rlp.val_at(1)?,
            request_index: rlp.val_at(2)?,
            gas_budget: rlp.val_at(3)?,
            gas_burned: rlp.val_at(4)?,
            gas_fee_charged: rlp.val_at(5)?,
            error,
            events: rlp.list_at(7)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{codec, hn};
    use isc_primitives::H256;

    fn receipt(error: Option<VmError>) -> RequestReceipt {
        RequestReceipt {
            request_id: RequestId::new(H256::from_bytes([1; 32]), 0),
            block_index: 3,
            request_index: 1,
            gas_budget: 10_000,
            gas_burned: 1_200,
            gas_fee_charged: 12,
            error,
            events: vec![Event::new(hn("blob"), "stored", vec![1, 2, 3])],
        }
    }

    #[test]
    fn test_success_codec() {
        let r = receipt(None);
        assert!(r.is_success());
        assert_eq!(codec::decode::<RequestReceipt>(&codec::encode(&r)).unwrap(), r);
    }

    #[test]
    fn test_failure_codec() {
        let r = receipt(Some(VmError::generic("boom")));
        assert!(!r.is_success());
        let decoded = codec::decode::<RequestReceipt>(&codec::encode(&r)).unwrap();
        assert_eq!(decoded.error.unwrap().message, "boom");
    }
}
