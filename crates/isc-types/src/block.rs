//! Block summaries

use crate::codec::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use isc_primitives::{BlockIndex, Gas, Timestamp};

/// Summary of a produced block, stored by the block log
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockInfo {
    /// Index; genesis is block 0
    pub block_index: BlockIndex,
    /// Batch timestamp
    pub timestamp: Timestamp,
    /// Requests processed
    pub total_requests: u16,
    /// Requests that succeeded
    pub num_successful_requests: u16,
    /// Requests that arrived off-ledger
    pub num_off_ledger_requests: u16,
    /// Gas burned by all requests
    pub gas_burned: Gas,
    /// Fees charged by all requests
    pub gas_fee_charged: u64,
}

impl Encodable for BlockInfo {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(7);
        s.append(&self.block_index);
        s.append(&self.timestamp);
        s.append(&self.total_requests);
        s.append(&self.num_successful_requests);
        s.append(&self.num_off_ledger_requests);
        s.append(&self.gas_burned);
        s.append(&self.gas_fee_charged);
    }
}

impl Decodable for BlockInfo {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        Ok(BlockInfo {
            block_index: rlp.val_at(0)?,
            timestamp: rlp.val_at(1)?,
            total_requests: rlp.val_at(2)?,
            num_successful_requests: rlp.val_at(3)?,
            num_off_ledger_requests: rlp.val_at(4)?,
            gas_burned: rlp.val_at(5)?,
            gas_fee_charged: rlp.val_at(6)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;

    #[test]
    fn test_codec() {
        let info = BlockInfo {
            block_index: 12,
            timestamp: 1_700_000_000,
            total_requests: 4,
            num_successful_requests: 3,
            num_off_ledger_requests: 1,
            gas_burned: 5_000,
            gas_fee_charged: 50,
        };
        assert_eq!(codec::decode::<BlockInfo>(&codec::encode(&info)).unwrap(), info);
    }
}
