//! Gas limits, fee policy and metering

use isc_types::codec::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use isc_types::{Gas, VmError, VmErrorCode};
use serde::{Deserialize, Serialize};

/// Per-request gas bounds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasLimits {
    /// Every processed request burns at least this much
    pub min_gas_per_request: Gas,
    /// Upper bound of a request's budget
    pub max_gas_per_request: Gas,
    /// Budget of a view call issued from outside the chain
    pub max_gas_external_view_call: Gas,
}

impl Default for GasLimits {
    fn default() -> Self {
        Self {
            min_gas_per_request: 10_000,
            max_gas_per_request: 50_000_000,
            max_gas_external_view_call: 50_000_000,
        }
    }
}

impl Encodable for GasLimits {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(3);
        s.append(&self.min_gas_per_request);
        s.append(&self.max_gas_per_request);
        s.append(&self.max_gas_external_view_call);
    }
}

impl Decodable for GasLimits {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        Ok(GasLimits {
            min_gas_per_request: rlp.val_at(0)?,
            max_gas_per_request: rlp.val_at(1)?,
            max_gas_external_view_call: rlp.val_at(2)?,
        })
    }
}

/// How burned gas converts into a fee in base tokens.
///
/// `gas_per_token.0` gas costs `gas_per_token.1` base tokens. A token side
/// of 0 makes the chain free.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasFeePolicy {
    /// Ratio gas : tokens
    pub gas_per_token: (u32, u32),
    /// Percentage of each fee paid to the validator fee target
    pub validator_fee_share: u8,
}

impl Default for GasFeePolicy {
    fn default() -> Self {
        Self {
            gas_per_token: (100, 1),
            validator_fee_share: 0,
        }
    }
}

impl GasFeePolicy {
    /// Policy under which nothing is charged
    pub fn free() -> Self {
        Self {
            gas_per_token: (1, 0),
            validator_fee_share: 0,
        }
    }

    /// Whether no fee is ever charged
    pub fn is_free(&self) -> bool {
        self.gas_per_token.1 == 0
    }

    /// Fee for `gas`, rounded up
    pub fn fee_for_gas(&self, gas: Gas) -> u64 {
        let (g, t) = self.gas_per_token;
        if t == 0 {
            return 0;
        }
        let g = u128::from(g.max(1));
        let fee = (u128::from(gas) * u128::from(t)).div_ceil(g);
        u64::try_from(fee).unwrap_or(u64::MAX)
    }

    /// Gas that `tokens` can pay for
    pub fn gas_for_tokens(&self, tokens: u64) -> Gas {
        let (g, t) = self.gas_per_token;
        if t == 0 {
            return Gas::MAX;
        }
        let gas = u128::from(tokens) * u128::from(g) / u128::from(t);
        u64::try_from(gas).unwrap_or(Gas::MAX)
    }

    /// Split a fee into (common account part, validator part)
    pub fn split_fee(&self, fee: u64) -> (u64, u64) {
        let share = u128::from(self.validator_fee_share.min(100));
        let validator = (u128::from(fee) * share / 100) as u64;
        (fee - validator, validator)
    }
}

impl Encodable for GasFeePolicy {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(3);
        s.append(&self.gas_per_token.0);
        s.append(&self.gas_per_token.1);
        s.append(&self.validator_fee_share);
    }
}

impl Decodable for GasFeePolicy {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        Ok(GasFeePolicy {
            gas_per_token: (rlp.val_at(0)?, rlp.val_at(1)?),
            validator_fee_share: rlp.val_at(2)?,
        })
    }
}

/// What gas is burned for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BurnCode {
    /// Calling an entry point
    CallContract,
    /// Moving funds out of an allowance
    TransferAllowance,
    /// Emitting an event; units are payload bytes
    EmitEvent,
    /// Storing a new blob; units are stored bytes
    StoreBlob,
    /// Deploying a contract
    DeployContract,
    /// Sending assets to L1
    SendToL1,
    /// Contract-defined work; units are gas
    Custom,
}

impl BurnCode {
    /// Gas cost for `units`
    pub fn cost(self, units: u64) -> Gas {
        match self {
            BurnCode::CallContract => 100,
            BurnCode::TransferAllowance => 100,
            BurnCode::EmitEvent => units.saturating_add(10),
            BurnCode::StoreBlob => units.saturating_add(500),
            BurnCode::DeployContract => 1_000,
            BurnCode::SendToL1 => 1_000,
            BurnCode::Custom => units,
        }
    }
}

/// Gas accounting of one request
#[derive(Clone, Copy, Debug, Default)]
pub struct GasMeter {
    budget: Gas,
    burned: Gas,
}

impl GasMeter {
    /// Meter with `budget`
    pub fn new(budget: Gas) -> Self {
        Self { budget, burned: 0 }
    }

    /// Burn `gas`. Exceeding the budget burns the whole budget and fails.
    pub fn burn(&mut self, gas: Gas) -> Result<(), VmError> {
        let total = self.burned.saturating_add(gas);
        if total > self.budget {
            self.burned = self.budget;
            return Err(VmError::new(
                VmErrorCode::GasBudgetExceeded,
                format!("gas budget {} exceeded", self.budget),
            ));
        }
        self.burned = total;
        Ok(())
    }

    /// Raise burned gas to at least `min`
    pub fn burn_at_least(&mut self, min: Gas) {
        self.burned = self.burned.max(min);
    }

    /// Gas burned
    pub fn burned(&self) -> Gas {
        self.burned
    }

    /// Budget
    pub fn budget(&self) -> Gas {
        self.budget
    }

    /// Gas left
    pub fn remaining(&self) -> Gas {
        self.budget - self.burned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isc_types::codec;

    // ==================== Fee Policy ====================

    #[test]
    fn test_fee_rounds_up() {
        let policy = GasFeePolicy::default();
        assert_eq!(policy.fee_for_gas(100), 1);
        assert_eq!(policy.fee_for_gas(101), 2);
        assert_eq!(policy.fee_for_gas(0), 0);
        assert_eq!(policy.gas_for_tokens(3), 300);
    }

    #[test]
    fn test_free_policy() {
        let policy = GasFeePolicy::free();
        assert!(policy.is_free());
        assert_eq!(policy.fee_for_gas(1_000_000), 0);
        assert_eq!(policy.gas_for_tokens(0), Gas::MAX);
    }

    #[test]
    fn test_split_fee() {
        let policy = GasFeePolicy {
            gas_per_token: (100, 1),
            validator_fee_share: 30,
        };
        assert_eq!(policy.split_fee(100), (70, 30));
        assert_eq!(policy.split_fee(0), (0, 0));
    }

    #[test]
    fn test_codec() {
        let policy = GasFeePolicy {
            gas_per_token: (7, 3),
            validator_fee_share: 15,
        };
        assert_eq!(codec::decode::<GasFeePolicy>(&codec::encode(&policy)).unwrap(), policy);
        let limits = GasLimits::default();
        assert_eq!(codec::decode::<GasLimits>(&codec::encode(&limits)).unwrap(), limits);
    }

    // ==================== Meter ====================

    #[test]
    fn test_meter_exceeding_burns_budget() {
        let mut meter = GasMeter::new(1_000);
        meter.burn(600).unwrap();
        let err = meter.burn(500).unwrap_err();
        assert_eq!(err.code, VmErrorCode::GasBudgetExceeded);
        assert_eq!(meter.burned(), 1_000);
        assert_eq!(meter.remaining(), 0);
    }

    #[test]
    fn test_burn_at_least() {
        let mut meter = GasMeter::new(50_000);
        meter.burn(10).unwrap();
        meter.burn_at_least(10_000);
        assert_eq!(meter.burned(), 10_000);
        meter.burn_at_least(5);
        assert_eq!(meter.burned(), 10_000);
    }
}
