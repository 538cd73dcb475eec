//! Configuration of the script-based swap engines: the network of operations and the fee policy.
//! The configuration is read-only once an engine is created, and can be shared between swap
//! attempts.
//!
//! ```rust
//! use atomicswap_core::config::SwapConfig;
//! use atomicswap_core::blockchain::Network;
//!
//! let config: SwapConfig = serde_json::from_str(
//!     r#"{"network":"Testnet","fee_strategy":{"fixed":"10000 satoshi/kvB"},"fee_priority":"Low"}"#,
//! ).unwrap();
//! assert_eq!(config.network, Network::Testnet);
//! ```

use crate::bitcoin::fee::{FeeEstimator, SatPerKvB};
use crate::blockchain::{FeePriority, FeeStrategy, Network};

/// Default fee rate, 10 satoshis per virtual byte.
pub const DEFAULT_FEE_RATE: u64 = 10_000;

/// Configuration of a swap engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapConfig {
    /// The network of operations.
    pub network: Network,
    /// The fee policy, rates provided by the wallet are only used if the policy accepts them.
    pub fee_strategy: FeeStrategy<SatPerKvB>,
    /// The priority used to choose a rate in the policy.
    #[serde(default = "default_priority")]
    pub fee_priority: FeePriority,
}

fn default_priority() -> FeePriority {
    FeePriority::Low
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            network: Network::Local,
            fee_strategy: FeeStrategy::Fixed(SatPerKvB::from_sat(DEFAULT_FEE_RATE)),
            fee_priority: default_priority(),
        }
    }
}

impl SwapConfig {
    /// Create a configuration with a fixed fee rate.
    pub fn new(network: Network, fee_rate: SatPerKvB) -> Self {
        Self {
            network,
            fee_strategy: FeeStrategy::Fixed(fee_rate),
            fee_priority: default_priority(),
        }
    }

    /// Return the strategy to apply given the rate proposed by the wallet: the proposed rate if
    /// the configured policy accepts it, the policy otherwise.
    pub fn strategy_for(&self, proposed: SatPerKvB) -> FeeStrategy<SatPerKvB> {
        if self.fee_strategy.check(&proposed) {
            FeeStrategy::Fixed(proposed)
        } else {
            log::debug!(
                "Proposed fee rate {} rejected by policy {}",
                proposed,
                self.fee_strategy
            );
            self.fee_strategy
        }
    }

    /// Return the fee estimator for the rate proposed by the wallet.
    pub fn fee_estimator(&self, proposed: SatPerKvB) -> FeeEstimator {
        FeeEstimator::new(&self.strategy_for(proposed), self.fee_priority)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = SwapConfig::default();
        assert_eq!(config.network, Network::Local);
        assert_eq!(
            config.fee_strategy.rate(FeePriority::High),
            SatPerKvB::from_sat(DEFAULT_FEE_RATE)
        );
    }

    #[test]
    fn wallet_rate_checked_against_policy() {
        let config = SwapConfig::new(Network::Testnet, SatPerKvB::from_sat(5_000));
        assert_eq!(
            config.strategy_for(SatPerKvB::from_sat(5_000)),
            FeeStrategy::Fixed(SatPerKvB::from_sat(5_000))
        );
        // fixed policy, any other rate falls back to the policy
        assert_eq!(
            config.strategy_for(SatPerKvB::from_sat(50_000)),
            FeeStrategy::Fixed(SatPerKvB::from_sat(5_000))
        );
        assert_eq!(
            config.fee_estimator(SatPerKvB::from_sat(1)).rate(),
            SatPerKvB::from_sat(5_000)
        );
    }

    #[cfg(feature = "fee_range")]
    #[test]
    fn wallet_rate_in_range() {
        let config = SwapConfig {
            network: Network::Local,
            fee_strategy: FeeStrategy::Range {
                min_inc: SatPerKvB::from_sat(1_000),
                max_inc: SatPerKvB::from_sat(20_000),
            },
            fee_priority: FeePriority::High,
        };
        assert_eq!(
            config.fee_estimator(SatPerKvB::from_sat(7_000)).rate(),
            SatPerKvB::from_sat(7_000)
        );
        assert_eq!(
            config.fee_estimator(SatPerKvB::from_sat(70_000)).rate(),
            SatPerKvB::from_sat(20_000)
        );
    }

    #[test]
    fn serde_json_config() {
        let config = SwapConfig::new(Network::Mainnet, SatPerKvB::from_sat(2_000));
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(serde_json::from_str::<SwapConfig>(&json).unwrap(), config);
    }
}
