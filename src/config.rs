//! Store configuration loaded from environment variables.
//!
//! Follows 12-factor style: every setting has a default and can be
//! overridden through the environment (or a `.env` file via `dotenvy`).
//!
//! | Variable                    | Default    | Meaning                                   |
//! |-----------------------------|------------|-------------------------------------------|
//! | `STORE_GATE_POLICY`         | `retained` | `retained`, `reclaiming` or `sharded`     |
//! | `STORE_GATE_SHARDS`         | `64`       | gate count when the policy is `sharded`   |
//! | `STORE_SUBSCRIBER_CAPACITY` | `0`        | per-subscriber queue bound, 0 = unbounded |

use std::num::NonZeroUsize;

use crate::domain::GatePolicy;
use crate::error::ConfigError;

const DEFAULT_GATE_SHARDS: NonZeroUsize = match NonZeroUsize::new(64) {
    Some(n) => n,
    None => NonZeroUsize::MIN,
};

/// Top-level store configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreConfig {
    /// Layout of the per-id gate table.
    pub gate_policy: GatePolicy,

    /// Bound on each subscriber's queue. `None` buffers without limit;
    /// with a bound, values are dropped for a subscriber whose queue is
    /// full.
    pub subscriber_capacity: Option<NonZeroUsize>,
}

impl StoreConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if `STORE_GATE_POLICY` names
    /// an unknown policy or `STORE_GATE_SHARDS` is zero or not a number.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`StoreConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let gate_policy = match lookup("STORE_GATE_POLICY").as_deref().map(str::trim) {
            None | Some("") => GatePolicy::Retained,
            Some(raw) => parse_gate_policy(raw, lookup("STORE_GATE_SHARDS"))?,
        };

        // Unparsable capacities fall back to unbounded, like every other
        // numeric setting.
        let subscriber_capacity = lookup("STORE_SUBSCRIBER_CAPACITY")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .and_then(NonZeroUsize::new);

        Ok(Self {
            gate_policy,
            subscriber_capacity,
        })
    }

    /// Returns a copy with the given gate policy.
    #[must_use]
    pub fn with_gate_policy(mut self, gate_policy: GatePolicy) -> Self {
        self.gate_policy = gate_policy;
        self
    }

    /// Returns a copy with the given per-subscriber queue bound.
    #[must_use]
    pub fn with_subscriber_capacity(mut self, capacity: Option<NonZeroUsize>) -> Self {
        self.subscriber_capacity = capacity;
        self
    }
}

fn parse_gate_policy(raw: &str, shards: Option<String>) -> Result<GatePolicy, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "retained" => Ok(GatePolicy::Retained),
        "reclaiming" => Ok(GatePolicy::Reclaiming),
        "sharded" => {
            let shards = match shards {
                None => DEFAULT_GATE_SHARDS,
                Some(value) => {
                    let parsed = value.trim().parse::<usize>().ok().and_then(NonZeroUsize::new);
                    parsed.ok_or(ConfigError::InvalidValue {
                        key: "STORE_GATE_SHARDS",
                        value,
                        reason: "expected a positive integer",
                    })?
                }
            };
            Ok(GatePolicy::Sharded { shards })
        }
        _ => Err(ConfigError::InvalidValue {
            key: "STORE_GATE_POLICY",
            value: raw.to_string(),
            reason: "expected retained, reclaiming or sharded",
        }),
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
pub fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
