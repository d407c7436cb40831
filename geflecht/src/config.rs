//! Node and protocol configuration, loaded from a TOML file.

use serde::Deserialize;

/// Everything the node reads from its configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// The currency label of the chain this node follows.
    pub currency: String,

    /// Where the block database lives.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Path to the hex encoded secret key of this node's identity.
    #[serde(default = "default_identity_file")]
    pub identity_file: String,

    /// Whether this node searches proofs of work. (Default `false`).
    #[serde(default)]
    pub participate: bool,

    /// The protocol parameters. All peers of a chain must agree on these.
    #[serde(default)]
    pub protocol: Protocol,
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_identity_file() -> String {
    "./config/identity.key".to_string()
}

/// Protocol parameters of a chain.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Protocol {
    /// Minimum number of valid certifications every member must have.
    pub sig_qty: usize,

    /// Lifetime of a certification link in seconds.
    pub sig_validity: i64,

    /// Floor on the number of leading zero hex digits of a block hash.
    pub pow_zero_min: u32,

    /// Length of the per-issuer difficulty decay period, in blocks.
    pub pow_period: u64,

    /// `true`: `pow_period` counts blocks. `false`: the period is
    /// `pow_period` percent of the current member count.
    pub pow_period_c: bool,

    /// Accepted clock skew for incoming blocks, in seconds.
    pub ts_interval: i64,
}

impl Default for Protocol {
    fn default() -> Self {
        Self {
            sig_qty: 3,
            sig_validity: 2_629_800,
            pow_zero_min: 4,
            pow_period: 1,
            pow_period_c: true,
            ts_interval: 30,
        }
    }
}
