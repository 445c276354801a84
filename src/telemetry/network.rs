use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

/// Coarse connection class reported by the network information source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionClass {
    #[serde(rename = "2g")]
    TwoG,
    #[serde(rename = "3g")]
    ThreeG,
    #[serde(rename = "slow-4g")]
    Slow4G,
    #[serde(rename = "4g+")]
    Fast4G,
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
}

impl ConnectionClass {
    /// Hard upper bound on batch width imposed by slow links.
    pub fn batch_cap(self) -> Option<f64> {
        match self {
            Self::TwoG => Some(5.0),
            Self::ThreeG => Some(10.0),
            Self::Slow4G => Some(15.0),
            Self::Fast4G | Self::Unknown => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TwoG => "2g",
            Self::ThreeG => "3g",
            Self::Slow4G => "slow-4g",
            Self::Fast4G => "4g+",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ConnectionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionClass {
    type Err = std::convert::Infallible;

    /// Never fails: unrecognised labels map to [`ConnectionClass::Unknown`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "2g" | "slow-2g" => Self::TwoG,
            "3g" => Self::ThreeG,
            "slow-4g" => Self::Slow4G,
            "4g" | "4g+" | "5g" | "wifi" | "ethernet" => Self::Fast4G,
            _ => Self::Unknown,
        })
    }
}

/// Bandwidth assumed when no measurement exists.
pub const ESTIMATED_BANDWIDTH_MBPS: f64 = 10.0;
/// Latency assumed when no measurement exists.
pub const ESTIMATED_LATENCY_MS: f64 = 100.0;

/// Live network conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSnapshot {
    pub bandwidth_mbps: f64,
    pub latency_ms: f64,
    pub connection_class: ConnectionClass,
    /// True when the values are a fallback guess rather than a measurement
    #[serde(default)]
    pub estimated: bool,
}

impl NetworkSnapshot {
    pub fn new(bandwidth_mbps: f64, latency_ms: f64, connection_class: ConnectionClass) -> Self {
        Self {
            bandwidth_mbps,
            latency_ms,
            connection_class,
            estimated: false,
        }
    }

    /// Neutral guess used when no network information source exists.
    ///
    /// Chosen so neither the latency penalty nor the fast-link bonus applies.
    pub fn estimated() -> Self {
        Self {
            bandwidth_mbps: ESTIMATED_BANDWIDTH_MBPS,
            latency_ms: ESTIMATED_LATENCY_MS,
            connection_class: ConnectionClass::Unknown,
            estimated: true,
        }
    }
}
