//! Runtime settings

use serde::{Deserialize, Serialize};

/// Bridge behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// Raise a script `TypeError` when a script value cannot fill a host
    /// field or parameter, instead of leaving it zero-valued.
    pub strict_coercion: bool,
    /// Log a warning for each silently dropped conversion.
    pub report_coercion_failures: bool,
    /// Longest script array converted into a host sequence. Longer arrays
    /// count as values that do not fit.
    pub max_sequence_length: usize,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            strict_coercion: false,
            report_coercion_failures: false,
            max_sequence_length: 1 << 20,
        }
    }
}

/// Limits applied to the QuickJS runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Heap limit in bytes; unlimited when unset.
    pub memory_limit: Option<usize>,
    /// Native stack budget of script calls in bytes.
    pub max_stack_size: Option<usize>,
    /// Allocated bytes between automatic collections.
    pub gc_threshold: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            memory_limit: None,
            max_stack_size: None,
            gc_threshold: 256 * 1024,
        }
    }
}

/// Runtime settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    pub engine: EngineSettings,
    pub bridge: BridgeSettings,
}

impl RuntimeSettings {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
