//! Configuration for loading and analysing a client.

use crate::{abc::DEFAULT_HIERARCHY_DEPTH, assembly::Code};

/// Configuration for [`crate::Game`].
///
/// Controls bounds used while re-encoding and walking class hierarchies, and how the
/// message registry is located.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Maximum layout passes when re-encoding a body (default: 32).
    pub max_layout_iterations: usize,

    /// Maximum superclass and nested-read depth (default: 64).
    pub max_hierarchy_depth: usize,

    /// Name of the message registry class, tried before the structural search
    /// (default: `HabboMessages`).
    pub registry_class_name: Option<String>,

    /// Placeholder name the obfuscator gives every debug register (default: `k`).
    pub obfuscated_register_name: String,

    /// Extract message structures on the rayon pool (default: true).
    pub parallel: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            max_layout_iterations: Code::MAX_LAYOUT_ITERATIONS,
            max_hierarchy_depth: DEFAULT_HIERARCHY_DEPTH,
            registry_class_name: Some("HabboMessages".to_string()),
            obfuscated_register_name: "k".to_string(),
            parallel: true,
        }
    }
}

impl AnalysisConfig {
    /// Run everything on the calling thread.
    #[must_use]
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Locate the registry structurally only.
    #[must_use]
    pub fn without_registry_name(mut self) -> Self {
        self.registry_class_name = None;
        self
    }
}
