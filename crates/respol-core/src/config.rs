//! Construction parameters of a resource set.

use serde::{Deserialize, Serialize};

use crate::state::Policy;

/// Resource set configuration.
///
/// Embedding applications usually load this from their own configuration
/// file; only the application class is required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSetConfig {
    /// Application class, decides priority at the manager (e.g. `player`,
    /// `call`, `camera`)
    pub application_class: String,
    /// Preemption releases the set; it must be acquired again explicitly
    #[serde(default)]
    pub auto_release: bool,
    /// Get a grant notification even when the grant did not change
    #[serde(default)]
    pub always_reply: bool,
}

impl ResourceSetConfig {
    /// Configuration with both policy flags off.
    pub fn new(application_class: impl Into<String>) -> Self {
        Self {
            application_class: application_class.into(),
            auto_release: false,
            always_reply: false,
        }
    }

    pub(crate) fn policy(&self) -> Policy {
        Policy { auto_release: self.auto_release, always_reply: self.always_reply }
    }
}

#[cfg(test)]
mod tests {
    use respol_proto::codec;
    use serde::Serialize;

    use super::*;

    #[derive(Serialize)]
    struct ClassOnly {
        application_class: &'static str,
    }

    #[test]
    fn flags_default_to_off() {
        let bytes = codec::encode(&ClassOnly { application_class: "camera" }).unwrap();
        let config: ResourceSetConfig = codec::decode(&bytes).unwrap();

        assert_eq!(config, ResourceSetConfig::new("camera"));
        assert_eq!(config.policy(), Policy::default());
    }
}
