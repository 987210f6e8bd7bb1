//! Reasoner configuration.
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration:
//!
//! ```rust,ignore
//! let config = ReasonerConfig::from_json(r#"{ "tabling": { "predicates": ["ex:ancestor"] } }"#)?;
//! ```

use crate::error::ReasonerError;
use serde::{Deserialize, Serialize};

/// Which backward goals are answered through shared answer tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TablingPolicy {
    /// Every goal is tabled.
    #[default]
    All,
    /// Only goals whose predicate is one of these IRIs are tabled; other
    /// goals are solved by plain depth-first resolution.
    Predicates(Vec<String>),
}

/// Which forward engine runs the forward rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ForwardStrategy {
    /// Incremental match network with retraction support.
    #[default]
    Rete,
    /// Scan-based engine; deletions trigger a full recompute.
    Scan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasonerConfig {
    pub tabling: TablingPolicy,
    pub forward: ForwardStrategy,
    /// Pumps between forced completion checks in the backward engine.
    /// Zero means only check when no scheduled work remains.
    pub completion_check_interval: usize,
    /// Hide triples whose object is a functor from query answers.
    pub filter_functors: bool,
    /// Keep the supports of every forward derivation for `explain`.
    pub record_derivations: bool,
    /// Emit per-step trace events from the backward interpreter.
    pub trace: bool,
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            tabling: TablingPolicy::All,
            forward: ForwardStrategy::Rete,
            completion_check_interval: 0,
            filter_functors: true,
            record_derivations: false,
            trace: false,
        }
    }
}

impl ReasonerConfig {
    pub fn from_json(text: &str) -> Result<Self, ReasonerError> {
        let config: ReasonerConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReasonerError> {
        if let TablingPolicy::Predicates(preds) = &self.tabling {
            if let Some(empty) = preds.iter().find(|p| p.trim().is_empty()) {
                return Err(ReasonerError::Config(format!(
                    "tabled predicate {:?} is empty",
                    empty
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_is_default() {
        let config = ReasonerConfig::from_json("{}").unwrap();
        assert_eq!(config, ReasonerConfig::default());
        assert!(config.filter_functors);
    }

    #[test]
    fn predicate_tabling_parses() {
        let config =
            ReasonerConfig::from_json(r#"{"tabling": {"predicates": ["ex:ancestor"]}, "trace": true}"#)
                .unwrap();
        assert_eq!(
            config.tabling,
            TablingPolicy::Predicates(vec!["ex:ancestor".to_string()])
        );
        assert!(config.trace);
    }

    #[test]
    fn scan_strategy_parses() {
        let config = ReasonerConfig::from_json(r#"{"forward": "scan"}"#).unwrap();
        assert_eq!(config.forward, ForwardStrategy::Scan);
    }

    #[test]
    fn bad_json_is_config_error() {
        let err = ReasonerConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, ReasonerError::Config(_)));
    }

    #[test]
    fn blank_tabled_predicate_rejected() {
        let err = ReasonerConfig::from_json(r#"{"tabling": {"predicates": [" "]}}"#).unwrap_err();
        assert!(matches!(err, ReasonerError::Config(_)));
    }
}
