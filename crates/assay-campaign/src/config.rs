//! Campaign construction from JSON configuration documents.

use serde::{Deserialize, Serialize};
use tracing::debug;

use assay_recommend::RecommenderKind;
use assay_types::{config_error, AssayResult, Objective, SearchSpaceConfig};

use crate::campaign::Campaign;

/// Declarative campaign description.
///
/// ```json
/// {
///   "searchspace": {"constructor": "from_product", "parameters": [...]},
///   "objective": {"type": "SingleTargetObjective", "target": {...}},
///   "recommender": {"type": "TwoPhaseMetaRecommender"}
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CampaignConfig {
    pub searchspace: SearchSpaceConfig,
    #[serde(default)]
    pub objective: Option<Objective>,
    #[serde(default)]
    pub recommender: Option<RecommenderKind>,
}

impl CampaignConfig {
    pub fn from_json(json: &str) -> AssayResult<Self> {
        serde_json::from_str(json).map_err(|e| config_error!("invalid campaign config: {e}"))
    }

    /// Semantic checks without building the discrete product.
    pub fn validate(&self) -> AssayResult<()> {
        self.searchspace.validate()?;
        if let Some(objective) = &self.objective {
            objective.validate()?;
        }
        Ok(())
    }

    pub fn build(self) -> AssayResult<Campaign> {
        let searchspace = self.searchspace.build()?;
        Campaign::new(
            searchspace,
            self.objective,
            self.recommender.unwrap_or_default(),
        )
    }
}

impl Campaign<RecommenderKind> {
    pub fn from_config(json: &str) -> AssayResult<Self> {
        CampaignConfig::from_json(json)?.build()
    }

    /// Check a configuration without creating a campaign.
    pub fn validate_config(json: &str) -> AssayResult<()> {
        let config = CampaignConfig::from_json(json)?;
        config.validate()?;
        debug!("campaign config is valid");
        Ok(())
    }
}
