//! Versioned JSON documents holding the full campaign state.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use assay_recommend::Recommender;
use assay_types::{validation_error, AssayResult};

use crate::campaign::Campaign;

pub const VERSION_KEY: &str = "version";
pub const DOCUMENT_VERSION: &str = env!("CARGO_PKG_VERSION");

impl<R> Campaign<R>
where
    R: Recommender + Serialize + DeserializeOwned,
{
    /// Serialize every piece of campaign state plus the crate version.
    pub fn to_json(&self) -> AssayResult<String> {
        let mut value = serde_json::to_value(self)?;
        let object = value
            .as_object_mut()
            .ok_or_else(|| validation_error!("campaign did not serialize to an object"))?;
        object.insert(VERSION_KEY.into(), Value::String(DOCUMENT_VERSION.into()));
        Ok(serde_json::to_string_pretty(&value)?)
    }

    /// Restore a campaign written by [`Campaign::to_json`]. The version
    /// entry is dropped; any other unknown field is an error.
    pub fn from_json(json: &str) -> AssayResult<Self> {
        let mut value: Value = serde_json::from_str(json)?;
        let object = value
            .as_object_mut()
            .ok_or_else(|| validation_error!("campaign document must be a JSON object"))?;
        match object.remove(VERSION_KEY) {
            Some(Value::String(v)) if v != DOCUMENT_VERSION => {
                warn!(
                    document = %v,
                    current = DOCUMENT_VERSION,
                    "campaign document version differs"
                );
            }
            Some(_) => {}
            None => debug!("campaign document has no version"),
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> AssayResult<()> {
        fs::write(path.as_ref(), self.to_json()?)?;
        debug!(path = %path.as_ref().display(), "saved campaign");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> AssayResult<Self> {
        Self::from_json(&fs::read_to_string(path.as_ref())?)
    }
}
