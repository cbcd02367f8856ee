//! JSON records returned by the remote lab.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::status::{ChamberStatus, ExperimentStatus};
use crate::error::LabError;
use crate::retrieval::{ChecksumAlgorithm, RemoteArchiveDescriptor};

/// A submitted experiment as reported by `GET experiments/:id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub experiment_id: String,
    pub status: ExperimentStatus,
    pub chamber_id: Option<String>,
    pub config: Option<String>,
    pub tag: Option<String>,
    pub submitted_on: Option<String>,
    pub download_url: Option<String>,
    pub checksum: Option<String>,
    pub checksum_algorithm: Option<ChecksumAlgorithm>,
}

impl ExperimentRecord {
    /// Archive location for a finished experiment.
    ///
    /// Fails with [`LabError::ExperimentNotReady`] unless the status is DONE.
    pub fn archive_descriptor(&self) -> Result<RemoteArchiveDescriptor, LabError> {
        if self.status != ExperimentStatus::Done {
            return Err(LabError::ExperimentNotReady {
                experiment_id: self.experiment_id.clone(),
                status: self.status.to_string(),
            });
        }

        let download_url = self
            .download_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| LabError::Json {
                context: format!("experiment {}", self.experiment_id),
                message: "DONE experiment has no download_url".to_string(),
            })?;

        Ok(RemoteArchiveDescriptor {
            download_url: download_url.to_string(),
            checksum: self.checksum.clone(),
            algorithm: self.checksum_algorithm.unwrap_or_default(),
        })
    }
}

/// A chamber as listed by `GET chambers`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChamberRecord {
    pub chamber_id: String,
    pub status: ChamberStatus,
    pub config: Option<String>,
}

/// Deserialize a list that the service returns either bare or wrapped in
/// an object under `key`.
pub(crate) fn parse_list<T: serde::de::DeserializeOwned>(
    value: Value,
    key: &str,
) -> Result<Vec<T>, LabError> {
    let list = match value {
        Value::Array(_) => value,
        Value::Object(mut object) => object.remove(key).ok_or_else(|| LabError::Json {
            context: key.to_string(),
            message: format!("response has no '{key}' field"),
        })?,
        other => {
            return Err(LabError::Json {
                context: key.to_string(),
                message: format!("expected a list, found {other}"),
            })
        }
    };
    parse_value(list, key)
}

pub(crate) fn parse_value<T: serde::de::DeserializeOwned>(
    value: Value,
    context: &str,
) -> Result<T, LabError> {
    serde_json::from_value(value).map_err(|source| LabError::Json {
        context: context.to_string(),
        message: source.to_string(),
    })
}
