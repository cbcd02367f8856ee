//! The remote lab: chamber queries, experiment submission, polling and data
//! download.

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::api::records::{parse_list, parse_value};
use crate::api::{ApiClient, ChamberRecord, Credentials, ExperimentRecord, Transport, DEFAULT_TIMEOUT};
use crate::dataset::Dataset;
use crate::error::LabError;
use crate::protocol::{Experiment, InstructionBuilder};
use crate::retrieval::{ArchiveSource, AutoSource, RetrievalOptions, Retriever};

/// How [`Lab::wait_for`] polls an experiment.
#[derive(Clone, Copy, Debug)]
pub struct PollOptions {
    pub interval: Duration,
    /// Give up after this long. `None` polls until a terminal status.
    pub timeout: Option<Duration>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: None,
        }
    }
}

/// Connection to the remote lab.
pub struct Lab<T: Transport = ApiClient, S: ArchiveSource = AutoSource> {
    transport: T,
    retriever: Retriever<S>,
}

impl Lab<ApiClient, AutoSource> {
    /// Connect with the given credentials and check them with a status call.
    pub fn connect(credentials: Credentials, endpoint: Option<&str>) -> Result<Self, LabError> {
        Self::connect_with_timeout(credentials, endpoint, DEFAULT_TIMEOUT)
    }

    pub fn connect_with_timeout(
        credentials: Credentials,
        endpoint: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, LabError> {
        let client = ApiClient::new(credentials, endpoint, timeout)?;
        let lab = Self::with_transport(client);
        let chambers = lab.get_status()?;
        log::info!(
            "connected to {} as {} ({} chamber(s))",
            lab.transport.endpoint(),
            lab.transport.user_id(),
            chambers.len()
        );
        Ok(lab)
    }
}

impl<T: Transport> Lab<T, AutoSource> {
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport,
            retriever: Retriever::new(),
        }
    }
}

impl<T: Transport, S: ArchiveSource> Lab<T, S> {
    /// Use `source` for dataset downloads instead of HTTP.
    pub fn with_archive_source<S2: ArchiveSource>(self, source: S2) -> Lab<T, S2> {
        Lab {
            transport: self.transport,
            retriever: Retriever::with_source(source),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Status of every chamber visible to the user.
    pub fn get_status(&self) -> Result<Vec<ChamberRecord>, LabError> {
        parse_list(self.transport.get("chambers")?, "chambers")
    }

    /// IDs of the chambers the user may submit experiments to.
    pub fn get_available_chambers(&self) -> Result<Vec<String>, LabError> {
        let path = format!("users/{}", self.transport.user_id());
        let response = self.transport.get(&path)?;
        parse_list(response, "chambers")
    }

    pub fn get_experiments(&self) -> Result<Vec<ExperimentRecord>, LabError> {
        parse_list(self.transport.get("experiments")?, "experiments")
    }

    pub fn get_experiment(&self, experiment_id: &str) -> Result<ExperimentRecord, LabError> {
        let response = self
            .transport
            .get(&format!("experiments/{experiment_id}"))?;
        parse_value(response, &format!("experiment {experiment_id}"))
    }

    /// Start an empty protocol for `chamber_id` in configuration `config`.
    pub fn new_experiment(&self, chamber_id: &str, config: &str) -> Experiment {
        Experiment::new(chamber_id, config)
    }

    /// Queue `experiment` and return its experiment ID.
    pub fn submit(&self, experiment: &Experiment, tag: Option<&str>) -> Result<String, LabError> {
        let payload = experiment.payload(tag)?;
        let response = self.transport.post("experiments", &payload)?;
        let experiment_id = response
            .get("experiment_id")
            .and_then(Value::as_str)
            .ok_or_else(|| LabError::Json {
                context: "experiments".to_string(),
                message: "submission response has no experiment_id".to_string(),
            })?
            .to_string();

        log::info!(
            "submitted experiment {experiment_id} ({} instruction(s)) to {}",
            experiment.instructions().len(),
            experiment.chamber_id()
        );
        Ok(experiment_id)
    }

    /// Poll until the experiment reaches DONE, FAILED or CANCELED.
    pub fn wait_for(
        &self,
        experiment_id: &str,
        options: PollOptions,
    ) -> Result<ExperimentRecord, LabError> {
        let started = Instant::now();
        loop {
            let record = self.get_experiment(experiment_id)?;
            if record.status.is_terminal() {
                return Ok(record);
            }

            if let Some(timeout) = options.timeout {
                if started.elapsed() >= timeout {
                    return Err(LabError::PollTimeout {
                        experiment_id: experiment_id.to_string(),
                        status: record.status.to_string(),
                        waited_secs: started.elapsed().as_secs(),
                    });
                }
            }

            log::debug!(
                "experiment {experiment_id} is {}; checking again in {:?}",
                record.status,
                options.interval
            );
            thread::sleep(options.interval);
        }
    }

    /// Download, verify and extract the data of a finished experiment into
    /// `<root>/<experiment_id>/`.
    ///
    /// The experiment must be DONE; otherwise this fails with
    /// [`LabError::ExperimentNotReady`] before anything is downloaded.
    pub fn download_data(
        &self,
        experiment_id: &str,
        root: &Path,
        options: RetrievalOptions,
    ) -> Result<Dataset, LabError> {
        let record = self.get_experiment(experiment_id)?;
        let descriptor = record.archive_descriptor()?;
        self.retriever
            .retrieve(&descriptor, root, experiment_id, options)
    }
}
