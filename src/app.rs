use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

use crate::aggregator::{DegradedBranch, MetadataSummary, extract_acquisition_metadata};
use crate::aria::DepositionTarget;
use crate::deposition::{self, DepositionReceipt};
use crate::domain::{AcquisitionId, ProjectKey, VisitId};
use crate::error::DlsError;
use crate::smartem::SessionSource;
use crate::store::{ProjectInfo, Store};

pub const DEFAULT_ACQUISITION_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    GenerateMetadata,
    SendMetadata,
    PrintProject,
    ListAcquisitions,
    SetDataLocation,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::GenerateMetadata,
        Action::SendMetadata,
        Action::PrintProject,
        Action::ListAcquisitions,
        Action::SetDataLocation,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Action::GenerateMetadata => "generate-metadata",
            Action::SendMetadata => "send-metadata",
            Action::PrintProject => "print-project",
            Action::ListAcquisitions => "list-acquisitions",
            Action::SetDataLocation => "set-data-location",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Action {
    type Err = DlsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        Action::ALL
            .into_iter()
            .find(|action| action.name() == value)
            .ok_or_else(|| DlsError::UnknownAction(value.to_string()))
    }
}

/// Argument bag handed to every action; each action reads only what it needs.
#[derive(Debug, Clone, Default)]
pub struct ActionArgs {
    pub name: String,
    pub acquisition_id: Option<String>,
    pub visit_id: Option<String>,
    pub location: Option<String>,
    pub limit: Option<usize>,
}

impl ActionArgs {
    pub fn for_project(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    fn require<'a>(
        action: Action,
        argument: &'static str,
        value: &'a Option<String>,
    ) -> Result<&'a str, DlsError> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(DlsError::MissingArgument {
                action: action.name(),
                argument,
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionResult {
    pub success: bool,
    pub info: Value,
    /// 0 on success, otherwise [`DlsError::exit_code`] of the failure.
    #[serde(skip)]
    pub exit_code: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateResult {
    #[serde(flatten)]
    pub summary: MetadataSummary,
    pub degraded: Vec<DegradedBranch>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

fn progress(sink: &dyn ProgressSink, message: impl Into<String>) {
    sink.event(ProgressEvent {
        message: message.into(),
        elapsed: None,
    });
}

pub struct App<S: SessionSource, D: DepositionTarget> {
    store: Store,
    source: S,
    deposition: Option<D>,
}

impl<S: SessionSource, D: DepositionTarget> App<S, D> {
    /// `deposition` is `None` when ARIA is not configured; only `send-metadata` needs it.
    pub fn new(store: Store, source: S, deposition: Option<D>) -> Self {
        Self {
            store,
            source,
            deposition,
        }
    }

    /// Runs one action and folds its outcome into `{success, info}`.
    pub fn perform(&self, action: Action, args: &ActionArgs, sink: &dyn ProgressSink) -> ActionResult {
        match self.dispatch(action, args, sink) {
            Ok(info) => ActionResult {
                success: true,
                info,
                exit_code: 0,
            },
            Err(err) => {
                let message = err.to_string();
                progress(sink, format!("... {message}"));
                ActionResult {
                    success: false,
                    info: Value::String(message),
                    exit_code: err.exit_code(),
                }
            }
        }
    }

    fn dispatch(
        &self,
        action: Action,
        args: &ActionArgs,
        sink: &dyn ProgressSink,
    ) -> Result<Value, DlsError> {
        let project = args.name.as_str();
        match action {
            Action::GenerateMetadata => {
                let id = ActionArgs::require(action, "acquisition-id", &args.acquisition_id)?
                    .parse::<AcquisitionId>()?;
                to_info(&self.generate_metadata(project, &id, sink)?)
            }
            Action::SendMetadata => {
                let visit = ActionArgs::require(action, "visit-id", &args.visit_id)?
                    .parse::<VisitId>()?;
                to_info(&self.send_metadata(project, visit, deposition::today(), sink)?)
            }
            Action::PrintProject => to_info(&self.print_project(project, sink)?),
            Action::ListAcquisitions => {
                let limit = args.limit.unwrap_or(DEFAULT_ACQUISITION_LIMIT);
                to_info(&self.list_acquisitions(limit, sink)?)
            }
            Action::SetDataLocation => {
                let location = ActionArgs::require(action, "location", &args.location)?;
                self.set_data_location(project, location, sink)?;
                Ok(serde_json::json!({ "data_location": location }))
            }
        }
    }

    pub fn generate_metadata(
        &self,
        project: &str,
        acquisition_id: &AcquisitionId,
        sink: &dyn ProgressSink,
    ) -> Result<GenerateResult, DlsError> {
        progress(
            sink,
            format!("FandanGO will extract metadata from SmartEM for project {project}..."),
        );
        progress(
            sink,
            format!("... extracting metadata for acquisition {acquisition_id}"),
        );
        let started = Instant::now();
        let extraction = extract_acquisition_metadata(&self.source, acquisition_id)?;
        let metadata_json = serde_json::to_string_pretty(&extraction.document)
            .map_err(|err| DlsError::MetadataParse(err.to_string()))?;

        self.store.put_all(
            project,
            &[
                (ProjectKey::AcquisitionId, acquisition_id.as_str()),
                (ProjectKey::MetadataJson, metadata_json.as_str()),
            ],
        )?;

        let summary = extraction.document.summary(acquisition_id);
        sink.event(ProgressEvent {
            message: format!(
                "... successfully extracted metadata for {} grids, {} grid squares",
                summary.num_grids, summary.num_grid_squares
            ),
            elapsed: Some(started.elapsed()),
        });

        Ok(GenerateResult {
            summary,
            degraded: extraction.degraded,
        })
    }

    /// Single point where a missing deposition client becomes an error.
    pub fn deposition_target(&self) -> Result<&D, DlsError> {
        self.deposition.as_ref().ok_or_else(|| {
            DlsError::AriaUnavailable("no ARIA client credentials configured".to_string())
        })
    }

    pub fn send_metadata(
        &self,
        project: &str,
        visit_id: VisitId,
        today: NaiveDate,
        sink: &dyn ProgressSink,
    ) -> Result<DepositionReceipt, DlsError> {
        progress(
            sink,
            format!("FandanGO will send metadata for {project} project to ARIA..."),
        );
        let target = self.deposition_target()?;
        let receipt = deposition::submit(&self.store, target, project, visit_id, today)?;
        progress(
            sink,
            format!("Successfully sent metadata for project {project} to ARIA!"),
        );
        Ok(receipt)
    }

    pub fn print_project(
        &self,
        project: &str,
        sink: &dyn ProgressSink,
    ) -> Result<ProjectInfo, DlsError> {
        progress(sink, format!("... reading project {project}"));
        self.store.list_all(project)
    }

    /// Most recent acquisitions first, by `start_time`; records without one sort last.
    pub fn list_acquisitions(
        &self,
        limit: usize,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<Value>, DlsError> {
        progress(sink, "... listing SmartEM acquisitions");
        let mut acquisitions = self
            .source
            .list_acquisitions()?
            .into_iter()
            .map(|record| record.into_value())
            .collect::<Vec<_>>();
        acquisitions.sort_by(|a, b| start_time(b).cmp(start_time(a)));
        acquisitions.truncate(limit);
        Ok(acquisitions)
    }

    pub fn set_data_location(
        &self,
        project: &str,
        location: &str,
        sink: &dyn ProgressSink,
    ) -> Result<(), DlsError> {
        progress(
            sink,
            format!("... project {project} data location set to {location}"),
        );
        self.store.put(project, ProjectKey::DataLocation, location)
    }
}

fn start_time(record: &Value) -> &str {
    record
        .get("start_time")
        .and_then(Value::as_str)
        .unwrap_or("")
}

fn to_info<T: Serialize>(value: &T) -> Result<Value, DlsError> {
    serde_json::to_value(value).map_err(|err| DlsError::MetadataParse(err.to_string()))
}
