//! Walks one SmartEM acquisition into a nested [`MetadataDocument`].
//!
//! The acquisition record and its grid list must both be fetched, otherwise
//! the extraction fails. Below that, each fetch is guarded separately: a
//! failed grid-square, foil-hole, micrograph, atlas, or quality-prediction
//! fetch degrades only its own subtree to `[]` or `null`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::domain::AcquisitionId;
use crate::error::DlsError;
use crate::smartem::{RemoteRecord, SessionSource};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataDocument {
    pub acquisition: Value,
    pub grids: Vec<GridEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridEntry {
    pub grid_info: Value,
    pub grid_squares: Vec<GridSquareEntry>,
    pub atlas: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSquareEntry {
    pub grid_square_info: Value,
    pub foil_holes: Vec<FoilHoleEntry>,
    pub quality_prediction: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoilHoleEntry {
    pub foil_hole_info: Value,
    pub micrographs: Vec<Value>,
}

impl MetadataDocument {
    pub fn num_grids(&self) -> usize {
        self.grids.len()
    }

    pub fn num_grid_squares(&self) -> usize {
        self.grids.iter().map(|grid| grid.grid_squares.len()).sum()
    }

    pub fn acquisition_name(&self) -> Option<&str> {
        self.acquisition.get("name").and_then(Value::as_str)
    }

    pub fn summary(&self, acquisition_id: &AcquisitionId) -> MetadataSummary {
        MetadataSummary {
            acquisition_id: acquisition_id.to_string(),
            acquisition_name: self.acquisition_name().unwrap_or("Unknown").to_string(),
            num_grids: self.num_grids(),
            num_grid_squares: self.num_grid_squares(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataSummary {
    pub acquisition_id: String,
    pub acquisition_name: String,
    pub num_grids: usize,
    pub num_grid_squares: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchLevel {
    GridSquares,
    FoilHoles,
    Micrographs,
    Atlas,
    QualityPrediction,
}

impl fmt::Display for BranchLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BranchLevel::GridSquares => "grid squares",
            BranchLevel::FoilHoles => "foil holes",
            BranchLevel::Micrographs => "micrographs",
            BranchLevel::Atlas => "atlas",
            BranchLevel::QualityPrediction => "quality prediction",
        };
        f.write_str(label)
    }
}

/// A subtree that could not be fetched and was replaced by its empty default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DegradedBranch {
    pub level: BranchLevel,
    pub parent: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub document: MetadataDocument,
    pub degraded: Vec<DegradedBranch>,
}

/// Outcome of one guarded fetch below the grid-list level.
#[derive(Debug)]
pub enum Fetched<T> {
    Value(T),
    Absent,
    Failed(String),
}

impl<T> Fetched<T> {
    pub fn from_list(result: Result<T, DlsError>) -> Self {
        match result {
            Ok(value) => Fetched::Value(value),
            Err(err) => Fetched::Failed(err.to_string()),
        }
    }

    pub fn from_optional(result: Result<Option<T>, DlsError>) -> Self {
        match result {
            Ok(Some(value)) => Fetched::Value(value),
            Ok(None) => Fetched::Absent,
            Err(err) => Fetched::Failed(err.to_string()),
        }
    }
}

pub struct Aggregator<'a, S: SessionSource + ?Sized> {
    source: &'a S,
    degraded: Vec<DegradedBranch>,
}

impl<'a, S: SessionSource + ?Sized> Aggregator<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self {
            source,
            degraded: Vec::new(),
        }
    }

    pub fn extract(mut self, acquisition_id: &AcquisitionId) -> Result<Extraction, DlsError> {
        info!(acquisition = %acquisition_id, "extracting acquisition metadata");

        let acquisition = self
            .source
            .get_acquisition(acquisition_id)
            .inspect_err(|err| error!(acquisition = %acquisition_id, "failed to fetch acquisition: {err}"))?;
        let grids = self
            .source
            .get_grids(acquisition_id)
            .inspect_err(|err| error!(acquisition = %acquisition_id, "failed to fetch grids: {err}"))?;

        let grids = grids
            .into_iter()
            .map(|grid| self.grid_entry(grid))
            .collect::<Vec<_>>();

        let document = MetadataDocument {
            acquisition: acquisition.into_value(),
            grids,
        };
        info!(
            acquisition = %acquisition_id,
            grids = document.num_grids(),
            grid_squares = document.num_grid_squares(),
            degraded = self.degraded.len(),
            "extracted acquisition metadata"
        );

        Ok(Extraction {
            document,
            degraded: self.degraded,
        })
    }

    fn grid_entry(&mut self, grid: RemoteRecord) -> GridEntry {
        let source = self.source;
        let uuid = grid.uuid().map(str::to_string);

        let squares = self.fetch_children(BranchLevel::GridSquares, uuid.as_deref(), |id| {
            source.get_grid_squares(id)
        });
        let grid_squares = squares
            .into_iter()
            .map(|square| self.grid_square_entry(square))
            .collect();

        let atlas = self.fetch_optional(BranchLevel::Atlas, uuid.as_deref(), |id| {
            source.get_atlas(id)
        });

        GridEntry {
            grid_info: grid.into_value(),
            grid_squares,
            atlas,
        }
    }

    fn grid_square_entry(&mut self, square: RemoteRecord) -> GridSquareEntry {
        let source = self.source;
        let uuid = square.uuid().map(str::to_string);

        let holes = self.fetch_children(BranchLevel::FoilHoles, uuid.as_deref(), |id| {
            source.get_foil_holes(id)
        });
        let foil_holes = holes
            .into_iter()
            .map(|hole| self.foil_hole_entry(hole))
            .collect();

        let quality_prediction =
            self.fetch_optional(BranchLevel::QualityPrediction, uuid.as_deref(), |id| {
                source.get_quality_prediction(id)
            });

        GridSquareEntry {
            grid_square_info: square.into_value(),
            foil_holes,
            quality_prediction,
        }
    }

    fn foil_hole_entry(&mut self, hole: RemoteRecord) -> FoilHoleEntry {
        let source = self.source;
        let uuid = hole.uuid().map(str::to_string);
        let micrographs = self
            .fetch_children(BranchLevel::Micrographs, uuid.as_deref(), |id| {
                source.get_micrographs(id)
            })
            .into_iter()
            .map(RemoteRecord::into_value)
            .collect();

        FoilHoleEntry {
            foil_hole_info: hole.into_value(),
            micrographs,
        }
    }

    fn fetch_children<F>(
        &mut self,
        level: BranchLevel,
        parent: Option<&str>,
        fetch: F,
    ) -> Vec<RemoteRecord>
    where
        F: FnOnce(&str) -> Result<Vec<RemoteRecord>, DlsError>,
    {
        let outcome = match parent {
            Some(id) => Fetched::from_list(fetch(id)),
            None => Fetched::Failed("record has no uuid".to_string()),
        };
        self.settle(level, parent, outcome).unwrap_or_default()
    }

    fn fetch_optional<F>(&mut self, level: BranchLevel, parent: Option<&str>, fetch: F) -> Option<Value>
    where
        F: FnOnce(&str) -> Result<Option<RemoteRecord>, DlsError>,
    {
        let outcome = match parent {
            Some(id) => Fetched::from_optional(fetch(id)),
            None => Fetched::Failed("record has no uuid".to_string()),
        };
        self.settle(level, parent, outcome)
            .map(RemoteRecord::into_value)
    }

    /// Folds a guarded fetch into its value, recording failures and logging absences.
    fn settle<T>(&mut self, level: BranchLevel, parent: Option<&str>, outcome: Fetched<T>) -> Option<T> {
        let parent = parent.unwrap_or("<missing uuid>");
        match outcome {
            Fetched::Value(value) => Some(value),
            Fetched::Absent => {
                debug!(parent, "no {level} for {parent}");
                None
            }
            Fetched::Failed(reason) => {
                warn!(parent, "could not get {level} for {parent}: {reason}");
                self.degraded.push(DegradedBranch {
                    level,
                    parent: parent.to_string(),
                    reason,
                });
                None
            }
        }
    }
}

/// Convenience wrapper over [`Aggregator`] for a single acquisition.
pub fn extract_acquisition_metadata<S: SessionSource + ?Sized>(
    source: &S,
    acquisition_id: &AcquisitionId,
) -> Result<Extraction, DlsError> {
    Aggregator::new(source).extract(acquisition_id)
}
