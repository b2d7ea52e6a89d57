use chrono::{Datelike, Local, NaiveDate};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::aria::{
    Bucket, DepositionTarget, FIELD_DATA_LOCATION, FIELD_JSON, Field, RECORD_DLS_CRYOEM,
    RECORD_GENERIC, Record,
};
use crate::domain::{ProjectKey, VisitId};
use crate::error::DlsError;
use crate::store::Store;

const EMBARGO_YEARS: i32 = 3;

#[derive(Debug, Clone, Serialize)]
pub struct DataLocationReceipt {
    pub record: Record,
    pub field: Field,
}

#[derive(Debug, Clone, Serialize)]
pub struct DepositionReceipt {
    pub visit_id: u64,
    pub bucket: Bucket,
    pub record: Record,
    pub field: Field,
    pub data_location: Option<DataLocationReceipt>,
}

impl DepositionReceipt {
    pub fn records_created(&self) -> usize {
        1 + usize::from(self.data_location.is_some())
    }
}

/// Three years after `today`, same month and day; Feb 29 falls back to Feb 28.
pub fn embargo_date(today: NaiveDate) -> NaiveDate {
    let year = today.year() + EMBARGO_YEARS;
    today.with_year(year).unwrap_or_else(|| {
        NaiveDate::from_ymd_opt(year, today.month(), 28).unwrap_or(today)
    })
}

/// Sends a project's cached metadata document (and data location, if any) to a visit.
///
/// Both cached values are read before ARIA is contacted. Any failure aborts the
/// whole deposition; entities already created remotely are not rolled back.
pub fn submit<D: DepositionTarget + ?Sized>(
    store: &Store,
    target: &D,
    project: &str,
    visit_id: VisitId,
    today: NaiveDate,
) -> Result<DepositionReceipt, DlsError> {
    let metadata_json = store
        .get_latest(project, ProjectKey::MetadataJson)?
        .filter(|value| !value.is_empty())
        .ok_or_else(|| DlsError::MissingMetadata(project.to_string()))?;
    let metadata: Value = serde_json::from_str(&metadata_json)
        .map_err(|err| DlsError::MetadataParse(err.to_string()))?;
    let location = store
        .get_latest(project, ProjectKey::DataLocation)?
        .filter(|value| !value.is_empty());

    target.login()?;
    let visit = target.new_data_manager(visit_id)?;
    let bucket = target.create_bucket(&visit, embargo_date(today))?;
    info!(project, visit = %visit_id, bucket = %bucket.id, "created ARIA bucket");

    let record = target.create_record(&bucket.id, RECORD_DLS_CRYOEM)?;
    let field = target.create_field(&record.id, FIELD_JSON, &metadata)?;

    let data_location = match location {
        Some(location) => {
            let record = target.create_record(&bucket.id, RECORD_GENERIC)?;
            let field =
                target.create_field(&record.id, FIELD_DATA_LOCATION, &Value::String(location))?;
            Some(DataLocationReceipt { record, field })
        }
        None => None,
    };

    info!(project, visit = %visit_id, "metadata deposited");
    Ok(DepositionReceipt {
        visit_id: visit_id.get(),
        bucket,
        record,
        field,
        data_location,
    })
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}
