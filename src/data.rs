use crate::error::DataLoadError;
use crate::types::Record;
use csv::{ReaderBuilder, StringRecord};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::info;

const NAME: &str = "name";
const ADDRESS: &str = "address";
const CITY: &str = "city";
const PROVINCE: &str = "province";
const LATITUDE: &str = "latitude";
const LONGITUDE: &str = "longitude";

/// All locations, loaded once at startup and never mutated afterwards.
/// Share it behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    records: Vec<Record>,
}

impl Dataset {
    pub fn from_records(records: Vec<Record>) -> Self {
        Dataset { records }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct chain names, sorted.
    pub fn chains(&self) -> Vec<String> {
        self.distinct(|r| &r.name)
    }

    /// Distinct state codes, sorted.
    pub fn states(&self) -> Vec<String> {
        self.distinct(|r| &r.province)
    }

    fn distinct(&self, field: impl Fn(&Record) -> &String) -> Vec<String> {
        self.records
            .iter()
            .map(field)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .cloned()
            .collect()
    }
}

pub fn load_dataset(path: &Path) -> Result<Dataset, DataLoadError> {
    info!("Loading locations from {:?}...", path);

    let file = File::open(path).map_err(|source| DataLoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let dataset = read_dataset(file)?;

    info!(
        "Loaded {} locations ({} chains, {} states)",
        dataset.len(),
        dataset.chains().len(),
        dataset.states().len()
    );
    Ok(dataset)
}

/// Columns may appear in any order; extra columns are ignored.
pub fn read_dataset<R: Read>(reader: R) -> Result<Dataset, DataLoadError> {
    let mut rdr = ReaderBuilder::new().from_reader(reader);
    let headers = rdr.headers()?.clone();

    let columns = Columns {
        name: column_index(&headers, NAME)?,
        address: column_index(&headers, ADDRESS)?,
        city: column_index(&headers, CITY)?,
        province: column_index(&headers, PROVINCE)?,
        latitude: column_index(&headers, LATITUDE)?,
        longitude: column_index(&headers, LONGITUDE)?,
    };

    let mut records = Vec::new();
    for result in rdr.records() {
        let row = result?;
        records.push(columns.parse(&row)?);
    }

    Ok(Dataset { records })
}

fn column_index(headers: &StringRecord, column: &'static str) -> Result<usize, DataLoadError> {
    headers
        .iter()
        .position(|h| h.trim() == column)
        .ok_or(DataLoadError::MissingColumn(column))
}

struct Columns {
    name: usize,
    address: usize,
    city: usize,
    province: usize,
    latitude: usize,
    longitude: usize,
}

impl Columns {
    fn parse(&self, row: &StringRecord) -> Result<Record, DataLoadError> {
        let text = |idx: usize| row.get(idx).unwrap_or("");

        Ok(Record {
            name: text(self.name).trim().to_string(),
            address: text(self.address).to_string(),
            city: text(self.city).to_string(),
            province: text(self.province).to_uppercase(),
            latitude: coordinate(row, text(self.latitude), LATITUDE)?,
            longitude: coordinate(row, text(self.longitude), LONGITUDE)?,
        })
    }
}

fn coordinate(row: &StringRecord, value: &str, column: &'static str) -> Result<f64, DataLoadError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| DataLoadError::InvalidValue {
            row: row.position().map(|p| p.line()).unwrap_or(0),
            column,
            value: value.to_string(),
        })
}
