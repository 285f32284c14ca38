use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::config::DashboardConfig;
use crate::models::{Column, EmbeddingPoint, PatientRecord, StatRow, Uid};
use crate::risk::parse_risk_label;
use crate::stats;

pub const PATIENTS_FILE: &str = "risk.csv";
pub const EMBEDDING_FILE: &str = "tsne.csv";
pub const STATS_FILE: &str = "stats.csv";
pub const RAW_DATASET_FILE: &str = "framingham.csv";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("malformed {table} table: {detail}")]
    MalformedSchema { table: &'static str, detail: String },
    #[error("embedding has {embedding} rows but the patient table has {patients}")]
    RowCountMismatch { patients: usize, embedding: usize },
    #[error("{0} table has no rows")]
    EmptyDataset(&'static str),
    #[error("failed to open {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

/// Where the statistics table comes from: a precomputed per-group summary, or
/// the raw patient dataset that the summary is derived from.
pub enum StatsSource<R> {
    Precomputed(R),
    Raw(R),
}

/// Immutable view of the three loaded tables. Embedding point `i` and patient
/// row `i` describe the same person.
#[derive(Debug, Clone)]
pub struct DatasetSnapshot {
    patients: Vec<PatientRecord>,
    embedding: Vec<EmbeddingPoint>,
    stats: Vec<StatRow>,
    patient_columns: Vec<(Column, String)>,
    stat_columns: Vec<String>,
}

impl DatasetSnapshot {
    pub fn new(
        patients: Vec<PatientRecord>,
        embedding: Vec<EmbeddingPoint>,
        stats: Vec<StatRow>,
        patient_columns: Vec<(Column, String)>,
        stat_columns: Vec<String>,
    ) -> Result<Self, LoadError> {
        if patients.is_empty() {
            return Err(LoadError::EmptyDataset("patient"));
        }
        if embedding.is_empty() {
            return Err(LoadError::EmptyDataset("embedding"));
        }
        if stats.is_empty() {
            return Err(LoadError::EmptyDataset("statistics"));
        }
        if embedding.len() != patients.len() {
            return Err(LoadError::RowCountMismatch {
                patients: patients.len(),
                embedding: embedding.len(),
            });
        }

        for (position, point) in embedding.iter().enumerate() {
            if point.index != position {
                return Err(LoadError::MalformedSchema {
                    table: "embedding",
                    detail: format!("point at row {position} carries index {}", point.index),
                });
            }
        }

        let mut seen: HashSet<&Uid> = HashSet::new();
        for patient in &patients {
            if !seen.insert(&patient.uid) {
                return Err(LoadError::MalformedSchema {
                    table: "patient",
                    detail: format!("duplicate uid {}", patient.uid),
                });
            }
        }

        Ok(Self {
            patients,
            embedding,
            stats,
            patient_columns,
            stat_columns,
        })
    }

    pub fn patients(&self) -> &[PatientRecord] {
        &self.patients
    }

    pub fn embedding(&self) -> &[EmbeddingPoint] {
        &self.embedding
    }

    pub fn stats(&self) -> &[StatRow] {
        &self.stats
    }

    pub fn stat_columns(&self) -> &[String] {
        &self.stat_columns
    }

    /// Patient table columns in file order, paired with their header text.
    pub fn patient_columns(&self) -> &[(Column, String)] {
        &self.patient_columns
    }

    pub fn len(&self) -> usize {
        self.patients.len()
    }

    /// Maps an interaction index onto a row position, if it names one.
    pub fn position(&self, index: i64) -> Option<usize> {
        usize::try_from(index).ok().filter(|position| *position < self.len())
    }

    pub fn has_column(&self, column: &Column) -> bool {
        self.patient_columns.iter().any(|(known, _)| known == column)
    }

    /// Resolves a user-supplied column name against the header text or the
    /// role names `uid` and `risk`, ignoring ASCII case.
    pub fn resolve_column(&self, name: &str) -> Option<Column> {
        let name = name.trim();
        self.patient_columns
            .iter()
            .find(|(column, header)| {
                header.eq_ignore_ascii_case(name) || column.to_string().eq_ignore_ascii_case(name)
            })
            .map(|(column, _)| column.clone())
    }
}

pub fn load<P: Read, E: Read, S: Read>(
    patients: P,
    embedding: E,
    stats: StatsSource<S>,
    config: &DashboardConfig,
) -> Result<DatasetSnapshot, LoadError> {
    let (patients, patient_columns) = read_patients(patients, config)?;
    let embedding = read_embedding(embedding)?;
    let (stat_columns, stats) = match stats {
        StatsSource::Precomputed(reader) => read_precomputed_stats(reader)?,
        StatsSource::Raw(reader) => {
            let (headers, rows) = read_numeric_table("raw dataset", reader)?;
            stats::describe_by_group(&headers, &rows, config)?
        }
    };

    let snapshot = DatasetSnapshot::new(patients, embedding, stats, patient_columns, stat_columns)?;
    info!(
        patients = snapshot.len(),
        groups = snapshot.stats().len(),
        "dataset loaded"
    );
    Ok(snapshot)
}

/// Loads `risk.csv` and `tsne.csv` from `dir`, with `stats.csv` when present
/// and otherwise statistics derived from `framingham.csv`.
pub fn load_dir(dir: &Path, config: &DashboardConfig) -> Result<DatasetSnapshot, LoadError> {
    let patients = open(&dir.join(PATIENTS_FILE))?;
    let embedding = open(&dir.join(EMBEDDING_FILE))?;

    let stats_path = dir.join(STATS_FILE);
    let stats = if stats_path.exists() {
        StatsSource::Precomputed(open(&stats_path)?)
    } else {
        StatsSource::Raw(open(&dir.join(RAW_DATASET_FILE))?)
    };

    load(patients, embedding, stats, config)
}

fn open(path: &Path) -> Result<File, LoadError> {
    File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_patients<R: Read>(
    reader: R,
    config: &DashboardConfig,
) -> Result<(Vec<PatientRecord>, Vec<(Column, String)>), LoadError> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers = reader.headers()?.clone();
    let uid_at = find_column("patient", &headers, &config.uid_column)?;
    let risk_at = find_column("patient", &headers, &config.risk_column)?;

    let columns: Vec<(Column, String)> = headers
        .iter()
        .enumerate()
        .map(|(at, header)| {
            let header = header.trim().to_string();
            let column = if at == uid_at {
                Column::Uid
            } else if at == risk_at {
                Column::Risk
            } else {
                Column::Attribute(header.clone())
            };
            (column, header)
        })
        .collect();

    let mut patients = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let record = result?;
        let row = row + 1;

        let raw_uid = record.get(uid_at).unwrap_or_default().trim();
        if raw_uid.is_empty() {
            return Err(LoadError::MalformedSchema {
                table: "patient",
                detail: format!("row {row}: empty uid"),
            });
        }

        let raw_risk = record.get(risk_at).unwrap_or_default();
        let risk = parse_risk_label(raw_risk).ok_or_else(|| LoadError::MalformedSchema {
            table: "patient",
            detail: format!("row {row}: unrecognised risk label '{}'", raw_risk.trim()),
        })?;

        let mut attributes = BTreeMap::new();
        for ((column, header), raw) in columns.iter().zip(record.iter()) {
            if let Column::Attribute(name) = column {
                if let Some(value) = parse_cell("patient", row, header, raw)? {
                    attributes.insert(name.clone(), value);
                }
            }
        }

        patients.push(PatientRecord {
            uid: Uid::parse(raw_uid),
            attributes,
            risk,
        });
    }

    Ok((patients, columns))
}

/// The first three columns are coordinates and the fourth is the color value;
/// any further columns are ignored.
fn read_embedding<R: Read>(reader: R) -> Result<Vec<EmbeddingPoint>, LoadError> {
    let (headers, rows) = read_numeric_table("embedding", reader)?;
    if headers.len() < 4 {
        return Err(LoadError::MalformedSchema {
            table: "embedding",
            detail: format!(
                "expected three coordinate columns and a color column, found {} columns",
                headers.len()
            ),
        });
    }

    rows.into_iter()
        .enumerate()
        .map(|(index, values)| -> Result<EmbeddingPoint, LoadError> {
            let mut fields = [0.0; 4];
            for (slot, (value, header)) in fields.iter_mut().zip(values.iter().zip(&headers)) {
                *slot = value.ok_or_else(|| LoadError::MalformedSchema {
                    table: "embedding",
                    detail: format!("row {}: column '{header}' is empty", index + 1),
                })?;
            }
            Ok(EmbeddingPoint {
                index,
                coordinates: [fields[0], fields[1], fields[2]],
                color_value: fields[3],
            })
        })
        .collect()
}

/// First column is the group label, the rest are per-group means.
fn read_precomputed_stats<R: Read>(reader: R) -> Result<(Vec<String>, Vec<StatRow>), LoadError> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|header| header.trim().to_string())
        .collect();
    if headers.len() < 2 {
        return Err(LoadError::MalformedSchema {
            table: "statistics",
            detail: "expected a group column and at least one metric column".to_string(),
        });
    }

    let mut rows = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let record = result?;
        let row = row + 1;
        let mut metrics = BTreeMap::new();
        for (header, raw) in headers.iter().zip(record.iter()).skip(1) {
            if let Some(value) = parse_cell("statistics", row, header, raw)? {
                metrics.insert(header.clone(), value);
            }
        }
        rows.push(StatRow {
            group: record.get(0).unwrap_or_default().trim().to_string(),
            metrics,
        });
    }

    Ok((headers[1..].to_vec(), rows))
}

fn read_numeric_table<R: Read>(
    table: &'static str,
    reader: R,
) -> Result<(Vec<String>, Vec<Vec<Option<f64>>>), LoadError> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|header| header.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let record = result?;
        let values = headers
            .iter()
            .zip(record.iter())
            .map(|(header, raw)| parse_cell(table, row + 1, header, raw))
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(values);
    }

    Ok((headers, rows))
}

fn find_column(
    table: &'static str,
    headers: &csv::StringRecord,
    name: &str,
) -> Result<usize, LoadError> {
    headers
        .iter()
        .position(|header| header.trim().eq_ignore_ascii_case(name))
        .ok_or_else(|| LoadError::MalformedSchema {
            table,
            detail: format!("missing column '{name}'"),
        })
}

/// Empty, `NA` and `NaN` cells are missing values.
fn parse_cell(
    table: &'static str,
    row: usize,
    header: &str,
    raw: &str,
) -> Result<Option<f64>, LoadError> {
    let value = raw.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("na") || value.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }

    value
        .parse::<f64>()
        .map(Some)
        .map_err(|_| LoadError::MalformedSchema {
            table,
            detail: format!("row {row}: column '{header}' holds non-numeric value '{value}'"),
        })
}

#[cfg(test)]
pub(crate) const FIXTURE_PATIENTS: &str =
    "UID,age,sysBP,risk\n1,50,120,0\n2,61,150,1\n3,45,NA,0\n4,61,140,1\n";
#[cfg(test)]
pub(crate) const FIXTURE_EMBEDDING: &str =
    "d1,d2,d3,label\n0.1,0.2,0.3,0\n1.1,1.2,1.3,1\n2.1,2.2,2.3,0\n3.1,3.2,3.3,1\n";
#[cfg(test)]
pub(crate) const FIXTURE_STATS: &str = "Gender,age,sysBP\nFemale,47.5,120\nMale,61,145\n";

/// Four patients: uids 1..=4, uids 2 and 4 at risk, patient 3 missing sysBP.
#[cfg(test)]
pub(crate) fn fixture() -> DatasetSnapshot {
    load(
        FIXTURE_PATIENTS.as_bytes(),
        FIXTURE_EMBEDDING.as_bytes(),
        StatsSource::Precomputed(FIXTURE_STATS.as_bytes()),
        &DashboardConfig::default(),
    )
    .expect("fixture loads")
}
