//! CSV text to typed records. Normalization happens once, here: blank
//! episode end dates become `as_of`, episodes without a start are dropped.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::config::ColumnsConfig;
use crate::error::MatchError;
use crate::model::{Assessment, Episode};

/// A row that was read but not turned into a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedRow {
    pub record_id: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct Ingested<T> {
    pub records: Vec<T>,
    pub dropped: Vec<DroppedRow>,
}

struct Table<'a> {
    source: &'static str,
    headers: Vec<String>,
    reader: csv::Reader<&'a [u8]>,
}

impl<'a> Table<'a> {
    fn open(source: &'static str, csv_data: &'a str) -> Result<Self, MatchError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(csv_data.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| MatchError::Io(e.to_string()))?
            .iter()
            .map(|h| h.to_string())
            .collect();

        Ok(Self { source, headers, reader })
    }

    fn idx(&self, name: &str) -> Result<usize, MatchError> {
        self.headers.iter().position(|h| h == name).ok_or_else(|| MatchError::MissingColumn {
            source: self.source.into(),
            column: name.into(),
        })
    }
}

fn parse_date(
    source: &str,
    record_id: &str,
    value: &str,
    format: &str,
) -> Result<Option<NaiveDate>, MatchError> {
    if value.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(value, format)
        .map(Some)
        .map_err(|_| MatchError::DateParse {
            source: source.into(),
            record_id: record_id.into(),
            value: value.into(),
        })
}

/// Load episodes. A blank end date means the episode is still open and is
/// closed at `as_of`.
pub fn load_episodes_csv(
    csv_data: &str,
    columns: &ColumnsConfig,
    as_of: NaiveDate,
) -> Result<Ingested<Episode>, MatchError> {
    let mut table = Table::open("episodes", csv_data)?;
    let col = &columns.episodes;

    let id_idx = table.idx(&col.episode_id)?;
    let client_idx = table.idx(&col.client_key)?;
    let program_idx = table.idx(&col.program)?;
    let start_idx = table.idx(&col.start)?;
    let end_idx = table.idx(&col.end)?;

    let mut records = Vec::new();
    let mut dropped = Vec::new();

    for record in table.reader.records() {
        let record = record.map_err(|e| MatchError::Io(e.to_string()))?;
        let get = |i: usize| record.get(i).unwrap_or("");

        let episode_id = get(id_idx).to_string();
        let Some(start) = parse_date("episodes", &episode_id, get(start_idx), &columns.date_format)?
        else {
            dropped.push(DroppedRow {
                record_id: episode_id,
                reason: "missing start date".into(),
            });
            continue;
        };
        let end = parse_date("episodes", &episode_id, get(end_idx), &columns.date_format)?;

        match Episode::with_open_end(
            episode_id.clone(),
            get(client_idx),
            get(program_idx),
            start,
            end,
            as_of,
        ) {
            Ok(ep) => records.push(ep),
            Err(e) => dropped.push(DroppedRow {
                record_id: episode_id,
                reason: e.to_string(),
            }),
        }
    }

    if !dropped.is_empty() {
        log::warn!("episodes: dropped {} of {} rows", dropped.len(), dropped.len() + records.len());
    }
    Ok(Ingested { records, dropped })
}

/// Load assessments. Every unmapped column is kept in `fields`; a blank
/// date is kept as `None` for the engine to report.
pub fn load_assessments_csv(
    csv_data: &str,
    columns: &ColumnsConfig,
) -> Result<Ingested<Assessment>, MatchError> {
    let mut table = Table::open("assessments", csv_data)?;
    let col = &columns.assessments;

    let id_idx = table.idx(&col.assessment_id)?;
    let client_idx = table.idx(&col.client_key)?;
    let program_idx = table.idx(&col.program)?;
    let date_idx = table.idx(&col.date)?;
    let mapped = [id_idx, client_idx, program_idx, date_idx];

    let headers = &table.headers;
    let mut records = Vec::new();

    for record in table.reader.records() {
        let record = record.map_err(|e| MatchError::Io(e.to_string()))?;
        let get = |i: usize| record.get(i).unwrap_or("");

        let assessment_id = get(id_idx);
        let date = parse_date("assessments", assessment_id, get(date_idx), &columns.date_format)?;

        let fields: BTreeMap<String, String> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| !mapped.contains(i))
            .filter_map(|(i, h)| record.get(i).map(|v| (h.clone(), v.to_string())))
            .collect();

        records.push(
            Assessment::new(get(client_idx), assessment_id, get(program_idx), date)
                .with_fields(fields),
        );
    }

    Ok(Ingested {
        records,
        dropped: Vec::new(),
    })
}
