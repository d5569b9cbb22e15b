//! Raw input rows as they come out of the source CSV files.
//!
//! Every field is kept as text so that malformed values can be coerced to
//! missing instead of failing the whole read.

use std::fs::File;
use std::path::Path;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::Result;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WeatherRecord {
    #[serde(alias = "DATE", alias = "date")]
    #[serde(rename = "Date")]
    pub date: Option<String>,
    pub borough: Option<String>,
    #[serde(rename = "TMAX")]
    pub tmax: Option<String>,
    #[serde(rename = "TMIN")]
    pub tmin: Option<String>,
    #[serde(rename = "PRCP")]
    pub prcp: Option<String>,
    #[serde(rename = "AWND")]
    pub awnd: Option<String>,
    #[serde(rename = "RHAV")]
    pub rhav: Option<String>,
    #[serde(rename = "RHMX")]
    pub rhmx: Option<String>,
    #[serde(rename = "RHMN")]
    pub rhmn: Option<String>,
}

impl WeatherRecord {
    /// Raw measurement codes paired with their values.
    pub fn measurements(&self) -> [(&'static str, &Option<String>); 7] {
        [
            ("TMAX", &self.tmax),
            ("TMIN", &self.tmin),
            ("PRCP", &self.prcp),
            ("AWND", &self.awnd),
            ("RHAV", &self.rhav),
            ("RHMX", &self.rhmx),
            ("RHMN", &self.rhmn),
        ]
    }
}

/// Row of the respiratory or asthma admission tables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdmissionRecord {
    #[serde(alias = "Start_Date", alias = "DATE", alias = "date")]
    #[serde(rename = "Date")]
    pub date: Option<String>,
    #[serde(rename = "Dim1Value", alias = "borough")]
    pub borough: Option<String>,
    #[serde(rename = "Count")]
    pub count: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AirQualityRecord {
    #[serde(rename = "Start_Date", alias = "Date")]
    pub date: Option<String>,
    #[serde(rename = "Geo Place Name", alias = "borough")]
    pub borough: Option<String>,
    #[serde(rename = "Name")]
    pub name: Option<String>,
    #[serde(rename = "Data Value")]
    pub value: Option<String>,
}

/// The four raw tables consumed by a training run.
#[derive(Debug, Clone, Default)]
pub struct RawTables {
    pub weather: Vec<WeatherRecord>,
    pub respiratory: Vec<AdmissionRecord>,
    pub asthma: Vec<AdmissionRecord>,
    pub air_quality: Vec<AirQualityRecord>,
}

impl RawTables {
    pub fn read(dir: &Path, files: &crate::config::DataFiles) -> Result<RawTables> {
        Ok(RawTables {
            weather: read_records(dir.join(&files.weather))?,
            respiratory: read_records(dir.join(&files.respiratory))?,
            asthma: read_records(dir.join(&files.asthma))?,
            air_quality: read_records(dir.join(&files.air_quality))?,
        })
    }
}

pub fn read_records<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<Vec<T>> {
    let file = File::open(path.as_ref())?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut records = Vec::new();
    for row in reader.deserialize() {
        records.push(row?);
    }
    log::debug!("read {} rows from {:?}", records.len(), path.as_ref());
    Ok(records)
}

/// Lenient date parsing: ISO dates, ISO timestamps and US style dates.
pub fn parse_date(raw: &Option<String>) -> Option<NaiveDate> {
    let text = raw.as_deref()?.trim();
    if text.is_empty() {
        return None;
    }
    let head = text.split(|c| c == 'T' || c == ' ').next().unwrap_or(text);
    NaiveDate::parse_from_str(head, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(head, "%m/%d/%Y"))
        .or_else(|_| NaiveDate::parse_from_str(head, "%Y/%m/%d"))
        .ok()
}

/// Numeric coercion; anything non-numeric becomes missing.
pub fn parse_number(raw: &Option<String>) -> Option<f64> {
    let text = raw.as_deref()?.trim().replace(',', "");
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}
