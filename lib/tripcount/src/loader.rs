//! Loaders for the semicolon-separated rental and station files.

use crate::io::{csv_reader, csv_reader_from};
use crate::model::{RentalRecord, Station};
use crate::registry::StationRegistry;
use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use std::time::Instant;
use tracing::info;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

// start_date;emplacement_pk_start;end_date;emplacement_pk_end;is_member
#[derive(Debug, Deserialize)]
struct BikeRow {
    start_date: String,
    emplacement_pk_start: String,
    end_date: String,
    emplacement_pk_end: String,
    is_member: String,
}

// pk;name;latitude;longitude
#[derive(Debug, Deserialize)]
struct StationRow {
    pk: String,
    name: String,
    latitude: f64,
    longitude: f64,
}

impl BikeRow {
    // an empty origin is kept; it matches no station and the mapper drops it
    fn into_record(self) -> Result<RentalRecord> {
        Ok(RentalRecord {
            start_date: parse_date(&self.start_date).context("start_date")?,
            origin_station_id: self.emplacement_pk_start,
            end_date: parse_date(&self.end_date).context("end_date")?,
            destination_station_id: self.emplacement_pk_end,
            is_member: parse_flag(&self.is_member).context("is_member")?,
        })
    }
}

impl StationRow {
    fn into_station(self) -> Result<Station> {
        if self.pk.is_empty() {
            bail!("empty station pk");
        }
        Ok(Station { station_id: self.pk, name: self.name, latitude: self.latitude, longitude: self.longitude })
    }
}

fn parse_date(raw: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, DATE_FORMAT).with_context(|| format!("bad date {raw:?}"))
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        other => Err(anyhow!("bad flag {other:?}")),
    }
}

/// Deserializes every row of `reader` and converts it. `source` names the input in errors.
fn read_rows<R, Row, T>(mut reader: csv::Reader<R>, source: &str, convert: fn(Row) -> Result<T>) -> Result<Vec<T>>
where
    R: Read,
    Row: for<'de> Deserialize<'de>,
{
    let mut out = Vec::new();
    for (idx, row) in reader.deserialize::<Row>().enumerate() {
        // header is line 1
        let line = idx + 2;
        let row = row.with_context(|| format!("{source}: malformed row at line {line}"))?;
        let value = convert(row).with_context(|| format!("{source}: invalid row at line {line}"))?;
        out.push(value);
    }
    Ok(out)
}

pub fn read_bikes<R: Read>(input: R, source: &str) -> Result<Vec<RentalRecord>> {
    read_rows(csv_reader_from(input), source, BikeRow::into_record)
}

pub fn read_stations<R: Read>(input: R, source: &str) -> Result<Vec<Station>> {
    read_rows(csv_reader_from(input), source, StationRow::into_station)
}

pub fn load_bikes(path: impl AsRef<Path>) -> Result<Vec<RentalRecord>> {
    let path = path.as_ref();
    let start = Instant::now();
    let source = path.display().to_string();
    let records = read_rows(csv_reader(path)?, &source, BikeRow::into_record)?;
    info!(path = %source, records = records.len(), wall_ms = start.elapsed().as_millis() as u64, "Loaded rentals");
    Ok(records)
}

pub fn load_stations(path: impl AsRef<Path>) -> Result<Vec<Station>> {
    let path = path.as_ref();
    let start = Instant::now();
    let source = path.display().to_string();
    let stations = read_rows(csv_reader(path)?, &source, StationRow::into_station)?;
    info!(path = %source, stations = stations.len(), wall_ms = start.elapsed().as_millis() as u64, "Loaded stations");
    Ok(stations)
}

pub fn load_registry(path: impl AsRef<Path>) -> Result<StationRegistry> {
    Ok(StationRegistry::from_stations(load_stations(path)?))
}
