//! Started trips per origin station: the mapper/collator pair and the job that wires
//! them to the runtime.

use crate::aggregate::{SumCombiner, SumReducer};
use crate::api::{Collator, ExecutablePipeline, Mapper};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::io::partition_slices;
use crate::model::{RentalRecord, StationId};
use crate::registry::StationRegistry;
use crate::runtime::{JobReport, RuntimePipeline};
use anyhow::Result;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Emits `(origin_station_id, 1)` for every record whose origin is a known station.
/// Unknown origins are dropped silently.
#[derive(Clone, Debug)]
pub struct StartedTripsMapper {
    registry: Arc<StationRegistry>,
}

impl StartedTripsMapper {
    pub fn new(registry: Arc<StationRegistry>) -> Self { Self { registry } }
}

impl Mapper for StartedTripsMapper {
    type Input = RentalRecord;
    type Key = StationId;
    type Value = u64;

    fn do_map<F>(&self, partition: &[Self::Input], emit: &mut F) -> Result<()>
    where
        F: FnMut(Self::Key, Self::Value),
    {
        for rec in partition {
            if self.registry.contains(&rec.origin_station_id) {
                emit(rec.origin_station_id.clone(), 1);
            }
        }
        Ok(())
    }
}

/// One line of the result: a station and the number of trips that started there.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResultRow {
    pub station_id: StationId,
    pub started_trips: u64,
}

impl ResultRow {
    pub fn new(station_id: impl Into<StationId>, started_trips: u64) -> Self {
        Self { station_id: station_id.into(), started_trips }
    }
}

impl fmt::Display for ResultRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{}", self.station_id, self.started_trips)
    }
}

/// Output ordering of the collated rows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderPolicy {
    /// Ascending by station id (byte-wise string order).
    #[default]
    StationAsc,
    /// Descending by trip count, ties broken by ascending station id.
    TripsDesc,
}

impl fmt::Display for OrderPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderPolicy::StationAsc => f.write_str("station-asc"),
            OrderPolicy::TripsDesc => f.write_str("trips-desc"),
        }
    }
}

impl FromStr for OrderPolicy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "station-asc" | "station" => Ok(OrderPolicy::StationAsc),
            "trips-desc" | "trips" => Ok(OrderPolicy::TripsDesc),
            other => Err(PipelineError::InvalidConfig(format!(
                "unknown order policy {other:?} (expected station-asc or trips-desc)"
            ))),
        }
    }
}

/// Drops zero counts and orders the rest per the policy, fully materialised.
#[derive(Clone, Copy, Debug, Default)]
pub struct StartedTripsCollator {
    order: OrderPolicy,
}

impl StartedTripsCollator {
    pub fn new(order: OrderPolicy) -> Self { Self { order } }
}

impl Collator for StartedTripsCollator {
    type In = (StationId, u64);
    type Out = Vec<ResultRow>;

    fn collate<I>(&self, values: I) -> Self::Out
    where
        I: IntoIterator<Item = Self::In>,
    {
        let mut rows: Vec<ResultRow> = values
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(station_id, started_trips)| ResultRow { station_id, started_trips })
            .collect();
        match self.order {
            OrderPolicy::StationAsc => rows.sort_by(|a, b| a.station_id.cmp(&b.station_id)),
            OrderPolicy::TripsDesc => rows.sort_by(|a, b| {
                b.started_trips.cmp(&a.started_trips).then_with(|| a.station_id.cmp(&b.station_id))
            }),
        }
        rows
    }
}

/// Runs the started-trips job over `records`, split into `config.partitions`
/// partitions, with the combiner enabled when `config.combiner` is set.
pub fn started_trips(
    records: &[RentalRecord],
    registry: Arc<StationRegistry>,
    config: &PipelineConfig,
    order: OrderPolicy,
) -> Result<JobReport<Vec<ResultRow>>> {
    config.validate()?;
    let partitions = partition_slices(records, config.partitions);
    started_trips_partitioned(&partitions, registry, config, order)
}

/// Same as [`started_trips`] over partitions chosen by the caller.
/// `config.partitions` is ignored; one map task runs per slice.
pub fn started_trips_partitioned(
    partitions: &[&[RentalRecord]],
    registry: Arc<StationRegistry>,
    config: &PipelineConfig,
    order: OrderPolicy,
) -> Result<JobReport<Vec<ResultRow>>> {
    let mut pipeline = RuntimePipeline::new(config.clone());
    pipeline.map_reduce(
        partitions,
        StartedTripsMapper::new(registry),
        config.combiner.then(SumCombiner::new),
        SumReducer::new(),
        StartedTripsCollator::new(order),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Station;

    fn registry(ids: &[&str]) -> Arc<StationRegistry> {
        Arc::new(ids.iter().map(|id| Station::new(*id, *id, 0.0, 0.0)).collect())
    }

    #[test]
    fn mapper_filters_unknown_origins() {
        let mapper = StartedTripsMapper::new(registry(&["A", "B"]));
        let records: Vec<RentalRecord> = ["A", "C", "B", "a"].iter().map(|o| RentalRecord::from_origin(*o)).collect();
        let mut emitted = Vec::new();
        mapper.do_map(&records, &mut |k: StationId, v: u64| emitted.push((k, v))).unwrap();
        assert_eq!(emitted, vec![("A".to_string(), 1), ("B".to_string(), 1)]);
    }

    #[test]
    fn collator_drops_zero_counts_and_sorts_by_station() {
        let rows = StartedTripsCollator::new(OrderPolicy::StationAsc).collate(vec![
            ("B".to_string(), 1),
            ("Z".to_string(), 0),
            ("A".to_string(), 3),
        ]);
        assert_eq!(rows, vec![ResultRow::new("A", 3), ResultRow::new("B", 1)]);
    }

    #[test]
    fn trips_desc_breaks_ties_by_station() {
        let rows = StartedTripsCollator::new(OrderPolicy::TripsDesc).collate(vec![
            ("C".to_string(), 2),
            ("A".to_string(), 5),
            ("B".to_string(), 2),
        ]);
        assert_eq!(rows, vec![ResultRow::new("A", 5), ResultRow::new("B", 2), ResultRow::new("C", 2)]);
    }

    #[test]
    fn order_policy_parses() {
        assert_eq!("station-asc".parse::<OrderPolicy>().unwrap(), OrderPolicy::StationAsc);
        assert_eq!("Trips-Desc".parse::<OrderPolicy>().unwrap(), OrderPolicy::TripsDesc);
        assert!("random".parse::<OrderPolicy>().is_err());
        assert_eq!(OrderPolicy::TripsDesc.to_string(), "trips-desc");
    }

    #[test]
    fn row_renders_semicolon_separated() {
        assert_eq!(ResultRow::new("6100", 42).to_string(), "6100;42");
    }
}
