use crate::model::{Station, StationId};
use std::collections::HashMap;
use tracing::debug;

/// Read-only lookup of known stations, built once before a job and shared by
/// every map task behind an `Arc`. There are no mutating methods.
#[derive(Clone, Debug, Default)]
pub struct StationRegistry {
    stations: HashMap<StationId, Station>,
}

impl StationRegistry {
    /// Builds the registry. On duplicate ids the first station wins.
    pub fn from_stations<I>(stations: I) -> Self
    where
        I: IntoIterator<Item = Station>,
    {
        let mut map = HashMap::new();
        for station in stations {
            if map.contains_key(&station.station_id) {
                debug!(station_id = %station.station_id, "duplicate station id ignored");
                continue;
            }
            map.insert(station.station_id.clone(), station);
        }
        Self { stations: map }
    }

    /// Exact-match membership test.
    pub fn contains(&self, station_id: &str) -> bool {
        self.stations.contains_key(station_id)
    }

    pub fn get(&self, station_id: &str) -> Option<&Station> {
        self.stations.get(station_id)
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}

impl FromIterator<Station> for StationRegistry {
    fn from_iter<T: IntoIterator<Item = Station>>(iter: T) -> Self {
        Self::from_stations(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_exact_match() {
        let registry: StationRegistry = vec![Station::new("10", "Berri", 45.5, -73.5)].into_iter().collect();
        assert!(registry.contains("10"));
        assert!(!registry.contains("1"));
        assert!(!registry.contains("10 "));
        assert_eq!(registry.get("10").map(|s| s.name.as_str()), Some("Berri"));
    }

    #[test]
    fn duplicate_ids_keep_first() {
        let registry = StationRegistry::from_stations(vec![
            Station::new("A", "first", 0.0, 0.0),
            Station::new("A", "second", 0.0, 0.0),
        ]);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("A").unwrap().name, "first");
    }
}
