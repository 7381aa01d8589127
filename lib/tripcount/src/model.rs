use chrono::NaiveDateTime;

pub type StationId = String;

/// One bike rental. Only `origin_station_id` matters to the started-trips query.
#[derive(Clone, Debug, PartialEq)]
pub struct RentalRecord {
    pub start_date: NaiveDateTime,
    pub origin_station_id: StationId,
    pub end_date: NaiveDateTime,
    pub destination_station_id: StationId,
    pub is_member: bool,
}

impl RentalRecord {
    /// Record with placeholder trip attributes; used where only the origin matters.
    pub fn from_origin(origin: impl Into<StationId>) -> Self {
        let epoch = NaiveDateTime::default();
        Self {
            start_date: epoch,
            origin_station_id: origin.into(),
            end_date: epoch,
            destination_station_id: StationId::new(),
            is_member: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Station {
    pub station_id: StationId,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Station {
    pub fn new(station_id: impl Into<StationId>, name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self { station_id: station_id.into(), name: name.into(), latitude, longitude }
    }
}
