pub mod aggregate;
pub mod api;
pub mod config;
pub mod constants;
pub mod error;
pub mod io;
pub mod loader;
pub mod model;
pub mod query;
pub mod registry;
pub mod runtime;
pub mod shuffle;
pub mod sink;
pub mod stats;
pub mod timing;
pub mod utils;

pub use aggregate::{SumCombiner, SumReducer};
pub use api::{Collator, Combiner, ExecutablePipeline, Mapper, Reducer};
pub use config::PipelineConfig;
pub use error::PipelineError;
pub use model::{RentalRecord, Station, StationId};
pub use query::{started_trips, started_trips_partitioned, OrderPolicy, ResultRow, StartedTripsCollator, StartedTripsMapper};
pub use registry::StationRegistry;
pub use runtime::{default_pipeline, JobPhase, JobReport, RuntimePipeline};
pub use sink::{CsvResultSink, MemorySink, ResultSink};
