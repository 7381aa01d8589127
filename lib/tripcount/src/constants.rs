//! Centralized environment variable names and default values for pipeline tuning.

// Environment variable names
pub const ENV_PARTITIONS: &str = "TRIPCOUNT_PARTITIONS";
pub const ENV_REDUCERS: &str = "TRIPCOUNT_REDUCERS";
pub const ENV_RAYON_THREADS: &str = "TRIPCOUNT_RAYON_THREADS";
pub const ENV_BATCH_RECORDS: &str = "TRIPCOUNT_BATCH_RECORDS";
pub const ENV_QUEUE_CAP: &str = "TRIPCOUNT_QUEUE_CAP";
pub const ENV_COMBINER: &str = "TRIPCOUNT_COMBINER";
// Rayon's own override; when set it wins over TRIPCOUNT_RAYON_THREADS
pub const ENV_RAYON_NUM_THREADS: &str = "RAYON_NUM_THREADS";

// Defaults
// Pairs buffered per shard inside a map task before one channel send
pub const DEFAULT_BATCH_RECORDS: usize = 4096;
// Bounded shard queue; map tasks block when a shard falls behind
pub const DEFAULT_QUEUE_CAP: usize = 1024;

// Input / output file names inside the in/out directories
pub const BIKES_FILE: &str = "bikes.csv";
pub const STATIONS_FILE: &str = "stations.csv";
pub const RESULT_FILE: &str = "query1.csv";
pub const TIMING_FILE: &str = "time1.txt";

/// Field separator shared by the input CSVs and the result file.
pub const FIELD_DELIMITER: u8 = b';';
/// Header row of the result file.
pub const RESULT_HEADER: &str = "station;started_trips";
