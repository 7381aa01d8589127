use crate::constants::FIELD_DELIMITER;
use anyhow::{Context, Result};
use std::collections::hash_map::DefaultHasher;
use std::fs::{self, File};
use std::hash::{Hash, Hasher};
use std::io::{BufReader, BufWriter, Read};
use std::path::Path;

pub fn ensure_dir(path: impl AsRef<Path>) -> Result<()> {
    fs::create_dir_all(path.as_ref()).with_context(|| format!("create_dir_all {}", path.as_ref().display()))
}

pub fn open_writer(path: impl AsRef<Path>) -> Result<BufWriter<File>> {
    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            ensure_dir(parent)?;
        }
    }
    let file = File::create(path.as_ref()).with_context(|| format!("create {}", path.as_ref().display()))?;
    Ok(BufWriter::new(file))
}

pub fn open_reader(path: impl AsRef<Path>) -> Result<BufReader<File>> {
    let file = File::open(path.as_ref()).with_context(|| format!("open {}", path.as_ref().display()))?;
    Ok(BufReader::new(file))
}

/// Semicolon-separated reader with a header row; fields are trimmed.
pub fn csv_reader_from<R: Read>(input: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .delimiter(FIELD_DELIMITER)
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(input)
}

pub fn csv_reader(path: impl AsRef<Path>) -> Result<csv::Reader<BufReader<File>>> {
    Ok(csv_reader_from(open_reader(path)?))
}

/// Stable shard assignment for a key. `DefaultHasher::new()` uses fixed keys,
/// so a key lands on the same shard in every run.
pub fn hash_to_partition<K: Hash>(key: &K, num_partitions: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() as usize) % num_partitions
}

/// Splits `records` into exactly `n` contiguous partitions whose sizes differ by at most one.
pub fn partition_slices<T>(records: &[T], n: usize) -> Vec<&[T]> {
    let n = n.max(1);
    let len = records.len();
    (0..n).map(|i| &records[i * len / n..(i + 1) * len / n]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitions_cover_every_record_once() {
        let data: Vec<u32> = (0..103).collect();
        let parts = partition_slices(&data, 4);
        assert_eq!(parts.len(), 4);
        let flat: Vec<u32> = parts.iter().flat_map(|p| p.iter().copied()).collect();
        assert_eq!(flat, data);
        let max = parts.iter().map(|p| p.len()).max().unwrap();
        let min = parts.iter().map(|p| p.len()).min().unwrap();
        assert!(max - min <= 1);
    }

    #[test]
    fn even_split() {
        let data = vec![0u8; 100];
        let sizes: Vec<usize> = partition_slices(&data, 4).iter().map(|p| p.len()).collect();
        assert_eq!(sizes, vec![25, 25, 25, 25]);
    }

    #[test]
    fn empty_store_yields_empty_partitions() {
        let data: Vec<u8> = Vec::new();
        let parts = partition_slices(&data, 3);
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| p.is_empty()));
    }

    #[test]
    fn hash_partition_is_stable_and_in_range() {
        for key in ["A", "B", "station-42", ""] {
            let p = hash_to_partition(&key.to_string(), 7);
            assert!(p < 7);
            assert_eq!(p, hash_to_partition(&key.to_string(), 7));
        }
    }
}
