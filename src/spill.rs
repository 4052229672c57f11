//! Bounded-memory processing for large histories: raw records are normalized
//! one batch at a time into JSONL files, then merged into the final CSV.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::error::TrackerError;
use crate::export;
use crate::models::{self, NormalizedRow, RawRecord};
use crate::normalizer;

/// Owns one run's scratch directory of batch files.
#[derive(Debug)]
pub struct SpillMerger {
    dir: PathBuf,
    batch_size: usize,
    batches: Vec<PathBuf>,
}

impl SpillMerger {
    /// Create `<temp_root>/<address>_<unix_nanos>_<pid>` so concurrent runs never share files.
    pub fn create(temp_root: &Path, address: &str, batch_size: usize) -> io::Result<Self> {
        let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
        let dir = temp_root.join(format!("{address}_{nanos}_{}", std::process::id()));
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, batch_size: batch_size.max(1), batches: Vec::new() })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn batch_files(&self) -> &[PathBuf] {
        &self.batches
    }

    /// Normalize and persist `records` in batches of `batch_size`; only one
    /// batch of rows is held in memory at a time.
    pub fn spill(&mut self, records: Vec<RawRecord>) -> io::Result<()> {
        let total_batches = records.len().div_ceil(self.batch_size);
        for (index, chunk) in records.chunks(self.batch_size).enumerate() {
            let rows = normalizer::normalize_batch(chunk);
            debug!(batch = index + 1, total_batches, rows = rows.len(), "batch normalized");
            if rows.is_empty() {
                continue;
            }
            let path = self.dir.join(format!("batch_{index:05}.jsonl"));
            write_batch(&path, &rows)?;
            self.batches.push(path);
        }
        info!(batches = self.batches.len(), dir = %self.dir.display(), "spilled batches to disk");
        Ok(())
    }

    /// Read every batch back, sort newest first and write the CSV.
    pub fn merge_into(&self, output: &Path) -> io::Result<usize> {
        let mut rows = Vec::new();
        for path in &self.batches {
            read_batch(path, &mut rows)?;
        }
        models::sort_newest_first(&mut rows);
        export::write_csv(output, rows)
    }

    pub fn cleanup(self) -> io::Result<()> {
        fs::remove_dir_all(&self.dir)
    }
}

fn write_batch(path: &Path, rows: &[NormalizedRow]) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for row in rows {
        serde_json::to_writer(&mut writer, row)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()
}

fn read_batch(path: &Path, rows: &mut Vec<NormalizedRow>) -> io::Result<()> {
    let reader = BufReader::new(File::open(path)?);
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        rows.push(serde_json::from_str(&line)?);
    }
    Ok(())
}

/// Spill `records` under `temp_root`, merge into `output` and remove the
/// scratch directory. On failure the directory is left in place and named in
/// the returned error.
pub fn spill_and_merge(
    records: Vec<RawRecord>,
    batch_size: usize,
    temp_root: &Path,
    address: &str,
    output: &Path,
) -> Result<usize, TrackerError> {
    let mut merger = SpillMerger::create(temp_root, address, batch_size).map_err(|source| {
        TrackerError::SpillMerge { dir: temp_root.to_path_buf(), source }
    })?;

    let merged = merger.spill(records).and_then(|()| merger.merge_into(output));
    match merged {
        Ok(rows) => {
            let dir = merger.dir().to_path_buf();
            if let Err(e) = merger.cleanup() {
                warn!(dir = %dir.display(), error = %e, "could not remove batch directory");
            }
            Ok(rows)
        }
        Err(source) => Err(TrackerError::SpillMerge { dir: merger.dir().to_path_buf(), source }),
    }
}
