//! Rotating JSONL writer

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use super::types::ChannelRecord;
use crate::config::RecorderConfig;
use crate::error::Result;

const FILE_PREFIX: &str = "ghst_";
const FILE_EXTENSION: &str = "jsonl";

/// Writes [`ChannelRecord`]s to `ghst_<time>_<seq>.jsonl` files
#[derive(Debug)]
pub struct ChannelRecorder {
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    writer: Option<BufWriter<File>>,
    current_path: Option<PathBuf>,
    records_in_file: usize,
    file_seq: u32,
}

impl ChannelRecorder {
    /// Create the recorder, creating `log_dir` if needed
    ///
    /// # Errors
    ///
    /// Returns `GhstError::Io` if the directory cannot be created
    pub fn new(config: &RecorderConfig) -> Result<Self> {
        Self::with_limits(&config.log_dir, config.max_records_per_file, config.max_files_to_keep)
    }

    pub fn with_limits<P: AsRef<Path>>(dir: P, max_records_per_file: usize, max_files_to_keep: usize) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        info!("Recording GHST channels to {}", dir.display());

        Ok(Self {
            dir,
            max_records_per_file: max_records_per_file.max(1),
            max_files_to_keep: max_files_to_keep.max(1),
            writer: None,
            current_path: None,
            records_in_file: 0,
            file_seq: 0,
        })
    }

    /// Append one record, rotating first if the current file is full
    pub fn record(&mut self, record: &ChannelRecord) -> Result<()> {
        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        if let Some(writer) = self.writer.as_mut() {
            serde_json::to_writer(&mut *writer, record)?;
            writer.write_all(b"\n")?;
            self.records_in_file += 1;
        }

        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    /// File currently being written, if any record was written yet
    pub fn current_path(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    fn rotate(&mut self) -> Result<()> {
        self.flush()?;

        let name = format!(
            "{}{}_{:06}.{}",
            FILE_PREFIX,
            Utc::now().format("%Y%m%d_%H%M%S"),
            self.file_seq,
            FILE_EXTENSION
        );
        self.file_seq = self.file_seq.wrapping_add(1);

        let path = self.dir.join(name);
        let file = File::create(&path)?;
        debug!("Opened recorder file {}", path.display());

        self.writer = Some(BufWriter::new(file));
        self.current_path = Some(path);
        self.records_in_file = 0;

        self.prune()
    }

    /// Delete the oldest log files beyond the retention limit
    fn prune(&self) -> Result<()> {
        let mut files: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_recorder_file(path))
            .collect();

        if files.len() <= self.max_files_to_keep {
            return Ok(());
        }

        // Names sort chronologically
        files.sort();
        let excess = files.len() - self.max_files_to_keep;
        for path in &files[..excess] {
            if let Err(e) = fs::remove_file(path) {
                warn!("Failed to remove old recorder file {}: {}", path.display(), e);
            }
        }

        Ok(())
    }
}

impl Drop for ChannelRecorder {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!("Failed to flush recorder: {}", e);
        }
    }
}

fn is_recorder_file(path: &Path) -> bool {
    let name_ok = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(FILE_PREFIX));
    let ext_ok = path.extension().and_then(|e| e.to_str()) == Some(FILE_EXTENSION);
    name_ok && ext_ok
}
