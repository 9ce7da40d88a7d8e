//! Rotating CSV log for endurance-test runs.
//!
//! Diagnostic only: every failure in here is logged and swallowed so the
//! motion path can never block or fail on logging.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Metadata written as the second header row of every log file.
#[derive(Debug, Clone)]
pub struct LogMeta {
    pub cycle_target: u32,
    pub start_gap: i32,
    pub stop_gap: i32,
    pub run_freq: u32,
    pub approach_freq: u32,
    pub device_serial: String,
}

/// One row per controller update while the test is running.
#[derive(Debug, Clone)]
pub struct LogRow<'a> {
    pub total_cycle: u32,
    pub step_cycle: u32,
    pub ddd_value: i32,
    pub raw_ddd_value: i32,
    pub fail_count: u32,
    pub step_state: u8,
    pub remark: &'a str,
}

pub struct TestLog {
    live_dir: PathBuf,
    archive_dir: PathBuf,
    meta: LogMeta,
    /// Unix seconds at test start; part of every filename of this run.
    started_secs: u64,
    session: u32,
    max_bytes: u64,
    max_archives: usize,
    path: PathBuf,
    file: Option<BufWriter<File>>,
    bytes: u64,
}

impl TestLog {
    /// Open a fresh log session. Never fails: if the directory or file cannot
    /// be created the log runs disabled.
    pub fn create(
        live_dir: &Path,
        archive_dir: &Path,
        meta: LogMeta,
        max_bytes: u64,
        max_archives: usize,
    ) -> Self {
        let started_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let mut log = Self {
            live_dir: live_dir.to_path_buf(),
            archive_dir: archive_dir.to_path_buf(),
            meta,
            started_secs,
            session: 1,
            max_bytes,
            max_archives,
            path: PathBuf::new(),
            file: None,
            bytes: 0,
        };
        log.open_file();
        log
    }

    pub fn session(&self) -> u32 {
        self.session
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one CSV row, rotating first if the row would push the file past
    /// the size limit.
    pub fn write_row(&mut self, row: &LogRow<'_>) {
        let line = format!(
            "{},{},{},{},{},{},{}\n",
            row.total_cycle,
            row.step_cycle,
            row.ddd_value,
            row.raw_ddd_value,
            row.fail_count,
            row.step_state,
            row.remark
        );
        if self.bytes + line.len() as u64 > self.max_bytes {
            self.rotate();
        }
        if let Some(file) = self.file.as_mut() {
            match file.write_all(line.as_bytes()) {
                Ok(()) => self.bytes += line.len() as u64,
                Err(e) => tracing::warn!(error = %e, "test log write failed"),
            }
        }
    }

    pub fn flush(&mut self) {
        if let Some(file) = self.file.as_mut()
            && let Err(e) = file.flush()
        {
            tracing::warn!(error = %e, "test log flush failed");
        }
    }

    fn file_name(&self) -> String {
        format!(
            "agsa_endurance_{}_{}_s{}.csv",
            self.meta.device_serial, self.started_secs, self.session
        )
    }

    fn open_file(&mut self) {
        if let Err(e) = fs::create_dir_all(&self.live_dir) {
            tracing::warn!(error = %e, dir = %self.live_dir.display(), "cannot create log dir");
            self.file = None;
            return;
        }
        self.path = self.live_dir.join(self.file_name());
        let file = match File::create(&self.path) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(error = %e, path = %self.path.display(), "cannot create test log");
                self.file = None;
                return;
            }
        };
        let mut writer = BufWriter::new(file);
        let header = format!(
            "total_cycle,step_cycle,ddd,ddd_raw,fails,step_state,remark\n\
             {},{},{},{},{},{},{}\n",
            self.meta.cycle_target,
            self.meta.start_gap,
            self.meta.stop_gap,
            self.meta.run_freq,
            self.meta.approach_freq,
            self.meta.device_serial,
            self.session
        );
        match writer.write_all(header.as_bytes()) {
            Ok(()) => {
                self.bytes = header.len() as u64;
                self.file = Some(writer);
            }
            Err(e) => {
                tracing::warn!(error = %e, "test log header write failed");
                self.file = None;
            }
        }
    }

    /// Archive the current file (gzip), drop it from the live directory, and
    /// begin a new session with a fresh header.
    fn rotate(&mut self) {
        if let Some(mut file) = self.file.take()
            && let Err(e) = file.flush()
        {
            tracing::warn!(error = %e, "flush before rotation failed");
        }

        if let Err(e) = self.archive_current() {
            tracing::warn!(error = %e, "log archival failed");
        } else if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(error = %e, "removing rotated log failed");
        }
        self.prune_archives();

        self.session += 1;
        self.open_file();
        tracing::info!(session = self.session, "test log rotated");
    }

    fn archive_current(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.archive_dir)?;
        let archive_path = self.archive_dir.join(format!("{}.gz", self.file_name()));
        let mut reader = BufReader::new(File::open(&self.path)?);
        let out = File::create(&archive_path)?;
        let mut encoder = flate2::write::GzEncoder::new(out, flate2::Compression::default());
        std::io::copy(&mut reader, &mut encoder)?;
        encoder.finish()?;
        Ok(())
    }

    /// Keep only the most recently modified archives.
    fn prune_archives(&self) {
        let entries = match fs::read_dir(&self.archive_dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "cannot read archive dir");
                return;
            }
        };
        let mut archives: Vec<(SystemTime, PathBuf)> = entries
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "gz") {
                    let modified = entry.metadata().ok()?.modified().ok()?;
                    Some((modified, path))
                } else {
                    None
                }
            })
            .collect();
        archives.sort_by(|a, b| b.0.cmp(&a.0));
        for (_, path) in archives.into_iter().skip(self.max_archives) {
            if let Err(e) = fs::remove_file(&path) {
                tracing::warn!(error = %e, path = %path.display(), "archive prune failed");
            }
        }
    }
}

impl Drop for TestLog {
    fn drop(&mut self) {
        self.flush();
    }
}
