//! Run start/stop times from the mvme `messages.log`.

use chrono::{Duration, NaiveDateTime};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

/// File name of the run log next to a listfile.
pub const RUN_LOG_FILE: &str = "messages.log";

const START_MARKER: &str = "readout starting on";
const STOP_MARKER: &str = "readout stopped on";

/// Trailing stamp, e.g. `2019-03-14T15:09:26`.
const STAMP_LEN: usize = 19;
const STAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Error, Debug)]
pub enum RunLogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Start and stop of the readout as logged by mvme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunLog {
    pub start: Option<NaiveDateTime>,
    pub stop: Option<NaiveDateTime>,
}

impl RunLog {
    /// Reads the run log at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RunLogError> {
        let file = File::open(path)?;
        Self::parse(BufReader::new(file))
    }

    /// Scans log lines for the readout start and stop messages.
    ///
    /// The last matching line of each kind wins. Lines whose trailing stamp
    /// does not parse are skipped.
    pub fn parse<R: BufRead>(reader: R) -> Result<Self, RunLogError> {
        let mut log = RunLog::default();
        for line in reader.lines() {
            let line = line?;
            if line.contains(START_MARKER) {
                if let Some(stamp) = parse_trailing_stamp(&line) {
                    log.start = Some(stamp);
                }
            } else if line.contains(STOP_MARKER) {
                if let Some(stamp) = parse_trailing_stamp(&line) {
                    log.stop = Some(stamp);
                }
            }
        }
        Ok(log)
    }

    /// Wall-clock length of the run, when both ends were logged.
    pub fn duration(&self) -> Option<Duration> {
        Some(self.stop? - self.start?)
    }
}

fn parse_trailing_stamp(line: &str) -> Option<NaiveDateTime> {
    let line = line.trim_end();
    let stamp = line.get(line.len().checked_sub(STAMP_LEN)?..)?;
    NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).ok()
}
