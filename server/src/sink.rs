//! Result persistence.
//!
//! A finished session hands its observations to a [`ResultSink`]. The file
//! sink stores them as a JSON array named after the subject and condition,
//! replacing any earlier record with the same identity.

use crate::error::{ConfigError, SinkError};
use log::info;
use shared::ClickReport;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Who was tested and under which condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    subject: String,
    condition: String,
}

impl Identity {
    pub fn new(
        subject: impl Into<String>,
        condition: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let subject = subject.into();
        let condition = condition.into();
        for label in [&subject, &condition] {
            if !is_valid_label(label) {
                return Err(ConfigError::InvalidLabel(label.clone()));
            }
        }
        Ok(Self { subject, condition })
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn condition(&self) -> &str {
        &self.condition
    }

    /// `{subject}-{condition}.json`
    pub fn file_name(&self) -> String {
        format!("{}-{}.json", self.subject, self.condition)
    }
}

fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && !label.contains("..")
        && label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Durable storage for one session's observations.
pub trait ResultSink: Send + Sync {
    /// Stores `observations` under `identity`, replacing any previous record.
    /// Returns where the record was written.
    fn persist(
        &self,
        identity: &Identity,
        observations: &[ClickReport],
    ) -> Result<PathBuf, SinkError>;
}

/// Writes records as `{dir}/{subject}-{condition}.json`.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, identity: &Identity) -> PathBuf {
        self.dir.join(identity.file_name())
    }

    /// Reads back a stored record.
    pub fn load(&self, identity: &Identity) -> Result<Vec<ClickReport>, SinkError> {
        let bytes = fs::read(self.path_for(identity))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl ResultSink for JsonFileSink {
    fn persist(
        &self,
        identity: &Identity,
        observations: &[ClickReport],
    ) -> Result<PathBuf, SinkError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(identity);

        // File::create truncates, so a rerun replaces the old record
        let mut file = File::create(&path)?;
        let written = write_record(&mut file, observations)?;
        file.sync_all()?;

        info!(
            "Saved {} observations ({} bytes) to {}",
            observations.len(),
            written,
            path.display()
        );
        Ok(path)
    }
}

/// Serializes `observations` and writes the whole buffer.
///
/// Partial writes are continued and `Interrupted` is retried. A writer that
/// stops accepting bytes yields [`SinkError::ShortWrite`].
pub fn write_record<W: Write>(
    writer: &mut W,
    observations: &[ClickReport],
) -> Result<usize, SinkError> {
    let bytes = serde_json::to_vec(observations)?;
    let mut written = 0;
    while written < bytes.len() {
        match writer.write(&bytes[written..]) {
            Ok(0) => {
                return Err(SinkError::ShortWrite {
                    written,
                    intended: bytes.len(),
                })
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    writer.flush()?;
    Ok(written)
}
