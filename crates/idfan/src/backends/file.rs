//! 📂 Previously, on "Things That Could Go Wrong With A File"...
//!
//! The database export landed on disk at 2am: one id per line, a few blank
//! lines for flavor, a comment someone left for future them. Simple, they said.
//! What could go wrong?
//!
//! Line 48,213 said `forty-two`. 💀
//!
//! This module reads newline-delimited ids from a file, asynchronously, one at a
//! time, so the producer never holds more than one line in its hands. Blank lines
//! and `#` comments are skipped. Anything else that is not an integer is a source
//! failure, reported with its line number so you can go find whoever typed it. 🦆

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::{
    fs::File,
    io::{self, AsyncBufReadExt},
};
use tracing::trace;

use crate::backends::IdSource;
use crate::common::ItemId;

/// 📂 `[source_config.File]` — where the ids live on disk.
#[derive(Debug, Deserialize, Clone)]
pub struct FileSourceConfig {
    pub file_name: String,
}

/// 📂 FileSource — reads a file line by line and hands out one id per call.
///
/// 🧵 Async, non-blocking. The BufReader wraps a tokio `File`.
pub struct FileSource {
    buf_reader: io::BufReader<File>,
    source_config: FileSourceConfig,
    line: String,
    line_number: u64,
}

impl std::fmt::Debug for FileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSource")
            .field("source_config", &self.source_config)
            .field("line_number", &self.line_number)
            .finish()
    }
}

impl FileSource {
    /// 🚀 Opens the id file. If it doesn't exist, anyhow will say so with *theatrical flair*.
    pub async fn new(source_config: FileSourceConfig) -> Result<Self> {
        let file_handle = File::open(&source_config.file_name)
            .await
            .with_context(|| {
                format!(
                    "💀 The door to '{}' would not budge. We knocked. We checked if it existed \
                    (it might not). We checked permissions (they might be wrong). \
                    The id file remains unopened. We remain outside.",
                    source_config.file_name
                )
            })?;

        Ok(Self {
            buf_reader: io::BufReader::new(file_handle),
            source_config,
            line: String::new(),
            line_number: 0,
        })
    }
}

#[async_trait]
impl IdSource for FileSource {
    async fn next_id(&mut self) -> Result<Option<ItemId>> {
        loop {
            self.line.clear();
            let bytes_read = self
                .buf_reader
                .read_line(&mut self.line)
                .await
                .with_context(|| {
                    format!(
                        "💀 Reading '{}' fell over after line {}. The disk has feelings too.",
                        self.source_config.file_name, self.line_number
                    )
                })?;
            if bytes_read == 0 {
                trace!(file = %self.source_config.file_name, "🏁 id file exhausted");
                return Ok(None);
            }
            self.line_number += 1;

            let trimmed = self.line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let id = trimmed.parse::<ItemId>().with_context(|| {
                format!(
                    "💀 Line {} of '{}' reads '{}', which is many things, but not an id.",
                    self.line_number, self.source_config.file_name, trimmed
                )
            })?;
            return Ok(Some(id));
        }
    }
}
