//! Append-only query log. Entries are handed to a writer thread and never
//! read back.

use crate::error::Result;
use chrono::Utc;
use crossbeam::channel;
use serde_json::{json, Value};
use std::{
    fs::{self, OpenOptions},
    io::{LineWriter, Write},
    path::{Path, PathBuf},
    process,
    thread::{self, JoinHandle},
};

/// Writes one JSON line per answered query.
pub struct QueryLogger {
    path: PathBuf,
    sender: Option<channel::Sender<Value>>,
    writer: Option<JoinHandle<()>>,
}

impl QueryLogger {
    /// Open a fresh log file inside `dir`.
    pub fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!(
            "query-log-{}-{}.log",
            Utc::now().format("%Y%m%d-%H%M%S"),
            process::id()
        ));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let (sender, receiver) = channel::unbounded::<Value>();
        let log_path = path.clone();
        let writer = thread::spawn(move || {
            let mut out = LineWriter::new(file);
            for entry in receiver {
                if let Err(err) = writeln!(out, "{}", entry) {
                    log::warn!("Failed to write query log {:?}: {}", log_path, err);
                }
            }
        });
        log::info!("Logging queries to {:?}", path);
        Ok(QueryLogger {
            path,
            sender: Some(sender),
            writer: Some(writer),
        })
    }

    /// File the entries go to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queue an entry; never fails the caller.
    pub fn log(&self, text: &str, response: &Value, model: &str) {
        let entry = json!({
            "text": text,
            "response": response,
            "model": model,
            "time": Utc::now().to_rfc3339(),
        });
        let sent = match &self.sender {
            Some(sender) => sender.send(entry).is_ok(),
            None => false,
        };
        if !sent {
            log::warn!("Query log writer is gone, dropping entry");
        }
    }
}

impl Drop for QueryLogger {
    fn drop(&mut self) {
        // closing the channel ends the writer loop
        self.sender.take();
        if let Some(writer) = self.writer.take() {
            if writer.join().is_err() {
                log::warn!("Query log writer panicked");
            }
        }
    }
}
