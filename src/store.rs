// src/store.rs
//! Append-only CSV bet store.
//!
//! Rows are `[agency, first_name, last_name, document, birthdate, number]`
//! with ISO dates, one bet per line. The append handle lives behind a mutex
//! held for the whole batch, so concurrent appends never interleave and a
//! full scan never observes a partially written batch.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::bet::Bet;

pub struct Store {
    path: PathBuf,
    appender: Mutex<File>,
}

impl Store {
    /// Open (creating if needed) the store file in append mode.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let appender = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("open bet store {path:?}"))?;
        Ok(Self {
            path,
            appender: Mutex::new(appender),
        })
    }

    /// Append a batch of bets as CSV rows in one locked write.
    pub async fn append(&self, bets: &[Bet]) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        for bet in bets {
            wtr.serialize(bet).context("serialize bet row")?;
        }
        let rows = wtr.into_inner().context("flush bet rows")?;

        let mut file = self.appender.lock().await;
        file.write_all(&rows)
            .await
            .with_context(|| format!("append to bet store {:?}", self.path))?;
        file.flush().await.context("flush bet store")?;
        Ok(())
    }

    /// Load every stored bet in file order.
    ///
    /// Takes the append lock so a scan can never race a half-written batch;
    /// the orchestrator additionally only scans after all appends are done.
    pub async fn load_all(&self) -> Result<Vec<Bet>> {
        let _guard = self.appender.lock().await;
        let raw = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("read bet store {:?}", self.path))?;

        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(raw.as_slice());
        let mut bets = Vec::new();
        for row in rdr.deserialize::<Bet>() {
            bets.push(row.context("parse bet row")?);
        }
        Ok(bets)
    }
}
