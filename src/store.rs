use crate::report::Report;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("не удалось создать каталог отчётов {path}: {source}")]
    CreateDir {
        path: String,
        source: std::io::Error,
    },
    #[error("не удалось записать отчёт {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("не удалось сериализовать отчёт {path}: {source}")]
    Serialize {
        path: String,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    // Same-second runs share a file name; the later one wins.
    pub fn save(&self, report: &Report) -> Result<PathBuf, StoreError> {
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::CreateDir {
            path: self.dir.display().to_string(),
            source,
        })?;

        let path = self.dir.join(file_name(&report.timestamp));
        let path_display = path.display().to_string();
        let write_err = |source: std::io::Error| StoreError::Write {
            path: path_display.clone(),
            source,
        };

        let mut writer = BufWriter::new(File::create(&path).map_err(write_err)?);
        serde_json::to_writer_pretty(&mut writer, report).map_err(|source| {
            StoreError::Serialize {
                path: path_display.clone(),
                source,
            }
        })?;
        writer.write_all(b"\n").map_err(write_err)?;
        writer.flush().map_err(write_err)?;
        Ok(path)
    }
}

pub fn file_name(timestamp: &str) -> String {
    format!("health_report_{}.json", timestamp.replace(':', "-"))
}
