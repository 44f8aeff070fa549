use super::{DatabaseError, Row, Schema};
use std::{
    fs::{self, OpenOptions},
    io::{self, BufRead, BufReader, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, info};

/// Append-only CSV file with a fixed header
///
/// The file is opened for every single row and closed right after, so an interrupted sweep
/// leaves every row written so far on disk.
#[derive(Debug, Clone)]
pub struct Dataset {
    path: PathBuf,
    schema: Schema,
}

impl Dataset {
    /// remove a stale file at `path` and start over with only the header
    pub fn create(path: impl Into<PathBuf>, schema: Schema) -> Result<Self, DatabaseError> {
        let path = path.into();
        let io_error = |source| DatabaseError::Io {
            path: path.clone(),
            source,
        };

        match fs::remove_file(&path) {
            Ok(()) => debug!("Removed stale dataset {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_error(e)),
        }

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(io_error)?;
        writeln!(file, "{}", schema.header()).map_err(io_error)?;

        info!("Created dataset {} ({})", path.display(), schema.header());

        Ok(Self { path, schema })
    }

    /// use an existing file, its header has to match `schema`
    pub fn open(path: impl Into<PathBuf>, schema: Schema) -> Result<Self, DatabaseError> {
        let path = path.into();
        let file = fs::File::open(&path).map_err(|source| DatabaseError::Io {
            path: path.clone(),
            source,
        })?;

        let mut header = String::new();
        BufReader::new(file)
            .read_line(&mut header)
            .map_err(|source| DatabaseError::Io {
                path: path.clone(),
                source,
            })?;

        let header = header.trim_end();
        if header != schema.header() {
            return Err(DatabaseError::Header {
                path,
                expected: schema.header(),
                found: header.to_string(),
            });
        }

        Ok(Self { path, schema })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// append one row, rejecting rows whose field count differs from the header
    pub fn append(&self, row: &Row) -> Result<(), DatabaseError> {
        if row.len() != self.schema.len() {
            return Err(DatabaseError::Arity {
                path: self.path.clone(),
                expected: self.schema.len(),
                found: row.len(),
            });
        }

        let io_error = |source| DatabaseError::Io {
            path: self.path.clone(),
            source,
        };

        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(io_error)?;
        writeln!(file, "{row}").map_err(io_error)?;

        Ok(())
    }

    /// number of data rows, the header is not counted
    pub fn rows(&self) -> Result<usize, DatabaseError> {
        let file = fs::File::open(&self.path).map_err(|source| DatabaseError::Io {
            path: self.path.clone(),
            source,
        })?;

        let mut lines: usize = 0;
        for line in BufReader::new(file).lines() {
            line.map_err(|source| DatabaseError::Io {
                path: self.path.clone(),
                source,
            })?;
            lines += 1;
        }

        Ok(lines.saturating_sub(1))
    }
}
