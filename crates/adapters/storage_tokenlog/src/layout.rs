//! On-disk layout of history shards.
//!
//! ```text
//! <root>/History/<component>/<status>/<yyyy>/<mm>/<dd>
//! ```
//!
//! Identifiers are path-segment encoded: bytes outside `[A-Za-z0-9._-]`,
//! `%` itself and a leading `.` become `%XX`, so every identifier maps to
//! exactly one directory name and never escapes its parent.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use hubhist_domain::day_path::DayPath;
use hubhist_domain::interval::SeriesFilter;
use hubhist_domain::observation::SeriesKey;

/// Name of the directory holding every series below the storage root.
pub const HISTORY_DIR: &str = "History";

/// Encode an identifier as a single directory name.
#[must_use]
pub fn encode_segment(uid: &str) -> String {
    let mut out = String::with_capacity(uid.len());
    for (index, byte) in uid.bytes().enumerate() {
        let plain = byte.is_ascii_alphanumeric()
            || matches!(byte, b'_' | b'-')
            || (byte == b'.' && index > 0);
        if plain {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "%{byte:02X}");
        }
    }
    out
}

/// Reverse of [`encode_segment`]; `None` for names it cannot produce.
#[must_use]
pub fn decode_segment(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'%' {
            let hex = name.get(index + 1..index + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            index += 3;
        } else {
            out.push(bytes[index]);
            index += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// One shard file of a series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shard {
    pub day: DayPath,
    pub path: PathBuf,
}

/// One series directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesDir {
    pub series: SeriesKey,
    pub path: PathBuf,
}

/// Resolves series and days to paths below the storage root.
#[derive(Debug, Clone)]
pub struct Layout {
    history_dir: PathBuf,
}

impl Layout {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            history_dir: root.as_ref().join(HISTORY_DIR),
        }
    }

    #[must_use]
    pub fn history_dir(&self) -> &Path {
        &self.history_dir
    }

    #[must_use]
    pub fn component_dir(&self, component_uid: &str) -> PathBuf {
        self.history_dir.join(encode_segment(component_uid))
    }

    #[must_use]
    pub fn series_dir(&self, series: &SeriesKey) -> PathBuf {
        self.component_dir(&series.component_uid)
            .join(encode_segment(&series.status_uid))
    }

    #[must_use]
    pub fn shard_path(&self, series: &SeriesKey, day: DayPath) -> PathBuf {
        let [year, month, dd] = day.segments();
        self.series_dir(series).join(year).join(month).join(dd)
    }

    /// Shards of a series directory in ascending day order. Entries that do
    /// not look like `yyyy/mm/dd` are ignored.
    ///
    /// # Errors
    ///
    /// Returns I/O errors other than a missing directory.
    pub fn shards(&self, series_dir: &Path) -> io::Result<Vec<Shard>> {
        let mut shards = Vec::new();
        for year in subdirectories(series_dir)? {
            for month in subdirectories(&year)? {
                for entry in read_dir_or_empty(&month)? {
                    let entry = entry?;
                    if !entry.file_type()?.is_file() {
                        continue;
                    }
                    let day = DayPath::parse(
                        &file_name(&year),
                        &file_name(&month),
                        &entry.file_name().to_string_lossy(),
                    );
                    if let Some(day) = day {
                        shards.push(Shard {
                            day,
                            path: entry.path(),
                        });
                    }
                }
            }
        }
        shards.sort_by_key(|shard| shard.day);
        Ok(shards)
    }

    /// Existing series directories selected by the filter's identifiers.
    ///
    /// # Errors
    ///
    /// Returns I/O errors other than a missing directory.
    pub fn series(&self, filter: &SeriesFilter) -> io::Result<Vec<SeriesDir>> {
        let components = match &filter.component_uid {
            Some(uid) => vec![(uid.clone(), self.component_dir(uid))],
            None => decoded_subdirectories(&self.history_dir)?,
        };

        let mut found = Vec::new();
        for (component_uid, component_dir) in components {
            let statuses = match &filter.status_uid {
                Some(uid) => vec![(uid.clone(), component_dir.join(encode_segment(uid)))],
                None => decoded_subdirectories(&component_dir)?,
            };
            for (status_uid, path) in statuses {
                if path.is_dir() {
                    found.push(SeriesDir {
                        series: SeriesKey {
                            component_uid: component_uid.clone(),
                            status_uid,
                        },
                        path,
                    });
                }
            }
        }
        found.sort_by(|a, b| a.series.cmp(&b.series));
        Ok(found)
    }

    /// Remove empty directories below `series_dir`, then `series_dir` itself
    /// once empty. Component directories are shared with other series and
    /// stay in place.
    ///
    /// # Errors
    ///
    /// Returns I/O errors other than a missing directory.
    pub fn prune(&self, series_dir: &Path) -> io::Result<()> {
        if !series_dir.starts_with(&self.history_dir) || series_dir == self.history_dir {
            return Ok(());
        }
        prune_below(series_dir)?;
        if is_empty_dir(series_dir)? {
            remove_dir_if_present(series_dir)?;
            tracing::debug!(path = %series_dir.display(), "pruned empty history directory");
        }
        Ok(())
    }
}

fn read_dir_or_empty(dir: &Path) -> io::Result<Vec<io::Result<fs::DirEntry>>> {
    match fs::read_dir(dir) {
        Ok(entries) => Ok(entries.collect()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(err) => Err(err),
    }
}

fn subdirectories(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in read_dir_or_empty(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    Ok(dirs)
}

fn decoded_subdirectories(dir: &Path) -> io::Result<Vec<(String, PathBuf)>> {
    let mut decoded = Vec::new();
    for path in subdirectories(dir)? {
        let name = file_name(&path);
        match decode_segment(&name) {
            Some(uid) => decoded.push((uid, path)),
            None => tracing::warn!(path = %path.display(), "ignoring undecodable history directory"),
        }
    }
    Ok(decoded)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn is_empty_dir(dir: &Path) -> io::Result<bool> {
    match fs::read_dir(dir) {
        Ok(mut entries) => Ok(entries.next().is_none()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

fn prune_below(dir: &Path) -> io::Result<()> {
    for child in subdirectories(dir)? {
        prune_below(&child)?;
        if is_empty_dir(&child)? {
            remove_dir_if_present(&child)?;
        }
    }
    Ok(())
}

fn remove_dir_if_present(dir: &Path) -> io::Result<()> {
    match fs::remove_dir(dir) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
