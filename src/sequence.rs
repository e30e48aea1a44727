//! Time-indexed series of ultrasound frames and probe poses.
//!
//! Both series are keyed by the frame index string taken from the file name
//! (`Image_0050.png` -> `"0050"`). Integer keys come first in numeric order,
//! the remaining keys follow in lexical order.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use nalgebra::Matrix4;

use crate::convention;
use crate::error::{ResliceError, Result};
use crate::slicer_transform::read_slicer_transform;

/// Read access to a keyed series.
pub trait Series<V> {
    /// All keys in ascending order.
    fn keys(&self) -> Vec<String>;

    fn get(&self, key: &str) -> Option<&V>;

    /// Error recorded while loading the entry for `key`, if it failed.
    fn failure(&self, _key: &str) -> Option<ResliceError> {
        None
    }
}

/// One tracked ultrasound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UltrasoundFrame {
    /// Name used for output files (the source file stem).
    pub name: String,
    /// Backing file, if the frame was loaded from disk.
    pub path: Option<PathBuf>,
}

impl UltrasoundFrame {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
        }
    }
}

/// Ascending key order: integers by value, then every other key lexically.
pub fn compare_keys(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Load error kept for a key so the step can report it later.
#[derive(Debug, Clone, PartialEq)]
enum EntryFailure {
    NonInvertible,
    Malformed { path: PathBuf, reason: String },
}

impl EntryFailure {
    fn new(path: &Path, error: ResliceError) -> Self {
        match error {
            ResliceError::NonInvertibleTransform => Self::NonInvertible,
            ResliceError::MalformedTransformFile { path, reason } => Self::Malformed { path, reason },
            other => Self::Malformed {
                path: path.to_path_buf(),
                reason: other.to_string(),
            },
        }
    }

    fn to_error(&self) -> ResliceError {
        match self {
            Self::NonInvertible => ResliceError::NonInvertibleTransform,
            Self::Malformed { path, reason } => ResliceError::MalformedTransformFile {
                path: path.clone(),
                reason: reason.clone(),
            },
        }
    }
}

/// In-memory series backed by an ordered map.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceSeries<V> {
    items: BTreeMap<String, V>,
    failures: BTreeMap<String, EntryFailure>,
}

impl<V> Default for SequenceSeries<V> {
    fn default() -> Self {
        Self {
            items: BTreeMap::new(),
            failures: BTreeMap::new(),
        }
    }
}

impl<V> SequenceSeries<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the value at `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<V> {
        let key = key.into();
        self.failures.remove(&key);
        self.items.insert(key, value)
    }

    /// Mark `key` as present but unusable: the entry read from `path` failed
    /// with `error`.
    pub fn insert_failure(&mut self, key: impl Into<String>, path: &Path, error: ResliceError) {
        let key = key.into();
        self.items.remove(&key);
        self.failures.insert(key, EntryFailure::new(path, error));
    }

    /// Number of keys whose entry failed to load.
    pub fn failed_len(&self) -> usize {
        self.failures.len()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for SequenceSeries<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            failures: BTreeMap::new(),
        }
    }
}

impl<V> Series<V> for SequenceSeries<V> {
    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .items
            .keys()
            .chain(self.failures.keys())
            .cloned()
            .collect();
        keys.sort_by(|a, b| compare_keys(a, b));
        keys
    }

    fn get(&self, key: &str) -> Option<&V> {
        self.items.get(key)
    }

    fn failure(&self, key: &str) -> Option<ResliceError> {
        self.failures.get(key).map(EntryFailure::to_error)
    }
}

/// Frame index from a file stem: the second `_`-separated token.
pub fn index_from_stem(stem: &str) -> Option<&str> {
    stem.split('_').nth(1).filter(|index| !index.is_empty())
}

fn indexed_files(dir: &Path) -> Result<Vec<(String, String, PathBuf)>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| ResliceError::io(dir, e))? {
        let path = entry.map_err(|e| ResliceError::io(dir, e))?.path();
        if !path.is_file() {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            warn!("skipping {}: file name is not valid UTF-8", path.display());
            continue;
        };
        match index_from_stem(stem) {
            Some(index) => files.push((index.to_string(), stem.to_string(), path.clone())),
            None => warn!("skipping {}: no frame index in file name", path.display()),
        }
    }
    Ok(files)
}

/// Build a frame series from the image files in `dir`.
///
/// Only file names are inspected here; frames are probed when processed.
pub fn load_frame_series(dir: impl AsRef<Path>) -> Result<SequenceSeries<UltrasoundFrame>> {
    let dir = dir.as_ref();
    let series: SequenceSeries<UltrasoundFrame> = indexed_files(dir)?
        .into_iter()
        .map(|(index, name, path)| {
            (
                index,
                UltrasoundFrame {
                    name,
                    path: Some(path),
                },
            )
        })
        .collect();
    info!("{} frames indexed from {}", series.len(), dir.display());
    Ok(series)
}

/// Build a pose series (RAS) from the transform files in `dir`.
///
/// A file that cannot be read or inverted is kept as a failed entry, so only
/// its own step fails.
pub fn load_transform_series(dir: impl AsRef<Path>) -> Result<SequenceSeries<Matrix4<f64>>> {
    let dir = dir.as_ref();
    let mut series = SequenceSeries::new();
    for (index, _, path) in indexed_files(dir)? {
        match read_slicer_transform(&path) {
            Ok(lps) => {
                series.insert(index, convention::convert(&lps));
            }
            Err(error) => {
                warn!("transform {index} is unusable: {error}");
                series.insert_failure(index, &path, error);
            }
        }
    }
    info!(
        "{} transforms loaded from {} ({} unusable)",
        series.len(),
        dir.display(),
        series.failed_len()
    );
    Ok(series)
}
