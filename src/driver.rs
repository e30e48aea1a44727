//! Batch reslicing over a tracked ultrasound sequence.
//!
//! For each step key shared by the frame and pose series the driver writes
//! one colour image per slab offset, one metadata file and one resliced
//! volume. A failing step is recorded and the batch moves on.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use image::ImageFormat;
use log::{debug, info, warn};
use nalgebra::Matrix4;

use crate::color;
use crate::depth::{self, GeometryRecord};
use crate::enums::{Dimensionality, Interpolation};
use crate::error::{ResliceError, Result};
use crate::metaimage::write_metaimage;
use crate::resampler::{OutputGrid, resample};
use crate::reslice_axes;
use crate::sequence::{Series, UltrasoundFrame, compare_keys};
use crate::volume::{Scalar, Volume};

#[derive(Debug, Clone, PartialEq)]
pub struct DriverSettings {
    /// Scanner depth setting of the sequence.
    pub depth: f64,
    /// Slab half width: offsets `-slab_number..=slab_number` are resliced.
    pub slab_number: u32,
    pub interpolation: Interpolation,
    pub output_dir: PathBuf,
    pub write_metadata: bool,
    pub write_volume: bool,
    /// Frame pixel to millimetre calibration (LPS).
    pub pixel_to_mm: Option<Matrix4<f64>>,
}

impl DriverSettings {
    pub fn new(depth: f64, slab_number: u32, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            depth,
            slab_number,
            interpolation: Interpolation::Cubic,
            output_dir: output_dir.into(),
            write_metadata: true,
            write_volume: true,
            pixel_to_mm: None,
        }
    }
}

/// Progress of one step. A failure reports the last state reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Pending,
    AxesBuilt,
    Resampled,
    ColorMapped,
    Written,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    ColorImage { slab_offset: i32 },
    Metadata,
    Volume,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputArtifact {
    pub key: String,
    pub kind: ArtifactKind,
    pub path: PathBuf,
}

#[derive(Debug)]
pub struct StepFailure {
    pub key: String,
    pub state: StepState,
    pub error: ResliceError,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub artifacts: Vec<OutputArtifact>,
    pub failures: Vec<StepFailure>,
    /// Number of steps started.
    pub steps: usize,
    pub cancelled: bool,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

/// Shared flag checked between steps.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// `neg<k>` for negative offsets, `pos<k>` otherwise.
pub fn slab_suffix(offset: i32) -> String {
    if offset < 0 {
        format!("neg{}", offset.unsigned_abs())
    } else {
        format!("pos{offset}")
    }
}

pub fn color_image_name(frame_name: &str, offset: i32) -> String {
    format!("Resliced{frame_name}{}.png", slab_suffix(offset))
}

pub fn metadata_name(frame_name: &str) -> String {
    format!("Meta{frame_name}.txt")
}

pub fn volume_name(frame_name: &str) -> String {
    format!("ReslicedVol{frame_name}.mha")
}

/// Metadata file contents for a resliced plane.
pub fn format_metadata(grid: &OutputGrid) -> String {
    let [fx, fy, fz] = grid.field_of_view();
    let [dx, dy, dz] = grid.dims;
    format!("FOV:  {fx}  {fy}  {fz}\nDims:  {dx}  {dy}  {dz}\n")
}

type StepResult<T> = std::result::Result<T, (StepState, ResliceError)>;

trait AtState<T> {
    fn at(self, state: StepState) -> StepResult<T>;
}

impl<T> AtState<T> for Result<T> {
    fn at(self, state: StepState) -> StepResult<T> {
        self.map_err(|e| (state, e))
    }
}

pub struct SliceSequenceDriver<'a, T> {
    volume: &'a Volume<T>,
    settings: DriverSettings,
}

impl<'a, T: Scalar> SliceSequenceDriver<'a, T> {
    pub fn new(volume: &'a Volume<T>, settings: DriverSettings) -> Self {
        Self { volume, settings }
    }

    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    /// Reslice every step of the two series.
    ///
    /// Only a missing or uncreatable output directory fails the whole run;
    /// step errors are collected in the report.
    pub fn run(
        &self,
        frames: &impl Series<UltrasoundFrame>,
        poses: &impl Series<Matrix4<f64>>,
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        let output_dir = &self.settings.output_dir;
        fs::create_dir_all(output_dir).map_err(|e| ResliceError::io(output_dir, e))?;

        let mut keys: Vec<String> = frames
            .keys()
            .into_iter()
            .chain(poses.keys())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        keys.sort_by(|a, b| compare_keys(a, b));
        info!(
            "reslicing {} steps (depth {}, slab {}) into {}",
            keys.len(),
            self.settings.depth,
            self.settings.slab_number,
            output_dir.display()
        );

        let mut report = RunReport::default();
        let mut used_names = HashSet::new();
        for key in keys {
            if cancel.is_cancelled() {
                warn!("run cancelled before step {key}");
                report.cancelled = true;
                break;
            }
            report.steps += 1;
            let started = Instant::now();
            let before = report.artifacts.len();
            match self.process_step(&key, frames, poses, &mut used_names, &mut report.artifacts) {
                Ok(()) => info!(
                    "step {key}: {} artifacts in {:.2?}",
                    report.artifacts.len() - before,
                    started.elapsed()
                ),
                Err((state, error)) => {
                    warn!("step {key} failed after {state:?}: {error}");
                    report.failures.push(StepFailure { key, state, error });
                }
            }
        }
        info!(
            "{} artifacts written, {} steps failed",
            report.artifacts.len(),
            report.failures.len()
        );
        Ok(report)
    }

    fn process_step(
        &self,
        key: &str,
        frames: &impl Series<UltrasoundFrame>,
        poses: &impl Series<Matrix4<f64>>,
        used_names: &mut HashSet<String>,
        artifacts: &mut Vec<OutputArtifact>,
    ) -> StepResult<()> {
        let state = StepState::Pending;
        if let Some(error) = frames.failure(key).or_else(|| poses.failure(key)) {
            return Err((state, error));
        }
        let missing = || (state, ResliceError::MissingSeriesEntry(key.to_string()));
        let frame = frames.get(key).ok_or_else(missing)?;
        let pose = poses.get(key).ok_or_else(missing)?;
        if !used_names.insert(frame.name.clone()) {
            return Err((state, ResliceError::DuplicateFrameName(frame.name.clone())));
        }

        let geometry = depth::lookup(self.settings.depth).at(state)?;
        Self::probe_frame(frame, &geometry).at(state)?;

        let center = self.volume.center();
        let spacing_z = self.volume.spacing()[2];
        let slab = reslice_axes::build_slab(pose, &center, spacing_z, self.settings.slab_number)
            .at(state)?;
        let primary_axes = reslice_axes::build(pose, &center, 0.0).at(state)?;

        let footprint = depth::footprint_center(&geometry, self.settings.pixel_to_mm.as_ref());
        let plane_grid = OutputGrid::footprint(&center, &geometry, &footprint);
        debug!("step {key}: plane grid {plane_grid:?}");

        for (offset, axes) in slab {
            self.write_plane(key, &frame.name, offset, &axes, &plane_grid, artifacts)?;
        }

        if self.settings.write_volume {
            let mut state = StepState::AxesBuilt;
            let grid = OutputGrid::covering(self.volume, &primary_axes, Dimensionality::ThreeD)
                .at(state)?;
            debug!("step {key}: volume grid {grid:?}");
            let resliced =
                resample(self.volume, &primary_axes, &grid, self.settings.interpolation)
                    .at(state)?;
            state = StepState::Resampled;
            let path = self.output_path(&volume_name(&frame.name));
            write_metaimage(&resliced, &path).at(state)?;
            artifacts.push(OutputArtifact {
                key: key.to_string(),
                kind: ArtifactKind::Volume,
                path,
            });
        }
        Ok(())
    }

    /// Resample, colour-map and save one slab plane. Failures report the state
    /// reached for this offset.
    fn write_plane(
        &self,
        key: &str,
        frame_name: &str,
        offset: i32,
        axes: &Matrix4<f64>,
        grid: &OutputGrid,
        artifacts: &mut Vec<OutputArtifact>,
    ) -> StepResult<()> {
        let mut state = StepState::AxesBuilt;
        let slice = resample(self.volume, axes, grid, self.settings.interpolation).at(state)?;
        state = StepState::Resampled;
        let rgb = color::map_to_rgb(&slice).at(state)?;
        state = StepState::ColorMapped;

        let path = self.output_path(&color_image_name(frame_name, offset));
        rgb.save_with_format(&path, ImageFormat::Png)
            .map_err(|source| ResliceError::Image {
                path: path.clone(),
                source,
            })
            .at(state)?;
        debug!("wrote {}", path.display());
        artifacts.push(OutputArtifact {
            key: key.to_string(),
            kind: ArtifactKind::ColorImage {
                slab_offset: offset,
            },
            path,
        });

        if offset == 0 && self.settings.write_metadata {
            let path = self.output_path(&metadata_name(frame_name));
            fs::write(&path, format_metadata(grid))
                .map_err(|e| ResliceError::io(&path, e))
                .at(state)?;
            artifacts.push(OutputArtifact {
                key: key.to_string(),
                kind: ArtifactKind::Metadata,
                path,
            });
        }
        Ok(())
    }

    /// Check that a file-backed frame can be decoded and covers the ROI.
    fn probe_frame(frame: &UltrasoundFrame, geometry: &GeometryRecord) -> Result<()> {
        let Some(path) = &frame.path else {
            return Ok(());
        };
        let (width, height) = image::image_dimensions(path).map_err(|source| ResliceError::Image {
            path: path.clone(),
            source,
        })?;
        if width <= geometry.roi.right || height <= geometry.roi.bottom {
            warn!(
                "frame {} is {width}x{height}, smaller than the depth ROI {:?}",
                frame.name, geometry.roi
            );
        }
        Ok(())
    }

    fn output_path(&self, file_name: &str) -> PathBuf {
        Path::new(&self.settings.output_dir).join(file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depth::DepthSetting;

    #[test]
    fn slab_suffixes_are_signed() {
        assert_eq!(slab_suffix(-2), "neg2");
        assert_eq!(slab_suffix(-1), "neg1");
        assert_eq!(slab_suffix(0), "pos0");
        assert_eq!(slab_suffix(3), "pos3");
    }

    #[test]
    fn output_names_follow_the_frame_name() {
        assert_eq!(color_image_name("Image_0050", -1), "ReslicedImage_0050neg1.png");
        assert_eq!(metadata_name("Image_0050"), "MetaImage_0050.txt");
        assert_eq!(volume_name("Image_0050"), "ReslicedVolImage_0050.mha");
    }

    #[test]
    fn metadata_lists_fov_and_dims() {
        let grid = OutputGrid {
            origin: [0.0; 3],
            spacing: [0.5, 0.25, 1.0],
            dims: [4, 8, 1],
        };
        assert_eq!(format_metadata(&grid), "FOV:  2  2  1\nDims:  4  8  1\n");

        let geometry = DepthSetting::D16.geometry();
        let center = nalgebra::Vector3::zeros();
        let grid = OutputGrid::footprint(&center, &geometry, &depth::footprint_center(&geometry, None));
        let text = format_metadata(&grid);
        assert!(text.ends_with("Dims:  752  560  1\n"));
    }

    #[test]
    fn failed_plane_reports_its_own_progress() {
        let out = tempfile::tempdir().unwrap();
        let data = ndarray::Array3::<u8>::zeros((4, 4, 4));
        let volume = Volume::new(data, [0.0; 3], [1.0; 3]).unwrap();
        let mut settings = DriverSettings::new(16.0, 1, out.path());
        settings.interpolation = Interpolation::Nearest;
        let driver = SliceSequenceDriver::new(&volume, settings);
        let grid = OutputGrid {
            origin: [0.0; 3],
            spacing: [1.0; 3],
            dims: [4, 4, 1],
        };

        let mut artifacts = Vec::new();
        driver
            .write_plane("0001", "Image_0001", -1, &Matrix4::identity(), &grid, &mut artifacts)
            .unwrap();
        assert_eq!(artifacts.len(), 1);

        let mut broken = Matrix4::identity();
        broken[(2, 3)] = f64::INFINITY;
        let (state, error) = driver
            .write_plane("0001", "Image_0001", 1, &broken, &grid, &mut artifacts)
            .unwrap_err();
        assert_eq!(state, StepState::AxesBuilt);
        assert!(matches!(error, ResliceError::InvalidAxes));
        assert_eq!(artifacts.len(), 1);
    }

    #[test]
    fn cancellation_is_shared_between_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
