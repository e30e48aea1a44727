//! # us-reslice
//!
//! Reslice a reference CT/MRI volume along the tracked poses of a freehand
//! ultrasound sweep.
//!
//! A sweep is two series keyed by frame index: the ultrasound frames and the
//! probe-to-world pose of each frame (RAS). For every index the volume is
//! resampled on the probe's image plane, plus a symmetric slab of parallel
//! planes offset along the probe normal, and on a full 3D grid in the probe
//! frame. The planes are written as grey-scale PNGs (each scaled to its own
//! value range) with a small metadata file, the 3D grid as a MetaImage.
//!
//!  - Poses are converted from RAS to LPS before use
//!  - Plane size and spacing follow the scanner depth calibration
//!  - Interpolation is cubic by default, samples outside the volume are 0
//!  - A failing frame is reported and the rest of the sweep still runs
//!
//! # Examples
//!
//! ## Reslicing a sweep loaded from disk
//!
//! ```no_run
//! # use us_reslice::{
//! #     CancellationToken, DriverSettings, DynVolume, SliceSequenceDriver,
//! #     load_frame_series, load_transform_series, read_metaimage,
//! # };
//! let DynVolume::I16(volume) = read_metaimage("ct.mha").expect("should have read the volume")
//! else {
//!     panic!("expected a 16 bit volume");
//! };
//! let frames = load_frame_series("frames").expect("should have indexed the frames");
//! let poses = load_transform_series("poses").expect("should have read the poses");
//!
//! let driver = SliceSequenceDriver::new(&volume, DriverSettings::new(16.0, 1, "resliced"));
//! let report = driver
//!     .run(&frames, &poses, &CancellationToken::new())
//!     .expect("should have created the output directory");
//! for failure in &report.failures {
//!     eprintln!("{}: {}", failure.key, failure.error);
//! }
//! ```

pub mod color;
pub mod config;
pub mod convention;
pub mod depth;
pub mod driver;
pub mod enums;
pub mod error;
mod interpolator;
pub mod metaimage;
pub mod resampler;
pub mod reslice_axes;
pub mod sequence;
pub mod slicer_transform;
pub mod volume;

pub use config::RunConfig;
pub use depth::{DepthSetting, GeometryRecord, Roi, lookup};
pub use driver::{
    ArtifactKind, CancellationToken, DriverSettings, OutputArtifact, RunReport,
    SliceSequenceDriver, StepFailure, StepState,
};
pub use enums::{Convention, Dimensionality, Interpolation};
pub use error::{ResliceError, Result};
pub use metaimage::{read_metaimage, write_metaimage};
pub use resampler::{OutputGrid, resample};
pub use sequence::{
    SequenceSeries, Series, UltrasoundFrame, load_frame_series, load_transform_series,
};
pub use slicer_transform::{read_slicer_transform, write_slicer_transform};
pub use volume::{DynVolume, Scalar, ScalarGrid, Volume};
