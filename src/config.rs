//! Run configuration loaded from TOML.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::depth::DepthSetting;
use crate::driver::DriverSettings;
use crate::enums::Interpolation;
use crate::error::{ResliceError, Result};
use crate::slicer_transform::read_slicer_transform;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    /// Reference CT/MRI volume (MetaImage).
    pub volume: PathBuf,
    /// Directory of ultrasound frames named `<prefix>_<index>.<ext>`.
    pub frames: PathBuf,
    /// Directory of probe pose transform files named like the frames.
    pub transforms: PathBuf,
    /// Optional frame pixel to millimetre transform file.
    #[serde(default)]
    pub pixel_to_mm: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResliceConfig {
    pub depth: f64,
    pub slab_number: u32,
    pub interpolation: Interpolation,
    pub write_metadata: bool,
    pub write_volume: bool,
}

impl Default for ResliceConfig {
    fn default() -> Self {
        Self {
            depth: 16.0,
            slab_number: 1,
            interpolation: Interpolation::Cubic,
            write_metadata: true,
            write_volume: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub reslice: ResliceConfig,
    pub output: OutputConfig,
}

impl RunConfig {
    pub fn from_toml_str(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Load a configuration file; relative paths are resolved against the
    /// file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| ResliceError::io(path, e))?;
        let mut config =
            Self::from_toml_str(&text).map_err(|source| ResliceError::InvalidConfig {
                path: path.to_path_buf(),
                source,
            })?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        config.validate()?;
        Ok(config)
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.input.volume);
        resolve(&mut self.input.frames);
        resolve(&mut self.input.transforms);
        if let Some(p) = self.input.pixel_to_mm.as_mut() {
            resolve(p);
        }
        resolve(&mut self.output.dir);
    }

    /// Reject settings that would fail every step.
    pub fn validate(&self) -> Result<()> {
        DepthSetting::try_from(self.reslice.depth)?;
        Ok(())
    }

    /// Driver settings, reading the pixel calibration file if one is set.
    pub fn driver_settings(&self) -> Result<DriverSettings> {
        let pixel_to_mm = self
            .input
            .pixel_to_mm
            .as_ref()
            .map(|path| read_slicer_transform(path))
            .transpose()?;
        Ok(DriverSettings {
            depth: self.reslice.depth,
            slab_number: self.reslice.slab_number,
            interpolation: self.reslice.interpolation,
            output_dir: self.output.dir.clone(),
            write_metadata: self.reslice.write_metadata,
            write_volume: self.reslice.write_volume,
            pixel_to_mm,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[input]
volume = "ct.mha"
frames = "frames"
transforms = "poses"

[reslice]
depth = 8.1
slab_number = 2
interpolation = "linear"
write_volume = false

[output]
dir = "out"
"#;

    #[test]
    fn parses_all_sections() {
        let config = RunConfig::from_toml_str(FULL).unwrap();
        assert_eq!(config.input.volume, PathBuf::from("ct.mha"));
        assert_eq!(config.input.pixel_to_mm, None);
        assert_eq!(config.reslice.depth, 8.1);
        assert_eq!(config.reslice.slab_number, 2);
        assert_eq!(config.reslice.interpolation, Interpolation::Linear);
        assert!(config.reslice.write_metadata);
        assert!(!config.reslice.write_volume);
        config.validate().unwrap();

        let settings = config.driver_settings().unwrap();
        assert_eq!(settings.output_dir, PathBuf::from("out"));
        assert_eq!(settings.slab_number, 2);
    }

    #[test]
    fn reslice_section_is_optional() {
        let config = RunConfig::from_toml_str(
            "[input]\nvolume = \"v.mha\"\nframes = \"f\"\ntransforms = \"t\"\n[output]\ndir = \"o\"\n",
        )
        .unwrap();
        assert_eq!(config.reslice, ResliceConfig::default());
    }

    #[test]
    fn unknown_depth_fails_validation() {
        let text = FULL.replace("depth = 8.1", "depth = 13.0");
        let config = RunConfig::from_toml_str(&text).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ResliceError::UnknownDepthSetting(_))
        ));
    }

    #[test]
    fn relative_paths_follow_the_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        fs::write(&path, FULL).unwrap();
        let config = RunConfig::load(&path).unwrap();
        assert_eq!(config.input.frames, dir.path().join("frames"));
        assert_eq!(config.output.dir, dir.path().join("out"));
    }
}
