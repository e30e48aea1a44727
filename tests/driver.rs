use std::fs;

use approx::assert_relative_eq;
use image::Rgb;
use nalgebra::Matrix4;
use nalgebra::Vector3;
use ndarray::Array3;
use us_reslice::{
    ArtifactKind, CancellationToken, DriverSettings, DynVolume, Interpolation, ResliceError,
    SequenceSeries, SliceSequenceDriver, StepState, UltrasoundFrame, Volume, load_transform_series,
    read_metaimage, write_slicer_transform,
};

/// 16^3 ramp volume with 1mm spacing.
fn ramp_volume() -> Volume<u16> {
    let data = Array3::from_shape_fn((16, 16, 16), |(z, y, x)| (x + 2 * y + 4 * z) as u16);
    Volume::new(data, [0.0; 3], [1.0; 3]).unwrap()
}

fn frames(keys: &[&str]) -> SequenceSeries<UltrasoundFrame> {
    keys.iter()
        .map(|key| (*key, UltrasoundFrame::named(format!("Image_{key}"))))
        .collect()
}

fn poses(keys: &[&str]) -> SequenceSeries<Matrix4<f64>> {
    keys.iter().map(|key| (*key, Matrix4::identity())).collect()
}

fn settings(dir: &std::path::Path) -> DriverSettings {
    let mut settings = DriverSettings::new(16.0, 1, dir);
    settings.interpolation = Interpolation::Linear;
    settings
}

#[test]
fn two_steps_write_all_artifacts() {
    let out = tempfile::tempdir().unwrap();
    let volume = ramp_volume();
    let driver = SliceSequenceDriver::new(&volume, settings(out.path()));

    let report = driver
        .run(
            &frames(&["0001", "0002"]),
            &poses(&["0001", "0002"]),
            &CancellationToken::new(),
        )
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.steps, 2);
    assert_eq!(report.artifacts.len(), 10);
    for artifact in &report.artifacts {
        assert!(artifact.path.is_file(), "{} missing", artifact.path.display());
    }

    for name in [
        "ReslicedImage_0001neg1.png",
        "ReslicedImage_0001pos0.png",
        "ReslicedImage_0001pos1.png",
    ] {
        let (width, height) = image::image_dimensions(out.path().join(name)).unwrap();
        assert_eq!((width, height), (752, 560));
    }

    let meta = fs::read_to_string(out.path().join("MetaImage_0002.txt")).unwrap();
    assert!(meta.starts_with("FOV:  "));
    assert!(meta.ends_with("Dims:  752  560  1\n"));

    let header = fs::read(out.path().join("ReslicedVolImage_0001.mha")).unwrap();
    let header = String::from_utf8_lossy(&header[..64]);
    assert!(header.starts_with("ObjectType = Image\nNDims = 3\n"));
}

#[test]
fn artifacts_follow_ascending_key_order() {
    let out = tempfile::tempdir().unwrap();
    let volume = ramp_volume();
    let mut settings = settings(out.path());
    settings.slab_number = 0;
    settings.write_volume = false;
    let driver = SliceSequenceDriver::new(&volume, settings);

    let keys = ["10", "9", "0002"];
    let report = driver
        .run(&frames(&keys), &poses(&keys), &CancellationToken::new())
        .unwrap();

    let order: Vec<&str> = report
        .artifacts
        .iter()
        .filter(|a| matches!(a.kind, ArtifactKind::ColorImage { .. }))
        .map(|a| a.key.as_str())
        .collect();
    assert_eq!(order, vec!["0002", "9", "10"]);
}

#[test]
fn missing_transform_fails_only_that_step() {
    let out = tempfile::tempdir().unwrap();
    let volume = ramp_volume();
    let driver = SliceSequenceDriver::new(&volume, settings(out.path()));

    let report = driver
        .run(
            &frames(&["0001", "0002"]),
            &poses(&["0001"]),
            &CancellationToken::new(),
        )
        .unwrap();

    assert_eq!(report.steps, 2);
    assert_eq!(report.artifacts.len(), 5);
    assert!(report.artifacts.iter().all(|a| a.key == "0001"));
    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert_eq!(failure.key, "0002");
    assert_eq!(failure.state, StepState::Pending);
    assert!(matches!(&failure.error, ResliceError::MissingSeriesEntry(key) if key == "0002"));
}

#[test]
fn non_finite_pose_is_reported_and_the_batch_continues() {
    let out = tempfile::tempdir().unwrap();
    let volume = ramp_volume();
    let driver = SliceSequenceDriver::new(&volume, settings(out.path()));

    let mut poses = poses(&["0001", "0003"]);
    let mut broken = Matrix4::identity();
    broken[(0, 3)] = f64::NAN;
    poses.insert("0002", broken);

    let report = driver
        .run(
            &frames(&["0001", "0002", "0003"]),
            &poses,
            &CancellationToken::new(),
        )
        .unwrap();

    assert_eq!(report.artifacts.len(), 10);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].key, "0002");
    assert!(matches!(
        report.failures[0].error,
        ResliceError::NonInvertibleTransform
    ));
    assert!(!out.path().join("ReslicedImage_0002pos0.png").exists());
}

#[test]
fn unknown_depth_fails_every_step() {
    let out = tempfile::tempdir().unwrap();
    let volume = ramp_volume();
    let mut settings = settings(out.path());
    settings.depth = 13.0;
    let driver = SliceSequenceDriver::new(&volume, settings);

    let report = driver
        .run(&frames(&["0001"]), &poses(&["0001"]), &CancellationToken::new())
        .unwrap();

    assert!(report.artifacts.is_empty());
    assert!(matches!(
        report.failures[0].error,
        ResliceError::UnknownDepthSetting(d) if d == 13.0
    ));
}

#[test]
fn cancelled_run_stops_before_the_next_step() {
    let out = tempfile::tempdir().unwrap();
    let volume = ramp_volume();
    let driver = SliceSequenceDriver::new(&volume, settings(out.path()));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = driver
        .run(&frames(&["0001", "0002"]), &poses(&["0001", "0002"]), &cancel)
        .unwrap();

    assert!(report.cancelled);
    assert!(!report.is_success());
    assert_eq!(report.steps, 0);
    assert!(report.artifacts.is_empty());
}

#[test]
fn unusable_transform_file_fails_only_its_step() {
    let out = tempfile::tempdir().unwrap();
    let transforms = tempfile::tempdir().unwrap();
    write_slicer_transform(
        &Matrix4::identity(),
        transforms.path().join("Transform_0001.txt"),
    )
    .unwrap();
    fs::write(
        transforms.path().join("Transform_0002.txt"),
        "#Insight Transform File V1.0\n#Transform 0\nTransform: AffineTransform_double_3_3\n\
         Parameters: nan 0 0 0 1 0 0 0 1 0 0 0\nFixedParameters: 0 0 0\n",
    )
    .unwrap();

    let poses = load_transform_series(transforms.path()).unwrap();
    let volume = ramp_volume();
    let driver = SliceSequenceDriver::new(&volume, settings(out.path()));
    let report = driver
        .run(
            &frames(&["0001", "0002"]),
            &poses,
            &CancellationToken::new(),
        )
        .unwrap();

    assert_eq!(report.steps, 2);
    assert_eq!(report.artifacts.len(), 5);
    assert!(report.artifacts.iter().all(|a| a.key == "0001"));
    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert_eq!(failure.key, "0002");
    assert_eq!(failure.state, StepState::Pending);
    assert!(matches!(
        &failure.error,
        ResliceError::MalformedTransformFile { path, .. } if path.ends_with("Transform_0002.txt")
    ));
}

/// Image plane sampled through a translated pose.
///
/// Volume values are `10 x + 5 y + z` (voxel indices) with 16mm in-plane
/// spacing, so the 752x560 depth-16 plane fits inside it. The RAS pose
/// translation `(120, 100, 7)` is `(-120, -100, 7)` in LPS, which moves the
/// plane from the centre slice (z = 8) to the last slice (z = 15); `pos1` lies
/// beyond the volume and `neg1` one slice inside.
#[test]
fn translated_pose_samples_where_the_axes_point() {
    let out = tempfile::tempdir().unwrap();
    let data = Array3::from_shape_fn((16, 16, 16), |(z, y, x)| (10 * x + 5 * y + z) as u16);
    let volume = Volume::new(data, [0.0; 3], [16.0, 16.0, 1.0]).unwrap();
    let driver = SliceSequenceDriver::new(&volume, settings(out.path()));

    let pose = Matrix4::new_translation(&Vector3::new(120.0, 100.0, 7.0));
    let poses: SequenceSeries<Matrix4<f64>> = [("0001", pose)].into_iter().collect();
    let report = driver
        .run(&frames(&["0001"]), &poses, &CancellationToken::new())
        .unwrap();
    assert!(report.is_success());

    let read_png = |name: &str| image::open(out.path().join(name)).unwrap().to_rgb8();
    let neg = read_png("ReslicedImage_0001neg1.png");
    let primary = read_png("ReslicedImage_0001pos0.png");
    let pos = read_png("ReslicedImage_0001pos1.png");

    // inside the volume: the plane spans its own range, rising with x and y
    for plane in [&neg, &primary] {
        assert_eq!(plane.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(plane.get_pixel(751, 559), &Rgb([255, 255, 255]));
        let left = plane.get_pixel(0, 280)[0];
        let middle = plane.get_pixel(376, 280)[0];
        let right = plane.get_pixel(751, 280)[0];
        assert!(left < middle && middle < right);
        assert!(plane.get_pixel(0, 0)[0] < plane.get_pixel(0, 559)[0]);
        // the x ramp is steeper than the y ramp
        assert!(plane.get_pixel(751, 0)[0] > plane.get_pixel(0, 559)[0]);
    }
    // one slice past the end of the volume: background only
    assert!(pos.pixels().all(|p| *p == Rgb([0, 0, 0])));

    let DynVolume::U16(resliced) =
        read_metaimage(out.path().join("ReslicedVolImage_0001.mha")).unwrap()
    else {
        panic!("resliced volume should keep the input scalar type");
    };
    assert_eq!(resliced.dims_xyz(), [16, 16, 16]);
    assert_eq!(resliced.spacing(), [16.0, 16.0, 1.0]);
    let origin = resliced.origin();
    assert_relative_eq!(origin[0], 120.0, epsilon = 1e-9);
    assert_relative_eq!(origin[1], 100.0, epsilon = 1e-9);
    assert_relative_eq!(origin[2], -7.0, epsilon = 1e-9);
    // the covering grid moves with the pose, so a pure translation keeps every voxel
    for ((z, y, x), v) in resliced.data().indexed_iter() {
        assert_eq!(*v, volume.data()[[z, y, x]], "voxel ({x}, {y}, {z})");
    }
}
