//! End-to-end runs on a tiny synthetic scene.

use std::path::{Path, PathBuf};

use adv_io::{save_png, FloatImage, IMAGENET_CLASSES};
use burn::backend::NdArray;
use burn::config::Config;
use burn::module::Module;
use burn::record::CompactRecorder;

use neural_adv::config::RunOptions;
use neural_adv::surrogate::ConvBackboneConfig;
use neural_adv::{pipeline, NeuralAdvError, Options};

type RecordBackend = NdArray;

struct Scene {
    _temp: tempfile::TempDir,
    data: PathBuf,
    workspace: PathBuf,
    labels: PathBuf,
    weights: PathBuf,
}

fn write_split(root: &Path, split: &str, views: usize) {
    let frames: Vec<serde_json::Value> = (0..views)
        .map(|i| {
            let angle = i as f32 * std::f32::consts::FRAC_PI_2;
            let (s, c) = angle.sin_cos();
            // Camera on a circle of radius 4, looking at the origin (OpenGL convention)
            serde_json::json!({
                "file_path": format!("./{}/r_{}", split, i),
                "transform_matrix": [
                    [c, 0.0, s, 4.0 * s],
                    [s, 0.0, -c, -4.0 * c],
                    [0.0, 1.0, 0.0, 0.0],
                    [0.0, 0.0, 0.0, 1.0],
                ],
            })
        })
        .collect();
    let manifest = serde_json::json!({ "camera_angle_x": 0.7, "frames": frames });
    std::fs::write(
        root.join(format!("transforms_{}.json", split)),
        serde_json::to_string_pretty(&manifest).unwrap(),
    )
    .unwrap();

    for i in 0..views {
        let mut img = FloatImage::filled(16, 16, 4, 0.0);
        for (p, px) in img.data.chunks_exact_mut(4).enumerate() {
            let (x, y) = (p % 16, p / 16);
            let inside = (4..12).contains(&x) && (4..12).contains(&y);
            px[0] = 0.8;
            px[1] = 0.2 + 0.1 * i as f32;
            px[2] = 0.3;
            px[3] = if inside { 1.0 } else { 0.0 };
        }
        save_png(root.join(format!("{}/r_{}.png", split, i)), &img).unwrap();
    }
}

fn scene() -> Scene {
    let temp = tempfile::tempdir().unwrap();
    let data = temp.path().join("scene");
    for split in ["train", "val", "test"] {
        std::fs::create_dir_all(data.join(split)).unwrap();
    }
    write_split(&data, "train", 2);
    write_split(&data, "val", 1);
    write_split(&data, "test", 1);

    let labels = temp.path().join("labels.json");
    let names: Vec<String> = (0..IMAGENET_CLASSES).map(|i| format!("class {}", i)).collect();
    std::fs::write(&labels, serde_json::to_string(&names).unwrap()).unwrap();

    let weights = temp.path().join("pretrained");
    std::fs::create_dir_all(&weights).unwrap();
    let device = Default::default();
    ConvBackboneConfig::new(IMAGENET_CLASSES)
        .init_classifier::<RecordBackend>(&device)
        .save_file(weights.join("resnet101"), &CompactRecorder::new())
        .unwrap();

    Scene {
        data,
        workspace: temp.path().join("workspace"),
        labels,
        weights,
        _temp: temp,
    }
}

fn options(scene: &Scene) -> Options {
    let mut options = Options::new(
        RunOptions::new(scene.data.display().to_string())
            .with_workspace(scene.workspace.display().to_string()),
    );
    options.attack.target_label = "7".to_string();
    options.attack.labels = scene.labels.display().to_string();
    options.attack.surrogate_dir = scene.weights.display().to_string();
    options.attack.adv_reso = 8;
    options.training.iters = 2;
    options.training.num_rays = 16;
    options.training.max_steps = 8;
    options.training.grid_size = 4;
    options.training.update_extra_interval = 1;
    options.mesh.mcubes_reso = 8;
    options.dataset.bound = 1.0;
    options
}

#[test]
fn test_stage0_run_writes_all_outputs() {
    let scene = scene();
    pipeline::run(options(&scene)).unwrap();

    let ws = &scene.workspace;
    assert!(ws.join("options.json").is_file());
    assert!(ws.join("checkpoints/stage0").is_dir());
    assert!(ws.join("validation").is_dir());
    assert!(ws.join("results/nerf_adv_stage0_0000_rgb.png").is_file());
    assert!(ws.join("mesh/mesh.obj").is_file());

    let saved = Options::load(ws.join("options.json")).unwrap();
    assert!(saved.training.cuda_ray);
    assert_eq!(saved.attack.target_label, "7");
}

#[test]
fn test_test_mode_resumes_without_training() {
    let scene = scene();
    pipeline::run(options(&scene)).unwrap();
    std::fs::remove_dir_all(scene.workspace.join("results")).unwrap();

    let mut test_only = options(&scene);
    test_only.run.test = true;
    test_only.run.test_no_mesh = true;
    pipeline::run(test_only).unwrap();

    assert!(scene.workspace.join("results/nerf_adv_stage0_0000_rgb.png").is_file());
}

#[test]
fn test_bad_target_label_exits_with_one() {
    let scene = scene();
    let mut opts = options(&scene);
    opts.attack.target_label = "1000".to_string();
    let err = pipeline::run(opts).unwrap_err();
    assert!(matches!(err, NeuralAdvError::InvalidTargetLabel { .. }));
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn test_bad_target_label_is_rejected_before_any_io() {
    let scene = scene();
    let mut opts = options(&scene);
    opts.attack.target_label = "1000".to_string();
    opts.attack.labels = scene.workspace.join("missing.json").display().to_string();
    opts.run.path = scene.workspace.join("nowhere").display().to_string();
    let err = pipeline::run(opts).unwrap_err();
    assert!(matches!(err, NeuralAdvError::InvalidTargetLabel { .. }));
    assert_eq!(err.exit_code(), 1);
    assert!(!scene.workspace.join("options.json").exists());
}

#[test]
fn test_unknown_surrogate_is_rejected() {
    let scene = scene();
    let mut opts = options(&scene);
    opts.attack.surrogate_model = "vgg".to_string();
    let err = pipeline::run(opts).unwrap_err();
    assert!(matches!(err, NeuralAdvError::UnsupportedSurrogate { .. }));
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn test_missing_resources_exit_with_three() {
    let scene = scene();

    let mut no_labels = options(&scene);
    no_labels.attack.labels = scene.workspace.join("missing.json").display().to_string();
    let err = pipeline::run(no_labels).unwrap_err();
    assert_eq!(err.exit_code(), 3);

    let mut no_weights = options(&scene);
    no_weights.attack.surrogate_model = "densenet".to_string();
    let err = pipeline::run(no_weights).unwrap_err();
    assert!(matches!(err, NeuralAdvError::ResourceLoad { .. }));
    assert_eq!(err.exit_code(), 3);
}

#[test]
fn test_empty_dataset_is_reported() {
    let scene = scene();
    let mut opts = options(&scene);
    opts.run.path = scene.workspace.join("nowhere").display().to_string();
    assert!(pipeline::run(opts).is_err());
}
