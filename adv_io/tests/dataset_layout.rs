//! Reading a small Blender-layout dataset from disk end to end.

use adv_io::{load_image, save_png, FloatImage, Manifest, Split};

fn write_dataset(root: &std::path::Path) {
    let frames: Vec<serde_json::Value> = (0..3)
        .map(|i| {
            serde_json::json!({
                "file_path": format!("./train/r_{}", i),
                "transform_matrix": [[1,0,0,0],[0,1,0,0],[0,0,1,4],[0,0,0,1]],
            })
        })
        .collect();
    let manifest = serde_json::json!({ "camera_angle_x": 0.8, "frames": frames });
    std::fs::write(
        root.join("transforms_train.json"),
        serde_json::to_string_pretty(&manifest).unwrap(),
    )
    .unwrap();

    for i in 0..3 {
        let mut img = FloatImage::filled(8, 8, 4, 0.0);
        for px in img.data.chunks_exact_mut(4) {
            px[0] = i as f32 / 2.0;
            px[3] = 1.0;
        }
        save_png(root.join(format!("train/r_{}.png", i)), &img).unwrap();
    }
}

#[test]
fn manifest_frames_resolve_to_images() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());

    let manifest = Manifest::load_splits(dir.path(), &[Split::Train]).unwrap();
    assert_eq!(manifest.frames.len(), 3);

    for (i, frame) in manifest.frames.iter().enumerate() {
        let img = load_image(frame.image_path(dir.path()), 2).unwrap();
        assert_eq!((img.width, img.height), (4, 4));
        let expected = i as f32 / 2.0;
        assert!((img.pixel(1, 1)[0] - expected).abs() < 0.01);
    }
}

#[test]
fn missing_split_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());
    assert!(Manifest::load_splits(dir.path(), &[Split::Train, Split::Val]).is_err());
}
