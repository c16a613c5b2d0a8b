use std::collections::HashSet;

use image::{GenericImageView, ImageFormat, Rgb, RgbImage};

use edgeset::dataset::EdgesDataset;
use edgeset::dataset::transforms::{Geometric, PreTransform};
use edgeset::export::{ExportOptions, export_pairs, tensor_to_image};

fn dataset_dir() -> tempfile::TempDir {
    let temp = tempfile::tempdir().unwrap();
    for name in ["0001", "0002", "0003"] {
        RgbImage::from_fn(40, 40, |x, _| if x < 20 { Rgb([0, 0, 0]) } else { Rgb([250, 250, 250]) })
            .save_with_format(temp.path().join(format!("{name}.png")), ImageFormat::Png)
            .unwrap();
    }
    temp
}

#[test]
fn exports_selected_stems_with_inputs() {
    let data = dataset_dir();
    let out = tempfile::tempdir().unwrap();
    let dataset = EdgesDataset::with_defaults(
        data.path(),
        PreTransform::new(vec![Geometric::CenterCrop {
            width: 32,
            height: 32,
        }]),
    )
    .unwrap();

    let options = ExportOptions {
        unnorm: true,
        with_inputs: true,
        ids: Some(HashSet::from(["0002".to_string()])),
    };
    let summary = export_pairs(&dataset, out.path(), &options).unwrap();
    assert_eq!(summary.written, 1);
    assert_eq!(summary.filtered, 2);

    let target = image::open(out.path().join("0002.png")).unwrap();
    assert_eq!(target.dimensions(), (32, 32));
    assert_eq!(target.to_rgb8().get_pixel(0, 0), &Rgb([0, 0, 0]));
    let edges = image::open(out.path().join("0002_edges.png")).unwrap().to_luma8();
    assert_eq!(edges.get_pixel(0, 0)[0], 255);
    assert!(!out.path().join("0001.png").exists());
}

#[test]
fn unnorm_maps_symmetric_range_to_full_scale() {
    let tensor = ndarray::Array3::from_shape_vec((1, 1, 3), vec![-1.0, 0.0, 1.0]).unwrap();
    let image = tensor_to_image(&tensor, true).unwrap().to_luma8();
    assert_eq!(image.get_pixel(0, 0)[0], 0);
    assert_eq!(image.get_pixel(1, 0)[0], 128);
    assert_eq!(image.get_pixel(2, 0)[0], 255);

    let clipped = tensor_to_image(&tensor, false).unwrap().to_luma8();
    assert_eq!(clipped.get_pixel(0, 0)[0], 0);
    assert_eq!(clipped.get_pixel(1, 0)[0], 0);
}
