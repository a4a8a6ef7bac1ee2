use dncnn_trainer::constants::psnr::PSNR_CAP_DB;
use dncnn_trainer::psnr::{batch_psnr, psnr};
use ndarray::{Array3, Array4};

#[test]
fn test_psnr_identical_images() {
    let image = Array3::<f32>::from_elem((1, 10, 10), 0.3);
    assert_eq!(psnr(image.view(), image.view()).unwrap(), PSNR_CAP_DB);
}

#[test]
fn test_psnr_opposite_images() {
    let zeros = Array3::<f32>::zeros((3, 4, 4));
    let ones = Array3::<f32>::ones((3, 4, 4));
    assert!(psnr(zeros.view(), ones.view()).unwrap().abs() < 1e-12);
}

#[test]
fn test_psnr_known_value() {
    // uniform error of 0.1 gives an mse of 0.01, i.e. 20 dB
    let reference = Array3::<f32>::zeros((1, 5, 5));
    let candidate = Array3::<f32>::from_elem((1, 5, 5), 0.1);
    let value = psnr(reference.view(), candidate.view()).unwrap();
    assert!((value - 20.0).abs() < 1e-4);
}

#[test]
fn test_psnr_different_sizes() {
    let a = Array3::<f32>::ones((1, 10, 10));
    let b = Array3::<f32>::ones((1, 8, 12));
    assert!(psnr(a.view(), b.view()).is_err());
}

#[test]
fn test_batch_psnr_averages_per_image() {
    let reference = Array4::<f32>::zeros((2, 1, 4, 4));
    let mut candidate = Array4::<f32>::zeros((2, 1, 4, 4));
    candidate.index_axis_mut(ndarray::Axis(0), 1).fill(1.0);
    // cap for the first image, 0 dB for the second
    let value = batch_psnr(reference.view(), candidate.view()).unwrap();
    assert!((value - PSNR_CAP_DB / 2.0).abs() < 1e-9);
}

#[test]
fn test_batch_psnr_rejects_mismatched_batches() {
    let a = Array4::<f32>::zeros((2, 1, 4, 4));
    let b = Array4::<f32>::zeros((3, 1, 4, 4));
    assert!(batch_psnr(a.view(), b.view()).is_err());
}
