use dncnn_trainer::constants::psnr::PSNR_CAP_DB;
use dncnn_trainer::noise::NoiseSynthesizer;
use dncnn_trainer::psnr::psnr;
use dncnn_trainer::training::epoch::residual_loss;
use dncnn_trainer::training::PlateauScheduler;
use ndarray::{Array3, Array4, Axis};
use proptest::prelude::*;
use proptest::test_runner::Config;

proptest! {
    #![proptest_config(Config::with_cases(64))]

    #[test]
    fn prop_loss_is_sum_over_batch_size(
        batch in 1usize..6,
        side in 1usize..5,
        offset in -2.0f32..2.0
    ) {
        let predicted = Array4::<f32>::from_elem((batch, 1, side, side), offset);
        let noise = Array4::<f32>::zeros((batch, 1, side, side));
        let expected = (offset as f64).powi(2) * (side * side) as f64;
        let loss = residual_loss(&predicted, &noise).unwrap();
        prop_assert!((loss - expected).abs() <= 1e-6 * expected.max(1.0));
    }

    #[test]
    fn prop_loss_ignores_duplicating_the_batch(
        values in prop::collection::vec(-1.0f32..1.0, 4)
    ) {
        let single = Array4::from_shape_vec((1, 1, 2, 2), values).unwrap();
        let doubled = ndarray::concatenate(Axis(0), &[single.view(), single.view()]).unwrap();
        let zeros1 = Array4::<f32>::zeros((1, 1, 2, 2));
        let zeros2 = Array4::<f32>::zeros((2, 1, 2, 2));
        let a = residual_loss(&single, &zeros1).unwrap();
        let b = residual_loss(&doubled, &zeros2).unwrap();
        prop_assert!((a - b).abs() < 1e-9);
    }

    #[test]
    fn prop_noise_keeps_shape(
        n in 1usize..4,
        c in 1usize..4,
        h in 1usize..9,
        w in 1usize..9,
        level in 0.0f64..75.0,
        seed in any::<u64>()
    ) {
        let mut noise = NoiseSynthesizer::new(level, Some(seed)).unwrap();
        let sample = noise.sample(ndarray::Dim([n, c, h, w]));
        prop_assert_eq!(sample.shape(), &[n, c, h, w]);
    }

    #[test]
    fn prop_psnr_is_capped_and_non_negative_in_range(
        values in prop::collection::vec(0.0f32..1.0, 16),
        others in prop::collection::vec(0.0f32..1.0, 16)
    ) {
        let a = Array3::from_shape_vec((1, 4, 4), values).unwrap();
        let b = Array3::from_shape_vec((1, 4, 4), others).unwrap();
        let value = psnr(a.view(), b.view()).unwrap();
        prop_assert!(value >= 0.0);
        prop_assert!(value <= PSNR_CAP_DB);
    }

    #[test]
    fn prop_scheduler_never_raises_the_rate(
        losses in prop::collection::vec(0.0f64..10.0, 1..30),
        patience in 0usize..5
    ) {
        let mut scheduler = PlateauScheduler::new(0.1, patience);
        let mut lr = 0.01;
        for loss in losses {
            if let Some(next) = scheduler.step(loss, lr) {
                prop_assert!(next < lr);
                lr = next;
            }
        }
    }
}
