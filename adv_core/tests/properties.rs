//! Property tests for the scheduling and contraction math.

use adv_core::prelude::*;
use proptest::prelude::*;

proptest! {
    #[test]
    fn contraction_stays_inside_radius_two(
        x in -1e4f32..1e4,
        y in -1e4f32..1e4,
        z in -1e4f32..1e4,
    ) {
        let q = contract_linf(Point3::new(x, y, z));
        prop_assert!(q.max_abs() <= 2.0 + 1e-5);
    }

    #[test]
    fn contraction_is_identity_inside_unit_cube(
        x in -1.0f32..=1.0,
        y in -1.0f32..=1.0,
        z in -1.0f32..=1.0,
    ) {
        let p = Point3::new(x, y, z);
        prop_assert_eq!(contract_linf(p), p);
    }

    #[test]
    fn uncontract_inverts_contract(
        x in -50.0f32..50.0,
        y in -50.0f32..50.0,
        z in -50.0f32..50.0,
    ) {
        let p = Point3::new(x, y, z);
        let back = uncontract_linf(contract_linf(p));
        prop_assert!((back - p).length() <= 1e-2 * p.length().max(1.0));
    }

    #[test]
    fn cadence_intervals_are_positive(
        iters in 1usize..200_000,
        epoch_len in 1usize..5_000,
        n_ckpt in 0usize..500,
        n_eval in 0usize..500,
    ) {
        let cadence = Cadence::new(iters, epoch_len, n_ckpt, n_eval).unwrap();
        prop_assert!(cadence.max_epoch >= 1);
        prop_assert!(cadence.save_interval >= 1);
        prop_assert!(cadence.eval_interval >= 1);
        prop_assert_eq!(cadence.max_epoch, iters.div_ceil(epoch_len));
        prop_assert!(cadence.max_epoch * epoch_len >= iters);
    }

    #[test]
    fn refine_steps_preserve_order_and_range(
        ratios in proptest::collection::vec(0.0f64..=1.0, 0..8),
        iters in 1usize..100_000,
    ) {
        let steps = refine_steps(&ratios, iters);
        prop_assert_eq!(steps.len(), ratios.len());
        for (s, r) in steps.iter().zip(&ratios) {
            prop_assert!(*s <= iters);
            prop_assert!((*s as f64 - r * iters as f64).abs() <= 0.5 + 1e-9);
        }
    }

    #[test]
    fn lr_factor_is_bounded(iteration in 0usize..50_000, iters in 1usize..50_000) {
        let f = lr_factor(iteration.min(iters), iters);
        prop_assert!(f > 0.0);
        prop_assert!(f <= 1.0 + 1e-12);
    }
}

#[test]
fn refine_steps_round_half_to_even() {
    assert_eq!(refine_steps(&[0.5], 5), vec![2]);
    assert_eq!(refine_steps(&[0.5], 7), vec![4]);
    assert_eq!(refine_steps(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.7], 20_000),
        vec![2000, 4000, 6000, 8000, 10_000, 14_000]);
}
