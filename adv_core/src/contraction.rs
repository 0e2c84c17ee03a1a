//! L-inf scene contraction.
//!
//! Unbounded scenes are squeezed into the cube `[-2, 2]^3` so that a finite occupancy grid and
//! positional encoding can cover them. Points with `|x|_inf <= 1` are left untouched; points
//! farther out are mapped to `(2 - 1/|x|_inf) * x / |x|_inf`.

use crate::types::Point3;

/// Contract a point into `[-2, 2]^3`.
#[inline]
pub fn contract_linf(p: Point3) -> Point3 {
    let mag = p.max_abs();
    if mag <= 1.0 {
        p
    } else {
        p * ((2.0 - 1.0 / mag) / mag)
    }
}

/// Inverse of [`contract_linf`].
///
/// Inputs on or beyond the outer shell `|y|_inf >= 2` map to points at infinity, so they are
/// clamped just inside it.
#[inline]
pub fn uncontract_linf(p: Point3) -> Point3 {
    let mag = p.max_abs();
    if mag <= 1.0 {
        p
    } else {
        let mag_c = mag.min(2.0 - 1e-6);
        let radius = 1.0 / (2.0 - mag_c);
        p * (radius / mag)
    }
}
