//! Interpolation Functions

use rcore::math::*;

/// Returns the Catmull-Rom weights and the index offset of the first weight
/// for a value inside the node range. The offset is `-1` in the first
/// interval; the corresponding weight is zero.
///
/// * `nodes` - Interpolation nodes in increasing order.
/// * `x`     - Variable to interpolate.
pub fn catmull_rom_weights(nodes: &[Float], x: Float) -> Option<([Float; 4], isize)> {
    // Return None if `x` is out of bounds.
    let size = nodes.len();
    if size < 2 || !(x >= nodes[0] && x <= nodes[size - 1]) {
        return None;
    }

    // Search for the interval `idx` containing `x`.
    let idx = find_interval(size, |i| nodes[i] <= x);
    let offset = idx as isize - 1;
    let x0 = nodes[idx];
    let x1 = nodes[idx + 1];

    // Compute the `t` parameter and powers.
    let t = (x - x0) / (x1 - x0);
    let t2 = t * t;
    let t3 = t2 * t;

    // Compute initial node weights `w_1` and `w_2`.
    let mut weights = [0.0; 4];
    weights[1] = 2.0 * t3 - 3.0 * t2 + 1.0;
    weights[2] = -2.0 * t3 + 3.0 * t2;

    // Compute first node weight `w_0`.
    if idx > 0 {
        let w0 = (t3 - 2.0 * t2 + t) * (x1 - x0) / (x1 - nodes[idx - 1]);
        weights[0] = -w0;
        weights[2] += w0;
    } else {
        let w0 = t3 - 2.0 * t2 + t;
        weights[0] = 0.0;
        weights[1] -= w0;
        weights[2] += w0;
    }

    // Compute last node weight `w_3`.
    if idx + 2 < size {
        let w3 = (t3 - t2) * (x1 - x0) / (nodes[idx + 2] - x0);
        weights[1] -= w3;
        weights[3] = w3;
    } else {
        let w3 = t3 - t2;
        weights[1] -= w3;
        weights[2] += w3;
        weights[3] = 0.0;
    }

    Some((weights, offset))
}

/// Evaluates a cosine series `sum(a[k] cos(k phi))` using the cosine
/// recurrence.
///
/// * `a`       - The coefficients.
/// * `cos_phi` - Cosine of the angle.
pub fn fourier(a: &[Float], cos_phi: Float) -> Float {
    let mut value = 0.0;

    // Initialize cosine iterates.
    let mut cos_k_minus_one_phi = cos_phi;
    let mut cos_k_phi = 1.0;
    for ak in a {
        // Add the current summand and update the cosine iterates.
        value += ak * cos_k_phi;
        let cos_k_plus_one_phi = 2.0 * cos_phi * cos_k_phi - cos_k_minus_one_phi;
        cos_k_minus_one_phi = cos_k_phi;
        cos_k_phi = cos_k_plus_one_phi;
    }

    value
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::*;
    use proptest::prelude::*;

    #[test]
    fn out_of_range_has_no_weights() {
        let nodes = [0.0, 0.5, 1.0];
        assert!(catmull_rom_weights(&nodes, -0.1).is_none());
        assert!(catmull_rom_weights(&nodes, 1.1).is_none());
    }

    #[test]
    fn node_positions_select_single_node() {
        let nodes = [0.0, 0.25, 0.5, 1.0];
        let (w, offset) = catmull_rom_weights(&nodes, 0.25).unwrap();
        assert_eq!(offset, 0);
        assert!(approx_eq!(Float, w[1], 1.0));
        assert!(approx_eq!(Float, w[0] + w[2] + w[3], 0.0));
    }

    #[test]
    fn fourier_series_matches_cosines() {
        let a = [1.0, 0.5, 0.25];
        let phi: Float = 0.7;
        let expected = 1.0 + 0.5 * phi.cos() + 0.25 * (2.0 * phi).cos();
        assert!(approx_eq!(Float, fourier(&a, phi.cos()), expected, epsilon = 1e-12));
    }

    proptest! {
        #[test]
        fn weights_sum_to_one(x in 0.0..1.0f64) {
            let nodes = [0.0, 0.1, 0.3, 0.6, 1.0];
            let (w, _) = catmull_rom_weights(&nodes, x).unwrap();
            prop_assert!((w.iter().sum::<Float>() - 1.0).abs() < 1e-9);
        }
    }
}
