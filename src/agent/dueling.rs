//! Dueling head: the last layer emits `[V, A_1, .., A_n]` and the Q-values are
//! `Q_k = V + A_k - mean(A)`.

use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};

/// Recombine one raw output row of width `n + 1` into `n` Q-values
pub fn combine(raw: ArrayView1<f32>) -> Array1<f32> {
    let value = raw[0];
    let advantages = raw.slice(s![1..]);
    let mean = advantages.mean().unwrap_or(0.0);
    advantages.mapv(|a| value + a - mean)
}

pub fn combine_batch(raw: ArrayView2<f32>) -> Array2<f32> {
    let mut q = Array2::zeros((raw.nrows(), raw.ncols().saturating_sub(1)));
    for (mut row, raw_row) in q.axis_iter_mut(Axis(0)).zip(raw.axis_iter(Axis(0))) {
        row.assign(&combine(raw_row));
    }
    q
}

/// Map a loss gradient over the Q-values back onto the raw `[V, A..]` outputs:
/// `dL/dV = Σ g_k` and `dL/dA_j = g_j - mean(g)`.
pub fn backward(grad_q: ArrayView1<f32>) -> Array1<f32> {
    let n = grad_q.len();
    let total = grad_q.sum();
    let mean = if n == 0 { 0.0 } else { total / n as f32 };
    let mut raw = Array1::zeros(n + 1);
    raw[0] = total;
    raw.slice_mut(s![1..]).assign(&grad_q.mapv(|g| g - mean));
    raw
}

pub fn backward_batch(grad_q: ArrayView2<f32>) -> Array2<f32> {
    let mut raw = Array2::zeros((grad_q.nrows(), grad_q.ncols() + 1));
    for (mut row, g) in raw.axis_iter_mut(Axis(0)).zip(grad_q.axis_iter(Axis(0))) {
        row.assign(&backward(g));
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_combine_centres_advantages() {
        let raw = array![2.0, 1.0, 3.0, 5.0];
        let q = combine(raw.view());
        assert_eq!(q, array![0.0, 2.0, 4.0]);
        assert!(((&q - 2.0).mean().unwrap()).abs() < 1e-6);
    }

    #[test]
    fn test_backward_matches_finite_differences() {
        let raw = array![0.5, -1.0, 0.25, 2.0];
        let weights = array![0.3, -1.2, 0.7];
        let loss = |r: &Array1<f32>| (combine(r.view()) * &weights).sum();
        let analytic = backward(weights.view());

        let eps = 1e-2;
        for i in 0..raw.len() {
            let mut plus = raw.clone();
            plus[i] += eps;
            let mut minus = raw.clone();
            minus[i] -= eps;
            let numeric = (loss(&plus) - loss(&minus)) / (2.0 * eps);
            assert!((numeric - analytic[i]).abs() < 1e-3, "output {}", i);
        }
    }
}
