use ndarray::Array1;

use super::{UnfoldProblem, UnfoldingAlgorithm};

/// Maximum-likelihood expectation maximisation:
/// `φⱼ ← φⱼ / Σᵢ Rᵢⱼ · Σᵢ Rᵢⱼ Nᵢ / Mᵢ`. Uncertainties are not used.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mlem;

impl UnfoldingAlgorithm for Mlem {
    fn name(&self) -> &'static str {
        "MLEM"
    }

    fn update(
        &self,
        problem: &UnfoldProblem<'_>,
        current: &Array1<f64>,
        modeled: &Array1<f64>,
    ) -> Array1<f64> {
        let n = problem.measurements();
        let r = problem.response();

        let ratios: Array1<f64> = n
            .iter()
            .zip(modeled.iter())
            .map(|(n, m)| if *m > 0.0 { n / m } else { 0.0 })
            .collect();
        let sensitivity = r.sum_axis(ndarray::Axis(0));
        let back_projected = r.t().dot(&ratios);

        Array1::from_iter(current.iter().enumerate().map(|(j, &phi)| {
            if sensitivity[j] > 0.0 {
                phi * back_projected[j] / sensitivity[j]
            } else {
                phi
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn update_matches_hand_computation() {
        let ds = array![1.0, 1.0];
        let r = array![[1.0, 1.0], [1.0, 0.2]];
        let n = array![10.0, 3.0];
        let sigma = &n * 0.05;
        let problem = UnfoldProblem::new(n.view(), sigma.view(), r.view(), ds.view()).unwrap();
        let next = Mlem.update(&problem, &ds, &problem.fold(&ds));
        assert_relative_eq!(next[0], 3.75, max_relative = 1e-12);
        assert_relative_eq!(next[1], 5.5 / 1.2, max_relative = 1e-12);
    }

    #[test]
    fn unseen_bin_is_unchanged() {
        let ds = array![2.0, 7.0];
        let r = array![[1.0, 0.0]];
        let n = array![4.0];
        let sigma = array![0.2];
        let problem = UnfoldProblem::new(n.view(), sigma.view(), r.view(), ds.view()).unwrap();
        let next = Mlem.update(&problem, &ds, &problem.fold(&ds));
        assert_relative_eq!(next[0], 4.0, max_relative = 1e-12);
        assert_eq!(next[1], 7.0);
    }
}
