//! Levenberg–Marquardt least squares for small, fixed parameter counts.
//!
//! Minimises `Σ (yₖ − f(xₖ; p))²`. Each iteration solves the
//! Jacobi-scaled normal equations `(JᵀJ + λ·diag(JᵀJ)) δ = Jᵀr` by
//! Cholesky decomposition and accepts the step only if the cost does
//! not increase; λ shrinks on success and grows on rejection.

/// A model `f(x; p)` with an analytic parameter gradient.
pub trait LeastSquaresModel<const N: usize> {
    fn value(&self, x: f64, p: &[f64; N]) -> f64;

    fn gradient(&self, x: f64, p: &[f64; N]) -> [f64; N];
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LmSettings {
    pub max_iterations: usize,
    pub lambda_init: f64,
    pub lambda_up: f64,
    pub lambda_down: f64,
    /// Rejections past this damping mean the cost cannot be reduced.
    pub lambda_max: f64,
    /// Relative parameter step treated as converged.
    pub xtol: f64,
    /// Relative cost reduction treated as converged.
    pub ftol: f64,
}

impl Default for LmSettings {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            lambda_init: 1e-3,
            lambda_up: 10.0,
            lambda_down: 0.1,
            lambda_max: 1e16,
            xtol: 1e-10,
            ftol: 1e-12,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LmSolution<const N: usize> {
    pub params: [f64; N],
    /// Final sum of squared residuals.
    pub cost: f64,
    pub iterations: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LmError {
    /// The model is not finite at the starting point.
    NonFiniteStart,
    /// No cost-reducing step exists even under maximal damping.
    Stalled { iterations: usize, cost: f64 },
    MaxIterations { iterations: usize, cost: f64 },
}

pub fn cost<M: LeastSquaresModel<N>, const N: usize>(
    model: &M,
    xs: &[f64],
    ys: &[f64],
    p: &[f64; N],
) -> f64 {
    xs.iter()
        .zip(ys)
        .map(|(&x, &y)| {
            let r = y - model.value(x, p);
            r * r
        })
        .sum()
}

pub fn minimize<M: LeastSquaresModel<N>, const N: usize>(
    model: &M,
    xs: &[f64],
    ys: &[f64],
    initial: [f64; N],
    settings: &LmSettings,
) -> Result<LmSolution<N>, LmError> {
    let mut p = initial;
    let mut current = cost(model, xs, ys, &p);
    if !current.is_finite() {
        return Err(LmError::NonFiniteStart);
    }
    let mut lambda = settings.lambda_init;

    for iteration in 1..=settings.max_iterations {
        let (jtj, jtr) = normal_equations(model, xs, ys, &p);
        if jtr.iter().all(|g| *g == 0.0) {
            return Ok(LmSolution {
                params: p,
                cost: current,
                iterations: iteration,
            });
        }

        // Jacobi scaling keeps parameters of very different magnitude
        // well conditioned.
        let scale: [f64; N] = std::array::from_fn(|j| {
            let s = jtj[j][j].sqrt();
            if s > 0.0 && s.is_finite() {
                s
            } else {
                1.0
            }
        });

        loop {
            let mut a = [[0.0; N]; N];
            let mut g = [0.0; N];
            for i in 0..N {
                for j in 0..N {
                    a[i][j] = jtj[i][j] / (scale[i] * scale[j]);
                }
                a[i][i] += lambda;
                g[i] = jtr[i] / scale[i];
            }

            let step: [f64; N] = match solve_cholesky(&a, &g) {
                Some(y) => std::array::from_fn(|j| y[j] / scale[j]),
                None => {
                    lambda *= settings.lambda_up;
                    if lambda > settings.lambda_max {
                        return Err(LmError::Stalled {
                            iterations: iteration,
                            cost: current,
                        });
                    }
                    continue;
                }
            };
            let small_step = (0..N)
                .all(|j| step[j].abs() <= settings.xtol * (p[j].abs() + settings.xtol));

            let trial: [f64; N] = std::array::from_fn(|j| p[j] + step[j]);
            let trial_cost = cost(model, xs, ys, &trial);

            if trial_cost.is_finite() && trial_cost <= current {
                let reduction = if current > 0.0 {
                    (current - trial_cost) / current
                } else {
                    0.0
                };
                p = trial;
                current = trial_cost;
                lambda = (lambda * settings.lambda_down).max(1e-15);
                if small_step || reduction <= settings.ftol || current == 0.0 {
                    return Ok(LmSolution {
                        params: p,
                        cost: current,
                        iterations: iteration,
                    });
                }
                break;
            }

            if small_step {
                // At the floating-point floor around the minimum.
                return Ok(LmSolution {
                    params: p,
                    cost: current,
                    iterations: iteration,
                });
            }
            lambda *= settings.lambda_up;
            if lambda > settings.lambda_max {
                return Err(LmError::Stalled {
                    iterations: iteration,
                    cost: current,
                });
            }
        }
    }

    Err(LmError::MaxIterations {
        iterations: settings.max_iterations,
        cost: current,
    })
}

/// `JᵀJ` and `Jᵀr` with `J = ∂f/∂p` and `r = y − f`.
fn normal_equations<M: LeastSquaresModel<N>, const N: usize>(
    model: &M,
    xs: &[f64],
    ys: &[f64],
    p: &[f64; N],
) -> ([[f64; N]; N], [f64; N]) {
    let mut jtj = [[0.0; N]; N];
    let mut jtr = [0.0; N];
    for (&x, &y) in xs.iter().zip(ys) {
        let r = y - model.value(x, p);
        let grad = model.gradient(x, p);
        for i in 0..N {
            jtr[i] += grad[i] * r;
            for j in 0..=i {
                jtj[i][j] += grad[i] * grad[j];
            }
        }
    }
    for i in 0..N {
        for j in (i + 1)..N {
            jtj[i][j] = jtj[j][i];
        }
    }
    (jtj, jtr)
}

/// Solve `A x = b` for symmetric positive-definite `A`.
fn solve_cholesky<const N: usize>(a: &[[f64; N]; N], b: &[f64; N]) -> Option<[f64; N]> {
    let mut l = [[0.0_f64; N]; N];
    for i in 0..N {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[i][k] * l[j][k];
            }
            if i == j {
                let diag = a[i][i] - sum;
                if diag <= 0.0 || !diag.is_finite() {
                    return None;
                }
                l[i][j] = diag.sqrt();
            } else {
                l[i][j] = (a[i][j] - sum) / l[j][j];
            }
        }
    }

    // L y = b
    let mut y = [0.0; N];
    for i in 0..N {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[i][j] * y[j];
        }
        y[i] = (b[i] - sum) / l[i][i];
    }

    // Lᵀ x = y
    let mut x = [0.0; N];
    for i in (0..N).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..N {
            sum += l[j][i] * x[j];
        }
        x[i] = (y[i] - sum) / l[i][i];
    }
    Some(x)
}
