//! More–Thuente line search.
//!
//! Safeguarded step-length selection from More & Thuente (1994), "Line
//! search algorithms with guaranteed sufficient decrease", with the
//! interpolation formulas of Sun & Yuan (2006). The search works on the
//! minimisation form φ(α) = −value(p + α·δ); the caller negates score and
//! directional derivative and guarantees a descent direction (φ'(0) < 0).

/// Configuration of one line search invocation.
#[derive(Debug, Clone)]
pub struct MoreThuenteConfig {
    /// Lower clamp on trial steps.
    pub step_min: f64,

    /// Upper clamp on trial steps.
    pub step_max: f64,

    /// Sufficient-decrease constant μ (Eq. 1.1).
    pub mu: f64,

    /// Curvature constant ν (Eq. 1.2).
    pub nu: f64,

    /// Inner iteration cap.
    pub max_iterations: usize,
}

impl Default for MoreThuenteConfig {
    fn default() -> Self {
        Self {
            step_min: 0.05,
            step_max: 0.1,
            mu: 1e-4,
            nu: 0.9,
            max_iterations: 10,
        }
    }
}

/// Auxiliary function ψ(α) = φ(α) − φ(0) − μ·φ'(0)·α (Eq. 1.6).
#[inline]
fn auxiliary_psi(a: f64, f_a: f64, f_0: f64, g_0: f64, mu: f64) -> f64 {
    f_a - f_0 - mu * g_0 * a
}

/// Derivative ψ'(α) = φ'(α) − μ·φ'(0).
#[inline]
fn auxiliary_dpsi(g_a: f64, g_0: f64, mu: f64) -> f64 {
    g_a - mu * g_0
}

/// Minimiser of the cubic through (a_l, f_l, g_l) and (a_t, f_t, g_t)
/// (Eq. 2.4.52 / 2.4.56, Sun & Yuan 2006).
#[inline]
fn cubic_minimizer(a_l: f64, f_l: f64, g_l: f64, a_t: f64, f_t: f64, g_t: f64) -> f64 {
    let z = 3.0 * (f_t - f_l) / (a_t - a_l) - g_t - g_l;
    let w = (z * z - g_t * g_l).sqrt();
    a_l + (a_t - a_l) * (w - g_l - z) / (g_t - g_l + 2.0 * w)
}

/// Trial value selection, Table 2.1 of More–Thuente.
#[allow(clippy::too_many_arguments)]
pub(crate) fn trial_value_selection(
    a_l: f64,
    f_l: f64,
    g_l: f64,
    a_u: f64,
    f_u: f64,
    g_u: f64,
    a_t: f64,
    f_t: f64,
    g_t: f64,
) -> f64 {
    // Case 1: higher function value; minimiser bracketed by [a_l, a_t].
    if f_t > f_l {
        let a_c = cubic_minimizer(a_l, f_l, g_l, a_t, f_t, g_t);
        // Quadratic through f_l, g_l, f_t (Eq. 2.4.2).
        let a_q = a_l - 0.5 * (a_l - a_t) * g_l / (g_l - (f_l - f_t) / (a_l - a_t));

        if (a_c - a_l).abs() < (a_q - a_l).abs() {
            a_c
        } else {
            0.5 * (a_q + a_c)
        }
    }
    // Case 2: derivative sign change.
    else if g_t * g_l < 0.0 {
        let a_c = cubic_minimizer(a_l, f_l, g_l, a_t, f_t, g_t);
        // Secant through g_l, g_t (Eq. 2.4.5).
        let a_s = a_l - (a_l - a_t) / (g_l - g_t) * g_l;

        if (a_c - a_t).abs() >= (a_s - a_t).abs() {
            a_c
        } else {
            a_s
        }
    }
    // Case 3: derivative magnitude shrinking; bound the extrapolation.
    else if g_t.abs() <= g_l.abs() {
        let a_c = cubic_minimizer(a_l, f_l, g_l, a_t, f_t, g_t);
        let a_s = a_l - (a_l - a_t) / (g_l - g_t) * g_l;

        let picked = if (a_c - a_t).abs() < (a_s - a_t).abs() {
            a_c
        } else {
            a_s
        };

        if a_t > a_l {
            (a_t + 0.66 * (a_u - a_t)).min(picked)
        } else {
            (a_t + 0.66 * (a_u - a_t)).max(picked)
        }
    }
    // Case 4: cubic through the upper endpoint.
    else {
        let z = 3.0 * (f_t - f_u) / (a_t - a_u) - g_t - g_u;
        let w = (z * z - g_t * g_u).sqrt();
        a_u + (a_t - a_u) * (w - g_u - z) / (g_t - g_u + 2.0 * w)
    }
}

/// Interval update of More–Thuente. Returns true when the interval has
/// degenerated to a point.
#[allow(clippy::too_many_arguments)]
pub(crate) fn update_interval(
    a_l: &mut f64,
    f_l: &mut f64,
    g_l: &mut f64,
    a_u: &mut f64,
    f_u: &mut f64,
    g_u: &mut f64,
    a_t: f64,
    f_t: f64,
    g_t: f64,
) -> bool {
    // Case U1.
    if f_t > *f_l {
        *a_u = a_t;
        *f_u = f_t;
        *g_u = g_t;
        false
    }
    // Case U2.
    else if g_t * (*a_l - a_t) > 0.0 {
        *a_l = a_t;
        *f_l = f_t;
        *g_l = g_t;
        false
    }
    // Case U3.
    else if g_t * (*a_l - a_t) < 0.0 {
        *a_u = *a_l;
        *f_u = *f_l;
        *g_u = *g_l;

        *a_l = a_t;
        *f_l = f_t;
        *g_l = g_t;
        false
    } else {
        true
    }
}

/// Run the search and return the accepted step length.
///
/// `phi` evaluates (φ(α), φ'(α)) at a trial step. `phi_0` and `d_phi_0` are
/// the values at α = 0, taken from the already-computed score at the current
/// pose; `d_phi_0` must be negative. The auxiliary ψ drives the search until
/// the interval closes (ψ(α_t) ≤ 0 and ψ'(α_t) ≥ 0), after which φ takes
/// over. Trial steps are clamped to [step_min, step_max].
pub fn more_thuente_search<F>(
    mut phi: F,
    phi_0: f64,
    d_phi_0: f64,
    step_init: f64,
    config: &MoreThuenteConfig,
) -> f64
where
    F: FnMut(f64) -> (f64, f64),
{
    let mu = config.mu;
    let nu = config.nu;

    let mut a_l = 0.0;
    let mut a_u = 0.0;
    let mut f_l = auxiliary_psi(a_l, phi_0, phi_0, d_phi_0, mu);
    let mut g_l = auxiliary_dpsi(d_phi_0, d_phi_0, mu);
    let mut f_u = auxiliary_psi(a_u, phi_0, phi_0, d_phi_0, mu);
    let mut g_u = auxiliary_dpsi(d_phi_0, d_phi_0, mu);

    // A degenerate clamp range (step_min >= step_max) skips the search.
    let mut interval_converged = config.step_max - config.step_min <= 0.0;
    let mut open_interval = true;

    let mut a_t = step_init.min(config.step_max).max(config.step_min);

    let (mut phi_t, mut d_phi_t) = phi(a_t);
    let mut psi_t = auxiliary_psi(a_t, phi_t, phi_0, d_phi_0, mu);
    let mut d_psi_t = auxiliary_dpsi(d_phi_t, d_phi_0, mu);

    let mut iterations = 0;
    while !interval_converged
        && iterations < config.max_iterations
        && !(psi_t <= 0.0 && d_phi_t <= -nu * d_phi_0)
    {
        // The auxiliary ψ drives trial selection while the interval is open.
        a_t = if open_interval {
            trial_value_selection(a_l, f_l, g_l, a_u, f_u, g_u, a_t, psi_t, d_psi_t)
        } else {
            trial_value_selection(a_l, f_l, g_l, a_u, f_u, g_u, a_t, phi_t, d_phi_t)
        };
        a_t = a_t.min(config.step_max).max(config.step_min);

        let evaluated = phi(a_t);
        phi_t = evaluated.0;
        d_phi_t = evaluated.1;
        psi_t = auxiliary_psi(a_t, phi_t, phi_0, d_phi_0, mu);
        d_psi_t = auxiliary_dpsi(d_phi_t, d_phi_0, mu);

        if open_interval && psi_t <= 0.0 && d_psi_t >= 0.0 {
            open_interval = false;

            // Convert the stored endpoint values from ψ to φ.
            f_l += phi_0 - mu * d_phi_0 * a_l;
            g_l += mu * d_phi_0;
            f_u += phi_0 - mu * d_phi_0 * a_u;
            g_u += mu * d_phi_0;
        }

        interval_converged = if open_interval {
            update_interval(
                &mut a_l, &mut f_l, &mut g_l, &mut a_u, &mut f_u, &mut g_u, a_t, psi_t, d_psi_t,
            )
        } else {
            update_interval(
                &mut a_l, &mut f_l, &mut g_l, &mut a_u, &mut f_u, &mut g_u, a_t, phi_t, d_phi_t,
            )
        };

        iterations += 1;
    }

    a_t
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_psi_at_origin_is_zero() {
        let psi = auxiliary_psi(0.0, 1.0, 1.0, -0.5, 1e-4);
        assert_relative_eq!(psi, 0.0, epsilon = 1e-15);
    }

    #[test]
    fn test_quadratic_descent() {
        // φ(α) = (α - 2)², minimum at α = 2.
        let phi = |a: f64| ((a - 2.0).powi(2), 2.0 * (a - 2.0));
        let config = MoreThuenteConfig {
            step_min: 0.0,
            step_max: 5.0,
            max_iterations: 20,
            ..Default::default()
        };

        let step = more_thuente_search(phi, 4.0, -4.0, 1.0, &config);

        // The Wolfe pair already holds at α = 1 for this quadratic; any
        // accepted step must satisfy both conditions.
        let (phi_s, d_phi_s) = ((step - 2.0).powi(2), 2.0 * (step - 2.0));
        assert!(phi_s <= 4.0 + 1e-4 * (-4.0) * step, "sufficient decrease");
        assert!(d_phi_s.abs() <= 0.9 * 4.0, "curvature");
    }

    #[test]
    fn test_step_clamped_to_bounds() {
        // Steep linear descent wants a huge step; the clamp bounds it.
        let phi = |a: f64| (-10.0 * a, -10.0);
        let config = MoreThuenteConfig {
            step_min: 0.05,
            step_max: 0.1,
            ..Default::default()
        };

        let step = more_thuente_search(phi, 0.0, -10.0, 50.0, &config);
        assert!(step >= 0.05 && step <= 0.1, "step = {step}");
    }

    #[test]
    fn test_degenerate_clamp_range_returns_initial() {
        let phi = |a: f64| (a, 1.0);
        let config = MoreThuenteConfig {
            step_min: 0.1,
            step_max: 0.1,
            ..Default::default()
        };

        let step = more_thuente_search(phi, 0.0, -1.0, 0.3, &config);
        assert_relative_eq!(step, 0.1, epsilon = 1e-15);
    }

    #[test]
    fn test_update_interval_cases() {
        // U1: trial value above the lower endpoint replaces the upper end.
        let (mut a_l, mut f_l, mut g_l) = (0.0, 0.0, -1.0);
        let (mut a_u, mut f_u, mut g_u) = (0.0, 0.0, -1.0);
        let converged = update_interval(
            &mut a_l, &mut f_l, &mut g_l, &mut a_u, &mut f_u, &mut g_u, 0.5, 1.0, 0.2,
        );
        assert!(!converged);
        assert_eq!(a_u, 0.5);
        assert_eq!(a_l, 0.0);

        // U2: lower value with derivative pointing back replaces the lower
        // end.
        let (mut a_l, mut f_l, mut g_l) = (0.0, 0.0, -1.0);
        let (mut a_u, mut f_u, mut g_u) = (1.0, 2.0, 1.0);
        let converged = update_interval(
            &mut a_l, &mut f_l, &mut g_l, &mut a_u, &mut f_u, &mut g_u, 0.5, -0.5, -0.2,
        );
        assert!(!converged);
        assert_eq!(a_l, 0.5);
        assert_eq!(a_u, 1.0);

        // U3: derivative pointing forward swaps endpoints.
        let (mut a_l, mut f_l, mut g_l) = (0.0, 0.0, -1.0);
        let (mut a_u, mut f_u, mut g_u) = (1.0, 2.0, 1.0);
        let converged = update_interval(
            &mut a_l, &mut f_l, &mut g_l, &mut a_u, &mut f_u, &mut g_u, 0.5, -0.5, 0.2,
        );
        assert!(!converged);
        assert_eq!(a_l, 0.5);
        assert_eq!(a_u, 0.0);

        // Zero derivative term: converged.
        let (mut a_l, mut f_l, mut g_l) = (0.5, -0.5, -1.0);
        let (mut a_u, mut f_u, mut g_u) = (1.0, 2.0, 1.0);
        let converged = update_interval(
            &mut a_l, &mut f_l, &mut g_l, &mut a_u, &mut f_u, &mut g_u, 0.5, -0.5, 0.0,
        );
        assert!(converged);
    }

    #[test]
    fn test_trial_value_case1_brackets_left() {
        // f_t > f_l: the next trial must fall between a_l and a_t.
        let a_t = trial_value_selection(0.0, 0.0, -1.0, 0.0, 0.0, -1.0, 1.0, 2.0, 3.0);
        assert!(a_t > 0.0 && a_t < 1.0, "a_t = {a_t}");
    }
}
