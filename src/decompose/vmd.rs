//! Variational mode decomposition on the analytic (positive-frequency) half
//! spectrum of a mirror-extended signal.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

#[derive(Debug, Clone)]
pub(crate) struct VmdParams {
    pub modes: usize,
    pub alpha: f64,
    pub tau: f64,
    pub tolerance: f64,
    pub max_iterations: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct VmdOutput {
    /// Time-domain modes, same length as the input.
    pub modes: Vec<Vec<f64>>,
    /// Center frequency of each mode in cycles per sample, in `[0, 0.5]`.
    pub center_frequencies: Vec<f64>,
    pub iterations: usize,
    pub converged: bool,
    pub last_update: f64,
}

pub(crate) fn vmd(signal: &[f64], params: &VmdParams) -> VmdOutput {
    let n = signal.len();
    let k = params.modes.max(1);
    if n < 2 {
        return VmdOutput {
            modes: vec![vec![0.0; n]; k],
            center_frequencies: vec![0.0; k],
            iterations: 0,
            converged: true,
            last_update: 0.0,
        };
    }

    let left = n / 2;
    let right = n - left;
    let mirrored = mirror_extend(signal, left, right);
    let t_len = mirrored.len();
    let half = t_len / 2;
    let freqs: Vec<f64> = (0..t_len)
        .map(|i| i as f64 / t_len as f64 - 0.5)
        .collect();

    let mut planner = FftPlanner::<f64>::new();
    let mut spectrum: Vec<Complex<f64>> =
        mirrored.iter().map(|v| Complex::new(*v, 0.0)).collect();
    planner.plan_fft_forward(t_len).process(&mut spectrum);
    let shifted = fft_shift(&spectrum);
    let mut f_hat_plus = shifted;
    for v in f_hat_plus.iter_mut().take(half) {
        *v = Complex::new(0.0, 0.0);
    }

    let energy: f64 = f_hat_plus.iter().map(|c| c.norm_sqr()).sum();
    if energy <= f64::EPSILON {
        return VmdOutput {
            modes: vec![vec![0.0; n]; k],
            center_frequencies: (0..k).map(|j| 0.5 / k as f64 * j as f64).collect(),
            iterations: 0,
            converged: true,
            last_update: 0.0,
        };
    }

    let zero = Complex::new(0.0, 0.0);
    let mut u_hat = vec![vec![zero; t_len]; k];
    let mut omega: Vec<f64> = (0..k).map(|j| 0.5 / k as f64 * j as f64).collect();
    let mut lambda = vec![zero; t_len];
    // Running sum of the latest estimate of every mode.
    let mut total = vec![zero; t_len];

    let mut iterations = 0usize;
    let mut last_update = f64::INFINITY;
    let mut converged = false;

    while iterations < params.max_iterations {
        let prev = u_hat.clone();
        for j in 0..k {
            let mut num = 0.0;
            let mut den = 0.0;
            for i in half..t_len {
                let other = total[i] - u_hat[j][i];
                let d = freqs[i] - omega[j];
                let updated =
                    (f_hat_plus[i] - other - lambda[i] * 0.5) / (1.0 + params.alpha * d * d);
                total[i] = other + updated;
                u_hat[j][i] = updated;
                let p = updated.norm_sqr();
                num += freqs[i] * p;
                den += p;
            }
            if den > f64::EPSILON {
                omega[j] = num / den;
            }
        }

        if params.tau > 0.0 {
            for i in half..t_len {
                lambda[i] += (total[i] - f_hat_plus[i]) * params.tau;
            }
        }

        iterations += 1;
        let mut diff = 0.0;
        for j in 0..k {
            for i in half..t_len {
                diff += (u_hat[j][i] - prev[j][i]).norm_sqr();
            }
        }
        last_update = diff / energy;
        if !last_update.is_finite() {
            break;
        }
        if last_update <= params.tolerance {
            converged = true;
            break;
        }
    }

    let inverse = planner.plan_fft_inverse(t_len);
    let mut modes = Vec::with_capacity(k);
    for mode_plus in &u_hat {
        let mut full = vec![zero; t_len];
        full[half..t_len].copy_from_slice(&mode_plus[half..t_len]);
        for m in 0..half {
            full[half - m] = mode_plus[half + m].conj();
        }
        full[0] = full[t_len - 1].conj();
        let mut time = ifft_shift(&full);
        inverse.process(&mut time);
        let scale = 1.0 / t_len as f64;
        modes.push(
            time[left..left + n]
                .iter()
                .map(|c| c.re * scale)
                .collect::<Vec<f64>>(),
        );
    }

    VmdOutput {
        modes,
        center_frequencies: omega,
        iterations,
        converged,
        last_update,
    }
}

fn mirror_extend(signal: &[f64], left: usize, right: usize) -> Vec<f64> {
    let n = signal.len();
    let mut out = Vec::with_capacity(n + left + right);
    out.extend(signal[..left].iter().rev());
    out.extend_from_slice(signal);
    out.extend(signal[n - right..].iter().rev());
    out
}

fn fft_shift(x: &[Complex<f64>]) -> Vec<Complex<f64>> {
    let n = x.len();
    let shift = n / 2;
    (0..n).map(|i| x[(i + n - shift) % n]).collect()
}

fn ifft_shift(x: &[Complex<f64>]) -> Vec<Complex<f64>> {
    let n = x.len();
    let shift = n / 2;
    (0..n).map(|i| x[(i + shift) % n]).collect()
}
