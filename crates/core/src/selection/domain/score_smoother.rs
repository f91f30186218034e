/// Kernel half-width in standard deviations.
const TRUNCATE: f64 = 4.0;

/// Normalized 1D Gaussian kernel with radius `round(TRUNCATE * sigma)`,
/// clamped to `max_radius`.
fn gaussian_kernel(sigma: f64, max_radius: usize) -> Vec<f64> {
    let radius = ((TRUNCATE * sigma + 0.5) as usize).min(max_radius) as isize;
    let mut kernel: Vec<f64> = (-radius..=radius)
        .map(|x| {
            let x = x as f64;
            (-0.5 * x * x / (sigma * sigma)).exp()
        })
        .collect();
    let sum: f64 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    kernel
}

/// Mirrors an out-of-range position back into `0..len`, repeating the edge
/// sample (`d c b a | a b c d | d c b a`).
fn reflect(position: isize, len: usize) -> usize {
    let n = len as isize;
    let period = 2 * n;
    let m = position.rem_euclid(period);
    if m >= n {
        (period - m - 1) as usize
    } else {
        m as usize
    }
}

/// Gaussian smoothing of a score series, with reflected boundaries.
#[derive(Clone, Debug)]
pub struct ScoreSmoother {
    sigma: f64,
}

impl ScoreSmoother {
    /// `sigma` is in series positions; `sigma <= 0` or NaN disables
    /// smoothing.
    pub fn new(sigma: f64) -> Self {
        Self { sigma }
    }

    pub fn smooth(&self, series: &[f64]) -> Vec<f64> {
        if self.sigma.is_nan() || self.sigma <= 0.0 || series.is_empty() {
            return series.to_vec();
        }
        // Wider kernels only wrap around the reflected series again.
        let kernel = gaussian_kernel(self.sigma, series.len());
        let radius = (kernel.len() / 2) as isize;
        (0..series.len() as isize)
            .map(|i| {
                kernel
                    .iter()
                    .enumerate()
                    .map(|(k, w)| w * series[reflect(i + k as isize - radius, series.len())])
                    .sum()
            })
            .collect()
    }
}
