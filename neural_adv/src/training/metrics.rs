//! Evaluation meters and training step metrics.

use adv_io::FloatImage;

use crate::loss::LossBreakdown;

/// One evaluated view.
#[derive(Debug, Clone, Copy)]
pub struct EvalSample<'a> {
    /// Rendered image.
    pub pred: &'a FloatImage,
    /// Ground truth composited over the same background, if available.
    pub gt: Option<&'a FloatImage>,
    /// Surrogate prediction on the clean reference render.
    pub clean_class: Option<usize>,
    /// Surrogate prediction on the attacked render.
    pub attacked_class: Option<usize>,
}

/// Accumulates a scalar over evaluated views.
pub trait Meter {
    /// Short name used in reports.
    fn name(&self) -> &'static str;

    /// Fold in one view.
    fn update(&mut self, sample: &EvalSample<'_>);

    /// Current aggregate, `None` before any usable sample.
    fn value(&self) -> Option<f32>;

    /// Forget all samples.
    fn clear(&mut self);

    /// True if a larger value is better.
    fn higher_is_better(&self) -> bool {
        true
    }

    /// `name = value` line.
    fn report(&self) -> String {
        match self.value() {
            Some(v) => format!("{} = {:.6}", self.name(), v),
            None => format!("{} = n/a", self.name()),
        }
    }
}

/// Peak signal-to-noise ratio, averaged over views.
#[derive(Debug, Clone, Default)]
pub struct PsnrMeter {
    sum: f64,
    count: usize,
}

impl PsnrMeter {
    /// Empty meter.
    pub fn new() -> Self {
        Self::default()
    }
}

/// PSNR between two same-sized images with values in `[0, 1]`, compared on RGB.
pub fn psnr(pred: &FloatImage, gt: &FloatImage) -> Option<f32> {
    if (pred.width, pred.height) != (gt.width, gt.height) {
        return None;
    }
    let (a, b) = (pred.to_rgb(), gt.to_rgb());
    let mse = a
        .data
        .iter()
        .zip(&b.data)
        .map(|(x, y)| {
            let d = (x.clamp(0.0, 1.0) - y.clamp(0.0, 1.0)) as f64;
            d * d
        })
        .sum::<f64>()
        / a.data.len().max(1) as f64;
    Some((-10.0 * mse.max(1e-10).log10()) as f32)
}

impl Meter for PsnrMeter {
    fn name(&self) -> &'static str {
        "PSNR"
    }

    fn update(&mut self, sample: &EvalSample<'_>) {
        if let Some(v) = sample.gt.and_then(|gt| psnr(sample.pred, gt)) {
            self.sum += v as f64;
            self.count += 1;
        }
    }

    fn value(&self) -> Option<f32> {
        (self.count > 0).then(|| (self.sum / self.count as f64) as f32)
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Structural similarity, averaged over views and channels.
#[derive(Debug, Clone, Default)]
pub struct SsimMeter {
    sum: f64,
    count: usize,
}

impl SsimMeter {
    /// Empty meter.
    pub fn new() -> Self {
        Self::default()
    }
}

const SSIM_RADIUS: usize = 5;
const SSIM_SIGMA: f32 = 1.5;
const SSIM_C1: f32 = 0.01 * 0.01;
const SSIM_C2: f32 = 0.03 * 0.03;

fn gaussian_kernel() -> Vec<f32> {
    let k: Vec<f32> = (0..=2 * SSIM_RADIUS)
        .map(|i| {
            let x = i as f32 - SSIM_RADIUS as f32;
            (-(x * x) / (2.0 * SSIM_SIGMA * SSIM_SIGMA)).exp()
        })
        .collect();
    let sum: f32 = k.iter().sum();
    k.into_iter().map(|v| v / sum).collect()
}

/// Separable Gaussian blur with clamped borders.
fn blur(values: &[f32], w: usize, h: usize, kernel: &[f32]) -> Vec<f32> {
    let r = SSIM_RADIUS as isize;
    let clamp = |v: isize, n: usize| v.clamp(0, n as isize - 1) as usize;
    let mut tmp = vec![0.0f32; w * h];
    for y in 0..h {
        for x in 0..w {
            tmp[y * w + x] = kernel
                .iter()
                .enumerate()
                .map(|(i, k)| k * values[y * w + clamp(x as isize + i as isize - r, w)])
                .sum();
        }
    }
    let mut out = vec![0.0f32; w * h];
    for y in 0..h {
        for x in 0..w {
            out[y * w + x] = kernel
                .iter()
                .enumerate()
                .map(|(i, k)| k * tmp[clamp(y as isize + i as isize - r, h) * w + x])
                .sum();
        }
    }
    out
}

/// Mean SSIM over RGB channels with an 11x11 Gaussian window.
pub fn ssim(pred: &FloatImage, gt: &FloatImage) -> Option<f32> {
    if (pred.width, pred.height) != (gt.width, gt.height) {
        return None;
    }
    let (w, h) = (pred.width as usize, pred.height as usize);
    let (a, b) = (pred.to_rgb(), gt.to_rgb());
    let kernel = gaussian_kernel();
    let channel = |img: &FloatImage, c: usize| -> Vec<f32> {
        img.data.iter().skip(c).step_by(3).copied().collect()
    };

    let mut total = 0.0f64;
    for c in 0..3 {
        let x = channel(&a, c);
        let y = channel(&b, c);
        let xx: Vec<f32> = x.iter().map(|v| v * v).collect();
        let yy: Vec<f32> = y.iter().map(|v| v * v).collect();
        let xy: Vec<f32> = x.iter().zip(&y).map(|(p, q)| p * q).collect();

        let mu_x = blur(&x, w, h, &kernel);
        let mu_y = blur(&y, w, h, &kernel);
        let s_xx = blur(&xx, w, h, &kernel);
        let s_yy = blur(&yy, w, h, &kernel);
        let s_xy = blur(&xy, w, h, &kernel);

        let sum: f64 = (0..w * h)
            .map(|i| {
                let (mx, my) = (mu_x[i], mu_y[i]);
                let vx = s_xx[i] - mx * mx;
                let vy = s_yy[i] - my * my;
                let cov = s_xy[i] - mx * my;
                let num = (2.0 * mx * my + SSIM_C1) * (2.0 * cov + SSIM_C2);
                let den = (mx * mx + my * my + SSIM_C1) * (vx + vy + SSIM_C2);
                (num / den) as f64
            })
            .sum();
        total += sum / (w * h).max(1) as f64;
    }
    Some((total / 3.0) as f32)
}

impl Meter for SsimMeter {
    fn name(&self) -> &'static str {
        "SSIM"
    }

    fn update(&mut self, sample: &EvalSample<'_>) {
        if let Some(v) = sample.gt.and_then(|gt| ssim(sample.pred, gt)) {
            self.sum += v as f64;
            self.count += 1;
        }
    }

    fn value(&self) -> Option<f32> {
        (self.count > 0).then(|| (self.sum / self.count as f64) as f32)
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Fraction of attacked views the surrogate assigns to the target class, alongside the
/// same rate on the clean reference renders.
#[derive(Debug, Clone)]
pub struct AttackSuccessMeter {
    target: usize,
    hits: usize,
    clean_hits: usize,
    count: usize,
}

impl AttackSuccessMeter {
    /// Meter for class `target`.
    pub fn new(target: usize) -> Self {
        Self {
            target,
            hits: 0,
            clean_hits: 0,
            count: 0,
        }
    }

    /// Target hit rate on the clean renders.
    pub fn clean_rate(&self) -> Option<f32> {
        (self.count > 0).then(|| self.clean_hits as f32 / self.count as f32)
    }
}

impl Meter for AttackSuccessMeter {
    fn name(&self) -> &'static str {
        "AttackSuccess"
    }

    fn update(&mut self, sample: &EvalSample<'_>) {
        if let Some(attacked) = sample.attacked_class {
            self.count += 1;
            self.hits += usize::from(attacked == self.target);
            self.clean_hits += usize::from(sample.clean_class == Some(self.target));
        }
    }

    fn value(&self) -> Option<f32> {
        (self.count > 0).then(|| self.hits as f32 / self.count as f32)
    }

    fn clear(&mut self) {
        self.hits = 0;
        self.clean_hits = 0;
        self.count = 0;
    }

    fn report(&self) -> String {
        match (self.value(), self.clean_rate()) {
            (Some(v), Some(c)) => format!("{} = {:.4} (clean {:.4})", self.name(), v, c),
            _ => format!("{} = n/a", self.name()),
        }
    }
}

/// Metrics of one training step.
#[derive(Debug, Clone, Default)]
pub struct TrainMetrics {
    /// Global step.
    pub step: usize,
    /// Learning rate used.
    pub learning_rate: f64,
    /// Per-term losses.
    pub loss: LossBreakdown,
    /// Rays in the batch.
    pub num_rays: usize,
    /// Real samples marched.
    pub num_samples: usize,
}

impl TrainMetrics {
    /// Log at info level.
    pub fn log(&self, prefix: &str) {
        log::info!(
            "{} step={} {} lr={:.2e} rays={} samples={}",
            prefix,
            self.step,
            self.loss,
            self.learning_rate,
            self.num_rays,
            self.num_samples,
        );
    }
}

/// Running average of the total loss over a window of steps.
#[derive(Debug, Clone)]
pub struct MetricsTracker {
    window_size: usize,
    losses: Vec<f32>,
    total_steps: usize,
}

impl MetricsTracker {
    /// Tracker averaging the last `window_size` steps.
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size: window_size.max(1),
            losses: Vec::with_capacity(window_size),
            total_steps: 0,
        }
    }

    /// Add a step.
    pub fn add(&mut self, metrics: &TrainMetrics) {
        if self.losses.len() >= self.window_size {
            self.losses.remove(0);
        }
        self.losses.push(metrics.loss.total);
        self.total_steps += 1;
    }

    /// Mean total loss over the window.
    pub fn average_loss(&self) -> f32 {
        if self.losses.is_empty() {
            0.0
        } else {
            self.losses.iter().sum::<f32>() / self.losses.len() as f32
        }
    }

    /// Steps seen.
    pub fn total_steps(&self) -> usize {
        self.total_steps
    }
}
