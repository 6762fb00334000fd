use std::f32::consts::{FRAC_1_SQRT_2, PI};

/// Second-order lowpass (12 dB/octave), Direct Form I, RBJ cookbook coefficients.
#[derive(Clone, Copy, Debug)]
pub struct LowpassBiquad {
    sample_rate: f32,
    cutoff: f32,
    q: f32,
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32, // a0 is normalized to 1
    a2: f32,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl LowpassBiquad {
    pub fn new(sample_rate: f32, cutoff: f32) -> Self {
        let mut filter = Self {
            sample_rate: sample_rate.max(1.0),
            cutoff: 0.0,
            q: FRAC_1_SQRT_2,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        };
        filter.set_cutoff(cutoff);
        filter
    }

    pub fn cutoff(&self) -> f32 {
        self.cutoff
    }

    pub fn set_cutoff(&mut self, cutoff: f32) {
        self.cutoff = cutoff.clamp(10.0, self.sample_rate * 0.499);
        self.update_coefficients();
    }

    fn update_coefficients(&mut self) {
        let omega = 2.0 * PI * self.cutoff / self.sample_rate;
        let sn = omega.sin();
        let cs = omega.cos();
        let alpha = sn / (2.0 * self.q);

        let a0 = 1.0 + alpha;
        self.b0 = ((1.0 - cs) / 2.0) / a0;
        self.b1 = (1.0 - cs) / a0;
        self.b2 = ((1.0 - cs) / 2.0) / a0;
        self.a1 = (-2.0 * cs) / a0;
        self.a2 = (1.0 - alpha) / a0;
    }

    #[inline(always)]
    pub fn process(&mut self, input: f32) -> f32 {
        let output = self.b0 * input + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;

        // Flush denormals
        if output.abs() < 1e-18 {
            0.0
        } else {
            output
        }
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

/// A left/right pair sharing one cutoff.
#[derive(Clone, Copy, Debug)]
pub struct StereoLowpass {
    left: LowpassBiquad,
    right: LowpassBiquad,
}

impl StereoLowpass {
    pub fn new(sample_rate: f32, cutoff: f32) -> Self {
        let filter = LowpassBiquad::new(sample_rate, cutoff);
        Self {
            left: filter,
            right: filter,
        }
    }

    pub fn cutoff(&self) -> f32 {
        self.left.cutoff()
    }

    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        (self.left.process(left), self.right.process(right))
    }
}
