//! Per-node processing counters.

use std::time::Duration;

/// Weight given to the newest sample in the scaling-time average.
const EMA_ALPHA: f64 = 0.1;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConverterStats {
    pub frames_converted: u64,
    pub frames_forwarded: u64,
    pub frames_dropped:   u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScalerStats {
    pub frames_processed:   u64,
    pub frames_forwarded:   u64,
    pub frames_dropped:     u64,
    /// Exponential moving average of the per-frame scaling time.
    pub avg_scale_time_us:  f64,
    pub input_width:        u32,
    pub input_height:       u32,
    pub output_width:       u32,
    pub output_height:      u32,
}

impl ScalerStats {
    /// Account one scaled frame. The average starts at the first sample.
    pub fn record_scaled(&mut self, input: (u32, u32), output: (u32, u32), elapsed: Duration) {
        let sample = elapsed.as_secs_f64() * 1_000_000.0;
        self.avg_scale_time_us = if self.frames_processed == 0 {
            sample
        } else {
            (1.0 - EMA_ALPHA) * self.avg_scale_time_us + EMA_ALPHA * sample
        };
        self.frames_processed += 1;
        (self.input_width, self.input_height) = input;
        (self.output_width, self.output_height) = output;
    }
}
