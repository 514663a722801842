use std::time::{Duration, Instant};
use tracing::info;

/// Wall-clock timer that logs how long a command took when dropped.
pub struct Timer {
    label: String,
    start: Instant,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        let label = label.into();
        info!("Starting: {}", label);
        Self {
            label,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        info!("Finished: {} (took {:.2?})", self.label, self.elapsed());
    }
}

/// Thousands separators for console output.
pub fn fmt_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, ch) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(ch);
    }
    result.chars().rev().collect()
}

pub fn fmt_opt_number(n: Option<u64>) -> String {
    n.map(fmt_number).unwrap_or_else(|| "N/A".into())
}

pub fn fmt_opt_float(v: Option<f64>, decimals: usize) -> String {
    v.map(|v| format!("{:.*}", decimals, v)).unwrap_or_else(|| "N/A".into())
}
