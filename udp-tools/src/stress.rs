use crate::message::{self, StressMessage};
use crate::sender::Sender;
use log::warn;
use std::fmt;
use std::io::Write;
use std::thread;
use std::time::Duration;

const PROGRESS_EVERY: usize = 100;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StressReport {
    pub success: usize,
    pub failed: usize,
}

impl StressReport {
    pub fn total(&self) -> usize {
        self.success + self.failed
    }

    /// Percentage of successful sends; 0 when nothing was sent.
    pub fn success_rate(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.success as f64 / total as f64 * 100.0,
        }
    }
}

impl fmt::Display for StressReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Results ===")?;
        writeln!(f, "Success: {}", self.success)?;
        writeln!(f, "Failed: {}", self.failed)?;
        write!(f, "Success rate: {:.2}%", self.success_rate())
    }
}

/// Sends `count` sequenced datagrams, writing progress and the report to `out`.
pub fn run(
    sender: &Sender,
    count: usize,
    interval: Duration,
    out: &mut impl Write,
) -> anyhow::Result<StressReport> {
    writeln!(out)?;
    writeln!(out, "=== Stress Test ===")?;
    writeln!(out, "Sending {} messages to {}", count, sender.target())?;
    writeln!(out, "Interval: {}s", interval.as_secs_f64())?;
    writeln!(out)?;

    let mut report = StressReport::default();
    for seq in 0..count {
        let result = message::to_wire(&StressMessage::new(seq))
            .map_err(anyhow::Error::from)
            .and_then(|data| sender.send_bytes(&data));
        match result {
            Ok(_) => {
                report.success += 1;
                if (seq + 1) % PROGRESS_EVERY == 0 {
                    writeln!(out, "Sent {}/{} messages...", seq + 1, count)?;
                }
            }
            Err(e) => {
                report.failed += 1;
                warn!("Failed to send message {}: {:#}", seq, e);
                writeln!(out, "✗ Failed to send message {}: {:#}", seq, e)?;
            }
        }

        if !interval.is_zero() {
            thread::sleep(interval);
        }
    }

    writeln!(out)?;
    writeln!(out, "{}", report)?;
    Ok(report)
}
