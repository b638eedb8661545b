use hifitime::prelude::{Duration, Epoch};

/// Streaming statistics of one session
#[derive(Debug, Clone, Copy)]
pub struct Runtime {
    /// Latest [Epoch]
    pub epoch: Epoch,

    /// Epoch of deployment
    deploy_time: Epoch,

    /// Uptime as [Duration]
    pub uptime: Duration,

    /// Number of correction chunks received
    pub chunks: u64,

    /// Number of correction bytes received
    pub bytes: u64,
}

impl Runtime {
    pub fn new(epoch: Epoch) -> Self {
        Self {
            epoch,
            deploy_time: epoch,
            uptime: Duration::ZERO,
            chunks: 0,
            bytes: 0,
        }
    }

    /// Update latest epoch
    pub fn new_epoch(&mut self, epoch: Epoch) {
        self.epoch = epoch;
        self.uptime = epoch - self.deploy_time;
    }

    /// Latch a new correction chunk of `size` bytes, received at `epoch`.
    pub fn new_correction(&mut self, epoch: Epoch, size: usize) {
        self.new_epoch(epoch);
        self.chunks += 1;
        self.bytes += size as u64;
    }

    /// Average correction throughput (bytes/s) since deployment
    pub fn throughput(&self) -> f64 {
        let seconds = self.uptime.to_seconds();
        if seconds > 0.0 {
            self.bytes as f64 / seconds
        } else {
            0.0
        }
    }
}

impl std::fmt::Display for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "uptime={} chunks={} bytes={} ({:.1} B/s)",
            self.uptime,
            self.chunks,
            self.bytes,
            self.throughput()
        )
    }
}

#[cfg(test)]
mod test {
    use super::Runtime;
    use hifitime::prelude::{Duration, Epoch};
    use std::str::FromStr;

    #[test]
    fn statistics() {
        let t0 = Epoch::from_str("2025-01-01T00:00:00 UTC").unwrap();
        let mut runtime = Runtime::new(t0);

        assert_eq!(runtime.throughput(), 0.0);

        runtime.new_correction(t0 + Duration::from_seconds(1.0), 100);
        runtime.new_correction(t0 + Duration::from_seconds(2.0), 300);

        assert_eq!(runtime.chunks, 2);
        assert_eq!(runtime.bytes, 400);
        assert_eq!(runtime.uptime, Duration::from_seconds(2.0));
        assert_eq!(runtime.throughput(), 200.0);
    }
}
