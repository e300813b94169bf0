//! Operator error reporting.
//!
//! The balancer's only runtime failure signal is a worker response whose
//! `msg` field is not the OK value. Policy: report the device to a sink,
//! keep the round going, and still consume the measurement. Sinks exist so
//! embedders can route the report (and tests can capture it) without the
//! engine growing a logging dependency.

use std::sync::Mutex;

/// Destination for device-failure reports.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; reports can be emitted while
/// worker threads are live.
pub trait ErrorSink: Send + Sync + 'static {
    /// Called once per failed response, identifying the device.
    fn device_failed(&self, device_index: usize);
}

/// Default sink: one line on stderr naming the device.
#[derive(Debug, Default)]
pub struct StderrSink;

impl ErrorSink for StderrSink {
    fn device_failed(&self, device_index: usize) {
        eprintln!("balancer: device {device_index} reported a failed response");
    }
}

/// Sink that discards all reports.
#[derive(Debug, Default)]
pub struct NullSink;

impl ErrorSink for NullSink {
    fn device_failed(&self, _device_index: usize) {}
}

/// Sink that records reported device indices, for tests.
#[derive(Debug, Default)]
pub struct VecSink {
    reports: Mutex<Vec<usize>>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the device indices reported so far, in report order.
    pub fn reports(&self) -> Vec<usize> {
        self.reports.lock().expect("VecSink lock poisoned").clone()
    }
}

impl ErrorSink for VecSink {
    fn device_failed(&self, device_index: usize) {
        self.reports
            .lock()
            .expect("VecSink lock poisoned")
            .push(device_index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn vec_sink_records_in_order() {
        let sink = VecSink::new();
        sink.device_failed(2);
        sink.device_failed(0);
        sink.device_failed(2);
        assert_eq!(sink.reports(), vec![2, 0, 2]);
    }

    #[test]
    fn sinks_are_object_safe() {
        let sinks: Vec<Box<dyn ErrorSink>> = vec![
            Box::new(StderrSink),
            Box::new(NullSink),
            Box::new(VecSink::new()),
        ];
        // NullSink swallows; the others are exercised elsewhere.
        sinks[1].device_failed(9);
    }

    #[test]
    fn vec_sink_shared_across_threads() {
        let sink = Arc::new(VecSink::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let sink = Arc::clone(&sink);
                std::thread::spawn(move || sink.device_failed(i))
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let mut reports = sink.reports();
        reports.sort_unstable();
        assert_eq!(reports, vec![0, 1, 2, 3]);
    }
}
