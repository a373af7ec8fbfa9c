//! Out-of-band fault collection for background services

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

/// A failure raised while a background service handled a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerFault {
    pub summary: String,
    pub context: Vec<String>,
}

impl ServerFault {
    pub fn new(summary: impl Into<String>, context: Vec<String>) -> Self {
        Self {
            summary: summary.into(),
            context,
        }
    }
}

/// Shared, append-only fault list.
///
/// Clones share the same storage; any task or thread may record into it.
#[derive(Debug, Clone, Default)]
pub struct FaultLog {
    faults: Arc<Mutex<Vec<ServerFault>>>,
}

impl FaultLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, fault: ServerFault) {
        self.faults.lock().push(fault);
    }

    pub fn len(&self) -> usize {
        self.faults.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.faults.lock().is_empty()
    }

    /// Take every fault recorded so far
    pub fn drain(&self) -> Vec<ServerFault> {
        std::mem::take(&mut *self.faults.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concurrent_records_are_all_kept() {
        let log = FaultLog::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for j in 0..50 {
                        log.record(ServerFault::new(format!("{i}/{j}"), vec![]));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(log.len(), 400);
        assert_eq!(log.drain().len(), 400);
        assert!(log.is_empty());
    }
}
