//! Per-series locks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use hubhist_domain::error::HistoryError;
use hubhist_domain::observation::SeriesKey;

/// Registry of one timed mutex per series. Different series never share a
/// lock; the registry mutex is only held while looking one up.
#[derive(Debug, Default)]
pub struct SeriesLocks {
    locks: Mutex<HashMap<SeriesKey, Arc<Mutex<()>>>>,
}

impl SeriesLocks {
    fn lock_for(&self, series: &SeriesKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(series.clone()).or_default())
    }

    /// Run `operation` while holding the lock of `series`.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::SeriesLockTimeout`] if the lock is not
    /// acquired within `timeout`, otherwise whatever `operation` returns.
    pub fn with_series<T>(
        &self,
        series: &SeriesKey,
        timeout: Duration,
        operation: impl FnOnce() -> Result<T, HistoryError>,
    ) -> Result<T, HistoryError> {
        let lock = self.lock_for(series);
        let Some(_guard) = lock.try_lock_for(timeout) else {
            tracing::warn!(%series, ?timeout, "timed out waiting for series lock");
            return Err(HistoryError::SeriesLockTimeout {
                series: series.to_string(),
            });
        };
        operation()
    }

    /// Drop the registry entry of `series` unless someone holds or awaits it.
    pub fn release(&self, series: &SeriesKey) {
        let mut locks = self.locks.lock();
        if locks
            .get(series)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(series);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(status: &str) -> SeriesKey {
        SeriesKey::new("lamp", status).unwrap()
    }

    #[test]
    fn should_time_out_while_series_is_held() {
        let locks = SeriesLocks::default();

        let result = locks.with_series(&key("power"), Duration::from_secs(1), || {
            locks.with_series(&key("power"), Duration::from_millis(10), || Ok(()))
        });

        assert!(matches!(
            result,
            Err(HistoryError::SeriesLockTimeout { series }) if series == "lamp.power"
        ));
    }

    #[test]
    fn should_not_block_other_series() {
        let locks = SeriesLocks::default();

        let result = locks.with_series(&key("power"), Duration::from_secs(1), || {
            locks.with_series(&key("brightness"), Duration::from_millis(10), || Ok(42))
        });

        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn should_release_idle_series_only() {
        let locks = SeriesLocks::default();
        locks
            .with_series(&key("power"), Duration::from_secs(1), || Ok(()))
            .unwrap();

        locks
            .with_series(&key("brightness"), Duration::from_secs(1), || {
                locks.release(&key("brightness"));
                Ok(())
            })
            .unwrap();
        assert_eq!(locks.len(), 2);

        locks.release(&key("power"));
        locks.release(&key("brightness"));
        assert_eq!(locks.len(), 0);
    }

    #[test]
    fn should_serialize_threads_on_the_same_series() {
        let locks = Arc::new(SeriesLocks::default());
        let counter = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let locks = Arc::clone(&locks);
                let counter = Arc::clone(&counter);
                std::thread::spawn(move || {
                    locks
                        .with_series(&key("power"), Duration::from_secs(5), || {
                            counter.lock().push(worker);
                            std::thread::sleep(Duration::from_millis(5));
                            counter.lock().push(worker);
                            Ok(())
                        })
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let order = counter.lock();
        assert_eq!(order.len(), 8);
        for pair in order.chunks(2) {
            assert_eq!(pair[0], pair[1]);
        }
    }
}
