//! Calibration Service
//!
//! Explicit batch driver with injected store and clock dependencies,
//! no process-wide singleton. Vehicles are processed sequentially in
//! catalog order; a usable stored record skips simulation entirely,
//! and per-vehicle failures never abort the batch.

use tracing::{debug, info, warn};

use super::store::{CalibrationStore, KeyValueStore, StoreError};
use super::{run_calibration, CalibrationOptions, CalibrationRecord};
use crate::clock::Clock;
use crate::config::CarSpec;

/// Summary of one batch pass over a vehicle catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Vehicles that ran a fresh calibration
    pub calibrated: u32,
    /// Vehicles skipped on a usable stored record
    pub cache_hits: u32,
    /// Vehicles whose record could not be persisted
    pub failures: u32,
}

/// Owns a calibration store and clock and calibrates vehicles on demand.
#[derive(Debug)]
pub struct CalibrationService<S: KeyValueStore, C: Clock> {
    store: CalibrationStore<S>,
    clock: C,
    options: CalibrationOptions,
    ticks_simulated: u64,
}

impl<S: KeyValueStore, C: Clock> CalibrationService<S, C> {
    /// Build a service over a backend and clock.
    pub fn new(backend: S, clock: C, options: CalibrationOptions) -> Self {
        Self {
            store: CalibrationStore::new(backend),
            clock,
            options,
            ticks_simulated: 0,
        }
    }

    /// The underlying store, read-only.
    pub fn store(&self) -> &CalibrationStore<S> {
        &self.store
    }

    /// Total simulated measurement ticks across all runs so far.
    pub fn ticks_simulated(&self) -> u64 {
        self.ticks_simulated
    }

    /// Calibrate one vehicle, skipping on a usable stored record.
    ///
    /// On a fresh run the spec's verified flag is updated to match the
    /// record, so a later pass can take the cache path.
    pub fn calibrate(&mut self, spec: &mut CarSpec) -> Result<CalibrationRecord, StoreError> {
        if self.store.is_current(spec) {
            debug!(vehicle = %spec.id, "calibration cache hit");
            // is_current guarantees the record exists.
            if let Some(record) = self.store.get(&spec.id) {
                return Ok(record);
            }
        }

        let run = run_calibration(spec, self.options, &self.clock);
        self.ticks_simulated += run.ticks;
        self.store.put(&spec.id, run.record.clone())?;
        spec.verified = run.record.verified;
        Ok(run.record)
    }

    /// Calibrate a catalog sequentially, in order. Per-vehicle store
    /// failures are logged and counted; the batch continues.
    pub fn calibrate_catalog(&mut self, specs: &mut [CarSpec]) -> BatchReport {
        let mut report = BatchReport::default();
        for spec in specs.iter_mut() {
            if self.store.is_current(spec) {
                debug!(vehicle = %spec.id, "calibration cache hit");
                report.cache_hits += 1;
                continue;
            }
            match self.calibrate(spec) {
                Ok(_) => report.calibrated += 1,
                Err(e) => {
                    warn!(vehicle = %spec.id, "failed to persist calibration: {e}");
                    report.failures += 1;
                }
            }
        }
        info!(
            calibrated = report.calibrated,
            cache_hits = report.cache_hits,
            failures = report.failures,
            "calibration batch finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::store::MemoryStore;
    use crate::clock::ManualClock;

    fn no_target_spec(id: &str) -> CarSpec {
        CarSpec {
            id: id.to_string(),
            ..CarSpec::default()
        }
    }

    #[test]
    fn no_target_specs_calibrate_without_ticks() {
        let mut service = CalibrationService::new(
            MemoryStore::new(),
            ManualClock::new(),
            CalibrationOptions::default(),
        );
        let mut specs = vec![no_target_spec("a"), no_target_spec("b")];
        let report = service.calibrate_catalog(&mut specs);
        assert_eq!(report.calibrated, 2);
        assert_eq!(service.ticks_simulated(), 0);
        assert!(specs.iter().all(|s| s.verified));
    }

    #[test]
    fn second_pass_hits_the_cache() {
        let mut service = CalibrationService::new(
            MemoryStore::new(),
            ManualClock::new(),
            CalibrationOptions::default(),
        );
        let mut specs = vec![no_target_spec("a")];
        service.calibrate_catalog(&mut specs);
        let report = service.calibrate_catalog(&mut specs);
        assert_eq!(report.cache_hits, 1);
        assert_eq!(report.calibrated, 0);
    }

    #[test]
    fn records_are_persisted_per_vehicle() {
        let mut service = CalibrationService::new(
            MemoryStore::new(),
            ManualClock::new(),
            CalibrationOptions::default(),
        );
        let mut spec = no_target_spec("gt-300");
        service.calibrate(&mut spec).unwrap();
        let record = service.store().get("gt-300").unwrap();
        assert!(record.verified);
        assert_eq!(record.iterations, 0);
    }
}
