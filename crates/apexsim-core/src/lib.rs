//! # apexsim Core Library
//!
//! Core functionality for the apexsim driving sandbox.

#![warn(missing_docs)]

//!
//! This library provides:
//! - A deterministic per-tick vehicle dynamics model (slip, load
//!   transfer, friction-ellipse tire saturation, gear/engine behavior)
//! - Scripted straight-line performance measurement (0–100 km/h time,
//!   top speed)
//! - An automatic calibration controller that tunes drag, rolling
//!   resistance, and drivetrain efficiency against published figures
//! - Versioned persistence of calibration outcomes
//!
//! ## Example
//!
//! ```rust,ignore
//! use apexsim_core::prelude::*;
//!
//! let spec: CarSpec = serde_json::from_str(catalog_entry)?;
//! let mut service = CalibrationService::new(
//!     MemoryStore::new(),
//!     SystemClock::new(),
//!     CalibrationOptions::default(),
//! );
//! let record = service.calibrate(&mut spec)?;
//!
//! let config = CarConfig::builder()
//!     .apply_spec(&spec)
//!     .apply_overrides(&record.overrides)
//!     .build();
//! let mut vehicle = VehicleModel::new(config);
//! vehicle.step(1.0, 0.0, 0.0, 1.0 / 60.0);
//! ```

pub mod calibration;
pub mod clock;
pub mod collision;
pub mod config;
pub mod measure;
pub mod powertrain;
pub mod units;
pub mod vehicle;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::calibration::service::{BatchReport, CalibrationService};
    pub use crate::calibration::{
        extract_targets, run_calibration, CalibrationOptions, CalibrationOverrides,
        CalibrationRecord, CalibrationStore, FileStore, KeyValueStore, MeasuredMetrics,
        MemoryStore, PerformanceTarget, StoreError, CALIBRATION_SCHEMA_VERSION,
    };
    pub use crate::clock::{Clock, Deadline, ManualClock, SystemClock};
    pub use crate::config::{CarConfig, CarConfigBuilder, CarSpec, DriveType, PerformanceFigures};
    pub use crate::measure::{
        measure_top_speed, measure_zero_to_hundred, Sample, TopSpeed, ZeroToHundred,
    };
    pub use crate::vehicle::{TireForces, Vec2, VehicleModel, VehicleState};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
