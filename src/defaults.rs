//! Process-wide form defaults shared between configuration entries.
//!
//! Only `min_time_between_requests` lives here. It is unset until the first
//! entry is created, overwritten by every create or reconfigure, and read by
//! later flow steps to pre-fill their input.

use std::sync::{Arc, RwLock};

pub const DEFAULT_MIN_TIME_BETWEEN_REQUESTS: f64 = 1.0;

#[derive(Debug, Clone, Default)]
pub struct DefaultsStore {
    min_time_between_requests: Arc<RwLock<Option<f64>>>,
}

impl DefaultsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_time_between_requests(&self) -> f64 {
        self.min_time_between_requests
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .unwrap_or(DEFAULT_MIN_TIME_BETWEEN_REQUESTS)
    }

    pub fn set_min_time_between_requests(&self, minutes: f64) {
        *self
            .min_time_between_requests
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(minutes);
    }

    pub fn is_initialized(&self) -> bool {
        self.min_time_between_requests
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }
}
