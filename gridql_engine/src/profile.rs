use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Profiler collects a sequence of timing records over the course of one
/// query execution. Append-only; the lock is held only to push a record.
#[derive(Debug, Default)]
pub struct Profiler {
    profiles: Mutex<Vec<Profile>>,
}

/// One timed region.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    name: String,
    start: DateTime<Utc>,
    finish: DateTime<Utc>,
}

impl Profile {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn finish(&self) -> DateTime<Utc> {
        self.finish
    }

    pub fn duration(&self) -> Duration {
        self.finish - self.start
    }
}

impl Profiler {
    pub fn new() -> Self {
        Profiler::default()
    }

    /// Starts timing a region; the returned guard records the profile when
    /// dropped.
    pub fn record(&self, name: impl Into<String>) -> ProfileGuard<'_> {
        ProfileGuard {
            profiler: self,
            name: name.into(),
            start: Utc::now(),
        }
    }

    /// All profiles recorded so far.
    pub fn all(&self) -> Vec<Profile> {
        match self.profiles.lock() {
            Ok(profiles) => profiles.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Drains the recorded profiles.
    pub fn flush(&self) -> Vec<Profile> {
        match self.profiles.lock() {
            Ok(mut profiles) => std::mem::take(&mut *profiles),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    fn push(&self, profile: Profile) {
        match self.profiles.lock() {
            Ok(mut profiles) => profiles.push(profile),
            Err(poisoned) => poisoned.into_inner().push(profile),
        }
    }
}

pub struct ProfileGuard<'a> {
    profiler: &'a Profiler,
    name: String,
    start: DateTime<Utc>,
}

impl Drop for ProfileGuard<'_> {
    fn drop(&mut self) {
        self.profiler.push(Profile {
            name: std::mem::take(&mut self.name),
            start: self.start,
            finish: Utc::now(),
        });
    }
}
