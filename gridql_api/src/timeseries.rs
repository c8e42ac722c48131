use serde::{Deserialize, Serialize};

use crate::tagset::TagSet;
use crate::timerange::Timerange;

/// SampleMethod selects the reducer used to collapse a bucket of raw backend
/// points into one value.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleMethod {
    #[default]
    Mean,
    Min,
    Max,
}

/// Timeseries is one aligned float vector plus the tag set identifying it.
/// Missing samples are NaN.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeseries {
    pub values: Vec<f64>,
    pub tag_set: TagSet,
}

impl Timeseries {
    pub fn new(values: Vec<f64>, tag_set: TagSet) -> Self {
        Timeseries { values, tag_set }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_all_nan(&self) -> bool {
        self.values.iter().all(|v| v.is_nan())
    }
}

/// SeriesList is a vector of series over a shared timerange. Every member
/// has exactly `timerange.slots()` values; the order of members carries no
/// meaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesList {
    pub series: Vec<Timeseries>,
    pub timerange: Timerange,
    pub name: String,
}

impl SeriesList {
    pub fn new(series: Vec<Timeseries>, timerange: Timerange) -> Self {
        SeriesList {
            series,
            timerange,
            name: String::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}
