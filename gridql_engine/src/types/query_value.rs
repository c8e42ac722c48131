use serde::Serialize;

use gridql_api::{SeriesList, TagSet, Timerange, Timeseries};

use crate::runtime_error::{RuntimeError, RuntimeResult};

/// QueryValue is the typed lattice the evaluator operates over. Extend by
/// adding a variant; coercions stay total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum QueryValue {
    Scalar(f64),
    /// A duration in milliseconds.
    Duration(i64),
    String(String),
    SeriesList(SeriesList),
}

impl QueryValue {
    pub fn nan() -> Self {
        QueryValue::Scalar(f64::NAN)
    }

    pub fn data_type_name(&self) -> &'static str {
        match self {
            QueryValue::Scalar(_) => "scalar",
            QueryValue::Duration(_) => "duration",
            QueryValue::String(_) => "string",
            QueryValue::SeriesList(_) => "series list",
        }
    }

    pub fn to_scalar(&self) -> RuntimeResult<f64> {
        match self {
            QueryValue::Scalar(value) => Ok(*value),
            other => Err(RuntimeError::TypeCastError(format!(
                "cannot convert {} to a scalar",
                other.data_type_name()
            ))),
        }
    }

    /// Duration in milliseconds.
    pub fn to_duration(&self) -> RuntimeResult<i64> {
        match self {
            QueryValue::Duration(millis) => Ok(*millis),
            other => Err(RuntimeError::TypeCastError(format!(
                "cannot convert {} to a duration",
                other.data_type_name()
            ))),
        }
    }

    pub fn to_string_value(&self) -> RuntimeResult<String> {
        match self {
            QueryValue::String(value) => Ok(value.clone()),
            other => Err(RuntimeError::TypeCastError(format!(
                "cannot convert {} to a string",
                other.data_type_name()
            ))),
        }
    }

    /// Coerces into a series list on the given grid. A scalar becomes one
    /// constant series with an empty tag set; a series list passes through
    /// when its resolution is compatible.
    pub fn into_series_list(self, timerange: &Timerange) -> RuntimeResult<SeriesList> {
        match self {
            QueryValue::Scalar(value) => {
                let series = Timeseries::new(vec![value; timerange.slots()], TagSet::new());
                Ok(SeriesList::new(vec![series], *timerange).with_name(format_scalar(value)))
            }
            QueryValue::SeriesList(list) => {
                if !list.timerange.compatible_with(timerange) {
                    return Err(RuntimeError::TypeCastError(format!(
                        "series list at resolution {} is incompatible with the query resolution {}",
                        list.timerange.resolution(),
                        timerange.resolution()
                    )));
                }
                Ok(list)
            }
            other => Err(RuntimeError::TypeCastError(format!(
                "cannot convert {} to a series list",
                other.data_type_name()
            ))),
        }
    }
}

fn format_scalar(value: f64) -> String {
    if value == value.trunc() && value.is_finite() {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}
