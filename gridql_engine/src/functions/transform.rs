use gridql_api::{SeriesList, Timeseries};

use crate::runtime_error::{RuntimeError, RuntimeResult};
use crate::types::QueryValue;

/// A transform takes one series' values, the extra call parameters, and the
/// query scale (resolution expressed in seconds), and produces new values.
pub trait Transform: Fn(&[f64], &[QueryValue], f64) -> RuntimeResult<Vec<f64>> + Send + Sync {}

impl<T> Transform for T where
    T: Fn(&[f64], &[QueryValue], f64) -> RuntimeResult<Vec<f64>> + Send + Sync
{
}

/// Applies the transform to every series in the list. The tag sets and the
/// timerange pass through untouched.
pub fn apply_transform(
    list: &SeriesList,
    transform: &dyn Transform,
    parameters: &[QueryValue],
) -> RuntimeResult<SeriesList> {
    let scale = list.timerange.resolution() as f64 / 1000.0;
    let mut series = Vec::with_capacity(list.series.len());
    for member in &list.series {
        let values = transform(&member.values, parameters, scale)?;
        series.push(Timeseries::new(values, member.tag_set.clone()));
    }
    Ok(SeriesList {
        series,
        timerange: list.timerange,
        name: list.name.clone(),
    })
}

/// Estimates the change per second between consecutive samples. The first
/// slot is 0. NaN operands propagate.
pub fn derivative(values: &[f64], _parameters: &[QueryValue], scale: f64) -> RuntimeResult<Vec<f64>> {
    let mut result = vec![0.0; values.len()];
    for i in 1..values.len() {
        result[i] = (values[i] - values[i - 1]) / scale;
    }
    Ok(result)
}

/// Like `derivative`, but negative slopes clamp to 0. NaN stays NaN.
pub fn rate(values: &[f64], parameters: &[QueryValue], scale: f64) -> RuntimeResult<Vec<f64>> {
    let mut result = derivative(values, parameters, scale)?;
    for value in result.iter_mut() {
        // NaN fails the comparison and survives the clamp
        if *value < 0.0 {
            *value = 0.0;
        }
    }
    Ok(result)
}

/// Integrates a series of per-second rates into a running total. NaN
/// contributes 0 but does not break the running sum; the output is never
/// NaN.
pub fn integral(values: &[f64], _parameters: &[QueryValue], scale: f64) -> RuntimeResult<Vec<f64>> {
    let mut result = Vec::with_capacity(values.len());
    let mut running = 0.0;
    for value in values {
        if !value.is_nan() {
            running += value;
        }
        result.push(running * scale);
    }
    Ok(result)
}

/// Running sum of per-interval samples; `integral` without the scale.
pub fn cumulative(values: &[f64], _parameters: &[QueryValue], _scale: f64) -> RuntimeResult<Vec<f64>> {
    let mut result = Vec::with_capacity(values.len());
    let mut running = 0.0;
    for value in values {
        if !value.is_nan() {
            running += value;
        }
        result.push(running);
    }
    Ok(result)
}

/// Replaces missing data with the default supplied as the first parameter.
pub fn default_value(
    values: &[f64],
    parameters: &[QueryValue],
    _scale: f64,
) -> RuntimeResult<Vec<f64>> {
    let default = parameters
        .first()
        .ok_or_else(|| {
            RuntimeError::ArgumentError("transform.default requires a default value".to_string())
        })?
        .to_scalar()?;
    Ok(values
        .iter()
        .map(|v| if v.is_nan() { default } else { *v })
        .collect())
}

/// Replaces missing data with the last value seen before it. Leading NaN
/// stays NaN.
pub fn nan_keep_last(
    values: &[f64],
    _parameters: &[QueryValue],
    _scale: f64,
) -> RuntimeResult<Vec<f64>> {
    let mut result = Vec::with_capacity(values.len());
    for (i, value) in values.iter().enumerate() {
        if value.is_nan() && i > 0 {
            result.push(result[i - 1]);
        } else {
            result.push(*value);
        }
    }
    Ok(result)
}

/// Lifts a plain elementwise function into a transform. NaN goes through
/// the function like any other input.
pub fn map_maker(fun: fn(f64) -> f64) -> impl Transform {
    move |values: &[f64], _parameters: &[QueryValue], _scale: f64| {
        Ok(values.iter().map(|v| fun(*v)).collect())
    }
}
