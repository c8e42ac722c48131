use gridql_api::{SeriesList, Timeseries};

use crate::runtime_error::{RuntimeError, RuntimeResult};

/// Elementwise binary operation over two series lists, matching series by
/// their tag-set intersection: every pair that agrees on all shared keys
/// produces one output series tagged with the union of both tag sets.
/// Non-compatible pairs produce nothing. Output order carries no meaning.
pub fn join(
    left: &SeriesList,
    right: &SeriesList,
    op: impl Fn(f64, f64) -> f64,
) -> RuntimeResult<SeriesList> {
    if left.timerange != right.timerange {
        return Err(RuntimeError::ArgumentError(format!(
            "cannot join series lists over different timeranges ({:?} vs {:?})",
            left.timerange, right.timerange
        )));
    }

    let mut series = Vec::new();
    for l in &left.series {
        for r in &right.series {
            if !l.tag_set.join_compatible(&r.tag_set) {
                continue;
            }
            let values = l
                .values
                .iter()
                .zip(r.values.iter())
                .map(|(a, b)| op(*a, *b))
                .collect();
            series.push(Timeseries::new(values, l.tag_set.union(&r.tag_set)));
        }
    }

    Ok(SeriesList::new(series, left.timerange))
}
