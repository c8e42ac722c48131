use ahash::AHashMap;

use gridql_api::{SeriesList, TagSet, Timeseries};

/// A reducer collapses the values one slot holds across a group into a
/// single number. Every reducer drops NaN from its input first.
pub type Reducer = fn(&[f64]) -> f64;

/// Sum of the non-NaN values; 0 on an empty (or all-NaN) slot.
pub fn sum(values: &[f64]) -> f64 {
    values.iter().filter(|v| !v.is_nan()).sum()
}

/// Arithmetic mean of the non-NaN values; NaN when none remain.
pub fn mean(values: &[f64]) -> f64 {
    let kept: Vec<f64> = filter_nan(values);
    if kept.is_empty() {
        return f64::NAN;
    }
    kept.iter().sum::<f64>() / kept.len() as f64
}

/// Minimum of the non-NaN values; NaN when none remain.
pub fn min(values: &[f64]) -> f64 {
    filter_nan(values)
        .into_iter()
        .fold(f64::NAN, |acc, v| if acc.is_nan() { v } else { acc.min(v) })
}

/// Maximum of the non-NaN values; NaN when none remain.
pub fn max(values: &[f64]) -> f64 {
    filter_nan(values)
        .into_iter()
        .fold(f64::NAN, |acc, v| if acc.is_nan() { v } else { acc.max(v) })
}

fn filter_nan(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| !v.is_nan()).collect()
}

/// One partition of a series list: the members plus the representative tag
/// set (the projection every member shares).
#[derive(Debug)]
pub struct Group<'a> {
    pub tag_set: TagSet,
    pub members: Vec<&'a Timeseries>,
}

/// Partitions the list by the projection of each tag set onto `tags`; an
/// absent tag projects to the empty string. Group order follows the first
/// encounter of each representative.
pub fn group_by<'a>(list: &'a SeriesList, tags: &[String]) -> Vec<Group<'a>> {
    let mut groups: Vec<Group<'a>> = Vec::new();
    let mut index: AHashMap<TagSet, usize> = AHashMap::new();

    for series in &list.series {
        let representative = series.tag_set.project(tags);
        match index.get(&representative) {
            Some(&at) => groups[at].members.push(series),
            None => {
                index.insert(representative.clone(), groups.len());
                groups.push(Group {
                    tag_set: representative,
                    members: vec![series],
                });
            }
        }
    }

    groups
}

/// Groups the list by `tags`, then reduces each group slot-wise into a
/// single series tagged with the group representative. All members share
/// the list's timerange, so slot counts line up by construction.
pub fn aggregate_by(list: &SeriesList, reducer: Reducer, tags: &[String]) -> SeriesList {
    let groups = group_by(list, tags);
    let slots = list.timerange.slots();

    let series = groups
        .into_iter()
        .map(|group| {
            let mut values = Vec::with_capacity(slots);
            let mut slice = Vec::with_capacity(group.members.len());
            for slot in 0..slots {
                slice.clear();
                slice.extend(group.members.iter().map(|member| member.values[slot]));
                values.push(reducer(&slice));
            }
            Timeseries::new(values, group.tag_set)
        })
        .collect();

    SeriesList {
        series,
        timerange: list.timerange,
        name: list.name.clone(),
    }
}
