use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use gridql_api::{GraphiteName, MetricNamer, SampleMethod, Timerange, Timeseries};

use crate::provider::backend::{Backend, BackendError, BackendErrorKind, FetchRequest};
use crate::provider::deadline::Deadline;

const MINUTE_MS: i64 = 60 * 1000;
const DAY_MS: i64 = 24 * 3600 * 1000;

/// The server-side rollup resolutions the store keeps, finest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    Full,
    Min5,
    Min20,
    Min60,
    Min240,
    Min1440,
}

impl Resolution {
    /// The wire form of the resolution query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Full => "FULL",
            Resolution::Min5 => "MIN5",
            Resolution::Min20 => "MIN20",
            Resolution::Min60 => "MIN60",
            Resolution::Min240 => "MIN240",
            Resolution::Min1440 => "MIN1440",
        }
    }
}

/// Days each rollup is retained server-side. A rollup only answers for the
/// window its TTL still covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionTtls {
    pub full_days: i64,
    pub min5_days: i64,
    pub min20_days: i64,
    pub min60_days: i64,
    pub min240_days: i64,
    pub min1440_days: i64,
}

impl Default for ResolutionTtls {
    fn default() -> Self {
        ResolutionTtls {
            full_days: 7,
            min5_days: 30,
            min20_days: 60,
            min60_days: 90,
            min240_days: 180,
            min1440_days: 365,
        }
    }
}

impl ResolutionTtls {
    fn days(&self, resolution: Resolution) -> i64 {
        match resolution {
            Resolution::Full => self.full_days,
            Resolution::Min5 => self.min5_days,
            Resolution::Min20 => self.min20_days,
            Resolution::Min60 => self.min60_days,
            Resolution::Min240 => self.min240_days,
            Resolution::Min1440 => self.min1440_days,
        }
    }
}

/// Step boundaries between one rollup and the next coarser one. A request
/// step below the boundary still fits the finer rollup.
const RESOLUTION_STEPS: [(Resolution, i64); 6] = [
    (Resolution::Full, 5 * MINUTE_MS),
    (Resolution::Min5, 20 * MINUTE_MS),
    (Resolution::Min20, 60 * MINUTE_MS),
    (Resolution::Min60, 240 * MINUTE_MS),
    (Resolution::Min240, 1440 * MINUTE_MS),
    (Resolution::Min1440, i64::MAX),
];

/// Picks the finest rollup whose step fits the requested resolution and
/// whose TTL still covers the start of the window. Falls back to the
/// coarsest rollup.
pub fn choose_resolution(
    requested_step: i64,
    start: i64,
    now: i64,
    ttls: &ResolutionTtls,
) -> Resolution {
    for (resolution, next_step) in RESOLUTION_STEPS {
        if requested_step < next_step && now - start < ttls.days(resolution) * DAY_MS {
            return resolution;
        }
    }
    Resolution::Min1440
}

/// Configuration of the Blueflood-style HTTP backend.
#[derive(Debug, Clone)]
pub struct BluefloodConfig {
    pub base_url: String,
    pub tenant_id: String,
    /// Per-request deadline.
    pub timeout: Duration,
    pub ttls: ResolutionTtls,
}

impl BluefloodConfig {
    pub fn new(base_url: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        BluefloodConfig {
            base_url: base_url.into(),
            tenant_id: tenant_id.into(),
            timeout: Duration::seconds(10),
            ttls: ResolutionTtls::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// The backend's JSON response shape. Extra fields are tolerated, absent
/// ones default.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub values: Vec<MetricPoint>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    #[serde(rename = "numPoints", default)]
    pub num_points: i64,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub average: f64,
    #[serde(default)]
    pub min: f64,
    #[serde(default)]
    pub max: f64,
    #[serde(default)]
    pub variance: f64,
}

impl MetricPoint {
    fn field(&self, sample_method: SampleMethod) -> f64 {
        match sample_method {
            SampleMethod::Mean => self.average,
            SampleMethod::Min => self.min,
            SampleMethod::Max => self.max,
        }
    }
}

/// The `select` query parameter names the rollup field matching the sample
/// method.
pub fn select_field(sample_method: SampleMethod) -> &'static str {
    match sample_method {
        SampleMethod::Mean => "average",
        SampleMethod::Min => "min",
        SampleMethod::Max => "max",
    }
}

/// Blueflood fronts the remote metric store over HTTP, rendering graphite
/// names through the naming rule set.
pub struct Blueflood {
    config: BluefloodConfig,
    namer: Arc<dyn MetricNamer>,
    client: Client,
}

impl Blueflood {
    pub fn new(config: BluefloodConfig, namer: Arc<dyn MetricNamer>) -> Self {
        Blueflood {
            config,
            namer,
            client: Client::new(),
        }
    }

    fn views_url(
        &self,
        name: &GraphiteName,
        timerange: &Timerange,
        resolution: Resolution,
        sample_method: SampleMethod,
    ) -> Result<Url, String> {
        build_views_url(
            &self.config.base_url,
            &self.config.tenant_id,
            name,
            timerange,
            resolution,
            sample_method,
        )
    }
}

pub(crate) fn build_views_url(
    base_url: &str,
    tenant_id: &str,
    name: &GraphiteName,
    timerange: &Timerange,
    resolution: Resolution,
    sample_method: SampleMethod,
) -> Result<Url, String> {
    let mut url = Url::parse(&format!(
        "{}/v2.0/{}/views/{}",
        base_url.trim_end_matches('/'),
        tenant_id,
        name
    ))
    .map_err(|err| err.to_string())?;
    url.query_pairs_mut()
        .append_pair("from", &timerange.start().to_string())
        // one extra step past the end so boundary points survive snapping
        .append_pair("to", &(timerange.end() + timerange.resolution()).to_string())
        .append_pair("resolution", resolution.as_str())
        .append_pair(
            "select",
            &format!("numPoints,{}", select_field(sample_method)),
        );
    Ok(url)
}

/// Places raw backend points into per-slot buckets and reduces each bucket
/// with the sample-method reducer. Empty buckets are NaN; points outside
/// the grid are dropped.
pub(crate) fn bucket_points(
    points: &[MetricPoint],
    sample_method: SampleMethod,
    timerange: &Timerange,
) -> Vec<f64> {
    let slots = timerange.slots();
    let mut buckets: Vec<Vec<f64>> = vec![Vec::new(); slots];
    for point in points {
        let slot = (point.timestamp - timerange.start()).div_euclid(timerange.resolution());
        if slot < 0 || slot >= slots as i64 {
            continue;
        }
        buckets[slot as usize].push(point.field(sample_method));
    }

    buckets
        .into_iter()
        .map(|bucket| reduce_bucket(&bucket, sample_method))
        .collect()
}

fn reduce_bucket(bucket: &[f64], sample_method: SampleMethod) -> f64 {
    let Some(first) = bucket.first() else {
        return f64::NAN;
    };
    match sample_method {
        SampleMethod::Mean => bucket.iter().sum::<f64>() / bucket.len() as f64,
        SampleMethod::Min => bucket.iter().fold(*first, |acc, v| acc.min(*v)),
        SampleMethod::Max => bucket.iter().fold(*first, |acc, v| acc.max(*v)),
    }
}

#[async_trait]
impl Backend for Blueflood {
    async fn fetch_single_series(
        &self,
        request: &FetchRequest,
    ) -> Result<Timeseries, BackendError> {
        let fail = |kind| BackendError::new(request.metric.clone(), kind);

        let name = self
            .namer
            .to_graphite_name(&request.metric)
            .map_err(|err| fail(BackendErrorKind::Naming(err)))?;

        let timerange = request.timerange;
        let resolution = choose_resolution(
            timerange.resolution(),
            timerange.start(),
            Utc::now().timestamp_millis(),
            &self.config.ttls,
        );
        let url = self
            .views_url(&name, &timerange, resolution, request.sample_method)
            .map_err(|err| fail(BackendErrorKind::FetchIo(err)))?;
        let deadline = Deadline::new(self.config.timeout)
            .map_err(|err| fail(BackendErrorKind::FetchIo(err.to_string())))?;

        debug!(url = %url, metric = %request.metric, "blueflood fetch");

        let response = tokio::select! {
            _ = request.cancel.cancelled() => {
                return Err(fail(BackendErrorKind::Cancelled));
            }
            sent = tokio::time::timeout(deadline.remaining(), self.client.get(url).send()) => {
                match sent {
                    Err(_elapsed) => return Err(fail(BackendErrorKind::FetchTimeout)),
                    Ok(Err(err)) if err.is_timeout() => {
                        return Err(fail(BackendErrorKind::FetchTimeout))
                    }
                    Ok(Err(err)) => return Err(fail(BackendErrorKind::FetchIo(err.to_string()))),
                    Ok(Ok(response)) => response,
                }
            }
        };

        // poll again at the stream boundary before reading the body
        if request.cancel.is_cancelled() {
            return Err(fail(BackendErrorKind::Cancelled));
        }

        let payload: QueryResponse = tokio::select! {
            _ = request.cancel.cancelled() => {
                return Err(fail(BackendErrorKind::Cancelled));
            }
            body = tokio::time::timeout(deadline.remaining(), response.json()) => {
                match body {
                    Err(_elapsed) => return Err(fail(BackendErrorKind::FetchTimeout)),
                    Ok(Err(err)) if err.is_timeout() => {
                        return Err(fail(BackendErrorKind::FetchTimeout))
                    }
                    Ok(Err(err)) => {
                        return Err(fail(BackendErrorKind::InvalidSeries(err.to_string())))
                    }
                    Ok(Ok(payload)) => payload,
                }
            }
        };

        let values = bucket_points(&payload.values, request.sample_method, &timerange);
        Ok(Timeseries::new(values, request.metric.tag_set.clone()))
    }
}
