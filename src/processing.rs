use crate::config::{AppConfig, MapConfig, ViewsConfig};
use crate::data::Dataset;
use crate::error::EmptyInputError;
use crate::types::{
    Dashboard, DistributionSlice, FilterCriteria, GroupKey, IconDescriptor, MapPoint, MapView,
    RankedCount, Record, TableRow, TopCities,
};
use geo::{Centroid, MultiPoint, Point};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub const OTHER_LABEL: &str = "Other";
pub const DEFAULT_CHAIN: &str = "Taco Bell";
pub const DEFAULT_TOP_CITIES: usize = 5;

/// Records whose chain is selected, whose state matches exactly and, when a
/// city substring is given, whose city contains it (case-insensitive).
/// Input order is kept.
pub fn filter<'a>(records: &'a [Record], criteria: &FilterCriteria) -> Vec<&'a Record> {
    let needle = criteria.city_contains.as_deref().map(str::to_lowercase);

    records
        .iter()
        .filter(|r| criteria.includes_chain(&r.name) && r.province == criteria.state)
        .filter(|r| match &needle {
            Some(needle) => r.city.to_lowercase().contains(needle.as_str()),
            None => true,
        })
        .collect()
}

fn count_by<'a, I>(records: I, key: GroupKey) -> HashMap<&'a str, usize>
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut counts = HashMap::new();
    for record in records {
        *counts.entry(key.of(record)).or_insert(0) += 1;
    }
    counts
}

/// Group sizes, largest first, truncated to `top_n`.
///
/// Equal counts are ordered by key ascending so the output is stable between
/// renders.
pub fn rank_by_count<'a, I>(records: I, key: GroupKey, top_n: usize) -> Vec<RankedCount>
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut ranked: Vec<(&str, usize)> = count_by(records, key).into_iter().collect();
    ranked.sort_by_key(|&(label, count)| (Reverse(count), label));
    ranked.truncate(top_n);

    ranked
        .into_iter()
        .map(|(label, count)| RankedCount {
            key: label.to_string(),
            count,
        })
        .collect()
}

/// Share of each group as a percentage (0-100). Groups whose proportion is
/// below `threshold` (0-1) are folded into a single "Other" slice, which is
/// dropped when empty and sorted like any other slice.
pub fn bucket_distribution<'a, I>(
    records: I,
    key: GroupKey,
    threshold: f64,
) -> Result<Vec<DistributionSlice>, EmptyInputError>
where
    I: IntoIterator<Item = &'a Record>,
{
    let counts = count_by(records, key);
    let total: usize = counts.values().sum();
    if total == 0 {
        return Err(EmptyInputError { view: "distribution" });
    }

    let mut slices: Vec<DistributionSlice> = Vec::new();
    let mut other = 0.0;

    for (label, count) in counts {
        let proportion = count as f64 / total as f64;
        if proportion >= threshold {
            slices.push(DistributionSlice {
                label: label.to_string(),
                percentage: proportion * 100.0,
            });
        } else {
            other += proportion;
        }
    }

    if other > 0.0 {
        // A chain literally called "Other" absorbs the bucket
        match slices.iter_mut().find(|s| s.label == OTHER_LABEL) {
            Some(existing) => existing.percentage += other * 100.0,
            None => slices.push(DistributionSlice {
                label: OTHER_LABEL.to_string(),
                percentage: other * 100.0,
            }),
        }
    }

    slices.sort_by(|a, b| {
        b.percentage
            .total_cmp(&a.percentage)
            .then_with(|| a.label.cmp(&b.label))
    });
    Ok(slices)
}

pub fn prepare_point_set<'a, I>(records: I, icon: &IconDescriptor) -> Vec<MapPoint>
where
    I: IntoIterator<Item = &'a Record>,
{
    records
        .into_iter()
        .map(|r| MapPoint {
            name: r.name.clone(),
            address: r.address.clone(),
            latitude: r.latitude,
            longitude: r.longitude,
            icon: icon.clone(),
        })
        .collect()
}

/// Centres the initial map camera on the mean position of `points`.
pub fn map_view(points: &[MapPoint], zoom: u8, pitch: u8) -> Result<MapView, EmptyInputError> {
    let positions: MultiPoint<f64> = points
        .iter()
        .map(|p| Point::new(p.longitude, p.latitude))
        .collect();

    let centre = positions
        .centroid()
        .ok_or(EmptyInputError { view: "map view" })?;

    Ok(MapView {
        latitude: centre.y(),
        longitude: centre.x(),
        zoom,
        pitch,
    })
}

/// Cities with the most locations of one chain. `chain` defaults to
/// [`DEFAULT_CHAIN`] and `top_n` to [`DEFAULT_TOP_CITIES`].
pub fn top_cities(records: &[Record], chain: Option<&str>, top_n: Option<usize>) -> TopCities {
    let chain = chain.unwrap_or(DEFAULT_CHAIN);
    let top_n = top_n.unwrap_or(DEFAULT_TOP_CITIES);

    let ranked = rank_by_count(
        records.iter().filter(|r| r.name == chain),
        GroupKey::City,
        top_n,
    );

    let (cities, counts) = ranked.into_iter().map(|r| (r.key, r.count)).unzip();
    TopCities {
        chain: chain.to_string(),
        cities,
        counts,
    }
}

/// Derives every dashboard view from a shared, read-only dataset.
#[derive(Debug, Clone)]
pub struct ViewEngine {
    dataset: Arc<Dataset>,
    views: ViewsConfig,
    map: MapConfig,
}

impl ViewEngine {
    pub fn new(dataset: Arc<Dataset>, config: &AppConfig) -> Self {
        ViewEngine {
            dataset,
            views: config.views.clone(),
            map: config.map.clone(),
        }
    }

    /// Builds criteria from raw selections, falling back to the configured
    /// defaults. A default state missing from the data falls back to the first
    /// state in sorted order.
    pub fn criteria(
        &self,
        chains: Option<Vec<String>>,
        state: Option<String>,
        city: Option<String>,
    ) -> FilterCriteria {
        let chains = chains.unwrap_or_else(|| self.views.default_chains.clone());

        let state = match state.map(|s| s.trim().to_uppercase()).filter(|s| !s.is_empty()) {
            Some(state) => state,
            None => {
                let states = self.dataset.states();
                if states.contains(&self.views.default_state) || states.is_empty() {
                    self.views.default_state.clone()
                } else {
                    states[0].clone()
                }
            }
        };

        FilterCriteria::new(chains, state, city)
    }

    pub fn filter(&self, criteria: &FilterCriteria) -> Vec<&Record> {
        filter(self.dataset.records(), criteria)
    }

    pub fn points(&self, criteria: &FilterCriteria) -> Vec<MapPoint> {
        prepare_point_set(self.filter(criteria), &self.map.icon)
    }

    pub fn dashboard(&self, criteria: &FilterCriteria) -> Dashboard {
        let records = self.dataset.records();
        let filtered = self.filter(criteria);
        debug!(
            "{} of {} locations match {:?} in {}",
            filtered.len(),
            records.len(),
            criteria.chains,
            criteria.state
        );

        let top_states = rank_by_count(
            records.iter().filter(|r| criteria.includes_chain(&r.name)),
            GroupKey::State,
            self.views.top_states,
        );

        let distribution = bucket_distribution(
            records.iter().filter(|r| r.province == criteria.state),
            GroupKey::Name,
            self.views.distribution_threshold,
        )
        .map_err(|e| warn!("{} for state {}", e, criteria.state))
        .ok();

        let points = prepare_point_set(filtered.iter().copied(), &self.map.icon);
        let map_view = map_view(&points, self.map.zoom, self.map.pitch)
            .map_err(|e| debug!("{}", e))
            .ok();

        let top_cities = top_cities(
            records,
            criteria.chains.first().map(String::as_str),
            Some(self.views.top_cities),
        );

        Dashboard {
            chains: criteria.chains.clone(),
            state: criteria.state.clone(),
            city_contains: criteria.city_contains.clone(),
            top_states,
            distribution,
            points,
            map_view,
            top_cities,
            table: filtered.into_iter().map(TableRow::from).collect(),
        }
    }
}
