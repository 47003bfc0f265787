use serde::{Deserialize, Serialize};

/// One restaurant location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub name: String,
    pub address: String,
    pub city: String,
    pub province: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Current sidebar selection. Rebuilt on every interaction.
#[derive(Debug, Clone, Default)]
pub struct FilterCriteria {
    /// Selection order is kept; duplicates are dropped.
    pub chains: Vec<String>,
    pub state: String,
    pub city_contains: Option<String>,
}

impl FilterCriteria {
    pub fn new<I, S>(chains: I, state: impl Into<String>, city_contains: Option<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        // Blank text input behaves like no input
        let city_contains = city_contains
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        let mut selected: Vec<String> = Vec::new();
        for chain in chains.into_iter().map(Into::into) {
            if !selected.contains(&chain) {
                selected.push(chain);
            }
        }

        FilterCriteria {
            chains: selected,
            state: state.into(),
            city_contains,
        }
    }

    pub fn includes_chain(&self, name: &str) -> bool {
        self.chains.iter().any(|c| c == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKey {
    Name,
    State,
    City,
}

impl GroupKey {
    pub fn of<'a>(&self, record: &'a Record) -> &'a str {
        match self {
            GroupKey::Name => &record.name,
            GroupKey::State => &record.province,
            GroupKey::City => &record.city,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedCount {
    pub key: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionSlice {
    pub label: String,
    /// 0-100
    pub percentage: f64,
}

/// Marker drawn for every point on the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IconDescriptor {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub anchor_y: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapPoint {
    pub name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub icon: IconDescriptor,
}

/// Initial camera of the map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapView {
    pub latitude: f64,
    pub longitude: f64,
    pub zoom: u8,
    pub pitch: u8,
}

/// Parallel sequences: `counts[i]` belongs to `cities[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TopCities {
    pub chain: String,
    pub cities: Vec<String>,
    pub counts: Vec<usize>,
}

impl TopCities {
    pub fn pairs(&self) -> impl Iterator<Item = (&str, usize)> {
        self.cities
            .iter()
            .map(String::as_str)
            .zip(self.counts.iter().copied())
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub name: String,
    pub address: String,
    pub city: String,
    pub province: String,
}

impl From<&Record> for TableRow {
    fn from(record: &Record) -> Self {
        TableRow {
            name: record.name.clone(),
            address: record.address.clone(),
            city: record.city.clone(),
            province: record.province.clone(),
        }
    }
}

/// Everything one interaction puts on screen.
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub chains: Vec<String>,
    pub state: String,
    pub city_contains: Option<String>,
    pub top_states: Vec<RankedCount>,
    /// `None` when the selected state has no locations at all.
    pub distribution: Option<Vec<DistributionSlice>>,
    pub points: Vec<MapPoint>,
    /// `None` when there are no points to centre on.
    pub map_view: Option<MapView>,
    pub top_cities: TopCities,
    pub table: Vec<TableRow>,
}
