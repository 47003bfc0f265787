use crate::config::AppConfig;
use crate::data::Dataset;
use crate::processing::ViewEngine;
use crate::render::{self, SelectionOptions};
use crate::types::{Dashboard, FilterCriteria, MapPoint};
use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use geojson::FeatureCollection;
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

// Wrapper for RTree indexing
struct PinIndex {
    index: usize,
    position: [f64; 2],
}

impl RTreeObject for PinIndex {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

impl PointDistance for PinIndex {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.position[0] - point[0];
        let dy = self.position[1] - point[1];
        dx * dx + dy * dy
    }
}

pub struct AppState {
    pub engine: ViewEngine,
    pub config: AppConfig,
    chains: Vec<String>,
    states: Vec<String>,
}

impl AppState {
    pub fn new(config: AppConfig, dataset: Arc<Dataset>) -> Self {
        AppState {
            chains: dataset.chains(),
            states: dataset.states(),
            engine: ViewEngine::new(dataset, &config),
            config,
        }
    }
}

/// Sidebar selection as query parameters. `chains` is comma separated; an
/// absent parameter means "use the defaults", an empty one means "none".
#[derive(Debug, Default, Deserialize)]
pub struct SelectionQuery {
    chains: Option<String>,
    state: Option<String>,
    city: Option<String>,
}

impl SelectionQuery {
    fn criteria(&self, engine: &ViewEngine) -> FilterCriteria {
        let chains = self.chains.as_ref().map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect()
        });
        engine.criteria(chains, self.state.clone(), self.city.clone())
    }
}

#[derive(Debug, Deserialize)]
pub struct NearestQuery {
    lat: f64,
    lon: f64,
    chains: Option<String>,
    state: Option<String>,
    city: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OptionsResponse {
    chains: Vec<String>,
    states: Vec<String>,
    default_chains: Vec<String>,
    default_state: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct NearestResponse {
    name: String,
    address: String,
    latitude: f64,
    longitude: f64,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/options", get(options_handler))
        .route("/api/dashboard", get(dashboard_handler))
        .route("/api/points", get(points_handler))
        .route("/api/nearest", get(nearest_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(config: AppConfig, dataset: Arc<Dataset>) -> Result<()> {
    let port = config.server.port;
    let state = Arc::new(AppState::new(config, dataset));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn index_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SelectionQuery>,
) -> Response {
    let criteria = query.criteria(&state.engine);
    let dashboard = state.engine.dashboard(&criteria);
    let options = SelectionOptions {
        chains: &state.chains,
        states: &state.states,
    };

    match render::render_dashboard_html(&dashboard, &options, &state.config.map) {
        Ok(page) => Html(page).into_response(),
        Err(e) => {
            error!("Dashboard rendering failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(format!("<p>Something went wrong displaying the dashboard: {}</p>", e)),
            )
                .into_response()
        }
    }
}

async fn options_handler(State(state): State<Arc<AppState>>) -> Json<OptionsResponse> {
    let defaults = state.engine.criteria(None, None, None);
    Json(OptionsResponse {
        chains: state.chains.clone(),
        states: state.states.clone(),
        default_chains: defaults.chains,
        default_state: defaults.state,
    })
}

async fn dashboard_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SelectionQuery>,
) -> Json<Dashboard> {
    let criteria = query.criteria(&state.engine);
    Json(state.engine.dashboard(&criteria))
}

async fn points_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SelectionQuery>,
) -> Json<FeatureCollection> {
    let criteria = query.criteria(&state.engine);
    Json(render::point_features(&state.engine.points(&criteria)))
}

async fn nearest_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NearestQuery>,
) -> Json<Option<NearestResponse>> {
    let selection = SelectionQuery {
        chains: query.chains,
        state: query.state,
        city: query.city,
    };
    let points = state.engine.points(&selection.criteria(&state.engine));

    Json(nearest_point(&points, query.lon, query.lat).map(|p| NearestResponse {
        name: p.name.clone(),
        address: p.address.clone(),
        latitude: p.latitude,
        longitude: p.longitude,
    }))
}

/// Pin closest to (`lon`, `lat`), for the map tooltip.
fn nearest_point(points: &[MapPoint], lon: f64, lat: f64) -> Option<&MapPoint> {
    let tree = RTree::bulk_load(
        points
            .iter()
            .enumerate()
            .map(|(index, p)| PinIndex {
                index,
                position: [p.longitude, p.latitude],
            })
            .collect(),
    );

    tree.nearest_neighbor(&[lon, lat])
        .and_then(|pin| points.get(pin.index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Record;

    fn record(name: &str, province: &str, city: &str, latitude: f64, longitude: f64) -> Record {
        Record {
            name: name.to_string(),
            address: format!("{} {}", name, city),
            city: city.to_string(),
            province: province.to_string(),
            latitude,
            longitude,
        }
    }

    fn state() -> Arc<AppState> {
        let config = AppConfig::from_toml("[input]\ndata_csv = \"unused.csv\"\n").unwrap();
        let dataset = Dataset::from_records(vec![
            record("Taco Bell", "CA", "Irvine", 33.68, -117.82),
            record("Taco Bell", "CA", "San Diego", 32.72, -117.16),
            record("KFC", "CA", "Irvine", 33.69, -117.80),
            record("Taco Bell", "AZ", "Phoenix", 33.45, -112.07),
        ]);
        Arc::new(AppState::new(config, Arc::new(dataset)))
    }

    fn selection(chains: Option<&str>, state: Option<&str>, city: Option<&str>) -> SelectionQuery {
        SelectionQuery {
            chains: chains.map(str::to_string),
            state: state.map(str::to_string),
            city: city.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn dashboard_uses_defaults_when_query_is_empty() {
        let Json(dashboard) = dashboard_handler(State(state()), Query(SelectionQuery::default())).await;

        assert_eq!(dashboard.chains, vec!["Taco Bell"]);
        assert_eq!(dashboard.state, "CA");
        assert_eq!(dashboard.table.len(), 2);
    }

    #[tokio::test]
    async fn comma_separated_chains_are_split() {
        let query = selection(Some("Taco Bell, KFC"), Some("ca"), Some("irv"));
        let Json(dashboard) = dashboard_handler(State(state()), Query(query)).await;

        assert_eq!(dashboard.chains, vec!["Taco Bell", "KFC"]);
        assert_eq!(dashboard.table.len(), 2);
        assert!(dashboard.table.iter().all(|r| r.city == "Irvine"));
    }

    #[tokio::test]
    async fn empty_chain_parameter_selects_nothing() {
        let query = selection(Some(""), None, None);
        let Json(dashboard) = dashboard_handler(State(state()), Query(query)).await;

        assert!(dashboard.chains.is_empty());
        assert!(dashboard.points.is_empty());
        assert!(dashboard.map_view.is_none());
        // top cities falls back to the default chain
        assert_eq!(dashboard.top_cities.chain, "Taco Bell");
    }

    #[tokio::test]
    async fn options_list_sorted_choices() {
        let Json(options) = options_handler(State(state())).await;

        assert_eq!(options.chains, vec!["KFC", "Taco Bell"]);
        assert_eq!(options.states, vec!["AZ", "CA"]);
        assert_eq!(options.default_state, "CA");
    }

    #[tokio::test]
    async fn points_are_geojson_features() {
        let query = selection(Some("Taco Bell"), Some("AZ"), None);
        let Json(collection) = points_handler(State(state()), Query(query)).await;

        assert_eq!(collection.features.len(), 1);
        assert_eq!(collection.features[0].properties.as_ref().unwrap()["name"], "Taco Bell");
    }

    #[tokio::test]
    async fn nearest_returns_closest_pin() {
        let query = NearestQuery {
            lat: 32.7,
            lon: -117.2,
            chains: Some("Taco Bell".to_string()),
            state: Some("CA".to_string()),
            city: None,
        };
        let Json(nearest) = nearest_handler(State(state()), Query(query)).await;

        assert_eq!(nearest.unwrap().address, "Taco Bell San Diego");
    }

    #[tokio::test]
    async fn nearest_without_points_is_null() {
        let query = NearestQuery {
            lat: 32.7,
            lon: -117.2,
            chains: Some("Wendy's".to_string()),
            state: None,
            city: None,
        };
        let Json(nearest) = nearest_handler(State(state()), Query(query)).await;

        assert_eq!(nearest, None);
    }

    #[tokio::test]
    async fn index_renders_html_page() {
        let response = index_handler(State(state()), Query(SelectionQuery::default())).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let page = String::from_utf8(body.to_vec()).unwrap();
        assert!(page.contains("U.S. Fast Food Restaurant Explorer"));
        assert!(page.contains("Top Cities for Taco Bell"));
    }
}
