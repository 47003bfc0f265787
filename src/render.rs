use crate::config::MapConfig;
use crate::error::DisplayError;
use crate::types::{Dashboard, DistributionSlice, MapPoint, RankedCount, TableRow, TopCities};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};
use serde_json::json;
use std::f64::consts::PI;
use std::fmt::Write;
use tracing::error;

const BAR_CHART_WIDTH: f64 = 640.0;
const BAR_CHART_HEIGHT: f64 = 360.0;
const PIE_RADIUS: f64 = 140.0;
const NO_DATA: &str = "No data available for selected filters.";

// matplotlib's default cycle
const PALETTE: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

/// Sidebar choices offered to the user.
pub struct SelectionOptions<'a> {
    pub chains: &'a [String],
    pub states: &'a [String],
}

/// Point set as a GeoJSON FeatureCollection for the map layer.
pub fn point_features(points: &[MapPoint]) -> FeatureCollection {
    let features = points
        .iter()
        .map(|p| {
            let mut properties = JsonObject::new();
            properties.insert("name".to_string(), p.name.clone().into());
            properties.insert("address".to_string(), p.address.clone().into());
            properties.insert(
                "icon".to_string(),
                json!({
                    "url": p.icon.url,
                    "width": p.icon.width,
                    "height": p.icon.height,
                    "anchorY": p.icon.anchor_y,
                }),
            );

            Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::Point(vec![p.longitude, p.latitude]))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// Full dashboard page. A failing table is replaced by an error notice rather
/// than failing the page.
pub fn render_dashboard_html(
    dashboard: &Dashboard,
    options: &SelectionOptions,
    map: &MapConfig,
) -> Result<String, DisplayError> {
    let table = render_table_html(&dashboard.table).unwrap_or_else(|e| {
        error!("Table rendering failed: {}", e);
        format!(
            r#"<div class="error">Something went wrong displaying the table: {}</div>"#,
            html_escape(&e.to_string())
        )
    });

    let state = html_escape(&dashboard.state);
    let first_chain = html_escape(&dashboard.top_cities.chain);

    let distribution = match &dashboard.distribution {
        Some(slices) => render_pie_chart_svg(slices, &format!("Restaurant Chain Distribution in {}", state)),
        None => no_data(),
    };

    let mut page = String::new();
    write!(
        page,
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>U.S. Fast Food Restaurant Explorer</title>
    <link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css">
    <script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
    <style>{css}</style>
</head>
<body>
<div class="layout">
{sidebar}
<main>
    <h1>U.S. Fast Food Restaurant Explorer</h1>
    <p>Explore restaurant locations, trends, and maps across the USA.</p>

    <h2>Top States by Restaurant Count</h2>
    {bar_chart}
    <p>The states with the most locations of the selected chains. Change the selection to see how the ranking shifts.</p>

    <h2>Distribution in {state}</h2>
    {distribution}
    <p>Market share of every chain in <b>{state}</b>. Chains below the threshold are grouped under <b>"Other"</b>.</p>

    <h2>Map of Locations</h2>
    {map_section}
    <p>Every selected location in <b>{state}</b>. Hover a pin for its name and address.</p>

    <h2>Top Cities for {first_chain}</h2>
    {top_cities}

    <h3>Summary Table of Selected Locations</h3>
    {table}
</main>
</div>
</body>
</html>"#,
        css = inline_css(),
        sidebar = render_sidebar(dashboard, options),
        bar_chart = render_bar_chart_svg(&dashboard.top_states),
        state = state,
        distribution = distribution,
        map_section = render_map_section(dashboard, map)?,
        first_chain = first_chain,
        top_cities = render_top_cities_html(&dashboard.top_cities),
        table = table,
    )
    .map_err(DisplayError::format("dashboard"))?;

    Ok(page)
}

fn render_sidebar(dashboard: &Dashboard, options: &SelectionOptions) -> String {
    let chain_options: String = options
        .chains
        .iter()
        .map(|c| {
            let selected = if dashboard.chains.contains(c) { " selected" } else { "" };
            format!(r#"<option value="{v}"{selected}>{v}</option>"#, v = html_escape(c))
        })
        .collect();

    let state_options: String = options
        .states
        .iter()
        .map(|s| {
            let selected = if *s == dashboard.state { " selected" } else { "" };
            format!(r#"<option value="{v}"{selected}>{v}</option>"#, v = html_escape(s))
        })
        .collect();

    format!(
        r#"<aside class="sidebar">
    <h2>Fast Food Explorer</h2>
    <p>Use the filters below to explore the data.</p>
    <form method="get" action="/" onsubmit="document.getElementById('chains').value = Array.from(document.getElementById('chain-select').selectedOptions).map(o => o.value).join(',');">
        <label for="chain-select">Select Restaurant Chains</label>
        <select id="chain-select" multiple size="10">{chain_options}</select>
        <input type="hidden" id="chains" name="chains">
        <label for="state">Select State</label>
        <select id="state" name="state">{state_options}</select>
        <label for="city">Optional: Filter by City</label>
        <input type="text" id="city" name="city" value="{city}">
        <button type="submit">Apply</button>
    </form>
</aside>"#,
        city = html_escape(dashboard.city_contains.as_deref().unwrap_or("")),
    )
}

pub fn render_bar_chart_svg(ranking: &[RankedCount]) -> String {
    if ranking.is_empty() {
        return no_data();
    }

    let left = 60.0;
    let bottom = 50.0;
    let top = 40.0;
    let plot_width = BAR_CHART_WIDTH - left - 20.0;
    let plot_height = BAR_CHART_HEIGHT - top - bottom;
    let max = ranking.iter().map(|r| r.count).max().unwrap_or(1).max(1) as f64;
    let slot = plot_width / ranking.len() as f64;

    let mut svg = format!(
        r#"<svg class="chart" viewBox="0 0 {w} {h}" xmlns="http://www.w3.org/2000/svg">
<text x="{cx}" y="20" text-anchor="middle" class="title">Top {n} States with Most Selected Restaurants</text>
<text x="15" y="{cy}" text-anchor="middle" transform="rotate(-90 15 {cy})">Number of Locations</text>
"#,
        w = BAR_CHART_WIDTH,
        h = BAR_CHART_HEIGHT,
        cx = BAR_CHART_WIDTH / 2.0,
        cy = top + plot_height / 2.0,
        n = ranking.len(),
    );

    for (i, entry) in ranking.iter().enumerate() {
        let height = entry.count as f64 / max * plot_height;
        let x = left + i as f64 * slot + slot * 0.1;
        let y = top + plot_height - height;
        let _ = write!(
            svg,
            r#"<rect x="{x:.1}" y="{y:.1}" width="{bw:.1}" height="{height:.1}" fill="skyblue"><title>{label}: {count}</title></rect>
<text x="{lx:.1}" y="{ly:.1}" text-anchor="middle">{label}</text>
<text x="{lx:.1}" y="{vy:.1}" text-anchor="middle" class="value">{count}</text>
"#,
            bw = slot * 0.8,
            label = html_escape(&entry.key),
            count = entry.count,
            lx = x + slot * 0.4,
            ly = top + plot_height + 18.0,
            vy = y - 4.0,
        );
    }

    svg.push_str("</svg>");
    svg
}

pub fn render_pie_chart_svg(slices: &[DistributionSlice], title: &str) -> String {
    if slices.is_empty() {
        return no_data();
    }

    let (cx, cy) = (180.0, 190.0);
    let mut svg = format!(
        r#"<svg class="chart" viewBox="0 0 640 380" xmlns="http://www.w3.org/2000/svg">
<text x="320" y="20" text-anchor="middle" class="title">{title}</text>
"#
    );

    let mut start = 0.0;
    for (i, slice) in slices.iter().enumerate() {
        let fraction = slice.percentage / 100.0;
        let colour = PALETTE[i % PALETTE.len()];
        let label = html_escape(&slice.label);

        if fraction >= 0.9999 {
            let _ = write!(
                svg,
                r#"<circle cx="{cx}" cy="{cy}" r="{PIE_RADIUS}" fill="{colour}"><title>{label}</title></circle>"#
            );
        } else {
            let (x0, y0) = pie_point(cx, cy, start);
            let (x1, y1) = pie_point(cx, cy, start + fraction);
            let large_arc = u8::from(fraction > 0.5);
            let _ = write!(
                svg,
                r#"<path d="M {cx} {cy} L {x0:.2} {y0:.2} A {PIE_RADIUS} {PIE_RADIUS} 0 {large_arc} 1 {x1:.2} {y1:.2} Z" fill="{colour}"><title>{label}</title></path>"#
            );
        }

        let ly = 60.0 + i as f64 * 22.0;
        let _ = write!(
            svg,
            r#"
<rect x="360" y="{ry}" width="14" height="14" fill="{colour}"/><text x="382" y="{ty}">{label} ({pct:.1}%)</text>
"#,
            ry = ly - 11.0,
            ty = ly,
            pct = slice.percentage,
        );
        start += fraction;
    }

    svg.push_str("</svg>");
    svg
}

/// Position on the rim at `fraction` of a turn, clockwise from 12 o'clock.
fn pie_point(cx: f64, cy: f64, fraction: f64) -> (f64, f64) {
    let angle = fraction * 2.0 * PI - PI / 2.0;
    (cx + PIE_RADIUS * angle.cos(), cy + PIE_RADIUS * angle.sin())
}

fn render_map_section(dashboard: &Dashboard, map: &MapConfig) -> Result<String, DisplayError> {
    let Some(view) = &dashboard.map_view else {
        return Ok(format!(r#"<div class="warning">{}</div>"#, NO_DATA));
    };

    let features = serde_json::to_string(&point_features(&dashboard.points))
        .map_err(DisplayError::encode("map points"))?;
    let view = serde_json::to_string(view).map_err(DisplayError::encode("map view"))?;
    let tiles = serde_json::to_string(&map.style).map_err(DisplayError::encode("map style"))?;

    Ok(format!(
        r#"<div id="map"></div>
<script>
(function() {{
    const points = {features};
    const view = {view};
    const map = L.map('map').setView([view.latitude, view.longitude], view.zoom);
    L.tileLayer({tiles}, {{ attribution: '&copy; OpenStreetMap contributors' }}).addTo(map);
    L.geoJSON(points, {{
        pointToLayer: function(feature, latlng) {{
            const icon = feature.properties.icon;
            const w = 40, h = 40 * icon.height / icon.width;
            return L.marker(latlng, {{
                icon: L.icon({{ iconUrl: icon.url, iconSize: [w, h], iconAnchor: [w / 2, h * icon.anchorY / icon.height] }})
            }});
        }},
        onEachFeature: function(feature, layer) {{
            const div = document.createElement('div');
            div.innerText = feature.properties.name + '\n' + feature.properties.address;
            layer.bindTooltip(div);
        }}
    }}).addTo(map);
}})();
</script>"#,
        features = script_safe(&features),
        view = script_safe(&view),
        tiles = script_safe(&tiles),
    ))
}

fn render_top_cities_html(top: &TopCities) -> String {
    if top.is_empty() {
        return format!(
            r#"<div class="warning">No {} locations found.</div>"#,
            html_escape(&top.chain)
        );
    }

    let rows: String = top
        .pairs()
        .map(|(city, count)| {
            format!("<tr><td>{}</td><td>{}</td></tr>\n", html_escape(city), count)
        })
        .collect();

    format!(
        r#"<table class="top-cities"><thead><tr><th>City</th><th>Locations</th></tr></thead>
<tbody>
{rows}</tbody></table>"#
    )
}

pub fn render_table_html(rows: &[TableRow]) -> Result<String, DisplayError> {
    let mut out = String::new();
    writeln!(
        out,
        r#"<table class="locations"><thead><tr><th></th><th>Name</th><th>Address</th><th>City</th><th>Province</th></tr></thead>"#
    )
    .map_err(DisplayError::format("table"))?;
    writeln!(out, "<tbody>").map_err(DisplayError::format("table"))?;

    for (i, row) in rows.iter().enumerate() {
        writeln!(
            out,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            i,
            html_escape(&row.name),
            html_escape(&row.address),
            html_escape(&row.city),
            html_escape(&row.province)
        )
        .map_err(DisplayError::format("table"))?;
    }

    write!(out, "</tbody></table>").map_err(DisplayError::format("table"))?;
    Ok(out)
}

/// Plain-text rendition of the dashboard for the terminal.
pub fn render_summary_text(dashboard: &Dashboard) -> Result<String, DisplayError> {
    let mut out = String::new();
    write_summary(&mut out, dashboard).map_err(DisplayError::format("summary"))?;
    Ok(out)
}

fn write_summary(out: &mut String, dashboard: &Dashboard) -> std::fmt::Result {
    writeln!(out, "U.S. Fast Food Restaurant Explorer")?;
    writeln!(
        out,
        "Chains: {} | State: {} | City: {}",
        dashboard.chains.join(", "),
        dashboard.state,
        dashboard.city_contains.as_deref().unwrap_or("(any)")
    )?;

    writeln!(out, "\nTop States by Restaurant Count")?;
    if dashboard.top_states.is_empty() {
        writeln!(out, "  {}", NO_DATA)?;
    }
    let widest = dashboard.top_states.iter().map(|r| r.count).max().unwrap_or(0).max(1);
    for entry in &dashboard.top_states {
        let bar = "#".repeat((entry.count * 40).div_ceil(widest));
        writeln!(out, "  {:<4} {:>6}  {}", entry.key, entry.count, bar)?;
    }

    writeln!(out, "\nDistribution in {}", dashboard.state)?;
    match &dashboard.distribution {
        Some(slices) => {
            for slice in slices {
                writeln!(out, "  {:<30} {:>5.1}%", slice.label, slice.percentage)?;
            }
        }
        None => writeln!(out, "  {}", NO_DATA)?,
    }

    writeln!(out, "\nMap of Locations")?;
    match &dashboard.map_view {
        Some(view) => writeln!(
            out,
            "  {} pins centred on ({:.4}, {:.4})",
            dashboard.points.len(),
            view.latitude,
            view.longitude
        )?,
        None => writeln!(out, "  {}", NO_DATA)?,
    }

    writeln!(out, "\nTop Cities for {}", dashboard.top_cities.chain)?;
    for (city, count) in dashboard.top_cities.pairs() {
        writeln!(out, "  {:<30} {:>6}", city, count)?;
    }

    writeln!(out, "\nSummary Table of Selected Locations")?;
    for row in &dashboard.table {
        writeln!(out, "  {} | {} | {} | {}", row.name, row.address, row.city, row.province)?;
    }
    Ok(())
}

fn no_data() -> String {
    format!(r#"<div class="warning">{}</div>"#, NO_DATA)
}

/// Escape HTML special characters
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// JSON embedded in a script tag must not close it.
fn script_safe(json: &str) -> String {
    json.replace("</", "<\\/")
}

fn inline_css() -> &'static str {
    r#"
body { margin: 0; font-family: sans-serif; background-color: #f9f9f9; }
h1, h2, h3 { color: #d62728; }
.layout { display: flex; gap: 24px; }
.sidebar { width: 280px; margin: 16px; background-color: #ffe6e6; border-radius: 10px; padding: 20px; }
.sidebar label { display: block; margin-top: 12px; font-weight: bold; }
.sidebar select, .sidebar input { width: 100%; }
.sidebar button { margin-top: 16px; }
main { flex: 1; padding: 16px; max-width: 960px; }
.chart { width: 100%; max-width: 640px; background: white; }
.chart .title { font-weight: bold; }
.chart .value { font-size: 10px; }
#map { height: 480px; }
.warning { padding: 12px; background: #fff4cc; border: 1px solid #e6c200; }
.error { padding: 12px; background: #ffd6d6; border: 1px solid #d62728; }
table { border-collapse: collapse; background: white; }
th, td { border: 1px solid #ddd; padding: 4px 8px; text-align: left; }
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IconDescriptor, MapView};

    fn icon() -> IconDescriptor {
        MapConfig::default().icon
    }

    fn dashboard() -> Dashboard {
        Dashboard {
            chains: vec!["Taco Bell".to_string()],
            state: "CA".to_string(),
            city_contains: None,
            top_states: vec![
                RankedCount { key: "CA".to_string(), count: 4 },
                RankedCount { key: "TX".to_string(), count: 2 },
            ],
            distribution: Some(vec![
                DistributionSlice { label: "Taco Bell".to_string(), percentage: 80.0 },
                DistributionSlice { label: "Other".to_string(), percentage: 20.0 },
            ]),
            points: vec![MapPoint {
                name: "Taco Bell".to_string(),
                address: "1 <Main> St".to_string(),
                latitude: 33.6,
                longitude: -117.8,
                icon: icon(),
            }],
            map_view: Some(MapView { latitude: 33.6, longitude: -117.8, zoom: 6, pitch: 0 }),
            top_cities: TopCities {
                chain: "Taco Bell".to_string(),
                cities: vec!["Irvine".to_string()],
                counts: vec![4],
            },
            table: vec![TableRow {
                name: "Taco Bell".to_string(),
                address: "1 <Main> St".to_string(),
                city: "Irvine".to_string(),
                province: "CA".to_string(),
            }],
        }
    }

    fn options() -> (Vec<String>, Vec<String>) {
        (
            vec!["KFC".to_string(), "Taco Bell".to_string()],
            vec!["CA".to_string(), "TX".to_string()],
        )
    }

    #[test]
    fn features_are_lon_lat_points_with_tooltip_fields() {
        let collection = point_features(&dashboard().points);

        assert_eq!(collection.features.len(), 1);
        let feature = &collection.features[0];
        match &feature.geometry.as_ref().unwrap().value {
            Value::Point(coords) => assert_eq!(coords, &vec![-117.8, 33.6]),
            other => panic!("expected point, got {:?}", other),
        }
        let properties = feature.properties.as_ref().unwrap();
        assert_eq!(properties["name"], "Taco Bell");
        assert_eq!(properties["icon"]["anchorY"], 242);
    }

    #[test]
    fn page_contains_every_section() {
        let (chains, states) = options();
        let page = render_dashboard_html(
            &dashboard(),
            &SelectionOptions { chains: &chains, states: &states },
            &MapConfig::default(),
        )
        .unwrap();

        assert!(page.contains("Top States by Restaurant Count"));
        assert!(page.contains("Distribution in CA"));
        assert!(page.contains(r#"id="map""#));
        assert!(page.contains("Top Cities for Taco Bell"));
        assert!(page.contains("1 &lt;Main&gt; St"));
        assert!(page.contains(r#"<option value="Taco Bell" selected>"#));
        assert!(page.contains(r#"<option value="KFC">"#));
        assert!(!page.contains(NO_DATA));
    }

    #[test]
    fn empty_views_show_no_data_instead_of_a_map() {
        let mut dashboard = dashboard();
        dashboard.points.clear();
        dashboard.map_view = None;
        dashboard.distribution = None;
        let (chains, states) = options();

        let page = render_dashboard_html(
            &dashboard,
            &SelectionOptions { chains: &chains, states: &states },
            &MapConfig::default(),
        )
        .unwrap();

        assert!(page.contains(NO_DATA));
        assert!(!page.contains("L.map("));
    }

    #[test]
    fn pie_chart_draws_one_slice_per_label() {
        let svg = render_pie_chart_svg(dashboard().distribution.as_ref().unwrap(), "t");

        assert_eq!(svg.matches("<path").count(), 2);
        assert!(svg.contains("Taco Bell (80.0%)"));
        assert!(svg.contains("Other (20.0%)"));
    }

    #[test]
    fn single_slice_pie_is_a_full_circle() {
        let slices = vec![DistributionSlice { label: "Other".to_string(), percentage: 100.0 }];
        let svg = render_pie_chart_svg(&slices, "t");

        assert!(svg.contains("<circle"));
        assert!(!svg.contains("<path"));
    }

    #[test]
    fn bar_chart_scales_to_largest_count() {
        let svg = render_bar_chart_svg(&dashboard().top_states);

        assert_eq!(svg.matches("<rect").count(), 2);
        assert!(svg.contains("Top 2 States"));
        // tallest bar spans the full plot height
        assert!(svg.contains(r#"height="270.0""#));
    }

    #[test]
    fn table_escapes_cells() {
        let html = render_table_html(&dashboard().table).unwrap();
        assert!(html.contains("<td>1 &lt;Main&gt; St</td>"));
    }

    #[test]
    fn summary_lists_every_view() {
        let text = render_summary_text(&dashboard()).unwrap();

        assert!(text.contains("Chains: Taco Bell | State: CA | City: (any)"));
        assert!(text.contains("Other"));
        assert!(text.contains("1 pins centred on (33.6000, -117.8000)"));
        assert!(text.contains("Irvine"));
    }

    #[test]
    fn script_safe_breaks_closing_tags() {
        assert_eq!(script_safe(r#"{"a":"</script>"}"#), r#"{"a":"<\/script>"}"#);
    }
}
