use std::{collections::BTreeMap, thread, time::Duration};

use ahash::AHashMap;
use geo::{Coord, Rect};
use log::{info, warn};
use reqwest::blocking::Client;
use serde::Deserialize;

use crate::{
    error::{CatchmentError, Result},
    geom::Crs,
    network::{GraphSource, NetworkMode, RoadEdge, RoutingGraph},
};

const DEFAULT_ENDPOINT: &str = "https://overpass-api.de/api/interpreter";

/// Downloads street networks from an OpenStreetMap Overpass endpoint.
#[derive(Debug, Clone)]
pub struct OverpassGraphSource {
    endpoint: String,
    timeout: Duration,
    retries: usize,
}

impl Default for OverpassGraphSource {
    fn default() -> Self {
        Self { endpoint: DEFAULT_ENDPOINT.to_string(), timeout: Duration::from_secs(180), retries: 3 }
    }
}

#[derive(Deserialize)]
struct Response {
    elements: Vec<Element>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Element {
    Node { id: i64, lat: f64, lon: f64 },
    Way {
        #[serde(default)]
        nodes: Vec<i64>,
        #[serde(default)]
        tags: BTreeMap<String, String>,
    },
    #[serde(other)]
    Other,
}

impl OverpassGraphSource {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into(), ..Self::default() }
    }

    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Overpass QL selecting the ways usable in `mode` inside `bbox`, with their nodes.
    fn query(&self, bbox: Rect<f64>, mode: NetworkMode) -> String {
        let filter = match mode {
            NetworkMode::Walk => r#"["foot"!~"no"]["service"!~"private"]"#,
            NetworkMode::Drive => r#"["motor_vehicle"!~"no"]["motorcar"!~"no"]["service"!~"alley|driveway|emergency_access|parking|parking_aisle|private"]"#,
            NetworkMode::Bike => r#"["bicycle"!~"no"]["service"!~"private"]"#,
        };
        format!(
            r#"[out:json][timeout:{}];(way["highway"]["area"!~"yes"]["highway"!~"{}"]{filter}({},{},{},{}););(._;>;);out body;"#,
            self.timeout.as_secs(), mode.excluded_highways(),
            bbox.min().y, bbox.min().x, bbox.max().y, bbox.max().x,
        )
    }

    fn fetch(&self, query: &str) -> Result<String> {
        let client = Client::builder()
            .user_agent("catchment/0.1")
            .timeout(self.timeout)
            .build()
            .map_err(|e| CatchmentError::network("overpass", e.to_string()))?;

        let mut last_error = String::new();
        for attempt in 0..=self.retries {
            if attempt > 0 {
                thread::sleep(Duration::from_secs(2u64.pow(attempt as u32)));
            }
            match client.post(&self.endpoint).form(&[("data", query)]).send().and_then(|resp| resp.error_for_status()) {
                Ok(resp) => return resp.text().map_err(|e| CatchmentError::network("overpass", e.to_string())),
                Err(e) => {
                    warn!("[network] overpass attempt {} failed: {e}", attempt + 1);
                    last_error = e.to_string();
                }
            }
        }
        Err(CatchmentError::network("overpass", format!("giving up after {} attempts: {last_error}", self.retries + 1)))
    }
}

/// Turn an Overpass JSON response into a lon/lat routing graph.
fn parse_response(body: &str, mode: NetworkMode) -> Result<RoutingGraph> {
    let response: Response = serde_json::from_str(body)
        .map_err(|e| CatchmentError::network("overpass", format!("invalid response: {e}")))?;

    let mut index = AHashMap::new();
    let mut nodes = Vec::new();
    for element in &response.elements {
        if let Element::Node { id, lat, lon } = element {
            index.insert(*id, nodes.len());
            nodes.push(Coord { x: *lon, y: *lat });
        }
    }

    let mut edges = Vec::new();
    for element in &response.elements {
        let Element::Way { nodes: refs, tags } = element else { continue };
        let oneway = mode.respects_oneway()
            && matches!(tags.get("oneway").map(String::as_str), Some("yes" | "true" | "1"));
        for pair in refs.windows(2) {
            if let (Some(&from), Some(&to)) = (index.get(&pair[0]), index.get(&pair[1])) {
                edges.push(RoadEdge { from, to, length: None, oneway });
            }
        }
    }

    Ok(RoutingGraph::new(Crs::WGS84, nodes, edges))
}

impl GraphSource for OverpassGraphSource {
    fn build_or_load_graph(&self, bbox: Rect<f64>, mode: NetworkMode) -> Result<RoutingGraph> {
        let body = self.fetch(&self.query(bbox, mode))?;
        let graph = parse_response(&body, mode)?;
        info!("[network] downloaded {mode} graph: {} nodes, {} edges", graph.node_count(), graph.edge_count());
        Ok(graph)
    }
}
