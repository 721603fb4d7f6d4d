use geo::{Coord, Polygon, Rect};
use log::{debug, warn};
use rayon::prelude::*;
use roadgraph::{reachable_within, NodeIndex, RoadGraph};

use crate::{
    catchment::{
        circular::circles, layer_center, BuildContext, CatchmentParams, CatchmentStrategy, Diagnostic, Outline,
        StrategyOutput,
    },
    error::{CatchmentError, Result},
    geom::{anchor, hull_of, Crs, Projector},
    layer::FeatureLayer,
    network::{widen, NetworkMode},
};

/// Convex hull of the street nodes reachable within `distance` meters.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkStrategy;

/// Convex hull of the street nodes reachable within `travel_time` minutes at `speed` km/h.
#[derive(Debug, Clone, Copy, Default)]
pub struct IsochroneStrategy;

/// How one graph-based strategy searches the network.
#[derive(Debug, Clone, Copy)]
struct Search {
    mode: NetworkMode,
    /// Degrees added around the layer when requesting the graph.
    margin: f64,
    cutoff: f64,
    /// Meters per cost unit.
    meters_per_unit: f64,
    fallback_radius: f64,
}

impl CatchmentStrategy for NetworkStrategy {
    fn build(&self, ctx: &mut BuildContext<'_>, layer: &FeatureLayer, params: &CatchmentParams) -> Result<StrategyOutput> {
        let CatchmentParams::Network { distance, mode } = *params else {
            return Err(CatchmentError::config(&layer.name, format!("network strategy given {} parameters", params.kind())))
        };
        let search = Search {
            mode,
            margin: distance * 2.0 / 111_320.0,
            cutoff: distance,
            meters_per_unit: 1.0,
            fallback_radius: distance,
        };
        build_from_graph(ctx, layer, search)
    }
}

impl CatchmentStrategy for IsochroneStrategy {
    fn build(&self, ctx: &mut BuildContext<'_>, layer: &FeatureLayer, params: &CatchmentParams) -> Result<StrategyOutput> {
        let CatchmentParams::Isochrone { travel_time, speed, distance, mode } = *params else {
            return Err(CatchmentError::config(&layer.name, format!("isochrone strategy given {} parameters", params.kind())))
        };
        let meters_per_minute = speed * 1000.0 / 60.0;
        let search = Search {
            mode,
            margin: distance / 111_000.0,
            cutoff: travel_time,
            meters_per_unit: meters_per_minute,
            fallback_radius: meters_per_minute * travel_time,
        };
        build_from_graph(ctx, layer, search)
    }
}

/// Lon/lat bounding box of a layer, from the four corners of its own bounds.
fn lonlat_bounds(layer: &FeatureLayer, crs: &Crs) -> Result<Option<Rect<f64>>> {
    let Some(bounds) = layer.bounds() else { return Ok(None) };
    let to_lonlat = Projector::new(crs, &Crs::WGS84)?;

    let corners = [
        bounds.min(), bounds.max(),
        Coord { x: bounds.min().x, y: bounds.max().y },
        Coord { x: bounds.max().x, y: bounds.min().y },
    ].map(|c| to_lonlat.coord(c));

    let mut rect: Option<Rect<f64>> = None;
    for corner in corners {
        let c = corner?;
        rect = Some(match rect {
            None => Rect::new(c, c),
            Some(r) => Rect::new(
                Coord { x: r.min().x.min(c.x), y: r.min().y.min(c.y) },
                Coord { x: r.max().x.max(c.x), y: r.max().y.max(c.y) },
            ),
        });
    }
    Ok(rect)
}

/// Acquire the layer's graph and pack it in `working` coordinates; an unroutable graph is an error.
fn road_graph(ctx: &mut BuildContext<'_>, layer: &FeatureLayer, crs: &Crs, working: &Crs, search: &Search) -> Result<RoadGraph> {
    let bbox = lonlat_bounds(layer, crs)?
        .ok_or_else(|| CatchmentError::network(&layer.name, "layer has no extent"))?;
    let graph = ctx.graphs.get(widen(bbox, search.margin), search.mode)?;
    let road = graph.to_road_graph(&layer.name, working)?;
    if road.is_unroutable() {
        return Err(CatchmentError::network(&layer.name, format!("{} graph has no routable edges", search.mode)))
    }
    Ok(road)
}

/// Hull of the nodes reachable from the node nearest `origin`.
fn reach(road: &RoadGraph, index: &NodeIndex, origin: Coord<f64>, search: &Search) -> std::result::Result<Polygon<f64>, String> {
    let source = index.nearest(origin).ok_or("no graph node near the feature")?;
    let per_unit = search.meters_per_unit;
    let reached = reachable_within(road, source, search.cutoff, |length| length / per_unit);
    let coords = reached.iter().map(|r| road.coord(r.node)).collect::<Vec<_>>();
    hull_of(&coords).ok_or_else(|| format!("only {} reachable nodes, need 3 non-collinear", coords.len()))
}

fn build_from_graph(ctx: &mut BuildContext<'_>, layer: &FeatureLayer, search: Search) -> Result<StrategyOutput> {
    let crs = layer.crs.clone().unwrap_or(Crs::WGS84);
    let Some(center) = layer_center(layer) else { return Ok(StrategyOutput::default()) };
    let working = crs.metric_near(center);

    let road = match road_graph(ctx, layer, &crs, &working, &search) {
        Ok(road) => road,
        Err(e) => {
            warn!("[catchment] '{}': {e}; falling back to circular buffers of {} m", layer.name, search.fallback_radius);
            let mut output = circles(layer, search.fallback_radius);
            output.diagnostics.insert(0, Diagnostic::layer(format!("{e}; circular fallback of {} m", search.fallback_radius)));
            output.outlines = output.outlines.into_iter()
                .map(|outline| outline.with("fallback", "circular"))
                .collect();
            return Ok(output)
        }
    };
    let index = NodeIndex::new(&road);
    let to_metric = Projector::new(&crs, &working)?;
    let to_layer = Projector::new(&working, &crs)?;

    let origins = layer.features.iter()
        .map(|feature| {
            let origin = anchor(&feature.geometry).ok_or_else(|| "no usable anchor point".to_string())?;
            to_metric.coord(origin).map_err(|e| e.to_string())
        })
        .collect::<Vec<_>>();

    let chunk_size = ctx.chunk_size.max(1);
    debug!("[catchment] searching {} origins of '{}' on {} threads", origins.len(), layer.name, ctx.pool.current_num_threads());
    let hulls = ctx.pool.install(|| {
        origins.par_chunks(chunk_size)
            .map(|chunk| chunk.iter()
                .map(|origin| origin.clone().and_then(|origin| reach(&road, &index, origin, &search)))
                .collect::<Vec<_>>())
            .collect::<Vec<_>>()
    });

    let mut output = StrategyOutput::default();
    for (i, hull) in hulls.into_iter().flatten().enumerate() {
        let geometry = hull.and_then(|hull| to_layer.project(&hull).map_err(|e| e.to_string()));
        match geometry {
            Ok(polygon) => output.outlines.push(Outline::new(i, Some(polygon))),
            Err(reason) => {
                output.diagnostics.push(Diagnostic::feature(i, reason));
                output.outlines.push(Outline::new(i, None));
            }
        }
    }
    Ok(output)
}
