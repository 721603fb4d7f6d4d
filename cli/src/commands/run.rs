use std::{fs, path::{Path, PathBuf}};

use anyhow::{Context, Result};
use catchment::{
    extract::{assign_crs, normalize},
    network::{GraphSource, LineLayerGraphSource, OverpassGraphSource, StaticGraphSource},
    Pipeline, PipelineConfig, PipelineOutput,
};
use log::info;

use crate::io::{
    csv::write_csv,
    geojson::{catchments_to_geojson, provenance_to_geojson, read_layer, write_geojson},
};

pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    let file = fs::File::open(path)
        .with_context(|| format!("[run] Failed to open configuration {}", path.display()))?;
    PipelineConfig::from_reader(file)
        .with_context(|| format!("[run] Invalid configuration {}", path.display()))
}

fn graph_source(config: &PipelineConfig, args: &crate::cli::RunArgs) -> Result<Box<dyn GraphSource>> {
    if let Some(path) = &args.network {
        let mut layer = read_layer(path, "network")?;
        assign_crs(&mut layer, &config.default_projected_crs);
        normalize(&mut layer).context("[run] Failed to reproject the network layer")?;
        info!("[run] building road graphs from {} ({} features)", path.display(), layer.len());
        return Ok(Box::new(LineLayerGraphSource::new(layer)))
    }
    if args.offline {
        return Ok(Box::new(StaticGraphSource::empty()))
    }
    Ok(Box::new(OverpassGraphSource::default()))
}

pub fn run(_cli: &crate::cli::Cli, args: &crate::cli::RunArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let base = args.config.parent().map(Path::to_path_buf).unwrap_or_default();
    let out_dir = args.output.clone().unwrap_or_else(|| PathBuf::from("./output"));

    let layers = config.layers.iter()
        .map(|(name, source)| {
            info!("[run] reading layer '{name}' from {}", source.path);
            read_layer(&base.join(&source.path), name)
        })
        .collect::<Result<Vec<_>>>()?;

    let source = graph_source(&config, args)?;
    let output = Pipeline::new(config, source).run(layers)?;

    write_outputs(output, &out_dir)
}

/// Write `fused.csv`, `stats.csv`, one GeoJSON per catchment layer and one per
/// (catchment layer, join layer) pair.
pub fn write_outputs(output: PipelineOutput, out_dir: &Path) -> Result<()> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("[run] Failed to create output directory {}", out_dir.display()))?;

    let PipelineOutput { catchments, fused, mut fused_frame, stats, .. } = output;

    write_csv(&mut fused_frame, &out_dir.join("fused.csv"))?;
    if let Some(mut stats) = stats {
        write_csv(&mut stats, &out_dir.join("stats.csv"))?;
    }

    for layer in catchments.values() {
        write_geojson(&catchments_to_geojson(layer), &out_dir.join(format!("{}.geojson", layer.name)))?;
    }
    for (buffer_layer, join_layer) in fused.pairs() {
        let provenance = fused.provenance(buffer_layer, join_layer);
        write_geojson(&provenance_to_geojson(&provenance), &out_dir.join(format!("{buffer_layer}_{join_layer}.geojson")))?;
    }

    info!("[run] wrote {} catchment layers and {} join rows to {}", catchments.len(), fused.len(), out_dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATIONS: &str = r#"{"type": "FeatureCollection", "features": [
        {"type": "Feature", "geometry": {"type": "Point", "coordinates": [611000.0, 5040000.0]}, "properties": {"station": "A"}}
    ]}"#;

    const STOPS: &str = r#"{"type": "FeatureCollection", "features": [
        {"type": "Feature", "geometry": {"type": "Point", "coordinates": [611020.0, 5040000.0]}, "properties": {"stop_id": "s1"}},
        {"type": "Feature", "geometry": {"type": "Point", "coordinates": [611900.0, 5040000.0]}, "properties": {"stop_id": "s2"}}
    ]}"#;

    const CONFIG: &str = r#"{
        "layers": {"stations": {"path": "stations.geojson"}, "stops": {"path": "stops.geojson"}},
        "buffer_layer": {"stations": {"buffer_type": "network", "distance": 300}},
        "join_layers": {"points": {"type": "contains"}},
        "groupby_columns": ["catchment_id"],
        "metrics_config": {"count": ["stop_id"]}
    }"#;

    #[test]
    fn offline_run_writes_every_output() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("stations.geojson"), STATIONS).unwrap();
        fs::write(dir.path().join("stops.geojson"), STOPS).unwrap();
        fs::write(dir.path().join("config.json"), CONFIG).unwrap();
        let out_dir = dir.path().join("out");

        let args = crate::cli::RunArgs {
            config: dir.path().join("config.json"),
            output: Some(out_dir.clone()),
            network: None,
            offline: true,
        };
        let cli = crate::cli::Cli { verbose: 0, command: crate::cli::Commands::Check(crate::cli::CheckArgs { config: args.config.clone() }) };
        run(&cli, &args).unwrap();

        for file in ["fused.csv", "stats.csv", "stations_buffer.geojson", "stations_buffer_stops.geojson", "stations_buffer_stations.geojson"] {
            assert!(out_dir.join(file).exists(), "{file} missing");
        }

        // No graph offline: the station falls back to a 300 m circle holding only s1.
        let stats = fs::read_to_string(out_dir.join("stats.csv")).unwrap();
        let mut lines = stats.lines();
        assert_eq!(lines.next(), Some("catchment_id,count_stop_id,area_km2"));
        assert!(lines.next().unwrap().starts_with("1,1,"));

        let catchments: serde_json::Value = serde_json::from_slice(&fs::read(out_dir.join("stations_buffer.geojson")).unwrap()).unwrap();
        assert_eq!(catchments["features"][0]["properties"]["fallback"], "circular");
        assert_eq!(catchments["features"][0]["properties"]["buffer_type"], "network");
    }

    #[test]
    fn missing_configuration_is_reported() {
        let error = load_config(Path::new("/nonexistent/config.json")).unwrap_err();
        assert!(error.to_string().contains("Failed to open configuration"));
    }
}
