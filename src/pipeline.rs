use std::collections::BTreeMap;

use log::{info, warn};
use polars::prelude::DataFrame;
use rayon::ThreadPoolBuilder;

use crate::{
    catchment::{generate, BuildContext, CatchmentIdSequence, CatchmentLayer, StrategyRegistry},
    config::PipelineConfig,
    error::{CatchmentError, Result},
    extract::{extract, ExtractedLayers},
    join::{spatial_join, FusedTable, JoinOptions},
    layer::FeatureLayer,
    metrics::aggregate,
    network::{GraphCache, GraphSource},
};

/// Everything one run produces.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Input layers after extraction and per-layer filters.
    pub layers: ExtractedLayers,
    /// Catchment layers keyed by `"<layer>_buffer"`.
    pub catchments: BTreeMap<String, CatchmentLayer>,
    /// Join rows after the global filters.
    pub fused: FusedTable,
    pub fused_frame: DataFrame,
    /// Aggregated statistics; `None` when no join row survived.
    pub stats: Option<DataFrame>,
}

/// Catchment generation, spatial join and metrics wired together.
pub struct Pipeline {
    config: PipelineConfig,
    registry: StrategyRegistry,
    graphs: GraphCache,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, graphs: impl GraphSource + 'static) -> Self {
        Self { config, registry: StrategyRegistry::default(), graphs: GraphCache::new(graphs) }
    }

    /// Replace the strategy dispatch table.
    pub fn with_registry(mut self, registry: StrategyRegistry) -> Self {
        self.registry = registry;
        self
    }

    #[inline] pub fn config(&self) -> &PipelineConfig { &self.config }

    /// Run every stage over `layers`.
    ///
    /// Layers, features and join pairs that fail are logged and skipped. Only a
    /// thread pool that cannot start, a fused table that cannot be exported, or a
    /// missing group-by column fail the run.
    pub fn run(&mut self, layers: impl IntoIterator<Item = FeatureLayer>) -> Result<PipelineOutput> {
        let config = &self.config;
        let mut extracted = extract(layers, &config.default_projected_crs);

        for (name, filter) in &config.filter_files {
            let mut found = false;
            for sublayers in [&mut extracted.points, &mut extracted.lines, &mut extracted.polygons] {
                if let Some(layer) = sublayers.get_mut(name) {
                    found = true;
                    filter.apply_to_layer(layer);
                }
            }
            if !found { warn!("[pipeline] filter for unknown layer '{name}' ignored") }
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(config.workers.unwrap_or(0))
            .build()
            .map_err(|e| CatchmentError::config("workers", e.to_string()))?;

        self.graphs.clear();
        let mut ctx = BuildContext { graphs: &mut self.graphs, pool: &pool, chunk_size: config.chunk_size.max(1) };
        let mut ids = CatchmentIdSequence::new();
        let mut catchments = BTreeMap::new();

        for (name, params) in &config.buffer_layer {
            let kind = params.kind();
            let Some(layer) = extracted.get(kind, name) else {
                warn!("[pipeline] no {kind} layer named '{name}', skipped");
                continue
            };
            let built = params.validate(name)
                .and_then(|validated| generate(&self.registry, &mut ctx, &mut ids, layer, kind, &validated));
            match built {
                Ok(catchment_layer) => {
                    info!("[pipeline] '{}': {} catchments", catchment_layer.name, catchment_layer.len());
                    catchments.insert(catchment_layer.name.clone(), catchment_layer);
                }
                Err(e) => warn!("[pipeline] '{name}' skipped: {e}"),
            }
        }

        let options = JoinOptions { compute_proportions: config.compute_proportions };
        let mut fused = spatial_join(catchments.values(), &extracted, &config.predicates(), options);
        for filter in &config.filter_global {
            fused.retain(filter);
        }
        info!("[pipeline] fused table: {} rows", fused.len());

        let fused_frame = fused.to_dataframe()?;
        let stats = if fused.is_empty() {
            warn!("[pipeline] no join rows, statistics skipped");
            None
        } else {
            Some(aggregate(&fused_frame, &config.groupby_columns, &config.metrics_config)?)
        };

        Ok(PipelineOutput { layers: extracted, catchments, fused, fused_frame, stats })
    }
}
