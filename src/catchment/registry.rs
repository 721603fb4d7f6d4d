use ahash::AHashMap;

use crate::{
    catchment::{
        CatchmentStrategy, CircularStrategy, GridStrategy, IsochroneStrategy, NetworkStrategy, StrategyKind, ZonesStrategy,
    },
    layer::GeometryKind,
};

/// Dispatch table from (geometry kind, strategy) to its implementation.
pub struct StrategyRegistry {
    table: AHashMap<(GeometryKind, StrategyKind), Box<dyn CatchmentStrategy>>,
}

impl StrategyRegistry {
    /// A registry with no strategies.
    pub fn empty() -> Self {
        Self { table: AHashMap::new() }
    }

    /// Register (or replace) the implementation for a pair.
    pub fn register(&mut self, kind: GeometryKind, strategy: StrategyKind, implementation: impl CatchmentStrategy + 'static) {
        self.table.insert((kind, strategy), Box::new(implementation));
    }

    pub fn get(&self, kind: GeometryKind, strategy: StrategyKind) -> Option<&dyn CatchmentStrategy> {
        self.table.get(&(kind, strategy)).map(|implementation| &**implementation)
    }

    #[inline]
    pub fn supports(&self, kind: GeometryKind, strategy: StrategyKind) -> bool {
        self.table.contains_key(&(kind, strategy))
    }
}

impl Default for StrategyRegistry {
    /// Every supported pair: all strategies for all kinds, except zones which need polygons.
    fn default() -> Self {
        let mut registry = Self::empty();
        for kind in [GeometryKind::Points, GeometryKind::Lines, GeometryKind::Polygons] {
            registry.register(kind, StrategyKind::Circular, CircularStrategy);
            registry.register(kind, StrategyKind::Grid, GridStrategy);
            registry.register(kind, StrategyKind::Network, NetworkStrategy);
            registry.register(kind, StrategyKind::Isochrone, IsochroneStrategy);
        }
        registry.register(GeometryKind::Polygons, StrategyKind::Zones, ZonesStrategy);
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table() {
        let registry = StrategyRegistry::default();
        assert!(registry.supports(GeometryKind::Points, StrategyKind::Isochrone));
        assert!(registry.supports(GeometryKind::Lines, StrategyKind::Grid));
        assert!(registry.supports(GeometryKind::Polygons, StrategyKind::Zones));
        assert!(!registry.supports(GeometryKind::Points, StrategyKind::Zones));
        assert!(!registry.supports(GeometryKind::Lines, StrategyKind::Zones));
        assert!(StrategyRegistry::empty().get(GeometryKind::Points, StrategyKind::Circular).is_none());
    }
}
