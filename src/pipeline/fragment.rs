//! Boolean fragmentation of the domain box by the imported geometry.

use serde::{Deserialize, Serialize};

use crate::engine::GeometryEngine;
use crate::mesh_error::MesherError;
use crate::pipeline::domain::DomainBox;
use crate::topology::EntitySet;

/// Per-input result of a fragmentation.
///
/// Entry 0 is always the domain box input and entry 1 the imported
/// geometry input, whatever the engine reported. Produced once by
/// [`fragment_domain`] and consumed by entity resolution.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FragmentationMap {
    entries: [EntitySet; 2],
}

impl FragmentationMap {
    pub const DOMAIN: usize = 0;
    pub const IMPORTED: usize = 1;

    pub fn new(domain: EntitySet, imported: EntitySet) -> Self {
        FragmentationMap {
            entries: [domain, imported],
        }
    }

    /// Entities the domain box became.
    pub fn domain(&self) -> &EntitySet {
        &self.entries[Self::DOMAIN]
    }

    /// Entities the imported geometry became.
    pub fn imported(&self) -> &EntitySet {
        &self.entries[Self::IMPORTED]
    }

    pub fn entries(&self) -> &[EntitySet] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(EntitySet::is_empty)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Fragmentation {
    /// Top-level entities after fragmentation.
    pub entities: EntitySet,
    pub map: FragmentationMap,
}

/// Fragments the domain box (sole object) by every imported surface and
/// volume (tools). Failure is fatal.
pub fn fragment_domain<E>(
    engine: &mut E,
    domain: &DomainBox,
    imported: &EntitySet,
) -> Result<Fragmentation, MesherError>
where
    E: GeometryEngine + ?Sized,
{
    let objects = EntitySet::from(vec![domain.volume]);
    let tools = imported.at_least_dim(2).canonical();
    log::info!(
        "fragmenting domain {} with {} tool entities",
        domain.volume,
        tools.len()
    );

    let out = engine.fragment(&objects, &tools).map_err(|e| match e {
        MesherError::Geometry(_) => e,
        other => MesherError::geometry(format!("fragmentation failed: {other}")),
    })?;

    // Kernel map: the object first, then one entry per tool.
    let map = match out.per_input.split_first() {
        Some((domain_entry, tool_entries)) => {
            let mut merged = EntitySet::new();
            for entry in tool_entries {
                merged.merge(entry);
            }
            FragmentationMap::new(domain_entry.deduplicated(), merged)
        }
        None => {
            log::warn!("fragmentation returned no per-input map; resolution falls back to topology");
            FragmentationMap::default()
        }
    };
    if !out.per_input.is_empty() && out.per_input.len() != tools.len() + 1 {
        log::warn!(
            "fragmentation map has {} entries for {} inputs",
            out.per_input.len(),
            tools.len() + 1
        );
    }
    log::debug!("fragmentation map: domain {:?}", map.domain().as_slice());
    log::debug!("fragmentation map: imported {:?}", map.imported().as_slice());

    Ok(Fragmentation {
        entities: out.entities,
        map,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{FaultPlan, InMemoryEngine};
    use crate::geometry::BoundingBox;
    use crate::pipeline::domain::synthesize_domain;
    use crate::topology::DimTag;

    fn cube_in_domain(eng: &mut InMemoryEngine) -> (DomainBox, EntitySet) {
        eng.add_box(&BoundingBox::new([0.0; 3], [1.0; 3])).unwrap();
        let imported = eng.entities(None);
        let domain = synthesize_domain(eng, &imported, 5.0).unwrap();
        (domain, imported)
    }

    #[test]
    fn map_has_domain_then_imported() {
        let mut eng = InMemoryEngine::new();
        let (domain, imported) = cube_in_domain(&mut eng);
        let frag = fragment_domain(&mut eng, &domain, &imported).unwrap();
        assert!(frag.map.domain().contains(domain.volume));
        assert!(frag.map.imported().contains(DimTag::volume(1)));
        assert_eq!(frag.map.imported().of_dim(2).len(), 6);
    }

    #[test]
    fn kernel_failure_is_a_geometry_error() {
        let mut eng = InMemoryEngine::with_faults(FaultPlan {
            fragment_fails: true,
            ..FaultPlan::default()
        });
        let (domain, imported) = cube_in_domain(&mut eng);
        let err = fragment_domain(&mut eng, &domain, &imported).unwrap_err();
        assert!(matches!(err, MesherError::Geometry(_)));
    }

    #[test]
    fn missing_kernel_map_yields_empty_entries() {
        let mut eng = InMemoryEngine::with_faults(FaultPlan {
            drop_fragment_map: true,
            ..FaultPlan::default()
        });
        let (domain, imported) = cube_in_domain(&mut eng);
        let frag = fragment_domain(&mut eng, &domain, &imported).unwrap();
        assert!(frag.map.is_empty());
        assert_eq!(frag.map.entries().len(), 2);
    }
}
