//! Best-effort repair of the resolved fluid volume.
//!
//! Healing never fails the run. The configured repair is tried first; if the
//! kernel rejects it, one conservative retry runs with only the local fixes
//! (degenerate entities, small edges). If that also fails, or the kernel
//! hands back something unusable, the pre-heal entities are kept.

use serde::{Deserialize, Serialize};

use crate::config::HealOptions;
use crate::engine::{GeometryEngine, HealFlags};
use crate::topology::EntitySet;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealStatus {
    Disabled,
    Healed,
    /// The conservative retry succeeded.
    HealedConservatively,
    /// Every attempt failed; pre-heal entities kept.
    Reverted,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealOutcome {
    pub volumes: EntitySet,
    pub status: HealStatus,
}

fn conservative(flags: HealFlags) -> HealFlags {
    HealFlags {
        fix_degenerated: flags.fix_degenerated,
        fix_small_edges: flags.fix_small_edges,
        fix_small_faces: false,
        sew_faces: false,
        make_solids: false,
    }
}

/// Heals `fluid` in place, falling back to the original set on failure.
pub fn heal_fluid<E>(engine: &mut E, fluid: &EntitySet, opts: &HealOptions) -> HealOutcome
where
    E: GeometryEngine + ?Sized,
{
    if !opts.enabled {
        return HealOutcome {
            volumes: fluid.clone(),
            status: HealStatus::Disabled,
        };
    }

    let attempts = [
        (opts.flags, HealStatus::Healed),
        (conservative(opts.flags), HealStatus::HealedConservatively),
    ];
    for (i, &(flags, status)) in attempts.iter().enumerate() {
        if i > 0 && flags == attempts[i - 1].0 {
            break;
        }
        match engine.heal(fluid, opts.tolerance, flags) {
            Ok(healed) => {
                let volumes = healed.of_dim(3).canonical();
                let known = engine.entities(Some(3));
                if volumes.is_empty() || volumes.iter().any(|v| !known.contains(*v)) {
                    log::warn!(
                        "healing returned unusable volumes {:?}; keeping pre-heal entities",
                        healed.as_slice()
                    );
                    break;
                }
                log::info!("healed fluid volume(s) {:?}", volumes.as_slice());
                return HealOutcome { volumes, status };
            }
            Err(e) => log::warn!("healing attempt {} failed: {e}", i + 1),
        }
    }

    log::warn!("healing skipped; continuing with pre-heal entities");
    HealOutcome {
        volumes: fluid.clone(),
        status: HealStatus::Reverted,
    }
}
