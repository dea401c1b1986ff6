use crate::actor::Actor;
use crate::error::{Result, UpliftError};
use crate::message::MessageType;
use crate::phase::Phase;
use std::collections::{BTreeMap, BTreeSet};

// ---------------------------------------------------------------------------
// ActorRegistry
// ---------------------------------------------------------------------------

/// Immutable table of actors, built once at startup from their manifests.
///
/// Construction orders each phase's actors topologically along intra-phase
/// produce/consume edges (declaration order breaks ties, so the result is
/// deterministic) and validates every declared contract before any actor
/// executes:
///
/// - actor names are unique,
/// - every actor carries exactly one phase tag,
/// - every consumed type has a producer earlier in phase order, or earlier
///   in the same phase's topological order, or is externally fed,
/// - no intra-phase dependency cycles.
///
/// A violation fails the whole run up front rather than partway through.
pub struct ActorRegistry {
    actors: Vec<Box<dyn Actor>>,
    by_phase: BTreeMap<Phase, Vec<usize>>,
    producers: BTreeMap<MessageType, Vec<String>>,
}

impl std::fmt::Debug for ActorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorRegistry")
            .field(
                "actors",
                &self
                    .actors
                    .iter()
                    .map(|a| a.manifest().name.clone())
                    .collect::<Vec<_>>(),
            )
            .field("by_phase", &self.by_phase)
            .field("producers", &self.producers)
            .finish()
    }
}

impl ActorRegistry {
    pub fn build(
        actors: Vec<Box<dyn Actor>>,
        externally_fed: &BTreeSet<MessageType>,
    ) -> Result<Self> {
        let mut seen = BTreeSet::new();
        let mut producers: BTreeMap<MessageType, Vec<String>> = BTreeMap::new();
        let mut by_phase: BTreeMap<Phase, Vec<usize>> = BTreeMap::new();

        for (i, actor) in actors.iter().enumerate() {
            let manifest = actor.manifest();
            if !seen.insert(manifest.name.clone()) {
                return Err(UpliftError::DuplicateActor(manifest.name.clone()));
            }
            let phase = match manifest.phase() {
                Some(p) => p,
                None => {
                    let phase_tags = manifest.tags.iter().filter_map(|t| t.phase()).count();
                    if phase_tags == 0 {
                        return Err(UpliftError::MissingPhaseTag(manifest.name.clone()));
                    }
                    return Err(UpliftError::MultiplePhaseTags(manifest.name.clone()));
                }
            };
            for msg_type in &manifest.produces {
                producers
                    .entry(msg_type.clone())
                    .or_default()
                    .push(manifest.name.clone());
            }
            by_phase.entry(phase).or_default().push(i);
        }

        for (phase, indices) in by_phase.iter_mut() {
            let ordered = order_phase(&actors, *phase, indices.as_slice())?;
            *indices = ordered;
        }

        let registry = ActorRegistry {
            actors,
            by_phase,
            producers,
        };
        registry.validate_consumers(externally_fed)?;
        Ok(registry)
    }

    /// Actors of `phase` in execution order.
    pub fn actors_in_phase(&self, phase: Phase) -> Vec<&dyn Actor> {
        self.by_phase
            .get(&phase)
            .map(|indices| indices.iter().map(|&i| self.actors[i].as_ref()).collect())
            .unwrap_or_default()
    }

    pub fn producers_of(&self, msg_type: &MessageType) -> &[String] {
        self.producers
            .get(msg_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// Walk phases in order, tracking which types are available at each
    /// point; every consumption must be satisfied by then.
    fn validate_consumers(&self, externally_fed: &BTreeSet<MessageType>) -> Result<()> {
        let mut available: BTreeSet<MessageType> = externally_fed.clone();
        for phase in Phase::all() {
            for actor in self.actors_in_phase(*phase) {
                let manifest = actor.manifest();
                for msg_type in &manifest.consumes {
                    if !available.contains(msg_type) {
                        return Err(UpliftError::UnsatisfiedConsumer {
                            actor: manifest.name.clone(),
                            msg_type: msg_type.to_string(),
                        });
                    }
                }
                available.extend(manifest.produces.iter().cloned());
            }
        }
        Ok(())
    }
}

/// Kahn's algorithm over intra-phase produce/consume edges. Among ready
/// nodes, the earliest-declared runs first.
fn order_phase(actors: &[Box<dyn Actor>], phase: Phase, indices: &[usize]) -> Result<Vec<usize>> {
    let n = indices.len();
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut indegree = vec![0usize; n];

    for (a, &ia) in indices.iter().enumerate() {
        let produces = &actors[ia].manifest().produces;
        for (b, &ib) in indices.iter().enumerate() {
            if a == b {
                continue;
            }
            let consumes = &actors[ib].manifest().consumes;
            if produces.iter().any(|t| consumes.contains(t)) {
                successors[a].push(b);
                indegree[b] += 1;
            }
        }
    }

    let mut done = vec![false; n];
    let mut ordered = Vec::with_capacity(n);
    while ordered.len() < n {
        let Some(next) = (0..n).find(|&i| !done[i] && indegree[i] == 0) else {
            let stuck: Vec<&str> = (0..n)
                .filter(|&i| !done[i])
                .map(|i| actors[indices[i]].manifest().name.as_str())
                .collect();
            return Err(UpliftError::DependencyCycle {
                phase,
                actors: stuck.join(", "),
            });
        };
        done[next] = true;
        ordered.push(indices[next]);
        for &succ in &successors[next] {
            indegree[succ] -= 1;
        }
    }
    Ok(ordered)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
