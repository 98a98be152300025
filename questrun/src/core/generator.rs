//! Deterministic objective generation.
//!
//! One ChaCha stream, seeded from the run id, is consumed in a fixed order:
//! phases ascending; per phase the task count first, then PRIMARY,
//! SECONDARY_1..n, TASK_1..m; per slot template, pool, item, quantity. Every
//! candidate list is sorted before drawing so file order never leaks into the
//! result. The same content and run id always produce the same objectives.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tracing::{debug, info};
use uuid::Uuid;

use super::content::{ContentSnapshot, GeneratorPhaseRule};
use super::objective::{
    ObjectiveDefinition, ObjectiveMap, PhaseObjectives, Provenance, objective_count,
};
use super::slot::ObjectiveSlot;
use super::types::{Action, Category, PHASES, Phase};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("objectives already generated for this run ({existing} definitions); refusing to regenerate")]
    RegenerationConflict { existing: usize },
    #[error("no generator rule for phase {0}")]
    MissingPhaseRule(Phase),
    #[error("phase {phase} {slot}: no eligible templates")]
    EmptyEligible { phase: Phase, slot: ObjectiveSlot },
    #[error("phase {phase} {slot}: unknown template '{template_id}'")]
    UnknownTemplate {
        phase: Phase,
        slot: ObjectiveSlot,
        template_id: String,
    },
    #[error("template '{template_id}' references unknown pool '{pool_id}'")]
    UnknownPool {
        template_id: String,
        pool_id: String,
    },
    #[error("pool '{pool_id}' has no items")]
    EmptyPool { pool_id: String },
    #[error("no quantity rule for phase {phase} {category}/{action}")]
    NoMatchingQuantityRule {
        phase: Phase,
        category: Category,
        action: Action,
    },
    #[error(
        "phase {phase} {slot}: retry budget exhausted ({slot_retries} slot retries, {phase_retries} phase retries)"
    )]
    GenerationExhausted {
        phase: Phase,
        slot: ObjectiveSlot,
        slot_retries: u32,
        phase_retries: u32,
    },
}

/// Run seed: XOR of the two 64-bit halves of the run id.
pub fn run_seed(run_id: Uuid) -> u64 {
    let (high, low) = run_id.as_u64_pair();
    high ^ low
}

/// Decides whether a rolled candidate may take its slot.
///
/// `accepted` holds the objectives already placed in the same phase.
pub trait CandidateCheck {
    fn accepts(&self, candidate: &ObjectiveDefinition, accepted: &[ObjectiveDefinition]) -> bool;
}

/// Takes every candidate as rolled.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl CandidateCheck for AcceptAll {
    fn accepts(&self, _candidate: &ObjectiveDefinition, _accepted: &[ObjectiveDefinition]) -> bool {
        true
    }
}

/// Generate every phase's objectives for `run_id`.
///
/// `existing` is the run's current objective set; generation refuses to run
/// over a non-empty one.
pub fn generate(
    snapshot: &ContentSnapshot,
    run_id: Uuid,
    existing: &ObjectiveMap,
    check: &dyn CandidateCheck,
) -> Result<ObjectiveMap, GenerationError> {
    let existing_count = objective_count(existing);
    if existing_count > 0 {
        return Err(GenerationError::RegenerationConflict {
            existing: existing_count,
        });
    }
    let seed = run_seed(run_id);
    let objectives = generate_seeded(snapshot, seed, check)?;
    info!(
        run_id = %run_id,
        seed,
        objectives = objective_count(&objectives),
        "generated objectives"
    );
    Ok(objectives)
}

/// Generation from an explicit seed.
pub fn generate_seeded(
    snapshot: &ContentSnapshot,
    seed: u64,
    check: &dyn CandidateCheck,
) -> Result<ObjectiveMap, GenerationError> {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let mut next_runtime_id: u32 = 1;
    let mut objectives = ObjectiveMap::new();

    for phase in PHASES {
        let rule = snapshot
            .phase_rule(phase)
            .ok_or(GenerationError::MissingPhaseRule(phase))?;
        let accepted = generate_phase(snapshot, rule, &mut rng, &mut next_runtime_id, check)?;
        let slots: PhaseObjectives = accepted
            .into_iter()
            .map(|def| (def.slot_key, def))
            .collect();
        objectives.insert(phase, slots);
    }
    Ok(objectives)
}

fn phase_slots(rule: &GeneratorPhaseRule, task_count: u8) -> Vec<ObjectiveSlot> {
    let mut slots = vec![ObjectiveSlot::Primary];
    slots.extend((1..=rule.secondary.count).map(ObjectiveSlot::Secondary));
    slots.extend((1..=task_count).map(ObjectiveSlot::Task));
    slots
}

fn generate_phase(
    snapshot: &ContentSnapshot,
    rule: &GeneratorPhaseRule,
    rng: &mut ChaCha20Rng,
    next_runtime_id: &mut u32,
    check: &dyn CandidateCheck,
) -> Result<Vec<ObjectiveDefinition>, GenerationError> {
    let phase = rule.phase;
    let span = rule.tasks.count.max - rule.tasks.count.min;
    let task_count = rule.tasks.count.min + rng.gen_range(0..span + 1);
    debug!(phase, task_count, "rolled task count");

    let budget = rule.generation;
    let mut phase_retries: u32 = 0;
    let mut accepted: Vec<ObjectiveDefinition> = Vec::new();

    for slot in phase_slots(rule, task_count) {
        let mut slot_retries: u32 = 0;
        let mut candidate = roll_candidate(snapshot, rule, slot, rng)?;
        while !check.accepts(&candidate, &accepted) {
            if slot_retries >= budget.retry_budget_per_slot
                || phase_retries >= budget.retry_budget_total
            {
                return Err(GenerationError::GenerationExhausted {
                    phase,
                    slot,
                    slot_retries,
                    phase_retries,
                });
            }
            slot_retries += 1;
            phase_retries += 1;
            debug!(phase, %slot, item = %candidate.item_id, slot_retries, "candidate rejected, re-rolling");
            candidate = roll_candidate(snapshot, rule, slot, rng)?;
        }
        candidate.runtime_id = *next_runtime_id;
        *next_runtime_id += 1;
        debug!(
            phase,
            %slot,
            item = %candidate.item_id,
            quantity = candidate.quantity_required,
            "slot filled"
        );
        accepted.push(candidate);
    }
    Ok(accepted)
}

fn eligible_for(rule: &GeneratorPhaseRule, slot: ObjectiveSlot) -> &[String] {
    match slot {
        ObjectiveSlot::Primary => &rule.primary.eligible_templates,
        ObjectiveSlot::Secondary(_) => &rule.secondary.eligible_templates,
        ObjectiveSlot::Task(_) => &rule.tasks.eligible_templates,
    }
}

fn pick<'a, R: Rng>(rng: &mut R, sorted: &[&'a String]) -> &'a String {
    sorted[rng.gen_range(0..sorted.len())]
}

fn sorted_refs(values: &[String]) -> Vec<&String> {
    let mut refs: Vec<&String> = values.iter().collect();
    refs.sort();
    refs
}

/// Roll one candidate for `slot`. The runtime id is assigned on acceptance.
fn roll_candidate(
    snapshot: &ContentSnapshot,
    rule: &GeneratorPhaseRule,
    slot: ObjectiveSlot,
    rng: &mut ChaCha20Rng,
) -> Result<ObjectiveDefinition, GenerationError> {
    let phase = rule.phase;

    let eligible = sorted_refs(eligible_for(rule, slot));
    if eligible.is_empty() {
        return Err(GenerationError::EmptyEligible { phase, slot });
    }
    let template_id = pick(rng, &eligible);
    let template = snapshot
        .template(template_id)
        .ok_or_else(|| GenerationError::UnknownTemplate {
            phase,
            slot,
            template_id: template_id.clone(),
        })?;

    let pool_refs = sorted_refs(&template.pool_refs);
    if pool_refs.is_empty() {
        return Err(GenerationError::UnknownPool {
            template_id: template.id.clone(),
            pool_id: String::new(),
        });
    }
    let pool_id = pick(rng, &pool_refs);
    let pool = snapshot
        .pool(pool_id)
        .ok_or_else(|| GenerationError::UnknownPool {
            template_id: template.id.clone(),
            pool_id: pool_id.clone(),
        })?;

    let items = sorted_refs(&pool.items);
    if items.is_empty() {
        return Err(GenerationError::EmptyPool {
            pool_id: pool.id.clone(),
        });
    }
    let item_id = pick(rng, &items);

    let quantity_rule = snapshot
        .quantity_rule_for(phase, template.category, template.action)
        .ok_or(GenerationError::NoMatchingQuantityRule {
            phase,
            category: template.category,
            action: template.action,
        })?;
    let quantity = quantity_rule.min + quantity_rule.step * rng.gen_range(0..quantity_rule.steps());

    Ok(ObjectiveDefinition {
        runtime_id: 0,
        phase,
        slot_key: slot,
        category: template.category,
        action: template.action,
        item_id: item_id.clone(),
        quantity_required: quantity,
        cohesion: snapshot.cohesion_for(template),
        provenance: Provenance {
            template_id: template.id.clone(),
            pool_id: pool.id.clone(),
            quantity_rule_id: quantity_rule.id.clone(),
            constraint_ids_applied: template.constraints.clone(),
        },
    })
}
