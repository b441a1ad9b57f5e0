//! Workflow reconstruction over a finalized interaction ledger.
//!
//! Recovers draft -> revision(s) -> final oversight structure from the
//! flat chronological sequence, then buckets the result into phase
//! sections. Both passes are pure; outputs borrow the ledger and are
//! owned by the caller.

use review_audit_core::{
    AuditError, Interaction, Ledger, DRAFT_ACTION, REVISION_ACTION,
};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    /// One interaction that matched no oversight pattern.
    Single,
    /// Draft, zero-or-more revisions, and the terminating action, all by
    /// the same agent.
    Oversight,
}

/// One reconstructed unit: a singleton or an oversight group. Items keep
/// their original ledger order; `start_index` is the position of the
/// first item in the flat sequence.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WorkflowGroup<'a> {
    pub kind: GroupKind,
    pub items: Vec<&'a Interaction>,
    pub start_index: usize,
}

/// Phase bucket in first-occurrence order; a phase that reappears later
/// merges into its already-open bucket.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PhaseSection<'a> {
    pub phase: String,
    pub groups: Vec<WorkflowGroup<'a>>,
}

/// Greedy single left-to-right pass, no backtracking. A candidate group
/// opens on a draft marker directly followed by at least one same-agent
/// revision, extends through the revision run, and is emitted only when a
/// same-agent terminating interaction follows the run. Anything else
/// becomes a singleton in its original position.
#[must_use]
pub fn group_interactions(interactions: &[Interaction]) -> Vec<WorkflowGroup<'_>> {
    let mut groups = Vec::new();
    let mut index = 0;

    while index < interactions.len() {
        let current = &interactions[index];

        if current.action == DRAFT_ACTION {
            let mut end = index + 1;
            while end < interactions.len()
                && interactions[end].action == REVISION_ACTION
                && interactions[end].agent == current.agent
            {
                end += 1;
            }

            let has_revisions = end > index + 1;
            let has_terminator =
                end < interactions.len() && interactions[end].agent == current.agent;
            if has_revisions && has_terminator {
                groups.push(WorkflowGroup {
                    kind: GroupKind::Oversight,
                    items: interactions[index..=end].iter().collect(),
                    start_index: index,
                });
                index = end + 1;
                continue;
            }
        }

        groups.push(WorkflowGroup {
            kind: GroupKind::Single,
            items: vec![current],
            start_index: index,
        });
        index += 1;
    }

    groups
}

/// Buckets groups by the phase of their first item. Bucket order is the
/// first-occurrence order of phases across the whole sequence; relative
/// group order inside a bucket is preserved.
#[must_use]
pub fn bucket_by_phase(groups: Vec<WorkflowGroup<'_>>) -> Vec<PhaseSection<'_>> {
    let mut sections: Vec<PhaseSection<'_>> = Vec::new();

    for group in groups {
        let Some(first) = group.items.first() else {
            continue;
        };
        let phase = first.phase.clone();
        match sections.iter_mut().find(|section| section.phase == phase) {
            Some(section) => section.groups.push(group),
            None => sections.push(PhaseSection {
                phase,
                groups: vec![group],
            }),
        }
    }

    sections
}

/// Reconstructs the full workflow view of a finalized ledger.
///
/// # Errors
/// Returns [`AuditError::UnfinalizedLedger`] when the ledger is still
/// being appended to.
pub fn reconstruct(ledger: &Ledger) -> Result<Vec<PhaseSection<'_>>, AuditError> {
    if !ledger.is_finalized() {
        return Err(AuditError::UnfinalizedLedger(ledger.case_id().to_string()));
    }
    Ok(bucket_by_phase(group_interactions(ledger.interactions())))
}
