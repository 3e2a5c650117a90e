//! Relationship reconciliation
//!
//! Runs once after a CSV batch: repairs the foreign-key columns listed in the
//! graph (integer coercion, placeholder row, orphan remap), then installs every
//! foreign key independently. Nothing here aborts the run; each step's outcome
//! lands in the [`ReconcileReport`].

use serde::Serialize;
use tabload_common::LoadError;
use tracing::{error, info, warn};

use crate::relations::{ColumnRepair, Relationship, RelationshipGraph};
use crate::store::TableStore;

/// Where orphaned foreign-key values are pointed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "policy", content = "id", rename_all = "snake_case")]
pub enum OrphanPolicy {
    /// The smallest existing referenced id
    #[default]
    RemapToLowest,
    /// A fixed id; inserted into the referenced table when absent
    RemapTo(i64),
}

/// Outcome of repairing one foreign-key column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairOutcome {
    pub relationship: String,
    pub placeholder_inserted: bool,
    /// Distinct dependent values that had no referenced row
    pub orphan_values: Vec<i64>,
    pub target: Option<i64>,
    pub rows_remapped: u64,
    pub error: Option<String>,
}

impl RepairOutcome {
    fn new(relationship: &Relationship) -> Self {
        Self {
            relationship: relationship.to_string(),
            placeholder_inserted: false,
            orphan_values: Vec::new(),
            target: None,
            rows_remapped: 0,
            error: None,
        }
    }

    fn failed(mut self, relationship: &Relationship, step: &str, message: impl std::fmt::Display) -> Self {
        let err = LoadError::constraint(
            relationship.dependent_table,
            relationship.dependent_column,
            format!("{} failed: {}", step, message),
        );
        error!(relationship = %relationship, error = %err, "Foreign-key repair step failed");
        self.error = Some(err.to_string());
        self
    }
}

/// Outcome of installing one foreign key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConstraintOutcome {
    pub relationship: String,
    pub constraint: String,
    pub error: Option<String>,
}

impl ConstraintOutcome {
    pub fn is_installed(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub repairs: Vec<RepairOutcome>,
    pub constraints: Vec<ConstraintOutcome>,
}

impl ReconcileReport {
    pub fn installed(&self) -> usize {
        self.constraints.iter().filter(|c| c.is_installed()).count()
    }

    pub fn failed(&self) -> usize {
        self.constraints.len() - self.installed()
    }

    pub fn rows_remapped(&self) -> u64 {
        self.repairs.iter().map(|r| r.rows_remapped).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.failed() == 0 && self.repairs.iter().all(|r| r.error.is_none())
    }
}

/// Enforces a [`RelationshipGraph`] on loaded tables
pub struct Reconciler {
    graph: RelationshipGraph,
    policy: OrphanPolicy,
}

impl Reconciler {
    pub fn new(graph: RelationshipGraph, policy: OrphanPolicy) -> Self {
        Self { graph, policy }
    }

    pub async fn run<S>(&self, store: &S) -> ReconcileReport
    where
        S: TableStore + ?Sized,
    {
        info!(
            repairs = self.graph.repairs.len(),
            foreign_keys = self.graph.foreign_keys.len(),
            "Reconciling relationships"
        );

        let mut report = ReconcileReport::default();

        for repair in &self.graph.repairs {
            report.repairs.push(self.repair(store, repair).await);
        }

        for relationship in &self.graph.foreign_keys {
            let mut outcome = ConstraintOutcome {
                relationship: relationship.to_string(),
                constraint: relationship.constraint_name(),
                error: None,
            };

            match store.add_foreign_key(relationship).await {
                Ok(()) => info!(relationship = %relationship, "Foreign key installed"),
                Err(e) => {
                    let err = LoadError::constraint(
                        relationship.dependent_table,
                        relationship.dependent_column,
                        format!("{}: {}", outcome.constraint, e),
                    );
                    warn!(relationship = %relationship, error = %err, "Failed to install foreign key");
                    outcome.error = Some(err.to_string());
                },
            }
            report.constraints.push(outcome);
        }

        info!(
            installed = report.installed(),
            failed = report.failed(),
            rows_remapped = report.rows_remapped(),
            "Reconciliation finished"
        );

        report
    }

    async fn repair<S>(&self, store: &S, repair: &ColumnRepair) -> RepairOutcome
    where
        S: TableStore + ?Sized,
    {
        let rel = &repair.relationship;
        let mut outcome = RepairOutcome::new(rel);

        if let Err(e) = store
            .coerce_to_integer(rel.dependent_table, rel.dependent_column)
            .await
        {
            return outcome.failed(rel, "integer coercion", e);
        }

        match store
            .ensure_key_row(rel.referenced_table, rel.referenced_column, repair.placeholder_id)
            .await
        {
            Ok(inserted) => outcome.placeholder_inserted = inserted,
            Err(e) => return outcome.failed(rel, "placeholder insert", e),
        }

        outcome.orphan_values = match store.find_orphans(rel).await {
            Ok(values) => values,
            Err(e) => return outcome.failed(rel, "orphan scan", e),
        };
        if outcome.orphan_values.is_empty() {
            return outcome;
        }

        let target = match self.policy {
            OrphanPolicy::RemapTo(id) => store
                .ensure_key_row(rel.referenced_table, rel.referenced_column, id)
                .await
                .map(|_| Some(id)),
            OrphanPolicy::RemapToLowest => {
                store.lowest_key(rel.referenced_table, rel.referenced_column).await
            },
        };
        let target = match target {
            Ok(Some(id)) => id,
            Ok(None) => return outcome.failed(rel, "orphan remap", "referenced table is empty"),
            Err(e) => return outcome.failed(rel, "orphan remap", e),
        };
        outcome.target = Some(target);

        match store.remap_orphans(rel, target).await {
            Ok(rows) => {
                outcome.rows_remapped = rows;
                warn!(
                    relationship = %rel,
                    orphan_values = ?outcome.orphan_values,
                    target = target,
                    rows = rows,
                    "Remapped orphaned foreign-key values"
                );
                outcome
            },
            Err(e) => outcome.failed(rel, "orphan remap", e),
        }
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(RelationshipGraph::default(), OrphanPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_counts() {
        let report = ReconcileReport {
            repairs: vec![],
            constraints: vec![
                ConstraintOutcome {
                    relationship: "uses.tribe -> tribes.id".into(),
                    constraint: "uses_tribes_fk".into(),
                    error: None,
                },
                ConstraintOutcome {
                    relationship: "uses.source -> sources.id".into(),
                    constraint: "uses_sources_fk".into(),
                    error: Some("relation \"sources\" does not exist".into()),
                },
            ],
        };

        assert_eq!(report.installed(), 1);
        assert_eq!(report.failed(), 1);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_default_policy_is_lowest() {
        assert_eq!(OrphanPolicy::default(), OrphanPolicy::RemapToLowest);
    }
}
