//! Fixed relationship graph between the CSV-family tables
//!
//! Relationships are data, not statements: adding or removing a foreign key is
//! an edit to [`FOREIGN_KEYS`].

use std::fmt;

use serde::Serialize;

/// `dependent_table.dependent_column → referenced_table.referenced_column`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Relationship {
    pub dependent_table: &'static str,
    pub dependent_column: &'static str,
    pub referenced_table: &'static str,
    pub referenced_column: &'static str,
}

impl Relationship {
    pub const fn new(
        dependent_table: &'static str,
        dependent_column: &'static str,
        referenced_table: &'static str,
        referenced_column: &'static str,
    ) -> Self {
        Self {
            dependent_table,
            dependent_column,
            referenced_table,
            referenced_column,
        }
    }

    /// Constraint name, e.g. `uses_tribes_fk`
    pub fn constraint_name(&self) -> String {
        format!("{}_{}_fk", self.dependent_table, self.referenced_table)
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{}",
            self.dependent_table, self.dependent_column, self.referenced_table, self.referenced_column
        )
    }
}

/// A foreign-key column that arrives untyped and may hold dangling values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColumnRepair {
    pub relationship: Relationship,
    /// Referenced id standing for "no value"; inserted when absent
    pub placeholder_id: i64,
}

pub const FOREIGN_KEYS: &[Relationship] = &[
    Relationship::new("uses", "use_category", "use_categories", "id"),
    Relationship::new("uses", "use_subcategory", "use_subcategories", "id"),
    Relationship::new("uses", "tribe", "tribes", "id"),
    Relationship::new("uses", "species", "species", "id"),
    Relationship::new("uses", "source", "sources", "id"),
];

pub const REPAIRS: &[ColumnRepair] = &[ColumnRepair {
    relationship: Relationship::new("uses", "use_subcategory", "use_subcategories", "id"),
    placeholder_id: 0,
}];

/// The graph the reconciler enforces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipGraph {
    pub foreign_keys: Vec<Relationship>,
    pub repairs: Vec<ColumnRepair>,
}

impl RelationshipGraph {
    pub fn new(foreign_keys: Vec<Relationship>, repairs: Vec<ColumnRepair>) -> Self {
        Self {
            foreign_keys,
            repairs,
        }
    }
}

impl Default for RelationshipGraph {
    fn default() -> Self {
        Self::new(FOREIGN_KEYS.to_vec(), REPAIRS.to_vec())
    }
}
