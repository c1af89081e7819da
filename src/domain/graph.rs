use std::collections::{BTreeSet, HashMap};

use crate::domain::table::TableDescriptor;
use crate::domain::value_objects::TableName;

/// Foreign-key dependency graph over a set of reflected tables.
///
/// Nodes live in an arena indexed by position; edges point from a
/// referenced (parent) table to its referencing (child) table. References
/// to tables outside the set (filtered out of the migration) are ignored,
/// as are self-references.
#[derive(Debug)]
pub struct TableGraph {
    names: Vec<TableName>,
    children: Vec<Vec<usize>>,
    indegree: Vec<usize>,
}

/// A set of mutually dependent tables that cannot be ordered.
/// First-class output, not an error type: the caller decides whether to
/// refuse the request or retry with foreign keys skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle {
    pub members: Vec<TableName>,
}

impl Cycle {
    pub fn describe(&self) -> String {
        self.members
            .iter()
            .map(|t| t.0.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

impl TableGraph {
    pub fn build(tables: &[TableDescriptor]) -> Self {
        let names: Vec<TableName> = tables.iter().map(|t| t.name.clone()).collect();
        let index: HashMap<String, usize> = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.0.to_lowercase(), i))
            .collect();

        let mut children = vec![Vec::new(); names.len()];
        let mut indegree = vec![0usize; names.len()];
        for (child, table) in tables.iter().enumerate() {
            for parent_name in table.referenced_tables() {
                if let Some(&parent) = index.get(&parent_name.0.to_lowercase()) {
                    if parent != child && !children[parent].contains(&child) {
                        children[parent].push(child);
                        indegree[child] += 1;
                    }
                }
            }
        }
        Self {
            names,
            children,
            indegree,
        }
    }

    /// Kahn's algorithm. Parents come before children; ties within a
    /// level break alphabetically so the output is deterministic.
    pub fn topological_order(&self) -> Result<Vec<TableName>, Cycle> {
        let mut indegree = self.indegree.clone();
        // ready set keyed by (lowercased name, index) for the alphabetical tie-break
        let mut ready: BTreeSet<(String, usize)> = indegree
            .iter()
            .enumerate()
            .filter(|(_, &d)| d == 0)
            .map(|(i, _)| (self.names[i].0.to_lowercase(), i))
            .collect();

        let mut order = Vec::with_capacity(self.names.len());
        while let Some(entry) = ready.iter().next().cloned() {
            ready.remove(&entry);
            let (_, node) = entry;
            order.push(self.names[node].clone());
            for &child in &self.children[node] {
                indegree[child] -= 1;
                if indegree[child] == 0 {
                    ready.insert((self.names[child].0.to_lowercase(), child));
                }
            }
        }

        if order.len() == self.names.len() {
            Ok(order)
        } else {
            let mut members: Vec<TableName> = indegree
                .iter()
                .enumerate()
                .filter(|(_, &d)| d > 0)
                .map(|(i, _)| self.names[i].clone())
                .collect();
            members.sort_by(|a, b| a.0.to_lowercase().cmp(&b.0.to_lowercase()));
            Err(Cycle { members })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::table::{Constraint, TableKind};
    use crate::domain::value_objects::ColumnName;

    fn table(name: &str, refs: &[&str]) -> TableDescriptor {
        let mut t = TableDescriptor::new(name, TableKind::Table);
        for r in refs {
            t.constraints.push(Constraint::ForeignKey {
                name: None,
                columns: vec![ColumnName(format!("{r}_id"))],
                referenced_table: TableName(r.to_string()),
                referenced_columns: vec![ColumnName("id".into())],
                deferrable: false,
            });
        }
        t
    }

    #[test]
    fn parents_precede_children() {
        let tables = vec![
            table("order_items", &["orders", "products"]),
            table("orders", &["customers"]),
            table("customers", &[]),
            table("products", &[]),
        ];
        let order = TableGraph::build(&tables).topological_order().unwrap();
        let pos = |n: &str| order.iter().position(|t| t.0 == n).unwrap();
        assert!(pos("customers") < pos("orders"));
        assert!(pos("orders") < pos("order_items"));
        assert!(pos("products") < pos("order_items"));
    }

    #[test]
    fn ties_break_alphabetically() {
        let tables = vec![table("zebra", &[]), table("apple", &[]), table("mango", &[])];
        let order = TableGraph::build(&tables).topological_order().unwrap();
        let names: Vec<_> = order.iter().map(|t| t.0.as_str()).collect();
        assert_eq!(names, vec!["apple", "mango", "zebra"]);
    }

    #[test]
    fn cycle_is_reported_with_members() {
        let tables = vec![table("a", &["b"]), table("b", &["a"]), table("c", &[])];
        let cycle = TableGraph::build(&tables).topological_order().unwrap_err();
        let names: Vec<_> = cycle.members.iter().map(|t| t.0.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(cycle.describe(), "a -> b");
    }

    #[test]
    fn self_reference_is_not_a_cycle() {
        let tables = vec![table("employees", &["employees"])];
        let order = TableGraph::build(&tables).topological_order().unwrap();
        assert_eq!(order.len(), 1);
    }

    #[test]
    fn references_outside_the_set_are_ignored() {
        let tables = vec![table("orders", &["customers"])];
        // customers filtered out of the migration
        let order = TableGraph::build(&tables).topological_order().unwrap();
        assert_eq!(order[0].0, "orders");
    }

    #[test]
    fn case_insensitive_reference_resolution() {
        let tables = vec![table("Orders", &["CUSTOMERS"]), table("Customers", &[])];
        let order = TableGraph::build(&tables).topological_order().unwrap();
        assert_eq!(order[0].0, "Customers");
        assert_eq!(order[1].0, "Orders");
    }
}
