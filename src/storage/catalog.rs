use super::StagedTable;
use crate::json::Relationship;
use indexmap::IndexMap;
use std::sync::Arc;

/// Metadata of one session store: staged tables and the relationships
/// between them.
///
/// Immutable once built; cloning is cheap (`Arc`) and every change produces
/// a new catalog (copy-on-write), so a failed load simply drops its copy.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    /// Keyed by lower-cased name, in creation order.
    tables: Arc<IndexMap<String, StagedTable>>,
    relationships: Arc<Vec<Relationship>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a table - returns a NEW Catalog
    pub fn with_table(self, table: StagedTable) -> Self {
        let mut tables = (*self.tables).clone();
        tables.insert(table.name().to_ascii_lowercase(), table);
        Self {
            tables: Arc::new(tables),
            relationships: self.relationships,
        }
    }

    /// Add a relationship - returns a NEW Catalog
    ///
    /// An edge that is already known keeps its place and takes the newer
    /// confidence.
    pub fn with_relationship(self, relationship: Relationship) -> Self {
        let mut relationships = (*self.relationships).clone();
        match relationships.iter_mut().find(|r| r.same_edge(&relationship)) {
            Some(existing) => existing.confidence = relationship.confidence,
            None => relationships.push(relationship),
        }
        Self {
            tables: self.tables,
            relationships: Arc::new(relationships),
        }
    }

    pub fn get_table(&self, name: &str) -> Option<&StagedTable> {
        self.tables.get(&name.to_ascii_lowercase())
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(&name.to_ascii_lowercase())
    }

    pub fn tables(&self) -> impl Iterator<Item = &StagedTable> {
        self.tables.values()
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    /// Relationships touching `table`, as source, target or junction.
    pub fn relationships_for(&self, table: &str) -> Vec<Relationship> {
        self.relationships
            .iter()
            .filter(|r| r.involves(table))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json::RelationshipKind;

    fn fk(confidence: f64) -> Relationship {
        Relationship {
            kind: RelationshipKind::ForeignKey,
            from_table: "interactions".into(),
            from_column: "drugs_id".into(),
            to_table: "drugs".into(),
            to_column: "id".into(),
            junction_table: None,
            field: "interactions".into(),
            confidence,
        }
    }

    #[test]
    fn test_copy_on_write() {
        let empty = Catalog::new();
        let one = empty.clone().with_table(StagedTable::entity("Drugs"));

        assert_eq!(empty.table_count(), 0);
        assert_eq!(one.table_count(), 1);
        assert!(one.table_exists("drugs"));
        assert_eq!(one.get_table("DRUGS").unwrap().name(), "Drugs");
    }

    #[test]
    fn test_relationships_are_deduplicated() {
        let catalog = Catalog::new()
            .with_table(StagedTable::entity("drugs"))
            .with_table(StagedTable::entity("interactions"))
            .with_relationship(fk(1.0))
            .with_relationship(fk(0.5));

        assert_eq!(catalog.relationships().len(), 1);
        assert_eq!(catalog.relationships()[0].confidence, 0.5);
        assert_eq!(catalog.relationships_for("drugs").len(), 1);
        assert!(catalog.relationships_for("genes").is_empty());
        let names: Vec<&str> = catalog.tables().map(StagedTable::name).collect();
        assert_eq!(names, vec!["drugs", "interactions"]);
    }
}
