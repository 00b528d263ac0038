//! Optimization hints attached to staging reports.
//!
//! Plain-language notes aimed at whoever writes the follow-up SQL: how the
//! staged tables join, which tables came out empty, which columns had to be
//! widened, and whether the upstream source has more pages.

use super::SchemaInfo;
use crate::core::ColumnRole;
use crate::json::{PaginationInfo, Relationship, RelationshipKind};

/// Tables above this size get a note to filter in SQL.
const LARGE_TABLE_ROWS: usize = 10_000;

pub fn optimization_hints(
    tables: &[SchemaInfo],
    relationships: &[Relationship],
    pagination: Option<&PaginationInfo>,
    low_confidence: f64,
) -> Vec<String> {
    let mut hints = Vec::new();

    for relationship in relationships {
        let label = match relationship.kind {
            RelationshipKind::ForeignKey => "Join",
            RelationshipKind::JunctionTable => "Many-to-many join",
        };
        hints.push(format!("{}: {}", label, relationship.join_hint()));

        if relationship.confidence < low_confidence {
            hints.push(format!(
                "Relationship via '{}' ({} -> {}) has confidence {:.2}; the nested data was irregular",
                relationship.field, relationship.from_table, relationship.to_table, relationship.confidence
            ));
        }
    }

    for table in tables {
        if table.row_count == 0 {
            hints.push(format!(
                "Table '{}' is empty; the source returned no records for it",
                table.table_name
            ));
        } else if table.row_count > LARGE_TABLE_ROWS {
            hints.push(format!(
                "Table '{}' holds {} rows; filter or aggregate in SQL instead of selecting everything",
                table.table_name, table.row_count
            ));
        }

        for column in &table.columns {
            if column.role != ColumnRole::Data || column.confidence >= low_confidence {
                continue;
            }
            if column.confidence == 0.0 {
                hints.push(format!(
                    "Column '{}.{}' held no non-null values; it is typed as {}",
                    table.table_name, column.name, column.column_type
                ));
            } else {
                hints.push(format!(
                    "Column '{}.{}' mixed value types and was widened to {} (confidence {:.2})",
                    table.table_name, column.name, column.column_type, column.confidence
                ));
            }
        }
    }

    if let Some(page) = pagination.filter(|p| p.has_next_page) {
        hints.push(page.suggestion.clone());
    }

    hints
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ColumnType;
    use crate::result::ColumnInfo;
    use chrono::Utc;

    fn table(name: &str, rows: usize, columns: Vec<ColumnInfo>) -> SchemaInfo {
        SchemaInfo {
            table_name: name.into(),
            columns,
            row_count: rows,
            sample_data: Vec::new(),
            relationships: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            pagination: None,
        }
    }

    fn data_column(name: &str, column_type: ColumnType, confidence: f64) -> ColumnInfo {
        ColumnInfo {
            name: name.into(),
            column_type,
            nullable: true,
            confidence,
            role: ColumnRole::Data,
        }
    }

    #[test]
    fn test_empty_table_and_widened_column() {
        let tables = vec![
            table("interactions", 0, vec![]),
            table(
                "drugs",
                4,
                vec![
                    data_column("phase", ColumnType::Text, 0.5),
                    data_column("name", ColumnType::Text, 1.0),
                    data_column("notes", ColumnType::Text, 0.0),
                ],
            ),
        ];
        let hints = optimization_hints(&tables, &[], None, 0.8);

        assert_eq!(hints.len(), 3);
        assert!(hints[0].contains("'interactions' is empty"));
        assert!(hints[1].contains("'drugs.phase'") && hints[1].contains("0.50"));
        assert!(hints[2].contains("no non-null values"));
    }

    #[test]
    fn test_join_and_low_confidence_relationship() {
        let relationship = Relationship {
            kind: RelationshipKind::ForeignKey,
            from_table: "interactions".into(),
            from_column: "drugs_id".into(),
            to_table: "drugs".into(),
            to_column: "id".into(),
            junction_table: None,
            field: "interactions".into(),
            confidence: 0.5,
        };
        let hints = optimization_hints(&[], &[relationship], None, 0.8);

        assert_eq!(hints.len(), 2);
        assert!(hints[0].starts_with("Join: interactions JOIN drugs"));
        assert!(hints[1].contains("confidence 0.50"));
    }
}
