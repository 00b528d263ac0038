/// Staging tests
///
/// Schema inference, relationship detection and materialization seen
/// through the public engine.
/// Run with: cargo test --test staging_tests

use gqlstage::{ColumnType, DbError, RelationshipKind, StagingEngine, Value};
use serde_json::json;

fn drug_document() -> serde_json::Value {
    json!({"drugs": {"nodes": [{
        "name": "Imatinib",
        "interactions": [{"gene": {"name": "ABL1"}, "interactionScore": 5.2}]
    }]}})
}

#[tokio::test]
async fn test_drug_interaction_example() {
    let engine = StagingEngine::new();
    let staged = engine.stage(&drug_document()).await.unwrap();
    let details = &staged.processing_details;

    assert!(details.success);
    assert_eq!(details.table_count, 3);
    assert_eq!(details.total_rows, 3);
    assert_eq!(details.metadata.relationship_count, 2);
    let names: Vec<&str> = details.tables.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["drugs", "interactions", "genes"]);

    let drugs = details.table("drugs").unwrap();
    assert_eq!(drugs.row_count, 1);
    assert_eq!(drugs.sample_data[0]["name"], json!("Imatinib"));

    let interactions = details.table("interactions").unwrap();
    assert_eq!(
        interactions.column("interactionScore").unwrap().column_type,
        ColumnType::Real
    );
    assert!(interactions.column("drugs_id").is_some());
    assert!(interactions.column("gene_id").is_some());

    let result = engine
        .try_query(
            &staged.access_id,
            "SELECT d.name, g.name FROM drugs d JOIN interactions i ON i.drugs_id=d.id JOIN genes g ON i.gene_id=g.id",
        )
        .await
        .unwrap();

    assert_eq!(result.row_count(), 1);
    assert_eq!(
        result.rows[0],
        vec![Value::Text("Imatinib".into()), Value::Text("ABL1".into())]
    );
}

#[tokio::test]
async fn test_scalar_only_inputs() {
    let engine = StagingEngine::new();

    let staged = engine
        .stage(&json!([{"a": 1, "b": "x"}, {"a": 2, "b": "y"}, {"a": 3, "b": "z"}]))
        .await
        .unwrap();
    assert_eq!(staged.processing_details.table_count, 1);
    assert_eq!(staged.processing_details.total_rows, 3);

    let staged = engine
        .stage(&json!({"name": "Imatinib", "approved": true, "phase": 4}))
        .await
        .unwrap();
    assert_eq!(staged.processing_details.table_count, 1);
    assert_eq!(staged.processing_details.total_rows, 1);

    let result = engine
        .try_query(&staged.access_id, "SELECT name, approved, phase FROM root")
        .await
        .unwrap();
    assert_eq!(
        result.rows[0],
        vec![
            Value::Text("Imatinib".into()),
            Value::Boolean(true),
            Value::Integer(4)
        ]
    );
}

#[tokio::test]
async fn test_missing_keys_become_null() {
    let engine = StagingEngine::new();
    let staged = engine
        .stage(&json!({"items": [{"a": 1, "b": "x"}, {"a": 2}, {"c": 3.5, "a": 3}]}))
        .await
        .unwrap();

    let items = staged.processing_details.table("items").unwrap();
    assert_eq!(items.row_count, 3);
    assert!(items.column("b").unwrap().nullable);
    assert!(!items.column("a").unwrap().nullable);

    let result = engine
        .try_query(&staged.access_id, "SELECT b, c FROM items ORDER BY id")
        .await
        .unwrap();
    assert_eq!(result.rows[0], vec![Value::Text("x".into()), Value::Null]);
    assert_eq!(result.rows[1], vec![Value::Null, Value::Null]);
    assert_eq!(result.rows[2], vec![Value::Null, Value::Real(3.5)]);
}

#[tokio::test]
async fn test_type_widening_and_confidence() {
    let engine = StagingEngine::new();
    let staged = engine
        .stage(&json!({"items": [{"v": 1}, {"v": 2.5}, {"v": 3}, {"v": null}]}))
        .await
        .unwrap();

    let v = staged
        .processing_details
        .table("items")
        .unwrap()
        .column("v")
        .unwrap()
        .clone();
    assert_eq!(v.column_type, ColumnType::Real);
    assert!((v.confidence - 0.333).abs() < 0.001);
    assert!(v.nullable);
    assert!(staged
        .processing_details
        .metadata
        .optimization_hints
        .iter()
        .any(|h| h.contains("'items.v'")));
}

#[tokio::test]
async fn test_relationship_kinds() {
    let engine = StagingEngine::new();

    let staged = engine
        .stage(&json!({"drugs": [{"name": "a", "company": {"name": "Novartis"}}]}))
        .await
        .unwrap();
    let drugs = staged.processing_details.table("drugs").unwrap();
    assert_eq!(drugs.relationships.len(), 1);
    assert_eq!(drugs.relationships[0].kind, RelationshipKind::ForeignKey);
    assert_eq!(drugs.relationships[0].from_column, "company_id");
    assert_eq!(drugs.relationships[0].to_table, "companies");
    assert_eq!(drugs.relationships[0].confidence, 1.0);

    let staged = engine
        .stage(&json!({"drugs": [
            {"name": "a", "trials": [{"phase": 1}, {"phase": 2}]},
            {"name": "b", "trials": [{"phase": 3}]}
        ]}))
        .await
        .unwrap();
    let trials = staged.processing_details.table("trials").unwrap();
    assert_eq!(trials.relationships.len(), 1);
    let one_to_many = &trials.relationships[0];
    assert_eq!(one_to_many.kind, RelationshipKind::ForeignKey);
    assert_eq!(one_to_many.from_table, "trials");
    assert_eq!(one_to_many.to_table, "drugs");
    assert_eq!(one_to_many.confidence, 1.0);

    let staged = engine
        .stage(&json!({
            "drugs": [{"name": "a", "genes": [{"symbol": "ABL1"}]}],
            "diseases": [{"name": "b", "genes": [{"symbol": "KIT"}]}]
        }))
        .await
        .unwrap();
    let details = &staged.processing_details;
    assert!(details.tables.contains_key("drugs_genes"));
    assert!(details.tables.contains_key("diseases_genes"));
    let genes = details.table("genes").unwrap();
    assert!(genes
        .relationships
        .iter()
        .all(|r| r.kind == RelationshipKind::JunctionTable));

    let result = engine
        .try_query(
            &staged.access_id,
            "SELECT d.name, g.symbol FROM drugs d \
             JOIN drugs_genes dg ON dg.drugs_id = d.id \
             JOIN genes g ON g.id = dg.genes_id",
        )
        .await
        .unwrap();
    assert_eq!(
        result.rows,
        vec![vec![Value::Text("a".into()), Value::Text("ABL1".into())]]
    );
}

#[tokio::test]
async fn test_partial_arrays_lower_confidence() {
    let engine = StagingEngine::new();
    let staged = engine
        .stage(&json!({"drugs": [
            {"name": "a", "trials": [{"phase": 1}]},
            {"name": "b", "trials": []},
            {"name": "c"},
            {"name": "d", "trials": [{"phase": 2}]}
        ]}))
        .await
        .unwrap();

    let trials = staged.processing_details.table("trials").unwrap();
    assert_eq!(trials.relationships[0].confidence, 0.5);
}

#[tokio::test]
async fn test_scalar_arrays_are_json_columns() {
    let engine = StagingEngine::new();
    let staged = engine
        .stage(&json!({"drugs": [{"name": "a", "aliases": ["x", "y"], "meta": {}}]}))
        .await
        .unwrap();

    let drugs = staged.processing_details.table("drugs").unwrap();
    assert_eq!(drugs.column("aliases").unwrap().column_type, ColumnType::Json);
    assert_eq!(staged.processing_details.table_count, 1);

    let result = engine
        .try_query(&staged.access_id, "SELECT aliases, meta FROM drugs")
        .await
        .unwrap();
    assert_eq!(
        result.rows[0],
        vec![Value::Json(json!(["x", "y"])), Value::Json(json!({}))]
    );
}

#[tokio::test]
async fn test_id_fields_are_kept_as_original_id() {
    let engine = StagingEngine::new();
    let staged = engine
        .stage(&json!({"drugs": [{"id": "CHEMBL941", "name": "Imatinib"}]}))
        .await
        .unwrap();

    let result = engine
        .try_query(&staged.access_id, "SELECT id, original_id FROM drugs")
        .await
        .unwrap();
    assert_eq!(
        result.rows[0],
        vec![Value::Integer(1), Value::Text("CHEMBL941".into())]
    );
}

#[tokio::test]
async fn test_empty_array_declares_empty_table() {
    let engine = StagingEngine::new();
    let staged = engine
        .stage(&json!({"drugs": {"nodes": []}}))
        .await
        .unwrap();

    let drugs = staged.processing_details.table("drugs").unwrap();
    assert_eq!(drugs.row_count, 0);
    assert_eq!(drugs.columns.len(), 1);

    let result = engine
        .try_query(&staged.access_id, "SELECT * FROM drugs")
        .await
        .unwrap();
    assert!(result.is_empty());
}

#[tokio::test]
async fn test_idempotent_staging() {
    let engine = StagingEngine::new();
    let first = engine.stage(&drug_document()).await.unwrap();
    let second = engine.stage(&drug_document()).await.unwrap();

    assert_ne!(first.access_id, second.access_id);

    let shape = |details: &gqlstage::ProcessingResult| {
        details
            .tables
            .values()
            .map(|t| {
                (
                    t.table_name.clone(),
                    t.row_count,
                    serde_json::to_value(&t.columns).unwrap(),
                    t.sample_data.clone(),
                )
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(
        shape(&first.processing_details),
        shape(&second.processing_details)
    );
}

#[tokio::test]
async fn test_failed_staging_returns_no_session() {
    let engine = StagingEngine::new();

    let err = engine.stage(&json!("just a string")).await.unwrap_err();
    assert!(matches!(err, DbError::SchemaInference(_)));

    let err = engine
        .stage(&json!({"data": null, "errors": [{"message": "rate limited"}]}))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::SchemaInference(msg) if msg.contains("rate limited")));

    let err = engine.stage_str("{not json").await.unwrap_err();
    assert_eq!(err.kind(), "SchemaInferenceError");

    assert!(engine.sessions().await.is_empty());
}

#[tokio::test]
async fn test_input_is_not_mutated() {
    let engine = StagingEngine::new();
    let document = drug_document();
    let before = document.clone();

    engine.stage(&document).await.unwrap();
    assert_eq!(document, before);
}
