//! GraphQL connection detection and cursor pagination metadata.

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

const CONNECTION_KEYS: [&str; 4] = ["nodes", "edges", "pageInfo", "totalCount"];

/// Cursor pagination state of a staged GraphQL connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub current_count: usize,
    pub total_count: Option<u64>,
    pub end_cursor: Option<String>,
    pub start_cursor: Option<String>,
    pub suggestion: String,
}

impl PaginationInfo {
    fn from_connection(obj: &Map<String, JsonValue>, current_count: usize) -> Option<Self> {
        let page_info = obj.get("pageInfo").and_then(JsonValue::as_object);
        let total_count = obj.get("totalCount").and_then(JsonValue::as_u64);

        if page_info.is_none() && total_count.is_none() {
            return None;
        }

        let flag = |key: &str| {
            page_info
                .and_then(|p| p.get(key))
                .and_then(JsonValue::as_bool)
                .unwrap_or(false)
        };
        let cursor = |key: &str| {
            page_info
                .and_then(|p| p.get(key))
                .and_then(JsonValue::as_str)
                .map(str::to_string)
        };

        let has_next_page = flag("hasNextPage");
        let end_cursor = cursor("endCursor");
        let suggestion = suggestion(has_next_page, end_cursor.as_deref(), current_count, total_count);

        Some(Self {
            has_next_page,
            has_previous_page: flag("hasPreviousPage"),
            current_count,
            total_count,
            end_cursor,
            start_cursor: cursor("startCursor"),
            suggestion,
        })
    }
}

fn suggestion(
    has_next_page: bool,
    end_cursor: Option<&str>,
    current_count: usize,
    total_count: Option<u64>,
) -> String {
    if !has_next_page {
        return format!("All {} available records were fetched.", current_count);
    }

    let progress = match total_count {
        Some(total) => format!("Fetched {} of {} records.", current_count, total),
        None => format!("Fetched {} records; more are available.", current_count),
    };

    match end_cursor {
        Some(cursor) => format!(
            "{} Re-run the upstream query with `after: \"{}\"` and stage the result to get the next page.",
            progress, cursor
        ),
        None => format!("{} The upstream API did not return an end cursor.", progress),
    }
}

/// A GraphQL connection unwrapped to its node list.
#[derive(Debug)]
pub struct Connection<'a> {
    pub nodes: Vec<&'a JsonValue>,
    pub pagination: Option<PaginationInfo>,
}

/// Recognise `{ nodes | edges, pageInfo?, totalCount? }` and unwrap it.
///
/// Edges contribute their `node`; edges without one are skipped.
pub fn as_connection(obj: &Map<String, JsonValue>) -> Option<Connection<'_>> {
    if obj.is_empty() || !obj.keys().all(|k| CONNECTION_KEYS.contains(&k.as_str())) {
        return None;
    }

    let nodes: Vec<&JsonValue> = match (obj.get("nodes"), obj.get("edges")) {
        (Some(JsonValue::Array(nodes)), _) => nodes.iter().collect(),
        (_, Some(JsonValue::Array(edges))) => edges
            .iter()
            .filter_map(|edge| edge.get("node"))
            .filter(|node| !node.is_null())
            .collect(),
        (Some(JsonValue::Null), _) | (_, Some(JsonValue::Null)) => Vec::new(),
        _ => return None,
    };

    let pagination = PaginationInfo::from_connection(obj, nodes.len());
    Some(Connection { nodes, pagination })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nodes_connection() {
        let value = json!({
            "nodes": [{"name": "a"}, {"name": "b"}],
            "pageInfo": {"hasNextPage": true, "endCursor": "YXJyYXk6MQ=="},
            "totalCount": 10
        });
        let conn = as_connection(value.as_object().unwrap()).unwrap();
        assert_eq!(conn.nodes.len(), 2);

        let page = conn.pagination.unwrap();
        assert!(page.has_next_page);
        assert!(!page.has_previous_page);
        assert_eq!(page.current_count, 2);
        assert_eq!(page.total_count, Some(10));
        assert_eq!(page.end_cursor.as_deref(), Some("YXJyYXk6MQ=="));
        assert!(page.suggestion.contains("after: \"YXJyYXk6MQ==\""));
    }

    #[test]
    fn test_edges_connection() {
        let value = json!({
            "edges": [{"cursor": "c1", "node": {"name": "a"}}, {"cursor": "c2"}]
        });
        let conn = as_connection(value.as_object().unwrap()).unwrap();
        assert_eq!(conn.nodes.len(), 1);
        assert!(conn.pagination.is_none());
    }

    #[test]
    fn test_plain_object_is_not_a_connection() {
        let value = json!({"nodes": [], "name": "x"});
        assert!(as_connection(value.as_object().unwrap()).is_none());

        let value = json!({"totalCount": 3});
        assert!(as_connection(value.as_object().unwrap()).is_none());
    }

    #[test]
    fn test_pagination_serializes_camel_case() {
        let value = json!({"nodes": [], "pageInfo": {"hasNextPage": false}});
        let page = as_connection(value.as_object().unwrap())
            .unwrap()
            .pagination
            .unwrap();
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["hasNextPage"], json!(false));
        assert_eq!(json["totalCount"], json!(null));
    }
}
