use super::Value;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

pub type Row = Vec<Value>;

/// Storage type of a staged column.
///
/// The variants form a widening lattice: `Integer` widens to `Real`, any
/// scalar mixing with `Text` becomes `Text`, and anything mixing with `Json`
/// becomes `Json`. [`ColumnType::widen`] is total, so unification never fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Real,
    Boolean,
    Text,
    Json,
}

impl ColumnType {
    const ALL: [ColumnType; 5] = [
        ColumnType::Integer,
        ColumnType::Real,
        ColumnType::Boolean,
        ColumnType::Text,
        ColumnType::Json,
    ];

    /// Classify a single JSON value. `null` carries no type information.
    pub fn of(value: &JsonValue) -> Option<ColumnType> {
        match value {
            JsonValue::Null => None,
            JsonValue::Bool(_) => Some(ColumnType::Boolean),
            JsonValue::Number(n) => {
                if n.as_i64().is_some() {
                    Some(ColumnType::Integer)
                } else {
                    Some(ColumnType::Real)
                }
            }
            JsonValue::String(_) => Some(ColumnType::Text),
            JsonValue::Array(_) | JsonValue::Object(_) => Some(ColumnType::Json),
        }
    }

    /// Least upper bound of two types in the widening lattice.
    pub fn widen(self, other: ColumnType) -> ColumnType {
        use ColumnType::*;

        match (self, other) {
            (a, b) if a == b => a,
            (Json, _) | (_, Json) => Json,
            (Text, _) | (_, Text) => Text,
            (Integer, Real) | (Real, Integer) => Real,
            // boolean mixed with a number has no numeric reading
            _ => Text,
        }
    }

    /// Declared type used in DDL.
    ///
    /// `JSON` gets NUMERIC affinity in the store, so serialized documents stay
    /// text while widened bare numbers stay numbers.
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Text => "TEXT",
            ColumnType::Json => "JSON",
        }
    }

    /// Inverse of [`ColumnType::sql_type`] for declared types read back from the store.
    pub fn from_decl(decl: &str) -> Option<ColumnType> {
        match decl.to_ascii_uppercase().as_str() {
            "INTEGER" => Some(ColumnType::Integer),
            "REAL" => Some(ColumnType::Real),
            "BOOLEAN" => Some(ColumnType::Boolean),
            "TEXT" => Some(ColumnType::Text),
            "JSON" => Some(ColumnType::Json),
            _ => None,
        }
    }

    fn index(self) -> usize {
        match self {
            ColumnType::Integer => 0,
            ColumnType::Real => 1,
            ColumnType::Boolean => 2,
            ColumnType::Text => 3,
            ColumnType::Json => 4,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Integer => "integer",
            ColumnType::Real => "real",
            ColumnType::Boolean => "boolean",
            ColumnType::Text => "text",
            ColumnType::Json => "json",
        };
        write!(f, "{}", name)
    }
}

/// Fold one observation into the current type of a field.
pub fn observe(current: Option<ColumnType>, value: &JsonValue) -> Option<ColumnType> {
    match (current, ColumnType::of(value)) {
        (current, None) => current,
        (None, Some(observed)) => Some(observed),
        (Some(current), Some(observed)) => Some(current.widen(observed)),
    }
}

/// Running type observations for one column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeTracker {
    current: Option<ColumnType>,
    observed: [usize; 5],
    nulls: usize,
}

impl TypeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker for a column whose type is fixed, such as a synthetic key.
    pub fn fixed(column_type: ColumnType, observations: usize) -> Self {
        let mut tracker = Self::default();
        tracker.current = Some(column_type);
        tracker.observed[column_type.index()] = observations;
        tracker
    }

    pub fn observe(&mut self, value: &JsonValue) {
        match ColumnType::of(value) {
            None => self.nulls += 1,
            Some(observed) => {
                self.observed[observed.index()] += 1;
                self.current = observe(self.current, value);
            }
        }
    }

    pub fn record(&mut self, column_type: ColumnType) {
        self.observed[column_type.index()] += 1;
        self.current = Some(match self.current {
            Some(current) => current.widen(column_type),
            None => column_type,
        });
    }

    /// Combine with observations made in another batch.
    pub fn merge(&mut self, other: &TypeTracker) {
        for (mine, theirs) in self.observed.iter_mut().zip(other.observed.iter()) {
            *mine += theirs;
        }
        self.nulls += other.nulls;
        self.current = match (self.current, other.current) {
            (Some(a), Some(b)) => Some(a.widen(b)),
            (a, b) => a.or(b),
        };
    }

    /// The unified type; columns that only ever saw `null` are text.
    pub fn column_type(&self) -> ColumnType {
        self.current.unwrap_or(ColumnType::Text)
    }

    pub fn non_null(&self) -> usize {
        self.observed.iter().sum()
    }

    pub fn nulls(&self) -> usize {
        self.nulls
    }

    /// Fraction of non-null observations whose own type equals the final type.
    pub fn confidence(&self) -> f64 {
        let total = self.non_null();
        if total == 0 {
            return 0.0;
        }
        let matched = self.observed[self.column_type().index()];
        matched as f64 / total as f64
    }

    pub fn widened(&self) -> bool {
        ColumnType::ALL
            .iter()
            .filter(|t| self.observed[t.index()] > 0)
            .count()
            > 1
    }
}

/// Role a column plays in its table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ColumnRole {
    PrimaryKey,
    Data,
    ForeignKey { references: String },
}

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub role: ColumnRole,
    pub nullable: bool,
    pub tracker: TypeTracker,
}

impl Column {
    pub fn new(name: impl Into<String>, tracker: TypeTracker) -> Self {
        Self {
            name: name.into(),
            role: ColumnRole::Data,
            nullable: true,
            tracker,
        }
    }

    pub fn primary_key() -> Self {
        Self {
            name: "id".to_string(),
            role: ColumnRole::PrimaryKey,
            nullable: false,
            tracker: TypeTracker::fixed(ColumnType::Integer, 0),
        }
    }

    pub fn foreign_key(name: impl Into<String>, references: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: ColumnRole::ForeignKey {
                references: references.into(),
            },
            nullable: true,
            tracker: TypeTracker::fixed(ColumnType::Integer, 0),
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn column_type(&self) -> ColumnType {
        match self.role {
            ColumnRole::Data => self.tracker.column_type(),
            _ => ColumnType::Integer,
        }
    }

    pub fn confidence(&self) -> f64 {
        match self.role {
            ColumnRole::Data => self.tracker.confidence(),
            _ => 1.0,
        }
    }

    pub fn is_data(&self) -> bool {
        matches!(self.role, ColumnRole::Data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_scalars() {
        assert_eq!(ColumnType::of(&json!(42)), Some(ColumnType::Integer));
        assert_eq!(ColumnType::of(&json!(3.5)), Some(ColumnType::Real));
        assert_eq!(ColumnType::of(&json!("x")), Some(ColumnType::Text));
        assert_eq!(ColumnType::of(&json!(false)), Some(ColumnType::Boolean));
        assert_eq!(ColumnType::of(&json!([1, 2])), Some(ColumnType::Json));
        assert_eq!(ColumnType::of(&json!(null)), None);
    }

    #[test]
    fn test_widening_lattice() {
        use ColumnType::*;

        assert_eq!(Integer.widen(Real), Real);
        assert_eq!(Real.widen(Integer), Real);
        assert_eq!(Integer.widen(Text), Text);
        assert_eq!(Boolean.widen(Text), Text);
        assert_eq!(Boolean.widen(Integer), Text);
        assert_eq!(Text.widen(Json), Json);
        assert_eq!(Json.widen(Integer), Json);
        assert_eq!(Boolean.widen(Boolean), Boolean);
    }

    #[test]
    fn test_observe_ignores_null() {
        let t = observe(None, &json!(null));
        assert_eq!(t, None);

        let t = observe(Some(ColumnType::Integer), &json!(null));
        assert_eq!(t, Some(ColumnType::Integer));

        let t = observe(Some(ColumnType::Integer), &json!(1.5));
        assert_eq!(t, Some(ColumnType::Real));
    }

    #[test]
    fn test_confidence() {
        let mut uniform = TypeTracker::new();
        uniform.observe(&json!(1));
        uniform.observe(&json!(2));
        uniform.observe(&json!(null));
        assert_eq!(uniform.column_type(), ColumnType::Integer);
        assert_eq!(uniform.confidence(), 1.0);
        assert!(!uniform.widened());

        let mut mixed = TypeTracker::new();
        mixed.observe(&json!(1));
        mixed.observe(&json!(2));
        mixed.observe(&json!(2.5));
        mixed.observe(&json!(3.5));
        assert_eq!(mixed.column_type(), ColumnType::Real);
        assert_eq!(mixed.confidence(), 0.5);
        assert!(mixed.widened());

        let mut no_match = TypeTracker::new();
        no_match.observe(&json!(true));
        no_match.observe(&json!(7));
        assert_eq!(no_match.column_type(), ColumnType::Text);
        assert_eq!(no_match.confidence(), 0.0);

        let empty = TypeTracker::new();
        assert_eq!(empty.column_type(), ColumnType::Text);
        assert_eq!(empty.confidence(), 0.0);
    }

    #[test]
    fn test_merge_widens() {
        let mut first = TypeTracker::new();
        first.observe(&json!(10));

        let mut second = TypeTracker::new();
        second.observe(&json!("ten"));

        first.merge(&second);
        assert_eq!(first.column_type(), ColumnType::Text);
        assert_eq!(first.non_null(), 2);
    }
}
