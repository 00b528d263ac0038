//! SQL Query Validator
//!
//! Admits only a single read-only query against a staged session.
//! Uses the Chain of Responsibility pattern for validation rules; the
//! store re-checks the prepared statement before running it.

use crate::core::{DbError, Result};
use sqlparser::ast::{SetExpr, Statement};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer};

/// Keywords that only appear in statements with side effects.
const FORBIDDEN_KEYWORDS: [&str; 16] = [
    "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "ATTACH", "DETACH", "PRAGMA",
    "VACUUM", "REINDEX", "TRUNCATE", "GRANT", "REVOKE", "MERGE", "UPSERT",
];

/// Trait for validation rules (Chain of Responsibility pattern)
pub trait ValidationRule: Send + Sync {
    fn validate(&self, sql: &str, parsed: &[Statement]) -> Result<()>;
}

/// Exactly one statement per call
#[derive(Debug, Clone, Default)]
pub struct SingleStatementRule;

impl ValidationRule for SingleStatementRule {
    fn validate(&self, _sql: &str, parsed: &[Statement]) -> Result<()> {
        match parsed.len() {
            1 => Ok(()),
            0 => Err(DbError::DisallowedStatement("empty query".to_string())),
            n => Err(DbError::DisallowedStatement(format!(
                "expected a single statement, found {}",
                n
            ))),
        }
    }
}

/// Validates that the statement is a SELECT (optionally with a WITH clause)
#[derive(Debug, Clone, Default)]
pub struct SelectOnlyRule;

impl ValidationRule for SelectOnlyRule {
    fn validate(&self, _sql: &str, parsed: &[Statement]) -> Result<()> {
        for statement in parsed {
            let Statement::Query(query) = statement else {
                return Err(DbError::DisallowedStatement(
                    "only SELECT queries are allowed".to_string(),
                ));
            };
            if writes_data(&query.body) {
                return Err(DbError::DisallowedStatement(
                    "query body must not write data (SELECT ... INTO, DML in WITH)".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn writes_data(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(select) => select.into.is_some(),
        SetExpr::Query(query) => writes_data(&query.body),
        SetExpr::SetOperation { left, right, .. } => writes_data(left) || writes_data(right),
        SetExpr::Values(_) | SetExpr::Table(_) => false,
        _ => true,
    }
}

/// Rejects data- and schema-modification keywords anywhere in the text,
/// including CTE bodies. Quoted identifiers and string literals are ignored.
#[derive(Debug, Clone, Default)]
pub struct ForbiddenKeywordRule;

impl ValidationRule for ForbiddenKeywordRule {
    fn validate(&self, sql: &str, _parsed: &[Statement]) -> Result<()> {
        scan_forbidden_keywords(sql)
    }
}

fn scan_forbidden_keywords(sql: &str) -> Result<()> {
    let dialect = SQLiteDialect {};
    let tokens = Tokenizer::new(&dialect, sql)
        .tokenize()
        .map_err(|e| DbError::SqlExecution(e.to_string()))?;

    for token in tokens {
        if let Token::Word(word) = token {
            if word.quote_style.is_some() {
                continue;
            }
            let upper = word.value.to_ascii_uppercase();
            if FORBIDDEN_KEYWORDS.contains(&upper.as_str()) {
                return Err(DbError::DisallowedStatement(format!(
                    "keyword {} is not allowed in a read-only query",
                    upper
                )));
            }
        }
    }
    Ok(())
}

/// Main query validator using Chain of Responsibility
pub struct QueryValidator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl QueryValidator {
    /// Create validator with default rules
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(SingleStatementRule),
                Box::new(SelectOnlyRule),
                Box::new(ForbiddenKeywordRule),
            ],
        }
    }

    /// Create validator with custom rules
    pub fn with_rules(rules: Vec<Box<dyn ValidationRule>>) -> Self {
        Self { rules }
    }

    /// Validate a query against all rules
    pub fn validate(&self, sql: &str) -> Result<()> {
        let dialect = SQLiteDialect {};
        let statements = match Parser::parse_sql(&dialect, sql) {
            Ok(statements) => statements,
            Err(err) => {
                // A write the parser doesn't know is still a write.
                scan_forbidden_keywords(sql)?;
                return Err(err.into());
            }
        };

        for rule in &self.rules {
            rule.validate(sql, &statements)?;
        }

        Ok(())
    }
}

impl Default for QueryValidator {
    fn default() -> Self {
        Self::new()
    }
}
