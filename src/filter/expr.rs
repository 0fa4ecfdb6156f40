//! Expression-based filtering for header tables
//!
//! This module provides an expression-based filtering system that allows
//! filtering Arrow record batches based on column values.

use std::collections::HashSet;

use arrow::array::{Array, BooleanArray, Float64Array, StringArray};
use arrow::compute::{and, not, or};
use arrow::record_batch::RecordBatch;

use crate::error::{Error, Result};
use crate::filter::core::{filter_record_batch, BatchFilter};

/// Represents a filter expression for querying header tables
#[derive(Debug, Clone)]
pub enum Expr {
    /// Column equals a literal value
    Eq(String, LiteralValue),

    /// Column is less than a literal value
    Lt(String, LiteralValue),

    /// Column is less than or equal to a literal value
    LtEq(String, LiteralValue),

    /// Column is greater than a literal value
    Gt(String, LiteralValue),

    /// Column is greater than or equal to a literal value
    GtEq(String, LiteralValue),

    /// Column is in a set of values
    In(String, Vec<LiteralValue>),

    /// Column is null
    IsNull(String),

    /// Column is not null
    IsNotNull(String),

    /// Column value contains a substring
    Contains(String, String),

    /// Column value contains a substring, ignoring ASCII case
    ContainsIgnoreCase(String, String),

    /// Logical AND of expressions
    And(Vec<Expr>),

    /// Logical OR of expressions
    Or(Vec<Expr>),

    /// Logical NOT of an expression
    Not(Box<Expr>),

    /// Always evaluates to true
    AlwaysTrue,

    /// Always evaluates to false
    AlwaysFalse,
}

/// Represents a literal value that can be used in filter expressions
#[derive(Debug, Clone)]
pub enum LiteralValue {
    /// Floating point value
    Float(f64),

    /// String value
    String(String),
}

impl Expr {
    /// Returns a set of all column names required by this expression
    #[must_use]
    pub fn required_columns(&self) -> HashSet<String> {
        let mut columns = HashSet::new();
        self.collect_required_columns(&mut columns);
        columns
    }

    /// Helper method to collect column names
    fn collect_required_columns(&self, columns: &mut HashSet<String>) {
        match self {
            Self::Eq(col, _)
            | Self::Lt(col, _)
            | Self::LtEq(col, _)
            | Self::Gt(col, _)
            | Self::GtEq(col, _)
            | Self::In(col, _)
            | Self::IsNull(col)
            | Self::IsNotNull(col)
            | Self::Contains(col, _)
            | Self::ContainsIgnoreCase(col, _) => {
                columns.insert(col.clone());
            }
            Self::And(exprs) | Self::Or(exprs) => {
                for expr in exprs {
                    expr.collect_required_columns(columns);
                }
            }
            Self::Not(expr) => {
                expr.collect_required_columns(columns);
            }
            Self::AlwaysTrue | Self::AlwaysFalse => {}
        }
    }
}

/// A filter that evaluates an expression against a record batch
#[derive(Debug, Clone)]
pub struct ExpressionFilter {
    /// The expression to evaluate
    expr: Expr,
}

impl ExpressionFilter {
    /// Create a new expression filter
    #[must_use]
    pub fn new(expr: Expr) -> Self {
        Self { expr }
    }

    /// Evaluate the filter's expression against a record batch
    ///
    /// # Returns
    /// A boolean array indicating which rows match the expression
    ///
    /// # Errors
    /// Returns an error if expression evaluation fails
    pub fn evaluate(&self, batch: &RecordBatch) -> Result<BooleanArray> {
        evaluate_expr(batch, &self.expr)
    }
}

impl BatchFilter for ExpressionFilter {
    fn filter(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        let mask = self.evaluate(batch)?;
        filter_record_batch(batch, &mask)
    }

    fn required_columns(&self) -> HashSet<String> {
        self.expr.required_columns()
    }
}

/// Evaluate an expression against a record batch
///
/// # Arguments
/// * `batch` - The record batch to evaluate against
/// * `expr` - The expression to evaluate
///
/// # Returns
/// A boolean array indicating which rows match the expression
///
/// # Errors
/// Returns an error if a referenced column is missing or holds an
/// unsupported type
pub fn evaluate_expr(batch: &RecordBatch, expr: &Expr) -> Result<BooleanArray> {
    match expr {
        Expr::AlwaysTrue => Ok(BooleanArray::from(vec![true; batch.num_rows()])),
        Expr::AlwaysFalse => Ok(BooleanArray::from(vec![false; batch.num_rows()])),

        Expr::And(exprs) => {
            if exprs.is_empty() {
                return Ok(BooleanArray::from(vec![true; batch.num_rows()]));
            }
            let mut result = evaluate_expr(batch, &exprs[0])?;
            for expr in &exprs[1..] {
                let mask = evaluate_expr(batch, expr)?;
                result = and(&result, &mask).map_err(|e| Error::filter(e.to_string()))?;
            }
            Ok(result)
        }

        Expr::Or(exprs) => {
            if exprs.is_empty() {
                return Ok(BooleanArray::from(vec![false; batch.num_rows()]));
            }
            let mut result = evaluate_expr(batch, &exprs[0])?;
            for expr in &exprs[1..] {
                let mask = evaluate_expr(batch, expr)?;
                result = or(&result, &mask).map_err(|e| Error::filter(e.to_string()))?;
            }
            Ok(result)
        }

        Expr::Not(inner) => {
            let mask = evaluate_expr(batch, inner)?;
            Ok(not(&mask).map_err(|e| Error::filter(e.to_string()))?)
        }

        Expr::Eq(col_name, literal) => evaluate_comparison(batch, col_name, literal, Cmp::Eq),
        Expr::Lt(col_name, literal) => evaluate_comparison(batch, col_name, literal, Cmp::Lt),
        Expr::LtEq(col_name, literal) => evaluate_comparison(batch, col_name, literal, Cmp::LtEq),
        Expr::Gt(col_name, literal) => evaluate_comparison(batch, col_name, literal, Cmp::Gt),
        Expr::GtEq(col_name, literal) => evaluate_comparison(batch, col_name, literal, Cmp::GtEq),

        Expr::IsNull(col_name) => {
            let column = get_column(batch, col_name)?;
            let mut is_null = Vec::with_capacity(column.len());
            for i in 0..column.len() {
                is_null.push(column.is_null(i));
            }
            Ok(BooleanArray::from(is_null))
        }

        Expr::IsNotNull(col_name) => {
            let mask = evaluate_expr(batch, &Expr::IsNull(col_name.clone()))?;
            Ok(not(&mask).map_err(|e| Error::filter(e.to_string()))?)
        }

        Expr::In(col_name, values) => {
            let str_values: HashSet<&str> = values
                .iter()
                .filter_map(|v| match v {
                    LiteralValue::String(s) => Some(s.as_str()),
                    LiteralValue::Float(_) => None,
                })
                .collect();
            let str_array = get_string_column(batch, col_name)?;
            let mut in_set = Vec::with_capacity(str_array.len());
            for i in 0..str_array.len() {
                if str_array.is_null(i) {
                    in_set.push(false);
                } else {
                    in_set.push(str_values.contains(str_array.value(i)));
                }
            }
            Ok(BooleanArray::from(in_set))
        }

        Expr::Contains(col_name, substring) => {
            let str_array = get_string_column(batch, col_name)?;
            let mut contains = Vec::with_capacity(str_array.len());
            for i in 0..str_array.len() {
                if str_array.is_null(i) {
                    contains.push(false);
                } else {
                    contains.push(str_array.value(i).contains(substring));
                }
            }
            Ok(BooleanArray::from(contains))
        }

        Expr::ContainsIgnoreCase(col_name, substring) => {
            let needle = substring.to_lowercase();
            let str_array = get_string_column(batch, col_name)?;
            let mut contains = Vec::with_capacity(str_array.len());
            for i in 0..str_array.len() {
                if str_array.is_null(i) {
                    contains.push(false);
                } else {
                    contains.push(str_array.value(i).to_lowercase().contains(&needle));
                }
            }
            Ok(BooleanArray::from(contains))
        }
    }
}

/// Comparison operator for scalar comparisons
#[derive(Debug, Clone, Copy)]
enum Cmp {
    Eq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

fn evaluate_comparison(
    batch: &RecordBatch,
    col_name: &str,
    literal: &LiteralValue,
    cmp: Cmp,
) -> Result<BooleanArray> {
    use arrow::compute::kernels::cmp::{eq, gt, gt_eq, lt, lt_eq};

    let column = get_column(batch, col_name)?;

    match literal {
        LiteralValue::Float(n) => {
            let float_array = column
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| {
                    Error::filter(format!("Column {col_name} is not a float array"))
                })?;
            let literal_array = Float64Array::from(vec![*n; float_array.len()]);
            let result = match cmp {
                Cmp::Eq => eq(float_array, &literal_array),
                Cmp::Lt => lt(float_array, &literal_array),
                Cmp::LtEq => lt_eq(float_array, &literal_array),
                Cmp::Gt => gt(float_array, &literal_array),
                Cmp::GtEq => gt_eq(float_array, &literal_array),
            };
            result.map_err(|e| Error::filter(e.to_string()))
        }
        LiteralValue::String(s) => {
            let str_array = get_string_column(batch, col_name)?;
            let literal_array = StringArray::from(vec![s.as_str(); str_array.len()]);
            let result = match cmp {
                Cmp::Eq => eq(str_array, &literal_array),
                _ => {
                    return Err(Error::filter(format!(
                        "Unsupported string comparison {cmp:?} for column {col_name}"
                    )));
                }
            };
            result.map_err(|e| Error::filter(e.to_string()))
        }
    }
}

fn get_column<'a>(
    batch: &'a RecordBatch,
    col_name: &str,
) -> Result<&'a arrow::array::ArrayRef> {
    let idx = batch
        .schema()
        .index_of(col_name)
        .map_err(|_| Error::filter(format!("Column {col_name} not found in batch")))?;
    Ok(batch.column(idx))
}

fn get_string_column<'a>(batch: &'a RecordBatch, col_name: &str) -> Result<&'a StringArray> {
    let column = get_column(batch, col_name)?;
    column
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| Error::filter(format!("Column {col_name} is not a string array")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn test_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("Image Type", DataType::Utf8, true),
            Field::new("first_center_number", DataType::Float64, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec![
                    Some("ORIGINAL\\PRIMARY\\AXIAL"),
                    Some("DERIVED\\SECONDARY\\CORONAL"),
                    None,
                ])),
                Arc::new(Float64Array::from(vec![Some(40.0), Some(500.0), None])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn contains_ignore_case_matches_and_skips_nulls() {
        let batch = test_batch();
        let mask = evaluate_expr(
            &batch,
            &Expr::ContainsIgnoreCase("Image Type".to_string(), "axial".to_string()),
        )
        .unwrap();
        assert_eq!(mask.value(0), true);
        assert_eq!(mask.value(1), false);
        assert_eq!(mask.value(2), false);
    }

    #[test]
    fn float_lt_eq_filters_rows() {
        let batch = test_batch();
        let filter = ExpressionFilter::new(Expr::LtEq(
            "first_center_number".to_string(),
            LiteralValue::Float(100.0),
        ));
        let filtered = filter.filter(&batch).unwrap();
        assert_eq!(filtered.num_rows(), 1);
    }

    #[test]
    fn and_combines_predicates() {
        let batch = test_batch();
        let mask = evaluate_expr(
            &batch,
            &Expr::And(vec![
                Expr::ContainsIgnoreCase("Image Type".to_string(), "axial".to_string()),
                Expr::LtEq("first_center_number".to_string(), LiteralValue::Float(100.0)),
            ]),
        )
        .unwrap();
        assert_eq!(mask.value(0), true);
        assert_eq!(mask.value(1), false);
    }
}
