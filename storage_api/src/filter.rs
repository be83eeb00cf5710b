// storage_api/src/filter.rs

use serde_json::Value;
use std::cmp::Ordering;

/// A single row predicate. Columns are top-level keys of the row object;
/// a missing column reads as `Value::Null`.
#[derive(Debug, Clone)]
pub enum Filter {
    Eq(String, Value),
    Neq(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    In(String, Vec<Value>),
}

impl Filter {
    pub fn matches(&self, row: &Value) -> bool {
        match self {
            Filter::Eq(col, v) => column(row, col) == v,
            Filter::Neq(col, v) => column(row, col) != v,
            Filter::Gt(col, v) => cmp(column(row, col), v) == Some(Ordering::Greater),
            Filter::Gte(col, v) => {
                matches!(cmp(column(row, col), v), Some(Ordering::Greater | Ordering::Equal))
            }
            Filter::Lt(col, v) => cmp(column(row, col), v) == Some(Ordering::Less),
            Filter::Lte(col, v) => {
                matches!(cmp(column(row, col), v), Some(Ordering::Less | Ordering::Equal))
            }
            Filter::In(col, set) => set.contains(column(row, col)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// A composable select against one table, mirroring the provider's
/// filter/order/limit query surface.
#[derive(Debug, Clone)]
pub struct Query {
    pub table: String,
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn table(name: impl Into<String>) -> Self {
        Query {
            table: name.into(),
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::Eq(column.into(), value.into()))
    }

    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order.push(Order {
            column: column.into(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn matches(&self, row: &Value) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }

    /// Applies the order keys to an already-filtered row set.
    pub fn sort(&self, rows: &mut [Value]) {
        if self.order.is_empty() {
            return;
        }
        rows.sort_by(|a, b| {
            for key in &self.order {
                let ord = cmp(column(a, &key.column), column(b, &key.column))
                    .unwrap_or(Ordering::Equal);
                let ord = if key.ascending { ord } else { ord.reverse() };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }
}

fn column<'a>(row: &'a Value, col: &str) -> &'a Value {
    row.get(col).unwrap_or(&Value::Null)
}

/// Orders two JSON scalars. Numbers compare numerically, strings
/// lexically (RFC 3339 timestamps order correctly this way), booleans
/// false-before-true. Nulls sort first; mixed types do not compare.
fn cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, _) => Some(Ordering::Less),
        (_, Value::Null) => Some(Ordering::Greater),
        (Value::Number(x), Value::Number(y)) => x.as_f64().partial_cmp(&y.as_f64()),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn should_match_equality_and_in_list() {
        let row = json!({"ward": "General", "status": "available"});
        assert!(Filter::Eq("ward".into(), json!("General")).matches(&row));
        assert!(Filter::Neq("status".into(), json!("occupied")).matches(&row));
        assert!(Filter::In("status".into(), vec![json!("available"), json!("occupied")]).matches(&row));
        assert!(!Filter::In("status".into(), vec![json!("maintenance")]).matches(&row));
    }

    #[test]
    fn should_treat_missing_columns_as_null() {
        let row = json!({"ward": "General"});
        assert!(Filter::Eq("to_time".into(), Value::Null).matches(&row));
        assert!(!Filter::Gt("to_time".into(), json!(0)).matches(&row));
    }

    #[test]
    fn should_order_rfc3339_timestamps_lexically() {
        let q = Query::table("t").order_by("at", true);
        let mut rows = vec![
            json!({"at": "2024-03-01T10:00:00Z"}),
            json!({"at": "2024-02-01T10:00:00Z"}),
        ];
        q.sort(&mut rows);
        assert_eq!(rows[0]["at"], json!("2024-02-01T10:00:00Z"));
    }

    #[test]
    fn should_apply_secondary_order_keys() {
        let q = Query::table("t").order_by("ward", true).order_by("bed_number", true);
        let mut rows = vec![
            json!({"ward": "B", "bed_number": "01"}),
            json!({"ward": "A", "bed_number": "02"}),
            json!({"ward": "A", "bed_number": "01"}),
        ];
        q.sort(&mut rows);
        assert_eq!(rows[0]["bed_number"], json!("01"));
        assert_eq!(rows[0]["ward"], json!("A"));
        assert_eq!(rows[2]["ward"], json!("B"));
    }
}
