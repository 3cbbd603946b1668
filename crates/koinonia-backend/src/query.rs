//! Row query builder.
//!
//! Renders to the row API's query-string syntax (`col=eq.value`,
//! `order=col.desc`, `limit=n`) and can also be evaluated in memory.

use std::cmp::Ordering;

use serde_json::Value;

/// A single column filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Column equals value.
    Eq(String),
    /// Column does not equal value.
    Neq(String),
    /// Case-insensitive pattern match; `%` matches any run of characters.
    ILike(String),
}

/// Query over a collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    columns: Option<String>,
    filters: Vec<(String, Filter)>,
    order: Option<(String, bool)>,
    limit: Option<usize>,
}

impl Query {
    /// Create an empty query (all rows, all columns).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict returned columns (comma separated).
    #[must_use]
    pub fn select(mut self, columns: impl Into<String>) -> Self {
        self.columns = Some(columns.into());
        self
    }

    /// Require `column == value`.
    #[must_use]
    pub fn eq(mut self, column: impl Into<String>, value: impl ToString) -> Self {
        self.filters
            .push((column.into(), Filter::Eq(value.to_string())));
        self
    }

    /// Require `column != value`.
    #[must_use]
    pub fn neq(mut self, column: impl Into<String>, value: impl ToString) -> Self {
        self.filters
            .push((column.into(), Filter::Neq(value.to_string())));
        self
    }

    /// Require a case-insensitive pattern match.
    #[must_use]
    pub fn ilike(mut self, column: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.filters
            .push((column.into(), Filter::ILike(pattern.into())));
        self
    }

    /// Order by a column.
    #[must_use]
    pub fn order(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order = Some((column.into(), ascending));
        self
    }

    /// Limit the number of rows.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Query-string pairs for the row API.
    #[must_use]
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![(
            "select".to_string(),
            self.columns.clone().unwrap_or_else(|| "*".to_string()),
        )];

        for (column, filter) in &self.filters {
            let value = match filter {
                Filter::Eq(v) => format!("eq.{v}"),
                Filter::Neq(v) => format!("neq.{v}"),
                Filter::ILike(p) => format!("ilike.{}", p.replace('%', "*")),
            };
            params.push((column.clone(), value));
        }

        if let Some((column, ascending)) = &self.order {
            let direction = if *ascending { "asc" } else { "desc" };
            params.push(("order".to_string(), format!("{column}.{direction}")));
        }

        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }

        params
    }

    /// Whether a row passes every filter.
    #[must_use]
    pub fn matches(&self, row: &Value) -> bool {
        self.filters.iter().all(|(column, filter)| {
            let cell = row.get(column).map(value_text);
            match filter {
                Filter::Eq(v) => cell.as_deref() == Some(v.as_str()),
                Filter::Neq(v) => cell.as_deref() != Some(v.as_str()),
                Filter::ILike(p) => cell.is_some_and(|text| ilike(&text, p)),
            }
        })
    }

    /// Apply filters, order, limit, and column selection to rows.
    #[must_use]
    pub fn apply(&self, rows: &[Value]) -> Vec<Value> {
        let mut selected: Vec<Value> = rows.iter().filter(|r| self.matches(r)).cloned().collect();

        if let Some((column, ascending)) = &self.order {
            selected.sort_by(|a, b| {
                let ordering = compare_cells(a.get(column), b.get(column));
                if *ascending { ordering } else { ordering.reverse() }
            });
        }

        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }

        if let Some(columns) = self.columns.as_deref().filter(|c| *c != "*") {
            let wanted: Vec<&str> = columns.split(',').map(str::trim).collect();
            for row in &mut selected {
                if let Value::Object(map) = row {
                    map.retain(|key, _| wanted.contains(&key.as_str()));
                }
            }
        }

        selected
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn compare_cells(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(x), Some(y)) => value_text(x).cmp(&value_text(y)),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

fn ilike(text: &str, pattern: &str) -> bool {
    let text = text.to_lowercase();
    let pattern = pattern.to_lowercase();
    let parts: Vec<&str> = pattern.split('%').collect();

    if parts.len() == 1 {
        return text == pattern;
    }

    let first = parts[0];
    let last = parts[parts.len() - 1];
    if !text.starts_with(first) || !text[first.len()..].ends_with(last) {
        return false;
    }

    let mut rest = &text[first.len()..text.len() - last.len()];
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn pairs(params: &[(String, String)]) -> Vec<(&str, &str)> {
        params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
    }

    #[test]
    fn test_to_params() {
        let query = Query::new()
            .eq("church_id", "c1")
            .ilike("title", "%romans%")
            .order("created_at", false)
            .limit(10);

        assert_eq!(
            pairs(&query.to_params()),
            vec![
                ("select", "*"),
                ("church_id", "eq.c1"),
                ("title", "ilike.*romans*"),
                ("order", "created_at.desc"),
                ("limit", "10"),
            ]
        );
    }

    #[test]
    fn test_apply_in_memory() {
        let rows = vec![
            json!({"id": 1, "title": "Romans", "week": 3}),
            json!({"id": 2, "title": "Ruth", "week": 1}),
            json!({"id": 3, "title": "Acts", "week": 2}),
        ];

        let query = Query::new().ilike("title", "r%").order("week", true).select("id");
        assert_eq!(query.apply(&rows), vec![json!({"id": 2}), json!({"id": 1})]);

        let query = Query::new().neq("id", 1).order("week", false).limit(1);
        assert_eq!(query.apply(&rows), vec![rows[2].clone()]);
    }

    #[test]
    fn test_eq_on_numbers_and_strings() {
        let row = json!({"id": 7, "slug": "galatians"});
        assert!(Query::new().eq("id", 7).matches(&row));
        assert!(Query::new().eq("slug", "galatians").matches(&row));
        assert!(!Query::new().eq("missing", "x").matches(&row));
    }

    #[test]
    fn test_ilike_patterns() {
        assert!(ilike("Sermon on the Mount", "%on the%"));
        assert!(ilike("Psalms", "ps%"));
        assert!(ilike("Psalms", "%ALMS"));
        assert!(!ilike("Psalms", "%proverbs%"));
        assert!(ilike("exact", "EXACT"));
    }
}
