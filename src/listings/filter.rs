use rusqlite::types::Value;
use serde::Deserialize;

/// Query-string filters for the listing search. All supplied filters must hold.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingFilter {
    pub q: Option<String>,
    pub location: Option<String>,
    pub beds: Option<i64>,
    pub baths: Option<i64>,
    pub min_rent: Option<i64>,
    pub max_rent: Option<i64>,
    pub property_type: Option<String>,
    pub status: Option<String>,
}

impl ListingFilter {
    /// Build the WHERE clause (without the keyword) and its positional parameters.
    /// Column references assume the listings table is aliased as `l`.
    pub fn to_sql(&self) -> (String, Vec<Value>) {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        let mut push = |clause: &str, value: Value| {
            values.push(value);
            clauses.push(clause.replace('?', &format!("?{}", values.len())));
        };

        if let Some(q) = non_blank(&self.q) {
            push("l.title LIKE ? ESCAPE '\\'", Value::Text(contains_pattern(q)));
        }
        if let Some(location) = non_blank(&self.location) {
            push(
                "l.location LIKE ? ESCAPE '\\'",
                Value::Text(contains_pattern(location)),
            );
        }
        if let Some(beds) = self.beds {
            push("l.bedrooms >= ?", Value::Integer(beds));
        }
        if let Some(baths) = self.baths {
            push("l.bathrooms >= ?", Value::Integer(baths));
        }
        if let Some(min) = self.min_rent {
            push("l.price >= ?", Value::Integer(min));
        }
        if let Some(max) = self.max_rent {
            push("l.price <= ?", Value::Integer(max));
        }
        if let Some(kind) = non_blank(&self.property_type) {
            push("l.property_type = ?", Value::Text(kind.to_ascii_lowercase()));
        }
        if let Some(status) = non_blank(&self.status) {
            push("l.status = ?", Value::Text(status.to_ascii_lowercase()));
        }

        if clauses.is_empty() {
            ("1 = 1".to_string(), values)
        } else {
            (clauses.join(" AND "), values)
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// `%term%` with LIKE metacharacters escaped, so user input matches literally.
/// SQLite's LIKE is case-insensitive for ASCII.
pub fn contains_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}
