//! Composable query fragments.
//!
//! Every listing endpoint is assembled from the same small value objects:
//! a base [`Predicate`] for tenancy, a visibility predicate, an optional
//! block-exclusion predicate, and a keyset bound derived from the caller's
//! cursor.  Each piece carries its own SQL fragment and bind parameters, so
//! it can be unit-tested in isolation and combined without per-endpoint
//! string branching.

use rusqlite::types::Value;

use oremus_shared::CursorKey;

/// Sort direction of one keyset column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dir {
    Asc,
    Desc,
}

impl Dir {
    fn cmp_op(self) -> &'static str {
        match self {
            // "after the cursor" in ascending order means strictly greater.
            Dir::Asc => ">",
            Dir::Desc => "<",
        }
    }

    pub fn order_sql(self) -> &'static str {
        match self {
            Dir::Asc => "ASC",
            Dir::Desc => "DESC",
        }
    }
}

/// A WHERE fragment plus its positional bind parameters.
#[derive(Debug, Clone)]
pub struct Predicate {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Predicate {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// `column = ?`
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Self::new(format!("{column} = ?"), vec![value.into()])
    }

    /// Exclude rows authored by anyone the viewer blocked or who blocked
    /// the viewer.  Listing-only: single-item fetches stay unfiltered.
    pub fn not_blocked(author_col: &str, viewer: &str) -> Self {
        Self::new(
            format!(
                "{author_col} NOT IN (\
                 SELECT target_id FROM user_blocks WHERE user_id = ? \
                 UNION \
                 SELECT user_id FROM user_blocks WHERE target_id = ?)"
            ),
            vec![Value::from(viewer.to_string()), Value::from(viewer.to_string())],
        )
    }

    /// Strictly-after-the-cursor bound over an ordered column list.
    ///
    /// `cols` pairs each column (or expression) with its direction; the
    /// last entry must be the unique id tiebreak.  `key.parts` supply the
    /// bounds for all but the last column, `key.id` for the last.  Expands
    /// to the usual nested form, e.g. for `[a DESC, id ASC]`:
    /// `(a < ? OR (a = ? AND id > ?))`.
    pub fn keyset(cols: &[(&str, Dir)], key: &CursorKey) -> Self {
        assert!(cols.len() >= 2, "keyset needs at least one part plus the id");
        assert_eq!(
            cols.len(),
            key.parts.len() + 1,
            "cursor part count must match keyset columns"
        );

        let mut values: Vec<Value> = key.parts.iter().map(|p| Value::from(*p)).collect();
        values.push(Value::from(key.id.clone()));

        let mut params = Vec::new();
        let sql = Self::keyset_level(cols, &values, 0, &mut params);
        Self::new(sql, params)
    }

    fn keyset_level(
        cols: &[(&str, Dir)],
        values: &[Value],
        i: usize,
        params: &mut Vec<Value>,
    ) -> String {
        let (col, dir) = cols[i];
        if i == cols.len() - 1 {
            params.push(values[i].clone());
            return format!("{col} {} ?", dir.cmp_op());
        }
        params.push(values[i].clone());
        let strict = format!("{col} {} ?", dir.cmp_op());
        params.push(values[i].clone());
        let rest = Self::keyset_level(cols, values, i + 1, params);
        format!("({strict} OR ({col} = ? AND {rest}))")
    }
}

/// A full SELECT assembled from composable parts.
#[derive(Debug, Clone)]
pub struct SelectSpec {
    /// Everything up to (not including) WHERE.
    pub base: String,
    pub predicates: Vec<Predicate>,
    /// Ordered (column, direction) list; also used for ORDER BY.
    pub order: Vec<(String, Dir)>,
    pub limit: i64,
}

impl SelectSpec {
    pub fn new(base: impl Into<String>, order: Vec<(String, Dir)>, limit: i64) -> Self {
        Self {
            base: base.into(),
            predicates: Vec::new(),
            order,
            limit,
        }
    }

    pub fn and(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn and_opt(self, predicate: Option<Predicate>) -> Self {
        match predicate {
            Some(p) => self.and(p),
            None => self,
        }
    }

    /// Final SQL text.
    pub fn sql(&self) -> String {
        let mut out = self.base.clone();
        if !self.predicates.is_empty() {
            let clauses: Vec<&str> = self.predicates.iter().map(|p| p.sql.as_str()).collect();
            out.push_str(" WHERE ");
            out.push_str(&clauses.join(" AND "));
        }
        if !self.order.is_empty() {
            out.push_str(" ORDER BY ");
            let order: Vec<String> = self
                .order
                .iter()
                .map(|(col, dir)| format!("{col} {}", dir.order_sql()))
                .collect();
            out.push_str(&order.join(", "));
        }
        out.push_str(" LIMIT ?");
        out
    }

    /// All bind parameters, in placeholder order.
    pub fn params(&self) -> Vec<Value> {
        let mut out: Vec<Value> = self
            .predicates
            .iter()
            .flat_map(|p| p.params.iter().cloned())
            .collect();
        out.push(Value::from(self.limit));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eq_fragment() {
        let p = Predicate::eq("p.group_id", "g1".to_string());
        assert_eq!(p.sql, "p.group_id = ?");
        assert_eq!(p.params.len(), 1);
    }

    #[test]
    fn keyset_two_columns_desc() {
        let key = CursorKey::new(vec![100], "row-5");
        let p = Predicate::keyset(&[("p.created_at", Dir::Desc), ("p.id", Dir::Asc)], &key);
        assert_eq!(
            p.sql,
            "(p.created_at < ? OR (p.created_at = ? AND p.id > ?))"
        );
        assert_eq!(p.params.len(), 3);
    }

    #[test]
    fn keyset_three_columns() {
        let key = CursorKey::new(vec![1, 100], "row-5");
        let p = Predicate::keyset(
            &[("rank", Dir::Desc), ("p.created_at", Dir::Desc), ("p.id", Dir::Asc)],
            &key,
        );
        assert_eq!(
            p.sql,
            "(rank < ? OR (rank = ? AND (p.created_at < ? OR (p.created_at = ? AND p.id > ?))))"
        );
        assert_eq!(p.params.len(), 5);
    }

    #[test]
    fn keyset_ascending_primary() {
        let key = CursorKey::new(vec![42], "u-9");
        let p = Predicate::keyset(&[("m.accepted_at", Dir::Asc), ("m.user_id", Dir::Asc)], &key);
        assert_eq!(
            p.sql,
            "(m.accepted_at > ? OR (m.accepted_at = ? AND m.user_id > ?))"
        );
    }

    #[test]
    fn select_spec_assembly() {
        let key = CursorKey::new(vec![100], "x");
        let spec = SelectSpec::new(
            "SELECT * FROM prayers p",
            vec![("p.created_at".into(), Dir::Desc), ("p.id".into(), Dir::Asc)],
            11,
        )
        .and(Predicate::eq("p.group_id", "g".to_string()))
        .and_opt(Some(Predicate::keyset(
            &[("p.created_at", Dir::Desc), ("p.id", Dir::Asc)],
            &key,
        )));

        assert_eq!(
            spec.sql(),
            "SELECT * FROM prayers p WHERE p.group_id = ? AND \
             (p.created_at < ? OR (p.created_at = ? AND p.id > ?)) \
             ORDER BY p.created_at DESC, p.id ASC LIMIT ?"
        );
        // group + 3 keyset binds + limit
        assert_eq!(spec.params().len(), 5);
    }

    #[test]
    fn select_spec_without_predicates() {
        let spec = SelectSpec::new(
            "SELECT * FROM groups g",
            vec![("g.created_at".into(), Dir::Desc), ("g.id".into(), Dir::Asc)],
            11,
        );
        assert_eq!(
            spec.sql(),
            "SELECT * FROM groups g ORDER BY g.created_at DESC, g.id ASC LIMIT ?"
        );
        assert_eq!(spec.params().len(), 1);
    }
}
