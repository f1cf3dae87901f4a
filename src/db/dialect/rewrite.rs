//! Placeholder and row-limit rewriting shared by the dialects.
//!
//! Rewrites only ever splice placeholders or numbers into the statement;
//! parameter values travel separately as bind values.

use super::scan::{LexKind, Lexeme, ScanRules, scan};
use crate::error::{DbError, DbResult};
use crate::models::{BoundStatement, NamedParams, NativeParams, ScalarValue};
use std::collections::BTreeSet;
use tracing::warn;

/// Native placeholder style of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PlaceholderStyle {
    /// `$1, $2, ...`, one index per distinct name (PostgreSQL).
    Numbered,
    /// `?` per occurrence (MySQL).
    Question,
    /// `:name` bind variables (Oracle).
    Named,
}

/// Replace canonical placeholders with native ones.
pub(crate) fn rewrite_placeholders(
    sql: &str,
    params: &NamedParams,
    rules: ScanRules,
    style: PlaceholderStyle,
) -> DbResult<BoundStatement> {
    let lexemes = scan(sql, rules).map_err(|e| DbError::bad_request(e.to_string()))?;

    let mut out = String::with_capacity(sql.len());
    let mut last = 0;
    let mut order: Vec<String> = Vec::new();
    let mut positional: Vec<ScalarValue> = Vec::new();
    let mut referenced = BTreeSet::new();

    for lex in &lexemes {
        let name = match &lex.kind {
            LexKind::Canonical(name) | LexKind::Bind(name) => name,
            LexKind::NativePositional => {
                return Err(DbError::bad_request(format!(
                    "native placeholder '{}' is not supported; use %(name)s with named params",
                    lex.text(sql)
                )));
            }
            _ => continue,
        };
        let value = params.get(name).ok_or_else(|| {
            DbError::bad_request(format!("missing value for parameter '{}'", name))
        })?;
        referenced.insert(name.clone());

        let native = match style {
            PlaceholderStyle::Numbered => {
                let index = match order.iter().position(|n| n == name) {
                    Some(idx) => idx + 1,
                    None => {
                        order.push(name.clone());
                        positional.push(value.clone());
                        order.len()
                    }
                };
                format!("${}", index)
            }
            PlaceholderStyle::Question => {
                positional.push(value.clone());
                "?".to_string()
            }
            PlaceholderStyle::Named => {
                if !order.contains(name) {
                    order.push(name.clone());
                }
                format!(":{}", name)
            }
        };
        out.push_str(&sql[last..lex.start]);
        out.push_str(&native);
        last = lex.end;
    }
    out.push_str(&sql[last..]);

    let unused: Vec<&str> = params
        .keys()
        .filter(|k| !referenced.contains(*k))
        .map(String::as_str)
        .collect();
    if !unused.is_empty() {
        warn!(params = ?unused, "Ignoring parameters not referenced by the statement");
    }

    let params = match style {
        _ if referenced.is_empty() => NativeParams::None,
        PlaceholderStyle::Named => NativeParams::Named(
            order
                .into_iter()
                .filter_map(|n| params.get(&n).map(|v| (n, v.clone())))
                .collect(),
        ),
        PlaceholderStyle::Numbered | PlaceholderStyle::Question => {
            NativeParams::Positional(positional)
        }
    };
    Ok(BoundStatement::new(out, params))
}

/// A statement ready for a row limit: trailing `;` removed and lexed.
pub(crate) struct LimitTarget<'a> {
    pub sql: &'a str,
    pub lexemes: Vec<Lexeme>,
}

const DML: &[&str] = &["INSERT", "UPDATE", "DELETE", "MERGE", "REPLACE", "UPSERT"];

/// Lex `sql` and decide whether a row limit may be added at all.
///
/// Only plain read forms (`SELECT`, `WITH ... SELECT`, parenthesized queries)
/// qualify. Statements with top-level DML, locking clauses or `INTO` are left
/// alone.
pub(crate) fn limit_target(sql: &str, rules: ScanRules) -> Option<LimitTarget<'_>> {
    let mut lexemes = scan(sql, rules).ok()?;
    let mut body = sql;
    if lexemes
        .last()
        .is_some_and(|l| l.kind == LexKind::Semi && l.depth == 0)
    {
        let semi = lexemes.pop()?;
        body = sql[..semi.start].trim_end();
    }
    if lexemes.iter().any(|l| l.kind == LexKind::Semi) {
        return None;
    }

    let first = lexemes.first()?;
    let read_form = first.kind == LexKind::LParen
        || first.is_word(body, "SELECT")
        || first.is_word(body, "WITH");
    if !read_form {
        return None;
    }
    for (i, lex) in lexemes.iter().enumerate() {
        let next_is = |w: &str| lexemes.get(i + 1).is_some_and(|n| n.is_word(body, w));
        let top = lex.depth == 0;
        let blocked = (top && DML.iter().any(|w| lex.is_word(body, w)))
            || (top && lex.is_word(body, "INTO"))
            || (lex.is_word(body, "FOR")
                && ["UPDATE", "SHARE", "NO", "KEY"].iter().any(|w| next_is(w)))
            || (lex.is_word(body, "LOCK") && next_is("IN"));
        if blocked {
            return None;
        }
    }
    Some(LimitTarget {
        sql: body,
        lexemes,
    })
}

fn splice(sql: &str, lex: &Lexeme, replacement: &str) -> String {
    format!("{}{}{}", &sql[..lex.start], replacement, &sql[lex.end..])
}

/// Replace a numeric lexeme with `min(existing, limit)`; `None` if not numeric.
fn tighten(sql: &str, lex: &Lexeme, limit: u32) -> Option<String> {
    if lex.kind != LexKind::Number {
        return None;
    }
    let existing: u64 = lex.text(sql).parse().ok()?;
    let value = existing.min(u64::from(limit));
    Some(splice(sql, lex, &value.to_string()))
}

/// Top-level `FETCH FIRST|NEXT n ROW[S] ONLY`.
///
/// `Ok(Some(sql))` when tightened, `Ok(None)` when there is no such clause,
/// `Err(())` when a clause exists but cannot be tightened in place.
fn tighten_fetch(target: &LimitTarget<'_>, limit: u32) -> Result<Option<String>, ()> {
    let (sql, lex) = (target.sql, &target.lexemes);
    let Some(pos) = lex
        .iter()
        .position(|l| l.depth == 0 && l.is_word(sql, "FETCH"))
    else {
        return Ok(None);
    };
    let word = |i: usize, w: &str| lex.get(i).is_some_and(|l| l.is_word(sql, w));
    if !(word(pos + 1, "FIRST") || word(pos + 1, "NEXT")) {
        return Err(());
    }
    // `FETCH FIRST ROW ONLY` already returns a single row.
    if (word(pos + 2, "ROW") || word(pos + 2, "ROWS")) && word(pos + 3, "ONLY") {
        return Ok(Some(sql.to_string()));
    }
    let rows_only =
        (word(pos + 3, "ROW") || word(pos + 3, "ROWS")) && word(pos + 4, "ONLY");
    match lex.get(pos + 2) {
        Some(n) if rows_only => tighten(sql, n, limit).map(Some).ok_or(()),
        _ => Err(()),
    }
}

/// PostgreSQL/MySQL: tighten an existing `LIMIT`, or append one.
pub(crate) fn limit_clause(
    target: &LimitTarget<'_>,
    limit: u32,
    fetch_first: bool,
    wrap: impl Fn(&str, u32) -> String,
) -> String {
    let (sql, lex) = (target.sql, &target.lexemes);
    if let Some(pos) = lex
        .iter()
        .position(|l| l.depth == 0 && l.is_word(sql, "LIMIT"))
    {
        let tightened = match (lex.get(pos + 1), lex.get(pos + 2), lex.get(pos + 3)) {
            (Some(off), Some(comma), Some(count))
                if off.kind == LexKind::Number && comma.kind == LexKind::Comma =>
            {
                tighten(sql, count, limit)
            }
            (Some(all), ..) if all.is_word(sql, "ALL") => {
                Some(splice(sql, all, &limit.to_string()))
            }
            (Some(count), ..) => tighten(sql, count, limit),
            _ => None,
        };
        return tightened.unwrap_or_else(|| wrap(sql, limit));
    }
    if fetch_first {
        match tighten_fetch(target, limit) {
            Ok(Some(tightened)) => return tightened,
            Ok(None) => {}
            Err(()) => return wrap(sql, limit),
        }
    }
    format!("{}\nLIMIT {}", sql, limit)
}

/// Oracle: tighten an existing `FETCH FIRST`, or wrap the statement.
pub(crate) fn fetch_clause(
    target: &LimitTarget<'_>,
    limit: u32,
    wrap: impl Fn(&str, u32) -> String,
) -> String {
    match tighten_fetch(target, limit) {
        Ok(Some(tightened)) => tightened,
        Ok(None) | Err(()) => wrap(target.sql, limit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DatabaseType;

    fn params(pairs: &[(&str, ScalarValue)]) -> NamedParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn pg() -> ScanRules {
        ScanRules::for_engine(DatabaseType::PostgreSQL)
    }

    #[test]
    fn test_numbered_reuses_index_per_name() {
        let p = params(&[("a", ScalarValue::Int(1)), ("b", ScalarValue::Int(2))]);
        let bound = rewrite_placeholders(
            "SELECT %(a)s, %(b)s, %(a)s",
            &p,
            pg(),
            PlaceholderStyle::Numbered,
        )
        .unwrap();
        assert_eq!(bound.sql, "SELECT $1, $2, $1");
        assert_eq!(
            bound.params,
            NativeParams::Positional(vec![ScalarValue::Int(1), ScalarValue::Int(2)])
        );
    }

    #[test]
    fn test_no_placeholders_yields_no_params() {
        let bound =
            rewrite_placeholders("SELECT 1", &NamedParams::new(), pg(), PlaceholderStyle::Numbered)
                .unwrap();
        assert_eq!(bound.params, NativeParams::None);
        assert_eq!(bound.sql, "SELECT 1");
    }

    #[test]
    fn test_limit_target_rejects_non_reads() {
        assert!(limit_target("DELETE FROM t", pg()).is_none());
        assert!(limit_target("SELECT * FROM t FOR UPDATE", pg()).is_none());
        assert!(limit_target("SELECT 1; SELECT 2", pg()).is_none());
        assert!(limit_target("WITH x AS (SELECT 1) DELETE FROM t", pg()).is_none());
        let target = limit_target("SELECT 1 ;", pg()).unwrap();
        assert_eq!(target.sql, "SELECT 1");
    }
}
