//! Risk classification of untrusted SQL text.
//!
//! The classifier never executes anything. It tokenizes the statement with
//! [sqlparser](https://docs.rs/sqlparser/)'s dialect-aware tokenizer, so string
//! literals stay opaque and comments disappear, then matches lexical
//! signatures against the significant tokens. Every signature that matches
//! contributes a signal; the statement gets the highest tier among them.
//!
//! Ambiguity always resolves upwards: input that cannot be tokenized, that
//! contains a statement separator, or that starts with an unknown keyword is
//! [`RiskTier::Unrecognized`]. On PostgreSQL and MySQL a string literal
//! holding a backslash is too: where it ends depends on server settings.

use crate::models::DatabaseType;
use schemars::JsonSchema;
use serde::Serialize;
use sqlparser::dialect::{Dialect, GenericDialect, MySqlDialect, OracleDialect, PostgreSqlDialect};
use sqlparser::tokenizer::{Token, Tokenizer, Whitespace};
use std::collections::HashSet;
use std::fmt;

/// Ordered risk tiers, least to most dangerous.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, JsonSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskTier {
    Read,
    ReadWithSideEffects,
    Write,
    SchemaChange,
    Admin,
    Unrecognized,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "READ",
            Self::ReadWithSideEffects => "READ_WITH_SIDE_EFFECTS",
            Self::Write => "WRITE",
            Self::SchemaChange => "SCHEMA_CHANGE",
            Self::Admin => "ADMIN",
            Self::Unrecognized => "UNRECOGNIZED",
        }
    }

    pub fn intent(&self) -> Intent {
        match self {
            Self::Read => Intent::Read,
            Self::ReadWithSideEffects | Self::Write => Intent::Write,
            Self::SchemaChange => Intent::Ddl,
            Self::Admin => Intent::Admin,
            Self::Unrecognized => Intent::Unknown,
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized statement intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Read,
    Write,
    Ddl,
    Admin,
    Unknown,
}

/// Result of classifying one SQL string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct Classification {
    pub tier: RiskTier,
    pub intent: Intent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leading_keyword: Option<String>,
    /// One human-readable line per matched signature.
    pub signals: Vec<String>,
}

/// File-system, OS and network routines. Any reference is ADMIN.
const ADMIN_ROUTINES: &[&str] = &[
    "pg_read_file",
    "pg_read_binary_file",
    "pg_ls_dir",
    "pg_stat_file",
    "lo_import",
    "lo_export",
    "pg_terminate_backend",
    "pg_cancel_backend",
    "pg_reload_conf",
    "pg_promote",
    "load_file",
    "sys_exec",
    "sys_eval",
    "utl_file",
    "utl_http",
    "utl_tcp",
    "utl_smtp",
    "utl_inaddr",
    "dbms_scheduler",
    "dbms_java",
    "dbms_backup_restore",
    "dbms_sys_sql",
];

/// Built-in functions known to be free of side effects.
const TRUSTED_BUILTINS: &[&str] = &[
    // aggregates
    "count", "sum", "avg", "min", "max", "array_agg", "string_agg", "group_concat", "listagg",
    "json_agg", "jsonb_agg", "json_object_agg", "bool_and", "bool_or", "every", "stddev",
    "stddev_pop", "stddev_samp", "variance", "var_pop", "var_samp", "percentile_cont",
    "percentile_disc", "mode", "median",
    // window
    "row_number", "rank", "dense_rank", "ntile", "lag", "lead", "first_value", "last_value",
    "nth_value", "percent_rank", "cume_dist",
    // grouping
    "rollup", "cube", "grouping", "sets",
    // conditionals
    "coalesce", "nullif", "greatest", "least", "nvl", "nvl2", "decode", "ifnull", "isnull",
    "if", "iif",
    // strings
    "lower", "upper", "length", "char_length", "character_length", "octet_length", "bit_length",
    "substring", "substr", "trim", "ltrim", "rtrim", "btrim", "replace", "concat", "concat_ws",
    "position", "strpos", "instr", "locate", "left", "right", "lpad", "rpad", "split_part",
    "reverse", "repeat", "initcap", "format", "translate", "ascii", "chr", "char", "regexp_replace",
    "regexp_substr", "regexp_like", "regexp_matches", "regexp_instr", "quote_ident",
    "quote_literal", "md5", "sha1", "sha2", "encode", "hex", "unhex", "to_hex",
    // numbers
    "abs", "ceil", "ceiling", "floor", "round", "trunc", "truncate", "mod", "power", "pow",
    "sqrt", "exp", "ln", "log", "log10", "log2", "sign", "pi", "random", "rand", "width_bucket",
    // date and time
    "now", "current_date", "current_time", "current_timestamp", "localtime", "localtimestamp",
    "sysdate", "systimestamp", "date_trunc", "date_part", "extract", "date", "time", "year",
    "month", "day", "hour", "minute", "second", "dayofweek", "dayofmonth", "weekday",
    "date_format", "date_add", "date_sub", "datediff", "timestampdiff", "timestampadd",
    "str_to_date", "unix_timestamp", "from_unixtime", "add_months", "months_between", "last_day",
    "next_day", "age", "make_date", "make_timestamp", "to_char", "to_date", "to_number",
    "to_timestamp", "convert_tz",
    // casts and json
    "cast", "convert", "try_cast", "to_json", "to_jsonb", "json_build_object",
    "jsonb_build_object", "json_build_array", "jsonb_build_array", "json_object", "json_array",
    "json_extract", "json_unquote", "json_value", "json_query", "json_table", "json_contains",
    "json_length", "json_keys", "json_array_elements", "jsonb_array_elements",
    "json_array_length", "jsonb_array_length", "jsonb_extract_path", "jsonb_extract_path_text",
    "json_extract_path", "json_extract_path_text", "jsonb_each", "json_each", "jsonb_typeof",
    "xmltable",
    // arrays and sets
    "generate_series", "unnest", "array_length", "cardinality", "array_to_string",
    "string_to_array", "array_position", "array_remove", "array_append",
    // catalog helpers
    "version", "database", "schema", "current_user", "session_user", "user", "current_schema",
    "current_database", "pg_typeof", "pg_size_pretty", "pg_relation_size",
    "pg_total_relation_size", "pg_table_size", "pg_indexes_size", "pg_get_viewdef",
    "pg_get_functiondef", "pg_get_constraintdef", "pg_get_indexdef", "format_type",
    "obj_description", "col_description", "has_table_privilege", "has_schema_privilege",
    "sys_context", "uid",
];

/// Words that may be directly followed by `(` without being a routine call.
const SYNTAX_WORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "AND", "OR", "NOT", "IN", "EXISTS", "ANY", "ALL", "SOME", "ON",
    "USING", "JOIN", "AS", "BY", "HAVING", "WHEN", "THEN", "ELSE", "CASE", "END", "VALUES",
    "OVER", "FILTER", "GROUP", "WITHIN", "LATERAL", "UNION", "INTERSECT", "EXCEPT", "MINUS",
    "DISTINCT", "TABLE", "ROW", "ARRAY", "IS", "LIKE", "ILIKE", "BETWEEN", "LIMIT", "OFFSET",
    "FETCH", "RETURNING", "PRIOR", "PIVOT", "UNPIVOT", "MATCH_RECOGNIZE", "KEEP", "PARTITION",
    "WINDOW", "TABLESAMPLE", "BERNOULLI", "SYSTEM", "INTERVAL", "EXPLAIN", "WITH", "RECURSIVE",
    "MATERIALIZED", "SET", "INTO", "DESCRIBE", "DESC", "SHOW", "ESCAPE", "SIMILAR", "TO",
    // type names with a precision list, e.g. `CAST(x AS DECIMAL(10, 2))`
    "CHAR", "VARCHAR", "VARCHAR2", "NVARCHAR2", "NCHAR", "DECIMAL", "NUMERIC", "NUMBER",
    "FLOAT", "TIMESTAMP", "BIT", "BINARY", "VARBINARY", "RAW", "INT", "INTEGER", "BIGINT",
    "SMALLINT", "TINYINT", "DOUBLE", "REAL",
];

const LEADING_ADMIN: &[&str] = &[
    "GRANT", "REVOKE", "SHUTDOWN", "KILL", "FLUSH", "COPY", "BACKUP", "RESTORE", "LOAD",
    "INSTALL", "UNINSTALL",
];
const LEADING_SCHEMA: &[&str] = &["CREATE", "ALTER", "DROP", "TRUNCATE", "RENAME", "COMMENT"];
const DML: &[&str] = &["INSERT", "UPDATE", "DELETE", "MERGE", "REPLACE", "UPSERT"];
const LEADING_READ: &[&str] = &["SELECT", "SHOW", "VALUES", "TABLE", "DESCRIBE", "DESC"];
const PRINCIPALS: &[&str] = &["USER", "ROLE", "LOGIN"];
const EXPLAIN_OPTIONS: &[&str] = &[
    "ANALYZE", "ANALYSE", "VERBOSE", "COSTS", "BUFFERS", "TIMING", "SUMMARY", "SETTINGS", "WAL",
    "GENERIC_PLAN", "MEMORY", "SERIALIZE", "EXTENDED", "PARTITIONS", "FORMAT", "JSON", "TEXT",
    "XML", "YAML", "TREE", "TRADITIONAL", "TRUE", "FALSE", "ON", "OFF", "QUERY", "PLAN",
];

/// Significant token after comments, whitespace and placeholders are reduced.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Sig {
    Word { upper: String, quoted: bool },
    LParen,
    RParen,
    Comma,
    Period,
    Cast,
    Semi,
    Placeholder,
    /// `%`, only meaningful while collapsing placeholders.
    Percent,
    Colon,
    Other,
}

#[derive(Debug, Clone)]
struct Item {
    sig: Sig,
    depth: usize,
}

/// A matched signature.
struct Signal {
    tier: RiskTier,
    description: String,
}

impl Signal {
    fn new(tier: RiskTier, description: impl Into<String>) -> Self {
        Self {
            tier,
            description: description.into(),
        }
    }
}

/// Leading-statement analysis of a token range.
struct Leading {
    keyword: Option<String>,
    /// Index of the main query keyword when the statement is a read form.
    read_main: Option<usize>,
    /// End of the CTE header region of a `WITH`, exclusive.
    cte_header_end: usize,
}

/// Classifier configured for one engine and one trusted-function list.
#[derive(Debug, Clone, Default)]
pub struct StatementClassifier {
    engine: Option<DatabaseType>,
    trusted: HashSet<String>,
}

/// Classify with generic tokenization and the built-in trusted list.
pub fn classify(sql: &str) -> Classification {
    StatementClassifier::default().classify(sql)
}

fn get_dialect(engine: Option<DatabaseType>) -> Box<dyn Dialect> {
    match engine {
        Some(DatabaseType::PostgreSQL) => Box::new(PostgreSqlDialect {}),
        Some(DatabaseType::MySQL) => Box::new(MySqlDialect {}),
        Some(DatabaseType::Oracle) => Box::new(OracleDialect {}),
        None => Box::new(GenericDialect {}),
    }
}

/// Raw text of a literal whose end a backslash could move, depending on
/// session settings (`sql_mode`, `standard_conforming_strings`). `E'...'`
/// always takes backslash escapes on both sides, so it is not listed.
fn backslash_sensitive_literal(token: &Token) -> Option<&str> {
    match token {
        Token::SingleQuotedString(s)
        | Token::DoubleQuotedString(s)
        | Token::NationalStringLiteral(s)
        | Token::SingleQuotedByteStringLiteral(s)
        | Token::DoubleQuotedByteStringLiteral(s)
        | Token::UnicodeStringLiteral(s) => Some(s),
        _ => None,
    }
}

impl StatementClassifier {
    /// Create a classifier for `engine`, trusting `trusted_functions` in
    /// addition to the built-in read-only functions. Names are matched
    /// case-insensitively, either bare or schema-qualified.
    pub fn new<I, S>(engine: DatabaseType, trusted_functions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            engine: Some(engine),
            trusted: trusted_functions
                .into_iter()
                .map(|s| s.as_ref().trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    pub fn classify(&self, sql: &str) -> Classification {
        let mut signals = Vec::new();
        let keyword = match self.significant_items(sql) {
            Ok(items) => self.analyze(&items, &mut signals),
            Err(signal) => {
                signals.push(signal);
                None
            }
        };

        let tier = signals
            .iter()
            .map(|s| s.tier)
            .max()
            .unwrap_or(RiskTier::Unrecognized);
        Classification {
            tier,
            intent: tier.intent(),
            leading_keyword: keyword,
            signals: signals.into_iter().map(|s| s.description).collect(),
        }
    }

    /// Tokenize and reduce to significant tokens with paren depth.
    fn significant_items(&self, sql: &str) -> Result<Vec<Item>, Signal> {
        let dialect = get_dialect(self.engine);
        let tokens = Tokenizer::new(&*dialect, sql)
            .with_unescape(false)
            .tokenize()
            .map_err(|e| {
                Signal::new(
                    RiskTier::Unrecognized,
                    format!("statement cannot be tokenized: {}", e),
                )
            })?;
        let backslash_sensitive = matches!(
            self.engine,
            Some(DatabaseType::PostgreSQL | DatabaseType::MySQL)
        );

        let mut sigs = Vec::with_capacity(tokens.len());
        for token in tokens {
            if backslash_sensitive
                && backslash_sensitive_literal(&token).is_some_and(|text| text.contains('\\'))
            {
                return Err(Signal::new(
                    RiskTier::Unrecognized,
                    "backslash inside a string literal",
                ));
            }
            let sig = match token {
                Token::Whitespace(Whitespace::MultiLineComment(body)) if body.starts_with('!') => {
                    return Err(Signal::new(
                        RiskTier::Unrecognized,
                        "MySQL executable comment /*! ... */",
                    ));
                }
                Token::Whitespace(_) | Token::EOF => continue,
                Token::Word(w) => Sig::Word {
                    upper: w.value.to_ascii_uppercase(),
                    quoted: w.quote_style.is_some(),
                },
                Token::LParen => Sig::LParen,
                Token::RParen => Sig::RParen,
                Token::Comma => Sig::Comma,
                Token::Period => Sig::Period,
                Token::SemiColon => Sig::Semi,
                Token::DoubleColon => Sig::Cast,
                Token::Placeholder(_) => Sig::Placeholder,
                Token::Mod => Sig::Percent,
                Token::Colon => Sig::Colon,
                _ => Sig::Other,
            };
            sigs.push(sig);
        }
        let sigs = collapse_placeholders(sigs);

        if sigs.is_empty() {
            return Err(Signal::new(RiskTier::Unrecognized, "empty statement"));
        }
        if sigs.contains(&Sig::Semi) {
            return Err(Signal::new(
                RiskTier::Unrecognized,
                "statement separator ';' outside literals",
            ));
        }

        let mut items = Vec::with_capacity(sigs.len());
        let mut depth = 0usize;
        for sig in sigs {
            let at = match sig {
                Sig::LParen => {
                    depth += 1;
                    depth - 1
                }
                Sig::RParen => {
                    depth = depth.checked_sub(1).ok_or_else(|| {
                        Signal::new(RiskTier::Unrecognized, "unbalanced parentheses")
                    })?;
                    depth
                }
                _ => depth,
            };
            items.push(Item { sig, depth: at });
        }
        if depth != 0 {
            return Err(Signal::new(
                RiskTier::Unrecognized,
                "unbalanced parentheses",
            ));
        }
        Ok(items)
    }

    /// Run every signature over the statement, returning the leading keyword.
    fn analyze(&self, items: &[Item], signals: &mut Vec<Signal>) -> Option<String> {
        let leading = self.leading(items, 0, signals);

        scan_admin_references(items, signals);

        if let Some(main) = leading.read_main {
            self.scan_side_effects(items, leading.cte_header_end, signals);
            scan_select_into(items, main, signals);
        }
        leading.keyword
    }

    /// Classify the statement starting at `start` by its leading keyword.
    fn leading(&self, items: &[Item], start: usize, signals: &mut Vec<Signal>) -> Leading {
        let mut out = Leading {
            keyword: None,
            read_main: None,
            cte_header_end: start,
        };
        if matches!(items.get(start).map(|i| &i.sig), Some(Sig::LParen)) {
            out.keyword = Some("(".to_string());
            out.read_main = Some(start);
            signals.push(Signal::new(RiskTier::Read, "parenthesized query"));
            return out;
        }
        let Some(first) = kw(items, start) else {
            signals.push(Signal::new(
                RiskTier::Unrecognized,
                "statement does not start with a keyword",
            ));
            return out;
        };
        out.keyword = Some(first.to_string());
        let next = kw(items, start + 1);

        let (tier, description) = match first {
            "SET" => match (next, kw(items, start + 2)) {
                (Some("ROLE"), _) | (Some("SESSION" | "LOCAL"), Some("ROLE")) => {
                    (RiskTier::Admin, "SET ROLE changes the session principal".to_string())
                }
                (Some("SESSION"), Some("AUTHORIZATION")) => (
                    RiskTier::Admin,
                    "SET SESSION AUTHORIZATION changes the session principal".to_string(),
                ),
                _ => (RiskTier::Unrecognized, "SET changes session state".to_string()),
            },
            "ALTER" if next == Some("SYSTEM") => {
                (RiskTier::Admin, "ALTER SYSTEM changes server configuration".to_string())
            }
            "CREATE" | "ALTER" | "DROP" if next.is_some_and(|n| PRINCIPALS.contains(&n)) => (
                RiskTier::Admin,
                format!("{} {} manages principals", first, next.unwrap_or_default()),
            ),
            "EXEC" | "EXECUTE" | "CALL" => {
                if routine_name_words(items, start + 1).any(|w| w.starts_with("SP_")) {
                    (RiskTier::Admin, format!("{} of a system procedure", first))
                } else {
                    (
                        RiskTier::Unrecognized,
                        format!("{} of a routine with unknown effects", first),
                    )
                }
            }
            f if LEADING_ADMIN.contains(&f) => {
                (RiskTier::Admin, format!("administrative command {}", f))
            }
            f if LEADING_SCHEMA.contains(&f) => {
                (RiskTier::SchemaChange, format!("schema change {}", f))
            }
            f if DML.contains(&f) => (RiskTier::Write, format!("data modification {}", f)),
            "WITH" => return self.leading_with(items, start, out, signals),
            "EXPLAIN" => return self.leading_explain(items, start, out, signals),
            f if LEADING_READ.contains(&f) => {
                out.read_main = Some(start);
                (RiskTier::Read, format!("read statement {}", f))
            }
            f => (RiskTier::Unrecognized, format!("unknown statement keyword {}", f)),
        };
        signals.push(Signal::new(tier, description));
        out
    }

    fn leading_with(
        &self,
        items: &[Item],
        start: usize,
        mut out: Leading,
        signals: &mut Vec<Signal>,
    ) -> Leading {
        let base = items[start].depth;
        // The main statement is the first top-level keyword right after a
        // CTE body closes.
        let main = (start + 1..items.len()).find(|&i| {
            items[i].depth == base
                && matches!(items[i - 1].sig, Sig::RParen)
                && kw(items, i).is_some_and(|k| {
                    DML.contains(&k) || matches!(k, "SELECT" | "VALUES" | "TABLE")
                })
        });
        let Some(main) = main else {
            signals.push(Signal::new(
                RiskTier::Unrecognized,
                "WITH without a recognizable main statement",
            ));
            return out;
        };
        out.cte_header_end = main;
        let keyword = kw(items, main).unwrap_or_default();
        if DML.contains(&keyword) {
            signals.push(Signal::new(
                RiskTier::Write,
                format!("WITH wrapping data modification {}", keyword),
            ));
        } else {
            out.read_main = Some(main);
            signals.push(Signal::new(RiskTier::Read, "WITH query"));
        }
        out
    }

    fn leading_explain(
        &self,
        items: &[Item],
        start: usize,
        mut out: Leading,
        signals: &mut Vec<Signal>,
    ) -> Leading {
        let mut i = start + 1;
        if kw(items, i) == Some("PLAN") {
            signals.push(Signal::new(
                RiskTier::ReadWithSideEffects,
                "EXPLAIN PLAN writes to the plan table",
            ));
        }
        if matches!(items.get(i).map(|it| &it.sig), Some(Sig::LParen)) {
            i = skip_group(items, i);
        }
        while let Some(item) = items.get(i) {
            match &item.sig {
                Sig::Word { upper, quoted: false }
                    if EXPLAIN_OPTIONS.contains(&upper.as_str()) || upper == "FOR" =>
                {
                    i += 1
                }
                Sig::Other => i += 1,
                _ => break,
            }
        }

        let rest = &items[i.min(items.len())..];
        if rest.is_empty() {
            signals.push(Signal::new(RiskTier::Unrecognized, "EXPLAIN without a statement"));
            return out;
        }
        let starts_statement = matches!(rest[0].sig, Sig::LParen)
            || kw(items, i).is_some_and(|k| {
                LEADING_READ.contains(&k)
                    || DML.contains(&k)
                    || LEADING_SCHEMA.contains(&k)
                    || LEADING_ADMIN.contains(&k)
                    || k == "WITH"
            });
        if starts_statement {
            let inner = self.leading(items, i, signals);
            out.read_main = inner.read_main;
            out.cte_header_end = inner.cte_header_end;
            signals.push(Signal::new(RiskTier::Read, "EXPLAIN"));
        } else if rest
            .iter()
            .all(|it| matches!(it.sig, Sig::Word { .. } | Sig::Period))
        {
            // MySQL `EXPLAIN table` describes a table.
            signals.push(Signal::new(RiskTier::Read, "EXPLAIN of a table"));
        } else {
            signals.push(Signal::new(
                RiskTier::Unrecognized,
                "EXPLAIN of an unrecognized statement",
            ));
        }
        out
    }

    /// READ_WITH_SIDE_EFFECTS signatures inside read forms.
    fn scan_side_effects(&self, items: &[Item], cte_header_end: usize, signals: &mut Vec<Signal>) {
        for (i, item) in items.iter().enumerate() {
            let Sig::Word { upper, quoted } = &item.sig else {
                continue;
            };
            let followed_by_paren = matches!(items.get(i + 1).map(|n| &n.sig), Some(Sig::LParen));

            if !quoted {
                let after_paren = i > 0 && matches!(items[i - 1].sig, Sig::LParen);
                if after_paren && DML.contains(&upper.as_str()) && !followed_by_paren {
                    signals.push(Signal::new(
                        RiskTier::ReadWithSideEffects,
                        format!("nested data modification {}", upper),
                    ));
                    continue;
                }
                if upper == "FOR" {
                    let lock = match (kw(items, i + 1), kw(items, i + 2), kw(items, i + 3)) {
                        (Some("UPDATE"), _, _) => Some("FOR UPDATE"),
                        (Some("SHARE"), _, _) => Some("FOR SHARE"),
                        (Some("NO"), Some("KEY"), Some("UPDATE")) => Some("FOR NO KEY UPDATE"),
                        (Some("KEY"), Some("SHARE"), _) => Some("FOR KEY SHARE"),
                        _ => None,
                    };
                    if let Some(lock) = lock {
                        signals.push(Signal::new(
                            RiskTier::ReadWithSideEffects,
                            format!("locking clause {}", lock),
                        ));
                    }
                    continue;
                }
                if upper == "LOCK" && kw(items, i + 1) == Some("IN") {
                    signals.push(Signal::new(
                        RiskTier::ReadWithSideEffects,
                        "locking clause LOCK IN SHARE MODE",
                    ));
                    continue;
                }
            }

            if !followed_by_paren {
                continue;
            }
            if !quoted && SYNTAX_WORDS.contains(&upper.as_str()) {
                continue;
            }
            if i > 0 && matches!(items[i - 1].sig, Sig::RParen | Sig::Cast) {
                continue;
            }
            if i > 0 && matches!(&items[i - 1].sig, Sig::Word { upper, quoted: false } if upper == "AS")
            {
                continue;
            }
            if i < cte_header_end && item.depth == items[cte_header_end].depth {
                continue;
            }
            let name = qualified_name(items, i);
            if !self.is_trusted(&name) {
                signals.push(Signal::new(
                    RiskTier::ReadWithSideEffects,
                    format!("calls routine {} which is not on the trusted list", name),
                ));
            }
        }
    }

    fn is_trusted(&self, qualified: &str) -> bool {
        let (qualifier, name) = match qualified.rsplit_once('.') {
            Some((q, n)) => (Some(q), n),
            None => (None, qualified),
        };
        if self.trusted.contains(qualified) || self.trusted.contains(name) {
            return true;
        }
        matches!(qualifier, None | Some("pg_catalog")) && TRUSTED_BUILTINS.contains(&name)
    }
}

/// Collapse `%(name)s` and `:name` into [`Sig::Placeholder`].
fn collapse_placeholders(sigs: Vec<Sig>) -> Vec<Sig> {
    let is_word = |idx: usize| matches!(sigs.get(idx), Some(Sig::Word { quoted: false, .. }));
    let mut out = Vec::with_capacity(sigs.len());
    let mut i = 0;
    while i < sigs.len() {
        let canonical = sigs[i] == Sig::Percent
            && sigs.get(i + 1) == Some(&Sig::LParen)
            && is_word(i + 2)
            && sigs.get(i + 3) == Some(&Sig::RParen)
            && matches!(sigs.get(i + 4), Some(Sig::Word { upper, quoted: false }) if upper == "S");
        if canonical {
            out.push(Sig::Placeholder);
            i += 5;
            continue;
        }
        let bind = sigs[i] == Sig::Colon
            && is_word(i + 1)
            && sigs.get(i + 2) != Some(&Sig::LParen);
        if bind {
            out.push(Sig::Placeholder);
            i += 2;
            continue;
        }
        out.push(match &sigs[i] {
            Sig::Percent | Sig::Colon => Sig::Other,
            sig => sig.clone(),
        });
        i += 1;
    }
    out
}

/// Unquoted keyword at `idx`, upper-cased.
fn kw(items: &[Item], idx: usize) -> Option<&str> {
    match items.get(idx).map(|i| &i.sig) {
        Some(Sig::Word {
            upper,
            quoted: false,
        }) => Some(upper.as_str()),
        _ => None,
    }
}

/// Words of a possibly qualified routine name starting at `idx`.
fn routine_name_words(items: &[Item], idx: usize) -> impl Iterator<Item = &str> {
    items[idx.min(items.len())..]
        .iter()
        .take_while(|i| matches!(i.sig, Sig::Word { .. } | Sig::Period))
        .filter_map(|i| match &i.sig {
            Sig::Word { upper, .. } => Some(upper.as_str()),
            _ => None,
        })
}

/// Lower-cased `schema.name` ending at the word at `idx`.
fn qualified_name(items: &[Item], idx: usize) -> String {
    let mut parts = Vec::new();
    let mut i = idx;
    loop {
        if let Sig::Word { upper, .. } = &items[i].sig {
            parts.push(upper.to_ascii_lowercase());
        }
        if i >= 2 && matches!(items[i - 1].sig, Sig::Period) && matches!(items[i - 2].sig, Sig::Word { .. }) {
            i -= 2;
        } else {
            break;
        }
    }
    parts.reverse();
    parts.join(".")
}

/// Index just past the parenthesized group opening at `idx`.
fn skip_group(items: &[Item], idx: usize) -> usize {
    let depth = items[idx].depth;
    (idx + 1..items.len())
        .find(|&i| matches!(items[i].sig, Sig::RParen) && items[i].depth == depth)
        .map(|i| i + 1)
        .unwrap_or(items.len())
}

/// ADMIN routine references and file exports, anywhere in the statement.
fn scan_admin_references(items: &[Item], signals: &mut Vec<Signal>) {
    for (i, item) in items.iter().enumerate() {
        let Sig::Word { upper, quoted } = &item.sig else {
            continue;
        };
        let lower = upper.to_ascii_lowercase();
        if lower.starts_with("xp_") || ADMIN_ROUTINES.contains(&lower.as_str()) {
            signals.push(Signal::new(
                RiskTier::Admin,
                format!("references system routine {}", lower),
            ));
        }
        if !quoted && upper == "INTO" {
            if let Some(target @ ("OUTFILE" | "DUMPFILE")) = kw(items, i + 1) {
                signals.push(Signal::new(
                    RiskTier::Admin,
                    format!("INTO {} writes to the server file system", target),
                ));
            }
        }
    }
}

/// `SELECT ... INTO <target>` at the main query's level creates or fills a table.
fn scan_select_into(items: &[Item], main: usize, signals: &mut Vec<Signal>) {
    let depth = items[main].depth;
    let into = (main + 1..items.len()).find(|&i| {
        items[i].depth == depth
            && kw(items, i) == Some("INTO")
            && !matches!(kw(items, i + 1), Some("OUTFILE" | "DUMPFILE"))
    });
    if into.is_some() {
        signals.push(Signal::new(
            RiskTier::SchemaChange,
            "SELECT ... INTO creates or fills a table",
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tier(sql: &str) -> RiskTier {
        classify(sql).tier
    }

    // =========================================================================
    // Read forms
    // =========================================================================

    #[test]
    fn test_plain_reads() {
        assert_eq!(tier("SELECT 1"), RiskTier::Read);
        assert_eq!(tier("  select * from users where id = 1"), RiskTier::Read);
        assert_eq!(tier("SHOW TABLES"), RiskTier::Read);
        assert_eq!(tier("DESCRIBE users"), RiskTier::Read);
        assert_eq!(tier("VALUES (1), (2)"), RiskTier::Read);
        assert_eq!(tier("(SELECT 1) UNION (SELECT 2)"), RiskTier::Read);
    }

    #[test]
    fn test_read_with_trusted_functions() {
        assert_eq!(
            tier("SELECT count(*), max(price), coalesce(name, 'x') FROM items GROUP BY name"),
            RiskTier::Read
        );
        assert_eq!(
            tier("SELECT CAST(price AS DECIMAL(10, 2)), price::numeric(8,2) FROM items"),
            RiskTier::Read
        );
        assert_eq!(
            tier("SELECT * FROM t WHERE id IN (SELECT id FROM u) AND EXISTS (SELECT 1)"),
            RiskTier::Read
        );
    }

    #[test]
    fn test_keywords_inside_literals_and_comments_are_ignored() {
        assert_eq!(tier("SELECT 'DROP TABLE users; --' AS s"), RiskTier::Read);
        assert_eq!(tier("SELECT 1 /* DELETE FROM users */"), RiskTier::Read);
        assert_eq!(tier("-- GRANT ALL\nSELECT 1"), RiskTier::Read);
    }

    #[test]
    fn test_placeholders_collapse() {
        assert_eq!(
            tier("SELECT * FROM users WHERE name = %(delete)s AND id = :drop"),
            RiskTier::Read
        );
    }

    #[test]
    fn test_with_read() {
        let c = classify("WITH recent AS (SELECT * FROM orders) SELECT * FROM recent");
        assert_eq!(c.tier, RiskTier::Read);
        assert_eq!(c.leading_keyword.as_deref(), Some("WITH"));
        assert_eq!(
            tier("WITH t(a, b) AS (SELECT 1, 2) SELECT a FROM t"),
            RiskTier::Read
        );
    }

    // =========================================================================
    // Escalations
    // =========================================================================

    #[test]
    fn test_writable_cte_is_side_effect() {
        assert_eq!(
            tier("WITH d AS (DELETE FROM users RETURNING *) SELECT * FROM d"),
            RiskTier::ReadWithSideEffects
        );
    }

    #[test]
    fn test_with_main_dml_is_write() {
        assert_eq!(
            tier("WITH src AS (SELECT 1 AS id) DELETE FROM users WHERE id IN (SELECT id FROM src)"),
            RiskTier::Write
        );
    }

    #[test]
    fn test_locking_clauses() {
        assert_eq!(tier("SELECT * FROM t FOR UPDATE"), RiskTier::ReadWithSideEffects);
        assert_eq!(
            tier("SELECT * FROM t LOCK IN SHARE MODE"),
            RiskTier::ReadWithSideEffects
        );
    }

    #[test]
    fn test_untrusted_function() {
        assert_eq!(tier("SELECT nextval('seq')"), RiskTier::ReadWithSideEffects);
        assert_eq!(tier("SELECT app.refresh_cache()"), RiskTier::ReadWithSideEffects);
    }

    #[test]
    fn test_configured_trusted_function() {
        let classifier = StatementClassifier::new(DatabaseType::PostgreSQL, ["app.safe_fn"]);
        assert_eq!(classifier.classify("SELECT app.safe_fn(1)").tier, RiskTier::Read);
        assert_eq!(
            classifier.classify("SELECT other.safe_fn(1)").tier,
            RiskTier::ReadWithSideEffects
        );
    }

    #[test]
    fn test_writes_and_schema_changes() {
        assert_eq!(tier("DELETE FROM users"), RiskTier::Write);
        assert_eq!(tier("insert into t values (1)"), RiskTier::Write);
        assert_eq!(tier("MERGE INTO t USING s ON (t.id = s.id)"), RiskTier::Write);
        assert_eq!(tier("DROP TABLE users"), RiskTier::SchemaChange);
        assert_eq!(tier("TRUNCATE users"), RiskTier::SchemaChange);
        assert_eq!(tier("SELECT * INTO backup FROM users"), RiskTier::SchemaChange);
    }

    #[test]
    fn test_admin() {
        assert_eq!(tier("GRANT ALL ON t TO bob"), RiskTier::Admin);
        assert_eq!(tier("CREATE USER bob"), RiskTier::Admin);
        assert_eq!(tier("ALTER SYSTEM SET work_mem = '1GB'"), RiskTier::Admin);
        assert_eq!(tier("SET ROLE admin"), RiskTier::Admin);
        assert_eq!(tier("EXEC sp_configure 'show advanced options', 1"), RiskTier::Admin);
        assert_eq!(tier("SELECT pg_read_file('/etc/passwd')"), RiskTier::Admin);
        assert_eq!(tier("SELECT \"pg_read_file\"('/etc/passwd')"), RiskTier::Admin);
        assert_eq!(tier("SELECT * FROM t INTO OUTFILE '/tmp/x'"), RiskTier::Admin);
        assert_eq!(tier("SELECT UTL_HTTP.REQUEST('http://x') FROM dual"), RiskTier::Admin);
    }

    #[test]
    fn test_unrecognized() {
        assert_eq!(tier(""), RiskTier::Unrecognized);
        assert_eq!(tier("   -- only a comment"), RiskTier::Unrecognized);
        assert_eq!(tier("SELECT 1;"), RiskTier::Unrecognized);
        assert_eq!(tier("SELECT 1; DROP TABLE users"), RiskTier::Unrecognized);
        assert_eq!(tier("SELECT 'unterminated"), RiskTier::Unrecognized);
        assert_eq!(tier("SELECT (1"), RiskTier::Unrecognized);
        assert_eq!(tier("SELECT 1)"), RiskTier::Unrecognized);
        assert_eq!(tier("VACUUM"), RiskTier::Unrecognized);
        assert_eq!(tier("CALL do_things()"), RiskTier::Unrecognized);
        assert_eq!(tier("SELECT 1 /*! , sleep(10) */"), RiskTier::Unrecognized);
    }

    #[test]
    fn test_explain_takes_inner_tier() {
        assert_eq!(tier("EXPLAIN SELECT * FROM t"), RiskTier::Read);
        assert_eq!(tier("EXPLAIN (ANALYZE, FORMAT JSON) SELECT 1"), RiskTier::Read);
        assert_eq!(tier("EXPLAIN ANALYZE DELETE FROM t"), RiskTier::Write);
        assert_eq!(
            tier("EXPLAIN PLAN FOR SELECT * FROM t"),
            RiskTier::ReadWithSideEffects
        );
        assert_eq!(tier("EXPLAIN users"), RiskTier::Read);
    }

    #[test]
    fn test_intent_and_signals() {
        let c = classify("DROP TABLE users");
        assert_eq!(c.intent, Intent::Ddl);
        assert_eq!(c.leading_keyword.as_deref(), Some("DROP"));
        assert!(!c.signals.is_empty());
    }

    #[test]
    fn test_tier_ordering() {
        assert!(RiskTier::Read < RiskTier::ReadWithSideEffects);
        assert!(RiskTier::Write < RiskTier::SchemaChange);
        assert!(RiskTier::Admin < RiskTier::Unrecognized);
        assert_eq!(
            serde_json::to_string(&RiskTier::ReadWithSideEffects).unwrap(),
            "\"READ_WITH_SIDE_EFFECTS\""
        );
    }
}
