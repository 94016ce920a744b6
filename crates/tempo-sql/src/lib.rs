//! SQL building blocks for tempo migrations.
//!
//! Quoting helpers, column types, default expressions, and a small CHECK
//! expression AST that renders to Postgres SQL and can also be evaluated
//! against an in-memory row with SQL three-valued logic.

mod expr;
pub use expr::*;

mod types;
pub use types::*;

/// A PostgreSQL string literal wrapper.
///
/// Display writes the value escaped and quoted with single quotes.
///
/// # Example
/// ```
/// use tempo_sql::Lit;
/// assert_eq!(format!("{}", Lit("task")), "'task'");
/// assert_eq!(format!("{}", Lit("it's")), "'it''s'");
/// ```
pub struct Lit<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> std::fmt::Display for Lit<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'")?;
        for c in self.0.as_ref().chars() {
            if c == '\'' {
                write!(f, "''")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "'")
    }
}

/// A PostgreSQL identifier wrapper.
///
/// Display writes the value escaped and quoted with double quotes.
///
/// # Example
/// ```
/// use tempo_sql::Ident;
/// assert_eq!(format!("{}", Ident("users")), "\"users\"");
/// assert_eq!(format!("{}", Ident("bla\"h")), "\"bla\"\"h\"");
/// ```
pub struct Ident<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> std::fmt::Display for Ident<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"")?;
        for c in self.0.as_ref().chars() {
            if c == '"' {
                write!(f, "\"\"")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "\"")
    }
}

/// Quote a PostgreSQL identifier.
///
/// Always quotes, so reserved words like `user` or `rank` are safe.
pub fn quote_ident(name: &str) -> String {
    format!("{}", Ident(name))
}

/// Standard index name for a table and columns: `idx_{table}_{columns}`.
///
/// # Examples
///
/// ```
/// use tempo_sql::index_name;
/// assert_eq!(index_name("habits", &["user_id"]), "idx_habits_user_id");
/// assert_eq!(index_name("tasks", &["owner_id", "due_date"]), "idx_tasks_owner_id_due_date");
/// ```
pub fn index_name(table: &str, columns: &[impl AsRef<str>]) -> String {
    let cols: Vec<&str> = columns.iter().map(|c| c.as_ref()).collect();
    format!("idx_{}_{}", table, cols.join("_"))
}

/// Stable fingerprint of a SQL script.
///
/// Whitespace outside of quoted strings and identifiers is collapsed before
/// hashing, so reformatting a script does not change its fingerprint.
///
/// ```
/// let a = tempo_sql::fingerprint("ALTER TABLE  \"tasks\"\n  DROP COLUMN \"x\";");
/// let b = tempo_sql::fingerprint("ALTER TABLE \"tasks\" DROP COLUMN \"x\";");
/// assert_eq!(a, b);
/// assert_ne!(a, tempo_sql::fingerprint("ALTER TABLE \"tasks\" DROP COLUMN \"y\";"));
/// ```
pub fn fingerprint(sql: &str) -> String {
    let normalized = normalize_whitespace(sql);
    blake3::hash(normalized.as_bytes()).to_hex().to_string()
}

fn normalize_whitespace(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut pending_space = false;
    let mut quote: Option<char> = None;

    let mut chars = sql.chars().peekable();
    while let Some(ch) = chars.next() {
        if let Some(q) = quote {
            out.push(ch);
            if ch == q {
                // doubled quote is an escape, not a terminator
                if chars.peek() == Some(&q) {
                    if let Some(next) = chars.next() {
                        out.push(next);
                    }
                } else {
                    quote = None;
                }
            }
            continue;
        }

        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }

        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(ch);
        if ch == '\'' || ch == '"' {
            quote = Some(ch);
        }
    }

    out
}
