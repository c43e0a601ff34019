//! The SQL subset understood by the loopback engine.
//!
//! Supported statements:
//!
//! ```text
//! CREATE TABLE t (col TYPE [modifiers], ...)
//! INSERT INTO t [(col, ...)] VALUES (expr, ...)[, (expr, ...)]
//! DELETE FROM t [WHERE col = expr]
//! SELECT * | col, ... | COUNT(*) FROM t [WHERE col = expr]
//! ```
//!
//! `expr` is an integer, a `'quoted'` string, `TRUE`/`FALSE`, `NULL` or a
//! `$n` placeholder. Every write is stamped with the log position it
//! commits at, so a `SELECT` can be evaluated against any earlier position.

use std::collections::{BTreeMap, BTreeSet};

/// One SQL datum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Datum {
    Null,
    BigInt(i64),
    Text(String),
    Boolean(bool),
    Timestamp(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ColumnType {
    BigInt,
    Text,
    Boolean,
    Timestamp,
}

impl ColumnType {
    fn parse(word: &str) -> Option<Self> {
        match word.to_ascii_uppercase().as_str() {
            "BIGINT" | "INT" | "INTEGER" => Some(Self::BigInt),
            "TEXT" | "VARCHAR" => Some(Self::Text),
            "BOOLEAN" | "BOOL" => Some(Self::Boolean),
            "TIMESTAMP" => Some(Self::Timestamp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SqlError {
    Syntax(String),
    Execution(String),
    ParameterMismatch { placeholders: usize, supplied: usize },
}

fn syntax<T>(message: impl Into<String>) -> Result<T, SqlError> {
    Err(SqlError::Syntax(message.into()))
}

fn execution<T>(message: impl Into<String>) -> Result<T, SqlError> {
    Err(SqlError::Execution(message.into()))
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Int(i64),
    Str(String),
    Param(usize),
    LParen,
    RParen,
    Comma,
    Star,
    Eq,
    Semi,
}

fn tokenize(sql: &str) -> Result<Vec<Token>, SqlError> {
    let chars: Vec<char> = sql.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' | ')' | ',' | '*' | '=' | ';' => {
                tokens.push(match c {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    ',' => Token::Comma,
                    '*' => Token::Star,
                    '=' => Token::Eq,
                    _ => Token::Semi,
                });
                i += 1;
            }
            '\'' => {
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return syntax("unterminated string literal"),
                        Some('\'') if chars.get(i + 1) == Some(&'\'') => {
                            text.push('\'');
                            i += 2;
                        }
                        Some('\'') => {
                            i += 1;
                            break;
                        }
                        Some(&other) => {
                            text.push(other);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(text));
            }
            '$' => {
                let start = i + 1;
                i = start;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let digits: String = chars[start..i].iter().collect();
                match digits.parse::<usize>() {
                    Ok(n) if n > 0 => tokens.push(Token::Param(n)),
                    _ => return syntax(format!("invalid placeholder `${digits}`")),
                }
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) => {
                let start = i;
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                match literal.parse::<i64>() {
                    Ok(n) => tokens.push(Token::Int(n)),
                    Err(_) => return syntax(format!("integer out of range: {literal}")),
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Word(chars[start..i].iter().collect()));
            }
            other => return syntax(format!("unexpected character `{other}`")),
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Datum),
    Param(usize),
}

#[derive(Debug, Clone, PartialEq)]
enum Projection {
    All,
    Columns(Vec<String>),
    CountStar,
}

#[derive(Debug, Clone, PartialEq)]
struct Filter {
    column: String,
    value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
enum Statement {
    CreateTable {
        name: String,
        columns: Vec<(String, ColumnType)>,
    },
    Insert {
        table: String,
        columns: Option<Vec<String>>,
        rows: Vec<Vec<Expr>>,
    },
    Delete {
        table: String,
        filter: Option<Filter>,
    },
    Select {
        table: String,
        projection: Projection,
        filter: Option<Filter>,
    },
}

impl Statement {
    fn placeholders(&self) -> BTreeSet<usize> {
        fn collect<'a>(exprs: impl Iterator<Item = &'a Expr>, out: &mut BTreeSet<usize>) {
            for expr in exprs {
                if let Expr::Param(n) = expr {
                    out.insert(*n);
                }
            }
        }

        let mut out = BTreeSet::new();
        match self {
            Statement::CreateTable { .. } => {}
            Statement::Insert { rows, .. } => collect(rows.iter().flatten(), &mut out),
            Statement::Delete { filter, .. } | Statement::Select { filter, .. } => {
                collect(filter.iter().map(|f| &f.value), &mut out);
            }
        }
        out
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword))
    }

    fn keyword(&mut self, keyword: &str) -> Result<(), SqlError> {
        if self.at_keyword(keyword) {
            self.pos += 1;
            Ok(())
        } else {
            syntax(format!("expected {keyword}"))
        }
    }

    fn punct(&mut self, expected: &Token) -> Result<(), SqlError> {
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            syntax(format!("expected {expected:?}"))
        }
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> Result<String, SqlError> {
        match self.next() {
            Some(Token::Word(w)) => Ok(w.to_ascii_lowercase()),
            other => syntax(format!("expected identifier, found {other:?}")),
        }
    }

    fn expr(&mut self) -> Result<Expr, SqlError> {
        match self.next() {
            Some(Token::Int(n)) => Ok(Expr::Literal(Datum::BigInt(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Datum::Text(s))),
            Some(Token::Param(n)) => Ok(Expr::Param(n)),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("NULL") => Ok(Expr::Literal(Datum::Null)),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("TRUE") => {
                Ok(Expr::Literal(Datum::Boolean(true)))
            }
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("FALSE") => {
                Ok(Expr::Literal(Datum::Boolean(false)))
            }
            other => syntax(format!("expected value, found {other:?}")),
        }
    }

    fn ident_list(&mut self) -> Result<Vec<String>, SqlError> {
        let mut names = vec![self.ident()?];
        while self.eat(&Token::Comma) {
            names.push(self.ident()?);
        }
        Ok(names)
    }

    fn filter(&mut self) -> Result<Option<Filter>, SqlError> {
        if !self.at_keyword("WHERE") {
            return Ok(None);
        }
        self.pos += 1;
        let column = self.ident()?;
        self.punct(&Token::Eq)?;
        let value = self.expr()?;
        Ok(Some(Filter { column, value }))
    }

    fn statement(&mut self) -> Result<Statement, SqlError> {
        let statement = if self.at_keyword("CREATE") {
            self.create_table()?
        } else if self.at_keyword("INSERT") {
            self.insert()?
        } else if self.at_keyword("DELETE") {
            self.pos += 1;
            self.keyword("FROM")?;
            let table = self.ident()?;
            let filter = self.filter()?;
            Statement::Delete { table, filter }
        } else if self.at_keyword("SELECT") {
            self.select()?
        } else {
            return syntax("expected CREATE, INSERT, DELETE or SELECT");
        };

        self.eat(&Token::Semi);
        if let Some(token) = self.peek() {
            return syntax(format!("unexpected trailing input at {token:?}"));
        }
        Ok(statement)
    }

    fn create_table(&mut self) -> Result<Statement, SqlError> {
        self.keyword("CREATE")?;
        self.keyword("TABLE")?;
        let name = self.ident()?;
        self.punct(&Token::LParen)?;

        let mut columns = Vec::new();
        loop {
            let column = self.ident()?;
            let type_name = self.ident()?;
            let Some(column_type) = ColumnType::parse(&type_name) else {
                return syntax(format!("unknown column type `{type_name}`"));
            };
            // Length suffixes and constraints are accepted and ignored.
            let mut depth = 0usize;
            loop {
                match self.peek() {
                    Some(Token::Comma | Token::RParen) if depth == 0 => break,
                    Some(Token::LParen) => depth += 1,
                    Some(Token::RParen) => depth -= 1,
                    None => return syntax("unterminated column list"),
                    Some(_) => {}
                }
                self.pos += 1;
            }
            columns.push((column, column_type));
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.punct(&Token::RParen)?;
        Ok(Statement::CreateTable { name, columns })
    }

    fn insert(&mut self) -> Result<Statement, SqlError> {
        self.keyword("INSERT")?;
        self.keyword("INTO")?;
        let table = self.ident()?;
        let columns = if self.eat(&Token::LParen) {
            let names = self.ident_list()?;
            self.punct(&Token::RParen)?;
            Some(names)
        } else {
            None
        };
        self.keyword("VALUES")?;

        let mut rows = Vec::new();
        loop {
            self.punct(&Token::LParen)?;
            let mut row = vec![self.expr()?];
            while self.eat(&Token::Comma) {
                row.push(self.expr()?);
            }
            self.punct(&Token::RParen)?;
            rows.push(row);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(Statement::Insert {
            table,
            columns,
            rows,
        })
    }

    fn select(&mut self) -> Result<Statement, SqlError> {
        self.keyword("SELECT")?;
        let projection = if self.eat(&Token::Star) {
            Projection::All
        } else if self.at_keyword("COUNT") {
            self.pos += 1;
            self.punct(&Token::LParen)?;
            self.punct(&Token::Star)?;
            self.punct(&Token::RParen)?;
            Projection::CountStar
        } else {
            Projection::Columns(self.ident_list()?)
        };
        self.keyword("FROM")?;
        let table = self.ident()?;
        let filter = self.filter()?;
        Ok(Statement::Select {
            table,
            projection,
            filter,
        })
    }
}

fn parse(sql: &str) -> Result<Statement, SqlError> {
    let tokens = tokenize(sql)?;
    if tokens.is_empty() {
        return syntax("empty statement");
    }
    Parser { tokens, pos: 0 }.statement()
}

/// Placeholders must be exactly `$1..=$n` with `n` parameters supplied.
fn check_params(statement: &Statement, params: &[Datum]) -> Result<(), SqlError> {
    let used = statement.placeholders();
    let highest = used.last().copied().unwrap_or(0);
    if highest != params.len() || used.len() != highest {
        return Err(SqlError::ParameterMismatch {
            placeholders: highest.max(used.len()),
            supplied: params.len(),
        });
    }
    Ok(())
}

fn resolve(expr: &Expr, params: &[Datum]) -> Datum {
    match expr {
        Expr::Literal(datum) => datum.clone(),
        Expr::Param(n) => params[n - 1].clone(),
    }
}

fn coerce(datum: Datum, column_type: ColumnType, column: &str) -> Result<Datum, SqlError> {
    match (datum, column_type) {
        (Datum::Null, _) => Ok(Datum::Null),
        (Datum::BigInt(n), ColumnType::BigInt) => Ok(Datum::BigInt(n)),
        (Datum::BigInt(n) | Datum::Timestamp(n), ColumnType::Timestamp) => Ok(Datum::Timestamp(n)),
        (Datum::Text(s), ColumnType::Text) => Ok(Datum::Text(s)),
        (Datum::Boolean(b), ColumnType::Boolean) => Ok(Datum::Boolean(b)),
        (other, _) => execution(format!(
            "type mismatch for column {column}: expected {column_type:?}, got {other:?}"
        )),
    }
}

#[derive(Debug)]
struct RowVersion {
    values: Vec<Datum>,
    inserted_at: u64,
    deleted_at: Option<u64>,
}

impl RowVersion {
    fn visible_at(&self, position: u64) -> bool {
        self.inserted_at <= position && self.deleted_at.map_or(true, |d| d > position)
    }
}

#[derive(Debug)]
struct Table {
    columns: Vec<(String, ColumnType)>,
    created_at: u64,
    rows: Vec<RowVersion>,
}

impl Table {
    fn column(&self, name: &str) -> Result<(usize, ColumnType), SqlError> {
        self.columns
            .iter()
            .position(|(c, _)| c == name)
            .map(|i| (i, self.columns[i].1))
            .ok_or_else(|| SqlError::Execution(format!("column not found: {name}")))
    }

    /// Row indices visible at `position` that satisfy `filter`.
    fn matching(
        &self,
        filter: Option<&Filter>,
        params: &[Datum],
        position: u64,
    ) -> Result<Vec<usize>, SqlError> {
        let predicate = match filter {
            Some(f) => {
                let (index, column_type) = self.column(&f.column)?;
                Some((index, coerce(resolve(&f.value, params), column_type, &f.column)?))
            }
            None => None,
        };
        Ok(self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.visible_at(position))
            .filter(|(_, row)| match &predicate {
                Some((_, Datum::Null)) => false,
                Some((index, value)) => &row.values[*index] == value,
                None => true,
            })
            .map(|(i, _)| i)
            .collect())
    }
}

/// What a statement produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outcome {
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<Datum>>,
    },
    Written {
        rows_affected: u64,
    },
}

/// One tenant's tables, versioned by log position.
#[derive(Debug, Default)]
pub(crate) struct Database {
    tables: BTreeMap<String, Table>,
}

impl Database {
    /// Runs `sql` against current state. Writes commit at `*position + 1`
    /// and advance `position` only when they succeed.
    pub(crate) fn run(
        &mut self,
        sql: &str,
        params: &[Datum],
        position: &mut u64,
    ) -> Result<Outcome, SqlError> {
        let statement = parse(sql)?;
        check_params(&statement, params)?;
        if matches!(statement, Statement::Select { .. }) {
            return self.select(&statement, params, *position);
        }

        let commit = *position + 1;
        let outcome = self.write(statement, params, commit)?;
        *position = commit;
        Ok(outcome)
    }

    /// Runs a `SELECT` against the state as of `position`.
    pub(crate) fn run_at(
        &self,
        sql: &str,
        params: &[Datum],
        position: u64,
    ) -> Result<Outcome, SqlError> {
        let statement = parse(sql)?;
        check_params(&statement, params)?;
        if !matches!(statement, Statement::Select { .. }) {
            return execution("point-in-time queries must be SELECT statements");
        }
        self.select(&statement, params, position)
    }

    fn table_at(&self, name: &str, position: u64) -> Result<&Table, SqlError> {
        match self.tables.get(name) {
            Some(table) if table.created_at <= position => Ok(table),
            _ => execution(format!("table not found: {name}")),
        }
    }

    fn select(
        &self,
        statement: &Statement,
        params: &[Datum],
        position: u64,
    ) -> Result<Outcome, SqlError> {
        let Statement::Select {
            table,
            projection,
            filter,
        } = statement
        else {
            return execution("not a SELECT");
        };
        let table = self.table_at(table, position)?;
        let hits = table.matching(filter.as_ref(), params, position)?;

        let indices: Vec<usize> = match projection {
            Projection::CountStar => {
                return Ok(Outcome::Rows {
                    columns: vec!["count".to_string()],
                    rows: vec![vec![Datum::BigInt(hits.len() as i64)]],
                });
            }
            Projection::All => (0..table.columns.len()).collect(),
            Projection::Columns(names) => names
                .iter()
                .map(|n| table.column(n).map(|(i, _)| i))
                .collect::<Result<_, _>>()?,
        };

        let columns = indices.iter().map(|&i| table.columns[i].0.clone()).collect();
        let rows = hits
            .into_iter()
            .map(|r| indices.iter().map(|&i| table.rows[r].values[i].clone()).collect())
            .collect();
        Ok(Outcome::Rows { columns, rows })
    }

    fn write(
        &mut self,
        statement: Statement,
        params: &[Datum],
        commit: u64,
    ) -> Result<Outcome, SqlError> {
        match statement {
            Statement::CreateTable { name, columns } => {
                if self.tables.contains_key(&name) {
                    return execution(format!("table already exists: {name}"));
                }
                let mut seen = BTreeSet::new();
                if let Some((dup, _)) = columns.iter().find(|(c, _)| !seen.insert(c.clone())) {
                    return execution(format!("duplicate column: {dup}"));
                }
                self.tables.insert(
                    name,
                    Table {
                        columns,
                        created_at: commit,
                        rows: Vec::new(),
                    },
                );
                Ok(Outcome::Written { rows_affected: 0 })
            }
            Statement::Insert {
                table,
                columns,
                rows,
            } => {
                let target = self.table_at(&table, commit)?;
                let order: Vec<usize> = match &columns {
                    Some(names) => names
                        .iter()
                        .map(|n| target.column(n).map(|(i, _)| i))
                        .collect::<Result<_, _>>()?,
                    None => (0..target.columns.len()).collect(),
                };

                let mut staged = Vec::with_capacity(rows.len());
                for row in &rows {
                    if row.len() != order.len() {
                        return execution(format!(
                            "expected {} values, got {}",
                            order.len(),
                            row.len()
                        ));
                    }
                    let mut values = vec![Datum::Null; target.columns.len()];
                    for (expr, &index) in row.iter().zip(&order) {
                        let (name, column_type) = &target.columns[index];
                        values[index] = coerce(resolve(expr, params), *column_type, name)?;
                    }
                    staged.push(RowVersion {
                        values,
                        inserted_at: commit,
                        deleted_at: None,
                    });
                }

                let affected = staged.len() as u64;
                if let Some(target) = self.tables.get_mut(&table) {
                    target.rows.extend(staged);
                }
                Ok(Outcome::Written {
                    rows_affected: affected,
                })
            }
            Statement::Delete { table, filter } => {
                let hits = self
                    .table_at(&table, commit)?
                    .matching(filter.as_ref(), params, commit)?;
                if let Some(target) = self.tables.get_mut(&table) {
                    for &i in &hits {
                        target.rows[i].deleted_at = Some(commit);
                    }
                }
                Ok(Outcome::Written {
                    rows_affected: hits.len() as u64,
                })
            }
            Statement::Select { .. } => execution("SELECT is not a write"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(outcome: Outcome) -> Vec<Vec<Datum>> {
        match outcome {
            Outcome::Rows { rows, .. } => rows,
            other @ Outcome::Written { .. } => panic!("expected rows, got {other:?}"),
        }
    }

    fn seeded() -> (Database, u64) {
        let mut db = Database::default();
        let mut pos = 0;
        db.run("CREATE TABLE users (id BIGINT PRIMARY KEY, name TEXT)", &[], &mut pos)
            .unwrap();
        db.run(
            "INSERT INTO users (id, name) VALUES ($1, $2)",
            &[Datum::BigInt(1), Datum::Text("Alice".into())],
            &mut pos,
        )
        .unwrap();
        (db, pos)
    }

    #[test]
    fn tokenizes_literals() {
        let tokens = tokenize("SELECT 'it''s', -5, $2;").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Word("SELECT".into()),
                Token::Str("it's".into()),
                Token::Comma,
                Token::Int(-5),
                Token::Comma,
                Token::Param(2),
                Token::Semi,
            ]
        );
        assert!(matches!(tokenize("'open"), Err(SqlError::Syntax(_))));
        assert!(matches!(tokenize("$0"), Err(SqlError::Syntax(_))));
    }

    #[test]
    fn writes_advance_position() {
        let (mut db, pos) = seeded();
        assert_eq!(pos, 2);

        let mut pos = pos;
        let outcome = db
            .run("INSERT INTO users VALUES (2, 'Bob'), (3, 'Cy')", &[], &mut pos)
            .unwrap();
        assert_eq!(outcome, Outcome::Written { rows_affected: 2 });
        assert_eq!(pos, 3);

        // Reads do not advance.
        db.run("SELECT * FROM users", &[], &mut pos).unwrap();
        assert_eq!(pos, 3);
    }

    #[test]
    fn select_shapes() {
        let (mut db, mut pos) = seeded();
        let outcome = db.run("select name from users where id = 1", &[], &mut pos).unwrap();
        assert_eq!(
            outcome,
            Outcome::Rows {
                columns: vec!["name".into()],
                rows: vec![vec![Datum::Text("Alice".into())]],
            }
        );

        let count = rows(db.run("SELECT COUNT(*) FROM users", &[], &mut pos).unwrap());
        assert_eq!(count, vec![vec![Datum::BigInt(1)]]);

        let none = rows(db.run("SELECT * FROM users WHERE id = NULL", &[], &mut pos).unwrap());
        assert!(none.is_empty());
    }

    #[test]
    fn history_is_preserved() {
        let (mut db, mut pos) = seeded();
        let captured = pos;
        db.run("DELETE FROM users WHERE id = 1", &[], &mut pos).unwrap();
        db.run("INSERT INTO users VALUES (9, 'Zed')", &[], &mut pos).unwrap();

        let then = rows(db.run_at("SELECT id FROM users", &[], captured).unwrap());
        assert_eq!(then, vec![vec![Datum::BigInt(1)]]);
        let now = rows(db.run("SELECT id FROM users", &[], &mut pos).unwrap());
        assert_eq!(now, vec![vec![Datum::BigInt(9)]]);

        assert!(matches!(
            db.run_at("SELECT * FROM users", &[], 0),
            Err(SqlError::Execution(_))
        ));
        assert!(matches!(
            db.run_at("DELETE FROM users", &[], pos),
            Err(SqlError::Execution(_))
        ));
    }

    #[test]
    fn placeholder_count_must_match() {
        let (mut db, mut pos) = seeded();
        let err = db
            .run("SELECT * FROM users WHERE id = $1", &[], &mut pos)
            .unwrap_err();
        assert_eq!(
            err,
            SqlError::ParameterMismatch {
                placeholders: 1,
                supplied: 0
            }
        );
        let err = db
            .run("SELECT * FROM users", &[Datum::BigInt(1)], &mut pos)
            .unwrap_err();
        assert!(matches!(err, SqlError::ParameterMismatch { supplied: 1, .. }));
    }

    #[test]
    fn errors_are_classified() {
        let (mut db, mut pos) = seeded();
        assert!(matches!(
            db.run("SELEC * FROM users", &[], &mut pos),
            Err(SqlError::Syntax(_))
        ));
        assert!(matches!(
            db.run("SELECT * FROM missing", &[], &mut pos),
            Err(SqlError::Execution(_))
        ));
        assert!(matches!(
            db.run("INSERT INTO users VALUES ('x', 'y')", &[], &mut pos),
            Err(SqlError::Execution(_))
        ));
        assert!(matches!(
            db.run("CREATE TABLE users (id BIGINT)", &[], &mut pos),
            Err(SqlError::Execution(_))
        ));
        // Failed writes leave the position alone.
        assert_eq!(pos, 2);
    }

    #[test]
    fn bigint_literals_fill_timestamp_columns() {
        let mut db = Database::default();
        let mut pos = 0;
        db.run("CREATE TABLE t (at TIMESTAMP NOT NULL, ok BOOLEAN)", &[], &mut pos)
            .unwrap();
        db.run("INSERT INTO t VALUES (-1, TRUE)", &[], &mut pos).unwrap();
        let got = rows(db.run("SELECT * FROM t WHERE at = -1", &[], &mut pos).unwrap());
        assert_eq!(got, vec![vec![Datum::Timestamp(-1), Datum::Boolean(true)]]);
    }
}
