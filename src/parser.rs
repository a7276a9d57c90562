use crate::ast::{
    CreateTable, Delete, Insert, JoinClause, LedgerAppend, Select, Statement, Update,
};
use crate::data_type::DataType;
use crate::error::{EngineError, Result};
use crate::row::Row;
use crate::table::{ColumnDef, JoinKind};
use crate::tokenizer::{Token, Tokenizer};
use crate::value::Value;

/// Tokenizes and parses one statement.
///
/// This is the pure text → [Statement] entry point; it never touches the
/// database.
pub fn parse_statement(sql: &str) -> Result<Statement> {
    let tokens = Tokenizer::new(sql).tokenize()?;
    Parser::new(tokens).parse()
}

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    pub fn parse(&mut self) -> Result<Statement> {
        let statement = match self.current_token() {
            Token::Create => self.parse_create_table(),
            Token::Insert => self.parse_insert(),
            Token::Select => self.parse_select(),
            Token::Update => self.parse_update(),
            Token::Delete => self.parse_delete(),
            Token::Drop => self.parse_drop_table(),
            Token::Show => self.parse_show_tables(),
            Token::Ledger => self.parse_ledger(),
            token => Err(EngineError::Parse(format!(
                "unsupported statement starting with {token:?}"
            ))),
        }?;

        // semicolon is optional, skip it
        if matches!(self.current_token(), Token::Semicolon) {
            self.advance();
        }

        // Check we are at the end of the statement
        if !self.is_at_end() {
            return Err(EngineError::Parse(format!(
                "unexpected token after statement: {:?}",
                self.current_token()
            )));
        }

        Ok(statement)
    }

    //helpers
    fn current_token(&self) -> &Token {
        &self.tokens[self.position]
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
    }

    fn is_at_end(&self) -> bool {
        matches!(self.current_token(), Token::Eof)
    }

    fn consume(&mut self, expected: Token) -> Result<()> {
        if *self.current_token() == expected {
            self.advance();
            Ok(())
        } else {
            Err(EngineError::Parse(format!(
                "expected {:?}, found {:?}",
                expected,
                self.current_token()
            )))
        }
    }

    fn consume_ident(&mut self) -> Result<String> {
        match self.current_token() {
            Token::Ident(string) => {
                let string = string.clone();
                self.advance();
                Ok(string)
            }
            token => Err(EngineError::Parse(format!(
                "expected identifier, found {token:?}"
            ))),
        }
    }

    fn consume_data_type(&mut self) -> Result<DataType> {
        let data_type = match self.current_token() {
            Token::Integer => DataType::Integer,
            Token::Text => DataType::Text,
            Token::Float => DataType::Float,
            Token::Boolean => DataType::Boolean,
            Token::Datetime => DataType::DateTime,
            token => {
                return Err(EngineError::Parse(format!(
                    "{token:?} is not a column type"
                )));
            }
        };
        self.advance();
        Ok(data_type)
    }

    fn parse_literal(&mut self) -> Result<Value> {
        let value = match self.current_token() {
            Token::Number(n) => Value::Int(*n),
            Token::FloatNumber(f) => Value::Float(*f),
            Token::String(s) => Value::Text(s.as_str().into()),
            Token::True => Value::Bool(true),
            Token::False => Value::Bool(false),
            // a bare word in value position reads as text, the same way the
            // quoted form does
            Token::Ident(s) => Value::Text(s.as_str().into()),
            token => {
                return Err(EngineError::Parse(format!(
                    "expected a literal value, found {token:?}"
                )));
            }
        };
        self.advance();
        Ok(value)
    }

    /// `WHERE col = value [AND col = value ...]`, or nothing.
    fn parse_conditions(&mut self) -> Result<Vec<(String, Value)>> {
        if !matches!(self.current_token(), Token::Where) {
            return Ok(Vec::new());
        }
        self.advance();

        let mut conditions = Vec::new();
        loop {
            let column = self.consume_ident()?;
            self.consume(Token::Equal)?;
            let value = self.parse_literal()?;
            conditions.push((column, value));

            if matches!(self.current_token(), Token::And) {
                self.advance();
            } else {
                break;
            }
        }
        Ok(conditions)
    }

    fn parse_create_table(&mut self) -> Result<Statement> {
        self.consume(Token::Create)?;
        self.consume(Token::Table)?;
        let name = self.consume_ident()?;
        self.consume(Token::LeftParen)?;

        let mut columns = Vec::new();
        let mut primary_key = None;
        let mut unique_keys = Vec::new();

        loop {
            match self.current_token() {
                Token::Primary => {
                    self.advance();
                    self.consume(Token::Key)?;
                    self.consume(Token::LeftParen)?;
                    let column = self.consume_ident()?;
                    self.consume(Token::RightParen)?;
                    if primary_key.is_some() {
                        return Err(EngineError::Parse(
                            "only one PRIMARY KEY is allowed".into(),
                        ));
                    }
                    primary_key = Some(column);
                }
                Token::Unique => {
                    self.advance();
                    self.consume(Token::LeftParen)?;
                    let column = self.consume_ident()?;
                    self.consume(Token::RightParen)?;
                    unique_keys.push(column);
                }
                _ => {
                    let column_name = self.consume_ident()?;
                    let data_type = self.consume_data_type()?;
                    columns.push(ColumnDef {
                        name: column_name,
                        data_type,
                    });
                }
            }

            match self.current_token() {
                Token::RightParen => {
                    self.advance();
                    break;
                }
                Token::Comma => {
                    self.advance();
                    continue;
                }
                _ => return Err(EngineError::Parse("expected ',' or ')'".into())),
            }
        }

        Ok(Statement::CreateTable(CreateTable {
            name,
            columns,
            primary_key,
            unique_keys,
        }))
    }

    fn parse_insert(&mut self) -> Result<Statement> {
        self.consume(Token::Insert)?;
        self.consume(Token::Into)?;
        let table = self.consume_ident()?;

        self.consume(Token::LeftParen)?;
        let mut columns = Vec::new();
        loop {
            columns.push(self.consume_ident()?);
            match self.current_token() {
                Token::RightParen => {
                    self.advance();
                    break;
                }
                Token::Comma => {
                    self.advance();
                    continue;
                }
                _ => return Err(EngineError::Parse("expected ',' or ')'".into())),
            }
        }

        self.consume(Token::Values)?;
        self.consume(Token::LeftParen)?;
        let mut values = Vec::new();
        loop {
            values.push(self.parse_literal()?);
            match self.current_token() {
                Token::RightParen => {
                    self.advance();
                    break;
                }
                Token::Comma => {
                    self.advance();
                    continue;
                }
                _ => return Err(EngineError::Parse("expected ',' or ')'".into())),
            }
        }

        if columns.len() != values.len() {
            return Err(EngineError::Parse(format!(
                "column count ({}) does not match value count ({})",
                columns.len(),
                values.len()
            )));
        }

        let values: Row = columns.into_iter().zip(values).collect();
        Ok(Statement::Insert(Insert { table, values }))
    }

    fn parse_select(&mut self) -> Result<Statement> {
        self.consume(Token::Select)?;

        let columns = if matches!(self.current_token(), Token::Star) {
            self.advance();
            None
        } else {
            let mut columns = vec![self.consume_ident()?];
            while matches!(self.current_token(), Token::Comma) {
                self.advance();
                columns.push(self.consume_ident()?);
            }
            Some(columns)
        };

        self.consume(Token::From)?;
        let table = self.consume_ident()?;

        let join = self.parse_join_clause()?;
        let conditions = self.parse_conditions()?;

        let limit = if matches!(self.current_token(), Token::Limit) {
            self.advance();
            match self.current_token() {
                Token::Number(n) if *n >= 0 => {
                    let limit = *n as usize;
                    self.advance();
                    Some(limit)
                }
                token => {
                    return Err(EngineError::Parse(format!(
                        "expected a row count after LIMIT, found {token:?}"
                    )));
                }
            }
        } else {
            None
        };

        Ok(Statement::Select(Select {
            table,
            columns,
            conditions,
            join,
            limit,
        }))
    }

    /// `[INNER|LEFT|RIGHT] JOIN table ON a.x = b.y`, or nothing.
    /// A bare `JOIN` is INNER.
    fn parse_join_clause(&mut self) -> Result<Option<JoinClause>> {
        let kind = match self.current_token() {
            Token::Inner => {
                self.advance();
                JoinKind::Inner
            }
            Token::Left => {
                self.advance();
                JoinKind::Left
            }
            Token::Right => {
                self.advance();
                JoinKind::Right
            }
            Token::Join => JoinKind::Inner,
            _ => return Ok(None),
        };

        self.consume(Token::Join)?;
        let table = self.consume_ident()?;
        self.consume(Token::On)?;
        let left_key = self.parse_join_key()?;
        self.consume(Token::Equal)?;
        let right_key = self.parse_join_key()?;

        Ok(Some(JoinClause {
            table,
            kind,
            left_key,
            right_key,
        }))
    }

    /// A join key is `column` or `table.column`; only the column part is
    /// kept.
    fn parse_join_key(&mut self) -> Result<String> {
        let first = self.consume_ident()?;
        if matches!(self.current_token(), Token::Dot) {
            self.advance();
            return self.consume_ident();
        }
        Ok(first)
    }

    fn parse_update(&mut self) -> Result<Statement> {
        self.consume(Token::Update)?;
        let table = self.consume_ident()?;
        self.consume(Token::Set)?;

        let mut assignments = Vec::new();
        loop {
            let column = self.consume_ident()?;
            self.consume(Token::Equal)?;
            let value = self.parse_literal()?;
            assignments.push((column, value));

            if matches!(self.current_token(), Token::Comma) {
                self.advance();
            } else {
                break;
            }
        }

        let conditions = self.parse_conditions()?;
        Ok(Statement::Update(Update {
            table,
            assignments,
            conditions,
        }))
    }

    fn parse_delete(&mut self) -> Result<Statement> {
        self.consume(Token::Delete)?;
        self.consume(Token::From)?;
        let table = self.consume_ident()?;
        let conditions = self.parse_conditions()?;
        Ok(Statement::Delete(Delete { table, conditions }))
    }

    fn parse_drop_table(&mut self) -> Result<Statement> {
        self.consume(Token::Drop)?;
        self.consume(Token::Table)?;
        let name = self.consume_ident()?;
        Ok(Statement::DropTable { name })
    }

    fn parse_show_tables(&mut self) -> Result<Statement> {
        self.consume(Token::Show)?;
        self.consume(Token::Tables)?;
        Ok(Statement::ShowTables)
    }

    fn parse_ledger(&mut self) -> Result<Statement> {
        self.consume(Token::Ledger)?;

        match self.current_token() {
            Token::Create => {
                self.advance();
                let table = self.consume_ident()?;
                Ok(Statement::LedgerCreate { table })
            }
            Token::Append => {
                self.advance();
                let table = self.consume_ident()?;
                let options = self.parse_ledger_options()?;

                let mut event_type = None;
                let mut data = None;
                let mut aggregate_id = None;
                for (key, value) in options {
                    match key.to_uppercase().as_str() {
                        "TYPE" => event_type = Some(value),
                        "DATA" => data = Some(value),
                        "AGGREGATE" => aggregate_id = Some(value),
                        _ => {
                            return Err(EngineError::Parse(format!(
                                "unknown LEDGER APPEND option '{key}'"
                            )));
                        }
                    }
                }

                let (Some(event_type), Some(data)) = (event_type, data) else {
                    return Err(EngineError::Parse(
                        "LEDGER APPEND requires TYPE and DATA".into(),
                    ));
                };

                Ok(Statement::LedgerAppend(LedgerAppend {
                    table,
                    event_type,
                    data,
                    aggregate_id,
                }))
            }
            Token::Verify => {
                self.advance();
                let table = self.consume_ident()?;
                Ok(Statement::LedgerVerify { table })
            }
            Token::Audit => {
                self.advance();
                let table = self.consume_ident()?;
                let options = self.parse_ledger_options()?;

                let mut aggregate_id = None;
                for (key, value) in options {
                    match key.to_uppercase().as_str() {
                        "AGGREGATE" => aggregate_id = Some(value),
                        _ => {
                            return Err(EngineError::Parse(format!(
                                "unknown LEDGER AUDIT option '{key}'"
                            )));
                        }
                    }
                }

                Ok(Statement::LedgerAudit {
                    table,
                    aggregate_id,
                })
            }
            token => Err(EngineError::Parse(format!(
                "expected CREATE, APPEND, VERIFY or AUDIT after LEDGER, found {token:?}"
            ))),
        }
    }

    /// `KEY='value'` pairs trailing a LEDGER command. Values keep their
    /// quoting-level content verbatim, so JSON payloads and ids with spaces
    /// pass through.
    fn parse_ledger_options(&mut self) -> Result<Vec<(String, String)>> {
        let mut options = Vec::new();
        while let Token::Ident(_) = self.current_token() {
            let key = self.consume_ident()?;
            self.consume(Token::Equal)?;
            let value = match self.current_token() {
                Token::String(s) => s.clone(),
                Token::Ident(s) => s.clone(),
                Token::Number(n) => n.to_string(),
                token => {
                    return Err(EngineError::Parse(format!(
                        "expected a value for '{key}', found {token:?}"
                    )));
                }
            };
            self.advance();
            options.push((key, value));
        }
        Ok(options)
    }
}
