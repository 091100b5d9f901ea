//! Postfix expression stacks evaluated against a row.
//!
//! Tokens are kept in reverse polish order: operands push a cell, operators
//! pop their inputs and push the result. Comparisons and logic follow SQL
//! three valued semantics, a null input yields an unknown result.

use std::cmp::Ordering;

use crate::column::arith::{binary_op, bit_not, negate, BinaryOp};
use crate::column::collate::collate_values;
use crate::column::convert::convert;
use crate::column::Column;
use crate::error::RowStoreError;
use crate::row::Row;
use crate::types::ColumnType;
use crate::value::Value;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering.is_eq(),
            CompareOp::Ne => ordering.is_ne(),
            CompareOp::Lt => ordering.is_lt(),
            CompareOp::Le => ordering.is_le(),
            CompareOp::Gt => ordering.is_gt(),
            CompareOp::Ge => ordering.is_ge(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Pushes a copy of the row cell at this index.
    Column(usize),
    Literal(Option<Value>),
    Arith(BinaryOp),
    Compare(CompareOp),
    Negate,
    BitNot,
    IsNull,
    Not,
    And,
    Or,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpressionStack {
    tokens: Vec<Token>,
}

fn bool_cell(value: Option<bool>) -> Column {
    let mut cell = Column::new(ColumnType::Bit);
    cell.set_internal(value.map(Value::Bool));
    cell
}

fn literal_cell(value: Option<Value>) -> Column {
    let kind = value
        .as_ref()
        .map(Value::natural_kind)
        .unwrap_or(ColumnType::Unknown);
    let mut cell = Column::new(kind);
    cell.set_internal(value);
    cell
}

fn truth(cell: &Column) -> Result<Option<bool>> {
    match cell.value() {
        None => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(other) => match convert(other, ColumnType::Bit)? {
            Value::Bool(b) => Ok(Some(b)),
            _ => Err(RowStoreError::Expression(format!("{other} is not a boolean"))),
        },
    }
}

fn compare_cells(lhs: &Column, rhs: &Column) -> Result<Option<Ordering>> {
    let (Some(a), Some(b)) = (lhs.value(), rhs.value()) else {
        return Ok(None);
    };
    let case_sensitive = lhs.case_sensitive() || rhs.case_sensitive();
    let numeric = lhs.kind().arithmetic_rank().is_some() && rhs.kind().arithmetic_rank().is_some();
    if numeric || b.fits_kind(lhs.kind()) {
        return Ok(Some(collate_values(a, b, case_sensitive, true)));
    }
    let b = convert(b, lhs.kind())?;
    Ok(Some(collate_values(a, &b, case_sensitive, true)))
}

impl ExpressionStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, token: Token) -> Self {
        self.tokens.push(token);
        self
    }

    pub fn column(self, index: usize) -> Self {
        self.push(Token::Column(index))
    }

    pub fn literal(self, value: impl Into<Option<Value>>) -> Self {
        self.push(Token::Literal(value.into()))
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Runs the stack and returns the single resulting cell.
    pub fn evaluate(&self, row: &Row) -> Result<Column> {
        let mut stack: Vec<Column> = Vec::with_capacity(self.tokens.len());
        for token in &self.tokens {
            let cell = match token {
                Token::Column(index) => match row.column(*index) {
                    Some(cell) => cell.clone(),
                    None => return Err(RowStoreError::ColumnIndex(*index)),
                },
                Token::Literal(value) => literal_cell(value.clone()),
                Token::Arith(op) => {
                    let (lhs, rhs) = pop_pair(&mut stack)?;
                    if lhs.kind() == ColumnType::Unknown {
                        rhs.blank()
                    } else if rhs.kind() == ColumnType::Unknown {
                        lhs.blank()
                    } else {
                        binary_op(*op, &lhs, &rhs)?
                    }
                }
                Token::Compare(op) => {
                    let (lhs, rhs) = pop_pair(&mut stack)?;
                    bool_cell(compare_cells(&lhs, &rhs)?.map(|o| op.holds(o)))
                }
                Token::Negate => negate(&pop(&mut stack)?)?,
                Token::BitNot => bit_not(&pop(&mut stack)?)?,
                Token::IsNull => bool_cell(Some(pop(&mut stack)?.value().is_none())),
                Token::Not => bool_cell(truth(&pop(&mut stack)?)?.map(|b| !b)),
                Token::And => {
                    let (lhs, rhs) = pop_pair(&mut stack)?;
                    bool_cell(match (truth(&lhs)?, truth(&rhs)?) {
                        (Some(false), _) | (_, Some(false)) => Some(false),
                        (Some(true), Some(true)) => Some(true),
                        _ => None,
                    })
                }
                Token::Or => {
                    let (lhs, rhs) = pop_pair(&mut stack)?;
                    bool_cell(match (truth(&lhs)?, truth(&rhs)?) {
                        (Some(true), _) | (_, Some(true)) => Some(true),
                        (Some(false), Some(false)) => Some(false),
                        _ => None,
                    })
                }
            };
            stack.push(cell);
        }
        match (stack.pop(), stack.is_empty()) {
            (Some(result), true) => Ok(result),
            (None, _) => Err(RowStoreError::Expression("empty expression".into())),
            (Some(_), false) => Err(RowStoreError::Expression(format!(
                "{} values left on the stack",
                stack.len() + 1
            ))),
        }
    }

    /// Evaluates a predicate. `None` is the unknown result of a null input.
    pub fn evaluate_bool(&self, row: &Row) -> Result<Option<bool>> {
        truth(&self.evaluate(row)?)
    }
}

fn pop(stack: &mut Vec<Column>) -> Result<Column> {
    stack
        .pop()
        .ok_or_else(|| RowStoreError::Expression("operand stack underflow".into()))
}

fn pop_pair(stack: &mut Vec<Column>) -> Result<(Column, Column)> {
    let rhs = pop(stack)?;
    let lhs = pop(stack)?;
    Ok((lhs, rhs))
}
