use bitvec::vec::BitVec;

use super::{ConstraintScope, ExpressionStack, Filter, FilterType, RowAction};
use crate::column::convert::convert;
use crate::error::RowStoreError;
use crate::row::Row;
use crate::value::Value;
use crate::Result;

/// Plain predicate: the row passes when the expression is true.
#[derive(Debug)]
pub struct ConditionFilter {
    filter_type: FilterType,
    priority: i32,
    active: bool,
    expression: ExpressionStack,
}

impl ConditionFilter {
    pub fn new(expression: ExpressionStack) -> Self {
        Self {
            filter_type: FilterType::Ordinary,
            priority: 0,
            active: false,
            expression,
        }
    }

    /// Marks the condition as already served by an index.
    pub fn optimized(mut self) -> Self {
        self.filter_type = FilterType::Optimized;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl Filter for ConditionFilter {
    fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    fn valid_row_status(&mut self, row: &mut Row, _action: RowAction) -> Result<bool> {
        Ok(self.expression.evaluate_bool(row)? == Some(true))
    }
}

/// Named check constraint. Only a false result fails, an unknown one passes.
#[derive(Debug)]
pub struct ConstraintFilter {
    name: String,
    scope: ConstraintScope,
    active: bool,
    expression: ExpressionStack,
}

impl ConstraintFilter {
    pub fn new(name: impl Into<String>, scope: ConstraintScope, expression: ExpressionStack) -> Self {
        Self {
            name: name.into(),
            scope,
            active: false,
            expression,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Filter for ConstraintFilter {
    fn filter_type(&self) -> FilterType {
        FilterType::Constraint
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    fn valid_row_status(&mut self, row: &mut Row, action: RowAction) -> Result<bool> {
        if !self.scope.contains(action.scope()) {
            return Ok(true);
        }
        match self.expression.evaluate_bool(row)? {
            Some(false) => Err(RowStoreError::ConstraintViolation(self.name.clone())),
            _ => Ok(true),
        }
    }
}

/// Fills a column from an expression. On append only an empty cell is
/// filled, on update the cell is always regenerated.
#[derive(Debug)]
pub struct DefaultValueFilter {
    column: usize,
    scope: ConstraintScope,
    active: bool,
    expression: ExpressionStack,
}

impl DefaultValueFilter {
    pub fn new(column: usize, scope: ConstraintScope, expression: ExpressionStack) -> Self {
        Self {
            column,
            scope,
            active: false,
            expression,
        }
    }
}

impl Filter for DefaultValueFilter {
    fn filter_type(&self) -> FilterType {
        FilterType::DefaultValue
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    fn valid_row_status(&mut self, row: &mut Row, action: RowAction) -> Result<bool> {
        if !self.scope.contains(action.scope()) {
            return Ok(true);
        }
        let Some(cell) = row.column(self.column) else {
            return Err(RowStoreError::ColumnIndex(self.column));
        };
        if action == RowAction::Append && !cell.is_null() {
            return Ok(true);
        }
        let value = self.expression.evaluate(row)?.value().cloned();
        row.set_value(self.column, value)?;
        Ok(true)
    }
}

/// Identity generator: hands out `seed, seed + step, ...` to appended rows
/// whose identity cell is empty. An explicit value past the sequence moves
/// the sequence on.
#[derive(Debug)]
pub struct IdentityFilter {
    column: usize,
    next: i64,
    step: i64,
    active: bool,
}

impl IdentityFilter {
    pub fn new(column: usize, seed: i64, step: i64) -> Self {
        Self {
            column,
            next: seed,
            step,
            active: false,
        }
    }

    pub fn next_value(&self) -> i64 {
        self.next
    }

    fn is_ahead(&self, value: i64) -> bool {
        if self.step >= 0 {
            value >= self.next
        } else {
            value <= self.next
        }
    }
}

impl Filter for IdentityFilter {
    fn filter_type(&self) -> FilterType {
        FilterType::Identity
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    fn valid_row_status(&mut self, row: &mut Row, action: RowAction) -> Result<bool> {
        if action != RowAction::Append {
            return Ok(true);
        }
        let Some(cell) = row.column(self.column) else {
            return Err(RowStoreError::ColumnIndex(self.column));
        };
        match cell.value() {
            Some(explicit) => {
                let Value::I64(value) = convert(explicit, crate::types::ColumnType::BigInt)? else {
                    return Ok(true);
                };
                if self.is_ahead(value) {
                    self.next = value.wrapping_add(self.step);
                }
            }
            None => {
                let generated = convert(&Value::I64(self.next), cell.kind())?;
                row.set_value(self.column, generated)?;
                self.next = self.next.wrapping_add(self.step);
            }
        }
        Ok(true)
    }
}

/// Rejects updates that touch any of the protected columns.
#[derive(Debug)]
pub struct ReadOnlyFilter {
    columns: Vec<usize>,
    active: bool,
}

impl ReadOnlyFilter {
    pub fn new(columns: Vec<usize>) -> Self {
        Self {
            columns,
            active: false,
        }
    }

    /// Protects every column whose attributes carry the read only flag.
    pub fn for_row(row: &Row) -> Self {
        let columns = row
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_read_only())
            .map(|(i, _)| i)
            .collect();
        Self::new(columns)
    }
}

impl Filter for ReadOnlyFilter {
    fn filter_type(&self) -> FilterType {
        FilterType::ReadOnly
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    fn valid_row_status(&mut self, row: &mut Row, action: RowAction) -> Result<bool> {
        if action != RowAction::Update {
            return Ok(true);
        }
        for &index in &self.columns {
            if let Some(cell) = row.column(index).filter(|c| c.is_edited()) {
                return Err(RowStoreError::ReadOnlyViolation(cell.name().to_string()));
            }
        }
        Ok(true)
    }
}

/// Lets every row id through once. Full text search matches the same row
/// once per hit; this drops the repeats.
#[derive(Debug, Default)]
pub struct FtsKeysFilter {
    seen: BitVec,
    active: bool,
}

impl FtsKeysFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets every row seen so far.
    pub fn reset(&mut self) {
        self.seen.clear();
    }
}

impl Filter for FtsKeysFilter {
    fn filter_type(&self) -> FilterType {
        FilterType::Ordinary
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    fn valid_row_status(&mut self, row: &mut Row, _action: RowAction) -> Result<bool> {
        let id = row.row_id() as usize;
        if id >= self.seen.len() {
            self.seen.resize(id + 1, false);
        }
        if self.seen[id] {
            return Ok(false);
        }
        self.seen.set(id, true);
        Ok(true)
    }
}
