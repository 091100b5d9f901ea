//! Row filters: typed, prioritized hooks run against a row while it is being
//! appended, updated or deleted.

pub mod expr;
pub mod kinds;

use std::fmt;

use bitflags::bitflags;

pub use self::expr::{CompareOp, ExpressionStack, Token};
pub use self::kinds::{
    ConditionFilter, ConstraintFilter, DefaultValueFilter, FtsKeysFilter, IdentityFilter,
    ReadOnlyFilter,
};
use crate::row::Row;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterType {
    None = 0,
    Ordinary = 1,
    Optimized = 2,
    DefaultValue = 3,
    Identity = 4,
    ReadOnly = 5,
    Constraint = 6,
}

impl FilterType {
    pub const fn type_id(self) -> u8 {
        self as u8
    }
}

bitflags! {
    /// Row mutations a filter reacts to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ConstraintScope: u8 {
        const APPEND = 0b001;
        const UPDATE = 0b010;
        const DELETE = 0b100;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowAction {
    Append,
    Update,
    Delete,
}

impl RowAction {
    pub const fn scope(self) -> ConstraintScope {
        match self {
            RowAction::Append => ConstraintScope::APPEND,
            RowAction::Update => ConstraintScope::UPDATE,
            RowAction::Delete => ConstraintScope::DELETE,
        }
    }
}

pub trait Filter: Send + fmt::Debug {
    fn filter_type(&self) -> FilterType;

    fn priority(&self) -> i32 {
        0
    }

    fn is_active(&self) -> bool;

    fn set_active(&mut self, active: bool);

    fn activate(&mut self) {
        self.set_active(true);
    }

    fn deactivate(&mut self) {
        self.set_active(false);
    }

    /// Checks, and for generators fills in, `row`. `false` rejects the row;
    /// constraint failures are reported as errors instead.
    fn valid_row_status(&mut self, row: &mut Row, action: RowAction) -> Result<bool>;
}

fn sort_key(filter: &dyn Filter) -> (u8, i32) {
    (filter.filter_type().type_id(), filter.priority())
}

/// Filters of one table, kept ordered by `(type id, priority)`.
#[derive(Debug, Default)]
pub struct FiltersList {
    filters: Vec<Box<dyn Filter>>,
}

impl FiltersList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `filter` after every filter with the same or a smaller key.
    pub fn add(&mut self, filter: Box<dyn Filter>) {
        let key = sort_key(filter.as_ref());
        let at = self.filters.partition_point(|f| sort_key(f.as_ref()) <= key);
        self.filters.insert(at, filter);
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Filter> {
        self.filters.iter().map(|f| f.as_ref())
    }

    fn matching(&mut self, filter_type: Option<FilterType>) -> impl Iterator<Item = &mut Box<dyn Filter>> {
        self.filters
            .iter_mut()
            .filter(move |f| filter_type.map_or(true, |t| f.filter_type() == t))
    }

    /// Activates every filter, or only those of `filter_type`.
    pub fn activate(&mut self, filter_type: Option<FilterType>) {
        self.matching(filter_type).for_each(|f| f.activate());
    }

    pub fn deactivate(&mut self, filter_type: Option<FilterType>) {
        self.matching(filter_type).for_each(|f| f.deactivate());
    }

    pub fn active_count(&self, filter_type: FilterType) -> usize {
        self.filters
            .iter()
            .filter(|f| f.is_active() && f.filter_type() == filter_type)
            .count()
    }

    /// Runs the active filters in order and stops at the first rejection.
    pub fn apply(&mut self, row: &mut Row, action: RowAction) -> Result<bool> {
        for filter in self.filters.iter_mut().filter(|f| f.is_active()) {
            if !filter.valid_row_status(row, action)? {
                tracing::debug!(
                    row_id = row.row_id(),
                    filter = ?filter.filter_type(),
                    "row rejected by filter"
                );
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Column;
    use crate::error::RowStoreError;
    use crate::row::RowVersion;
    use crate::types::ColumnType;
    use crate::value::Value;

    fn row() -> Row {
        Row::new(1, RowVersion::default(), true)
            .with_column(Column::new(ColumnType::Int))
            .with_column(Column::new(ColumnType::Int))
    }

    fn positive(column: usize) -> ExpressionStack {
        ExpressionStack::new()
            .column(column)
            .literal(Value::I32(0))
            .push(Token::Compare(CompareOp::Gt))
    }

    #[test]
    fn test_list_is_ordered_by_type_then_priority() {
        let mut list = FiltersList::new();
        list.add(Box::new(ConstraintFilter::new("c", ConstraintScope::all(), positive(0))));
        list.add(Box::new(ConditionFilter::new(positive(0)).with_priority(5)));
        list.add(Box::new(IdentityFilter::new(1, 1, 1)));
        list.add(Box::new(ConditionFilter::new(positive(1)).with_priority(1)));

        let keys: Vec<_> = list.iter().map(|f| (f.filter_type(), f.priority())).collect();
        assert_eq!(
            keys,
            vec![
                (FilterType::Ordinary, 1),
                (FilterType::Ordinary, 5),
                (FilterType::Identity, 0),
                (FilterType::Constraint, 0),
            ]
        );
    }

    #[test]
    fn test_activation_by_type() {
        let mut list = FiltersList::new();
        list.add(Box::new(ConditionFilter::new(positive(0))));
        list.add(Box::new(ConditionFilter::new(positive(1))));
        list.add(Box::new(ConstraintFilter::new("c", ConstraintScope::all(), positive(0))));
        assert_eq!(list.active_count(FilterType::Ordinary), 0);

        list.activate(Some(FilterType::Ordinary));
        list.activate(Some(FilterType::Ordinary));
        assert_eq!(list.active_count(FilterType::Ordinary), 2);
        assert_eq!(list.active_count(FilterType::Constraint), 0);

        list.activate(None);
        assert_eq!(list.active_count(FilterType::Constraint), 1);
        list.deactivate(Some(FilterType::Ordinary));
        assert_eq!(list.active_count(FilterType::Ordinary), 0);
        assert_eq!(list.active_count(FilterType::Constraint), 1);
    }

    #[test]
    fn test_apply_runs_generators_before_constraints() {
        let mut list = FiltersList::new();
        list.add(Box::new(ConstraintFilter::new("id_positive", ConstraintScope::APPEND, positive(1))));
        list.add(Box::new(IdentityFilter::new(1, 100, 1)));
        list.activate(None);

        let mut row = row();
        assert!(list.apply(&mut row, RowAction::Append).unwrap());
        assert_eq!(row.value(1), Some(&Value::I32(100)));
    }

    #[test]
    fn test_apply_stops_at_first_rejection() {
        let mut list = FiltersList::new();
        list.add(Box::new(ConditionFilter::new(positive(0))));
        list.add(Box::new(ConstraintFilter::new("never", ConstraintScope::all(), positive(1))));
        list.activate(None);

        let mut row = row();
        row.set_value(0, Value::I32(-1)).unwrap();
        assert!(!list.apply(&mut row, RowAction::Append).unwrap());

        row.set_value(0, Value::I32(1)).unwrap();
        row.set_value(1, Value::I32(-1)).unwrap();
        assert!(matches!(
            list.apply(&mut row, RowAction::Append).unwrap_err(),
            RowStoreError::ConstraintViolation(name) if name == "never"
        ));

        list.deactivate(None);
        assert!(list.apply(&mut row, RowAction::Append).unwrap());
    }
}
