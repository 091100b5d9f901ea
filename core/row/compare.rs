use std::cmp::Ordering;

use crate::row::Row;

impl Row {
    /// Orders two rows of the same schema by their cells only.
    ///
    /// Without a comparing mask every cell takes part in declaration order,
    /// each in its own sort direction, and the whole result is reversed for
    /// a descending row. With a mask, cells are visited by ascending absolute
    /// mask entry; the entry's sign picks the direction and zero entries are
    /// skipped.
    pub fn compare_columns(&self, other: &Row) -> Ordering {
        match &self.comparing_mask {
            Some(mask) => self.compare_masked(other, mask),
            None => {
                let ordering = self
                    .columns
                    .iter()
                    .zip(&other.columns)
                    .map(|(a, b)| a.collate_directed(b).cmp(&0))
                    .find(|o| o.is_ne())
                    .unwrap_or(Ordering::Equal);
                if self.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            }
        }
    }

    fn compare_masked(&self, other: &Row, mask: &[i16]) -> Ordering {
        let mut order: Vec<(usize, i16)> = mask
            .iter()
            .copied()
            .enumerate()
            .filter(|&(index, m)| m != 0 && index < self.columns.len())
            .collect();
        order.sort_by_key(|&(_, m)| m.unsigned_abs());
        for (index, m) in order {
            let Some(theirs) = other.columns.get(index) else {
                continue;
            };
            let ordering = self.columns[index].collate(theirs).cmp(&0);
            let ordering = if m < 0 { ordering.reverse() } else { ordering };
            if ordering.is_ne() {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Key order: cells, then row id ascending.
    pub fn compare_visible(&self, other: &Row) -> Ordering {
        self.compare_columns(other)
            .then_with(|| self.row_id.cmp(&other.row_id))
    }

    /// Full order of version chains: key order, then transaction id, with an
    /// outdated version after the live one of the same transaction.
    pub fn compare_hidden(&self, other: &Row) -> Ordering {
        self.compare_visible(other)
            .then_with(|| {
                self.version
                    .transaction_id()
                    .cmp(&other.version.transaction_id())
            })
            .then_with(|| self.version.is_outdated().cmp(&other.version.is_outdated()))
    }
}
