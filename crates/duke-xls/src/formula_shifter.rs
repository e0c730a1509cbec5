//! Sheet-index adjustment for formulas when a sheet changes position.

/// Maps sheet indexes across a move of one sheet from `src` to `dst`.
///
/// The moved sheet takes `dst`; sheets between the two positions slide one
/// place towards `src`; everything else keeps its index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormulaShifter {
    src: i16,
    dst: i16,
}

impl FormulaShifter {
    pub fn for_sheet_move(src: usize, dst: usize) -> Self {
        Self {
            src: src as i16,
            dst: dst as i16,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.src == self.dst
    }

    /// New position of the sheet now at `index`. Negative (special) indexes
    /// are returned unchanged.
    pub fn adjust_sheet_index(&self, index: i16) -> i16 {
        if index < 0 {
            return index;
        }
        if index < self.src && index < self.dst {
            return index;
        }
        if index > self.src && index > self.dst {
            return index;
        }
        if index == self.src {
            return self.dst;
        }
        if self.dst < self.src {
            index + 1
        } else {
            index - 1
        }
    }
}
