//! Merged regions, spread over as many MERGECELLS records as needed.

use duke_xls_records::record::{CellRangeAddress, MergeCellsRecord};
use duke_xls_records::{sid, Record};

use crate::error::{XlsError, XlsResult};
use crate::sheet::RecordAggregate;
use crate::stream::RecordStream;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedCellsTable {
    records: Vec<MergeCellsRecord>,
}

impl MergedCellsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read consecutive MERGECELLS records.
    pub fn read(&mut self, rs: &mut RecordStream) -> XlsResult<()> {
        while rs.peek_next_sid() == Some(sid::MERGECELLS) {
            match rs.next()? {
                Record::MergeCells(m) => self.records.push(m),
                other => return Err(XlsError::format(format!("malformed MERGECELLS record ({})", other.name()))),
            }
        }
        Ok(())
    }

    /// Take in MERGECELLS records found elsewhere in the sheet.
    pub fn add_records(&mut self, records: impl IntoIterator<Item = MergeCellsRecord>) {
        self.records.extend(records.into_iter().filter(|r| !r.regions.is_empty()));
    }

    pub fn num_areas(&self) -> usize {
        self.records.iter().map(|r| r.regions.len()).sum()
    }

    pub fn add_area(&mut self, first_row: u16, first_col: u16, last_row: u16, last_col: u16) -> XlsResult<usize> {
        if last_row < first_row || last_col < first_col {
            return Err(XlsError::argument(format!(
                "merged region ({first_row},{first_col})-({last_row},{last_col}) ends before it starts"
            )));
        }
        let area = CellRangeAddress::new(first_row, last_row, first_col, last_col);
        match self.records.last_mut() {
            Some(last) if last.regions.len() < MergeCellsRecord::MAX_AREAS => last.regions.push(area),
            _ => self.records.push(MergeCellsRecord { regions: vec![area] }),
        }
        Ok(self.num_areas() - 1)
    }

    /// Backing record and position within it of the area at `index`.
    fn locate(&self, index: usize) -> Option<(usize, usize)> {
        let last = self.records.len().checked_sub(1)?;
        let last_start = self.num_areas() - self.records[last].regions.len();
        if index >= last_start {
            let offset = index - last_start;
            return (offset < self.records[last].regions.len()).then_some((last, offset));
        }
        let mut start = 0;
        for (i, record) in self.records.iter().enumerate() {
            let n = record.regions.len();
            if index < start + n {
                return Some((i, index - start));
            }
            start += n;
        }
        None
    }

    pub fn area_at(&self, index: usize) -> Option<CellRangeAddress> {
        let (r, i) = self.locate(index)?;
        Some(self.records[r].regions[i])
    }

    pub fn remove_area(&mut self, index: usize) -> XlsResult<CellRangeAddress> {
        let (r, i) = self
            .locate(index)
            .ok_or_else(|| XlsError::argument(format!("merged region index {index} out of range 0..{}", self.num_areas())))?;
        let removed = self.records[r].regions.remove(i);
        if self.records[r].regions.is_empty() {
            self.records.remove(r);
        }
        Ok(removed)
    }

    pub fn areas(&self) -> impl Iterator<Item = &CellRangeAddress> {
        self.records.iter().flat_map(|r| r.regions.iter())
    }
}

impl RecordAggregate for MergedCellsTable {
    fn visit_records(&self, visitor: &mut dyn FnMut(&Record)) {
        for record in self.records.iter().filter(|r| !r.regions.is_empty()) {
            visitor(&Record::MergeCells(record.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn areas_overflow_into_a_second_record() {
        let mut table = MergedCellsTable::new();
        for i in 0..1030u16 {
            table.add_area(i, 0, i, 1).unwrap();
        }
        let mut count = 0;
        table.visit_records(&mut |_| count += 1);
        assert_eq!(count, 2);
        assert_eq!(table.num_areas(), 1030);
        assert_eq!(table.area_at(1026), Some(CellRangeAddress::new(1026, 1026, 0, 1)));
        assert_eq!(table.area_at(1027), Some(CellRangeAddress::new(1027, 1027, 0, 1)));
        assert_eq!(table.area_at(1030), None);

        assert_eq!(table.remove_area(5).unwrap().first_row, 5);
        assert_eq!(table.area_at(5).map(|a| a.first_row), Some(6));
        assert_eq!(table.num_areas(), 1029);
    }

    #[test]
    fn emptied_records_disappear() {
        let mut table = MergedCellsTable::new();
        table.add_area(0, 0, 1, 1).unwrap();
        table.remove_area(0).unwrap();
        let mut count = 0;
        table.visit_records(&mut |_| count += 1);
        assert_eq!(count, 0);
        assert!(matches!(table.remove_area(0), Err(XlsError::InvalidArgument(_))));
    }

    #[test]
    fn backwards_region_is_refused() {
        let mut table = MergedCellsTable::new();
        assert!(table.add_area(5, 0, 4, 0).is_err());
        assert!(table.add_area(0, 3, 0, 2).is_err());
    }
}
