//! Conditional formatting: CFHEADER records, each followed by its rules.

use duke_xls_records::{sid, Record};

use crate::error::{XlsError, XlsResult};
use crate::sheet::RecordAggregate;
use crate::stream::RecordStream;

fn is_header(s: u16) -> bool {
    matches!(s, sid::CFHEADER | sid::CFHEADER12)
}

fn is_rule(s: u16) -> bool {
    matches!(s, sid::CFRULE | sid::CFRULE12)
}

/// One CFHEADER and the CFRULE records that follow it.
#[derive(Debug, Clone, PartialEq)]
pub struct CondFormatGroup {
    header: Record,
    rules: Vec<Record>,
}

impl CondFormatGroup {
    pub fn new(header: Record, rules: Vec<Record>) -> XlsResult<Self> {
        if !is_header(header.sid()) {
            return Err(XlsError::argument(format!("{} is not a conditional format header", header.name())));
        }
        if let Some(bad) = rules.iter().find(|r| !is_rule(r.sid())) {
            return Err(XlsError::argument(format!("{} is not a conditional format rule", bad.name())));
        }
        Ok(Self { header, rules })
    }

    pub fn header(&self) -> &Record {
        &self.header
    }

    pub fn rules(&self) -> &[Record] {
        &self.rules
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionalFormattingTable {
    groups: Vec<CondFormatGroup>,
}

impl ConditionalFormattingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(rs: &mut RecordStream) -> XlsResult<Self> {
        let mut groups = Vec::new();
        while rs.peek_next_sid().map_or(false, is_header) {
            let header = rs.next()?;
            let mut rules = Vec::new();
            while rs.peek_next_sid().map_or(false, is_rule) {
                rules.push(rs.next()?);
            }
            groups.push(CondFormatGroup { header, rules });
        }
        Ok(Self { groups })
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CondFormatGroup> {
        self.groups.get(index)
    }

    /// Append the groups of a second CF block found further down the sheet.
    pub fn extend(&mut self, other: ConditionalFormattingTable) {
        self.groups.extend(other.groups);
    }

    pub fn add(&mut self, group: CondFormatGroup) -> usize {
        self.groups.push(group);
        self.groups.len() - 1
    }

    pub fn remove(&mut self, index: usize) -> XlsResult<CondFormatGroup> {
        if index >= self.groups.len() {
            return Err(XlsError::argument(format!(
                "conditional format index {index} out of range 0..{}",
                self.groups.len()
            )));
        }
        Ok(self.groups.remove(index))
    }
}

impl RecordAggregate for ConditionalFormattingTable {
    fn visit_records(&self, visitor: &mut dyn FnMut(&Record)) {
        for group in &self.groups {
            visitor(&group.header);
            group.rules.iter().for_each(|r| visitor(r));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(s: u16) -> Record {
        Record::Unknown { sid: s, data: vec![0; 4] }
    }

    #[test]
    fn rules_stay_with_their_header() {
        let mut rs = RecordStream::new(vec![
            raw(sid::CFHEADER),
            raw(sid::CFRULE),
            raw(sid::CFRULE),
            raw(sid::CFHEADER12),
            raw(sid::CFRULE12),
            raw(sid::DVAL),
        ]);
        let table = ConditionalFormattingTable::read(&mut rs).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0).map(|g| g.rules().len()), Some(2));
        assert_eq!(rs.peek_next_sid(), Some(sid::DVAL));
    }

    #[test]
    fn groups_are_validated() {
        assert!(CondFormatGroup::new(raw(sid::CFRULE), vec![]).is_err());
        assert!(CondFormatGroup::new(raw(sid::CFHEADER), vec![raw(sid::DV)]).is_err());
        let mut table = ConditionalFormattingTable::new();
        let ix = table.add(CondFormatGroup::new(raw(sid::CFHEADER), vec![raw(sid::CFRULE)]).unwrap());
        assert_eq!(ix, 0);
        assert!(table.remove(1).is_err());
        assert!(table.remove(0).is_ok());
        assert!(table.is_empty());
    }
}
