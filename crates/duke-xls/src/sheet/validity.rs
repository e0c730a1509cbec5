//! Data validation: a DVAL header followed by DV records.

use duke_xls_records::record::DvalRecord;
use duke_xls_records::{sid, Record};

use crate::error::{XlsError, XlsResult};
use crate::sheet::RecordAggregate;
use crate::stream::RecordStream;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataValidityTable {
    header: DvalRecord,
    validations: Vec<Record>,
}

impl DataValidityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(rs: &mut RecordStream) -> XlsResult<Self> {
        let header = match rs.next()? {
            Record::Dval(d) => d,
            other => return Err(XlsError::format(format!("expected DVAL, found {}", other.name()))),
        };
        let mut validations = Vec::new();
        while rs.peek_next_sid() == Some(sid::DV) {
            validations.push(rs.next()?);
        }
        if validations.len() != header.dv_count as usize {
            log::debug!(
                "DVAL announces {} validations, found {}",
                header.dv_count,
                validations.len()
            );
        }
        Ok(Self { header, validations })
    }

    pub fn add_data_validation(&mut self, dv: Record) -> XlsResult<()> {
        if dv.sid() != sid::DV {
            return Err(XlsError::argument(format!("{} is not a DV record", dv.name())));
        }
        self.validations.push(dv);
        Ok(())
    }

    pub fn validations(&self) -> &[Record] {
        &self.validations
    }

    pub fn len(&self) -> usize {
        self.validations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validations.is_empty()
    }
}

impl RecordAggregate for DataValidityTable {
    fn visit_records(&self, visitor: &mut dyn FnMut(&Record)) {
        if self.validations.is_empty() {
            return;
        }
        let mut header = self.header;
        header.dv_count = self.validations.len() as u32;
        visitor(&Record::Dval(header));
        self.validations.iter().for_each(|r| visitor(r));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn count_is_fixed_up_on_write() {
        let mut table = DataValidityTable::new();
        let mut out = Vec::new();
        table.visit_records(&mut |r| out.push(r.clone()));
        assert!(out.is_empty());

        table
            .add_data_validation(Record::Unknown {
                sid: sid::DV,
                data: vec![0; 12],
            })
            .unwrap();
        assert!(table.add_data_validation(Record::Eof).is_err());
        table.visit_records(&mut |r| out.push(r.clone()));
        assert_eq!(out.len(), 2);
        assert!(matches!(&out[0], Record::Dval(d) if d.dv_count == 1));
    }
}
