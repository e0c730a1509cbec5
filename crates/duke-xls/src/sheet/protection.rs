//! Sheet protection records: PROTECT, OBJPROTECT, SCENPROTECT and PASSWORD.

use duke_xls_records::{sid, Record};

use crate::error::{XlsError, XlsResult};
use crate::password::xor_verifier;
use crate::sheet::RecordAggregate;
use crate::stream::RecordStream;

pub fn is_component_record(s: u16) -> bool {
    matches!(s, sid::PROTECT | sid::OBJPROTECT | sid::SCENPROTECT | sid::PASSWORD)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorksheetProtectionBlock {
    protect: Option<u16>,
    obj_protect: Option<u16>,
    scen_protect: Option<u16>,
    password: Option<u16>,
}

impl WorksheetProtectionBlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read protection records from the front of the stream. Called again
    /// for records that turn up later in the sheet.
    pub fn add_records(&mut self, rs: &mut RecordStream) -> XlsResult<()> {
        while rs.peek_next_sid().map_or(false, is_component_record) {
            let record = rs.next()?;
            let s = record.sid();
            let value = record
                .short_value(s)
                .ok_or_else(|| XlsError::format(format!("malformed {} record", record.name())))?;
            let slot = match s {
                sid::PROTECT => &mut self.protect,
                sid::OBJPROTECT => &mut self.obj_protect,
                sid::SCENPROTECT => &mut self.scen_protect,
                _ => &mut self.password,
            };
            if slot.is_some() {
                return Err(XlsError::format(format!("duplicate {} record", record.name())));
            }
            *slot = Some(value);
        }
        Ok(())
    }

    pub fn is_protected(&self) -> bool {
        self.protect.map_or(false, |v| v != 0)
    }

    pub fn objects_protected(&self) -> bool {
        self.obj_protect.map_or(false, |v| v != 0)
    }

    pub fn scenarios_protected(&self) -> bool {
        self.scen_protect.map_or(false, |v| v != 0)
    }

    pub fn password_hash(&self) -> u16 {
        self.password.unwrap_or(0)
    }

    /// Protect the sheet with `password`, or drop every protection record
    /// when it is `None`.
    pub fn protect_sheet(&mut self, password: Option<&str>, objects: bool, scenarios: bool) {
        let Some(password) = password else {
            *self = Self::default();
            return;
        };
        self.protect = Some(1);
        self.password = Some(xor_verifier(password));
        if self.obj_protect.is_none() && objects {
            self.obj_protect = Some(1);
        }
        if self.scen_protect.is_none() && scenarios {
            self.scen_protect = Some(1);
        }
    }
}

impl RecordAggregate for WorksheetProtectionBlock {
    fn visit_records(&self, visitor: &mut dyn FnMut(&Record)) {
        let slots = [
            (sid::PROTECT, self.protect),
            (sid::OBJPROTECT, self.obj_protect),
            (sid::SCENPROTECT, self.scen_protect),
            (sid::PASSWORD, self.password),
        ];
        for (s, value) in slots {
            if let Some(value) = value {
                visitor(&Record::short(s, value));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sids(block: &WorksheetProtectionBlock) -> Vec<u16> {
        let mut out = Vec::new();
        block.visit_records(&mut |r| out.push(r.sid()));
        out
    }

    #[test]
    fn protect_and_unprotect() {
        let mut block = WorksheetProtectionBlock::new();
        assert!(sids(&block).is_empty());
        block.protect_sheet(Some("secret"), true, false);
        assert!(block.is_protected());
        assert_eq!(block.password_hash(), xor_verifier("secret"));
        assert_eq!(sids(&block), vec![sid::PROTECT, sid::OBJPROTECT, sid::PASSWORD]);

        block.protect_sheet(None, false, false);
        assert!(!block.is_protected());
        assert!(sids(&block).is_empty());
    }

    #[test]
    fn duplicate_records_are_rejected() {
        let mut rs = RecordStream::new(vec![Record::short(sid::PROTECT, 1), Record::short(sid::PROTECT, 1)]);
        let mut block = WorksheetProtectionBlock::new();
        assert!(matches!(block.add_records(&mut rs), Err(XlsError::InvalidFormat(_))));
    }
}
