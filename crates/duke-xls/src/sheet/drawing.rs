//! A sheet's drawing layer, folded into one aggregate.
//!
//! On disk the Escher tree of a sheet is cut into MSODRAWING records, one cut
//! after every ClientData and ClientTextbox, each followed by the OBJ or TXO
//! record describing that shape. NOTE records come after the whole run.

use duke_xls_records::escher::{
    self, client_record_ends, serialize_all, EscherBody, EscherDg, EscherRecord, EscherSp, DG_CONTAINER, SP,
    SPGR, SPGR_CONTAINER, SP_CONTAINER,
};
use duke_xls_records::{sid, Record};

use crate::drawing::DrawingManager;
use crate::error::{XlsError, XlsResult};
use crate::sheet::RecordAggregate;
use crate::stream::RecordStream;

/// Shape flags of the top group shape: group and patriarch.
const PATRIARCH_FLAGS: u32 = 0x0005;

pub(crate) fn is_drawing_run_record(s: u16) -> bool {
    matches!(s, sid::MSODRAWING | sid::OBJ | sid::TXO | sid::CONTINUE)
}

#[derive(Debug, Clone, PartialEq)]
enum Content {
    /// Parsed Escher tree with the OBJ/TXO groups that follow each client
    /// record.
    Tree {
        escher: Vec<EscherRecord>,
        objects: Vec<Vec<Record>>,
    },
    /// Run that could not be parsed or does not write back identically.
    Raw(Vec<Record>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawingAggregate {
    content: Content,
    notes: Vec<Record>,
}

impl DrawingAggregate {
    /// Fold the run starting at the next record, which must be MSODRAWING.
    pub fn read(rs: &mut RecordStream) -> XlsResult<Self> {
        if rs.peek_next_sid() != Some(sid::MSODRAWING) {
            return Err(XlsError::format("drawing aggregate must start with MSODRAWING"));
        }
        let mut run = Vec::new();
        while rs.peek_next_sid().map_or(false, is_drawing_run_record) {
            run.push(rs.next()?);
        }
        let mut notes = Vec::new();
        while rs.peek_next_sid() == Some(sid::NOTE) {
            notes.push(rs.next()?);
        }
        let content = Self::fold(run);
        if let Content::Raw(records) = &content {
            log::debug!("keeping {} drawing records unparsed", records.len());
        }
        Ok(Self { content, notes })
    }

    fn fold(run: Vec<Record>) -> Content {
        let mut bytes = Vec::new();
        let mut objects: Vec<Vec<Record>> = Vec::new();
        let mut in_object = false;
        for record in &run {
            match record {
                Record::Unknown { sid: sid::MSODRAWING, data } => {
                    bytes.extend_from_slice(data);
                    in_object = false;
                }
                r if matches!(r.sid(), sid::OBJ | sid::TXO) => {
                    objects.push(vec![r.clone()]);
                    in_object = true;
                }
                Record::Unknown { sid: sid::CONTINUE, data } => match objects.last_mut() {
                    Some(group) if in_object => group.push(record.clone()),
                    _ => bytes.extend_from_slice(data),
                },
                _ => return Content::Raw(run),
            }
        }
        let escher = match EscherRecord::parse_all(&bytes) {
            Ok(escher) if serialize_all(&escher) == bytes => escher,
            _ => return Content::Raw(run),
        };
        if client_record_ends(&escher).len() != objects.len() {
            return Content::Raw(run);
        }
        Content::Tree { escher, objects }
    }

    /// Empty drawing holding only the patriarch group shape.
    pub fn create_patriarch(manager: &mut DrawingManager) -> Self {
        let dg_id = manager.find_new_drawing_group_id();
        manager.register_drawing(dg_id);
        let mut dg = EscherDg {
            num_shapes: 0,
            last_mso_spid: u32::MAX,
        };
        let shape_id = manager.allocate_shape_id(dg_id, &mut dg);
        let patriarch = EscherRecord::container(
            SP_CONTAINER,
            vec![
                EscherRecord::atom(SPGR, 0x0001, vec![0; 16]),
                EscherRecord {
                    options: 0x0002,
                    record_id: SP,
                    body: EscherBody::Sp(EscherSp {
                        shape_id,
                        flags: PATRIARCH_FLAGS,
                    }),
                },
            ],
        );
        let tree = EscherRecord::container(
            DG_CONTAINER,
            vec![
                EscherRecord::dg(dg_id, dg),
                EscherRecord::container(SPGR_CONTAINER, vec![patriarch]),
            ],
        );
        log::debug!("created drawing {dg_id} with patriarch shape {shape_id}");
        Self {
            content: Content::Tree {
                escher: vec![tree],
                objects: Vec::new(),
            },
            notes: Vec::new(),
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self.content, Content::Tree { .. })
    }

    pub fn escher_records(&self) -> Option<&[EscherRecord]> {
        match &self.content {
            Content::Tree { escher, .. } => Some(escher),
            Content::Raw(_) => None,
        }
    }

    pub fn escher_records_mut(&mut self) -> Option<&mut Vec<EscherRecord>> {
        match &mut self.content {
            Content::Tree { escher, .. } => Some(escher),
            Content::Raw(_) => None,
        }
    }

    /// Id of the drawing, from its DG record.
    pub fn drawing_group_id(&self) -> Option<u16> {
        let dg = self.escher_records()?.iter().find_map(|r| r.find_child(escher::DG))?;
        Some(dg.instance())
    }

    pub fn num_objects(&self) -> usize {
        match &self.content {
            Content::Tree { objects, .. } => objects.len(),
            Content::Raw(records) => records.iter().filter(|r| matches!(r.sid(), sid::OBJ | sid::TXO)).count(),
        }
    }

    pub fn notes(&self) -> &[Record] {
        &self.notes
    }

    /// Give the drawing a fresh id and every shape a fresh shape id.
    pub fn reassign_shape_ids(&mut self, manager: &mut DrawingManager) -> XlsResult<()> {
        let escher = self
            .escher_records_mut()
            .ok_or_else(|| XlsError::format("drawing records could not be parsed"))?;
        for container in escher.iter_mut().filter(|r| r.record_id == DG_CONTAINER) {
            let dg_id = manager.find_new_drawing_group_id();
            manager.register_drawing(dg_id);
            let mut dg = EscherDg {
                num_shapes: 0,
                last_mso_spid: u32::MAX,
            };
            container.walk_mut(&mut |r| {
                if let EscherBody::Sp(sp) = &mut r.body {
                    sp.shape_id = manager.allocate_shape_id(dg_id, &mut dg);
                }
            });
            if let Some(dg_record) = container.find_child_mut(escher::DG) {
                dg_record.set_instance(dg_id);
                dg_record.body = EscherBody::Dg(dg);
            }
        }
        Ok(())
    }
}

impl RecordAggregate for DrawingAggregate {
    fn visit_records(&self, visitor: &mut dyn FnMut(&Record)) {
        match &self.content {
            Content::Raw(records) => records.iter().for_each(|r| visitor(r)),
            Content::Tree { escher, objects } => {
                let bytes = serialize_all(escher);
                let mut start = 0;
                for (end, group) in client_record_ends(escher).into_iter().zip(objects) {
                    visitor(&Record::Unknown {
                        sid: sid::MSODRAWING,
                        data: bytes[start..end].to_vec(),
                    });
                    group.iter().for_each(|r| visitor(r));
                    start = end;
                }
                if start < bytes.len() {
                    visitor(&Record::Unknown {
                        sid: sid::MSODRAWING,
                        data: bytes[start..].to_vec(),
                    });
                }
            }
        }
        self.notes.iter().for_each(|r| visitor(r));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duke_xls_records::escher::{EscherDgg, CLIENT_ANCHOR, CLIENT_DATA};
    use pretty_assertions::assert_eq;

    fn raw(s: u16, data: Vec<u8>) -> Record {
        Record::Unknown { sid: s, data }
    }

    fn manager() -> DrawingManager {
        DrawingManager::new(EscherDgg {
            shape_id_max: 1024,
            ..EscherDgg::default()
        })
    }

    fn shape_tree() -> Vec<EscherRecord> {
        let shape = EscherRecord::container(
            SP_CONTAINER,
            vec![
                EscherRecord {
                    options: 0x0C92,
                    record_id: SP,
                    body: EscherBody::Sp(EscherSp {
                        shape_id: 1025,
                        flags: 0x0A00,
                    }),
                },
                EscherRecord::atom(CLIENT_ANCHOR, 0, vec![0; 18]),
                EscherRecord::atom(CLIENT_DATA, 0, Vec::new()),
            ],
        );
        vec![EscherRecord::container(
            DG_CONTAINER,
            vec![
                EscherRecord::dg(1, EscherDg {
                    num_shapes: 1,
                    last_mso_spid: 1025,
                }),
                EscherRecord::container(SPGR_CONTAINER, vec![shape]),
            ],
        )]
    }

    #[test]
    fn run_is_split_again_at_client_data() {
        let bytes = serialize_all(&shape_tree());
        let mut rs = RecordStream::new(vec![
            raw(sid::MSODRAWING, bytes.clone()),
            raw(sid::OBJ, vec![0x15, 0, 0x12, 0]),
            raw(sid::NOTE, vec![0; 12]),
            Record::Eof,
        ]);
        let agg = DrawingAggregate::read(&mut rs).unwrap();
        assert!(agg.is_parsed());
        assert_eq!(agg.num_objects(), 1);
        assert_eq!(agg.drawing_group_id(), Some(1));
        assert_eq!(rs.peek_next_sid(), Some(sid::EOF));

        let mut out = Vec::new();
        agg.visit_records(&mut |r| out.push(r.clone()));
        let sids: Vec<u16> = out.iter().map(Record::sid).collect();
        assert_eq!(sids, vec![sid::MSODRAWING, sid::OBJ, sid::NOTE]);
        assert_eq!(out[0], raw(sid::MSODRAWING, bytes));
    }

    #[test]
    fn mismatched_object_count_stays_raw() {
        let bytes = serialize_all(&shape_tree());
        let mut rs = RecordStream::new(vec![raw(sid::MSODRAWING, bytes)]);
        let agg = DrawingAggregate::read(&mut rs).unwrap();
        assert!(!agg.is_parsed());
        let mut count = 0;
        agg.visit_records(&mut |_| count += 1);
        assert_eq!(count, 1);
    }

    #[test]
    fn patriarch_takes_the_first_shape_id() {
        let mut m = manager();
        let agg = DrawingAggregate::create_patriarch(&mut m);
        assert_eq!(agg.drawing_group_id(), Some(1));
        let mut ids = Vec::new();
        for r in agg.escher_records().unwrap() {
            r.walk(&mut |r| {
                if let EscherBody::Sp(sp) = &r.body {
                    ids.push(sp.shape_id);
                }
            });
        }
        assert_eq!(ids, vec![1024]);
    }

    #[test]
    fn reassigning_ids_never_reuses_them() {
        let mut m = manager();
        let first = DrawingAggregate::create_patriarch(&mut m);
        let mut copy = first.clone();
        copy.reassign_shape_ids(&mut m).unwrap();
        assert_eq!(copy.drawing_group_id(), Some(2));
        let mut ids = Vec::new();
        copy.escher_records().unwrap()[0].walk(&mut |r| {
            if let EscherBody::Sp(sp) = &r.body {
                ids.push(sp.shape_id);
            }
        });
        assert_eq!(ids, vec![2048]);
    }
}
