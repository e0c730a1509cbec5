//! Escher (Office drawing layer) record tree.
//!
//! Every Escher record has an 8-byte header: `options:u16` (version in the low
//! nibble, instance in the high 12 bits), `record_id:u16`, `length:u32`.
//! Version `0xF` marks a container whose body is a sequence of child records.
//!
//! Only the records the shape-ID machinery reads are typed (DGG, DG, SP); the
//! rest keep their body bytes.

use crate::error::{RecordError, RecordResult};
use crate::parser::{read_bytes, read_u16, read_u32, write_u16, write_u32};

pub const DGG_CONTAINER: u16 = 0xF000;
pub const BSTORE_CONTAINER: u16 = 0xF001;
pub const DG_CONTAINER: u16 = 0xF002;
pub const SPGR_CONTAINER: u16 = 0xF003;
pub const SP_CONTAINER: u16 = 0xF004;
pub const DGG: u16 = 0xF006;
pub const BSE: u16 = 0xF007;
pub const DG: u16 = 0xF008;
pub const SPGR: u16 = 0xF009;
pub const SP: u16 = 0xF00A;
pub const OPT: u16 = 0xF00B;
pub const CLIENT_TEXTBOX: u16 = 0xF00D;
pub const CLIENT_ANCHOR: u16 = 0xF010;
pub const CLIENT_DATA: u16 = 0xF011;
pub const SPLIT_MENU_COLORS: u16 = 0xF11E;

/// OPT property holding the 1-based BLIP store index a picture displays.
pub const PROP_BLIP_TO_DISPLAY: u16 = 0x0104;

const HEADER_SIZE: usize = 8;
const CONTAINER_VERSION: u16 = 0x000F;

/// One cluster of shape ids owned by a drawing group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileIdCluster {
    pub drawing_group_id: u32,
    pub num_shape_ids_used: u32,
}

/// Drawing group record: global shape-id bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EscherDgg {
    pub shape_id_max: u32,
    pub num_shapes_saved: u32,
    pub drawings_saved: u32,
    pub clusters: Vec<FileIdCluster>,
}

impl EscherDgg {
    /// On-disk `cidcl`: clusters + 1, or 0 with no clusters.
    pub fn num_id_clusters(&self) -> u32 {
        if self.clusters.is_empty() {
            0
        } else {
            self.clusters.len() as u32 + 1
        }
    }

    fn parse(data: &[u8]) -> RecordResult<Self> {
        let mut offset = 0;
        let shape_id_max = read_u32(data, &mut offset)?;
        let _num_id_clusters = read_u32(data, &mut offset)?;
        let num_shapes_saved = read_u32(data, &mut offset)?;
        let drawings_saved = read_u32(data, &mut offset)?;
        let mut clusters = Vec::with_capacity((data.len() - offset) / 8);
        while offset + 8 <= data.len() {
            clusters.push(FileIdCluster {
                drawing_group_id: read_u32(data, &mut offset)?,
                num_shape_ids_used: read_u32(data, &mut offset)?,
            });
        }
        Ok(Self {
            shape_id_max,
            num_shapes_saved,
            drawings_saved,
            clusters,
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        write_u32(out, self.shape_id_max);
        write_u32(out, self.num_id_clusters());
        write_u32(out, self.num_shapes_saved);
        write_u32(out, self.drawings_saved);
        for c in &self.clusters {
            write_u32(out, c.drawing_group_id);
            write_u32(out, c.num_shape_ids_used);
        }
    }
}

/// Per-drawing record: shape count and last allocated id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EscherDg {
    pub num_shapes: u32,
    pub last_mso_spid: u32,
}

/// Shape record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EscherSp {
    pub shape_id: u32,
    pub flags: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscherBody {
    Children(Vec<EscherRecord>),
    Dgg(EscherDgg),
    Dg(EscherDg),
    Sp(EscherSp),
    Data(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscherRecord {
    pub options: u16,
    pub record_id: u16,
    pub body: EscherBody,
}

impl EscherRecord {
    pub fn container(record_id: u16, children: Vec<EscherRecord>) -> Self {
        Self::container_with_instance(record_id, 0, children)
    }

    pub fn container_with_instance(record_id: u16, instance: u16, children: Vec<EscherRecord>) -> Self {
        Self {
            options: (instance << 4) | CONTAINER_VERSION,
            record_id,
            body: EscherBody::Children(children),
        }
    }

    pub fn atom(record_id: u16, options: u16, data: Vec<u8>) -> Self {
        Self {
            options,
            record_id,
            body: EscherBody::Data(data),
        }
    }

    pub fn dgg(dgg: EscherDgg) -> Self {
        Self {
            options: 0x0000,
            record_id: DGG,
            body: EscherBody::Dgg(dgg),
        }
    }

    pub fn dg(drawing_group_id: u16, dg: EscherDg) -> Self {
        Self {
            options: drawing_group_id << 4,
            record_id: DG,
            body: EscherBody::Dg(dg),
        }
    }

    /// OPT record with simple (non-complex) properties.
    pub fn opt(properties: &[(u16, u32)]) -> Self {
        let mut data = Vec::with_capacity(properties.len() * 6);
        for &(id, value) in properties {
            write_u16(&mut data, id);
            write_u32(&mut data, value);
        }
        Self::atom(OPT, ((properties.len() as u16) << 4) | 0x3, data)
    }

    pub fn version(&self) -> u16 {
        self.options & 0x000F
    }

    pub fn instance(&self) -> u16 {
        self.options >> 4
    }

    pub fn set_instance(&mut self, instance: u16) {
        self.options = (instance << 4) | self.version();
    }

    pub fn is_container(&self) -> bool {
        matches!(self.body, EscherBody::Children(_))
    }

    pub fn children(&self) -> &[EscherRecord] {
        match &self.body {
            EscherBody::Children(c) => c,
            _ => &[],
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<EscherRecord>> {
        match &mut self.body {
            EscherBody::Children(c) => Some(c),
            _ => None,
        }
    }

    pub fn find_child(&self, record_id: u16) -> Option<&EscherRecord> {
        self.children().iter().find(|c| c.record_id == record_id)
    }

    pub fn find_child_mut(&mut self, record_id: u16) -> Option<&mut EscherRecord> {
        self.children_mut()?.iter_mut().find(|c| c.record_id == record_id)
    }

    /// Pre-order visit of this record and all descendants.
    pub fn walk<'a>(&'a self, f: &mut dyn FnMut(&'a EscherRecord)) {
        f(self);
        for child in self.children() {
            child.walk(f);
        }
    }

    pub fn walk_mut(&mut self, f: &mut dyn FnMut(&mut EscherRecord)) {
        f(self);
        if let Some(children) = self.children_mut() {
            for child in children {
                child.walk_mut(f);
            }
        }
    }

    /// Value of a simple OPT property, if this is an OPT record carrying it.
    pub fn opt_property(&self, property_id: u16) -> Option<u32> {
        if self.record_id != OPT {
            return None;
        }
        let EscherBody::Data(data) = &self.body else {
            return None;
        };
        let count = self.instance() as usize;
        let mut offset = 0;
        for _ in 0..count {
            let id = read_u16(data, &mut offset).ok()?;
            let value = read_u32(data, &mut offset).ok()?;
            if id & 0x3FFF == property_id {
                return Some(value);
            }
        }
        None
    }

    /// Reference count of a BSE record (`cRef`, 24 bytes into the body).
    pub fn bse_ref_count(&self) -> Option<u32> {
        match (&self.body, self.record_id) {
            (EscherBody::Data(data), BSE) if data.len() >= 28 => {
                Some(u32::from_le_bytes([data[24], data[25], data[26], data[27]]))
            }
            _ => None,
        }
    }

    pub fn set_bse_ref_count(&mut self, count: u32) -> bool {
        match (&mut self.body, self.record_id) {
            (EscherBody::Data(data), BSE) if data.len() >= 28 => {
                data[24..28].copy_from_slice(&count.to_le_bytes());
                true
            }
            _ => false,
        }
    }

    /// Parse one record at `offset`, advancing it.
    pub fn parse(data: &[u8], offset: &mut usize) -> RecordResult<Self> {
        let options = read_u16(data, offset)?;
        let record_id = read_u16(data, offset)?;
        let len = read_u32(data, offset)? as usize;
        let body_bytes = read_bytes(data, offset, len).map_err(|_| {
            RecordError::InvalidFormat(format!(
                "escher record 0x{record_id:04X} claims {len} bytes past end of data"
            ))
        })?;

        let body = if options & 0x000F == CONTAINER_VERSION {
            EscherBody::Children(Self::parse_all(body_bytes)?)
        } else {
            match record_id {
                DGG => EscherBody::Dgg(EscherDgg::parse(body_bytes)?),
                DG => {
                    let mut o = 0;
                    EscherBody::Dg(EscherDg {
                        num_shapes: read_u32(body_bytes, &mut o)?,
                        last_mso_spid: read_u32(body_bytes, &mut o)?,
                    })
                }
                SP => {
                    let mut o = 0;
                    EscherBody::Sp(EscherSp {
                        shape_id: read_u32(body_bytes, &mut o)?,
                        flags: read_u32(body_bytes, &mut o)?,
                    })
                }
                _ => EscherBody::Data(body_bytes.to_vec()),
            }
        };
        Ok(Self {
            options,
            record_id,
            body,
        })
    }

    /// Parse consecutive records until the data is exhausted.
    pub fn parse_all(data: &[u8]) -> RecordResult<Vec<Self>> {
        let mut offset = 0;
        let mut records = Vec::new();
        while offset + HEADER_SIZE <= data.len() {
            records.push(Self::parse(data, &mut offset)?);
        }
        if offset != data.len() {
            return Err(RecordError::InvalidFormat(format!(
                "{} stray bytes after escher records",
                data.len() - offset
            )));
        }
        Ok(records)
    }

    fn body_size(&self) -> usize {
        match &self.body {
            EscherBody::Children(c) => c.iter().map(EscherRecord::size).sum(),
            EscherBody::Dgg(d) => 16 + d.clusters.len() * 8,
            EscherBody::Dg(_) | EscherBody::Sp(_) => 8,
            EscherBody::Data(d) => d.len(),
        }
    }

    /// Serialized size including the 8-byte header.
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.body_size()
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        write_u16(out, self.options);
        write_u16(out, self.record_id);
        write_u32(out, self.body_size() as u32);
        match &self.body {
            EscherBody::Children(children) => {
                for child in children {
                    child.serialize(out);
                }
            }
            EscherBody::Dgg(d) => d.write(out),
            EscherBody::Dg(d) => {
                write_u32(out, d.num_shapes);
                write_u32(out, d.last_mso_spid);
            }
            EscherBody::Sp(s) => {
                write_u32(out, s.shape_id);
                write_u32(out, s.flags);
            }
            EscherBody::Data(d) => out.extend_from_slice(d),
        }
    }
}

/// Serialize a list of sibling records.
pub fn serialize_all(records: &[EscherRecord]) -> Vec<u8> {
    let mut out = Vec::with_capacity(records.iter().map(EscherRecord::size).sum());
    for r in records {
        r.serialize(&mut out);
    }
    out
}

/// End offsets (in the serialized form of `records`) of every ClientData and
/// ClientTextbox record, in document order.
///
/// In a sheet's MSODRAWING stream each of these ends a physical record and is
/// followed by its OBJ or TXO.
pub fn client_record_ends(records: &[EscherRecord]) -> Vec<usize> {
    fn visit(r: &EscherRecord, start: usize, ends: &mut Vec<usize>) {
        let mut pos = start + HEADER_SIZE;
        for child in r.children() {
            visit(child, pos, ends);
            pos += child.size();
        }
        if r.record_id == CLIENT_DATA || r.record_id == CLIENT_TEXTBOX {
            ends.push(start + r.size());
        }
    }
    let mut ends = Vec::new();
    let mut pos = 0;
    for r in records {
        visit(r, pos, &mut ends);
        pos += r.size();
    }
    ends
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_dg_container() -> EscherRecord {
        let sp = EscherRecord {
            options: 0x0002,
            record_id: SP,
            body: EscherBody::Sp(EscherSp {
                shape_id: 1025,
                flags: 0x0A00,
            }),
        };
        let shape = EscherRecord::container(
            SP_CONTAINER,
            vec![
                sp,
                EscherRecord::opt(&[(PROP_BLIP_TO_DISPLAY, 1)]),
                EscherRecord::atom(CLIENT_DATA, 0, Vec::new()),
            ],
        );
        EscherRecord::container(
            DG_CONTAINER,
            vec![
                EscherRecord::dg(1, EscherDg {
                    num_shapes: 1,
                    last_mso_spid: 1025,
                }),
                EscherRecord::container(SPGR_CONTAINER, vec![shape]),
            ],
        )
    }

    #[test]
    fn tree_reparses_identically() {
        let tree = sample_dg_container();
        let bytes = serialize_all(std::slice::from_ref(&tree));
        assert_eq!(bytes.len(), tree.size());
        let parsed = EscherRecord::parse_all(&bytes).unwrap();
        assert_eq!(parsed, vec![tree]);
    }

    #[test]
    fn client_data_end_is_last_byte_of_stream() {
        let tree = sample_dg_container();
        let ends = client_record_ends(std::slice::from_ref(&tree));
        assert_eq!(ends, vec![tree.size()]);
    }

    #[test]
    fn opt_lookup_masks_flags() {
        let opt = EscherRecord::opt(&[(0x4000 | PROP_BLIP_TO_DISPLAY, 3), (0x0181, 7)]);
        assert_eq!(opt.opt_property(PROP_BLIP_TO_DISPLAY), Some(3));
        assert_eq!(opt.opt_property(0x0181), Some(7));
        assert_eq!(opt.opt_property(0x01C0), None);
    }

    #[test]
    fn dgg_cluster_count_on_disk() {
        let mut dgg = EscherDgg::default();
        assert_eq!(dgg.num_id_clusters(), 0);
        dgg.clusters.push(FileIdCluster {
            drawing_group_id: 1,
            num_shape_ids_used: 2,
        });
        assert_eq!(dgg.num_id_clusters(), 2);
    }

    #[test]
    fn overlong_length_is_rejected() {
        let bytes = [0x0F, 0x00, 0x02, 0xF0, 0xFF, 0x00, 0x00, 0x00];
        assert!(EscherRecord::parse_all(&bytes).is_err());
    }
}
