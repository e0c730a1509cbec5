//! Shape id allocation for the drawing layer.
//!
//! Shape ids are handed out in clusters of 1024. Each cluster belongs to one
//! drawing (DG); the DGG record lists the clusters and the highest id in use.
//! A drawing fills its clusters in order and opens a new one when they are
//! all full. Ids are never reused.

use ahash::AHashMap;
use duke_xls_records::escher::{EscherDg, EscherDgg, EscherRecord, FileIdCluster};

/// Shape ids per cluster.
pub const CLUSTER_SIZE: u32 = 1024;

#[derive(Debug, Clone)]
pub struct DrawingManager {
    dgg: EscherDgg,
    /// Cluster slots (indexes into `dgg.clusters`) owned by each drawing.
    slots: AHashMap<u32, Vec<usize>>,
}

impl DrawingManager {
    pub fn new(dgg: EscherDgg) -> Self {
        let mut slots: AHashMap<u32, Vec<usize>> = AHashMap::new();
        for (i, cluster) in dgg.clusters.iter().enumerate() {
            slots.entry(cluster.drawing_group_id).or_default().push(i);
        }
        Self { dgg, slots }
    }

    pub fn dgg(&self) -> &EscherDgg {
        &self.dgg
    }

    /// Record a new cluster for `drawing_group_id` with `used` ids taken.
    pub fn add_cluster(&mut self, drawing_group_id: u32, used: u32) -> usize {
        self.dgg.clusters.push(FileIdCluster {
            drawing_group_id,
            num_shape_ids_used: used,
        });
        let slot = self.dgg.clusters.len() - 1;
        self.slots.entry(drawing_group_id).or_default().push(slot);
        slot
    }

    /// Lowest drawing id (from 1) with no cluster.
    pub fn find_new_drawing_group_id(&self) -> u16 {
        let mut id: u16 = 1;
        while self.slots.contains_key(&(id as u32)) {
            id += 1;
        }
        id
    }

    /// Register a new drawing and return its DG record.
    pub fn create_dg_record(&mut self) -> EscherRecord {
        let id = self.find_new_drawing_group_id();
        self.register_drawing(id);
        EscherRecord::dg(
            id,
            EscherDg {
                num_shapes: 0,
                last_mso_spid: u32::MAX,
            },
        )
    }

    /// Open an empty cluster for drawing `id` and count the drawing.
    pub fn register_drawing(&mut self, id: u16) {
        self.add_cluster(id as u32, 0);
        self.dgg.drawings_saved += 1;
    }

    /// Allocate the next shape id for drawing `drawing_group_id`, updating
    /// its DG record.
    pub fn allocate_shape_id(&mut self, drawing_group_id: u16, dg: &mut EscherDg) -> u32 {
        let group = drawing_group_id as u32;
        self.dgg.num_shapes_saved += 1;

        let free = self
            .slots
            .get(&group)
            .and_then(|slots| {
                slots
                    .iter()
                    .copied()
                    .find(|&s| self.dgg.clusters[s].num_shape_ids_used < CLUSTER_SIZE)
            });
        let slot = match free {
            Some(slot) => slot,
            None => self.add_cluster(group, 0),
        };

        let cluster = &mut self.dgg.clusters[slot];
        let shape_id = (slot as u32 + 1) * CLUSTER_SIZE + cluster.num_shape_ids_used;
        cluster.num_shape_ids_used += 1;

        dg.num_shapes += 1;
        dg.last_mso_spid = shape_id;
        self.dgg.shape_id_max = self.dgg.shape_id_max.max(shape_id + 1);
        shape_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> DrawingManager {
        DrawingManager::new(EscherDgg {
            shape_id_max: 1024,
            ..EscherDgg::default()
        })
    }

    #[test]
    fn first_drawing_starts_at_1024() {
        let mut m = manager();
        let dg_record = m.create_dg_record();
        let id = dg_record.instance();
        assert_eq!(id, 1);
        let mut dg = EscherDg::default();
        assert_eq!(m.allocate_shape_id(id, &mut dg), 1024);
        assert_eq!(m.allocate_shape_id(id, &mut dg), 1025);
        assert_eq!(dg.num_shapes, 2);
        assert_eq!(dg.last_mso_spid, 1025);
        assert_eq!(m.dgg().shape_id_max, 1026);
        assert_eq!(m.dgg().drawings_saved, 1);
        assert_eq!(m.dgg().num_shapes_saved, 2);
    }

    #[test]
    fn full_cluster_opens_a_new_one() {
        let mut m = manager();
        m.register_drawing(1);
        let mut dg = EscherDg::default();
        for _ in 0..CLUSTER_SIZE {
            m.allocate_shape_id(1, &mut dg);
        }
        assert_eq!(dg.last_mso_spid, 2047);
        // a second drawing takes the next cluster slot
        m.register_drawing(2);
        let mut dg2 = EscherDg::default();
        assert_eq!(m.allocate_shape_id(2, &mut dg2), 2048);
        // the first drawing spills over into a third cluster
        assert_eq!(m.allocate_shape_id(1, &mut dg), 3072);
        assert_eq!(m.dgg().clusters.len(), 3);
        assert_eq!(m.find_new_drawing_group_id(), 3);
    }
}
