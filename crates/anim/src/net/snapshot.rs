use rkyv::{Archive, Deserialize, Serialize, rancor};

/// One tick's worth of replicated blending state: the packed word image of a
/// whole controller. The transport frames and ships these; remote controllers
/// keep a short history of them for render-time interpolation.
#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct Snapshot {
    pub tick: u32,
    pub words: Vec<u32>,
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("serialization failed: {0}")]
    Serialize(rancor::Error),
    #[error("deserialization failed: {0}")]
    Deserialize(rancor::Error),
}

impl Snapshot {
    pub fn new(tick: u32, word_count: usize) -> Self {
        Self {
            tick,
            words: vec![0; word_count],
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, SnapshotError> {
        rkyv::to_bytes::<rancor::Error>(self)
            .map(|aligned| aligned.into_vec())
            .map_err(SnapshotError::Serialize)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, SnapshotError> {
        rkyv::from_bytes::<Self, rancor::Error>(data).map_err(SnapshotError::Deserialize)
    }
}

/// Fixed-capacity ring of snapshots indexed by tick modulo capacity.
#[derive(Debug)]
pub struct SnapshotBuffer {
    snapshots: Vec<Option<Snapshot>>,
    capacity: usize,
}

impl SnapshotBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            snapshots: (0..capacity).map(|_| None).collect(),
            capacity,
        }
    }

    pub fn push(&mut self, snapshot: Snapshot) {
        let index = (snapshot.tick as usize) % self.capacity;
        self.snapshots[index] = Some(snapshot);
    }

    pub fn get(&self, tick: u32) -> Option<&Snapshot> {
        let index = (tick as usize) % self.capacity;
        self.snapshots[index].as_ref().filter(|s| s.tick == tick)
    }

    /// The two most recent snapshots, oldest first.
    pub fn interpolation_pair(&self) -> Option<(&Snapshot, &Snapshot)> {
        let mut snapshots: Vec<&Snapshot> =
            self.snapshots.iter().filter_map(|s| s.as_ref()).collect();
        snapshots.sort_by_key(|s| s.tick);

        if snapshots.len() >= 2 {
            let len = snapshots.len();
            Some((snapshots[len - 2], snapshots[len - 1]))
        } else {
            None
        }
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.snapshots
            .iter()
            .filter_map(|s| s.as_ref())
            .max_by_key(|s| s.tick)
    }

    pub fn clear(&mut self) {
        for slot in &mut self.snapshots {
            *slot = None;
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
