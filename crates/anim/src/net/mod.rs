mod codec;
mod interpolate;
mod snapshot;

pub use codec::{CodecTable, ControllerFlags, ReplicatedStatus};
pub use interpolate::{interpolate_time, interpolate_weight};
pub use snapshot::{Snapshot, SnapshotBuffer, SnapshotError};
