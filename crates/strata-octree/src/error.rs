use std::io;

#[derive(Debug)]
pub enum OctreeError {
    /// The cell array would outgrow its hard ceiling.
    Capacity { requested: usize, limit: usize },
    InvalidDepth(u32),
    InvalidType(u32),
    Malformed(&'static str),
    Io(io::Error),
}

impl From<io::Error> for OctreeError {
    fn from(e: io::Error) -> Self {
        OctreeError::Io(e)
    }
}

impl std::fmt::Display for OctreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OctreeError::Capacity { requested, limit } => write!(
                f,
                "octree too big: {} cells requested, limit is {}",
                requested, limit
            ),
            OctreeError::InvalidDepth(d) => write!(f, "invalid octree depth {}", d),
            OctreeError::InvalidType(t) => write!(f, "voxel type {} out of range", t),
            OctreeError::Malformed(msg) => write!(f, "malformed octree data: {}", msg),
            OctreeError::Io(e) => write!(f, "octree i/o: {}", e),
        }
    }
}

impl std::error::Error for OctreeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OctreeError::Io(e) => Some(e),
            _ => None,
        }
    }
}
