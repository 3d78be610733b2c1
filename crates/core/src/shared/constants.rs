/// Half-width of the window in which two markers on one file count as duplicates.
pub const DUPLICATE_TOLERANCE: f32 = 0.07;

/// Minimum pixel size of a marker before it may seed a new face cluster.
pub const CLUSTER_MIN_SIZE: i32 = 80;

/// Minimum detector score of a marker before it may seed a new face cluster.
pub const CLUSTER_MIN_SCORE: i32 = 15;

/// Maximum embedding distance for a marker to match a face.
pub const MATCH_DIST: f64 = 0.46;

/// Score assigned to markers confirmed as valid through a manual edit.
pub const VALID_SCORE_FLOOR: i32 = 100;

/// Collisions closer than this are treated as the same sample and ignored.
pub const MIN_COLLISION_DIST: f64 = 0.01;

/// Sentinel for an unknown marker-to-face distance.
pub const UNKNOWN_DIST: f64 = -1.0;

/// Sentinel for an unknown marker pixel size.
pub const UNKNOWN_SIZE: i32 = -1;

/// Marker names are clipped to this many characters.
pub const NAME_MAX_LEN: usize = 160;

pub const CONFIG_DIR_NAME: &str = "face-resolver";
pub const CONFIG_FILE_NAME: &str = "config.json";
