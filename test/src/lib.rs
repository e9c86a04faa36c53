
pub use helpers::{
    Harness, MemoryPersistedState, PermissiveObjectModel, RecordingSink, RecordingTransport,
};
