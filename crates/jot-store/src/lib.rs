mod credentials;
mod mirror;
mod state;

pub use credentials::{EnvCredentials, resolve_env_credentials};
pub use mirror::{MemoryMirror, MirrorStore};
pub use state::{MirrorEntryInfo, StateStore, StoredSession};
