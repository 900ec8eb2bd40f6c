mod config;
mod doctor;
mod workspace;

pub use config::{
    DEFAULT_PROFILE, DEFAULT_SERVER_URL, DisplayConfig, ProfileConfig, ProfileView,
    ResolvedProfile, WorkspaceConfig, list_profiles, load_config, resolve_profile, save_config,
    set_active_profile, set_profile_server,
};
pub use doctor::{DoctorCheck, DoctorReport, run_doctor};
pub use workspace::{
    WORKSPACE_DIR, WorkspaceInitResult, WorkspacePaths, init_workspace, resolve_workspace,
};
