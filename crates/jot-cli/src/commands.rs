pub(crate) mod auth;
pub(crate) mod cache;
pub(crate) mod note;
pub(crate) mod profile;
pub(crate) mod task;
