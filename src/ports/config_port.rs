//! Configuration access port trait.

/// Read-only section/key lookup. Typed parsing happens in
/// [`crate::domain::config_validation`] so a malformed value is reported
/// rather than replaced by a default.
pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool;
}
