//! Configuration access port trait.

/// Raw key lookup; typed parsing and defaults live with the loaders.
pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
}
