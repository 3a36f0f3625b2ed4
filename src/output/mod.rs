//! Output device modules
//!
//! Every device backend implements [`OutputModule`]. The [`OutputRegistry`]
//! keeps them in a fixed order with [`NullOut`] first, so a lookup miss or a
//! failed device init can always fall back to silent output.

#[cfg(feature = "streaming")]
pub mod rodio_out;

#[cfg(feature = "streaming")]
pub use rodio_out::RodioOut;

use crate::speakers::SpeakerLayout;
use crate::streaming::{RingMonitor, SndReader};
use crate::Result;

/// Identifier of the silent fallback module
pub const NULL_OUT_ID: &str = "nullout";

/// Everything a module needs to start pulling samples
pub struct OutputContext {
    /// Consumer side of the ring; the module moves it into its callback
    pub reader: SndReader,
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Device speaker layout
    pub layout: SpeakerLayout,
    /// Read-only ring view for headroom reporting
    pub monitor: RingMonitor,
}

/// A selectable output device
///
/// Lifecycle: `init` → (`set_paused` ⇄) → `close`. A module may be
/// re-initialized after `close`.
pub trait OutputModule: Send {
    /// Open the device and start pulling from `ctx.reader`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SndOutError::DeviceInit`] if the device cannot be
    /// opened. The caller falls back to [`NullOut`].
    fn init(&mut self, ctx: OutputContext) -> Result<()>;

    /// Stop pulling and release the device.
    fn close(&mut self);

    /// Pause or resume the device.
    fn set_paused(&mut self, paused: bool);

    /// Advisory device headroom in samples
    fn empty_sample_count(&self) -> usize;

    /// Stable machine identifier, matched case-sensitively
    fn ident(&self) -> &'static str;

    /// Human-readable name
    fn long_name(&self) -> &'static str;
}

/// Silent module: accepts everything and never fails.
#[derive(Debug, Default)]
pub struct NullOut;

impl OutputModule for NullOut {
    fn init(&mut self, _ctx: OutputContext) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) {}

    fn set_paused(&mut self, _paused: bool) {}

    fn empty_sample_count(&self) -> usize {
        0
    }

    fn ident(&self) -> &'static str {
        NULL_OUT_ID
    }

    fn long_name(&self) -> &'static str {
        "No Sound (Emulate SPU2 only)"
    }
}

/// Ordered list of output modules
///
/// Index 0 is always [`NullOut`]. Lookups return [`OutputRegistry::sentinel`]
/// (equal to [`OutputRegistry::len`]) when nothing matches.
pub struct OutputRegistry {
    modules: Vec<Box<dyn OutputModule>>,
}

impl OutputRegistry {
    /// Index of the null module
    pub const NULL_INDEX: usize = 0;

    /// Registry holding only [`NullOut`]
    pub fn new() -> Self {
        OutputRegistry {
            modules: vec![Box::new(NullOut)],
        }
    }

    /// Registry with every backend compiled into the crate
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();
        #[cfg(feature = "streaming")]
        registry.register(Box::new(RodioOut::new()));
        registry
    }

    /// Append a module; returns its index.
    pub fn register(&mut self, module: Box<dyn OutputModule>) -> usize {
        self.modules.push(module);
        self.modules.len() - 1
    }

    /// Builder form of [`OutputRegistry::register`]
    pub fn with_module(mut self, module: Box<dyn OutputModule>) -> Self {
        self.register(module);
        self
    }

    /// Index of the first module whose identifier equals `ident`, or the
    /// sentinel.
    pub fn find_by_id(&self, ident: &str) -> usize {
        self.modules
            .iter()
            .position(|module| module.ident() == ident)
            .unwrap_or(self.sentinel())
    }

    /// Index returned by a failed lookup
    pub fn sentinel(&self) -> usize {
        self.modules.len()
    }

    /// Number of registered modules
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Always false: the null module is always present
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Module at `index`
    pub fn get(&self, index: usize) -> Option<&dyn OutputModule> {
        self.modules.get(index).map(|module| module.as_ref())
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut (dyn OutputModule + 'static)> {
        self.modules.get_mut(index).map(|module| module.as_mut())
    }

    /// Iterate modules in registry order
    pub fn iter(&self) -> impl Iterator<Item = &dyn OutputModule> {
        self.modules.iter().map(|module| module.as_ref())
    }
}

impl Default for OutputRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for OutputRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.modules.iter().map(|module| module.ident()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl OutputModule for Named {
        fn init(&mut self, _ctx: OutputContext) -> Result<()> {
            Ok(())
        }
        fn close(&mut self) {}
        fn set_paused(&mut self, _paused: bool) {}
        fn empty_sample_count(&self) -> usize {
            0
        }
        fn ident(&self) -> &'static str {
            self.0
        }
        fn long_name(&self) -> &'static str {
            self.0
        }
    }

    #[test]
    fn test_null_module_is_first() {
        let registry = OutputRegistry::new();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.find_by_id(NULL_OUT_ID), OutputRegistry::NULL_INDEX);
        let null = registry.get(OutputRegistry::NULL_INDEX).unwrap();
        assert_eq!(null.ident(), "nullout");
        assert_eq!(null.long_name(), "No Sound (Emulate SPU2 only)");
        assert_eq!(null.empty_sample_count(), 0);
    }

    #[test]
    fn test_find_by_id_is_exact_and_case_sensitive() {
        let registry = OutputRegistry::new()
            .with_module(Box::new(Named("alsa")))
            .with_module(Box::new(Named("pulse")));
        assert_eq!(registry.find_by_id("pulse"), 2);
        assert_eq!(registry.find_by_id("Pulse"), registry.sentinel());
        assert_eq!(registry.find_by_id("puls"), registry.sentinel());
        assert_eq!(registry.find_by_id(""), registry.sentinel());
        assert_eq!(registry.sentinel(), 3);
        assert!(registry.get(registry.sentinel()).is_none());
    }

    #[test]
    fn test_first_match_wins() {
        let mut registry = OutputRegistry::new();
        let first = registry.register(Box::new(Named("dup")));
        registry.register(Box::new(Named("dup")));
        assert_eq!(registry.find_by_id("dup"), first);
    }

    #[test]
    fn test_iter_preserves_order() {
        let registry = OutputRegistry::new().with_module(Box::new(Named("a")));
        let idents: Vec<_> = registry.iter().map(|m| m.ident()).collect();
        assert_eq!(idents, vec!["nullout", "a"]);
        assert_eq!(format!("{registry:?}"), r#"["nullout", "a"]"#);
    }
}
