use x86_64::instructions::tlb;

/// Anything caching virtual-to-physical translations.
pub trait TranslationCache {
    /// Discards every cached non-global translation.
    fn flush_all(&mut self);
}

/// The processor's TLB. Flushing reloads CR3 with its own value; with a
/// single core there is nobody else to shoot down.
#[derive(Debug, Default, Clone, Copy)]
pub struct HardwareTlb;

impl TranslationCache for HardwareTlb {
    fn flush_all(&mut self) {
        tlb::flush_all();
    }
}
