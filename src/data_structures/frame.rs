use std::num::NonZeroU64;

/// Identifies one iteration of the render loop.
///
/// Stamps start at 1 and only ever grow; zero is not representable, which is
/// what lets caches use `Option<FrameStamp>` with `None` meaning "never
/// computed".
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameStamp(NonZeroU64);

impl FrameStamp {
    pub const FIRST: FrameStamp = FrameStamp(NonZeroU64::MIN);

    pub fn get(self) -> u64 {
        self.0.get()
    }

    /// The stamp of the following frame. Saturates instead of wrapping.
    pub fn next(self) -> Self {
        FrameStamp(self.0.saturating_add(1))
    }
}

impl Default for FrameStamp {
    fn default() -> Self {
        Self::FIRST
    }
}
