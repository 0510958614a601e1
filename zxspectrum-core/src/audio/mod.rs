//! Audio output plumbing: the stereo sample type and the lock-free ring
//! buffer the [`crate::machine::Machine`] drains audio callbacks from.

mod ring;

pub use ring::RingBuffer;

/// One stereo audio frame. AY output is currently mixed equally to both
/// channels; the split exists so a future ABC/ACB stereo mix doesn't need
/// an API change.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "snapshot", derive(serde::Serialize, serde::Deserialize))]
pub struct SoundSample {
    pub left: f32,
    pub right: f32,
}

impl SoundSample {
    pub fn mono(value: f32) -> Self {
        SoundSample { left: value, right: value }
    }
}
