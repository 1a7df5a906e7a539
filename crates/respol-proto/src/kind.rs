//! Resource kinds and kind masks.
//!
//! A [`ResourceKind`] names one arbitrated capability. The manager talks in
//! masks ([`ResourceKinds`]): which kinds a set asks for, which are optional,
//! which were granted, which became free. Bit `n` of a mask is the kind with
//! wire code `n`.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::errors::ProtocolError;

/// A hardware-bound capability arbitrated by the policy manager.
///
/// Discriminants are the wire codes and never change.
#[repr(u8)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize_repr, Deserialize_repr,
)]
pub enum ResourceKind {
    /// Audio output path
    AudioPlayback = 0,
    /// Video output path (overlay, decoder)
    VideoPlayback = 1,
    /// Audio capture path
    AudioRecorder = 2,
    /// Video capture path (camera)
    VideoRecorder = 3,
    /// Vibration motor
    Vibra = 4,
    /// Indicator LEDs
    Leds = 5,
    /// Display backlight
    Backlight = 6,
    /// System (power) button
    SystemButton = 7,
    /// Lock slider or button
    LockButton = 8,
    /// Volume/zoom rocker
    ScaleButton = 9,
    /// Camera shutter button
    SnapButton = 10,
    /// Camera lens cover sensor
    LensCover = 11,
    /// Wired headset buttons
    HeadsetButtons = 12,
}

impl ResourceKind {
    /// Every kind, in wire code order.
    pub const ALL: [Self; 13] = [
        Self::AudioPlayback,
        Self::VideoPlayback,
        Self::AudioRecorder,
        Self::VideoRecorder,
        Self::Vibra,
        Self::Leds,
        Self::Backlight,
        Self::SystemButton,
        Self::LockButton,
        Self::ScaleButton,
        Self::SnapButton,
        Self::LensCover,
        Self::HeadsetButtons,
    ];

    /// Number of distinct kinds.
    pub const COUNT: usize = Self::ALL.len();

    /// Wire code of this kind.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Single-bit mask for this kind.
    pub const fn bit(self) -> ResourceKinds {
        ResourceKinds::from_bits_retain(1 << self as u32)
    }

    /// Name used by the manager in configuration and logs.
    pub const fn name(self) -> &'static str {
        match self {
            Self::AudioPlayback => "AudioPlayback",
            Self::VideoPlayback => "VideoPlayback",
            Self::AudioRecorder => "AudioRecorder",
            Self::VideoRecorder => "VideoRecorder",
            Self::Vibra => "Vibra",
            Self::Leds => "Leds",
            Self::Backlight => "Backlight",
            Self::SystemButton => "SystemButton",
            Self::LockButton => "LockButton",
            Self::ScaleButton => "ScaleButton",
            Self::SnapButton => "SnapButton",
            Self::LensCover => "LensCover",
            Self::HeadsetButtons => "HeadsetButtons",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u32> for ResourceKind {
    type Error = ProtocolError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        usize::try_from(code)
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
            .ok_or(ProtocolError::UnknownResourceKind(code))
    }
}

impl TryFrom<u8> for ResourceKind {
    type Error = ProtocolError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::try_from(u32::from(code))
    }
}

impl TryFrom<&str> for ResourceKind {
    type Error = ProtocolError;

    fn try_from(name: &str) -> Result<Self, Self::Error> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| ProtocolError::UnknownResourceKindName(name.to_string()))
    }
}

bitflags! {
    /// Set of resource kinds, one bit per [`ResourceKind`] wire code.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ResourceKinds: u32 {
        /// [`ResourceKind::AudioPlayback`]
        const AUDIO_PLAYBACK = 1 << 0;
        /// [`ResourceKind::VideoPlayback`]
        const VIDEO_PLAYBACK = 1 << 1;
        /// [`ResourceKind::AudioRecorder`]
        const AUDIO_RECORDER = 1 << 2;
        /// [`ResourceKind::VideoRecorder`]
        const VIDEO_RECORDER = 1 << 3;
        /// [`ResourceKind::Vibra`]
        const VIBRA = 1 << 4;
        /// [`ResourceKind::Leds`]
        const LEDS = 1 << 5;
        /// [`ResourceKind::Backlight`]
        const BACKLIGHT = 1 << 6;
        /// [`ResourceKind::SystemButton`]
        const SYSTEM_BUTTON = 1 << 7;
        /// [`ResourceKind::LockButton`]
        const LOCK_BUTTON = 1 << 8;
        /// [`ResourceKind::ScaleButton`]
        const SCALE_BUTTON = 1 << 9;
        /// [`ResourceKind::SnapButton`]
        const SNAP_BUTTON = 1 << 10;
        /// [`ResourceKind::LensCover`]
        const LENS_COVER = 1 << 11;
        /// [`ResourceKind::HeadsetButtons`]
        const HEADSET_BUTTONS = 1 << 12;
    }
}

impl ResourceKinds {
    /// Whether `kind` is in the set.
    pub const fn has(self, kind: ResourceKind) -> bool {
        self.contains(kind.bit())
    }

    /// Kinds in the set, in wire code order. Unknown bits are skipped.
    pub fn kinds(self) -> impl Iterator<Item = ResourceKind> {
        ResourceKind::ALL.into_iter().filter(move |kind| self.has(*kind))
    }

    /// Kinds in the set collected into a vector.
    pub fn to_vec(self) -> Vec<ResourceKind> {
        self.kinds().collect()
    }
}

impl From<ResourceKind> for ResourceKinds {
    fn from(kind: ResourceKind) -> Self {
        kind.bit()
    }
}

impl FromIterator<ResourceKind> for ResourceKinds {
    fn from_iter<I: IntoIterator<Item = ResourceKind>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), |mask, kind| mask | kind.bit())
    }
}

impl<'a> FromIterator<&'a ResourceKind> for ResourceKinds {
    fn from_iter<I: IntoIterator<Item = &'a ResourceKind>>(iter: I) -> Self {
        iter.into_iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn codes_match_bit_positions() {
        for (index, kind) in ResourceKind::ALL.iter().enumerate() {
            assert_eq!(kind.code() as usize, index);
            assert_eq!(kind.bit().bits(), 1 << index);
        }
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert_eq!(ResourceKind::try_from(12u32), Ok(ResourceKind::HeadsetButtons));
        assert_eq!(ResourceKind::try_from(13u32), Err(ProtocolError::UnknownResourceKind(13)));
        assert_eq!(
            ResourceKind::try_from(u32::MAX),
            Err(ProtocolError::UnknownResourceKind(u32::MAX))
        );
    }

    #[test]
    fn names_parse_case_insensitively() {
        assert_eq!(ResourceKind::try_from("audioplayback"), Ok(ResourceKind::AudioPlayback));
        assert!(matches!(
            ResourceKind::try_from("Jukebox"),
            Err(ProtocolError::UnknownResourceKindName(_))
        ));
    }

    #[test]
    fn kinds_iterate_in_code_order_and_skip_unknown_bits() {
        let mask = ResourceKinds::from_bits_retain(
            ResourceKinds::LEDS.bits() | ResourceKinds::AUDIO_PLAYBACK.bits() | (1 << 31),
        );
        assert_eq!(mask.to_vec(), vec![ResourceKind::AudioPlayback, ResourceKind::Leds]);
    }

    proptest! {
        #[test]
        fn collecting_kinds_round_trips(
            indices in prop::collection::vec(0usize..ResourceKind::COUNT, 0..20),
        ) {
            let kinds: Vec<ResourceKind> = indices.iter().map(|i| ResourceKind::ALL[*i]).collect();
            let mask: ResourceKinds = kinds.iter().collect();

            for kind in ResourceKind::ALL {
                prop_assert_eq!(mask.has(kind), kinds.contains(&kind));
            }
        }
    }
}
