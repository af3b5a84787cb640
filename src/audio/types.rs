//! Shared audio types used by the backend and every host
//!
//! This module contains platform-agnostic types for device and stream management.
//! NO platform-specific imports allowed here.

use std::fmt;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};

/// Speaker position flags used in a channel layout mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelMask(pub u32);

impl ChannelMask {
    pub const FRONT_LEFT: Self = Self(0x1);
    pub const FRONT_RIGHT: Self = Self(0x2);
    pub const FRONT_CENTER: Self = Self(0x4);
    pub const LOW_FREQUENCY: Self = Self(0x8);
    pub const BACK_LEFT: Self = Self(0x10);
    pub const BACK_RIGHT: Self = Self(0x20);
    pub const SIDE_LEFT: Self = Self(0x200);
    pub const SIDE_RIGHT: Self = Self(0x400);

    /// Front-left + front-right
    pub const STEREO: Self = Self(Self::FRONT_LEFT.0 | Self::FRONT_RIGHT.0);

    /// 7.1 surround: FL, FR, FC, LFE, BL, BR, SL, SR
    pub const SURROUND_7_1: Self = Self(
        Self::FRONT_LEFT.0
            | Self::FRONT_RIGHT.0
            | Self::FRONT_CENTER.0
            | Self::LOW_FREQUENCY.0
            | Self::BACK_LEFT.0
            | Self::BACK_RIGHT.0
            | Self::SIDE_LEFT.0
            | Self::SIDE_RIGHT.0,
    );

    /// Number of speaker positions present in the mask
    pub fn channel_count(self) -> u16 {
        self.0.count_ones() as u16
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ChannelMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Sample representation carried by the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleType {
    /// Signed integer PCM
    Pcm,
}

/// Negotiated stream format
///
/// Block alignment and byte rate are derived from the other fields and are
/// never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub valid_bits_per_sample: u16,
    pub channel_mask: ChannelMask,
    pub sample_type: SampleType,
}

impl StreamFormat {
    /// Bytes per frame (all channels of one sample instant)
    pub fn block_align(&self) -> u16 {
        self.channels * self.bits_per_sample / 8
    }

    /// Bytes consumed per second of playback
    pub fn avg_bytes_per_sec(&self) -> u32 {
        self.sample_rate * self.block_align() as u32
    }

    /// Bytes needed for `frames` frames
    pub fn bytes_for(&self, frames: u32) -> usize {
        frames as usize * self.block_align() as usize
    }
}

impl fmt::Display for StreamFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz, {} ch, {}-bit PCM (mask 0x{:X})",
            self.sample_rate, self.channels, self.bits_per_sample, self.channel_mask.0
        )
    }
}

/// Activity state of an endpoint as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    Active,
    Inactive,
}

/// Information about a render endpoint, valid only for the query that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Opaque endpoint identifier (host-specific format)
    pub id: String,
    /// Human-readable device name
    pub name: String,
    pub state: DeviceState,
}

impl DeviceDescriptor {
    pub fn is_active(&self) -> bool {
        self.state == DeviceState::Active
    }
}

/// Exclusive/shared mode configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExclusiveMode {
    /// Shared mode (default, mixed with other apps by the host)
    #[default]
    Shared,
    /// Exclusive mode (sole access to the device)
    Exclusive,
}

/// Static feature flags advertised by a backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Capabilities(pub u32);

impl Capabilities {
    pub const DEVICE_SELECTION: Self = Self(0x1);
    pub const EXCLUSIVE_MODE: Self = Self(0x2);
    pub const PLAY_PAUSE_FLUSH: Self = Self(0x4);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for Capabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Lifecycle state of an output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamState {
    Closed,
    Opening,
    Ready,
    Playing,
    Paused,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_masks() {
        assert_eq!(ChannelMask::STEREO.0, 0x3);
        assert_eq!(ChannelMask::SURROUND_7_1.0, 0x63F);
        assert_eq!(ChannelMask::STEREO.channel_count(), 2);
        assert_eq!(ChannelMask::SURROUND_7_1.channel_count(), 8);
        assert!(ChannelMask::SURROUND_7_1.contains(ChannelMask::STEREO));
    }

    #[test]
    fn test_derived_sizes() {
        let format = StreamFormat {
            channels: 8,
            sample_rate: 48000,
            bits_per_sample: 16,
            valid_bits_per_sample: 16,
            channel_mask: ChannelMask::SURROUND_7_1,
            sample_type: SampleType::Pcm,
        };
        assert_eq!(format.block_align(), 16);
        assert_eq!(format.avg_bytes_per_sec(), 768_000);
        assert_eq!(format.bytes_for(480), 7680);
    }

    #[test]
    fn test_capabilities_bits() {
        let caps = Capabilities::DEVICE_SELECTION | Capabilities::PLAY_PAUSE_FLUSH;
        assert!(caps.contains(Capabilities::DEVICE_SELECTION));
        assert!(!caps.contains(Capabilities::EXCLUSIVE_MODE));
        assert_eq!(caps.bits(), 0x5);
    }
}
