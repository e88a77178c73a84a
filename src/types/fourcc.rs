//! V4L2 pixel format codes

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Four-character pixel format code, stored little-endian as V4L2 does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCc(pub [u8; 4]);

impl FourCc {
    pub const YUYV: FourCc = FourCc(*b"YUYV");
    pub const MJPG: FourCc = FourCc(*b"MJPG");
    pub const NV12: FourCc = FourCc(*b"NV12");

    /// Packed `u32` form used in `v4l2_pix_format.pixelformat`
    pub fn as_u32(self) -> u32 {
        u32::from_le_bytes(self.0)
    }

    pub fn from_u32(raw: u32) -> Self {
        FourCc(raw.to_le_bytes())
    }
}

impl Default for FourCc {
    fn default() -> Self {
        FourCc::YUYV
    }
}

impl std::fmt::Display for FourCc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for &b in &self.0 {
            let c = if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' };
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for FourCc {
    type Err = crate::RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes: [u8; 4] = s.as_bytes().try_into().map_err(|_| {
            crate::RelayError::config_invalid(format!("fourcc '{}' must be 4 ASCII bytes", s))
        })?;
        Ok(FourCc(bytes))
    }
}

impl Serialize for FourCc {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FourCc {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
