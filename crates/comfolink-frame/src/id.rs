use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use crate::error::FrameError;

/// Size of an endpoint identifier on the wire.
pub const ID_SIZE: usize = 16;

/// A 16-byte endpoint identifier carried in every envelope header.
///
/// The client picks one for itself once per process; the device reports its
/// own through discovery. Textual form is 32 lowercase hex digits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeviceId([u8; ID_SIZE]);

impl DeviceId {
    /// All-zero identifier, used before the device identifier is known.
    pub const NIL: DeviceId = DeviceId([0; ID_SIZE]);

    pub const fn from_bytes(bytes: [u8; ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Generate a random identifier for this client.
    pub fn random() -> Self {
        Self(*Uuid::new_v4().as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; ID_SIZE] {
        &self.0
    }

    pub fn is_nil(&self) -> bool {
        self.0 == [0; ID_SIZE]
    }
}

impl TryFrom<&[u8]> for DeviceId {
    type Error = FrameError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; ID_SIZE] = value.try_into().map_err(|_| {
            FrameError::InvalidId(format!("expected {ID_SIZE} bytes, got {}", value.len()))
        })?;
        Ok(Self(bytes))
    }
}

impl FromStr for DeviceId {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::parse_str(s.trim()).map_err(|err| FrameError::InvalidId(err.to_string()))?;
        Ok(Self(*uuid.as_bytes()))
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Uuid::from_bytes(self.0).simple())
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceId({self})")
    }
}
