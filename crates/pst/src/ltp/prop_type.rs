//! [Property Data Types](https://learn.microsoft.com/en-us/openspecs/exchange_server_protocols/MS-OXCDATA/0c77892e-288e-435a-9c49-be1c20c7afdb)

use super::LtpError;

#[repr(u16)]
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum PropertyType {
    /// `PtypInteger16`: 2 bytes
    Integer16 = 0x0002,
    /// `PtypInteger32`: 4 bytes
    Integer32 = 0x0003,
    /// `PtypFloating32`: 4 bytes
    Floating32 = 0x0004,
    /// `PtypFloating64`: 8 bytes
    Floating64 = 0x0005,
    /// `PtypCurrency`: 8 bytes
    Currency = 0x0006,
    /// `PtypFloatingTime`: 8 bytes
    FloatingTime = 0x0007,
    /// `PtypErrorCode`: 4 bytes
    ErrorCode = 0x000A,
    /// `PtypObject`: the 4-byte value is always a [`crate::ndb::node_id::NodeId`] into the
    /// owning node's sub-node map, never a heap id, regardless of the usual HNID disambiguation.
    /// Used by attachment property 0x3701 to point at the embedded message or OLE storage node.
    Object = 0x000D,
    /// `PtypBoolean`: 1 byte, restricted to 1 or 0, stored as 2 bytes
    Boolean = 0x000B,
    /// `PtypInteger64`: 8 bytes
    Integer64 = 0x0014,
    /// `PtypString8`: NUL-terminated string in an externally specified codepage
    String8 = 0x001E,
    /// `PtypString`: NUL-terminated UTF-16LE string
    Unicode = 0x001F,
    /// `PtypTime`: 8-byte FILETIME
    Time = 0x0040,
    /// `PtypGuid`: 16 bytes
    Guid = 0x0048,
    /// `PtypBinary`: variable-length byte blob
    Binary = 0x0102,
    /// `PtypMultipleInteger32`: COUNT + that many [PropertyType::Integer32]
    MultipleInteger32 = 0x1003,
    /// `PtypMultipleString`: COUNT + that many [PropertyType::Unicode]
    MultipleUnicode = 0x101F,
    /// `PtypMultipleTime`: COUNT + that many [PropertyType::Time]
    MultipleTime = 0x1040,
    /// `PtypMultipleBinary`: COUNT + that many [PropertyType::Binary]
    MultipleBinary = 0x1102,
}

impl TryFrom<u16> for PropertyType {
    type Error = LtpError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x0002 => Ok(Self::Integer16),
            0x0003 => Ok(Self::Integer32),
            0x0004 => Ok(Self::Floating32),
            0x0005 => Ok(Self::Floating64),
            0x0006 => Ok(Self::Currency),
            0x0007 => Ok(Self::FloatingTime),
            0x000A => Ok(Self::ErrorCode),
            0x000D => Ok(Self::Object),
            0x000B => Ok(Self::Boolean),
            0x0014 => Ok(Self::Integer64),
            0x001E => Ok(Self::String8),
            0x001F => Ok(Self::Unicode),
            0x0040 => Ok(Self::Time),
            0x0048 => Ok(Self::Guid),
            0x0102 => Ok(Self::Binary),
            0x1003 => Ok(Self::MultipleInteger32),
            0x101F => Ok(Self::MultipleUnicode),
            0x1040 => Ok(Self::MultipleTime),
            0x1102 => Ok(Self::MultipleBinary),
            invalid => Err(LtpError::InvalidPropertyType(invalid)),
        }
    }
}

impl From<PropertyType> for u16 {
    fn from(value: PropertyType) -> Self {
        value as u16
    }
}

impl PropertyType {
    /// `Some(width)` for fixed-width scalar types storable inline in an 8-byte PC entry or a
    /// TC fixed-width column; `None` for variable-length types dereferenced through a HID/NID.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            Self::Integer16 => Some(2),
            Self::Integer32 | Self::Floating32 | Self::ErrorCode | Self::Object => Some(4),
            Self::Boolean => Some(2),
            Self::Floating64
            | Self::Currency
            | Self::FloatingTime
            | Self::Integer64
            | Self::Time => Some(8),
            Self::Guid => Some(16),
            Self::String8 | Self::Unicode | Self::Binary | Self::MultipleInteger32
            | Self::MultipleUnicode | Self::MultipleTime | Self::MultipleBinary => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_known_values() {
        for &value in &[0x0003_u16, 0x001F, 0x0102, 0x1102] {
            let ty = PropertyType::try_from(value).unwrap();
            assert_eq!(u16::from(ty), value);
        }
    }

    #[test]
    fn fixed_width_matches_scalar_types() {
        assert_eq!(PropertyType::Integer32.fixed_width(), Some(4));
        assert_eq!(PropertyType::Time.fixed_width(), Some(8));
        assert_eq!(PropertyType::Unicode.fixed_width(), None);
    }

    #[test]
    fn rejects_unknown_type() {
        assert!(matches!(
            PropertyType::try_from(0xFFFF),
            Err(LtpError::InvalidPropertyType(0xFFFF))
        ));
    }
}
