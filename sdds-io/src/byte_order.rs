use std::fmt::{Display, Formatter};
use std::str::FromStr;

use sdds_error::{SddsError, SddsResult, sdds_err};

/// The byte order of binary page data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    /// The byte order of the host.
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }

    pub const fn opposite(self) -> Self {
        match self {
            ByteOrder::Little => ByteOrder::Big,
            ByteOrder::Big => ByteOrder::Little,
        }
    }

    #[inline]
    pub fn is_native(self) -> bool {
        self == Self::native()
    }

    /// The spelling used by `!#` header comments and the `endian` attribute.
    pub const fn header_name(self) -> &'static str {
        match self {
            ByteOrder::Little => "little-endian",
            ByteOrder::Big => "big-endian",
        }
    }

    /// Accepts `little`, `big`, `little-endian` and `big-endian` in any case.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "little" | "little-endian" | "littleendian" => Some(ByteOrder::Little),
            "big" | "big-endian" | "bigendian" => Some(ByteOrder::Big),
            _ => None,
        }
    }
}

impl Default for ByteOrder {
    fn default() -> Self {
        Self::native()
    }
}

impl Display for ByteOrder {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.header_name())
    }
}

impl FromStr for ByteOrder {
    type Err = SddsError;

    fn from_str(s: &str) -> SddsResult<Self> {
        Self::parse(s).ok_or_else(|| sdds_err!("unknown byte order {:?}", s))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn opposite_is_involution() {
        for order in [ByteOrder::Little, ByteOrder::Big] {
            assert_ne!(order.opposite(), order);
            assert_eq!(order.opposite().opposite(), order);
        }
        assert!(ByteOrder::native().is_native());
        assert!(!ByteOrder::native().opposite().is_native());
    }

    #[test]
    fn parse_spellings() {
        assert_eq!(ByteOrder::parse("BIG"), Some(ByteOrder::Big));
        assert_eq!(ByteOrder::parse("little-endian"), Some(ByteOrder::Little));
        assert_eq!(ByteOrder::parse("middle"), None);
        assert!("middle".parse::<ByteOrder>().is_err());
        assert_eq!(ByteOrder::Big.to_string(), "big-endian");
    }
}
