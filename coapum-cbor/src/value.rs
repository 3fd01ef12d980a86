//! Generic CBOR value tree

/// A decoded CBOR data item.
///
/// Maps keep their entries in encounter order and do not enforce key
/// uniqueness; [`CborValue::get`] resolves duplicates last-write-wins.
#[derive(Debug, Clone, PartialEq)]
pub enum CborValue {
    /// Major type 0
    Unsigned(u64),
    /// Major type 1, holding `n` for the value `-1 - n`
    Negative(u64),
    /// Major type 2, indefinite-length chunks already concatenated
    ByteString(Vec<u8>),
    /// Major type 3, indefinite-length chunks already concatenated
    TextString(String),
    /// Major type 4
    Array(Vec<CborValue>),
    /// Major type 5
    Map(Vec<(CborValue, CborValue)>),
    Bool(bool),
    Null,
    Undefined,
    /// Half, single and double precision floats, widened to `f64`
    Float(f64),
    /// Major type 6; the tag number is kept but not interpreted
    Tag(u64, Box<CborValue>),
}

impl CborValue {
    /// Integer value of major types 0 and 1
    pub fn as_integer(&self) -> Option<i128> {
        match self {
            Self::Unsigned(n) => Some(i128::from(*n)),
            Self::Negative(n) => Some(-1 - i128::from(*n)),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::TextString(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::ByteString(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[CborValue]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(CborValue, CborValue)]> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Self::Map(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Look up a text key in a map. The last matching entry wins.
    pub fn get(&self, key: &str) -> Option<&CborValue> {
        self.as_map()?
            .iter()
            .rev()
            .find(|(k, _)| k.as_text() == Some(key))
            .map(|(_, v)| v)
    }

    /// Strip any number of tags and return the tagged content
    pub fn untagged(&self) -> &CborValue {
        let mut value = self;
        while let Self::Tag(_, inner) = value {
            value = inner;
        }
        value
    }

    /// Short human-readable name of the variant, used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unsigned(_) => "unsigned integer",
            Self::Negative(_) => "negative integer",
            Self::ByteString(_) => "byte string",
            Self::TextString(_) => "text string",
            Self::Array(_) => "array",
            Self::Map(_) => "map",
            Self::Bool(_) => "bool",
            Self::Null => "null",
            Self::Undefined => "undefined",
            Self::Float(_) => "float",
            Self::Tag(..) => "tag",
        }
    }
}

impl From<u64> for CborValue {
    fn from(n: u64) -> Self {
        Self::Unsigned(n)
    }
}

impl From<i64> for CborValue {
    fn from(n: i64) -> Self {
        if n >= 0 {
            Self::Unsigned(n as u64)
        } else {
            Self::Negative((-1 - n) as u64)
        }
    }
}

impl From<f64> for CborValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for CborValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for CborValue {
    fn from(s: &str) -> Self {
        Self::TextString(s.to_string())
    }
}

impl From<String> for CborValue {
    fn from(s: String) -> Self {
        Self::TextString(s)
    }
}

impl From<Vec<u8>> for CborValue {
    fn from(b: Vec<u8>) -> Self {
        Self::ByteString(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_conversions() {
        assert_eq!(CborValue::from(-1i64), CborValue::Negative(0));
        assert_eq!(CborValue::from(-500i64).as_integer(), Some(-500));
        assert_eq!(CborValue::Negative(u64::MAX).as_integer(), Some(-(1i128 << 64)));
    }

    #[test]
    fn test_map_get_is_last_write_wins() {
        let map = CborValue::Map(vec![
            ("a".into(), CborValue::Unsigned(1)),
            ("b".into(), CborValue::Unsigned(2)),
            ("a".into(), CborValue::Unsigned(3)),
        ]);
        assert_eq!(map.get("a"), Some(&CborValue::Unsigned(3)));
        assert_eq!(map.get("b"), Some(&CborValue::Unsigned(2)));
        assert_eq!(map.get("c"), None);
        assert_eq!(CborValue::Null.get("a"), None);
    }

    #[test]
    fn test_untagged() {
        let value = CborValue::Tag(
            1,
            Box::new(CborValue::Tag(55799, Box::new(CborValue::Unsigned(7)))),
        );
        assert_eq!(value.untagged(), &CborValue::Unsigned(7));
        assert_eq!(value.kind(), "tag");
    }
}
