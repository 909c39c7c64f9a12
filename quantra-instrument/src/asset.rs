use serde::{Deserialize, Deserializer, Serialize};
use smol_str::SmolStr;
use std::fmt::{Debug, Display, Formatter};

/// Asset name new type representing an uppercase currency identifier.
///
/// eg/ "BTC", "ETH", "USDT", etc
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub struct AssetName(SmolStr);

impl AssetName {
    /// Construct a new [`AssetName`], normalising the input to uppercase.
    pub fn new<S>(input: S) -> Self
    where
        S: AsRef<str>,
    {
        Self(SmolStr::new(input.as_ref().to_uppercase()))
    }
}

impl Debug for AssetName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for AssetName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for AssetName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AssetName {
    fn from(input: &str) -> Self {
        AssetName::new(input)
    }
}

impl<'de> Deserialize<'de> for AssetName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(AssetName::new)
    }
}
