use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::str::FromStr;
use std::{fmt::Display, ops::Deref};

/// Block identifier. ULID strings sort by creation time, which keeps
/// "oldest wins" deduplication stable without a separate sequence column.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
pub struct BlockId(String);

impl Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BlockId {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(BlockId(s.to_string()))
    }
}

impl Deref for BlockId {
    type Target = String;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<&str> for BlockId {
    fn from(fr: &str) -> Self {
        BlockId(fr.to_string())
    }
}

impl From<String> for BlockId {
    fn from(fr: String) -> Self {
        BlockId(fr)
    }
}

impl From<BlockId> for String {
    fn from(fr: BlockId) -> Self {
        fr.0
    }
}

impl BlockId {
    #[inline]
    pub fn new() -> BlockId {
        BlockId(rusty_ulid::generate_ulid_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BlockId {
    fn default() -> Self {
        Self::new()
    }
}
