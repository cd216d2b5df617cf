//! Filesystem-wide parameters fixed at format time.

use std::fmt;
use std::str::FromStr;

use agro_types::{make_error_msg, Result, Status, StatusCode};
use serde::{Deserialize, Serialize};

/// One layer of the block stack, listed outermost first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockLayerKind {
    Base,
    Crc,
    Replication { factor: u32 },
}

impl fmt::Display for BlockLayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockLayerKind::Base => f.write_str("base"),
            BlockLayerKind::Crc => f.write_str("crc"),
            BlockLayerKind::Replication { factor } => write!(f, "rep={}", factor),
        }
    }
}

impl FromStr for BlockLayerKind {
    type Err = Status;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "base" => Ok(BlockLayerKind::Base),
            "crc" => Ok(BlockLayerKind::Crc),
            other => {
                let factor = other
                    .strip_prefix("rep=")
                    .and_then(|f| f.parse::<u32>().ok())
                    .ok_or_else(|| {
                        Status::with_message(
                            StatusCode::INVALID_ARG,
                            format!("unknown block layer {:?}", other),
                        )
                    })?;
                Ok(BlockLayerKind::Replication { factor })
            }
        }
    }
}

/// Ordered block layer stack, written `crc,rep=3,base`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockLayerSpec(pub Vec<BlockLayerKind>);

impl BlockLayerSpec {
    pub fn layers(&self) -> &[BlockLayerKind] {
        &self.0
    }
}

impl fmt::Display for BlockLayerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, layer) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", layer)?;
        }
        Ok(())
    }
}

impl FromStr for BlockLayerSpec {
    type Err = Status;

    fn from_str(s: &str) -> Result<Self> {
        s.split(',')
            .filter(|part| !part.trim().is_empty())
            .map(str::parse)
            .collect::<Result<Vec<_>>>()
            .map(BlockLayerSpec)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalMetadata {
    pub block_size: u64,
    pub default_block_spec: BlockLayerSpec,
}

impl GlobalMetadata {
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 || !self.block_size.is_power_of_two() {
            return make_error_msg(
                StatusCode::INVALID_ARG,
                format!("block size {} is not a power of two", self.block_size),
            );
        }
        if self.default_block_spec.0.is_empty() {
            return make_error_msg(StatusCode::INVALID_ARG, "empty default block spec");
        }
        for layer in self.default_block_spec.layers() {
            if let BlockLayerKind::Replication { factor: 0 } = layer {
                return make_error_msg(StatusCode::INVALID_ARG, "replication factor 0");
            }
        }
        Ok(())
    }

    pub fn pack(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            Status::with_message(
                StatusCode::DATA_CORRUPTION,
                format!("failed to serialize global metadata: {}", e),
            )
        })
    }

    pub fn unpack(value: &[u8]) -> Result<Self> {
        serde_json::from_slice(value).map_err(|e| {
            Status::with_message(
                StatusCode::DATA_CORRUPTION,
                format!("failed to deserialize global metadata: {}", e),
            )
        })
    }
}

impl Default for GlobalMetadata {
    fn default() -> Self {
        Self {
            block_size: 8 * 1024,
            default_block_spec: BlockLayerSpec(vec![BlockLayerKind::Crc, BlockLayerKind::Base]),
        }
    }
}
