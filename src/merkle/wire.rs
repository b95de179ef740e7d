//! Binary and JSON encodings of [`MerklePath`].
//!
//! Binary:
//!
//! ```text
//! VarInt block_height
//! VarInt index
//! VarInt sibling_count
//! sibling_count * { side: u8 (0 = left, 1 = right), digest: [u8; 32] raw order }
//! ```
//!
//! JSON:
//!
//! ```json
//! {"blockHeight":813706,"index":3,"siblings":[{"digest":"<display hex>","side":"left"}]}
//! ```
//!
//! Both decoders are strict so that re-encoding an unmodified path gives back
//! the exact input: varints must be minimal and no trailing data is allowed,
//! and JSON digests must be 64 lower-case hex characters.
use std::str::FromStr;

use bitcoin::{
    consensus::encode::{self, deserialize_partial, serialize, VarInt},
    hashes::Hash,
    TxMerkleNode,
};
use serde::{Deserialize, Serialize};

use super::{MerklePath, MerkleStep, Side};
use crate::error::PathError;

const SIDE_LEFT: u8 = 0;
const SIDE_RIGHT: u8 = 1;
const STEP_SIZE: usize = 1 + 32;

impl MerklePath {
    /// Binary encoding.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(3 * 9 + self.steps.len() * STEP_SIZE);
        out.extend(serialize(&VarInt(u64::from(self.block_height))));
        out.extend(serialize(&VarInt(self.index)));
        out.extend(serialize(&VarInt(self.steps.len() as u64)));
        for step in &self.steps {
            out.push(match step.side {
                Side::Left => SIDE_LEFT,
                Side::Right => SIDE_RIGHT,
            });
            out.extend_from_slice(step.sibling.as_byte_array());
        }
        out
    }

    /// Decode the binary encoding. The whole input must be consumed.
    pub fn from_bytes(data: &[u8]) -> Result<Self, PathError> {
        let mut r = Reader { data, pos: 0 };
        let height = r.varint("block height")?;
        let block_height = u32::try_from(height).map_err(|_| PathError::HeightOutOfRange(height))?;
        let index = r.varint("index")?;
        let count = r.varint("sibling count")?;
        if count > (r.remaining() / STEP_SIZE) as u64 {
            return Err(PathError::Truncated { field: "siblings" });
        }

        let mut steps = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let side = match r.byte("side")? {
                SIDE_LEFT => Side::Left,
                SIDE_RIGHT => Side::Right,
                other => return Err(PathError::InvalidSide(other)),
            };
            let sibling = TxMerkleNode::from_byte_array(r.digest("sibling")?);
            steps.push(MerkleStep { sibling, side });
        }

        if r.remaining() != 0 {
            return Err(PathError::TrailingBytes(r.remaining()));
        }
        Ok(Self::new(block_height, index, steps))
    }

    /// Hex of [`MerklePath::to_bytes`].
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Decode from hex of the binary encoding.
    pub fn from_hex(s: &str) -> Result<Self, PathError> {
        Self::from_bytes(&hex::decode(s.trim())?)
    }

    /// Compact JSON encoding.
    pub fn to_json(&self) -> Result<String, PathError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode the JSON encoding.
    pub fn from_json(s: &str) -> Result<Self, PathError> {
        Ok(serde_json::from_str(s)?)
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn varint(&mut self, field: &'static str) -> Result<u64, PathError> {
        let (VarInt(v), used) =
            deserialize_partial::<VarInt>(&self.data[self.pos..]).map_err(|e| match e {
                encode::Error::Io(_) => PathError::Truncated { field },
                other => PathError::InvalidVarInt {
                    field,
                    reason: other.to_string(),
                },
            })?;
        self.pos += used;
        Ok(v)
    }

    fn byte(&mut self, field: &'static str) -> Result<u8, PathError> {
        let b = *self
            .data
            .get(self.pos)
            .ok_or(PathError::Truncated { field })?;
        self.pos += 1;
        Ok(b)
    }

    fn digest(&mut self, field: &'static str) -> Result<[u8; 32], PathError> {
        let end = self.pos + 32;
        let slice = self
            .data
            .get(self.pos..end)
            .ok_or(PathError::Truncated { field })?;
        let mut out = [0u8; 32];
        out.copy_from_slice(slice);
        self.pos = end;
        Ok(out)
    }
}

/// Serde shape of the JSON encoding.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct JsonPath {
    block_height: u32,
    index: u64,
    siblings: Vec<JsonStep>,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct JsonStep {
    digest: String,
    side: Side,
}

impl From<MerklePath> for JsonPath {
    fn from(p: MerklePath) -> Self {
        Self {
            block_height: p.block_height,
            index: p.index,
            siblings: p
                .steps
                .into_iter()
                .map(|s| JsonStep {
                    digest: s.sibling.to_string(),
                    side: s.side,
                })
                .collect(),
        }
    }
}

impl TryFrom<JsonPath> for MerklePath {
    type Error = PathError;

    fn try_from(j: JsonPath) -> Result<Self, Self::Error> {
        let steps = j
            .siblings
            .into_iter()
            .map(|s| {
                if !is_lower_hex(&s.digest) {
                    return Err(PathError::InvalidDigest(s.digest));
                }
                TxMerkleNode::from_str(&s.digest)
                    .map(|sibling| MerkleStep {
                        sibling,
                        side: s.side,
                    })
                    .map_err(|_| PathError::InvalidDigest(s.digest))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(j.block_height, j.index, steps))
    }
}

// The encoder only emits lower case; anything else would not re-encode identically.
fn is_lower_hex(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
