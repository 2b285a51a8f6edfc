use std::io::{Read, Write};

use packedforest::error::Result;

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

/// Size in bytes of one node record: `left`, `feature`, `cut_value`, `right`
pub const RECORD_SIZE: usize = 20;

/// One entry of a packed bin
///
/// Children are indices into the bin. An index at or above the bin's number of internal nodes
/// points to one of the shared class entries, which store their class in `right`.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PackedNode {
    pub(crate) left: u32,
    pub(crate) feature: u32,
    pub(crate) cut_value: f64,
    pub(crate) right: u32,
}

impl PackedNode {
    pub(crate) fn internal(feature: u32, cut_value: f64) -> Self {
        PackedNode {
            left: 0,
            feature,
            cut_value,
            right: 0,
        }
    }

    pub(crate) fn class_leaf(class: u32) -> Self {
        PackedNode {
            left: 0,
            feature: 0,
            cut_value: 0.0,
            right: class,
        }
    }

    pub fn left(&self) -> u32 {
        self.left
    }

    pub fn right(&self) -> u32 {
        self.right
    }

    pub fn feature(&self) -> u32 {
        self.feature
    }

    pub fn cut_value(&self) -> f64 {
        self.cut_value
    }

    /// The entry an observation continues to, values at or below the cut go left
    #[inline]
    pub fn next(&self, value: f64) -> u32 {
        if value <= self.cut_value {
            self.left
        } else {
            self.right
        }
    }

    pub(crate) fn to_bytes(self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        buf[0..4].copy_from_slice(&self.left.to_le_bytes());
        buf[4..8].copy_from_slice(&self.feature.to_le_bytes());
        buf[8..16].copy_from_slice(&self.cut_value.to_le_bytes());
        buf[16..20].copy_from_slice(&self.right.to_le_bytes());
        buf
    }

    pub(crate) fn from_bytes(buf: &[u8; RECORD_SIZE]) -> Self {
        PackedNode {
            left: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            feature: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            cut_value: f64::from_le_bytes([
                buf[8], buf[9], buf[10], buf[11], buf[12], buf[13], buf[14], buf[15],
            ]),
            right: u32::from_le_bytes([buf[16], buf[17], buf[18], buf[19]]),
        }
    }

    pub(crate) fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }

    pub(crate) fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; RECORD_SIZE];
        reader.read_exact(&mut buf)?;
        Ok(Self::from_bytes(&buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_layout_is_little_endian() {
        let node = PackedNode {
            left: 1,
            feature: 2,
            cut_value: 1.5,
            right: 0x0102_0304,
        };
        let bytes = node.to_bytes();
        assert_eq!(&bytes[0..4], &[1, 0, 0, 0]);
        assert_eq!(&bytes[4..8], &[2, 0, 0, 0]);
        assert_eq!(&bytes[8..16], &1.5f64.to_le_bytes());
        assert_eq!(&bytes[16..20], &[4, 3, 2, 1]);
        assert_eq!(PackedNode::from_bytes(&bytes), node);
    }

    #[test]
    fn cut_value_goes_left() {
        let mut node = PackedNode::internal(0, 2.5);
        node.left = 3;
        node.right = 4;
        assert_eq!(node.next(2.5), 3);
        assert_eq!(node.next(-1.0), 3);
        assert_eq!(node.next(2.6), 4);
    }

    #[test]
    fn short_record_is_an_error() {
        let res = PackedNode::read_from(&mut &[0u8; 12][..]);
        assert!(res.is_err());
    }
}
