/*
* Copyright 2018-2020 TON DEV SOLUTIONS LTD.
*
* Licensed under the SOFTWARE EVALUATION License (the "License"); you may not use
* this file except in compliance with the License.  You may obtain a copy of the
* License at: https://ton.dev/licenses
*
* Unless required by applicable law or agreed to in writing, software
* distributed under the License is distributed on an "AS IS" BASIS,
* WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
* See the License for the specific TON DEV software governing permissions and
* limitations under the License.
*/

use crate::{
    error::BlockError,
    Serializable, Deserializable,
};
use std::fmt::{self, Display, Formatter};
use ton_types::{
    fail, Result,
    BuilderData, IBitstring, SliceData, UInt256,
};

pub const MAX_SPLIT_DEPTH: u8 = 60;
pub const MASTERCHAIN_ID: i32 = -1;
pub const BASE_WORKCHAIN_ID: i32 = 0;
pub const INVALID_WORKCHAIN_ID: i32 = 0x8000_0000u32 as i32;
pub const SHARD_FULL: u64 = 0x8000_0000_0000_0000u64;

/// returns lowest set bit, i.e. 1010000 -> 10000
pub const fn lower_bit64(x: u64) -> u64 {
    x & x.wrapping_neg()
}

/// two's complement negation, used to build masks above a bit
pub const fn bits_negate64(x: u64) -> u64 {
    (!x).wrapping_add(1)
}

/// checks if two shard prefixes of one workchain cover common addresses
pub fn shard_is_ancestor(parent: u64, child: u64) -> bool {
    let x = lower_bit64(parent);
    let y = lower_bit64(child);
    x >= y && ((parent ^ child) & (bits_negate64(x) << 1)) == 0
}

pub fn shard_intersects(x: u64, y: u64) -> bool {
    let z = std::cmp::max(lower_bit64(x), lower_bit64(y));
    ((x ^ y) & (bits_negate64(z) << 1)) == 0
}

/// Address prefix of an account: workchain and the first 64 bits of its id
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct AccountIdPrefixFull {
    pub workchain_id: i32,
    pub prefix: u64,
}

impl Default for AccountIdPrefixFull {
    fn default() -> Self {
        Self {
            workchain_id: INVALID_WORKCHAIN_ID,
            prefix: 0,
        }
    }
}

impl AccountIdPrefixFull {
    pub fn any_masterchain() -> Self {
        Self {
            workchain_id: MASTERCHAIN_ID,
            prefix: 0,
        }
    }

    pub fn workchain(workchain_id: i32, prefix: u64) -> Self {
        Self { workchain_id, prefix }
    }

    pub fn is_valid(&self) -> bool {
        self.workchain_id != INVALID_WORKCHAIN_ID
    }

    pub fn is_masterchain(&self) -> bool {
        self.workchain_id == MASTERCHAIN_ID
    }

    /// Takes the first 64 bits of the account id
    pub fn prefix(workchain_id: i32, account_id: &UInt256) -> Self {
        let mut prefix = [0; 8];
        prefix.copy_from_slice(&account_id.as_slice()[..8]);
        Self {
            workchain_id,
            prefix: u64::from_be_bytes(prefix),
        }
    }

    pub fn checked_prefix(workchain_id: i32, account_id: &UInt256) -> Result<Self> {
        ShardIdent::check_workchain_id(workchain_id)?;
        Ok(Self::prefix(workchain_id, account_id))
    }

    /// Combines two address prefixes: the first `used_dest_bits` bits
    /// of the 96-bit string `workchain ‖ prefix` are taken from `dest`, the rest from `self`
    pub fn interpolate_addr(&self, dest: &Self, used_dest_bits: u8) -> Self {
        let d = used_dest_bits;
        if d == 0 {
            *self
        } else if d >= 96 {
            *dest
        } else if d >= 32 {
            let mask = u64::MAX >> (d - 32);
            Self {
                workchain_id: dest.workchain_id,
                prefix: (dest.prefix & !mask) | (self.prefix & mask),
            }
        } else {
            let mask = (-1i32 as u32 >> d) as i32;
            Self {
                workchain_id: (dest.workchain_id & !mask) | (self.workchain_id & mask),
                prefix: self.prefix,
            }
        }
    }

    /// Number of leading bits common for both 96-bit addresses
    pub fn count_matching_bits(&self, other: &Self) -> u8 {
        if self.workchain_id != other.workchain_id {
            return (self.workchain_id ^ other.workchain_id).leading_zeros() as u8
        }
        if self.prefix != other.prefix {
            return 32 + (self.prefix ^ other.prefix).leading_zeros() as u8
        }
        96
    }
}

impl fmt::Display for AccountIdPrefixFull {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{:016x}", self.workchain_id, self.prefix)
    }
}

/*
shard_ident$00
    shard_pfx_bits: (#<= 60)
    workchain_id: int32
    shard_prefix: uint64
= ShardIdent;
*/
#[derive(Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ShardIdent {
    workchain_id: i32,
    prefix: u64, // with terminated bit!
}

impl Default for ShardIdent {
    fn default() -> Self {
        ShardIdent {
            workchain_id: 0,
            prefix: SHARD_FULL,
        }
    }
}

impl ShardIdent {
    pub const fn masterchain() -> Self {
        ShardIdent {
            workchain_id: MASTERCHAIN_ID,
            prefix: SHARD_FULL,
        }
    }

    pub const fn full(workchain_id: i32) -> Self {
        ShardIdent {
            workchain_id,
            prefix: SHARD_FULL,
        }
    }

    /// Marker of a shard which was consumed by a merge
    pub const fn invalid() -> Self {
        ShardIdent {
            workchain_id: INVALID_WORKCHAIN_ID,
            prefix: 0,
        }
    }

    pub fn with_prefix_len(shard_pfx_len: u8, workchain_id: i32, shard_prefix: u64) -> Result<Self> {
        if shard_pfx_len > MAX_SPLIT_DEPTH {
            fail!(BlockError::InvalidArg(
                format!("Shard prefix length can't greater than {}", MAX_SPLIT_DEPTH)
            ))
        }
        Self::check_workchain_id(workchain_id)?;
        // bits below the prefix are ignored
        let shard_prefix = match shard_pfx_len {
            0 => 0,
            len => shard_prefix & !(u64::MAX >> len)
        };
        Ok(ShardIdent {
            workchain_id,
            prefix: Self::add_tag(shard_prefix, shard_pfx_len),
        })
    }

    pub fn with_tagged_prefix(workchain_id: i32, shard_prefix_tagged: u64) -> Result<Self> {
        if shard_prefix_tagged == 0 || (shard_prefix_tagged & (!0 >> (MAX_SPLIT_DEPTH + 1))) != 0 {
            fail!(BlockError::InvalidArg(
                format!("Shard prefix {:016x} is invalid or longer than {}", shard_prefix_tagged, MAX_SPLIT_DEPTH)
            ))
        }
        Self::check_workchain_id(workchain_id)?;
        Ok(ShardIdent {
            workchain_id,
            prefix: shard_prefix_tagged,
        })
    }

    /// Builds shard from the bits of its trie path
    pub fn with_prefix_slice(workchain_id: i32, mut shard_prefix_slice: SliceData) -> Result<Self> {
        let mut shard_pfx_bits = 0;
        let mut shard_prefix = 0;
        while shard_prefix_slice.remaining_bits() != 0 {
            if shard_pfx_bits >= MAX_SPLIT_DEPTH {
                fail!(BlockError::InvalidArg(
                    format!("Shard prefix length can't greater than {}", MAX_SPLIT_DEPTH)
                ))
            }
            let bit = shard_prefix_slice.get_next_bit()?;
            shard_pfx_bits += 1;
            shard_prefix |= (bit as u64) << (64 - shard_pfx_bits);
        }
        Self::with_prefix_len(shard_pfx_bits, workchain_id, shard_prefix)
    }

    pub fn with_workchain_id(workchain_id: i32) -> Result<Self> {
        Self::check_workchain_id(workchain_id)?;
        Ok(Self::full(workchain_id))
    }

    pub fn check_workchain_id(workchain_id: i32) -> Result<()> {
        if workchain_id == INVALID_WORKCHAIN_ID {
            fail!(BlockError::InvalidArg(
                format!("Workchain id 0x{:x} is invalid", INVALID_WORKCHAIN_ID)
            ))
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.workchain_id != INVALID_WORKCHAIN_ID && self.prefix != 0
    }

    /// Bitstring key of the shard inside its workchain's binary tree
    pub fn shard_key(&self) -> Result<SliceData> {
        let mut cell = BuilderData::new();
        let len = self.prefix_len() as usize;
        if len != 0 {
            cell.append_bits((self.prefix >> (64 - len)) as usize, len)?;
        }
        SliceData::load_builder(cell)
    }

    /// 96-bit key: workchain and untagged prefix
    pub fn full_key(&self) -> Result<SliceData> {
        let mut cell = BuilderData::new();
        cell.append_i32(self.workchain_id)?;
        cell.append_u64(self.shard_prefix_without_tag())?;
        SliceData::load_builder(cell)
    }

    pub fn workchain_id(&self) -> i32 {
        self.workchain_id
    }

    pub fn is_child_for(&self, parent: &ShardIdent) -> bool {
        parent.is_parent_for(self)
    }

    pub fn is_parent_for(&self, child: &ShardIdent) -> bool {
        self.workchain_id == child.workchain_id && !child.is_full()
            && self.prefix == Self::parent_prefix(child.prefix)
    }

    /// strict ancestry
    pub fn is_ancestor_for(&self, descendant: &ShardIdent) -> bool {
        self.workchain_id == descendant.workchain_id
            && self.prefix != descendant.prefix
            && shard_is_ancestor(self.prefix, descendant.prefix)
    }

    /// equal shard or ancestor
    pub fn is_ancestor_or_equal(&self, descendant: &ShardIdent) -> bool {
        self.workchain_id == descendant.workchain_id
            && shard_is_ancestor(self.prefix, descendant.prefix)
    }

    pub fn is_sibling_for(&self, other: &ShardIdent) -> bool {
        self.workchain_id == other.workchain_id && !self.is_full()
            && self.prefix ^ other.prefix == lower_bit64(self.prefix) << 1
    }

    pub fn intersect_with(&self, other: &ShardIdent) -> bool {
        self.workchain_id == other.workchain_id && shard_intersects(self.prefix, other.prefix)
    }

    /// The deeper of two intersecting shards
    pub fn intersection(&self, other: &ShardIdent) -> Option<ShardIdent> {
        if !self.intersect_with(other) {
            return None
        }
        if lower_bit64(self.prefix) < lower_bit64(other.prefix) {
            Some(*self)
        } else {
            Some(*other)
        }
    }

    /// Neighbor shards differ in a single hex digit of their common prefix part
    pub fn is_neighbor_for(&self, other: &Self) -> bool {
        if self.is_masterchain() || other.is_masterchain() {
            return true
        }
        let z = std::cmp::max(lower_bit64(self.prefix), lower_bit64(other.prefix));
        let z = (self.prefix ^ other.prefix) & bits_negate64(z << 1);
        if z == 0 {
            return true
        }
        if self.workchain_id != other.workchain_id {
            return false
        }
        let c1 = z.leading_zeros() >> 2;
        let c2 = z.trailing_zeros() >> 2;
        c1 + c2 == 15
    }

    pub fn can_split(&self) -> bool {
        self.prefix_len() < MAX_SPLIT_DEPTH
    }

    pub fn is_full(&self) -> bool {
        self.prefix == SHARD_FULL
    }

    pub fn is_masterchain(&self) -> bool {
        self.workchain_id == MASTERCHAIN_ID
    }

    /// Checks if the account address belongs to the shard
    pub fn contains_account(&self, mut acc_addr: SliceData) -> Result<bool> {
        Ok(if self.prefix == SHARD_FULL {
            true
        } else {
            let len = self.prefix_len();
            let addr_pfx = acc_addr.get_next_int(len as usize)?;
            let shard_pfx = self.prefix >> (64 - len);
            addr_pfx == shard_pfx
        })
    }

    pub fn contains_full_prefix(&self, prefix: &AccountIdPrefixFull) -> bool {
        self.contains_prefix(prefix.workchain_id, prefix.prefix)
    }

    pub fn contains_prefix(&self, workchain_id: i32, prefix_without_tag: u64) -> bool {
        if self.workchain_id == workchain_id {
            if self.prefix == SHARD_FULL {
                return true
            }
            let shift = 64 - self.prefix_len();
            return self.prefix >> shift == prefix_without_tag >> shift
        }
        false
    }

    pub fn shard_prefix_as_str_with_tag(&self) -> String {
        format!("{:016x}", self.shard_prefix_with_tag())
    }

    pub fn shard_prefix_with_tag(&self) -> u64 {
        self.prefix
    }

    pub fn shard_prefix_without_tag(self) -> u64 {
        self.prefix - lower_bit64(self.prefix)
    }

    pub fn sibling(&self) -> ShardIdent {
        Self {
            workchain_id: self.workchain_id,
            prefix: self.prefix ^ (lower_bit64(self.prefix) << 1),
        }
    }

    fn parent_prefix(prefix: u64) -> u64 {
        let lb = lower_bit64(prefix);
        (prefix - lb) | (lb << 1)
    }

    /// Parent shard
    pub fn merge(&self) -> Result<ShardIdent> {
        if self.prefix == SHARD_FULL {
            fail!(BlockError::InvalidArg(
                format!("Can't merge shard {}", self.shard_prefix_as_str_with_tag())
            ))
        }
        Ok(ShardIdent {
            workchain_id: self.workchain_id,
            prefix: Self::parent_prefix(self.prefix),
        })
    }

    pub fn split(&self) -> Result<(ShardIdent, ShardIdent)> {
        if !self.can_split() {
            fail!(BlockError::InvalidArg(
                format!("Can't split shard {}, because of max split depth is {}",
                    self.shard_prefix_as_str_with_tag(), MAX_SPLIT_DEPTH)
            ))
        }
        let lb = lower_bit64(self.prefix) >> 1;
        Ok((
            ShardIdent {
                workchain_id: self.workchain_id,
                prefix: self.prefix - lb,
            },
            ShardIdent {
                workchain_id: self.workchain_id,
                prefix: self.prefix + lb,
            }
        ))
    }

    pub fn left_child(&self) -> Result<ShardIdent> {
        Ok(self.split()?.0)
    }

    pub fn right_child(&self) -> Result<ShardIdent> {
        Ok(self.split()?.1)
    }

    /// true for the left (0) child of its parent
    pub fn is_left_child(&self) -> bool {
        !self.is_full() && self.prefix & (lower_bit64(self.prefix) << 1) == 0
    }

    fn add_tag(prefix: u64, len: u8) -> u64 { prefix | (1 << (63 - len)) }

    pub fn prefix_len(&self) -> u8 {
        63u8.saturating_sub(self.prefix.trailing_zeros() as u8)
    }
}

impl Display for ShardIdent {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.workchain_id, self.shard_prefix_as_str_with_tag())
    }
}

impl fmt::Debug for ShardIdent {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.workchain_id, self.shard_prefix_as_str_with_tag())
    }
}

impl Deserializable for ShardIdent {
    fn read_from(&mut self, cell: &mut SliceData) -> Result<()> {
        let constructor_and_pfx = cell.get_next_byte()?;
        // check for 2 high bits to be zero
        if constructor_and_pfx & 0xC0 != 0 {
            fail!(BlockError::InvalidData(
                "2 high bits in ShardIdent's first byte have to be zero".to_string()
            ))
        }
        let shard_pfx_bits = constructor_and_pfx & 0x3F;
        let workchain_id = cell.get_next_i32()?;
        let shard_prefix = cell.get_next_u64()?;
        *self = Self::with_prefix_len(shard_pfx_bits, workchain_id, shard_prefix)?;
        Ok(())
    }
}

impl Serializable for ShardIdent {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        self.prefix_len().write_to(cell)?;
        self.workchain_id.write_to(cell)?;
        self.shard_prefix_without_tag().write_to(cell)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/test_shard.rs"]
mod tests;
