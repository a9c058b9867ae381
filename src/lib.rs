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

pub mod error;
pub use self::error::*;

#[macro_use]
pub mod types;
pub use self::types::*;

#[macro_use]
pub mod hashmapaug;
pub use self::hashmapaug::*;

pub mod shard;
pub use self::shard::*;

pub mod address;
pub use self::address::*;

pub mod blocks;
pub use self::blocks::*;

pub mod outbound_messages;
pub use self::outbound_messages::*;

pub mod out_queue_merger;
pub use self::out_queue_merger::*;

pub mod processed_upto;
pub use self::processed_upto::*;

pub mod shard_accounts;
pub use self::shard_accounts::*;

pub mod shard_state;
pub use self::shard_state::*;

pub mod bintree;
pub use self::bintree::*;

pub mod master;
pub use self::master::*;

pub mod shard_config;
pub use self::shard_config::*;

pub mod config_params;
pub use self::config_params::*;

pub mod validators;
pub use self::validators::*;

pub mod limits;
pub use self::limits::*;

pub mod signature;
pub use self::signature::*;

pub mod merkle_update;
pub use self::merkle_update::*;

pub mod merkle_proof;
pub use self::merkle_proof::*;

pub mod block_proof;
pub use self::block_proof::*;

use ton_types::{BuilderData, Cell, IBitstring, Result, SliceData, UInt256};

pub trait Serializable {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()>;

    fn write_to_new_cell(&self) -> Result<BuilderData> {
        let mut cell = BuilderData::new();
        self.write_to(&mut cell)?;
        Ok(cell)
    }

    /// Serializes into a standalone cell
    fn serialize(&self) -> Result<Cell> {
        self.write_to_new_cell()?.into_cell()
    }

    /// Serializes into a bitstring usable as a dictionary key
    fn write_to_bitstring(&self) -> Result<SliceData> {
        SliceData::load_builder(self.write_to_new_cell()?)
    }
}

pub trait Deserializable: Default {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        let mut x = Self::default();
        x.read_from(slice)?;
        Ok(x)
    }

    fn construct_from_cell(cell: Cell) -> Result<Self> {
        Self::construct_from(&mut SliceData::load_cell(cell)?)
    }

    /// Reads the next reference of `slice` as a standalone object
    fn construct_from_reference(slice: &mut SliceData) -> Result<Self> {
        Self::construct_from_cell(slice.checked_drain_reference()?)
    }

    // Override either this or `construct_from`
    fn read_from(&mut self, slice: &mut SliceData) -> Result<()> {
        *self = Self::construct_from(slice)?;
        Ok(())
    }
}

pub trait MaybeSerialize {
    fn write_maybe_to(&self, cell: &mut BuilderData) -> Result<()>;
}

impl<T: Serializable> MaybeSerialize for Option<T> {
    fn write_maybe_to(&self, cell: &mut BuilderData) -> Result<()> {
        match self {
            Some(x) => {
                cell.append_bit_one()?;
                x.write_to(cell)?;
            }
            None => {
                cell.append_bit_zero()?;
            }
        }
        Ok(())
    }
}

pub trait MaybeDeserialize {
    fn read_maybe_from<T: Deserializable>(slice: &mut SliceData) -> Result<Option<T>> {
        match slice.get_next_bit()? {
            true => Ok(Some(T::construct_from(slice)?)),
            false => Ok(None)
        }
    }
}

impl<T: Deserializable> MaybeDeserialize for T {}

pub trait GetRepresentationHash: Serializable {
    fn hash(&self) -> Result<UInt256> {
        Ok(self.serialize()?.repr_hash())
    }
}

impl<T: Serializable> GetRepresentationHash for T {}

impl Deserializable for Cell {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        slice.checked_drain_reference()
    }
}

impl Serializable for Cell {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        cell.checked_append_reference(self.clone())?;
        Ok(())
    }
}

impl Deserializable for UInt256 {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        slice.get_next_hash()
    }
}

impl Serializable for UInt256 {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        cell.append_raw(self.as_slice(), 256)?;
        Ok(())
    }
}

// Value of dictionaries used as plain sets
impl Serializable for () {
    fn write_to(&self, _cell: &mut BuilderData) -> Result<()> {
        Ok(())
    }
}

impl Deserializable for () {
    fn read_from(&mut self, _slice: &mut SliceData) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn write_read_and_assert<T>(s: T) -> T
where T: Serializable + Deserializable + std::fmt::Debug + PartialEq {
    let cell = s.serialize().unwrap();
    let s2 = T::construct_from_cell(cell).unwrap();
    assert_eq!(s, s2);
    s2
}
