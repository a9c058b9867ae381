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
use std::{collections::HashSet, sync::Arc};
use ton_types::{
    fail, Result,
    BuilderData, Cell, IBitstring, SliceData, UInt256,
};

#[cfg(test)]
#[path = "tests/test_limits.rs"]
mod tests;

/// Load class of a block parameter, ordered from the lightest
#[derive(Debug, Clone, Copy, Eq, Ord, PartialEq, PartialOrd)]
pub enum ParamLimitIndex {
    Underload = 0,
    Normal,
    Soft,
    Medium,
    Hard
}

impl ParamLimitIndex {
    const ALL: [ParamLimitIndex; 5] = [
        ParamLimitIndex::Underload,
        ParamLimitIndex::Normal,
        ParamLimitIndex::Soft,
        ParamLimitIndex::Medium,
        ParamLimitIndex::Hard,
    ];
}

/*
param_limits#c3
    underload:#
    soft_limit:#
    { underload <= soft_limit }
    hard_limit:#
    { soft_limit <= hard_limit }
= ParamLimits;
*/
/// Thresholds of one parameter. Class `n` starts at `thresholds[n - 1]`,
/// the medium threshold lies halfway between soft and hard ones
#[derive(Clone, Default, Debug, Eq, PartialEq)]
pub struct ParamLimits {
    thresholds: [u32; 4],
}

const PARAM_LIMITS_TAG: u8 = 0xc3;

impl ParamLimits {
    pub fn with_limits(underload: u32, soft_limit: u32, hard_limit: u32) -> Result<Self> {
        if underload > soft_limit || soft_limit > hard_limit {
            fail!(BlockError::InvalidArg(format!(
                "limits must not decrease: underload {}, soft {}, hard {}", underload, soft_limit, hard_limit
            )))
        }
        let medium = soft_limit + (hard_limit - soft_limit) / 2;
        Ok(Self { thresholds: [underload, soft_limit, medium, hard_limit] })
    }

    pub fn underload(&self) -> u32 { self.thresholds[0] }
    pub fn soft_limit(&self) -> u32 { self.thresholds[1] }
    pub fn medium(&self) -> u32 { self.thresholds[2] }
    pub fn hard_limit(&self) -> u32 { self.thresholds[3] }

    /// Class of `value`: the number of thresholds it reached
    pub fn classify(&self, value: u32) -> ParamLimitIndex {
        ParamLimitIndex::ALL[self.thresholds.iter().filter(|threshold| **threshold <= value).count()]
    }

    /// True if `value` stays below the threshold ending class `level`
    pub fn fits(&self, level: ParamLimitIndex, value: u32) -> bool {
        match self.thresholds.get(level as usize) {
            Some(threshold) => value < *threshold,
            None => true
        }
    }

    /// True if `value` is below `percent` percents of the soft limit
    pub fn fits_normal(&self, value: u32, percent: u32) -> bool {
        value as u64 * 100 < self.soft_limit() as u64 * percent as u64
    }
}

impl Deserializable for ParamLimits {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        let tag = slice.get_next_byte()?;
        if tag != PARAM_LIMITS_TAG {
            fail!(BlockError::InvalidConstructorTag { t: tag as u32, s: "ParamLimits".to_string() })
        }
        let underload = slice.get_next_u32()?;
        let soft_limit = slice.get_next_u32()?;
        Self::with_limits(underload, soft_limit, slice.get_next_u32()?)
    }
}

impl Serializable for ParamLimits {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        cell.append_u8(PARAM_LIMITS_TAG)?;
        for limit in [self.underload(), self.soft_limit(), self.hard_limit()].iter() {
            cell.append_u32(*limit)?;
        }
        Ok(())
    }
}

/*
block_limits#5d
    bytes:ParamLimits
    gas:ParamLimits
    lt_delta:ParamLimits
= BlockLimits;
*/
/// Limits of block size, gas and logical time span
#[derive(Clone, Default, Debug, Eq, PartialEq)]
pub struct BlockLimits {
    bytes: ParamLimits,
    gas: ParamLimits,
    lt_delta: ParamLimits,
}

const BLOCK_LIMITS_TAG: u8 = 0x5d;

impl BlockLimits {
    pub fn with_limits(bytes: ParamLimits, gas: ParamLimits, lt_delta: ParamLimits) -> Self {
        Self { bytes, gas, lt_delta }
    }

    pub fn bytes(&self) -> &ParamLimits { &self.bytes }
    pub fn gas(&self) -> &ParamLimits { &self.gas }
    pub fn lt_delta(&self) -> &ParamLimits { &self.lt_delta }

    fn axes(&self, bytes: u32, gas: u32, lt_delta: u32) -> [(&ParamLimits, u32); 3] {
        [(&self.bytes, bytes), (&self.gas, gas), (&self.lt_delta, lt_delta)]
    }

    /// The worst class over all axes
    pub fn classify(&self, bytes: u32, gas: u32, lt_delta: u32) -> ParamLimitIndex {
        self.axes(bytes, gas, lt_delta).iter()
            .map(|(limits, value)| limits.classify(*value))
            .max()
            .unwrap_or(ParamLimitIndex::Underload)
    }

    pub fn fits(&self, level: ParamLimitIndex, bytes: u32, gas: u32, lt_delta: u32) -> bool {
        self.axes(bytes, gas, lt_delta).iter().all(|(limits, value)| limits.fits(level, *value))
    }

    pub fn fits_normal(&self, bytes: u32, gas: u32, lt_delta: u32, percent: u32) -> bool {
        self.axes(bytes, gas, lt_delta).iter().all(|(limits, value)| limits.fits_normal(*value, percent))
    }
}

impl Deserializable for BlockLimits {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        let tag = slice.get_next_byte()?;
        if tag != BLOCK_LIMITS_TAG {
            fail!(BlockError::InvalidConstructorTag { t: tag as u32, s: "BlockLimits".to_string() })
        }
        Ok(Self {
            bytes: ParamLimits::construct_from(slice)?,
            gas: ParamLimits::construct_from(slice)?,
            lt_delta: ParamLimits::construct_from(slice)?,
        })
    }
}

impl Serializable for BlockLimits {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        cell.append_u8(BLOCK_LIMITS_TAG)?;
        self.bytes.write_to(cell)?;
        self.gas.write_to(cell)?;
        self.lt_delta.write_to(cell)
    }
}

// a message dictionary is accounted once per this many messages
const MSG_DICT_ACCOUNT_PERIOD: u32 = 64;

/// Running resource usage of a block being collated
pub struct BlockLimitStatus {
    limits: Arc<BlockLimits>,
    gas_used: u32,
    lt_start: Option<u64>,
    lt_current: u64,
    accounts: u32,
    transactions: u32,
    in_msgs: u32,
    out_msgs: u32,
    stats: CellStorageStats,
}

impl BlockLimitStatus {
    pub fn with_limits(limits: Arc<BlockLimits>) -> Self {
        Self {
            limits,
            gas_used: 0,
            lt_start: None,
            lt_current: 0,
            accounts: 0,
            transactions: 0,
            in_msgs: 0,
            out_msgs: 0,
            stats: CellStorageStats::default(),
        }
    }

    pub fn gas_used(&self) -> u32 { self.gas_used }
    pub fn add_gas_used(&mut self, gas: u32) {
        self.gas_used = self.gas_used.saturating_add(gas);
    }

    pub fn transactions(&self) -> u32 { self.transactions }
    /// `new_account` marks the first transaction of an account in the block
    pub fn add_transaction(&mut self, new_account: bool) {
        self.transactions += 1;
        self.accounts += new_account as u32;
    }

    pub fn register_in_msg_op(&mut self, msg_cell: &Cell, msg_dict: &Cell) -> Result<()> {
        self.in_msgs += 1;
        let account_dict = self.in_msgs % MSG_DICT_ACCOUNT_PERIOD == 0;
        self.register_msg(msg_cell, msg_dict, account_dict)
    }

    pub fn register_out_msg_op(&mut self, msg_cell: &Cell, msg_dict: &Cell) -> Result<()> {
        self.out_msgs += 1;
        let account_dict = self.out_msgs % MSG_DICT_ACCOUNT_PERIOD == 0;
        self.register_msg(msg_cell, msg_dict, account_dict)
    }

    fn register_msg(&mut self, msg_cell: &Cell, msg_dict: &Cell, account_dict: bool) -> Result<()> {
        self.stats.add_cell(msg_cell)?;
        if account_dict {
            self.stats.add_cell(msg_dict)?;
        }
        Ok(())
    }

    /// Remembers the first lt seen and the greatest one
    pub fn update_lt(&mut self, lt: u64) {
        self.lt_start.get_or_insert(lt);
        self.lt_current = self.lt_current.max(lt);
    }

    pub fn lt(&self) -> u64 { self.lt_current }

    pub fn lt_delta(&self) -> u32 {
        let start = self.lt_start.unwrap_or(self.lt_current);
        self.lt_current.saturating_sub(start).min(u32::MAX as u64) as u32
    }

    /// Rough size of the serialized block in bytes
    pub fn estimate_block_size(&self) -> u32 {
        let stats = &self.stats;
        [
            2000,
            stats.bits >> 3,
            stats.cells.saturating_mul(12),
            stats.internal_refs.saturating_mul(3),
            self.accounts.saturating_mul(200),
            self.transactions.saturating_mul(200),
        ].iter().fold(0u32, |size, part| size.saturating_add(*part))
    }

    pub fn classify(&self) -> ParamLimitIndex {
        self.limits.classify(self.estimate_block_size(), self.gas_used, self.lt_delta())
    }

    pub fn fits(&self, level: ParamLimitIndex) -> bool {
        self.limits.fits(level, self.estimate_block_size(), self.gas_used, self.lt_delta())
    }
}

/// Accumulates size of cell trees counting every distinct cell once
#[derive(Default)]
pub struct CellStorageStats {
    seen: HashSet<UInt256>,
    bits: u32,
    cells: u32,
    internal_refs: u32,
}

impl CellStorageStats {
    pub fn add_cell(&mut self, cell: &Cell) -> Result<()> {
        self.internal_refs = self.internal_refs.saturating_add(1);
        if !self.seen.insert(cell.repr_hash()) {
            return Ok(())
        }
        self.cells = self.cells.saturating_add(1);
        self.bits = self.bits.saturating_add(cell.bit_length() as u32);
        for i in 0..cell.references_count() {
            self.add_cell(&cell.reference(i)?)?;
        }
        Ok(())
    }

    pub fn cells(&self) -> u32 { self.cells }
    pub fn bits(&self) -> u32 { self.bits }
}
