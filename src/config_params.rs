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

use ton_types::{
    BuilderData, Cell,
    fail,
    HashmapE, HashmapType, IBitstring, Result, SliceData, UInt256,
};

use crate::{
    define_HashmapE,
    error::BlockError,
    limits::BlockLimits,
    shard::{ShardIdent, MAX_SPLIT_DEPTH},
    types::Grams,
    validators::{ValidatorDescr, ValidatorSet},
    Serializable, Deserializable,
};

#[cfg(test)]
#[path = "tests/test_config_params.rs"]
mod tests;

/*
_ config_addr:uint256
config:^(Hashmap 32 ^Cell) = ConfigParams;
*/
/// Masterchain configuration: address of the config contract and
/// the dictionary of parameters, each one kept in its own cell
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConfigParams {
    pub config_addr: UInt256,
    pub config_params: HashmapE // <u32, ^Cell>
}

impl Default for ConfigParams {
    fn default() -> ConfigParams {
        Self::new()
    }
}

// parameters a masterchain configuration can't work without
const MANDATORY_CONFIG_PARAMS: [u32; 8] = [20, 21, 22, 23, 24, 25, 28, 34];

impl ConfigParams {
    pub fn new() -> Self {
        Self::with_address_and_params(UInt256::default(), None)
    }

    pub fn with_address_and_params(config_addr: UInt256, data: Option<Cell>) -> Self {
        Self { config_addr, config_params: HashmapE::with_hashmap(32, data) }
    }

    fn param_cell(&self, index: u32) -> Result<Option<Cell>> {
        Ok(self.config_params.get(index.write_to_bitstring()?)?
            .and_then(|slice| slice.reference_opt(0)))
    }

    /// Decoded parameter `index`, unknown ones are returned raw
    pub fn config(&self, index: u32) -> Result<Option<ConfigParamEnum>> {
        self.param_cell(index)?
            .map(|cell| ConfigParamEnum::construct_from_slice_and_number(&mut SliceData::load_cell(cell)?, index))
            .transpose()
    }

    pub fn config_present(&self, index: u32) -> Result<bool> {
        Ok(self.param_cell(index)?.is_some())
    }

    /// Stores the parameter under its own index, replacing the old value
    pub fn set_config(&mut self, config: ConfigParamEnum) -> Result<()> {
        let mut value = BuilderData::new();
        value.checked_append_reference(config.value_cell()?)?;
        self.config_params.set_builder(config.index().write_to_bitstring()?, &value)?;
        Ok(())
    }

    // decodes parameter `index` and takes the wanted variant out of it
    fn typed<T>(&self, index: u32, take: impl FnOnce(ConfigParamEnum) -> Option<T>) -> Result<Option<T>> {
        Ok(self.config(index)?.and_then(take))
    }

    fn required<T>(&self, index: u32, take: impl FnOnce(ConfigParamEnum) -> Option<T>) -> Result<T> {
        match self.typed(index, take)? {
            Some(value) => Ok(value),
            None => fail!(BlockError::NotFound(format!("configuration parameter {}", index)))
        }
    }

    pub fn config_address(&self) -> Result<UInt256> {
        self.required(0, |p| match p { ConfigParamEnum::ConfigParam0(p) => Some(p.config_addr), _ => None })
    }
    pub fn elector_address(&self) -> Result<UInt256> {
        self.required(1, |p| match p { ConfigParamEnum::ConfigParam1(p) => Some(p.elector_addr), _ => None })
    }
    pub fn workchains(&self) -> Result<Workchains> {
        self.required(12, |p| match p { ConfigParamEnum::ConfigParam12(p) => Some(p.workchains), _ => None })
    }
    pub fn gas_prices(&self, is_masterchain: bool) -> Result<GasLimitsPrices> {
        let index = if is_masterchain { 20 } else { 21 };
        self.required(index, |p| match p {
            ConfigParamEnum::ConfigParam20(p) | ConfigParamEnum::ConfigParam21(p) => Some(p),
            _ => None
        })
    }
    pub fn block_limits(&self, is_masterchain: bool) -> Result<BlockLimits> {
        let index = if is_masterchain { 22 } else { 23 };
        self.required(index, |p| match p {
            ConfigParamEnum::ConfigParam22(p) | ConfigParamEnum::ConfigParam23(p) => Some(p),
            _ => None
        })
    }
    pub fn fwd_prices(&self, is_masterchain: bool) -> Result<MsgForwardPrices> {
        let index = if is_masterchain { 24 } else { 25 };
        self.required(index, |p| match p {
            ConfigParamEnum::ConfigParam24(p) | ConfigParamEnum::ConfigParam25(p) => Some(p),
            _ => None
        })
    }
    pub fn catchain_config(&self) -> Result<CatchainConfig> {
        self.required(28, |p| match p { ConfigParamEnum::ConfigParam28(p) => Some(p), _ => None })
    }
    pub fn fundamental_smc_addr(&self) -> Result<FundamentalSmcAddresses> {
        self.required(31, |p| match p { ConfigParamEnum::ConfigParam31(p) => Some(p.fundamental_smc_addr), _ => None })
    }

    // temporary set `temp` overrides the elected one
    fn validator_set_param(&self, temp: u32, elected: u32) -> Result<Option<ValidatorSet>> {
        let take = |param: ConfigParamEnum| match param {
            ConfigParamEnum::ConfigParam32(p) => Some(p.prev_validators),
            ConfigParamEnum::ConfigParam33(p) => Some(p.prev_temp_validators),
            ConfigParamEnum::ConfigParam34(p) => Some(p.cur_validators),
            ConfigParamEnum::ConfigParam35(p) => Some(p.cur_temp_validators),
            ConfigParamEnum::ConfigParam36(p) => Some(p.next_validators),
            ConfigParamEnum::ConfigParam37(p) => Some(p.next_temp_validators),
            _ => None
        };
        match self.typed(temp, take)? {
            Some(vset) => Ok(Some(vset)),
            None => self.typed(elected, take)
        }
    }

    /// Previous validator set, empty if there is none
    pub fn prev_validator_set(&self) -> Result<ValidatorSet> {
        Ok(self.validator_set_param(33, 32)?.unwrap_or_default())
    }
    pub fn validator_set(&self) -> Result<ValidatorSet> {
        match self.validator_set_param(35, 34)? {
            Some(vset) => Ok(vset),
            None => fail!(BlockError::NotFound("current validator set".to_string()))
        }
    }
    /// Next validator set, empty if there is none
    pub fn next_validator_set(&self) -> Result<ValidatorSet> {
        Ok(self.validator_set_param(37, 36)?.unwrap_or_default())
    }
    pub fn next_validator_set_present(&self) -> Result<bool> {
        Ok(self.config_present(37)? || self.config_present(36)?)
    }
    pub fn read_cur_validator_set_and_cc_conf(&self) -> Result<(ValidatorSet, CatchainConfig)> {
        Ok((self.validator_set()?, self.catchain_config()?))
    }

    fn global_version_param(&self) -> GlobalVersion {
        match self.config(8) {
            Ok(Some(ConfigParamEnum::ConfigParam8(param))) => param.global_version,
            _ => GlobalVersion::default()
        }
    }
    pub fn has_capability(&self, capability: GlobalCapabilities) -> bool {
        self.global_version_param().has_capability(capability)
    }
    pub fn global_version(&self) -> u32 {
        self.global_version_param().version
    }

    /// Validator set in force at unix time `at`: the next set takes over
    /// as soon as its `utime_since` is reached
    pub fn validator_set_at(&self, at: u32) -> Result<ValidatorSet> {
        if self.next_validator_set_present()? {
            let next = self.next_validator_set()?;
            if next.total() != 0 && at >= next.utime_since() {
                return Ok(next)
            }
        }
        self.validator_set()
    }

    /// Validators responsible for `shard` in the catchain session `cc_seqno`
    pub fn compute_validator_set(&self, shard: &ShardIdent, at: u32, cc_seqno: u32) -> Result<Vec<ValidatorDescr>> {
        Ok(self.compute_validator_set_and_hash(shard, at, cc_seqno)?.0)
    }

    /// Same as `compute_validator_set` but also returns the short hash of the subset
    pub fn compute_validator_set_and_hash(
        &self,
        shard: &ShardIdent,
        at: u32,
        cc_seqno: u32
    ) -> Result<(Vec<ValidatorDescr>, u32)> {
        let vset = self.validator_set_at(at)?;
        let cc_config = self.catchain_config()?;
        vset.calc_subset(&cc_config, shard.shard_prefix_with_tag(), shard.workchain_id(), cc_seqno)
    }

    /// Checks that all mandatory parameters are present and, unless relaxed,
    /// that parameter 0 names the same config contract
    pub fn valid_config_data(&self, relax_par0: bool) -> Result<bool> {
        if !relax_par0 {
            let addr_matches = matches!(
                self.config(0),
                Ok(Some(ConfigParamEnum::ConfigParam0(ref param))) if param.config_addr == self.config_addr
            );
            if !addr_matches {
                return Ok(false)
            }
        }
        for index in MANDATORY_CONFIG_PARAMS.iter() {
            if !self.config_present(*index)? {
                log::error!(target: "block", "mandatory configuration parameter {} is missing", index);
                return Ok(false)
            }
        }
        Ok(true)
    }
}

impl Deserializable for ConfigParams {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        let config_addr = UInt256::construct_from(slice)?;
        let root = slice.checked_drain_reference()?;
        Ok(Self::with_address_and_params(config_addr, Some(root)))
    }
}

impl Serializable for ConfigParams {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        cell.checked_append_reference(self.config_params.data().cloned().unwrap_or_default())?;
        self.config_addr.write_to(cell)
    }
}

macro_rules! define_config_param_enum {
    ( $( $index:literal => $variant:ident($param:ty) ),* $(,)? ) => {
        /// One decoded configuration parameter
        #[derive(Clone, Debug, Eq, PartialEq)]
        pub enum ConfigParamEnum {
            $( $variant($param), )*
            ConfigParamAny(u32, SliceData),
        }

        impl ConfigParamEnum {
            pub fn construct_from_slice_and_number(slice: &mut SliceData, index: u32) -> Result<Self> {
                Ok(match index {
                    $( $index => ConfigParamEnum::$variant(<$param as Deserializable>::construct_from(slice)?), )*
                    _ => ConfigParamEnum::ConfigParamAny(index, slice.clone()),
                })
            }

            /// Number of the parameter in the config dictionary
            pub fn index(&self) -> u32 {
                match self {
                    $( ConfigParamEnum::$variant(_) => $index, )*
                    ConfigParamEnum::ConfigParamAny(index, _) => *index,
                }
            }

            fn value_cell(&self) -> Result<Cell> {
                match self {
                    $( ConfigParamEnum::$variant(param) => param.serialize(), )*
                    ConfigParamEnum::ConfigParamAny(_, slice) => Ok(slice.clone().into_cell()),
                }
            }
        }
    }
}

define_config_param_enum! {
    0 => ConfigParam0(ConfigParam0),
    1 => ConfigParam1(ConfigParam1),
    8 => ConfigParam8(ConfigParam8),
    12 => ConfigParam12(ConfigParam12),
    15 => ConfigParam15(ConfigParam15),
    16 => ConfigParam16(ConfigParam16),
    17 => ConfigParam17(ConfigParam17),
    20 => ConfigParam20(GasLimitsPrices),
    21 => ConfigParam21(GasLimitsPrices),
    22 => ConfigParam22(ConfigParam22),
    23 => ConfigParam23(ConfigParam23),
    24 => ConfigParam24(MsgForwardPrices),
    25 => ConfigParam25(MsgForwardPrices),
    28 => ConfigParam28(CatchainConfig),
    31 => ConfigParam31(ConfigParam31),
    32 => ConfigParam32(ConfigParam32),
    33 => ConfigParam33(ConfigParam33),
    34 => ConfigParam34(ConfigParam34),
    35 => ConfigParam35(ConfigParam35),
    36 => ConfigParam36(ConfigParam36),
    37 => ConfigParam37(ConfigParam37),
}

// parameter consisting of a single field
macro_rules! define_single_field_param {
    ( $name:ident, $field:ident: $field_type:ty ) => {
        #[derive(Clone, Debug, Eq, PartialEq, Default)]
        pub struct $name {
            pub $field: $field_type,
        }

        impl Deserializable for $name {
            fn construct_from(slice: &mut SliceData) -> Result<Self> {
                Ok(Self { $field: <$field_type as Deserializable>::construct_from(slice)? })
            }
        }

        impl Serializable for $name {
            fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
                self.$field.write_to(cell)
            }
        }
    }
}

fn check_tag<T>(expected: u8, tag: u8) -> Result<()> {
    if tag != expected {
        fail!(BlockError::InvalidConstructorTag { t: tag as u32, s: std::any::type_name::<T>().to_string() })
    }
    Ok(())
}

// _ config_addr:bits256 = ConfigParam 0;
define_single_field_param!(ConfigParam0, config_addr: UInt256);

// _ elector_addr:bits256 = ConfigParam 1;
define_single_field_param!(ConfigParam1, elector_addr: UInt256);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GlobalCapabilities {
    CapNone                   = 0,
    CapIhrEnabled             = 0x0000_0000_0001,
    CapCreateStatsEnabled     = 0x0000_0000_0002,
    CapBounceMsgBody          = 0x0000_0000_0004,
    CapReportVersion          = 0x0000_0000_0008,
    CapSplitMergeTransactions = 0x0000_0000_0010,
    CapShortDequeue           = 0x0000_0000_0020,
    CapOffHypercube           = 0x0000_0000_0200,
}

// capabilities#c4 version:uint32 capabilities:uint64 = GlobalVersion;
#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub struct GlobalVersion {
    pub version: u32,
    pub capabilities: u64,
}

impl GlobalVersion {
    pub fn has_capability(&self, capability: GlobalCapabilities) -> bool {
        self.capabilities & capability as u64 != 0
    }
}

const GLOBAL_VERSION_TAG: u8 = 0xC4;

impl Deserializable for GlobalVersion {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        check_tag::<Self>(GLOBAL_VERSION_TAG, slice.get_next_byte()?)?;
        Ok(Self { version: slice.get_next_u32()?, capabilities: slice.get_next_u64()? })
    }
}

impl Serializable for GlobalVersion {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        cell.append_u8(GLOBAL_VERSION_TAG)?;
        cell.append_u32(self.version)?;
        cell.append_u64(self.capabilities)?;
        Ok(())
    }
}

// _ GlobalVersion = ConfigParam 8;
define_single_field_param!(ConfigParam8, global_version: GlobalVersion);

/*
wfmt_basic#1 vm_version:int32 vm_mode:uint64 = WorkchainFormat 1;
wfmt_ext#0 min_addr_len:(## 12) max_addr_len:(## 12) addr_len_step:(## 12)
  { min_addr_len >= 64 } { min_addr_len <= max_addr_len }
  { max_addr_len <= 1023 } { addr_len_step <= 1023 }
  workchain_type_id:(## 32) { workchain_type_id >= 1 }
= WorkchainFormat 0;
*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WorkchainFormat {
    Basic(WorkchainFormat1),
    Extended(WorkchainFormat0),
}

impl Default for WorkchainFormat {
    fn default() -> Self {
        WorkchainFormat::Basic(WorkchainFormat1::default())
    }
}

impl Deserializable for WorkchainFormat {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        let tag = slice.get_next_int(4)?;
        match tag {
            1 => Ok(WorkchainFormat::Basic(WorkchainFormat1::construct_from(slice)?)),
            0 => Ok(WorkchainFormat::Extended(WorkchainFormat0::construct_from(slice)?)),
            _ => fail!(BlockError::InvalidConstructorTag { t: tag as u32, s: "WorkchainFormat".to_string() })
        }
    }
}

impl Serializable for WorkchainFormat {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        match self {
            WorkchainFormat::Basic(format) => {
                cell.append_bits(1, 4)?;
                format.write_to(cell)
            }
            WorkchainFormat::Extended(format) => {
                cell.append_bits(0, 4)?;
                format.write_to(cell)
            }
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub struct WorkchainFormat1 {
    pub vm_version: i32,
    pub vm_mode: u64,
}

impl WorkchainFormat1 {
    pub fn with_params(vm_version: i32, vm_mode: u64) -> Self {
        WorkchainFormat1 { vm_version, vm_mode }
    }
}

impl Deserializable for WorkchainFormat1 {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        Ok(Self { vm_version: slice.get_next_i32()?, vm_mode: slice.get_next_u64()? })
    }
}

impl Serializable for WorkchainFormat1 {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        cell.append_i32(self.vm_version)?;
        cell.append_u64(self.vm_mode)?;
        Ok(())
    }
}

/// Extended workchain format: address length limits
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WorkchainFormat0 {
    min_addr_len: u16,
    max_addr_len: u16,
    addr_len_step: u16,
    workchain_type_id: u32,
}

impl WorkchainFormat0 {
    pub fn with_params(
        min_addr_len: u16,
        max_addr_len: u16,
        addr_len_step: u16,
        workchain_type_id: u32
    ) -> Result<WorkchainFormat0> {
        let format = WorkchainFormat0 { min_addr_len, max_addr_len, addr_len_step, workchain_type_id };
        format.check()?;
        Ok(format)
    }

    fn check(&self) -> Result<()> {
        let valid = (64..=self.max_addr_len).contains(&self.min_addr_len)
            && self.max_addr_len <= 1023
            && self.addr_len_step <= 1023
            && self.workchain_type_id >= 1;
        if !valid {
            fail!(BlockError::InvalidData(format!("wrong extended workchain format {:?}", self)))
        }
        Ok(())
    }

    pub fn min_addr_len(&self) -> u16 { self.min_addr_len }
    pub fn max_addr_len(&self) -> u16 { self.max_addr_len }
    pub fn addr_len_step(&self) -> u16 { self.addr_len_step }
    pub fn workchain_type_id(&self) -> u32 { self.workchain_type_id }
}

impl Deserializable for WorkchainFormat0 {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        let mut lens = [0u16; 3];
        for len in lens.iter_mut() {
            *len = slice.get_next_int(12)? as u16;
        }
        Self::with_params(lens[0], lens[1], lens[2], slice.get_next_u32()?)
    }
}

impl Serializable for WorkchainFormat0 {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        self.check()?;
        for len in [self.min_addr_len, self.max_addr_len, self.addr_len_step].iter() {
            cell.append_bits(*len as usize, 12)?;
        }
        cell.append_u32(self.workchain_type_id)?;
        Ok(())
    }
}

/*
workchain#a6
    enabled_since:uint32
    actual_min_split:(## 8)
    min_split:(## 8)
    max_split:(## 8)
    { actual_min_split <= min_split } { min_split <= max_split } { max_split <= 60 }
    basic:(## 1)
    active:Bool
    accept_msgs:Bool
    flags:(## 13) { flags = 0 }
    zerostate_root_hash:bits256
    zerostate_file_hash:bits256
    version:uint32
    format:(WorkchainFormat basic)
= WorkchainDescr;
*/
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct WorkchainDescr {
    pub enabled_since: u32,
    actual_min_split: u8,
    min_split: u8,
    max_split: u8,
    pub active: bool,
    pub accept_msgs: bool,
    pub flags: u16,
    pub zerostate_root_hash: UInt256,
    pub zerostate_file_hash: UInt256,
    pub version: u32,
    pub format: WorkchainFormat
}

const WORKCHAIN_DESCR_TAG: u8 = 0xA6;

impl WorkchainDescr {
    pub fn min_split(&self) -> u8 { self.min_split }
    pub fn actual_min_split(&self) -> u8 { self.actual_min_split }
    pub fn max_split(&self) -> u8 { self.max_split }
    pub fn active(&self) -> bool { self.active }

    fn check_splits(actual_min_split: u8, min_split: u8, max_split: u8) -> Result<()> {
        if actual_min_split > min_split || min_split > max_split || max_split > MAX_SPLIT_DEPTH {
            fail!(BlockError::InvalidData(format!(
                "wrong split depths {} {} {}, max is {}", actual_min_split, min_split, max_split, MAX_SPLIT_DEPTH
            )))
        }
        Ok(())
    }

    /// Sets split limits checking `actual_min_split <= min_split <= max_split <= 60`
    pub fn set_splits(&mut self, actual_min_split: u8, min_split: u8, max_split: u8) -> Result<()> {
        Self::check_splits(actual_min_split, min_split, max_split)?;
        self.actual_min_split = actual_min_split;
        self.min_split = min_split;
        self.max_split = max_split;
        Ok(())
    }

    pub fn basic(&self) -> bool {
        matches!(self.format, WorkchainFormat::Basic(_))
    }
}

impl Deserializable for WorkchainDescr {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        check_tag::<Self>(WORKCHAIN_DESCR_TAG, slice.get_next_byte()?)?;
        let mut descr = Self { enabled_since: slice.get_next_u32()?, ..Self::default() };
        let splits = slice.get_next_bytes(3)?;
        descr.set_splits(splits[0], splits[1], splits[2])?;
        let basic = slice.get_next_bit()?;
        descr.active = slice.get_next_bit()?;
        descr.accept_msgs = slice.get_next_bit()?;
        descr.flags = slice.get_next_int(13)? as u16;
        if descr.flags != 0 {
            fail!(BlockError::InvalidData(format!("workchain flags must be zero, not {}", descr.flags)))
        }
        descr.zerostate_root_hash = UInt256::construct_from(slice)?;
        descr.zerostate_file_hash = UInt256::construct_from(slice)?;
        descr.version = slice.get_next_u32()?;
        descr.format = WorkchainFormat::construct_from(slice)?;
        if basic != descr.basic() {
            fail!(BlockError::InvalidData("workchain `basic` flag mismatches its format".to_string()))
        }
        Ok(descr)
    }
}

impl Serializable for WorkchainDescr {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        Self::check_splits(self.actual_min_split, self.min_split, self.max_split)?;
        cell.append_u8(WORKCHAIN_DESCR_TAG)?;
        cell.append_u32(self.enabled_since)?;
        cell.append_raw(&[self.actual_min_split, self.min_split, self.max_split], 24)?;
        for bit in [self.basic(), self.active, self.accept_msgs].iter() {
            cell.append_bit_bool(*bit)?;
        }
        cell.append_bits(self.flags as usize, 13)?;
        self.zerostate_root_hash.write_to(cell)?;
        self.zerostate_file_hash.write_to(cell)?;
        cell.append_u32(self.version)?;
        self.format.write_to(cell)
    }
}

define_HashmapE!{Workchains, 32, WorkchainDescr}

// _ workchains:(HashmapE 32 WorkchainDescr) = ConfigParam 12;
define_single_field_param!(ConfigParam12, workchains: Workchains);

impl ConfigParam12 {
    pub fn len(&self) -> Result<usize> {
        self.workchains.len()
    }
    pub fn is_empty(&self) -> bool {
        self.workchains.is_empty()
    }
    pub fn get(&self, workchain_id: i32) -> Result<Option<WorkchainDescr>> {
        self.workchains.get(&workchain_id)
    }
    pub fn insert(&mut self, workchain_id: i32, descr: &WorkchainDescr) -> Result<()> {
        self.workchains.set(&workchain_id, descr)
    }
}

/*
_ validators_elected_for:uint32 elections_start_before:uint32
  elections_end_before:uint32 stake_held_for:uint32
= ConfigParam 15;
*/
#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub struct ConfigParam15 {
    pub validators_elected_for: u32,
    pub elections_start_before: u32,
    pub elections_end_before: u32,
    pub stake_held_for: u32,
}

impl Deserializable for ConfigParam15 {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        Ok(Self {
            validators_elected_for: slice.get_next_u32()?,
            elections_start_before: slice.get_next_u32()?,
            elections_end_before: slice.get_next_u32()?,
            stake_held_for: slice.get_next_u32()?,
        })
    }
}

impl Serializable for ConfigParam15 {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        let values = [
            self.validators_elected_for,
            self.elections_start_before,
            self.elections_end_before,
            self.stake_held_for,
        ];
        for value in values.iter() {
            cell.append_u32(*value)?;
        }
        Ok(())
    }
}

/*
_ max_validators:(## 16) max_main_validators:(## 16) min_validators:(## 16)
  { max_validators >= max_main_validators }
  { max_main_validators >= min_validators }
  { min_validators >= 1 }
  = ConfigParam 16;
*/
#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub struct ConfigParam16 {
    pub max_validators: u16,
    pub max_main_validators: u16,
    pub min_validators: u16,
}

impl ConfigParam16 {
    pub fn with_params(max_validators: u16, max_main_validators: u16, min_validators: u16) -> Result<Self> {
        if max_validators < max_main_validators || max_main_validators < min_validators || min_validators < 1 {
            fail!(BlockError::InvalidData(format!(
                "wrong validators count: max {}, max main {}, min {}",
                max_validators, max_main_validators, min_validators
            )))
        }
        Ok(Self { max_validators, max_main_validators, min_validators })
    }
}

impl Deserializable for ConfigParam16 {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        let max_validators = slice.get_next_u16()?;
        let max_main_validators = slice.get_next_u16()?;
        Self::with_params(max_validators, max_main_validators, slice.get_next_u16()?)
    }
}

impl Serializable for ConfigParam16 {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        cell.append_u16(self.max_validators)?;
        cell.append_u16(self.max_main_validators)?;
        cell.append_u16(self.min_validators)?;
        Ok(())
    }
}

/*
_ min_stake:Grams max_stake:Grams min_total_stake:Grams max_stake_factor:uint32
= ConfigParam 17;
*/
#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub struct ConfigParam17 {
    pub min_stake: Grams,
    pub max_stake: Grams,
    pub min_total_stake: Grams,
    pub max_stake_factor: u32,
}

impl Deserializable for ConfigParam17 {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        Ok(Self {
            min_stake: Grams::construct_from(slice)?,
            max_stake: Grams::construct_from(slice)?,
            min_total_stake: Grams::construct_from(slice)?,
            max_stake_factor: slice.get_next_u32()?,
        })
    }
}

impl Serializable for ConfigParam17 {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        for stake in [&self.min_stake, &self.max_stake, &self.min_total_stake].iter() {
            stake.write_to(cell)?;
        }
        cell.append_u32(self.max_stake_factor)?;
        Ok(())
    }
}

/*
gas_prices#dd gas_price:uint64 gas_limit:uint64 gas_credit:uint64
  block_gas_limit:uint64 freeze_due_limit:uint64 delete_due_limit:uint64
= GasLimitsPrices;

gas_prices_ext#de gas_price:uint64 gas_limit:uint64 special_gas_limit:uint64
  gas_credit:uint64 block_gas_limit:uint64 freeze_due_limit:uint64
  delete_due_limit:uint64
= GasLimitsPrices;

gas_flat_pfx#d1 flat_gas_limit:uint64 flat_gas_price:uint64 other:GasLimitsPrices
= GasLimitsPrices;
*/
/// Gas prices and limits of a workchain. `gas_price` is in 1/65536 of nanograms.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct GasLimitsPrices {
    pub gas_price: u64,
    pub gas_limit: u64,
    pub special_gas_limit: u64,
    pub gas_credit: u64,
    pub block_gas_limit: u64,
    pub freeze_due_limit: u64,
    pub delete_due_limit: u64,
    pub flat_gas_limit: u64,
    pub flat_gas_price: u64,
    /// Balance buying the whole `gas_limit`, not serialized
    pub max_gas_threshold: u128,
}

impl GasLimitsPrices {
    /// Fee for `gas_used`: flat price for the first `flat_gas_limit` units,
    /// the rest is rounded up
    pub fn calc_gas_fee(&self, gas_used: u64) -> u128 {
        let over_flat = gas_used.saturating_sub(self.flat_gas_limit) as u128;
        self.flat_gas_price as u128 + ((over_flat * self.gas_price as u128 + 0xffff) >> 16)
    }

    /// Gas price in nanograms
    pub fn get_real_gas_price(&self) -> u64 {
        self.gas_price >> 16
    }

    /// Gas which can be bought for `value` nanograms
    pub fn calc_gas(&self, value: u128) -> u64 {
        if value >= self.max_gas_threshold {
            self.gas_limit
        } else if value < self.flat_gas_price as u128 || self.gas_price == 0 {
            0
        } else {
            let over_flat = ((value - self.flat_gas_price as u128) << 16) / self.gas_price as u128;
            self.flat_gas_limit + over_flat as u64
        }
    }

    pub fn calc_max_gas_threshold(&self) -> u128 {
        let over_flat = self.gas_limit.saturating_sub(self.flat_gas_limit) as u128;
        self.flat_gas_price as u128 + ((self.gas_price as u128 * over_flat) >> 16)
    }
}

const GAS_PRICES_TAG: u8 = 0xDD;
const GAS_PRICES_EXT_TAG: u8 = 0xDE;
const GAS_FLAT_PFX_TAG: u8 = 0xD1;

impl Deserializable for GasLimitsPrices {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        let mut prices = Self::default();
        // any number of flat prefixes followed by the prices themselves
        let tag = loop {
            match slice.get_next_byte()? {
                GAS_FLAT_PFX_TAG => {
                    prices.flat_gas_limit = slice.get_next_u64()?;
                    prices.flat_gas_price = slice.get_next_u64()?;
                }
                tag => break tag
            }
        };
        if tag != GAS_PRICES_TAG && tag != GAS_PRICES_EXT_TAG {
            fail!(BlockError::InvalidConstructorTag { t: tag as u32, s: "GasLimitsPrices".to_string() })
        }
        prices.gas_price = slice.get_next_u64()?;
        prices.gas_limit = slice.get_next_u64()?;
        if tag == GAS_PRICES_EXT_TAG {
            prices.special_gas_limit = slice.get_next_u64()?;
        }
        prices.gas_credit = slice.get_next_u64()?;
        prices.block_gas_limit = slice.get_next_u64()?;
        prices.freeze_due_limit = slice.get_next_u64()?;
        prices.delete_due_limit = slice.get_next_u64()?;
        prices.max_gas_threshold = prices.calc_max_gas_threshold();
        Ok(prices)
    }
}

impl Serializable for GasLimitsPrices {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        cell.append_u8(GAS_FLAT_PFX_TAG)?;
        cell.append_u64(self.flat_gas_limit)?;
        cell.append_u64(self.flat_gas_price)?;
        cell.append_u8(GAS_PRICES_EXT_TAG)?;
        let values = [
            self.gas_price,
            self.gas_limit,
            self.special_gas_limit,
            self.gas_credit,
            self.block_gas_limit,
            self.freeze_due_limit,
            self.delete_due_limit,
        ];
        for value in values.iter() {
            cell.append_u64(*value)?;
        }
        Ok(())
    }
}

/*
block_limits#5d bytes:ParamLimits gas:ParamLimits lt_delta:ParamLimits = BlockLimits;
config_mc_block_limits#_ BlockLimits = ConfigParam 22;
config_block_limits#_ BlockLimits = ConfigParam 23;
*/
pub type ConfigParam22 = BlockLimits;
pub type ConfigParam23 = BlockLimits;

/*
msg_forward_prices#ea lump_price:uint64 bit_price:uint64 cell_price:uint64
  ihr_price_factor:uint32 first_frac:uint16 next_frac:uint16
= MsgForwardPrices;
*/
#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub struct MsgForwardPrices {
    pub lump_price: u64,
    pub bit_price: u64,
    pub cell_price: u64,
    pub ihr_price_factor: u32,
    pub first_frac: u16,
    pub next_frac: u16,
}

impl MsgForwardPrices {
    /// Forwarding fee of a message with `bits` and `cells` outside of its root cell
    pub fn fwd_fee(&self, bits: u64, cells: u64) -> u128 {
        let data = self.bit_price as u128 * bits as u128 + self.cell_price as u128 * cells as u128;
        self.lump_price as u128 + ((data + 0xffff) >> 16)
    }

    /// Part of the forwarding fee taken by the first transit
    pub fn first_frac_fee(&self, fwd_fee: u128) -> u128 {
        (fwd_fee * self.first_frac as u128) >> 16
    }
}

const MSG_FWD_PRICES_TAG: u8 = 0xEA;

impl Deserializable for MsgForwardPrices {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        check_tag::<Self>(MSG_FWD_PRICES_TAG, slice.get_next_byte()?)?;
        Ok(Self {
            lump_price: slice.get_next_u64()?,
            bit_price: slice.get_next_u64()?,
            cell_price: slice.get_next_u64()?,
            ihr_price_factor: slice.get_next_u32()?,
            first_frac: slice.get_next_u16()?,
            next_frac: slice.get_next_u16()?,
        })
    }
}

impl Serializable for MsgForwardPrices {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        cell.append_u8(MSG_FWD_PRICES_TAG)?;
        cell.append_u64(self.lump_price)?;
        cell.append_u64(self.bit_price)?;
        cell.append_u64(self.cell_price)?;
        cell.append_u32(self.ihr_price_factor)?;
        cell.append_u16(self.first_frac)?;
        cell.append_u16(self.next_frac)?;
        Ok(())
    }
}

/*
catchain_config#c1 mc_catchain_lifetime:uint32 shard_catchain_lifetime:uint32
  shard_validators_lifetime:uint32 shard_validators_num:uint32
= CatchainConfig;

catchain_config_new#c2 flags:(## 6) { flags = 0 }
  isolate_mc_validators:Bool shuffle_mc_validators:Bool
  mc_catchain_lifetime:uint32 shard_catchain_lifetime:uint32
  shard_validators_lifetime:uint32 shard_validators_num:uint32
= CatchainConfig;
*/
/// Validator sessions tuning, drives the choice of validator subsets
#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub struct CatchainConfig {
    pub isolate_mc_validators: bool,
    pub shuffle_mc_validators: bool,
    pub mc_catchain_lifetime: u32,
    pub shard_catchain_lifetime: u32,
    pub shard_validators_lifetime: u32,
    pub shard_validators_num: u32,
}

const CATCHAIN_CONFIG_TAG: u8 = 0xC1;
const CATCHAIN_CONFIG_FLAGS_TAG: u8 = 0xC2;

impl Deserializable for CatchainConfig {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        let mut config = Self::default();
        match slice.get_next_byte()? {
            CATCHAIN_CONFIG_TAG => (),
            CATCHAIN_CONFIG_FLAGS_TAG => {
                let flags = slice.get_next_byte()?;
                if flags & !0b11 != 0 {
                    fail!(BlockError::InvalidData(format!("reserved flags of CatchainConfig are set: {:#04x}", flags)))
                }
                config.isolate_mc_validators = flags & 0b10 != 0;
                config.shuffle_mc_validators = flags & 0b01 != 0;
            }
            tag => fail!(BlockError::InvalidConstructorTag { t: tag as u32, s: "CatchainConfig".to_string() })
        }
        config.mc_catchain_lifetime = slice.get_next_u32()?;
        config.shard_catchain_lifetime = slice.get_next_u32()?;
        config.shard_validators_lifetime = slice.get_next_u32()?;
        config.shard_validators_num = slice.get_next_u32()?;
        Ok(config)
    }
}

impl Serializable for CatchainConfig {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        let flags = (self.isolate_mc_validators as u8) << 1 | self.shuffle_mc_validators as u8;
        cell.append_u8(CATCHAIN_CONFIG_FLAGS_TAG)?;
        cell.append_u8(flags)?;
        cell.append_u32(self.mc_catchain_lifetime)?;
        cell.append_u32(self.shard_catchain_lifetime)?;
        cell.append_u32(self.shard_validators_lifetime)?;
        cell.append_u32(self.shard_validators_num)?;
        Ok(())
    }
}

// _ fundamental_smc_addr:(HashmapE 256 True) = ConfigParam 31;
define_HashmapE!{FundamentalSmcAddresses, 256, ()}

impl FundamentalSmcAddresses {
    pub fn contains(&self, address: &UInt256) -> Result<bool> {
        Ok(self.get(address)?.is_some())
    }
}

define_single_field_param!(ConfigParam31, fundamental_smc_addr: FundamentalSmcAddresses);

impl ConfigParam31 {
    pub fn add_address(&mut self, address: UInt256) -> Result<()> {
        self.fundamental_smc_addr.set(&address, &())
    }
}

// _ prev_validators:ValidatorSet = ConfigParam 32;
define_single_field_param!(ConfigParam32, prev_validators: ValidatorSet);
// _ prev_temp_validators:ValidatorSet = ConfigParam 33;
define_single_field_param!(ConfigParam33, prev_temp_validators: ValidatorSet);
// _ cur_validators:ValidatorSet = ConfigParam 34;
define_single_field_param!(ConfigParam34, cur_validators: ValidatorSet);
// _ cur_temp_validators:ValidatorSet = ConfigParam 35;
define_single_field_param!(ConfigParam35, cur_temp_validators: ValidatorSet);
// _ next_validators:ValidatorSet = ConfigParam 36;
define_single_field_param!(ConfigParam36, next_validators: ValidatorSet);
// _ next_temp_validators:ValidatorSet = ConfigParam 37;
define_single_field_param!(ConfigParam37, next_temp_validators: ValidatorSet);
