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
    config_params::{ConfigParams, GlobalVersion},
    error::BlockError,
    master::{BlkMasterInfo, McBlockExtra},
    merkle_update::MerkleUpdate,
    shard::ShardIdent,
    types::{ChildCell, UnixTime32},
    MaybeDeserialize, MaybeSerialize, Serializable, Deserializable,
};
use std::{
    fmt::{self, Display, Formatter},
    str::FromStr
};
use ton_types::{
    error, fail, Result,
    UInt256, BuilderData, Cell, IBitstring, SliceData,
};

#[cfg(test)]
#[path = "tests/test_blocks.rs"]
mod tests;

/*
block_id_ext$_
    shard_id:ShardIdent
    seq_no:uint32
    root_hash:bits256
    file_hash:bits256
= BlockIdExt;
*/
/// Full identifier of a block: its shard, number and both hashes
#[derive(Clone, Debug, PartialEq, Eq, Default, Hash, Ord, PartialOrd)]
pub struct BlockIdExt {
    pub shard_id: ShardIdent,
    pub seq_no: u32,
    pub root_hash: UInt256,
    pub file_hash: UInt256,
}

impl BlockIdExt {
    pub fn new(shard_id: ShardIdent, seq_no: u32) -> Self {
        Self::with_params(shard_id, seq_no, UInt256::default(), UInt256::default())
    }

    pub fn with_params(shard_id: ShardIdent, seq_no: u32, root_hash: UInt256, file_hash: UInt256) -> Self {
        BlockIdExt { shard_id, seq_no, root_hash, file_hash }
    }

    pub fn shard(&self) -> &ShardIdent { &self.shard_id }
    pub fn seq_no(&self) -> u32 { self.seq_no }
    pub fn root_hash(&self) -> &UInt256 { &self.root_hash }
    pub fn file_hash(&self) -> &UInt256 { &self.file_hash }

    pub fn is_masterchain(&self) -> bool {
        self.shard_id.is_masterchain()
    }

    /// Only a zerostate has zero seq_no
    pub fn is_zerostate(&self) -> bool {
        self.seq_no == 0
    }

    pub fn is_valid(&self) -> bool {
        self.shard_id.is_valid()
    }

    /// Format used in node logs: `(0:8000000000000000, 10, rh <hex>, fh <hex>)`
    pub fn to_log_string(&self) -> String {
        format!("({}:{}, {}, rh {}, fh {})",
            self.shard_id.workchain_id(),
            self.shard_id.shard_prefix_as_str_with_tag(),
            self.seq_no,
            self.root_hash.to_hex_string(),
            self.file_hash.to_hex_string())
    }
}

impl Serializable for BlockIdExt {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        self.shard_id.write_to(cell)?;
        cell.append_u32(self.seq_no)?;
        self.root_hash.write_to(cell)?;
        self.file_hash.write_to(cell)
    }
}

impl Deserializable for BlockIdExt {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        Ok(Self {
            shard_id: ShardIdent::construct_from(slice)?,
            seq_no: slice.get_next_u32()?,
            root_hash: UInt256::construct_from(slice)?,
            file_hash: UInt256::construct_from(slice)?,
        })
    }
}

impl Display for BlockIdExt {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "({},{},{}):{}:{}",
            self.shard_id.workchain_id(),
            self.shard_id.shard_prefix_as_str_with_tag(),
            self.seq_no,
            self.root_hash.to_hex_string(),
            self.file_hash.to_hex_string())
    }
}

/// Accepts both the `Display` form and the log form of the id
impl FromStr for BlockIdExt {
    type Err = failure::Error;

    fn from_str(s: &str) -> Result<Self> {
        let log_form = !s.contains("):");
        let fields = s
            .split(|c| matches!(c, '(' | ')' | ',' | ':' | ' '))
            .filter(|field| !field.is_empty())
            .filter(|field| !log_form || (*field != "rh" && *field != "fh"))
            .collect::<Vec<_>>();
        if fields.len() != 5 {
            fail!(BlockError::InvalidArg(format!("wrong block id format {}", s)))
        }
        let workchain_id = fields[0].parse::<i32>()
            .map_err(|e| error!("Can't read workchain_id from {}: {}", s, e))?;
        let shard = u64::from_str_radix(fields[1], 16)
            .map_err(|e| error!("Can't read shard from {}: {}", s, e))?;
        let seq_no = fields[2].parse::<u32>()
            .map_err(|e| error!("Can't read seq_no from {}: {}", s, e))?;
        let root_hash = UInt256::from_str(fields[3])
            .map_err(|e| error!("Can't read root_hash from {}: {}", s, e))?;
        let file_hash = UInt256::from_str(fields[4])
            .map_err(|e| error!("Can't read file_hash from {}: {}", s, e))?;
        Ok(Self::with_params(ShardIdent::with_tagged_prefix(workchain_id, shard)?, seq_no, root_hash, file_hash))
    }
}

/*
ext_blk_ref$_ end_lt:uint64
    seq_no:uint32 root_hash:bits256 file_hash:bits256 = ExtBlkRef;
*/
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtBlkRef {
    pub end_lt: u64,
    pub seq_no: u32,
    pub root_hash: UInt256,
    pub file_hash: UInt256,
}

impl ExtBlkRef {
    /// Id of the referenced block in `shard_id` together with its end lt
    pub fn workchain_block_id(self, shard_id: ShardIdent) -> (u64, BlockIdExt) {
        (self.end_lt, BlockIdExt::with_params(shard_id, self.seq_no, self.root_hash, self.file_hash))
    }

    pub fn master_block_id(self) -> (u64, BlockIdExt) {
        self.workchain_block_id(ShardIdent::masterchain())
    }
}

impl From<&BlockIdExt> for ExtBlkRef {
    fn from(id: &BlockIdExt) -> Self {
        Self {
            end_lt: 0,
            seq_no: id.seq_no,
            root_hash: id.root_hash.clone(),
            file_hash: id.file_hash.clone(),
        }
    }
}

impl Deserializable for ExtBlkRef {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        Ok(Self {
            end_lt: slice.get_next_u64()?,
            seq_no: slice.get_next_u32()?,
            root_hash: UInt256::construct_from(slice)?,
            file_hash: UInt256::construct_from(slice)?,
        })
    }
}

impl Serializable for ExtBlkRef {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        cell.append_u64(self.end_lt)?;
        cell.append_u32(self.seq_no)?;
        self.root_hash.write_to(cell)?;
        self.file_hash.write_to(cell)
    }
}

/*
prev_blk_info$_
    prev:ExtBlkRef
    = BlkPrevInfo 0;

prev_blks_info$_
    prev1:^ExtBlkRef
    prev2:^ExtBlkRef
    = BlkPrevInfo 1;
*/
/// Reference to the previous block, or to both previous blocks after a merge
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlkPrevInfo {
    Block {
        prev: ExtBlkRef
    },
    Blocks {
        prev1: ChildCell<ExtBlkRef>,
        prev2: ChildCell<ExtBlkRef>
    },
}

impl Default for BlkPrevInfo {
    fn default() -> BlkPrevInfo {
        BlkPrevInfo::Block { prev: ExtBlkRef::default() }
    }
}

impl BlkPrevInfo {
    pub fn new(refs: Vec<ExtBlkRef>) -> Result<Self> {
        let mut refs = refs.into_iter();
        match (refs.next(), refs.next(), refs.next()) {
            (Some(prev), None, None) => Ok(BlkPrevInfo::Block { prev }),
            (Some(prev1), Some(prev2), None) => Ok(BlkPrevInfo::Blocks {
                prev1: ChildCell::with_struct(&prev1)?,
                prev2: ChildCell::with_struct(&prev2)?,
            }),
            _ => fail!(BlockError::InvalidArg("there must be one or two previous blocks".to_string()))
        }
    }

    fn read_with_merge(slice: &mut SliceData, after_merge: bool) -> Result<Self> {
        match after_merge {
            true => Ok(BlkPrevInfo::Blocks {
                prev1: ChildCell::construct_from(slice)?,
                prev2: ChildCell::construct_from(slice)?,
            }),
            false => Ok(BlkPrevInfo::Block { prev: ExtBlkRef::construct_from(slice)? })
        }
    }

    pub fn is_one_prev(&self) -> bool {
        matches!(self, BlkPrevInfo::Block { .. })
    }

    pub fn prev1(&self) -> Result<ExtBlkRef> {
        match self {
            BlkPrevInfo::Block { prev } => Ok(prev.clone()),
            BlkPrevInfo::Blocks { prev1, .. } => prev1.read_struct(),
        }
    }

    pub fn prev2(&self) -> Result<Option<ExtBlkRef>> {
        match self {
            BlkPrevInfo::Block { .. } => Ok(None),
            BlkPrevInfo::Blocks { prev2, .. } => prev2.read_struct().map(Some),
        }
    }
}

// the variant is defined by the enclosing BlockInfo, a single block is assumed here
impl Deserializable for BlkPrevInfo {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        Self::read_with_merge(slice, false)
    }
}

impl Serializable for BlkPrevInfo {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        match self {
            BlkPrevInfo::Block { prev } => prev.write_to(cell),
            BlkPrevInfo::Blocks { prev1, prev2 } => {
                prev1.write_to(cell)?;
                prev2.write_to(cell)
            }
        }
    }
}

/*
block_info#9bc7a987
  version:uint32
  not_master:(## 1)
  after_merge:(## 1)
  before_split:(## 1)
  after_split:(## 1)
  want_split:Bool
  want_merge:Bool
  key_block:Bool
  vert_seqno_incr:(## 1)
  flags:(## 8) { flags <= 1 }
  seq_no:#
  vert_seq_no:#
  { vert_seq_no >= vert_seqno_incr }
  { prev_seq_no:# } { ~prev_seq_no + 1 = seq_no }
  shard:ShardIdent
  gen_utime:uint32
  start_lt:uint64
  end_lt:uint64
  gen_validator_list_hash_short:uint32
  gen_catchain_seqno:uint32
  min_ref_mc_seqno:uint32
  prev_key_block_seqno:uint32
  gen_software:flags . 0?GlobalVersion
  master_ref:not_master?^BlkMasterInfo
  prev_ref:^(BlkPrevInfo after_merge)
  prev_vert_ref:vert_seqno_incr?^(BlkPrevInfo 0)
= BlockInfo;
*/
/// Block header
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockInfo {
    version: u32,
    after_merge: bool,
    before_split: bool,
    after_split: bool,
    want_split: bool,
    want_merge: bool,
    key_block: bool,

    vert_seqno_incr: u32,
    flags: u8,
    seq_no: u32,
    vert_seq_no: u32,

    shard: ShardIdent,
    gen_utime: UnixTime32,
    start_lt: u64,
    end_lt: u64,
    gen_validator_list_hash_short: u32,
    gen_catchain_seqno: u32,
    min_ref_mc_seqno: u32,
    prev_key_block_seqno: u32,
    gen_software: Option<GlobalVersion>,

    master_ref: Option<ChildCell<BlkMasterInfo>>,
    prev_ref: ChildCell<BlkPrevInfo>,
    prev_vert_ref: Option<ChildCell<BlkPrevInfo>>,
}

const GEN_SOFTWARE_EXISTS_FLAG: u8 = 1;

impl Default for BlockInfo {
    fn default() -> Self {
        BlockInfo {
            version: 0,
            after_merge: false,
            before_split: false,
            after_split: false,
            want_split: false,
            want_merge: false,
            key_block: false,
            vert_seqno_incr: 0,
            flags: 0,
            // zero is reserved for zerostates
            seq_no: 1,
            vert_seq_no: 0,
            shard: ShardIdent::default(),
            gen_utime: UnixTime32::default(),
            start_lt: 0,
            end_lt: 0,
            gen_validator_list_hash_short: 0,
            gen_catchain_seqno: 0,
            min_ref_mc_seqno: 0,
            prev_key_block_seqno: 0,
            gen_software: None,
            master_ref: None,
            prev_ref: ChildCell::default(),
            prev_vert_ref: None,
        }
    }
}

impl BlockInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self) -> u32 { self.version }
    pub fn set_version(&mut self, version: u32) { self.version = version }
    pub fn after_merge(&self) -> bool { self.after_merge }
    pub fn before_split(&self) -> bool { self.before_split }
    pub fn set_before_split(&mut self, before_split: bool) { self.before_split = before_split }
    pub fn after_split(&self) -> bool { self.after_split }
    pub fn set_after_split(&mut self, after_split: bool) { self.after_split = after_split }
    pub fn want_split(&self) -> bool { self.want_split }
    pub fn set_want_split(&mut self, want_split: bool) { self.want_split = want_split }
    pub fn want_merge(&self) -> bool { self.want_merge }
    pub fn set_want_merge(&mut self, want_merge: bool) { self.want_merge = want_merge }
    pub fn key_block(&self) -> bool { self.key_block }
    pub fn set_key_block(&mut self, key_block: bool) { self.key_block = key_block }
    pub fn flags(&self) -> u8 { self.flags }

    pub fn seq_no(&self) -> u32 { self.seq_no }
    pub fn set_seq_no(&mut self, seq_no: u32) -> Result<()> {
        if seq_no == 0 {
            fail!(BlockError::InvalidArg("`seq_no` can't be zero".to_string()))
        }
        self.seq_no = seq_no;
        Ok(())
    }

    pub fn shard(&self) -> &ShardIdent { &self.shard }
    pub fn set_shard(&mut self, shard: ShardIdent) { self.shard = shard }
    pub fn gen_utime(&self) -> UnixTime32 { self.gen_utime }
    pub fn set_gen_utime(&mut self, gen_utime: UnixTime32) { self.gen_utime = gen_utime }
    pub fn start_lt(&self) -> u64 { self.start_lt }
    pub fn set_start_lt(&mut self, start_lt: u64) { self.start_lt = start_lt }
    pub fn end_lt(&self) -> u64 { self.end_lt }
    pub fn set_end_lt(&mut self, end_lt: u64) { self.end_lt = end_lt }
    pub fn gen_validator_list_hash_short(&self) -> u32 { self.gen_validator_list_hash_short }
    pub fn set_gen_validator_list_hash_short(&mut self, hash: u32) { self.gen_validator_list_hash_short = hash }
    pub fn gen_catchain_seqno(&self) -> u32 { self.gen_catchain_seqno }
    pub fn set_gen_catchain_seqno(&mut self, cc_seqno: u32) { self.gen_catchain_seqno = cc_seqno }
    pub fn min_ref_mc_seqno(&self) -> u32 { self.min_ref_mc_seqno }
    pub fn set_min_ref_mc_seqno(&mut self, seqno: u32) { self.min_ref_mc_seqno = seqno }
    pub fn prev_key_block_seqno(&self) -> u32 { self.prev_key_block_seqno }
    pub fn set_prev_key_block_seqno(&mut self, seqno: u32) { self.prev_key_block_seqno = seqno }

    pub fn gen_software(&self) -> Option<&GlobalVersion> { self.gen_software.as_ref() }
    /// Also keeps the corresponding bit of `flags` in sync
    pub fn set_gen_software(&mut self, gen_software: Option<GlobalVersion>) {
        match gen_software {
            Some(_) => self.flags |= GEN_SOFTWARE_EXISTS_FLAG,
            None => self.flags &= !GEN_SOFTWARE_EXISTS_FLAG,
        }
        self.gen_software = gen_software;
    }

    pub fn read_master_ref(&self) -> Result<Option<BlkMasterInfo>> {
        self.master_ref.as_ref().map(ChildCell::read_struct).transpose()
    }

    pub fn write_master_ref(&mut self, value: Option<&BlkMasterInfo>) -> Result<()> {
        self.master_ref = value.map(ChildCell::with_struct).transpose()?;
        Ok(())
    }

    pub fn read_prev_ref(&self) -> Result<BlkPrevInfo> {
        BlkPrevInfo::read_with_merge(&mut SliceData::load_cell(self.prev_ref.cell()?)?, self.after_merge)
    }

    /// Ids of the previous blocks: two after a merge, the parent shard's one after a split
    pub fn read_prev_ids(&self) -> Result<Vec<BlockIdExt>> {
        let prev = self.read_prev_ref()?;
        let prev1 = prev.prev1()?;
        match prev.prev2()? {
            Some(prev2) => {
                let (left, right) = self.shard.split()?;
                Ok(vec![prev1.workchain_block_id(left).1, prev2.workchain_block_id(right).1])
            }
            None if self.after_split => Ok(vec![prev1.workchain_block_id(self.shard.merge()?).1]),
            None => Ok(vec![prev1.workchain_block_id(self.shard).1])
        }
    }

    pub fn set_prev_stuff(&mut self, after_merge: bool, prev_ref: &BlkPrevInfo) -> Result<()> {
        if after_merge == prev_ref.is_one_prev() {
            fail!(BlockError::InvalidArg(
                "`prev_ref` must refer two blocks exactly after merge".to_string()))
        }
        self.after_merge = after_merge;
        self.prev_ref.write_struct(prev_ref)
    }

    pub fn vert_seq_no(&self) -> u32 { self.vert_seq_no }
    pub fn vert_seqno_incr(&self) -> u32 { self.vert_seqno_incr }

    pub fn read_prev_vert_ref(&self) -> Result<Option<BlkPrevInfo>> {
        self.prev_vert_ref.as_ref().map(ChildCell::read_struct).transpose()
    }

    pub fn set_vertical_stuff(
        &mut self,
        vert_seqno_incr: u32,
        vert_seq_no: u32,
        prev_vert_ref: Option<BlkPrevInfo>
    ) -> Result<()> {
        if vert_seq_no < vert_seqno_incr {
            fail!(BlockError::InvalidArg(
                "`vert_seq_no` can't be less then `vert_seqno_incr`".to_string()))
        }
        if (vert_seqno_incr == 0) != prev_vert_ref.is_none() {
            fail!(BlockError::InvalidArg(
                "`prev_vert_ref` must be present exactly when `vert_seqno_incr` is set".to_string()))
        }
        self.vert_seqno_incr = vert_seqno_incr;
        self.vert_seq_no = vert_seq_no;
        self.prev_vert_ref = prev_vert_ref.as_ref().map(ChildCell::with_struct).transpose()?;
        Ok(())
    }

    // not_master, after_merge, before_split, after_split, want_split, want_merge, key_block, vert_seqno_incr
    fn header_bits(&self) -> [bool; 8] {
        [
            self.master_ref.is_some(),
            self.after_merge,
            self.before_split,
            self.after_split,
            self.want_split,
            self.want_merge,
            self.key_block,
            self.vert_seqno_incr != 0,
        ]
    }
}

const BLOCK_INFO_TAG: u32 = 0x9bc7a987;

impl Serializable for BlockInfo {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        if (self.flags & GEN_SOFTWARE_EXISTS_FLAG != 0) != self.gen_software.is_some() {
            fail!(BlockError::InvalidData("BlockInfo flags don't match `gen_software`".to_string()))
        }
        let header = self.header_bits().iter().fold(0u8, |byte, bit| byte << 1 | *bit as u8);
        cell.append_u32(BLOCK_INFO_TAG)?;
        cell.append_u32(self.version)?;
        cell.append_u8(header)?;
        cell.append_u8(self.flags)?;
        cell.append_u32(self.seq_no)?;
        cell.append_u32(self.vert_seq_no)?;
        self.shard.write_to(cell)?;
        self.gen_utime.write_to(cell)?;
        cell.append_u64(self.start_lt)?;
        cell.append_u64(self.end_lt)?;
        let tail = [
            self.gen_validator_list_hash_short,
            self.gen_catchain_seqno,
            self.min_ref_mc_seqno,
            self.prev_key_block_seqno,
        ];
        for value in tail.iter() {
            cell.append_u32(*value)?;
        }
        if let Some(gen_software) = &self.gen_software {
            gen_software.write_to(cell)?;
        }
        if let Some(master_ref) = &self.master_ref {
            master_ref.write_to(cell)?;
        }
        self.prev_ref.write_to(cell)?;
        if let Some(prev_vert_ref) = &self.prev_vert_ref {
            prev_vert_ref.write_to(cell)?;
        }
        Ok(())
    }
}

impl Deserializable for BlockInfo {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        let tag = slice.get_next_u32()?;
        if tag != BLOCK_INFO_TAG {
            fail!(BlockError::InvalidConstructorTag { t: tag, s: "BlockInfo".to_string() })
        }
        let mut info = BlockInfo { version: slice.get_next_u32()?, ..BlockInfo::default() };
        let header = slice.get_next_byte()?;
        let bit = |n: u8| (header >> (7 - n)) & 1 == 1;
        let not_master = bit(0);
        let after_merge = bit(1);
        info.before_split = bit(2);
        info.after_split = bit(3);
        info.want_split = bit(4);
        info.want_merge = bit(5);
        info.key_block = bit(6);
        let vert_seqno_incr = bit(7) as u32;

        info.flags = slice.get_next_byte()?;
        if info.flags > GEN_SOFTWARE_EXISTS_FLAG {
            fail!(BlockError::InvalidData(format!("BlockInfo flags {} are unsupported", info.flags)))
        }
        info.set_seq_no(slice.get_next_u32()?)?;
        let vert_seq_no = slice.get_next_u32()?;
        info.shard = ShardIdent::construct_from(slice)?;
        info.gen_utime = UnixTime32::construct_from(slice)?;
        info.start_lt = slice.get_next_u64()?;
        info.end_lt = slice.get_next_u64()?;
        info.gen_validator_list_hash_short = slice.get_next_u32()?;
        info.gen_catchain_seqno = slice.get_next_u32()?;
        info.min_ref_mc_seqno = slice.get_next_u32()?;
        info.prev_key_block_seqno = slice.get_next_u32()?;
        if info.flags & GEN_SOFTWARE_EXISTS_FLAG != 0 {
            info.gen_software = Some(GlobalVersion::construct_from(slice)?);
        }
        if not_master {
            info.master_ref = Some(ChildCell::construct_from(slice)?);
        }
        let mut prev_slice = SliceData::load_cell(slice.checked_drain_reference()?)?;
        let prev_ref = BlkPrevInfo::read_with_merge(&mut prev_slice, after_merge)?;
        info.set_prev_stuff(after_merge, &prev_ref)?;
        let prev_vert_ref = match vert_seqno_incr {
            0 => None,
            _ => Some(BlkPrevInfo::construct_from_reference(slice)?)
        };
        info.set_vertical_stuff(vert_seqno_incr, vert_seq_no, prev_vert_ref)?;
        Ok(info)
    }
}

/*
block_extra
    in_msg_descr:^InMsgDescr
    out_msg_descr:^OutMsgDescr
    account_blocks:^ShardAccountBlocks
    rand_seed:bits256
    created_by:bits256
    custom:(Maybe ^McBlockExtra)
= BlockExtra;
*/
/// Message and transaction descriptors are kept as opaque cells
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BlockExtra {
    in_msg_descr: Cell,
    out_msg_descr: Cell,
    account_blocks: Cell,
    rand_seed: UInt256,
    created_by: UInt256,
    custom: Option<ChildCell<McBlockExtra>>,
}

const BLOCK_EXTRA_TAG: u32 = 0x4a33f6fd;

impl BlockExtra {
    pub fn new() -> BlockExtra {
        Self::default()
    }

    pub fn rand_seed(&self) -> &UInt256 { &self.rand_seed }
    pub fn set_rand_seed(&mut self, rand_seed: UInt256) { self.rand_seed = rand_seed }

    pub fn created_by(&self) -> &UInt256 { &self.created_by }
    pub fn set_created_by(&mut self, created_by: UInt256) { self.created_by = created_by }

    pub fn read_custom(&self) -> Result<Option<McBlockExtra>> {
        self.custom.as_ref().map(ChildCell::read_struct).transpose()
    }

    pub fn write_custom(&mut self, value: Option<&McBlockExtra>) -> Result<()> {
        self.custom = value.map(ChildCell::with_struct).transpose()?;
        Ok(())
    }

    /// True if the masterchain part carries a configuration
    pub fn is_key_block(&self) -> bool {
        matches!(self.read_custom(), Ok(Some(custom)) if custom.is_key_block())
    }
}

impl Deserializable for BlockExtra {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        let tag = slice.get_next_u32()?;
        if tag != BLOCK_EXTRA_TAG {
            fail!(BlockError::InvalidConstructorTag { t: tag, s: "BlockExtra".to_string() })
        }
        Ok(BlockExtra {
            in_msg_descr: slice.checked_drain_reference()?,
            out_msg_descr: slice.checked_drain_reference()?,
            account_blocks: slice.checked_drain_reference()?,
            rand_seed: UInt256::construct_from(slice)?,
            created_by: UInt256::construct_from(slice)?,
            custom: ChildCell::<McBlockExtra>::read_maybe_from(slice)?,
        })
    }
}

impl Serializable for BlockExtra {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        cell.append_u32(BLOCK_EXTRA_TAG)?;
        for descr in [&self.in_msg_descr, &self.out_msg_descr, &self.account_blocks].iter() {
            descr.write_to(cell)?;
        }
        self.rand_seed.write_to(cell)?;
        self.created_by.write_to(cell)?;
        self.custom.write_maybe_to(cell)
    }
}

/*
block#11ef55aa global_id:int32
    info:^BlockInfo value_flow:^ValueFlow
    state_update:^(MERKLE_UPDATE ShardState)
    extra:^BlockExtra = Block;
*/
/// Block with every part kept in its own cell, so a pruned part
/// fails only when it is read
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct Block {
    pub global_id: i32,
    pub info: ChildCell<BlockInfo>,
    pub value_flow: Cell,
    pub state_update: ChildCell<MerkleUpdate>,
    pub extra: ChildCell<BlockExtra>,
}

const BLOCK_TAG: u32 = 0x11ef55aa;

impl Block {
    pub const DATA_FOR_SIGN_SIZE: usize = 4 + 32 + 32;
    const DATA_FOR_SIGN_TAG: [u8; 4] = [0x70, 0x6e, 0x0b, 0xc5];

    pub fn with_params(
        global_id: i32,
        info: BlockInfo,
        value_flow: Cell,
        state_update: MerkleUpdate,
        extra: BlockExtra,
    ) -> Result<Self> {
        Ok(Block {
            global_id,
            info: ChildCell::with_struct(&info)?,
            value_flow,
            state_update: ChildCell::with_struct(&state_update)?,
            extra: ChildCell::with_struct(&extra)?,
        })
    }

    pub fn global_id(&self) -> i32 { self.global_id }

    pub fn read_info(&self) -> Result<BlockInfo> { self.info.read_struct() }
    pub fn write_info(&mut self, value: &BlockInfo) -> Result<()> { self.info.write_struct(value) }

    pub fn read_state_update(&self) -> Result<MerkleUpdate> { self.state_update.read_struct() }

    pub fn read_extra(&self) -> Result<BlockExtra> { self.extra.read_struct() }
    pub fn write_extra(&mut self, value: &BlockExtra) -> Result<()> { self.extra.write_struct(value) }

    /// Configuration carried by a key block
    pub fn read_config(&self) -> Result<ConfigParams> {
        match self.read_extra()?.read_custom()? {
            Some(custom) => match custom.config() {
                Some(config) => Ok(config.clone()),
                None => fail!(BlockError::NotFound("config in masterchain block extra, not a key block".to_string()))
            }
            None => fail!(BlockError::NotFound("masterchain block extra".to_string()))
        }
    }

    /// Payload signed by validators: magic, root hash and file hash
    pub fn build_data_for_sign(root_hash: &UInt256, file_hash: &UInt256) -> [u8; Self::DATA_FOR_SIGN_SIZE] {
        let mut data = [0_u8; Self::DATA_FOR_SIGN_SIZE];
        data[..4].copy_from_slice(&Self::DATA_FOR_SIGN_TAG);
        data[4..36].copy_from_slice(root_hash.as_slice());
        data[36..].copy_from_slice(file_hash.as_slice());
        data
    }
}

impl Deserializable for Block {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        let tag = slice.get_next_u32()?;
        if tag != BLOCK_TAG {
            fail!(BlockError::InvalidConstructorTag { t: tag, s: "Block".to_string() })
        }
        Ok(Block {
            global_id: slice.get_next_i32()?,
            info: ChildCell::construct_from(slice)?,
            value_flow: slice.checked_drain_reference()?,
            state_update: ChildCell::construct_from(slice)?,
            extra: ChildCell::construct_from(slice)?,
        })
    }
}

impl Serializable for Block {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        cell.append_u32(BLOCK_TAG)?;
        cell.append_i32(self.global_id)?;
        self.info.write_to(cell)?;
        self.value_flow.write_to(cell)?;
        self.state_update.write_to(cell)?;
        self.extra.write_to(cell)
    }
}
