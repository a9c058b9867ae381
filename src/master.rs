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
    bintree::BinTree,
    blocks::{BlockIdExt, ExtBlkRef},
    config_params::ConfigParams,
    define_HashmapAugE, define_HashmapE,
    error::BlockError,
    hashmapaug::{AugNode, Augmentable},
    shard::{AccountIdPrefixFull, ShardIdent, MAX_SPLIT_DEPTH, SHARD_FULL},
    signature::CryptoSignaturePair,
    types::{CurrencyCollection, InRefValue},
    validators::ValidatorInfo,
    Deserializable, MaybeDeserialize, MaybeSerialize, Serializable,
};
use std::fmt;
use ton_types::{
    error, fail, Result,
    BuilderData, Cell, IBitstring, SliceData, UInt256,
};

/*
_ (HashmapE 32 ^(BinTree ShardDescr)) = ShardHashes;
_ (HashmapAugE 96 ShardFeeCreated ShardFeeCreated) = ShardFees;
*/
define_HashmapE!{ShardHashes, 32, InRefValue<BinTree<ShardDescr>>}
define_HashmapE!{CryptoSignatures, 16, CryptoSignaturePair}
define_HashmapAugE!(ShardFees, 96, ShardIdentFull, ShardFeeCreated, ShardFeeCreated);

/// Key of the fees dictionary: workchain and tagged prefix
#[derive(Clone, Debug, Default)]
pub struct ShardIdentFull {
    pub workchain_id: i32,
    pub prefix: u64,
}

impl ShardIdentFull {
    pub fn with_shard(shard: &ShardIdent) -> Self {
        Self {
            workchain_id: shard.workchain_id(),
            prefix: shard.shard_prefix_with_tag(),
        }
    }
}

impl Serializable for ShardIdentFull {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        cell.append_i32(self.workchain_id)?;
        cell.append_u64(self.prefix)?;
        Ok(())
    }
}

impl Deserializable for ShardIdentFull {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        Ok(Self {
            workchain_id: slice.get_next_i32()?,
            prefix: slice.get_next_u64()?,
        })
    }
}

impl fmt::Display for ShardIdentFull {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{:016X}", self.workchain_id, self.prefix)
    }
}

// the deepest possible shards at the left and at the right edge of `shard`
fn deepest_edges(shard: &ShardIdent) -> Result<(ShardIdent, ShardIdent)> {
    let tagged = shard.shard_prefix_with_tag();
    let left = ShardIdent::with_prefix_len(MAX_SPLIT_DEPTH, shard.workchain_id(), shard.shard_prefix_without_tag())?;
    let right = ShardIdent::with_prefix_len(MAX_SPLIT_DEPTH, shard.workchain_id(), tagged | (tagged - 1))?;
    Ok((left, right))
}

impl ShardHashes {
    fn workchain_tree(&self, workchain_id: i32) -> Result<BinTree<ShardDescr>> {
        match self.get(&workchain_id)? {
            Some(InRefValue(tree)) => Ok(tree),
            None => fail!(BlockError::NotFound(format!("workchain {}", workchain_id)))
        }
    }

    // applies `change` to the tree of the shard's workchain and stores the result
    fn change_tree(
        &mut self,
        shard: &ShardIdent,
        what: &str,
        change: impl FnOnce(&mut BinTree<ShardDescr>, SliceData) -> Result<bool>
    ) -> Result<()> {
        let mut tree = self.workchain_tree(shard.workchain_id())?;
        if !change(&mut tree, shard.shard_key()?)? {
            fail!(BlockError::NotFound(format!("{} shard {}", what, shard)))
        }
        self.set(&shard.workchain_id(), &InRefValue(tree))
    }

    fn collect_records(
        &self,
        workchain_id: Option<i32>,
        mut accept: impl FnMut(&ShardIdent) -> bool
    ) -> Result<Vec<McShardRecord>> {
        let mut records = Vec::new();
        let mut visit = |wc_id: i32, tree: BinTree<ShardDescr>| {
            tree.iterate(|prefix, descr| {
                let shard = ShardIdent::with_prefix_slice(wc_id, prefix)?;
                if accept(&shard) {
                    records.push(McShardRecord::from_shard_descr(shard, descr));
                }
                Ok(true)
            })
        };
        match workchain_id {
            Some(wc_id) => if let Some(InRefValue(tree)) = self.get(&wc_id)? {
                visit(wc_id, tree)?;
            }
            None => {
                self.iterate_with_keys(|wc_id: i32, InRefValue(tree)| visit(wc_id, tree))?;
            }
        }
        Ok(records)
    }

    /// Calls `func` for every registered shard of every workchain until it returns false
    pub fn iterate_shards<F>(&self, mut func: F) -> Result<bool>
    where F: FnMut(ShardIdent, ShardDescr) -> Result<bool> {
        self.iterate_with_keys(|wc_id: i32, InRefValue(tree)| {
            tree.iterate(|prefix, descr| func(ShardIdent::with_prefix_slice(wc_id, prefix)?, descr))
        })
    }

    pub fn has_workchain(&self, workchain_id: i32) -> Result<bool> {
        Ok(self.get(&workchain_id)?.is_some())
    }

    /// Shard record of `shard` or of its nearest ancestor
    pub fn find_shard(&self, shard: &ShardIdent) -> Result<Option<McShardRecord>> {
        let tree = match self.get(&shard.workchain_id())? {
            Some(InRefValue(tree)) => tree,
            None => return Ok(None)
        };
        tree.find(shard.shard_key()?)?
            .map(|(key, descr)| {
                let found = ShardIdent::with_prefix_slice(shard.workchain_id(), key)?;
                Ok(McShardRecord::from_shard_descr(found, descr))
            })
            .transpose()
    }

    /// Shard record covering the account address
    pub fn find_shard_by_prefix(&self, prefix: &AccountIdPrefixFull) -> Result<Option<McShardRecord>> {
        self.find_shard(&ShardIdent::with_prefix_len(MAX_SPLIT_DEPTH, prefix.workchain_id, prefix.prefix)?)
    }

    /// Shard record of exactly this shard
    pub fn get_shard(&self, shard: &ShardIdent) -> Result<Option<McShardRecord>> {
        let tree = match self.get(&shard.workchain_id())? {
            Some(InRefValue(tree)) => tree,
            None => return Ok(None)
        };
        Ok(tree.get(shard.shard_key()?)?.map(|descr| McShardRecord::from_shard_descr(*shard, descr)))
    }

    pub fn get_neighbours(&self, shard: &ShardIdent) -> Result<Vec<McShardRecord>> {
        self.collect_records(None, |other| shard.is_neighbor_for(other))
    }

    /// All registered shards intersecting with `shard`
    pub fn get_intersecting(&self, shard: &ShardIdent) -> Result<Vec<McShardRecord>> {
        self.collect_records(Some(shard.workchain_id()), |other| shard.intersect_with(other))
    }

    /// Catchain seqno for a new session of `shard`. After a merge it continues
    /// the sessions of both children.
    pub fn calc_shard_cc_seqno(&self, shard: &ShardIdent) -> Result<u32> {
        if shard.is_masterchain() {
            fail!(BlockError::InvalidArg(format!("{} is not a workchain shard", shard)))
        }
        ShardIdent::check_workchain_id(shard.workchain_id())?;
        let (left_edge, right_edge) = deepest_edges(shard)?;
        let left = self.find_shard(&left_edge)?
            .ok_or_else(|| error!(BlockError::NotFound(format!("shard covering the left edge of {}", shard))))?;
        if left.shard().is_ancestor_or_equal(shard) {
            return Ok(left.descr.next_catchain_seqno)
        }
        let right = self.find_shard(&right_edge)?
            .ok_or_else(|| error!(BlockError::NotFound(format!("shard covering the right edge of {}", shard))))?;
        for half in [&left, &right].iter() {
            if !shard.is_parent_for(half.shard()) {
                fail!(BlockError::InvalidData(format!("{} is neither inside nor a child of {}", half.shard(), shard)))
            }
        }
        Ok(left.descr.next_catchain_seqno.max(right.descr.next_catchain_seqno) + 1)
    }

    pub fn split_shard(
        &mut self,
        splitted_shard: &ShardIdent,
        splitter: impl FnOnce(ShardDescr) -> Result<(ShardDescr, ShardDescr)>
    ) -> Result<()> {
        self.change_tree(splitted_shard, "splitted", |tree, key| tree.split(key, splitter))
    }

    /// Replaces the two children of `new_shard` with their merged record
    pub fn merge_shards(
        &mut self,
        new_shard: &ShardIdent,
        merger: impl FnOnce(ShardDescr, ShardDescr) -> Result<ShardDescr>
    ) -> Result<()> {
        self.change_tree(new_shard, "parent of merged", |tree, key| tree.merge(key, merger))
    }

    pub fn update_shard(
        &mut self,
        shard: &ShardIdent,
        mutator: impl FnOnce(ShardDescr) -> Result<ShardDescr>
    ) -> Result<()> {
        self.change_tree(shard, "updated", |tree, key| tree.update(key, mutator))
    }

    /// Registers a workchain consisting of the single zerostate shard
    pub fn add_workchain(
        &mut self,
        workchain_id: i32,
        reg_mc_seqno: u32,
        zerostate_root_hash: UInt256,
        zerostate_file_hash: UInt256
    ) -> Result<()> {
        if self.has_workchain(workchain_id)? {
            fail!(BlockError::InvalidOperation(format!("workchain {} is already registered", workchain_id)))
        }
        let descr = ShardDescr {
            reg_mc_seqno,
            root_hash: zerostate_root_hash,
            file_hash: zerostate_file_hash,
            next_validator_shard: SHARD_FULL,
            ..ShardDescr::default()
        };
        self.set(&workchain_id, &InRefValue(BinTree::with_item(&descr)?))
    }
}

/// Top block of a shard published in the masterchain
#[derive(Clone, Default, Debug, Eq, PartialEq)]
pub struct McShardRecord {
    pub descr: ShardDescr,
    pub block_id: BlockIdExt,
}

impl McShardRecord {
    pub fn from_shard_descr(shard: ShardIdent, descr: ShardDescr) -> Self {
        let block_id = BlockIdExt::with_params(shard, descr.seq_no, descr.root_hash.clone(), descr.file_hash.clone());
        Self { descr, block_id }
    }
    pub fn shard(&self) -> &ShardIdent { self.block_id.shard() }
    pub fn descr(&self) -> &ShardDescr { &self.descr }
    pub fn block_id(&self) -> &BlockIdExt { &self.block_id }
}

impl ShardFees {
    pub fn store_shard_fees(
        &mut self,
        shard: &ShardIdent,
        fees: CurrencyCollection,
        created: CurrencyCollection
    ) -> Result<()> {
        let value = ShardFeeCreated { fees, create: created };
        self.set(&ShardIdentFull::with_shard(shard), &value, &value)
    }
}

/*
masterchain_block_extra#cca5
  key_block:(## 1)
  shard_hashes:ShardHashes
  shard_fees:ShardFees
  ^[ prev_blk_signatures:(HashmapE 16 CryptoSignaturePair)
     recover_create_msg:(Maybe ^InMsg)
     mint_msg:(Maybe ^InMsg) ]
  config:key_block?ConfigParams
= McBlockExtra;
*/
/// Inbound messages of the extra are kept as opaque cells
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct McBlockExtra {
    shards: ShardHashes,
    fees: ShardFees,
    prev_blk_signatures: CryptoSignatures,
    recover_create_msg: Option<Cell>,
    mint_msg: Option<Cell>,
    config: Option<ConfigParams>
}

impl McBlockExtra {
    /// Fees collected by all shards
    pub fn total_fee(&self) -> &CurrencyCollection {
        &self.fees.root_extra().fees
    }

    pub fn fee(&self, ident: &ShardIdent) -> Result<Option<CurrencyCollection>> {
        Ok(self.fees.get(&ShardIdentFull::with_shard(ident))?.map(|value| value.fees))
    }

    pub fn is_key_block(&self) -> bool { self.config.is_some() }

    pub fn shards(&self) -> &ShardHashes { &self.shards }
    pub fn shards_mut(&mut self) -> &mut ShardHashes { &mut self.shards }
    pub fn fees(&self) -> &ShardFees { &self.fees }
    pub fn fees_mut(&mut self) -> &mut ShardFees { &mut self.fees }
    pub fn prev_blk_signatures(&self) -> &CryptoSignatures { &self.prev_blk_signatures }
    pub fn prev_blk_signatures_mut(&mut self) -> &mut CryptoSignatures { &mut self.prev_blk_signatures }
    pub fn config(&self) -> Option<&ConfigParams> { self.config.as_ref() }
    pub fn set_config(&mut self, config: ConfigParams) { self.config = Some(config) }
    pub fn recover_create_msg_cell(&self) -> Option<&Cell> { self.recover_create_msg.as_ref() }
    pub fn mint_msg_cell(&self) -> Option<&Cell> { self.mint_msg.as_ref() }
}

const MC_BLOCK_EXTRA_TAG: u16 = 0xCCA5;

fn check_tag<T>(expected: u32, tag: u32) -> Result<()> {
    if tag != expected {
        fail!(BlockError::InvalidConstructorTag { t: tag, s: std::any::type_name::<T>().to_string() })
    }
    Ok(())
}

fn read_maybe_ref(slice: &mut SliceData) -> Result<Option<Cell>> {
    Ok(match slice.get_next_bit()? {
        true => Some(slice.checked_drain_reference()?),
        false => None
    })
}

fn write_maybe_ref(cell: &mut BuilderData, value: Option<&Cell>) -> Result<()> {
    cell.append_bit_bool(value.is_some())?;
    if let Some(value) = value {
        cell.checked_append_reference(value.clone())?;
    }
    Ok(())
}

impl Deserializable for McBlockExtra {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        check_tag::<Self>(MC_BLOCK_EXTRA_TAG as u32, slice.get_next_u16()? as u32)?;
        let key_block = slice.get_next_bit()?;
        let shards = ShardHashes::construct_from(slice)?;
        let fees = ShardFees::construct_from(slice)?;
        let mut signatures_cell = SliceData::load_cell(slice.checked_drain_reference()?)?;
        let prev_blk_signatures = CryptoSignatures::construct_from(&mut signatures_cell)?;
        let recover_create_msg = read_maybe_ref(&mut signatures_cell)?;
        let mint_msg = read_maybe_ref(&mut signatures_cell)?;
        let config = match key_block {
            true => Some(ConfigParams::construct_from(slice)?),
            false => None
        };
        Ok(Self { shards, fees, prev_blk_signatures, recover_create_msg, mint_msg, config })
    }
}

impl Serializable for McBlockExtra {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        let mut signatures_cell = self.prev_blk_signatures.write_to_new_cell()?;
        write_maybe_ref(&mut signatures_cell, self.recover_create_msg.as_ref())?;
        write_maybe_ref(&mut signatures_cell, self.mint_msg.as_ref())?;

        cell.append_u16(MC_BLOCK_EXTRA_TAG)?;
        cell.append_bit_bool(self.config.is_some())?;
        self.shards.write_to(cell)?;
        self.fees.write_to(cell)?;
        cell.checked_append_reference(signatures_cell.into_cell()?)?;
        if let Some(config) = &self.config {
            config.write_to(cell)?;
        }
        Ok(())
    }
}

// _ key:Bool max_end_lt:uint64 = KeyMaxLt;
/// Augmentation of the previous blocks index: whether a subtree holds
/// a key block and its maximal end lt
#[derive(Default, Clone, Debug, Eq, PartialEq)]
pub struct KeyMaxLt {
    pub key: bool,
    pub max_end_lt: u64
}

impl Deserializable for KeyMaxLt {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        Ok(Self { key: slice.get_next_bit()?, max_end_lt: slice.get_next_u64()? })
    }
}

impl Serializable for KeyMaxLt {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        cell.append_bit_bool(self.key)?;
        cell.append_u64(self.max_end_lt)?;
        Ok(())
    }
}

impl Augmentable for KeyMaxLt {
    fn calc(&mut self, other: &Self) -> Result<bool> {
        self.key |= other.key;
        self.max_end_lt = self.max_end_lt.max(other.max_end_lt);
        Ok(true)
    }
}

// _ key:Bool blk_ref:ExtBlkRef = KeyExtBlkRef;
#[derive(Default, Clone, Debug, Eq, PartialEq)]
pub struct KeyExtBlkRef {
    pub key: bool,
    pub blk_ref: ExtBlkRef
}

impl KeyExtBlkRef {
    /// Augmentation stored along with the item
    pub fn aug(&self) -> KeyMaxLt {
        KeyMaxLt { key: self.key, max_end_lt: self.blk_ref.end_lt }
    }
}

impl Deserializable for KeyExtBlkRef {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        let key = slice.get_next_bit()?;
        Ok(Self { key, blk_ref: ExtBlkRef::construct_from(slice)? })
    }
}

impl Serializable for KeyExtBlkRef {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        cell.append_bit_bool(self.key)?;
        self.blk_ref.write_to(cell)
    }
}

// _ (HashmapAugE 32 KeyExtBlkRef KeyMaxLt) = OldMcBlocksInfo;
// key - seq_no
define_HashmapAugE!(OldMcBlocksInfo, 32, u32, KeyExtBlkRef, KeyMaxLt);

// depth first search of a key block, `prev` selects the nearest one below or above req_seqno;
// `prefix` holds the seqno bits above the edge
fn find_key_block(
    cell: &Cell,
    bit_len: usize,
    prefix: u64,
    req_seqno: u32,
    prev: bool,
) -> Result<Option<KeyExtBlkRef>> {
    let node = AugNode::<KeyMaxLt>::read(cell, bit_len)?;
    if !node.extra().key {
        return Ok(None)
    }
    let mut label = node.label().clone();
    let label_len = label.remaining_bits();
    let prefix = match label_len {
        0 => prefix,
        _ => (prefix << label_len) | label.get_next_int(label_len)?
    };
    let rest = bit_len - label_len;
    let lowest = prefix << rest;
    let highest = lowest | ((1u64 << rest) - 1);
    if (prev && lowest > req_seqno as u64) || (!prev && highest < (req_seqno as u64)) {
        return Ok(None)
    }
    match node {
        AugNode::Leaf { mut value, .. } => {
            let id = KeyExtBlkRef::construct_from(&mut value)?;
            if !id.key {
                fail!(BlockError::InvalidData(
                    "OldMcBlocksInfo's leaf augmentation does not match its value".to_string()
                ))
            }
            Ok(Some(id))
        }
        AugNode::Fork { children, .. } => {
            let order = if prev { [1, 0] } else { [0, 1] };
            for index in order.iter() {
                let child_prefix = (prefix << 1) | *index as u64;
                if let Some(id) = find_key_block(&children[*index], rest - 1, child_prefix, req_seqno, prev)? {
                    return Ok(Some(id))
                }
            }
            Ok(None)
        }
    }
}

impl OldMcBlocksInfo {
    pub fn add(&mut self, id: &KeyExtBlkRef) -> Result<()> {
        self.set(&id.blk_ref.seq_no, id, &id.aug())
    }

    fn search_key_block(&self, req_seqno: u32, prev: bool) -> Result<Option<ExtBlkRef>> {
        Ok(match self.data() {
            Some(root) => find_key_block(root, self.bit_len(), 0, req_seqno, prev)?
                .map(|id| id.blk_ref),
            None => None
        })
    }

    /// Key block with the greatest seqno not above `req_seqno`
    pub fn get_prev_key_block(&self, req_seqno: u32) -> Result<Option<ExtBlkRef>> {
        self.search_key_block(req_seqno, true)
    }

    /// Key block with the least seqno not below `req_seqno`
    pub fn get_next_key_block(&self, req_seqno: u32) -> Result<Option<ExtBlkRef>> {
        self.search_key_block(req_seqno, false)
    }

    pub fn check_block(&self, id: &BlockIdExt) -> Result<()> {
        self.check_key_block(id, None)
    }

    /// Checks that `id` is recorded in the index, optionally with the given key flag
    pub fn check_key_block(&self, id: &BlockIdExt, is_key_opt: Option<bool>) -> Result<()> {
        if !id.shard().is_masterchain() {
            fail!(BlockError::InvalidArg(format!("{} is not a masterchain block", id)))
        }
        let found = self.get(&id.seq_no())?
            .ok_or_else(|| error!(BlockError::NotFound(format!("masterchain block with seqno {}", id.seq_no()))))?;
        if &found.blk_ref.root_hash != id.root_hash() || &found.blk_ref.file_hash != id.file_hash() {
            fail!(BlockError::InvalidData(format!(
                "block {} is recorded with root hash {:x} and file hash {:x}",
                id, found.blk_ref.root_hash, found.blk_ref.file_hash
            )))
        }
        match is_key_opt {
            Some(is_key) if is_key != found.key => fail!(BlockError::InvalidData(format!(
                "block {} is recorded with key flag {}", id, found.key
            ))),
            _ => Ok(())
        }
    }
}

// _ fees:CurrencyCollection create:CurrencyCollection = ShardFeeCreated;
#[derive(Default, Clone, Debug, Eq, PartialEq)]
pub struct ShardFeeCreated {
    pub fees: CurrencyCollection,
    pub create: CurrencyCollection,
}

impl Augmentable for ShardFeeCreated {
    fn calc(&mut self, other: &Self) -> Result<bool> {
        let fees = self.fees.calc(&other.fees)?;
        let create = self.create.calc(&other.create)?;
        Ok(fees && create)
    }
}

impl Deserializable for ShardFeeCreated {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        let fees = CurrencyCollection::construct_from(slice)?;
        Ok(Self { fees, create: CurrencyCollection::construct_from(slice)? })
    }
}

impl Serializable for ShardFeeCreated {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        self.fees.write_to(cell)?;
        self.create.write_to(cell)
    }
}

/// counters#_ last_updated:uint32 total:uint64 cnt2048:uint64 cnt65536:uint64 = Counters;
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Counters {
    last_updated: u32,
    total: u64,
    cnt2048: u64,
    cnt65536: u64,
}

impl Counters {
    /// Decaying counters are zero when nothing was counted and have
    /// an update time otherwise
    pub fn is_valid(&self) -> bool {
        match self.total {
            0 => self.cnt2048 == 0 && self.cnt65536 == 0,
            _ => self.last_updated != 0
        }
    }
    pub fn total(&self) -> u64 { self.total }
    pub fn last_updated(&self) -> u32 { self.last_updated }
}

impl Deserializable for Counters {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        let counters = Self {
            last_updated: slice.get_next_u32()?,
            total: slice.get_next_u64()?,
            cnt2048: slice.get_next_u64()?,
            cnt65536: slice.get_next_u64()?,
        };
        if !counters.is_valid() {
            fail!(BlockError::InvalidData("block creation counters are inconsistent".to_string()))
        }
        Ok(counters)
    }
}

impl Serializable for Counters {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        cell.append_u32(self.last_updated)?;
        for value in [self.total, self.cnt2048, self.cnt65536].iter() {
            cell.append_u64(*value)?;
        }
        Ok(())
    }
}

const CREATOR_STATS_TAG: usize = 0x4;

/// creator_info#4 mc_blocks:Counters shard_blocks:Counters = CreatorStats;
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CreatorStats {
    pub mc_blocks: Counters,
    pub shard_blocks: Counters,
}

impl Deserializable for CreatorStats {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        check_tag::<Self>(CREATOR_STATS_TAG as u32, slice.get_next_int(4)? as u32)?;
        let mc_blocks = Counters::construct_from(slice)?;
        Ok(Self { mc_blocks, shard_blocks: Counters::construct_from(slice)? })
    }
}

impl Serializable for CreatorStats {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        cell.append_bits(CREATOR_STATS_TAG, 4)?;
        self.mc_blocks.write_to(cell)?;
        self.shard_blocks.write_to(cell)
    }
}

define_HashmapE!{BlockCounters, 256, CreatorStats}

const BLOCK_CREATE_STATS_TAG: u8 = 0x17;

/// block_create_stats#17 counters:(HashmapE 256 CreatorStats) = BlockCreateStats;
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BlockCreateStats {
    pub counters: BlockCounters,
}

impl Deserializable for BlockCreateStats {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        check_tag::<Self>(BLOCK_CREATE_STATS_TAG as u32, slice.get_next_byte()? as u32)?;
        Ok(Self { counters: BlockCounters::construct_from(slice)? })
    }
}

impl Serializable for BlockCreateStats {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        cell.append_u8(BLOCK_CREATE_STATS_TAG)?;
        self.counters.write_to(cell)
    }
}

/*
masterchain_state_extra#cc26
  shard_hashes:ShardHashes
  config:ConfigParams
  ^[ flags:(## 16) { flags <= 1 }
     validator_info:ValidatorInfo
     prev_blocks:OldMcBlocksInfo
     after_key_block:Bool
     last_key_block:(Maybe ExtBlkRef)
     block_create_stats:(flags . 0)?BlockCreateStats ]
  global_balance:CurrencyCollection
= McStateExtra;
*/
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct McStateExtra {
    pub shards: ShardHashes,
    pub config: ConfigParams,
    pub validator_info: ValidatorInfo,
    pub prev_blocks: OldMcBlocksInfo,
    pub after_key_block: bool,
    pub last_key_block: Option<ExtBlkRef>,
    pub block_create_stats: Option<BlockCreateStats>,
    pub global_balance: CurrencyCollection,
}

const MC_STATE_EXTRA_TAG: u16 = 0xcc26;

impl McStateExtra {
    /// Registers a workchain with a single shard described by `descr`
    pub fn add_workchain(&mut self, workchain_id: i32, descr: &ShardDescr) -> Result<ShardIdent> {
        self.shards.set(&workchain_id, &InRefValue(BinTree::with_item(descr)?))?;
        ShardIdent::with_workchain_id(workchain_id)
    }

    /// Seqno of the top block of exactly this shard
    pub fn shard_seq_no(&self, ident: &ShardIdent) -> Result<Option<u32>> {
        Ok(self.shards.get_shard(ident)?.map(|record| record.descr.seq_no))
    }

    pub fn shards(&self) -> &ShardHashes { &self.shards }
    pub fn config(&self) -> &ConfigParams { &self.config }
    pub fn prev_blocks(&self) -> &OldMcBlocksInfo { &self.prev_blocks }
    pub fn last_key_block(&self) -> Option<&ExtBlkRef> { self.last_key_block.as_ref() }
}

impl Deserializable for McStateExtra {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        check_tag::<Self>(MC_STATE_EXTRA_TAG as u32, slice.get_next_u16()? as u32)?;
        let shards = ShardHashes::construct_from(slice)?;
        let config = ConfigParams::construct_from(slice)?;

        let mut other = SliceData::load_cell(slice.checked_drain_reference()?)?;
        let flags = other.get_next_u16()?;
        if flags > 1 {
            fail!(BlockError::InvalidData(format!("McStateExtra has unknown flags {:#x}", flags)))
        }
        let validator_info = ValidatorInfo::construct_from(&mut other)?;
        let prev_blocks = OldMcBlocksInfo::construct_from(&mut other)?;
        let after_key_block = other.get_next_bit()?;
        let last_key_block = ExtBlkRef::read_maybe_from(&mut other)?;
        let block_create_stats = match flags & 1 {
            0 => None,
            _ => Some(BlockCreateStats::construct_from(&mut other)?)
        };
        Ok(Self {
            shards,
            config,
            validator_info,
            prev_blocks,
            after_key_block,
            last_key_block,
            block_create_stats,
            global_balance: CurrencyCollection::construct_from(slice)?,
        })
    }
}

impl Serializable for McStateExtra {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        let mut other = BuilderData::new();
        other.append_u16(self.block_create_stats.is_some() as u16)?;
        self.validator_info.write_to(&mut other)?;
        self.prev_blocks.write_to(&mut other)?;
        other.append_bit_bool(self.after_key_block)?;
        self.last_key_block.write_maybe_to(&mut other)?;
        if let Some(stats) = &self.block_create_stats {
            stats.write_to(&mut other)?;
        }

        cell.append_u16(MC_STATE_EXTRA_TAG)?;
        self.shards.write_to(cell)?;
        self.config.write_to(cell)?;
        cell.checked_append_reference(other.into_cell()?)?;
        self.global_balance.write_to(cell)
    }
}

/*
fsm_none$0 = FutureSplitMerge;
fsm_split$10 split_utime:uint32 interval:uint32 = FutureSplitMerge;
fsm_merge$11 merge_utime:uint32 interval:uint32 = FutureSplitMerge;
*/
/// Planned split or merge of a shard and its time window
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FutureSplitMerge {
    None,
    Split {
        split_utime: u32,
        interval: u32,
    },
    Merge {
        merge_utime: u32,
        interval: u32,
    }
}

impl Default for FutureSplitMerge {
    fn default() -> Self {
        FutureSplitMerge::None
    }
}

impl FutureSplitMerge {
    // (start, interval) of the planned event
    fn window(&self) -> Option<(u32, u32)> {
        match *self {
            FutureSplitMerge::None => None,
            FutureSplitMerge::Split { split_utime, interval } => Some((split_utime, interval)),
            FutureSplitMerge::Merge { merge_utime, interval } => Some((merge_utime, interval)),
        }
    }
}

impl Deserializable for FutureSplitMerge {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        if !slice.get_next_bit()? {
            return Ok(FutureSplitMerge::None)
        }
        let merge = slice.get_next_bit()?;
        let utime = slice.get_next_u32()?;
        let interval = slice.get_next_u32()?;
        Ok(match merge {
            false => FutureSplitMerge::Split { split_utime: utime, interval },
            true => FutureSplitMerge::Merge { merge_utime: utime, interval },
        })
    }
}

impl Serializable for FutureSplitMerge {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        match self.window() {
            None => {
                cell.append_bit_zero()?;
            }
            Some((utime, interval)) => {
                cell.append_bit_one()?;
                cell.append_bit_bool(matches!(self, FutureSplitMerge::Merge { .. }))?;
                cell.append_u32(utime)?;
                cell.append_u32(interval)?;
            }
        }
        Ok(())
    }
}

/*
shard_descr#b seq_no:uint32 reg_mc_seqno:uint32
  start_lt:uint64 end_lt:uint64
  root_hash:bits256 file_hash:bits256
  before_split:Bool before_merge:Bool
  want_split:Bool want_merge:Bool
  nx_cc_updated:Bool flags:(## 3) { flags = 0 }
  next_catchain_seqno:uint32 next_validator_shard:uint64
  min_ref_mc_seqno:uint32 gen_utime:uint32
  split_merge_at:FutureSplitMerge
  fees_collected:CurrencyCollection
  funds_created:CurrencyCollection = ShardDescr;

shard_descr_new#a ... ^[ fees_collected:CurrencyCollection
  funds_created:CurrencyCollection ] = ShardDescr;
*/
/// Top block of a shard as registered in the masterchain
#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub struct ShardDescr {
    pub seq_no: u32,
    pub reg_mc_seqno: u32,
    pub start_lt: u64,
    pub end_lt: u64,
    pub root_hash: UInt256,
    pub file_hash: UInt256,
    pub before_split: bool,
    pub before_merge: bool,
    pub want_split: bool,
    pub want_merge: bool,
    pub nx_cc_updated: bool,
    pub next_catchain_seqno: u32,
    pub next_validator_shard: u64,
    pub min_ref_mc_seqno: u32,
    pub gen_utime: u32,
    pub split_merge_at: FutureSplitMerge,
    pub fees_collected: CurrencyCollection,
    pub funds_created: CurrencyCollection,
}

impl ShardDescr {
    pub fn with_params(seq_no: u32, start_lt: u64, end_lt: u64, root_hash: UInt256, split_merge_at: FutureSplitMerge) -> Self {
        ShardDescr { seq_no, start_lt, end_lt, root_hash, split_merge_at, ..ShardDescr::default() }
    }
    pub fn is_fsm_merge(&self) -> bool {
        matches!(self.split_merge_at, FutureSplitMerge::Merge{..})
    }
    pub fn is_fsm_split(&self) -> bool {
        matches!(self.split_merge_at, FutureSplitMerge::Split{..})
    }
    pub fn is_fsm_none(&self) -> bool {
        self.split_merge_at == FutureSplitMerge::None
    }
    pub fn fsm_utime(&self) -> u32 {
        self.split_merge_at.window().map_or(0, |(utime, _)| utime)
    }
    pub fn fsm_utime_end(&self) -> u32 {
        self.split_merge_at.window().map_or(0, |(utime, interval)| utime.saturating_add(interval))
    }
    /// Checks that utime falls into the split/merge window
    pub fn fsm_active_at(&self, utime: u32) -> bool {
        !self.is_fsm_none() && utime >= self.fsm_utime() && utime < self.fsm_utime_end()
    }

    // before_split..nx_cc_updated from the high bit, three low bits are reserved
    fn packed_flags(&self) -> u8 {
        [self.before_split, self.before_merge, self.want_split, self.want_merge, self.nx_cc_updated]
            .iter()
            .fold(0u8, |acc, bit| (acc << 1) | *bit as u8) << 3
    }
}

const SHARD_DESCR_TAG_LEN: usize = 4;
const SHARD_DESCR_TAG_REF_FEES: u8 = 0xa;
const SHARD_DESCR_TAG_INLINE_FEES: u8 = 0xb;

impl Deserializable for ShardDescr {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        let tag = slice.get_next_int(SHARD_DESCR_TAG_LEN)? as u8;
        if tag != SHARD_DESCR_TAG_REF_FEES && tag != SHARD_DESCR_TAG_INLINE_FEES {
            fail!(BlockError::InvalidConstructorTag { t: tag as u32, s: "ShardDescr".to_string() })
        }
        let mut descr = ShardDescr {
            seq_no: slice.get_next_u32()?,
            reg_mc_seqno: slice.get_next_u32()?,
            start_lt: slice.get_next_u64()?,
            end_lt: slice.get_next_u64()?,
            root_hash: UInt256::construct_from(slice)?,
            file_hash: UInt256::construct_from(slice)?,
            ..ShardDescr::default()
        };
        // zerostate records registered with the workchain carry no lt range
        if descr.seq_no != 0 && descr.end_lt <= descr.start_lt {
            fail!(BlockError::InvalidData(format!(
                "ShardDescr of block {} has end_lt {} not above start_lt {}",
                descr.seq_no, descr.end_lt, descr.start_lt
            )))
        }
        let flags = slice.get_next_byte()?;
        if flags & 7 != 0 {
            fail!(BlockError::InvalidData(format!("reserved flags of ShardDescr are set: {:#04x}", flags)))
        }
        descr.before_split = flags & 0x80 != 0;
        descr.before_merge = flags & 0x40 != 0;
        descr.want_split = flags & 0x20 != 0;
        descr.want_merge = flags & 0x10 != 0;
        descr.nx_cc_updated = flags & 0x08 != 0;
        descr.next_catchain_seqno = slice.get_next_u32()?;
        descr.next_validator_shard = slice.get_next_u64()?;
        descr.min_ref_mc_seqno = slice.get_next_u32()?;
        descr.gen_utime = slice.get_next_u32()?;
        descr.split_merge_at = FutureSplitMerge::construct_from(slice)?;
        let mut fees_slice;
        let fees_source = if tag == SHARD_DESCR_TAG_INLINE_FEES {
            slice
        } else {
            fees_slice = SliceData::load_cell(slice.checked_drain_reference()?)?;
            &mut fees_slice
        };
        descr.fees_collected = CurrencyCollection::construct_from(fees_source)?;
        descr.funds_created = CurrencyCollection::construct_from(fees_source)?;
        Ok(descr)
    }
}

impl Serializable for ShardDescr {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        let mut fees = BuilderData::new();
        self.fees_collected.write_to(&mut fees)?;
        self.funds_created.write_to(&mut fees)?;

        cell.append_bits(SHARD_DESCR_TAG_REF_FEES as usize, SHARD_DESCR_TAG_LEN)?;
        cell.append_u32(self.seq_no)?;
        cell.append_u32(self.reg_mc_seqno)?;
        cell.append_u64(self.start_lt)?;
        cell.append_u64(self.end_lt)?;
        self.root_hash.write_to(cell)?;
        self.file_hash.write_to(cell)?;
        cell.append_u8(self.packed_flags())?;
        cell.append_u32(self.next_catchain_seqno)?;
        cell.append_u64(self.next_validator_shard)?;
        cell.append_u32(self.min_ref_mc_seqno)?;
        cell.append_u32(self.gen_utime)?;
        self.split_merge_at.write_to(cell)?;
        cell.checked_append_reference(fees.into_cell()?)?;
        Ok(())
    }
}

/*
master_info$_ master:ExtBlkRef = BlkMasterInfo;
*/
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct BlkMasterInfo {
    pub master: ExtBlkRef
}

impl Deserializable for BlkMasterInfo {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        Ok(Self { master: ExtBlkRef::construct_from(slice)? })
    }
}

impl Serializable for BlkMasterInfo {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        self.master.write_to(cell)
    }
}

#[cfg(test)]
#[path = "tests/test_master.rs"]
mod tests;
