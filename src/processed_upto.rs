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
    define_HashmapE,
    error::BlockError,
    master::ShardHashes,
    outbound_messages::EnqueuedMsgDescr,
    shard::{bits_negate64, lower_bit64, shard_intersects, shard_is_ancestor, AccountIdPrefixFull, ShardIdent},
    Serializable, Deserializable,
};
use std::{collections::{BTreeSet, HashMap}, fmt};
use ton_types::{error, fail, BuilderData, Result, SliceData, UInt256};

/*
// key is [ shard:uint64 mc_seqno:uint32 ]
_ (HashmapE 96 ProcessedUpto) = ProcessedInfo;
*/
define_HashmapE!(ProcessedInfo, 96, ProcessedUpto);

/// Key of ProcessedInfo
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ProcessedInfoKey {
    pub shard: u64,
    pub mc_seqno: u32,
}

impl ProcessedInfoKey {
    pub fn with_params(shard: u64, mc_seqno: u32) -> Self {
        Self { shard, mc_seqno }
    }
}

impl Serializable for ProcessedInfoKey {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        self.shard.write_to(cell)?;
        self.mc_seqno.write_to(cell)?;
        Ok(())
    }
}

impl Deserializable for ProcessedInfoKey {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        let shard = slice.get_next_u64()?;
        let mc_seqno = slice.get_next_u32()?;
        Ok(Self { shard, mc_seqno })
    }
}

/*
processed_upto$_ last_msg_lt:uint64 last_msg_hash:bits256 = ProcessedUpto;
*/
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ProcessedUpto {
    pub last_msg_lt: u64,
    pub last_msg_hash: UInt256,
}

impl ProcessedUpto {
    pub fn with_params(last_msg_lt: u64, last_msg_hash: UInt256) -> Self {
        Self { last_msg_lt, last_msg_hash }
    }
}

impl Serializable for ProcessedUpto {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        self.last_msg_lt.write_to(cell)?;
        self.last_msg_hash.write_to(cell)?;
        Ok(())
    }
}

impl Deserializable for ProcessedUpto {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        let last_msg_lt = slice.get_next_u64()?;
        let last_msg_hash = UInt256::construct_from(slice)?;
        Ok(Self { last_msg_lt, last_msg_hash })
    }
}

/*
// key is [ src_addr:MsgAddressInt msg_hash:bits256 ] with 64-bit account prefix
_ (HashmapE 320 IhrPendingSince) = IhrPendingInfo;
*/
define_HashmapE!(IhrPendingInfo, 320, IhrPendingSince);

///
/// ihr_pending$_ import_lt:uint64 = IhrPendingSince;
///
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct IhrPendingSince {
    import_lt: u64,
}

impl IhrPendingSince {
    pub fn with_import_lt(import_lt: u64) -> Self {
        Self { import_lt }
    }

    pub fn import_lt(&self) -> u64 {
        self.import_lt
    }
}

impl Serializable for IhrPendingSince {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        self.import_lt.write_to(cell)
    }
}

impl Deserializable for IhrPendingSince {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        Ok(Self { import_lt: slice.get_next_u64()? })
    }
}

// key is [ dest_prefix:uint64 msg_hash:bits256 ]
impl IhrPendingInfo {
    /// Entries whose destination prefix lies in `shard`
    pub fn split_for(&self, shard: &ShardIdent) -> Result<Self> {
        let mut result = Self::default();
        self.iterate_slices_with_keys(|key, value| {
            let prefix = key.clone().get_next_u64()?;
            if shard.contains_prefix(shard.workchain_id(), prefix) {
                let mut builder = BuilderData::new();
                builder.checked_append_references_and_data(&value)?;
                result.0.set_builder(key, &builder)?;
            }
            Ok(true)
        })?;
        Ok(result)
    }

    pub fn merge_with(&mut self, other: &Self) -> Result<()> {
        other.iterate_slices_with_keys(|key, value| {
            let mut builder = BuilderData::new();
            builder.checked_append_references_and_data(&value)?;
            self.0.set_builder(key, &builder)?;
            Ok(true)
        })?;
        Ok(())
    }
}

/// checks if the account prefix lies inside the tagged shard prefix of any workchain
fn shard_contains(shard: u64, account_prefix: u64) -> bool {
    let x = lower_bit64(shard);
    ((shard ^ account_prefix) & (bits_negate64(x) << 1)) == 0
}

/// End logical time of shard chains as seen by the masterchain
pub trait ShardEndLt {
    /// End lt of the shard containing `prefix` registered in masterchain block `mc_seqno`
    fn shard_end_lt(&self, mc_seqno: u32, prefix: &AccountIdPrefixFull) -> Result<u64>;

    /// Returns false if nothing is known about masterchain block `mc_seqno`
    fn has_mc_seqno(&self, mc_seqno: u32) -> bool;
}

/// Masterchain snapshots indexed by seqno: end lt of the block and its shard hashes
#[derive(Clone, Debug, Default)]
pub struct McShardsSnapshots {
    snapshots: HashMap<u32, (u64, ShardHashes)>,
}

impl McShardsSnapshots {
    pub fn add(&mut self, mc_seqno: u32, mc_end_lt: u64, shards: ShardHashes) {
        self.snapshots.insert(mc_seqno, (mc_end_lt, shards));
    }
}

impl ShardEndLt for McShardsSnapshots {
    fn shard_end_lt(&self, mc_seqno: u32, prefix: &AccountIdPrefixFull) -> Result<u64> {
        let (mc_end_lt, shards) = self.snapshots.get(&mc_seqno)
            .ok_or_else(|| error!(BlockError::NotFound(format!("masterchain block {}", mc_seqno))))?;
        if prefix.is_masterchain() {
            return Ok(*mc_end_lt)
        }
        let shard = shards.find_shard_by_prefix(prefix)?
            .ok_or_else(|| error!(
                "masterchain block {} has no info about shard prefix {}", mc_seqno, prefix
            ))?;
        log::trace!(
            target: "processed_upto",
            "shard_end_lt: prefix={}, mc_seqno={}, end_lt={}, block={}",
            prefix, mc_seqno, shard.descr().end_lt, shard.block_id()
        );
        Ok(shard.descr().end_lt)
    }

    fn has_mc_seqno(&self, mc_seqno: u32) -> bool {
        self.snapshots.contains_key(&mc_seqno)
    }
}

/// Claim that every message up to (last_msg_lt, last_msg_hash) routed into `shard`
/// and known by masterchain block `mc_seqno` has been imported
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MsgProcessedUpto {
    pub shard: u64,
    pub mc_seqno: u32,
    pub last_msg_lt: u64,
    pub last_msg_hash: UInt256,
}

impl MsgProcessedUpto {
    pub fn with_params(shard: u64, mc_seqno: u32, last_msg_lt: u64, last_msg_hash: UInt256) -> Self {
        Self { shard, mc_seqno, last_msg_lt, last_msg_hash }
    }

    pub fn contains(&self, other: &Self) -> bool {
        shard_is_ancestor(self.shard, other.shard)
            && self.mc_seqno >= other.mc_seqno
            && (self.last_msg_lt > other.last_msg_lt
                || (self.last_msg_lt == other.last_msg_lt && self.last_msg_hash >= other.last_msg_hash))
    }

    pub fn already_processed(&self, enq: &EnqueuedMsgDescr, end_lt: &dyn ShardEndLt) -> Result<bool> {
        if enq.created_lt > self.last_msg_lt {
            return Ok(false)
        }
        if !shard_contains(self.shard, enq.next_prefix.prefix) {
            return Ok(false)
        }
        if enq.created_lt == self.last_msg_lt && self.last_msg_hash < enq.hash {
            return Ok(false)
        }
        if enq.same_workchain() && shard_contains(self.shard, enq.cur_prefix.prefix) {
            // generated and imported inside one shard without a masterchain reference
            return Ok(true)
        }
        let shard_end_lt = end_lt.shard_end_lt(self.mc_seqno, &enq.cur_prefix)?;
        log::trace!(
            target: "processed_upto",
            "{:x} is checked against {}: shard_end_lt={}", enq.hash, self, shard_end_lt
        );
        Ok(enq.enqueued_lt < shard_end_lt)
    }
}

impl fmt::Display for MsgProcessedUpto {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f, "shard: {:016X}, mc_seqno: {}, last_msg_lt: {}, last_msg_hash: {:x}",
            self.shard, self.mc_seqno, self.last_msg_lt, self.last_msg_hash
        )
    }
}

/// Watermarks of one shard
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MsgProcessedUptoCollection {
    owner: ShardIdent,
    list: Vec<MsgProcessedUpto>,
}

impl MsgProcessedUptoCollection {
    pub fn new(owner: ShardIdent) -> Self {
        Self {
            owner,
            list: Vec::new(),
        }
    }

    pub fn owner(&self) -> &ShardIdent {
        &self.owner
    }

    pub fn list(&self) -> &[MsgProcessedUpto] {
        &self.list
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Adds a watermark of the owner shard unless some existing one dominates it
    pub fn insert(&mut self, mc_seqno: u32, last_msg_lt: u64, last_msg_hash: UInt256) -> Result<bool> {
        if !self.owner.is_valid() {
            fail!(BlockError::InvalidOperation("watermarks of an invalid shard".to_string()))
        }
        let entry = MsgProcessedUpto::with_params(
            self.owner.shard_prefix_with_tag(), mc_seqno, last_msg_lt, last_msg_hash
        );
        if self.contains_value(&entry) {
            return Ok(false)
        }
        self.list.push(entry);
        Ok(true)
    }

    /// Removes watermarks dominated by other ones
    pub fn compactify(&mut self) -> bool {
        self.list.sort_by(|a, b| {
            (a.shard, a.mc_seqno, a.last_msg_lt, &a.last_msg_hash)
                .cmp(&(b.shard, b.mc_seqno, b.last_msg_lt, &b.last_msg_hash))
        });
        let n = self.list.len();
        let mut mark = vec![false; n];
        let mut found = false;
        for i in 0..n {
            for j in 0..n {
                if i != j && !mark[j] && self.list[j].contains(&self.list[i]) {
                    mark[i] = true;
                    found = true;
                    break;
                }
            }
        }
        if found {
            let before = n;
            let mut mark = mark.into_iter();
            self.list.retain(|_| !mark.next().unwrap_or(false));
            log::trace!(
                target: "processed_upto",
                "watermarks of {} compactified from {} to {}", self.owner, before, self.list.len()
            );
        }
        found
    }

    pub fn is_reduced(&self) -> bool {
        let n = self.list.len();
        for i in 1..n {
            for j in 0..i {
                if self.list[i].contains(&self.list[j]) || self.list[j].contains(&self.list[i]) {
                    return false
                }
            }
        }
        true
    }

    pub fn contains(&self, other: &Self) -> bool {
        other.list.iter().all(|entry| self.contains_value(entry))
    }

    pub fn contains_value(&self, value: &MsgProcessedUpto) -> bool {
        self.list.iter().any(|entry| entry.contains(value))
    }

    /// Checks that `self` extends `other` by at most one new watermark and returns it
    pub fn is_simple_update_of(&self, other: &Self) -> (bool, Option<MsgProcessedUpto>) {
        if !self.contains(other) {
            log::debug!(target: "processed_upto", "does not contain the previous value");
            return (false, None)
        }
        if other.contains(self) {
            return (true, None)
        }
        let mut found = None;
        for entry in &self.list {
            if !other.contains_value(entry) {
                if found.is_some() {
                    log::debug!(target: "processed_upto", "has more than one new entry");
                    return (false, found)
                }
                found = Some(entry.clone());
            }
        }
        (true, found)
    }

    /// Checks that the shard end lt may be resolved for every watermark
    pub fn can_check_processed(&self, end_lt: &dyn ShardEndLt) -> bool {
        self.list.iter().all(|entry| end_lt.has_mc_seqno(entry.mc_seqno))
    }

    /// Visits every distinct masterchain seqno in ascending order
    pub fn for_each_mc_seqno<F>(&self, mut func: F) -> Result<bool>
    where F: FnMut(u32) -> Result<bool> {
        let seqnos: BTreeSet<u32> = self.list.iter().map(|entry| entry.mc_seqno).collect();
        for mc_seqno in seqnos {
            if !func(mc_seqno)? {
                return Ok(false)
            }
        }
        Ok(true)
    }

    pub fn min_mc_seqno(&self) -> Option<u32> {
        self.list.iter().map(|entry| entry.mc_seqno).min()
    }

    pub fn already_processed(&self, enq: &EnqueuedMsgDescr, end_lt: &dyn ShardEndLt) -> Result<bool> {
        if !self.owner.contains_full_prefix(&enq.next_prefix) {
            return Ok(false)
        }
        for entry in &self.list {
            if entry.already_processed(enq, end_lt)? {
                return Ok(true)
            }
        }
        Ok(false)
    }

    /// Keeps the watermarks relevant for `new_owner`, a descendant of the current owner
    pub fn split(&mut self, new_owner: ShardIdent) -> Result<()> {
        if self.owner == new_owner {
            return Ok(())
        }
        if !self.owner.is_ancestor_for(&new_owner) {
            fail!(BlockError::InvalidArg(format!(
                "cannot split watermarks of {} for {}: not a descendant shard", self.owner, new_owner
            )))
        }
        let new_prefix = new_owner.shard_prefix_with_tag();
        self.list.retain(|entry| shard_intersects(entry.shard, new_prefix));
        for entry in self.list.iter_mut() {
            if lower_bit64(entry.shard) > lower_bit64(new_prefix) {
                entry.shard = new_prefix;
            }
        }
        self.owner = new_owner;
        self.compactify();
        Ok(())
    }

    /// Unites watermarks of two sibling shards under their parent
    pub fn combine_with(&mut self, other: &Self) -> Result<()> {
        if !self.owner.is_sibling_for(&other.owner) {
            fail!(BlockError::InvalidArg(format!(
                "cannot combine watermarks of {} and {}: not sibling shards", self.owner, other.owner
            )))
        }
        self.owner = self.owner.merge()?;
        self.list.extend(other.list.iter().cloned());
        self.compactify();
        Ok(())
    }

    pub fn pack(&self) -> Result<ProcessedInfo> {
        if !self.is_reduced() {
            fail!(BlockError::InvalidOperation(format!(
                "watermarks of {} must be compactified before packing", self.owner
            )))
        }
        let mut info = ProcessedInfo::default();
        for entry in &self.list {
            info.set(
                &ProcessedInfoKey::with_params(entry.shard, entry.mc_seqno),
                &ProcessedUpto::with_params(entry.last_msg_lt, entry.last_msg_hash.clone())
            )?;
        }
        Ok(info)
    }

    pub fn unpack(owner: ShardIdent, info: &ProcessedInfo) -> Result<Self> {
        let mut list = Vec::new();
        info.iterate_with_keys(|key: ProcessedInfoKey, value| {
            if key.shard == 0 {
                fail!(BlockError::InvalidData(format!(
                    "watermark of {} for mc block {} has empty shard prefix", owner, key.mc_seqno
                )))
            }
            list.push(MsgProcessedUpto::with_params(
                key.shard, key.mc_seqno, value.last_msg_lt, value.last_msg_hash
            ));
            Ok(true)
        })?;
        Ok(Self { owner, list })
    }
}

#[cfg(test)]
#[path = "tests/test_processed_upto.rs"]
mod tests;
