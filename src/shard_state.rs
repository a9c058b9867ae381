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
    blocks::BlockIdExt,
    error::BlockError,
    master::{BlkMasterInfo, BlockCreateStats, McStateExtra},
    outbound_messages::{OutMsgQueue, OutMsgQueueInfo},
    processed_upto::{IhrPendingInfo, MsgProcessedUptoCollection},
    shard::ShardIdent,
    shard_accounts::ShardAccounts,
    types::{ChildCell, CurrencyCollection, Grams, VarUInteger32},
    MaybeDeserialize, MaybeSerialize, Serializable, Deserializable,
};
use num::BigInt;
use std::cmp::{max, min};
use ton_types::{
    error, fail, Result,
    BuilderData, Cell, IBitstring, SliceData, UInt256,
};

pub const SHARD_STATE_UNSPLIT_PFX: u32 = 0x9023afe2;

///
/// Struct ShardStateUnsplit
///
// shard_state#9023afe2
//     global_id:int32
//     shard_id:ShardIdent
//     seq_no:uint32
//     vert_seq_no:#
//     gen_utime:uint32
//     gen_lt:uint64
//     min_ref_mc_seqno:uint32
//     out_msg_queue_info:^OutMsgQueueInfo
//     before_split:(## 1)
//     accounts:^ShardAccounts
//     ^[
//         overload_history:uint64
//         underload_history:uint64
//         total_balance:CurrencyCollection
//         total_validator_fees:CurrencyCollection
//         libraries:(HashmapE 256 LibDescr)
//         master_ref:(Maybe BlkMasterInfo)
//     ]
//     custom:(Maybe ^McStateExtra)
// = ShardStateUnsplit;
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct ShardStateUnsplit {
    global_id: i32,
    shard_id: ShardIdent,
    seq_no: u32,
    vert_seq_no: u32,
    gen_time: u32,
    gen_lt: u64,
    min_ref_mc_seqno: u32,
    out_msg_queue_info: ChildCell<OutMsgQueueInfo>,
    before_split: bool,
    accounts: ChildCell<ShardAccounts>,
    // next fields in separate cell
    overload_history: u64,
    underload_history: u64,
    total_balance: CurrencyCollection,
    total_validator_fees: CurrencyCollection,
    libraries: Option<Cell>, // root of the library dictionary, present only in masterchain states
    master_ref: Option<BlkMasterInfo>,

    custom: Option<ChildCell<McStateExtra>>,
}

impl ShardStateUnsplit {
    pub fn with_ident(shard_id: ShardIdent) -> Self {
        Self {
            shard_id,
            ..Self::default()
        }
    }

    pub fn id(&self) -> String {
        format!("shard: {}, seq_no: {}", self.shard(), self.seq_no)
    }

    pub fn global_id(&self) -> i32 { self.global_id }
    pub fn set_global_id(&mut self, value: i32) { self.global_id = value }

    pub fn shard(&self) -> &ShardIdent { &self.shard_id }

    pub fn seq_no(&self) -> u32 { self.seq_no }
    pub fn set_seq_no(&mut self, seq_no: u32) { self.seq_no = seq_no }

    pub fn vert_seq_no(&self) -> u32 { self.vert_seq_no }
    pub fn set_vert_seq_no(&mut self, value: u32) { self.vert_seq_no = value }

    pub fn gen_time(&self) -> u32 { self.gen_time }
    pub fn set_gen_time(&mut self, value: u32) { self.gen_time = value }

    pub fn gen_lt(&self) -> u64 { self.gen_lt }
    pub fn set_gen_lt(&mut self, value: u64) { self.gen_lt = value }

    pub fn min_ref_mc_seqno(&self) -> u32 { self.min_ref_mc_seqno }
    pub fn set_min_ref_mc_seqno(&mut self, value: u32) { self.min_ref_mc_seqno = value }

    pub fn read_out_msg_queue_info(&self) -> Result<OutMsgQueueInfo> {
        self.out_msg_queue_info.read_struct()
    }

    pub fn write_out_msg_queue_info(&mut self, value: &OutMsgQueueInfo) -> Result<()> {
        self.out_msg_queue_info.write_struct(value)
    }

    pub fn before_split(&self) -> bool { self.before_split }
    pub fn set_before_split(&mut self, value: bool) { self.before_split = value }

    pub fn read_accounts(&self) -> Result<ShardAccounts> {
        self.accounts.read_struct()
    }

    pub fn write_accounts(&mut self, value: &ShardAccounts) -> Result<()> {
        self.accounts.write_struct(value)
    }

    pub fn overload_history(&self) -> u64 { self.overload_history }
    pub fn set_overload_history(&mut self, value: u64) { self.overload_history = value }

    pub fn underload_history(&self) -> u64 { self.underload_history }
    pub fn set_underload_history(&mut self, value: u64) { self.underload_history = value }

    pub fn total_balance(&self) -> &CurrencyCollection { &self.total_balance }
    pub fn set_total_balance(&mut self, value: CurrencyCollection) { self.total_balance = value }

    pub fn total_validator_fees(&self) -> &CurrencyCollection { &self.total_validator_fees }
    pub fn set_total_validator_fees(&mut self, value: CurrencyCollection) { self.total_validator_fees = value }

    pub fn libraries(&self) -> Option<&Cell> { self.libraries.as_ref() }
    pub fn set_libraries(&mut self, root: Option<Cell>) { self.libraries = root }

    pub fn master_ref(&self) -> Option<&BlkMasterInfo> { self.master_ref.as_ref() }
    pub fn set_master_ref(&mut self, value: Option<BlkMasterInfo>) { self.master_ref = value }

    pub fn is_key_state(&self) -> bool {
        self.custom.is_some()
    }

    pub fn read_custom(&self) -> Result<Option<McStateExtra>> {
        match self.custom {
            None => Ok(None),
            Some(ref custom) => Ok(Some(custom.read_struct()?))
        }
    }

    pub fn write_custom(&mut self, value: Option<&McStateExtra>) -> Result<()> {
        self.custom = match value {
            Some(custom) => Some(ChildCell::with_struct(custom)?),
            None => None
        };
        Ok(())
    }
}

impl Deserializable for ShardStateUnsplit {
    fn read_from(&mut self, cell: &mut SliceData) -> Result<()> {
        let tag = cell.get_next_u32()?;
        if tag != SHARD_STATE_UNSPLIT_PFX {
            fail!(
                BlockError::InvalidConstructorTag {
                    t: tag,
                    s: "ShardStateUnsplit".to_string()
                }
            )
        }
        self.global_id = i32::construct_from(cell)?;
        self.shard_id = ShardIdent::construct_from(cell)?;
        self.seq_no = cell.get_next_u32()?;
        self.vert_seq_no = cell.get_next_u32()?;
        self.gen_time = cell.get_next_u32()?;
        self.gen_lt = cell.get_next_u64()?;
        self.min_ref_mc_seqno = cell.get_next_u32()?;
        self.out_msg_queue_info = ChildCell::construct_from(cell)?;
        self.before_split = cell.get_next_bit()?;
        self.accounts = ChildCell::construct_from(cell)?;

        let cell1 = &mut SliceData::load_cell(cell.checked_drain_reference()?)?;
        self.overload_history = cell1.get_next_u64()?;
        self.underload_history = cell1.get_next_u64()?;
        self.total_balance = CurrencyCollection::construct_from(cell1)?;
        self.total_validator_fees = CurrencyCollection::construct_from(cell1)?;
        self.libraries = match cell1.get_next_bit()? {
            true => Some(cell1.checked_drain_reference()?),
            false => None
        };
        self.master_ref = BlkMasterInfo::read_maybe_from(cell1)?;

        self.custom = match cell.get_next_bit()? {
            true => Some(ChildCell::construct_from(cell)?),
            false => None
        };
        Ok(())
    }
}

impl Serializable for ShardStateUnsplit {
    fn write_to(&self, builder: &mut BuilderData) -> Result<()> {
        builder.append_u32(SHARD_STATE_UNSPLIT_PFX)?;
        self.global_id.write_to(builder)?;
        self.shard_id.write_to(builder)?;
        self.seq_no.write_to(builder)?;
        self.vert_seq_no.write_to(builder)?;
        self.gen_time.write_to(builder)?;
        self.gen_lt.write_to(builder)?;
        self.min_ref_mc_seqno.write_to(builder)?;
        self.out_msg_queue_info.write_to(builder)?;
        builder.append_bit_bool(self.before_split)?;
        self.accounts.write_to(builder)?;

        let mut b2 = BuilderData::new();
        self.overload_history.write_to(&mut b2)?;
        self.underload_history.write_to(&mut b2)?;
        self.total_balance.write_to(&mut b2)?;
        self.total_validator_fees.write_to(&mut b2)?;
        match &self.libraries {
            Some(root) => {
                b2.append_bit_one()?;
                b2.checked_append_reference(root.clone())?;
            }
            None => {
                b2.append_bit_zero()?;
            }
        }
        self.master_ref.write_maybe_to(&mut b2)?;
        builder.checked_append_reference(b2.into_cell()?)?;

        builder.append_bit_bool(self.custom.is_some())?;
        if let Some(ref custom) = self.custom {
            custom.write_to(builder)?;
        }
        Ok(())
    }
}

/// Decoded shard state with its member dictionaries unpacked
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ShardStateSnapshot {
    id: BlockIdExt,
    global_id: i32,
    vert_seq_no: u32,
    gen_time: u32,
    gen_lt: u64,
    min_ref_mc_seqno: u32,
    before_split: bool,
    accounts: ShardAccounts,
    out_queue: OutMsgQueue,
    processed_upto: MsgProcessedUptoCollection,
    ihr_pending: IhrPendingInfo,
    overload_history: u64,
    underload_history: u64,
    total_balance: CurrencyCollection,
    total_validator_fees: CurrencyCollection,
    libraries: Option<Cell>,
    master_ref: Option<BlkMasterInfo>,
    mc_extra: Option<McStateExtra>,
}

impl ShardStateSnapshot {
    /// Decodes the state of block `id` and checks it is consistent
    pub fn unpack(id: &BlockIdExt, root: Cell) -> Result<Self> {
        if !id.is_valid() {
            fail!(BlockError::InvalidArg(format!("cannot unpack state of invalid block {}", id)))
        }
        if root.repr_hash() != id.root_hash {
            fail!(BlockError::WrongHash)
        }
        let state = ShardStateUnsplit::construct_from_cell(root)?;
        if state.shard() != id.shard() {
            fail!(BlockError::InvalidData(format!(
                "state for block {} belongs to shard {}", id, state.shard()
            )))
        }
        if state.seq_no() != id.seq_no() {
            fail!(BlockError::InvalidData(format!(
                "state for block {} has seq_no {}", id, state.seq_no()
            )))
        }
        let mc_extra = state.read_custom()?;
        if id.is_masterchain() != mc_extra.is_some() {
            fail!(BlockError::InvalidData(format!(
                "state for block {} {} masterchain extra", id,
                if mc_extra.is_some() { "has unexpected" } else { "has no" }
            )))
        }
        let accounts = state.read_accounts()?;
        if accounts.full_balance() != state.total_balance() {
            fail!(BlockError::InvalidData(format!(
                "state for block {} declares total balance {} but its accounts hold {}",
                id, state.total_balance(), accounts.full_balance()
            )))
        }
        let (out_queue, proc_info, ihr_pending) = state.read_out_msg_queue_info()?.into_parts();
        let processed_upto = MsgProcessedUptoCollection::unpack(id.shard().clone(), &proc_info)
            .map_err(|err| error!("cannot unpack processed info of {}: {}", id, err))?;
        log::debug!(target: "shard_state", "unpacked state of {}", id);
        Ok(Self {
            id: id.clone(),
            global_id: state.global_id,
            vert_seq_no: state.vert_seq_no,
            gen_time: state.gen_time,
            gen_lt: state.gen_lt,
            min_ref_mc_seqno: state.min_ref_mc_seqno,
            before_split: state.before_split,
            accounts,
            out_queue,
            processed_upto,
            ihr_pending,
            overload_history: state.overload_history,
            underload_history: state.underload_history,
            total_balance: state.total_balance,
            total_validator_fees: state.total_validator_fees,
            libraries: state.libraries,
            master_ref: state.master_ref,
            mc_extra,
        })
    }

    /// Builds the state record back, the caller serializes it
    pub fn pack(&self) -> Result<ShardStateUnsplit> {
        self.check_valid()?;
        let info = OutMsgQueueInfo::with_params(
            self.out_queue.clone(),
            self.processed_upto.pack()?,
            self.ihr_pending.clone(),
        );
        let mut state = ShardStateUnsplit {
            global_id: self.global_id,
            shard_id: self.id.shard().clone(),
            seq_no: self.id.seq_no(),
            vert_seq_no: self.vert_seq_no,
            gen_time: self.gen_time,
            gen_lt: self.gen_lt,
            min_ref_mc_seqno: self.min_ref_mc_seqno,
            before_split: self.before_split,
            overload_history: self.overload_history,
            underload_history: self.underload_history,
            total_balance: self.total_balance.clone(),
            total_validator_fees: self.total_validator_fees.clone(),
            libraries: self.libraries.clone(),
            master_ref: self.master_ref.clone(),
            ..ShardStateUnsplit::default()
        };
        state.write_out_msg_queue_info(&info)?;
        state.write_accounts(&self.accounts)?;
        state.write_custom(self.mc_extra.as_ref())?;
        Ok(state)
    }

    pub fn id(&self) -> &BlockIdExt { &self.id }
    pub fn shard(&self) -> &ShardIdent { self.id.shard() }
    pub fn seq_no(&self) -> u32 { self.id.seq_no() }
    pub fn global_id(&self) -> i32 { self.global_id }
    pub fn gen_time(&self) -> u32 { self.gen_time }
    pub fn gen_lt(&self) -> u64 { self.gen_lt }
    pub fn min_ref_mc_seqno(&self) -> u32 { self.min_ref_mc_seqno }
    pub fn before_split(&self) -> bool { self.before_split }
    pub fn accounts(&self) -> &ShardAccounts { &self.accounts }
    pub fn out_queue(&self) -> &OutMsgQueue { &self.out_queue }
    pub fn processed_upto(&self) -> &MsgProcessedUptoCollection { &self.processed_upto }
    pub fn ihr_pending(&self) -> &IhrPendingInfo { &self.ihr_pending }
    pub fn overload_history(&self) -> u64 { self.overload_history }
    pub fn underload_history(&self) -> u64 { self.underload_history }
    pub fn total_balance(&self) -> &CurrencyCollection { &self.total_balance }
    pub fn total_validator_fees(&self) -> &CurrencyCollection { &self.total_validator_fees }
    pub fn libraries(&self) -> Option<&Cell> { self.libraries.as_ref() }
    pub fn master_ref(&self) -> Option<&BlkMasterInfo> { self.master_ref.as_ref() }
    pub fn mc_extra(&self) -> Option<&McStateExtra> { self.mc_extra.as_ref() }

    pub fn global_balance(&self) -> Option<&CurrencyCollection> {
        self.mc_extra.as_ref().map(|extra| &extra.global_balance)
    }

    pub fn block_create_stats(&self) -> Option<&BlockCreateStats> {
        self.mc_extra.as_ref().and_then(|extra| extra.block_create_stats.as_ref())
    }

    /// false once the snapshot has been consumed by `merge_with`
    pub fn is_valid(&self) -> bool {
        self.id.is_valid()
    }

    fn check_valid(&self) -> Result<()> {
        if !self.is_valid() {
            fail!(BlockError::FatalError("shard state was consumed by merge".to_string()))
        }
        Ok(())
    }

    fn check_resharding(&self) -> Result<()> {
        self.check_valid()?;
        if self.id.is_masterchain() {
            fail!(BlockError::InvalidOperation(format!(
                "masterchain state {} cannot be split or merged", self.id
            )))
        }
        Ok(())
    }

    /// Joins the sibling state into this one, the result belongs to the parent shard.
    /// The sibling is consumed and must not be used anymore
    pub fn merge_with(&mut self, sibling: &mut Self) -> Result<()> {
        self.check_resharding()?;
        sibling.check_resharding()?;
        if !self.shard().is_sibling_for(sibling.shard()) {
            fail!(BlockError::InvalidArg(format!(
                "cannot merge states of {} and {}: not sibling shards", self.id, sibling.id
            )))
        }
        if self.libraries != sibling.libraries {
            fail!(BlockError::InvalidData(format!(
                "cannot merge states of {} and {}: libraries differ", self.id, sibling.id
            )))
        }
        let parent = self.shard().merge()?;

        let mut accounts = self.accounts.clone();
        accounts.merge_with(&sibling.accounts)
            .map_err(|err| error!("cannot merge accounts of {} and {}: {}", self.id, sibling.id, err))?;
        if accounts.split_for(&parent)? != accounts {
            fail!(BlockError::InvalidData(format!(
                "merged accounts of {} and {} do not belong to {}", self.id, sibling.id, parent
            )))
        }
        let total_balance = self.total_balance.checked_add(&sibling.total_balance);
        if !total_balance.is_valid() || &total_balance != accounts.full_balance() {
            fail!(BlockError::InvalidData(format!(
                "cannot merge states of {} and {}: total balance {} does not match accounts balance {}",
                self.id, sibling.id, total_balance, accounts.full_balance()
            )))
        }
        let total_validator_fees = self.total_validator_fees.checked_add(&sibling.total_validator_fees);
        if !total_validator_fees.is_valid() {
            fail!(BlockError::InvalidData(format!(
                "cannot merge validator fees of {} and {}", self.id, sibling.id
            )))
        }
        let mut out_queue = self.out_queue.clone();
        out_queue.combine_with(&sibling.out_queue)
            .map_err(|err| error!("cannot merge output queues of {} and {}: {}", self.id, sibling.id, err))?;
        let mut ihr_pending = self.ihr_pending.clone();
        ihr_pending.merge_with(&sibling.ihr_pending)
            .map_err(|err| error!("cannot merge ihr pending info of {} and {}: {}", self.id, sibling.id, err))?;
        let mut processed_upto = self.processed_upto.clone();
        processed_upto.combine_with(&sibling.processed_upto)
            .map_err(|err| error!("cannot merge processed info of {} and {}: {}", self.id, sibling.id, err))?;
        let master_ref = match (&self.master_ref, &sibling.master_ref) {
            (Some(a), Some(b)) if b.master.seq_no > a.master.seq_no => Some(b.clone()),
            (None, b) => b.clone(),
            (a, _) => a.clone(),
        };

        self.id = BlockIdExt::with_params(
            parent,
            max(self.id.seq_no, sibling.id.seq_no),
            UInt256::default(),
            UInt256::default()
        );
        self.vert_seq_no = max(self.vert_seq_no, sibling.vert_seq_no);
        self.gen_time = max(self.gen_time, sibling.gen_time);
        self.gen_lt = max(self.gen_lt, sibling.gen_lt);
        self.min_ref_mc_seqno = min(self.min_ref_mc_seqno, sibling.min_ref_mc_seqno);
        self.before_split = false;
        self.accounts = accounts;
        self.out_queue = out_queue;
        self.processed_upto = processed_upto;
        self.ihr_pending = ihr_pending;
        self.overload_history = 0;
        self.underload_history = 0;
        self.total_balance = total_balance;
        self.total_validator_fees = total_validator_fees;
        self.master_ref = master_ref;

        let sibling_id = std::mem::take(&mut sibling.id);
        *sibling = Self::default();
        sibling.id = BlockIdExt::new(ShardIdent::invalid(), 0);
        log::debug!(
            target: "shard_state",
            "merged state of {} into {}: total balance {}", sibling_id, self.id, self.total_balance
        );
        Ok(())
    }

    /// Cuts the state down to `subshard`, one of the children of the current shard
    pub fn split(&mut self, subshard: &ShardIdent) -> Result<()> {
        self.check_resharding()?;
        if !self.shard().is_parent_for(subshard) {
            fail!(BlockError::InvalidArg(format!(
                "cannot split state of {} for {}: not a child shard", self.id, subshard
            )))
        }
        let accounts = self.accounts.split_for(subshard)
            .map_err(|err| error!("cannot split accounts of {} for {}: {}", self.id, subshard, err))?;
        let ihr_pending = self.ihr_pending.split_for(subshard)?;
        let mut out_queue = self.out_queue.clone();
        out_queue.filter_by_prefix(subshard)
            .map_err(|err| error!("cannot split output queue of {} for {}: {}", self.id, subshard, err))?;
        let mut processed_upto = self.processed_upto.clone();
        processed_upto.split(subshard.clone())?;

        // the subtree root keeps the share of the declared total
        let total_balance = accounts.full_balance().clone();
        if !self.total_balance.is_ge(&total_balance) {
            fail!(BlockError::InvalidData(format!(
                "accounts of {} hold {} which is more than declared total balance {} of {}",
                subshard, total_balance, self.total_balance, self.id
            )))
        }
        let total_validator_fees = split_fees(&self.total_validator_fees, subshard.is_left_child())?;

        self.id = BlockIdExt::with_params(
            subshard.clone(),
            self.id.seq_no,
            UInt256::default(),
            UInt256::default()
        );
        self.before_split = false;
        self.accounts = accounts;
        self.out_queue = out_queue;
        self.processed_upto = processed_upto;
        self.ihr_pending = ihr_pending;
        self.overload_history = 0;
        self.underload_history = 0;
        self.total_balance = total_balance;
        self.total_validator_fees = total_validator_fees;
        log::debug!(
            target: "shard_state",
            "split state into {}: total balance {}, fees {}",
            self.id, self.total_balance, self.total_validator_fees
        );
        Ok(())
    }
}

// Half of every amount; the left child also takes the odd unit
fn split_fees(fees: &CurrencyCollection, left: bool) -> Result<CurrencyCollection> {
    let grams = fees.grams.as_u128();
    let mut result = CurrencyCollection::with_grams(0);
    result.grams = Grams::new(if left { grams - grams / 2 } else { grams / 2 })?;
    fees.other.iterate_with_keys(|key: u32, value| {
        let total = value.value().clone();
        let half = &total / 2u32;
        let share: BigInt = if left { total - &half } else { half };
        result.set_other_ex(key, &VarUInteger32::new(share)?)?;
        Ok(true)
    })?;
    Ok(result)
}

#[cfg(test)]
#[path = "tests/test_shard_state.rs"]
mod tests;
