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
    address::StdAddress,
    define_HashmapAugE,
    error::BlockError,
    hashmapaug::Augmentable,
    processed_upto::{IhrPendingInfo, ProcessedInfo},
    shard::{AccountIdPrefixFull, ShardIdent},
    types::{ChildCell, CurrencyCollection, Grams},
    Serializable, Deserializable,
};
use std::fmt;
use ton_types::{
    error, fail, Result,
    BuilderData, Cell, IBitstring, SliceData, UInt256,
};

/*
        3.3 Outbound message queue
 OutMsgQueue is a part of the shardchain state. It keeps the messages sent
 by the accounts of the shard and not yet imported by their next-hop shards.
*/

pub const FULL_BITS: u8 = 96;

/*
interm_addr_regular$0 use_dest_bits:(#<= 96) = IntermediateAddress;
interm_addr_simple$10 workchain_id:int8 addr_pfx:uint64 = IntermediateAddress;
interm_addr_ext$11 workchain_id:int32 addr_pfx:uint64 = IntermediateAddress;
*/
/// Current or next-hop address of a routed message
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum IntermediateAddress {
    /// first `use_dest_bits` bits are taken from the destination, the rest from the source
    Regular(u8),
    Simple(i8, u64),
    Ext(i32, u64),
}

impl IntermediateAddress {
    pub fn use_dest_bits(use_dest_bits: u8) -> Result<Self> {
        if use_dest_bits > FULL_BITS {
            fail!(BlockError::InvalidArg(format!("use_dest_bits must be <= {}", FULL_BITS)))
        }
        Ok(IntermediateAddress::Regular(use_dest_bits))
    }

    pub fn use_src_bits(use_src_bits: u8) -> Result<Self> {
        if use_src_bits > FULL_BITS {
            fail!(BlockError::InvalidArg(format!("use_src_bits must be <= {}", FULL_BITS)))
        }
        Ok(IntermediateAddress::Regular(FULL_BITS - use_src_bits))
    }

    pub const fn full_src() -> Self {
        IntermediateAddress::Regular(0)
    }

    pub const fn full_dest() -> Self {
        IntermediateAddress::Regular(FULL_BITS)
    }

    /// Resolves the address on the path from `src` to `dst`
    pub fn interpolate(&self, src: &AccountIdPrefixFull, dst: &AccountIdPrefixFull) -> AccountIdPrefixFull {
        match self {
            IntermediateAddress::Regular(use_dest_bits) => src.interpolate_addr(dst, *use_dest_bits),
            IntermediateAddress::Simple(workchain_id, prefix) => {
                AccountIdPrefixFull::workchain(*workchain_id as i32, *prefix)
            }
            IntermediateAddress::Ext(workchain_id, prefix) => {
                AccountIdPrefixFull::workchain(*workchain_id, *prefix)
            }
        }
    }
}

impl Default for IntermediateAddress {
    fn default() -> Self {
        IntermediateAddress::full_src()
    }
}

impl Serializable for IntermediateAddress {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        match self {
            IntermediateAddress::Regular(use_dest_bits) => {
                cell.append_bit_zero()?; // tag = $0
                cell.append_bits(*use_dest_bits as usize, 7)?;
            }
            IntermediateAddress::Simple(workchain_id, prefix) => {
                cell.append_bits(0b10, 2)?;
                workchain_id.write_to(cell)?;
                prefix.write_to(cell)?;
            }
            IntermediateAddress::Ext(workchain_id, prefix) => {
                cell.append_bits(0b11, 2)?;
                workchain_id.write_to(cell)?;
                prefix.write_to(cell)?;
            }
        }
        Ok(())
    }
}

impl Deserializable for IntermediateAddress {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        if !slice.get_next_bit()? {
            let use_dest_bits = slice.get_next_int(7)? as u8;
            return Self::use_dest_bits(use_dest_bits)
        }
        if slice.get_next_bit()? {
            let workchain_id = i32::construct_from(slice)?;
            Ok(IntermediateAddress::Ext(workchain_id, slice.get_next_u64()?))
        } else {
            let workchain_id = i8::construct_from(slice)?;
            Ok(IntermediateAddress::Simple(workchain_id, slice.get_next_u64()?))
        }
    }
}

/*
int_msg_info$0 ihr_disabled:Bool bounce:Bool bounced:Bool
  src:MsgAddressInt dest:MsgAddressInt
  value:CurrencyCollection ihr_fee:Grams fwd_fee:Grams
  created_lt:uint64 created_at:uint32 = CommonMsgInfo;
*/
/// Header of an internal message; the rest of the message is kept untouched
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InternalMessageHeader {
    pub ihr_disabled: bool,
    pub bounce: bool,
    pub bounced: bool,
    pub src: StdAddress,
    pub dst: StdAddress,
    pub value: CurrencyCollection,
    pub ihr_fee: Grams,
    pub fwd_fee: Grams,
    pub created_lt: u64,
    pub created_at: u32,
}

impl InternalMessageHeader {
    pub fn with_addresses(src: StdAddress, dst: StdAddress, value: CurrencyCollection) -> Self {
        Self {
            ihr_disabled: true,
            src,
            dst,
            value,
            ..Self::default()
        }
    }

    /// Decodes the header of a serialized message
    pub fn from_message(msg: &Cell) -> Result<Self> {
        Self::construct_from_cell(msg.clone())
            .map_err(|err| error!(
                BlockError::InvalidData(format!("message {:x} has wrong header: {}", msg.repr_hash(), err))
            ))
    }

    /// Message with this header, no state init and an empty body
    pub fn serialize_message(&self) -> Result<Cell> {
        let mut cell = self.write_to_new_cell()?;
        cell.append_bit_zero()?; // init
        cell.append_bit_zero()?; // body
        cell.into_cell()
    }
}

impl Serializable for InternalMessageHeader {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        cell.append_bit_zero()?;
        cell.append_bit_bool(self.ihr_disabled)?;
        cell.append_bit_bool(self.bounce)?;
        cell.append_bit_bool(self.bounced)?;
        self.src.write_to(cell)?;
        self.dst.write_to(cell)?;
        self.value.write_to(cell)?;
        self.ihr_fee.write_to(cell)?;
        self.fwd_fee.write_to(cell)?;
        self.created_lt.write_to(cell)?;
        self.created_at.write_to(cell)?;
        Ok(())
    }
}

impl Deserializable for InternalMessageHeader {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        if slice.get_next_bit()? {
            fail!(BlockError::InvalidData("only internal messages can be enqueued".to_string()))
        }
        Ok(Self {
            ihr_disabled: slice.get_next_bit()?,
            bounce: slice.get_next_bit()?,
            bounced: slice.get_next_bit()?,
            src: StdAddress::construct_from(slice)?,
            dst: StdAddress::construct_from(slice)?,
            value: CurrencyCollection::construct_from(slice)?,
            ihr_fee: Grams::construct_from(slice)?,
            fwd_fee: Grams::construct_from(slice)?,
            created_lt: slice.get_next_u64()?,
            created_at: slice.get_next_u32()?,
        })
    }
}

/*
msg_envelope#4
  cur_addr:IntermediateAddress
  next_addr:IntermediateAddress
  fwd_fee_remaining:Grams
  msg:^(Message Any)
= MsgEnvelope;
*/
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MsgEnvelope {
    cur_addr: IntermediateAddress,
    next_addr: IntermediateAddress,
    fwd_fee_remaining: Grams,
    msg: Option<Cell>,
}

const MSG_ENVELOPE_TAG: usize = 4;

impl MsgEnvelope {
    pub fn with_routing(
        msg: Cell,
        fwd_fee_remaining: Grams,
        cur_addr: IntermediateAddress,
        next_addr: IntermediateAddress,
    ) -> Self {
        Self {
            cur_addr,
            next_addr,
            fwd_fee_remaining,
            msg: Some(msg),
        }
    }

    pub fn cur_addr(&self) -> &IntermediateAddress {
        &self.cur_addr
    }

    pub fn next_addr(&self) -> &IntermediateAddress {
        &self.next_addr
    }

    pub fn fwd_fee_remaining(&self) -> &Grams {
        &self.fwd_fee_remaining
    }

    pub fn message_cell(&self) -> Result<&Cell> {
        self.msg.as_ref()
            .ok_or_else(|| error!(BlockError::InvalidData("message envelope is empty".to_string())))
    }

    pub fn message_hash(&self) -> Result<UInt256> {
        Ok(self.message_cell()?.repr_hash())
    }
}

impl Serializable for MsgEnvelope {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        cell.append_bits(MSG_ENVELOPE_TAG, 4)?;
        self.cur_addr.write_to(cell)?;
        self.next_addr.write_to(cell)?;
        self.fwd_fee_remaining.write_to(cell)?;
        cell.checked_append_reference(self.message_cell()?.clone())?;
        Ok(())
    }
}

impl Deserializable for MsgEnvelope {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        let tag = slice.get_next_int(4)? as usize;
        if tag != MSG_ENVELOPE_TAG {
            fail!(BlockError::InvalidConstructorTag {
                t: tag as u32,
                s: "MsgEnvelope".to_string()
            })
        }
        Ok(Self {
            cur_addr: IntermediateAddress::construct_from(slice)?,
            next_addr: IntermediateAddress::construct_from(slice)?,
            fwd_fee_remaining: Grams::construct_from(slice)?,
            msg: Some(slice.checked_drain_reference()?),
        })
    }
}

/*
_ enqueued_lt:uint64 out_msg:^MsgEnvelope = EnqueuedMsg;
*/
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct EnqueuedMsg {
    pub enqueued_lt: u64,
    pub out_msg: ChildCell<MsgEnvelope>,
}

impl EnqueuedMsg {
    pub fn with_param(enqueued_lt: u64, env: &MsgEnvelope) -> Result<Self> {
        Ok(Self {
            enqueued_lt,
            out_msg: ChildCell::with_struct(env)?,
        })
    }

    pub fn enqueued_lt(&self) -> u64 {
        self.enqueued_lt
    }

    pub fn read_out_msg(&self) -> Result<MsgEnvelope> {
        self.out_msg.read_struct()
    }
}

impl Serializable for EnqueuedMsg {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        self.enqueued_lt.write_to(cell)?;
        self.out_msg.write_to(cell)?;
        Ok(())
    }
}

impl Deserializable for EnqueuedMsg {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        let enqueued_lt = slice.get_next_u64()?;
        let out_msg = ChildCell::construct_from(slice)?;
        Ok(Self { enqueued_lt, out_msg })
    }
}

/// Routing data of an enqueued message resolved from its envelope and header
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EnqueuedMsgDescr {
    pub src_prefix: AccountIdPrefixFull,
    pub dst_prefix: AccountIdPrefixFull,
    pub cur_prefix: AccountIdPrefixFull,
    pub next_prefix: AccountIdPrefixFull,
    pub created_lt: u64,
    pub enqueued_lt: u64,
    pub hash: UInt256,
    pub envelope: MsgEnvelope,
}

impl EnqueuedMsgDescr {
    pub fn from_enqueued(enq: &EnqueuedMsg) -> Result<Self> {
        let envelope = enq.read_out_msg()?;
        let msg = envelope.message_cell()?;
        let header = InternalMessageHeader::from_message(msg)?;
        let src_prefix = header.src.prefix();
        let dst_prefix = header.dst.prefix();
        Ok(Self {
            cur_prefix: envelope.cur_addr().interpolate(&src_prefix, &dst_prefix),
            next_prefix: envelope.next_addr().interpolate(&src_prefix, &dst_prefix),
            src_prefix,
            dst_prefix,
            created_lt: header.created_lt,
            enqueued_lt: enq.enqueued_lt,
            hash: msg.repr_hash(),
            envelope,
        })
    }

    pub fn same_workchain(&self) -> bool {
        self.src_prefix.workchain_id == self.dst_prefix.workchain_id
    }

    pub fn out_msg_key(&self) -> OutMsgQueueKey {
        OutMsgQueueKey::with_account_prefix(&self.next_prefix, self.hash.clone())
    }
}

impl fmt::Display for EnqueuedMsgDescr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f, "message {:x} enqueued_lt: {} created_lt: {} cur: {} next: {}",
            self.hash, self.enqueued_lt, self.created_lt, self.cur_prefix, self.next_prefix
        )
    }
}

///
/// The key used for an outbound message m is the concatenation of its 32-bit
/// next-hop workchain_id, the first 64 bits of the next-hop address inside that
/// workchain, and the representation hash Hash(m) of the message m itself
///
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct OutMsgQueueKey {
    pub workchain_id: i32,
    pub prefix: u64,
    pub hash: UInt256,
}

impl OutMsgQueueKey {
    pub fn with_workchain_id_and_prefix(workchain_id: i32, prefix: u64, hash: UInt256) -> Self {
        Self { workchain_id, prefix, hash }
    }

    pub fn with_account_prefix(prefix: &AccountIdPrefixFull, hash: UInt256) -> Self {
        Self::with_workchain_id_and_prefix(prefix.workchain_id, prefix.prefix, hash)
    }
}

impl fmt::LowerHex for OutMsgQueueKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{:016X}, hash: {:x}", self.workchain_id, self.prefix, self.hash)
    }
}

impl Serializable for OutMsgQueueKey {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        self.workchain_id.write_to(cell)?;
        self.prefix.write_to(cell)?;
        self.hash.write_to(cell)?;
        Ok(())
    }
}

impl Deserializable for OutMsgQueueKey {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        Ok(Self {
            workchain_id: slice.get_next_i32()?,
            prefix: slice.get_next_u64()?,
            hash: UInt256::construct_from(slice)?,
        })
    }
}

/// Minimal enqueue time of the subtree
pub type MsgTime = u64;

impl Augmentable for MsgTime {
    fn calc(&mut self, other: &Self) -> Result<bool> {
        if *self > *other {
            *self = *other;
        }
        Ok(true)
    }
}

/*
_ (HashmapAugE 352 EnqueuedMsg uint64) = OutMsgQueue;
*/
define_HashmapAugE!(OutMsgQueue, 352, OutMsgQueueKey, EnqueuedMsg, MsgTime);

/// Key bits shared by all messages routed into `shard`
pub fn shard_queue_prefix(shard: &ShardIdent) -> Result<SliceData> {
    let mut prefix = BuilderData::new();
    prefix.append_i32(shard.workchain_id())?;
    prefix.checked_append_references_and_data(&shard.shard_key()?)?;
    SliceData::load_builder(prefix)
}

impl OutMsgQueue {
    /// Adds the message under the key of its next hop
    pub fn insert(&mut self, enq: &EnqueuedMsg) -> Result<OutMsgQueueKey> {
        let descr = EnqueuedMsgDescr::from_enqueued(enq)?;
        let key = descr.out_msg_key();
        self.set(&key, enq, &enq.enqueued_lt)?;
        Ok(key)
    }

    pub fn get_descr(&self, key: &OutMsgQueueKey) -> Result<Option<EnqueuedMsgDescr>> {
        match self.get(key)? {
            Some(enq) => {
                let descr = EnqueuedMsgDescr::from_enqueued(&enq)?;
                if &descr.out_msg_key() != key {
                    fail!(BlockError::InvalidData(format!(
                        "message stored with key {:x} belongs to key {:x}", key, descr.out_msg_key()
                    )))
                }
                Ok(Some(descr))
            }
            None => Ok(None)
        }
    }

    /// Messages whose next hop lies inside `shard`
    pub fn prefix_subtree(&self, shard: &ShardIdent) -> Result<Self> {
        Ok(Self(self.0.subtree_with_prefix(&shard_queue_prefix(shard)?)?))
    }

    /// Keeps only messages whose current address lies inside `shard`
    pub fn filter_by_prefix(&mut self, shard: &ShardIdent) -> Result<()> {
        self.0.filter(|key, enq, _| {
            let descr = EnqueuedMsgDescr::from_enqueued(enq)?;
            if descr.next_prefix.workchain_id != key.workchain_id || descr.next_prefix.prefix != key.prefix {
                fail!(BlockError::InvalidData(format!(
                    "out queue message with key {:x} has next hop {}", key, descr.next_prefix
                )))
            }
            Ok(shard.contains_full_prefix(&descr.cur_prefix))
        })
    }
}

/*
_ out_queue:OutMsgQueue proc_info:ProcessedInfo
  ihr_pending:IhrPendingInfo = OutMsgQueueInfo;
*/
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct OutMsgQueueInfo {
    out_queue: OutMsgQueue,
    proc_info: ProcessedInfo,
    ihr_pending: IhrPendingInfo,
}

impl OutMsgQueueInfo {
    pub fn with_params(
        out_queue: OutMsgQueue,
        proc_info: ProcessedInfo,
        ihr_pending: IhrPendingInfo,
    ) -> Self {
        Self {
            out_queue,
            proc_info,
            ihr_pending,
        }
    }

    pub fn out_queue(&self) -> &OutMsgQueue {
        &self.out_queue
    }

    pub fn out_queue_mut(&mut self) -> &mut OutMsgQueue {
        &mut self.out_queue
    }

    pub fn proc_info(&self) -> &ProcessedInfo {
        &self.proc_info
    }

    pub fn proc_info_mut(&mut self) -> &mut ProcessedInfo {
        &mut self.proc_info
    }

    pub fn ihr_pending(&self) -> &IhrPendingInfo {
        &self.ihr_pending
    }

    pub fn into_parts(self) -> (OutMsgQueue, ProcessedInfo, IhrPendingInfo) {
        (self.out_queue, self.proc_info, self.ihr_pending)
    }
}

impl Serializable for OutMsgQueueInfo {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        self.out_queue.write_to(cell)?;
        self.proc_info.write_to(cell)?;
        self.ihr_pending.write_to(cell)?;
        Ok(())
    }
}

impl Deserializable for OutMsgQueueInfo {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        Ok(Self {
            out_queue: OutMsgQueue::construct_from(slice)?,
            proc_info: ProcessedInfo::construct_from(slice)?,
            ihr_pending: IhrPendingInfo::construct_from(slice)?,
        })
    }
}

#[cfg(test)]
#[path = "tests/test_out_msgs.rs"]
mod tests;
