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
    outbound_messages::{EnqueuedMsg, MsgTime, OutMsgQueue, OutMsgQueueKey},
    shard::ShardIdent,
    Deserializable,
};
use std::{cmp::Ordering, collections::BinaryHeap};
use ton_types::{BuilderData, IBitstring, Result, SliceData};

/// Message taken from one of the merged queues
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MergedMsg {
    pub key: OutMsgQueueKey,
    pub lt: u64,
    pub enq: EnqueuedMsg,
    /// index of the queue the message comes from
    pub source: usize,
}

// Dictionary edge with its label read: `cursor` stands right after the label,
// `key` holds the path including the label, `bit_len` counts the bits left below
struct Candidate {
    lt: u64,
    cursor: SliceData,
    key: BuilderData,
    bit_len: usize,
    source: usize,
}

impl Candidate {
    fn new(cell: SliceData, mut key: BuilderData, mut bit_len: usize, source: usize) -> Result<Self> {
        let mut cursor = cell;
        let label = cursor.get_label(bit_len)?;
        bit_len -= label.remaining_bits();
        key.checked_append_references_and_data(&label)?;
        // extra goes right after the label in forks and leaves
        let lt = MsgTime::construct_from(&mut cursor.clone())?;
        Ok(Self { lt, cursor, key, bit_len, source })
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl Ord for Candidate {
    // reversed: BinaryHeap pops the maximum
    fn cmp(&self, other: &Self) -> Ordering {
        other.lt.cmp(&self.lt).then_with(|| other.source.cmp(&self.source))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Merges output queues of neighbor shards into one stream ascending by
/// enqueue logical time; messages with equal time go in key order
pub struct OutMsgQueueMerger {
    heap: BinaryHeap<Candidate>,
    batch: Vec<MergedMsg>,
    pos: usize,
}

impl OutMsgQueueMerger {
    /// Takes messages routed into `shard` from every neighbor queue
    pub fn new(shard: &ShardIdent, neighbors: &[OutMsgQueue]) -> Result<Self> {
        let mut queues = Vec::with_capacity(neighbors.len());
        for queue in neighbors {
            queues.push(queue.prefix_subtree(shard)?);
        }
        Self::with_queues(&queues)
    }

    pub fn with_queues(queues: &[OutMsgQueue]) -> Result<Self> {
        let mut heap = BinaryHeap::new();
        for (source, queue) in queues.iter().enumerate() {
            if let Some(root) = queue.data() {
                let cursor = SliceData::load_cell_ref(root)?;
                heap.push(Candidate::new(cursor, BuilderData::new(), queue.bit_len(), source)?);
            }
        }
        log::trace!(target: "out_queue_merger", "merging {} non-empty queues", heap.len());
        Ok(Self {
            heap,
            batch: Vec::new(),
            pos: 0,
        })
    }

    /// Collects all messages with the next minimal logical time
    fn load(&mut self) -> Result<bool> {
        self.batch.clear();
        self.pos = 0;
        let lt = match self.heap.peek() {
            Some(top) => top.lt,
            None => return Ok(false)
        };
        while self.heap.peek().map(|top| top.lt == lt).unwrap_or(false) {
            let mut candidate = match self.heap.pop() {
                Some(candidate) => candidate,
                None => break
            };
            if candidate.bit_len == 0 {
                let lt = MsgTime::construct_from(&mut candidate.cursor)?;
                self.batch.push(MergedMsg {
                    key: OutMsgQueueKey::construct_from(&mut SliceData::load_builder(candidate.key)?)?,
                    lt,
                    enq: EnqueuedMsg::construct_from(&mut candidate.cursor)?,
                    source: candidate.source,
                });
                continue
            }
            for index in 0..2 {
                let mut key = candidate.key.clone();
                key.append_bit_bool(index == 1)?;
                let child = SliceData::load_cell(candidate.cursor.reference(index)?)?;
                self.heap.push(Candidate::new(child, key, candidate.bit_len - 1, candidate.source)?);
            }
        }
        self.batch.sort_by(|msg1, msg2| {
            let key1 = (msg1.key.workchain_id as u32, msg1.key.prefix, msg1.key.hash.as_slice());
            let key2 = (msg2.key.workchain_id as u32, msg2.key.prefix, msg2.key.hash.as_slice());
            key1.cmp(&key2).then_with(|| msg1.enq.out_msg.hash().ok().cmp(&msg2.enq.out_msg.hash().ok()))
        });
        log::trace!(
            target: "out_queue_merger",
            "loaded {} messages with lt {}", self.batch.len(), lt
        );
        Ok(!self.batch.is_empty())
    }

    /// Current message without advancing
    pub fn cur(&mut self) -> Result<Option<&MergedMsg>> {
        if self.pos >= self.batch.len() && !self.load()? {
            return Ok(None)
        }
        Ok(self.batch.get(self.pos))
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.batch.len() && self.heap.is_empty()
    }

    fn next_msg(&mut self) -> Result<Option<MergedMsg>> {
        if self.pos >= self.batch.len() && !self.load()? {
            return Ok(None)
        }
        let msg = self.batch.get(self.pos).cloned();
        self.pos += 1;
        Ok(msg)
    }
}

impl Iterator for OutMsgQueueMerger {
    type Item = Result<MergedMsg>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_msg().transpose()
    }
}

#[cfg(test)]
#[path = "tests/test_out_queue_merger.rs"]
mod tests;
