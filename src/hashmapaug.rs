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
use std::{cmp::Ordering, fmt, marker::PhantomData};
use ton_types::{
    fail, hm_label, Result,
    BuilderData, Cell, CellType, HashmapSubtree, HashmapType, IBitstring, SliceData,
};

/// trait for types used as Augment to calc aug on forks
pub trait Augmentable: Clone + Default + PartialEq + Serializable + Deserializable {
    fn calc(&mut self, other: &Self) -> Result<bool>;
}

fn combine<Y: Augmentable>(left: &Y, right: &Y) -> Result<Y> {
    let mut extra = left.clone();
    if !extra.calc(right)? {
        fail!(BlockError::InvalidData("augmentation overflow".to_string()))
    }
    Ok(extra)
}

/*
ahm_edge#_ {n:#} {X:Type} {Y:Type} {l:#} {m:#}
  label:(HmLabel ~l n) {n = (~m) + l}
  node:(HashmapAugNode m X Y) = HashmapAug n X Y;
ahmn_leaf#_ {X:Type} {Y:Type} extra:Y value:X = HashmapAugNode 0 X Y;
ahmn_fork#_ {n:#} {X:Type} {Y:Type} left:^(HashmapAug n X Y)
  right:^(HashmapAug n X Y) extra:Y = HashmapAugNode (n + 1) X Y;
*/
/// Decoded edge of an augmented dictionary
pub enum AugNode<Y> {
    Fork {
        label: SliceData,
        children: [Cell; 2],
        extra: Y,
    },
    /// value is positioned right after the extra
    Leaf {
        label: SliceData,
        extra: Y,
        value: SliceData,
    },
}

impl<Y: Augmentable> AugNode<Y> {
    /// Parses edge cell with `bit_len` remaining key bits
    pub fn read(cell: &Cell, bit_len: usize) -> Result<Self> {
        let mut slice = SliceData::load_cell_ref(cell)?;
        let label = slice.get_label(bit_len)?;
        match label.remaining_bits().cmp(&bit_len) {
            Ordering::Less => {
                if slice.remaining_references() < 2 {
                    fail!(BlockError::InvalidData("fork doesn't have two refs".to_string()))
                }
                let left = slice.checked_drain_reference()?;
                let right = slice.checked_drain_reference()?;
                let extra = Y::construct_from(&mut slice)?;
                Ok(AugNode::Fork { label, children: [left, right], extra })
            }
            Ordering::Equal => {
                let extra = Y::construct_from(&mut slice)?;
                Ok(AugNode::Leaf { label, extra, value: slice })
            }
            Ordering::Greater => fail!(BlockError::InvalidData(
                format!("label length {} > {}", label.remaining_bits(), bit_len)
            ))
        }
    }

    pub fn label(&self) -> &SliceData {
        match self {
            AugNode::Fork { label, .. } => label,
            AugNode::Leaf { label, .. } => label,
        }
    }

    pub fn extra(&self) -> &Y {
        match self {
            AugNode::Fork { extra, .. } => extra,
            AugNode::Leaf { extra, .. } => extra,
        }
    }

    /// Encodes the node payload under another label
    fn write_with_label(&self, label: &SliceData, bit_len: usize) -> Result<Cell> {
        let mut builder = hm_label(label, bit_len)?;
        match self {
            AugNode::Fork { children, extra, .. } => {
                builder.checked_append_reference(children[0].clone())?;
                builder.checked_append_reference(children[1].clone())?;
                extra.write_to(&mut builder)?;
            }
            AugNode::Leaf { extra, value, .. } => {
                extra.write_to(&mut builder)?;
                builder.checked_append_references_and_data(value)?;
            }
        }
        builder.into_cell()
    }
}

fn leaf_cell<Y: Augmentable>(label: &SliceData, bit_len: usize, extra: &Y, value: &SliceData) -> Result<Cell> {
    AugNode::Leaf { label: label.clone(), extra: extra.clone(), value: value.clone() }
        .write_with_label(label, bit_len)
}

fn fork_cell<Y: Augmentable>(label: &SliceData, bit_len: usize, children: [Cell; 2], extra: Y) -> Result<Cell> {
    AugNode::Fork { label: label.clone(), children, extra }.write_with_label(label, bit_len)
}

/// Reads aggregated extra of the edge
pub fn find_extra<Y: Augmentable>(cell: &Cell, bit_len: usize) -> Result<Y> {
    Ok(AugNode::<Y>::read(cell, bit_len)?.extra().clone())
}

// puts the leaf under the edge, returns new edge and its extra
fn put_to_node<Y: Augmentable>(
    cell: &Cell,
    bit_len: usize,
    key: SliceData,
    value: &SliceData,
    extra: &Y,
) -> Result<(Cell, Y)> {
    let node = AugNode::<Y>::read(cell, bit_len)?;
    let label = node.label().clone();
    match SliceData::common_prefix(&label, &key) {
        (_, None, None) => {
            // same key: replace the leaf
            Ok((leaf_cell(&key, bit_len, extra, value)?, extra.clone()))
        }
        (_, None, Some(mut rest)) => {
            let (mut children, next_len) = match node {
                AugNode::Fork { children, .. } => (children, bit_len - label.remaining_bits() - 1),
                AugNode::Leaf { .. } => fail!(BlockError::InvalidData(
                    "leaf label is shorter than the key".to_string()
                ))
            };
            let index = rest.get_next_bit_int()?;
            let (child, child_extra) = put_to_node(&children[index], next_len, rest, value, extra)?;
            children[index] = child;
            let other = find_extra::<Y>(&children[1 - index], next_len)?;
            let fork_extra = match index {
                0 => combine(&child_extra, &other)?,
                _ => combine(&other, &child_extra)?,
            };
            Ok((fork_cell(&label, bit_len, children, fork_extra.clone())?, fork_extra))
        }
        (prefix, Some(mut label_rest), Some(mut key_rest)) => {
            // keys diverge inside the label: split the edge
            let prefix = prefix.unwrap_or_default();
            let next_len = bit_len - prefix.remaining_bits() - 1;
            let existing_bit = label_rest.get_next_bit()?;
            key_rest.get_next_bit()?;
            let existing = node.write_with_label(&label_rest, next_len)?;
            let leaf = leaf_cell(&key_rest, next_len, extra, value)?;
            let (children, fork_extra) = if existing_bit {
                ([leaf, existing], combine(extra, node.extra())?)
            } else {
                ([existing, leaf], combine(node.extra(), extra)?)
            };
            Ok((fork_cell(&prefix, bit_len, children, fork_extra.clone())?, fork_extra))
        }
        (_, Some(_), None) => fail!(BlockError::InvalidData(
            format!("key {} is shorter than label {}", key, label)
        ))
    }
}

fn iterate_internal<Y, F>(cell: &Cell, mut key: BuilderData, bit_len: usize, found: &mut F) -> Result<bool>
where
    Y: Augmentable,
    F: FnMut(SliceData, SliceData, Y) -> Result<bool>
{
    let node = AugNode::<Y>::read(cell, bit_len)?;
    key.checked_append_references_and_data(node.label())?;
    match node {
        AugNode::Leaf { extra, value, .. } => found(SliceData::load_builder(key)?, value, extra),
        AugNode::Fork { label, children, .. } => {
            let next_len = bit_len - label.remaining_bits() - 1;
            for (index, child) in children.iter().enumerate() {
                let mut child_key = key.clone();
                child_key.append_bit_bool(index == 1)?;
                if !iterate_internal(child, child_key, next_len, found)? {
                    return Ok(false)
                }
            }
            Ok(true)
        }
    }
}

///////////////////////////////////////////////
/// Augmented dictionary with keys of exactly bit_len bits
///
pub struct HashmapAugE<K, X, Y> {
    bit_len: usize,
    data: Option<Cell>,
    extra: Y,
    phantom: PhantomData<(K, X)>,
}

impl<K, X, Y: Clone> Clone for HashmapAugE<K, X, Y> {
    fn clone(&self) -> Self {
        Self {
            bit_len: self.bit_len,
            data: self.data.clone(),
            extra: self.extra.clone(),
            phantom: PhantomData,
        }
    }
}

impl<K, X, Y: PartialEq> PartialEq for HashmapAugE<K, X, Y> {
    fn eq(&self, other: &Self) -> bool {
        self.bit_len == other.bit_len && self.data == other.data && self.extra == other.extra
    }
}

impl<K, X, Y: Eq> Eq for HashmapAugE<K, X, Y> {}

impl<K, X, Y: fmt::Debug> fmt::Debug for HashmapAugE<K, X, Y> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.data {
            Some(cell) => write!(f, "HashmapAug({}) root {:x} extra {:?}", self.bit_len, cell.repr_hash(), self.extra),
            None => write!(f, "Empty HashmapAug({})", self.bit_len),
        }
    }
}

impl<K, X, Y: Augmentable> HashmapType for HashmapAugE<K, X, Y> {
    fn check_key(bit_len: usize, key: &SliceData) -> bool {
        bit_len == key.remaining_bits()
    }
    fn make_cell_with_label(key: SliceData, max: usize) -> Result<BuilderData> {
        hm_label(&key, max)
    }
    fn make_cell_with_label_and_data(
        key: SliceData,
        max: usize,
        _is_leaf: bool,
        data: &SliceData
    ) -> Result<BuilderData> {
        let mut builder = hm_label(&key, max)?;
        builder.checked_append_references_and_data(data)?;
        Ok(builder)
    }
    fn is_fork(slice: &mut SliceData) -> Result<bool> {
        Ok(slice.remaining_references() > 1)
    }
    fn is_leaf(_slice: &mut SliceData) -> bool {
        true
    }
    fn data(&self) -> Option<&Cell> {
        self.data.as_ref()
    }
    fn data_mut(&mut self) -> &mut Option<Cell> {
        &mut self.data
    }
    fn bit_len(&self) -> usize {
        self.bit_len
    }
    fn bit_len_mut(&mut self) -> &mut usize {
        &mut self.bit_len
    }
}

impl<K, X, Y: Augmentable> HashmapSubtree for HashmapAugE<K, X, Y> {}

impl<K, X, Y> HashmapAugE<K, X, Y>
where
    K: Serializable + Deserializable,
    X: Serializable + Deserializable,
    Y: Augmentable,
{
    /// Constructs new HashmapAugE for bit_len keys
    pub fn with_bit_len(bit_len: usize) -> Self {
        Self {
            bit_len,
            data: None,
            extra: Y::default(),
            phantom: PhantomData,
        }
    }

    /// Constructs from root cell, extracts total aug
    pub fn with_hashmap(bit_len: usize, data: Option<Cell>) -> Result<Self> {
        let extra = match &data {
            Some(root) => find_extra(root, bit_len)?,
            None => Y::default()
        };
        Ok(Self {
            bit_len,
            data,
            extra,
            phantom: PhantomData,
        })
    }

    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    pub fn data(&self) -> Option<&Cell> {
        self.data.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_none()
    }

    pub fn root_extra(&self) -> &Y {
        &self.extra
    }

    fn key_slice(&self, key: &K) -> Result<SliceData> {
        let key = key.write_to_bitstring()?;
        Self::check_key_fail(self.bit_len, &key)?;
        Ok(key)
    }

    /// Puts serialized value with its augmentation
    pub fn set_serialized(&mut self, key: SliceData, value: &SliceData, extra: &Y) -> Result<()> {
        Self::check_key_fail(self.bit_len, &key)?;
        let (root, extra) = match &self.data {
            Some(root) => put_to_node(root, self.bit_len, key, value, extra)?,
            None => (leaf_cell(&key, self.bit_len, extra, value)?, extra.clone())
        };
        self.data = Some(root);
        self.extra = extra;
        Ok(())
    }

    /// Puts item with its augmentation
    pub fn set(&mut self, key: &K, value: &X, extra: &Y) -> Result<()> {
        let key = self.key_slice(key)?;
        self.set_serialized(key, &value.write_to_bitstring()?, extra)
    }

    /// Gets value slice and augmentation by serialized key
    pub fn get_serialized(&self, key: SliceData) -> Result<Option<(SliceData, Y)>> {
        match self.hashmap_get(key, &mut 0)? {
            Some(mut slice) => {
                let extra = Y::construct_from(&mut slice)?;
                Ok(Some((slice, extra)))
            }
            None => Ok(None)
        }
    }

    pub fn get(&self, key: &K) -> Result<Option<X>> {
        Ok(self.get_with_aug(key)?.map(|(value, _)| value))
    }

    pub fn get_with_aug(&self, key: &K) -> Result<Option<(X, Y)>> {
        match self.get_serialized(self.key_slice(key)?)? {
            Some((mut slice, extra)) => Ok(Some((X::construct_from(&mut slice)?, extra))),
            None => Ok(None)
        }
    }

    /// Iterates serialized keys, value slices and augmentations
    pub fn iterate_slices_with_keys_and_aug<F>(&self, mut p: F) -> Result<bool>
    where F: FnMut(SliceData, SliceData, Y) -> Result<bool> {
        match &self.data {
            Some(root) => iterate_internal(root, BuilderData::new(), self.bit_len, &mut p),
            None => Ok(true)
        }
    }

    pub fn iterate_with_keys_and_aug<F>(&self, mut p: F) -> Result<bool>
    where F: FnMut(K, X, Y) -> Result<bool> {
        self.iterate_slices_with_keys_and_aug(|mut key, mut value, extra| {
            p(K::construct_from(&mut key)?, X::construct_from(&mut value)?, extra)
        })
    }

    pub fn iterate_with_keys<F>(&self, mut p: F) -> Result<bool>
    where F: FnMut(K, X) -> Result<bool> {
        self.iterate_with_keys_and_aug(|key, value, _| p(key, value))
    }

    pub fn len(&self) -> Result<usize> {
        let mut len = 0;
        self.iterate_slices_with_keys_and_aug(|_, _, _| {
            len += 1;
            Ok(true)
        })?;
        Ok(len)
    }

    /// Keeps only the items accepted by `func`
    pub fn filter<F>(&mut self, mut func: F) -> Result<()>
    where F: FnMut(&K, &X, &Y) -> Result<bool> {
        let mut result = Self::with_bit_len(self.bit_len);
        self.iterate_slices_with_keys_and_aug(|key_slice, value_slice, extra| {
            let key = K::construct_from(&mut key_slice.clone())?;
            let value = X::construct_from(&mut value_slice.clone())?;
            if func(&key, &value, &extra)? {
                result.set_serialized(key_slice, &value_slice, &extra)?;
            }
            Ok(true)
        })?;
        *self = result;
        Ok(())
    }

    /// Items whose keys start with `prefix`, the key length is kept
    pub fn subtree_with_prefix(&self, prefix: &SliceData) -> Result<Self> {
        let mut subtree = self.clone();
        subtree.into_subtree_with_prefix(prefix, &mut 0)?;
        subtree.extra = match &subtree.data {
            Some(root) => find_extra(root, subtree.bit_len)?,
            None => Y::default()
        };
        Ok(subtree)
    }

    /// Adds all items of `other`, replacing ones with equal keys
    pub fn combine_with(&mut self, other: &Self) -> Result<()> {
        if self.bit_len != other.bit_len {
            fail!("data in hashmaps do not correspond each other")
        }
        if self.data.is_none() {
            *self = other.clone();
            return Ok(())
        }
        other.iterate_slices_with_keys_and_aug(|key, value, extra| {
            self.set_serialized(key, &value, &extra)?;
            Ok(true)
        })?;
        Ok(())
    }

    pub fn write_hashmap(&self, cell: &mut BuilderData) -> Result<()> {
        match &self.data {
            Some(root) => {
                cell.append_bit_one()?;
                cell.checked_append_reference(root.clone())?;
            }
            None => {
                cell.append_bit_zero()?;
            }
        }
        self.extra.write_to(cell)
    }

    /// Reads the root checking its extra against the augmentation of the root edge
    pub fn read_hashmap(bit_len: usize, slice: &mut SliceData) -> Result<Self> {
        let data = match slice.get_next_bit()? {
            true => Some(slice.checked_drain_reference()?),
            false => None
        };
        let extra = Y::construct_from(slice)?;
        match &data {
            // pruned root keeps only hashes
            Some(root) if root.cell_type() == CellType::PrunedBranch => (),
            Some(root) => if find_extra::<Y>(root, bit_len)? != extra {
                fail!(BlockError::InvalidData(
                    "root extra of HashmapAugE differs from the extra of its root edge".to_string()
                ))
            }
            None => if extra != Y::default() {
                fail!(BlockError::InvalidData("root extra for empty HashmapAugE is not default".to_string()))
            }
        }
        Ok(Self {
            bit_len,
            data,
            extra,
            phantom: PhantomData,
        })
    }
}

#[macro_export]
macro_rules! define_HashmapAugE {
    ( $varname:ident, $bit_len:expr, $k_type:ty, $x_type:ty, $y_type:ty ) => {
        #[derive(Clone, Debug, Eq, PartialEq)]
        pub struct $varname($crate::HashmapAugE<$k_type, $x_type, $y_type>);

        impl $varname {
            pub fn with_hashmap(data: Option<ton_types::Cell>) -> ton_types::Result<Self> {
                Ok(Self($crate::HashmapAugE::with_hashmap($bit_len, data)?))
            }
        }

        impl Default for $varname {
            fn default() -> Self {
                Self($crate::HashmapAugE::with_bit_len($bit_len))
            }
        }

        impl std::ops::Deref for $varname {
            type Target = $crate::HashmapAugE<$k_type, $x_type, $y_type>;
            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl std::ops::DerefMut for $varname {
            fn deref_mut(&mut self) -> &mut Self::Target {
                &mut self.0
            }
        }

        impl $crate::Serializable for $varname {
            fn write_to(&self, cell: &mut ton_types::BuilderData) -> ton_types::Result<()> {
                self.0.write_hashmap(cell)
            }
        }

        impl $crate::Deserializable for $varname {
            fn construct_from(slice: &mut ton_types::SliceData) -> ton_types::Result<Self> {
                Ok(Self($crate::HashmapAugE::read_hashmap($bit_len, slice)?))
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/test_hashmapaug.rs"]
mod tests;
