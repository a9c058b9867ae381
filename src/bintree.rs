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
use std::marker::PhantomData;
use ton_types::{
    fail, Result,
    BuilderData, Cell, IBitstring, SliceData,
};

#[cfg(test)]
#[path = "tests/test_bintree.rs"]
mod tests;

enum BinNode<X> {
    Leaf(X),
    Fork([Cell; 2]),
}

fn read_node<X: Deserializable>(cell: &Cell) -> Result<BinNode<X>> {
    let mut slice = SliceData::load_cell_ref(cell)?;
    if slice.get_next_bit()? {
        if slice.remaining_references() < 2 {
            // fork doesn't have two refs - bad data
            fail!(BlockError::InvalidData("Fork doesn't have two refs".to_string()))
        }
        let left = slice.checked_drain_reference()?;
        let right = slice.checked_drain_reference()?;
        Ok(BinNode::Fork([left, right]))
    } else {
        Ok(BinNode::Leaf(X::construct_from(&mut slice)?))
    }
}

fn leaf_cell<X: Serializable>(value: &X) -> Result<Cell> {
    let mut leaf = false.write_to_new_cell()?;
    value.write_to(&mut leaf)?;
    leaf.into_cell()
}

fn fork_cell(children: [Cell; 2]) -> Result<Cell> {
    let mut fork = true.write_to_new_cell()?;
    let [left, right] = children;
    fork.checked_append_reference(left)?;
    fork.checked_append_reference(right)?;
    fork.into_cell()
}

// rebuilds the path to the node at `key` if `func` replaced it
fn replace_node<X, F>(cell: &Cell, mut key: SliceData, func: F) -> Result<Option<Cell>>
where
    X: Default + Serializable + Deserializable,
    F: FnOnce(&Cell) -> Result<Option<Cell>>
{
    let index = match key.get_next_bit_opt() {
        Some(index) => index,
        None => return func(cell)
    };
    match read_node::<X>(cell)? {
        BinNode::Leaf(_) => Ok(None),
        BinNode::Fork(mut children) => match replace_node::<X, F>(&children[index], key, func)? {
            Some(child) => {
                children[index] = child;
                Ok(Some(fork_cell(children)?))
            }
            None => Ok(None)
        }
    }
}

fn iterate_internal<X, F>(cell: &Cell, key: BuilderData, p: &mut F) -> Result<bool>
where
    X: Default + Serializable + Deserializable,
    F: FnMut(SliceData, X) -> Result<bool>
{
    match read_node::<X>(cell)? {
        BinNode::Leaf(value) => p(SliceData::load_builder(key)?, value),
        BinNode::Fork(children) => {
            for (index, child) in children.iter().enumerate() {
                let mut child_key = key.clone();
                child_key.append_bit_bool(index == 1)?;
                if !iterate_internal(child, child_key, p)? {
                    return Ok(false)
                }
            }
            Ok(true)
        }
    }
}

///
/// Implements a binary tree
///
/// TL-B scheme:
/// bt_leaf$0 {X:Type} leaf:X = BinTree X;
/// bt_fork$1 {X:Type} left:^(BinTree X) right:^(BinTree X) = BinTree X;
///
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BinTree<X: Default + Serializable + Deserializable> {
    root: Cell,
    phantom: PhantomData<X>
}

impl<X: Default + Serializable + Deserializable> BinTree<X> {
    /// Constructs new instance and put item
    pub fn with_item(value: &X) -> Result<Self> {
        Ok(Self {
            root: leaf_cell(value)?,
            phantom: PhantomData,
        })
    }

    pub fn root(&self) -> &Cell {
        &self.root
    }

    /// Returns item placed exactly at key
    pub fn get(&self, mut key: SliceData) -> Result<Option<X>> {
        let mut cell = self.root.clone();
        loop {
            match (read_node::<X>(&cell)?, key.get_next_bit_opt()) {
                (BinNode::Leaf(value), None) => return Ok(Some(value)),
                (BinNode::Fork(children), Some(index)) => cell = children[index].clone(),
                _ => return Ok(None)
            }
        }
    }

    /// Returns leaf lying on the path of key with its own key
    pub fn find(&self, mut key: SliceData) -> Result<Option<(SliceData, X)>> {
        let mut path = BuilderData::new();
        let mut cell = self.root.clone();
        loop {
            match read_node::<X>(&cell)? {
                BinNode::Leaf(value) => return Ok(Some((SliceData::load_builder(path)?, value))),
                BinNode::Fork(children) => match key.get_next_bit_opt() {
                    Some(index) => {
                        path.append_bit_bool(index == 1)?;
                        cell = children[index].clone();
                    }
                    // key is shorter nothing to return
                    None => return Ok(None)
                }
            }
        }
    }

    /// Iterates over all items
    pub fn iterate<F: FnMut(SliceData, X) -> Result<bool>>(&self, mut p: F) -> Result<bool> {
        iterate_internal(&self.root, BuilderData::new(), &mut p)
    }

    /// Splits item by calling splitter function, returns false if item was not found
    pub fn split(
        &mut self,
        key: SliceData,
        splitter: impl FnOnce(X) -> Result<(X, X)>
    ) -> Result<bool> {
        let root = replace_node::<X, _>(&self.root, key, |cell| {
            match read_node::<X>(cell)? {
                BinNode::Leaf(value) => {
                    let (left, right) = splitter(value)?;
                    Ok(Some(fork_cell([leaf_cell(&left)?, leaf_cell(&right)?])?))
                }
                BinNode::Fork(..) => Ok(None)
            }
        })?;
        self.set_root(root)
    }

    /// Merge 2 items in fork by calling merger function, returns false if fork was not found
    pub fn merge(
        &mut self,
        key: SliceData,
        merger: impl FnOnce(X, X) -> Result<X>
    ) -> Result<bool> {
        let root = replace_node::<X, _>(&self.root, key, |cell| {
            if let BinNode::Fork([left, right]) = read_node::<X>(cell)? {
                if let (BinNode::Leaf(left), BinNode::Leaf(right)) = (read_node::<X>(&left)?, read_node::<X>(&right)?) {
                    return Ok(Some(leaf_cell(&merger(left, right)?)?))
                }
            }
            Ok(None)
        })?;
        self.set_root(root)
    }

    /// Change item with given key calling mutator function, returns false if item was not found
    pub fn update(
        &mut self,
        key: SliceData,
        mutator: impl FnOnce(X) -> Result<X>
    ) -> Result<bool> {
        let root = replace_node::<X, _>(&self.root, key, |cell| {
            match read_node::<X>(cell)? {
                BinNode::Leaf(value) => Ok(Some(leaf_cell(&mutator(value)?)?)),
                BinNode::Fork(..) => Ok(None)
            }
        })?;
        self.set_root(root)
    }

    fn set_root(&mut self, root: Option<Cell>) -> Result<bool> {
        match root {
            Some(root) => {
                self.root = root;
                Ok(true)
            }
            None => Ok(false)
        }
    }
}

impl<X: Default + Serializable + Deserializable> Serializable for BinTree<X> {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        cell.checked_append_references_and_data(&SliceData::load_cell_ref(&self.root)?)?;
        Ok(())
    }
}

impl<X: Default + Serializable + Deserializable> Deserializable for BinTree<X> {
    fn read_from(&mut self, slice: &mut SliceData) -> Result<()> {
        self.root = if slice.get_next_bit()? {
            let left = slice.checked_drain_reference()?;
            let right = slice.checked_drain_reference()?;
            fork_cell([left, right])?
        } else {
            leaf_cell(&X::construct_from(slice)?)?
        };
        Ok(())
    }
}
