/*
* Copyright (C) 2019-2021 TON Labs. All Rights Reserved.
*
* Licensed under the SOFTWARE EVALUATION License (the "License"); you may not use
* this file except in compliance with the License.
*
* Unless required by applicable law or agreed to in writing, software
* distributed under the License is distributed on an "AS IS" BASIS,
* WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
* See the License for the specific TON DEV software governing permissions and
* limitations under the License.
*/

use super::*;
use crate::{define_HashmapAugE, write_read_and_assert, AddSub, Grams};

#[derive(Eq, Clone, Debug, Default, PartialEq)]
pub struct GramStruct(Grams);

impl GramStruct {
    pub fn with_value(value: u8) -> Self {
        Self(Grams::from(value as u64))
    }
}

// aug with references checks that fork refs are drained before the extra
impl Serializable for GramStruct {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        self.0.write_to(cell)?;
        cell.checked_append_reference(self.0.serialize()?)?;
        Ok(())
    }
}

impl Deserializable for GramStruct {
    fn read_from(&mut self, slice: &mut SliceData) -> Result<()> {
        self.0.read_from(slice)?;
        let g = Grams::construct_from_reference(slice)?;
        assert_eq!(self.0, g);
        Ok(())
    }
}

impl Augmentable for GramStruct {
    fn calc(&mut self, other: &Self) -> Result<bool> {
        self.0.add(&other.0)
    }
}

define_HashmapAugE!(GramHashmap7, 7, u8, u32, GramStruct);
define_HashmapAugE!(GramHashmap8, 8, u8, u32, GramStruct);

fn prefix(bits: usize, len: usize) -> SliceData {
    let mut builder = BuilderData::new();
    builder.append_bits(bits, len).unwrap();
    SliceData::load_builder(builder).unwrap()
}

#[test]
fn test_hashmapaug() {
    let mut tree = GramHashmap7::default();
    assert_eq!(&GramStruct::with_value(0), tree.root_extra());
    assert!(tree.is_empty());

    tree.set(&1, &11, &GramStruct::with_value(1)).unwrap();
    assert_eq!(&GramStruct::with_value(1), tree.root_extra());
    assert!(!tree.is_empty());

    tree.set(&2, &22, &GramStruct::with_value(2)).unwrap();
    tree.set(&100, &1000, &GramStruct::with_value(7)).unwrap();
    assert_eq!(&GramStruct::with_value(10), tree.root_extra());

    // replace keeps the sum consistent
    tree.set(&2, &23, &GramStruct::with_value(5)).unwrap();
    assert_eq!(&GramStruct::with_value(13), tree.root_extra());

    assert_eq!(tree.get(&1).unwrap(), Some(11));
    assert_eq!(tree.get(&2).unwrap(), Some(23));
    assert_eq!(tree.get(&3).unwrap(), None);
    let (value, aug) = tree.get_with_aug(&100).unwrap().unwrap();
    assert_eq!(value, 1000);
    assert_eq!(aug, GramStruct::with_value(7));
    assert_eq!(tree.len().unwrap(), 3);

    let mut keys = vec![];
    tree.iterate_with_keys(|key: u8, _value| {
        keys.push(key);
        Ok(true)
    }).unwrap();
    assert_eq!(keys, vec![1, 2, 100]);

    let tree = write_read_and_assert(tree);
    assert_eq!(&GramStruct::with_value(13), tree.root_extra());
    let restored = GramHashmap7::with_hashmap(tree.data().cloned()).unwrap();
    assert_eq!(restored, tree);
}

#[test]
fn test_hashmapaug_wrong_key_length() {
    let mut tree = GramHashmap8::default();
    assert!(tree.set_serialized(prefix(0x7f, 7), &SliceData::default(), &GramStruct::with_value(1)).is_err());
    assert!(tree.is_empty());
}

#[test]
fn test_hashmapaug_filter_and_subtree() {
    let mut tree = GramHashmap8::default();
    for key in 0..=255u8 {
        tree.set(&key, &(key as u32 * 2), &GramStruct::with_value(1)).unwrap();
    }
    assert_eq!(tree.root_extra(), &GramStruct(Grams::from(256)));

    // keys 0b1010_xxxx
    let subtree = tree.subtree_with_prefix(&prefix(0b1010, 4)).unwrap();
    assert_eq!(subtree.len().unwrap(), 16);
    assert_eq!(subtree.root_extra(), &GramStruct::with_value(16));
    assert_eq!(subtree.get(&0xA3).unwrap(), Some(0x146));
    assert_eq!(subtree.get(&0x13).unwrap(), None);

    let mut filtered = tree.clone();
    filtered.filter(|key, _, _| Ok(key % 2 == 0)).unwrap();
    assert_eq!(filtered.len().unwrap(), 128);
    assert_eq!(filtered.root_extra(), &GramStruct::with_value(128));
    assert_eq!(filtered.get(&3).unwrap(), None);
    assert_eq!(filtered.get(&4).unwrap(), Some(8));

    filtered.filter(|_, _, _| Ok(false)).unwrap();
    assert!(filtered.is_empty());
    assert_eq!(filtered.root_extra(), &GramStruct::default());
}

#[test]
fn test_hashmapaug_combine() {
    let mut left = GramHashmap8::default();
    let mut right = GramHashmap8::default();
    left.set(&1, &1, &GramStruct::with_value(1)).unwrap();
    left.set(&2, &2, &GramStruct::with_value(2)).unwrap();
    right.set(&2, &20, &GramStruct::with_value(20)).unwrap();
    right.set(&200, &200, &GramStruct::with_value(30)).unwrap();
    left.combine_with(&right).unwrap();
    assert_eq!(left.len().unwrap(), 3);
    assert_eq!(left.get(&2).unwrap(), Some(20));
    assert_eq!(left.root_extra(), &GramStruct::with_value(51));
}

#[test]
fn test_hashmapaug_forged_root_extra() {
    let mut tree = GramHashmap8::default();
    tree.set(&1, &1, &GramStruct::with_value(1)).unwrap();
    tree.set(&2, &2, &GramStruct::with_value(2)).unwrap();

    let mut b = BuilderData::new();
    b.append_bit_one().unwrap();
    b.checked_append_reference(tree.data().cloned().unwrap()).unwrap();
    GramStruct::with_value(100).write_to(&mut b).unwrap();
    assert!(GramHashmap8::construct_from_cell(b.into_cell().unwrap()).is_err());

    // empty dictionary with non-default extra
    let mut b = BuilderData::new();
    b.append_bit_zero().unwrap();
    GramStruct::with_value(1).write_to(&mut b).unwrap();
    assert!(GramHashmap8::construct_from_cell(b.into_cell().unwrap()).is_err());
}
