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
    hashmapaug::Augmentable,
    Serializable, Deserializable,
};
use num::{BigInt, bigint::Sign, One, Zero};
use std::{
    fmt::{self, Display, Formatter},
    marker::PhantomData,
    ops::{Deref, DerefMut},
    str::FromStr,
};
use ton_types::{
    fail, Result,
    BuilderData, Cell, CellType, IBitstring, SliceData, UInt256,
};

macro_rules! define_primitive {
    ( $t:ty, $append:ident, $get:ident ) => {
        impl Serializable for $t {
            fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
                cell.$append(*self)?;
                Ok(())
            }
        }

        impl Deserializable for $t {
            fn construct_from(slice: &mut SliceData) -> Result<Self> {
                slice.$get()
            }
        }
    };
}

define_primitive!(u8, append_u8, get_next_byte);
define_primitive!(u16, append_u16, get_next_u16);
define_primitive!(u32, append_u32, get_next_u32);
define_primitive!(u64, append_u64, get_next_u64);
define_primitive!(i32, append_i32, get_next_i32);

impl Serializable for i8 {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        cell.append_u8(*self as u8)?;
        Ok(())
    }
}

impl Deserializable for i8 {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        Ok(slice.get_next_byte()? as i8)
    }
}

impl Serializable for bool {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        cell.append_bit_bool(*self)?;
        Ok(())
    }
}

impl Deserializable for bool {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        slice.get_next_bit()
    }
}

/// Checked arithmetic which reports overflow instead of panicking
pub trait AddSub {
    fn add(&mut self, other: &Self) -> Result<bool>;
    fn sub(&mut self, other: &Self) -> Result<bool>;
}

///
/// var_uint$_ {n:#} len:(#< n) value:(uint (len * 8)) = VarUInteger n;
/// nanograms$_ amount:(VarUInteger 16) = Grams;
///
/// If one wants to represent x nanograms, one selects an integer l < 16 such
/// that x < 2^8*l, and serializes first l as an unsigned 4-bit integer, then x itself
/// as an unsigned 8`-bit integer. Notice that four zero bits represent a zero
/// amount of Grams.
macro_rules! define_VarIntegerN {
    ( $varname:ident, $N:expr, BigInt ) => {
        #[derive(Eq, Clone, Debug, Default)]
        pub struct $varname(BigInt);

        impl $varname {
            fn get_len(value: &BigInt) -> usize {
                (value.bits() as usize + 7) >> 3
            }

            // size of the len field, 3.3.4 of the VM description
            fn get_len_len() -> usize {
                let max_bits = ($N - 1) as f64;
                max_bits.log2() as usize + 1
            }

            fn check_overflow(value: &BigInt) -> Result<()> {
                if value.sign() == Sign::Minus {
                    fail!("negative value {} for {}", value, stringify!($varname))
                }
                match Self::get_len(value) >= $N {
                    true => fail!("value {} is bigger than {} bytes", value, $N - 1),
                    false => Ok(())
                }
            }

            pub fn new(value: BigInt) -> Result<Self> {
                Self::check_overflow(&value)?;
                Ok($varname(value))
            }

            pub fn from_two_u128(hi: u128, lo: u128) -> Result<Self> {
                Self::new((BigInt::from(hi) << 128) | BigInt::from(lo))
            }

            pub fn value(&self) -> &BigInt {
                &self.0
            }

            pub fn zero() -> Self {
                $varname(Zero::zero())
            }

            pub fn one() -> Self {
                $varname(One::one())
            }

            pub fn is_zero(&self) -> bool {
                self.0.is_zero()
            }
        }

        impl From<u64> for $varname {
            fn from(value: u64) -> Self {
                $varname(BigInt::from(value))
            }
        }

        impl FromStr for $varname {
            type Err = failure::Error;

            fn from_str(string: &str) -> Result<Self> {
                let result = match string.strip_prefix("0x") {
                    Some(stripped) => BigInt::parse_bytes(stripped.as_bytes(), 16),
                    None => BigInt::parse_bytes(string.as_bytes(), 10)
                };
                match result {
                    Some(value) => Self::new(value),
                    None => fail!("cannot parse {} for {}", string, stringify!($varname))
                }
            }
        }

        impl AddSub for $varname {
            fn add(&mut self, other: &Self) -> Result<bool> {
                let result = &self.0 + &other.0;
                if let Err(err) = Self::check_overflow(&result) {
                    log::warn!(target: "block", "{} + {} overflow: {}", self, other, err);
                    return Ok(false)
                }
                self.0 = result;
                Ok(true)
            }
            fn sub(&mut self, other: &Self) -> Result<bool> {
                if self.0 < other.0 {
                    return Ok(false)
                }
                self.0 = &self.0 - &other.0;
                Ok(true)
            }
        }

        impl Ord for $varname {
            fn cmp(&self, other: &$varname) -> std::cmp::Ordering {
                Ord::cmp(&self.0, &other.0)
            }
        }

        impl PartialOrd for $varname {
            fn partial_cmp(&self, other: &$varname) -> Option<std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }

        impl PartialEq for $varname {
            fn eq(&self, other: &$varname) -> bool {
                self.0 == other.0
            }
        }

        impl Serializable for $varname {
            fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
                let len = Self::get_len(&self.0);
                if len >= $N {
                    fail!("serialization of {} error {} >= {}", stringify!($varname), len, $N)
                }
                cell.append_bits(len, Self::get_len_len())?;
                let value = self.0.to_bytes_be().1;
                if len != 0 {
                    cell.append_raw(&value, len * 8)?;
                }
                Ok(())
            }
        }

        impl Deserializable for $varname {
            fn construct_from(slice: &mut SliceData) -> Result<Self> {
                let len = slice.get_next_int(Self::get_len_len())? as usize;
                if len >= $N {
                    fail!("deserialization of {} error {} >= {}", stringify!($varname), len, $N)
                }
                Ok($varname(BigInt::from_bytes_be(Sign::Plus, &slice.get_next_bytes(len)?)))
            }
        }

        impl fmt::Display for $varname {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}", &self.0)
            }
        }
    };
    ( $varname:ident, $N:expr, $tt:ty ) => {
        #[derive(Eq, Copy, Clone, Debug, Default, Ord, PartialEq, PartialOrd, Hash)]
        pub struct $varname($tt);

        impl $varname {
            pub fn new(value: $tt) -> Result<Self> {
                Self::check_overflow(&value)?;
                Ok(Self(value))
            }
            pub const fn zero() -> Self { Self(0) }
            pub const fn one() -> Self { Self(1) }
            pub const fn is_zero(&self) -> bool { self.0 == 0 }
            pub const fn inner(&self) -> $tt { self.0 }
            fn len_bits() -> usize {
                (8 - ($N as u8).leading_zeros()) as usize
            }
            fn bytes_of(value: &$tt) -> usize {
                ((0 as $tt).leading_zeros() / 8 - value.leading_zeros() / 8) as usize
            }
            fn check_overflow(value: &$tt) -> Result<()> {
                match Self::bytes_of(value) > $N {
                    true => fail!("value {} is bigger than {} bytes", value, $N),
                    false => Ok(())
                }
            }
            pub fn checked_add(&self, other: &Self) -> Option<Self> {
                let result = self.0.checked_add(other.0)?;
                Self::check_overflow(&result).ok()?;
                Some(Self(result))
            }
            pub fn checked_sub(&self, other: &Self) -> Option<Self> {
                Some(Self(self.0.checked_sub(other.0)?))
            }
        }

        impl Serializable for $varname {
            fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
                let bytes = Self::bytes_of(&self.0);
                if bytes > $N {
                    fail!("cannot store {} {}, required {} bytes", self, stringify!($varname), bytes)
                }
                cell.append_bits(bytes, Self::len_bits())?;
                let be_bytes = self.0.to_be_bytes();
                cell.append_raw(&be_bytes[be_bytes.len() - bytes..], bytes * 8)?;
                Ok(())
            }
        }

        impl Deserializable for $varname {
            fn construct_from(slice: &mut SliceData) -> Result<Self> {
                let bytes = slice.get_next_int(Self::len_bits())? as usize;
                let max = std::mem::size_of::<$tt>();
                if bytes > max {
                    fail!("{} bytes is too long for {}", bytes, stringify!($varname))
                }
                let mut be_bytes = [0u8; std::mem::size_of::<$tt>()];
                be_bytes[max - bytes..].copy_from_slice(&slice.get_next_bytes(bytes)?);
                Ok(Self(<$tt>::from_be_bytes(be_bytes)))
            }
        }

        impl AddSub for $varname {
            fn add(&mut self, other: &Self) -> Result<bool> {
                match self.checked_add(other) {
                    Some(result) => {
                        *self = result;
                        Ok(true)
                    }
                    None => {
                        log::warn!(target: "block", "{} + {} overflow", self, other);
                        Ok(false)
                    }
                }
            }
            fn sub(&mut self, other: &Self) -> Result<bool> {
                match self.checked_sub(other) {
                    Some(result) => {
                        *self = result;
                        Ok(true)
                    }
                    None => Ok(false)
                }
            }
        }

        impl fmt::Display for $varname {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}", &self.0)
            }
        }
    }
}

define_VarIntegerN!(Grams, 15, u128);
define_VarIntegerN!(VarUInteger32, 32, BigInt);

// it cannot produce problem
impl From<u64> for Grams {
    fn from(value: u64) -> Self {
        Self(value as u128)
    }
}

impl Grams {
    pub const fn as_u128(&self) -> u128 { self.0 }
    pub const fn as_u64(&self) -> Option<u64> {
        if self.0 <= u64::MAX as u128 {
            Some(self.0 as u64)
        } else {
            None
        }
    }
}

impl FromStr for Grams {
    type Err = failure::Error;

    fn from_str(string: &str) -> Result<Self> {
        let value = match string.strip_prefix("0x") {
            Some(stripped) => u128::from_str_radix(stripped, 16),
            None => string.parse::<u128>()
        };
        match value {
            Ok(value) => Grams::new(value),
            Err(err) => fail!("cannot parse {} for Grams: {}", string, err)
        }
    }
}

impl Augmentable for Grams {
    fn calc(&mut self, other: &Self) -> Result<bool> {
        self.add(other)
    }
}

///
/// Typed wrapper around a plain dictionary
///
#[macro_export]
macro_rules! define_HashmapE {
    ( $varname:ident, $bit_len:expr, $x_type:ty ) => {
        #[derive(PartialEq, Clone, Debug, Eq)]
        pub struct $varname(ton_types::HashmapE);

        #[allow(dead_code)]
        impl $varname {
            /// constructor with HashmapE root
            pub fn with_hashmap(data: Option<ton_types::Cell>) -> Self {
                Self(ton_types::HashmapE::with_hashmap($bit_len, data))
            }
            pub fn root(&self) -> Option<&ton_types::Cell> {
                ton_types::HashmapType::data(&self.0)
            }
            /// Reads a non-empty root stored inline
            pub fn read_hashmap_root(&mut self, slice: &mut ton_types::SliceData) -> ton_types::Result<()> {
                self.0.read_hashmap_root(slice)
            }
            /// Return true if no items
            pub fn is_empty(&self) -> bool {
                ton_types::HashmapType::is_empty(&self.0)
            }
            /// Calculates length
            pub fn len(&self) -> ton_types::Result<usize> {
                let mut len = 0;
                self.iterate_slices_with_keys(|_, _| {
                    len += 1;
                    Ok(true)
                })?;
                Ok(len)
            }
            /// iterates items
            pub fn iterate<F>(&self, mut p: F) -> ton_types::Result<bool>
            where F: FnMut($x_type) -> ton_types::Result<bool> {
                ton_types::HashmapType::iterate_slices(&self.0, |_, ref mut slice| {
                    p(<$x_type as $crate::Deserializable>::construct_from(slice)?)
                })
            }
            /// iterates items with keys
            pub fn iterate_with_keys<K, F>(&self, mut p: F) -> ton_types::Result<bool>
            where K: $crate::Deserializable, F: FnMut(K, $x_type) -> ton_types::Result<bool> {
                ton_types::HashmapType::iterate_slices(&self.0, |ref mut key, ref mut slice| p(
                    K::construct_from(key)?,
                    <$x_type as $crate::Deserializable>::construct_from(slice)?
                ))
            }
            /// iterates items as slices with keys
            pub fn iterate_slices_with_keys<F>(&self, mut p: F) -> ton_types::Result<bool>
            where F: FnMut(ton_types::SliceData, ton_types::SliceData) -> ton_types::Result<bool> {
                ton_types::HashmapType::iterate_slices(&self.0, |key, slice| p(key, slice))
            }
            pub fn set<K: $crate::Serializable>(&mut self, key: &K, value: &$x_type) -> ton_types::Result<()> {
                let key = $crate::Serializable::write_to_bitstring(key)?;
                let value = $crate::Serializable::write_to_new_cell(value)?;
                self.0.set_builder(key, &value)?;
                Ok(())
            }
            pub fn get<K: $crate::Serializable>(&self, key: &K) -> ton_types::Result<Option<$x_type>> {
                let key = $crate::Serializable::write_to_bitstring(key)?;
                self.0.get(key)?
                    .map(|ref mut slice| <$x_type as $crate::Deserializable>::construct_from(slice))
                    .transpose()
            }
            pub fn remove<K: $crate::Serializable>(&mut self, key: &K) -> ton_types::Result<bool> {
                let key = $crate::Serializable::write_to_bitstring(key)?;
                Ok(self.0.remove(key)?.is_some())
            }
        }

        impl Default for $varname {
            fn default() -> Self {
                Self(ton_types::HashmapE::with_bit_len($bit_len))
            }
        }

        impl $crate::Serializable for $varname {
            fn write_to(&self, cell: &mut ton_types::BuilderData) -> ton_types::Result<()> {
                match ton_types::HashmapType::data(&self.0) {
                    Some(root) => {
                        ton_types::IBitstring::append_bit_one(cell)?;
                        cell.checked_append_reference(root.clone())?;
                    }
                    None => {
                        ton_types::IBitstring::append_bit_zero(cell)?;
                    }
                }
                Ok(())
            }
        }

        impl $crate::Deserializable for $varname {
            fn construct_from(slice: &mut ton_types::SliceData) -> ton_types::Result<Self> {
                let root = match slice.get_next_bit()? {
                    true => Some(slice.checked_drain_reference()?),
                    false => None
                };
                Ok(Self::with_hashmap(root))
            }
        }
    }
}

/*
extra_currencies$_
    dict:(HashMapE 32 (VarUInteger 32))
= ExtraCurrencyCollection;
*/
define_HashmapE!{ExtraCurrencyCollection, 32, VarUInteger32}

/*
currencies$_
    grams: Grams
    other:ExtraCurrencyCollection
= CurrencyCollection;
*/
/// Amount of grams with optional extra currencies.
///
/// Any failed arithmetic poisons the collection: it becomes invalid and every
/// further operation involving it yields an invalid result.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CurrencyCollection {
    pub grams: Grams,
    pub other: ExtraCurrencyCollection,
    invalid: bool,
}

impl CurrencyCollection {
    pub fn with_grams(grams: u64) -> Self {
        Self::from_grams(Grams::from(grams))
    }

    pub fn from_grams(grams: Grams) -> Self {
        CurrencyCollection {
            grams,
            other: ExtraCurrencyCollection::default(),
            invalid: false,
        }
    }

    /// Poisoned value
    pub fn invalid() -> Self {
        let mut result = Self::default();
        result.invalidate();
        result
    }

    pub fn is_valid(&self) -> bool {
        !self.invalid
    }

    pub fn invalidate(&mut self) {
        self.grams = Grams::zero();
        self.other = ExtraCurrencyCollection::default();
        self.invalid = true;
    }

    pub fn get_other(&self, key: u32) -> Result<Option<VarUInteger32>> {
        self.other.get(&key)
    }

    pub fn set_other(&mut self, key: u32, other: u128) -> Result<()> {
        self.set_other_ex(key, &VarUInteger32::from_two_u128(0, other)?)
    }

    pub fn set_other_ex(&mut self, key: u32, other: &VarUInteger32) -> Result<()> {
        if other.is_zero() {
            self.other.remove(&key)?;
        } else {
            self.other.set(&key, other)?;
        }
        Ok(())
    }

    pub fn is_zero(&self) -> Result<bool> {
        if !self.grams.is_zero() {
            return Ok(false)
        }
        self.other.iterate(|value| Ok(value.is_zero()))
    }

    /// Sum of two collections, invalid if either operand is invalid or on overflow
    pub fn checked_add(&self, other: &Self) -> Self {
        let mut result = self.clone();
        if result.add(other).is_err() {
            result.invalidate();
        }
        result
    }

    /// Difference of two collections, invalid if any amount would go negative
    pub fn checked_sub(&self, other: &Self) -> Self {
        let mut result = self.clone();
        if result.sub(other).is_err() {
            result.invalidate();
        }
        result
    }

    /// `self >= other` for every currency. Invalid operands never compare.
    pub fn is_ge(&self, other: &Self) -> bool {
        self.is_valid() && other.is_valid() && self.checked_sub(other).is_valid()
    }

    fn add_other(&self, other: &ExtraCurrencyCollection) -> Result<Option<ExtraCurrencyCollection>> {
        let mut result = self.other.clone();
        let mut ok = true;
        other.iterate_with_keys(|key: u32, b| {
            match self.other.get(&key)? {
                Some(mut a) => {
                    if !a.add(&b)? {
                        ok = false;
                        return Ok(false)
                    }
                    result.set(&key, &a)?;
                }
                None => if !b.is_zero() {
                    result.set(&key, &b)?;
                }
            }
            Ok(true)
        })?;
        Ok(if ok { Some(result) } else { None })
    }

    fn sub_other(&self, other: &ExtraCurrencyCollection) -> Result<Option<ExtraCurrencyCollection>> {
        let mut result = self.other.clone();
        let mut ok = true;
        other.iterate_with_keys(|key: u32, b| {
            if b.is_zero() {
                return Ok(true)
            }
            if let Some(mut a) = self.other.get(&key)? {
                if a.sub(&b)? {
                    if a.is_zero() {
                        result.remove(&key)?;
                    } else {
                        result.set(&key, &a)?;
                    }
                    return Ok(true)
                }
            }
            // coin not found in mine or amount is smaller
            ok = false;
            Ok(false)
        })?;
        Ok(if ok { Some(result) } else { None })
    }
}

impl AddSub for CurrencyCollection {
    fn add(&mut self, other: &Self) -> Result<bool> {
        if !self.is_valid() || !other.is_valid() {
            self.invalidate();
            return Ok(false)
        }
        let mut grams = self.grams;
        let extra = match self.add_other(&other.other) {
            Ok(Some(extra)) => extra,
            _ => {
                self.invalidate();
                return Ok(false)
            }
        };
        if !grams.add(&other.grams)? {
            self.invalidate();
            return Ok(false)
        }
        self.grams = grams;
        self.other = extra;
        Ok(true)
    }
    fn sub(&mut self, other: &Self) -> Result<bool> {
        if !self.is_valid() || !other.is_valid() {
            self.invalidate();
            return Ok(false)
        }
        let mut grams = self.grams;
        let extra = match self.sub_other(&other.other) {
            Ok(Some(extra)) => extra,
            _ => {
                self.invalidate();
                return Ok(false)
            }
        };
        if !grams.sub(&other.grams)? {
            self.invalidate();
            return Ok(false)
        }
        self.grams = grams;
        self.other = extra;
        Ok(true)
    }
}

impl Augmentable for CurrencyCollection {
    fn calc(&mut self, other: &Self) -> Result<bool> {
        self.add(other)
    }
}

impl Serializable for CurrencyCollection {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        if !self.is_valid() {
            fail!(BlockError::InvalidOperation("cannot serialize invalid currency collection".to_string()))
        }
        self.grams.write_to(cell)?;
        self.other.write_to(cell)?;
        Ok(())
    }
}

impl Deserializable for CurrencyCollection {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        let grams = Grams::construct_from(slice)?;
        let other = ExtraCurrencyCollection::construct_from(slice)?;
        Ok(Self { grams, other, invalid: false })
    }
}

impl fmt::Display for CurrencyCollection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if !self.is_valid() {
            return write!(f, "<invalid>")
        }
        write!(f, "{}", self.grams)?;
        if !self.other.is_empty() {
            let mut len = 0;
            write!(f, ", other: {{")?;
            self.other.iterate_with_keys(|key: u32, value| {
                len += 1;
                write!(f, " {} => {},", key, value)?;
                Ok(true)
            }).ok();
            write!(f, " count: {} }}", len)?;
        }
        Ok(())
    }
}

impl From<u64> for CurrencyCollection {
    fn from(value: u64) -> Self {
        Self::with_grams(value)
    }
}

/// Value stored in a separate cell
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InRefValue<X: Deserializable + Serializable>(pub X);

impl<X: Deserializable + Serializable> InRefValue<X> {
    pub fn new(inner: X) -> InRefValue<X> {
        InRefValue(inner)
    }
    pub fn inner(self) -> X {
        self.0
    }
}

impl<X: Deserializable + Serializable> Deref for InRefValue<X> {
    type Target = X;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<X: Deserializable + Serializable> DerefMut for InRefValue<X> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<X: Deserializable + Serializable> Deserializable for InRefValue<X> {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        Ok(Self(X::construct_from_reference(slice)?))
    }
}

impl<X: Deserializable + Serializable> Serializable for InRefValue<X> {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        cell.checked_append_reference(self.0.serialize()?)?;
        Ok(())
    }
}

#[derive(PartialEq, Copy, Clone, Debug, Eq, Default, Hash, PartialOrd, Ord)]
pub struct UnixTime32(u32);

impl UnixTime32 {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl From<u32> for UnixTime32 {
    fn from(value: u32) -> Self {
        UnixTime32(value)
    }
}

impl Serializable for UnixTime32 {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        self.0.write_to(cell)
    }
}

impl Deserializable for UnixTime32 {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        Ok(Self(slice.get_next_u32()?))
    }
}

impl Display for UnixTime32 {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lazily decoded child reference
#[derive(Debug, Clone)]
pub struct ChildCell<T: Serializable + Deserializable> {
    cell: Option<Cell>,
    phantom: PhantomData<T>,
}

impl<T: Serializable + Deserializable> Default for ChildCell<T> {
    fn default() -> Self {
        Self {
            cell: None,
            phantom: PhantomData,
        }
    }
}

impl<T: Serializable + Deserializable> ChildCell<T> {
    pub fn with_cell(cell: Cell) -> Self {
        Self {
            cell: Some(cell),
            phantom: PhantomData,
        }
    }

    pub fn with_struct(s: &T) -> Result<Self> {
        Ok(Self::with_cell(s.serialize()?))
    }

    pub fn write_struct(&mut self, s: &T) -> Result<()> {
        self.cell = Some(s.serialize()?);
        Ok(())
    }

    pub fn read_struct(&self) -> Result<T> {
        match self.cell.clone() {
            Some(cell) => {
                if cell.cell_type() == CellType::PrunedBranch {
                    fail!(
                        BlockError::PrunedCellAccess(std::any::type_name::<T>().into())
                    )
                }
                T::construct_from_cell(cell)
            }
            None => Ok(T::default())
        }
    }

    pub fn cell(&self) -> Result<Cell> {
        match self.cell.as_ref() {
            Some(cell) => Ok(cell.clone()),
            None => T::default().serialize()
        }
    }

    pub fn hash(&self) -> Result<UInt256> {
        Ok(self.cell()?.repr_hash())
    }

    pub fn empty(&self) -> bool {
        self.cell.is_none()
    }
}

impl<T: Serializable + Deserializable> PartialEq for ChildCell<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self.cell(), other.cell()) {
            (Ok(cell), Ok(other)) => cell == other,
            _ => false
        }
    }
}

impl<T: Serializable + Deserializable> Eq for ChildCell<T> {}

impl<T: Serializable + Deserializable> Serializable for ChildCell<T> {
    fn write_to(&self, cell: &mut BuilderData) -> Result<()> {
        cell.checked_append_reference(self.cell()?)?;
        Ok(())
    }
}

impl<T: Serializable + Deserializable> Deserializable for ChildCell<T> {
    fn construct_from(slice: &mut SliceData) -> Result<Self> {
        Ok(Self::with_cell(slice.checked_drain_reference()?))
    }
}

#[cfg(test)]
#[path = "tests/test_types.rs"]
mod tests;
