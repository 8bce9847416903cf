//! Parameter slot storage and addressing.
//!
//! Parameter values never live inline with a step declaration: they sit in
//! per-component typed arrays so a value can be edited and persisted
//! independently of code, and so the same prerequisite invoked at two
//! positions of a chain owns two distinct slots. A slot is addressed by a
//! portable string that round-trips exactly:
//!
//! `<typeName>,<owner>.<method>.<param>.<fullId>,<arrayField>.Array.data[<index>]`
//!
//! A parameters-index string is a list of such entries, each prefixed with
//! `;`. The empty list encodes as the empty string.

use crate::catalog::{ParamValue, ParameterType};
use crate::chain::FlattenedPlan;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Faults raised by slot decoding and storage access.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    #[error("malformed slot address entry '{entry}'")]
    Malformed { entry: String },

    #[error("unknown parameter type '{name}' in slot address")]
    UnknownType { name: String },

    #[error("unknown storage array '{name}' in slot address")]
    UnknownArray { name: String },

    #[error("no parameter store for component '{component}'")]
    UnknownComponent { component: String },

    #[error("slot index {index} is out of bounds for {array} (len {len})")]
    OutOfBounds {
        array: &'static str,
        index: usize,
        len: usize,
    },

    #[error("type mismatch for {array}: expected {expected}, got {got}")]
    TypeMismatch {
        array: &'static str,
        expected: &'static str,
        got: &'static str,
    },
}

/// Fully-qualified location of one parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotAddress {
    pub ty: ParameterType,
    pub owner: String,
    pub method: String,
    pub param: String,
    /// Concatenated ancestor ids of the owning chain node, innermost last.
    pub full_id: String,
    pub array_field: String,
    pub index: usize,
}

impl SlotAddress {
    /// `"owner.method.param.fullId"` -- the logical identity of the
    /// parameter occurrence, independent of where it is stored.
    pub fn parameter_full_name(&self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.owner, self.method, self.param, self.full_id
        )
    }

    /// Encode one entry, without the leading `;`.
    pub fn encode(&self) -> String {
        format!(
            "{},{},{}.Array.data[{}]",
            self.ty.type_name(),
            self.parameter_full_name(),
            self.array_field,
            self.index
        )
    }

    /// Decode one entry (leading `;` tolerated).
    pub fn decode(entry: &str) -> Result<SlotAddress, SlotError> {
        let entry_trimmed = entry.strip_prefix(';').unwrap_or(entry);
        let malformed = || SlotError::Malformed {
            entry: entry.to_owned(),
        };

        let mut sections = entry_trimmed.split(',');
        let type_name = sections.next().ok_or_else(malformed)?;
        let full_name = sections.next().ok_or_else(malformed)?;
        let location = sections.next().ok_or_else(malformed)?;
        if sections.next().is_some() {
            return Err(malformed());
        }

        let ty = ParameterType::from_type_name(type_name).ok_or_else(|| {
            SlotError::UnknownType {
                name: type_name.to_owned(),
            }
        })?;

        // owner.method.param.fullId -- the full id may itself contain `_`
        // but never `.`, so exactly four dot-separated pieces.
        let pieces: Vec<&str> = full_name.split('.').collect();
        if pieces.len() != 4 {
            return Err(malformed());
        }

        let (array_field, index_part) = location.split_once(".Array.data[").ok_or_else(malformed)?;
        let index: usize = index_part
            .strip_suffix(']')
            .ok_or_else(malformed)?
            .parse()
            .map_err(|_| malformed())?;

        Ok(SlotAddress {
            ty,
            owner: pieces[0].to_owned(),
            method: pieces[1].to_owned(),
            param: pieces[2].to_owned(),
            full_id: pieces[3].to_owned(),
            array_field: array_field.to_owned(),
            index,
        })
    }

    /// Encode an address list: each entry prefixed with `;`.
    pub fn encode_list(addresses: &[SlotAddress]) -> String {
        let mut result = String::new();
        for address in addresses {
            result.push(';');
            result.push_str(&address.encode());
        }
        result
    }

    /// Decode an address list, skipping empty segments.
    pub fn decode_list(encoded: &str) -> Result<Vec<SlotAddress>, SlotError> {
        Self::split_entries(encoded).map(Self::decode).collect()
    }

    /// Non-empty `;`-separated segments of an encoded list.
    pub fn split_entries(encoded: &str) -> impl Iterator<Item = &str> {
        encoded.split(';').filter(|segment| !segment.is_empty())
    }
}

/// Typed, growable parameter storage for one component.
///
/// One array per concrete parameter type. Arrays only grow between resets;
/// a reset clears all four at once.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParameterStore {
    #[serde(default)]
    pub bool_storage: Vec<bool>,
    #[serde(default)]
    pub int_storage: Vec<i64>,
    #[serde(default)]
    pub float_storage: Vec<f64>,
    #[serde(default)]
    pub string_storage: Vec<String>,
}

impl ParameterStore {
    pub fn reset(&mut self) {
        self.bool_storage.clear();
        self.int_storage.clear();
        self.float_storage.clear();
        self.string_storage.clear();
    }

    pub fn len(&self, ty: ParameterType) -> usize {
        match ty {
            ParameterType::Bool => self.bool_storage.len(),
            ParameterType::Int => self.int_storage.len(),
            ParameterType::Float => self.float_storage.len(),
            ParameterType::Str => self.string_storage.len(),
        }
    }

    pub fn is_empty(&self, ty: ParameterType) -> bool {
        self.len(ty) == 0
    }

    /// Append a value to its typed array; returns the new slot's index.
    pub fn push(&mut self, value: &ParamValue) -> usize {
        match value {
            ParamValue::Bool(v) => {
                self.bool_storage.push(*v);
                self.bool_storage.len() - 1
            }
            ParamValue::Int(v) => {
                self.int_storage.push(*v);
                self.int_storage.len() - 1
            }
            ParamValue::Float(v) => {
                self.float_storage.push(*v);
                self.float_storage.len() - 1
            }
            ParamValue::Str(v) => {
                self.string_storage.push(v.clone());
                self.string_storage.len() - 1
            }
        }
    }

    pub fn get(&self, ty: ParameterType, index: usize) -> Result<ParamValue, SlotError> {
        let len = self.len(ty);
        if index >= len {
            return Err(SlotError::OutOfBounds {
                array: ty.storage_field(),
                index,
                len,
            });
        }
        Ok(match ty {
            ParameterType::Bool => ParamValue::Bool(self.bool_storage[index]),
            ParameterType::Int => ParamValue::Int(self.int_storage[index]),
            ParameterType::Float => ParamValue::Float(self.float_storage[index]),
            ParameterType::Str => ParamValue::Str(self.string_storage[index].clone()),
        })
    }

    pub fn set(&mut self, index: usize, value: &ParamValue) -> Result<(), SlotError> {
        let ty = value.ty();
        let len = self.len(ty);
        if index >= len {
            return Err(SlotError::OutOfBounds {
                array: ty.storage_field(),
                index,
                len,
            });
        }
        match value {
            ParamValue::Bool(v) => self.bool_storage[index] = *v,
            ParamValue::Int(v) => self.int_storage[index] = *v,
            ParamValue::Float(v) => self.float_storage[index] = *v,
            ParamValue::Str(v) => self.string_storage[index] = v.clone(),
        }
        Ok(())
    }
}

/// Parameter stores for every component of a scenario, keyed by component
/// type name. Passed explicitly; nothing here is ambient state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StoreSet {
    stores: BTreeMap<String, ParameterStore>,
}

impl StoreSet {
    pub fn new() -> Self {
        StoreSet::default()
    }

    pub fn store(&self, component: &str) -> Option<&ParameterStore> {
        self.stores.get(component)
    }

    pub fn store_mut(&mut self, component: &str) -> &mut ParameterStore {
        self.stores.entry(component.to_owned()).or_default()
    }

    pub fn reset_component(&mut self, component: &str) {
        self.store_mut(component).reset();
    }
}

/// Allocate storage slots for every parameter of every plan node.
///
/// Every component appearing in the plan has its store reset first, then
/// one slot per (node, parameter) pair is appended in flattening order --
/// the node's bound value when present, the type default otherwise. Each
/// node's parameters get their [`SlotAddress`] recorded, and each chain
/// root accumulates the encoded index string for its whole chain (keyed by
/// root arena index in the returned map); that string is what a host
/// persists to re-bind values on the next resolution.
///
/// Re-allocation is destructive and total per component: values previously
/// held in the arrays are lost unless the caller re-binds them from a
/// retained index string. Known, documented behavior -- not a bug.
pub fn allocate(plan: &mut FlattenedPlan, stores: &mut StoreSet) -> BTreeMap<usize, String> {
    for component in plan.component_names() {
        stores.reset_component(&component);
    }

    let roots: Vec<usize> = (0..plan.nodes.len()).map(|i| plan.root_of(i)).collect();
    let mut indexes: BTreeMap<usize, String> = BTreeMap::new();

    for node_index in 0..plan.nodes.len() {
        let owner = plan.nodes[node_index].step.owner.clone();
        let method = plan.nodes[node_index].step.method.clone();
        let full_id = plan.nodes[node_index].full_id.clone();
        let mut chain_entries = String::new();

        for param in &mut plan.nodes[node_index].params {
            let ty = param.descriptor.ty;
            let value = param.value.clone().unwrap_or_else(|| ty.default_value());
            let index = stores.store_mut(&owner).push(&value);
            let address = SlotAddress {
                ty,
                owner: owner.clone(),
                method: method.clone(),
                param: param.descriptor.name.clone(),
                full_id: full_id.clone(),
                array_field: ty.storage_field().to_owned(),
                index,
            };
            chain_entries.push(';');
            chain_entries.push_str(&address.encode());
            param.value = Some(value);
            param.address = Some(address);
        }

        if !chain_entries.is_empty() {
            indexes
                .entry(roots[node_index])
                .or_default()
                .push_str(&chain_entries);
        }
    }
    indexes
}

/// Read the value behind a slot address.
pub fn read(address: &SlotAddress, stores: &StoreSet) -> Result<ParamValue, SlotError> {
    let ty = ParameterType::from_storage_field(&address.array_field).ok_or_else(|| {
        SlotError::UnknownArray {
            name: address.array_field.clone(),
        }
    })?;
    let store = stores
        .store(&address.owner)
        .ok_or_else(|| SlotError::UnknownComponent {
            component: address.owner.clone(),
        })?;
    store.get(ty, address.index)
}

/// Write a value through a slot address (the editor-side operation).
pub fn write(
    address: &SlotAddress,
    value: &ParamValue,
    stores: &mut StoreSet,
) -> Result<(), SlotError> {
    let ty = ParameterType::from_storage_field(&address.array_field).ok_or_else(|| {
        SlotError::UnknownArray {
            name: address.array_field.clone(),
        }
    })?;
    if value.ty() != ty {
        return Err(SlotError::TypeMismatch {
            array: ty.storage_field(),
            expected: ty.type_name(),
            got: value.ty().type_name(),
        });
    }
    let store = stores.store_mut(&address.owner);
    store.set(address.index, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_address() -> SlotAddress {
        SlotAddress {
            ty: ParameterType::Str,
            owner: "CubeSteps".into(),
            method: "a_cube_named".into(),
            param: "name".into(),
            full_id: "left_inner".into(),
            array_field: "string_storage".into(),
            index: 2,
        }
    }

    #[test]
    fn address_encoding_matches_wire_format() {
        assert_eq!(
            sample_address().encode(),
            "string,CubeSteps.a_cube_named.name.left_inner,string_storage.Array.data[2]"
        );
    }

    #[test]
    fn address_round_trips() {
        let address = sample_address();
        assert_eq!(SlotAddress::decode(&address.encode()).unwrap(), address);

        let list = vec![
            address.clone(),
            SlotAddress {
                ty: ParameterType::Int,
                owner: "CubeSteps".into(),
                method: "cubes_exist".into(),
                param: "count".into(),
                full_id: String::new(),
                array_field: "int_storage".into(),
                index: 0,
            },
        ];
        let encoded = SlotAddress::encode_list(&list);
        assert!(encoded.starts_with(';'));
        assert_eq!(SlotAddress::decode_list(&encoded).unwrap(), list);
    }

    #[test]
    fn empty_list_encodes_as_empty_string() {
        assert_eq!(SlotAddress::encode_list(&[]), "");
        assert!(SlotAddress::decode_list("").unwrap().is_empty());
    }

    #[test]
    fn decode_rejects_malformed_entries() {
        assert!(matches!(
            SlotAddress::decode("no-commas-here"),
            Err(SlotError::Malformed { .. })
        ));
        assert!(matches!(
            SlotAddress::decode("decimal,A.b.c.,string_storage.Array.data[0]"),
            Err(SlotError::UnknownType { .. })
        ));
        assert!(matches!(
            SlotAddress::decode("string,A.b.c.,string_storage.Array.data[oops]"),
            Err(SlotError::Malformed { .. })
        ));
    }

    #[test]
    fn store_grows_and_resets() {
        let mut store = ParameterStore::default();
        assert_eq!(store.push(&ParamValue::Str("a".into())), 0);
        assert_eq!(store.push(&ParamValue::Str("b".into())), 1);
        assert_eq!(store.push(&ParamValue::Int(7)), 0);
        assert_eq!(
            store.get(ParameterType::Str, 1).unwrap(),
            ParamValue::Str("b".into())
        );
        store.reset();
        assert!(store.is_empty(ParameterType::Str));
        assert!(store.is_empty(ParameterType::Int));
    }

    #[test]
    fn write_then_read_returns_the_value() {
        let mut stores = StoreSet::new();
        stores
            .store_mut("CubeSteps")
            .string_storage
            .extend(["".to_string(), "".to_string(), "".to_string()]);
        let address = sample_address();
        write(&address, &ParamValue::Str("tower".into()), &mut stores).unwrap();
        assert_eq!(
            read(&address, &stores).unwrap(),
            ParamValue::Str("tower".into())
        );
    }

    #[test]
    fn write_rejects_type_mismatch() {
        let mut stores = StoreSet::new();
        stores.store_mut("CubeSteps").string_storage.push("".into());
        let mut address = sample_address();
        address.index = 0;
        assert!(matches!(
            write(&address, &ParamValue::Int(1), &mut stores),
            Err(SlotError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn read_reports_out_of_bounds() {
        let stores = {
            let mut s = StoreSet::new();
            s.store_mut("CubeSteps");
            s
        };
        assert!(matches!(
            read(&sample_address(), &stores),
            Err(SlotError::OutOfBounds { .. })
        ));
    }
}
