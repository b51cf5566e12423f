//! The schema of one version of a PDX class.

use super::field_type::{PdxFieldKind, PdxFieldType};
use crate::error::{PdxError, Result};
use crate::serialization::{DataInput, DataOutput, DsCode, ObjectDataInput, ObjectDataOutput};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Class name under which type descriptors travel to JVM members.
pub const JAVA_PDX_TYPE_CLASS: &str = "org.apache.geode.pdx.internal.PdxType";

/// Ordered field schema of one class version.
///
/// Field order is fixed at creation. Equality and hashing consider the class
/// name and the ordered `(name, kind)` list only, so two types with the same
/// shape compare equal whatever their type ids.
#[derive(Debug, Clone)]
pub struct PdxType {
    class_name: String,
    type_id: i32,
    fields: Vec<PdxFieldType>,
    field_index: HashMap<String, usize>,
    number_of_var_len_fields: usize,
    var_len_field_idx: i32,
    no_java_class: bool,
    is_local: bool,
}

impl PdxType {
    /// Creates an empty type for `class_name` with no id assigned.
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            type_id: 0,
            fields: Vec::new(),
            field_index: HashMap::new(),
            number_of_var_len_fields: 0,
            var_len_field_idx: -1,
            no_java_class: false,
            is_local: false,
        }
    }

    /// Creates a type whose peers may not have a domain class for it.
    pub fn without_java_class(class_name: impl Into<String>) -> Self {
        let mut t = Self::new(class_name);
        t.no_java_class = true;
        t
    }

    /// Fully-qualified class name.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Registry-assigned id, 0 until assigned.
    pub fn type_id(&self) -> i32 {
        self.type_id
    }

    pub(crate) fn set_type_id(&mut self, type_id: i32) {
        self.type_id = type_id;
    }

    /// Whether JVM members should skip loading a domain class.
    pub fn no_java_class(&self) -> bool {
        self.no_java_class
    }

    /// Whether this type describes the local class definition.
    pub fn is_local(&self) -> bool {
        self.is_local
    }

    pub(crate) fn set_local(&mut self, local: bool) {
        self.is_local = local;
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[PdxFieldType] {
        &self.fields
    }

    /// Number of fields.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Number of variable-length fields.
    pub fn number_of_var_len_fields(&self) -> usize {
        self.number_of_var_len_fields
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&PdxFieldType> {
        self.field_index.get(name).map(|&i| &self.fields[i])
    }

    /// Returns the declaration index of a field.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.field_index.get(name).copied()
    }

    /// Returns `true` if the type declares `name`.
    pub fn has_field(&self, name: &str) -> bool {
        self.field_index.contains_key(name)
    }

    /// Field names in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Appends a field, choosing fixed or variable layout from its kind.
    pub fn add_field(&mut self, name: &str, kind: PdxFieldKind) -> Result<()> {
        if kind.is_variable_length() {
            self.add_variable_length_field(name, kind)
        } else {
            self.add_fixed_length_field(name, kind)
        }
    }

    /// Appends a fixed-length field.
    pub fn add_fixed_length_field(&mut self, name: &str, kind: PdxFieldKind) -> Result<()> {
        if kind.is_variable_length() {
            return Err(PdxError::InvalidArgument(format!(
                "{} is not a fixed-length kind",
                kind
            )));
        }
        self.check_new_field(name)?;
        let idx = self.var_len_field_idx.max(0);
        self.push_field(PdxFieldType::new(name, kind, self.fields.len() as i32, idx));
        Ok(())
    }

    /// Appends a variable-length field and assigns it the next variable index.
    pub fn add_variable_length_field(&mut self, name: &str, kind: PdxFieldKind) -> Result<()> {
        if !kind.is_variable_length() {
            return Err(PdxError::InvalidArgument(format!(
                "{} is not a variable-length kind",
                kind
            )));
        }
        self.check_new_field(name)?;
        self.var_len_field_idx += 1;
        self.number_of_var_len_fields += 1;
        let idx = self.var_len_field_idx;
        self.push_field(PdxFieldType::new(name, kind, self.fields.len() as i32, idx));
        Ok(())
    }

    fn check_new_field(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(PdxError::InvalidArgument(
                "field name must not be empty".to_string(),
            ));
        }
        if self.field_index.contains_key(name) {
            return Err(PdxError::ProtocolViolation(format!(
                "field '{}' is already defined for class {}",
                name, self.class_name
            )));
        }
        Ok(())
    }

    fn push_field(&mut self, field: PdxFieldType) {
        self.field_index.insert(field.name.clone(), self.fields.len());
        self.fields.push(field);
        self.init_position_map();
    }

    /// Marks an existing field as an identity field.
    pub fn set_identity_field(&mut self, name: &str) -> Result<()> {
        match self.field_index.get(name) {
            Some(&i) => {
                self.fields[i].identity = true;
                Ok(())
            }
            None => Err(PdxError::ProtocolViolation(format!(
                "cannot mark unwritten field '{}' as identity",
                name
            ))),
        }
    }

    /// Indices of the identity fields, sorted by field name.
    ///
    /// A type with no field marked treats every field as an identity field.
    pub fn sorted_identity_fields(&self) -> Vec<usize> {
        let any_marked = self.fields.iter().any(|f| f.identity);
        let mut indices: Vec<usize> = (0..self.fields.len())
            .filter(|&i| !any_marked || self.fields[i].identity)
            .collect();
        indices.sort_by(|&a, &b| self.fields[a].name.cmp(&self.fields[b].name));
        indices
    }

    /// Recomputes `relative_offset` and `vl_offset_index` for every field.
    ///
    /// Fixed fields up to the first variable field, and that field itself, sit
    /// at constant offsets from the start. Every later field is located from
    /// the next variable field's table entry, or from the end of the field
    /// data when no variable field follows.
    fn init_position_map(&mut self) {
        let mut found_var = false;
        let mut next_var_idx = 0;
        let mut next_rel: Option<i32> = None;
        for field in self.fields.iter_mut().rev() {
            if field.is_variable_length() {
                field.vl_offset_index = field.var_len_field_idx;
                field.relative_offset = 0;
                found_var = true;
                next_var_idx = field.var_len_field_idx;
            } else {
                field.vl_offset_index = if found_var { next_var_idx } else { -1 };
                field.relative_offset = next_rel.unwrap_or(0) - field.fixed_size() as i32;
            }
            next_rel = Some(field.relative_offset);
        }

        let mut offset = 0i32;
        for field in self.fields.iter_mut() {
            field.relative_offset = offset;
            if field.is_variable_length() {
                field.vl_offset_index = -1;
                break;
            }
            offset += field.fixed_size() as i32;
        }
    }

    /// Returns the start of field `index` within the field data.
    ///
    /// `offsets` is the trailing offset table, `width` its entry size and
    /// `serialized_len` the length of the field data (the blob length minus
    /// the table).
    pub fn field_position(
        &self,
        index: usize,
        offsets: &[u8],
        width: usize,
        serialized_len: usize,
    ) -> Result<usize> {
        let field = self.fields.get(index).ok_or_else(|| {
            PdxError::Serialization(format!(
                "field index {} out of range for class {}",
                index, self.class_name
            ))
        })?;
        let rel = field.relative_offset as i64;
        let position = if field.is_variable_length() {
            if field.vl_offset_index == -1 {
                rel
            } else {
                self.table_entry(field.vl_offset_index, offsets, width)? as i64
            }
        } else if rel >= 0 {
            rel
        } else if field.vl_offset_index == -1 {
            serialized_len as i64 + rel
        } else {
            self.table_entry(field.vl_offset_index, offsets, width)? as i64 + rel
        };
        if position < 0 || position as usize > serialized_len {
            return Err(PdxError::Serialization(format!(
                "field '{}' resolves to position {} outside {} bytes of field data",
                field.name, position, serialized_len
            )));
        }
        Ok(position as usize)
    }

    /// Returns the end of field `index`: the next field's start, or
    /// `serialized_len` for the last field.
    pub fn field_end_position(
        &self,
        index: usize,
        offsets: &[u8],
        width: usize,
        serialized_len: usize,
    ) -> Result<usize> {
        if index + 1 >= self.fields.len() {
            Ok(serialized_len)
        } else {
            self.field_position(index + 1, offsets, width, serialized_len)
        }
    }

    /// Reads the table entry for variable field `var_idx`; entries are stored
    /// in reverse order and the first variable field has none.
    fn table_entry(&self, var_idx: i32, offsets: &[u8], width: usize) -> Result<usize> {
        let v = self.number_of_var_len_fields as i64;
        let slot = v - var_idx as i64 - 1;
        if var_idx < 1 || slot < 0 {
            return Err(PdxError::Serialization(format!(
                "no offset entry for variable field {} of {}",
                var_idx, v
            )));
        }
        let start = slot as usize * width;
        let entry = offsets.get(start..start + width).ok_or_else(|| {
            PdxError::Serialization(format!(
                "offset table of {} bytes has no entry {}",
                offsets.len(),
                slot
            ))
        })?;
        Ok(entry.iter().fold(0usize, |acc, &b| (acc << 8) | b as usize))
    }

    /// Compares class name and the ordered field shapes.
    pub fn same_shape(&self, other: &PdxType) -> bool {
        self.class_name == other.class_name
            && self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|(a, b)| a.same_shape(b))
    }

    /// Returns the union of two versions of a class.
    ///
    /// The version with more fields (`other` on a tie) keeps its order; the
    /// other version's exclusive fields are appended in their own order. The
    /// result carries no type id.
    pub fn merge_version(&self, other: &PdxType) -> Result<PdxType> {
        if self.class_name != other.class_name {
            return Err(PdxError::ProtocolViolation(format!(
                "cannot merge {} with {}",
                self.class_name, other.class_name
            )));
        }
        let (richer, poorer) = if self.fields.len() > other.fields.len() {
            (self, other)
        } else {
            (other, self)
        };

        let mut merged = PdxType::new(self.class_name.clone());
        merged.no_java_class = richer.no_java_class;
        for field in richer.fields.iter().chain(&poorer.fields) {
            if let Some(existing) = merged.field(&field.name) {
                if existing.kind != field.kind {
                    return Err(PdxError::ProtocolViolation(format!(
                        "field '{}' of {} is {} in one version and {} in another",
                        field.name, self.class_name, existing.kind, field.kind
                    )));
                }
                continue;
            }
            merged.add_field(&field.name, field.kind)?;
            if field.identity {
                merged.set_identity_field(&field.name)?;
            }
        }
        Ok(merged)
    }

    /// Writes the descriptor in the form JVM members exchange it.
    pub fn to_data(&self, output: &mut ObjectDataOutput) -> Result<()> {
        output.write_byte(DsCode::DataSerializable.as_byte())?;
        output.write_byte(DsCode::Class.as_byte())?;
        output.write_string(Some(JAVA_PDX_TYPE_CLASS))?;
        output.write_string(Some(&self.class_name))?;
        output.write_bool(self.no_java_class)?;
        output.write_int(self.type_id)?;
        output.write_int(self.var_len_field_idx.max(0))?;
        output.write_array_len(self.fields.len() as i32)?;
        for field in &self.fields {
            output.write_string(Some(&field.name))?;
            output.write_int(field.sequence_id)?;
            output.write_int(field.var_len_field_idx)?;
            output.write_byte(field.kind.id() as i8)?;
            output.write_int(field.relative_offset)?;
            output.write_int(field.vl_offset_index)?;
            output.write_bool(field.identity)?;
        }
        Ok(())
    }

    /// Reads a descriptor written by [`to_data`](Self::to_data).
    ///
    /// Offsets are recomputed from the field list rather than trusted.
    pub fn from_data(input: &mut ObjectDataInput<'_>) -> Result<Self> {
        expect_code(input, DsCode::DataSerializable)?;
        expect_code(input, DsCode::Class)?;
        let java_class = read_required_string(input)?;
        if java_class != JAVA_PDX_TYPE_CLASS {
            return Err(PdxError::Serialization(format!(
                "expected {}, found {}",
                JAVA_PDX_TYPE_CLASS, java_class
            )));
        }
        let class_name = read_required_string(input)?;
        let no_java_class = input.read_bool()?;
        let type_id = input.read_int()?;
        let _var_len_field_idx = input.read_int()?;
        let count = input.read_array_len()?.unwrap_or(0);

        let mut pdx_type = PdxType::new(class_name);
        pdx_type.no_java_class = no_java_class;
        pdx_type.type_id = type_id;
        for i in 0..count {
            let name = read_required_string(input)?;
            let sequence_id = input.read_int()?;
            let _var_len_idx = input.read_int()?;
            let kind = PdxFieldKind::from_id(input.read_u8()?)?;
            let _relative_offset = input.read_int()?;
            let _vl_offset_index = input.read_int()?;
            let identity = input.read_bool()?;
            if sequence_id != i as i32 {
                return Err(PdxError::Serialization(format!(
                    "field '{}' has sequence id {} at position {}",
                    name, sequence_id, i
                )));
            }
            pdx_type.add_field(&name, kind)?;
            if identity {
                pdx_type.set_identity_field(&name)?;
            }
        }
        Ok(pdx_type)
    }
}

fn expect_code(input: &mut ObjectDataInput<'_>, code: DsCode) -> Result<()> {
    let found = DsCode::from_u8(input.read_u8()?)?;
    if found != code {
        return Err(PdxError::ProtocolViolation(format!(
            "expected DSCode {:?}, found {:?}",
            code, found
        )));
    }
    Ok(())
}

fn read_required_string(input: &mut ObjectDataInput<'_>) -> Result<String> {
    input
        .read_string()?
        .ok_or_else(|| PdxError::Serialization("unexpected null string".to_string()))
}

/// Registry identity: the shape plus the identity-field marks, which change
/// how instances of the type hash.
impl PartialEq for PdxType {
    fn eq(&self, other: &Self) -> bool {
        self.same_shape(other)
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|(a, b)| a.identity == b.identity)
    }
}

impl Eq for PdxType {}

impl Hash for PdxType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.class_name.hash(state);
        for field in &self.fields {
            field.name.hash(state);
            field.kind.hash(state);
            field.identity.hash(state);
        }
    }
}

/// Index translations between a local type and a remote (or merged) type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMaps {
    /// Per local field: `-2` when it and every earlier field sit at the same
    /// index remotely, `-1` when absent remotely, else the remote index.
    pub local_to_remote: Vec<i32>,
    /// Per remote field: the local index, or `-1` for an absent
    /// variable-length field and `-2` for an absent fixed-length field.
    pub remote_to_local: Vec<i32>,
}

impl FieldMaps {
    /// Builds both maps by field name.
    pub fn new(local: &PdxType, remote: &PdxType) -> Self {
        let mut aligned = true;
        let local_to_remote = local
            .fields
            .iter()
            .enumerate()
            .map(|(i, f)| match remote.field_index(&f.name) {
                Some(r) if aligned && r == i => -2,
                Some(r) => {
                    aligned = false;
                    r as i32
                }
                None => {
                    aligned = false;
                    -1
                }
            })
            .collect();
        let remote_to_local = remote
            .fields
            .iter()
            .map(|f| match local.field_index(&f.name) {
                Some(l) => l as i32,
                None if f.is_variable_length() => -1,
                None => -2,
            })
            .collect();
        Self {
            local_to_remote,
            remote_to_local,
        }
    }

    /// Returns `true` if the remote type has fields the local one lacks.
    pub fn has_remote_only_fields(&self) -> bool {
        self.remote_to_local.iter().any(|&i| i < 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::modified_utf8;
    use PdxFieldKind::*;

    fn person_v1() -> PdxType {
        let mut t = PdxType::new("com.example.Person");
        t.add_field("a", Int).unwrap();
        t.add_field("b", String).unwrap();
        t
    }

    #[test]
    fn test_add_fields_assigns_var_len_indices() {
        let mut t = PdxType::new("T");
        t.add_field("id", Long).unwrap();
        t.add_field("name", String).unwrap();
        t.add_field("age", Int).unwrap();
        t.add_field("tags", StringArray).unwrap();
        assert_eq!(t.number_of_var_len_fields(), 2);
        assert_eq!(t.field("name").unwrap().var_len_field_idx(), 0);
        assert_eq!(t.field("tags").unwrap().var_len_field_idx(), 1);
        assert_eq!(t.field("age").unwrap().sequence_id(), 2);
    }

    #[test]
    fn test_duplicate_field_is_protocol_violation() {
        let mut t = person_v1();
        assert!(matches!(
            t.add_field("a", Long),
            Err(PdxError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_empty_name_is_invalid_argument() {
        let mut t = PdxType::new("T");
        assert!(matches!(
            t.add_field("", Int),
            Err(PdxError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_wrong_layout_is_invalid_argument() {
        let mut t = PdxType::new("T");
        assert!(t.add_fixed_length_field("s", String).is_err());
        assert!(t.add_variable_length_field("i", Int).is_err());
    }

    #[test]
    fn test_positions_without_variable_fields() {
        let mut t = PdxType::new("T");
        t.add_field("a", Int).unwrap();
        t.add_field("b", Long).unwrap();
        t.add_field("c", Boolean).unwrap();
        assert_eq!(t.field_position(0, &[], 1, 13).unwrap(), 0);
        assert_eq!(t.field_position(1, &[], 1, 13).unwrap(), 4);
        assert_eq!(t.field_position(2, &[], 1, 13).unwrap(), 12);
        assert_eq!(t.field_end_position(2, &[], 1, 13).unwrap(), 13);
    }

    #[test]
    fn test_positions_around_variable_fields() {
        // a:int s1:string b:int s2:string c:long
        let mut t = PdxType::new("T");
        t.add_field("a", Int).unwrap();
        t.add_field("s1", String).unwrap();
        t.add_field("b", Int).unwrap();
        t.add_field("s2", String).unwrap();
        t.add_field("c", Long).unwrap();
        let l1 = 1 + 2 + modified_utf8::encoded_len("hello");
        let l2 = 1 + 2 + modified_utf8::encoded_len("w");
        let s2_pos = 4 + l1 + 4;
        let serialized_len = s2_pos + l2 + 8;
        let offsets = [s2_pos as u8];
        assert_eq!(t.field_position(0, &offsets, 1, serialized_len).unwrap(), 0);
        assert_eq!(t.field_position(1, &offsets, 1, serialized_len).unwrap(), 4);
        assert_eq!(
            t.field_position(2, &offsets, 1, serialized_len).unwrap(),
            4 + l1
        );
        assert_eq!(
            t.field_position(3, &offsets, 1, serialized_len).unwrap(),
            s2_pos
        );
        assert_eq!(
            t.field_position(4, &offsets, 1, serialized_len).unwrap(),
            s2_pos + l2
        );
    }

    #[test]
    fn test_corrupt_offset_table_is_error() {
        let mut t = PdxType::new("T");
        t.add_field("s1", String).unwrap();
        t.add_field("s2", String).unwrap();
        assert!(t.field_position(1, &[], 1, 10).is_err());
        assert!(t.field_position(1, &[200], 1, 10).is_err());
        assert_eq!(t.field_position(1, &[6], 1, 10).unwrap(), 6);
    }

    #[test]
    fn test_merge_appends_exclusive_fields() {
        let local = person_v1();
        let mut remote = person_v1();
        remote.add_field("c", Double).unwrap();
        let merged = local.merge_version(&remote).unwrap();
        assert_eq!(merged.field_names().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert!(merged.same_shape(&remote));
        assert_eq!(merged.type_id(), 0);
    }

    #[test]
    fn test_merge_keeps_both_sides_exclusives() {
        let mut local = person_v1();
        local.add_field("x", Int).unwrap();
        let mut remote = person_v1();
        remote.add_field("c", Double).unwrap();
        remote.add_field("d", IntArray).unwrap();
        let merged = local.merge_version(&remote).unwrap();
        assert_eq!(
            merged.field_names().collect::<Vec<_>>(),
            vec!["a", "b", "c", "d", "x"]
        );
    }

    #[test]
    fn test_merge_rejects_kind_conflict() {
        let local = person_v1();
        let mut remote = PdxType::new("com.example.Person");
        remote.add_field("a", Long).unwrap();
        assert!(local.merge_version(&remote).is_err());
    }

    #[test]
    fn test_equality_ignores_type_id() {
        let mut a = person_v1();
        a.set_type_id(7);
        let b = person_v1();
        assert_eq!(a, b);
        let mut set = std::collections::HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_sorted_identity_fields() {
        let mut t = PdxType::new("T");
        t.add_field("zeta", Int).unwrap();
        t.add_field("alpha", Int).unwrap();
        t.add_field("mid", Int).unwrap();
        assert_eq!(t.sorted_identity_fields(), vec![1, 2, 0]);
        t.set_identity_field("zeta").unwrap();
        assert_eq!(t.sorted_identity_fields(), vec![0]);
        assert!(t.set_identity_field("missing").is_err());
    }

    #[test]
    fn test_field_maps() {
        let local = person_v1();
        let mut remote = PdxType::new("com.example.Person");
        remote.add_field("a", Int).unwrap();
        remote.add_field("c", IntArray).unwrap();
        remote.add_field("d", Long).unwrap();
        remote.add_field("b", String).unwrap();
        let maps = FieldMaps::new(&local, &remote);
        assert_eq!(maps.local_to_remote, vec![-2, 3]);
        assert_eq!(maps.remote_to_local, vec![0, -1, -2, 1]);
        assert!(maps.has_remote_only_fields());
    }

    #[test]
    fn test_descriptor_round_trip() {
        let mut t = person_v1();
        t.add_field("c", Double).unwrap();
        t.set_identity_field("a").unwrap();
        t.set_type_id(0x0100_0003);
        let mut output = ObjectDataOutput::new();
        t.to_data(&mut output).unwrap();
        let bytes = output.into_bytes();
        assert_eq!(bytes[0], 45);
        let mut input = ObjectDataInput::new(&bytes);
        let back = PdxType::from_data(&mut input).unwrap();
        assert_eq!(back, t);
        assert_eq!(back.type_id(), 0x0100_0003);
        assert!(back.field("a").unwrap().is_identity());
        assert!(!back.field("b").unwrap().is_identity());
        assert_eq!(input.remaining(), 0);
    }
}
