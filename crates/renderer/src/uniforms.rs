//! Named, typed uniform values and their packed buffer layout.
//!
//! Fields are serialized in lexicographic name order and every field is
//! rounded up to a 16-byte boundary. [`UniformStore::compute_layout`] and
//! [`UniformStore::serialize_into`] both walk [`UniformStore::slots`], so the
//! two can never disagree about where a field lives. The WGSL `Uniforms`
//! struct emitted by the composer marks every member `@align(16)`, which
//! yields the same offsets on the GPU side.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const U_RESOLUTION: &str = "u_resolution";
pub const U_TIME: &str = "u_time";
pub const U_MOUSE: &str = "u_mouse";
pub const U_DATE: &str = "u_date";

/// Every field starts on this boundary.
pub const FIELD_ALIGNMENT: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UniformType {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Int,
    IVec2,
    IVec3,
    IVec4,
    Mat2,
    Mat3,
    Mat4,
}

impl UniformType {
    /// Unpadded byte size. `Mat3` counts three 16-byte columns.
    pub fn size(self) -> usize {
        match self {
            UniformType::Float | UniformType::Int => 4,
            UniformType::Vec2 | UniformType::IVec2 => 8,
            UniformType::Vec3 | UniformType::IVec3 => 12,
            UniformType::Vec4 | UniformType::IVec4 | UniformType::Mat2 => 16,
            UniformType::Mat3 => 48,
            UniformType::Mat4 => 64,
        }
    }

    pub fn padded_size(self) -> usize {
        self.size().div_ceil(FIELD_ALIGNMENT) * FIELD_ALIGNMENT
    }

    pub fn wgsl(self) -> &'static str {
        match self {
            UniformType::Float => "f32",
            UniformType::Vec2 => "vec2<f32>",
            UniformType::Vec3 => "vec3<f32>",
            UniformType::Vec4 => "vec4<f32>",
            UniformType::Int => "i32",
            UniformType::IVec2 => "vec2<i32>",
            UniformType::IVec3 => "vec3<i32>",
            UniformType::IVec4 => "vec4<i32>",
            UniformType::Mat2 => "mat2x2<f32>",
            UniformType::Mat3 => "mat3x3<f32>",
            UniformType::Mat4 => "mat4x4<f32>",
        }
    }
}

/// Matrices are column-major: `Mat3([c0, c1, c2])`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Int(i32),
    IVec2([i32; 2]),
    IVec3([i32; 3]),
    IVec4([i32; 4]),
    Mat2([[f32; 2]; 2]),
    Mat3([[f32; 3]; 3]),
    Mat4([[f32; 4]; 4]),
}

impl UniformValue {
    pub fn ty(&self) -> UniformType {
        match self {
            UniformValue::Float(_) => UniformType::Float,
            UniformValue::Vec2(_) => UniformType::Vec2,
            UniformValue::Vec3(_) => UniformType::Vec3,
            UniformValue::Vec4(_) => UniformType::Vec4,
            UniformValue::Int(_) => UniformType::Int,
            UniformValue::IVec2(_) => UniformType::IVec2,
            UniformValue::IVec3(_) => UniformType::IVec3,
            UniformValue::IVec4(_) => UniformType::IVec4,
            UniformValue::Mat2(_) => UniformType::Mat2,
            UniformValue::Mat3(_) => UniformType::Mat3,
            UniformValue::Mat4(_) => UniformType::Mat4,
        }
    }

    /// Writes the value at the start of `out`, which must hold at least
    /// `self.ty().size()` bytes.
    fn write(&self, out: &mut [u8]) {
        match self {
            UniformValue::Float(value) => put(out, bytemuck::bytes_of(value)),
            UniformValue::Vec2(value) => put(out, bytemuck::cast_slice(value)),
            UniformValue::Vec3(value) => put(out, bytemuck::cast_slice(value)),
            UniformValue::Vec4(value) => put(out, bytemuck::cast_slice(value)),
            UniformValue::Int(value) => put(out, bytemuck::bytes_of(value)),
            UniformValue::IVec2(value) => put(out, bytemuck::cast_slice(value)),
            UniformValue::IVec3(value) => put(out, bytemuck::cast_slice(value)),
            UniformValue::IVec4(value) => put(out, bytemuck::cast_slice(value)),
            UniformValue::Mat2(columns) => put(out, bytemuck::cast_slice(columns)),
            UniformValue::Mat3(columns) => {
                // Each vec3 column occupies a full 16-byte slot.
                for (index, column) in columns.iter().enumerate() {
                    put(&mut out[index * 16..], bytemuck::cast_slice(column));
                }
            }
            UniformValue::Mat4(columns) => put(out, bytemuck::cast_slice(columns)),
        }
    }
}

fn put(out: &mut [u8], bytes: &[u8]) {
    out[..bytes.len()].copy_from_slice(bytes);
}

#[derive(Debug, Clone, PartialEq)]
pub struct Uniform {
    pub name: String,
    pub ty: UniformType,
    pub value: UniformValue,
}

impl Uniform {
    /// False when the stored value no longer matches the declared type.
    pub fn is_consistent(&self) -> bool {
        self.value.ty() == self.ty
    }
}

/// A declared uniform: what the WGSL struct needs to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformDecl {
    pub name: String,
    pub ty: UniformType,
}

/// Placement of one uniform inside the packed buffer.
#[derive(Debug, Clone, Copy)]
pub struct UniformSlot<'a> {
    pub uniform: &'a Uniform,
    pub offset: usize,
}

#[derive(Debug, Clone, Default)]
pub struct UniformStore {
    entries: BTreeMap<String, Uniform>,
    dirty: bool,
}

impl UniformStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with the four per-frame built-ins at zero.
    pub fn with_builtins() -> Self {
        let mut store = Self::new();
        store.set(U_RESOLUTION, UniformValue::Vec2([0.0; 2]), UniformType::Vec2);
        store.set(U_TIME, UniformValue::Float(0.0), UniformType::Float);
        store.set(U_MOUSE, UniformValue::Vec2([0.0; 2]), UniformType::Vec2);
        store.set(U_DATE, UniformValue::Vec4([0.0; 4]), UniformType::Vec4);
        store
    }

    /// Inserts or replaces `name`. A value whose runtime type differs from
    /// `ty` is kept but serialized as zeros until corrected.
    pub fn set(&mut self, name: impl Into<String>, value: UniformValue, ty: UniformType) {
        let name = name.into();
        self.entries
            .insert(name.clone(), Uniform { name, ty, value });
        self.dirty = true;
    }

    pub fn get(&self, name: &str) -> Option<&Uniform> {
        self.entries.get(name)
    }

    /// Replaces the value of an existing uniform; returns false and changes
    /// nothing when `name` is unknown.
    pub fn update(&mut self, name: &str, value: UniformValue) -> bool {
        match self.entries.get_mut(name) {
            Some(entry) => {
                entry.value = value;
                self.dirty = true;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Uniform> {
        let removed = self.entries.remove(name);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Names and declared types in serialization order.
    pub fn declarations(&self) -> Vec<UniformDecl> {
        self.entries
            .values()
            .map(|uniform| UniformDecl {
                name: uniform.name.clone(),
                ty: uniform.ty,
            })
            .collect()
    }

    /// Offsets of every uniform, in serialization order.
    pub fn slots(&self) -> impl Iterator<Item = UniformSlot<'_>> {
        self.entries.values().scan(0usize, |cursor, uniform| {
            let offset = *cursor;
            *cursor += uniform.ty.padded_size();
            Some(UniformSlot { uniform, offset })
        })
    }

    /// Total packed size in bytes.
    pub fn compute_layout(&self) -> usize {
        self.slots()
            .last()
            .map(|slot| slot.offset + slot.uniform.ty.padded_size())
            .unwrap_or(0)
    }

    /// Resizes `buffer` to [`Self::compute_layout`] bytes and writes every
    /// consistent uniform at its slot. Returns the number of bytes written.
    pub fn serialize_into(&self, buffer: &mut Vec<u8>) -> usize {
        let total = self.compute_layout();
        buffer.clear();
        buffer.resize(total, 0);
        for slot in self.slots() {
            if !slot.uniform.is_consistent() {
                continue;
            }
            slot.uniform.value.write(&mut buffer[slot.offset..]);
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_f32s(bytes: &[u8], offset: usize, count: usize) -> Vec<f32> {
        bytemuck::pod_collect_to_vec(&bytes[offset..offset + count * 4])
    }

    fn read_i32s(bytes: &[u8], offset: usize, count: usize) -> Vec<i32> {
        bytemuck::pod_collect_to_vec(&bytes[offset..offset + count * 4])
    }

    fn mixed_store() -> UniformStore {
        let mut store = UniformStore::new();
        store.set("b_scale", UniformValue::Float(0.5), UniformType::Float);
        store.set("a_offset", UniformValue::Vec3([1.0, 2.0, 3.0]), UniformType::Vec3);
        store.set("d_steps", UniformValue::IVec2([7, -3]), UniformType::IVec2);
        store.set(
            "c_basis",
            UniformValue::Mat3([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]),
            UniformType::Mat3,
        );
        store.set(
            "e_view",
            UniformValue::Mat4([
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.5, 0.25, 0.0, 1.0],
            ]),
            UniformType::Mat4,
        );
        store.set("f_rot", UniformValue::Mat2([[0.0, 1.0], [-1.0, 0.0]]), UniformType::Mat2);
        store
    }

    #[test]
    fn padded_sizes_round_to_sixteen() {
        assert_eq!(UniformType::Float.padded_size(), 16);
        assert_eq!(UniformType::Vec2.padded_size(), 16);
        assert_eq!(UniformType::Vec3.padded_size(), 16);
        assert_eq!(UniformType::IVec4.padded_size(), 16);
        assert_eq!(UniformType::Mat2.padded_size(), 16);
        assert_eq!(UniformType::Mat3.padded_size(), 48);
        assert_eq!(UniformType::Mat4.padded_size(), 64);
    }

    #[test]
    fn layout_pads_after_every_field() {
        let store = mixed_store();
        // 16 + 16 + 48 + 16 + 64 + 16
        assert_eq!(store.compute_layout(), 176);
        let offsets: Vec<(&str, usize)> = store
            .slots()
            .map(|slot| (slot.uniform.name.as_str(), slot.offset))
            .collect();
        assert_eq!(
            offsets,
            vec![
                ("a_offset", 0),
                ("b_scale", 16),
                ("c_basis", 32),
                ("d_steps", 80),
                ("e_view", 96),
                ("f_rot", 160),
            ]
        );
    }

    #[test]
    fn serialize_writes_layout_bytes_and_values_read_back() {
        let store = mixed_store();
        let mut buffer = vec![0xAA; 3];
        let written = store.serialize_into(&mut buffer);
        assert_eq!(written, store.compute_layout());
        assert_eq!(buffer.len(), written);

        for slot in store.slots() {
            let offset = slot.offset;
            match slot.uniform.value {
                UniformValue::Float(value) => {
                    assert_eq!(read_f32s(&buffer, offset, 1), vec![value]);
                }
                UniformValue::Vec3(value) => {
                    assert_eq!(read_f32s(&buffer, offset, 3), value.to_vec());
                }
                UniformValue::IVec2(value) => {
                    assert_eq!(read_i32s(&buffer, offset, 2), value.to_vec());
                }
                UniformValue::Mat2(columns) => {
                    let flat: Vec<f32> = columns.iter().flatten().copied().collect();
                    assert_eq!(read_f32s(&buffer, offset, 4), flat);
                }
                UniformValue::Mat3(columns) => {
                    for (index, column) in columns.iter().enumerate() {
                        let got = read_f32s(&buffer, offset + index * 16, 3);
                        assert_eq!(got, column.to_vec());
                        assert_eq!(read_f32s(&buffer, offset + index * 16 + 12, 1), vec![0.0]);
                    }
                }
                UniformValue::Mat4(columns) => {
                    let flat: Vec<f32> = columns.iter().flatten().copied().collect();
                    assert_eq!(read_f32s(&buffer, offset, 16), flat);
                }
                other => panic!("unexpected value in fixture: {other:?}"),
            }
        }
    }

    #[test]
    fn padding_bytes_stay_zero() {
        let mut store = UniformStore::new();
        store.set("only", UniformValue::Float(f32::from_bits(0xFFFF_FFFF)), UniformType::Float);
        let mut buffer = Vec::new();
        store.serialize_into(&mut buffer);
        assert_eq!(buffer.len(), 16);
        assert!(buffer[4..].iter().all(|byte| *byte == 0));
    }

    #[test]
    fn mismatched_value_keeps_slot_but_writes_zeros() {
        let mut store = UniformStore::new();
        store.set("a_tint", UniformValue::Float(3.0), UniformType::Vec4);
        store.set("b_gain", UniformValue::Float(2.0), UniformType::Float);
        assert!(!store.get("a_tint").unwrap().is_consistent());

        let mut buffer = Vec::new();
        assert_eq!(store.serialize_into(&mut buffer), 32);
        assert!(buffer[..16].iter().all(|byte| *byte == 0));
        assert_eq!(read_f32s(&buffer, 16, 1), vec![2.0]);
    }

    #[test]
    fn update_only_touches_existing_keys() {
        let mut store = UniformStore::new();
        assert!(!store.update("missing", UniformValue::Float(1.0)));
        assert!(store.get("missing").is_none());
        assert!(!store.is_dirty());

        store.set("gain", UniformValue::Float(1.0), UniformType::Float);
        store.clear_dirty();
        assert!(store.update("gain", UniformValue::Float(4.0)));
        assert!(store.is_dirty());
        assert_eq!(store.get("gain").unwrap().value, UniformValue::Float(4.0));
    }

    #[test]
    fn builtins_serialize_in_name_order() {
        let store = UniformStore::with_builtins();
        let names: Vec<String> = store.declarations().into_iter().map(|decl| decl.name).collect();
        assert_eq!(names, vec![U_DATE, U_MOUSE, U_RESOLUTION, U_TIME]);
        assert_eq!(store.compute_layout(), 64);
    }

    #[test]
    fn empty_store_has_zero_layout() {
        let store = UniformStore::new();
        let mut buffer = vec![1, 2, 3];
        assert_eq!(store.serialize_into(&mut buffer), 0);
        assert!(buffer.is_empty());
    }
}
