use crate::{op_region::OpRegion, AmlError};
use alloc::{sync::Arc, vec::Vec};
use bit_field::BitField;

/// The AML object universe. Objects are shared through `Arc` and form chains
/// through `Reference`; a chain always terminates at a non-reference object.
#[derive(PartialEq, Debug)]
pub enum Object {
    Uninitialized,
    Integer(u64),
    String { data: Vec<u8>, kind: StringKind },
    Buffer(Vec<u8>),
    Package(Vec<Arc<Object>>),
    Reference { kind: ReferenceKind, inner: Arc<Object> },
    BufferField(BufferField),
    BufferIndex { backing: Arc<Object>, idx: usize },
    OpRegion(OpRegion),
    Method { code: Vec<u8>, flags: MethodFlags, named_objects_persist: bool },
    Mutex { sync_level: u8 },
    Processor { id: u8, block_address: u32, block_length: u8 },
    PowerResource { system_level: u8, resource_order: u16 },
    Device,
    ThermalZone,
    Debug,
}

/// String payloads are raw bytes: implicit casts write arbitrary bytes into
/// string storage and buffer-to-string conversions are not UTF-8 safe. The
/// NUL terminator is implicit; storage views add it where it counts.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StringKind {
    Normal,
    /// A lazily-bound namespace path produced while building a package.
    Path,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ReferenceKind {
    RefOf,
    Named,
    Arg,
    Local,
    PkgIndex,
}

/// A bit-range view into a backing `Object::Buffer`.
#[derive(Clone, PartialEq, Debug)]
pub struct BufferField {
    pub backing: Arc<Object>,
    pub bit_index: usize,
    pub bit_length: usize,
    /// `CreateField` results always read back as buffers, whatever their
    /// length.
    pub force_buffer: bool,
}

/*
 * Discriminants are the ACPI object type numbers that `ObjectType` (the
 * opcode) reports. `Reference` and `BufferIndex` are internal and sit above
 * the architecturally defined range.
 */
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum ObjectType {
    Uninitialized = 0,
    Integer = 1,
    String = 2,
    Buffer = 3,
    Package = 4,
    Device = 6,
    Method = 8,
    Mutex = 9,
    OpRegion = 10,
    PowerResource = 11,
    Processor = 12,
    ThermalZone = 13,
    BufferField = 14,
    Debug = 16,
    Reference = 20,
    BufferIndex = 21,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct MethodFlags(pub u8);

impl MethodFlags {
    pub fn arg_count(&self) -> usize {
        self.0.get_bits(0..3) as usize
    }

    pub fn serialized(&self) -> bool {
        self.0.get_bit(3)
    }

    pub fn sync_level(&self) -> u8 {
        self.0.get_bits(4..8)
    }
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum AssignBehavior {
    Shallow,
    Deep,
}

impl Object {
    /*
     * TODO XXX: this is a horrendous hack to emulate a clever locking solution
     * for dynamically validating borrow checking for objects at A Later Date.
     * It is trivially easy to produce undefined behaviour with this (and might
     * be UB intrinsically).
     */
    #[allow(clippy::mut_from_ref)]
    pub fn gain_mut(&self) -> &mut Self {
        #[allow(invalid_reference_casting)]
        unsafe {
            &mut *(self as *const Self as *mut Self)
        }
    }

    pub fn typ(&self) -> ObjectType {
        match self {
            Object::Uninitialized => ObjectType::Uninitialized,
            Object::Integer(_) => ObjectType::Integer,
            Object::String { .. } => ObjectType::String,
            Object::Buffer(_) => ObjectType::Buffer,
            Object::Package(_) => ObjectType::Package,
            Object::Reference { .. } => ObjectType::Reference,
            Object::BufferField(_) => ObjectType::BufferField,
            Object::BufferIndex { .. } => ObjectType::BufferIndex,
            Object::OpRegion(_) => ObjectType::OpRegion,
            Object::Method { .. } => ObjectType::Method,
            Object::Mutex { .. } => ObjectType::Mutex,
            Object::Processor { .. } => ObjectType::Processor,
            Object::PowerResource { .. } => ObjectType::PowerResource,
            Object::Device => ObjectType::Device,
            Object::ThermalZone => ObjectType::ThermalZone,
            Object::Debug => ObjectType::Debug,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self.typ() {
            ObjectType::Uninitialized => "Uninitialized",
            ObjectType::Integer => "Integer",
            ObjectType::String => "String",
            ObjectType::Buffer => "Buffer",
            ObjectType::Package => "Package",
            ObjectType::Device => "Device",
            ObjectType::Method => "Method",
            ObjectType::Mutex => "Mutex",
            ObjectType::OpRegion => "Operation Region",
            ObjectType::PowerResource => "Power Resource",
            ObjectType::Processor => "Processor",
            ObjectType::ThermalZone => "Thermal Zone",
            ObjectType::BufferField => "Buffer Field",
            ObjectType::Debug => "Debug",
            ObjectType::Reference => "Reference",
            ObjectType::BufferIndex => "Buffer Index",
        }
    }

    pub fn as_integer(&self) -> Result<u64, AmlError> {
        if let Object::Integer(value) = self {
            Ok(*value)
        } else {
            Err(AmlError::ObjectNotOfExpectedType { expected: ObjectType::Integer, got: self.typ() })
        }
    }

    /// Unwrap Arg/Local/Named/PkgIndex wrappers one after another, stopping at
    /// the first `RefOf` or non-reference. These wrappers are transparent to
    /// everything except the store protocol, which looks at them one level at
    /// a time.
    pub fn unwrap_transparent_reference(self: Arc<Object>) -> Arc<Object> {
        let mut obj = self;
        loop {
            match &*obj {
                Object::Reference { kind, inner } if *kind != ReferenceKind::RefOf => {
                    let inner = inner.clone();
                    obj = inner;
                }
                _ => return obj,
            }
        }
    }

    /// Follow a reference chain all the way down to the terminal
    /// non-reference object. Objects that are not references come back
    /// unchanged.
    pub fn unwrap_reference(self: Arc<Object>) -> Arc<Object> {
        let mut obj = self;
        while let Object::Reference { inner, .. } = &*obj {
            let inner = inner.clone();
            obj = inner;
        }
        obj
    }

    /// Follow a reference chain down to the last `Reference` in it, i.e. the
    /// one whose inner object is not itself a reference.
    pub fn bottom_reference(self: Arc<Object>) -> Arc<Object> {
        let mut obj = self;
        loop {
            let next = match &*obj {
                Object::Reference { inner, .. } if matches!(**inner, Object::Reference { .. }) => {
                    inner.clone()
                }
                _ => return obj,
            };
            obj = next;
        }
    }

    /// A snapshot of this object's contents, for overwriting another object.
    /// `Deep` clones package elements recursively; `Shallow` shares them.
    /// References, buffer fields and buffer indices alias their targets under
    /// both behaviors, which is what keeps stored references live.
    pub fn clone_with(&self, behavior: AssignBehavior) -> Object {
        match self {
            Object::Uninitialized => Object::Uninitialized,
            Object::Integer(value) => Object::Integer(*value),
            Object::String { data, kind } => Object::String { data: data.clone(), kind: *kind },
            Object::Buffer(data) => Object::Buffer(data.clone()),
            Object::Package(elements) => match behavior {
                AssignBehavior::Shallow => Object::Package(elements.clone()),
                AssignBehavior::Deep => Object::Package(
                    elements.iter().map(|e| Arc::new(e.clone_with(AssignBehavior::Deep))).collect(),
                ),
            },
            Object::Reference { kind, inner } => {
                Object::Reference { kind: *kind, inner: inner.clone() }
            }
            Object::BufferField(field) => Object::BufferField(field.clone()),
            Object::BufferIndex { backing, idx } => {
                Object::BufferIndex { backing: backing.clone(), idx: *idx }
            }
            Object::OpRegion(region) => Object::OpRegion(region.clone()),
            Object::Method { code, flags, named_objects_persist } => Object::Method {
                code: code.clone(),
                flags: *flags,
                named_objects_persist: *named_objects_persist,
            },
            Object::Mutex { sync_level } => Object::Mutex { sync_level: *sync_level },
            Object::Processor { id, block_address, block_length } => Object::Processor {
                id: *id,
                block_address: *block_address,
                block_length: *block_length,
            },
            Object::PowerResource { system_level, resource_order } => Object::PowerResource {
                system_level: *system_level,
                resource_order: *resource_order,
            },
            Object::Device => Object::Device,
            Object::ThermalZone => Object::ThermalZone,
            Object::Debug => Object::Debug,
        }
    }

    /// Overwrite this object in place with a copy of `src`. Everyone aliasing
    /// the containing `Arc` observes the new contents.
    pub fn assign(&self, src: &Object, behavior: AssignBehavior) {
        *self.gain_mut() = src.clone_with(behavior);
    }

    /// The raw storage of a computational object, as the store protocol and
    /// the conversion opcodes see it. Strings count their implicit NUL only
    /// when `include_null` asks for it.
    pub fn storage_bytes(&self, int_size: usize, include_null: bool) -> Result<Vec<u8>, AmlError> {
        match self {
            Object::Integer(value) => Ok(value.to_le_bytes()[..int_size].to_vec()),
            Object::String { data, .. } => {
                let mut bytes = data.clone();
                if include_null {
                    bytes.push(0);
                }
                Ok(bytes)
            }
            Object::Buffer(data) => Ok(data.clone()),
            Object::Reference { .. } => Err(AmlError::InvalidArgument),
            _ => Err(AmlError::ObjectNotOfExpectedType {
                expected: ObjectType::Buffer,
                got: self.typ(),
            }),
        }
    }

    /// Coerce to an integer the way the reference OS does: integers pass
    /// through, buffers contribute their first `max_buffer_bytes` bytes
    /// little-endian, strings are parsed with base auto-detection, and
    /// everything else is 0.
    pub fn to_integer(&self, max_buffer_bytes: usize) -> u64 {
        match self {
            Object::Integer(value) => *value,
            Object::Buffer(data) => {
                let mut bytes = [0u8; 8];
                let count = usize::min(max_buffer_bytes, usize::min(data.len(), 8));
                bytes[..count].copy_from_slice(&data[..count]);
                u64::from_le_bytes(bytes)
            }
            Object::String { data, .. } => parse_integer(data),
            _ => 0,
        }
    }
}

/// `strtoull(str, NULL, 0)`: skip leading whitespace, then `0x`/`0X` means
/// hex, a leading `0` means octal, anything else decimal. Parsing stops at
/// the first invalid digit; overflow wraps.
fn parse_integer(data: &[u8]) -> u64 {
    let mut bytes = data.iter().copied().skip_while(|b| *b == b' ' || *b == b'\t').peekable();

    let radix = if bytes.peek() == Some(&b'0') {
        bytes.next();
        match bytes.peek() {
            Some(b'x') | Some(b'X') => {
                bytes.next();
                16
            }
            _ => 8,
        }
    } else {
        10
    };

    let mut value: u64 = 0;
    for byte in bytes {
        let digit = match byte {
            b'0'..=b'9' => (byte - b'0') as u64,
            b'a'..=b'f' => (byte - b'a') as u64 + 10,
            b'A'..=b'F' => (byte - b'A') as u64 + 10,
            _ => break,
        };
        if digit >= radix {
            break;
        }
        value = value.wrapping_mul(radix).wrapping_add(digit);
    }
    value
}

/// Copy `src`, zero-extending if it is shorter than `dst`.
pub fn copy_zero_extended(dst: &mut [u8], src: &[u8]) {
    let count = usize::min(dst.len(), src.len());
    dst[..count].copy_from_slice(&src[..count]);
    dst[count..].fill(0);
}

impl BufferField {
    pub fn byte_size(&self) -> usize {
        (self.bit_length + 7) / 8
    }

    fn backing_data(&self) -> &mut Vec<u8> {
        let Object::Buffer(data) = self.backing.gain_mut() else { panic!() };
        data
    }

    /// Read the field into `dst`, which must hold at least
    /// [`Self::byte_size`] bytes. Bits past `bit_length` in the last byte
    /// come out as zero.
    pub fn read(&self, dst: &mut [u8]) {
        let data = self.backing_data();
        let count = self.byte_size();

        if self.bit_index % 8 == 0 {
            dst[..count].copy_from_slice(&data[self.bit_index / 8..self.bit_index / 8 + count]);
            if self.bit_length % 8 != 0 {
                dst[count - 1] &= (1 << (self.bit_length % 8)) - 1;
            }
            return;
        }

        dst[..count].fill(0);
        copy_bits(data, self.bit_index, dst, 0, self.bit_length);
    }

    /// Write `src` into the field, zero-extending short sources. Bits of the
    /// backing buffer outside the field are preserved.
    pub fn write(&self, src: &[u8]) {
        let data = self.backing_data();

        if self.bit_index % 8 == 0 {
            let dst = &mut data[self.bit_index / 8..];
            let count = self.byte_size();

            let last_byte = dst[count - 1];
            let tail_shift = self.bit_length % 8;

            copy_zero_extended(&mut dst[..count], src);
            if tail_shift != 0 {
                dst[count - 1] |= (last_byte >> tail_shift) << tail_shift;
            }
            return;
        }

        // copy_bits zero-extends reads past the end of `src`.
        copy_bits(src, 0, data, self.bit_index, self.bit_length);
    }
}

/// Storage byte behind a `BufferIndex`. The backing is a `Buffer` or
/// `String` object.
pub fn buffer_index_read(backing: &Object, idx: usize) -> u8 {
    match backing {
        Object::Buffer(data) => data[idx],
        Object::String { data, .. } => data[idx],
        _ => panic!(),
    }
}

pub fn buffer_index_write(backing: &Object, idx: usize, src: &[u8]) {
    let data = match backing.gain_mut() {
        Object::Buffer(data) => data,
        Object::String { data, .. } => data,
        _ => panic!(),
    };
    data[idx] = src.first().copied().unwrap_or(0);
}

/// Copy an arbitrary bit range of `src` to an arbitrary bit range of `dst`.
/// Bits of `dst` outside the destination range are preserved. Data is
/// zero-extended if `src` does not cover `length` bits, matching the expected
/// behaviour for buffer fields.
pub fn copy_bits(src: &[u8], mut src_index: usize, dst: &mut [u8], mut dst_index: usize, mut length: usize) {
    while length > 0 {
        let src_shift = src_index & 7;
        let mut src_bits = src.get(src_index / 8).unwrap_or(&0x00) >> src_shift;
        if src_shift > 0 && length > (8 - src_shift) {
            src_bits |= src.get(src_index / 8 + 1).unwrap_or(&0x00) << (8 - src_shift);
        }

        if length < 8 {
            src_bits &= (1 << length) - 1;
        }

        let dst_shift = dst_index & 7;
        let mut dst_mask: u16 = if length < 8 { ((1 << length) - 1) as u16 } else { 0xff } << dst_shift;
        dst[dst_index / 8] =
            (dst[dst_index / 8] & !(dst_mask as u8)) | ((src_bits << dst_shift) & (dst_mask as u8));

        if dst_shift > 0 && length > (8 - dst_shift) {
            dst_mask >>= 8;
            dst[dst_index / 8 + 1] &= !(dst_mask as u8);
            dst[dst_index / 8 + 1] |= (src_bits >> (8 - dst_shift)) & (dst_mask as u8);
        }

        if length < 8 {
            length = 0;
        } else {
            length -= 8;
            src_index += 8;
            dst_index += 8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::{sync::Arc, vec};

    #[test]
    fn test_copy_bits() {
        let src = [0b1011_1111, 0b1111_0111, 0b1111_1111, 0b1111_1111, 0b1111_1111];
        let mut dst = [0b1110_0001, 0, 0, 0, 0];

        copy_bits(&src, 0, &mut dst, 2, 15);
        assert_eq!(dst, [0b1111_1101, 0b1101_1110, 0b0000_0001, 0b0000_0000, 0b0000_0000]);
    }

    #[test]
    fn field_write_then_read_round_trips() {
        for bit_index in 0..=16usize {
            for bit_length in 1..=72usize {
                let backing = Arc::new(Object::Buffer(vec![0; 32]));
                let field = BufferField {
                    backing: backing.clone(),
                    bit_index,
                    bit_length,
                    force_buffer: false,
                };

                let pattern: Vec<u8> =
                    (0..9u8).map(|i| 0xA5u8.wrapping_add(i.wrapping_mul(0x3B))).collect();
                field.write(&pattern);

                let mut readback = [0u8; 9];
                field.read(&mut readback[..field.byte_size()]);

                for bit in 0..bit_length {
                    let expected = (pattern[bit / 8] >> (bit % 8)) & 1;
                    let got = (readback[bit / 8] >> (bit % 8)) & 1;
                    assert_eq!(
                        expected, got,
                        "bit {} mismatch at bit_index={} bit_length={}",
                        bit, bit_index, bit_length
                    );
                }
            }
        }
    }

    #[test]
    fn field_write_preserves_surrounding_bits() {
        let backing = Arc::new(Object::Buffer(vec![0xFF; 4]));
        let field = BufferField { backing: backing.clone(), bit_index: 4, bit_length: 12, force_buffer: true };
        field.write(&[0x00, 0x00]);

        let Object::Buffer(data) = &*backing else { panic!() };
        assert_eq!(&data[..], &[0x0F, 0x00, 0xFF, 0xFF]);
    }

    #[test]
    fn misaligned_field_packs_little_endian() {
        // Storing 0xABC into bits [4..16) of a zeroed buffer.
        let backing = Arc::new(Object::Buffer(vec![0; 4]));
        let field = BufferField { backing: backing.clone(), bit_index: 4, bit_length: 12, force_buffer: true };
        field.write(&0xABCu64.to_le_bytes());

        let Object::Buffer(data) = &*backing else { panic!() };
        assert_eq!(&data[..], &[0xC0, 0xAB, 0x00, 0x00]);
    }

    #[test]
    fn string_integer_parsing() {
        assert_eq!(parse_integer(b"1234"), 1234);
        assert_eq!(parse_integer(b"0x1A"), 0x1A);
        assert_eq!(parse_integer(b"  0XFF"), 0xFF);
        assert_eq!(parse_integer(b"017"), 0o17);
        assert_eq!(parse_integer(b"12junk"), 12);
        assert_eq!(parse_integer(b""), 0);
    }

    #[test]
    fn assign_replaces_through_aliases() {
        let shared = Arc::new(Object::Integer(3));
        let alias = shared.clone();

        shared.assign(&Object::Integer(7), AssignBehavior::Deep);
        assert_eq!(alias.as_integer(), Ok(7));
    }

    #[test]
    fn deep_package_copy_is_detached() {
        let element = Arc::new(Object::Integer(1));
        let pkg = Object::Package(vec![element.clone()]);

        let copy = pkg.clone_with(AssignBehavior::Deep);
        element.assign(&Object::Integer(9), AssignBehavior::Deep);

        let Object::Package(elements) = &copy else { panic!() };
        assert_eq!(elements[0].as_integer(), Ok(1));
    }

    #[test]
    fn transparent_unwrap_stops_at_ref_of() {
        let value = Arc::new(Object::Integer(42));
        let named = Arc::new(Object::Reference { kind: ReferenceKind::Named, inner: value.clone() });
        let local = Arc::new(Object::Reference { kind: ReferenceKind::Local, inner: named });
        assert_eq!(local.unwrap_transparent_reference().as_integer(), Ok(42));

        let ref_of = Arc::new(Object::Reference { kind: ReferenceKind::RefOf, inner: value });
        let local = Arc::new(Object::Reference { kind: ReferenceKind::Local, inner: ref_of.clone() });
        assert_eq!(local.unwrap_transparent_reference().typ(), ObjectType::Reference);
    }
}
