//! Hash functions that reproduce the JVM's `hashCode` bit patterns.
//!
//! JVM cluster members route and compare PDX values by these hashes, so the
//! arithmetic here must stay identical to `java.lang` and `java.util.Arrays`.

/// `String.hashCode`: `31 * h + unit` over UTF-16 code units, wrapping.
pub fn string_hash(s: &str) -> i32 {
    s.encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(unit as i32))
}

/// `Boolean.hashCode`.
pub fn bool_hash(v: bool) -> i32 {
    if v {
        1231
    } else {
        1237
    }
}

/// `Long.hashCode`: the two halves folded together.
pub fn long_hash(v: i64) -> i32 {
    (v ^ ((v as u64) >> 32) as i64) as i32
}

/// `Float.hashCode`, which uses `floatToIntBits` and so collapses every NaN.
pub fn float_hash(v: f32) -> i32 {
    if v.is_nan() {
        0x7fc0_0000
    } else {
        v.to_bits() as i32
    }
}

/// `Double.hashCode`, which uses `doubleToLongBits` and so collapses every NaN.
pub fn double_hash(v: f64) -> i32 {
    let bits = if v.is_nan() {
        0x7ff8_0000_0000_0000u64
    } else {
        v.to_bits()
    };
    long_hash(bits as i64)
}

/// `Arrays.hashCode` over element hashes.
pub fn hash_all<I>(hashes: I) -> i32
where
    I: IntoIterator<Item = i32>,
{
    hashes
        .into_iter()
        .fold(1i32, |h, e| h.wrapping_mul(31).wrapping_add(e))
}

/// `Arrays.hashCode(byte[])` with Java's signed bytes.
pub fn bytes_hash(bytes: &[u8]) -> i32 {
    hash_all(bytes.iter().map(|&b| b as i8 as i32))
}

/// `ByteBuffer.hashCode`, which walks the remaining bytes from last to first.
pub fn byte_buffer_hash(bytes: &[u8]) -> i32 {
    hash_all(bytes.iter().rev().map(|&b| b as i8 as i32))
}
