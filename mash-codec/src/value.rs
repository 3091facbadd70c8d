//! Conversion between the strict-decode [`RawItem`] tree, `ciborium`'s
//! encode-side `Value`, and [`mash_wire::Value`].

use ciborium::Value as CborValue;
use mash_wire::Value;

use crate::error::DecodeError;
use crate::raw::RawItem;

/// Number of bytes a bare unsigned-integer CBOR item occupies, used to
/// implement canonical (length-then-lexicographic) key ordering without a
/// full byte-level comparison. MASH map keys are always small non-negative
/// integers, so this alone is sufficient.
pub fn cbor_uint_len(v: u64) -> u8 {
    if v < 24 {
        1
    } else if v <= u8::MAX as u64 {
        2
    } else if v <= u16::MAX as u64 {
        3
    } else if v <= u32::MAX as u64 {
        5
    } else {
        9
    }
}

/// Sort `(key, value)` pairs into canonical CBOR map order: shorter-encoded
/// keys first, then numerically.
pub fn canonical_sort(pairs: &mut [(u64, CborValue)]) {
    pairs.sort_by_key(|(k, _)| (cbor_uint_len(*k), *k));
}

pub fn build_canonical_map(mut pairs: Vec<(u64, CborValue)>) -> CborValue {
    canonical_sort(&mut pairs);
    CborValue::Map(
        pairs
            .into_iter()
            .map(|(k, v)| (CborValue::Integer(k.into()), v))
            .collect(),
    )
}

/// Convert a [`mash_wire::Value`] into the `ciborium` value ciborium will
/// serialize. Maps are re-sorted into canonical order on the way out.
pub fn value_to_cbor(value: &Value) -> CborValue {
    match value {
        Value::Int(v) => CborValue::Integer((*v).into()),
        Value::UInt(v) => CborValue::Integer((*v).into()),
        Value::Bool(v) => CborValue::Bool(*v),
        Value::Float(v) => CborValue::Float(*v),
        Value::Bytes(v) => CborValue::Bytes(v.clone()),
        Value::Text(v) => CborValue::Text(v.clone()),
        Value::Array(items) => CborValue::Array(items.iter().map(value_to_cbor).collect()),
        Value::Map(pairs) => {
            let mut entries: Vec<(u64, CborValue)> = Vec::with_capacity(pairs.len());
            for (k, v) in pairs {
                let key = match k {
                    Value::UInt(n) => *n,
                    Value::Int(n) if *n >= 0 => *n as u64,
                    _ => {
                        // Non-integer keys never reach here on the encode path
                        // because mash-wire never constructs one; fall back to
                        // insertion order rather than panicking.
                        return CborValue::Map(
                            pairs
                                .iter()
                                .map(|(k, v)| (value_to_cbor(k), value_to_cbor(v)))
                                .collect(),
                        );
                    }
                };
                entries.push((key, value_to_cbor(v)));
            }
            build_canonical_map(entries)
        }
        Value::Null => CborValue::Null,
    }
}

/// Convert a strictly-parsed [`RawItem`] into a [`mash_wire::Value`],
/// enforcing that every map key is an integer (MASH never uses string keys).
pub fn raw_to_value(item: &RawItem) -> Result<Value, DecodeError> {
    Ok(match item {
        RawItem::UInt(v) => Value::UInt(*v),
        RawItem::NegInt(v) => Value::Int(*v),
        RawItem::Bool(v) => Value::Bool(*v),
        RawItem::Float(v) => Value::Float(*v),
        RawItem::Bytes(v) => Value::Bytes(v.clone()),
        RawItem::Text(v) => Value::Text(v.clone()),
        RawItem::Null => Value::Null,
        RawItem::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(raw_to_value(item)?);
            }
            Value::Array(out)
        }
        RawItem::Map(pairs) => {
            let mut out = Vec::with_capacity(pairs.len());
            for (k, v) in pairs {
                if matches!(k, RawItem::Text(_)) {
                    return Err(DecodeError::StringKey);
                }
                out.push((raw_to_value(k)?, raw_to_value(v)?));
            }
            Value::Map(out)
        }
    })
}

/// Coerce a decoded value to `i64`. Accepts any integer or float variant
/// (floats are only coerced when they have no fractional part) and rejects
/// everything else, per the codec's total-coercion contract.
pub fn to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Int(v) => Some(*v),
        Value::UInt(v) => i64::try_from(*v).ok(),
        Value::Float(v) if v.fract() == 0.0 => Some(*v as i64),
        _ => None,
    }
}

/// Coerce a decoded value to `u8`. See [`to_i64`].
pub fn to_u8(value: &Value) -> Option<u8> {
    to_i64(value).and_then(|v| u8::try_from(v).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uint_len_boundaries_match_cbor_head_width() {
        assert_eq!(cbor_uint_len(0), 1);
        assert_eq!(cbor_uint_len(23), 1);
        assert_eq!(cbor_uint_len(24), 2);
        assert_eq!(cbor_uint_len(255), 2);
        assert_eq!(cbor_uint_len(256), 3);
        assert_eq!(cbor_uint_len(65535), 3);
        assert_eq!(cbor_uint_len(65536), 5);
    }

    #[test]
    fn canonical_sort_orders_by_length_then_value() {
        let mut pairs = vec![
            (300u64, CborValue::Null),
            (2u64, CborValue::Null),
            (23u64, CborValue::Null),
            (24u64, CborValue::Null),
        ];
        canonical_sort(&mut pairs);
        let keys: Vec<u64> = pairs.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![2, 23, 24, 300]);
    }

    #[test]
    fn to_u8_rejects_out_of_range() {
        assert_eq!(to_u8(&Value::UInt(255)), Some(255));
        assert_eq!(to_u8(&Value::UInt(256)), None);
        assert_eq!(to_u8(&Value::Text("x".into())), None);
    }

    proptest::proptest! {
        /// Canonical order depends only on the set of keys, never on the
        /// order they were built in.
        #[test]
        fn canonical_sort_is_invariant_under_key_permutation(mut keys: Vec<u64>) {
            keys.sort_unstable();
            keys.dedup();
            let mut shuffled = keys.clone();
            shuffled.reverse();

            let mut a: Vec<_> = keys.iter().map(|&k| (k, CborValue::Null)).collect();
            let mut b: Vec<_> = shuffled.iter().map(|&k| (k, CborValue::Null)).collect();
            canonical_sort(&mut a);
            canonical_sort(&mut b);

            let a_keys: Vec<u64> = a.iter().map(|(k, _)| *k).collect();
            let b_keys: Vec<u64> = b.iter().map(|(k, _)| *k).collect();
            proptest::prop_assert_eq!(a_keys, b_keys);
        }
    }

    #[test]
    fn string_key_is_rejected() {
        let item = RawItem::Map(vec![(RawItem::Text("a".into()), RawItem::UInt(1))]);
        assert_eq!(raw_to_value(&item), Err(DecodeError::StringKey));
    }
}
