//! Plausibility scoring for auto-match

use crate::descriptor::{DescriptorSet, MessageDescriptor};

use super::interp::{DecodeStats, DecodedMessage, Interpreter};
use super::wire;

pub const FIELD_REWARD: i64 = 100;
pub const CONFLICT_PENALTY: i64 = 150;
pub const UNKNOWN_FIELD_PENALTY: i64 = 50;
pub const MOSTLY_UNKNOWN_PENALTY: i64 = 200;

fn mostly_unknown(stats: &DecodeStats, unknown_ratio: f64) -> bool {
    stats.unknown_bytes as f64 > unknown_ratio * stats.total_bytes as f64
}

/// Score one trial decode; `None` when the candidate is out of contention
pub fn plausibility(descriptor: &MessageDescriptor, stats: &DecodeStats, unknown_ratio: f64) -> Option<i64> {
    if descriptor.is_empty() || descriptor.map_entry || stats.decoded_fields == 0 {
        return None;
    }

    let mut score = FIELD_REWARD * stats.decoded_fields as i64
        - CONFLICT_PENALTY * stats.conflicts as i64
        - UNKNOWN_FIELD_PENALTY * stats.unknown_fields as i64;
    if mostly_unknown(stats, unknown_ratio) {
        score -= MOSTLY_UNKNOWN_PENALTY;
    }
    score -= descriptor.fields.len().saturating_sub(stats.distinct_fields) as i64;
    Some(score)
}

/// What a shape with no fields would earn for `top_level_fields` fields
pub fn empty_floor(top_level_fields: usize, total_bytes: usize) -> i64 {
    let mut floor = -UNKNOWN_FIELD_PENALTY * top_level_fields as i64;
    if total_bytes > 0 {
        floor -= MOSTLY_UNKNOWN_PENALTY;
    }
    floor
}

/// Best candidate in `set`, ties going to the first message name in order
pub(crate) fn best_match(
    set: &DescriptorSet,
    bytes: &[u8],
    max_depth: usize,
    unknown_ratio: f64,
) -> Option<(DecodedMessage, i64)> {
    let fields = wire::read_all(bytes).ok()?;
    if fields.is_empty() {
        return None;
    }
    let floor = empty_floor(fields.len(), bytes.len());
    let interpreter = Interpreter::new(set, max_depth);

    let mut best: Option<(DecodedMessage, i64)> = None;
    for descriptor in set.messages() {
        if descriptor.is_empty() || descriptor.map_entry {
            continue;
        }
        let Ok(decoded) = interpreter.decode_fields(descriptor, &fields, bytes.len()) else {
            continue;
        };
        let Some(score) = plausibility(descriptor, &decoded.stats, unknown_ratio) else {
            continue;
        };
        if score <= floor {
            continue;
        }
        if best.as_ref().map_or(true, |(_, top)| score > *top) {
            best = Some((decoded, score));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile_one;

    fn stats(decoded: usize, conflicts: usize, unknown: usize) -> DecodeStats {
        DecodeStats {
            decoded_fields: decoded,
            conflicts,
            unknown_fields: unknown,
            unknown_bytes: 0,
            distinct_fields: decoded,
            total_bytes: 10,
        }
    }

    #[test]
    fn test_empty_and_zero_decoded_are_ineligible() {
        let set = compile_one("a.proto", "message Empty {} message One { int32 a = 1; }").unwrap();
        let empty = set.message("Empty").unwrap();
        let one = set.message("One").unwrap();
        assert_eq!(plausibility(empty, &stats(0, 0, 3), 0.5), None);
        assert_eq!(plausibility(one, &stats(0, 0, 3), 0.5), None);
        assert_eq!(plausibility(one, &stats(1, 0, 0), 0.5), Some(100));
    }

    #[test]
    fn test_conflicts_cost_more_than_unknowns() {
        let set = compile_one("a.proto", "message M { int32 a = 1; int32 b = 2; }").unwrap();
        let m = set.message("M").unwrap();
        let with_conflict = plausibility(m, &stats(1, 1, 0), 0.5).unwrap();
        let with_unknown = plausibility(m, &stats(1, 0, 1), 0.5).unwrap();
        assert!(with_conflict < with_unknown);
    }

    #[test]
    fn test_mostly_unknown_penalty() {
        let set = compile_one("a.proto", "message M { int32 a = 1; }").unwrap();
        let m = set.message("M").unwrap();
        let mut s = stats(1, 0, 1);
        s.unknown_bytes = 8;
        assert_eq!(plausibility(m, &s, 0.5), Some(100 - 50 - 200));
    }

    #[test]
    fn test_best_match_prefers_fuller_shape() {
        let set = compile_one(
            "a.proto",
            "message Small { int32 id = 1; } message Full { int32 id = 1; string name = 2; }",
        )
        .unwrap();
        // id = 7, name = "ab"
        let bytes = [0x08, 0x07, 0x12, 0x02, b'a', b'b'];
        let (decoded, _) = best_match(&set, &bytes, 64, 0.5).unwrap();
        assert_eq!(decoded.type_name, "Full");
    }

    #[test]
    fn test_best_match_tie_goes_to_first_name() {
        let set = compile_one("a.proto", "message B { int32 x = 1; } message A { int32 y = 1; }").unwrap();
        let (decoded, _) = best_match(&set, &[0x08, 0x01], 64, 0.5).unwrap();
        assert_eq!(decoded.type_name, "A");
    }

    #[test]
    fn test_best_match_none_for_garbage() {
        let set = compile_one("a.proto", "message M { int32 a = 1; }").unwrap();
        assert!(best_match(&set, &[0x12, 0x09, 0x01], 64, 0.5).is_none());
        assert!(best_match(&set, &[], 64, 0.5).is_none());
    }
}
