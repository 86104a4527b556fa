//! Done-step bookkeeping packed into a single `i64`.
//!
//! Bit addressing is 1-based: index 1 is the lowest bit, index 64 the
//! highest. The shift amount is masked to six bits, so out-of-range
//! indexes wrap instead of overflowing.

fn bit(index: i32) -> i64 {
    0x1i64 << ((index - 1) & 63)
}

pub fn set_true(bitmap: i64, index: i32) -> i64 {
    bitmap | bit(index)
}

pub fn set_false(bitmap: i64, index: i32) -> i64 {
    bitmap & !bit(index)
}

pub fn get_bool(bitmap: i64, index: i32) -> bool {
    bitmap & bit(index) != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_over_full_range() {
        for index in 1..=64 {
            let set = set_true(0, index);
            assert!(get_bool(set, index), "bit {index} not set");
            assert_eq!(set_false(set, index), 0, "bit {index} not cleared");
        }
    }

    #[test]
    fn neighbours_are_untouched() {
        let mut bitmap = 0;
        for index in 1..=64 {
            bitmap = set_true(bitmap, index);
        }
        let cleared = set_false(bitmap, 17);
        assert!(!get_bool(cleared, 17));
        assert!(get_bool(cleared, 16));
        assert!(get_bool(cleared, 18));
    }

    #[test]
    fn index_zero_wraps_to_top_bit() {
        let set = set_true(0, 0);
        assert!(get_bool(set, 0));
        assert!(get_bool(set, 64));
        assert_eq!(set, i64::MIN);
    }

    #[test]
    fn set_is_idempotent() {
        let once = set_true(0, 5);
        assert_eq!(set_true(once, 5), once);
        assert_eq!(set_false(set_false(once, 5), 5), 0);
    }
}
