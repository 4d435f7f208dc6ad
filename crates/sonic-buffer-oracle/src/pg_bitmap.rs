//! PFC-enable bitmap model

use crate::types::PgRange;

/// Convert comma-separated PG list to bitmap
///
/// Parses a PFC enable string like "3,4" into a bitmap where bits 3 and 4 are set.
/// Entries that are not a priority index are ignored.
pub fn pfc_to_bitmap(pfc_enable: &str) -> u8 {
    let mut bitmap = 0u8;

    for pg_str in pfc_enable.split(',') {
        if let Ok(pg) = pg_str.trim().parse::<u8>() {
            if pg < 8 {
                bitmap |= 1 << pg;
            }
        }
    }

    bitmap
}

/// Serialize a bitmap as an ascending, comma-joined priority list
///
/// Example: 0b01011000 → "3,4,6"
pub fn bitmap_to_pfc(bitmap: u8) -> String {
    (0..8u8)
        .filter(|i| bitmap & (1 << i) != 0)
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Bitmap of every priority covered by the given PG ranges
pub fn ranges_to_bitmap<'a>(ranges: impl IntoIterator<Item = &'a PgRange>) -> u8 {
    ranges
        .into_iter()
        .flat_map(|r| r.priorities())
        .fold(0u8, |bitmap, pg| bitmap | (1 << pg))
}

/// Expected `pfc_enable` for a port's lossless PG ranges
pub fn expected_pfc_enable<'a>(ranges: impl IntoIterator<Item = &'a PgRange>) -> String {
    bitmap_to_pfc(ranges_to_bitmap(ranges))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges(list: &[&str]) -> Vec<PgRange> {
        list.iter().map(|r| r.parse().unwrap()).collect()
    }

    #[test]
    fn test_pfc_to_bitmap_simple() {
        assert_eq!(pfc_to_bitmap("3,4"), 0b00011000);
        assert_eq!(pfc_to_bitmap("0"), 0b00000001);
        assert_eq!(pfc_to_bitmap("7"), 0b10000000);
    }

    #[test]
    fn test_pfc_to_bitmap_with_spaces() {
        assert_eq!(pfc_to_bitmap("3, 4"), 0b00011000);
        assert_eq!(pfc_to_bitmap(" 3 , 4 "), 0b00011000);
    }

    #[test]
    fn test_pfc_to_bitmap_invalid() {
        // Invalid entries are ignored
        assert_eq!(pfc_to_bitmap("3,invalid,4"), 0b00011000);
        assert_eq!(pfc_to_bitmap(""), 0);
        assert_eq!(pfc_to_bitmap("3,8,33"), 0b00001000);
    }

    #[test]
    fn test_expected_pfc_enable_ascending() {
        assert_eq!(expected_pfc_enable(&ranges(&["6", "3-4"])), "3,4,6");
        assert_eq!(expected_pfc_enable(&ranges(&["3", "4", "6"])), "3,4,6");
        assert_eq!(expected_pfc_enable(&ranges(&["5-7"])), "5,6,7");
    }

    #[test]
    fn test_expected_pfc_enable_empty() {
        assert_eq!(expected_pfc_enable(&ranges(&[])), "");
    }

    #[test]
    fn test_bitmap_matches_device_string() {
        let expected = expected_pfc_enable(&ranges(&["3-4"]));
        assert_eq!(pfc_to_bitmap(&expected), ranges_to_bitmap(&ranges(&["3-4"])));
    }
}
