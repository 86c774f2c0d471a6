//! Pure validation rules shared by registration, booking and the oracle.
//!
//! Nothing here touches ledger state. Every check either returns `Ok(())`
//! or the `LedgerError` variant the caller should surface unchanged.

use crate::{
    constants::{
        MAX_CONFIDENCE, MAX_LATITUDE, MAX_LONGITUDE, MAX_METADATA_CID_LEN,
        MAX_PASS_DURATION_MINUTES, MIN_PASS_DURATION_MINUTES, TLE_LINE_LEN,
    },
    error::{LedgerError, LedgerResult},
    types::Timestamp,
};

// ============================================================================
// Coordinates, duration, percentages
// ============================================================================

/// Latitude and longitude in 4-decimal scaled degrees.
pub fn validate_coordinates(lat: i32, lon: i32) -> LedgerResult<()> {
    if !(-MAX_LATITUDE..=MAX_LATITUDE).contains(&lat)
        || !(-MAX_LONGITUDE..=MAX_LONGITUDE).contains(&lon)
    {
        return Err(LedgerError::InvalidCoordinates { lat, lon });
    }
    Ok(())
}

pub fn validate_duration(minutes: u32) -> LedgerResult<()> {
    if !(MIN_PASS_DURATION_MINUTES..=MAX_PASS_DURATION_MINUTES).contains(&minutes) {
        return Err(LedgerError::InvalidDuration(minutes));
    }
    Ok(())
}

pub fn validate_uptime(pct: u8) -> LedgerResult<()> {
    if pct > 100 {
        return Err(LedgerError::InvalidUptime(pct));
    }
    Ok(())
}

pub fn validate_confidence(confidence: u8) -> LedgerResult<()> {
    if confidence > MAX_CONFIDENCE {
        return Err(LedgerError::InvalidConfidence(confidence));
    }
    Ok(())
}

/// Content identifiers are opaque; only their shape is checked.
pub fn validate_metadata_cid(cid: &str) -> LedgerResult<()> {
    if cid.is_empty()
        || cid.len() > MAX_METADATA_CID_LEN
        || !cid.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(LedgerError::InvalidMetadataCid(cid.to_string()));
    }
    Ok(())
}

// ============================================================================
// Timing
// ============================================================================

/// An observation may not claim to come from further than `tolerance` seconds
/// in the future.
pub fn is_plausible_observation(observed_at: Timestamp, now: Timestamp, tolerance: u64) -> bool {
    observed_at <= now.saturating_add(tolerance)
}

/// `start ≤ ts ≤ start + duration`.
pub fn is_within_window(ts: Timestamp, start: Timestamp, duration_minutes: u32) -> bool {
    let end = start.saturating_add(u64::from(duration_minutes) * 60);
    ts >= start && ts <= end
}

// ============================================================================
// TLE format
// ============================================================================

/// Checksum over characters 0–67: digits add their value, `-` adds 1,
/// everything else adds 0; result modulo 10.
pub fn tle_checksum(line: &str) -> u8 {
    let sum: u32 = line
        .bytes()
        .take(TLE_LINE_LEN - 1)
        .map(|b| match b {
            b'0'..=b'9' => u32::from(b - b'0'),
            b'-' => 1,
            _ => 0,
        })
        .sum();
    (sum % 10) as u8
}

/// One TLE line: 69 ASCII characters, `"<n> "` prefix, trailing checksum digit.
pub fn validate_tle_line(line: &str, line_number: u8) -> LedgerResult<()> {
    if !line.is_ascii() {
        return Err(tle_error(line_number, "contains non-ASCII characters"));
    }
    if line.len() != TLE_LINE_LEN {
        return Err(tle_error(
            line_number,
            &format!("length {} != {TLE_LINE_LEN}", line.len()),
        ));
    }
    let bytes = line.as_bytes();
    if bytes[0] != b'0' + line_number || bytes[1] != b' ' {
        return Err(tle_error(line_number, "wrong line number prefix"));
    }
    let declared = bytes[TLE_LINE_LEN - 1];
    if !declared.is_ascii_digit() {
        return Err(tle_error(line_number, "checksum is not a digit"));
    }
    let computed = tle_checksum(line);
    if declared - b'0' != computed {
        return Err(tle_error(
            line_number,
            &format!("checksum {} != computed {computed}", declared as char),
        ));
    }
    Ok(())
}

/// Both lines valid and describing the same catalog number (columns 3–7).
pub fn validate_tle_pair(line1: &str, line2: &str) -> LedgerResult<()> {
    validate_tle_line(line1, 1)?;
    validate_tle_line(line2, 2)?;
    if line1[2..7] != line2[2..7] {
        return Err(LedgerError::InvalidTleData(format!(
            "catalog number mismatch: {} vs {}",
            &line1[2..7],
            &line2[2..7]
        )));
    }
    Ok(())
}

/// Element-set epoch of line 1 (columns 19–32, `YYDDD.DDDDDDDD`) in Unix seconds.
///
/// Two-digit years 57–99 are 19xx, 00–56 are 20xx. Returns `None` when the
/// field does not parse; callers run [`validate_tle_line`] first.
pub fn tle_epoch(line1: &str) -> Option<Timestamp> {
    let field = line1.get(18..32)?.trim();
    let yy: i64 = field.get(..2)?.parse().ok()?;
    let day: f64 = field.get(2..)?.parse().ok()?;
    if !(1.0..367.0).contains(&day) {
        return None;
    }
    let year = if yy >= 57 { 1900 + yy } else { 2000 + yy };
    let jan1 = days_from_civil(year, 1, 1) * 86_400;
    let secs = jan1 + ((day - 1.0) * 86_400.0) as i64;
    u64::try_from(secs).ok()
}

/// Days since 1970-01-01 for a proleptic Gregorian date.
fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = if month > 2 { month - 3 } else { month + 9 };
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

fn tle_error(line_number: u8, reason: &str) -> LedgerError {
    LedgerError::InvalidTleData(format!("line {line_number}: {reason}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISS_LINE1: &str =
        "1 25544U 98067A   08264.51782528 -.00002182  00000-0 -11606-4 0  2927";
    const ISS_LINE2: &str =
        "2 25544  51.6416 247.4627 0006703 130.5360 325.0288 15.72125391563537";

    #[test]
    fn coordinates_inside_range_pass() {
        for (lat, lon) in [
            (0, 0),
            (140_583, 777_093),
            (MAX_LATITUDE, MAX_LONGITUDE),
            (-MAX_LATITUDE, -MAX_LONGITUDE),
        ] {
            validate_coordinates(lat, lon).unwrap();
        }
    }

    #[test]
    fn coordinates_outside_range_fail() {
        for (lat, lon) in [
            (MAX_LATITUDE + 1, 0),
            (-MAX_LATITUDE - 1, 0),
            (0, MAX_LONGITUDE + 1),
            (0, -MAX_LONGITUDE - 1),
            (i32::MAX, i32::MIN),
        ] {
            assert_eq!(
                validate_coordinates(lat, lon),
                Err(LedgerError::InvalidCoordinates { lat, lon })
            );
        }
    }

    #[test]
    fn duration_bounds() {
        assert!(validate_duration(4).is_err());
        validate_duration(5).unwrap();
        validate_duration(7).unwrap();
        validate_duration(10).unwrap();
        assert_eq!(validate_duration(15), Err(LedgerError::InvalidDuration(15)));
    }

    #[test]
    fn percentages() {
        validate_uptime(100).unwrap();
        assert!(validate_uptime(101).is_err());
        validate_confidence(0).unwrap();
        assert_eq!(validate_confidence(101), Err(LedgerError::InvalidConfidence(101)));
    }

    #[test]
    fn iss_pair_is_valid() {
        assert_eq!(tle_checksum(ISS_LINE1), 7);
        assert_eq!(tle_checksum(ISS_LINE2), 7);
        validate_tle_pair(ISS_LINE1, ISS_LINE2).unwrap();
    }

    #[test]
    fn mutating_any_single_digit_flips_validity() {
        for line in [ISS_LINE1, ISS_LINE2] {
            let number = line.as_bytes()[0] - b'0';
            for (i, b) in line.bytes().enumerate() {
                // Column 0 is the line number, which has its own check.
                if i == 0 || !b.is_ascii_digit() {
                    continue;
                }
                let mut mutated = line.as_bytes().to_vec();
                mutated[i] = b'0' + (b - b'0' + 1) % 10;
                let mutated = String::from_utf8(mutated).unwrap();
                assert!(
                    validate_tle_line(&mutated, number).is_err(),
                    "mutation at column {i} went undetected"
                );
            }
        }
    }

    #[test]
    fn wrong_length_is_rejected() {
        let short = &ISS_LINE1[..68];
        assert!(matches!(
            validate_tle_line(short, 1),
            Err(LedgerError::InvalidTleData(_))
        ));
        let long = format!("{ISS_LINE1}0");
        assert!(validate_tle_line(&long, 1).is_err());
    }

    #[test]
    fn swapped_lines_are_rejected() {
        assert!(validate_tle_pair(ISS_LINE2, ISS_LINE1).is_err());
    }

    #[test]
    fn epoch_of_iss_element_set() {
        // 2008 day 264.51782528 → 2008-09-20 12:25:40 UTC.
        let epoch = tle_epoch(ISS_LINE1).unwrap();
        assert_eq!(epoch / 86_400, 14_142);
        assert_eq!(epoch, 1_221_913_540);
    }

    #[test]
    fn window_bounds_are_inclusive() {
        assert!(is_within_window(1_000, 1_000, 5));
        assert!(is_within_window(1_300, 1_000, 5));
        assert!(!is_within_window(1_301, 1_000, 5));
        assert!(!is_within_window(999, 1_000, 5));
    }

    #[test]
    fn observations_from_the_future() {
        assert!(is_plausible_observation(4_600, 1_000, 3_600));
        assert!(!is_plausible_observation(4_601, 1_000, 3_600));
    }

    #[test]
    fn cid_shape() {
        validate_metadata_cid("bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi").unwrap();
        assert!(validate_metadata_cid("").is_err());
        assert!(validate_metadata_cid("ipfs://x").is_err());
    }
}
