//! Release version comparison

use semver::Version;

/// Coerce a loosely formatted version string into `major.minor.patch`.
///
/// Takes the first run of up to three dot-separated numbers anywhere in the
/// string, so `v1.3`, `release-2.0.1-beta` and `1.2.3.4` all coerce. Missing
/// components default to zero; prerelease and build text is dropped.
pub fn coerce(input: &str) -> Option<Version> {
    let bytes = input.as_bytes();
    let start = bytes.iter().position(u8::is_ascii_digit)?;

    let mut parts = [0u64; 3];
    let mut index = 0;
    let mut cursor = start;

    loop {
        let end = bytes[cursor..]
            .iter()
            .position(|b| !b.is_ascii_digit())
            .map_or(bytes.len(), |offset| cursor + offset);
        parts[index] = input[cursor..end].parse().ok()?;
        index += 1;

        let continues = index < 3
            && bytes.get(end) == Some(&b'.')
            && bytes.get(end + 1).is_some_and(u8::is_ascii_digit);
        if !continues {
            break;
        }
        cursor = end + 1;
    }

    Some(Version::new(parts[0], parts[1], parts[2]))
}

/// Whether `latest` should be offered over `current`.
///
/// Falls back to plain string inequality when either side does not coerce,
/// so malformed tags still lead to an update rather than a silent stall.
pub fn is_newer(latest: &str, current: &str) -> bool {
    match (coerce(latest), coerce(current)) {
        (Some(latest), Some(current)) => latest > current,
        _ => latest != current,
    }
}
