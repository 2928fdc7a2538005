use semver::Version;

/// Parse a registry tag into a semver::Version, tolerating common tag variants.
///
/// Accepts surrounding whitespace, a leading `v`, leading zeros in numeric
/// components and shortened versions (missing minor or patch are padded with
/// zeros). A shortened version may not carry prerelease or build metadata,
/// since it would be ambiguous which component it belongs to.
///
/// Examples:
/// - "v2.0.0" -> Version(2, 0, 0)
/// - "1.2" -> Version(1, 2, 0)
/// - "01.02.03" -> Version(1, 2, 3)
/// - "1.2-rc.1" -> None
pub fn parse_tolerant(tag: &str) -> Option<Version> {
    let trimmed = tag.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);

    let mut parts: Vec<String> = trimmed.splitn(3, '.').map(strip_leading_zeros).collect();

    if parts.len() < 3 {
        if parts.last().is_some_and(|p| p.contains(['+', '-'])) {
            return None;
        }
        parts.resize(3, "0".to_string());
    }

    Version::parse(&parts.join(".")).ok()
}

fn strip_leading_zeros(part: &str) -> String {
    if part.len() <= 1 {
        return part.to_string();
    }

    let stripped = part.trim_start_matches('0');
    if stripped.starts_with(|c: char| c.is_ascii_digit()) {
        stripped.to_string()
    } else {
        // All zeros, or zeros followed by prerelease/build metadata
        format!("0{stripped}")
    }
}
