/// First port handed to a proxy process when none are in use.
pub const DEFAULT_BASE_PORT: u16 = 17200;

/// Walks the ascending `ports` and returns the port just before the first
/// discontinuity, or the highest port when the run is contiguous.
///
/// Ports below the lowest used one are never considered, so a registry whose
/// lowest port sits above the base keeps allocating upwards.
pub fn gap_boundary(ports: &[u16]) -> Option<u16> {
    let last = *ports.last()?;
    for pair in ports.windows(2) {
        if pair[1] != pair[0].wrapping_add(1) {
            return Some(pair[0]);
        }
    }
    Some(last)
}

/// Port for the next serve given the ports currently in use.
pub fn next_port(base: u16, used: &[u16]) -> u16 {
    let mut sorted = used.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    match gap_boundary(&sorted) {
        Some(boundary) => boundary.saturating_add(1),
        None => base,
    }
}
