//! Process-relative monotonic millisecond clock.
//!
//! `arrival_ms` only needs to order submissions within one process's
//! lifetime (it feeds the SJF tie-break), so elapsed time since process
//! start is sufficient and avoids pulling in a wall-clock dependency.

use std::sync::OnceLock;
use std::time::Instant;

static START: OnceLock<Instant> = OnceLock::new();

pub fn monotonic_ms() -> u64 {
    let start = START.get_or_init(Instant::now);
    start.elapsed().as_millis() as u64
}
