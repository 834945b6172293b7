//! Allocation-free text helpers for HUD values.
//!
//! Everything writes into `heapless::String<N>`; no `format!` and no heap.

use core::fmt::Write;

use heapless::String;

/// Push a u32 value to a heapless string (no format! machinery).
pub fn push_u32<const N: usize>(
    s: &mut String<N>,
    mut val: u32,
) {
    if val == 0 {
        s.push('0').ok();
        return;
    }

    // Build digits in reverse
    let mut digits = [0u8; 10];
    let mut i = 0;
    while val > 0 {
        digits[i] = (val % 10) as u8;
        val /= 10;
        i += 1;
    }

    while i > 0 {
        i -= 1;
        s.push((b'0' + digits[i]) as char).ok();
    }
}

/// Push a value in hundredths (e.g. `-1234` -> `"-12.34"`).
pub fn push_hundredths<const N: usize>(
    s: &mut String<N>,
    hundredths: i32,
) {
    if hundredths < 0 {
        s.push('-').ok();
    }
    let abs = hundredths.unsigned_abs();
    push_u32(s, abs / 100);
    s.push('.').ok();
    let frac = abs % 100;
    if frac < 10 {
        s.push('0').ok();
    }
    push_u32(s, frac);
}

/// Push a value with thousands separators (e.g. `27600` -> `"27,600"`).
pub fn push_grouped<const N: usize>(
    s: &mut String<N>,
    val: u32,
) {
    let mut scratch: String<16> = String::new();
    push_u32(&mut scratch, val);
    let len = scratch.len();
    for (i, c) in scratch.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            s.push(',').ok();
        }
        s.push(c).ok();
    }
}

/// Format a data age in seconds compactly: `"42s"`, `"7m"`, `"3h"`.
pub fn push_age<const N: usize>(
    s: &mut String<N>,
    secs: u32,
) {
    if secs < 60 {
        push_u32(s, secs);
        s.push('s').ok();
    } else if secs < 3600 {
        push_u32(s, secs / 60);
        s.push('m').ok();
    } else {
        let _ = write!(s, "{}h", secs / 3600);
    }
}
