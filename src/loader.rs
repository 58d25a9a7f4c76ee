//! Loader (§4.E): streams the assembler's binary-row output into memory.

use crate::error::{Result, SimError};
use crate::memory::Memory;

/// `(first_written, last_written)`, or `(-1, -1)` if nothing was written.
pub type LoadExtent = (i64, i64);

/// Load `text` (the loader input format) into `mem`, starting from address
/// 0 and advancing on every binary row. Returns the extent written so the
/// caller can seed `PC`.
pub fn load(mem: &mut Memory, text: &str) -> Result<LoadExtent> {
    let mut current_address: u32 = 0;
    let mut first: Option<u32> = None;
    let mut last: Option<u32> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let text = strip_comment(raw).trim();
        if text.is_empty() {
            continue;
        }

        if let Some(rest) = text
            .strip_prefix("address")
            .or_else(|| text.strip_prefix("ADDRESS"))
        {
            let bits = rest.trim();
            if bits.is_empty() || !bits.bytes().all(|b| b == b'0' || b == b'1') || bits.len() > 16
            {
                return Err(parse_err(line, format!("malformed address directive '{}'", text)));
            }
            current_address =
                u32::from_str_radix(bits, 2).map_err(|_| parse_err(line, "malformed address bits"))?;
            continue;
        }

        if text.len() == 32 && text.bytes().all(|b| b == b'0' || b == b'1') {
            let word = u32::from_str_radix(text, 2).expect("validated 32-bit binary string");
            mem.write(current_address, word)
                .map_err(|_| SimError::AddressOutOfRange(current_address))?;
            if first.is_none() {
                first = Some(current_address);
            }
            last = Some(current_address);
            current_address = current_address
                .checked_add(1)
                .ok_or(SimError::AddressOutOfRange(current_address))?;
            continue;
        }

        return Err(parse_err(line, format!("malformed row '{}'", text)));
    }

    match (first, last) {
        (Some(f), Some(l)) => Ok((i64::from(f), i64::from(l))),
        _ => Ok((-1, -1)),
    }
}

fn strip_comment(line: &str) -> &str {
    let hash = line.find('#');
    let slashes = line.find("//");
    match (hash, slashes) {
        (Some(h), Some(s)) => &line[..h.min(s)],
        (Some(h), None) => &line[..h],
        (None, Some(s)) => &line[..s],
        (None, None) => line,
    }
}

fn parse_err(line: usize, reason: impl Into<String>) -> SimError {
    SimError::Parse {
        line,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_from_address_zero_by_default() {
        let mut mem = Memory::new();
        let text = format!("{}\n{}\n", "0".repeat(31) + "1", "1".repeat(32));
        let (first, last) = load(&mut mem, &text).unwrap();
        assert_eq!((first, last), (0, 1));
        assert_eq!(mem.read(0).unwrap(), 1);
        assert_eq!(mem.read(1).unwrap(), u32::MAX);
    }

    #[test]
    fn address_directive_repositions_the_cursor() {
        let mut mem = Memory::new();
        let text = format!("address 0000000000000101\n{}\n", "0".repeat(32));
        let (first, last) = load(&mut mem, &text).unwrap();
        assert_eq!((first, last), (5, 5));
    }

    #[test]
    fn empty_input_yields_sentinel_extent() {
        let mut mem = Memory::new();
        let (first, last) = load(&mut mem, "# nothing here\n").unwrap();
        assert_eq!((first, last), (-1, -1));
    }

    #[test]
    fn malformed_row_is_a_line_numbered_parse_error() {
        let mut mem = Memory::new();
        let err = load(&mut mem, "not a valid row").unwrap_err();
        assert!(matches!(err, SimError::Parse { line: 1, .. }));
    }

    #[test]
    fn address_past_the_top_of_memory_faults() {
        let mut mem = Memory::new();
        let text = format!("address 1111111111111111\n{}\n{}\n", "0".repeat(32), "0".repeat(32));
        assert!(matches!(
            load(&mut mem, &text),
            Err(SimError::AddressOutOfRange(_))
        ));
    }
}
