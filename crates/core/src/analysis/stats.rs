use std::collections::BTreeMap;

use crate::model::Instruction;

/// Runs of consecutive `nop` instructions: start offset -> run length.
pub fn nop_runs<'a, I>(insns: I) -> BTreeMap<u64, u64>
where
    I: IntoIterator<Item = &'a Instruction>,
{
    let mut runs = BTreeMap::new();
    let mut current: Option<(u64, u64, u64)> = None;

    for insn in insns {
        if insn.mnem != "nop" {
            if let Some((start, count, _)) = current.take() {
                runs.insert(start, count);
            }
            continue;
        }
        let next_offset = insn.offset.saturating_add(u64::from(insn.len));
        current = match current {
            Some((start, count, end)) if end == insn.offset => Some((start, count + 1, next_offset)),
            Some((start, count, _)) => {
                runs.insert(start, count);
                Some((insn.offset, 1, next_offset))
            }
            None => Some((insn.offset, 1, next_offset)),
        };
    }
    if let Some((start, count, _)) = current {
        runs.insert(start, count);
    }
    runs
}

/// Occurrences of each byte value.
pub fn byte_counts(data: &[u8]) -> [u64; 256] {
    let mut counts = [0u64; 256];
    for b in data {
        counts[*b as usize] += 1;
    }
    counts
}

/// Shannon entropy in bits per byte; zero for empty input.
pub fn shannon_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let len = data.len() as f64;
    byte_counts(data)
        .iter()
        .filter(|c| **c > 0)
        .map(|c| {
            let p = *c as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Mnemonic frequencies. With `normalized` the decoder-independent mnemonic
/// is counted, otherwise the raw decoder mnemonic.
pub fn opcode_counts<'a, I>(insns: I, normalized: bool) -> BTreeMap<String, u64>
where
    I: IntoIterator<Item = &'a Instruction>,
{
    let mut counts = BTreeMap::new();
    for insn in insns {
        let key = if normalized { &insn.mnem } else { &insn.opcode.mnemonic };
        *counts.entry(key.clone()).or_insert(0) += 1;
    }
    counts
}
