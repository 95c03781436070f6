//! Source-side combination generation (`spec.md` §4.6 "Generation").

use rand::RngCore;

use crate::block_file::BlockFile;
use crate::combination::Combination;
use crate::err::Result;

/// Generates up to `k` random linear combinations of the blocks this
/// source possesses in `[first, last]`.
///
/// Each combination's coefficient vector is drawn uniformly from
/// `{0, ..., 255}` per present block, redrawn if it would come out
/// all-zero so rank is never wasted on a useless equation. Blocks the
/// source does not yet have are simply left out of the sum, matching
/// `spec.md`'s "reads each component block it possesses".
pub fn generate(file: &BlockFile, first: u64, last: u64, k: usize) -> Result<Vec<Combination>> {
    let mut present_blocks = Vec::new();
    for i in first..=last {
        if let Some(content) = file.read_block(i)? {
            present_blocks.push((i, content));
        }
    }
    if present_blocks.is_empty() {
        return Ok(Vec::new());
    }

    let mut rng = rand::thread_rng();
    let mut combinations = Vec::with_capacity(k);
    for _ in 0..k {
        combinations.push(random_combination(&present_blocks, &mut rng));
    }
    Ok(combinations)
}

fn random_combination(blocks: &[(u64, Vec<u8>)], rng: &mut impl RngCore) -> Combination {
    loop {
        let mut acc = Combination::empty();
        let mut rank = 0u32;
        for (offset, content) in blocks {
            let mut coeff_bytes = [0u8; 1];
            rng.fill_bytes(&mut coeff_bytes);
            let coeff = coeff_bytes[0];
            if coeff == 0 {
                continue;
            }
            let mut term = Combination::from_block(*offset, content);
            term.scale_assign(coeff);
            acc.add_assign(&term);
            rank += 1;
        }
        if rank > 0 {
            return acc;
        }
        // Every coefficient drew zero; try again rather than emit the
        // useless all-zero combination (`spec.md` §4.6 "Generation").
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_skips_absent_blocks_and_never_emits_all_zero() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = BlockFile::open(dir.path().join("target.blk")).unwrap();
        file.write_block(0, b"aaaa").unwrap();
        file.write_block(2, b"cccc").unwrap();

        let combos = generate(&file, 0, 2, 5).unwrap();
        assert_eq!(combos.len(), 5);
        for c in &combos {
            assert!(c.components_count() > 0);
        }
    }

    #[test]
    fn generate_with_no_present_blocks_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = BlockFile::open(dir.path().join("target.blk")).unwrap();
        let combos = generate(&file, 0, 3, 5).unwrap();
        assert!(combos.is_empty());
    }
}
