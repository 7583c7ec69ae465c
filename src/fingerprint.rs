//! Canonical loop fingerprint (spec §3, invariant 7): SHA-256 over the
//! lexicographically minimal rotation of the `(wallet, nft)` step sequence.
//! Rotation-invariant, direction-sensitive: reversing a loop yields a
//! different fingerprint since the `(wallet, nft)` pairs themselves reverse
//! order and re-pair.

use sha2::{Digest, Sha256};

use crate::model::LoopStep;

/// Computes the fingerprint for an ordered sequence of loop steps.
///
/// Panics are impossible here by construction: an empty slice yields the
/// hash of an empty canonical form, which is never returned to a caller
/// because [`crate::validate`] rejects loops shorter than 2.
pub fn fingerprint(steps: &[LoopStep]) -> String {
    let canonical = canonical_rotation(steps);
    let mut hasher = Sha256::new();
    for step in &canonical {
        hasher.update(step.from.0.as_bytes());
        hasher.update(0u8.to_le_bytes());
        hasher.update(step.nft.0.as_bytes());
        hasher.update(0u8.to_le_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Returns the rotation of `steps` that is lexicographically smallest when
/// each step is compared as `(wallet, nft)`.
fn canonical_rotation(steps: &[LoopStep]) -> Vec<&LoopStep> {
    let n = steps.len();
    if n == 0 {
        return Vec::new();
    }
    let key_at = |start: usize, offset: usize| -> (&str, &str) {
        let step = &steps[(start + offset) % n];
        (step.from.0.as_str(), step.nft.0.as_str())
    };
    let mut best_start = 0;
    for start in 1..n {
        for offset in 0..n {
            let candidate = key_at(start, offset);
            let current_best = key_at(best_start, offset);
            match candidate.cmp(&current_best) {
                std::cmp::Ordering::Less => {
                    best_start = start;
                    break;
                }
                std::cmp::Ordering::Greater => break,
                std::cmp::Ordering::Equal => continue,
            }
        }
    }
    (0..n).map(|offset| &steps[(best_start + offset) % n]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NftId, WalletId};

    fn step(from: &str, to: &str, nft: &str) -> LoopStep {
        LoopStep {
            from: WalletId(from.into()),
            to: WalletId(to.into()),
            nft: NftId(nft.into()),
        }
    }

    #[test]
    fn rotations_share_a_fingerprint() {
        let abc = vec![step("A", "B", "n1"), step("B", "C", "n2"), step("C", "A", "n3")];
        let bca = vec![step("B", "C", "n2"), step("C", "A", "n3"), step("A", "B", "n1")];
        let cab = vec![step("C", "A", "n3"), step("A", "B", "n1"), step("B", "C", "n2")];
        let f1 = fingerprint(&abc);
        let f2 = fingerprint(&bca);
        let f3 = fingerprint(&cab);
        assert_eq!(f1, f2);
        assert_eq!(f2, f3);
    }

    #[test]
    fn reversed_loop_has_different_fingerprint() {
        let forward = vec![step("A", "B", "n1"), step("B", "C", "n2"), step("C", "A", "n3")];
        // A reversed trade loop re-pairs wallets with different NFTs
        // entirely (B gives n1 to A becomes A gives n3 to B, etc.), so this
        // also exercises that the hash isn't just order-sensitive by luck.
        let reversed = vec![step("A", "C", "n3"), step("C", "B", "n2"), step("B", "A", "n1")];
        assert_ne!(fingerprint(&forward), fingerprint(&reversed));
    }

    #[test]
    fn two_cycle_is_deterministic() {
        let loop1 = vec![step("A", "B", "n1"), step("B", "A", "n2")];
        let loop2 = vec![step("B", "A", "n2"), step("A", "B", "n1")];
        assert_eq!(fingerprint(&loop1), fingerprint(&loop2));
    }
}
