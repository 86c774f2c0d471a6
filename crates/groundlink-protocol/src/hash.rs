use tiny_keccak::{Hasher, Keccak};

/// Keccak-256 hash of the input bytes.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut k = Keccak::v256();
    let mut out = [0u8; 32];
    k.update(data);
    k.finalize(&mut out);
    out
}

/// Leaf hash for an encoded journal entry: keccak256(0x00 || bytes).
///
/// The domain prefix keeps a leaf from ever colliding with an internal node.
pub fn hash_leaf(data: &[u8]) -> [u8; 32] {
    let mut k = Keccak::v256();
    let mut out = [0u8; 32];
    k.update(&[0x00]);
    k.update(data);
    k.finalize(&mut out);
    out
}

/// Merkle tree over a slice of leaf hashes.
///
/// - Internal hash: keccak256(left || right)
/// - Non-power-of-2 counts are padded with zero-hashes on the right.
///
/// Returns the 32-byte merkle root, or [0u8; 32] for an empty input.
pub fn merkle_root(leaves: &[[u8; 32]]) -> [u8; 32] {
    if leaves.is_empty() {
        return [0u8; 32];
    }

    let n = leaves.len().next_power_of_two();
    let mut layer: Vec<[u8; 32]> = Vec::with_capacity(n);
    layer.extend_from_slice(leaves);
    layer.resize(n, [0u8; 32]);

    while layer.len() > 1 {
        let mut next = Vec::with_capacity(layer.len() / 2);
        for chunk in layer.chunks_exact(2) {
            next.push(hash_pair(&chunk[0], &chunk[1]));
        }
        layer = next;
    }

    layer[0]
}

/// Sibling path for the leaf at `index`, ordered from the leaf up.
pub fn merkle_proof(leaves: &[[u8; 32]], index: usize) -> Option<Vec<[u8; 32]>> {
    if index >= leaves.len() {
        return None;
    }

    let n = leaves.len().next_power_of_two();
    let mut layer: Vec<[u8; 32]> = leaves.to_vec();
    layer.resize(n, [0u8; 32]);

    let mut proof = Vec::new();
    let mut idx = index;
    while layer.len() > 1 {
        proof.push(layer[idx ^ 1]);
        layer = layer
            .chunks_exact(2)
            .map(|chunk| hash_pair(&chunk[0], &chunk[1]))
            .collect();
        idx /= 2;
    }
    Some(proof)
}

/// Verify a merkle inclusion proof.
///
/// `leaf_hash`  : hash of the leaf data
/// `proof`      : sibling hashes from leaf to root
/// `index`      : 0-based leaf index
/// `root`       : expected root
pub fn verify_merkle_proof(
    leaf_hash: [u8; 32],
    proof: &[[u8; 32]],
    index: usize,
    root: [u8; 32],
) -> bool {
    let mut current = leaf_hash;
    let mut idx = index;

    for sibling in proof {
        current = if idx % 2 == 0 {
            hash_pair(&current, sibling)
        } else {
            hash_pair(sibling, &current)
        };
        idx /= 2;
    }

    current == root
}

fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut combined = [0u8; 64];
    combined[..32].copy_from_slice(left);
    combined[32..].copy_from_slice(right);
    keccak256(&combined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_merkle_root_is_zero() {
        assert_eq!(merkle_root(&[]), [0u8; 32]);
    }

    #[test]
    fn single_leaf_root_equals_leaf() {
        let leaf = hash_leaf(b"pass-booked");
        assert_eq!(merkle_root(&[leaf]), leaf);
    }

    #[test]
    fn leaf_hash_is_domain_separated() {
        assert_ne!(hash_leaf(b"x"), keccak256(b"x"));
    }

    #[test]
    fn generated_proofs_verify_for_every_leaf() {
        let leaves: Vec<[u8; 32]> = (0u8..5).map(|i| hash_leaf(&[i])).collect();
        let root = merkle_root(&leaves);

        for (i, leaf) in leaves.iter().enumerate() {
            let proof = merkle_proof(&leaves, i).unwrap();
            assert!(verify_merkle_proof(*leaf, &proof, i, root));
            assert!(!verify_merkle_proof(*leaf, &proof, i ^ 1, root));
        }
        assert!(merkle_proof(&leaves, 5).is_none());
    }
}
