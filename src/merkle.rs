//! Merkle proofs over attestation responses.
//!
//! Pairs are hashed in sorted order (`keccak256(min || max)`), so a proof is just the list of
//! siblings from leaf to root with no left/right flags.

use crate::error::MerkleError;
use alloy_primitives::{keccak256, B256};

pub fn hash_pair(a: &B256, b: &B256) -> B256 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(lo.as_slice());
    buf[32..].copy_from_slice(hi.as_slice());
    keccak256(buf)
}

pub fn compute_root(leaf: B256, proof: &[B256]) -> B256 {
    proof.iter().fold(leaf, |acc, sibling| hash_pair(&acc, sibling))
}

pub fn verify_proof(leaf: B256, proof: &[B256], root: B256) -> bool {
    compute_root(leaf, proof) == root
}

#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// `layers[0]` are the sorted leaves, the last layer holds the root.
    layers: Vec<Vec<B256>>,
}

impl MerkleTree {
    pub fn from_leaves(leaves: impl IntoIterator<Item = B256>) -> Result<Self, MerkleError> {
        let mut base: Vec<B256> = leaves.into_iter().collect();
        if base.is_empty() {
            return Err(MerkleError::Empty);
        }
        base.sort();
        base.dedup();

        let mut layers = vec![base];
        while let Some(last) = layers.last() {
            if last.len() == 1 {
                break;
            }
            let pairs = last.chunks_exact(2);
            // an odd node moves up unchanged
            let odd = pairs.remainder().first().copied();
            let next = pairs
                .map(|pair| hash_pair(&pair[0], &pair[1]))
                .chain(odd)
                .collect();
            layers.push(next);
        }
        Ok(Self { layers })
    }

    pub fn root(&self) -> B256 {
        // from_leaves guarantees a non-empty final layer
        self.layers
            .last()
            .and_then(|l| l.first())
            .copied()
            .unwrap_or(B256::ZERO)
    }

    pub fn len(&self) -> usize {
        self.layers[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers[0].is_empty()
    }

    pub fn proof(&self, leaf: &B256) -> Result<Vec<B256>, MerkleError> {
        let mut index = self.layers[0]
            .binary_search(leaf)
            .map_err(|_| MerkleError::UnknownLeaf(*leaf))?;

        let mut proof = Vec::with_capacity(self.layers.len());
        for layer in &self.layers[..self.layers.len() - 1] {
            let sibling = index ^ 1;
            if let Some(node) = layer.get(sibling) {
                proof.push(*node);
            }
            index /= 2;
        }
        Ok(proof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn leaf(n: u8) -> B256 {
        keccak256([n])
    }

    #[test]
    fn single_leaf_is_its_own_root() {
        let tree = MerkleTree::from_leaves([leaf(1)]).unwrap();
        assert_eq!(tree.root(), leaf(1));
        assert!(tree.proof(&leaf(1)).unwrap().is_empty());
    }

    #[test]
    fn empty_tree_is_rejected() {
        assert_eq!(
            MerkleTree::from_leaves(Vec::new()).unwrap_err(),
            MerkleError::Empty
        );
    }

    #[test]
    fn pair_hash_is_order_independent() {
        assert_eq!(hash_pair(&leaf(1), &leaf(2)), hash_pair(&leaf(2), &leaf(1)));
    }

    #[test]
    fn wrong_root_or_sibling_fails() {
        let tree = MerkleTree::from_leaves((0..5).map(leaf)).unwrap();
        let mut proof = tree.proof(&leaf(3)).unwrap();
        assert!(verify_proof(leaf(3), &proof, tree.root()));
        assert!(!verify_proof(leaf(9), &proof, tree.root()));
        proof[0] = leaf(42);
        assert!(!verify_proof(leaf(3), &proof, tree.root()));
    }

    #[test]
    fn odd_node_is_promoted() {
        let mut leaves: Vec<B256> = (0..3).map(leaf).collect();
        leaves.sort();
        let tree = MerkleTree::from_leaves(leaves.clone()).unwrap();
        let expected = hash_pair(&hash_pair(&leaves[0], &leaves[1]), &leaves[2]);
        assert_eq!(tree.root(), expected);
        assert_eq!(tree.proof(&leaves[2]).unwrap(), vec![hash_pair(&leaves[0], &leaves[1])]);
    }

    #[test]
    fn unknown_leaf_has_no_proof() {
        let tree = MerkleTree::from_leaves((0..3).map(leaf)).unwrap();
        assert_eq!(
            tree.proof(&leaf(7)).unwrap_err(),
            MerkleError::UnknownLeaf(leaf(7))
        );
    }

    proptest! {
        #[test]
        fn every_leaf_proves_against_root(n in 1u8..40) {
            let tree = MerkleTree::from_leaves((0..n).map(leaf)).unwrap();
            prop_assert_eq!(tree.len(), n as usize);
            for i in 0..n {
                let proof = tree.proof(&leaf(i)).unwrap();
                prop_assert!(verify_proof(leaf(i), &proof, tree.root()));
            }
        }
    }
}
