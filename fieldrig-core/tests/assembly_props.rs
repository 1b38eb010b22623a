//! Property checks of block-sparse merging.

use fieldrig_core::sparse::{BlockCrsMatrix, BlockPattern};
use proptest::prelude::*;

const NBLK: usize = 6;
const LEN: usize = 2;

/// Element connectivity (distinct nodes) with a matching element matrix.
fn arb_element() -> impl Strategy<Value = (Vec<usize>, Vec<f64>)> {
    proptest::sample::subsequence((0..NBLK).collect::<Vec<_>>(), 1..=3)
        .prop_shuffle()
        .prop_flat_map(|nodes| {
            let n = nodes.len() * LEN;
            (Just(nodes), proptest::collection::vec(-10.0f64..10.0, n * n))
        })
}

fn assemble(elements: &[(Vec<usize>, Vec<f64>)]) -> BlockCrsMatrix {
    let mut pattern = BlockPattern::new(NBLK);
    for (nodes, _) in elements {
        pattern.add_element(nodes, nodes);
    }
    let mut m = BlockCrsMatrix::new(NBLK, NBLK, LEN, LEN);
    m.add_pattern(&pattern).unwrap();
    for (nodes, emat) in elements {
        m.mearge(nodes, nodes, emat).unwrap();
    }
    m
}

proptest! {
    #[test]
    fn mearge_is_order_independent(elements in proptest::collection::vec(arb_element(), 1..8)) {
        let forward = assemble(&elements);
        let reversed: Vec<_> = elements.iter().rev().cloned().collect();
        let backward = assemble(&reversed);
        for i in 0..NBLK {
            for j in 0..NBLK {
                for idof in 0..LEN {
                    for jdof in 0..LEN {
                        let (a, b) = (forward.get(i, j, idof, jdof), backward.get(i, j, idof, jdof));
                        prop_assert!((a - b).abs() <= 1e-12 * (1.0 + a.abs()), "({i},{j}) {a} vs {b}");
                    }
                }
            }
        }
    }

    #[test]
    fn mat_vec_is_linear_in_merged_values(
        elements in proptest::collection::vec(arb_element(), 1..6),
        x in proptest::collection::vec(-1.0f64..1.0, NBLK * LEN),
    ) {
        // merging every element twice doubles the product
        let once = assemble(&elements);
        let doubled: Vec<_> = elements.iter().chain(elements.iter()).cloned().collect();
        let twice = assemble(&doubled);
        let mut y1 = vec![0.0; NBLK * LEN];
        let mut y2 = vec![0.0; NBLK * LEN];
        once.mat_vec(2.0, &x, &mut y1);
        twice.mat_vec(1.0, &x, &mut y2);
        for (a, b) in y1.iter().zip(&y2) {
            prop_assert!((a - b).abs() <= 1e-10 * (1.0 + a.abs()));
        }
    }
}
