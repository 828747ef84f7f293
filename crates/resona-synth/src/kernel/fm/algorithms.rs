//! The 32 six-operator routing graphs.
//!
//! Operators are numbered 1–6. An edge `6 -> 5` means operator 6's output
//! modulates operator 5's phase. In every graph a modulator has a higher
//! number than its target, so evaluating operators from 6 down to 1 sees
//! each modulator's output for the current sample before it is needed.
//! Feedback loops are modelled as self-modulation of one operator using its
//! previous outputs.

/// Number of operators per voice.
pub const OPERATORS: usize = 6;

/// Number of routing graphs.
pub const ALGORITHM_COUNT: usize = 32;

/// One routing graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Algorithm {
    /// Bit `i` set when operator `i + 1` is summed into the output.
    pub carriers: u8,
    /// `modulators[i]` has bit `j` set when operator `j + 1` modulates operator `i + 1`.
    pub modulators: [u8; OPERATORS],
    /// Zero-based index of the self-modulating operator.
    pub feedback: usize,
}

impl Algorithm {
    /// Whether zero-based operator `op` is a carrier.
    #[inline]
    pub fn is_carrier(&self, op: usize) -> bool {
        self.carriers & (1 << op) != 0
    }

    /// Number of carriers.
    pub fn carrier_count(&self) -> u32 {
        self.carriers.count_ones()
    }

    /// Look up by 1-based id; out-of-range ids clamp to 1..=32.
    pub fn get(id: u8) -> &'static Algorithm {
        let index = (id.clamp(1, ALGORITHM_COUNT as u8) - 1) as usize;
        &ALGORITHMS[index]
    }
}

const fn alg(carriers: &[usize], edges: &[(usize, usize)], feedback: usize) -> Algorithm {
    let mut carrier_mask = 0u8;
    let mut i = 0;
    while i < carriers.len() {
        carrier_mask |= 1 << (carriers[i] - 1);
        i += 1;
    }
    let mut modulators = [0u8; OPERATORS];
    let mut e = 0;
    while e < edges.len() {
        let (from, to) = edges[e];
        modulators[to - 1] |= 1 << (from - 1);
        e += 1;
    }
    Algorithm {
        carriers: carrier_mask,
        modulators,
        feedback: feedback - 1,
    }
}

/// Routing graphs indexed by `id - 1`.
pub static ALGORITHMS: [Algorithm; ALGORITHM_COUNT] = [
    // 1
    alg(&[1, 3], &[(2, 1), (6, 5), (5, 4), (4, 3)], 6),
    alg(&[1, 3], &[(2, 1), (6, 5), (5, 4), (4, 3)], 2),
    alg(&[1, 4], &[(3, 2), (2, 1), (6, 5), (5, 4)], 6),
    alg(&[1, 4], &[(3, 2), (2, 1), (6, 5), (5, 4)], 4),
    // 5
    alg(&[1, 3, 5], &[(2, 1), (4, 3), (6, 5)], 6),
    alg(&[1, 3, 5], &[(2, 1), (4, 3), (6, 5)], 5),
    alg(&[1, 3], &[(2, 1), (4, 3), (5, 3), (6, 5)], 6),
    alg(&[1, 3], &[(2, 1), (4, 3), (5, 3), (6, 5)], 4),
    // 9
    alg(&[1, 3], &[(2, 1), (4, 3), (5, 3), (6, 5)], 2),
    alg(&[1, 4], &[(3, 2), (2, 1), (5, 4), (6, 4)], 3),
    alg(&[1, 4], &[(3, 2), (2, 1), (5, 4), (6, 4)], 6),
    alg(&[1, 3], &[(2, 1), (4, 3), (5, 3), (6, 3)], 2),
    // 13
    alg(&[1, 3], &[(2, 1), (4, 3), (5, 3), (6, 3)], 6),
    alg(&[1, 3], &[(2, 1), (4, 3), (5, 4), (6, 4)], 6),
    alg(&[1, 3], &[(2, 1), (4, 3), (5, 4), (6, 4)], 2),
    alg(&[1], &[(2, 1), (3, 1), (5, 1), (4, 3), (6, 5)], 6),
    // 17
    alg(&[1], &[(2, 1), (3, 1), (5, 1), (4, 3), (6, 5)], 2),
    alg(&[1], &[(2, 1), (3, 1), (4, 1), (5, 4), (6, 5)], 3),
    alg(&[1, 4, 5], &[(3, 2), (2, 1), (6, 4), (6, 5)], 6),
    alg(&[1, 2, 4], &[(3, 1), (3, 2), (5, 4), (6, 4)], 3),
    // 21
    alg(&[1, 2, 4, 5], &[(3, 1), (3, 2), (6, 4), (6, 5)], 3),
    alg(&[1, 3, 4, 5], &[(2, 1), (6, 3), (6, 4), (6, 5)], 6),
    alg(&[1, 2, 4, 5], &[(3, 2), (6, 4), (6, 5)], 6),
    alg(&[1, 2, 3, 4, 5], &[(6, 3), (6, 4), (6, 5)], 6),
    // 25
    alg(&[1, 2, 3, 4, 5], &[(6, 4), (6, 5)], 6),
    alg(&[1, 2, 4], &[(3, 2), (5, 4), (6, 4)], 6),
    alg(&[1, 2, 4], &[(3, 2), (5, 4), (6, 4)], 3),
    alg(&[1, 3, 6], &[(2, 1), (4, 3), (5, 4)], 5),
    // 29
    alg(&[1, 2, 3, 5], &[(4, 3), (6, 5)], 6),
    alg(&[1, 2, 3, 6], &[(4, 3), (5, 4)], 5),
    alg(&[1, 2, 3, 4, 5], &[(6, 5)], 6),
    alg(&[1, 2, 3, 4, 5, 6], &[], 6),
];
