// SPDX-License-Identifier: GPL-3.0-only

//! Two-pass connected-component labelling on the 5×5 grid
//!
//! 8-connectivity. The first pass hands out provisional labels, preferring
//! the west, north, north-west and north-east neighbours in that order. A
//! collision sweep records which provisional labels touch, the equivalence
//! relation is closed transitively and compacted, and the second pass
//! rewrites every cell with its final label.

use super::RegionMask;
use crate::constants::grid::{DIM, ITEMS};

/// Enough room for one provisional label per cell plus the background
const MAX_LABELS: usize = ITEMS + 1;

/// Neighbour offsets as (row, col), in first-pass priority order
const PRIOR_NEIGHBOURS: [(isize, isize); 4] = [(0, -1), (-1, 0), (-1, -1), (-1, 1)];

/// Result of labelling a binary mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Labeling {
    /// 0 for background, `1..=count` for foreground, row-major
    pub labels: [u8; ITEMS],
    pub count: usize,
}

impl Labeling {
    /// Number of cells carrying `label`
    pub fn component_size(&self, label: u8) -> u32 {
        self.labels.iter().filter(|&&l| l == label).count() as u32
    }

    /// Total foreground cells
    pub fn foreground_size(&self) -> u32 {
        self.labels.iter().filter(|&&l| l != 0).count() as u32
    }
}

fn neighbour(labels: &[u8; ITEMS], row: usize, col: usize, offset: (isize, isize)) -> u8 {
    let r = row as isize + offset.0;
    let c = col as isize + offset.1;
    if r < 0 || c < 0 || r >= DIM as isize || c >= DIM as isize {
        0
    } else {
        labels[r as usize * DIM + c as usize]
    }
}

/// Label the connected components of a 0/1 mask
pub fn label_components(mask: &RegionMask) -> Labeling {
    let mut labels = [0u8; ITEMS];
    let mut next: u8 = 1;

    for row in 0..DIM {
        for col in 0..DIM {
            let idx = row * DIM + col;
            if mask[idx] == 0 {
                continue;
            }
            let inherited = PRIOR_NEIGHBOURS
                .iter()
                .map(|&offset| neighbour(&labels, row, col, offset))
                .find(|&l| l != 0);
            labels[idx] = match inherited {
                Some(label) => label,
                None => {
                    let label = next;
                    next += 1;
                    label
                }
            };
        }
    }

    let provisional = usize::from(next - 1);
    if provisional == 0 {
        return Labeling::default();
    }

    let mut equivalent = [[false; MAX_LABELS]; MAX_LABELS];
    for (label, row) in equivalent.iter_mut().enumerate().take(provisional + 1).skip(1) {
        row[label] = true;
    }

    for row in 0..DIM {
        for col in 0..DIM {
            let label = usize::from(labels[row * DIM + col]);
            if label == 0 {
                continue;
            }
            for offset in PRIOR_NEIGHBOURS {
                let other = usize::from(neighbour(&labels, row, col, offset));
                if other != 0 && other != label {
                    equivalent[label][other] = true;
                    equivalent[other][label] = true;
                }
            }
        }
    }

    for k in 1..=provisional {
        for i in 1..=provisional {
            if !equivalent[i][k] {
                continue;
            }
            for j in 1..=provisional {
                if equivalent[k][j] {
                    equivalent[i][j] = true;
                }
            }
        }
    }

    let mut reindex = [0u8; MAX_LABELS];
    let mut count: u8 = 0;
    for i in 1..=provisional {
        if reindex[i] != 0 {
            continue;
        }
        count += 1;
        for j in 1..=provisional {
            if equivalent[i][j] {
                reindex[j] = count;
            }
        }
    }

    for label in labels.iter_mut().filter(|l| **l != 0) {
        *label = reindex[usize::from(*label)];
    }

    Labeling {
        labels,
        count: usize::from(count),
    }
}
