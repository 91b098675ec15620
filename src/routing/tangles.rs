//! Crossing counts for chord diagrams.
//!
//! The ends of a corridor are hubs with numbered pins. A junction between two
//! orderings of the same members is a fixed-point-free involution on the pins
//! and its tangle count is the number of chords that must cross.

use serde::Serialize;

use crate::error::OrderError;

/// A permutation of `0..n`, stored as its image.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Permutation(Vec<usize>);

impl Permutation {
    pub fn new(image: Vec<usize>) -> Result<Self, OrderError> {
        let mut seen = vec![false; image.len()];
        for &value in &image {
            match seen.get_mut(value) {
                Some(slot) if !*slot => *slot = true,
                _ => return Err(OrderError::NotAPermutation(image.clone())),
            }
        }
        Ok(Permutation(image))
    }

    /// From the 1-based image notation of the worked examples.
    pub fn from_one_based(image: &[usize]) -> Result<Self, OrderError> {
        if image.contains(&0) {
            return Err(OrderError::NotAPermutation(image.to_vec()));
        }
        Permutation::new(image.iter().map(|value| value - 1).collect())
    }

    pub fn identity(n: usize) -> Self {
        Permutation((0..n).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn image(&self) -> &[usize] {
        &self.0
    }

    pub fn apply(&self, index: usize) -> Option<usize> {
        self.0.get(index).copied()
    }

    pub fn inverse(&self) -> Permutation {
        let mut inverse = vec![0; self.0.len()];
        for (index, &value) in self.0.iter().enumerate() {
            inverse[value] = index;
        }
        Permutation(inverse)
    }

    pub fn is_involution(&self) -> bool {
        self.0.iter().enumerate().all(|(index, &value)| self.0[value] == index)
    }

    pub fn fixed_points(&self) -> usize {
        self.0.iter().enumerate().filter(|(index, value)| index == *value).count()
    }

    pub fn to_one_based(&self) -> Vec<usize> {
        self.0.iter().map(|value| value + 1).collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TangleEvent {
    /// `index` already appeared as the partner of an earlier pin and is pinned to itself.
    Reduced { index: usize, partner: usize },
    /// The chord from `pin` is crossed by the chord from `crossing`.
    Crossing { pin: usize, crossing: usize },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TangleTrace {
    pub count: usize,
    pub events: Vec<TangleEvent>,
}

pub fn count_tangles(permutation: &Permutation) -> usize {
    walk_tangles(permutation.image(), |_| ())
}

/// [`count_tangles`] together with the steps that produced the count.
pub fn trace_tangles(permutation: &Permutation) -> TangleTrace {
    let mut events = Vec::new();
    let count = walk_tangles(permutation.image(), |event| events.push(event));
    TangleTrace { count, events }
}

fn walk_tangles(image: &[usize], mut on_event: impl FnMut(TangleEvent)) -> usize {
    if image.is_empty() {
        return 0;
    }
    // Each chord is counted from its lower pin only.
    let reduced: Vec<usize> = image
        .iter()
        .enumerate()
        .map(|(index, &partner)| {
            if index > partner {
                on_event(TangleEvent::Reduced { index, partner });
                index
            } else {
                partner
            }
        })
        .collect();

    let max_m = reduced.len() - 1;
    let mut tangles = 0;
    let mut i = if reduced[0] < max_m { 0 } else { 1 };
    while i < max_m {
        let m = reduced[i];
        for j in (i + 1)..m {
            if reduced[j] > m {
                on_event(TangleEvent::Crossing { pin: i, crossing: j });
                tangles += 1;
            }
        }
        i += 1;
    }
    tangles
}

/// Chord diagram joining two orderings of the same `k` members. `before[c]`
/// and `after[c]` are member `c`'s positions on either side; pin `before[c]`
/// pairs with pin `2k - 1 - after[c]`, so equal orderings have no crossings.
pub fn junction(before: &[usize], after: &[usize]) -> Result<Permutation, OrderError> {
    if before.len() != after.len() {
        return Err(OrderError::SizeMismatch {
            expected: before.len(),
            found: after.len(),
        });
    }
    Permutation::new(before.to_vec())?;
    Permutation::new(after.to_vec())?;
    let pins = 2 * before.len();
    let mut image = vec![0; pins];
    for (&x, &y) in before.iter().zip(after) {
        let partner = pins - 1 - y;
        image[x] = partner;
        image[partner] = x;
    }
    Ok(Permutation(image))
}

/// Number of crossings between two orderings of the same members.
pub fn junction_tangles(before: &[usize], after: &[usize]) -> Result<usize, OrderError> {
    Ok(count_tangles(&junction(before, after)?))
}

/// All fixed-point-free involutions of `n` pins, in lexicographic order of
/// their images. Empty for odd `n`.
pub fn involutions(n: usize) -> Vec<Permutation> {
    if n % 2 == 1 {
        return Vec::new();
    }
    let mut found = Vec::new();
    let mut image = vec![usize::MAX; n];
    pair_pins(&mut image, &mut found);
    found.sort();
    found
}

fn pair_pins(image: &mut [usize], found: &mut Vec<Permutation>) {
    let Some(first) = image.iter().position(|&partner| partner == usize::MAX) else {
        found.push(Permutation(image.to_vec()));
        return;
    };
    for other in (first + 1)..image.len() {
        if image[other] != usize::MAX {
            continue;
        }
        image[first] = other;
        image[other] = first;
        pair_pins(image, found);
        image[first] = usize::MAX;
        image[other] = usize::MAX;
    }
}

/// Wirings of a branch point whose ports sit between consecutive cables.
/// Port `i` carries `cables[i] + cables[i + 1]` pins (cyclically) and no pin
/// may be wired back into its own port.
pub fn branch(cables: &[usize]) -> Vec<Permutation> {
    if cables.is_empty() {
        return Vec::new();
    }
    let port_pins: Vec<usize> = (0..cables.len())
        .map(|i| cables[i] + cables[(i + 1) % cables.len()])
        .collect();
    let mut port_of = Vec::new();
    for (port, &count) in port_pins.iter().enumerate() {
        port_of.extend(std::iter::repeat(port).take(count));
    }
    involutions(port_of.len())
        .into_iter()
        .filter(|permutation| {
            permutation
                .image()
                .iter()
                .enumerate()
                .all(|(pin, &partner)| port_of[pin] != port_of[partner])
        })
        .collect()
}
