//! Subnet allocation inside a parent network
//!
//! Blocks are handled as `u64` offsets so the end of `255.255.255.255/32`
//! does not overflow.

use super::AllocationError;
use crate::provider::Inventory;
use ipnet::Ipv4Net;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use tracing::{debug, info};

/// Inclusive address range restricting where a subnet may be placed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateRange {
    pub start: Ipv4Addr,
    pub end: Ipv4Addr,
}

impl CandidateRange {
    pub fn new(start: Ipv4Addr, end: Ipv4Addr) -> Result<Self, AllocationError> {
        if u32::from(start) > u32::from(end) {
            return Err(AllocationError::InvalidRange(format!(
                "{start} is after {end}"
            )));
        }
        Ok(Self { start, end })
    }

    fn bounds(&self) -> (u64, u64) {
        (u32::from(self.start) as u64, u32::from(self.end) as u64 + 1)
    }
}

impl fmt::Display for CandidateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Accepts `a.b.c.d-w.x.y.z` or a CIDR block
impl FromStr for CandidateRange {
    type Err = AllocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(net) = s.parse::<Ipv4Net>() {
            return Self::new(net.network(), net.broadcast());
        }

        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| AllocationError::InvalidRange(format!("expected START-END, got '{s}'")))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<Ipv4Addr>()
                .map_err(|e| AllocationError::InvalidRange(format!("'{}': {e}", part.trim())))
        };
        Self::new(parse(start)?, parse(end)?)
    }
}

fn start_of(net: &Ipv4Net) -> u64 {
    u32::from(net.network()) as u64
}

fn end_of(net: &Ipv4Net) -> u64 {
    u32::from(net.broadcast()) as u64 + 1
}

fn align_up(addr: u64, size: u64) -> u64 {
    addr.div_ceil(size) * size
}

fn block_at(addr: u64, prefix_len: u8) -> Ipv4Net {
    // prefix_len is validated and addr is aligned below 2^32
    Ipv4Net::new_assert(Ipv4Addr::from(addr as u32), prefix_len)
}

/// Pick an unused `/prefix_len` block inside `parent`.
///
/// Without a range, scans `parent` from its first address and returns the
/// lowest aligned block that overlaps nothing in `existing`. With a range,
/// walks aligned blocks inside `range ∩ parent` in ascending order and
/// returns the first free one. Existing blocks outside `parent` are ignored.
pub fn allocate_subnet(
    parent: Ipv4Net,
    existing: &[Ipv4Net],
    prefix_len: u8,
    range: Option<&CandidateRange>,
) -> Result<Ipv4Net, AllocationError> {
    if prefix_len < parent.prefix_len() || prefix_len > 32 {
        return Err(AllocationError::InvalidPrefixLength { parent, prefix_len });
    }
    let parent = parent.trunc();
    let size = 1u64 << (32 - prefix_len);

    let mut taken: Vec<(u64, u64)> = existing
        .iter()
        .map(Ipv4Net::trunc)
        .filter(|net| parent.contains(net) || net.contains(&parent))
        .map(|net| (start_of(&net), end_of(&net)))
        .collect();
    taken.sort_unstable();

    let found = match range {
        None => gap_scan(&taken, start_of(&parent), end_of(&parent), size),
        Some(range) => {
            let (lo, hi) = range.bounds();
            range_scan(
                &taken,
                lo.max(start_of(&parent)),
                hi.min(end_of(&parent)),
                size,
            )
        }
    };

    match found {
        Some(addr) => Ok(block_at(addr, prefix_len)),
        None => Err(AllocationError::NoSpaceAvailable { parent, prefix_len }),
    }
}

/// Lowest aligned gap of `size` in `[lo, hi)`; `taken` sorted by start
fn gap_scan(taken: &[(u64, u64)], lo: u64, hi: u64, size: u64) -> Option<u64> {
    let mut cursor = lo;
    for &(start, end) in taken {
        let candidate = align_up(cursor, size);
        if candidate + size <= start {
            break;
        }
        cursor = cursor.max(end);
    }
    let candidate = align_up(cursor, size);
    (candidate + size <= hi).then_some(candidate)
}

fn range_scan(taken: &[(u64, u64)], lo: u64, hi: u64, size: u64) -> Option<u64> {
    let mut candidate = align_up(lo, size);
    while candidate + size <= hi {
        let clash = taken
            .iter()
            .find(|&&(start, end)| start < candidate + size && candidate < end);
        match clash {
            None => return Some(candidate),
            // Every aligned block before `end` overlaps the same clash
            Some(&(_, end)) => candidate = align_up(end.max(candidate + size), size),
        }
    }
    None
}

/// Allocates subnets against the live subnets of a network
pub struct SubnetPlanner<'a, I> {
    inventory: &'a I,
}

impl<'a, I: Inventory> SubnetPlanner<'a, I> {
    pub fn new(inventory: &'a I) -> Self {
        Self { inventory }
    }

    /// Next free `/prefix_len` block in `network_id`.
    ///
    /// The result is only reserved once the caller creates a subnet with it.
    pub async fn allocate(
        &self,
        network_id: &str,
        prefix_len: u8,
        range: Option<&CandidateRange>,
    ) -> Result<Ipv4Net, AllocationError> {
        let (parent, existing) = tokio::try_join!(
            self.inventory.network_block(network_id),
            self.inventory.list_network_subnets(network_id),
        )?;
        debug!(
            network = %network_id,
            parent = %parent,
            existing = existing.len(),
            "Read network address space"
        );

        let block = allocate_subnet(parent, &existing, prefix_len, range)?;
        info!(network = %network_id, block = %block, "Allocated subnet");
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn net(s: &str) -> Ipv4Net {
        s.parse().unwrap()
    }

    fn nets(list: &[&str]) -> Vec<Ipv4Net> {
        list.iter().map(|s| net(s)).collect()
    }

    #[test]
    fn empty_parent_yields_first_block() {
        let got = allocate_subnet(net("10.0.0.0/16"), &[], 24, None).unwrap();
        assert_eq!(got, net("10.0.0.0/24"));
    }

    #[test]
    fn follows_last_used_block() {
        let existing = nets(&["10.0.0.0/24"]);
        let got = allocate_subnet(net("10.0.0.0/16"), &existing, 24, None).unwrap();
        assert_eq!(got, net("10.0.1.0/24"));
    }

    #[test]
    fn reuses_first_gap() {
        let existing = nets(&["10.0.2.0/24", "10.0.0.0/24"]);
        let got = allocate_subnet(net("10.0.0.0/16"), &existing, 24, None).unwrap();
        assert_eq!(got, net("10.0.1.0/24"));
    }

    #[test]
    fn snaps_to_next_boundary() {
        let existing = nets(&["10.0.0.0/26"]);
        let got = allocate_subnet(net("10.0.0.0/16"), &existing, 24, None).unwrap();
        assert_eq!(got, net("10.0.1.0/24"));

        let existing = nets(&["10.0.1.0/24"]);
        let got = allocate_subnet(net("10.0.0.0/16"), &existing, 23, None).unwrap();
        assert_eq!(got, net("10.0.2.0/23"));
    }

    #[test]
    fn smaller_block_fills_hole_before_larger_one() {
        let existing = nets(&["10.0.0.0/25", "10.0.1.0/24"]);
        let got = allocate_subnet(net("10.0.0.0/16"), &existing, 25, None).unwrap();
        assert_eq!(got, net("10.0.0.128/25"));
    }

    #[test]
    fn blocks_outside_parent_are_ignored() {
        let existing = nets(&["192.168.0.0/24", "10.1.0.0/24"]);
        let got = allocate_subnet(net("10.0.0.0/16"), &existing, 24, None).unwrap();
        assert_eq!(got, net("10.0.0.0/24"));
    }

    #[test]
    fn full_parent_is_no_space() {
        let existing = nets(&["10.0.0.0/25", "10.0.0.128/25"]);
        let err = allocate_subnet(net("10.0.0.0/24"), &existing, 26, None).unwrap_err();
        assert_eq!(
            err,
            AllocationError::NoSpaceAvailable {
                parent: net("10.0.0.0/24"),
                prefix_len: 26
            }
        );
    }

    #[test]
    fn top_of_address_space_does_not_overflow() {
        let parent = net("255.255.255.0/24");
        let existing = nets(&["255.255.255.0/25"]);
        let got = allocate_subnet(parent, &existing, 25, None).unwrap();
        assert_eq!(got, net("255.255.255.128/25"));

        let existing = nets(&["255.255.255.0/25", "255.255.255.128/25"]);
        assert!(allocate_subnet(parent, &existing, 25, None).is_err());
    }

    #[test]
    fn rejects_invalid_prefix_lengths() {
        let parent = net("10.0.0.0/16");
        for prefix_len in [8, 15, 33] {
            assert_eq!(
                allocate_subnet(parent, &[], prefix_len, None),
                Err(AllocationError::InvalidPrefixLength { parent, prefix_len })
            );
        }
        assert_eq!(
            allocate_subnet(parent, &[], 16, None).unwrap(),
            parent,
            "whole parent is a valid block when nothing is used"
        );
    }

    #[test]
    fn range_returns_single_remaining_block() {
        let range: CandidateRange = "10.0.4.0-10.0.7.255".parse().unwrap();
        let existing = nets(&["10.0.4.0/24", "10.0.5.0/24", "10.0.7.0/24"]);
        let got = allocate_subnet(net("10.0.0.0/16"), &existing, 24, Some(&range)).unwrap();
        assert_eq!(got, net("10.0.6.0/24"));
    }

    #[test]
    fn range_skips_coarser_existing_block() {
        let range: CandidateRange = "10.0.0.0-10.0.3.255".parse().unwrap();
        let existing = nets(&["10.0.0.0/23"]);
        let got = allocate_subnet(net("10.0.0.0/16"), &existing, 24, Some(&range)).unwrap();
        assert_eq!(got, net("10.0.2.0/24"));
    }

    #[test]
    fn exhausted_range_is_no_space() {
        let range: CandidateRange = "10.0.4.0/23".parse().unwrap();
        let existing = nets(&["10.0.4.0/24", "10.0.5.0/24"]);
        let err = allocate_subnet(net("10.0.0.0/16"), &existing, 24, Some(&range)).unwrap_err();
        assert!(matches!(err, AllocationError::NoSpaceAvailable { .. }));
    }

    #[test]
    fn range_outside_parent_is_no_space() {
        let range: CandidateRange = "10.1.0.0-10.1.255.255".parse().unwrap();
        let err = allocate_subnet(net("10.0.0.0/16"), &[], 24, Some(&range)).unwrap_err();
        assert!(matches!(err, AllocationError::NoSpaceAvailable { .. }));
    }

    #[test]
    fn parses_candidate_ranges() {
        let range: CandidateRange = " 10.0.0.0 - 10.0.0.255 ".parse().unwrap();
        assert_eq!(range.to_string(), "10.0.0.0-10.0.0.255");

        let from_cidr: CandidateRange = "10.0.0.0/24".parse().unwrap();
        assert_eq!(range, from_cidr);

        assert!(matches!(
            "10.0.1.0-10.0.0.0".parse::<CandidateRange>(),
            Err(AllocationError::InvalidRange(_))
        ));
        assert!("10.0.0.0".parse::<CandidateRange>().is_err());
        assert!("10.0.0.0-banana".parse::<CandidateRange>().is_err());
    }

    /// Non-overlapping blocks inside 10.0.0.0/16, built greedily from raw picks
    fn disjoint_blocks() -> impl Strategy<Value = Vec<Ipv4Net>> {
        prop::collection::vec((0u32..65536, 18u8..=28), 0..24).prop_map(|picks| {
            let mut out: Vec<Ipv4Net> = Vec::new();
            for (offset, prefix_len) in picks {
                let addr = Ipv4Addr::from(u32::from(Ipv4Addr::new(10, 0, 0, 0)) + offset);
                let block = Ipv4Net::new(addr, prefix_len).unwrap().trunc();
                if !out.iter().any(|b| b.contains(&block) || block.contains(b)) {
                    out.push(block);
                }
            }
            out
        })
    }

    fn overlaps(a: &Ipv4Net, b: &Ipv4Net) -> bool {
        a.contains(b) || b.contains(a)
    }

    proptest! {
        #[test]
        fn result_is_inside_parent_and_disjoint(
            existing in disjoint_blocks(),
            prefix_len in 16u8..=28,
        ) {
            let parent = net("10.0.0.0/16");
            if let Ok(block) = allocate_subnet(parent, &existing, prefix_len, None) {
                prop_assert_eq!(block.prefix_len(), prefix_len);
                prop_assert!(parent.contains(&block));
                for used in &existing {
                    prop_assert!(!overlaps(used, &block), "{} overlaps {}", block, used);
                }
            }
        }

        #[test]
        fn repeated_allocation_exhausts_without_overlap(
            existing in disjoint_blocks(),
            prefix_len in 20u8..=24,
        ) {
            let parent = net("10.0.0.0/16");
            let mut used = existing;
            let max_blocks = 1usize << (prefix_len - 16);

            for _ in 0..=max_blocks {
                match allocate_subnet(parent, &used, prefix_len, None) {
                    Ok(block) => {
                        for other in &used {
                            prop_assert!(!overlaps(other, &block));
                        }
                        used.push(block);
                    }
                    Err(err) => {
                        let no_space = matches!(err, AllocationError::NoSpaceAvailable { .. });
                        prop_assert!(no_space);
                        // Every aligned block now overlaps something
                        for candidate in parent.subnets(prefix_len).unwrap() {
                            prop_assert!(used.iter().any(|u| overlaps(u, &candidate)));
                        }
                        return Ok(());
                    }
                }
            }
            prop_assert!(false, "allocation never reported exhaustion");
        }

        #[test]
        fn range_with_one_free_block_returns_it(
            blocks in 1usize..16,
            free_pick in any::<prop::sample::Index>(),
        ) {
            let parent = net("10.0.0.0/16");
            let all: Vec<Ipv4Net> = net("10.0.32.0/20").subnets(24).unwrap().take(blocks).collect();
            let free = all[free_pick.index(blocks)];
            let existing: Vec<Ipv4Net> = all.iter().copied().filter(|b| *b != free).collect();
            let range = CandidateRange::new(all[0].network(), all[blocks - 1].broadcast()).unwrap();

            prop_assert_eq!(allocate_subnet(parent, &existing, 24, Some(&range)), Ok(free));
        }
    }
}
