//! Resilient-connect strategy ladder.

use pn_rpc::{ExpectedModuleEntry, RecoveryAction};
use pn_types::{Slot, SlotDirection, StationName};

/// One rung of the resilient-connect ladder, attempted in this order until
/// one succeeds or the attempt budget is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Strategy {
    /// Station name exactly as configured, full expected-module list.
    Standard,
    /// Station name lowercased.
    Lowercase,
    /// Station name uppercased.
    Uppercase,
    /// Dashes removed from the station name.
    NoDash,
    /// Only the DAP in the expected-module list.
    MinimalConfig,
    /// DAP with no IOCRs at all.
    DapOnly,
}

/// The full ladder, in attempt order.
pub const LADDER: [Strategy; 6] = [
    Strategy::Standard,
    Strategy::Lowercase,
    Strategy::Uppercase,
    Strategy::NoDash,
    Strategy::MinimalConfig,
    Strategy::DapOnly,
];

impl Strategy {
    /// Index of this strategy within [`LADDER`].
    pub fn rung(&self) -> usize {
        LADDER.iter().position(|s| s == self).expect("exhaustive ladder")
    }

    /// The strategy one rung further down the ladder, or `None` past the
    /// end.
    pub fn next_rung(&self) -> Option<Strategy> {
        LADDER.get(self.rung() + 1).copied()
    }
}

/// Apply a strategy's station-name transform to the configured name.
pub fn apply_name(strategy: Strategy, configured: &StationName) -> StationName {
    match strategy {
        Strategy::Standard => configured.clone(),
        Strategy::Lowercase => configured.to_lowercase(),
        Strategy::Uppercase => configured.to_uppercase(),
        Strategy::NoDash => configured.without_dashes(),
        Strategy::MinimalConfig | Strategy::DapOnly => configured.clone(),
    }
}

/// Build the expected-module list for a strategy from the AR's full slot
/// profile.
///
/// `MinimalConfig` keeps only the DAP; `DapOnly` also keeps only the DAP (the
/// difference between the two is that `DapOnly` additionally omits IOCRs,
/// handled by the caller when building the Connect Request).
pub fn build_expected_modules(strategy: Strategy, slots: &[Slot]) -> Vec<ExpectedModuleEntry> {
    match strategy {
        Strategy::Standard | Strategy::Lowercase | Strategy::Uppercase | Strategy::NoDash => slots
            .iter()
            .map(|s| ExpectedModuleEntry {
                slot: s.id,
                module_ident: s.module_ident,
                submodule_ident: s.submodule_ident,
                data_length: s.data_length,
                direction: s.direction,
            })
            .collect(),
        Strategy::MinimalConfig | Strategy::DapOnly => slots
            .iter()
            .filter(|s| s.id.is_dap())
            .map(|s| ExpectedModuleEntry {
                slot: s.id,
                module_ident: s.module_ident,
                submodule_ident: s.submodule_ident,
                data_length: s.data_length,
                direction: s.direction,
            })
            .collect(),
    }
}

/// True if this strategy should include non-DAP IOCRs at all.
pub fn includes_iocrs(strategy: Strategy) -> bool {
    !matches!(strategy, Strategy::DapOnly)
}

/// Cyclic slots only: excludes the DAP and any other `data_length == 0`
/// slot from per-IOCR `IODataObject`/`IOCS` mappings.
pub fn cyclic_slots(slots: &[Slot]) -> impl Iterator<Item = &Slot> {
    slots.iter().filter(|s| !s.is_acyclic())
}

/// Count of cyclic input/output slots, used to size IOCR payload lengths.
pub fn payload_length_for(slots: &[Slot], direction: SlotDirection) -> u16 {
    cyclic_slots(slots)
        .filter(|s| s.direction == direction)
        .map(|s| s.data_length)
        .sum()
}

/// Number of cyclic submodules carried by an IOCR in the given direction,
/// i.e. the number of IOPS bytes that IOCR's frames must carry (one per
/// submodule).
pub fn submodule_count_for(slots: &[Slot], direction: SlotDirection) -> u16 {
    cyclic_slots(slots).filter(|s| s.direction == direction).count() as u16
}

/// Promote to the strategy a PNIO-CM error recommends: when a response's
/// error code suggests a specific remedy, move to the matching strategy
/// slot. Returns `None` when the recovery action implies no strategy
/// change (e.g. a transient busy condition retried as-is).
pub fn promote(current: Strategy, action: RecoveryAction) -> Option<Strategy> {
    match action {
        RecoveryAction::RetryWithNameVariation => {
            if current.rung() < Strategy::Lowercase.rung() {
                Some(Strategy::Lowercase)
            } else {
                current.next_rung()
            }
        }
        RecoveryAction::ReduceConfiguration => Some(Strategy::MinimalConfig),
        RecoveryAction::BackoffAndRetry | RecoveryAction::None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_variations_match_ladder_order() {
        let name = StationName::new("RTU-Tank-1").unwrap();
        assert_eq!(apply_name(Strategy::Standard, &name).as_str(), "RTU-Tank-1");
        assert_eq!(apply_name(Strategy::Lowercase, &name).as_str(), "rtu-tank-1");
        assert_eq!(apply_name(Strategy::Uppercase, &name).as_str(), "RTU-TANK-1");
        assert_eq!(apply_name(Strategy::NoDash, &name).as_str(), "RTUTank1");
    }

    #[test]
    fn name_variation_error_promotes_from_standard_to_lowercase() {
        let next = promote(Strategy::Standard, RecoveryAction::RetryWithNameVariation);
        assert_eq!(next, Some(Strategy::Lowercase));
    }

    #[test]
    fn block_length_error_promotes_to_minimal_config() {
        let next = promote(Strategy::Uppercase, RecoveryAction::ReduceConfiguration);
        assert_eq!(next, Some(Strategy::MinimalConfig));
    }

    #[test]
    fn dap_only_excludes_iocrs() {
        assert!(!includes_iocrs(Strategy::DapOnly));
        assert!(includes_iocrs(Strategy::MinimalConfig));
    }
}
