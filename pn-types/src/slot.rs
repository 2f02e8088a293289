//! Slot classification: a (slot, subslot) pair, its module
//! identifiers, cyclic payload length, and I/O direction.

/// A (slot, subslot) address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct SlotId {
    /// Slot number.
    pub slot: u16,
    /// Subslot number.
    pub subslot: u16,
}

impl SlotId {
    /// Construct a slot id.
    pub const fn new(slot: u16, subslot: u16) -> Self {
        Self { slot, subslot }
    }

    /// The Device Access Point: slot 0, subslot 1.
    pub const DAP: SlotId = SlotId::new(crate::constants::DAP_SLOT, crate::constants::DAP_SUBSLOT);

    /// True if this is the Device Access Point.
    pub fn is_dap(&self) -> bool {
        *self == Self::DAP
    }
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.slot, self.subslot)
    }
}

/// Cyclic data direction, from the controller's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SlotDirection {
    /// Device → controller (a sensor).
    Input,
    /// Controller → device (an actuator).
    Output,
}

/// A configured slot: identity, module identifiers, cyclic length, and
/// direction.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Slot {
    /// (slot, subslot) address.
    pub id: SlotId,
    /// Module identifier, drawn from the vendor GSDML table.
    pub module_ident: u32,
    /// Submodule identifier, drawn from the vendor GSDML table.
    pub submodule_ident: u32,
    /// Expected cyclic payload length in bytes (0 for the DAP).
    pub data_length: u16,
    /// Input or output.
    pub direction: SlotDirection,
    /// Free-form measurement or actuator type tag (e.g. "level", "pump").
    pub type_tag: String,
}

impl Slot {
    /// True if this slot carries no cyclic payload (the DAP is always such
    /// a slot).
    pub fn is_acyclic(&self) -> bool {
        self.data_length == 0
    }
}
