//! Payload type metadata and encapsulation handling

pub mod encapsulation;
pub mod registry;
pub mod rtx;

pub use encapsulation::EncapsulationKind;
pub use registry::{PayloadRegistry, PayloadSpecifics, PayloadTypeRegistry};
pub use rtx::restore_rtx_packet;
