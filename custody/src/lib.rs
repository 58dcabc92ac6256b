//! Custodial mint/burn authority.
//!
//! Off-chain custodians jointly authorize issuance (and redemption) of the
//! wrapped token. A merchant or custodian opens a request; distinct
//! custodians confirm it; the confirmation that brings the confirming set up
//! to the quorum threshold executes the ledger mint or burn in the same
//! atomic commit that marks the request executed.

pub mod authority;
pub mod error;
pub mod event;
pub mod registry;
pub mod request;

pub use authority::{AuthorityConfig, ConfirmOutcome, CustodyAuthority, QuorumPolicy};
pub use error::CustodyError;
pub use event::CustodyEvent;
pub use registry::{Custodian, CustodianSeed, Registry};
pub use request::{CustodyRequest, ReleaseInstruction, RequestKind, RequestStatus};
