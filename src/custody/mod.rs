//! Custody collaborators: which addresses are ours and how to sign for them.
//!
//! # Data Flow
//! ```text
//! [[addresses]] config
//!     → addresses.rs (AddressBook: role, status, owner per address)
//!     → keys.rs (EnvKeyCustody: key_env → SigningKey, verified)
//!
//! scanner     → AddressInventory::list_managed_addresses (relevance filter)
//! collection  → AddressInventory (hot addresses) + KeyCustody (signing)
//! ```
//!
//! Address generation (HD derivation) is an external concern; the inventory
//! only reflects what has already been provisioned.

pub mod addresses;
pub mod keys;

pub use addresses::{AddressBook, AddressInventory, AddressRole, AddressStatus, ManagedAddress};
pub use keys::{CustodyError, EnvKeyCustody, KeyCustody, StaticKeyCustody};
