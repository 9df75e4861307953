//! Privacy protection for observed identities.
//!
//! Raw aircraft identities never reach persistent storage:
//!
//! - **Anonymization**: [`hash_id`] turns an identity into a short,
//!   irreversible digest used by the audit log and for temporary-ignore keys.
//!
//! - **Ignore lists**: [`IgnoreList`] parses the user-entered list of
//!   identities that should never raise an alert.
//!
//! # Example
//!
//! ```
//! use ridguard::privacy::{hash_id, IgnoreList};
//!
//! let hashed = hash_id(Some("1581F4XYZ"));
//! assert_eq!(hashed.len(), 16);
//!
//! let list = IgnoreList::parse("1581F4XYZ, neighbor-drone\nFA-123");
//! assert!(list.contains("neighbor-DRONE"));
//! ```

mod anonymize;
mod ignore;

pub use anonymize::{hash_id, HASHED_ID_LEN};
pub use ignore::IgnoreList;
