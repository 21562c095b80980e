//! forgehub data model: identifiers, validated names, row structs, commit order.

pub mod ordering;
pub mod records;
pub mod types;

pub use ordering::CommitOrder;
pub use records::*;
pub use types::*;
