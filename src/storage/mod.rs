//! Storage and persistence layer
//!
//! - Account records
//! - Ledger file on disk
//! - The account ledger itself

mod file_system;
mod ledger;
mod models;

pub use file_system::LedgerFile;
pub use ledger::AccountLedger;
pub use models::{Account, LedgerDocument, NewAccount, LEDGER_VERSION};
