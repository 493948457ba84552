//! Option-chain tools on top of the TWS gateway: contract-ID scraping,
//! market snapshots and account listings.

pub mod account;
pub mod chain;
pub mod conid;
pub mod portfolio;
pub mod snapshot;

pub use account::{download_account, AccountSnapshot, HeldPosition};
pub use chain::{contract_months, instrument_string, month_label, strike_chain};
pub use conid::{ContractIdScraper, ContractRecord, ScrapeReport};
pub use portfolio::{account_details, account_summary, AccountDetails, SummaryLine};
pub use snapshot::{SnapshotRecord, SnapshotReport, SnapshotScraper, SnapshotSinks};
