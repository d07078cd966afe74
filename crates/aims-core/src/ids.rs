//! ID prefix constants.
//!
//! Every persisted row gets a `{prefix}-{8 hex}` identifier generated by
//! `AimsDb::generate_id`.

pub const PREFIX_ORGANIZATION: &str = "org";
pub const PREFIX_ACTIVITY: &str = "act";
pub const PREFIX_PARTICIPANT: &str = "prt";
pub const PREFIX_SECTOR: &str = "sec";
pub const PREFIX_LOCATION: &str = "loc";
pub const PREFIX_BUDGET: &str = "bud";
pub const PREFIX_TRANSACTION: &str = "txn";
pub const PREFIX_INDICATOR: &str = "ind";
pub const PREFIX_AUDIT: &str = "aud";
pub const PREFIX_IMPORT: &str = "imp";

/// Every prefix in use, for uniqueness and format tests.
pub const ALL_PREFIXES: &[&str] = &[
    PREFIX_ORGANIZATION,
    PREFIX_ACTIVITY,
    PREFIX_PARTICIPANT,
    PREFIX_SECTOR,
    PREFIX_LOCATION,
    PREFIX_BUDGET,
    PREFIX_TRANSACTION,
    PREFIX_INDICATOR,
    PREFIX_AUDIT,
    PREFIX_IMPORT,
];
