//! Location policy records and fixed location classes

use serde::{Deserialize, Serialize};

/// Location as served to connector clients
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocationRec {
    pub id: i64,
    pub key: String,
    pub description: String,
    pub online: bool,
    pub shadowed: bool,
    pub on_shelf: bool,
    pub circulating: bool,
    pub scannable: bool,
}

/// Wire shape of `/policy/location/simpleQuery`
#[derive(Debug, Deserialize)]
pub struct SirsiLocationRec {
    #[serde(default)]
    pub key: String,
    pub fields: SirsiLocationFields,
}

#[derive(Debug, Deserialize)]
pub struct SirsiLocationFields {
    #[serde(rename = "policyNumber", default)]
    pub policy_number: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub shadowed: bool,
}

/// Current locations that mean the item is electronic, not on a shelf
pub const ONLINE_LOCATIONS: &[&str] = &["INTERNET", "NOTOREPDA"];

/// Current locations that mean the item cannot be supplied at all
pub const UNAVAILABLE_LOCATIONS: &[&str] = &[
    "LOST",
    "UNKNOWN",
    "MISSING",
    "DISCARD",
    "WITHDRAWN",
    "BARRED",
    "BURSARED",
    "ORD-CANCLD",
    "HEREDOC",
];

/// Off-site storage; retrieval takes a fixed lead time
pub const IVY_STACKS_LOCATION: &str = "SC-IVY";

/// Reading-room-only home location
pub const MEDIUM_RARE_LOCATION: &str = "LOCKEDSTKS";
