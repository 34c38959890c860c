//! Library policy records

use serde::{Deserialize, Serialize};

/// Library as served to connector clients
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LibraryRec {
    pub id: i64,
    pub key: String,
    pub description: String,
    pub on_shelf: bool,
    pub circulating: bool,
}

/// Wire shape of `/policy/library/simpleQuery`
#[derive(Debug, Deserialize)]
pub struct SirsiLibraryRec {
    #[serde(default)]
    pub key: String,
    pub fields: SirsiLibraryFields,
}

#[derive(Debug, Deserialize)]
pub struct SirsiLibraryFields {
    #[serde(rename = "policyNumber", default)]
    pub policy_number: i64,
    #[serde(default)]
    pub description: String,
}

/// Map a PDA holding code (MARC 949 h) to the owning library key
pub fn lookup_pda_library(pda_code: &str) -> Option<&'static str> {
    match pda_code {
        "SH-PPDA" => Some("SHANNON"),
        "AL-PPDA" => Some("ALD"),
        "AS-PPDA" => Some("ASTRO"),
        "CH-PPDA" => Some("CHEM"),
        "CL-PPDA" => Some("CLEM"),
        "FA-PPDA" => Some("FINE ARTS"),
        "MA-PPDA" => Some("MATH"),
        "MU-PPDA" => Some("MUSIC"),
        "PH-PPDA" => Some("PHYS"),
        "SE-PPDA" => Some("SCIENG"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pda_library_mapping() {
        assert_eq!(lookup_pda_library("CL-PPDA"), Some("CLEM"));
        assert_eq!(lookup_pda_library("FA-PPDA"), Some("FINE ARTS"));
        assert_eq!(lookup_pda_library("XX-PPDA"), None);
    }
}
