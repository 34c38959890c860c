//! Reference-data cache
//!
//! Libraries, locations, and reserve-collection keys fetched from the policy
//! endpoints, refreshed on a 24h TTL, joined with static key classes loaded
//! once from the bundled data files. The resulting table answers the policy
//! predicates used by availability, options, and the circulation workflows.
//! A partial refresh keeps whatever was fetched but collapses the TTL so the
//! next request retries.

pub mod libraries;
pub mod locations;

use std::path::Path;

use chrono::{DateTime, Duration, Utc};

pub use libraries::{lookup_pda_library, LibraryRec};
pub use locations::{LocationRec, IVY_STACKS_LOCATION, MEDIUM_RARE_LOCATION};

use libraries::SirsiLibraryRec;
use locations::{SirsiLocationRec, ONLINE_LOCATIONS, UNAVAILABLE_LOCATIONS};

use crate::ServiceContext;

/// How long a successful refresh is trusted
const POLICY_TTL_HOURS: i64 = 24;

/// Static key classes loaded from the data files, one upper-cased key per line
#[derive(Debug, Clone, Default)]
pub struct StaticPolicyLists {
    pub non_circulating_libraries: Vec<String>,
    pub non_circulating_locations: Vec<String>,
    pub on_shelf_libraries: Vec<String>,
    pub on_shelf_locations: Vec<String>,
    pub no_scan_locations: Vec<String>,
}

impl StaticPolicyLists {
    pub fn is_loaded(&self) -> bool {
        !self.on_shelf_libraries.is_empty() || !self.non_circulating_libraries.is_empty()
    }

    pub fn load(data_dir: &str) -> Self {
        let dir = Path::new(data_dir);
        Self {
            non_circulating_libraries: load_data_file(&dir.join("noncirc-lib.txt")),
            non_circulating_locations: load_data_file(&dir.join("noncirc-loc.txt")),
            on_shelf_libraries: load_data_file(&dir.join("onshelf-lib.txt")),
            on_shelf_locations: load_data_file(&dir.join("onshelf-loc.txt")),
            no_scan_locations: load_data_file(&dir.join("noscan-loc.txt")),
        }
    }
}

/// The in-memory policy table
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    pub libraries: Vec<LibraryRec>,
    pub locations: Vec<LocationRec>,
    pub reserve_locations: Vec<String>,
    pub statics: StaticPolicyLists,
    pub refresh_at: DateTime<Utc>,
}

fn norm(key: &str) -> String {
    key.trim().to_uppercase()
}

fn list_contains(list: &[String], key: &str) -> bool {
    let target = norm(key);
    list.iter().any(|entry| *entry == target)
}

impl PolicyTable {
    pub fn is_stale(&self) -> bool {
        Utc::now() > self.refresh_at
    }

    pub fn find_library(&self, key: &str) -> Option<&LibraryRec> {
        let target = norm(key);
        self.libraries.iter().find(|lib| norm(&lib.key) == target)
    }

    pub fn find_location(&self, key: &str) -> Option<&LocationRec> {
        let target = norm(key);
        self.locations.iter().find(|loc| norm(&loc.key) == target)
    }

    pub fn is_non_circulating_library(&self, key: &str) -> bool {
        list_contains(&self.statics.non_circulating_libraries, key)
    }

    pub fn is_non_circulating_location(&self, key: &str) -> bool {
        list_contains(&self.statics.non_circulating_locations, key)
    }

    pub fn is_on_shelf_library(&self, key: &str) -> bool {
        list_contains(&self.statics.on_shelf_libraries, key)
    }

    pub fn is_on_shelf_location(&self, key: &str) -> bool {
        list_contains(&self.statics.on_shelf_locations, key)
    }

    pub fn is_scannable_location(&self, key: &str) -> bool {
        !list_contains(&self.statics.no_scan_locations, key)
    }

    pub fn is_online_location(&self, key: &str) -> bool {
        let target = norm(key);
        ONLINE_LOCATIONS.contains(&target.as_str())
    }

    pub fn is_unavailable_location(&self, key: &str) -> bool {
        let target = norm(key);
        UNAVAILABLE_LOCATIONS.contains(&target.as_str())
    }

    pub fn is_ivy_stacks(&self, key: &str) -> bool {
        norm(key) == IVY_STACKS_LOCATION
    }

    pub fn is_medium_rare(&self, key: &str) -> bool {
        norm(key) == MEDIUM_RARE_LOCATION
    }

    pub fn is_course_reserve_location(&self, key: &str) -> bool {
        list_contains(&self.reserve_locations, key)
    }

    /// An item is non-circulating when its library or home location says so
    pub fn is_non_circulating(&self, library_key: &str, home_location_key: &str) -> bool {
        self.is_non_circulating_library(library_key)
            || self.is_non_circulating_location(home_location_key)
    }
}

impl ServiceContext {
    /// Rebuild the policy table when its TTL has lapsed. Invoked by the
    /// refresh precondition; cheap when the table is fresh.
    pub async fn refresh_policy_if_stale(&self) {
        {
            let table = self.policy.read().await;
            if !table.is_stale() {
                return;
            }
        }

        let mut table = self.policy.write().await;
        if !table.is_stale() {
            return;
        }

        if !table.statics.is_loaded() {
            tracing::info!("load static policy data from {}", self.config.data_dir);
            table.statics = StaticPolicyLists::load(&self.config.data_dir);
        }
        let statics = table.statics.clone();

        let mut complete = true;

        let libraries = self.fetch_sirsi_libraries(&statics).await;
        match libraries {
            Ok(libs) => table.libraries = libs,
            Err(e) => {
                tracing::error!("get libraries failed: {e}");
                complete = false;
            }
        }

        let locations = self.fetch_sirsi_locations(&statics).await;
        match locations {
            Ok(locs) => table.locations = locs,
            Err(e) => {
                tracing::error!("get locations failed: {e}");
                complete = false;
            }
        }

        let reserves = self.fetch_reserve_locations().await;
        match reserves {
            Ok(keys) => table.reserve_locations = keys,
            Err(e) => {
                tracing::error!("get reserve locations failed: {e}");
                complete = false;
            }
        }

        table.refresh_at = if complete {
            Utc::now() + Duration::hours(POLICY_TTL_HOURS)
        } else {
            // partial refresh; try again on the next request
            Utc::now()
        };
    }

    async fn fetch_sirsi_libraries(
        &self,
        statics: &StaticPolicyLists,
    ) -> Result<Vec<LibraryRec>, crate::error::RequestError> {
        tracing::info!("get sirsi libraries");
        let uri = "/policy/library/simpleQuery?key=*&includeFields=key,policyNumber,description";
        let raw = self.sirsi_get(&self.http_client, uri).await?;
        let parsed: Vec<SirsiLibraryRec> = serde_json::from_slice(&raw)
            .map_err(|e| crate::error::RequestError::internal(format!("unable to parse libraries response: {e}")))?;

        Ok(build_library_records(parsed, statics))
    }

    async fn fetch_sirsi_locations(
        &self,
        statics: &StaticPolicyLists,
    ) -> Result<Vec<LocationRec>, crate::error::RequestError> {
        tracing::info!("get sirsi locations");
        let uri =
            "/policy/location/simpleQuery?key=*&includeFields=key,policyNumber,description,shadowed";
        let raw = self.sirsi_get(&self.http_client, uri).await?;
        let parsed: Vec<SirsiLocationRec> = serde_json::from_slice(&raw)
            .map_err(|e| crate::error::RequestError::internal(format!("unable to parse locations response: {e}")))?;

        Ok(build_location_records(parsed, statics))
    }

    async fn fetch_reserve_locations(&self) -> Result<Vec<String>, crate::error::RequestError> {
        tracing::info!("get sirsi reserve locations");
        let uri = "/policy/reserveCollection/simpleQuery?key=*&includeFields=key,description";
        let raw = self.sirsi_get(&self.http_client, uri).await?;

        #[derive(serde::Deserialize)]
        struct ReserveRec {
            #[serde(default)]
            key: String,
        }
        let parsed: Vec<ReserveRec> = serde_json::from_slice(&raw)
            .map_err(|e| crate::error::RequestError::internal(format!("unable to parse reserve locations response: {e}")))?;

        Ok(parsed.into_iter().map(|r| norm(&r.key)).collect())
    }
}

/// Join the upstream library list with the static key classes, one record
/// per upstream key
pub fn build_library_records(
    parsed: Vec<SirsiLibraryRec>,
    statics: &StaticPolicyLists,
) -> Vec<LibraryRec> {
    parsed
        .into_iter()
        .map(|sl| LibraryRec {
            id: sl.fields.policy_number,
            on_shelf: list_contains(&statics.on_shelf_libraries, &sl.key),
            circulating: !list_contains(&statics.non_circulating_libraries, &sl.key),
            description: sl.fields.description,
            key: sl.key,
        })
        .collect()
}

/// Join the upstream location list with the static key classes, one record
/// per upstream key
pub fn build_location_records(
    parsed: Vec<SirsiLocationRec>,
    statics: &StaticPolicyLists,
) -> Vec<LocationRec> {
    parsed
        .into_iter()
        .map(|sl| LocationRec {
            id: sl.fields.policy_number,
            online: ONLINE_LOCATIONS.contains(&norm(&sl.key).as_str()),
            shadowed: sl.fields.shadowed,
            on_shelf: list_contains(&statics.on_shelf_locations, &sl.key),
            circulating: !list_contains(&statics.non_circulating_locations, &sl.key),
            scannable: !list_contains(&statics.no_scan_locations, &sl.key),
            description: sl.fields.description,
            key: sl.key,
        })
        .collect()
}

fn load_data_file(path: &Path) -> Vec<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => content
            .lines()
            .map(|line| line.trim().to_uppercase())
            .filter(|line| !line.is_empty())
            .collect(),
        Err(e) => {
            tracing::error!("unable to load {}: {e}", path.display());
            Vec::new()
        }
    }
}

/// A hand-built table for logic tests elsewhere in the crate
#[cfg(test)]
pub(crate) fn sample_table() -> PolicyTable {
    PolicyTable {
        libraries: vec![
            LibraryRec {
                id: 1,
                key: "UVA-LIB".into(),
                description: "UVA Library".into(),
                on_shelf: true,
                circulating: true,
            },
            LibraryRec {
                id: 2,
                key: "SPEC-COLL".into(),
                description: "Special Collections".into(),
                on_shelf: false,
                circulating: false,
            },
        ],
        locations: vec![
            LocationRec {
                id: 1,
                key: "STACKS".into(),
                description: "Stacks".into(),
                online: false,
                shadowed: false,
                on_shelf: true,
                circulating: true,
                scannable: true,
            },
            LocationRec {
                id: 2,
                key: "INTERNET".into(),
                description: "Internet".into(),
                online: true,
                shadowed: false,
                on_shelf: false,
                circulating: true,
                scannable: true,
            },
            LocationRec {
                id: 3,
                key: "LOCKEDSTKS".into(),
                description: "Ivy Annex".into(),
                online: false,
                shadowed: false,
                on_shelf: true,
                circulating: true,
                scannable: true,
            },
        ],
        reserve_locations: vec!["RESERVE4H".into()],
        statics: StaticPolicyLists {
            non_circulating_libraries: vec!["SPEC-COLL".into(), "HEALTHSCI".into()],
            non_circulating_locations: vec!["REFERENCE".into(), "HISTCOL".into()],
            on_shelf_libraries: vec!["UVA-LIB".into()],
            on_shelf_locations: vec!["STACKS".into(), "LOCKEDSTKS".into()],
            no_scan_locations: vec!["CURRPER".into()],
        },
        refresh_at: Utc::now() + Duration::hours(1),
    }
}
