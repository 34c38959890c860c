//! Request-options derivation
//!
//! Turns the availability item list, the caller's claims, the MARC record,
//! and the index document into the menu of request options: hold, scan,
//! video reserve, Aeon, patron-driven acquisition, streaming reserve, and
//! the health-sciences direct scan link. Every barcode listed under an
//! option resolves to exactly one entry in the flat items list.

use std::collections::BTreeMap;

use regex::Regex;
use serde::Serialize;
use url::Url;

use crate::availability::model::{strip_copy_suffix, AvailItem};
use crate::marc::MarcRecord;
use crate::middleware::VirgoClaims;
use crate::policy::{lookup_pda_library, PolicyTable};
use crate::solr::SolrDocument;
use crate::ServiceContext;

pub const OPT_HOLD: &str = "hold";
pub const OPT_SCAN: &str = "scan";
pub const OPT_VIDEO_RESERVE: &str = "videoReserve";
pub const OPT_AEON: &str = "aeon";
pub const OPT_PDA: &str = "pda";
pub const OPT_DIRECT_LINK: &str = "directLink";
pub const OPT_STREAMING_RESERVE: &str = "streamingReserve";

/// Profiles that can never request scans
const NO_SCAN_PROFILES: &[&str] = &["VABORROWER", "OTHERVAFAC", "ALUMNI", "RESEARCHER"];

/// Home locations whose presence blocks scanning for the whole title
const RARE_HOME_LOCATIONS: &[&str] = &["HISTCOL", "RARESHL", "RAREOVS", "RAREVLT"];

const SPECIAL_COLLECTIONS_LIBRARY: &str = "SPEC-COLL";
const HEALTH_SCIENCES_LIBRARY: &str = "HEALTHSCI";
const BY_REQUEST_LOCATION: &str = "BY-REQUEST";
const AVAILABLE_TO_ORDER: &str = "Available to Order";

const MAX_SC_NOTES_LEN: usize = 700;
const MAX_AEON_DESC_LEN: usize = 100;

/// One requestable option in the client-facing menu
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionRec {
    pub sign_in_required: bool,
    pub item_barcodes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_url: Option<String>,
}

impl OptionRec {
    fn new(sign_in_required: bool) -> Self {
        Self {
            sign_in_required,
            item_barcodes: Vec::new(),
            create_url: None,
        }
    }
}

/// Client-facing projection of a requestable item
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldableItem {
    pub barcode: String,
    pub call_number: String,
    pub library: String,
    pub location: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub notice: String,
    #[serde(rename = "scNotes", skip_serializing_if = "String::is_empty")]
    pub sc_notes: String,
}

/// The derived menu plus the flat list the options point into
#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestOptions {
    pub options: BTreeMap<String, OptionRec>,
    pub items: Vec<HoldableItem>,
}

impl RequestOptions {
    fn option_mut(&mut self, key: &str, sign_in_required: bool) -> &mut OptionRec {
        self.options
            .entry(key.to_string())
            .or_insert_with(|| OptionRec::new(sign_in_required))
    }
}

/// Convert an availability record to its holdable projection. Special
/// collections copies are each unique and keep their copy designation;
/// everywhere else the copy suffix is noise. An SC item whose current
/// location is Ivy stacks reports the home location instead.
pub fn to_holdable_item(policy: &PolicyTable, item: &AvailItem) -> HoldableItem {
    let in_special_collections = item.library_id == SPECIAL_COLLECTIONS_LIBRARY;
    let call_number = if in_special_collections {
        item.call_number.clone()
    } else {
        strip_copy_suffix(&item.call_number)
    };

    let location = if in_special_collections && policy.is_ivy_stacks(&item.current_location_id) {
        policy
            .find_location(&item.home_location_id)
            .map(|l| l.description.clone())
            .unwrap_or_else(|| item.current_location.clone())
    } else {
        item.current_location.clone()
    };

    HoldableItem {
        barcode: item.barcode.clone(),
        call_number,
        library: item.library.clone(),
        location,
        notice: item.notice.clone(),
        sc_notes: item.sc_location.clone(),
    }
}

/// Two holdable candidates collide when their call-number labels match
/// case-insensitively. A candidate with no volume designation also collides
/// with any existing holdable: volumeless copies are interchangeable from a
/// request point of view, so only the first is listed.
pub fn holdable_exists(candidate: &HoldableItem, volume: &str, existing: &[HoldableItem]) -> bool {
    let found = existing
        .iter()
        .any(|hi| hi.call_number.eq_ignore_ascii_case(&candidate.call_number));
    if !found {
        return volume.is_empty() && !existing.is_empty();
    }
    found
}

/// Derive the option menu from the availability items. The PDA candidate (a
/// copy sitting at "Available to Order") is returned for the caller to
/// resolve against the acquisition service; everything else is decided here.
pub fn derive_request_options(
    policy: &PolicyTable,
    claims: &VirgoClaims,
    items: &[AvailItem],
) -> (RequestOptions, Option<AvailItem>) {
    tracing::info!(
        "generate request options for {} items, profile [{}] home library [{}]",
        items.len(),
        claims.profile,
        claims.home_library
    );

    let mut out = RequestOptions::default();
    out.option_mut(OPT_HOLD, true);
    out.option_mut(OPT_SCAN, true);
    out.option_mut(OPT_VIDEO_RESERVE, true);
    out.option_mut(OPT_AEON, false);

    let profile = claims.profile.to_uppercase();
    let mut no_scans = NO_SCAN_PROFILES.contains(&profile.as_str())
        || claims.home_library == HEALTH_SCIENCES_LIBRARY;
    if no_scans {
        tracing::info!(
            "user {} with profile [{}] and home library [{}] is not able to request scans",
            claims.user_id,
            claims.profile,
            claims.home_library
        );
    }

    // a rare-materials home location anywhere in the title blocks scanning
    // for every copy; decide up front so item order cannot matter
    let rare_block = items.iter().any(|item| {
        !item.unavailable
            && !item.is_video
            && item.library_id != SPECIAL_COLLECTIONS_LIBRARY
            && RARE_HOME_LOCATIONS.contains(&item.home_location_id.as_str())
    });
    if rare_block {
        tracing::info!("a rare-materials home location blocks this title from being scanned");
        no_scans = true;
        out.options.remove(OPT_SCAN);
    }

    let pda_candidate = items
        .iter()
        .find(|item| item.current_location == AVAILABLE_TO_ORDER)
        .cloned();

    for item in items {
        if item.unavailable {
            continue;
        }

        let mut holdable = to_holdable_item(policy, item);
        if policy.is_medium_rare(&item.home_location_id) {
            holdable.call_number += " (Ivy limited circulation)";
        }

        // scans first; some non-circulating items are still scannable
        let mut item_just_added = false;
        if !no_scans
            && !item.is_video
            && item.library_id != SPECIAL_COLLECTIONS_LIBRARY
            && policy.is_scannable_location(&item.home_location_id)
        {
            if profile == "UNDERGRAD" && item.home_location_id != BY_REQUEST_LOCATION {
                // undergraduates may only request scans of closed-stack items
                tracing::info!(
                    "undergraduate user {} cannot make scan requests for items in {}",
                    claims.user_id,
                    item.home_location_id
                );
            } else if !holdable_exists(&holdable, &item.volume, &out.items) {
                item_just_added = true;
                out.items.push(holdable.clone());
                out.option_mut(OPT_SCAN, true).item_barcodes.push(item.barcode.clone());
            }
        }

        // non-circulating items are not holdable; this also keeps special
        // collections out of the hold list
        if policy.is_non_circulating(&item.library_id, &item.home_location_id) {
            continue;
        }

        if item_just_added || !holdable_exists(&holdable, &item.volume, &out.items) {
            if !item_just_added {
                out.items.push(holdable);
            }
            out.option_mut(OPT_HOLD, true).item_barcodes.push(item.barcode.clone());
            if item.is_video {
                out.option_mut(OPT_VIDEO_RESERVE, true)
                    .item_barcodes
                    .push(item.barcode.clone());
            }
        }
    }

    // an empty item list means nothing is requestable; drop the seeds
    if out.items.is_empty() {
        out.options.remove(OPT_HOLD);
        out.options.remove(OPT_SCAN);
        out.options.remove(OPT_VIDEO_RESERVE);
        out.options.remove(OPT_AEON);
    }

    (out, pda_candidate)
}

/// Add the streaming-reserve option for Avalon / internet-materials video
pub fn add_streaming_video_option(
    doc: &SolrDocument,
    claims: &VirgoClaims,
    options: &mut RequestOptions,
) {
    if doc.is_streaming_video() && claims.can_place_reserve {
        tracing::info!("add streaming video reserve option");
        options.option_mut(OPT_STREAMING_RESERVE, true);
    }
}

/// Health-sciences callers request scans through their own ILL system; the
/// scan option is replaced with a direct OpenURL link
pub fn add_hsl_scan_option(hs_illiad_url: &str, doc: &SolrDocument, options: &mut RequestOptions) {
    tracing::info!("add direct scan option for health sciences user");
    options.options.remove(OPT_SCAN);
    options.option_mut(OPT_DIRECT_LINK, true).create_url =
        Some(open_url_query(hs_illiad_url, doc));
}

/// Add the Aeon option and its special-collections holdables
pub fn add_aeon_option(policy: &PolicyTable, doc: &SolrDocument, items: &[AvailItem], options: &mut RequestOptions) {
    if !doc.library.iter().any(|l| l == "Special Collections") {
        return;
    }
    tracing::info!("add aeon request options");

    let take_all = doc.has_sc_availability();
    let mut first_call_number: Option<String> = None;

    for item in items {
        if !take_all && item.library_id != SPECIAL_COLLECTIONS_LIBRARY {
            continue;
        }
        let notes = sc_notes_for(item, doc);
        let mut holdable = to_holdable_item(policy, item);
        holdable.sc_notes = notes;
        if first_call_number.is_none() {
            first_call_number = Some(holdable.call_number.clone());
        }
        options
            .option_mut(OPT_AEON, false)
            .item_barcodes
            .push(holdable.barcode.clone());
        options.items.push(holdable);
    }

    let aeon = options.option_mut(OPT_AEON, false);
    aeon.create_url = Some(create_aeon_url(doc, first_call_number.as_deref().unwrap_or("")));
}

fn sc_notes_for(item: &AvailItem, doc: &SolrDocument) -> String {
    let notes = if !item.sc_location.is_empty() {
        item.sc_location.clone()
    } else if !doc.local_notes.is_empty() {
        // drop the department name, shorten the building name
        let prefix1 = Regex::new(r"^\s*SPECIAL\s+COLLECTIONS:\s+").unwrap();
        let prefix2 = Regex::new(r"^\s*Harrison Small Special Collections,").unwrap();
        let mut joined = String::new();
        for note in &doc.local_notes {
            let note = prefix1.replace(note, "");
            let note = prefix2.replace(&note, "H. Small,");
            joined.push_str(note.trim());
            joined.push_str(";\n");
        }
        joined
    } else {
        "(no location notes)".to_string()
    };

    notes.chars().take(MAX_SC_NOTES_LEN).collect()
}

/// Aeon launch URL. Manuscript and collection material gets the manuscript
/// request form; everything else the monograph form.
pub fn create_aeon_url(doc: &SolrDocument, call_number: &str) -> String {
    let manuscript = doc.work_types.iter().any(|w| w == "manuscript")
        || doc.medium.iter().any(|m| m == "manuscript")
        || doc.format.iter().any(|f| f == "manuscript")
        || doc.work_types.iter().any(|w| w == "collection");
    let form_value = if manuscript {
        "GenericRequestManuscript"
    } else {
        "GenericRequestMonograph"
    };

    let author = match doc.author.len() {
        0 => String::new(),
        1 => doc.author[0].clone(),
        _ => format!("{}; ...", doc.author[0]),
    };
    let isxn = doc
        .isbn
        .iter()
        .chain(doc.issn.iter())
        .cloned()
        .collect::<Vec<_>>()
        .join(";");
    let desc: String = doc
        .description
        .join("; ")
        .chars()
        .take(MAX_AEON_DESC_LEN)
        .collect();

    let mut url = Url::parse("https://virginia.aeon.atlas-sys.com/logon").expect("static url");
    url.query_pairs_mut()
        .append_pair("Action", "10")
        .append_pair("Form", "20")
        .append_pair("Value", form_value)
        .append_pair("ReferenceNumber", &doc.id)
        .append_pair("ItemTitle", &doc.title.join("; "))
        .append_pair("ItemAuthor", &author)
        .append_pair("ItemDate", &doc.publication_date)
        .append_pair("ItemISxN", &isxn)
        .append_pair("CallNumber", call_number)
        .append_pair("ItemPlace", &doc.published_location.join("; "))
        .append_pair("ItemPublisher", &doc.publisher_name.join("; "))
        .append_pair("ItemEdition", &doc.edition)
        .append_pair("ItemIssue", &doc.issue)
        .append_pair("ItemVolume", call_number)
        .append_pair("ItemInfo2", &doc.copy)
        .append_pair("ItemInfo1", &desc);
    url.to_string()
}

/// OpenURL for the health-sciences ILL endpoint
pub fn open_url_query(hs_base: &str, doc: &SolrDocument) -> String {
    let mut url = match Url::parse(&format!("{hs_base}/illiad.dll")) {
        Ok(u) => u,
        Err(_) => return String::new(),
    };
    url.query_pairs_mut()
        .append_pair("Action", "10")
        .append_pair("Form", "21")
        .append_pair("issn", &doc.issn.join(";"))
        .append_pair("title", &doc.title.join("; "))
        .append_pair("author", &doc.author.join("; "))
        .append_pair("edition", &doc.edition)
        .append_pair("volume", &doc.volume)
        .append_pair("issue", &doc.issue)
        .append_pair("date", &doc.publication_date);
    url.to_string()
}

/// PDA create URL assembled from the MARC record
pub fn generate_pda_create_url(
    pda_base: &str,
    title_id: &str,
    barcode: &str,
    marc: Option<&MarcRecord>,
) -> String {
    let mut url = match Url::parse(&format!("{pda_base}/orders")) {
        Ok(u) => u,
        Err(_) => return String::new(),
    };

    let empty = MarcRecord::default();
    let marc = marc.unwrap_or(&empty);
    let fund_codes = marc.values_for_tag("985");
    let fund_code = fund_codes.first().copied().unwrap_or("");
    let loan_type = fund_codes.last().copied().unwrap_or("");
    let hold_library = marc
        .first_value("949", "h")
        .and_then(lookup_pda_library)
        .unwrap_or("");
    let isbn = marc.first_value("911", "a").unwrap_or("");

    url.query_pairs_mut()
        .append_pair("barcode", barcode)
        .append_pair("catalog_key", title_id)
        .append_pair("fund_code", fund_code)
        .append_pair("hold_library", hold_library)
        .append_pair("isbn", isbn)
        .append_pair("loan_type", loan_type)
        .append_pair("title", &marc.joined_field("245"));
    url.to_string()
}

impl ServiceContext {
    /// Resolve the PDA candidate against the acquisition service. 404 means
    /// the title can still be ordered; 200 means an order is already in
    /// flight; anything else adds no option.
    pub async fn resolve_pda_option(
        &self,
        bearer_jwt: &str,
        title_id: &str,
        candidate: &AvailItem,
        marc: Option<&MarcRecord>,
        options: &mut RequestOptions,
    ) {
        tracing::info!("add available to order option");
        let url = format!("{}/check/{}", self.config.pda_url, title_id);
        let req = self
            .http_client
            .get(url)
            .header("Authorization", format!("Bearer {bearer_jwt}"));
        match self.send_request("pda-ws", req).await {
            Ok(_) => {
                // ordered already, the ILS just has not caught up
                tracing::info!("{} is available for pda but has already been ordered", candidate.barcode);
                options.option_mut(OPT_PDA, true);
            }
            Err(err) if err.is_not_found() => {
                let create_url = generate_pda_create_url(
                    &self.config.pda_url,
                    title_id,
                    &candidate.barcode,
                    marc,
                );
                options.option_mut(OPT_PDA, true).create_url = Some(create_url);
            }
            Err(err) => {
                tracing::error!("pda check failed {} - {}", err.status, err.message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::sample_table;

    fn claims(profile: &str, home_library: &str) -> VirgoClaims {
        VirgoClaims {
            user_id: "mst3k".into(),
            barcode: "U00001".into(),
            profile: profile.into(),
            home_library: home_library.into(),
            can_place_reserve: true,
            role: "user".into(),
            exp: 0,
        }
    }

    fn item(barcode: &str, home_loc: &str, current_loc: &str) -> AvailItem {
        AvailItem {
            barcode: barcode.into(),
            call_number: "PS3545 .E6".into(),
            copy_number: 1,
            library_id: "UVA-LIB".into(),
            library: "UVA Library".into(),
            current_location_id: current_loc.into(),
            current_location: "Stacks".into(),
            home_location_id: home_loc.into(),
            unavailable: false,
            notice: String::new(),
            is_video: false,
            volume: String::new(),
            sc_location: String::new(),
        }
    }

    #[test]
    fn test_no_items_prunes_seed_options() {
        let table = sample_table();
        let (opts, pda) = derive_request_options(&table, &claims("FACULTY", "CLEMONS"), &[]);
        assert!(opts.items.is_empty());
        assert!(!opts.options.contains_key(OPT_HOLD));
        assert!(!opts.options.contains_key(OPT_SCAN));
        assert!(!opts.options.contains_key(OPT_VIDEO_RESERVE));
        assert!(pda.is_none());
    }

    #[test]
    fn test_medium_rare_hold_and_scan() {
        let table = sample_table();
        let mut mr = item("X001", "LOCKEDSTKS", "LOCKEDSTKS");
        mr.current_location = "Ivy Annex".into();
        let (opts, _) = derive_request_options(&table, &claims("FACULTY", "CLEMONS"), &[mr]);

        assert_eq!(opts.items.len(), 1);
        assert_eq!(opts.items[0].call_number, "PS3545 .E6 (Ivy limited circulation)");
        assert_eq!(opts.options[OPT_HOLD].item_barcodes, vec!["X001"]);
        assert_eq!(opts.options[OPT_SCAN].item_barcodes, vec!["X001"]);
    }

    #[test]
    fn test_undergrad_scan_blocked_hold_allowed() {
        let table = sample_table();
        let it = item("X001", "STACKS", "STACKS");
        let (opts, _) = derive_request_options(&table, &claims("UNDERGRAD", "CLEMONS"), &[it]);

        assert_eq!(opts.options[OPT_HOLD].item_barcodes, vec!["X001"]);
        assert!(opts.options.contains_key(OPT_SCAN));
        assert!(opts.options[OPT_SCAN].item_barcodes.is_empty());
    }

    #[test]
    fn test_undergrad_can_scan_by_request_stacks() {
        let table = sample_table();
        let it = item("X001", "BY-REQUEST", "STACKS");
        let (opts, _) = derive_request_options(&table, &claims("UNDERGRAD", "CLEMONS"), &[it]);
        assert_eq!(opts.options[OPT_SCAN].item_barcodes, vec!["X001"]);
    }

    #[test]
    fn test_rare_home_location_drops_scan_regardless_of_order() {
        let table = sample_table();
        let normal = item("X001", "STACKS", "STACKS");
        let mut rare = item("X002", "RARESHL", "STACKS");
        rare.call_number = "Z99 .R2".into();

        // blocking item last: the scan option must still be gone
        let (opts, _) = derive_request_options(
            &table,
            &claims("FACULTY", "CLEMONS"),
            &[normal.clone(), rare.clone()],
        );
        assert!(!opts.options.contains_key(OPT_SCAN));

        // blocking item first: same result
        let (opts2, _) =
            derive_request_options(&table, &claims("FACULTY", "CLEMONS"), &[rare, normal]);
        assert!(!opts2.options.contains_key(OPT_SCAN));
    }

    #[test]
    fn test_no_scan_profile_keeps_empty_scan_option() {
        let table = sample_table();
        let it = item("X001", "STACKS", "STACKS");
        let (opts, _) = derive_request_options(&table, &claims("ALUMNI", "CLEMONS"), &[it]);
        assert!(opts.options.contains_key(OPT_SCAN));
        assert!(opts.options[OPT_SCAN].item_barcodes.is_empty());
        assert_eq!(opts.options[OPT_HOLD].item_barcodes, vec!["X001"]);
    }

    #[test]
    fn test_unavailable_items_skipped() {
        let table = sample_table();
        let mut it = item("X001", "STACKS", "LOST");
        it.unavailable = true;
        let (opts, _) = derive_request_options(&table, &claims("FACULTY", "CLEMONS"), &[it]);
        assert!(opts.items.is_empty());
    }

    #[test]
    fn test_video_gets_video_reserve() {
        let table = sample_table();
        let mut video = item("X001", "STACKS", "STACKS");
        video.is_video = true;
        let (opts, _) = derive_request_options(&table, &claims("FACULTY", "CLEMONS"), &[video]);
        assert_eq!(opts.options[OPT_VIDEO_RESERVE].item_barcodes, vec!["X001"]);
        // video items never enter the scan list
        assert!(opts.options[OPT_SCAN].item_barcodes.is_empty());
    }

    #[test]
    fn test_volumeless_duplicates_collapse() {
        let table = sample_table();
        let first = item("X001", "STACKS", "STACKS");
        let mut second = item("X002", "STACKS", "STACKS");
        second.call_number = "KLAUS DVD #1224".into();
        // different call numbers, but neither has a volume
        let (opts, _) =
            derive_request_options(&table, &claims("FACULTY", "CLEMONS"), &[first, second]);
        assert_eq!(opts.items.len(), 1);
        assert_eq!(opts.options[OPT_HOLD].item_barcodes, vec!["X001"]);
    }

    #[test]
    fn test_distinct_volumes_both_listed() {
        let table = sample_table();
        let mut first = item("X001", "STACKS", "STACKS");
        first.volume = "v.1".into();
        let mut second = item("X002", "STACKS", "STACKS");
        second.call_number = "PS3545 .E6 v.2".into();
        second.volume = "v.2".into();
        let (opts, _) =
            derive_request_options(&table, &claims("FACULTY", "CLEMONS"), &[first, second]);
        assert_eq!(opts.items.len(), 2);
        assert_eq!(opts.options[OPT_HOLD].item_barcodes, vec!["X001", "X002"]);
    }

    #[test]
    fn test_pda_candidate_detected() {
        let table = sample_table();
        let mut ato = item("X009", "STACKS", "NOTOREPDA");
        ato.current_location = "Available to Order".into();
        let (_, pda) = derive_request_options(&table, &claims("FACULTY", "CLEMONS"), &[ato]);
        assert_eq!(pda.unwrap().barcode, "X009");
    }

    #[test]
    fn test_option_barcodes_resolve_to_items() {
        let table = sample_table();
        let mut first = item("X001", "STACKS", "STACKS");
        first.volume = "v.1".into();
        let mut second = item("X002", "LOCKEDSTKS", "STACKS");
        second.call_number = "PS3545 .E6 v.2".into();
        second.volume = "v.2".into();
        let (opts, _) =
            derive_request_options(&table, &claims("FACULTY", "CLEMONS"), &[first, second]);

        for option in opts.options.values() {
            for barcode in &option.item_barcodes {
                let matches = opts.items.iter().filter(|i| &i.barcode == barcode).count();
                assert_eq!(matches, 1, "barcode {barcode} must appear exactly once");
            }
        }
    }

    #[test]
    fn test_spec_coll_item_not_holdable_but_aeon_listed() {
        let table = sample_table();
        let mut sc = item("X007", "SC-STKS", "STACKS");
        sc.library_id = "SPEC-COLL".into();
        sc.library = "Special Collections".into();
        let (mut opts, _) =
            derive_request_options(&table, &claims("FACULTY", "CLEMONS"), &[sc.clone()]);
        // non-circulating: not in the hold list, and nothing else requestable
        assert!(opts.items.is_empty());

        let doc = SolrDocument {
            id: "u123".into(),
            library: vec!["Special Collections".into()],
            local_notes: vec!["SPECIAL COLLECTIONS: Box 12".into()],
            ..Default::default()
        };
        add_aeon_option(&table, &doc, &[sc], &mut opts);
        assert_eq!(opts.items.len(), 1);
        assert_eq!(opts.items[0].sc_notes, "Box 12;\n");
        let aeon = &opts.options[OPT_AEON];
        assert_eq!(aeon.item_barcodes, vec!["X007"]);
        assert!(!aeon.sign_in_required);
        assert!(aeon.create_url.as_deref().unwrap().contains("GenericRequestMonograph"));
    }

    #[test]
    fn test_aeon_manuscript_form() {
        let doc = SolrDocument {
            id: "u55".into(),
            work_types: vec!["manuscript".into()],
            ..Default::default()
        };
        let url = create_aeon_url(&doc, "MSS 123");
        assert!(url.contains("Value=GenericRequestManuscript"));
        assert!(url.contains("CallNumber=MSS+123"));
    }

    #[test]
    fn test_hsl_replaces_scan_with_direct_link() {
        let table = sample_table();
        let it = item("X001", "STACKS", "STACKS");
        let (mut opts, _) =
            derive_request_options(&table, &claims("FACULTY", "HEALTHSCI"), &[it]);
        // HEALTHSCI home library disables scans up front, option still seeded
        assert!(opts.options[OPT_SCAN].item_barcodes.is_empty());

        let doc = SolrDocument {
            title: vec!["Gray's Anatomy".into()],
            ..Default::default()
        };
        add_hsl_scan_option("https://hsl.example.com", &doc, &mut opts);
        assert!(!opts.options.contains_key(OPT_SCAN));
        let link = &opts.options[OPT_DIRECT_LINK];
        assert!(link.create_url.as_deref().unwrap().contains("Form=21"));
    }

    #[test]
    fn test_streaming_reserve_requires_flag() {
        let doc = SolrDocument {
            pool: vec!["video".into()],
            location: vec!["Internet materials".into()],
            ..Default::default()
        };
        let mut opts = RequestOptions::default();
        let mut c = claims("FACULTY", "CLEMONS");
        add_streaming_video_option(&doc, &c, &mut opts);
        assert!(opts.options.contains_key(OPT_STREAMING_RESERVE));

        let mut opts2 = RequestOptions::default();
        c.can_place_reserve = false;
        add_streaming_video_option(&doc, &c, &mut opts2);
        assert!(!opts2.options.contains_key(OPT_STREAMING_RESERVE));
    }

    #[test]
    fn test_pda_create_url_from_marc() {
        use crate::marc::{MarcField, MarcSubfield};
        let marc = MarcRecord {
            fields: vec![
                MarcField {
                    tag: "245".into(),
                    subfields: vec![
                        MarcSubfield { code: "a".into(), data: "A title".into() },
                        MarcSubfield { code: "b".into(), data: "for ordering".into() },
                    ],
                    indicators: String::new(),
                },
                MarcField {
                    tag: "911".into(),
                    subfields: vec![MarcSubfield { code: "a".into(), data: "9781234567890".into() }],
                    indicators: String::new(),
                },
                MarcField {
                    tag: "949".into(),
                    subfields: vec![MarcSubfield { code: "h".into(), data: "CL-PPDA".into() }],
                    indicators: String::new(),
                },
                MarcField {
                    tag: "985".into(),
                    subfields: vec![MarcSubfield { code: "a".into(), data: "UVA-FUND".into() }],
                    indicators: String::new(),
                },
                MarcField {
                    tag: "985".into(),
                    subfields: vec![MarcSubfield { code: "a".into(), data: "SHORT-LOAN".into() }],
                    indicators: String::new(),
                },
            ],
            ..Default::default()
        };
        let url = generate_pda_create_url("http://pda.example.com", "u99", "X004", Some(&marc));
        assert!(url.starts_with("http://pda.example.com/orders?"));
        assert!(url.contains("barcode=X004"));
        assert!(url.contains("catalog_key=u99"));
        assert!(url.contains("fund_code=UVA-FUND"));
        assert!(url.contains("loan_type=SHORT-LOAN"));
        assert!(url.contains("hold_library=CLEM"));
        assert!(url.contains("isbn=9781234567890"));
        assert!(url.contains("title=A+title+for+ordering"));
    }
}
