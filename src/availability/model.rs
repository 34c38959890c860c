//! Bibliographic wire shapes and the normalised availability records
//!
//! The ILS returns deeply nested JSON shaped by the includeFields parameter
//! on each call. Only the flattened working records matter to the rest of
//! the system; the nested shapes live here as parsing-time concerns.

use serde::{Deserialize, Serialize};

use crate::marc::MarcRecord;
use crate::policy::PolicyTable;
use crate::sirsi::SirsiKey;

/// includeFields for the availability bib fetch
pub const AVAILABILITY_FIELDS: &str = "boundWithList{*},bib,\
callList{dispCallNumber,volumetric,shadowed,library{description},\
itemList{barcode,copyNumber,shadowed,itemType{key},homeLocation{key},\
currentLocation{key,description,shadowed}}}";

/// Item types that mean the physical piece is a video
pub const VIDEO_ITEM_TYPES: &[&str] = &[
    "VIDEOJRNL",
    "VIDEO-DVD",
    "VIDEO-DISC",
    "VIDEO-CASS",
    "RSRV-VID4",
    "RSRV-VID24",
];

pub fn is_video_item_type(item_type: &str) -> bool {
    VIDEO_ITEM_TYPES.contains(&item_type)
}

// ---------------------------------------------------------------------------
// wire shapes

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SirsiBibResponse {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub fields: SirsiBibFields,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SirsiBibFields {
    #[serde(default)]
    pub bib: Option<MarcRecord>,
    #[serde(rename = "callList", default)]
    pub call_list: Vec<SirsiCallRec>,
    #[serde(rename = "boundWithList", default)]
    pub bound_with_list: Vec<SirsiBoundWith>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SirsiCallRec {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub fields: SirsiCallFields,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SirsiCallFields {
    #[serde(rename = "dispCallNumber", default)]
    pub disp_call_number: String,
    #[serde(default)]
    pub volumetric: Option<String>,
    #[serde(default)]
    pub shadowed: bool,
    #[serde(default)]
    pub library: SirsiRefWithDescription,
    #[serde(rename = "itemList", default)]
    pub item_list: Vec<SirsiItemRec>,
}

/// A resource reference that also projects its description
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SirsiRefWithDescription {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub fields: SirsiRefDescriptionFields,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SirsiRefDescriptionFields {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub shadowed: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SirsiItemRec {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub fields: SirsiItemFields,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SirsiItemFields {
    #[serde(default)]
    pub barcode: String,
    #[serde(rename = "copyNumber", default)]
    pub copy_number: i64,
    #[serde(default)]
    pub shadowed: bool,
    #[serde(rename = "itemType", default)]
    pub item_type: SirsiKey,
    #[serde(rename = "homeLocation", default)]
    pub home_location: SirsiKey,
    #[serde(rename = "currentLocation", default)]
    pub current_location: SirsiRefWithDescription,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SirsiBoundWith {
    #[serde(default)]
    pub fields: SirsiBoundWithFields,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SirsiBoundWithFields {
    #[serde(default)]
    pub parent: Option<SirsiBoundWithPart>,
    #[serde(rename = "childList", default)]
    pub child_list: Vec<SirsiBoundWithPart>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SirsiBoundWithPart {
    #[serde(default)]
    pub fields: SirsiBoundWithPartFields,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SirsiBoundWithPartFields {
    #[serde(default)]
    pub bib: SirsiBoundWithBib,
    #[serde(rename = "callNumber", default)]
    pub call_number: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SirsiBoundWithBib {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub fields: SirsiBoundWithBibFields,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SirsiBoundWithBibFields {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
}

// ---------------------------------------------------------------------------
// working records

/// Normalised per-item availability record
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailItem {
    pub barcode: String,
    pub call_number: String,
    pub copy_number: i64,
    pub library_id: String,
    pub library: String,
    pub current_location_id: String,
    pub current_location: String,
    pub home_location_id: String,
    pub unavailable: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub notice: String,
    pub is_video: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub volume: String,
    #[serde(rename = "scLocation", skip_serializing_if = "String::is_empty")]
    pub sc_location: String,
}

/// One side of a bound-with relation
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundWithRec {
    pub is_parent: bool,
    pub title_key: String,
    pub title: String,
    pub author: String,
    pub call_number: String,
}

/// Flatten the bib response into availability items, applying the shadow and
/// online filters and the copy-suffix rule.
pub fn parse_avail_items(policy: &PolicyTable, bib: &SirsiBibResponse) -> Vec<AvailItem> {
    let mut out = Vec::new();

    for call in &bib.fields.call_list {
        if call.fields.shadowed {
            continue;
        }
        let multi_copy = call
            .fields
            .item_list
            .iter()
            .any(|item| item.fields.copy_number > 1);

        for item in &call.fields.item_list {
            let fields = &item.fields;
            if fields.shadowed || fields.current_location.fields.shadowed {
                continue;
            }
            let loc_key = &fields.current_location.key;
            if policy.is_online_location(loc_key) {
                continue;
            }
            if let Some(loc) = policy.find_location(loc_key) {
                if loc.shadowed || loc.online {
                    continue;
                }
            }

            let mut call_number = call.fields.disp_call_number.clone();
            if multi_copy && fields.copy_number > 0 {
                call_number = format!("{call_number} (copy {})", fields.copy_number);
            }

            let current_location = if !fields.current_location.fields.description.is_empty() {
                fields.current_location.fields.description.clone()
            } else {
                policy
                    .find_location(loc_key)
                    .map(|l| l.description.clone())
                    .unwrap_or_default()
            };

            out.push(AvailItem {
                barcode: fields.barcode.clone(),
                call_number,
                copy_number: fields.copy_number,
                library_id: call.fields.library.key.clone(),
                library: call.fields.library.fields.description.clone(),
                current_location_id: loc_key.clone(),
                current_location,
                home_location_id: fields.home_location.key.clone(),
                unavailable: policy.is_unavailable_location(loc_key),
                notice: String::new(),
                is_video: is_video_item_type(&fields.item_type.key),
                volume: call.fields.volumetric.clone().unwrap_or_default(),
                sc_location: String::new(),
            });
        }
    }

    out
}

/// Extract the first bound-with relation as client-facing records
pub fn parse_bound_with(bib: &SirsiBibResponse) -> Vec<BoundWithRec> {
    let mut out = Vec::new();
    if let Some(first) = bib.fields.bound_with_list.first() {
        if let Some(parent) = &first.fields.parent {
            out.push(bound_with_rec(parent, true));
        }
        for child in &first.fields.child_list {
            out.push(bound_with_rec(child, false));
        }
    }
    out
}

fn bound_with_rec(part: &SirsiBoundWithPart, is_parent: bool) -> BoundWithRec {
    BoundWithRec {
        is_parent,
        title_key: part.fields.bib.key.clone(),
        title: part.fields.bib.fields.title.clone(),
        author: part.fields.bib.fields.author.clone(),
        call_number: part.fields.call_number.clone(),
    }
}

/// Drop the ` (copy N)` suffix from a call-number label
pub fn strip_copy_suffix(call_number: &str) -> String {
    match call_number.rfind(" (copy ") {
        Some(idx) if call_number.ends_with(')') => call_number[..idx].to_string(),
        _ => call_number.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::sample_table;

    fn bib_with_item(current_loc: &str, shadowed_item: bool, copy: i64) -> SirsiBibResponse {
        serde_json::from_value(serde_json::json!({
            "key": "123456",
            "fields": {
                "callList": [{
                    "key": "1",
                    "fields": {
                        "dispCallNumber": "PS3545 .E6",
                        "shadowed": false,
                        "library": {"key": "UVA-LIB", "fields": {"description": "UVA Library"}},
                        "itemList": [{
                            "key": "1",
                            "fields": {
                                "barcode": "X001",
                                "copyNumber": copy,
                                "shadowed": shadowed_item,
                                "itemType": {"key": "BOOK"},
                                "homeLocation": {"key": "STACKS"},
                                "currentLocation": {
                                    "key": current_loc,
                                    "fields": {"description": "", "shadowed": false}
                                }
                            }
                        }]
                    }
                }]
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_online_location_filtered() {
        let table = sample_table();
        let bib = bib_with_item("INTERNET", false, 1);
        assert!(parse_avail_items(&table, &bib).is_empty());
    }

    #[test]
    fn test_shadowed_item_filtered() {
        let table = sample_table();
        let bib = bib_with_item("STACKS", true, 1);
        assert!(parse_avail_items(&table, &bib).is_empty());
    }

    #[test]
    fn test_stacks_item_kept() {
        let table = sample_table();
        let bib = bib_with_item("STACKS", false, 1);
        let items = parse_avail_items(&table, &bib);
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.barcode, "X001");
        assert_eq!(item.call_number, "PS3545 .E6");
        assert_eq!(item.library_id, "UVA-LIB");
        assert_eq!(item.current_location, "Stacks");
        assert!(!item.unavailable);
        assert!(!item.is_video);
    }

    #[test]
    fn test_unavailable_location_flagged() {
        let table = sample_table();
        let bib = bib_with_item("LOST", false, 1);
        let items = parse_avail_items(&table, &bib);
        assert_eq!(items.len(), 1);
        assert!(items[0].unavailable);
    }

    #[test]
    fn test_copy_suffix_applied_when_multiple_copies() {
        let table = sample_table();
        let mut bib = bib_with_item("STACKS", false, 2);
        // second item on the same call with copy 1
        let mut second = bib.fields.call_list[0].fields.item_list[0].clone();
        second.fields.barcode = "X002".into();
        second.fields.copy_number = 1;
        bib.fields.call_list[0].fields.item_list.push(second);

        let items = parse_avail_items(&table, &bib);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].call_number, "PS3545 .E6 (copy 2)");
        assert_eq!(items[1].call_number, "PS3545 .E6 (copy 1)");
    }

    #[test]
    fn test_strip_copy_suffix() {
        assert_eq!(strip_copy_suffix("PS3545 .E6 (copy 2)"), "PS3545 .E6");
        assert_eq!(strip_copy_suffix("PS3545 .E6"), "PS3545 .E6");
    }

    #[test]
    fn test_bound_with_parse() {
        let bib: SirsiBibResponse = serde_json::from_value(serde_json::json!({
            "key": "99",
            "fields": {
                "boundWithList": [{
                    "fields": {
                        "parent": {
                            "fields": {
                                "bib": {"key": "11", "fields": {"title": "Parent title", "author": "Someone"}},
                                "callNumber": "A 1"
                            }
                        },
                        "childList": [{
                            "fields": {
                                "bib": {"key": "22", "fields": {"title": "Child title", "author": ""}},
                                "callNumber": "A 1 v.2"
                            }
                        }]
                    }
                }]
            }
        }))
        .unwrap();
        let recs = parse_bound_with(&bib);
        assert_eq!(recs.len(), 2);
        assert!(recs[0].is_parent);
        assert_eq!(recs[0].title_key, "11");
        assert!(!recs[1].is_parent);
        assert_eq!(recs[1].call_number, "A 1 v.2");
    }
}
