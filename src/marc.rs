//! MARC record handling
//!
//! MARC is modeled as an ordered sequence of tagged fields, each with
//! indicators and coded subfields. Rights updates edit the 856 entry marked
//! as TrackSys-owned without disturbing sibling 856 fields.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarcSubfield {
    pub code: String,
    pub data: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarcField {
    pub tag: String,
    #[serde(default)]
    pub subfields: Vec<MarcSubfield>,
    #[serde(rename = "inds", default, skip_serializing_if = "String::is_empty")]
    pub indicators: String,
}

impl MarcField {
    /// First subfield with the given code
    pub fn subfield(&self, code: &str) -> Option<&str> {
        self.subfields
            .iter()
            .find(|sf| sf.code == code)
            .map(|sf| sf.data.as_str())
    }

    /// All subfield data joined by single spaces
    pub fn joined(&self) -> String {
        self.subfields
            .iter()
            .map(|sf| sf.data.trim())
            .filter(|d| !d.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// The MARC portion of a bib record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarcRecord {
    #[serde(default)]
    pub standard: String,
    #[serde(rename = "type", default)]
    pub record_type: String,
    #[serde(default)]
    pub leader: String,
    #[serde(default)]
    pub fields: Vec<MarcField>,
}

impl MarcRecord {
    pub fn fields_with_tag<'a>(&'a self, tag: &str) -> impl Iterator<Item = &'a MarcField> + 'a {
        let tag = tag.to_string();
        self.fields.iter().filter(move |f| f.tag == tag)
    }

    /// First value of `code` in the first field with `tag`
    pub fn first_value(&self, tag: &str, code: &str) -> Option<&str> {
        self.fields_with_tag(tag).find_map(|f| f.subfield(code))
    }

    /// All subfield data under `tag`, flattened in document order
    pub fn values_for_tag(&self, tag: &str) -> Vec<&str> {
        self.fields_with_tag(tag)
            .flat_map(|f| f.subfields.iter().map(|sf| sf.data.as_str()))
            .collect()
    }

    /// All subfields of the first field with `tag`, joined by spaces
    pub fn joined_field(&self, tag: &str) -> String {
        self.fields_with_tag(tag)
            .next()
            .map(MarcField::joined)
            .unwrap_or_default()
    }

    /// Replace the TrackSys-owned 856 field, or insert the new rights field
    /// in tag order (before the first field whose numeric tag is >= 856),
    /// appending when no such position exists.
    pub fn upsert_rights_field(&mut self, rights: MarcField) {
        let mut existing_idx: Option<usize> = None;
        let mut insert_idx: Option<usize> = None;

        for (idx, field) in self.fields.iter().enumerate() {
            if insert_idx.is_none() {
                if let Ok(tag_num) = field.tag.parse::<u32>() {
                    if tag_num >= 856 {
                        insert_idx = Some(idx);
                    }
                }
            }
            if field.tag == "856" {
                let owned = field
                    .subfields
                    .iter()
                    .any(|sf| sf.code == "e" && sf.data.to_lowercase().contains("uva tracksys"));
                if owned {
                    existing_idx = Some(idx);
                    break;
                }
            }
        }

        if let Some(idx) = existing_idx {
            tracing::info!("record already has tracksys rights data in field {idx}");
            self.fields[idx] = rights;
        } else if let Some(idx) = insert_idx {
            tracing::info!("insert rights at index {idx}");
            self.fields.insert(idx, rights);
        } else {
            tracing::info!("append rights after last field");
            self.fields.push(rights);
        }
    }

    /// Blank leader byte 17 (encoding level) when it holds an upper-case
    /// letter the upstream will not accept back
    pub fn clean_leader(&mut self) {
        let bytes = self.leader.as_bytes();
        if bytes.len() > 17 && bytes[17].is_ascii_uppercase() {
            let mut leader = self.leader.clone().into_bytes();
            leader[17] = b' ';
            self.leader = String::from_utf8(leader).unwrap_or_else(|_| self.leader.clone());
        }
    }
}

/// Build the 856 rights field for a metadata update
pub fn rights_field(rights_uri: &str, rights_name: &str, resource_uri: &str) -> MarcField {
    MarcField {
        tag: "856".into(),
        indicators: "41".into(),
        subfields: vec![
            MarcSubfield { code: "r".into(), data: rights_uri.into() },
            MarcSubfield { code: "t".into(), data: rights_name.into() },
            MarcSubfield { code: "u".into(), data: resource_uri.into() },
            MarcSubfield { code: "e".into(), data: "(dpeaa) UVA TrackSys".into() },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(tag: &str, subfields: &[(&str, &str)]) -> MarcField {
        MarcField {
            tag: tag.into(),
            indicators: String::new(),
            subfields: subfields
                .iter()
                .map(|(code, data)| MarcSubfield {
                    code: (*code).into(),
                    data: (*data).into(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_first_value_and_joined() {
        let marc = MarcRecord {
            fields: vec![
                field("245", &[("a", "The title"), ("b", "a subtitle")]),
                field("985", &[("a", "UVA-FUND")]),
                field("985", &[("a", "SHORT-LOAN")]),
            ],
            ..Default::default()
        };
        assert_eq!(marc.first_value("985", "a"), Some("UVA-FUND"));
        assert_eq!(marc.joined_field("245"), "The title a subtitle");
        assert_eq!(marc.values_for_tag("985"), vec!["UVA-FUND", "SHORT-LOAN"]);
    }

    #[test]
    fn test_rights_replaces_tracksys_field() {
        let mut marc = MarcRecord {
            fields: vec![
                field("245", &[("a", "Title")]),
                field("856", &[("u", "https://old"), ("e", "(dpeaa) UVA TrackSys")]),
                field("856", &[("u", "https://other")]),
            ],
            ..Default::default()
        };
        marc.upsert_rights_field(rights_field("https://rights", "CC-BY", "https://resource"));
        assert_eq!(marc.fields.len(), 3);
        assert_eq!(marc.fields[1].subfield("r"), Some("https://rights"));
        // the sibling 856 is untouched
        assert_eq!(marc.fields[2].subfield("u"), Some("https://other"));
    }

    #[test]
    fn test_rights_inserted_in_tag_order() {
        let mut marc = MarcRecord {
            fields: vec![
                field("245", &[("a", "Title")]),
                field("900", &[("a", "local")]),
            ],
            ..Default::default()
        };
        marc.upsert_rights_field(rights_field("https://rights", "CC-BY", "https://resource"));
        assert_eq!(marc.fields.len(), 3);
        assert_eq!(marc.fields[1].tag, "856");
    }

    #[test]
    fn test_rights_appended_when_no_later_tag() {
        let mut marc = MarcRecord {
            fields: vec![field("245", &[("a", "Title")])],
            ..Default::default()
        };
        marc.upsert_rights_field(rights_field("https://rights", "CC-BY", "https://resource"));
        assert_eq!(marc.fields.last().unwrap().tag, "856");
    }

    #[test]
    fn test_clean_leader() {
        let mut marc = MarcRecord {
            leader: "01234cam a2200000Ia 4500".into(),
            ..Default::default()
        };
        marc.clean_leader();
        // byte 17 was 'I'
        assert_eq!(marc.leader.as_bytes()[17], b' ');

        let mut lower = MarcRecord {
            leader: "01234cam a2200000 a 4500".into(),
            ..Default::default()
        };
        let before = lower.leader.clone();
        lower.clean_leader();
        assert_eq!(lower.leader, before);
    }
}
