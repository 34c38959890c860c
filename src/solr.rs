//! Catalog index (Solr) client
//!
//! The index supplies the discovery-side view of a title: pools, sources,
//! local notes, and the stored special-collections availability blob used to
//! enrich availability responses for titles the ILS cannot describe.

use serde::Deserialize;

use crate::error::RequestError;
use crate::ServiceContext;

/// Fields requested from the index for a single-document lookup
pub const SOLR_FIELD_LIST: &str = "anon_availability_a,author_a,barcode_a,call_number_a,\
description_a,format_a,id,isbn_a,issn_a,library_a,location2_a,local_notes_a,medium_a,pool_f,\
published_date,published_location_a,publisher_name_a,sc_availability_large_single,source_a,\
title_a,url_a,workType_a";

/// One index document, projected to the fields the connector uses
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SolrDocument {
    #[serde(rename = "anon_availability_a", default)]
    pub anon_availability: Vec<String>,
    #[serde(rename = "author_a", default)]
    pub author: Vec<String>,
    #[serde(rename = "barcode_a", default)]
    pub barcode: Vec<String>,
    #[serde(rename = "call_number_a", default)]
    pub call_number: Vec<String>,
    #[serde(rename = "description_a", default)]
    pub description: Vec<String>,
    #[serde(rename = "format_a", default)]
    pub format: Vec<String>,
    #[serde(default)]
    pub id: String,
    #[serde(rename = "isbn_a", default)]
    pub isbn: Vec<String>,
    #[serde(rename = "issn_a", default)]
    pub issn: Vec<String>,
    #[serde(rename = "library_a", default)]
    pub library: Vec<String>,
    #[serde(rename = "location2_a", default)]
    pub location: Vec<String>,
    #[serde(rename = "local_notes_a", default)]
    pub local_notes: Vec<String>,
    #[serde(rename = "medium_a", default)]
    pub medium: Vec<String>,
    #[serde(rename = "pool_f", default)]
    pub pool: Vec<String>,
    #[serde(rename = "published_date", default)]
    pub publication_date: String,
    #[serde(rename = "published_location_a", default)]
    pub published_location: Vec<String>,
    #[serde(rename = "publisher_name_a", default)]
    pub publisher_name: Vec<String>,
    #[serde(rename = "sc_availability_large_single", default)]
    pub sc_availability: String,
    #[serde(rename = "source_a", default)]
    pub source: Vec<String>,
    #[serde(rename = "title_a", default)]
    pub title: Vec<String>,
    #[serde(rename = "url_a", default)]
    pub url: Vec<String>,
    #[serde(rename = "workType_a", default)]
    pub work_types: Vec<String>,
    // not populated by the index schema; kept for URL assembly
    #[serde(skip)]
    pub edition: String,
    #[serde(skip)]
    pub issue: String,
    #[serde(skip)]
    pub volume: String,
    #[serde(skip)]
    pub copy: String,
}

/// One stored special-collections availability entry
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScAvailItem {
    #[serde(default)]
    pub barcode: String,
    #[serde(rename = "callNumber", alias = "call_number", default)]
    pub call_number: String,
    #[serde(default)]
    pub library: String,
    #[serde(rename = "currentLocation", alias = "current_location", default)]
    pub current_location: String,
    #[serde(default)]
    pub notes: String,
}

impl SolrDocument {
    /// Parse the stored SC availability blob; empty or malformed data means
    /// no enrichment
    pub fn sc_avail_items(&self) -> Vec<ScAvailItem> {
        if self.sc_availability.is_empty() {
            return Vec::new();
        }
        match serde_json::from_str::<Vec<ScAvailItem>>(&self.sc_availability) {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!("unable to parse sc availability for {}: {e}", self.id);
                Vec::new()
            }
        }
    }

    pub fn has_sc_availability(&self) -> bool {
        !self.sc_availability.is_empty()
    }

    /// First pool value; the index stores exactly one for cataloged titles
    pub fn primary_pool(&self) -> &str {
        self.pool.first().map(String::as_str).unwrap_or("")
    }

    pub fn is_streaming_video(&self) -> bool {
        self.primary_pool() == "video"
            && (self.location.iter().any(|l| l == "Internet materials")
                || self.source.iter().any(|s| s.contains("Avalon")))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SolrResponseBody {
    #[serde(default)]
    pub docs: Vec<SolrDocument>,
    #[serde(rename = "numFound", default)]
    pub num_found: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct SolrResponse {
    #[serde(default)]
    pub response: SolrResponseBody,
}

impl ServiceContext {
    /// Raw query against the configured core; `query` is everything after
    /// the core path, e.g. `select?fl=...&q=...`
    pub async fn solr_get(&self, query: &str) -> Result<Vec<u8>, RequestError> {
        let url = format!("{}/{}/{}", self.config.solr.url, self.config.solr.core, query);
        let req = self.http_client.get(url);
        self.send_request("solr", req).await
    }

    /// Fetch the index document for a catalog key
    pub async fn get_solr_doc(&self, cat_key: &str) -> Result<SolrDocument, RequestError> {
        tracing::info!("get solr doc for {cat_key}");
        let query = format!(
            "select?fl={}&q=id%3A{}",
            url_escape(SOLR_FIELD_LIST),
            url_escape(cat_key)
        );
        let raw = self.solr_get(&query).await?;
        let parsed: SolrResponse = serde_json::from_slice(&raw)
            .map_err(|e| RequestError::internal(format!("unable to parse solr response: {e}")))?;

        if parsed.response.num_found == 0 {
            return Err(RequestError::new(404, format!("no solr document found for {cat_key}")));
        }
        if parsed.response.num_found > 1 {
            tracing::warn!("more than one record found for the id: {cat_key}");
        }
        Ok(parsed.response.docs.into_iter().next().unwrap_or_default())
    }
}

/// Percent-encode a query-string value
pub fn url_escape(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sc_avail_parse() {
        let doc = SolrDocument {
            sc_availability: r#"[{"barcode":"X123","callNumber":"MSS 1234","library":"Special Collections","currentLocation":"Stacks","notes":"Box 2"}]"#.into(),
            ..Default::default()
        };
        let items = doc.sc_avail_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].barcode, "X123");
        assert_eq!(items[0].call_number, "MSS 1234");
    }

    #[test]
    fn test_sc_avail_malformed_is_empty() {
        let doc = SolrDocument {
            sc_availability: "not json".into(),
            ..Default::default()
        };
        assert!(doc.sc_avail_items().is_empty());
        assert!(doc.has_sc_availability());
    }

    #[test]
    fn test_streaming_video_detection() {
        let mut doc = SolrDocument {
            pool: vec!["video".into()],
            location: vec!["Internet materials".into()],
            ..Default::default()
        };
        assert!(doc.is_streaming_video());

        doc.location.clear();
        assert!(!doc.is_streaming_video());

        doc.source = vec!["Avalon streaming".into()];
        assert!(doc.is_streaming_video());

        doc.pool = vec!["book".into()];
        assert!(!doc.is_streaming_video());
    }

    #[test]
    fn test_url_escape() {
        assert_eq!(url_escape("a b:c"), "a+b%3Ac");
    }
}
