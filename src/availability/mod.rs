//! Availability aggregation
//!
//! Fuses the ILS bib record with the catalog-index document, filters by the
//! shadow/online rules, attaches notices, and derives the request-option
//! menu. An ILS 404 is not fatal: electronic-only titles still get their
//! index-side enrichment.

pub mod model;
pub mod options;

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::middleware::{BearerToken, VirgoClaims};
use crate::sirsi::{clean_cat_key, is_sirsi_cat_key};
use crate::solr::SolrDocument;
use crate::ServiceContext;

use model::{parse_avail_items, parse_bound_with, AvailItem, BoundWithRec, SirsiBibResponse};
use options::RequestOptions;

/// Lead-time notice for items stored off site
pub const IVY_STACKS_NOTICE: &str = "Items stored at Ivy may take up to 2 business days \
to be delivered to the requested pickup location. <a href=\"https://library.virginia.edu/ivy\" \
target=\"_blank\">More about Ivy retrieval.</a>";

/// Reading-room-only notice for medium-rare material
pub const MEDIUM_RARE_NOTICE: &str = "This item does not circulate. It will be delivered \
to the Small Special Collections reading room for supervised use.";

/// The aggregated per-title response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResponse {
    pub title_id: String,
    pub items: Vec<AvailItem>,
    pub request_options: RequestOptions,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bound_with: Vec<BoundWithRec>,
}

#[derive(Debug, Serialize)]
struct AvailabilityListPayload {
    libraries: Vec<crate::policy::LibraryRec>,
    locations: Vec<crate::policy::LocationRec>,
}

#[derive(Debug, Serialize)]
struct AvailabilityListResponse {
    availability_list: AvailabilityListPayload,
}

/// GET /availability/list
pub async fn get_availability_list(
    State(ctx): State<Arc<ServiceContext>>,
) -> ApiResult<Json<serde_json::Value>> {
    let table = ctx.policy.read().await;
    let out = AvailabilityListResponse {
        availability_list: AvailabilityListPayload {
            libraries: table.libraries.clone(),
            locations: table.locations.clone(),
        },
    };
    Ok(Json(serde_json::to_value(out)?))
}

/// GET /availability/:cat_key
pub async fn get_availability(
    State(ctx): State<Arc<ServiceContext>>,
    Extension(claims): Extension<VirgoClaims>,
    Extension(token): Extension<BearerToken>,
    Path(cat_key): Path<String>,
) -> ApiResult<Json<AvailabilityResponse>> {
    tracing::info!("get availability for {cat_key}");

    let mut items: Vec<AvailItem> = Vec::new();
    let mut bound_with: Vec<BoundWithRec> = Vec::new();
    let mut marc = None;

    if is_sirsi_cat_key(&cat_key) {
        match ctx.get_sirsi_bib(&cat_key).await? {
            Some(bib) => {
                let table = ctx.policy.read().await;
                items = parse_avail_items(&table, &bib);
                bound_with = parse_bound_with(&bib);
                marc = bib.fields.bib.clone();
                drop(table);
                ctx.attach_notices(&mut items).await;
            }
            None => {
                tracing::info!("{cat_key} not found in the ILS; falling through to index data");
            }
        }
    }

    // index-side enrichment; a missing document is fine when ILS data exists
    let solr_doc = match ctx.get_solr_doc(&cat_key).await {
        Ok(doc) => Some(doc),
        Err(e) if e.is_not_found() => None,
        Err(e) => {
            tracing::error!("solr lookup for {cat_key} failed: {e}");
            None
        }
    };

    if let Some(doc) = &solr_doc {
        append_sc_items(doc, &mut items);
    }

    let table = ctx.policy.read().await;
    let (mut request_options, pda_candidate) =
        options::derive_request_options(&table, &claims, &items);

    if let Some(doc) = &solr_doc {
        options::add_streaming_video_option(doc, &claims, &mut request_options);
        if claims.home_library == "HEALTHSCI" {
            options::add_hsl_scan_option(&ctx.config.hs_illiad_url, doc, &mut request_options);
        }
        options::add_aeon_option(&table, doc, &items, &mut request_options);
    }
    drop(table);

    if let Some(candidate) = pda_candidate {
        ctx.resolve_pda_option(&token.0, &cat_key, &candidate, marc.as_ref(), &mut request_options)
            .await;
    }

    Ok(Json(AvailabilityResponse {
        title_id: cat_key,
        items,
        request_options,
        bound_with,
    }))
}

/// Wire shape of the script-endpoint course reserve lookup
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScriptCourseReserve {
    #[serde(rename = "courseID", alias = "course_id", default)]
    pub course_id: String,
    #[serde(rename = "courseName", alias = "course_name", default)]
    pub course_name: String,
    #[serde(default)]
    pub instructor: String,
}

impl ServiceContext {
    /// Fetch the availability bib; `Ok(None)` when the ILS has no record
    pub async fn get_sirsi_bib(&self, cat_key: &str) -> ApiResult<Option<SirsiBibResponse>> {
        let uri = format!(
            "/catalog/bib/key/{}?includeFields={}",
            clean_cat_key(cat_key),
            model::AVAILABILITY_FIELDS
        );
        match self.sirsi_get(&self.slow_http_client, &uri).await {
            Ok(raw) => {
                let bib: SirsiBibResponse = serde_json::from_slice(&raw).map_err(|e| {
                    ApiError::Internal(format!("unable to parse bib response for {cat_key}: {e}"))
                })?;
                Ok(Some(bib))
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Set the location and course-reserve notices on parsed items
    pub(crate) async fn attach_notices(&self, items: &mut [AvailItem]) {
        // collect the reserve lookups first so the policy lock is not held
        // across upstream calls
        let mut reserve_barcodes: Vec<String> = Vec::new();
        {
            let table = self.policy.read().await;
            for item in items.iter_mut() {
                if table.is_ivy_stacks(&item.home_location_id) {
                    item.notice = IVY_STACKS_NOTICE.to_string();
                } else if table.is_medium_rare(&item.home_location_id) {
                    item.notice = MEDIUM_RARE_NOTICE.to_string();
                } else if table.is_course_reserve_location(&item.current_location_id) {
                    reserve_barcodes.push(item.barcode.clone());
                }
            }
        }

        for barcode in reserve_barcodes {
            match self.get_course_reserve_info(&barcode).await {
                Ok(Some(info)) if !info.course_id.is_empty() => {
                    let notice = format!(
                        "This item is on course reserve.\nCourse: {} ({})\nInstructor: {}",
                        info.course_name, info.course_id, info.instructor
                    );
                    if let Some(item) = items.iter_mut().find(|i| i.barcode == barcode) {
                        item.notice = notice;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("course reserve lookup for {barcode} failed: {e}");
                }
            }
        }
    }

    /// Query the non-REST script endpoint for an item's course reserve
    pub async fn get_course_reserve_info(
        &self,
        barcode: &str,
    ) -> Result<Option<ScriptCourseReserve>, crate::error::RequestError> {
        let url = format!(
            "{}/course_reserves?item_id={}",
            self.config.sirsi.script_url, barcode
        );
        let raw = self
            .send_request("sirsi-script", self.http_client.get(url))
            .await?;
        let parsed: Vec<ScriptCourseReserve> = serde_json::from_slice(&raw).unwrap_or_default();
        Ok(parsed.into_iter().next())
    }
}

/// Append the special-collections items stored in the index document
fn append_sc_items(doc: &SolrDocument, items: &mut Vec<AvailItem>) {
    for sc in doc.sc_avail_items() {
        items.push(AvailItem {
            barcode: sc.barcode,
            call_number: sc.call_number,
            copy_number: 0,
            library_id: "SPEC-COLL".into(),
            library: if sc.library.is_empty() {
                "Special Collections".into()
            } else {
                sc.library
            },
            current_location_id: String::new(),
            current_location: sc.current_location,
            home_location_id: String::new(),
            unavailable: false,
            notice: String::new(),
            is_video: false,
            volume: String::new(),
            sc_location: sc.notes,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_sc_items() {
        let doc = SolrDocument {
            sc_availability: r#"[{"barcode":"X9","callNumber":"MSS 9","currentLocation":"Vault","notes":"Folder 3"}]"#.into(),
            ..Default::default()
        };
        let mut items = Vec::new();
        append_sc_items(&doc, &mut items);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].library_id, "SPEC-COLL");
        assert_eq!(items[0].library, "Special Collections");
        assert_eq!(items[0].sc_location, "Folder 3");
    }

    #[test]
    fn test_script_course_reserve_parse() {
        let raw = r#"[{"courseID":"CHEM 1410","courseName":"Intro Chemistry","instructor":"Smith, A"}]"#;
        let parsed: Vec<ScriptCourseReserve> = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed[0].course_id, "CHEM 1410");
        assert_eq!(parsed[0].course_name, "Intro Chemistry");
    }

    #[tokio::test]
    async fn test_location_notices_attached() {
        let ctx = ServiceContext::new(crate::config::test_config()).unwrap();
        *ctx.policy.write().await = crate::policy::sample_table();

        let mut items = vec![
            AvailItem {
                barcode: "X001".into(),
                home_location_id: "LOCKEDSTKS".into(),
                current_location_id: "LOCKEDSTKS".into(),
                ..Default::default()
            },
            AvailItem {
                barcode: "X002".into(),
                home_location_id: "SC-IVY".into(),
                current_location_id: "SC-IVY".into(),
                ..Default::default()
            },
            AvailItem {
                barcode: "X003".into(),
                home_location_id: "STACKS".into(),
                current_location_id: "STACKS".into(),
                ..Default::default()
            },
        ];
        ctx.attach_notices(&mut items).await;

        assert_eq!(items[0].notice, MEDIUM_RARE_NOTICE);
        assert_eq!(items[1].notice, IVY_STACKS_NOTICE);
        assert!(items[2].notice.is_empty());
    }
}
