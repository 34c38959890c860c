//! DIBS short-term loan operations
//!
//! An item enters DIBS by retagging both its home location and item type to
//! the DIBS sentinel; the pre-toggle values are preserved in a DIBS-INFO
//! custom-information entry so the removal path can restore them after any
//! restart. The item update is a single PUT of the whole resource, so every
//! field the upstream sent is round-tripped untouched.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::{Extension, Json};
use chrono::{Duration, Local, SecondsFormat};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{ApiError, ApiResult, RequestError};
use crate::middleware::VirgoClaims;
use crate::sirsi::{SirsiKey, SirsiMessage, SirsiMessageList};
use crate::ServiceContext;

const DIBS_LOCATION_KEY: &str = "DIBS";
const DIBS_ITEM_TYPE_KEY: &str = "DIBS";
const DIBS_CUSTOM_INFO_KEY: &str = "DIBS-INFO";

const DIBS_STAFF_CLIENT: &str = "DIBS-STAFF";
const DIBS_PATRON_CLIENT: &str = "DIBS-PATRN";

// ---------------------------------------------------------------------------
// item wire shapes; unknown fields are carried through the PUT untouched

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DibsItem {
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub key: String,
    pub fields: DibsItemFields,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DibsItemFields {
    #[serde(rename = "homeLocation")]
    pub home_location: SirsiKey,
    #[serde(rename = "itemType")]
    pub item_type: SirsiKey,
    #[serde(rename = "customInformation", default)]
    pub custom_information: Vec<CustomInfo>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomInfo {
    #[serde(default)]
    pub resource: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key: String,
    pub fields: CustomInfoFields,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomInfoFields {
    #[serde(rename = "itemExtendedInformation")]
    pub item_extended_information: SirsiKey,
    #[serde(default)]
    pub data: String,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// The home location and item type an item had before entering DIBS
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DibsData {
    #[serde(rename = "homeLocation")]
    pub home_location: SirsiKey,
    #[serde(rename = "itemType")]
    pub item_type: SirsiKey,
}

/// Extract the saved pre-DIBS state, if any
pub fn custom_dibs_data(item: &DibsItem) -> Option<DibsData> {
    let data = item
        .fields
        .custom_information
        .iter()
        .find(|ci| ci.fields.item_extended_information.key == DIBS_CUSTOM_INFO_KEY)
        .map(|ci| ci.fields.data.clone())?;
    match serde_json::from_str(&data) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::error!("unable to parse custom dibs data: {e}");
            None
        }
    }
}

/// Retag the item for DIBS, stashing its native state. `None` when the item
/// already bears the tag and no update is needed.
pub fn apply_dibs(mut item: DibsItem) -> Option<DibsItem> {
    if custom_dibs_data(&item).is_some() && item.fields.item_type.key == DIBS_ITEM_TYPE_KEY {
        return None;
    }

    let saved = DibsData {
        home_location: SirsiKey::new("/policy/location", &item.fields.home_location.key),
        item_type: SirsiKey::new("/policy/itemType", &item.fields.item_type.key),
    };
    let data = serde_json::to_string(&saved).unwrap_or_default();
    item.fields.custom_information.push(CustomInfo {
        resource: "/catalog/item/customInformation".to_string(),
        key: String::new(),
        fields: CustomInfoFields {
            item_extended_information: SirsiKey::new(
                "/policy/itemExtendedInformation",
                DIBS_CUSTOM_INFO_KEY,
            ),
            data,
            rest: Map::new(),
        },
    });
    item.fields.home_location.key = DIBS_LOCATION_KEY.to_string();
    item.fields.item_type.key = DIBS_ITEM_TYPE_KEY.to_string();
    Some(item)
}

/// Restore the item's native state and drop only the DIBS-INFO entry.
/// `None` when there is nothing to restore.
pub fn remove_dibs(mut item: DibsItem) -> Option<DibsItem> {
    let saved = custom_dibs_data(&item);
    if saved.is_none() && item.fields.item_type.key != DIBS_ITEM_TYPE_KEY {
        return None;
    }
    let saved = saved?;

    item.fields.home_location.key = saved.home_location.key;
    item.fields.item_type.key = saved.item_type.key;
    item.fields
        .custom_information
        .retain(|ci| ci.fields.item_extended_information.key != DIBS_CUSTOM_INFO_KEY);
    Some(item)
}

// ---------------------------------------------------------------------------
// handlers

/// PUT /dibs/indibs/:barcode
pub async fn set_barcode_in_dibs(
    State(ctx): State<Arc<ServiceContext>>,
    Path(barcode): Path<String>,
) -> ApiResult<String> {
    tracing::info!("set barcode {barcode} in dibs");
    let item = ctx.get_dibs_item(&barcode).await?;

    match apply_dibs(item) {
        None => {
            tracing::warn!("{barcode} is already in dibs");
            Ok("ok".to_string())
        }
        Some(updated) => {
            ctx.update_dibs_item(&updated).await?;
            Ok("ok".to_string())
        }
    }
}

/// PUT /dibs/nodibs/:barcode
pub async fn set_barcode_not_in_dibs(
    State(ctx): State<Arc<ServiceContext>>,
    Path(barcode): Path<String>,
) -> ApiResult<String> {
    tracing::info!("set barcode {barcode} not in dibs");
    let item = ctx.get_dibs_item(&barcode).await?;

    match remove_dibs(item) {
        None => {
            tracing::warn!("{barcode} is not in dibs; nothing to do");
            Ok("ok".to_string())
        }
        Some(updated) => {
            ctx.update_dibs_item(&updated).await?;
            Ok("ok".to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DibsCheckinRequest {
    pub barcode: String,
}

#[derive(Debug, Deserialize)]
pub struct DibsCheckoutRequest {
    pub duration: String,
    #[serde(rename = "user_id", default)]
    pub user_id: String,
    pub barcode: String,
}

#[derive(Debug, Serialize)]
struct DibsErrors {
    errors: Vec<SirsiMessage>,
}

/// POST /dibs/checkin
pub async fn checkin_dibs(
    State(ctx): State<Arc<ServiceContext>>,
    Extension(claims): Extension<VirgoClaims>,
    Json(req): Json<DibsCheckinRequest>,
) -> ApiResult<axum::response::Response> {
    tracing::info!("user {} requests dibs checkin of {}", claims.user_id, req.barcode);

    let info = ctx
        .get_dibs_checkout_info(&claims.user_id, &req.barcode)
        .await
        .map_err(|e| ApiError::BadRequest(e.message))?;
    if !info.checked_out {
        tracing::info!("{} requests dibs checkin and item is not checked out", claims.user_id);
        return Ok(ok_response());
    }

    let payload = json!({ "itemBarcode": req.barcode });
    let extra = [
        ("x-sirs-clientID", DIBS_PATRON_CLIENT.to_string()),
        ("sd-working-libraryid", ctx.config.sirsi.library.clone()),
    ];
    let token = ctx.session_token().await;
    let overrides = vec![String::new()];
    let result = ctx
        .sirsi_post_with_overrides(
            "/circulation/circRecord/checkIn?includeFields={*}",
            &payload,
            &token,
            &extra,
            &overrides,
            "",
        )
        .await;

    match result {
        Ok(_) => Ok(ok_response()),
        Err(err) => Ok(dibs_circ_error(err)),
    }
}

/// POST /dibs/checkout
pub async fn checkout_dibs(
    State(ctx): State<Arc<ServiceContext>>,
    Extension(claims): Extension<VirgoClaims>,
    Json(req): Json<DibsCheckoutRequest>,
) -> ApiResult<axum::response::Response> {
    let duration_hours: i64 = req
        .duration
        .parse()
        .map_err(|_| ApiError::BadRequest("invalid duration".to_string()))?;
    // the upstream only validates RFC3339 due dates
    let due_date = (Local::now() + Duration::hours(duration_hours))
        .to_rfc3339_opts(SecondsFormat::Secs, true);

    tracing::info!(
        "user {} requests dibs checkout of {} for {} hours",
        claims.user_id,
        req.barcode,
        req.duration
    );
    let info = ctx
        .get_dibs_checkout_info(&claims.user_id, &req.barcode)
        .await
        .map_err(|e| ApiError::BadRequest(e.message))?;
    if info.checked_out {
        tracing::info!("{} requests dibs checkout and item is already checked out", claims.user_id);
        return Ok(ok_response());
    }

    let payload = json!({
        "itemBarcode": info.item_barcode,
        "patronBarcode": info.user_barcode,
        "dueDate": due_date,
        "reserveCollection": SirsiKey::new("/policy/reserveCollection", "DIBS-E-RES"),
    });
    let extra = [
        ("x-sirs-clientID", DIBS_PATRON_CLIENT.to_string()),
        ("sd-working-libraryid", ctx.config.sirsi.library.clone()),
    ];
    let token = ctx.session_token().await;
    let overrides = vec!["CIRC_NONCHARGEABLE_OVRCD/DIBSDIBS".to_string()];
    let result = ctx
        .sirsi_post_with_overrides(
            "/circulation/circRecord/checkOut?includeFields={*}",
            &payload,
            &token,
            &extra,
            &overrides,
            "",
        )
        .await;

    match result {
        Ok(_) => {
            tracing::info!("{} was checked out", req.barcode);
            Ok(ok_response())
        }
        Err(err) => Ok(dibs_circ_error(err)),
    }
}

fn ok_response() -> axum::response::Response {
    use axum::response::IntoResponse;
    "ok".into_response()
}

/// Render a failed DIBS circulation call with the upstream's message list,
/// preserving the upstream status
fn dibs_circ_error(err: RequestError) -> axum::response::Response {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    let status = StatusCode::from_u16(err.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match serde_json::from_str::<SirsiMessageList>(&err.message) {
        Ok(parsed) if !parsed.message_list.is_empty() => (
            status,
            Json(json!(DibsErrors {
                errors: parsed.message_list,
            })),
        )
            .into_response(),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

// ---------------------------------------------------------------------------
// upstream helpers

/// Whether the patron currently has the item charged
#[derive(Debug, Default)]
pub struct DibsCheckoutInfo {
    pub user_barcode: String,
    pub item_barcode: String,
    pub checked_out: bool,
    pub library_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiPatronCheckouts {
    #[serde(default)]
    fields: SirsiPatronCheckoutFields,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiPatronCheckoutFields {
    #[serde(default)]
    barcode: String,
    #[serde(rename = "circRecordList", default)]
    circ_record_list: Vec<SirsiCircRecord>,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiCircRecord {
    #[serde(default)]
    fields: SirsiCircRecordFields,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiCircRecordFields {
    #[serde(default)]
    item: SirsiCircItem,
    #[serde(default)]
    library: SirsiKey,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiCircItem {
    #[serde(default)]
    fields: SirsiCircItemFields,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiCircItemFields {
    #[serde(default)]
    barcode: String,
}

impl ServiceContext {
    async fn get_dibs_item(&self, barcode: &str) -> ApiResult<DibsItem> {
        let uri = format!("/catalog/item/barcode/{barcode}?includeFields=*,customInformation{{*}}");
        let raw = self
            .sirsi_get(&self.http_client, &uri)
            .await
            .map_err(|e| ApiError::Internal(format!("unable to get {barcode} info: {}", e.message)))?;
        let item: DibsItem = serde_json::from_slice(&raw).map_err(|e| {
            ApiError::Internal(format!("unable to parse item response for {barcode}: {e}"))
        })?;
        Ok(item)
    }

    async fn update_dibs_item(&self, item: &DibsItem) -> ApiResult<()> {
        let uri = format!("/catalog/item/key/{}", item.key);
        let extra = [
            ("x-sirs-clientID", DIBS_STAFF_CLIENT.to_string()),
            ("SD-Prompt-Return", String::new()),
        ];
        self.sirsi_put(&self.http_client, &uri, item, &extra)
            .await
            .map_err(ApiError::from)?;
        Ok(())
    }

    /// Look through the patron's checkouts for the target barcode
    pub async fn get_dibs_checkout_info(
        &self,
        compute_id: &str,
        barcode: &str,
    ) -> Result<DibsCheckoutInfo, RequestError> {
        let uri = format!(
            "/user/patron/alternateID/{compute_id}?includeFields=barcode,circRecordList{{library,item{{barcode}}}}"
        );
        let raw = self
            .sirsi_get(&self.slow_http_client, &uri)
            .await
            .map_err(|e| RequestError::new(e.status, format!("unable to get {compute_id} checkouts: {}", e.message)))?;

        let parsed: SirsiPatronCheckouts = serde_json::from_slice(&raw).map_err(|e| {
            RequestError::internal(format!(
                "unable to parse user checkouts response for {compute_id}: {e}"
            ))
        })?;

        let mut out = DibsCheckoutInfo {
            user_barcode: parsed.fields.barcode,
            item_barcode: barcode.to_string(),
            ..Default::default()
        };
        for cr in parsed.fields.circ_record_list {
            if cr.fields.item.fields.barcode == barcode {
                out.library_id = cr.fields.library.key;
                out.checked_out = true;
                break;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_item() -> DibsItem {
        serde_json::from_value(json!({
            "resource": "/catalog/item",
            "key": "999:1:1",
            "fields": {
                "barcode": "X032746483",
                "circulate": true,
                "homeLocation": {"resource": "/policy/location", "key": "STACKS"},
                "itemType": {"resource": "/policy/itemType", "key": "BOOK"},
                "customInformation": [{
                    "resource": "/catalog/item/customInformation",
                    "key": "1",
                    "fields": {
                        "itemExtendedInformation": {"resource": "/policy/itemExtendedInformation", "key": "NOTE"},
                        "data": "existing note"
                    }
                }]
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_apply_dibs_retags_and_saves_state() {
        let updated = apply_dibs(sample_item()).expect("item should be retagged");
        assert_eq!(updated.fields.home_location.key, "DIBS");
        assert_eq!(updated.fields.item_type.key, "DIBS");

        let saved = custom_dibs_data(&updated).expect("state should be saved");
        assert_eq!(saved.home_location.key, "STACKS");
        assert_eq!(saved.item_type.key, "BOOK");
    }

    #[test]
    fn test_apply_dibs_idempotent() {
        let tagged = apply_dibs(sample_item()).unwrap();
        assert!(apply_dibs(tagged).is_none());
    }

    #[test]
    fn test_remove_dibs_round_trip() {
        let original = sample_item();
        let tagged = apply_dibs(original.clone()).unwrap();
        let restored = remove_dibs(tagged).expect("item should be restored");

        assert_eq!(restored.fields.home_location.key, original.fields.home_location.key);
        assert_eq!(restored.fields.item_type.key, original.fields.item_type.key);
        // the unrelated custom entry survives, the DIBS-INFO entry is gone
        assert_eq!(restored.fields.custom_information.len(), 1);
        assert_eq!(
            restored.fields.custom_information[0].fields.item_extended_information.key,
            "NOTE"
        );
    }

    #[test]
    fn test_remove_dibs_noop_without_tag() {
        assert!(remove_dibs(sample_item()).is_none());
    }

    #[test]
    fn test_unknown_fields_round_trip() {
        let tagged = apply_dibs(sample_item()).unwrap();
        let serialized = serde_json::to_value(&tagged).unwrap();
        // fields the connector does not model are still present for the PUT
        assert_eq!(serialized["fields"]["barcode"], "X032746483");
        assert_eq!(serialized["fields"]["circulate"], true);
    }
}
