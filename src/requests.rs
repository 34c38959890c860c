//! Hold and scan placement
//!
//! Both route through the single upstream place-hold primitive. The client
//! contract is stable: state-changing calls answer 200 with an envelope that
//! carries either the request echo or a uniform errors block built from the
//! upstream's own message text.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{ApiError, ApiResult, RequestError};
use crate::middleware::VirgoClaims;
use crate::sirsi::{Role, SirsiKey};
use crate::ServiceContext;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HoldRequest {
    #[serde(rename = "pickupLibrary")]
    pub pickup_library: String,
    #[serde(rename = "itemBarcode")]
    pub item_barcode: String,
    #[serde(rename = "illiadTN", default, skip_serializing_if = "Option::is_none")]
    pub illiad_tn: Option<String>,
}

/// Uniform errors block for state-changing endpoints
#[derive(Debug, Clone, Default, Serialize)]
pub struct HoldErrors {
    pub sirsi: Vec<String>,
    pub item_barcode: Vec<String>,
}

impl HoldErrors {
    pub fn is_empty(&self) -> bool {
        self.sirsi.is_empty() && self.item_barcode.is_empty()
    }
}

#[derive(Debug, Serialize)]
struct SirsiHoldRequest {
    #[serde(rename = "holdType")]
    hold_type: &'static str,
    #[serde(rename = "holdRange")]
    hold_range: &'static str,
    #[serde(rename = "recallStatus")]
    recall_status: &'static str,
    #[serde(rename = "pickupLibrary")]
    pickup_library: SirsiKey,
    #[serde(rename = "itemBarcode")]
    item_barcode: String,
    #[serde(rename = "patronBarcode")]
    patron_barcode: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    comment: String,
}

/// Classify a failed place-hold response into the uniform errors block
pub fn classify_hold_failure(err: &RequestError) -> HoldErrors {
    let mut errors = HoldErrors::default();
    match serde_json::from_str::<crate::sirsi::SirsiError>(&err.message) {
        Ok(parsed) if !parsed.message_list.is_empty() => {
            for msg in parsed.message_list {
                if msg.code == "keyParseError" {
                    errors.item_barcode.push("Invalid title key".to_string());
                } else {
                    errors.sirsi.push(msg.message);
                }
            }
        }
        _ => {
            errors.sirsi.push(err.message.clone());
        }
    }
    errors
}

impl ServiceContext {
    /// Dispatch a hold to the upstream primitive as the given patron
    async fn place_hold(
        &self,
        patron_barcode: &str,
        working_library: &str,
        pickup_library: &str,
        item_barcode: &str,
        comment: &str,
    ) -> Result<(), RequestError> {
        let payload = SirsiHoldRequest {
            hold_type: "TITLE",
            hold_range: "GROUP",
            recall_status: "STANDARD",
            pickup_library: SirsiKey::new("/policy/library", pickup_library),
            item_barcode: item_barcode.to_string(),
            patron_barcode: patron_barcode.to_string(),
            comment: comment.to_string(),
        };

        let token = self.session_token().await;
        let url = format!(
            "{}/circulation/holdRecord/placeHold?includeFields=holdRecord{{*}}",
            self.config.sirsi.web_services_url
        );
        let mut headers = self.sirsi_headers(Role::Patron, &token);
        if let Ok(lib) = reqwest::header::HeaderValue::from_str(working_library) {
            headers.insert("sd-working-libraryid", lib);
        }
        let req = self.http_client.post(url).headers(headers).json(&payload);
        self.send_request("sirsi", req).await.map(|_| ())
    }
}

/// POST /requests/hold
pub async fn create_hold(
    State(ctx): State<Arc<ServiceContext>>,
    Extension(claims): Extension<VirgoClaims>,
    Json(req): Json<HoldRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    tracing::info!("{} requests hold {:?}", claims.user_id, req);

    let result = ctx
        .place_hold(
            &claims.barcode,
            &claims.home_library,
            &req.pickup_library,
            &req.item_barcode,
            req.illiad_tn.as_deref().unwrap_or(""),
        )
        .await;

    let mut hold = json!({
        "pickupLibrary": req.pickup_library,
        "itemBarcode": req.item_barcode,
        "user_id": claims.user_id,
    });
    if let Err(err) = result {
        tracing::error!("place hold {:?} failed: {}", req, err.message);
        let errors = classify_hold_failure(&err);
        hold["errors"] = json!({
            "sirsi": errors.sirsi,
            "item_barcode": errors.item_barcode,
        });
    }

    Ok(Json(json!({ "hold": hold })))
}

/// POST /requests/scan
///
/// Scans ride the same hold primitive using the fixed scan fulfillment
/// account; the ILLiad transaction number travels as the hold comment.
pub async fn create_scan(
    State(ctx): State<Arc<ServiceContext>>,
    Extension(claims): Extension<VirgoClaims>,
    Json(req): Json<HoldRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    tracing::info!("{} requests scan {:?}", claims.user_id, req);

    let result = ctx
        .place_hold(
            &ctx.config.scan_barcode,
            &ctx.config.scan_library,
            &req.pickup_library,
            &req.item_barcode,
            req.illiad_tn.as_deref().unwrap_or(""),
        )
        .await;

    let mut scan = json!({
        "pickupLibrary": req.pickup_library,
        "itemBarcode": req.item_barcode,
        "user_id": claims.user_id,
    });
    if let Err(err) = result {
        tracing::error!("place scan {:?} failed: {}", req, err.message);
        let errors = classify_hold_failure(&err);
        scan["errors"] = json!({
            "sirsi": errors.sirsi,
            "item_barcode": errors.item_barcode,
        });
    }

    Ok(Json(json!({ "scan": scan })))
}

#[derive(Debug, Deserialize)]
struct SirsiHoldRec {
    #[serde(default)]
    fields: SirsiHoldRecFields,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiHoldRecFields {
    #[serde(default)]
    patron: SirsiHoldPatron,
    #[serde(rename = "recallStatus", default)]
    recall_status: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiHoldPatron {
    #[serde(default)]
    fields: SirsiHoldPatronFields,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiHoldPatronFields {
    #[serde(rename = "alternateID", default)]
    alternate_id: String,
}

/// A hold may be cancelled only by its owner, only while it is still merely
/// placed, and never once a rush recall is in motion
pub fn hold_cancellable(user_id: &str, owner_alt_id: &str, status: &str, recall: &str) -> Result<(), &'static str> {
    if !owner_alt_id.eq_ignore_ascii_case(user_id) {
        return Err("you do not hold this item");
    }
    if !(status == "PLACED" && recall != "RUSH") {
        return Err("hold cannot be cancelled");
    }
    Ok(())
}

/// DELETE /requests/hold/:id
pub async fn delete_hold(
    State(ctx): State<Arc<ServiceContext>>,
    Extension(claims): Extension<VirgoClaims>,
    Path(hold_id): Path<String>,
) -> ApiResult<String> {
    tracing::info!("{} requests hold {hold_id} cancel", claims.user_id);

    let uri = format!(
        "/circulation/holdRecord/key/{hold_id}?includeFields=status,recallStatus,patron{{alternateID}}"
    );
    let raw = match ctx.sirsi_get(&ctx.http_client, &uri).await {
        Ok(raw) => raw,
        Err(e) if e.is_not_found() => {
            tracing::info!("{hold_id} was not found");
            return Err(ApiError::NotFound(format!("{hold_id} not found")));
        }
        Err(e) => return Err(e.into()),
    };

    let hold: SirsiHoldRec = serde_json::from_slice(&raw)?;
    if let Err(reason) = hold_cancellable(
        &claims.user_id,
        &hold.fields.patron.fields.alternate_id,
        &hold.fields.status,
        &hold.fields.recall_status,
    ) {
        tracing::info!("hold {hold_id} cancel rejected: {reason}");
        return Err(ApiError::BadRequest(reason.to_string()));
    }

    match ctx
        .sirsi_delete(&ctx.http_client, &format!("/circulation/holdRecord/key/{hold_id}"))
        .await
    {
        Ok(_) => Ok("deleted".to_string()),
        // a 204 is how the upstream says the delete worked
        Err(e) if e.status == 204 => Ok("deleted".to_string()),
        Err(e) => {
            tracing::error!("cancel hold failed: {e}");
            Err(e.into())
        }
    }
}

// ---------------------------------------------------------------------------
// renewals

#[derive(Debug, Deserialize)]
pub struct RenewRequest {
    #[serde(rename = "computing_id", default)]
    pub computing_id: String,
    pub barcodes: Vec<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct RenewResponseRec {
    pub barcode: String,
    #[serde(rename = "dueDate")]
    pub due_date: String,
    #[serde(rename = "renewalDate")]
    pub renew_date: String,
    #[serde(rename = "recallDueDate")]
    pub recall_due_date: String,
    pub status: String,
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Default, Serialize)]
pub struct RenewResponse {
    pub renewed: usize,
    pub results: Vec<RenewResponseRec>,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiRenewResponse {
    #[serde(rename = "circRecord", default)]
    circ_record: SirsiRenewCircRecord,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiRenewCircRecord {
    #[serde(default)]
    fields: SirsiRenewFields,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiRenewFields {
    #[serde(rename = "dueDate", default)]
    due_date: String,
    #[serde(rename = "recallDueDate", default)]
    recall_due_date: String,
    #[serde(rename = "renewalDate", default)]
    renewal_date: String,
    #[serde(default)]
    status: String,
}

/// POST /requests/renew
pub async fn renew_checkouts(
    State(ctx): State<Arc<ServiceContext>>,
    Extension(claims): Extension<VirgoClaims>,
    Json(req): Json<RenewRequest>,
) -> ApiResult<Json<RenewResponse>> {
    tracing::info!("user {} requests renew {:?}", claims.barcode, req.barcodes);

    let mut out = RenewResponse::default();
    for barcode in &req.barcodes {
        tracing::info!("issue renew request for {barcode}");
        let payload = json!({ "itemBarcode": barcode });
        let uri = "/circulation/circRecord/renew?includeFields=circRecord{checkOutDate,dueDate,renewalDate,status,recallDueDate}";
        match ctx.sirsi_post(&ctx.http_client, uri, &payload).await {
            Ok(raw) => {
                out.renewed += 1;
                let mut rec = RenewResponseRec {
                    barcode: barcode.clone(),
                    success: true,
                    ..Default::default()
                };
                match serde_json::from_slice::<SirsiRenewResponse>(&raw) {
                    Ok(parsed) => {
                        rec.due_date = parsed.circ_record.fields.due_date;
                        rec.renew_date = parsed.circ_record.fields.renewal_date;
                        rec.recall_due_date = parsed.circ_record.fields.recall_due_date;
                        rec.status = parsed.circ_record.fields.status;
                    }
                    Err(e) => {
                        tracing::error!("unable to parse renew {barcode} response: {e}");
                    }
                }
                out.results.push(rec);
            }
            Err(err) => {
                tracing::info!("unable to renew {barcode}: {}", err.message);
                let message = match ctx.handle_sirsi_error_response(&err) {
                    Ok(parsed) => parsed
                        .message_list
                        .first()
                        .map(|m| m.message.clone())
                        .unwrap_or_else(|| err.message.clone()),
                    Err(system_err) => system_err.message,
                };
                out.results.push(RenewResponseRec {
                    barcode: barcode.clone(),
                    success: false,
                    message,
                    ..Default::default()
                });
            }
        }
    }

    Ok(Json(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hold_cancellable_rules() {
        assert!(hold_cancellable("mst3k", "MST3K", "PLACED", "STANDARD").is_ok());
        assert_eq!(
            hold_cancellable("mst3k", "xyz9a", "PLACED", "STANDARD"),
            Err("you do not hold this item")
        );
        assert_eq!(
            hold_cancellable("mst3k", "mst3k", "BEING_HELD", "STANDARD"),
            Err("hold cannot be cancelled")
        );
        assert_eq!(
            hold_cancellable("mst3k", "mst3k", "PLACED", "RUSH"),
            Err("hold cannot be cancelled")
        );
    }

    #[test]
    fn test_classify_key_parse_error() {
        let err = RequestError::new(
            400,
            r#"{"messageList":[{"code":"keyParseError","message":"bad is not a valid key"}]}"#,
        );
        let errors = classify_hold_failure(&err);
        assert!(errors.sirsi.is_empty());
        assert_eq!(errors.item_barcode, vec!["Invalid title key"]);
    }

    #[test]
    fn test_classify_app_messages() {
        let err = RequestError::new(
            400,
            r#"{"messageList":[{"code":"hatErrorResponse.116","message":"Item is not available for hold"}]}"#,
        );
        let errors = classify_hold_failure(&err);
        assert_eq!(errors.sirsi, vec!["Item is not available for hold"]);
        assert!(errors.item_barcode.is_empty());
    }

    #[test]
    fn test_classify_system_error() {
        let err = RequestError::new(503, "http://sirsi refused connection");
        let errors = classify_hold_failure(&err);
        assert_eq!(errors.sirsi, vec!["http://sirsi refused connection"]);
    }

    #[test]
    fn test_hold_request_parse() {
        let req: HoldRequest = serde_json::from_str(
            r#"{"pickupLibrary":"CLEMONS","itemBarcode":"X001167565","illiadTN":"12345"}"#,
        )
        .unwrap();
        assert_eq!(req.pickup_library, "CLEMONS");
        assert_eq!(req.illiad_tn.as_deref(), Some("12345"));

        let bare: HoldRequest =
            serde_json::from_str(r#"{"pickupLibrary":"CLEMONS","itemBarcode":"bad"}"#).unwrap();
        assert!(bare.illiad_tn.is_none());
    }
}
