//! Fill-hold workflow
//!
//! A staff station scans a returned item's barcode and asks the connector to
//! complete whichever hold the item should fill: resolve the item, untransit
//! it when a transit drove it here, then check it out to the hold's patron.
//! The circulation hops run under the staff station's own session token, not
//! the connector's, and both go through the prompt-override engine.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{ApiError, ApiResult};
use crate::sirsi::{SirsiMessage, SirsiMessageList};
use crate::ServiceContext;

/// Header carrying the staff station's upstream session token
pub const STATION_TOKEN_HEADER: &str = "SirsiSessionToken";

/// Client id the upstream expects for hold-filling stations
const FILL_HOLD_CLIENT_ID: &str = "ILL_CKOUT";

const ITEM_FIELDS: &str = "barcode,bib{title,author},\
transit{destinationLibrary,holdRecord},\
fillableHoldList{pickupLibrary,placedLibrary,patron{displayName,alternateID,barcode}}";

// ---------------------------------------------------------------------------
// wire shapes

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SirsiFillItem {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub fields: SirsiFillItemFields,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SirsiFillItemFields {
    #[serde(default)]
    pub barcode: String,
    #[serde(default)]
    pub bib: SirsiFillBib,
    #[serde(default)]
    pub transit: Option<SirsiTransit>,
    #[serde(rename = "fillableHoldList", default)]
    pub fillable_hold_list: Vec<SirsiFillableHold>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SirsiFillBib {
    #[serde(default)]
    pub fields: SirsiFillBibFields,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SirsiFillBibFields {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SirsiTransit {
    #[serde(default)]
    pub fields: SirsiTransitFields,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SirsiTransitFields {
    #[serde(rename = "destinationLibrary", default)]
    pub destination_library: crate::sirsi::SirsiKey,
    #[serde(rename = "holdRecord", default)]
    pub hold_record: crate::sirsi::SirsiKey,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SirsiFillableHold {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub fields: SirsiFillableHoldFields,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SirsiFillableHoldFields {
    #[serde(rename = "pickupLibrary", default)]
    pub pickup_library: crate::sirsi::SirsiKey,
    #[serde(rename = "placedLibrary", default)]
    pub placed_library: crate::sirsi::SirsiKey,
    #[serde(default)]
    pub patron: SirsiFillPatron,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SirsiFillPatron {
    #[serde(default)]
    pub fields: SirsiFillPatronFields,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SirsiFillPatronFields {
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    #[serde(rename = "alternateID", default)]
    pub alternate_id: String,
    #[serde(default)]
    pub barcode: String,
}

#[derive(Debug, Default, Deserialize)]
struct UntransitResponse {
    #[serde(rename = "currentStatus", default)]
    current_status: String,
}

// ---------------------------------------------------------------------------
// workflow

/// One hold the workflow will attempt, in order
#[derive(Debug, Clone)]
pub struct HoldCandidate {
    pub hold: SirsiFillableHold,
    pub untransit: bool,
}

/// Order the fillable holds: the hold that drove an active transit is tried
/// first (and needs the untransit hop); the rest follow in list order.
pub fn order_candidates(
    transit: Option<&SirsiTransit>,
    holds: &[SirsiFillableHold],
) -> Vec<HoldCandidate> {
    let mut out = Vec::new();
    let transit_hold_key = transit
        .map(|t| t.fields.hold_record.key.clone())
        .unwrap_or_default();

    if !transit_hold_key.is_empty() {
        if let Some(hold) = holds.iter().find(|h| h.key == transit_hold_key) {
            out.push(HoldCandidate {
                hold: hold.clone(),
                untransit: true,
            });
        }
    }
    for hold in holds {
        if hold.key == transit_hold_key {
            continue;
        }
        out.push(HoldCandidate {
            hold: hold.clone(),
            untransit: false,
        });
    }
    out
}

/// Response envelope printed on the hold slip
#[derive(Debug, Default, Serialize)]
pub struct FillHoldResponse {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub author: String,
    pub barcode: String,
    #[serde(rename = "user_id", skip_serializing_if = "String::is_empty")]
    pub user_id: String,
    #[serde(rename = "patronName", skip_serializing_if = "String::is_empty")]
    pub patron_name: String,
    #[serde(rename = "pickupLibrary", skip_serializing_if = "String::is_empty")]
    pub pickup_library: String,
    #[serde(rename = "error_messages", skip_serializing_if = "Vec::is_empty")]
    pub error_messages: Vec<SirsiMessage>,
}

/// POST /requests/fill_hold/:barcode
pub async fn fill_hold(
    State(ctx): State<Arc<ServiceContext>>,
    Path(barcode): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let station_token = headers
        .get(STATION_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    if station_token.is_empty() {
        return Err(ApiError::BadRequest(
            "staff session token is required".to_string(),
        ));
    }

    tracing::info!("fill hold request for {barcode}");
    let uri = format!("/catalog/item/barcode/{barcode}?includeFields={ITEM_FIELDS}");
    let raw = ctx.sirsi_get(&ctx.http_client, &uri).await?;
    let item: SirsiFillItem = serde_json::from_slice(&raw)?;

    let mut out = FillHoldResponse {
        title: item.fields.bib.fields.title.clone(),
        author: item.fields.bib.fields.author.clone(),
        barcode: item.fields.barcode.clone(),
        ..Default::default()
    };

    if item.fields.transit.is_none() && item.fields.fillable_hold_list.is_empty() {
        tracing::info!("{barcode} has no transit and no fillable holds");
        out.error_messages.push(SirsiMessage {
            code: String::new(),
            message: "No hold for this item.".to_string(),
        });
        return Ok(Json(json!(out)));
    }

    let candidates = order_candidates(
        item.fields.transit.as_ref(),
        &item.fields.fillable_hold_list,
    );

    for candidate in candidates {
        let patron = &candidate.hold.fields.patron.fields;
        tracing::info!(
            "attempt hold {} for patron {} (untransit: {})",
            candidate.hold.key,
            patron.alternate_id,
            candidate.untransit
        );

        if candidate.untransit {
            match ctx.untransit_item(&station_token, &item.fields.barcode).await {
                Ok(()) => {}
                Err(messages) => {
                    out.error_messages.extend(messages);
                    continue;
                }
            }
        }

        match ctx
            .fill_hold_checkout(&station_token, &patron.barcode, &item.fields.barcode)
            .await
        {
            Ok(()) => {
                out.user_id = patron.alternate_id.clone();
                out.patron_name = patron.display_name.clone();
                out.pickup_library = candidate.hold.fields.pickup_library.key.clone();
                out.error_messages.clear();
                return Ok(Json(json!(out)));
            }
            Err(messages) => {
                out.error_messages.extend(messages);
            }
        }
    }

    tracing::info!("no candidate hold for {barcode} could be filled");
    Ok(Json(json!(out)))
}

impl ServiceContext {
    /// Return a transiting item to the shelf so it can be checked out. Only
    /// an ON_SHELF outcome counts as success.
    async fn untransit_item(
        &self,
        station_token: &str,
        barcode: &str,
    ) -> Result<(), Vec<SirsiMessage>> {
        let payload = json!({ "itemBarcode": barcode });
        let extra = [
            ("x-sirs-clientID", FILL_HOLD_CLIENT_ID.to_string()),
            ("sd-working-libraryid", self.config.sirsi.library.clone()),
        ];
        let overrides = vec!["CKOBLOCKS".to_string(), "/OK".to_string()];
        let result = self
            .sirsi_post_with_overrides(
                "/circulation/transit/untransit",
                &payload,
                station_token,
                &extra,
                &overrides,
                "",
            )
            .await;

        match result {
            Ok(raw) => {
                let parsed: UntransitResponse = serde_json::from_slice(&raw).unwrap_or_default();
                if parsed.current_status == "ON_SHELF" {
                    Ok(())
                } else {
                    tracing::info!(
                        "untransit of {barcode} left status [{}]",
                        parsed.current_status
                    );
                    Err(vec![SirsiMessage {
                        code: String::new(),
                        message: format!(
                            "untransit did not return the item to the shelf (status {})",
                            parsed.current_status
                        ),
                    }])
                }
            }
            Err(err) => Err(upstream_messages(&err)),
        }
    }

    /// Check the item out to the hold's patron through the override engine
    async fn fill_hold_checkout(
        &self,
        station_token: &str,
        patron_barcode: &str,
        item_barcode: &str,
    ) -> Result<(), Vec<SirsiMessage>> {
        let payload = json!({
            "itemBarcode": item_barcode,
            "patronBarcode": patron_barcode,
        });
        let extra = [
            ("x-sirs-clientID", FILL_HOLD_CLIENT_ID.to_string()),
            ("sd-working-libraryid", self.config.sirsi.library.clone()),
        ];
        let overrides = vec!["CKOBLOCKS".to_string()];
        self.sirsi_post_with_overrides(
            "/circulation/circRecord/checkOut?includeFields={*}",
            &payload,
            station_token,
            &extra,
            &overrides,
            "",
        )
        .await
        .map(|_| ())
        .map_err(|err| upstream_messages(&err))
    }
}

/// Surface the upstream's own message text, or the raw error when there is
/// no structured body
fn upstream_messages(err: &crate::error::RequestError) -> Vec<SirsiMessage> {
    match serde_json::from_str::<SirsiMessageList>(&err.message) {
        Ok(parsed) if !parsed.message_list.is_empty() => parsed.message_list,
        _ => vec![SirsiMessage {
            code: String::new(),
            message: err.message.clone(),
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hold(key: &str, patron: &str) -> SirsiFillableHold {
        SirsiFillableHold {
            key: key.into(),
            fields: SirsiFillableHoldFields {
                pickup_library: crate::sirsi::SirsiKey::new("/policy/library", "CLEMONS"),
                placed_library: crate::sirsi::SirsiKey::new("/policy/library", "UVA-LIB"),
                patron: SirsiFillPatron {
                    fields: SirsiFillPatronFields {
                        display_name: format!("Patron {patron}"),
                        alternate_id: patron.into(),
                        barcode: format!("B-{patron}"),
                    },
                },
            },
        }
    }

    fn transit_for(hold_key: &str) -> SirsiTransit {
        SirsiTransit {
            fields: SirsiTransitFields {
                destination_library: crate::sirsi::SirsiKey::new("/policy/library", "CLEMONS"),
                hold_record: crate::sirsi::SirsiKey {
                    resource: None,
                    key: hold_key.into(),
                },
            },
        }
    }

    #[test]
    fn test_transit_hold_tried_first() {
        let holds = vec![hold("H1", "aa1a"), hold("H2", "bb2b")];
        let transit = transit_for("H2");
        let candidates = order_candidates(Some(&transit), &holds);

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].hold.key, "H2");
        assert!(candidates[0].untransit);
        assert_eq!(candidates[1].hold.key, "H1");
        assert!(!candidates[1].untransit);
    }

    #[test]
    fn test_transit_hold_not_duplicated() {
        let holds = vec![hold("H1", "aa1a"), hold("H2", "bb2b")];
        let transit = transit_for("H1");
        let candidates = order_candidates(Some(&transit), &holds);
        let h1_count = candidates.iter().filter(|c| c.hold.key == "H1").count();
        assert_eq!(h1_count, 1);
    }

    #[test]
    fn test_no_transit_keeps_list_order() {
        let holds = vec![hold("H1", "aa1a"), hold("H2", "bb2b")];
        let candidates = order_candidates(None, &holds);
        assert_eq!(candidates[0].hold.key, "H1");
        assert!(candidates.iter().all(|c| !c.untransit));
    }

    #[test]
    fn test_transit_to_unknown_hold_ignored() {
        let holds = vec![hold("H1", "aa1a")];
        let transit = transit_for("H9");
        let candidates = order_candidates(Some(&transit), &holds);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].hold.key, "H1");
        assert!(!candidates[0].untransit);
    }

    #[test]
    fn test_upstream_messages_fallback() {
        let err = crate::error::RequestError::new(400, "plain text failure");
        let msgs = upstream_messages(&err);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].message, "plain text failure");

        let structured = crate::error::RequestError::new(
            400,
            r#"{"messageList":[{"code":"c1","message":"patron is blocked"}]}"#,
        );
        let msgs = upstream_messages(&structured);
        assert_eq!(msgs[0].message, "patron is blocked");
    }
}
