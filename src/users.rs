//! User data endpoints
//!
//! Fuses the user-directory record with the ILS patron record, and projects
//! bills, checkouts, and holds into the client shapes. Checkouts are also
//! exported as CSV for download.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult, RequestError};
use crate::sirsi::SirsiKey;
use crate::ServiceContext;

// ---------------------------------------------------------------------------
// user-directory service

#[derive(Debug, Default, Deserialize)]
struct UserInfoResponse {
    #[serde(default)]
    user: UserInfoRecord,
}

#[derive(Debug, Default, Deserialize)]
struct UserInfoRecord {
    #[serde(default)]
    cid: String,
    #[serde(default)]
    title: Vec<String>,
    #[serde(default)]
    department: Vec<String>,
    #[serde(default)]
    description: Vec<String>,
    #[serde(default)]
    office: Vec<String>,
    #[serde(default)]
    private: String,
}

#[derive(Debug, Serialize)]
struct ServiceTokenClaims {
    exp: i64,
    iss: &'static str,
}

impl ServiceContext {
    /// Short-lived token for calls into the user-directory service
    pub fn mint_user_service_jwt(&self) -> String {
        let claims = ServiceTokenClaims {
            exp: (Utc::now() + chrono::Duration::minutes(5)).timestamp(),
            iss: "ilsconnector",
        };
        let key = EncodingKey::from_secret(self.config.secrets.user_jwt_key.as_bytes());
        match encode(&Header::default(), &claims, &key) {
            Ok(token) => token,
            Err(e) => {
                tracing::error!("unable to mint one-time access token: {e}");
                String::new()
            }
        }
    }

    /// GET against an auxiliary service with a minted bearer token
    pub async fn service_get(&self, url: &str) -> Result<Vec<u8>, RequestError> {
        let req = self
            .http_client
            .get(url)
            .header("Authorization", format!("Bearer {}", self.mint_user_service_jwt()));
        self.send_request("user-ws", req).await
    }
}

// ---------------------------------------------------------------------------
// sirsi patron wire shapes

#[derive(Debug, Default, Deserialize)]
struct SirsiUserData {
    #[serde(default)]
    fields: SirsiUserFields,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiUserFields {
    #[serde(rename = "displayName", default)]
    display_name: String,
    #[serde(default)]
    barcode: String,
    #[serde(rename = "firstName", default)]
    first_name: String,
    #[serde(rename = "lastName", default)]
    last_name: String,
    #[serde(rename = "middleName", default)]
    middle_name: String,
    #[serde(rename = "preferredName", default)]
    preferred_name: String,
    #[serde(rename = "primaryAddress", default)]
    primary_address: SirsiPrimaryAddress,
    #[serde(default)]
    profile: SirsiKey,
    #[serde(rename = "patronStatusInfo", default)]
    patron_status_info: SirsiPatronStatus,
    #[serde(default)]
    library: SirsiKey,
    #[serde(default)]
    address1: Vec<SirsiAddressData>,
    #[serde(default)]
    address2: Vec<SirsiAddressData>,
    #[serde(default)]
    address3: Vec<SirsiAddressData>,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiPrimaryAddress {
    #[serde(default)]
    fields: SirsiPrimaryAddressFields,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiPrimaryAddressFields {
    #[serde(rename = "emailAddress", default)]
    email_address: String,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiPatronStatus {
    #[serde(default)]
    key: String,
    #[serde(default)]
    fields: SirsiPatronStatusFields,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiPatronStatusFields {
    #[serde(default)]
    standing: SirsiKey,
    #[serde(rename = "amountOwed", default)]
    amount_owed: SirsiAmount,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiAmount {
    #[serde(default)]
    amount: String,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiAddressData {
    #[serde(default)]
    fields: SirsiAddressFields,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiAddressFields {
    #[serde(default)]
    code: SirsiKey,
    #[serde(default)]
    data: String,
}

// ---------------------------------------------------------------------------
// client shapes

#[derive(Debug, Default, Serialize)]
pub struct UserAddress {
    pub line1: String,
    pub line2: String,
    pub line3: String,
    pub zip: String,
    pub phone: String,
}

#[derive(Debug, Default, Serialize)]
pub struct SirsiProfile {
    #[serde(rename = "preferredName")]
    pub preferred_name: String,
    #[serde(rename = "firstName")]
    pub first_name: String,
    #[serde(rename = "middleName")]
    pub middle_name: String,
    #[serde(rename = "lastName")]
    pub last_name: String,
    pub address1: UserAddress,
    pub address2: UserAddress,
    #[serde(rename = "address3Email")]
    pub address3_email: String,
}

#[derive(Debug, Default, Serialize)]
pub struct UserDetails {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "communityUser")]
    pub community_user: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub department: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub address: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub private: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub barcode: String,
    pub key: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    pub email: String,
    #[serde(rename = "sirsiProfile")]
    pub sirsi_profile: SirsiProfile,
    pub profile: String,
    pub standing: String,
    #[serde(rename = "homeLibrary")]
    pub home_library: String,
    #[serde(rename = "amountOwed")]
    pub amount_owed: String,
}

fn extract_address(dest: &mut UserAddress, src: &[SirsiAddressData]) {
    for entry in src {
        match entry.fields.code.key.as_str() {
            "LINE1" => dest.line1 = entry.fields.data.clone(),
            "LINE2" => dest.line2 = entry.fields.data.clone(),
            "LINE3" => dest.line3 = entry.fields.data.clone(),
            "ZIP" => dest.zip = entry.fields.data.clone(),
            "PHONE" => dest.phone = entry.fields.data.clone(),
            _ => {}
        }
    }
}

/// GET /users/:compute_id
pub async fn get_user_info(
    State(ctx): State<Arc<ServiceContext>>,
    Path(compute_id): Path<String>,
) -> ApiResult<Json<UserDetails>> {
    tracing::info!("lookup user {compute_id} in user-ws");
    let mut user = UserDetails::default();

    let dir_url = format!("{}/user/{compute_id}", ctx.config.user_info_url);
    match ctx.service_get(&dir_url).await {
        Err(_) => {
            tracing::info!("user {compute_id} not found in user-ws; flagging as community user");
            user.community_user = true;
        }
        Ok(raw) => {
            let parsed: UserInfoResponse = serde_json::from_slice(&raw)?;
            user.id = parsed.user.cid;
            user.community_user = false;
            user.title = parsed.user.title.first().cloned().unwrap_or_default();
            user.department = parsed.user.department.join(", ");
            user.address = parsed.user.office.first().cloned().unwrap_or_default();
            user.description = parsed.user.description.join(", ");
            user.private = parsed.user.private;
        }
    }

    tracing::info!("lookup user {compute_id} in sirsi");
    let fields = "barcode,primaryAddress{*},address1,address2,address3,displayName,preferredName,\
firstName,middleName,lastName,profile,patronStatusInfo{standing,amountOwed},library";
    let uri = format!("/user/patron/alternateID/{compute_id}?includeFields={fields}");
    let raw = ctx.sirsi_get(&ctx.http_client, &uri).await?;
    let sirsi: SirsiUserData = serde_json::from_slice(&raw)?;

    let fields = sirsi.fields;
    user.barcode = fields.barcode;
    user.key = fields.patron_status_info.key.clone();
    user.display_name = fields.display_name;
    user.sirsi_profile.preferred_name = fields.preferred_name;
    user.sirsi_profile.first_name = fields.first_name;
    user.sirsi_profile.middle_name = fields.middle_name;
    user.sirsi_profile.last_name = fields.last_name;
    user.profile = fields.profile.key;
    user.home_library = fields.library.key;

    extract_address(&mut user.sirsi_profile.address1, &fields.address1);
    extract_address(&mut user.sirsi_profile.address2, &fields.address2);

    // address3 holds only the email entry
    if fields.address3.len() > 1 {
        tracing::warn!("sirsi address3 field does not follow convention for {compute_id}");
    }
    for a3 in &fields.address3 {
        if a3.fields.code.key == "EMAIL" {
            user.sirsi_profile.address3_email = a3.fields.data.clone();
        }
    }

    // nightly workflows wipe DELINQUENT standing; normalize any stragglers
    user.standing = fields.patron_status_info.fields.standing.key;
    if user.standing == "DELINQUENT" {
        user.standing = "OK".to_string();
    }
    user.amount_owed = fields.patron_status_info.fields.amount_owed.amount;
    user.email = fields.primary_address.fields.email_address;
    if user.email.is_empty() {
        tracing::warn!("{compute_id} does not have a sirsi email");
    }

    Ok(Json(user))
}

// ---------------------------------------------------------------------------
// bills

#[derive(Debug, Default, Deserialize)]
struct SirsiBillResponse {
    #[serde(default)]
    fields: SirsiBillFields,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiBillFields {
    #[serde(rename = "blockList", default)]
    block_list: Vec<SirsiBillBlock>,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiBillBlock {
    #[serde(default)]
    fields: SirsiBillBlockFields,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiBillBlockFields {
    #[serde(rename = "createDate", default)]
    create_date: String,
    #[serde(default)]
    amount: SirsiAmount,
    #[serde(default)]
    block: SirsiDescribed,
    #[serde(default)]
    item: SirsiBillItem,
    #[serde(default)]
    library: SirsiDescribed,
    #[serde(rename = "callNumber", default)]
    call_number: String,
    #[serde(default)]
    title: String,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiDescribed {
    #[serde(default)]
    fields: crate::sirsi::SirsiDescription,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiBillItem {
    #[serde(default)]
    fields: SirsiBillItemFields,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiBillItemFields {
    #[serde(default)]
    bib: SirsiBillBib,
    #[serde(default)]
    barcode: String,
    #[serde(rename = "itemType", default)]
    item_type: SirsiDescribed,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiBillBib {
    #[serde(default)]
    key: String,
    #[serde(default)]
    fields: SirsiBillBibFields,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiBillBibFields {
    #[serde(default)]
    author: String,
}

#[derive(Debug, Default, Serialize)]
pub struct BillItemDetail {
    pub id: u64,
    pub barcode: String,
    #[serde(rename = "callNumber")]
    pub call_number: String,
    #[serde(rename = "type")]
    pub item_type: String,
    pub title: String,
    pub author: String,
}

#[derive(Debug, Default, Serialize)]
pub struct BillItem {
    pub reason: String,
    pub amount: u64,
    pub library: String,
    pub date: String,
    pub item: BillItemDetail,
}

/// GET /users/:compute_id/bills
pub async fn get_user_bills(
    State(ctx): State<Arc<ServiceContext>>,
    Path(compute_id): Path<String>,
) -> ApiResult<Json<Vec<BillItem>>> {
    tracing::info!("get bills for {compute_id}");
    let fields = "blockList{title,callNumber,amount,createDate,library{description},\
block{description},item{itemType{description},barcode,bib{author}}}";
    let uri = format!("/user/patron/alternateID/{compute_id}?includeFields={fields}");
    let raw = ctx.sirsi_get(&ctx.http_client, &uri).await?;
    let parsed: SirsiBillResponse = serde_json::from_slice(&raw)?;

    let bills = parsed
        .fields
        .block_list
        .into_iter()
        .map(|bl| {
            let f = bl.fields;
            BillItem {
                reason: f.block.fields.description,
                amount: f.amount.amount.parse::<f64>().unwrap_or(0.0) as u64,
                library: f.library.fields.description,
                date: f.create_date,
                item: BillItemDetail {
                    id: f.item.fields.bib.key.parse().unwrap_or(0),
                    barcode: f.item.fields.barcode,
                    call_number: f.call_number,
                    item_type: f.item.fields.item_type.fields.description,
                    title: f.title,
                    author: f.item.fields.bib.fields.author,
                },
            }
        })
        .collect();

    Ok(Json(bills))
}

// ---------------------------------------------------------------------------
// checkouts

#[derive(Debug, Default, Deserialize)]
struct SirsiCheckoutResponse {
    #[serde(default)]
    fields: SirsiCheckoutFields,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiCheckoutFields {
    #[serde(rename = "circRecordList", default)]
    circ_record_list: Vec<SirsiCheckoutCirc>,
    #[serde(rename = "blockList", default)]
    block_list: Vec<SirsiCheckoutBlock>,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiCheckoutBlock {
    #[serde(default)]
    fields: SirsiCheckoutBlockFields,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiCheckoutBlockFields {
    #[serde(default)]
    amount: SirsiAmount,
    #[serde(default)]
    block: SirsiDescribed,
    #[serde(default)]
    item: SirsiKey,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiCheckoutCirc {
    #[serde(default)]
    fields: SirsiCheckoutCircFields,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiCheckoutCircFields {
    #[serde(default)]
    item: SirsiCheckoutItem,
    #[serde(rename = "dueDate", default)]
    due_date: String,
    #[serde(default)]
    library: SirsiDescribed,
    #[serde(default)]
    overdue: bool,
    #[serde(rename = "estimatedOverdueAmount", default)]
    estimated_overdue_amount: SirsiAmount,
    #[serde(rename = "recallDueDate", default)]
    recall_due_date: String,
    #[serde(rename = "renewalDate", default)]
    renewal_date: String,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiCheckoutItem {
    #[serde(default)]
    key: String,
    #[serde(default)]
    fields: SirsiCheckoutItemFields,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiCheckoutItemFields {
    #[serde(default)]
    call: SirsiCheckoutCall,
    #[serde(default)]
    barcode: String,
    #[serde(rename = "currentLocation", default)]
    current_location: SirsiKey,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiCheckoutCall {
    #[serde(default)]
    fields: SirsiCheckoutCallFields,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiCheckoutCallFields {
    #[serde(default)]
    bib: SirsiCheckoutBib,
    #[serde(rename = "dispCallNumber", default)]
    disp_call_number: String,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiCheckoutBib {
    #[serde(default)]
    key: String,
    #[serde(default)]
    fields: SirsiCheckoutBibFields,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiCheckoutBibFields {
    #[serde(default)]
    author: String,
    #[serde(default)]
    title: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckoutBill {
    pub amount: String,
    pub label: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckoutDetails {
    pub id: String,
    pub title: String,
    pub author: String,
    pub barcode: String,
    #[serde(rename = "callNumber")]
    pub call_number: String,
    pub library: String,
    #[serde(rename = "currentLocation")]
    pub current_location: String,
    pub due: String,
    #[serde(rename = "overDue")]
    pub overdue: bool,
    #[serde(rename = "overdueFee")]
    pub overdue_fee: String,
    pub bills: Vec<CheckoutBill>,
    #[serde(rename = "recallDueDate")]
    pub recall_due_date: String,
    #[serde(rename = "renewDate")]
    pub renew_date: String,
}

impl ServiceContext {
    async fn get_sirsi_user_checkouts(
        &self,
        compute_id: &str,
    ) -> Result<Vec<CheckoutDetails>, ApiError> {
        let fields = "blockList{amount,block{description},item{key}},\
circRecordList{circulationRule{billStructure{maxFee}},dueDate,overdue,estimatedOverdueAmount,\
recallDueDate,renewalDate,library{description},item{key,barcode,currentLocation,\
call{dispCallNumber,bib{key,author,title}}}}";
        let uri = format!("/user/patron/alternateID/{compute_id}?includeFields={fields}");
        let raw = self.sirsi_get(&self.slow_http_client, &uri).await?;
        let parsed: SirsiCheckoutResponse = serde_json::from_slice(&raw)?;

        let table = self.policy.read().await;
        let mut checkouts = Vec::new();
        for cr in &parsed.fields.circ_record_list {
            let call = &cr.fields.item.fields.call.fields;
            let bills: Vec<CheckoutBill> = parsed
                .fields
                .block_list
                .iter()
                .filter(|bl| bl.fields.item.key == cr.fields.item.key)
                .map(|bl| CheckoutBill {
                    amount: bl.fields.amount.amount.clone(),
                    label: bl.fields.block.fields.description.clone(),
                })
                .collect();

            let current_location = table
                .find_location(&cr.fields.item.fields.current_location.key)
                .map(|loc| loc.description.clone())
                .unwrap_or_default();

            checkouts.push(CheckoutDetails {
                id: call.bib.key.clone(),
                title: call.bib.fields.title.clone(),
                author: call.bib.fields.author.clone(),
                barcode: cr.fields.item.fields.barcode.clone(),
                call_number: call.disp_call_number.clone(),
                library: cr.fields.library.fields.description.clone(),
                current_location,
                due: cr.fields.due_date.clone(),
                overdue: !bills.is_empty(),
                overdue_fee: cr.fields.estimated_overdue_amount.amount.clone(),
                bills,
                recall_due_date: cr.fields.recall_due_date.clone(),
                renew_date: cr.fields.renewal_date.clone(),
            });
        }
        Ok(checkouts)
    }
}

/// GET /users/:compute_id/checkouts
pub async fn get_user_checkouts(
    State(ctx): State<Arc<ServiceContext>>,
    Path(compute_id): Path<String>,
) -> ApiResult<Json<Vec<CheckoutDetails>>> {
    tracing::info!("get checkouts for {compute_id}");
    let checkouts = ctx.get_sirsi_user_checkouts(&compute_id).await?;
    Ok(Json(checkouts))
}

/// GET /users/:compute_id/checkouts.csv
pub async fn get_user_checkouts_csv(
    State(ctx): State<Arc<ServiceContext>>,
    Path(compute_id): Path<String>,
) -> ApiResult<Response> {
    tracing::info!("get checkouts csv for {compute_id}");
    let checkouts = ctx.get_sirsi_user_checkouts(&compute_id).await?;

    let csv = render_checkouts_csv(&checkouts)
        .map_err(|e| ApiError::Internal(format!("unable to render checkouts csv: {e}")))?;
    let headers = [
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename={compute_id}_checkouts.csv"),
        ),
        (header::CONTENT_TYPE, "text/csv".to_string()),
    ];
    Ok((StatusCode::OK, headers, csv).into_response())
}

/// Render the fixed-column checkouts export
pub fn render_checkouts_csv(checkouts: &[CheckoutDetails]) -> Result<String, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "Id",
        "Title",
        "Author",
        "Barcode",
        "Call Number",
        "Library",
        "Current Location",
        "Due",
        "Over Due",
        "Overdue Fee",
        "Bills",
        "Recall Due Date",
        "Renew Date",
    ])?;

    for co in checkouts {
        let bills: Vec<String> = co
            .bills
            .iter()
            .map(|b| format!("{{reason: {}, amount: {}}}", b.label, b.amount))
            .collect();
        writer.write_record([
            co.id.as_str(),
            co.title.as_str(),
            co.author.as_str(),
            co.barcode.as_str(),
            co.call_number.as_str(),
            co.library.as_str(),
            co.current_location.as_str(),
            co.due.as_str(),
            if co.overdue { "true" } else { "false" },
            co.overdue_fee.as_str(),
            bills.join(",").as_str(),
            co.recall_due_date.as_str(),
            co.renew_date.as_str(),
        ])?;
    }

    let bytes = writer.into_inner().unwrap_or_default();
    Ok(String::from_utf8_lossy(&bytes).to_string())
}

// ---------------------------------------------------------------------------
// holds

#[derive(Debug, Default, Deserialize)]
struct SirsiHoldsResponse {
    #[serde(default)]
    fields: SirsiHoldsFields,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiHoldsFields {
    #[serde(rename = "holdRecordList", default)]
    hold_record_list: Vec<SirsiHoldRecord>,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiHoldRecord {
    #[serde(default)]
    key: String,
    #[serde(default)]
    fields: SirsiHoldRecordFields,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiHoldRecordFields {
    #[serde(default)]
    bib: SirsiCheckoutBib,
    #[serde(default)]
    item: SirsiHoldItem,
    #[serde(rename = "beingHeldDate", default)]
    being_held_date: String,
    #[serde(rename = "pickupLibrary", default)]
    pickup_library: SirsiKey,
    #[serde(rename = "placedDate", default)]
    placed_date: String,
    #[serde(rename = "queueLength", default)]
    queue_length: u64,
    #[serde(rename = "queuePosition", default)]
    queue_position: u64,
    #[serde(rename = "recallStatus", default)]
    recall_status: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiHoldItem {
    #[serde(default)]
    fields: SirsiHoldItemFields,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiHoldItemFields {
    #[serde(default)]
    call: SirsiCheckoutCall,
    #[serde(default)]
    barcode: String,
    #[serde(rename = "currentLocation", default)]
    current_location: SirsiKey,
    #[serde(default)]
    transit: SirsiHoldTransit,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiHoldTransit {
    #[serde(default)]
    fields: SirsiHoldTransitFields,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiHoldTransitFields {
    #[serde(rename = "transitReason", default)]
    transit_reason: String,
}

#[derive(Debug, Default, Serialize)]
pub struct HoldDetails {
    pub id: String,
    #[serde(rename = "userID")]
    pub user_id: String,
    #[serde(rename = "pickupLocation")]
    pub pickup_location: String,
    pub status: String,
    #[serde(rename = "placedDate")]
    pub placed_date: String,
    #[serde(rename = "queueLength")]
    pub queue_length: u64,
    #[serde(rename = "queuePosition")]
    pub queue_position: u64,
    #[serde(rename = "titleKey")]
    pub title_key: String,
    pub title: String,
    pub author: String,
    #[serde(rename = "callNumber")]
    pub call_number: String,
    pub barcode: String,
    #[serde(rename = "itemStatus")]
    pub item_status: String,
    pub cancellable: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct HoldsResponse {
    pub holds: Vec<HoldDetails>,
}

/// Decorate the raw hold/item status the way the account page shows it
pub fn hold_display_status(status: &str, being_held_date: &str) -> String {
    if status == "BEING_HELD" {
        format!("AWAITING PICKUP since {being_held_date}")
    } else {
        status.to_string()
    }
}

pub fn hold_item_status(current_location: &str, recall_status: &str, transit_reason: &str) -> String {
    if current_location == "CHECKEDOUT" && recall_status == "RUSH" {
        "CHECKED OUT, recalled from borrower.".to_string()
    } else if current_location == "INTRANSIT" && transit_reason == "HOLD" {
        "IN TRANSIT for hold".to_string()
    } else {
        current_location.to_string()
    }
}

/// GET /users/:compute_id/holds
pub async fn get_user_holds(
    State(ctx): State<Arc<ServiceContext>>,
    Path(compute_id): Path<String>,
) -> ApiResult<Json<HoldsResponse>> {
    tracing::info!("get holds for {compute_id}");
    let fields = "holdRecordList{*,bib{title,author},item{barcode,currentLocation,library,\
transit{transitReason},call{dispCallNumber}}}";
    let uri = format!("/user/patron/alternateID/{compute_id}?includeFields={fields}");
    let raw = ctx.sirsi_get(&ctx.slow_http_client, &uri).await?;
    let parsed: SirsiHoldsResponse = serde_json::from_slice(&raw)?;

    let holds = parsed
        .fields
        .hold_record_list
        .into_iter()
        .map(|hr| {
            let f = hr.fields;
            let mut pickup_location = f.pickup_library.key.clone();
            if pickup_location == "LEO" {
                pickup_location = "LEO delivery".to_string();
            }
            HoldDetails {
                id: hr.key,
                user_id: compute_id.clone(),
                status: hold_display_status(&f.status, &f.being_held_date),
                pickup_location,
                item_status: hold_item_status(
                    f.item.fields.current_location.key.trim(),
                    &f.recall_status,
                    &f.item.fields.transit.fields.transit_reason,
                ),
                cancellable: f.status == "PLACED" && f.recall_status != "RUSH",
                placed_date: f.placed_date,
                queue_length: f.queue_length,
                queue_position: f.queue_position,
                title_key: f.bib.key,
                title: f.bib.fields.title,
                author: f.bib.fields.author,
                call_number: f.item.fields.call.fields.disp_call_number,
                barcode: f.item.fields.barcode,
            }
        })
        .collect();

    Ok(Json(HoldsResponse { holds }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_address() {
        let src: Vec<SirsiAddressData> = serde_json::from_str(
            r#"[
                {"fields": {"code": {"key": "LINE1"}, "data": "123 Main St"}},
                {"fields": {"code": {"key": "ZIP"}, "data": "22903"}},
                {"fields": {"code": {"key": "PHONE"}, "data": "555-1234"}}
            ]"#,
        )
        .unwrap();
        let mut addr = UserAddress::default();
        extract_address(&mut addr, &src);
        assert_eq!(addr.line1, "123 Main St");
        assert_eq!(addr.zip, "22903");
        assert_eq!(addr.phone, "555-1234");
        assert!(addr.line2.is_empty());
    }

    #[test]
    fn test_hold_status_decoration() {
        assert_eq!(
            hold_display_status("BEING_HELD", "2026-07-01"),
            "AWAITING PICKUP since 2026-07-01"
        );
        assert_eq!(hold_display_status("PLACED", ""), "PLACED");

        assert_eq!(
            hold_item_status("CHECKEDOUT", "RUSH", ""),
            "CHECKED OUT, recalled from borrower."
        );
        assert_eq!(hold_item_status("INTRANSIT", "STANDARD", "HOLD"), "IN TRANSIT for hold");
        assert_eq!(hold_item_status("STACKS", "STANDARD", ""), "STACKS");
    }

    #[test]
    fn test_render_checkouts_csv() {
        let checkouts = vec![CheckoutDetails {
            id: "123".into(),
            title: "A Book, with commas".into(),
            author: "Author".into(),
            barcode: "X001".into(),
            call_number: "PS3545".into(),
            library: "Clemons".into(),
            current_location: "Stacks".into(),
            due: "2026-09-01".into(),
            overdue: true,
            overdue_fee: "5.00".into(),
            bills: vec![CheckoutBill {
                amount: "5.00".into(),
                label: "Overdue".into(),
            }],
            recall_due_date: String::new(),
            renew_date: String::new(),
        }];
        let csv = render_checkouts_csv(&checkouts).unwrap();
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("Id,Title,Author"));
        let row = lines.next().unwrap();
        assert!(row.contains("\"A Book, with commas\""));
        assert!(row.contains("true"));
        assert!(row.contains("{reason: Overdue, amount: 5.00}"));
    }

    #[test]
    fn test_standing_normalisation_shape() {
        let raw = r#"{
            "fields": {
                "displayName": "Frank, Anne",
                "barcode": "X00123",
                "patronStatusInfo": {"key": "99", "fields": {"standing": {"key": "DELINQUENT"}, "amountOwed": {"amount": "0.00"}}},
                "library": {"key": "CLEMONS"},
                "profile": {"key": "FACULTY"}
            }
        }"#;
        let parsed: SirsiUserData = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.fields.patron_status_info.fields.standing.key, "DELINQUENT");
        assert_eq!(parsed.fields.library.key, "CLEMONS");
    }
}
