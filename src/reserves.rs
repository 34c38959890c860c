//! Course reserves
//!
//! Validation checks whether each submitted title can go on video reserve,
//! first from the ILS item data, then from the catalog index for streaming
//! titles the ILS cannot see. Creation gathers availability for each item
//! and mails the reserves staff; law-library requests route to the law
//! mailbox. Search runs against the index and groups by course or
//! instructor.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::availability::model::is_video_item_type;
use crate::error::{ApiError, ApiResult};
use crate::mail::EmailRequest;
use crate::middleware::VirgoClaims;
use crate::sirsi::clean_cat_key;
use crate::solr::url_escape;
use crate::ServiceContext;

// ---------------------------------------------------------------------------
// validation

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidateResponseRec {
    pub id: String,
    pub reserve: bool,
    pub is_video: bool,
}

#[derive(Debug, Default, Deserialize)]
struct SirsiBibSearchResp {
    #[serde(rename = "totalResults", default)]
    _total_results: i64,
    #[serde(default)]
    result: Vec<SirsiSearchRec>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct SirsiSearchRec {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub fields: SirsiSearchFields,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct SirsiSearchFields {
    #[serde(rename = "callList", default)]
    pub call_list: Vec<SirsiSearchCall>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct SirsiSearchCall {
    #[serde(default)]
    pub fields: SirsiSearchCallFields,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct SirsiSearchCallFields {
    #[serde(rename = "itemList", default)]
    pub item_list: Vec<SirsiSearchItem>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct SirsiSearchItem {
    #[serde(default)]
    pub fields: SirsiSearchItemFields,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct SirsiSearchItemFields {
    #[serde(rename = "itemType", default)]
    pub item_type: crate::sirsi::SirsiKey,
    #[serde(default)]
    pub library: crate::sirsi::SirsiKey,
}

/// Decide reserve eligibility from the ILS data alone. Video titles are
/// eligible unless held by health sciences or special collections, or a law
/// DVD.
pub fn evaluate_sirsi_reserve(rec: &SirsiSearchRec) -> (bool, bool) {
    let mut is_video = false;
    let first_library = rec
        .fields
        .call_list
        .first()
        .and_then(|cl| cl.fields.item_list.first())
        .map(|item| item.fields.library.key.clone())
        .unwrap_or_default();

    for call in &rec.fields.call_list {
        for item in &call.fields.item_list {
            let item_type = &item.fields.item_type.key;
            if !is_video_item_type(item_type) {
                continue;
            }
            is_video = true;
            if first_library == "HEALTHSCI" || first_library == "SPEC-COLL" {
                tracing::info!("cannot reserve {}: invalid library {first_library}", rec.key);
            } else if first_library == "LAW" && item_type == "VIDEO-DVD" {
                tracing::info!("cannot reserve {}: {item_type} from {first_library}", rec.key);
            } else {
                return (true, true);
            }
        }
    }
    (is_video, false)
}

/// POST /course_reserves/validate
pub async fn validate_course_reserves(
    State(ctx): State<Arc<ServiceContext>>,
    Json(req): Json<ValidateRequest>,
) -> ApiResult<Json<Vec<ValidateResponseRec>>> {
    tracing::info!("validate course reserves {:?}", req.items);

    let mut id_map: HashMap<String, String> = HashMap::new();
    let mut bits: Vec<String> = Vec::new();
    for key in &req.items {
        let clean = clean_cat_key(key).to_string();
        bits.push(format!("{clean}{{CKEY}}"));
        id_map.insert(clean, key.clone());
    }
    let query = format!("GENERAL:\"{}\"", bits.join(" OR "));
    let uri = format!(
        "/catalog/bib/search?includeFields=callList{{itemList{{itemType,library}}}}&q={}&ct={}",
        url_escape(&query),
        req.items.len()
    );

    let raw = ctx.sirsi_get(&ctx.http_client, &uri).await?;
    let resp: SirsiBibSearchResp = serde_json::from_slice(&raw)?;

    let mut out = Vec::new();
    for (clean_key, orig_id) in id_map {
        let mut rec = ValidateResponseRec {
            id: orig_id,
            reserve: false,
            is_video: false,
        };

        match resp.result.iter().find(|r| r.key == clean_key) {
            Some(sirsi_rec) => {
                let (is_video, reserve) = evaluate_sirsi_reserve(sirsi_rec);
                rec.is_video = is_video;
                rec.reserve = reserve;
            }
            None => tracing::info!("{} not found in sirsi", rec.id),
        }

        // the index knows about streaming titles the ILS cannot flag
        if !rec.is_video || !rec.reserve {
            match ctx.get_solr_doc(&rec.id).await {
                Ok(doc) => {
                    if doc.is_streaming_video() {
                        tracing::info!("per the index document, {} is a video", rec.id);
                        rec.is_video = true;
                        rec.reserve = true;
                    }
                }
                Err(e) => tracing::error!("unable to get solr doc for {}: {e}", rec.id),
            }
        }
        out.push(rec);
    }

    Ok(Json(out))
}

// ---------------------------------------------------------------------------
// creation

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReserveParams {
    #[serde(rename = "onBehalfOf", default)]
    pub on_behalf_of: String,
    #[serde(rename = "instructorName", default)]
    pub instructor_name: String,
    #[serde(rename = "instructorEmail", default)]
    pub instructor_email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub course: String,
    #[serde(default)]
    pub semester: String,
    #[serde(default)]
    pub library: String,
    #[serde(default)]
    pub period: String,
    #[serde(default)]
    pub lms: String,
    #[serde(rename = "otherLMS", default)]
    pub other_lms: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReserveItem {
    #[serde(default)]
    pub pool: String,
    #[serde(rename = "isVideo", default)]
    pub is_video: bool,
    #[serde(rename = "catalogKey", default)]
    pub catalog_key: String,
    #[serde(rename = "callNumber", default)]
    pub call_number: Vec<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub period: String,
    #[serde(default)]
    pub notes: String,
    #[serde(rename = "audioLanguage", default)]
    pub audio_language: String,
    #[serde(default)]
    pub subtitles: String,
    #[serde(rename = "subtitleLanguage", default)]
    pub subtitle_language: String,
}

#[derive(Debug, Deserialize)]
pub struct ReserveRequest {
    #[serde(rename = "userID", default)]
    pub user_id: String,
    pub request: ReserveParams,
    #[serde(default)]
    pub items: Vec<ReserveItem>,
}

/// Per-copy availability included in the reserve e-mail
#[derive(Debug, Clone, Default)]
pub struct AvailabilityInfo {
    pub library: String,
    pub location: String,
    pub call_number: String,
}

/// POST /course_reserves
pub async fn create_course_reserves(
    State(ctx): State<Arc<ServiceContext>>,
    Extension(claims): Extension<VirgoClaims>,
    Json(req): Json<ReserveRequest>,
) -> ApiResult<String> {
    tracing::info!("{} requests creation of course reserves", claims.user_id);

    let mut video: Vec<(ReserveItem, Vec<AvailabilityInfo>)> = Vec::new();
    let mut non_video: Vec<(ReserveItem, Vec<AvailabilityInfo>)> = Vec::new();
    for item in req.items {
        let avail = match ctx.get_reserve_item_availability(&item.catalog_key).await {
            Ok(avail) => avail,
            Err(e) => {
                tracing::warn!("{e}");
                Vec::new()
            }
        };
        if item.is_video {
            video.push((item, avail));
        } else {
            non_video.push((item, avail));
        }
    }

    for (items, is_video) in [(&non_video, false), (&video, true)] {
        if items.is_empty() {
            continue;
        }
        let body = render_reserve_email(&ctx.config.virgo_url, &req.request, items, is_video);

        // law requests go to the law mailbox and the requester; everything
        // else goes to the reserves mailbox from the instructor or requester
        let mut to = Vec::new();
        let mut cc = None;
        let mut from = ctx.config.smtp.sender.clone();
        let mut subject_name = req.request.name.clone();
        if req.request.library == "law" {
            to.push(ctx.config.law_reserve_email.clone());
            to.push(req.request.email.clone());
            if !req.request.instructor_email.is_empty() {
                to.push(req.request.instructor_email.clone());
            }
        } else {
            to.push(ctx.config.course_reserve_email.clone());
            if !req.request.instructor_email.is_empty() {
                from = req.request.instructor_email.clone();
                cc = Some(req.request.email.clone());
                subject_name = req.request.instructor_name.clone();
            } else {
                from = req.request.email.clone();
            }
        }

        let email = EmailRequest {
            subject: format!(
                "{} - {}: {}",
                req.request.semester, subject_name, req.request.course
            ),
            to,
            reply_to: None,
            cc,
            from,
            body,
        };
        ctx.mailer
            .send(&email)
            .await
            .map_err(|e| ApiError::Internal(format!("unable to send reserve email: {e}")))?;
    }

    Ok("Reserve emails sent".to_string())
}

/// Assemble the plain-text reserve request body
pub fn render_reserve_email(
    virgo_url: &str,
    request: &ReserveParams,
    items: &[(ReserveItem, Vec<AvailabilityInfo>)],
    is_video: bool,
) -> String {
    let mut body = String::new();
    let kind = if is_video { "Video reserve" } else { "Reserve" };
    let _ = writeln!(body, "{kind} request for {} {}", request.semester, request.course);
    let _ = writeln!(body, "Requested by: {} <{}>", request.name, request.email);
    if !request.on_behalf_of.is_empty() {
        let _ = writeln!(body, "On behalf of: {}", request.on_behalf_of);
    }
    if !request.instructor_name.is_empty() {
        let _ = writeln!(
            body,
            "Instructor: {} <{}>",
            request.instructor_name, request.instructor_email
        );
    }
    let _ = writeln!(body, "Reserve library: {}", request.library);
    let _ = writeln!(body, "Loan period: {}", request.period);
    if !request.lms.is_empty() {
        let lms = if request.lms == "Other" && !request.other_lms.is_empty() {
            &request.other_lms
        } else {
            &request.lms
        };
        let _ = writeln!(body, "LMS: {lms}");
    }

    for (idx, (item, avail)) in items.iter().enumerate() {
        let _ = writeln!(body);
        let _ = writeln!(body, "Item {}:", idx + 1);
        let _ = writeln!(body, "   Title: {}", item.title);
        if !item.author.is_empty() {
            let _ = writeln!(body, "   Author: {}", item.author);
        }
        let _ = writeln!(
            body,
            "   Virgo: {virgo_url}/sources/{}/items/{}",
            item.pool, item.catalog_key
        );
        if !item.call_number.is_empty() {
            let _ = writeln!(body, "   Call numbers: {}", item.call_number.join(", "));
        }
        if !item.period.is_empty() {
            let _ = writeln!(body, "   Loan period: {}", item.period);
        }
        if is_video {
            let _ = writeln!(body, "   Audio language: {}", item.audio_language);
            let _ = writeln!(body, "   Subtitles: {}", item.subtitles);
            if !item.subtitle_language.is_empty() {
                let _ = writeln!(body, "   Subtitle language: {}", item.subtitle_language);
            }
        }
        if !item.notes.is_empty() {
            let _ = writeln!(body, "   Notes: {}", item.notes);
        }
        for a in avail {
            let _ = writeln!(
                body,
                "   Copy: {} - {} - {}",
                a.library, a.location, a.call_number
            );
        }
    }

    body
}

impl ServiceContext {
    /// Availability summary for a reserve candidate, via the bib parser
    pub async fn get_reserve_item_availability(
        &self,
        cat_key: &str,
    ) -> Result<Vec<AvailabilityInfo>, ApiError> {
        tracing::info!("check if item {cat_key} is available for course reserve");
        let bib = self
            .get_sirsi_bib(cat_key)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("{cat_key} not found")))?;
        let table = self.policy.read().await;
        let items = crate::availability::model::parse_avail_items(&table, &bib);
        Ok(items
            .into_iter()
            .map(|item| AvailabilityInfo {
                library: item.library,
                location: item.current_location,
                call_number: item.call_number,
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// search

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(rename = "type")]
    pub search_type: String,
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Default, Deserialize)]
struct SearchReservesResponse {
    #[serde(default)]
    response: SearchReservesBody,
}

#[derive(Debug, Default, Deserialize)]
struct SearchReservesBody {
    #[serde(default)]
    docs: Vec<SearchHit>,
    #[serde(rename = "numFound", default)]
    num_found: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "title_a", default)]
    pub title: Vec<String>,
    #[serde(rename = "work_primary_author_a", default)]
    pub author: Vec<String>,
    #[serde(rename = "call_number_a", default)]
    pub call_number: Vec<String>,
    #[serde(rename = "reserve_id_course_name_a", default)]
    pub reserve_info: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReserveListItem {
    pub id: String,
    pub title: String,
    pub author: String,
    #[serde(rename = "callNumber")]
    pub call_number: String,
}

#[derive(Debug, Serialize)]
pub struct CourseItems {
    #[serde(rename = "courseName")]
    pub course_name: String,
    #[serde(rename = "courseID")]
    pub course_id: String,
    pub items: Vec<ReserveListItem>,
}

#[derive(Debug, Serialize)]
pub struct InstructorSearchResponse {
    #[serde(rename = "instructorName")]
    pub instructor_name: String,
    pub courses: Vec<CourseItems>,
}

#[derive(Debug, Serialize)]
pub struct InstructorItems {
    #[serde(rename = "instructorName")]
    pub instructor_name: String,
    pub items: Vec<ReserveListItem>,
}

#[derive(Debug, Serialize)]
pub struct CourseSearchResponse {
    #[serde(rename = "courseName")]
    pub course_name: String,
    #[serde(rename = "courseID")]
    pub course_id: String,
    pub instructors: Vec<InstructorItems>,
}

/// GET /course_reserves/search?type=...&query=...
pub async fn search_course_reserves(
    State(ctx): State<Arc<ServiceContext>>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<serde_json::Value>> {
    if params.search_type != "instructor_name" && params.search_type != "course_id" {
        return Err(ApiError::BadRequest(format!(
            "{} is not a valid search type",
            params.search_type
        )));
    }

    let raw_query = params.query.clone();
    let mut query_str = raw_query.clone();
    if !query_str.contains('*') {
        query_str.push('*');
    }
    tracing::info!(
        "search [{}] course reserves for [{query_str}]",
        params.search_type
    );

    let field = if params.search_type == "instructor_name" {
        "reserve_instructor_tl"
    } else {
        // course ids are stored upper case; force the query to match
        query_str = query_str.to_uppercase();
        "reserve_id_a"
    };
    let query_str = query_str.replace(' ', "\\ ");

    let fl = url_escape("id,reserve_id_course_name_a,title_a,work_primary_author_a,call_number_a");
    let solr_query = format!("select?fl={fl}&q={field}:{}&rows=5000", url_escape(&query_str));

    let raw = ctx.solr_get(&solr_query).await?;
    let resp: SearchReservesResponse = serde_json::from_slice(&raw)?;
    tracing::info!("found [{}] matches", resp.response.num_found);

    if params.search_type == "instructor_name" {
        let reserves = extract_instructor_reserves(&raw_query, &resp.response.docs);
        return Ok(Json(serde_json::to_value(reserves)?));
    }
    let reserves = extract_course_reserves(&raw_query, &resp.response.docs);
    Ok(Json(serde_json::to_value(reserves)?))
}

fn reserve_list_item(doc: &SearchHit) -> ReserveListItem {
    ReserveListItem {
        id: doc.id.clone(),
        title: doc.title.first().cloned().unwrap_or_default(),
        author: doc.author.join("; "),
        call_number: doc.call_number.join(", "),
    }
}

/// Split one `courseID|courseName|instructor` reserve entry
fn split_reserve_info(entry: &str) -> Option<(&str, &str, &str)> {
    let mut parts = entry.split('|');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(id), Some(name), Some(instructor)) => Some((id, name, instructor)),
        _ => None,
    }
}

/// Group matching reserves by course, instructors within each course
pub fn extract_course_reserves(target_course: &str, docs: &[SearchHit]) -> Vec<CourseSearchResponse> {
    let mut out: Vec<CourseSearchResponse> = Vec::new();
    for doc in docs {
        for reserve in &doc.reserve_info {
            let Some((course_id, course_name, instructor)) = split_reserve_info(reserve) else {
                continue;
            };
            if !course_id.to_lowercase().starts_with(&target_course.to_lowercase()) {
                continue;
            }

            let item = reserve_list_item(doc);
            let course = match out.iter_mut().find(|c| c.course_id == course_id) {
                Some(existing) => existing,
                None => {
                    out.push(CourseSearchResponse {
                        course_id: course_id.to_string(),
                        course_name: course_name.to_string(),
                        instructors: Vec::new(),
                    });
                    out.last_mut().expect("just pushed")
                }
            };

            match course
                .instructors
                .iter_mut()
                .find(|i| i.instructor_name == instructor)
            {
                Some(inst) => {
                    if !inst.items.iter().any(|i| i.id == item.id) {
                        inst.items.push(item);
                    }
                }
                None => course.instructors.push(InstructorItems {
                    instructor_name: instructor.to_string(),
                    items: vec![item],
                }),
            }
        }
    }

    for course in &mut out {
        course
            .instructors
            .sort_by(|a, b| a.instructor_name.cmp(&b.instructor_name));
        for inst in &mut course.instructors {
            inst.items.sort_by(|a, b| a.title.cmp(&b.title));
        }
    }
    out
}

/// Group matching reserves by instructor, courses within each instructor
pub fn extract_instructor_reserves(
    target_instructor: &str,
    docs: &[SearchHit],
) -> Vec<InstructorSearchResponse> {
    let mut out: Vec<InstructorSearchResponse> = Vec::new();
    for doc in docs {
        for reserve in &doc.reserve_info {
            let Some((course_id, course_name, instructor)) = split_reserve_info(reserve) else {
                continue;
            };
            if !instructor
                .to_lowercase()
                .starts_with(&target_instructor.to_lowercase())
            {
                continue;
            }

            let item = reserve_list_item(doc);
            let entry = match out.iter_mut().find(|i| i.instructor_name == instructor) {
                Some(existing) => existing,
                None => {
                    out.push(InstructorSearchResponse {
                        instructor_name: instructor.to_string(),
                        courses: Vec::new(),
                    });
                    out.last_mut().expect("just pushed")
                }
            };

            match entry.courses.iter_mut().find(|c| c.course_id == course_id) {
                Some(course) => {
                    if !course.items.iter().any(|i| i.id == item.id) {
                        course.items.push(item);
                    }
                }
                None => entry.courses.push(CourseItems {
                    course_id: course_id.to_string(),
                    course_name: course_name.to_string(),
                    items: vec![item],
                }),
            }
        }
    }

    for inst in &mut out {
        inst.courses.sort_by(|a, b| a.course_id.cmp(&b.course_id));
        for course in &mut inst.courses {
            course.items.sort_by(|a, b| a.title.cmp(&b.title));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search_rec(key: &str, entries: &[(&str, &str)]) -> SirsiSearchRec {
        SirsiSearchRec {
            key: key.into(),
            fields: SirsiSearchFields {
                call_list: vec![SirsiSearchCall {
                    fields: SirsiSearchCallFields {
                        item_list: entries
                            .iter()
                            .map(|(item_type, library)| SirsiSearchItem {
                                fields: SirsiSearchItemFields {
                                    item_type: crate::sirsi::SirsiKey {
                                        resource: None,
                                        key: (*item_type).into(),
                                    },
                                    library: crate::sirsi::SirsiKey {
                                        resource: None,
                                        key: (*library).into(),
                                    },
                                },
                            })
                            .collect(),
                    },
                }],
            },
        }
    }

    #[test]
    fn test_video_reserve_allowed() {
        let rec = search_rec("123", &[("VIDEO-DVD", "CLEMONS")]);
        assert_eq!(evaluate_sirsi_reserve(&rec), (true, true));
    }

    #[test]
    fn test_book_not_video() {
        let rec = search_rec("123", &[("BOOK", "CLEMONS")]);
        assert_eq!(evaluate_sirsi_reserve(&rec), (false, false));
    }

    #[test]
    fn test_health_sciences_video_rejected() {
        let rec = search_rec("123", &[("VIDEO-DVD", "HEALTHSCI")]);
        assert_eq!(evaluate_sirsi_reserve(&rec), (true, false));
    }

    #[test]
    fn test_law_dvd_rejected_but_law_cassette_allowed() {
        let dvd = search_rec("123", &[("VIDEO-DVD", "LAW")]);
        assert_eq!(evaluate_sirsi_reserve(&dvd), (true, false));

        let cassette = search_rec("124", &[("VIDEO-CASS", "LAW")]);
        assert_eq!(evaluate_sirsi_reserve(&cassette), (true, true));
    }

    fn hit(id: &str, title: &str, reserves: &[&str]) -> SearchHit {
        SearchHit {
            id: id.into(),
            title: vec![title.into()],
            author: vec!["Author, A".into()],
            call_number: vec!["CALL 1".into()],
            reserve_info: reserves.iter().map(|r| (*r).to_string()).collect(),
        }
    }

    #[test]
    fn test_course_grouping_sorted_and_deduped() {
        let docs = vec![
            hit("d1", "Zeta", &["CHEM 1410|Intro Chemistry|Smith, A"]),
            hit("d2", "Alpha", &["CHEM 1410|Intro Chemistry|Smith, A"]),
            // duplicate of d1 under the same course and instructor
            hit("d1", "Zeta", &["CHEM 1410|Intro Chemistry|Smith, A"]),
            hit("d3", "Beta", &["CHEM 1410|Intro Chemistry|Adams, B"]),
            hit("d4", "Gamma", &["PHYS 1010|Mechanics|Smith, A"]),
        ];

        let out = extract_course_reserves("chem", &docs);
        assert_eq!(out.len(), 1);
        let course = &out[0];
        assert_eq!(course.course_id, "CHEM 1410");
        // instructors sorted alphabetically
        assert_eq!(course.instructors[0].instructor_name, "Adams, B");
        assert_eq!(course.instructors[1].instructor_name, "Smith, A");
        // items sorted by title, duplicate dropped
        let titles: Vec<_> = course.instructors[1]
            .items
            .iter()
            .map(|i| i.title.as_str())
            .collect();
        assert_eq!(titles, vec!["Alpha", "Zeta"]);
    }

    #[test]
    fn test_instructor_grouping() {
        let docs = vec![
            hit("d1", "Zeta", &["CHEM 1410|Intro Chemistry|Smith, A"]),
            hit("d2", "Alpha", &["PHYS 1010|Mechanics|Smith, A"]),
            hit("d3", "Beta", &["CHEM 1410|Intro Chemistry|Jones, C"]),
        ];

        let out = extract_instructor_reserves("smith", &docs);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].instructor_name, "Smith, A");
        // courses sorted by id
        assert_eq!(out[0].courses[0].course_id, "CHEM 1410");
        assert_eq!(out[0].courses[1].course_id, "PHYS 1010");
    }

    #[test]
    fn test_prefix_match_only() {
        let docs = vec![hit("d1", "Title", &["CHEM 1410|Intro Chemistry|Smith, A"])];
        assert!(extract_course_reserves("1410", &docs).is_empty());
        assert_eq!(extract_course_reserves("CHEM", &docs).len(), 1);
    }

    #[test]
    fn test_malformed_reserve_info_skipped() {
        let docs = vec![hit("d1", "Title", &["CHEM 1410 only"])];
        assert!(extract_course_reserves("chem", &docs).is_empty());
    }

    #[test]
    fn test_render_reserve_email() {
        let request = ReserveParams {
            name: "Requester".into(),
            email: "req@example.com".into(),
            course: "CHEM 1410".into(),
            semester: "Fall 2026".into(),
            library: "clemons".into(),
            period: "2 hours".into(),
            ..Default::default()
        };
        let item = ReserveItem {
            pool: "video".into(),
            is_video: true,
            catalog_key: "u123".into(),
            title: "A Film".into(),
            audio_language: "English".into(),
            subtitles: "yes".into(),
            ..Default::default()
        };
        let avail = vec![AvailabilityInfo {
            library: "Clemons".into(),
            location: "Stacks".into(),
            call_number: "DVD 99".into(),
        }];

        let body = render_reserve_email("https://search.example.com", &request, &[(item, avail)], true);
        assert!(body.contains("Video reserve request for Fall 2026 CHEM 1410"));
        assert!(body.contains("https://search.example.com/sources/video/items/u123"));
        assert!(body.contains("Audio language: English"));
        assert!(body.contains("Copy: Clemons - Stacks - DVD 99"));
    }
}
