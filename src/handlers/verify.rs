use actix_web::http::header::AUTHORIZATION;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::redemption::{OperatorCredentials, VerifyOutcome};
use crate::errors::AppError;
use crate::AppRedemption;

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyRequest {
    pub code: String,
}

/// Flat envelope the scanner UI renders: `valid` drives the accept/reject
/// banner, the optional fields fill in operator context.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_quantity: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fully_used: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_title: Option<String>,
}

impl From<VerifyOutcome> for VerifyResponse {
    fn from(outcome: VerifyOutcome) -> Self {
        match outcome {
            VerifyOutcome::Valid(record) => VerifyResponse {
                valid: true,
                reason: None,
                message: format!(
                    "Ticket verified. Scan {} of {}.",
                    record.scan_count, record.total_quantity
                ),
                scan_count: Some(record.scan_count),
                total_quantity: Some(record.total_quantity),
                fully_used: Some(record.fully_used()),
                full_name: Some(record.holder_name),
                event_title: Some(record.event_title),
            },
            VerifyOutcome::AlreadyUsed(record) => VerifyResponse {
                valid: false,
                reason: Some("already_used".to_string()),
                message: format!(
                    "Ticket already used: {} of {} scan(s) consumed.",
                    record.scan_count, record.total_quantity
                ),
                scan_count: Some(record.scan_count),
                total_quantity: Some(record.total_quantity),
                fully_used: None,
                full_name: Some(record.holder_name),
                event_title: Some(record.event_title),
            },
            VerifyOutcome::UnknownCode => VerifyResponse {
                valid: false,
                reason: Some("unknown_code".to_string()),
                message: "Ticket code not recognized.".to_string(),
                scan_count: None,
                total_quantity: None,
                fully_used: None,
                full_name: None,
                event_title: None,
            },
        }
    }
}

fn bearer_credentials(req: &HttpRequest) -> Result<OperatorCredentials, AppError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;
    let token = header.strip_prefix("Bearer ").ok_or(AppError::Unauthorized)?;
    Ok(OperatorCredentials {
        token: token.to_string(),
    })
}

/// POST /admin/verify-ticket
///
/// Atomically consumes one admit for the code, or reports why it cannot.
/// Rejections are 200-level domain outcomes with operator context, not
/// transport errors.
#[utoipa::path(
    post,
    path = "/admin/verify-ticket",
    request_body = VerifyRequest,
    responses(
        (status = 200, description = "Verification resolved", body = VerifyResponse),
        (status = 401, description = "Missing or wrong gate token"),
        (status = 503, description = "Storage unavailable after retries"),
    ),
    tag = "admin"
)]
pub async fn verify_ticket(
    svc: web::Data<AppRedemption>,
    req: HttpRequest,
    body: web::Json<VerifyRequest>,
) -> Result<HttpResponse, AppError> {
    let credentials = bearer_credentials(&req)?;
    let code = body.into_inner().code;

    let outcome = web::block(move || svc.verify(&credentials, &code))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(VerifyResponse::from(outcome)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::redemption::ScanRecord;
    use actix_web::test::TestRequest;

    fn record(scan_count: i32, total_quantity: i32) -> ScanRecord {
        ScanRecord {
            scan_count,
            total_quantity,
            holder_name: "Alex Johnson".to_string(),
            event_title: "Comedy Special".to_string(),
        }
    }

    #[test]
    fn valid_outcome_maps_to_camel_case_envelope() {
        let response = VerifyResponse::from(VerifyOutcome::Valid(record(3, 3)));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["valid"], true);
        assert_eq!(json["scanCount"], 3);
        assert_eq!(json["totalQuantity"], 3);
        assert_eq!(json["fullyUsed"], true);
        assert_eq!(json["fullName"], "Alex Johnson");
        assert_eq!(json["eventTitle"], "Comedy Special");
        assert!(json.get("reason").is_none());
    }

    #[test]
    fn already_used_keeps_context_for_operators() {
        let response = VerifyResponse::from(VerifyOutcome::AlreadyUsed(record(2, 2)));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["valid"], false);
        assert_eq!(json["reason"], "already_used");
        assert_eq!(json["scanCount"], 2);
        assert_eq!(json["fullName"], "Alex Johnson");
    }

    #[test]
    fn unknown_code_carries_no_context() {
        let response = VerifyResponse::from(VerifyOutcome::UnknownCode);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["valid"], false);
        assert_eq!(json["reason"], "unknown_code");
        assert!(json.get("scanCount").is_none());
        assert!(json.get("fullName").is_none());
    }

    #[test]
    fn bearer_header_is_parsed_into_credentials() {
        let req = TestRequest::default()
            .insert_header((AUTHORIZATION, "Bearer gate-secret"))
            .to_http_request();
        let credentials = bearer_credentials(&req).unwrap();
        assert_eq!(credentials.token, "gate-secret");
    }

    #[test]
    fn missing_or_malformed_header_is_unauthorized() {
        let req = TestRequest::default().to_http_request();
        assert!(matches!(
            bearer_credentials(&req),
            Err(AppError::Unauthorized)
        ));

        let req = TestRequest::default()
            .insert_header((AUTHORIZATION, "Token gate-secret"))
            .to_http_request();
        assert!(matches!(
            bearer_credentials(&req),
            Err(AppError::Unauthorized)
        ));
    }
}
