use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::errors::ApiError;

const CHECKED_OUT_MARKER: &str = "CHECKED_OUT";

/// How long an issued check-in code can be scanned.
pub const QR_TTL_MINUTES: i64 = 5;
/// Tolerated clock drift between issuer and scanner.
const QR_CLOCK_SKEW_SECONDS: i64 = 30;

/// Contents of a check-in QR code: `user_id|center_id|timestamp`, with a
/// trailing `|CHECKED_OUT` on check-out codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QrPayload {
    pub user_id: Uuid,
    pub center_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub checked_out: bool,
}

impl QrPayload {
    pub fn check_in(user_id: Uuid, center_id: Uuid, issued_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            center_id,
            issued_at,
            checked_out: false,
        }
    }

    pub fn check_out(user_id: Uuid, center_id: Uuid, issued_at: DateTime<Utc>) -> Self {
        Self {
            checked_out: true,
            ..Self::check_in(user_id, center_id, issued_at)
        }
    }

    pub fn encode(&self) -> String {
        let base = format!(
            "{}|{}|{}",
            self.user_id,
            self.center_id,
            self.issued_at.to_rfc3339()
        );
        if self.checked_out {
            format!("{base}|{CHECKED_OUT_MARKER}")
        } else {
            base
        }
    }

    pub fn parse(raw: &str) -> Result<Self, ApiError> {
        let invalid = || ApiError::validation("Invalid QR payload");
        let parts: Vec<&str> = raw.trim().split('|').collect();
        let checked_out = match parts.as_slice() {
            [_, _, _] => false,
            [_, _, _, marker] if *marker == CHECKED_OUT_MARKER => true,
            _ => return Err(invalid()),
        };

        let user_id = Uuid::parse_str(parts[0]).map_err(|_| invalid())?;
        let center_id = Uuid::parse_str(parts[1]).map_err(|_| invalid())?;
        let issued_at = DateTime::parse_from_rfc3339(parts[2])
            .map_err(|_| invalid())?
            .with_timezone(&Utc);

        Ok(Self {
            user_id,
            center_id,
            issued_at,
            checked_out,
        })
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.issued_at + Duration::minutes(QR_TTL_MINUTES)
    }

    /// Codes are only scannable for [`QR_TTL_MINUTES`] after issue.
    pub fn ensure_fresh(&self, now: DateTime<Utc>) -> Result<(), ApiError> {
        if self.issued_at > now + Duration::seconds(QR_CLOCK_SKEW_SECONDS) {
            return Err(ApiError::validation("QR code is not valid yet"));
        }
        if now > self.expires_at() {
            return Err(ApiError::validation("QR code has expired"));
        }
        Ok(())
    }
}

/// A visit costs `credit_required` flex credits.
pub fn ensure_sufficient_credit(flex_credit: i32, credit_required: i32) -> Result<(), ApiError> {
    if flex_credit < credit_required {
        return Err(ApiError::InsufficientCredit);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::ResponseError;

    #[test]
    fn test_encode_layout() {
        let user_id = Uuid::new_v4();
        let center_id = Uuid::new_v4();
        let at = Utc::now();

        let encoded = QrPayload::check_in(user_id, center_id, at).encode();
        let parts: Vec<&str> = encoded.split('|').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], user_id.to_string());
        assert_eq!(parts[1], center_id.to_string());

        let checkout = QrPayload::check_out(user_id, center_id, at).encode();
        assert!(checkout.ends_with("|CHECKED_OUT"));
        assert!(checkout.starts_with(&encoded));
    }

    #[test]
    fn test_parse_scanned_payload() {
        let user_id = Uuid::new_v4();
        let center_id = Uuid::new_v4();
        let raw = format!("{user_id}|{center_id}|2024-06-01T07:30:00+00:00");

        let payload = QrPayload::parse(&raw).unwrap();
        assert_eq!(payload.user_id, user_id);
        assert_eq!(payload.center_id, center_id);
        assert!(!payload.checked_out);

        let raw_out = format!("{raw}|CHECKED_OUT");
        assert!(QrPayload::parse(&raw_out).unwrap().checked_out);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let user_id = Uuid::new_v4();
        let center_id = Uuid::new_v4();
        for raw in [
            String::new(),
            "not-a-payload".to_string(),
            format!("{user_id}|{center_id}"),
            format!("{user_id}|oops|2024-06-01T07:30:00Z"),
            format!("{user_id}|{center_id}|yesterday"),
            format!("{user_id}|{center_id}|2024-06-01T07:30:00Z|LATER"),
        ] {
            let err = QrPayload::parse(&raw).unwrap_err();
            assert_eq!(err.status_code().as_u16(), 400, "payload {raw:?}");
        }
    }

    #[test]
    fn test_code_freshness() {
        let now = Utc::now();
        let code = QrPayload::check_in(Uuid::new_v4(), Uuid::new_v4(), now);
        assert!(code.ensure_fresh(now).is_ok());
        assert!(code.ensure_fresh(now + Duration::minutes(QR_TTL_MINUTES)).is_ok());

        let err = code
            .ensure_fresh(now + Duration::minutes(QR_TTL_MINUTES) + Duration::seconds(1))
            .unwrap_err();
        assert_eq!(err.to_string(), "QR code has expired");

        let err = code.ensure_fresh(now - Duration::minutes(2)).unwrap_err();
        assert_eq!(err.status_code().as_u16(), 400);
    }

    #[test]
    fn test_credit_check() {
        assert!(ensure_sufficient_credit(5, 5).is_ok());
        assert!(ensure_sufficient_credit(5, 0).is_ok());
        let err = ensure_sufficient_credit(0, 1).unwrap_err();
        assert_eq!(err.status_code().as_u16(), 402);
        assert_eq!(err.to_string(), "Insufficient flex credit");
    }
}
