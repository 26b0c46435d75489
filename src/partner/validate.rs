//! Field-level validation of partner feed requests.

use chrono::NaiveDate;

use crate::models::{FeedRequest, FieldError};

pub const MIN_PRICE_IDR: f64 = 10_000_000.0;
pub const MAX_PRICE_IDR: f64 = 500_000_000.0;
pub const MIN_DURATION_DAYS: u32 = 5;
pub const MAX_DURATION_DAYS: u32 = 45;

/// Dates parsed from a request that passed validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidDates {
    pub valid_from: Option<NaiveDate>,
    pub valid_until: Option<NaiveDate>,
}

/// Check a feed request, collecting every problem rather than stopping at
/// the first.
pub fn validate_request(request: &FeedRequest) -> Result<ValidDates, Vec<FieldError>> {
    let mut errors = Vec::new();

    if request.feed_name.trim().is_empty() {
        errors.push(FieldError::new("feed_name", "is required"));
    }

    let price = request.price_idr;
    if !price.is_finite() || price <= 0.0 {
        errors.push(FieldError::new("price_idr", "must be greater than 0"));
    } else if price < MIN_PRICE_IDR {
        errors.push(FieldError::new(
            "price_idr",
            format!("minimum is {}", format_idr(MIN_PRICE_IDR)),
        ));
    } else if price > MAX_PRICE_IDR {
        errors.push(FieldError::new(
            "price_idr",
            format!("maximum is {}", format_idr(MAX_PRICE_IDR)),
        ));
    }

    if let Some(days) = request.duration_days {
        if !(MIN_DURATION_DAYS..=MAX_DURATION_DAYS).contains(&days) {
            errors.push(FieldError::new(
                "duration_days",
                format!(
                    "must be between {} and {}",
                    MIN_DURATION_DAYS, MAX_DURATION_DAYS
                ),
            ));
        }
    }

    for (field, stars) in [
        ("hotel_makkah_stars", request.hotel_makkah_stars),
        ("hotel_madinah_stars", request.hotel_madinah_stars),
    ] {
        if stars.is_some_and(|s| !(1..=5).contains(&s)) {
            errors.push(FieldError::new(field, "must be between 1 and 5"));
        }
    }

    let valid_from = parse_date("valid_from", request.valid_from.as_deref(), &mut errors);
    let valid_until = parse_date("valid_until", request.valid_until.as_deref(), &mut errors);
    if let (Some(from), Some(until)) = (valid_from, valid_until) {
        if from > until {
            errors.push(FieldError::new("valid_until", "must not be before valid_from"));
        }
    }

    if errors.is_empty() {
        Ok(ValidDates {
            valid_from,
            valid_until,
        })
    } else {
        Err(errors)
    }
}

fn parse_date(field: &str, value: Option<&str>, errors: &mut Vec<FieldError>) -> Option<NaiveDate> {
    let value = value.map(str::trim).filter(|v| !v.is_empty())?;
    match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            errors.push(FieldError::new(field, "invalid date, use YYYY-MM-DD"));
            None
        }
    }
}

/// `10000000` -> `"10,000,000"`.
fn format_idr(amount: f64) -> String {
    let digits = format!("{:.0}", amount);
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> FeedRequest {
        FeedRequest {
            feed_name: "Umrah Reguler Desember".to_string(),
            price_idr: 29_500_000.0,
            duration_days: Some(9),
            hotel_makkah_stars: Some(4),
            valid_from: Some("2026-11-01".to_string()),
            valid_until: Some("2026-12-31".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_request() {
        let dates = validate_request(&request()).unwrap();
        assert_eq!(dates.valid_from, NaiveDate::from_ymd_opt(2026, 11, 1));
        assert_eq!(dates.valid_until, NaiveDate::from_ymd_opt(2026, 12, 31));
    }

    #[test]
    fn test_price_below_floor() {
        let errors = validate_request(&FeedRequest {
            price_idr: 5_000_000.0,
            ..request()
        })
        .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "price_idr");
        assert_eq!(errors[0].message, "minimum is 10,000,000");
    }

    #[test]
    fn test_every_problem_is_reported() {
        let errors = validate_request(&FeedRequest {
            feed_name: " ".to_string(),
            price_idr: 0.0,
            duration_days: Some(60),
            hotel_makkah_stars: Some(0),
            hotel_madinah_stars: Some(6),
            valid_from: Some("2026-12-31".to_string()),
            valid_until: Some("2026-11-01".to_string()),
            ..Default::default()
        })
        .unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "feed_name",
                "price_idr",
                "duration_days",
                "hotel_makkah_stars",
                "hotel_madinah_stars",
                "valid_until"
            ]
        );
    }

    #[test]
    fn test_bad_date_format() {
        let errors = validate_request(&FeedRequest {
            valid_from: Some("01/11/2026".to_string()),
            ..request()
        })
        .unwrap_err();
        assert_eq!(errors[0].field, "valid_from");
    }

    #[test]
    fn test_format_idr() {
        assert_eq!(format_idr(500_000_000.0), "500,000,000");
        assert_eq!(format_idr(999.0), "999");
    }
}
