//! # Storefront API Client
//!
//! HTTP implementation of [`CouponValidator`] and [`DeliveryFeeLookup`].
//!
//! ## Endpoints
//! | Call              | Request                                        | Success body                                   |
//! |-------------------|------------------------------------------------|------------------------------------------------|
//! | Coupon validation | `POST {base}/coupons/validate`                 | `{ valid, discountAmount, coupon, message }`   |
//! |                   | `{ code, subtotal, itemIds }`                  |                                                |
//! | Delivery fee      | `GET {base}/neighborhoods/check/{name}`        | `{ fee, estimatedTime, neighborhoodName }`     |
//!
//! Amounts travel as decimal reais and become [`Money`] here, once. Error
//! bodies are `{ message }`.

use acai_core::money::Money;
use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::config::ApiSettings;
use crate::coupon::{
    parse_coupon_kind, CouponDescriptor, CouponValidation, CouponValidationRequest, CouponValidator,
};
use crate::delivery::{DeliveryFeeLookup, DeliveryQuote, DEFAULT_ESTIMATED_TIME};
use crate::error::{CartError, CartResult, ServiceError};

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CouponRequestBody<'a> {
    code: &'a str,
    #[serde(with = "rust_decimal::serde::float")]
    subtotal: Decimal,
    item_ids: &'a [String],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CouponResponseBody {
    #[serde(default)]
    valid: bool,
    #[serde(default)]
    discount_amount: Option<Decimal>,
    #[serde(default)]
    coupon: Option<CouponTermsBody>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CouponTermsBody {
    #[serde(rename = "type", alias = "kind")]
    kind: String,
    #[serde(default)]
    value: Decimal,
    #[serde(default)]
    min_order_value: Option<Decimal>,
    #[serde(default)]
    max_discount: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NeighborhoodResponseBody {
    fee: Decimal,
    #[serde(default)]
    estimated_time: Option<String>,
    #[serde(default)]
    neighborhood_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

// =============================================================================
// Client
// =============================================================================

/// Client for the storefront backend.
#[derive(Debug, Clone)]
pub struct StorefrontClient {
    client: reqwest::Client,
    base_url: Url,
}

impl StorefrontClient {
    /// Builds a client from the API settings (base URL and timeout).
    pub fn new(settings: &ApiSettings) -> CartResult<Self> {
        let base_url = Url::parse(&settings.base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(CartError::Config(format!(
                "API URL cannot be used as a base: {}",
                settings.base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()?;

        Ok(StorefrontClient { client, base_url })
    }

    /// `{base}/coupons/validate`
    pub fn coupon_validate_url(&self) -> Url {
        self.endpoint(&["coupons", "validate"])
    }

    /// `{base}/neighborhoods/check/{name}`, with the name percent-encoded.
    pub fn neighborhood_url(&self, name: &str) -> Url {
        self.endpoint(&["neighborhoods", "check", name])
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Checked in `new`: the base URL always has path segments.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

#[async_trait]
impl CouponValidator for StorefrontClient {
    async fn validate(&self, request: CouponValidationRequest) -> Result<CouponValidation, ServiceError> {
        let body = CouponRequestBody {
            code: &request.code,
            subtotal: request.subtotal.to_decimal(),
            item_ids: &request.item_ids,
        };

        let url = self.coupon_validate_url();
        debug!(url = %url, code = %request.code, "POST coupon validation");

        let resp = self.client.post(url).json(&body).send().await?;
        let status = resp.status();
        let text = if status.is_success() {
            resp.text().await?
        } else {
            resp.text().await.unwrap_or_default()
        };

        coupon_validation_from_response(status, &text)
    }
}

#[async_trait]
impl DeliveryFeeLookup for StorefrontClient {
    async fn lookup(&self, neighborhood: &str) -> Result<DeliveryQuote, ServiceError> {
        let url = self.neighborhood_url(neighborhood);
        debug!(url = %url, "GET neighborhood fee");

        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        let text = if status.is_success() {
            resp.text().await?
        } else {
            resp.text().await.unwrap_or_default()
        };

        delivery_quote_from_response(neighborhood, status, &text)
    }
}

// =============================================================================
// Response Mapping
// =============================================================================

fn wire_money(field: &str, amount: Decimal) -> Result<Money, ServiceError> {
    Money::from_decimal(amount)
        .filter(|m| !m.is_negative())
        .ok_or_else(|| ServiceError::Decode(format!("invalid {}: {}", field, amount)))
}

fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty() && !trimmed.starts_with('{')).then(|| trimmed.to_string())
        })
}

/// Maps a coupon validation answer.
///
/// Any 4xx is the backend saying no; other failures are `Http`.
fn coupon_validation_from_response(status: StatusCode, body: &str) -> Result<CouponValidation, ServiceError> {
    if status.is_client_error() {
        return Err(ServiceError::Rejected {
            message: error_message(body).unwrap_or_else(|| "coupon is not valid".to_string()),
        });
    }
    if !status.is_success() {
        return Err(ServiceError::Http {
            status: status.as_u16(),
            message: error_message(body).unwrap_or_default(),
        });
    }

    let parsed: CouponResponseBody = serde_json::from_str(body)?;

    let coupon = match parsed.coupon {
        Some(terms) if parsed.valid => {
            let kind = parse_coupon_kind(&terms.kind, terms.value).ok_or_else(|| {
                ServiceError::Decode(format!("unsupported coupon: {} {}", terms.kind, terms.value))
            })?;
            Some(CouponDescriptor {
                kind,
                min_order_value: terms
                    .min_order_value
                    .map(|v| wire_money("minOrderValue", v))
                    .transpose()?,
                max_discount: terms
                    .max_discount
                    .map(|v| wire_money("maxDiscount", v))
                    .transpose()?,
            })
        }
        _ => None,
    };

    let discount_amount = match parsed.discount_amount {
        Some(amount) => wire_money("discountAmount", amount)?,
        None => Money::zero(),
    };

    Ok(CouponValidation {
        valid: parsed.valid,
        discount_amount,
        coupon,
        message: parsed.message,
    })
}

/// Maps a neighborhood check answer. 404 means "not served".
fn delivery_quote_from_response(
    requested: &str,
    status: StatusCode,
    body: &str,
) -> Result<DeliveryQuote, ServiceError> {
    if status == StatusCode::NOT_FOUND {
        return Err(ServiceError::NotFound);
    }
    if !status.is_success() {
        return Err(ServiceError::Http {
            status: status.as_u16(),
            message: error_message(body).unwrap_or_default(),
        });
    }

    let parsed: NeighborhoodResponseBody = serde_json::from_str(body)?;
    Ok(DeliveryQuote {
        neighborhood: parsed
            .neighborhood_name
            .unwrap_or_else(|| requested.to_string()),
        fee: wire_money("fee", parsed.fee)?,
        estimated_time: parsed
            .estimated_time
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ESTIMATED_TIME.to_string()),
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use acai_core::types::{CouponKind, DiscountRate};

    fn client(base_url: &str) -> StorefrontClient {
        StorefrontClient::new(&ApiSettings {
            base_url: base_url.to_string(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_urls() {
        let api = client("http://localhost:3001/api");
        assert_eq!(
            api.coupon_validate_url().as_str(),
            "http://localhost:3001/api/coupons/validate"
        );

        let api = client("https://loja.example/api/");
        assert_eq!(
            api.neighborhood_url("São João").as_str(),
            "https://loja.example/api/neighborhoods/check/S%C3%A3o%20Jo%C3%A3o"
        );
        assert_eq!(
            api.neighborhood_url("a/b").as_str(),
            "https://loja.example/api/neighborhoods/check/a%2Fb"
        );
    }

    #[test]
    fn test_rejects_non_base_url() {
        let settings = ApiSettings {
            base_url: "mailto:loja@acai.example".to_string(),
            timeout_secs: 5,
        };
        assert!(matches!(
            StorefrontClient::new(&settings),
            Err(CartError::Config(_))
        ));
    }

    #[test]
    fn test_coupon_request_body() {
        let item_ids = vec!["acai-500".to_string()];
        let body = CouponRequestBody {
            code: "DEZ10",
            subtotal: Money::from_cents(5000).to_decimal(),
            item_ids: &item_ids,
        };
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"code":"DEZ10","subtotal":50.0,"itemIds":["acai-500"]}"#
        );
    }

    #[test]
    fn test_valid_coupon_response() {
        let body = r#"{
            "valid": true,
            "discountAmount": 5,
            "coupon": { "code": "DEZ10", "type": "percentage", "value": 10, "minOrderValue": 30, "maxDiscount": 15.5 }
        }"#;

        let validation = coupon_validation_from_response(StatusCode::OK, body).unwrap();
        assert!(validation.valid);
        assert_eq!(validation.discount_amount.cents(), 500);

        let terms = validation.coupon.unwrap();
        assert_eq!(
            terms.kind,
            CouponKind::Percentage {
                rate: DiscountRate::from_bps(1000)
            }
        );
        assert_eq!(terms.min_order_value, Some(Money::from_cents(3000)));
        assert_eq!(terms.max_discount, Some(Money::from_cents(1550)));
    }

    #[test]
    fn test_kind_alias_accepted() {
        let body = r#"{"valid":true,"discountAmount":0,"coupon":{"kind":"freeDelivery","value":0}}"#;
        let validation = coupon_validation_from_response(StatusCode::OK, body).unwrap();
        assert_eq!(validation.coupon.unwrap().kind, CouponKind::FreeDelivery);
    }

    #[test]
    fn test_coupon_error_statuses() {
        assert_eq!(
            coupon_validation_from_response(StatusCode::BAD_REQUEST, r#"{"message":"Cupom expirado"}"#),
            Err(ServiceError::Rejected {
                message: "Cupom expirado".to_string()
            })
        );
        assert_eq!(
            coupon_validation_from_response(StatusCode::NOT_FOUND, ""),
            Err(ServiceError::Rejected {
                message: "coupon is not valid".to_string()
            })
        );
        assert!(matches!(
            coupon_validation_from_response(StatusCode::BAD_GATEWAY, "upstream down"),
            Err(ServiceError::Http { status: 502, ref message }) if message == "upstream down"
        ));
        assert!(matches!(
            coupon_validation_from_response(StatusCode::OK, "<html>"),
            Err(ServiceError::Decode(_))
        ));
    }

    #[test]
    fn test_invalid_coupon_body() {
        let body = r#"{"valid":false,"message":"Pedido mínimo não atingido"}"#;
        let validation = coupon_validation_from_response(StatusCode::OK, body).unwrap();
        assert!(!validation.valid);
        assert!(validation.coupon.is_none());
        assert_eq!(validation.message.as_deref(), Some("Pedido mínimo não atingido"));
    }

    #[test]
    fn test_neighborhood_responses() {
        let quote = delivery_quote_from_response(
            "centro",
            StatusCode::OK,
            r#"{"fee":5.5,"estimatedTime":"20-30 min","neighborhoodName":"Centro"}"#,
        )
        .unwrap();
        assert_eq!(quote.neighborhood, "Centro");
        assert_eq!(quote.fee.cents(), 550);
        assert_eq!(quote.estimated_time, "20-30 min");

        let quote = delivery_quote_from_response("Benfica", StatusCode::OK, r#"{"fee":0}"#).unwrap();
        assert_eq!(quote.neighborhood, "Benfica");
        assert_eq!(quote.estimated_time, DEFAULT_ESTIMATED_TIME);

        assert_eq!(
            delivery_quote_from_response("Longe", StatusCode::NOT_FOUND, r#"{"message":"not found"}"#),
            Err(ServiceError::NotFound)
        );
        assert!(matches!(
            delivery_quote_from_response("Centro", StatusCode::OK, r#"{"fee":-1}"#),
            Err(ServiceError::Decode(_))
        ));
        assert!(matches!(
            delivery_quote_from_response("Centro", StatusCode::INTERNAL_SERVER_ERROR, ""),
            Err(ServiceError::Http { status: 500, .. })
        ));
    }
}
