//! HTTP client for the Cashfree payment gateway.

use std::time::Duration;

use async_trait::async_trait;
use common::{Money, OrderNumber};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::gateway::{
    GatewayError, GatewayId, GatewayMode, GatewayPayment, GatewayPaymentStatus, PaymentGateway,
    SessionRequest,
};

pub const DEFAULT_BASE_URL: &str = "https://api.cashfree.com/pg";
pub const DEFAULT_API_VERSION: &str = "2023-08-01";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings for [`CashfreeGateway`].
#[derive(Debug, Clone)]
pub struct CashfreeConfig {
    pub base_url: String,
    pub app_id: String,
    pub secret_key: String,
    pub api_version: String,
    pub timeout: Duration,
}

impl CashfreeConfig {
    pub fn new(app_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            app_id: app_id.into(),
            secret_key: secret_key.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Serialize)]
struct CreateOrderRequest<'a> {
    order_id: &'a str,
    order_amount: i64,
    order_currency: &'a str,
    customer_details: CustomerDetails<'a>,
    order_meta: OrderMeta<'a>,
}

#[derive(Debug, Serialize)]
struct CustomerDetails<'a> {
    customer_id: &'a str,
    customer_name: &'a str,
    customer_email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    customer_phone: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct OrderMeta<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    return_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notify_url: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct CreateOrderResponse {
    payment_session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    cf_payment_id: GatewayId,
    order_id: String,
    payment_status: String,
    payment_amount: i64,
}

/// Live gateway backed by the Cashfree PG REST API.
///
/// Amounts are exchanged in minor units. Every request is bounded by the
/// configured timeout.
#[derive(Clone)]
pub struct CashfreeGateway {
    client: Client,
    config: CashfreeConfig,
}

impl CashfreeGateway {
    pub fn new(config: CashfreeConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("x-client-id", &self.config.app_id)
            .header("x-client-secret", &self.config.secret_key)
            .header("x-api-version", &self.config.api_version)
    }
}

fn transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Unavailable(e.to_string())
    }
}

async fn rejection(response: reqwest::Response) -> GatewayError {
    let status = response.status();
    let message = response.text().await.unwrap_or_default();
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        GatewayError::Unavailable(format!("status {}: {message}", status.as_u16()))
    } else {
        GatewayError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl PaymentGateway for CashfreeGateway {
    fn mode(&self) -> GatewayMode {
        GatewayMode::Live
    }

    #[tracing::instrument(skip(self, request), fields(order_number = %request.order_number))]
    async fn create_session(&self, request: &SessionRequest) -> Result<String, GatewayError> {
        let body = CreateOrderRequest {
            order_id: request.order_number.as_str(),
            order_amount: request.amount.minor_units(),
            order_currency: &request.currency,
            customer_details: CustomerDetails {
                customer_id: &request.customer.id,
                customer_name: &request.customer.name,
                customer_email: &request.customer.email,
                customer_phone: request.customer.phone.as_deref(),
            },
            order_meta: OrderMeta {
                return_url: request.return_url.as_deref(),
                notify_url: request.notify_url.as_deref(),
            },
        };

        let response = self
            .authorized(self.client.post(self.url("/orders")))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        let parsed: CreateOrderResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        let session_id = parsed
            .payment_session_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| GatewayError::InvalidResponse("missing payment_session_id".into()))?;

        tracing::info!("payment session created");
        Ok(session_id)
    }

    #[tracing::instrument(skip(self), fields(order_number = %order_number))]
    async fn get_payment(
        &self,
        order_number: &OrderNumber,
        payment_id: &str,
    ) -> Result<GatewayPayment, GatewayError> {
        let path = format!("/orders/{}/payments/{}", order_number.as_str(), payment_id);
        let response = self
            .authorized(self.client.get(self.url(&path)))
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(GatewayError::PaymentNotFound(payment_id.to_string()));
        }
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        let payment: PaymentResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        tracing::debug!(status = %payment.payment_status, "payment fetched");
        Ok(GatewayPayment {
            payment_id: payment.cf_payment_id.to_string(),
            order_number: OrderNumber::new(payment.order_id),
            status: GatewayPaymentStatus::from_gateway(&payment.payment_status),
            amount: Money::from_minor(payment.payment_amount),
        })
    }
}
