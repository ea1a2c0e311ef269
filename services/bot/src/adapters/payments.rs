//! services/bot/src/adapters/payments.rs
//!
//! This module contains the adapter for Stripe Checkout.
//! It implements the `PaymentService` port from the `core` crate using the
//! form-encoded Stripe REST API directly.

use std::time::Duration;

use async_trait::async_trait;
use originality_core::domain::{Checkout, User};
use originality_core::ports::{CheckoutRequest, PaymentService, PortError, PortResult};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
struct CustomerResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    payment_status: Option<String>,
}

#[derive(Clone)]
pub struct StripePayments {
    client: reqwest::Client,
    api_url: String,
    secret_key: String,
}

fn customer_form(user: &User) -> Vec<(String, String)> {
    let name = user
        .username
        .clone()
        .unwrap_or_else(|| format!("User {}", user.external_id));
    vec![
        ("name".to_string(), name),
        (
            "metadata[external_id]".to_string(),
            user.external_id.to_string(),
        ),
        (
            "metadata[username]".to_string(),
            user.username.clone().unwrap_or_default(),
        ),
    ]
}

fn checkout_form(request: &CheckoutRequest) -> Vec<(String, String)> {
    let item = "line_items[0]";
    vec![
        ("customer".to_string(), request.customer_id.clone()),
        ("payment_method_types[0]".to_string(), "card".to_string()),
        (
            format!("{}[price_data][currency]", item),
            request.currency.clone(),
        ),
        (
            format!("{}[price_data][product_data][name]", item),
            format!("{} Credits", request.credits),
        ),
        (
            format!("{}[price_data][product_data][description]", item),
            format!("Purchase {} credits for document analysis", request.credits),
        ),
        (
            format!("{}[price_data][unit_amount]", item),
            request.amount.to_string(),
        ),
        (format!("{}[quantity]", item), "1".to_string()),
        ("mode".to_string(), "payment".to_string()),
        ("metadata[type]".to_string(), "credit_purchase".to_string()),
        ("metadata[credits]".to_string(), request.credits.to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
    ]
}

impl StripePayments {
    pub fn new(api_url: String, secret_key: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url,
            secret_key,
        })
    }

    async fn read<T: DeserializeOwned>(resp: reqwest::Response) -> PortResult<T> {
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| PortError::Payment(e.to_string()))?;
        if !status.is_success() {
            return Err(PortError::Payment(format!(
                "stripe returned {}: {}",
                status.as_u16(),
                body
            )));
        }
        serde_json::from_str(&body)
            .map_err(|e| PortError::Payment(format!("invalid stripe response: {}; body={}", e, body)))
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> PortResult<T> {
        let resp = self
            .client
            .post(format!("{}{}", self.api_url, path))
            .bearer_auth(&self.secret_key)
            .form(form)
            .send()
            .await
            .map_err(|e| PortError::Payment(e.to_string()))?;
        Self::read(resp).await
    }
}

#[async_trait]
impl PaymentService for StripePayments {
    async fn create_customer(&self, user: &User) -> PortResult<String> {
        let customer: CustomerResponse = self
            .post_form("/v1/customers", &customer_form(user))
            .await?;
        info!(user_id = %user.id, customer_id = %customer.id, "Payment customer created");
        Ok(customer.id)
    }

    async fn create_checkout(&self, request: CheckoutRequest) -> PortResult<Checkout> {
        let session: SessionResponse = self
            .post_form("/v1/checkout/sessions", &checkout_form(&request))
            .await?;
        let url = session
            .url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| PortError::Payment("checkout session has no url".to_string()))?;
        info!(session_id = %session.id, credits = request.credits, "Checkout session created");
        Ok(Checkout {
            session_id: session.id,
            url,
        })
    }

    async fn is_checkout_paid(&self, session_id: &str) -> PortResult<bool> {
        let resp = self
            .client
            .get(format!("{}/v1/checkout/sessions/{}", self.api_url, session_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| PortError::Payment(e.to_string()))?;
        let session: SessionResponse = Self::read(resp).await?;
        Ok(session.payment_status.as_deref() == Some("paid"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn value<'a>(form: &'a [(String, String)], key: &str) -> Option<&'a str> {
        form.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn checkout_form_carries_pack_and_return_urls() {
        let form = checkout_form(&CheckoutRequest {
            customer_id: "cus_1".to_string(),
            credits: 5,
            amount: 10000,
            currency: "hkd".to_string(),
            success_url: "https://t.me/bot?start=credit_purchase_success".to_string(),
            cancel_url: "https://t.me/bot?start=credit_purchase_cancel".to_string(),
        });
        assert_eq!(value(&form, "customer"), Some("cus_1"));
        assert_eq!(value(&form, "mode"), Some("payment"));
        assert_eq!(
            value(&form, "line_items[0][price_data][unit_amount]"),
            Some("10000")
        );
        assert_eq!(
            value(&form, "line_items[0][price_data][product_data][name]"),
            Some("5 Credits")
        );
        assert_eq!(value(&form, "metadata[credits]"), Some("5"));
        assert_eq!(
            value(&form, "cancel_url"),
            Some("https://t.me/bot?start=credit_purchase_cancel")
        );
    }

    #[test]
    fn customer_name_falls_back_to_external_id() {
        let user = User {
            id: Uuid::new_v4(),
            external_id: 42,
            username: None,
            customer_id: None,
            credit: 0,
            analyzing_since: None,
        };
        let form = customer_form(&user);
        assert_eq!(value(&form, "name"), Some("User 42"));
        assert_eq!(value(&form, "metadata[external_id]"), Some("42"));
    }

    #[test]
    fn paid_status_is_read_from_session() {
        let session: SessionResponse =
            serde_json::from_str(r#"{"id":"cs_1","url":null,"payment_status":"paid"}"#).unwrap();
        assert_eq!(session.payment_status.as_deref(), Some("paid"));
        assert!(session.url.is_none());
    }
}
