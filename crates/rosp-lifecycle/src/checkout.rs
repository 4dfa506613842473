//! Hosted checkout for the annual fee.
//!
//! Used right after registration and again from the dashboard when that
//! first attempt failed or the client abandoned it.

use serde::Serialize;

use rosp_core::{SubscriptionId, Timestamp};
use rosp_gateway::{CheckoutRequest, CustomerRequest};
use rosp_state::Trigger;

use crate::error::LifecycleError;
use crate::Engine;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutOutcome {
    pub subscription_id: SubscriptionId,
    pub session_id: String,
    pub url: String,
}

impl Engine {
    /// Open a checkout session for the subscription's annual fee.
    ///
    /// Allowed only while a successful payment would be accepted by the
    /// transition table. Creates the gateway customer on first use.
    pub async fn begin_checkout(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<CheckoutOutcome, LifecycleError> {
        let (subscription, account, company_name) = self
            .ledger
            .read(|t| {
                let sub = t
                    .subscription(subscription_id)
                    .cloned()
                    .ok_or_else(|| LifecycleError::not_found("subscription", subscription_id))?;
                let account = t
                    .account(sub.account_id())
                    .cloned()
                    .ok_or_else(|| LifecycleError::not_found("account", sub.account_id()))?;
                let company = t
                    .profile_for_account(sub.account_id())
                    .map(|p| p.company_name.clone());
                Ok::<_, LifecycleError>((sub, account, company))
            })
            .await??;

        if !subscription.accepts(Trigger::PaymentSucceeded) {
            return Err(LifecycleError::InvalidTransition(format!(
                "checkout is not available for a subscription in status {}",
                subscription.status()
            )));
        }

        let customer_ref = match subscription.gateway_customer_ref() {
            Some(existing) => existing.to_string(),
            None => {
                let created = self
                    .gateway
                    .payments
                    .create_customer(&CustomerRequest {
                        email: account.email.clone(),
                        name: company_name.unwrap_or_else(|| account.contact_name.clone()),
                        account_id: account.id,
                    })
                    .await
                    .map_err(|e| LifecycleError::ExternalService {
                        service: "payments",
                        message: e.to_string(),
                    })?;
                self.attach_customer(subscription_id, created.id).await?
            }
        };

        let dashboard = self.config.dashboard_url();
        let session = self
            .gateway
            .payments
            .create_checkout_session(&CheckoutRequest {
                customer_ref,
                subscription_id,
                amount_minor: self.config.annual_fee_minor,
                currency: self.config.fee_currency.clone(),
                success_url: dashboard.clone(),
                cancel_url: dashboard,
            })
            .await
            .map_err(|e| LifecycleError::ExternalService {
                service: "payments",
                message: e.to_string(),
            })?;

        tracing::info!(subscription_id = %subscription_id, session_id = %session.id, "checkout session opened");
        Ok(CheckoutOutcome {
            subscription_id,
            session_id: session.id,
            url: session.url,
        })
    }

    /// Record the gateway customer, keeping one that a concurrent request
    /// attached first. Returns the reference now on the subscription.
    async fn attach_customer(
        &self,
        subscription_id: SubscriptionId,
        customer_ref: String,
    ) -> Result<String, LifecycleError> {
        self.ledger
            .transact(|uow| {
                let mut sub = uow
                    .subscription(subscription_id)
                    .ok_or_else(|| LifecycleError::not_found("subscription", subscription_id))?;
                if let Some(existing) = sub.gateway_customer_ref() {
                    return Ok(existing.to_string());
                }
                sub.attach_customer(customer_ref.clone(), Timestamp::now());
                uow.save_subscription(sub)?;
                Ok(customer_ref)
            })
            .await
    }
}
