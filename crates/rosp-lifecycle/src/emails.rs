//! Transactional email bodies.
//!
//! Layout is owned by the mail provider's templates; these builders only
//! fill in subject and a minimal HTML body.

use rosp_core::EmailAddress;
use rosp_gateway::Email;
use rosp_state::{AdminAction, StatusView, SubscriptionStatus};

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

fn body(greeting_name: &str, paragraphs: &[String], dashboard_url: &str) -> String {
    let mut html = format!("<p>Dear {},</p>", escape(greeting_name));
    for p in paragraphs {
        html.push_str("<p>");
        html.push_str(p);
        html.push_str("</p>");
    }
    html.push_str(&format!(
        "<p><a href=\"{}\">Go to your dashboard</a></p>",
        escape(dashboard_url)
    ));
    html
}

pub(crate) fn welcome(to: EmailAddress, contact_name: &str, company_name: &str, dashboard_url: &str) -> Email {
    Email::new(
        to,
        "Welcome to your registered office service",
        body(
            contact_name,
            &[
                format!("Thank you for registering {}.", escape(company_name)),
                "Once your annual payment is received we will review your documents.".into(),
            ],
            dashboard_url,
        ),
    )
}

pub(crate) fn operator_alert(to: EmailAddress, company_name: &str, company_number: &str, client_email: &str) -> Email {
    Email::new(
        to,
        format!("New registration: {company_name}"),
        format!(
            "<p>A new client has registered.</p><ul><li>Company: {} ({})</li><li>Contact: {}</li></ul>",
            escape(company_name),
            escape(company_number),
            escape(client_email)
        ),
    )
}

pub(crate) fn payment_failed(to: EmailAddress, contact_name: &str, retry_count: u8, dashboard_url: &str) -> Email {
    Email::new(
        to,
        "Your payment could not be processed",
        body(
            contact_name,
            &[
                "We were unable to take your annual payment.".into(),
                format!("This is failed attempt {retry_count}. Please update your payment details."),
            ],
            dashboard_url,
        ),
    )
}

pub(crate) fn admin_decision(
    to: EmailAddress,
    contact_name: &str,
    action: AdminAction,
    reason: Option<&str>,
    dashboard_url: &str,
) -> Email {
    let subject = match action {
        AdminAction::Approve => "Your registered office service is active",
        AdminAction::Reject => "Your application was not approved",
        AdminAction::Suspend => "Your service has been suspended",
        AdminAction::Reactivate => "Your service has been reactivated",
        AdminAction::Cancel => "Your service has been cancelled",
    };
    let mut paragraphs = vec![escape(subject) + "."];
    if let Some(reason) = reason {
        paragraphs.push(format!("Reason: {}", escape(reason)));
    }
    if action == AdminAction::Reject {
        paragraphs.push("Any payment you made will be refunded.".into());
    }
    Email::new(to, subject, body(contact_name, &paragraphs, dashboard_url))
}

pub(crate) fn lifecycle_notice(
    to: EmailAddress,
    contact_name: &str,
    status: SubscriptionStatus,
    dashboard_url: &str,
) -> Email {
    let view = StatusView::for_status(status);
    let subject = match status {
        SubscriptionStatus::RenewalPending => "Your annual renewal is due",
        SubscriptionStatus::Expired => "Your registered office service has expired",
        _ => "Your service status has changed",
    };
    Email::new(
        to,
        subject,
        body(contact_name, &[view.client_message.to_string()], dashboard_url),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to() -> EmailAddress {
        EmailAddress::parse("client@example.com").unwrap()
    }

    #[test]
    fn names_are_escaped() {
        let email = welcome(to(), "<script>", "A & B Ltd", "http://portal/dashboard");
        assert!(email.html.contains("&lt;script&gt;"));
        assert!(email.html.contains("A &amp; B Ltd"));
    }

    #[test]
    fn reject_mentions_refund_and_reason() {
        let email = admin_decision(to(), "Ada", AdminAction::Reject, Some("documents unreadable"), "http://p");
        assert!(email.html.contains("refunded"));
        assert!(email.html.contains("documents unreadable"));
    }
}
