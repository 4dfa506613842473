//! # API Route Modules
//!
//! Public routes ([`registrations`], [`webhooks`], [`registry`]) take no
//! bearer token. Everything else sits behind the auth middleware; admin
//! handlers additionally require [`crate::auth::Role::Admin`].

pub mod accounts;
pub mod admin;
pub mod notifications;
pub mod registrations;
pub mod registry;
pub mod subscriptions;
pub mod webhooks;
