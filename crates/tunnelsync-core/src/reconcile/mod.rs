//! Reconcilers
//!
//! Each reconciler fetches a fresh snapshot of one external system, diffs it
//! against the cycle's [`DesiredState`](crate::model::DesiredState) and
//! applies the smallest set of mutations that converges it. The diff itself
//! is a pure function in each submodule so it can be tested without I/O.
//!
//! - [`tunnel`]: whole-list replace of the tunnel ingress rules
//! - [`dns`]: per-hostname create/update, never delete

pub mod dns;
pub mod tunnel;

pub use dns::{DnsAction, DnsChange, DnsOutcome, DnsPass, plan_record, reconcile_dns, zone_for};
pub use tunnel::{IngressPlan, IngressSettings, TunnelOutcome, plan_ingress, reconcile_tunnel};
