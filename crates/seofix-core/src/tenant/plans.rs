//! Fixed plan tables and the per-operation price list.

use seofix_state::{Features, PlanTier, Quota};

use super::Operation;

/// Features granted by a plan tier.
pub fn features_for(plan: PlanTier) -> Features {
    match plan {
        PlanTier::Starter => Features {
            audits_per_month: Quota::Limited(4),
            pages_per_audit: Quota::Limited(100),
            fixes_per_month: Quota::Limited(1),
            competitor_analysis: false,
            white_label: false,
            api_access: false,
            priority_support: false,
        },
        PlanTier::Professional => Features {
            audits_per_month: Quota::Limited(20),
            pages_per_audit: Quota::Limited(500),
            fixes_per_month: Quota::Limited(25),
            competitor_analysis: true,
            white_label: false,
            api_access: true,
            priority_support: false,
        },
        PlanTier::Enterprise => Features {
            audits_per_month: Quota::Unlimited,
            pages_per_audit: Quota::Unlimited,
            fixes_per_month: Quota::Unlimited,
            competitor_analysis: true,
            white_label: true,
            api_access: true,
            priority_support: true,
        },
    }
}

/// Cost of one unit of `op`.
pub fn unit_price(op: &Operation) -> f64 {
    match op {
        Operation::Audit => 0.50,
        Operation::Fix => 0.25,
        Operation::CompetitorAnalysis => 1.00,
        Operation::ContentGeneration => 0.02,
        Operation::Other(_) => 0.0,
    }
}
