//! Campaign playbooks attached to cluster snapshots when they are written.

const PREMIUM: [&str; 4] = [
    "Exclusive VIP offers and early access",
    "Premium product launches",
    "Luxury brand collaborations",
    "High-value reward programs",
];

const SAVERS: [&str; 4] = [
    "Budget-friendly promotions",
    "Value pack deals",
    "Discount coupons and cashback",
    "Flash sales notifications",
];

const ACTIVE: [&str; 4] = [
    "New arrival notifications",
    "Seasonal sale alerts",
    "Loyalty point bonuses",
    "Mobile app exclusive deals",
];

const GENERAL: [&str; 4] = [
    "General promotional offers",
    "Seasonal campaigns",
    "New product launches",
    "Newsletter subscriptions",
];

/// Picks the playbook for a cluster label. Matching is case-insensitive and
/// checked in order: premium, savers, active, then the general fallback.
#[must_use]
pub fn marketing_notes(label: &str) -> Vec<String> {
    let label = label.to_lowercase();
    let playbook = if label.contains("premium") || label.contains("high spenders") {
        &PREMIUM
    } else if label.contains("savers") || label.contains("careful") {
        &SAVERS
    } else if label.contains("active") || label.contains("splurgers") {
        &ACTIVE
    } else {
        &GENERAL
    };
    playbook.iter().map(|s| (*s).to_owned()).collect()
}
