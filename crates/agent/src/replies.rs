use dokan_core::commerce::inventory::ReservationFailure;
use dokan_core::commerce::pricing::PricedOrder;
use dokan_core::domain::order::OrderRecord;
use dokan_core::domain::session::{OrderSession, SessionField};
use rust_decimal::Decimal;

pub const CANCELLED: &str = "আপনার অর্ডারটি বাতিল করা হয়েছে। আবার কিছু লাগলে জানাবেন।";
pub const DELAY_ACKNOWLEDGED: &str =
    "ঠিক আছে, সময় নিয়ে জানাবেন। আপনার অর্ডারের তথ্য আমাদের কাছে রাখা আছে।";
pub const DENY_ACKNOWLEDGED: &str = "ঠিক আছে, কোনো সমস্যা নেই। প্রয়োজন হলে আবার নক দিবেন।";
pub const GENERIC_FAILURE: &str =
    "দুঃখিত, অর্ডারটি এই মুহূর্তে সম্পন্ন করা যায়নি। কিছুক্ষণ পরে আবার চেষ্টা করুন।";

fn taka(amount: Decimal) -> String {
    format!("{} টাকা", amount.normalize())
}

fn field_label(field: SessionField) -> &'static str {
    match field {
        SessionField::Name => "নাম",
        SessionField::Phone => "ফোন নম্বর",
        SessionField::Address => "ডেলিভারি ঠিকানা",
        SessionField::Items => "পণ্যের নাম ও পরিমাণ",
    }
}

pub fn missing_fields(fields: &[SessionField]) -> String {
    let labels = fields.iter().map(|field| field_label(*field)).collect::<Vec<_>>();
    format!("অর্ডার কনফার্ম করতে আপনার {} প্রয়োজন। দয়া করে জানাবেন।", labels.join(", "))
}

/// Items, subtotal, delivery charge, total and the captured customer fields.
pub fn order_summary(session: &OrderSession, priced: &PricedOrder) -> String {
    let mut lines = vec!["আপনার অর্ডারের সারসংক্ষেপ:".to_string()];
    for line in &priced.lines {
        lines.push(format!(
            "• {} × {} = {}",
            line.product_name,
            line.quantity,
            taka(line.line_total())
        ));
    }
    for item in &priced.unresolved {
        lines.push(format!("• {} × {} (ক্যাটালগে পাওয়া যায়নি)", item.product_name, item.quantity));
    }
    lines.push(format!("সাবটোটাল: {}", taka(priced.subtotal)));
    lines.push(format!("ডেলিভারি চার্জ: {}", taka(priced.delivery_charge)));
    lines.push(format!("মোট: {}", taka(priced.total)));
    lines.push(String::new());
    lines.push(format!("নাম: {}", session.name.as_deref().unwrap_or("-")));
    lines.push(format!("ফোন: {}", session.phone.as_deref().unwrap_or("-")));
    lines.push(format!("ঠিকানা: {}", session.address.as_deref().unwrap_or("-")));
    lines.push(String::new());
    lines.push("সব ঠিক থাকলে \"confirm\" লিখে অর্ডার কনফার্ম করুন।".to_string());
    lines.join("\n")
}

pub fn order_confirmation(order: &OrderRecord) -> String {
    let reference = order.id.0.chars().take(8).collect::<String>().to_uppercase();
    let mut lines = vec![format!("✅ আপনার অর্ডার কনফার্ম হয়েছে! অর্ডার নম্বর: {reference}")];
    for line in &order.lines {
        lines.push(format!("• {} × {}", line.product_name, line.quantity));
    }
    lines.push(format!("মোট: {} (ডেলিভারি চার্জ সহ)", taka(order.total)));
    lines.push(format!("ডেলিভারি ঠিকানা: {}", order.address));
    lines.push("ধন্যবাদ! শীঘ্রই আমরা আপনার সাথে যোগাযোগ করব।".to_string());
    lines.join("\n")
}

/// Catalog and stock problems are told to the customer; a failed stock write is not.
pub fn reservation_problem(failure: &ReservationFailure) -> String {
    match failure {
        ReservationFailure::ProductNotFound { name } => {
            format!("দুঃখিত, \"{name}\" আমাদের ক্যাটালগে পাওয়া যায়নি। পণ্যের নামটি আবার দেখে জানাবেন।")
        }
        ReservationFailure::StockConflict { out_of_stock, insufficient } => {
            let mut lines = vec!["দুঃখিত, কিছু পণ্যের স্টকে সমস্যা আছে:".to_string()];
            lines.extend(out_of_stock.iter().map(|name| format!("• {name} এখন স্টকে নেই")));
            lines.extend(insufficient.iter().map(|shortfall| {
                format!(
                    "• {}: আপনি {}টি চেয়েছেন, স্টকে আছে {}টি",
                    shortfall.product_name, shortfall.requested, shortfall.available
                )
            }));
            lines.push("পরিমাণ বা পণ্য পরিবর্তন করে আবার জানাবেন।".to_string());
            lines.join("\n")
        }
        ReservationFailure::MutationFailed { .. } => GENERIC_FAILURE.to_string(),
    }
}
