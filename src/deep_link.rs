//! Deep links into the 钱迹 bookkeeping app's `addbill` API.

use reqwest::Url;
use tracing::{info, warn};

const ADDBILL_BASE: &str = "qianji://publicapi/addbill";

/// Bill data the app can pre-fill
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BillDraft {
    pub amount: Option<f64>,
    /// `yyyy-MM-dd` or `yyyy-MM-dd HH:mm:ss`
    pub time: Option<String>,
    pub remark: Option<String>,
    pub category: Option<String>,
}

/// Build an `addbill` URL; `None` when the draft has no amount.
///
/// With `category_choose` the app asks for the category itself, otherwise the
/// recognized category name is passed along.
pub fn build_addbill_url(draft: &BillDraft, category_choose: bool) -> Option<String> {
    let amount = match draft.amount {
        Some(amount) => amount,
        None => {
            warn!("Deep link requested for a bill without an amount");
            return None;
        }
    };

    let mut url = Url::parse(ADDBILL_BASE).ok()?;
    {
        let mut query = url.query_pairs_mut();
        // Receipts are always expenses
        query.append_pair("type", "0");
        query.append_pair("money", &amount.to_string());

        if let Some(time) = draft.time.as_deref().filter(|t| !t.is_empty()) {
            if time.contains(' ') {
                query.append_pair("time", time);
            } else {
                query.append_pair("time", &format!("{time} 12:00:00"));
            }
        }
        if let Some(remark) = draft.remark.as_deref().filter(|r| !r.is_empty()) {
            query.append_pair("remark", remark);
        }
        if category_choose {
            query.append_pair("catechoose", "1");
        } else if let Some(category) = draft.category.as_deref().filter(|c| !c.is_empty()) {
            query.append_pair("catename", category);
        }
    }

    // Form encoding writes spaces as '+'; the app expects them percent-encoded
    let url = url.to_string().replace('+', "%20");
    info!(url = %url, "Generated addbill deep link");
    Some(url)
}
