use secrecy::SecretString;

use crate::domain::conversation::MerchantId;
use crate::domain::session::BusinessIdentity;

/// Per-merchant switches for how the assistant answers customers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BotSettings {
    pub ai_reply_enabled: bool,
    /// Order workflow plus free-form model replies.
    pub hybrid_mode: bool,
    /// Model replies restricted to the merchant's FAQ content.
    pub faq_only_mode: bool,
    pub reply_delay_secs: u64,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            ai_reply_enabled: true,
            hybrid_mode: true,
            faq_only_mode: false,
            reply_delay_secs: 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct MerchantProfile {
    pub id: MerchantId,
    pub business_name: String,
    pub business_address: Option<String>,
    pub business_phone: Option<String>,
    pub delivery_policy: String,
    pub page_access_token: SecretString,
    pub settings: BotSettings,
    pub subscription_active: bool,
}

impl MerchantProfile {
    pub fn identity(&self) -> BusinessIdentity {
        BusinessIdentity {
            address: self.business_address.clone(),
            phone: self.business_phone.clone(),
        }
    }

    pub fn replies_allowed(&self) -> bool {
        self.subscription_active && self.settings.ai_reply_enabled
    }
}
