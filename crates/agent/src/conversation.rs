//! Model-backed collaborators: order field extraction and free-form replies.
//!
//! The model is only ever a translator. It turns chat history into an `Extraction` and
//! answers questions the workflow does not handle itself; it never decides prices,
//! stock or whether an order is placed.

use std::sync::Arc;

use async_trait::async_trait;
use dokan_core::commerce::catalog::Catalog;
use dokan_core::domain::chat::{ChatMessage, ChatRole};
use dokan_core::domain::merchant::MerchantProfile;
use dokan_core::domain::session::{Extraction, LineItem, OrderSession};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::llm::{LlmClient, LlmError, PromptMessage};

const IMAGE_PREFIX: &str = "IMAGE:";

#[async_trait]
pub trait OrderExtractor: Send + Sync {
    /// `Ok(None)` means the model produced nothing usable for this turn.
    async fn extract(
        &self,
        merchant: &MerchantProfile,
        history: &[ChatMessage],
    ) -> Result<Option<Extraction>, LlmError>;
}

pub struct ReplyRequest<'a> {
    pub merchant: &'a MerchantProfile,
    pub session: &'a OrderSession,
    pub catalog: &'a Catalog,
    pub history: &'a [ChatMessage],
    pub text: &'a str,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GeneratedReply {
    pub text: Option<String>,
    pub image_url: Option<String>,
}

impl GeneratedReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()), image_url: None }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.image_url.is_none()
    }
}

#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate(&self, request: ReplyRequest<'_>) -> Result<GeneratedReply, LlmError>;
}

pub struct LlmOrderExtractor {
    client: Arc<dyn LlmClient>,
}

impl LlmOrderExtractor {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OrderExtractor for LlmOrderExtractor {
    async fn extract(
        &self,
        merchant: &MerchantProfile,
        history: &[ChatMessage],
    ) -> Result<Option<Extraction>, LlmError> {
        if history.is_empty() {
            return Ok(None);
        }

        let mut messages = vec![PromptMessage::system(extraction_instructions(merchant))];
        messages.extend(history.iter().map(prompt_message));
        let raw = self.client.complete(&messages).await?;
        Ok(parse_extraction(&raw))
    }
}

fn extraction_instructions(merchant: &MerchantProfile) -> String {
    format!(
        "You read a shop conversation between a customer and {shop}. Extract the customer's \
         order details. Reply with one JSON object and nothing else, using exactly these keys: \
         \"name\", \"phone\", \"address\", \"items\" (a list of {{\"product_name\", \
         \"quantity\"}}), \"delivery_charge\" (a number). Use null for anything the customer \
         has not given. Never copy the shop's own phone number or address into the customer's \
         fields.\nDelivery policy:\n{policy}",
        shop = merchant.business_name,
        policy = merchant.delivery_policy,
    )
}

#[derive(Deserialize)]
struct RawExtraction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    items: Option<Vec<RawItem>>,
    #[serde(default)]
    delivery_charge: Option<Decimal>,
}

#[derive(Deserialize)]
struct RawItem {
    #[serde(alias = "name", alias = "product")]
    product_name: String,
    #[serde(default)]
    quantity: Option<u32>,
}

/// Accepts the JSON object anywhere in the model output, including inside a code fence.
/// Items without a quantity count as one; items without a name are dropped.
pub fn parse_extraction(raw: &str) -> Option<Extraction> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }

    let parsed: RawExtraction = serde_json::from_str(&raw[start..=end]).ok()?;
    let items = parsed.items.map(|items| {
        items
            .into_iter()
            .filter(|item| !item.product_name.trim().is_empty())
            .map(|item| LineItem {
                product_name: item.product_name.trim().to_string(),
                quantity: item.quantity.unwrap_or(1).max(1),
            })
            .collect::<Vec<_>>()
    });

    Some(Extraction {
        name: parsed.name,
        phone: parsed.phone,
        address: parsed.address,
        items,
        delivery_charge: parsed.delivery_charge,
    })
}

pub struct LlmReplyGenerator {
    client: Arc<dyn LlmClient>,
}

impl LlmReplyGenerator {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReplyGenerator for LlmReplyGenerator {
    async fn generate(&self, request: ReplyRequest<'_>) -> Result<GeneratedReply, LlmError> {
        let mut messages = vec![PromptMessage::system(reply_instructions(&request))];
        messages.extend(request.history.iter().map(prompt_message));
        if request.history.last().map(|message| message.content.as_str()) != Some(request.text) {
            messages.push(PromptMessage::user(request.text));
        }

        let raw = self.client.complete(&messages).await?;
        Ok(parse_reply(&raw))
    }
}

fn reply_instructions(request: &ReplyRequest<'_>) -> String {
    let merchant = request.merchant;
    let mut prompt = format!(
        "You are the sales assistant for {shop} on its messaging page. Answer briefly and \
         politely in the customer's language. Only quote prices and stock from the catalog \
         below. To show a product photo, put a final line `{IMAGE_PREFIX} <url>`.\n",
        shop = merchant.business_name,
    );
    if merchant.settings.faq_only_mode {
        prompt.push_str(
            "Only answer questions about the shop, its products and delivery. Do not take \
             orders; ask the customer to send their name, phone, address and items instead.\n",
        );
    }

    prompt.push_str("Catalog:\n");
    for product in request.catalog.products() {
        let availability = if product.is_sellable() { "in stock" } else { "out of stock" };
        prompt.push_str(&format!("- {} | {} | {availability}\n", product.name, product.price));
    }
    prompt.push_str(&format!("Delivery policy:\n{}\n", merchant.delivery_policy));

    let session = request.session;
    let items = session
        .items
        .iter()
        .map(|item| format!("{} x{}", item.product_name, item.quantity))
        .collect::<Vec<_>>()
        .join(", ");
    prompt.push_str(&format!(
        "Order details collected so far: name={}, phone={}, address={}, items=[{items}]",
        session.name.as_deref().unwrap_or("-"),
        session.phone.as_deref().unwrap_or("-"),
        session.address.as_deref().unwrap_or("-"),
    ));
    prompt
}

/// Splits an optional trailing `IMAGE: <url>` line off the model's answer.
pub fn parse_reply(raw: &str) -> GeneratedReply {
    let mut image_url = None;
    let mut lines = Vec::new();
    for line in raw.lines() {
        match line.trim().strip_prefix(IMAGE_PREFIX) {
            Some(url) if image_url.is_none() && !url.trim().is_empty() => {
                image_url = Some(url.trim().to_string());
            }
            _ => lines.push(line),
        }
    }

    let text = lines.join("\n").trim().to_string();
    GeneratedReply { text: (!text.is_empty()).then_some(text), image_url }
}

fn prompt_message(message: &ChatMessage) -> PromptMessage {
    match message.role {
        ChatRole::Customer => PromptMessage::user(message.content.clone()),
        ChatRole::Assistant => PromptMessage::assistant(message.content.clone()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use dokan_core::domain::chat::ChatMessage;
    use dokan_core::domain::conversation::{ConversationKey, MerchantId};
    use dokan_core::domain::merchant::{BotSettings, MerchantProfile};
    use rust_decimal::Decimal;
    use secrecy::SecretString;
    use tokio::sync::Mutex;

    use super::{parse_extraction, parse_reply, LlmOrderExtractor, OrderExtractor};
    use crate::llm::{LlmClient, LlmError, PromptMessage, PromptRole};

    struct CannedClient {
        answer: String,
        seen: Mutex<Vec<PromptMessage>>,
    }

    #[async_trait]
    impl LlmClient for CannedClient {
        async fn complete(&self, messages: &[PromptMessage]) -> Result<String, LlmError> {
            *self.seen.lock().await = messages.to_vec();
            Ok(self.answer.clone())
        }
    }

    fn merchant() -> MerchantProfile {
        MerchantProfile {
            id: MerchantId("page-1".to_string()),
            business_name: "Dokan Demo".to_string(),
            business_address: None,
            business_phone: None,
            delivery_policy: "Inside Dhaka 60, outside 120".to_string(),
            page_access_token: SecretString::from("token"),
            settings: BotSettings::default(),
            subscription_active: true,
        }
    }

    #[test]
    fn extraction_is_found_inside_a_code_fence() {
        let raw = "```json\n{\"name\": \"Rahim\", \"phone\": null, \"items\": [\
                   {\"product_name\": \"Cotton Saree\", \"quantity\": 2}, \
                   {\"name\": \"Silk Scarf\"}, {\"product_name\": \" \"}], \
                   \"delivery_charge\": 60}\n```";

        let extraction = parse_extraction(raw).expect("json found");

        assert_eq!(extraction.name.as_deref(), Some("Rahim"));
        assert_eq!(extraction.phone, None);
        let items = extraction.items.expect("items");
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].product_name, "Silk Scarf");
        assert_eq!(items[1].quantity, 1);
        assert_eq!(extraction.delivery_charge, Some(Decimal::new(60, 0)));
    }

    #[test]
    fn non_json_output_is_no_extraction() {
        assert!(parse_extraction("sorry, I can't help").is_none());
        assert!(parse_extraction("} {").is_none());
    }

    #[test]
    fn reply_image_line_is_split_off() {
        let reply = parse_reply("Ei saree ta 1250 taka.\nIMAGE: https://cdn.example/saree.jpg");
        assert_eq!(reply.text.as_deref(), Some("Ei saree ta 1250 taka."));
        assert_eq!(reply.image_url.as_deref(), Some("https://cdn.example/saree.jpg"));

        assert!(parse_reply("   ").is_empty());
    }

    #[tokio::test]
    async fn extractor_sends_policy_then_history() {
        let client = Arc::new(CannedClient {
            answer: r#"{"address": "Mirpur 10"}"#.to_string(),
            seen: Mutex::new(Vec::new()),
        });
        let extractor = LlmOrderExtractor::new(client.clone());
        let key = ConversationKey::new("page-1", "psid-1");
        let history = vec![
            ChatMessage::customer(key.clone(), "Mirpur 10 e pathaben"),
            ChatMessage::assistant(key, "ji"),
        ];

        let extraction = extractor.extract(&merchant(), &history).await.expect("ok").expect("some");

        assert_eq!(extraction.address.as_deref(), Some("Mirpur 10"));
        let seen = client.seen.lock().await;
        assert_eq!(seen.len(), 3);
        assert!(seen[0].content.contains("Inside Dhaka 60"));
        assert_eq!(seen[1].role, PromptRole::User);
        assert_eq!(seen[2].role, PromptRole::Assistant);
    }
}
