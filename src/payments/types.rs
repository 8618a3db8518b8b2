use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Well-known callback parameter names used by the hosted checkout protocol.
pub const STATUS_FIELD: &str = "checkout-status";
pub const SIGNATURE_FIELD: &str = "signature";
pub const TRANSACTION_ID_FIELD: &str = "checkout-transaction-id";
pub const REFERENCE_FIELD: &str = "checkout-reference";
pub const ALGORITHM_FIELD: &str = "checkout-algorithm";

/// Immutable view of the parameters the provider sends back after a payment
/// attempt, either on the shopper's browser redirect or on the
/// server-to-server notification.
///
/// Keys are kept sorted so signature canonicalization can iterate in the
/// order the provider's protocol prescribes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams(BTreeMap<String, String>);

impl CallbackParams {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn signature(&self) -> Option<&str> {
        self.get(SIGNATURE_FIELD)
    }

    pub fn status(&self) -> Option<&str> {
        self.get(STATUS_FIELD)
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.get(TRANSACTION_ID_FIELD)
    }

    pub fn reference(&self) -> Option<&str> {
        self.get(REFERENCE_FIELD)
    }

    pub fn algorithm(&self) -> Option<&str> {
        self.get(ALGORITHM_FIELD)
    }

    /// Iterate over all parameters in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The raw parameters as an opaque audit blob for transaction records.
    pub fn to_raw_details(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect(),
        )
    }
}

impl From<HashMap<String, String>> for CallbackParams {
    fn from(map: HashMap<String, String>) -> Self {
        Self(map.into_iter().collect())
    }
}

impl FromIterator<(String, String)> for CallbackParams {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Closed set of payment outcomes derived from the provider status code.
///
/// Classification is total: any status the protocol does not recognize,
/// including an absent one, maps to `Failed` rather than an error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    Success,
    Pending,
    Delayed,
    Failed,
}

impl PaymentOutcome {
    pub fn classify(status: &str) -> Self {
        match status {
            "ok" => PaymentOutcome::Success,
            "pending" => PaymentOutcome::Pending,
            "delayed" => PaymentOutcome::Delayed,
            _ => PaymentOutcome::Failed,
        }
    }

    /// Success, Pending and Delayed all let the order proceed to capture;
    /// downstream behavior may still differ per variant.
    pub fn is_proceed(&self) -> bool {
        !matches!(self, PaymentOutcome::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentOutcome::Success => "ok",
            PaymentOutcome::Pending => "pending",
            PaymentOutcome::Delayed => "delayed",
            PaymentOutcome::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PaymentOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One hidden-input of a provider's hosted payment form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FormParameter {
    pub name: String,
    pub value: String,
}

/// A selectable payment method (bank, card scheme, wallet) returned by the
/// payment-session response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionProvider {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub parameters: Vec<FormParameter>,
}

/// Payment-session data returned by the provider API when a payment is
/// initiated for an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSession {
    #[serde(rename = "transactionId")]
    pub transaction_id: String,
    /// Direct URL to the provider's own method-selection page, used when
    /// bank selection is skipped on the merchant side.
    pub href: String,
    #[serde(default)]
    pub providers: Vec<SessionProvider>,
}

impl PaymentSession {
    /// Form fields of the selected payment method, empty map if the id is
    /// not present. Pure projection; existence is validated by the caller.
    pub fn form_fields(&self, provider_id: &str) -> HashMap<String, String> {
        let mut fields = HashMap::new();
        for provider in &self.providers {
            if provider.id == provider_id {
                for parameter in &provider.parameters {
                    fields.insert(parameter.name.clone(), parameter.value.clone());
                }
            }
        }
        fields
    }

    /// Submission URL of the selected payment method, empty string if the id
    /// is not present.
    pub fn form_action(&self, provider_id: &str) -> String {
        let mut action = String::new();
        for provider in &self.providers {
            if provider.id == provider_id {
                action = provider.url.clone();
            }
        }
        action
    }

    pub fn has_provider(&self, provider_id: &str) -> bool {
        self.providers.iter().any(|p| p.id == provider_id)
    }
}

/// Ephemeral hand-off to the redirect presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormSubmission {
    pub action: String,
    pub fields: HashMap<String, String>,
}

/// Request body for creating a payment session with the provider.
#[derive(Debug, Clone, Serialize)]
pub struct SessionRequest {
    /// Unique stamp for this payment attempt.
    pub stamp: String,
    /// Merchant order reference echoed back in callbacks.
    pub reference: String,
    /// Amount in the currency's minor units.
    pub amount: i64,
    pub currency: String,
    pub language: String,
    pub email: String,
    #[serde(rename = "redirectUrls")]
    pub redirect_urls: RedirectUrls,
    #[serde(rename = "callbackUrls", skip_serializing_if = "Option::is_none")]
    pub callback_urls: Option<RedirectUrls>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RedirectUrls {
    pub success: String,
    pub cancel: String,
}

/// Resolve the provider id from a selected-payment-method identifier.
///
/// Method ids coming from the storefront may be composite
/// (`"<providerId>-<variant>"`, e.g. `"6-creditcards"`); only the portion
/// before the first separator identifies the provider. Empty or
/// whitespace-only input resolves to nothing.
pub fn resolve_method_id(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    let id = match trimmed.find('-') {
        Some(pos) => &trimmed[..pos],
        None => trimmed,
    };
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}
