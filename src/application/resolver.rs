use crate::config::{KeywordRules, ResolverConfig};
use crate::domain::payment::{PaymentMethod, PaymentRecord};
use crate::domain::ports::ProbeRef;
use crate::domain::resolution::{Resolution, ResolvedStatus, UpstreamStatus};
use serde_json::Value;
use tracing::{debug, warn};

/// One step of the page classification. Rules run in order and the first
/// one returning a status wins.
pub trait TextRule: Send + Sync {
    fn name(&self) -> &'static str;
    /// `text` is already lowercased.
    fn evaluate(&self, text: &str) -> Option<ResolvedStatus>;
}

/// Matches completed-payment phrases, skipping occurrences that sit inside
/// an instruction ("pastikan ...", "if ...").
pub struct StrongSuccessRule {
    phrases: Vec<String>,
    negation_triggers: Vec<String>,
    window: usize,
}

impl StrongSuccessRule {
    pub fn new(phrases: Vec<String>, negation_triggers: Vec<String>, window: usize) -> Self {
        Self {
            phrases,
            negation_triggers,
            window,
        }
    }

    fn is_negated(&self, text: &str, idx: usize) -> bool {
        let preceding = preceding_window(text, idx, self.window);
        self.negation_triggers
            .iter()
            .any(|trigger| preceding.contains(trigger.as_str()))
    }
}

impl TextRule for StrongSuccessRule {
    fn name(&self) -> &'static str {
        "strong_success"
    }

    fn evaluate(&self, text: &str) -> Option<ResolvedStatus> {
        for phrase in &self.phrases {
            for (idx, _) in text.match_indices(phrase.as_str()) {
                if self.is_negated(text, idx) {
                    debug!(
                        phrase = %phrase,
                        preceding = %preceding_window(text, idx, self.window),
                        "resolver: ignoring success phrase inside instruction"
                    );
                    continue;
                }
                debug!(phrase = %phrase, "resolver: strong success match");
                return Some(ResolvedStatus::settled());
            }
        }
        None
    }
}

pub struct PendingMarkerRule {
    markers: Vec<String>,
}

impl PendingMarkerRule {
    pub fn new(markers: Vec<String>) -> Self {
        Self { markers }
    }
}

impl TextRule for PendingMarkerRule {
    fn name(&self) -> &'static str {
        "pending_marker"
    }

    fn evaluate(&self, text: &str) -> Option<ResolvedStatus> {
        let marker = self
            .markers
            .iter()
            .find(|marker| text.contains(marker.as_str()))?;
        debug!(marker = %marker, "resolver: pending marker match");
        Some(ResolvedStatus::awaiting_payment())
    }
}

/// Builds the default rule chain out of keyword data.
pub fn keyword_rules(rules: &KeywordRules) -> Vec<Box<dyn TextRule>> {
    vec![
        Box::new(StrongSuccessRule::new(
            rules.strong_success.clone(),
            rules.negation_triggers.clone(),
            rules.negation_window,
        )),
        Box::new(PendingMarkerRule::new(rules.pending_markers.clone())),
    ]
}

/// The last `window` characters of `text` before byte offset `idx`.
fn preceding_window(text: &str, idx: usize, window: usize) -> &str {
    if window == 0 {
        return "";
    }
    let head = &text[..idx];
    let start = head
        .char_indices()
        .rev()
        .nth(window - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &head[start..]
}

/// Works out where a payment stands by asking the processor, first through
/// the transaction endpoint and then by reading the payment page.
pub struct StatusResolver {
    probe: ProbeRef,
    wallet_methods: Vec<PaymentMethod>,
    rules: Vec<Box<dyn TextRule>>,
    probe_url_template: String,
    min_reconstruct_token_len: usize,
}

impl StatusResolver {
    pub fn new(probe: ProbeRef, config: &ResolverConfig) -> Self {
        Self::with_rules(probe, config, keyword_rules(&config.rules))
    }

    /// Same as [`StatusResolver::new`] with a custom rule chain.
    pub fn with_rules(
        probe: ProbeRef,
        config: &ResolverConfig,
        rules: Vec<Box<dyn TextRule>>,
    ) -> Self {
        Self {
            probe,
            wallet_methods: config.wallet_methods.clone(),
            rules,
            probe_url_template: config.probe_url_template.clone(),
            min_reconstruct_token_len: config.min_reconstruct_token_len,
        }
    }

    /// Resolves a stored record, deriving its token and page url first.
    pub async fn resolve_record(&self, record: &PaymentRecord) -> Resolution {
        let target =
            record.probe_target(&self.probe_url_template, self.min_reconstruct_token_len);
        if target.is_empty() {
            debug!(payment_id = %record.id, "resolver: nothing to probe");
            return Resolution::Indeterminate;
        }
        self.resolve(target.token.as_deref(), &record.method, target.url.as_deref())
            .await
    }

    pub async fn resolve(
        &self,
        token: Option<&str>,
        method: &PaymentMethod,
        probe_url: Option<&str>,
    ) -> Resolution {
        if let Some(token) = token
            && self.wallet_methods.contains(method)
            && let Some(resolved) = self.lookup_token(token, method).await
        {
            return Resolution::Definitive(resolved);
        }

        if let Some(url) = probe_url
            && let Some(resolved) = self.scrape_page(url).await
        {
            return Resolution::Definitive(resolved);
        }

        Resolution::Indeterminate
    }

    /// Classifies page text with the rule chain. A page without any signal
    /// still counts as waiting for payment.
    pub fn classify(&self, text: &str) -> ResolvedStatus {
        let text = text.to_lowercase();
        for rule in &self.rules {
            if let Some(resolved) = rule.evaluate(&text) {
                debug!(rule = rule.name(), status = %resolved.status, "resolver: rule matched");
                return resolved;
            }
        }
        ResolvedStatus::unverified()
    }

    async fn lookup_token(&self, token: &str, method: &PaymentMethod) -> Option<ResolvedStatus> {
        let payload = match self.probe.fetch_structured(token, method).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                debug!(method = %method, "resolver: no structured status for token");
                return None;
            }
            Err(e) => {
                warn!(method = %method, error = %e, "resolver: structured lookup failed");
                return None;
            }
        };

        let status = payload
            .get("transaction_status")
            .and_then(Value::as_str)
            .and_then(UpstreamStatus::parse)?;

        Some(ResolvedStatus::new(
            status,
            field_text(&payload, "status_code"),
            field_text(&payload, "status_message"),
        ))
    }

    async fn scrape_page(&self, url: &str) -> Option<ResolvedStatus> {
        match self.probe.fetch_text(url).await {
            Ok(page) if page.status == 200 => Some(self.classify(&page.body)),
            Ok(page) => {
                debug!(url = %url, status = page.status, "resolver: payment page not readable");
                None
            }
            Err(e) => {
                warn!(url = %url, error = %e, "resolver: payment page fetch failed");
                None
            }
        }
    }
}

fn field_text(payload: &Value, key: &str) -> String {
    match payload.get(key) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
