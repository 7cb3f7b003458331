use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tera::{Context, Tera};
use thiserror::Error;

use pestline_core::config::NotificationConfig;
use pestline_core::domain::quote::Quote;

/// Failure to deliver is distinct from local errors so the lifecycle
/// engine can refuse to flip a quote to `sent`.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("notification endpoint rejected the message: {0}")]
    Rejected(String),
    #[error("notification transport failed: {0}")]
    Transport(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RenderedQuote {
    pub subject: String,
    pub body_html: String,
}

/// Delivers a rendered quote document to a recipient. Implementations
/// must report failure rather than swallow it.
#[async_trait]
pub trait QuoteDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        document: &RenderedQuote,
        recipient: &str,
        cc: &[String],
    ) -> Result<(), DispatchError>;
}

const QUOTE_EMAIL_TEMPLATE: &str = r#"<html>
<body>
  <h1>{{ quote.title }}</h1>
  <p>Quote {{ quote.quote_number }} (version {{ quote.version }})</p>
  <table>
    {% for item in quote.line_items %}{% if item.selected %}
    <tr>
      <td>{{ item.name }}</td>
      <td>{{ item.quantity }} &times; {{ item.unit_price }}</td>
      <td>{{ item.total }}</td>
    </tr>
    {% endif %}{% endfor %}
  </table>
  <p>Subtotal: {{ quote.pricing.subtotal }}</p>
  <p>Total: {{ quote.pricing.total }}</p>
  {% if quote.valid_until %}<p>Valid until {{ quote.valid_until }}</p>{% endif %}
</body>
</html>
"#;

pub struct QuoteRenderer {
    tera: Tera,
}

impl QuoteRenderer {
    pub fn new() -> Result<Self, tera::Error> {
        let mut tera = Tera::default();
        tera.add_raw_template("quote_email.html", QUOTE_EMAIL_TEMPLATE)?;
        Ok(Self { tera })
    }

    pub fn render(&self, quote: &Quote) -> Result<RenderedQuote, tera::Error> {
        let mut context = Context::new();
        context.insert("quote", quote);
        let body_html = self.tera.render("quote_email.html", &context)?;
        Ok(RenderedQuote {
            subject: format!("Quote {}: {}", quote.quote_number, quote.title),
            body_html,
        })
    }
}

/// Posts the rendered document to a JSON email API.
pub struct HttpEmailDispatcher {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<SecretString>,
    from_address: String,
}

#[derive(Serialize)]
struct EmailPayload<'a> {
    from: &'a str,
    to: &'a str,
    cc: &'a [String],
    subject: &'a str,
    html: &'a str,
}

impl HttpEmailDispatcher {
    pub fn new(config: &NotificationConfig) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| DispatchError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            from_address: config.from_address.clone(),
        })
    }
}

#[async_trait]
impl QuoteDispatcher for HttpEmailDispatcher {
    async fn dispatch(
        &self,
        document: &RenderedQuote,
        recipient: &str,
        cc: &[String],
    ) -> Result<(), DispatchError> {
        let payload = EmailPayload {
            from: &self.from_address,
            to: recipient,
            cc,
            subject: &document.subject,
            html: &document.body_html,
        };

        let mut request = self.client.post(&self.api_url).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response =
            request.send().await.map_err(|e| DispatchError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(DispatchError::Rejected(format!(
                "endpoint returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
